use super::{describe, IndexKey, ResourceInstance};
use crate::document::{RawExpr, ResourceBlock, COUNT, FOR_EACH};
use crate::error::EvaluationError;
use crate::expression::Evaluator;
use crate::util::IterationBindings;
use crate::value::Value;

/// Expands `count = N` into `N` instances keyed `0..N`
#[derive(derive_new::new)]
pub struct CountExpander<'e> {
    evaluator: &'e Evaluator<'e>,
    max_count_expansion: u32,
}

impl CountExpander<'_> {
    /// Resources without `count` are passed through as a single unkeyed instance
    #[tracing::instrument(level = "info", skip_all)]
    pub fn expand_all(
        &self,
        resources: Vec<ResourceBlock>,
    ) -> Result<Vec<ResourceInstance>, EvaluationError> {
        let mut instances = Vec::with_capacity(resources.len());
        for resource in resources {
            instances.extend(self.expand(resource)?);
        }
        Ok(instances)
    }

    pub fn expand(
        &self,
        mut resource: ResourceBlock,
    ) -> Result<Vec<ResourceInstance>, EvaluationError> {
        let Some(count) = resource.attributes.shift_remove(COUNT) else {
            return Ok(vec![ResourceInstance::from(resource)]);
        };

        let address = resource.address();
        let context = format!("{address}.{COUNT}");
        if resource.attributes.contains_key(FOR_EACH) {
            return Err(exclusive_meta_arguments(&count, &context));
        }

        let value = self.evaluator.evaluate(&count, &context)?;
        let requested = whole_count(&value).ok_or_else(|| {
            EvaluationError::invalid(
                &count,
                format!(
                    "count must be a non-negative whole number, got {}",
                    describe(&value)
                ),
                &context,
            )
        })?;

        if requested > u64::from(self.max_count_expansion) {
            return Err(EvaluationError::ExpansionLimitExceeded {
                resource: address,
                requested,
                limit: self.max_count_expansion,
            });
        }

        tracing::debug!(resource = %address, count = requested, "expanding count");

        let template = ResourceInstance::from(resource);
        (0..requested)
            .map(|index| {
                template.keyed(IndexKey::Int(index), &IterationBindings::Count { index })
            })
            .collect()
    }
}

pub(crate) fn exclusive_meta_arguments(count: &RawExpr, context: &str) -> EvaluationError {
    EvaluationError::invalid(count, "`count` and `for_each` cannot be used together", context)
}

/// Numbers, numeric text and bools (`true` is one instance); null and collections are rejected
fn whole_count(value: &Value) -> Option<u64> {
    if let Some(enabled) = value.as_bool() {
        return Some(u64::from(enabled));
    }
    match value {
        Value::Number(_) | Value::Text(_) => value
            .as_number()?
            .as_whole()
            .and_then(|count| u64::try_from(count).ok()),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::conditional::ConditionalEvaluator;
    use crate::document::Document;
    use crate::hcl_documents;
    use crate::resolver::VariableResolver;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    fn expand(source: &str, limit: u32) -> Result<Vec<ResourceInstance>, EvaluationError> {
        let document = Document::new(&hcl_documents!(source)).expect("document must be valid");
        let context = VariableResolver::new(&document, &IndexMap::new()).resolve()?;
        let evaluator = Evaluator::new(&context);
        let resources = ConditionalEvaluator::new(&evaluator).resolve_all(&document.resources)?;
        CountExpander::new(&evaluator, limit).expand_all(resources)
    }

    #[test]
    fn instances_and_substitution() {
        let instances = expand(
            r#"
            variable "servers" { default = 3 }
            resource "aws_instance" "web" {
              count = var.servers
              name  = "server-${count.index}"
              tags  = { Slot = "${count.index + 1}" }
            }
            resource "aws_s3_bucket" "logs" {}
            "#,
            10,
        )
        .unwrap();

        let ids: Vec<_> = instances.iter().map(ResourceInstance::address).collect();
        assert_eq!(
            ids,
            vec![
                "aws_instance.web[0]",
                "aws_instance.web[1]",
                "aws_instance.web[2]",
                "aws_s3_bucket.logs",
            ]
        );

        let last = &instances[2];
        assert!(!last.attributes.contains_key("count"));
        assert_eq!(last.attributes["name"], RawExpr::Text("server-${2}".to_string()));
        assert_eq!(
            last.attributes["tags"],
            RawExpr::Map(IndexMap::from([(
                "Slot".to_string(),
                RawExpr::Text("${2 + 1}".to_string())
            )]))
        );
    }

    /// Expands without gating, so `count = 0` reaches the expander
    fn expand_ungated(source: &str, limit: u32) -> Result<Vec<ResourceInstance>, EvaluationError> {
        let document = Document::new(&hcl_documents!(source)).expect("document must be valid");
        let context = VariableResolver::new(&document, &IndexMap::new()).resolve()?;
        let evaluator = Evaluator::new(&context);
        CountExpander::new(&evaluator, limit).expand_all(document.resources)
    }

    #[test]
    fn zero_and_limit() {
        let source = r#"
            variable "n" { default = 0 }
            resource "aws_instance" "web" { count = var.n + 5 }
        "#;

        assert_eq!(expand(source, 5).unwrap().len(), 5);
        assert_eq!(
            expand(source, 4).expect_err("must fail"),
            EvaluationError::ExpansionLimitExceeded {
                resource: "aws_instance.web".to_string(),
                requested: 5,
                limit: 4
            }
        );

        let zero = r#"resource "aws_instance" "web" { count = 0 }"#;
        assert!(expand_ungated(zero, 10).unwrap().is_empty());
        assert!(expand_ungated(zero, 0).unwrap().is_empty());
        assert!(expand(zero, 0).unwrap().is_empty());
    }

    #[test]
    fn true_is_a_single_instance() {
        let source = r#"
            variable "create" { default = true }
            resource "aws_instance" "web" {
              count  = var.create
              region = "us-east-1"
            }
            resource "aws_instance" "quoted" { count = "true" }
        "#;

        let ids: Vec<_> = expand(source, 10)
            .unwrap()
            .iter()
            .map(ResourceInstance::address)
            .collect();
        assert_eq!(ids, vec!["aws_instance.web[0]", "aws_instance.quoted[0]"]);

        let ungated = expand_ungated(r#"resource "aws_instance" "web" { count = false }"#, 10);
        assert!(ungated.unwrap().is_empty());
    }

    #[test]
    fn numeric_text_and_integral_decimal() {
        let instances = expand(
            r#"
            resource "aws_instance" "a" { count = "2" }
            resource "aws_instance" "b" { count = 4 / 2 }
            resource "aws_instance" "c" { count = 2.0 }
            "#,
            10,
        )
        .unwrap();
        assert_eq!(instances.len(), 6);
    }

    #[test]
    fn invalid_counts() {
        for count in ["-1", "1.5", "\"many\"", "null", "[1]"] {
            let source = format!(r#"resource "aws_instance" "web" {{ count = {count} }}"#);
            let error = expand(&source, 10).expect_err("must fail");
            assert!(
                matches!(error, EvaluationError::InvalidExpression { .. }),
                "{count}: {error:?}"
            );
        }
    }

    #[test]
    fn count_with_for_each() {
        let error = expand(
            r#"
            resource "aws_instance" "web" {
              count    = 1
              for_each = { a = 1 }
            }
            "#,
            10,
        )
        .expect_err("must fail");

        let EvaluationError::InvalidExpression { reason, .. } = error else {
            panic!("unexpected error {error:?}");
        };
        assert_eq!(reason, "`count` and `for_each` cannot be used together");
    }

    #[test]
    fn disabled_count_with_for_each() {
        for count in ["0", "false"] {
            let source = format!(
                r#"resource "aws_instance" "web" {{
                  count    = {count}
                  for_each = {{ a = 1 }}
                }}"#
            );
            let error = expand(&source, 10).expect_err("must fail");
            assert_eq!(
                error,
                EvaluationError::InvalidExpression {
                    expr: count.to_string(),
                    reason: "`count` and `for_each` cannot be used together".to_string(),
                    context: "aws_instance.web.count".to_string(),
                }
            );
        }
    }
}
