use super::{describe, IndexKey, ResourceInstance};
use crate::document::FOR_EACH;
use crate::error::EvaluationError;
use crate::expression::Evaluator;
use crate::util::IterationBindings;
use crate::value::Value;
use indexmap::IndexMap;

/// Expands `for_each` into one instance per map entry or distinct set element
#[derive(derive_new::new)]
pub struct ForEachExpander<'e> {
    evaluator: &'e Evaluator<'e>,
    max_for_each_expansion: u32,
}

impl ForEachExpander<'_> {
    #[tracing::instrument(level = "info", skip_all)]
    pub fn expand_all(
        &self,
        instances: Vec<ResourceInstance>,
    ) -> Result<Vec<ResourceInstance>, EvaluationError> {
        let mut expanded = Vec::with_capacity(instances.len());
        for instance in instances {
            if instance.key.is_none() && instance.attributes.contains_key(FOR_EACH) {
                expanded.extend(self.expand(instance)?);
            } else {
                expanded.push(instance);
            }
        }
        Ok(expanded)
    }

    pub fn expand(
        &self,
        mut instance: ResourceInstance,
    ) -> Result<Vec<ResourceInstance>, EvaluationError> {
        let address = instance.address();
        let Some(for_each) = instance.attributes.shift_remove(FOR_EACH) else {
            return Ok(vec![instance]);
        };

        let context = format!("{address}.{FOR_EACH}");
        let value = self.evaluator.evaluate(&for_each, &context)?;
        let entries = entries(value).map_err(|reason| {
            EvaluationError::invalid(&for_each, reason, &context)
        })?;

        let requested = entries.len() as u64;
        if requested > u64::from(self.max_for_each_expansion) {
            return Err(EvaluationError::ExpansionLimitExceeded {
                resource: address,
                requested,
                limit: self.max_for_each_expansion,
            });
        }

        tracing::debug!(resource = %address, instances = requested, "expanding for_each");

        entries
            .into_iter()
            .map(|(key, value)| {
                instance.keyed(
                    IndexKey::Key(key.clone()),
                    &IterationBindings::Each { key, value },
                )
            })
            .collect()
    }
}

/// Key/value pairs in declaration order
///
/// Lists are treated as sets of primitives, keyed by their text.
fn entries(value: Value) -> Result<IndexMap<String, Value>, String> {
    match value {
        Value::Map(map) => Ok(map),
        Value::List(items) => {
            let mut entries = IndexMap::with_capacity(items.len());
            for item in items {
                let key = match &item {
                    Value::Text(_) | Value::Number(_) | Value::Bool(_) => item.to_template_text(),
                    _ => None,
                }
                .ok_or_else(|| {
                    format!(
                        "set elements must be strings, numbers or bools, got {}",
                        describe(&item)
                    )
                })?;
                entries.entry(key).or_insert(item);
            }
            Ok(entries)
        }
        other => Err(format!(
            "for_each requires a map or a set, got {}",
            describe(&other)
        )),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::conditional::ConditionalEvaluator;
    use crate::document::{Document, RawExpr};
    use crate::expand::CountExpander;
    use crate::hcl_documents;
    use crate::resolver::VariableResolver;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    fn expand(source: &str, limit: u32) -> Result<Vec<ResourceInstance>, EvaluationError> {
        let document = Document::new(&hcl_documents!(source)).expect("document must be valid");
        let context = VariableResolver::new(&document, &IndexMap::new()).resolve()?;
        let evaluator = Evaluator::new(&context);
        let resources = ConditionalEvaluator::new(&evaluator).resolve_all(&document.resources)?;
        let instances = CountExpander::new(&evaluator, limit).expand_all(resources)?;
        ForEachExpander::new(&evaluator, limit).expand_all(instances)
    }

    #[test]
    fn map_entries() {
        let instances = expand(
            r#"
            variable "servers" {
              default = {
                web = { size = "t3.micro" }
                api = { size = "m5.large" }
              }
            }
            resource "aws_instance" "server" {
              for_each      = var.servers
              instance_type = each.value.size
              name          = "${each.key}-server"
            }
            "#,
            10,
        )
        .unwrap();

        let ids: HashSet<_> = instances.iter().map(ResourceInstance::logical_id).collect();
        assert_eq!(
            ids,
            HashSet::from([
                "server[\"web\"]".to_string(),
                "server[\"api\"]".to_string()
            ])
        );

        let web = &instances[0];
        assert_eq!(web.key, Some(IndexKey::Key("web".to_string())));
        assert!(!web.attributes.contains_key("for_each"));
        assert_eq!(
            web.attributes["name"],
            RawExpr::Text("${\"web\"}-server".to_string())
        );
    }

    #[test]
    fn set_elements_are_deduplicated() {
        let instances = expand(
            r#"
            resource "aws_s3_bucket" "bucket" {
              for_each = ["logs", "assets", "logs"]
              bucket   = "acme-${each.value}"
            }
            "#,
            10,
        )
        .unwrap();

        let ids: Vec<_> = instances.iter().map(ResourceInstance::logical_id).collect();
        assert_eq!(ids, vec!["bucket[\"logs\"]", "bucket[\"assets\"]"]);
    }

    #[test]
    fn empty_and_limit() {
        assert_eq!(
            expand(r#"resource "aws_s3_bucket" "b" { for_each = {} }"#, 10)
                .unwrap()
                .len(),
            0
        );

        assert_eq!(
            expand(r#"resource "aws_s3_bucket" "b" { for_each = ["a", "b", "c"] }"#, 2)
                .expect_err("must fail"),
            EvaluationError::ExpansionLimitExceeded {
                resource: "aws_s3_bucket.b".to_string(),
                requested: 3,
                limit: 2
            }
        );
    }

    #[test]
    fn invalid_collections() {
        for for_each in ["null", "\"text\"", "3", "[{ a = 1 }]"] {
            let source = format!(r#"resource "aws_s3_bucket" "b" {{ for_each = {for_each} }}"#);
            let error = expand(&source, 10).expect_err("must fail");
            assert!(
                matches!(error, EvaluationError::InvalidExpression { .. }),
                "{for_each}: {error:?}"
            );
        }
    }
}
