//! The evaluation pipeline
//!
//! Every stage consumes the complete output of the previous one:
//!
//! 1. parse: [HclDocuments] -> [Document]
//! 2. resolve: variables and locals -> [ResolvedContext](crate::resolver::ResolvedContext)
//! 3. conditionals: gate on `count = 0`, evaluate attribute branches
//! 4. count: one instance per index
//! 5. for_each: one instance per key
//! 6. finalize: evaluate remaining attributes, resolve the region
//!
//! Local modules run the same pipeline on their directory afterwards.
use crate::conditional::ConditionalEvaluator;
use crate::config::EngineConfig;
use crate::document::{Document, ModuleRef, COUNT, FOR_EACH};
use crate::error::Error;
use crate::expand::{CountExpander, ForEachExpander, IndexKey};
use crate::expression::Evaluator;
use crate::hcl_documents::HclDocuments;
use crate::region::RegionResolver;
use crate::resolver::VariableResolver;
use crate::service::Service;
use crate::value::Value;
use indexmap::IndexMap;
use std::path::Path;

/// A single, fully evaluated resource instance
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ExpandedResource {
    /// `web`, `web[0]` or `web["key"]`, prefixed with `module.<name>.` inside modules
    pub logical_id: String,
    pub resource_type: String,
    pub physical_index: IndexKey,
    pub resolved_attributes: IndexMap<String, Value>,
    pub resolved_region: String,
}

impl ExpandedResource {
    /// `aws_instance.web[0]` or `module.net.aws_subnet.private["a"]`
    pub fn address(&self) -> String {
        let (module_path, local_id) = split_module_path(&self.logical_id);
        format!("{module_path}{}.{local_id}", self.resource_type)
    }

    pub fn service(&self) -> Option<Service> {
        Service::from_resource_type(&self.resource_type)
    }
}

/// `module.a.module.b.web[0]` -> (`module.a.module.b.`, `web[0]`)
fn split_module_path(logical_id: &str) -> (&str, &str) {
    let mut consumed = 0;
    let mut rest = logical_id;
    while let Some((name, tail)) = rest
        .strip_prefix("module.")
        .and_then(|after| after.split_once('.'))
    {
        consumed += "module.".len() + name.len() + 1;
        rest = tail;
    }
    logical_id.split_at(consumed)
}

#[derive(derive_new::new, Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluates a single file or all `.tf` files of a directory
    #[tracing::instrument(level = "info", skip(self))]
    pub fn evaluate_path(&self, path: &Path) -> Result<Vec<ExpandedResource>, Error> {
        let base_dir = if path.is_file() {
            path.parent().unwrap_or(Path::new("."))
        } else {
            path
        };

        let document = parse(path)?;
        self.run(
            &document,
            &self.config.variables,
            Some(base_dir),
            &IndexMap::new(),
            0,
        )
    }

    /// Evaluates an already parsed document. Local modules cannot be loaded without a path.
    #[tracing::instrument(level = "info", skip_all)]
    pub fn evaluate_document(&self, document: &Document) -> Result<Vec<ExpandedResource>, Error> {
        self.run(document, &self.config.variables, None, &IndexMap::new(), 0)
    }

    fn run(
        &self,
        document: &Document,
        overrides: &IndexMap<String, Value>,
        base_dir: Option<&Path>,
        inherited_regions: &IndexMap<String, String>,
        depth: u32,
    ) -> Result<Vec<ExpandedResource>, Error> {
        let context = VariableResolver::new(document, overrides).resolve()?;
        tracing::info!(
            stage = "resolve",
            variables = context.variables.len(),
            locals = context.locals.len()
        );

        let evaluator = Evaluator::new(&context);

        let resources = ConditionalEvaluator::new(&evaluator).resolve_all(&document.resources)?;
        tracing::info!(stage = "conditionals", resources = resources.len());

        let instances = CountExpander::new(&evaluator, self.config.max_count_expansion)
            .expand_all(resources)?;
        tracing::info!(stage = "count", instances = instances.len());

        let instances = ForEachExpander::new(&evaluator, self.config.max_for_each_expansion)
            .expand_all(instances)?;
        tracing::info!(stage = "for_each", instances = instances.len());

        let mut regions = RegionResolver::new(inherited_regions.clone());
        regions.register_providers(&document.providers, &evaluator)?;

        let mut expanded = Vec::with_capacity(instances.len());
        for instance in instances {
            let address = instance.address();
            let resolved_attributes =
                evaluator.evaluate_attributes(&instance.attributes, &address)?;
            let resolved_region = regions.resolve(
                &address,
                &instance.resource_type,
                instance.provider.as_deref(),
                &resolved_attributes,
            )?;

            tracing::debug!(resource = %address, region = %resolved_region, "finalized");
            expanded.push(ExpandedResource {
                logical_id: instance.logical_id(),
                resource_type: instance.resource_type,
                physical_index: instance.key.unwrap_or(IndexKey::Int(0)),
                resolved_attributes,
                resolved_region,
            });
        }
        tracing::info!(stage = "finalize", resources = expanded.len());

        for module in &document.modules {
            let resources = self.module(
                module,
                &evaluator,
                base_dir,
                regions.provider_regions(),
                depth,
            )?;
            expanded.extend(resources);
        }

        Ok(expanded)
    }

    fn module(
        &self,
        module: &ModuleRef,
        evaluator: &Evaluator,
        base_dir: Option<&Path>,
        provider_regions: &IndexMap<String, String>,
        depth: u32,
    ) -> Result<Vec<ExpandedResource>, Error> {
        let name = module.name.as_str();

        if !module.is_local() {
            return Err(Error::module(
                name,
                format!("remote source `{}` is not supported", module.source),
            ));
        }
        if module.inputs.contains_key(COUNT) || module.inputs.contains_key(FOR_EACH) {
            return Err(Error::module(
                name,
                "`count` and `for_each` are not supported on modules",
            ));
        }
        if depth >= self.config.max_module_depth {
            return Err(Error::module(
                name,
                format!(
                    "nesting exceeds the maximum module depth of {}",
                    self.config.max_module_depth
                ),
            ));
        }
        let Some(base_dir) = base_dir else {
            return Err(Error::module(
                name,
                "local sources can only be loaded when evaluating a path",
            ));
        };

        let inputs = evaluator.evaluate_attributes(&module.inputs, &format!("module.{name}"))?;
        let directory = base_dir.join(&module.source);

        let _span = tracing::info_span!("module", name, source = %module.source).entered();
        let document = parse(&directory)?;
        let resources = self.run(
            &document,
            &inputs,
            Some(&directory),
            provider_regions,
            depth + 1,
        )?;

        Ok(resources
            .into_iter()
            .map(|resource| ExpandedResource {
                logical_id: format!("module.{name}.{}", resource.logical_id),
                ..resource
            })
            .collect())
    }
}

fn parse(path: &Path) -> Result<Document, Error> {
    let mut documents = HclDocuments::default();
    documents.load_path(path)?;

    let document = Document::new(&documents)?;
    tracing::info!(
        stage = "parse",
        files = documents.source_count(),
        resources = document.resources.len()
    );
    Ok(document)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::EvaluationError;
    use crate::hcl_documents;
    use crate::region::RegionError;
    use pretty_assertions::assert_eq;

    fn evaluate(config: EngineConfig, source: &str) -> Result<Vec<ExpandedResource>, Error> {
        let document = Document::new(&hcl_documents!(source)).expect("document must be valid");
        Engine::new(config).evaluate_document(&document)
    }

    #[test]
    fn counted_servers() {
        let resources = evaluate(
            EngineConfig::new(10, 10),
            r#"
            provider "aws" { region = "us-east-1" }
            resource "aws_instance" "web" {
              count         = 3
              instance_type = "t3.micro"
              tags = {
                Name = "server-${count.index}"
              }
            }
            "#,
        )
        .unwrap();

        assert_eq!(resources.len(), 3);
        let ids: Vec<_> = resources.iter().map(|r| r.logical_id.as_str()).collect();
        assert_eq!(ids, vec!["web[0]", "web[1]", "web[2]"]);

        for (i, resource) in resources.iter().enumerate() {
            assert_eq!(resource.physical_index, IndexKey::Int(i as u64));
            assert_eq!(resource.resolved_region, "us-east-1");
            assert_eq!(
                resource.resolved_attributes["tags"],
                Value::from(IndexMap::from([("Name", format!("server-{i}"))]))
            );
            assert!(!resource.resolved_attributes.contains_key("count"));
        }
        assert_eq!(resources[2].address(), "aws_instance.web[2]");
        assert_eq!(resources[2].service(), Some(Service::Ec2));
    }

    #[test]
    fn conditional_resource() {
        let source = r#"
            variable "create" { default = false }
            resource "aws_db_instance" "db" {
              count          = var.create ? 1 : 0
              instance_class = "db.t3.micro"
              region         = "eu-west-1"
            }
        "#;

        assert!(evaluate(EngineConfig::new(10, 10), source)
            .unwrap()
            .is_empty());

        let resources = evaluate(
            EngineConfig::new(10, 10).with_variable("create", true),
            source,
        )
        .unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].logical_id, "db[0]");
        assert_eq!(resources[0].resolved_region, "eu-west-1");
    }

    #[test]
    fn for_each_with_locals() {
        let resources = evaluate(
            EngineConfig::new(10, 10),
            r#"
            variable "sizes" {
              default = { small = 20, large = 500 }
            }
            locals {
              zone = "eu-central-1b"
            }
            resource "aws_ebs_volume" "data" {
              for_each          = var.sizes
              size              = each.value
              availability_zone = local.zone
              tags              = { Name = "data-${each.key}" }
            }
            "#,
        )
        .unwrap();

        assert_eq!(resources.len(), 2);
        let small = &resources[0];
        assert_eq!(small.logical_id, "data[\"small\"]");
        assert_eq!(small.physical_index, IndexKey::Key("small".to_string()));
        assert_eq!(small.resolved_attributes["size"], Value::from(20i64));
        assert_eq!(small.resolved_region, "eu-central-1");
        assert_eq!(
            small.resolved_attributes["tags"],
            Value::from(IndexMap::from([("Name", "data-small")]))
        );
    }

    #[test]
    fn unexpanded_resource() {
        let resources = evaluate(
            EngineConfig::new(10, 10),
            r#"
            resource "aws_s3_bucket" "logs" {
              bucket = "acme-logs"
              region = "us-west-2"
            }
            "#,
        )
        .unwrap();

        assert_eq!(resources[0].logical_id, "logs");
        assert_eq!(resources[0].physical_index, IndexKey::Int(0));
        assert_eq!(resources[0].address(), "aws_s3_bucket.logs");
    }

    #[test]
    fn failures_abort_the_run() {
        let error = evaluate(
            EngineConfig::new(2, 10),
            r#"resource "aws_instance" "web" { count = 3 }"#,
        )
        .expect_err("must fail");
        assert!(matches!(
            error,
            Error::Evaluation(EvaluationError::ExpansionLimitExceeded { requested: 3, .. })
        ));

        let error = evaluate(
            EngineConfig::new(2, 10),
            r#"resource "aws_instance" "web" { instance_type = "t3.micro" }"#,
        )
        .expect_err("must fail");
        assert!(matches!(
            error,
            Error::Region(RegionError::Unresolvable { .. })
        ));

        let error = evaluate(
            EngineConfig::new(2, 10),
            r#"
            resource "aws_instance" "web" {
              region    = "us-east-1"
              subnet_id = aws_subnet.main.id
            }
            "#,
        )
        .expect_err("must fail");
        assert!(matches!(
            error,
            Error::Evaluation(EvaluationError::DynamicValueDetected { .. })
        ));
    }

    #[test]
    fn modules_need_a_path() {
        let error = evaluate(
            EngineConfig::new(2, 10),
            r#"module "network" { source = "./network" }"#,
        )
        .expect_err("must fail");
        assert!(matches!(error, Error::Module { .. }));

        let error = evaluate(
            EngineConfig::new(2, 10),
            r#"module "network" { source = "terraform-aws-modules/vpc/aws" }"#,
        )
        .expect_err("must fail");
        assert_eq!(
            error.to_string(),
            "module `network`: remote source `terraform-aws-modules/vpc/aws` is not supported"
        );
    }

    #[test]
    fn module_addresses() {
        assert_eq!(split_module_path("web[0]"), ("", "web[0]"));
        assert_eq!(
            split_module_path("module.a.module.b.web[\"x.y\"]"),
            ("module.a.module.b.", "web[\"x.y\"]")
        );

        let resource = ExpandedResource {
            logical_id: "module.net.private[\"a\"]".to_string(),
            resource_type: "aws_subnet".to_string(),
            physical_index: IndexKey::Key("a".to_string()),
            resolved_attributes: IndexMap::new(),
            resolved_region: "us-east-1".to_string(),
        };
        assert_eq!(resource.address(), "module.net.aws_subnet.private[\"a\"]");
    }
}
