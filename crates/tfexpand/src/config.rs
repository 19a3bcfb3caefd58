//! Engine configuration and variable overrides
//!
//! The expansion limits have no defaults; every caller decides how many instances it is willing
//! to price. Variable values come from code, `name=value` assignments or `.tfvars` files.
use crate::value::Value;
use hcl_edit::structure::Structure;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_MODULE_DEPTH: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub max_count_expansion: u32,
    pub max_for_each_expansion: u32,
    /// Nesting limit for local modules
    pub max_module_depth: u32,
    /// Values of root module variables, taking precedence over defaults
    pub variables: IndexMap<String, Value>,
}

impl EngineConfig {
    pub fn new(max_count_expansion: u32, max_for_each_expansion: u32) -> Self {
        Self {
            max_count_expansion,
            max_for_each_expansion,
            max_module_depth: DEFAULT_MAX_MODULE_DEPTH,
            variables: IndexMap::new(),
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Later values replace earlier ones
    pub fn with_variables(mut self, variables: impl IntoIterator<Item = (String, Value)>) -> Self {
        self.variables.extend(variables);
        self
    }

    pub fn with_max_module_depth(mut self, max_module_depth: u32) -> Self {
        self.max_module_depth = max_module_depth;
        self
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to parse {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        error: hcl_edit::parser::Error,
    },

    #[error("{}: value of `{name}` must be a literal, found `{expr}`", .path.display())]
    NotLiteral {
        path: PathBuf,
        name: String,
        expr: String,
    },

    #[error(
        "{}: unexpected block `{block_type}`, variable files only contain attributes",
        .path.display()
    )]
    UnexpectedBlock { path: PathBuf, block_type: String },

    #[error("invalid variable assignment `{0}`, expected `name=value`")]
    InvalidAssignment(String),
}

/// Reads a `.tfvars` file: top level attributes with literal values
#[tracing::instrument(level = "debug")]
pub fn load_var_file(path: &Path) -> Result<IndexMap<String, Value>, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_var_file(&content, path)
}

fn parse_var_file(content: &str, path: &Path) -> Result<IndexMap<String, Value>, ConfigError> {
    let body = hcl_edit::parser::parse_body(content).map_err(|error| ConfigError::Parse {
        path: path.to_path_buf(),
        error,
    })?;

    let mut variables = IndexMap::new();
    for structure in body.iter() {
        match structure {
            Structure::Attribute(attribute) => {
                let name = attribute.key.value().to_string();
                let value = Value::try_from(hcl::Expression::from(attribute.value.clone()))
                    .map_err(|not_literal| ConfigError::NotLiteral {
                        path: path.to_path_buf(),
                        name: name.clone(),
                        expr: not_literal.expr,
                    })?;
                tracing::trace!(variable = %name, "loaded from file");
                variables.insert(name, value);
            }
            Structure::Block(block) => {
                return Err(ConfigError::UnexpectedBlock {
                    path: path.to_path_buf(),
                    block_type: block.ident.value().to_string(),
                })
            }
        }
    }

    Ok(variables)
}

/// Parses `name=value`
///
/// The value is read as an HCL literal (`3`, `true`, `["a"]`, `"quoted"`) and taken as plain
/// text if it is not one.
pub fn parse_var_assignment(assignment: &str) -> Result<(String, Value), ConfigError> {
    let Some((name, value)) = assignment.split_once('=') else {
        return Err(ConfigError::InvalidAssignment(assignment.to_string()));
    };

    let name = name.trim();
    if name.is_empty() {
        return Err(ConfigError::InvalidAssignment(assignment.to_string()));
    }

    let literal = value
        .parse::<hcl_edit::expr::Expression>()
        .ok()
        .and_then(|expr| Value::try_from(hcl::Expression::from(expr)).ok());

    Ok((
        name.to_string(),
        literal.unwrap_or_else(|| Value::from(value)),
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builder() {
        let config = EngineConfig::new(10, 20)
            .with_variable("env", "prod")
            .with_variables([("size".to_string(), Value::from(2i64))])
            .with_max_module_depth(2);

        assert_eq!(config.max_count_expansion, 10);
        assert_eq!(config.max_for_each_expansion, 20);
        assert_eq!(config.max_module_depth, 2);
        assert_eq!(config.variables["env"], Value::from("prod"));
        assert_eq!(config.variables["size"], Value::from(2i64));
        assert_eq!(EngineConfig::new(1, 1).max_module_depth, DEFAULT_MAX_MODULE_DEPTH);
    }

    #[test]
    fn assignments() {
        assert_eq!(
            parse_var_assignment("count=3").unwrap(),
            ("count".to_string(), Value::from(3i64))
        );
        assert_eq!(
            parse_var_assignment("create=false").unwrap(),
            ("create".to_string(), Value::from(false))
        );
        assert_eq!(
            parse_var_assignment("env=prod").unwrap(),
            ("env".to_string(), Value::from("prod"))
        );
        assert_eq!(
            parse_var_assignment(r#"zones=["us-east-1a", "us-east-1b"]"#).unwrap(),
            (
                "zones".to_string(),
                Value::from(vec!["us-east-1a", "us-east-1b"])
            )
        );
        assert_eq!(
            parse_var_assignment("url=https://example.com/?a=b").unwrap(),
            (
                "url".to_string(),
                Value::from("https://example.com/?a=b")
            )
        );
        assert!(parse_var_assignment("missing").is_err());
        assert!(parse_var_assignment("=value").is_err());
    }

    #[test]
    fn var_file() {
        let variables = parse_var_file(
            r#"
            instance_count = 2
            tags = {
              team = "platform"
            }
            "#,
            Path::new("prod.tfvars"),
        )
        .unwrap();

        assert_eq!(variables["instance_count"], Value::from(2i64));
        assert_eq!(
            variables["tags"],
            Value::from(IndexMap::from([("team", "platform")]))
        );
    }

    #[test]
    fn var_file_rejects_expressions_and_blocks() {
        let error =
            parse_var_file("size = var.other", Path::new("a.tfvars")).expect_err("must fail");
        assert_eq!(
            error.to_string(),
            "a.tfvars: value of `size` must be a literal, found `var.other`"
        );

        let error =
            parse_var_file("variable \"x\" {}", Path::new("a.tfvars")).expect_err("must fail");
        assert!(matches!(error, ConfigError::UnexpectedBlock { .. }));
    }
}
