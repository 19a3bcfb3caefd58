//! error types shared by the evaluation stages
use crate::config::ConfigError;
use crate::document::DocumentIssues;
use crate::hcl_documents::LoadError;
use crate::region::RegionError;

/// Failure while evaluating or expanding an expression
///
/// `context` names the place the expression was found, e.g. `aws_instance.web.instance_type`.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("unresolved reference `{expr}` in {context}")]
    UnresolvedReference { expr: String, context: String },

    #[error("invalid expression `{expr}` in {context}: {reason}")]
    InvalidExpression {
        expr: String,
        reason: String,
        context: String,
    },

    #[error("{resource} requests {requested} instances, exceeding the limit of {limit}")]
    ExpansionLimitExceeded {
        resource: String,
        requested: u64,
        limit: u32,
    },

    #[error("`{expr}` in {context} is only known after deployment")]
    DynamicValueDetected { expr: String, context: String },
}

impl EvaluationError {
    pub(crate) fn unresolved(expr: impl ToString, context: &str) -> Self {
        Self::UnresolvedReference {
            expr: expr.to_string(),
            context: context.to_string(),
        }
    }

    pub(crate) fn invalid(expr: impl ToString, reason: impl Into<String>, context: &str) -> Self {
        Self::InvalidExpression {
            expr: expr.to_string(),
            reason: reason.into(),
            context: context.to_string(),
        }
    }

    pub(crate) fn dynamic(expr: impl ToString, context: &str) -> Self {
        Self::DynamicValueDetected {
            expr: expr.to_string(),
            context: context.to_string(),
        }
    }
}

/// Any failure of a complete evaluation run
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Document(#[from] DocumentIssues),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Region(#[from] RegionError),

    #[error("module `{name}`: {reason}")]
    Module { name: String, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    pub(crate) fn module(name: &str, reason: impl Into<String>) -> Self {
        Self::Module {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
