//! Expansion of `count` and `for_each` into resource instances
//!
//! Both expanders consume [ResourceBlock]s whose branches are already resolved. The only
//! expressions left in the attributes are the ones referring to `count.*` or `each.*`; each
//! instance gets them substituted with its own index or key.
use crate::document::{RawExpr, ResourceBlock};
use crate::error::EvaluationError;
use crate::util::{bind_attributes, IterationBindings};
use crate::value::Value;
use indexmap::IndexMap;
use std::fmt;

mod count;
mod for_each;

pub(crate) use count::exclusive_meta_arguments;
pub use count::CountExpander;
pub use for_each::ForEachExpander;

/// Position of an instance within its resource
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(untagged)]
pub enum IndexKey {
    Int(u64),
    Key(String),
}

/// `0` or `"key"`
impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Int(index) => write!(f, "{index}"),
            IndexKey::Key(key) => {
                write!(f, "\"{}\"", key.replace('\\', "\\\\").replace('"', "\\\""))
            }
        }
    }
}

/// One instance of a resource block
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceInstance {
    pub resource_type: String,
    pub name: String,
    pub provider: Option<String>,
    /// `None` for resources without `count` or `for_each`
    pub key: Option<IndexKey>,
    pub attributes: IndexMap<String, RawExpr>,
}

impl ResourceInstance {
    /// `web`, `web[0]` or `web["prod"]`
    pub fn logical_id(&self) -> String {
        match &self.key {
            Some(key) => format!("{}[{key}]", self.name),
            None => self.name.clone(),
        }
    }

    pub fn address(&self) -> String {
        format!("{}.{}", self.resource_type, self.logical_id())
    }

    /// Copy of an unkeyed instance for one key, with iteration references substituted
    fn keyed(&self, key: IndexKey, bindings: &IterationBindings) -> Result<Self, EvaluationError> {
        let mut instance = ResourceInstance {
            resource_type: self.resource_type.clone(),
            name: self.name.clone(),
            provider: self.provider.clone(),
            key: Some(key),
            attributes: IndexMap::new(),
        };
        instance.attributes = bind_attributes(&self.attributes, bindings, &instance.address())?;
        Ok(instance)
    }
}

impl From<ResourceBlock> for ResourceInstance {
    fn from(resource: ResourceBlock) -> Self {
        ResourceInstance {
            resource_type: resource.resource_type,
            name: resource.name,
            provider: resource.provider,
            key: None,
            attributes: resource.attributes,
        }
    }
}

/// Type names for messages; the value itself is rendered as an expression
fn describe(value: &Value) -> String {
    format!("{} `{}`", value.type_name(), crate::expression::Expr::Literal(value.clone()))
}
