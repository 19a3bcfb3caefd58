//! Typed view of a terraform configuration
//!
//! [Document::new] turns [HclDocuments] into resources, variables, locals, modules and providers.
//! Problems are collected instead of returned one by one, so a single run reports all of them.
//!
//! Attribute values are kept unevaluated as [RawExpr]. Any text may contain `${ ... }` sequences;
//! a literal `${` is stored escaped as `$${`.
use crate::expression::template::{escape_markers, Template};
use crate::hcl_documents::{source_name, HclDocuments};
use crate::value::{Number, Value};
use hcl_edit::structure::{Block, Body, Structure};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;

/// Meta-argument that repeats a resource a number of times
pub const COUNT: &str = "count";
/// Meta-argument that repeats a resource once per map entry or set element
pub const FOR_EACH: &str = "for_each";

const PROVIDER: &str = "provider";
const DROPPED_ATTRIBUTES: &[&str] = &["depends_on"];
const DROPPED_BLOCKS: &[&str] = &["lifecycle", "provisioner", "connection"];
const IGNORED_MODULE_ATTRIBUTES: &[&str] = &["version", "providers", "depends_on"];
const SKIPPED_BLOCK_TYPES: &[&str] = &[
    "data", "output", "terraform", "moved", "import", "check", "removed",
];

/// Unevaluated attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum RawExpr {
    Null,
    Bool(bool),
    Number(Number),
    /// Text, possibly containing interpolation
    Text(String),
    List(Vec<RawExpr>),
    Map(IndexMap<String, RawExpr>),
}

impl RawExpr {
    /// Text that is taken literally
    pub fn literal_text(text: &str) -> Self {
        RawExpr::Text(escape_markers(text))
    }

    /// Text that evaluates the given expression source
    pub fn interpolation(source: impl fmt::Display) -> Self {
        RawExpr::Text(format!("${{{source}}}"))
    }
}

impl From<Value> for RawExpr {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => RawExpr::Null,
            Value::Bool(value) => RawExpr::Bool(value),
            Value::Number(number) => RawExpr::Number(number),
            Value::Text(text) => RawExpr::literal_text(&text),
            Value::List(items) => RawExpr::List(items.into_iter().map(RawExpr::from).collect()),
            Value::Map(map) => RawExpr::Map(
                map.into_iter()
                    .map(|(key, value)| (escape_markers(&key), RawExpr::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<hcl::Expression> for RawExpr {
    fn from(expr: hcl::Expression) -> Self {
        use hcl::expr::TemplateExpr;
        use hcl::Expression;

        match expr {
            Expression::Null => RawExpr::Null,
            Expression::Bool(value) => RawExpr::Bool(value),
            Expression::Number(number) => match Number::try_from(number) {
                Ok(number) => RawExpr::Number(number),
                Err(not_literal) => RawExpr::interpolation(not_literal.expr),
            },
            Expression::String(text) => RawExpr::literal_text(&text),
            Expression::Array(items) => {
                RawExpr::List(items.into_iter().map(RawExpr::from).collect())
            }
            Expression::Object(object) => RawExpr::Map(
                object
                    .into_iter()
                    .map(|(key, value)| (object_key(key), RawExpr::from(value)))
                    .collect(),
            ),
            Expression::TemplateExpr(template) => match *template {
                // backslash escapes are resolved here, only the markers stay escaped
                TemplateExpr::QuotedString(source) => RawExpr::Text(
                    Template::parse(&source, true)
                        .map(|template| template.render(false))
                        .unwrap_or(source),
                ),
                TemplateExpr::Heredoc(heredoc) => RawExpr::Text(heredoc.template),
            },
            other => RawExpr::interpolation(other),
        }
    }
}

fn object_key(key: hcl::ObjectKey) -> String {
    match key {
        hcl::ObjectKey::Identifier(ident) => escape_markers(ident.as_str()),
        hcl::ObjectKey::Expression(hcl::Expression::String(text)) => escape_markers(&text),
        #[allow(unreachable_patterns)]
        other => format!("${{{other}}}"),
    }
}

fn raw_expr(expr: &hcl_edit::expr::Expression) -> RawExpr {
    RawExpr::from(hcl::Expression::from(expr.clone()))
}

/// HCL-like rendering for messages
impl fmt::Display for RawExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawExpr::Null => write!(f, "null"),
            RawExpr::Bool(value) => write!(f, "{value}"),
            RawExpr::Number(number) => write!(f, "{number}"),
            RawExpr::Text(text) => write!(f, "{text}"),
            RawExpr::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            RawExpr::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {key} = {value}")?;
                }
                write!(f, " }}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceBlock {
    pub resource_type: String,
    pub name: String,
    /// Explicit provider configuration, e.g. `aws.west`
    pub provider: Option<String>,
    /// Attributes in declaration order, including `count`/`for_each`.
    /// Nested blocks are lists of maps keyed by the block type.
    pub attributes: IndexMap<String, RawExpr>,
}

impl ResourceBlock {
    pub fn address(&self) -> String {
        format!("{}.{}", self.resource_type, self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDef {
    pub name: String,
    pub default: Option<Value>,
    pub declared_type: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleRef {
    pub name: String,
    pub source: String,
    /// Input variables of the module, including `count`/`for_each` if present
    pub inputs: IndexMap<String, RawExpr>,
}

impl ModuleRef {
    /// `true` for sources on the local file system
    pub fn is_local(&self) -> bool {
        self.source.starts_with("./") || self.source.starts_with("../")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderBlock {
    pub name: String,
    pub alias: Option<String>,
    pub attributes: IndexMap<String, RawExpr>,
}

impl ProviderBlock {
    /// Reference used by a resource `provider` meta-argument: `aws` or `aws.west`
    pub fn key(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{}.{alias}", self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub resources: Vec<ResourceBlock>,
    pub variables: IndexMap<String, VariableDef>,
    pub locals: IndexMap<String, RawExpr>,
    pub modules: Vec<ModuleRef>,
    pub providers: Vec<ProviderBlock>,
}

impl Document {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(hcl_documents: &HclDocuments) -> Result<Self, DocumentIssues> {
        let mut builder = DocumentBuilder::default();

        for (_index, source, attribute) in hcl_documents.attributes() {
            builder.issues.log(Issue::RootAttribute {
                file: source_name(source),
                name: attribute.key.value().to_string(),
            });
        }

        for (_index, source, block) in hcl_documents.blocks() {
            let block_type = block.ident.value().as_str();
            let labels: Vec<&str> = block.labels.iter().map(|label| label.as_str()).collect();

            match (block_type, labels.as_slice()) {
                ("resource", [resource_type, name]) => {
                    builder.resource(resource_type, name, block)
                }
                ("variable", [name]) => builder.variable(name, block),
                ("module", [name]) => builder.module(name, block),
                ("provider", [name]) => builder.provider(name, block),
                ("locals", []) => builder.locals(block),
                (skipped, _) if SKIPPED_BLOCK_TYPES.contains(&skipped) => {
                    tracing::trace!(block_type, ?labels, "skipping block");
                }
                (known, _) if expected_labels(known).is_some() => {
                    builder.issues.log(Issue::LabelMismatch {
                        file: source_name(source),
                        block_type: known.to_string(),
                        expected: expected_labels(known).unwrap_or_default(),
                        found: labels.len(),
                    })
                }
                (unknown, _) => builder.issues.log(Issue::UnknownBlockType {
                    file: source_name(source),
                    block_type: unknown.to_string(),
                }),
            }
        }

        if !builder.issues.is_empty() {
            return Err(builder.issues);
        }

        tracing::debug!(
            resources = builder.document.resources.len(),
            variables = builder.document.variables.len(),
            locals = builder.document.locals.len(),
            modules = builder.document.modules.len(),
            providers = builder.document.providers.len(),
            "document parsed"
        );
        Ok(builder.document)
    }
}

fn expected_labels(block_type: &str) -> Option<usize> {
    match block_type {
        "resource" => Some(2),
        "variable" | "module" | "provider" => Some(1),
        "locals" => Some(0),
        _ => None,
    }
}

#[derive(Default)]
struct DocumentBuilder {
    document: Document,
    issues: DocumentIssues,
    resource_addresses: HashSet<String>,
    provider_keys: HashSet<String>,
}

impl DocumentBuilder {
    fn resource(&mut self, resource_type: &str, name: &str, block: &Block) {
        let mut resource = ResourceBlock {
            resource_type: resource_type.to_string(),
            name: name.to_string(),
            provider: None,
            attributes: IndexMap::new(),
        };

        let address = resource.address();
        if !self.resource_addresses.insert(address.clone()) {
            self.issues.log(Issue::DuplicateResource { address });
            return;
        }

        for structure in block.body.iter() {
            match structure {
                Structure::Attribute(attribute) => {
                    let key = attribute.key.value().as_str();
                    if key == PROVIDER {
                        let provider = hcl::Expression::from(attribute.value.clone()).to_string();
                        resource.provider = Some(provider);
                    } else if DROPPED_ATTRIBUTES.contains(&key) {
                        tracing::trace!(%address, key, "dropping meta-argument");
                    } else {
                        resource
                            .attributes
                            .insert(key.to_string(), raw_expr(&attribute.value));
                    }
                }
                Structure::Block(nested) => {
                    let nested_type = nested.ident.value().as_str();
                    if nested_type == "dynamic" {
                        self.issues.log(Issue::DynamicBlock {
                            address: address.clone(),
                        });
                    } else if DROPPED_BLOCKS.contains(&nested_type) {
                        tracing::trace!(%address, nested_type, "dropping meta-argument block");
                    } else {
                        push_nested_block(&mut resource.attributes, nested);
                    }
                }
            }
        }

        self.document.resources.push(resource);
    }

    fn variable(&mut self, name: &str, block: &Block) {
        if self.document.variables.contains_key(name) {
            self.issues.log(Issue::DuplicateVariable {
                name: name.to_string(),
            });
            return;
        }

        let mut variable = VariableDef {
            name: name.to_string(),
            default: None,
            declared_type: None,
            description: None,
        };

        for attribute in block.body.attributes() {
            let expr = hcl::Expression::from(attribute.value.clone());
            match attribute.key.value().as_str() {
                "default" => match Value::try_from(expr) {
                    Ok(value) => variable.default = Some(value),
                    Err(not_literal) => self.issues.log(Issue::VariableDefaultNotLiteral {
                        name: name.to_string(),
                        expr: not_literal.expr,
                    }),
                },
                "type" => variable.declared_type = Some(expr.to_string()),
                "description" => {
                    if let hcl::Expression::String(description) = expr {
                        variable.description = Some(description);
                    }
                }
                _ => {}
            }
        }

        self.document.variables.insert(name.to_string(), variable);
    }

    fn locals(&mut self, block: &Block) {
        for attribute in block.body.attributes() {
            let name = attribute.key.value().as_str();
            if self.document.locals.contains_key(name) {
                self.issues.log(Issue::DuplicateLocal {
                    name: name.to_string(),
                });
                continue;
            }

            self.document
                .locals
                .insert(name.to_string(), raw_expr(&attribute.value));
        }
    }

    fn module(&mut self, name: &str, block: &Block) {
        if self.document.modules.iter().any(|module| module.name == name) {
            self.issues.log(Issue::DuplicateModule {
                name: name.to_string(),
            });
            return;
        }

        let mut source = None;
        let mut inputs = IndexMap::new();
        for attribute in block.body.attributes() {
            let key = attribute.key.value().as_str();
            if key == "source" {
                let value = hcl::Expression::from(attribute.value.clone());
                if let hcl::Expression::String(text) = value {
                    source = Some(text);
                }
            } else if !IGNORED_MODULE_ATTRIBUTES.contains(&key) {
                inputs.insert(key.to_string(), raw_expr(&attribute.value));
            }
        }

        let Some(source) = source else {
            self.issues.log(Issue::ModuleSourceMissing {
                name: name.to_string(),
            });
            return;
        };

        self.document.modules.push(ModuleRef {
            name: name.to_string(),
            source,
            inputs,
        });
    }

    fn provider(&mut self, name: &str, block: &Block) {
        let mut provider = ProviderBlock {
            name: name.to_string(),
            alias: None,
            attributes: IndexMap::new(),
        };

        for structure in block.body.iter() {
            match structure {
                Structure::Attribute(attribute) => {
                    let key = attribute.key.value().as_str();
                    let expr = hcl::Expression::from(attribute.value.clone());
                    match (key, expr) {
                        ("alias", hcl::Expression::String(alias)) => provider.alias = Some(alias),
                        (key, expr) => {
                            provider.attributes.insert(key.to_string(), RawExpr::from(expr));
                        }
                    }
                }
                Structure::Block(nested) => push_nested_block(&mut provider.attributes, nested),
            }
        }

        if !self.provider_keys.insert(provider.key()) {
            self.issues.log(Issue::DuplicateProvider {
                key: provider.key(),
            });
            return;
        }

        self.document.providers.push(provider);
    }
}

/// Nested blocks become a list of maps under the block type
fn push_nested_block(attributes: &mut IndexMap<String, RawExpr>, block: &Block) {
    let block_type = block.ident.value().to_string();
    let entry = attributes
        .entry(block_type)
        .or_insert_with(|| RawExpr::List(vec![]));

    match entry {
        RawExpr::List(items) => items.push(RawExpr::Map(body_to_map(&block.body))),
        _ => tracing::debug!(
            block_type = block.ident.value().as_str(),
            "nested block conflicts with an attribute of the same name, ignoring block"
        ),
    }
}

fn body_to_map(body: &Body) -> IndexMap<String, RawExpr> {
    let mut map = IndexMap::new();
    for structure in body.iter() {
        match structure {
            Structure::Attribute(attribute) => {
                map.insert(
                    attribute.key.value().to_string(),
                    raw_expr(&attribute.value),
                );
            }
            Structure::Block(nested) => push_nested_block(&mut map, nested),
        }
    }
    map
}

#[derive(derive_new::new, Debug, Default, Clone, PartialEq)]
pub struct DocumentIssues {
    #[new(default)]
    issues: Vec<Issue>,
}

impl DocumentIssues {
    pub fn log(&mut self, issue: Issue) {
        tracing::trace!(?issue, "issue found");
        self.issues.push(issue);
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

impl std::error::Error for DocumentIssues {}

impl fmt::Display for DocumentIssues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(first) = self.issues.first() else {
            return write!(f, "no issues");
        };

        write!(f, "{first}")?;
        if self.issues.len() > 1 {
            write!(f, " (and {} more)", self.issues.len() - 1)?;
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Issue {
    #[error("{file}: unexpected top level attribute `{name}`")]
    RootAttribute { file: String, name: String },

    #[error("{file}: unknown block type `{block_type}`")]
    UnknownBlockType { file: String, block_type: String },

    #[error("{file}: `{block_type}` blocks take {expected} label(s), found {found}")]
    LabelMismatch {
        file: String,
        block_type: String,
        expected: usize,
        found: usize,
    },

    #[error("resource `{address}` is declared more than once")]
    DuplicateResource { address: String },

    #[error("variable `{name}` is declared more than once")]
    DuplicateVariable { name: String },

    #[error("local value `{name}` is declared more than once")]
    DuplicateLocal { name: String },

    #[error("module `{name}` is declared more than once")]
    DuplicateModule { name: String },

    #[error("provider configuration `{key}` is declared more than once")]
    DuplicateProvider { key: String },

    #[error("default of variable `{name}` must be a literal value, found `{expr}`")]
    VariableDefaultNotLiteral { name: String, expr: String },

    #[error("module `{name}` has no literal `source`")]
    ModuleSourceMissing { name: String },

    #[error("resource `{address}` uses a `dynamic` block, which is not supported")]
    DynamicBlock { address: String },
}
