//! # tfexpand - static evaluation of terraform configurations
//!
//! Turns terraform configuration into a flat list of concrete resource instances, so their cost
//! can be estimated before anything is deployed. Nothing is looked up remotely: a value that is
//! only known after deployment (`data.*`, attributes of other resources) fails the run.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `tfexpand` works internally.
//!
//! ### HCL Terms
//!
//! In hcl terms...
//! - a file gets parsed as a `body`
//! - ...which is just a list of `structures`
//! - ...where there are two kinds:
//!   - `attribute`: a "key = value" pair
//!   - or `block`:
//!     - 1 `identifier`
//!     - followed by 0 or more `labels`
//!     - and a `body` enclosed in `{` and `}`
//!
//! ```hcl
//! variable "instance_count" {
//!   default = 2
//! }
//!
//! resource "aws_instance" "web" {
//!   count         = var.instance_count
//!   instance_type = "t3.micro"
//!   tags = {
//!     Name = "server-${count.index}"
//!   }
//! }
//! ```
//!
//! ### Loading files
//!
//! Every `.tf` file is parsed as a `body` ([hcl_edit::structure::Body]). [hcl_documents::HclDocuments] stores the
//! root attributes and blocks of all files together with their source path, which is used for error messages.
//!
//! ### Parsing
//!
//! see [document::Document::new]
//!
//! Blocks are sorted into resources, variables, locals, modules and providers. Attribute values stay unevaluated
//! ([document::RawExpr]): literals are kept as they are, every other expression is turned into interpolation text
//! (`var.x` becomes `"${var.x}"`). From here on a single expression language is used for everything.
//!
//! All problems of all files are reported at once ([document::DocumentIssues]).
//!
//! ### Resolving variables and locals
//!
//! see [resolver::VariableResolver]
//!
//! Variables take their supplied value or default. Locals are evaluated in dependency order; a local that
//! depends on a pending local is put back on a work stack until the dependency is known. Loops are reported.
//!
//! ### Expressions
//!
//! see [expression]
//!
//! Interpolation text is split into a [expression::Template] and each `${ ... }` is tokenized and parsed
//! into an [expression::Expr] tree. [expression::Evaluator] walks that tree with the resolved context.
//!
//! ### Conditionals and expansion
//!
//! - [conditional::ConditionalEvaluator] drops resources with `count = 0` and evaluates everything else that
//!   does not depend on the instance
//! - [expand::CountExpander] creates `name[0]`, `name[1]`, ...
//! - [expand::ForEachExpander] creates `name["key"]`, ...
//!
//! Expansion replaces `count.index`, `each.key` and `each.value` references with literals by rewriting the
//! expression tree and rendering it back to text.
//!
//! ### Finalizing
//!
//! The remaining attributes are evaluated to [value::Value]s and every instance gets a region
//! ([region::RegionResolver]). The result is a list of [engine::ExpandedResource]s, serialized via [serde].
//!
pub mod conditional;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod expand;
pub mod expression;
pub mod hcl_documents;
pub mod region;
pub mod resolver;
pub mod service;
mod util;
pub mod value;
mod visit;

pub use config::EngineConfig;
pub use engine::{Engine, ExpandedResource};
pub use error::{Error, EvaluationError};
