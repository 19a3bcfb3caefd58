//! The expression language embedded in attribute text
//!
//! Attribute text is a [template::Template]: literal text mixed with `${ ... }` interpolation.
//! Interpolations are tokenized by [lexer], parsed into an [parser::Expr] tree by [parser] and
//! evaluated by [eval::Evaluator]. Function calls are limited to [functions::Function].
pub mod eval;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod template;

pub use eval::Evaluator;
pub use parser::{Expr, ExprParser, Reference};
pub use template::Template;
