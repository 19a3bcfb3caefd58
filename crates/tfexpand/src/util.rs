use crate::document::RawExpr;
use crate::error::EvaluationError;
use crate::expression::{Expr, Reference, Template};
use crate::value::Value;
use crate::visit::{self, VisitReferencesMut};
use indexmap::IndexMap;

/// Value of the iteration symbols of one resource instance
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum IterationBindings {
    /// `count.index`
    Count { index: u64 },
    /// `each.key` and `each.value`
    Each { key: String, value: Value },
}

impl IterationBindings {
    fn value_of(&self, reference: &Reference) -> Option<Value> {
        match self {
            IterationBindings::Count { index } if reference.starts_with("count", "index") => {
                i64::try_from(*index).ok().map(Value::from)
            }
            IterationBindings::Each { key, .. } if reference.starts_with("each", "key") => {
                Some(Value::from(key.as_str()))
            }
            IterationBindings::Each { value, .. } if reference.starts_with("each", "value") => {
                Some(value.clone())
            }
            _ => None,
        }
    }
}

/// Replaces iteration references with literals
///
/// `each.value.size` becomes the literal of `each.value` followed by `.size`.
#[derive(derive_new::new)]
pub(crate) struct IterationRewriter<'b> {
    bindings: &'b IterationBindings,
    #[new(default)]
    rewritten: usize,
}

impl visit::VisitMut<Expr> for IterationRewriter<'_> {
    #[tracing::instrument(level = "trace", skip_all)]
    fn visit_mut(&mut self, expr: &mut Expr) {
        let Expr::Reference(reference) = expr else {
            return;
        };
        let Some(value) = self.bindings.value_of(reference) else {
            return;
        };

        let mut replacement = Expr::Literal(value);
        for name in reference.path.iter().skip(1) {
            replacement = Expr::GetAttr {
                object: Box::new(replacement),
                name: name.clone(),
            };
        }

        tracing::trace!(%reference, %replacement, "iteration reference substituted");
        *expr = replacement;
        self.rewritten += 1;
    }
}

/// Substitutes iteration references in every attribute
///
/// Only references inside interpolation are touched; the rest of the text stays as written.
pub(crate) fn bind_attributes(
    attributes: &IndexMap<String, RawExpr>,
    bindings: &IterationBindings,
    address: &str,
) -> Result<IndexMap<String, RawExpr>, EvaluationError> {
    attributes
        .iter()
        .map(|(name, raw)| Ok((name.clone(), bind(raw, bindings, &format!("{address}.{name}"))?)))
        .collect()
}

fn bind(
    raw: &RawExpr,
    bindings: &IterationBindings,
    context: &str,
) -> Result<RawExpr, EvaluationError> {
    match raw {
        RawExpr::Text(text) => bind_text(text, bindings, context).map(RawExpr::Text),
        RawExpr::List(items) => items
            .iter()
            .map(|item| bind(item, bindings, context))
            .collect::<Result<Vec<_>, _>>()
            .map(RawExpr::List),
        RawExpr::Map(map) => map
            .iter()
            .map(|(key, value)| {
                Ok((
                    bind_text(key, bindings, context)?,
                    bind(value, bindings, &format!("{context}.{key}"))?,
                ))
            })
            .collect::<Result<IndexMap<_, _>, EvaluationError>>()
            .map(RawExpr::Map),
        RawExpr::Null | RawExpr::Bool(_) | RawExpr::Number(_) => Ok(raw.clone()),
    }
}

fn bind_text(
    text: &str,
    bindings: &IterationBindings,
    context: &str,
) -> Result<String, EvaluationError> {
    let mut template = Template::parse(text, false)
        .map_err(|error| EvaluationError::invalid(text, error.to_string(), context))?;

    let mut rewriter = IterationRewriter::new(bindings);
    template.visit_references_mut(&mut rewriter);

    if rewriter.rewritten == 0 {
        return Ok(text.to_string());
    }
    Ok(template.render(false))
}

/// `true` if the text interpolates `count.*` or `each.*`
pub(crate) fn mentions_iteration(text: &str) -> bool {
    let Ok(mut template) = Template::parse(text, false) else {
        return false;
    };

    let mut found = false;
    template.visit_references_mut(&mut |expr: &mut Expr| {
        if let Expr::Reference(reference) = expr {
            found |= reference.root == "count" || reference.root == "each";
        }
    });
    found
}
