//! Resource gating and branch resolution
//!
//! A resource whose `count` is `0` or `false` is dropped before anything else happens to it.
//! Remaining resources get every attribute evaluated down to literals. Text that interpolates
//! `count.*` or `each.*` can only be evaluated per instance and is kept as written.
use crate::document::{RawExpr, ResourceBlock, COUNT, FOR_EACH};
use crate::error::EvaluationError;
use crate::expand::exclusive_meta_arguments;
use crate::expression::template::escape_markers;
use crate::expression::eval::duplicate_key;
use crate::expression::Evaluator;
use crate::util::mentions_iteration;
use crate::value::Value;
use indexmap::IndexMap;

#[derive(derive_new::new)]
pub struct ConditionalEvaluator<'e> {
    evaluator: &'e Evaluator<'e>,
}

impl ConditionalEvaluator<'_> {
    /// `false` if the resource is disabled by `count = 0` or `count = false`
    ///
    /// `count` together with `for_each` is rejected here, before a disabled resource could hide it.
    pub fn exists(&self, resource: &ResourceBlock) -> Result<bool, EvaluationError> {
        let Some(count) = resource.attributes.get(COUNT) else {
            return Ok(true);
        };

        let context = format!("{}.{COUNT}", resource.address());
        if resource.attributes.contains_key(FOR_EACH) {
            return Err(exclusive_meta_arguments(count, &context));
        }
        let value = self.evaluator.evaluate(count, &context)?;

        let disabled = match &value {
            Value::Bool(enabled) => !enabled,
            Value::Number(number) => number.is_zero(),
            Value::Text(_) => match (value.as_bool(), value.as_number()) {
                (Some(enabled), _) => !enabled,
                (_, Some(number)) => number.is_zero(),
                _ => false,
            },
            // anything else is rejected by the count expander
            _ => false,
        };
        Ok(!disabled)
    }

    /// Replaces every attribute leaf that can be evaluated now with its literal value
    pub fn resolve_branches(
        &self,
        resource: &ResourceBlock,
    ) -> Result<ResourceBlock, EvaluationError> {
        let address = resource.address();
        let mut attributes = IndexMap::with_capacity(resource.attributes.len());

        for (name, raw) in &resource.attributes {
            let resolved = match name.as_str() {
                // evaluated by the expanders, which report their own errors
                COUNT | FOR_EACH => raw.clone(),
                _ => self.resolve(raw, &format!("{address}.{name}"))?,
            };
            attributes.insert(name.clone(), resolved);
        }

        Ok(ResourceBlock {
            attributes,
            ..resource.clone()
        })
    }

    fn resolve(&self, raw: &RawExpr, context: &str) -> Result<RawExpr, EvaluationError> {
        match raw {
            RawExpr::Text(text) if mentions_iteration(text) => Ok(raw.clone()),
            RawExpr::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.resolve(item, &format!("{context}[{i}]")))
                .collect::<Result<Vec<_>, _>>()
                .map(RawExpr::List),
            RawExpr::Map(map) => {
                let mut resolved = IndexMap::with_capacity(map.len());
                for (raw_key, value) in map {
                    let key = if mentions_iteration(raw_key) {
                        raw_key.clone()
                    } else {
                        let value = self.evaluator.evaluate_text(raw_key, context)?;
                        let text = value.to_template_text().ok_or_else(|| {
                            EvaluationError::invalid(
                                raw_key,
                                format!("map keys must be strings, got {}", value.type_name()),
                                context,
                            )
                        })?;
                        let key = escape_markers(&text);
                        if resolved.contains_key(&key) {
                            return Err(duplicate_key(raw_key, &text, context));
                        }
                        key
                    };
                    let value = self.resolve(value, &format!("{context}.{key}"))?;
                    resolved.insert(key, value);
                }
                Ok(RawExpr::Map(resolved))
            }
            _ => self.evaluator.evaluate(raw, context).map(RawExpr::from),
        }
    }

    /// Drops disabled resources and resolves the branches of the rest
    #[tracing::instrument(level = "info", skip_all)]
    pub fn resolve_all(
        &self,
        resources: &[ResourceBlock],
    ) -> Result<Vec<ResourceBlock>, EvaluationError> {
        let mut kept = Vec::with_capacity(resources.len());
        for resource in resources {
            if !self.exists(resource)? {
                tracing::info!(resource = %resource.address(), "dropped by conditional count");
                continue;
            }
            kept.push(self.resolve_branches(resource)?);
        }
        Ok(kept)
    }
}
