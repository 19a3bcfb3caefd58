//! Variable and local value resolution
//!
//! Variables take the externally supplied value, else their default. A variable without either
//! is left out; referencing it fails with [EvaluationError::UnresolvedReference].
//!
//! Locals may reference variables and other locals in any order. They are evaluated on demand
//! with an explicit work stack: a local whose evaluation hits a pending local is put back and the
//! dependency is evaluated first. A dependency that is already on the stack is a cycle.
use crate::document::Document;
use crate::error::EvaluationError;
use crate::expression::Evaluator;
use crate::value::Value;
use indexmap::IndexMap;

/// Everything an expression can reference
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedContext {
    pub variables: IndexMap<String, Value>,
    pub locals: IndexMap<String, Value>,
}

#[derive(derive_new::new)]
pub struct VariableResolver<'d> {
    document: &'d Document,
    overrides: &'d IndexMap<String, Value>,
}

impl VariableResolver<'_> {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn resolve(&self) -> Result<ResolvedContext, EvaluationError> {
        let mut context = ResolvedContext {
            variables: self.resolve_variables(),
            locals: IndexMap::new(),
        };
        self.resolve_locals(&mut context)?;

        tracing::debug!(
            variables = context.variables.len(),
            locals = context.locals.len(),
            "context resolved"
        );
        Ok(context)
    }

    fn resolve_variables(&self) -> IndexMap<String, Value> {
        for name in self.overrides.keys() {
            if !self.document.variables.contains_key(name) {
                tracing::warn!(variable = %name, "value supplied for undeclared variable");
            }
        }

        let mut variables = IndexMap::new();
        for (name, definition) in &self.document.variables {
            match self.overrides.get(name).or(definition.default.as_ref()) {
                Some(value) => {
                    variables.insert(name.clone(), value.clone());
                }
                None => {
                    tracing::warn!(
                        variable = %name,
                        "variable has no value, references to it will fail"
                    )
                }
            }
        }
        variables
    }

    fn resolve_locals(&self, context: &mut ResolvedContext) -> Result<(), EvaluationError> {
        for name in self.document.locals.keys() {
            if context.locals.contains_key(name) {
                continue;
            }

            let mut stack = vec![name.clone()];
            while let Some(current) = stack.last().cloned() {
                let Some(raw) = self.document.locals.get(&current) else {
                    return Err(EvaluationError::unresolved(
                        format!("local.{current}"),
                        "locals",
                    ));
                };

                let location = format!("local.{current}");
                let result = Evaluator::new(context).evaluate(raw, &location);

                match result {
                    Ok(value) => {
                        tracing::trace!(local = %current, "resolved");
                        stack.pop();
                        context.locals.insert(current, value);
                    }
                    Err(EvaluationError::UnresolvedReference { expr, context: at }) => {
                        let Some(dependency) = expr
                            .strip_prefix("local.")
                            .filter(|dependency| self.document.locals.contains_key(*dependency))
                        else {
                            return Err(EvaluationError::UnresolvedReference { expr, context: at });
                        };

                        let pending_at = stack.iter().position(|pending| pending == dependency);
                        if let Some(start) = pending_at {
                            let mut chain: Vec<String> = stack[start..]
                                .iter()
                                .map(|pending| format!("local.{pending}"))
                                .collect();
                            chain.push(format!("local.{dependency}"));

                            return Err(EvaluationError::invalid(
                                location,
                                format!("cycle between local values: {}", chain.join(" -> ")),
                                "locals",
                            ));
                        }

                        tracing::trace!(local = %current, dependency, "dependency pending");
                        stack.push(dependency.to_string());
                    }
                    Err(other) => return Err(other),
                }
            }
        }

        Ok(())
    }
}
