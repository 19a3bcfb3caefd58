//! Evaluation of expressions against resolved variables and locals
use super::functions::{compare, Function};
use super::parser::{BinaryOp, Expr, Reference, UnaryOp};
use super::template::{Template, TemplatePart};
use crate::document::RawExpr;
use crate::error::EvaluationError;
use crate::resolver::ResolvedContext;
use crate::value::{Number, Value};
use indexmap::IndexMap;
use std::fmt;

/// Evaluates [RawExpr]s and [Expr]s
///
/// The `context` argument of every method names the location of the expression for error messages.
#[derive(derive_new::new, Debug, Clone, Copy)]
pub struct Evaluator<'c> {
    context: &'c ResolvedContext,
}

impl<'c> Evaluator<'c> {
    #[tracing::instrument(level = "trace", skip(self, raw))]
    pub fn evaluate(&self, raw: &RawExpr, context: &str) -> Result<Value, EvaluationError> {
        match raw {
            RawExpr::Null => Ok(Value::Null),
            RawExpr::Bool(value) => Ok(Value::Bool(*value)),
            RawExpr::Number(number) => Ok(Value::Number(*number)),
            RawExpr::Text(text) => self.evaluate_text(text, context),
            RawExpr::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.evaluate(item, &format!("{context}[{i}]")))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            RawExpr::Map(map) => {
                let mut evaluated = IndexMap::with_capacity(map.len());
                for (raw_key, value) in map {
                    let key = self.evaluate_key(raw_key, context)?;
                    let value = self.evaluate(value, &format!("{context}.{key}"))?;
                    if evaluated.contains_key(&key) {
                        return Err(duplicate_key(raw_key, &key, context));
                    }
                    evaluated.insert(key, value);
                }
                Ok(Value::Map(evaluated))
            }
        }
    }

    /// Evaluates every attribute. The context of each is `{prefix}.{name}`.
    pub fn evaluate_attributes(
        &self,
        attributes: &IndexMap<String, RawExpr>,
        prefix: &str,
    ) -> Result<IndexMap<String, Value>, EvaluationError> {
        attributes
            .iter()
            .map(|(name, raw)| Ok((name.clone(), self.evaluate(raw, &format!("{prefix}.{name}"))?)))
            .collect()
    }

    /// Evaluates attribute text. A lone interpolation keeps the type of its value.
    pub fn evaluate_text(&self, text: &str, context: &str) -> Result<Value, EvaluationError> {
        let template = Template::parse(text, false)
            .map_err(|error| EvaluationError::invalid(text, error.to_string(), context))?;
        self.evaluate_template(&template, context)
    }

    pub fn evaluate_template(
        &self,
        template: &Template,
        context: &str,
    ) -> Result<Value, EvaluationError> {
        if let Some(expr) = template.single_interpolation() {
            return self.evaluate_expr(expr, context);
        }

        let mut text = String::new();
        for part in &template.parts {
            match part {
                TemplatePart::Literal(literal) => text.push_str(literal),
                TemplatePart::Interpolation(expr) => {
                    let value = self.evaluate_expr(expr, context)?;
                    let interpolated = value.to_template_text().ok_or_else(|| {
                        EvaluationError::invalid(
                            expr,
                            format!("a {} cannot be interpolated into a string", value.type_name()),
                            context,
                        )
                    })?;
                    text.push_str(&interpolated);
                }
            }
        }

        Ok(Value::Text(text))
    }

    fn evaluate_key(&self, key: &str, context: &str) -> Result<String, EvaluationError> {
        let value = self.evaluate_text(key, context)?;
        value.to_template_text().ok_or_else(|| {
            EvaluationError::invalid(
                key,
                format!("map keys must be strings, got {}", value.type_name()),
                context,
            )
        })
    }

    pub fn evaluate_expr(&self, expr: &Expr, context: &str) -> Result<Value, EvaluationError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Template(template) => self.evaluate_template(template, context),
            Expr::Reference(reference) => self.reference(reference, context),
            Expr::List(items) => items
                .iter()
                .map(|item| self.evaluate_expr(item, context))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Expr::Map(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    let key_value = self.evaluate_expr(key, context)?;
                    let key_text = key_value.to_template_text().ok_or_else(|| {
                        EvaluationError::invalid(
                            key,
                            format!("map keys must be strings, got {}", key_value.type_name()),
                            context,
                        )
                    })?;
                    if map.contains_key(&key_text) {
                        return Err(duplicate_key(key, &key_text, context));
                    }
                    map.insert(key_text, self.evaluate_expr(value, context)?);
                }
                Ok(Value::Map(map))
            }
            Expr::GetAttr { object, name } => {
                let object = self.evaluate_expr(object, context)?;
                get_attr(object, name, expr, context)
            }
            Expr::Index { object, index } => {
                let object = self.evaluate_expr(object, context)?;
                let index = self.evaluate_expr(index, context)?;
                get_index(object, index, expr, context)
            }
            Expr::Unary { op, expr: operand } => match op {
                UnaryOp::Not => Ok(Value::Bool(!self.condition(operand, context)?)),
                UnaryOp::Neg => {
                    let value = self.evaluate_expr(operand, context)?;
                    let number = value.as_number().ok_or_else(|| {
                        EvaluationError::invalid(
                            expr,
                            format!("cannot negate a {}", value.type_name()),
                            context,
                        )
                    })?;
                    let negated = match number {
                        Number::Integer(int) => int.checked_neg().map(Number::Integer),
                        Number::Decimal(float) => Some(Number::Decimal(-float)),
                    };
                    negated.map(Value::Number).ok_or_else(|| {
                        EvaluationError::invalid(expr, "integer overflow", context)
                    })
                }
            },
            Expr::Binary { op, left, right } => self.binary(*op, left, right, expr, context),
            Expr::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                if self.condition(condition, context)? {
                    self.evaluate_expr(then_expr, context)
                } else {
                    self.evaluate_expr(else_expr, context)
                }
            }
            Expr::Call { name, args } => {
                let function: Function = name
                    .parse()
                    .map_err(|error: super::functions::UnknownFunction| {
                        EvaluationError::invalid(expr, error.to_string(), context)
                    })?;
                let args = args
                    .iter()
                    .map(|arg| self.evaluate_expr(arg, context))
                    .collect::<Result<Vec<_>, _>>()?;
                function
                    .call(args)
                    .map_err(|reason| EvaluationError::invalid(expr, reason, context))
            }
        }
    }

    fn reference(&self, reference: &Reference, context: &str) -> Result<Value, EvaluationError> {
        let root = reference.root.as_str();
        let scope = match root {
            "var" => &self.context.variables,
            "local" => &self.context.locals,
            "data" | "resource" | "module" => {
                return Err(EvaluationError::dynamic(reference, context))
            }
            "count" | "each" => return Err(EvaluationError::unresolved(reference, context)),
            "self" | "path" | "terraform" => {
                return Err(EvaluationError::invalid(
                    reference,
                    format!("`{root}` references are not supported"),
                    context,
                ))
            }
            // attribute of a managed resource, e.g. `aws_instance.web.id`
            _ if !reference.path.is_empty() => {
                return Err(EvaluationError::dynamic(reference, context))
            }
            _ => {
                return Err(EvaluationError::invalid(
                    reference,
                    "unknown identifier",
                    context,
                ))
            }
        };

        let Some((name, attrs)) = reference.path.split_first() else {
            return Err(EvaluationError::invalid(
                reference,
                format!("`{root}` must be followed by a name"),
                context,
            ));
        };

        let mut path = format!("{root}.{name}");
        let mut value = scope
            .get(name)
            .cloned()
            .ok_or_else(|| EvaluationError::unresolved(&path, context))?;

        for attr in attrs {
            path.push('.');
            path.push_str(attr);
            value = get_attr(value, attr, &path, context)?;
        }

        Ok(value)
    }

    /// Evaluates a condition or logical operand, which must be a bool
    fn condition(&self, expr: &Expr, context: &str) -> Result<bool, EvaluationError> {
        let value = self.evaluate_expr(expr, context)?;
        value.as_bool().ok_or_else(|| {
            EvaluationError::invalid(
                expr,
                format!("expected a bool, got {}", value.type_name()),
                context,
            )
        })
    }

    fn binary(
        &self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        expr: &Expr,
        context: &str,
    ) -> Result<Value, EvaluationError> {
        match op {
            BinaryOp::And => {
                return Ok(Value::Bool(
                    self.condition(left, context)? && self.condition(right, context)?,
                ))
            }
            BinaryOp::Or => {
                return Ok(Value::Bool(
                    self.condition(left, context)? || self.condition(right, context)?,
                ))
            }
            _ => {}
        }

        let lhs = self.evaluate_expr(left, context)?;
        let rhs = self.evaluate_expr(right, context)?;

        if op == BinaryOp::Eq {
            return Ok(Value::Bool(lhs == rhs));
        }
        if op == BinaryOp::Ne {
            return Ok(Value::Bool(lhs != rhs));
        }

        let operand = |value: &Value| {
            value.as_number().ok_or_else(|| {
                EvaluationError::invalid(
                    expr,
                    format!("`{op}` requires numbers, got {}", value.type_name()),
                    context,
                )
            })
        };
        let (a, b) = (operand(&lhs)?, operand(&rhs)?);

        let result = match op {
            BinaryOp::Lt => Value::Bool(compare(a, b).is_lt()),
            BinaryOp::Le => Value::Bool(compare(a, b).is_le()),
            BinaryOp::Gt => Value::Bool(compare(a, b).is_gt()),
            BinaryOp::Ge => Value::Bool(compare(a, b).is_ge()),
            _ => arithmetic(op, a, b)
                .map(Value::Number)
                .map_err(|reason| EvaluationError::invalid(expr, reason, context))?,
        };

        Ok(result)
    }
}

/// Two keys of one map evaluated to the same text
pub(crate) fn duplicate_key(key: impl fmt::Display, text: &str, context: &str) -> EvaluationError {
    EvaluationError::invalid(key, format!("duplicate map key `{text}`"), context)
}

/// Integer arithmetic stays integral; `/` only produces a decimal for inexact results
fn arithmetic(op: BinaryOp, a: Number, b: Number) -> Result<Number, String> {
    let overflow = || "integer overflow".to_string();

    if let (Number::Integer(x), Number::Integer(y)) = (a, b) {
        return match op {
            BinaryOp::Add => x.checked_add(y).map(Number::Integer).ok_or_else(overflow),
            BinaryOp::Sub => x.checked_sub(y).map(Number::Integer).ok_or_else(overflow),
            BinaryOp::Mul => x.checked_mul(y).map(Number::Integer).ok_or_else(overflow),
            BinaryOp::Div | BinaryOp::Mod if y == 0 => Err(format!("`{op}` by zero")),
            BinaryOp::Div => match x.checked_rem(y) {
                Some(0) => x.checked_div(y).map(Number::Integer).ok_or_else(overflow),
                _ => Ok(Number::Decimal(x as f64 / y as f64)),
            },
            BinaryOp::Mod => x.checked_rem(y).map(Number::Integer).ok_or_else(overflow),
            other => Err(format!("`{other}` is not an arithmetic operator")),
        };
    }

    let (x, y) = (a.as_f64(), b.as_f64());
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div | BinaryOp::Mod if y == 0.0 => return Err(format!("`{op}` by zero")),
        BinaryOp::Div => x / y,
        BinaryOp::Mod => x % y,
        other => return Err(format!("`{other}` is not an arithmetic operator")),
    };

    if !result.is_finite() {
        return Err("result is out of range".to_string());
    }
    Ok(Number::Decimal(result))
}

fn get_attr(
    object: Value,
    name: &str,
    expr: impl fmt::Display,
    context: &str,
) -> Result<Value, EvaluationError> {
    match object {
        Value::Map(mut map) => map
            .shift_remove(name)
            .ok_or_else(|| EvaluationError::unresolved(expr, context)),
        other => Err(EvaluationError::invalid(
            expr,
            format!("cannot access attribute `{name}` of a {}", other.type_name()),
            context,
        )),
    }
}

fn get_index(
    object: Value,
    index: Value,
    expr: &Expr,
    context: &str,
) -> Result<Value, EvaluationError> {
    match object {
        Value::List(mut items) => {
            let position = index
                .as_number()
                .and_then(|number| number.as_whole())
                .ok_or_else(|| {
                    EvaluationError::invalid(
                        expr,
                        format!("list index must be a whole number, got {}", index.type_name()),
                        context,
                    )
                })?;

            let length = items.len();
            usize::try_from(position)
                .ok()
                .filter(|position| *position < length)
                .map(|position| items.swap_remove(position))
                .ok_or_else(|| {
                    EvaluationError::invalid(
                        expr,
                        format!("index {position} is out of range for a list of {length} elements"),
                        context,
                    )
                })
        }
        Value::Map(mut map) => {
            let key = index.to_template_text().ok_or_else(|| {
                EvaluationError::invalid(
                    expr,
                    format!("map keys must be strings, got {}", index.type_name()),
                    context,
                )
            })?;
            map.shift_remove(&key)
                .ok_or_else(|| EvaluationError::unresolved(expr, context))
        }
        other => Err(EvaluationError::invalid(
            expr,
            format!("cannot index a {}", other.type_name()),
            context,
        )),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn context() -> ResolvedContext {
        ResolvedContext {
            variables: IndexMap::from([
                ("instance_count".to_string(), Value::from(3i64)),
                ("region".to_string(), Value::from("us-east-1")),
                ("enabled".to_string(), Value::from("true")),
                ("sizes".to_string(), Value::from(vec!["small", "large"])),
                (
                    "settings".to_string(),
                    Value::from(IndexMap::from([("tier", Value::from("gold"))])),
                ),
            ]),
            locals: IndexMap::from([("env".to_string(), Value::from("prod"))]),
        }
    }

    fn eval(text: &str) -> Result<Value, EvaluationError> {
        let context = context();
        Evaluator::new(&context).evaluate(&RawExpr::Text(text.to_string()), "test")
    }

    fn reason(result: Result<Value, EvaluationError>) -> String {
        match result {
            Err(EvaluationError::InvalidExpression { reason, .. }) => reason,
            other => panic!("expected InvalidExpression, got {other:?}"),
        }
    }

    #[test]
    fn literals_pass_through() {
        let context = context();
        let evaluator = Evaluator::new(&context);
        assert_eq!(
            evaluator.evaluate(&RawExpr::Number(Number::Integer(5)), "test"),
            Ok(Value::from(5i64))
        );
        assert_eq!(eval("t3.micro"), Ok(Value::from("t3.micro")));
        assert_eq!(eval("$${var.region}"), Ok(Value::from("${var.region}")));
    }

    #[test]
    fn lone_interpolation_keeps_type() {
        assert_eq!(eval("${var.instance_count}"), Ok(Value::from(3i64)));
        assert_eq!(eval("${var.sizes}"), Ok(Value::from(vec!["small", "large"])));
        assert_eq!(eval("n-${var.instance_count}"), Ok(Value::from("n-3")));
    }

    #[test]
    fn interpolation_inside_text() {
        assert_eq!(
            eval("${local.env}-${var.region}-${var.settings.tier}"),
            Ok(Value::from("prod-us-east-1-gold"))
        );
        assert!(reason(eval("x-${var.sizes}")).contains("cannot be interpolated"));
    }

    #[test]
    fn arithmetic_rules() {
        assert_eq!(eval("${var.instance_count * 2 + 1}"), Ok(Value::from(7i64)));
        assert_eq!(eval("${5 / 2}"), Ok(Value::from(2.5)));
        assert_eq!(eval("${6 / 2}"), Ok(Value::from(3i64)));
        assert_eq!(eval("${7 % 4}"), Ok(Value::from(3i64)));
        assert_eq!(eval("${max(-1, 2) * 3}"), Ok(Value::from(6i64)));
        assert_eq!(eval("${\"4\" + 1}"), Ok(Value::from(5i64)));
        assert!(reason(eval("${1 / 0}")).contains("by zero"));
        assert!(reason(eval("${1 % 0}")).contains("by zero"));
        assert!(reason(eval("${9223372036854775807 + 1}")).contains("overflow"));
    }

    #[test]
    fn comparisons_and_logic() {
        assert_eq!(eval("${var.instance_count >= 3}"), Ok(Value::from(true)));
        assert_eq!(eval("${var.region == \"us-east-1\"}"), Ok(Value::from(true)));
        assert_eq!(eval("${3 == 3.0}"), Ok(Value::from(true)));
        assert_eq!(eval("${var.enabled && !false}"), Ok(Value::from(true)));
        assert!(reason(eval("${var.region < 2}")).contains("requires numbers"));
    }

    #[test]
    fn short_circuit_and_lazy_branches() {
        assert_eq!(eval("${true || var.missing}"), Ok(Value::from(true)));
        assert_eq!(eval("${false && var.missing}"), Ok(Value::from(false)));
        assert_eq!(
            eval("${var.instance_count > 1 ? \"multi\" : var.missing}"),
            Ok(Value::from("multi"))
        );
        assert!(reason(eval("${var.region ? 1 : 2}")).contains("expected a bool"));
    }

    #[test]
    fn references() {
        assert_eq!(
            eval("${var.missing}"),
            Err(EvaluationError::UnresolvedReference {
                expr: "var.missing".to_string(),
                context: "test".to_string()
            })
        );
        assert_eq!(
            eval("${var.settings.missing}"),
            Err(EvaluationError::UnresolvedReference {
                expr: "var.settings.missing".to_string(),
                context: "test".to_string()
            })
        );
        assert_eq!(
            eval("${aws_instance.web.id}"),
            Err(EvaluationError::DynamicValueDetected {
                expr: "aws_instance.web.id".to_string(),
                context: "test".to_string()
            })
        );
        assert!(matches!(
            eval("${data.aws_ami.ubuntu.id}"),
            Err(EvaluationError::DynamicValueDetected { .. })
        ));
        assert!(matches!(
            eval("${module.vpc.id}"),
            Err(EvaluationError::DynamicValueDetected { .. })
        ));
        assert!(matches!(
            eval("${count.index}"),
            Err(EvaluationError::UnresolvedReference { .. })
        ));
        assert!(matches!(
            eval("${path.module}"),
            Err(EvaluationError::InvalidExpression { .. })
        ));
    }

    #[test]
    fn indexing() {
        assert_eq!(eval("${var.sizes[1]}"), Ok(Value::from("large")));
        assert_eq!(eval("${var.settings[\"tier\"]}"), Ok(Value::from("gold")));
        assert_eq!(eval("${[1, 2, 3][0]}"), Ok(Value::from(1i64)));
        assert!(reason(eval("${var.sizes[2]}")).contains("out of range"));
        assert!(reason(eval("${var.region[0]}")).contains("cannot index"));
    }

    #[test]
    fn functions() {
        assert_eq!(eval("${length(var.sizes)}"), Ok(Value::from(2i64)));
        assert_eq!(
            eval("${concat(var.sizes, [\"xl\"])}"),
            Ok(Value::from(vec!["small", "large", "xl"]))
        );
        assert!(reason(eval("${upper(var.region)}")).contains("unsupported function"));
    }

    #[test]
    fn collections_are_evaluated_recursively() {
        let context = context();
        let raw = RawExpr::Map(IndexMap::from([
            ("Name".to_string(), RawExpr::Text("web-${local.env}".to_string())),
            (
                "ports".to_string(),
                RawExpr::List(vec![
                    RawExpr::Number(Number::Integer(80)),
                    RawExpr::Text("${var.instance_count}".to_string()),
                ]),
            ),
        ]));
        assert_eq!(
            Evaluator::new(&context).evaluate(&raw, "tags"),
            Ok(Value::from(IndexMap::from([
                ("Name", Value::from("web-prod")),
                ("ports", Value::from(vec![Value::from(80i64), Value::from(3i64)])),
            ])))
        );
    }

    #[test]
    fn duplicate_map_keys() {
        let context = context();
        let raw = RawExpr::Map(IndexMap::from([
            ("${local.env}".to_string(), RawExpr::Number(Number::Integer(1))),
            ("prod".to_string(), RawExpr::Number(Number::Integer(2))),
        ]));
        assert_eq!(
            Evaluator::new(&context).evaluate(&raw, "tags"),
            Err(EvaluationError::InvalidExpression {
                expr: "prod".to_string(),
                reason: "duplicate map key `prod`".to_string(),
                context: "tags".to_string(),
            })
        );

        assert_eq!(
            reason(eval(r#"${{ (local.env) = 1, "prod" = 2 }}"#)),
            "duplicate map key `prod`"
        );
        assert_eq!(
            eval(r#"${{ (local.env) = 1, "dev" = 2 }}"#),
            Ok(Value::from(IndexMap::from([
                ("prod", Value::from(1i64)),
                ("dev", Value::from(2i64)),
            ])))
        );
    }

    #[test]
    fn syntax_errors_are_invalid_expressions() {
        assert!(matches!(
            eval("${var.a +}"),
            Err(EvaluationError::InvalidExpression { .. })
        ));
        assert!(matches!(
            eval("${var.a"),
            Err(EvaluationError::InvalidExpression { .. })
        ));
    }
}
