//! value representation
//!
//! Evaluation produces the following data types
//! - null
//! - boolean (true/false)
//! - number, either an integer (i64) or a decimal (f64)
//! - text (utf-8)
//! - list (ordered sequence of values)
//! - map (order-preserving "dictionary", where the key is of type string)
//!
//! Additionally:
//! - integers and decimals compare by value, so `1 == 1.0`
//! - text that looks like a number converts to a number where a number is required
//! - text `"true"`/`"false"` converts to a boolean where a boolean is required
//!
//! A [Value] never contains unevaluated expression text. Interpolation sequences that made it
//! into a value are plain characters.
use indexmap::IndexMap;
use serde::{
    ser::{SerializeMap, SerializeSeq},
    Serializer,
};
use std::fmt;

/// All possible value types
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

/// Numeric value. Integers stay integers until an operation requires a fraction.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Integer(i64),
    Decimal(f64),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Text(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Numeric view of the value, converting numeric text
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Number(number) => Some(*number),
            Value::Text(text) => Number::parse(text),
            _ => None,
        }
    }

    /// Boolean view of the value, converting `"true"` and `"false"`
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            Value::Text(text) if text == "true" => Some(true),
            Value::Text(text) if text == "false" => Some(false),
            _ => None,
        }
    }

    /// The text spliced into a string template, if this value has one
    pub fn to_template_text(&self) -> Option<String> {
        match self {
            Value::Bool(value) => Some(value.to_string()),
            Value::Number(number) => Some(number.to_string()),
            Value::Text(text) => Some(text.clone()),
            Value::Null | Value::List(_) | Value::Map(_) => None,
        }
    }
}

impl Number {
    /// Parses numeric text. Only plain decimal notation is accepted (no `inf`, `NaN`, ...).
    pub fn parse(text: &str) -> Option<Number> {
        let text = text.trim();
        let digits = text.strip_prefix('-').unwrap_or(text);
        if !digits.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }

        if !text.contains(['.', 'e', 'E']) {
            if let Ok(int) = text.parse::<i64>() {
                return Some(Number::Integer(int));
            }
        }

        text.parse::<f64>()
            .ok()
            .filter(|float| float.is_finite())
            .map(Number::Decimal)
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Integer(int) => *int as f64,
            Number::Decimal(float) => *float,
        }
    }

    /// The value as a whole number, if it has no fractional part
    pub fn as_whole(&self) -> Option<i64> {
        match self {
            Number::Integer(int) => Some(*int),
            Number::Decimal(float) if float.fract() == 0.0 && float.abs() < i64::MAX as f64 => {
                Some(*float as i64)
            }
            Number::Decimal(_) => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.as_f64() == 0.0
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => a == b,
            _ => self.as_f64() == other.as_f64(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Integer(int) => write!(f, "{int}"),
            Number::Decimal(float) => write!(f, "{float}"),
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(Number::Integer(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(Number::Decimal(value))
    }
}

impl From<Number> for Value {
    fn from(value: Number) -> Self {
        Value::Number(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::List(value.into_iter().map(Into::into).collect())
    }
}

impl<K: ToString, V: Into<Value>> From<IndexMap<K, V>> for Value {
    fn from(value: IndexMap<K, V>) -> Self {
        Value::Map(
            value
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.into()))
                .collect(),
        )
    }
}

impl TryFrom<hcl::Number> for Number {
    type Error = NotLiteral;

    fn try_from(value: hcl::Number) -> Result<Self, Self::Error> {
        if let Some(int) = value.as_i64() {
            return Ok(Number::Integer(int));
        }

        value
            .as_f64()
            .filter(|float| float.is_finite())
            .map(Number::Decimal)
            .ok_or_else(|| NotLiteral::new(value.to_string()))
    }
}

/// Literal HCL data converts to a [Value]; anything that needs evaluation does not.
impl TryFrom<hcl::Expression> for Value {
    type Error = NotLiteral;

    fn try_from(value: hcl::Expression) -> Result<Self, Self::Error> {
        use hcl::expr::{Operation, UnaryOp, UnaryOperator};
        use hcl::Expression;

        match value {
            Expression::Null => Ok(Value::Null),
            Expression::Bool(bool) => Ok(bool.into()),
            Expression::Number(num) => Number::try_from(num).map(Value::Number),
            Expression::String(s) => Ok(s.into()),
            Expression::Array(array) => array
                .into_iter()
                .map(Value::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Expression::Object(object) => object
                .into_iter()
                .map(|(key, value)| Ok((object_key_literal(key)?, Value::try_from(value)?)))
                .collect::<Result<IndexMap<_, _>, NotLiteral>>()
                .map(Value::Map),
            Expression::Parenthesis(inner) => Value::try_from(*inner),
            Expression::Operation(operation) => match *operation {
                Operation::Unary(UnaryOp {
                    operator: UnaryOperator::Neg,
                    expr: Expression::Number(num),
                }) => match Number::try_from(num)? {
                    Number::Integer(int) => Ok(Value::from(-int)),
                    Number::Decimal(float) => Ok(Value::from(-float)),
                },
                other => Err(NotLiteral::new(
                    Expression::Operation(Box::new(other)).to_string(),
                )),
            },
            other => Err(NotLiteral::new(other.to_string())),
        }
    }
}

fn object_key_literal(key: hcl::ObjectKey) -> Result<String, NotLiteral> {
    match key {
        hcl::ObjectKey::Identifier(ident) => Ok(ident.to_string()),
        hcl::ObjectKey::Expression(hcl::Expression::String(s)) => Ok(s),
        #[allow(unreachable_patterns)]
        other => Err(NotLiteral::new(other.to_string())),
    }
}

/// An HCL expression that is not plain data
#[derive(thiserror::Error, Debug, Clone, PartialEq, derive_new::new)]
#[error("`{expr}` is not a literal value")]
pub struct NotLiteral {
    pub expr: String,
}

impl serde::ser::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(value) => serializer.serialize_bool(*value),
            Value::Number(Number::Integer(value)) => serializer.serialize_i64(*value),
            Value::Number(Number::Decimal(value)) => serializer.serialize_f64(*value),
            Value::Text(value) => serializer.serialize_str(value),
            Value::List(value) => {
                let mut ser = serializer.serialize_seq(Some(value.len()))?;
                for element in value {
                    ser.serialize_element(element)?;
                }
                ser.end()
            }
            Value::Map(value) => {
                let mut ser = serializer.serialize_map(Some(value.len()))?;
                for (element_key, element_value) in value {
                    ser.serialize_entry(element_key, element_value)?;
                }
                ser.end()
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn literal(source: &str) -> Result<Value, NotLiteral> {
        let expr: hcl_edit::expr::Expression = source.parse().expect("expression must parse");
        Value::try_from(hcl::Expression::from(expr))
    }

    #[test]
    fn numbers_compare_by_value() {
        assert_eq!(Value::from(3i64), Value::from(3.0));
        assert_ne!(Value::from(3i64), Value::from("3"));
    }

    #[test]
    fn parse_number() {
        assert_eq!(Number::parse("42"), Some(Number::Integer(42)));
        assert_eq!(Number::parse("-1.5"), Some(Number::Decimal(-1.5)));
        assert_eq!(Number::parse("inf"), None);
        assert_eq!(Number::parse("NaN"), None);
        assert_eq!(Number::parse("web"), None);
    }

    #[test]
    fn literal_conversion() {
        assert_eq!(literal("[1, true, \"a\"]").unwrap(), Value::from(vec![
            Value::from(1i64),
            Value::from(true),
            Value::from("a")
        ]));
        assert_eq!(literal("-3").unwrap(), Value::from(-3i64));

        let map = literal("{ size = 10, \"kind\" = \"gp3\" }").unwrap();
        let Value::Map(map) = map else {
            panic!("expected map");
        };
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["size", "kind"]);
    }

    #[test]
    fn non_literal_conversion_fails() {
        assert!(literal("var.region").is_err());
        assert!(literal("length(local.items)").is_err());
    }

    #[test]
    fn serialize() {
        let value = Value::from(IndexMap::from([
            ("a", Value::Null),
            ("b", Value::from(2.5)),
        ]));
        assert_eq!(
            serde_json::to_string(&value).unwrap(),
            r#"{"a":null,"b":2.5}"#
        );
    }
}
