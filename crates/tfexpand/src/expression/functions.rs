//! built-in functions
//!
//! Only a closed set is available. Anything else is rejected by name.
use crate::value::{Number, Value};
use std::cmp::Ordering;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    /// Number of elements of a list or map, number of characters of a string
    Length,
    /// Smallest of one or more numbers
    Min,
    /// Largest of one or more numbers
    Max,
    /// Joins lists in order
    Concat,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("unsupported function `{0}`")]
pub struct UnknownFunction(pub String);

impl FromStr for Function {
    type Err = UnknownFunction;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "length" => Ok(Function::Length),
            "min" => Ok(Function::Min),
            "max" => Ok(Function::Max),
            "concat" => Ok(Function::Concat),
            other => Err(UnknownFunction(other.to_string())),
        }
    }
}

impl Function {
    pub fn name(&self) -> &'static str {
        match self {
            Function::Length => "length",
            Function::Min => "min",
            Function::Max => "max",
            Function::Concat => "concat",
        }
    }

    /// Applies the function. The error is a human readable reason.
    pub fn call(&self, args: Vec<Value>) -> Result<Value, String> {
        match self {
            Function::Length => {
                let [arg] = args.as_slice() else {
                    return Err(format!("length() takes 1 argument, got {}", args.len()));
                };
                let length = match arg {
                    Value::List(items) => items.len(),
                    Value::Map(map) => map.len(),
                    Value::Text(text) => text.chars().count(),
                    other => {
                        return Err(format!("length() of a {} is undefined", other.type_name()))
                    }
                };
                i64::try_from(length)
                    .map(Value::from)
                    .map_err(|_| "length out of range".to_string())
            }
            Function::Min => self.extreme(args, Ordering::Less),
            Function::Max => self.extreme(args, Ordering::Greater),
            Function::Concat => {
                let mut joined = vec![];
                for arg in args {
                    let Value::List(items) = arg else {
                        return Err(format!(
                            "concat() arguments must be lists, got {}",
                            arg.type_name()
                        ));
                    };
                    joined.extend(items);
                }
                Ok(Value::List(joined))
            }
        }
    }

    fn extreme(&self, args: Vec<Value>, wanted: Ordering) -> Result<Value, String> {
        let mut best: Option<Number> = None;

        for arg in &args {
            let number = arg.as_number().ok_or_else(|| {
                format!(
                    "{}() arguments must be numbers, got {}",
                    self.name(),
                    arg.type_name()
                )
            })?;

            best = match best {
                Some(current) if compare(number, current) != wanted => Some(current),
                _ => Some(number),
            };
        }

        best.map(Value::Number)
            .ok_or_else(|| format!("{}() requires at least 1 argument", self.name()))
    }
}

/// Total order on numbers. Both sides are finite.
pub(crate) fn compare(a: Number, b: Number) -> Ordering {
    match (a, b) {
        (Number::Integer(a), Number::Integer(b)) => a.cmp(&b),
        _ => a.as_f64().total_cmp(&b.as_f64()),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn call(name: &str, args: Vec<Value>) -> Result<Value, String> {
        name.parse::<Function>().expect("known function").call(args)
    }

    #[test]
    fn unknown_function() {
        assert_eq!(
            "upper".parse::<Function>(),
            Err(UnknownFunction("upper".to_string()))
        );
    }

    #[test]
    fn length() {
        assert_eq!(
            call("length", vec![Value::from(vec![1i64, 2, 3])]),
            Ok(Value::from(3i64))
        );
        assert_eq!(call("length", vec![Value::from("héllo")]), Ok(Value::from(5i64)));
        assert!(call("length", vec![Value::from(1i64)]).is_err());
        assert!(call("length", vec![]).is_err());
    }

    #[test]
    fn min_max() {
        let args = vec![Value::from(-1i64), Value::from(2.5), Value::from("7")];
        assert_eq!(call("min", args.clone()), Ok(Value::from(-1i64)));
        assert_eq!(call("max", args), Ok(Value::from(7i64)));
        assert!(call("max", vec![]).is_err());
        assert!(call("min", vec![Value::from(true)]).is_err());
    }

    #[test]
    fn concat() {
        assert_eq!(
            call(
                "concat",
                vec![
                    Value::from(vec!["a"]),
                    Value::from(Vec::<Value>::new()),
                    Value::from(vec!["b", "c"])
                ]
            ),
            Ok(Value::from(vec!["a", "b", "c"]))
        );
        assert!(call("concat", vec![Value::from("a")]).is_err());
    }
}
