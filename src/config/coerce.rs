//! Coercion of overlay strings to the type of the value they replace.
//!
//! The table is keyed by the [`ValueKind`] of the existing value. Each entry
//! is a pure `&str -> ConfigResult<Value>` function.

use super::value::{Value, ValueKind};
use crate::error::{ConfigError, ConfigResult};

/// Raw value proposed by an environment variable or a command line switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// A single string.
    Text(String),
    /// A switch given without any value.
    Flag,
    /// A switch followed by more than one value.
    Many(Vec<String>),
}

impl RawValue {
    /// Unwrap single-value lists; no values is a flag.
    pub fn from_values(values: &[String]) -> Self {
        match values {
            [] => RawValue::Flag,
            [one] => RawValue::Text(one.clone()),
            many => RawValue::Many(many.to_vec()),
        }
    }

    /// The value a brand new key takes: string, `true` or list of strings.
    pub fn untyped(self) -> Value {
        match self {
            RawValue::Text(s) => Value::Str(s),
            RawValue::Flag => Value::Bool(true),
            RawValue::Many(items) => Value::List(items.into_iter().map(Value::Str).collect()),
        }
    }
}

/// Pure conversion from overlay text to one kind of value.
pub type Coercer = fn(&str) -> ConfigResult<Value>;

/// The coercion used when overlaying a value of `kind`.
pub fn coercer(kind: ValueKind) -> Coercer {
    match kind {
        ValueKind::Bool => to_bool,
        ValueKind::Int => to_int,
        ValueKind::Float => to_float,
        ValueKind::Str | ValueKind::Null => to_str,
        ValueKind::List => to_list,
        ValueKind::Node => to_node,
    }
}

/// Coerce `raw` against `existing`; with no existing value the raw form is kept.
pub fn coerce(raw: RawValue, existing: Option<&Value>) -> ConfigResult<Value> {
    let Some(existing) = existing else {
        return Ok(raw.untyped());
    };
    let kind = existing.kind();

    match raw {
        RawValue::Text(text) => coercer(kind)(&text),
        // a flag is `true`; numbers take its numeric value
        RawValue::Flag => match kind {
            ValueKind::Null => Ok(Value::Bool(true)),
            ValueKind::Int => Ok(Value::Int(1)),
            ValueKind::Float => Ok(Value::Float(1.0)),
            kind => coercer(kind)("true"),
        },
        RawValue::Many(items) => {
            let element_kind = match existing {
                Value::List(current) => current.first().map_or(ValueKind::Str, Value::kind),
                Value::Node(_) => return Err(ConfigError::coercion(items.join(" "), kind)),
                other => other.kind(),
            };
            let convert = coercer(element_kind);
            items
                .iter()
                .map(|item| convert(item))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Value::List)
        }
    }
}

/// `"0"` and `"false"` (any case) are false, anything else is true.
fn to_bool(text: &str) -> ConfigResult<Value> {
    let lowered = text.to_lowercase();
    Ok(Value::Bool(!matches!(lowered.as_str(), "0" | "false")))
}

fn to_int(text: &str) -> ConfigResult<Value> {
    text.trim()
        .parse::<i64>()
        .map(Value::Int)
        .map_err(|_| ConfigError::coercion(text, ValueKind::Int))
}

fn to_float(text: &str) -> ConfigResult<Value> {
    text.trim()
        .parse::<f64>()
        .map(Value::Float)
        .map_err(|_| ConfigError::coercion(text, ValueKind::Float))
}

fn to_str(text: &str) -> ConfigResult<Value> {
    Ok(Value::Str(text.to_string()))
}

/// A single string over a list becomes a one-element list.
fn to_list(text: &str) -> ConfigResult<Value> {
    Ok(Value::List(vec![Value::Str(text.to_string())]))
}

fn to_node(text: &str) -> ConfigResult<Value> {
    Err(ConfigError::coercion(text, ValueKind::Node))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn text(s: &str) -> RawValue {
        RawValue::Text(s.to_string())
    }

    #[test]
    fn test_bool_coercion() {
        let existing = Value::Bool(true);
        for falsy in ["0", "false", "FALSE", "False"] {
            assert_eq!(coerce(text(falsy), Some(&existing)).unwrap(), Value::Bool(false));
        }
        for truthy in ["1", "yes", "no", ""] {
            assert_eq!(coerce(text(truthy), Some(&existing)).unwrap(), Value::Bool(true));
        }
    }

    #[test]
    fn test_int_coercion() {
        let existing = Value::Int(3);
        assert_eq!(coerce(text("10"), Some(&existing)).unwrap(), Value::Int(10));
        assert_eq!(coerce(text(" -4 "), Some(&existing)).unwrap(), Value::Int(-4));

        let err = coerce(text("abc"), Some(&existing)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Coercion);
        assert!(err.to_string().contains("abc"));
        assert!(err.to_string().contains("int"));
    }

    #[test]
    fn test_float_coercion() {
        let existing = Value::Float(1.5);
        assert_eq!(coerce(text("10"), Some(&existing)).unwrap(), Value::Float(10.0));
        assert!(coerce(text("ten"), Some(&existing)).is_err());
    }

    #[test]
    fn test_untyped_when_no_existing_value() {
        assert_eq!(coerce(text("x"), None).unwrap(), Value::from("x"));
        assert_eq!(coerce(RawValue::Flag, None).unwrap(), Value::Bool(true));
        assert_eq!(
            coerce(RawValue::Many(vec!["a".into(), "b".into()]), None).unwrap(),
            Value::List(vec![Value::from("a"), Value::from("b")])
        );
    }

    #[test]
    fn test_flag_against_existing_types() {
        assert_eq!(
            coerce(RawValue::Flag, Some(&Value::Bool(false))).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            coerce(RawValue::Flag, Some(&Value::from("x"))).unwrap(),
            Value::from("true")
        );
        assert_eq!(coerce(RawValue::Flag, Some(&Value::Int(8))).unwrap(), Value::Int(1));
        assert_eq!(
            coerce(RawValue::Flag, Some(&Value::Float(0.5))).unwrap(),
            Value::Float(1.0)
        );
        assert!(coerce(RawValue::Flag, Some(&Value::Node(Default::default()))).is_err());
    }

    #[test]
    fn test_many_keeps_element_type() {
        let existing = Value::List(vec![Value::Int(1), Value::Int(2)]);
        let raw = RawValue::Many(vec!["5".into(), "6".into(), "7".into()]);
        assert_eq!(
            coerce(raw, Some(&existing)).unwrap(),
            Value::List(vec![Value::Int(5), Value::Int(6), Value::Int(7)])
        );

        let raw = RawValue::Many(vec!["5".into(), "x".into()]);
        assert!(coerce(raw, Some(&existing)).is_err());
    }

    #[test]
    fn test_text_over_list_and_node() {
        let list = Value::List(vec![Value::from("a")]);
        assert_eq!(
            coerce(text("b"), Some(&list)).unwrap(),
            Value::List(vec![Value::from("b")])
        );

        let node = Value::Node(crate::config::ConfigNode::new());
        assert_eq!(
            coerce(text("b"), Some(&node)).unwrap_err().code(),
            ErrorCode::Coercion
        );
    }

    #[test]
    fn test_from_values() {
        assert_eq!(RawValue::from_values(&[]), RawValue::Flag);
        assert_eq!(RawValue::from_values(&["a".into()]), text("a"));
        assert_eq!(
            RawValue::from_values(&["a".into(), "b".into()]),
            RawValue::Many(vec!["a".into(), "b".into()])
        );
    }
}
