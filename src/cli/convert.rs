//! JSON -> Value conversion utilities

use crate::{Object, Value};

/// Convert serde_json::Value to a canonical Value. Object key order is kept.
pub fn json_to_value(v: serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(arr) => Value::array(arr.into_iter().map(json_to_value).collect()),
        serde_json::Value::Object(obj) => {
            Value::object(obj.into_iter().map(|(k, v)| (k, json_to_value(v))).collect::<Object>())
        }
    }
}

/// The JSON type name, for error messages.
pub(crate) fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_to_value_keeps_key_order() {
        let value = json_to_value(json!({"zeta": 1, "alpha": [true, null, "x"]}));
        let Value::Object(obj) = value else {
            panic!("expected object");
        };
        assert_eq!(obj.keys().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
        assert_eq!(obj.get("zeta"), Some(&Value::Number(1.0)));
    }
}
