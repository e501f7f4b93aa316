//! JSON serialization of expression values.
//!
//! Output preserves object insertion order and renders numbers the same way
//! string conversion does, so `toJson(1.5)` and `format('{0}', 1.5)` agree.
//!
//! # Features
//!
//! - **Compact output** via [`to_json()`] - no whitespace, used by the CLI
//! - **Pretty output** via [`to_json_pretty()`] - 2-space indentation, the `toJson` format
//! - **Memory accounting** via [`JsonPrinter::print_counted()`]
//!
//! # Examples
//!
//! ```
//! use pipeline_expr::{Object, Value};
//! use pipeline_expr::output::{to_json, to_json_pretty};
//!
//! let mut obj = Object::new();
//! obj.insert("os", "linux");
//! obj.insert("shards", Value::array(vec![Value::from(1), Value::from(2)]));
//! let value = Value::object(obj);
//!
//! assert_eq!(to_json(&value), r#"{"os":"linux","shards":[1,2]}"#);
//! assert_eq!(
//!     to_json_pretty(&value),
//!     "{\n  \"os\": \"linux\",\n  \"shards\": [\n    1,\n    2\n  ]\n}"
//! );
//! ```

use std::convert::Infallible;

use crate::evaluator::{EvaluationError, MemoryCounter};
use crate::value::{Object, Value, format_number};

pub struct JsonPrinter {
    pretty: bool,
}

impl JsonPrinter {
    pub fn new(pretty: bool) -> Self {
        JsonPrinter { pretty }
    }

    pub fn print(&self, value: &Value) -> String {
        let mut out = String::new();
        let Ok(()) = self.write_value::<Infallible>(value, 0, &mut |s| {
            out.push_str(s);
            Ok(())
        });
        out
    }

    /// Prints `value`, charging every chunk of output to `counter`.
    pub fn print_counted(&self, value: &Value, counter: &mut MemoryCounter<'_>) -> Result<String, EvaluationError> {
        let mut out = String::new();
        self.write_value(value, 0, &mut |s: &str| {
            counter.add(2 * s.chars().count())?;
            out.push_str(s);
            Ok(())
        })?;
        Ok(out)
    }

    fn write_value<E>(
        &self,
        value: &Value,
        indent: usize,
        emit: &mut impl FnMut(&str) -> Result<(), E>,
    ) -> Result<(), E> {
        match value {
            Value::Null => emit("null"),
            Value::Boolean(b) => emit(if *b { "true" } else { "false" }),
            Value::Number(n) => emit(&format_number(*n)),
            Value::String(s) => emit(&escape_string(s)),
            Value::Array(arr) => self.write_array(arr, indent, emit),
            Value::Object(obj) => self.write_object(obj, indent, emit),
        }
    }

    fn write_array<E>(
        &self,
        arr: &[Value],
        indent: usize,
        emit: &mut impl FnMut(&str) -> Result<(), E>,
    ) -> Result<(), E> {
        if arr.is_empty() {
            return emit("[]");
        }

        emit("[")?;
        for (i, item) in arr.iter().enumerate() {
            if i > 0 {
                emit(",")?;
            }
            self.newline(indent + 1, emit)?;
            self.write_value(item, indent + 1, emit)?;
        }
        self.newline(indent, emit)?;
        emit("]")
    }

    fn write_object<E>(
        &self,
        obj: &Object,
        indent: usize,
        emit: &mut impl FnMut(&str) -> Result<(), E>,
    ) -> Result<(), E> {
        if obj.is_empty() {
            return emit("{}");
        }

        emit("{")?;
        for (i, (key, value)) in obj.iter().enumerate() {
            if i > 0 {
                emit(",")?;
            }
            self.newline(indent + 1, emit)?;
            emit(&escape_string(key))?;
            emit(if self.pretty { ": " } else { ":" })?;
            self.write_value(value, indent + 1, emit)?;
        }
        self.newline(indent, emit)?;
        emit("}")
    }

    fn newline<E>(&self, level: usize, emit: &mut impl FnMut(&str) -> Result<(), E>) -> Result<(), E> {
        if self.pretty {
            emit("\n")?;
            emit(&"  ".repeat(level))?;
        }
        Ok(())
    }
}

/// Quotes and escapes a string as a JSON string literal.
fn escape_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Converts a Value to compact JSON.
pub fn to_json(value: &Value) -> String {
    JsonPrinter::new(false).print(value)
}

/// Converts a Value to pretty-printed JSON with 2-space indentation.
///
/// # Examples
///
/// ```
/// use pipeline_expr::Value;
/// use pipeline_expr::output::to_json_pretty;
///
/// assert_eq!(to_json_pretty(&Value::array(vec![])), "[]");
/// assert_eq!(to_json_pretty(&Value::from("a\"b")), r#""a\"b""#);
/// ```
pub fn to_json_pretty(value: &Value) -> String {
    JsonPrinter::new(true).print(value)
}
