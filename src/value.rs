use std::{
    fmt,
    sync::{Arc, LazyLock},
};

use regex::Regex;
use rust_decimal::Decimal;

use crate::trace::SecretMasker;

/// The kind of a canonical [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Array,
    Boolean,
    Null,
    Number,
    Object,
    String,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Array => "Array",
            ValueKind::Boolean => "Boolean",
            ValueKind::Null => "Null",
            ValueKind::Number => "Number",
            ValueKind::Object => "Object",
            ValueKind::String => "String",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A canonical value produced by expression evaluation.
///
/// Every number is an `f64`. Arrays and objects are shared behind an [`Arc`]:
/// under [`Value::abstract_equal`] two collections are only equal when they
/// are the same allocation, so cloning a value preserves its identity.
///
/// The derived `PartialEq` is structural and compares collections by
/// content. It exists for hosts and tests; expression `==` never uses it.
///
/// # Examples
///
/// ```
/// use pipeline_expr::{Object, Value};
///
/// let null = Value::Null;
/// let number = Value::from(42);
/// let string = Value::from("hello");
///
/// let array = Value::array(vec![Value::from(1), Value::from(2)]);
///
/// let mut obj = Object::new();
/// obj.insert("key", Value::from("value"));
/// let object = Value::object(obj);
/// assert_eq!(object.kind().to_string(), "Object");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null
    Null,

    /// Boolean (true/false)
    Boolean(bool),

    /// Double precision number
    Number(f64),

    /// UTF-8 string
    String(String),

    /// Read-only array of values
    Array(Arc<Vec<Value>>),

    /// Read-only object with string keys
    Object(Arc<Object>),
}

/// An insertion-ordered map with ordinal case-insensitive lookup.
///
/// Lookups prefer an exact key match and fall back to comparing keys
/// without regard to case, so `github.EVENT` finds the `event` property.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Object {
    entries: Vec<(String, Value)>,
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a property, replacing any existing property with the exact same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .or_else(|| self.entries.iter().find(|(k, _)| eq_ignore_case(k, key)))
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut obj = Object::new();
        for (k, v) in iter {
            obj.insert(k, v);
        }
        obj
    }
}

impl Value {
    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Arc::new(items))
    }

    pub fn object(obj: Object) -> Value {
        Value::Object(Arc::new(obj))
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
        }
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self, Value::Array(_) | Value::Object(_))
    }

    /// JavaScript-like falsiness. Collections are always truthy.
    pub fn is_falsy(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Boolean(b) => !*b,
            Value::Number(n) => *n == 0.0 || n.is_nan(),
            Value::String(s) => s.is_empty(),
            Value::Array(_) | Value::Object(_) => false,
        }
    }

    pub fn is_truthy(&self) -> bool {
        !self.is_falsy()
    }

    /// Follows the JavaScript `Number()` rules for primitives. Collections are NaN.
    pub fn convert_to_number(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => parse_number(s),
            Value::Array(_) | Value::Object(_) => f64::NAN,
        }
    }

    pub fn convert_to_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::Array(_) | Value::Object(_) => self.kind().to_string(),
        }
    }

    /// Abstract equality: JavaScript `==` except strings compare ordinal
    /// case-insensitive and collections are never coerced.
    pub fn abstract_equal(&self, right: &Value) -> bool {
        match coerce_types(Operand::from(self), Operand::from(right)) {
            (Operand::Null, Operand::Null) => true,
            (Operand::Number(l), Operand::Number(r)) => l == r,
            (Operand::String(l), Operand::String(r)) => eq_ignore_case(l, r),
            (Operand::Boolean(l), Operand::Boolean(r)) => l == r,
            (Operand::Array(l), Operand::Array(r)) => Arc::ptr_eq(l, r),
            (Operand::Object(l), Operand::Object(r)) => Arc::ptr_eq(l, r),
            _ => false,
        }
    }

    pub fn abstract_not_equal(&self, right: &Value) -> bool {
        !self.abstract_equal(right)
    }

    pub fn abstract_greater_than(&self, right: &Value) -> bool {
        match coerce_types(Operand::from(self), Operand::from(right)) {
            (Operand::Number(l), Operand::Number(r)) => l > r,
            (Operand::String(l), Operand::String(r)) => cmp_ignore_case(l, r).is_gt(),
            (Operand::Boolean(l), Operand::Boolean(r)) => l && !r,
            _ => false,
        }
    }

    pub fn abstract_greater_than_or_equal(&self, right: &Value) -> bool {
        self.abstract_equal(right) || self.abstract_greater_than(right)
    }

    pub fn abstract_less_than(&self, right: &Value) -> bool {
        match coerce_types(Operand::from(self), Operand::from(right)) {
            (Operand::Number(l), Operand::Number(r)) => l < r,
            (Operand::String(l), Operand::String(r)) => cmp_ignore_case(l, r).is_lt(),
            (Operand::Boolean(l), Operand::Boolean(r)) => !l && r,
            _ => false,
        }
    }

    pub fn abstract_less_than_or_equal(&self, right: &Value) -> bool {
        self.abstract_equal(right) || self.abstract_less_than(right)
    }
}

/// A borrowed view of a value while coercing operands for comparison.
#[derive(Clone, Copy)]
enum Operand<'a> {
    Null,
    Boolean(bool),
    Number(f64),
    String(&'a str),
    Array(&'a Arc<Vec<Value>>),
    Object(&'a Arc<Object>),
}

impl<'a> From<&'a Value> for Operand<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Null => Operand::Null,
            Value::Boolean(b) => Operand::Boolean(*b),
            Value::Number(n) => Operand::Number(*n),
            Value::String(s) => Operand::String(s),
            Value::Array(a) => Operand::Array(a),
            Value::Object(o) => Operand::Object(o),
        }
    }
}

impl Operand<'_> {
    fn kind(&self) -> ValueKind {
        match self {
            Operand::Null => ValueKind::Null,
            Operand::Boolean(_) => ValueKind::Boolean,
            Operand::Number(_) => ValueKind::Number,
            Operand::String(_) => ValueKind::String,
            Operand::Array(_) => ValueKind::Array,
            Operand::Object(_) => ValueKind::Object,
        }
    }

    fn to_number(self) -> f64 {
        match self {
            Operand::Null => 0.0,
            Operand::Boolean(b) => f64::from(u8::from(b)),
            Operand::Number(n) => n,
            Operand::String(s) => parse_number(s),
            Operand::Array(_) | Operand::Object(_) => f64::NAN,
        }
    }
}

fn coerce_types<'a>(mut left: Operand<'a>, mut right: Operand<'a>) -> (Operand<'a>, Operand<'a>) {
    loop {
        match (left.kind(), right.kind()) {
            (l, r) if l == r => break,
            (ValueKind::Number, ValueKind::String) => right = Operand::Number(right.to_number()),
            (ValueKind::String, ValueKind::Number) => left = Operand::Number(left.to_number()),
            (ValueKind::Boolean | ValueKind::Null, _) => left = Operand::Number(left.to_number()),
            (_, ValueKind::Boolean | ValueKind::Null) => right = Operand::Number(right.to_number()),
            _ => break,
        }
    }
    (left, right)
}

fn fold(s: &str) -> impl Iterator<Item = char> + '_ {
    s.chars().flat_map(char::to_uppercase)
}

/// Ordinal comparison ignoring case.
pub(crate) fn eq_ignore_case(left: &str, right: &str) -> bool {
    left == right || fold(left).eq(fold(right))
}

pub(crate) fn cmp_ignore_case(left: &str, right: &str) -> std::cmp::Ordering {
    fold(left).cmp(fold(right))
}

pub(crate) fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_uppercase().contains(&needle.to_uppercase())
}

pub(crate) fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.to_uppercase().starts_with(&prefix.to_uppercase())
}

pub(crate) fn ends_with_ignore_case(s: &str, suffix: &str) -> bool {
    s.to_uppercase().ends_with(&suffix.to_uppercase())
}

static DECIMAL_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:[eE][+-]?[0-9]+)?$")
        .unwrap_or_else(|e| unreachable!("invalid number grammar: {e}"))
});

/// Parses a numeric string the way JavaScript's `Number()` does for the
/// literal forms workflows use. Unparseable input yields NaN.
///
/// Leading and trailing whitespace is ignored, the empty string is zero, and
/// `0x`/`0o` prefixes select hexadecimal and octal 32-bit integers.
pub fn parse_number(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }

    if DECIMAL_NUMBER.is_match(s) {
        return s.parse::<f64>().unwrap_or(f64::NAN);
    }

    if let Some(hex) = s.strip_prefix("0x")
        && !hex.is_empty()
        && hex.chars().all(|c| c.is_ascii_hexdigit())
    {
        return u32::from_str_radix(hex, 16).map_or(f64::NAN, |n| f64::from(n as i32));
    }

    if let Some(octal) = s.strip_prefix("0o")
        && !octal.is_empty()
        && octal.chars().all(|c| ('0'..='7').contains(&c))
    {
        return u32::from_str_radix(octal, 8).map_or(f64::NAN, |n| f64::from(n as i32));
    }

    match s {
        "Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ => f64::NAN,
    }
}

const SIGNIFICANT_DIGITS: i32 = 15;

/// Formats a number with 15 significant digits, switching to scientific
/// notation (`1.5E+20`) when the exponent is -5 or below, or at least 15.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }

    let scientific = format!("{:.*e}", (SIGNIFICANT_DIGITS - 1) as usize, n);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return n.to_string();
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return n.to_string();
    };

    if exponent <= -5 || exponent >= SIGNIFICANT_DIGITS {
        let mantissa = if mantissa.contains('.') {
            mantissa.trim_end_matches('0').trim_end_matches('.')
        } else {
            mantissa
        };
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{mantissa}E{sign}{:02}", exponent.unsigned_abs());
    }

    match Decimal::from_scientific(&scientific) {
        Ok(d) => d.normalize().to_string(),
        Err(_) => n.to_string(),
    }
}

/// Renders a value for trace output and realized expressions.
///
/// Strings are masked before quoting, so a secret never reaches the trace
/// even when escaping would have altered it.
pub fn format_value(value: &Value, masker: Option<&dyn SecretMasker>) -> String {
    let mask = |s: &str| match masker {
        Some(m) => m.mask_secrets(s),
        None => s.to_string(),
    };

    match value {
        Value::Null => "null".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Number(n) => mask(&format_number(*n)),
        Value::String(s) => format!("'{}'", mask(s).replace('\'', "''")),
        Value::Array(_) | Value::Object(_) => value.kind().to_string(),
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl From<Object> for Value {
    fn from(obj: Object) -> Self {
        Value::object(obj)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        crate::cli::json_to_value(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_and_expression_equality_differ() {
        let left = Value::array(vec![Value::from(1)]);
        let right = Value::array(vec![Value::from(1)]);
        assert_eq!(left, right);
        assert!(!left.abstract_equal(&right));
        assert!(left.abstract_equal(&left.clone()));
    }

    #[test]
    fn test_parse_number_forms() {
        assert_eq!(parse_number(""), 0.0);
        assert_eq!(parse_number("   "), 0.0);
        assert_eq!(parse_number(" 12 "), 12.0);
        assert_eq!(parse_number("-.5"), -0.5);
        assert_eq!(parse_number("+1e3"), 1000.0);
        assert_eq!(parse_number("1."), 1.0);
        assert_eq!(parse_number("0xff"), 255.0);
        assert_eq!(parse_number("0o17"), 15.0);
        assert_eq!(parse_number("-Infinity"), f64::NEG_INFINITY);
        assert!(parse_number("1.2.3").is_nan());
        assert!(parse_number("abc").is_nan());
        assert!(parse_number("0x").is_nan());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(0.1 + 0.2), "0.3");
        assert_eq!(format_number(123456789.0), "123456789");
        assert_eq!(format_number(1e20), "1E+20");
        assert_eq!(format_number(1.5e-7), "1.5E-07");
        assert_eq!(format_number(0.0001), "0.0001");
        assert_eq!(format_number(0.00001), "1E-05");
        assert_eq!(format_number(0.000012345), "1.2345E-05");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_object_lookup_ignores_case() {
        let obj: Object = [("Event", Value::from(1)), ("event", Value::from(2))]
            .into_iter()
            .collect();
        assert_eq!(obj.get("event"), Some(&Value::from(2)));
        assert_eq!(obj.get("EVENT"), Some(&Value::from(1)));
        assert_eq!(obj.get("missing"), None);
    }

    #[test]
    fn test_boolean_ordering_is_not_numeric() {
        let t = Value::Boolean(true);
        let f = Value::Boolean(false);
        assert!(t.abstract_greater_than(&f));
        assert!(f.abstract_less_than(&t));
        assert!(!t.abstract_greater_than(&t));
        assert!(t.abstract_greater_than_or_equal(&t));
    }

    #[test]
    fn test_collections_compare_by_identity() {
        let a = Value::array(vec![]);
        let b = Value::array(vec![]);
        assert!(a.abstract_equal(&a.clone()));
        assert!(!a.abstract_equal(&b));
        assert!(!a.abstract_equal(&Value::from(0)));
    }
}
