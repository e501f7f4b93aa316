//! Functions and named-values available to the parser.

use std::{collections::HashMap, fmt, sync::Arc};

use crate::evaluator::{Arguments, EvaluationContext, EvaluationError};
use crate::functions::Builtin;
use crate::value::Value;

/// A host-supplied function.
///
/// Parameters are evaluated on demand through [`Arguments::evaluate`], so an
/// implementation may skip parameters it does not need.
pub trait ExpressionFunction: Send + Sync {
    fn evaluate(&self, args: &Arguments<'_>, context: &mut EvaluationContext<'_>) -> Result<Value, EvaluationError>;
}

impl<F> ExpressionFunction for F
where
    F: Fn(&Arguments<'_>, &mut EvaluationContext<'_>) -> Result<Value, EvaluationError> + Send + Sync,
{
    fn evaluate(&self, args: &Arguments<'_>, context: &mut EvaluationContext<'_>) -> Result<Value, EvaluationError> {
        self(args, context)
    }
}

/// A host-supplied named-value such as `github` or `env`.
pub trait NamedValueProvider: Send + Sync {
    fn evaluate(&self, context: &mut EvaluationContext<'_>) -> Result<Value, EvaluationError>;
}

impl<F> NamedValueProvider for F
where
    F: Fn(&mut EvaluationContext<'_>) -> Result<Value, EvaluationError> + Send + Sync,
{
    fn evaluate(&self, context: &mut EvaluationContext<'_>) -> Result<Value, EvaluationError> {
        self(context)
    }
}

/// A constant named-value.
impl NamedValueProvider for Value {
    fn evaluate(&self, _context: &mut EvaluationContext<'_>) -> Result<Value, EvaluationError> {
        Ok(self.clone())
    }
}

#[derive(Clone)]
pub(crate) enum FunctionImpl {
    Builtin(Builtin),
    Extension(Arc<dyn ExpressionFunction>),
}

/// Describes a function: its name, accepted parameter count and implementation.
#[derive(Clone)]
pub struct FunctionInfo {
    name: String,
    min_parameters: usize,
    max_parameters: usize,
    pub(crate) implementation: FunctionImpl,
}

impl FunctionInfo {
    pub fn new(
        name: impl Into<String>,
        min_parameters: usize,
        max_parameters: usize,
        implementation: impl ExpressionFunction + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            min_parameters,
            max_parameters,
            implementation: FunctionImpl::Extension(Arc::new(implementation)),
        }
    }

    pub(crate) fn builtin(name: &str, min_parameters: usize, max_parameters: usize, builtin: Builtin) -> Self {
        Self {
            name: name.to_string(),
            min_parameters,
            max_parameters,
            implementation: FunctionImpl::Builtin(builtin),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_parameters(&self) -> usize {
        self.min_parameters
    }

    pub fn max_parameters(&self) -> usize {
        self.max_parameters
    }
}

impl fmt::Debug for FunctionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionInfo")
            .field("name", &self.name)
            .field("min_parameters", &self.min_parameters)
            .field("max_parameters", &self.max_parameters)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct NamedValueInfo {
    name: String,
    pub(crate) provider: Arc<dyn NamedValueProvider>,
}

impl NamedValueInfo {
    pub fn new(name: impl Into<String>, provider: impl NamedValueProvider + 'static) -> Self {
        Self { name: name.into(), provider: Arc::new(provider) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for NamedValueInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedValueInfo").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Case-insensitive lookup key.
fn key(name: &str) -> String {
    name.to_uppercase()
}

/// An immutable, case-insensitive table of functions.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionInfo>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in functions every expression can call.
    ///
    /// | function     | parameters |
    /// |--------------|------------|
    /// | `contains`   | 2          |
    /// | `endsWith`   | 2          |
    /// | `format`     | 1 to 255   |
    /// | `join`       | 1 to 2     |
    /// | `startsWith` | 2          |
    /// | `toJson`     | 1          |
    /// | `fromJson`   | 1          |
    ///
    /// The legacy functional operators `and`, `or`, `not`, `eq`, `ne`, `gt`,
    /// `ge`, `lt` and `le` are also registered.
    pub fn well_known() -> Self {
        use crate::ast::Operator;

        [
            FunctionInfo::builtin("contains", 2, 2, Builtin::Contains),
            FunctionInfo::builtin("endsWith", 2, 2, Builtin::EndsWith),
            FunctionInfo::builtin("format", 1, 255, Builtin::Format),
            FunctionInfo::builtin("join", 1, 2, Builtin::Join),
            FunctionInfo::builtin("startsWith", 2, 2, Builtin::StartsWith),
            FunctionInfo::builtin("toJson", 1, 1, Builtin::ToJson),
            FunctionInfo::builtin("convertToJson", 1, 1, Builtin::ToJson),
            FunctionInfo::builtin("fromJson", 1, 1, Builtin::FromJson),
            FunctionInfo::builtin("and", 2, 255, Builtin::And),
            FunctionInfo::builtin("or", 2, 255, Builtin::Or),
            FunctionInfo::builtin("not", 1, 1, Builtin::Not),
            FunctionInfo::builtin("eq", 2, 2, Builtin::Compare(Operator::Equal)),
            FunctionInfo::builtin("ne", 2, 2, Builtin::Compare(Operator::NotEqual)),
            FunctionInfo::builtin("gt", 2, 2, Builtin::Compare(Operator::GreaterThan)),
            FunctionInfo::builtin("ge", 2, 2, Builtin::Compare(Operator::GreaterThanOrEqual)),
            FunctionInfo::builtin("lt", 2, 2, Builtin::Compare(Operator::LessThan)),
            FunctionInfo::builtin("le", 2, 2, Builtin::Compare(Operator::LessThanOrEqual)),
        ]
        .into_iter()
        .collect()
    }

    /// Returns a registry with `function` added, replacing any function of
    /// the same name.
    pub fn with(mut self, function: FunctionInfo) -> Self {
        self.functions.insert(key(function.name()), function);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FunctionInfo> {
        self.functions.get(&key(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl FromIterator<FunctionInfo> for FunctionRegistry {
    fn from_iter<I: IntoIterator<Item = FunctionInfo>>(iter: I) -> Self {
        iter.into_iter().fold(FunctionRegistry::new(), FunctionRegistry::with)
    }
}

/// Case-insensitive table of named-values, built per parse.
#[derive(Debug, Default)]
pub(crate) struct NamedValueTable<'a> {
    values: HashMap<String, &'a NamedValueInfo>,
}

impl<'a> NamedValueTable<'a> {
    pub(crate) fn new(values: &'a [NamedValueInfo]) -> Self {
        Self { values: values.iter().map(|v| (key(v.name()), v)).collect() }
    }

    pub(crate) fn get(&self, name: &str) -> Option<&'a NamedValueInfo> {
        self.values.get(&key(name)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_lookup_ignores_case() {
        let registry = FunctionRegistry::well_known();
        let format = registry.get("FORMAT").unwrap();
        assert_eq!(format.name(), "format");
        assert_eq!((format.min_parameters(), format.max_parameters()), (1, 255));
        assert!(registry.contains("startswith"));
        assert!(!registry.contains("success"));
    }

    fn noop(_: &Arguments<'_>, _: &mut EvaluationContext<'_>) -> Result<Value, EvaluationError> {
        Ok(Value::Null)
    }

    #[test]
    fn test_with_replaces_by_name() {
        let registry = FunctionRegistry::well_known().with(FunctionInfo::new("Contains", 1, 1, noop));
        assert_eq!(registry.get("contains").unwrap().max_parameters(), 1);
    }
}
