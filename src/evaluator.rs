use std::{any::Any, collections::HashMap, sync::Arc};

use thiserror::Error;

use crate::{
    ast::{Node, Operator},
    functions,
    registry::FunctionImpl,
    trace::{MaskingTraceWriter, SecretMasker, TraceWriter},
    value::{Value, ValueKind, format_value},
};

/// Memory limit applied when [`EvaluationOptions::max_memory`] is zero.
pub const DEFAULT_MAX_MEMORY: usize = 1024 * 1024;

const MIN_OBJECT_SIZE: usize = 24;
const STRING_BASE_OVERHEAD: usize = 26;
const POINTER_SIZE: usize = 8;

/// Errors raised while evaluating a tree.
///
/// Every message is passed through the caller's secret masker before it is
/// returned from [`Node::evaluate`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("The maximum allowed memory size was exceeded while evaluating the following expression: {0}")]
    ExceededMemory(String),

    #[error("The following format string is invalid: {0}")]
    InvalidFormatString(String),

    #[error("The following format string references more arguments than were supplied: {0}")]
    InvalidFormatArgIndex(String),

    #[error("The format specifiers '{specifiers}' are not valid for objects of type '{kind}'")]
    InvalidFormatSpecifiers { specifiers: String, kind: ValueKind },

    #[error("Error parsing fromJson: {0}")]
    InvalidJson(String),

    /// Raised by host functions.
    #[error("Error evaluating function '{name}': {message}")]
    Function { name: String, message: String },

    /// Raised by host named-value providers.
    #[error("Error evaluating named-value '{name}': {message}")]
    NamedValue { name: String, message: String },
}

impl EvaluationError {
    pub fn function(name: impl Into<String>, message: impl Into<String>) -> Self {
        EvaluationError::Function { name: name.into(), message: message.into() }
    }

    pub fn named_value(name: impl Into<String>, message: impl Into<String>) -> Self {
        EvaluationError::NamedValue { name: name.into(), message: message.into() }
    }

    fn masked(self, masker: Option<&dyn SecretMasker>) -> Self {
        let Some(masker) = masker else {
            return self;
        };
        let mask = |s: String| masker.mask_secrets(&s);
        match self {
            EvaluationError::ExceededMemory(e) => EvaluationError::ExceededMemory(mask(e)),
            EvaluationError::InvalidFormatString(f) => EvaluationError::InvalidFormatString(mask(f)),
            EvaluationError::InvalidFormatArgIndex(f) => EvaluationError::InvalidFormatArgIndex(mask(f)),
            EvaluationError::InvalidFormatSpecifiers { specifiers, kind } => {
                EvaluationError::InvalidFormatSpecifiers { specifiers: mask(specifiers), kind }
            }
            EvaluationError::InvalidJson(m) => EvaluationError::InvalidJson(mask(m)),
            EvaluationError::Function { name, message } => EvaluationError::Function { name, message: mask(message) },
            EvaluationError::NamedValue { name, message } => {
                EvaluationError::NamedValue { name, message: mask(message) }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationOptions {
    /// Upper bound on the estimated bytes held by intermediate results.
    /// Zero selects [`DEFAULT_MAX_MEMORY`].
    pub max_memory: usize,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self { max_memory: DEFAULT_MAX_MEMORY }
    }
}

impl EvaluationOptions {
    pub fn with_max_memory(max_memory: usize) -> Self {
        Self { max_memory }
    }

    fn effective_max_memory(&self) -> usize {
        if self.max_memory == 0 { DEFAULT_MAX_MEMORY } else { self.max_memory }
    }
}

/// State shared by all nodes during one evaluation.
///
/// Host functions and named-value providers receive the context to read the
/// caller's state object and to write trace output.
pub struct EvaluationContext<'a> {
    trace: MaskingTraceWriter<'a>,
    secret_masker: Option<&'a dyn SecretMasker>,
    state: Option<&'a dyn Any>,
    options: EvaluationOptions,
    memory: EvaluationMemory,
    expression: String,
    realized: HashMap<usize, String>,
}

impl<'a> EvaluationContext<'a> {
    fn new(
        trace: &'a dyn TraceWriter,
        secret_masker: Option<&'a dyn SecretMasker>,
        state: Option<&'a dyn Any>,
        options: EvaluationOptions,
        expression: String,
    ) -> Self {
        Self {
            trace: MaskingTraceWriter::new(trace, secret_masker),
            secret_masker,
            state,
            memory: EvaluationMemory::new(options.effective_max_memory()),
            options,
            expression,
            realized: HashMap::new(),
        }
    }

    /// Trace output, masked.
    pub fn trace(&self) -> &dyn TraceWriter {
        &self.trace
    }

    pub fn secret_masker(&self) -> Option<&'a dyn SecretMasker> {
        self.secret_masker
    }

    /// The caller's state object, if it is a `T`.
    pub fn state<T: Any>(&self) -> Option<&'a T> {
        self.state.and_then(|s| s.downcast_ref::<T>())
    }

    pub fn options(&self) -> &EvaluationOptions {
        &self.options
    }

    pub fn mask(&self, input: &str) -> String {
        match self.secret_masker {
            Some(m) => m.mask_secrets(input),
            None => input.to_string(),
        }
    }

    fn trace_verbose(&self, level: usize, message: &str) {
        self.trace.verbose(&format!("{}{message}", ".".repeat(level * 2)));
    }
}

/// The outcome of evaluating a node.
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    value: Value,
    level: usize,
    filtered: bool,
}

impl EvaluationResult {
    fn traced(context: &EvaluationContext<'_>, level: usize, value: Value, filtered: bool) -> Self {
        context.trace_verbose(level, &format!("=> {}", format_value(&value, context.secret_masker)));
        Self { value, level, filtered }
    }

    /// A result that is never written to the trace.
    pub fn intermediate(value: Value) -> Self {
        Self { value, level: 0, filtered: false }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn kind(&self) -> ValueKind {
        self.value.kind()
    }

    /// Depth of the node that produced this result; the root is level 0.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Whether the result is the projection of a wildcard index.
    pub fn is_filtered(&self) -> bool {
        self.filtered
    }

    pub fn is_primitive(&self) -> bool {
        self.value.is_primitive()
    }

    pub fn is_falsy(&self) -> bool {
        self.value.is_falsy()
    }

    pub fn is_truthy(&self) -> bool {
        self.value.is_truthy()
    }

    pub fn convert_to_number(&self) -> f64 {
        self.value.convert_to_number()
    }

    pub fn convert_to_string(&self) -> String {
        self.value.convert_to_string()
    }

    pub fn abstract_equal(&self, right: &EvaluationResult) -> bool {
        self.value.abstract_equal(&right.value)
    }

    pub fn abstract_not_equal(&self, right: &EvaluationResult) -> bool {
        self.value.abstract_not_equal(&right.value)
    }

    pub fn abstract_greater_than(&self, right: &EvaluationResult) -> bool {
        self.value.abstract_greater_than(&right.value)
    }

    pub fn abstract_greater_than_or_equal(&self, right: &EvaluationResult) -> bool {
        self.value.abstract_greater_than_or_equal(&right.value)
    }

    pub fn abstract_less_than(&self, right: &EvaluationResult) -> bool {
        self.value.abstract_less_than(&right.value)
    }

    pub fn abstract_less_than_or_equal(&self, right: &EvaluationResult) -> bool {
        self.value.abstract_less_than_or_equal(&right.value)
    }
}

/// Tracks estimated bytes per tree depth.
///
/// When a node finishes with a primitive (or self-contained) result, the
/// memory charged to its descendants is released.
#[derive(Debug)]
struct EvaluationMemory {
    max_bytes: usize,
    depths: Vec<usize>,
    total: usize,
}

impl EvaluationMemory {
    fn new(max_bytes: usize) -> Self {
        Self { max_bytes, depths: Vec::new(), total: 0 }
    }

    fn add_amount(&mut self, depth: usize, bytes: usize, trim_depth: bool) -> bool {
        if trim_depth {
            while self.depths.len() > depth + 1 {
                let released = self.depths.pop().unwrap_or(0);
                self.total -= released;
            }
        }
        if self.depths.len() <= depth {
            self.depths.resize(depth + 1, 0);
        }
        self.depths[depth] = self.depths[depth].saturating_add(bytes);
        self.total = self.total.saturating_add(bytes);
        self.total <= self.max_bytes
    }
}

/// Estimated size of a value, ignoring the contents of collections.
fn calculate_bytes(value: &Value) -> usize {
    match value {
        Value::String(s) => MIN_OBJECT_SIZE + string_bytes(s),
        _ => MIN_OBJECT_SIZE,
    }
}

fn string_bytes(s: &str) -> usize {
    STRING_BASE_OVERHEAD + 2 * s.chars().count()
}

/// Running byte count for a single function or index result.
///
/// Functions that build large results charge memory as they go so that a
/// runaway result fails early.
#[derive(Debug)]
pub struct MemoryCounter<'n> {
    node: &'n Node,
    max_bytes: usize,
    current: usize,
}

impl<'n> MemoryCounter<'n> {
    pub fn new(node: &'n Node, max_bytes: usize) -> Self {
        Self { node, max_bytes, current: 0 }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn add(&mut self, bytes: usize) -> Result<(), EvaluationError> {
        self.current = self.current.saturating_add(bytes);
        if self.current > self.max_bytes {
            return Err(EvaluationError::ExceededMemory(self.node.to_expression()));
        }
        Ok(())
    }

    pub fn add_string(&mut self, s: &str) -> Result<(), EvaluationError> {
        self.add(string_bytes(s))
    }

    pub fn add_pointer(&mut self) -> Result<(), EvaluationError> {
        self.add(POINTER_SIZE)
    }
}

/// The parameters of a function call, evaluated on demand.
pub struct Arguments<'n> {
    node: &'n Node,
    parameters: &'n [Node],
    level: usize,
}

impl<'n> Arguments<'n> {
    pub fn name(&self) -> &'n str {
        self.node.name()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn parameters(&self) -> &'n [Node] {
        self.parameters
    }

    /// Evaluates parameter `index` one level below the call.
    pub fn evaluate(&self, index: usize, context: &mut EvaluationContext<'_>) -> Result<EvaluationResult, EvaluationError> {
        let Some(parameter) = self.parameters.get(index) else {
            return Err(EvaluationError::function(self.name(), format!("parameter {index} was not supplied")));
        };
        evaluate_node(parameter, context, self.level + 1)
    }

    pub fn memory_counter(&self, context: &EvaluationContext<'_>) -> MemoryCounter<'n> {
        MemoryCounter::new(self.node, context.options.effective_max_memory())
    }
}

struct ResultMemory {
    bytes: usize,
    is_total: bool,
}

struct CoreResult {
    value: Value,
    memory: Option<ResultMemory>,
    filtered: bool,
}

impl From<Value> for CoreResult {
    fn from(value: Value) -> Self {
        Self { value, memory: None, filtered: false }
    }
}

impl Node {
    /// Evaluates the tree.
    ///
    /// Writes `Evaluating:`, `Expanded:` and `Result:` lines to `trace` at
    /// info level and a line per node at verbose level. All trace output
    /// and error messages are masked by `secret_masker`. `state` is handed
    /// to host functions and named-values through
    /// [`EvaluationContext::state`].
    pub fn evaluate(
        &self,
        trace: &dyn TraceWriter,
        secret_masker: Option<&dyn SecretMasker>,
        state: Option<&dyn Any>,
        options: EvaluationOptions,
    ) -> Result<EvaluationResult, EvaluationError> {
        let expression = self.to_expression();
        let mut context = EvaluationContext::new(trace, secret_masker, state, options, expression.clone());
        context.trace.info(&format!("Evaluating: {expression}"));

        let result = evaluate_node(self, &mut context, 0).map_err(|e| e.masked(secret_masker))?;

        let realized = self.to_realized_expression(&context.realized);
        if realized != expression {
            context.trace.info(&format!("Expanded: {realized}"));
        }
        context
            .trace
            .info(&format!("Result: {}", format_value(result.value(), secret_masker)));
        Ok(result)
    }
}

pub(crate) fn evaluate_node(
    node: &Node,
    context: &mut EvaluationContext<'_>,
    level: usize,
) -> Result<EvaluationResult, EvaluationError> {
    context.trace_verbose(level, &format!("Evaluating {}:", node.name()));

    let core = evaluate_core(node, context, level)?;

    let trim_depth = core.memory.as_ref().is_some_and(|m| m.is_total) || core.value.is_primitive();
    let bytes = core.memory.as_ref().map_or_else(|| calculate_bytes(&core.value), |m| m.bytes);
    if !context.memory.add_amount(level, bytes, trim_depth) {
        return Err(EvaluationError::ExceededMemory(context.expression.clone()));
    }

    let result = EvaluationResult::traced(context, level, core.value, core.filtered);
    if node.traces_realized_value() {
        context
            .realized
            .insert(node.id(), format_value(result.value(), context.secret_masker));
    }
    Ok(result)
}

fn evaluate_core(node: &Node, context: &mut EvaluationContext<'_>, level: usize) -> Result<CoreResult, EvaluationError> {
    match node {
        Node::Literal(value) => Ok(value.clone().into()),
        Node::Wildcard => Ok(Value::from("*").into()),
        Node::NamedValue(named_value) => match &named_value.info {
            Some(info) => Ok(info.provider.evaluate(context)?.into()),
            None => Ok(Value::Null.into()),
        },
        Node::Function(function) => {
            let Some(info) = &function.info else {
                return Ok(Value::Null.into());
            };
            let args = Arguments { node, parameters: &function.parameters, level };
            let value = match &info.implementation {
                FunctionImpl::Builtin(builtin) => functions::evaluate(*builtin, &args, context)?,
                FunctionImpl::Extension(extension) => extension.evaluate(&args, context)?,
            };
            Ok(value.into())
        }
        Node::Operator(container) => {
            let parameters = container.parameters();

            match container.operator() {
                Operator::And => {
                    let mut last = Value::Null;
                    for parameter in parameters {
                        let result = evaluate_node(parameter, context, level + 1)?;
                        if result.is_falsy() {
                            return Ok(result.into_value().into());
                        }
                        last = result.into_value();
                    }
                    Ok(last.into())
                }
                Operator::Or => {
                    let mut last = Value::Null;
                    for parameter in parameters {
                        let result = evaluate_node(parameter, context, level + 1)?;
                        if result.is_truthy() {
                            return Ok(result.into_value().into());
                        }
                        last = result.into_value();
                    }
                    Ok(last.into())
                }
                Operator::Not => Ok(Value::Boolean(operand(parameters, 0, context, level)?.is_falsy()).into()),
                Operator::Index => evaluate_index(node, parameters, context, level),
                op => {
                    let left = operand(parameters, 0, context, level)?;
                    let right = operand(parameters, 1, context, level)?;
                    Ok(Value::Boolean(compare(op, left.value(), right.value())).into())
                }
            }
        }
    }
}

fn operand(
    parameters: &[Node],
    index: usize,
    context: &mut EvaluationContext<'_>,
    level: usize,
) -> Result<EvaluationResult, EvaluationError> {
    match parameters.get(index) {
        Some(parameter) => evaluate_node(parameter, context, level + 1),
        None => Ok(EvaluationResult::intermediate(Value::Null)),
    }
}

/// Applies a comparison operator with abstract semantics.
pub(crate) fn compare(op: Operator, left: &Value, right: &Value) -> bool {
    match op {
        Operator::Equal => left.abstract_equal(right),
        Operator::NotEqual => left.abstract_not_equal(right),
        Operator::GreaterThan => left.abstract_greater_than(right),
        Operator::GreaterThanOrEqual => left.abstract_greater_than_or_equal(right),
        Operator::LessThan => left.abstract_less_than(right),
        Operator::LessThanOrEqual => left.abstract_less_than_or_equal(right),
        Operator::And | Operator::Or | Operator::Not | Operator::Index => false,
    }
}

/// The key of an index operation.
enum IndexKey {
    Wildcard,
    Value(Value),
}

impl IndexKey {
    /// A non-negative integer position, floored, within `i32` range.
    fn integer(&self) -> Option<usize> {
        let IndexKey::Value(value) = self else {
            return None;
        };
        if !value.is_primitive() {
            return None;
        }
        let n = value.convert_to_number();
        if n.is_nan() || n < 0.0 {
            return None;
        }
        let n = n.floor();
        if n > f64::from(i32::MAX) {
            return None;
        }
        Some(n as usize)
    }

    fn string(&self) -> Option<String> {
        match self {
            IndexKey::Value(value) if value.is_primitive() => Some(value.convert_to_string()),
            _ => None,
        }
    }
}

fn evaluate_index(
    node: &Node,
    parameters: &[Node],
    context: &mut EvaluationContext<'_>,
    level: usize,
) -> Result<CoreResult, EvaluationError> {
    let [object, index] = parameters else {
        return Ok(Value::Null.into());
    };

    let left = evaluate_node(object, context, level + 1)?;
    let is_collection = matches!(left.value(), Value::Array(_) | Value::Object(_));
    if !is_collection {
        if matches!(index, Node::Wildcard) {
            return Ok(filtered(Vec::new(), 0));
        }
        return Ok(Value::Null.into());
    }

    let key = match index {
        Node::Wildcard => {
            evaluate_node(index, context, level + 1)?;
            IndexKey::Wildcard
        }
        _ => IndexKey::Value(evaluate_node(index, context, level + 1)?.into_value()),
    };

    let mut counter = MemoryCounter::new(node, context.options.effective_max_memory());

    match left.value() {
        Value::Array(items) if left.is_filtered() => {
            let mut projected = Vec::new();
            for item in items.iter() {
                match (item, &key) {
                    (Value::Object(obj), IndexKey::Wildcard) => {
                        for value in obj.values() {
                            counter.add_pointer()?;
                            projected.push(value.clone());
                        }
                    }
                    (Value::Object(obj), key) => {
                        if let Some(value) = key.string().and_then(|k| obj.get(&k)) {
                            counter.add_pointer()?;
                            projected.push(value.clone());
                        }
                    }
                    (Value::Array(array), IndexKey::Wildcard) => {
                        for value in array.iter() {
                            counter.add_pointer()?;
                            projected.push(value.clone());
                        }
                    }
                    (Value::Array(array), key) => {
                        if let Some(value) = key.integer().and_then(|i| array.get(i)) {
                            counter.add_pointer()?;
                            projected.push(value.clone());
                        }
                    }
                    _ => {}
                }
            }
            Ok(filtered(projected, counter.current()))
        }
        Value::Object(obj) => match &key {
            IndexKey::Wildcard => {
                let mut values = Vec::with_capacity(obj.len());
                for value in obj.values() {
                    counter.add_pointer()?;
                    values.push(value.clone());
                }
                Ok(filtered(values, counter.current()))
            }
            key => Ok(key.string().and_then(|k| obj.get(&k).cloned()).unwrap_or(Value::Null).into()),
        },
        Value::Array(array) => match &key {
            IndexKey::Wildcard => {
                for _ in array.iter() {
                    counter.add_pointer()?;
                }
                Ok(filtered(array.as_ref().clone(), counter.current()))
            }
            key => Ok(key.integer().and_then(|i| array.get(i).cloned()).unwrap_or(Value::Null).into()),
        },
        _ => Ok(Value::Null.into()),
    }
}

fn filtered(items: Vec<Value>, bytes: usize) -> CoreResult {
    CoreResult {
        value: Value::Array(Arc::new(items)),
        memory: Some(ResultMemory { bytes: MIN_OBJECT_SIZE + bytes, is_total: false }),
        filtered: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_result_releases_deeper_levels() {
        let mut memory = EvaluationMemory::new(100);
        assert!(memory.add_amount(2, 60, false));
        assert!(memory.add_amount(1, 30, false));
        assert!(memory.add_amount(0, 24, true));
        assert_eq!(memory.total, 24);
        assert!(!memory.add_amount(0, 80, false));
    }

    #[test]
    fn test_calculate_bytes() {
        assert_eq!(calculate_bytes(&Value::from("abc")), 24 + 26 + 6);
        assert_eq!(calculate_bytes(&Value::Null), 24);
        assert_eq!(calculate_bytes(&Value::array(vec![Value::from("long string")])), 24);
    }
}
