// tests/evaluation_tests.rs

use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};

use pipeline_expr::{
    Arguments, EvaluationContext, EvaluationError, EvaluationOptions, ExpressionParser, FunctionInfo,
    NamedValueInfo, NoopTraceWriter, TraceWriter, Value, ValueKind, ValueMasker, format_number, parse_number,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn named_values() -> Vec<NamedValueInfo> {
    vec![
        NamedValueInfo::new(
            "needs",
            Value::from(json!({
                "build": { "result": "success", "outputs": { "version": "1.2.3" } },
                "test": { "result": "failure", "outputs": {} }
            })),
        ),
        NamedValueInfo::new("matrix", Value::from(json!({ "os": "ubuntu-latest", "node": 20 }))),
        NamedValueInfo::new("items", Value::from(json!([10, "b", true, null]))),
        NamedValueInfo::new("s", Value::from("abc")),
        NamedValueInfo::new("empty", Value::from("")),
        NamedValueInfo::new("n", Value::from(42)),
    ]
}

fn count(_: &Arguments<'_>, context: &mut EvaluationContext<'_>) -> Result<Value, EvaluationError> {
    if let Some(calls) = context.state::<AtomicUsize>() {
        calls.fetch_add(1, Ordering::SeqCst);
    }
    Ok(Value::Boolean(true))
}

/// Returns its second parameter without evaluating the first.
fn second(args: &Arguments<'_>, context: &mut EvaluationContext<'_>) -> Result<Value, EvaluationError> {
    Ok(args.evaluate(1, context)?.into_value())
}

fn functions() -> Vec<FunctionInfo> {
    vec![FunctionInfo::new("count", 0, 0, count), FunctionInfo::new("second", 2, 2, second)]
}

fn eval_with(expression: &str, options: EvaluationOptions) -> Result<Value, EvaluationError> {
    let tree = ExpressionParser::new()
        .create_tree(expression, &NoopTraceWriter, &named_values(), &functions())
        .unwrap_or_else(|e| panic!("failed to parse {expression}: {e}"))
        .unwrap_or_else(|| panic!("empty tree for {expression}"));
    tree.evaluate(&NoopTraceWriter, None, None, options).map(|r| r.into_value())
}

fn eval(expression: &str) -> Value {
    eval_with(expression, EvaluationOptions::default())
        .unwrap_or_else(|e| panic!("failed to evaluate {expression}: {e}"))
}

fn eval_err(expression: &str) -> EvaluationError {
    match eval_with(expression, EvaluationOptions::default()) {
        Ok(value) => panic!("expected error for {expression}, got {value:?}"),
        Err(e) => e,
    }
}

fn calls_made(expression: &str) -> usize {
    let calls = AtomicUsize::new(0);
    let tree = ExpressionParser::new()
        .create_tree(expression, &NoopTraceWriter, &named_values(), &functions())
        .unwrap()
        .unwrap();
    tree.evaluate(&NoopTraceWriter, None, Some(&calls), EvaluationOptions::default()).unwrap();
    calls.load(Ordering::SeqCst)
}

#[derive(Default)]
struct Lines {
    info: RefCell<Vec<String>>,
    verbose: RefCell<Vec<String>>,
}

impl TraceWriter for Lines {
    fn info(&self, message: &str) {
        self.info.borrow_mut().push(message.to_string());
    }

    fn verbose(&self, message: &str) {
        self.verbose.borrow_mut().push(message.to_string());
    }
}

// ============================================================================
// Literals
// ============================================================================

#[test]
fn test_literals() {
    assert_eq!(eval("null"), Value::Null);
    assert_eq!(eval("true"), Value::Boolean(true));
    assert_eq!(eval("1.5"), Value::Number(1.5));
    assert_eq!(eval("'it''s'"), Value::from("it's"));
    assert_eq!(eval("-Infinity"), Value::Number(f64::NEG_INFINITY));
}

// ============================================================================
// Equality
// ============================================================================

#[test]
fn test_equality_coercion() {
    let test_cases = vec![
        ("1 == '1'", true),
        ("'' == 0", true),
        ("' 12 ' == 12", true),
        ("'1e2' == 100", true),
        ("0x10 == 16", true),
        ("null == null", true),
        ("null == 0", true),
        ("null == ''", true),
        ("null == false", true),
        ("true == 1", true),
        ("false == '0'", true),
        ("'true' == true", false),
        ("'abc' == 'ABC'", true),
        ("'abc' != 'abd'", true),
        ("'a' == 1", false),
        ("NaN == NaN", false),
        ("NaN != NaN", true),
        ("matrix == matrix", true),
        ("fromJson('{}') == fromJson('{}')", false),
        ("items == 'Array'", false),
    ];

    for (input, expected) in test_cases {
        assert_eq!(eval(input), Value::Boolean(expected), "Failed for input: {}", input);
    }
}

// ============================================================================
// Comparison
// ============================================================================

#[test]
fn test_ordering() {
    let test_cases = vec![
        ("1 < 2", true),
        ("'10' > 9", true),
        ("'b' > 'A'", true),
        ("'abc' >= 'ABC'", true),
        ("'a' < 'B'", true),
        ("true > false", true),
        ("false < true", true),
        ("true >= true", true),
        ("null < 1", true),
        ("NaN < 1", false),
        ("NaN >= NaN", false),
        ("'x' > 1", false),
        ("matrix > 1", false),
        ("n <= 42", true),
    ];

    for (input, expected) in test_cases {
        assert_eq!(eval(input), Value::Boolean(expected), "Failed for input: {}", input);
    }
}

// ============================================================================
// Logical Operators
// ============================================================================

#[test]
fn test_and_or_return_operands() {
    assert_eq!(eval("'' || 'default'"), Value::from("default"));
    assert_eq!(eval("1 && 'x'"), Value::from("x"));
    assert_eq!(eval("0 && 'x'"), Value::Number(0.0));
    assert_eq!(eval("empty || null"), Value::Null);
    assert_eq!(eval("s && n && matrix.os"), Value::from("ubuntu-latest"));
}

#[test]
fn test_not() {
    assert_eq!(eval("!''"), Value::Boolean(true));
    assert_eq!(eval("!matrix"), Value::Boolean(false));
    assert_eq!(eval("!!s"), Value::Boolean(true));
    assert_eq!(eval("!NaN"), Value::Boolean(true));
}

#[test]
fn test_and_or_short_circuit() {
    assert_eq!(calls_made("false && count()"), 0);
    assert_eq!(calls_made("true || count()"), 0);
    assert_eq!(calls_made("true && count() && count()"), 2);
    assert_eq!(calls_made("count() || count()"), 1);
}

#[test]
fn test_legacy_functions() {
    assert_eq!(eval("and(1, 'x')"), Value::Boolean(true));
    assert_eq!(eval("or(0, '')"), Value::Boolean(false));
    assert_eq!(eval("not(empty)"), Value::Boolean(true));
    assert_eq!(eval("eq('A', 'a')"), Value::Boolean(true));
    assert_eq!(eval("ne(1, 2)"), Value::Boolean(true));
    assert_eq!(eval("gt(2, 1)"), Value::Boolean(true));
    assert_eq!(eval("ge(1, 1)"), Value::Boolean(true));
    assert_eq!(eval("lt('a', 'b')"), Value::Boolean(true));
    assert_eq!(eval("le(2, 1)"), Value::Boolean(false));
    assert_eq!(calls_made("and(false, count())"), 0);
    assert_eq!(calls_made("or(true, count())"), 0);
}

// ============================================================================
// Indexing
// ============================================================================

#[test]
fn test_object_index() {
    assert_eq!(eval("matrix.os"), Value::from("ubuntu-latest"));
    assert_eq!(eval("matrix['node']"), Value::Number(20.0));
    assert_eq!(eval("matrix.OS"), Value::from("ubuntu-latest"));
    assert_eq!(eval("matrix.missing"), Value::Null);
    assert_eq!(eval("needs.build.outputs.version"), Value::from("1.2.3"));
    assert_eq!(eval("needs.nope.outputs.version"), Value::Null);
}

#[test]
fn test_array_index() {
    assert_eq!(eval("items[0]"), Value::Number(10.0));
    assert_eq!(eval("items[1.9]"), Value::from("b"));
    assert_eq!(eval("items['2']"), Value::Boolean(true));
    assert_eq!(eval("items[-1]"), Value::Null);
    assert_eq!(eval("items[4]"), Value::Null);
    assert_eq!(eval("items['x']"), Value::Null);
}

#[test]
fn test_index_on_primitive_is_null() {
    assert_eq!(eval("s[0]"), Value::Null);
    assert_eq!(eval("s['foo']"), Value::Null);
    assert_eq!(eval("n.length"), Value::Null);
    assert_eq!(eval("s.*"), Value::array(vec![]));
}

#[test]
fn test_wildcard_projection() {
    assert_eq!(
        eval("needs.*.result"),
        Value::array(vec![Value::from("success"), Value::from("failure")])
    );
    assert_eq!(eval("needs.*.outputs.version"), Value::array(vec![Value::from("1.2.3")]));
    assert_eq!(eval("items[*]"), eval("items"));
}

#[test]
fn test_wildcard_result_is_filtered() {
    let tree = ExpressionParser::new()
        .create_tree("needs.*", &NoopTraceWriter, &named_values(), &[])
        .unwrap()
        .unwrap();
    let result = tree.evaluate(&NoopTraceWriter, None, None, EvaluationOptions::default()).unwrap();
    assert!(result.is_filtered());
    assert_eq!(result.kind(), ValueKind::Array);

    let tree = ExpressionParser::new()
        .create_tree("items", &NoopTraceWriter, &named_values(), &[])
        .unwrap()
        .unwrap();
    let result = tree.evaluate(&NoopTraceWriter, None, None, EvaluationOptions::default()).unwrap();
    assert!(!result.is_filtered());
}

#[test]
fn test_filtered_array_index_projects_each_element() {
    assert_eq!(
        eval("fromJson('[[1, 2], [3], 4]')[*][0]"),
        Value::array(vec![Value::Number(1.0), Value::Number(3.0)])
    );
    assert_eq!(
        eval("fromJson('[[1, 2], [3]]')[*][*]"),
        Value::array(vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)])
    );
}

// ============================================================================
// Functions
// ============================================================================

#[test]
fn test_contains() {
    let test_cases = vec![
        ("contains('Hello World', 'world')", true),
        ("contains('abc', '')", true),
        ("contains(123, 2)", true),
        ("contains(items, 'B')", true),
        ("contains(items, '10')", true),
        ("contains(items, 'c')", false),
        ("contains(needs.*.result, 'failure')", true),
        ("contains(matrix, 'os')", false),
        ("contains(fromJson('[]'), null)", false),
        ("contains('abc', matrix)", false),
    ];

    for (input, expected) in test_cases {
        assert_eq!(eval(input), Value::Boolean(expected), "Failed for input: {}", input);
    }
}

#[test]
fn test_starts_with_ends_with() {
    assert_eq!(eval("startsWith('refs/heads/main', 'REFS/')"), Value::Boolean(true));
    assert_eq!(eval("startsWith(items, '10')"), Value::Boolean(false));
    assert_eq!(eval("endsWith('release.yml', '.YML')"), Value::Boolean(true));
    assert_eq!(eval("endsWith(12.5, 5)"), Value::Boolean(true));
    assert_eq!(eval("endsWith('abc', matrix)"), Value::Boolean(false));
}

#[test]
fn test_format() {
    let test_cases = vec![
        ("format('{0}-{1}', 'a', 1.5)", "a-1.5"),
        ("format('{{0}}', 1)", "{0}"),
        ("format('{{{0}}}', 'x')", "{x}"),
        ("format('{1}{0}{1}', 'a', 'b')", "bab"),
        ("format('plain')", "plain"),
        ("format('{0}', null)", ""),
        ("format('{0}', matrix)", "Object"),
        ("format('{0} {1}', true, items)", "true Array"),
    ];

    for (input, expected) in test_cases {
        assert_eq!(eval(input), Value::from(expected), "Failed for input: {}", input);
    }
}

#[test]
fn test_format_errors() {
    assert_eq!(
        eval_err("format('{0', 1)").to_string(),
        "The following format string is invalid: {0"
    );
    assert_eq!(eval_err("format('}', 1)"), EvaluationError::InvalidFormatString("}".to_string()));
    assert_eq!(eval_err("format('{a}', 1)"), EvaluationError::InvalidFormatString("{a}".to_string()));
    assert_eq!(
        eval_err("format('{1}', 'a')").to_string(),
        "The following format string references more arguments than were supplied: {1}"
    );
    assert_eq!(
        eval_err("format('{0:yyyy}', 1)").to_string(),
        "The format specifiers 'yyyy' are not valid for objects of type 'Number'"
    );
}

#[test]
fn test_format_evaluates_only_referenced_arguments() {
    assert_eq!(calls_made("format('{0}', 'a', count())"), 0);
    assert_eq!(calls_made("format('{0}{0}', count())"), 1);
}

#[test]
fn test_join() {
    assert_eq!(eval("join(items)"), Value::from("10,b,true,"));
    assert_eq!(eval("join(needs.*.result, ' | ')"), Value::from("success | failure"));
    assert_eq!(eval("join('abc', '-')"), Value::from("abc"));
    assert_eq!(eval("join(matrix)"), Value::from(""));
    assert_eq!(eval("join(fromJson('[]'), ',')"), Value::from(""));
}

#[test]
fn test_to_json() {
    assert_eq!(
        eval("toJson(needs.build)"),
        Value::from("{\n  \"result\": \"success\",\n  \"outputs\": {\n    \"version\": \"1.2.3\"\n  }\n}")
    );
    assert_eq!(eval("toJson(items)"), Value::from("[\n  10,\n  \"b\",\n  true,\n  null\n]"));
    assert_eq!(eval("toJson('a\"b')"), Value::from("\"a\\\"b\""));
    assert_eq!(eval("toJson(fromJson('{}'))"), Value::from("{}"));
    assert_eq!(eval("convertToJson(1)"), Value::from("1"));
}

#[test]
fn test_from_json() {
    assert_eq!(eval("fromJson('{\"a\": [1, true]}').a[1]"), Value::Boolean(true));
    assert_eq!(eval("fromJson('\"text\"')"), Value::from("text"));
    assert_eq!(eval("fromJson('null')"), Value::Null);
    assert_eq!(eval("fromJson(toJson(matrix)).node"), Value::Number(20.0));
    assert!(matches!(eval_err("fromJson('{')"), EvaluationError::InvalidJson(_)));
}

// ============================================================================
// Number Formatting
// ============================================================================

#[test]
fn test_number_to_string() {
    let test_cases = vec![
        ("1", "1"),
        ("-0", "0"),
        ("1.50", "1.5"),
        ("0.30000000000000004", "0.3"),
        ("123456789012345", "123456789012345"),
        ("1e15", "1E+15"),
        ("1.5e20", "1.5E+20"),
        ("0.0001", "0.0001"),
        ("0.00001", "1E-05"),
        ("0.000012345", "1.2345E-05"),
        ("0.000001", "1E-06"),
        ("NaN", "NaN"),
        ("Infinity", "Infinity"),
    ];

    for (input, expected) in test_cases {
        let expression = format!("format('{{0}}', {input})");
        assert_eq!(eval(&expression), Value::from(expected), "Failed for input: {}", input);
    }
}

#[test]
fn test_numeric_strings_round_trip() {
    for input in ["0", "-12", "3.25", "1e3", "0.001", "1.5E+20", "  7  ", "0x1F", "123456.789"] {
        let number = parse_number(input);
        assert_eq!(parse_number(&format_number(number)), number, "Failed for input: {}", input);
    }
}

// ============================================================================
// Host Functions
// ============================================================================

#[test]
fn test_host_function_evaluates_parameters_on_demand() {
    assert_eq!(eval("second(count(), 'b')"), Value::from("b"));
    assert_eq!(calls_made("second(count(), 'b')"), 0);
}

#[test]
fn test_host_named_value_error() {
    fn failing(_: &mut EvaluationContext<'_>) -> Result<Value, EvaluationError> {
        Err(EvaluationError::named_value("vars", "lookup failed"))
    }

    let named = [NamedValueInfo::new("vars", failing)];
    let tree = ExpressionParser::new()
        .create_tree("vars.x == 1", &NoopTraceWriter, &named, &[])
        .unwrap()
        .unwrap();
    let error = tree.evaluate(&NoopTraceWriter, None, None, EvaluationOptions::default()).unwrap_err();
    assert_eq!(error.to_string(), "Error evaluating named-value 'vars': lookup failed");
}

#[test]
fn test_unresolved_nodes_evaluate_to_null() {
    let tree = ExpressionParser::new()
        .validate_syntax("success() || steps.a.outputs", &NoopTraceWriter)
        .unwrap()
        .unwrap();
    let result = tree.evaluate(&NoopTraceWriter, None, None, EvaluationOptions::default()).unwrap();
    assert_eq!(result.into_value(), Value::Null);
}

// ============================================================================
// Memory
// ============================================================================

#[test]
fn test_memory_limit_on_named_value() {
    let named = [NamedValueInfo::new("big", Value::from("x".repeat(1000)))];
    let tree = ExpressionParser::new()
        .create_tree("big", &NoopTraceWriter, &named, &[])
        .unwrap()
        .unwrap();

    let error = tree
        .evaluate(&NoopTraceWriter, None, None, EvaluationOptions::with_max_memory(1000))
        .unwrap_err();
    assert_eq!(
        error.to_string(),
        "The maximum allowed memory size was exceeded while evaluating the following expression: big"
    );

    assert!(tree.evaluate(&NoopTraceWriter, None, None, EvaluationOptions::default()).is_ok());
}

#[test]
fn test_memory_limit_in_function() {
    let result = eval_with(
        "format('{0}{0}{0}{0}{0}{0}{0}{0}', toJson(needs))",
        EvaluationOptions::with_max_memory(2000),
    );
    assert!(matches!(result, Err(EvaluationError::ExceededMemory(_))));
    assert!(eval_with("format('{0}{0}', toJson(needs))", EvaluationOptions::default()).is_ok());
}

#[test]
fn test_zero_max_memory_uses_default() {
    assert_eq!(eval_with("s", EvaluationOptions::with_max_memory(0)), Ok(Value::from("abc")));
}

// ============================================================================
// Trace
// ============================================================================

#[test]
fn test_trace_lines() {
    let named = [NamedValueInfo::new("a", Value::from("x"))];
    let lines = Lines::default();
    let tree = ExpressionParser::new().create_tree("a == 'x'", &lines, &named, &[]).unwrap().unwrap();
    tree.evaluate(&lines, None, None, EvaluationOptions::default()).unwrap();

    assert_eq!(
        *lines.info.borrow(),
        vec![
            "Parsing expression: <a == 'x'>",
            "Evaluating: (a == 'x')",
            "Expanded: ('x' == 'x')",
            "Result: true",
        ]
    );
    assert_eq!(
        *lines.verbose.borrow(),
        vec!["Evaluating Equal:", "..Evaluating a:", "..=> 'x'", "..Evaluating String:", "..=> 'x'", "=> true"]
    );
}

#[test]
fn test_trace_omits_expanded_when_unchanged() {
    let lines = Lines::default();
    let tree = ExpressionParser::new().create_tree("1 < 2", &lines, &[], &[]).unwrap().unwrap();
    tree.evaluate(&lines, None, None, EvaluationOptions::default()).unwrap();
    assert!(lines.info.borrow().iter().all(|line| !line.starts_with("Expanded:")));
}

#[test]
fn test_trace_masks_secrets() {
    let named = [NamedValueInfo::new("token", Value::from("hunter2"))];
    let mut masker = ValueMasker::new();
    masker.add_value("hunter2");

    let lines = Lines::default();
    let tree = ExpressionParser::new().create_tree("token == 'z'", &lines, &named, &[]).unwrap().unwrap();
    tree.evaluate(&lines, Some(&masker), None, EvaluationOptions::default()).unwrap();

    assert_eq!(lines.info.borrow()[2], "Expanded: ('***' == 'z')");
    let all = lines.info.borrow().join("\n") + &lines.verbose.borrow().join("\n");
    assert!(!all.contains("hunter2"));
}

#[test]
fn test_errors_are_masked() {
    let named = [NamedValueInfo::new("token", Value::from("{hunter2"))];
    let masker = |s: &str| s.replace("hunter2", "***");

    let tree = ExpressionParser::new()
        .create_tree("format(token)", &NoopTraceWriter, &named, &[])
        .unwrap()
        .unwrap();
    let error = tree.evaluate(&NoopTraceWriter, Some(&masker), None, EvaluationOptions::default()).unwrap_err();
    assert_eq!(error.to_string(), "The following format string is invalid: {***");
}

// ============================================================================
// Repeat Evaluation
// ============================================================================

#[test]
fn test_evaluation_is_repeatable() {
    let tree = ExpressionParser::new()
        .create_tree("format('{0}/{1}', matrix.os, join(needs.*.result))", &NoopTraceWriter, &named_values(), &[])
        .unwrap()
        .unwrap();

    let first = tree.evaluate(&NoopTraceWriter, None, None, EvaluationOptions::default()).unwrap();
    let second = tree.evaluate(&NoopTraceWriter, None, None, EvaluationOptions::default()).unwrap();
    assert_eq!(first.value(), second.value());
    assert_eq!(first.into_value(), Value::from("ubuntu-latest/success,failure"));
}

#[test]
fn test_rendered_expression_reparses_to_same_result() {
    let expressions = [
        "needs.build.result == 'success' && !contains(matrix.os, 'windows')",
        "items[0] >= 10 || s",
        "format('{0}', fromJson('[1]')[0])",
    ];

    for expression in expressions {
        let rendered = ExpressionParser::new()
            .create_tree(expression, &NoopTraceWriter, &named_values(), &[])
            .unwrap()
            .unwrap()
            .to_expression();
        assert_eq!(eval(&rendered), eval(expression), "Failed for input: {}", expression);
    }
}
