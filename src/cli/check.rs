//! Evaluate expressions against a JSON context

use super::{CliError, convert::json_kind, json_to_value};
use crate::{
    EvaluationOptions, ExpressionParser, NamedValueInfo, ParseError, TraceWriter, Value, ValueMasker,
    trace::MaskingTraceWriter,
};

/// Options for the check command
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// The expression to evaluate
    pub expression: String,
    /// JSON object whose top-level keys become named-values
    pub input: Option<String>,
    /// Pretty-print the output
    pub pretty: bool,
    /// Only validate syntax, don't evaluate
    pub syntax_only: bool,
    /// Memory limit in bytes; zero selects the default
    pub max_memory: usize,
    /// Literal values to mask in trace output and errors
    pub secrets: Vec<String>,
    /// Regular expressions whose matches are masked
    pub secret_patterns: Vec<String>,
}

/// Result of a check operation
#[derive(Debug)]
pub enum CheckResult {
    /// Syntax validation passed
    SyntaxValid,
    /// Expression evaluated successfully
    Success(Value),
}

/// Execute a check operation.
///
/// String values under a top-level `secrets` object in the input are
/// masked along with [`CheckOptions::secrets`].
pub fn execute_check(options: &CheckOptions, trace: &dyn TraceWriter) -> Result<CheckResult, CliError> {
    let mut masker = ValueMasker::new();
    for secret in &options.secrets {
        masker.add_value(secret.as_str());
    }
    for pattern in &options.secret_patterns {
        masker.add_regex(pattern)?;
    }

    let input = match &options.input {
        Some(json_str) => match serde_json::from_str(json_str)? {
            serde_json::Value::Object(map) => Some(map),
            other => return Err(CliError::InputNotObject(json_kind(&other))),
        },
        None => None,
    };
    if let Some(serde_json::Value::Object(secrets)) = input.as_ref().and_then(|map| map.get("secrets")) {
        for secret in secrets.values() {
            if let serde_json::Value::String(s) = secret {
                masker.add_value(s.as_str());
            }
        }
    }

    let parser = ExpressionParser::new();
    let masked_trace = MaskingTraceWriter::new(trace, Some(&masker));
    let mask_parse_error = |e: ParseError| CliError::Parse(e.masked(&masker));

    if options.syntax_only {
        parser.validate_syntax(&options.expression, &masked_trace).map_err(mask_parse_error)?;
        return Ok(CheckResult::SyntaxValid);
    }

    let named_values: Vec<NamedValueInfo> = input
        .into_iter()
        .flatten()
        .map(|(name, value)| NamedValueInfo::new(name, json_to_value(value)))
        .collect();

    let tree = parser
        .create_tree(&options.expression, &masked_trace, &named_values, &[])
        .map_err(mask_parse_error)?
        .ok_or(CliError::EmptyExpression)?;

    let evaluation_options = EvaluationOptions::with_max_memory(options.max_memory);
    let result = tree.evaluate(trace, Some(&masker), None, evaluation_options)?;
    Ok(CheckResult::Success(result.into_value()))
}
