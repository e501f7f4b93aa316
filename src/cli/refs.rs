//! Report which context an expression reads

use super::CliError;
use crate::{ExpressionParser, TraceWriter, check_references_context};

/// Options for the refs command
#[derive(Debug, Clone, Default)]
pub struct RefsOptions {
    /// The expression to analyze
    pub expression: String,
    /// Access patterns such as `needs.*.outputs`
    pub patterns: Vec<String>,
}

/// Returns, for each pattern, whether the expression may reference it.
/// An empty expression references nothing.
pub fn execute_refs(options: &RefsOptions, trace: &dyn TraceWriter) -> Result<Vec<bool>, CliError> {
    let Some(tree) = ExpressionParser::new().validate_syntax(&options.expression, trace)? else {
        return Ok(vec![false; options.patterns.len()]);
    };
    let patterns: Vec<&str> = options.patterns.iter().map(String::as_str).collect();
    Ok(check_references_context(&tree, &patterns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NoopTraceWriter;

    #[test]
    fn test_execute_refs() {
        let options = RefsOptions {
            expression: "contains(needs.*.result, 'failure') || env.CI".to_string(),
            patterns: vec!["needs".to_string(), "env.HOME".to_string(), "github".to_string()],
        };
        assert_eq!(execute_refs(&options, &NoopTraceWriter).unwrap(), vec![true, false, false]);
    }

    #[test]
    fn test_execute_refs_rejects_invalid_pattern() {
        let options = RefsOptions { expression: "env.CI".to_string(), patterns: vec!["'x'".to_string()] };
        assert!(matches!(execute_refs(&options, &NoopTraceWriter), Err(CliError::Reference(_))));
    }
}
