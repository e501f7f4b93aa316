//! CLI support for pipeline-expr
//!
//! Provides programmatic access to the `pexpr` commands for embedding in
//! other tools, such as workflow linters.

mod check;
mod convert;
mod refs;

pub use check::{CheckOptions, CheckResult, execute_check};
pub use convert::json_to_value;
pub use refs::{RefsOptions, execute_refs};

use std::io;

use thiserror::Error;

/// Errors that can occur during CLI operations
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Parse error: {0}")]
    Parse(#[from] crate::ParseError),

    #[error("Evaluation error: {0}")]
    Eval(#[from] crate::EvaluationError),

    #[error("{0}")]
    Reference(#[from] crate::ReferenceError),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The input document must be a JSON object of named-values.
    #[error("Input must be a JSON object whose keys are named-values, got {0}")]
    InputNotObject(&'static str),

    #[error("Invalid secret pattern: {0}")]
    SecretPattern(#[from] regex::Error),

    #[error("Expression is empty")]
    EmptyExpression,
}
