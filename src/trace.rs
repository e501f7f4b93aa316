//! Trace output and secret masking.
//!
//! Parsing and evaluation report what they are doing through a
//! [`TraceWriter`]. Everything written during evaluation passes through the
//! caller's [`SecretMasker`] first.

use regex::Regex;

/// Receives human-readable trace lines from the parser and evaluator.
pub trait TraceWriter {
    fn info(&self, message: &str);
    fn verbose(&self, message: &str);
}

/// Replaces secret substrings before text leaves the library.
pub trait SecretMasker {
    fn mask_secrets(&self, input: &str) -> String;
}

/// Discards all trace output.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTraceWriter;

impl TraceWriter for NoopTraceWriter {
    fn info(&self, _message: &str) {}
    fn verbose(&self, _message: &str) {}
}

/// Forwards trace lines to `tracing` events: info lines at INFO, verbose
/// lines at DEBUG.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTraceWriter;

impl TraceWriter for TracingTraceWriter {
    fn info(&self, message: &str) {
        tracing::info!(target: "pipeline_expr::trace", "{message}");
    }

    fn verbose(&self, message: &str) {
        tracing::debug!(target: "pipeline_expr::trace", "{message}");
    }
}

pub const MASK: &str = "***";

/// Masks literal secret values and regex-matched secrets with `***`.
#[derive(Debug, Clone, Default)]
pub struct ValueMasker {
    values: Vec<String>,
    patterns: Vec<Regex>,
}

impl ValueMasker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty values are ignored.
    pub fn add_value(&mut self, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() || self.values.contains(&value) {
            return;
        }
        self.values.push(value);
        // Longest first so a secret containing another is masked whole.
        self.values.sort_by(|a, b| b.len().cmp(&a.len()));
    }

    pub fn add_regex(&mut self, pattern: &str) -> Result<(), regex::Error> {
        self.patterns.push(Regex::new(pattern)?);
        Ok(())
    }
}

impl SecretMasker for ValueMasker {
    fn mask_secrets(&self, input: &str) -> String {
        let mut output = input.to_string();
        for value in &self.values {
            if output.contains(value.as_str()) {
                output = output.replace(value.as_str(), MASK);
            }
        }
        for pattern in &self.patterns {
            output = pattern.replace_all(&output, MASK).into_owned();
        }
        output
    }
}

impl<F: Fn(&str) -> String> SecretMasker for F {
    fn mask_secrets(&self, input: &str) -> String {
        self(input)
    }
}

/// Wraps the caller's writer so every line is masked.
pub(crate) struct MaskingTraceWriter<'a> {
    inner: &'a dyn TraceWriter,
    masker: Option<&'a dyn SecretMasker>,
}

impl<'a> MaskingTraceWriter<'a> {
    pub(crate) fn new(inner: &'a dyn TraceWriter, masker: Option<&'a dyn SecretMasker>) -> Self {
        Self { inner, masker }
    }

    fn mask(&self, message: &str) -> String {
        match self.masker {
            Some(m) => m.mask_secrets(message),
            None => message.to_string(),
        }
    }
}

impl TraceWriter for MaskingTraceWriter<'_> {
    fn info(&self, message: &str) {
        self.inner.info(&self.mask(message));
    }

    fn verbose(&self, message: &str) {
        self.inner.verbose(&self.mask(message));
    }
}
