//! Static analysis of the context an expression may read.
//!
//! [`check_references_context`] answers questions such as "does this
//! condition read `steps.*.outputs`?" without evaluating anything.

use thiserror::Error;

use crate::{
    ast::{Node, Operator},
    parser::{ExpressionParser, ParseError},
    trace::NoopTraceWriter,
    value::{Value, eq_ignore_case},
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReferenceError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The pattern does not start with a named-value.
    #[error("Invalid context-match-pattern: {0}")]
    InvalidPattern(String),
}

/// A segment of a named-value access path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathSegment<'a> {
    /// The named-value the path starts from
    ///
    /// # Examples
    /// - `github.ref` → `[NamedValue("github"), Literal("ref")]`
    NamedValue(&'a str),

    /// A literal key or index
    ///
    /// # Examples
    /// - `matrix['os']` → `Literal("os")`
    /// - `needs.build.outputs[0]` → `Literal(0)`
    Literal(&'a Value),

    /// `*`, or a key computed at runtime
    ///
    /// # Examples
    /// - `needs.*.result` → `Wildcard`
    /// - `env[format('{0}_TOKEN', x)]` → `Wildcard`
    Wildcard,
}

/// An access path, starting with its named-value.
pub type Path<'a> = Vec<PathSegment<'a>>;

/// Extracts the access path rooted at a named-value from `node`.
///
/// Sub-expressions that may contain further accesses, such as a computed
/// index, are pushed to `further` for separate analysis. Returns an empty
/// path when `node` is not an access chain over a named-value.
///
/// # Examples
/// ```text
/// steps.build.outputs.path → [NamedValue("steps"), Literal("build"), Literal("outputs"), Literal("path")]
/// needs[x.y].result        → [NamedValue("needs"), Wildcard, Literal("result")], further: [x.y]
/// fromJson(s).a            → [], further: [fromJson(s)]
/// ```
pub fn extract_path<'a>(node: &'a Node, further: &mut Vec<&'a Node>) -> Path<'a> {
    let mut segments = Vec::new();
    let mut current = node;

    loop {
        if let Some(name) = current.named_value_name() {
            segments.push(PathSegment::NamedValue(name));
            break;
        }

        let [object, index] = current.parameters() else {
            segments.clear();
            break;
        };
        if !current.is_operator(Operator::Index) {
            segments.clear();
            break;
        }

        match index {
            Node::Literal(value) => segments.push(PathSegment::Literal(value)),
            other => {
                segments.push(PathSegment::Wildcard);
                if other.is_container() || other.named_value_name().is_some() {
                    further.push(other);
                }
            }
        }

        if object.named_value_name().is_some() || object.is_operator(Operator::Index) {
            current = object;
        } else {
            segments.clear();
            if object.is_container() {
                further.push(object);
            }
            break;
        }
    }

    segments.reverse();
    segments
}

/// For each pattern, reports whether `tree` may reference context matching it.
///
/// Patterns are access paths such as `github.event`, `needs.*.outputs` or
/// `matrix`. A reference matches when it shares the pattern's named-value
/// (ignoring case) and agrees with the pattern on every segment both have.
/// Wildcards on either side match any segment, and a reference that
/// stops early, or continues past the end of the pattern, still matches.
///
/// # Examples
///
/// ```
/// use pipeline_expr::{ExpressionParser, NoopTraceWriter, check_references_context};
///
/// let tree = ExpressionParser::new()
///     .validate_syntax("needs.build.outputs.version == '1'", &NoopTraceWriter)
///     .unwrap()
///     .unwrap();
/// let found = check_references_context(&tree, &["needs.*.outputs", "github", "needs.test"]).unwrap();
/// assert_eq!(found, vec![true, false, false]);
/// ```
pub fn check_references_context(tree: &Node, patterns: &[&str]) -> Result<Vec<bool>, ReferenceError> {
    let parser = ExpressionParser::new();
    let mut pattern_trees: Vec<Option<Node>> = vec![None; patterns.len()];
    let mut result = vec![false; patterns.len()];

    let mut stack = vec![tree];
    while let Some(node) = stack.pop() {
        if node.named_value_name().is_some() || node.is_operator(Operator::Index) {
            let mut further = Vec::new();
            let segments = extract_path(node, &mut further);
            stack.extend(further);

            if segments.is_empty() {
                continue;
            }

            for (i, pattern) in patterns.iter().enumerate() {
                if result[i] {
                    continue;
                }
                if pattern_trees[i].is_none() {
                    pattern_trees[i] = parser.validate_syntax(pattern, &NoopTraceWriter)?;
                }
                let pattern_segments = match &pattern_trees[i] {
                    Some(pattern_tree) => extract_path(pattern_tree, &mut Vec::new()),
                    None => Vec::new(),
                };
                if pattern_segments.is_empty() {
                    return Err(ReferenceError::InvalidPattern(pattern.to_string()));
                }

                result[i] = is_match(&segments, &pattern_segments);
            }
        } else {
            stack.extend(node.parameters());
        }
    }

    Ok(result)
}

fn is_match(segments: &[PathSegment<'_>], pattern: &[PathSegment<'_>]) -> bool {
    let (Some(PathSegment::NamedValue(name)), Some(PathSegment::NamedValue(pattern_name))) =
        (segments.first(), pattern.first())
    else {
        return false;
    };
    if !eq_ignore_case(name, pattern_name) {
        return false;
    }

    for (segment, pattern_segment) in segments[1..].iter().zip(&pattern[1..]) {
        match (segment, pattern_segment) {
            (PathSegment::Wildcard, _) => return true,
            (_, PathSegment::Wildcard) => continue,
            (PathSegment::Literal(value), PathSegment::Literal(pattern_value)) => {
                if !literal_matches(value, pattern_value) {
                    return false;
                }
            }
            _ => return false,
        }
    }
    true
}

fn literal_matches(value: &Value, pattern: &Value) -> bool {
    if eq_ignore_case(&value.convert_to_string(), &pattern.convert_to_string()) {
        return true;
    }
    match (array_index(value), array_index(pattern)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn array_index(value: &Value) -> Option<f64> {
    let n = value.convert_to_number();
    if n.is_nan() || n < 0.0 || n > f64::from(i32::MAX) {
        return None;
    }
    Some(n.floor())
}
