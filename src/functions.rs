//! Built-in functions.

use crate::{
    ast::Operator,
    evaluator::{Arguments, EvaluationContext, EvaluationError, MemoryCounter, compare},
    output::JsonPrinter,
    value::{Value, contains_ignore_case, ends_with_ignore_case, starts_with_ignore_case},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    Contains,
    EndsWith,
    Format,
    Join,
    StartsWith,
    ToJson,
    FromJson,
    // Legacy functional operators
    And,
    Or,
    Not,
    Compare(Operator),
}

pub(crate) fn evaluate(
    builtin: Builtin,
    args: &Arguments<'_>,
    context: &mut EvaluationContext<'_>,
) -> Result<Value, EvaluationError> {
    match builtin {
        Builtin::Contains => contains(args, context),
        Builtin::EndsWith => ends_with(args, context),
        Builtin::Format => format(args, context),
        Builtin::Join => join(args, context),
        Builtin::StartsWith => starts_with(args, context),
        Builtin::ToJson => to_json(args, context),
        Builtin::FromJson => from_json(args, context),
        Builtin::And => {
            for index in 0..args.len() {
                if args.evaluate(index, context)?.is_falsy() {
                    return Ok(Value::Boolean(false));
                }
            }
            Ok(Value::Boolean(true))
        }
        Builtin::Or => {
            for index in 0..args.len() {
                if args.evaluate(index, context)?.is_truthy() {
                    return Ok(Value::Boolean(true));
                }
            }
            Ok(Value::Boolean(false))
        }
        Builtin::Not => Ok(Value::Boolean(args.evaluate(0, context)?.is_falsy())),
        Builtin::Compare(op) => {
            let left = args.evaluate(0, context)?;
            let right = args.evaluate(1, context)?;
            Ok(Value::Boolean(compare(op, left.value(), right.value())))
        }
    }
}

/// `contains(search, item)`: substring test for primitives, element test
/// using abstract equality for arrays.
fn contains(args: &Arguments<'_>, context: &mut EvaluationContext<'_>) -> Result<Value, EvaluationError> {
    let left = args.evaluate(0, context)?;
    if left.is_primitive() {
        let haystack = left.convert_to_string();
        let right = args.evaluate(1, context)?;
        if right.is_primitive() {
            return Ok(Value::Boolean(contains_ignore_case(&haystack, &right.convert_to_string())));
        }
    } else if let Value::Array(items) = left.value()
        && !items.is_empty()
    {
        let right = args.evaluate(1, context)?;
        let found = items.iter().any(|item| item.abstract_equal(right.value()));
        return Ok(Value::Boolean(found));
    }
    Ok(Value::Boolean(false))
}

fn starts_with(args: &Arguments<'_>, context: &mut EvaluationContext<'_>) -> Result<Value, EvaluationError> {
    let left = args.evaluate(0, context)?;
    if left.is_primitive() {
        let right = args.evaluate(1, context)?;
        if right.is_primitive() {
            let found = starts_with_ignore_case(&left.convert_to_string(), &right.convert_to_string());
            return Ok(Value::Boolean(found));
        }
    }
    Ok(Value::Boolean(false))
}

fn ends_with(args: &Arguments<'_>, context: &mut EvaluationContext<'_>) -> Result<Value, EvaluationError> {
    let left = args.evaluate(0, context)?;
    if left.is_primitive() {
        let right = args.evaluate(1, context)?;
        if right.is_primitive() {
            let found = ends_with_ignore_case(&left.convert_to_string(), &right.convert_to_string());
            return Ok(Value::Boolean(found));
        }
    }
    Ok(Value::Boolean(false))
}

/// `format(fmt, args...)` with `{N}` placeholders and `{{`/`}}` escapes.
///
/// Each argument is converted to a string at most once, and only when a
/// placeholder references it.
fn format(args: &Arguments<'_>, context: &mut EvaluationContext<'_>) -> Result<Value, EvaluationError> {
    let format = args.evaluate(0, context)?.convert_to_string();
    let bytes = format.as_bytes();
    let mut counter = args.memory_counter(context);
    let mut cache: Vec<Option<String>> = vec![None; args.len().saturating_sub(1)];
    let mut result = String::new();

    let mut index = 0;
    while index < format.len() {
        let lbrace = format[index..].find('{').map(|i| i + index);
        let rbrace = format[index..].find('}').map(|i| i + index);

        match (lbrace, rbrace) {
            // Left brace comes first
            (Some(lbrace), rbrace) if rbrace.is_none_or(|r| r > lbrace) => {
                if bytes.get(lbrace + 1) == Some(&b'{') {
                    append(&mut result, &format[index..=lbrace], &mut counter)?;
                    index = lbrace + 2;
                    continue;
                }

                let Some(rbrace) = rbrace.filter(|r| *r > lbrace + 1) else {
                    return Err(EvaluationError::InvalidFormatString(format.clone()));
                };
                let Some((arg_index, end)) = read_arg_index(&format, lbrace + 1) else {
                    return Err(EvaluationError::InvalidFormatString(format.clone()));
                };
                let Some((specifiers, rbrace)) = read_format_specifiers(&format, end, rbrace) else {
                    return Err(EvaluationError::InvalidFormatString(format.clone()));
                };
                if arg_index >= cache.len() {
                    return Err(EvaluationError::InvalidFormatArgIndex(format.clone()));
                }

                append(&mut result, &format[index..lbrace], &mut counter)?;

                if !specifiers.is_empty() {
                    let argument = args.evaluate(arg_index + 1, context)?;
                    return Err(EvaluationError::InvalidFormatSpecifiers { specifiers, kind: argument.kind() });
                }
                let argument = match &cache[arg_index] {
                    Some(cached) => cached.clone(),
                    None => {
                        let converted = args.evaluate(arg_index + 1, context)?.convert_to_string();
                        cache[arg_index] = Some(converted.clone());
                        converted
                    }
                };
                append(&mut result, &argument, &mut counter)?;
                index = rbrace + 1;
            }
            // Right brace comes first
            (_, Some(rbrace)) => {
                if bytes.get(rbrace + 1) == Some(&b'}') {
                    append(&mut result, &format[index..=rbrace], &mut counter)?;
                    index = rbrace + 2;
                } else {
                    return Err(EvaluationError::InvalidFormatString(format.clone()));
                }
            }
            // No more braces
            (_, None) => {
                append(&mut result, &format[index..], &mut counter)?;
                break;
            }
        }
    }

    Ok(Value::String(result))
}

fn append(result: &mut String, s: &str, counter: &mut MemoryCounter<'_>) -> Result<(), EvaluationError> {
    counter.add_string(s)?;
    result.push_str(s);
    Ok(())
}

/// Reads the digits of a placeholder index starting at `start`. Returns the
/// index and the byte position just past the digits.
fn read_arg_index(format: &str, start: usize) -> Option<(usize, usize)> {
    let digits = format[start..].bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let end = start + digits;
    let index = format[start..end].parse::<u8>().ok()?;
    Some((usize::from(index), end))
}

/// Reads `:specifiers}` or `}` at `start`, where `}}` inside specifiers is
/// an escaped brace. Returns the specifiers and the closing brace position.
fn read_format_specifiers(format: &str, start: usize, first_rbrace: usize) -> Option<(String, usize)> {
    let bytes = format.as_bytes();
    match bytes.get(start) {
        Some(b'}') if start == first_rbrace => return Some((String::new(), start)),
        Some(b':') => {}
        _ => return None,
    }

    let mut specifiers = String::new();
    let mut chars = format[start + 1..].char_indices().peekable();
    while let Some((offset, c)) = chars.next() {
        if c != '}' {
            specifiers.push(c);
        } else if chars.peek().is_some_and(|(_, next)| *next == '}') {
            specifiers.push('}');
            chars.next();
        } else {
            return Some((specifiers, start + 1 + offset));
        }
    }
    None
}

/// `join(array, separator = ',')`. Primitives are converted to a string;
/// objects produce an empty string.
fn join(args: &Arguments<'_>, context: &mut EvaluationContext<'_>) -> Result<Value, EvaluationError> {
    let items = args.evaluate(0, context)?;
    match items.value() {
        Value::Array(array) => {
            let mut counter = args.memory_counter(context);
            let mut separator = ",".to_string();
            if args.len() > 1 {
                let right = args.evaluate(1, context)?;
                if right.is_primitive() {
                    separator = right.convert_to_string();
                }
            }

            let mut result = String::new();
            for (i, item) in array.iter().enumerate() {
                if i > 0 {
                    append(&mut result, &separator, &mut counter)?;
                }
                append(&mut result, &item.convert_to_string(), &mut counter)?;
            }
            Ok(Value::String(result))
        }
        value if value.is_primitive() => Ok(Value::String(value.convert_to_string())),
        _ => Ok(Value::String(String::new())),
    }
}

fn to_json(args: &Arguments<'_>, context: &mut EvaluationContext<'_>) -> Result<Value, EvaluationError> {
    let value = args.evaluate(0, context)?;
    let mut counter = args.memory_counter(context);
    let json = JsonPrinter::new(true).print_counted(value.value(), &mut counter)?;
    Ok(Value::String(json))
}

fn from_json(args: &Arguments<'_>, context: &mut EvaluationContext<'_>) -> Result<Value, EvaluationError> {
    let json = args.evaluate(0, context)?.convert_to_string();
    let parsed: serde_json::Value =
        serde_json::from_str(&json).map_err(|e| EvaluationError::InvalidJson(e.to_string()))?;
    Ok(Value::from(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_arg_index() {
        assert_eq!(read_arg_index("{12}", 1), Some((12, 3)));
        assert_eq!(read_arg_index("{}", 1), None);
        assert_eq!(read_arg_index("{256}", 1), None);
    }

    #[test]
    fn test_read_format_specifiers() {
        assert_eq!(read_format_specifiers("{0}", 2, 2), Some((String::new(), 2)));
        assert_eq!(read_format_specifiers("{0:yy}", 2, 5), Some(("yy".to_string(), 5)));
        assert_eq!(read_format_specifiers("{0:a}}b}", 2, 4), Some(("a}b".to_string(), 7)));
        assert_eq!(read_format_specifiers("{0:abc", 2, 0), None);
        assert_eq!(read_format_specifiers("{0x}", 2, 3), None);
    }
}
