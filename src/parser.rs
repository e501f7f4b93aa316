use std::{collections::HashMap, fmt};

use thiserror::Error;

use crate::{
    ast::{Associativity, Container, FunctionNode, NamedValueNode, Node, Operator, Token, TokenKind},
    lexer::Lexer,
    registry::{FunctionInfo, FunctionRegistry, NamedValueInfo, NamedValueTable},
    trace::{SecretMasker, TraceWriter},
};

/// Maximum number of characters in an expression.
pub const MAX_LENGTH: usize = 21_000;

/// Maximum nesting depth of a parsed tree; the root is depth 1.
pub const MAX_DEPTH: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    ExceededMaxDepth,
    ExceededMaxLength,
    TooFewParameters,
    TooManyParameters,
    UnexpectedEndOfExpression,
    UnexpectedSymbol,
    UnrecognizedFunction,
    UnrecognizedNamedValue,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::ExceededMaxDepth => write!(f, "Exceeded max expression depth {MAX_DEPTH}"),
            ParseErrorKind::ExceededMaxLength => write!(f, "Exceeded max expression length {MAX_LENGTH}"),
            ParseErrorKind::TooFewParameters => f.write_str("Too few parameters supplied"),
            ParseErrorKind::TooManyParameters => f.write_str("Too many parameters supplied"),
            ParseErrorKind::UnexpectedEndOfExpression => f.write_str("Unexpected end of expression"),
            ParseErrorKind::UnexpectedSymbol => f.write_str("Unexpected symbol"),
            ParseErrorKind::UnrecognizedFunction => f.write_str("Unrecognized function"),
            ParseErrorKind::UnrecognizedNamedValue => f.write_str("Unrecognized named-value"),
        }
    }
}

/// A syntax or resolution error, located at the offending token when there is one.
///
/// ```text
/// Unexpected symbol: '='. Located at position 3 within expression: a = b
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ParseError {
    kind: ParseErrorKind,
    raw_token: Option<String>,
    position: Option<usize>,
    expression: String,
    message: String,
}

impl ParseError {
    fn new(kind: ParseErrorKind, token: Option<&Token>, expression: &str) -> Self {
        let message = match token {
            Some(token) => format!(
                "{kind}: '{}'. Located at position {} within expression: {expression}",
                token.raw_value,
                token.index + 1
            ),
            None => kind.to_string(),
        };
        Self {
            kind,
            raw_token: token.map(|t| t.raw_value.clone()),
            position: token.map(|t| t.index + 1),
            expression: expression.to_string(),
            message,
        }
    }

    pub fn kind(&self) -> ParseErrorKind {
        self.kind
    }

    pub fn raw_token(&self) -> Option<&str> {
        self.raw_token.as_deref()
    }

    /// One-based character position of the offending token.
    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The same error with secrets replaced in its token, expression and message.
    pub fn masked(self, masker: &dyn SecretMasker) -> Self {
        Self {
            kind: self.kind,
            raw_token: self.raw_token.map(|raw| masker.mask_secrets(&raw)),
            position: self.position,
            expression: masker.mask_secrets(&self.expression),
            message: masker.mask_secrets(&self.message),
        }
    }
}

/// Builds expression trees with an operator-precedence parser.
///
/// The parser holds only the immutable table of built-in functions; all
/// per-parse state lives in a private context, so a single parser can be
/// shared freely.
///
/// # Examples
///
/// ```
/// use pipeline_expr::{ExpressionParser, NamedValueInfo, NoopTraceWriter, Value};
///
/// let parser = ExpressionParser::new();
/// let named_values = [NamedValueInfo::new("ref", Value::from("refs/heads/main"))];
/// let tree = parser
///     .create_tree("startsWith(ref, 'refs/heads/')", &NoopTraceWriter, &named_values, &[])
///     .unwrap()
///     .unwrap();
/// assert_eq!(tree.to_expression(), "startsWith(ref, 'refs/heads/')");
/// ```
#[derive(Debug, Clone)]
pub struct ExpressionParser {
    well_known: FunctionRegistry,
}

impl Default for ExpressionParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionParser {
    pub fn new() -> Self {
        Self { well_known: FunctionRegistry::well_known() }
    }

    /// A parser whose built-in function table is `registry`.
    pub fn with_registry(registry: FunctionRegistry) -> Self {
        Self { well_known: registry }
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.well_known
    }

    /// Parses `expression`, resolving keywords against the host's
    /// named-values and extension functions.
    ///
    /// Returns `Ok(None)` when the expression contains no tokens.
    pub fn create_tree(
        &self,
        expression: &str,
        trace: &dyn TraceWriter,
        named_values: &[NamedValueInfo],
        functions: &[FunctionInfo],
    ) -> Result<Option<Node>, ParseError> {
        trace.info(&format!("Parsing expression: <{expression}>"));
        self.parse(ParseContext::new(expression, false, named_values, functions))
    }

    /// Checks syntax only. Unknown functions and named-values are accepted
    /// and become nodes that evaluate to null.
    pub fn validate_syntax(&self, expression: &str, trace: &dyn TraceWriter) -> Result<Option<Node>, ParseError> {
        trace.info(&format!("Validating expression syntax: <{expression}>"));
        self.parse(ParseContext::new(expression, true, &[], &[]))
    }

    fn parse(&self, mut context: ParseContext<'_>) -> Result<Option<Node>, ParseError> {
        if context.expression.chars().count() > MAX_LENGTH {
            return Err(ParseError::new(ParseErrorKind::ExceededMaxLength, None, context.expression));
        }

        loop {
            let token = context.lexer.next_token();
            match token.kind {
                TokenKind::EndOfExpression => break,
                TokenKind::Unexpected => return Err(context.error(ParseErrorKind::UnexpectedSymbol, &token)),
                TokenKind::StartGroup | TokenKind::StartIndex | TokenKind::StartParameters
                    if context.lexer.unclosed_tokens().len() > MAX_DEPTH =>
                {
                    return Err(context.error(ParseErrorKind::ExceededMaxDepth, &token));
                }
                _ if token.is_operator() => self.push_operator(&mut context, token.clone())?,
                _ => self.push_operand(&mut context, &token)?,
            }
            context.last_token = Some(token);
        }

        let Some(last_token) = context.last_token.take() else {
            return Ok(None);
        };

        if !context.operators.is_empty() {
            let unexpected_end = match last_token.kind {
                TokenKind::EndGroup | TokenKind::EndIndex | TokenKind::EndParameters => false,
                TokenKind::Function => true,
                _ => last_token.is_operator(),
            };
            if unexpected_end || context.lexer.has_unclosed_tokens() {
                return Err(context.error(ParseErrorKind::UnexpectedEndOfExpression, &last_token));
            }
        }

        while !context.operators.is_empty() {
            self.flush_top_operator(&mut context)?;
        }

        let root = match context.operands.pop() {
            Some(root) if context.operands.is_empty() => root,
            _ => return Err(context.error(ParseErrorKind::UnexpectedEndOfExpression, &last_token)),
        };

        check_max_depth(&root, 1, context.expression)?;
        Ok(Some(root))
    }

    fn push_operand(&self, context: &mut ParseContext<'_>, token: &Token) -> Result<(), ParseError> {
        let node = match token.kind {
            TokenKind::Function => {
                let name = &token.raw_value;
                let info = self.well_known.get(name).or_else(|| context.function(name));
                match info {
                    Some(info) => Node::Function(FunctionNode {
                        name: name.clone(),
                        info: Some(info.clone()),
                        parameters: Vec::new(),
                    }),
                    None if context.allow_unknown_keywords => Node::Function(FunctionNode {
                        name: name.clone(),
                        info: None,
                        parameters: Vec::new(),
                    }),
                    None => return Err(context.error(ParseErrorKind::UnrecognizedFunction, token)),
                }
            }
            TokenKind::NamedValue => {
                let name = &token.raw_value;
                match context.named_values.get(name) {
                    Some(info) => Node::NamedValue(NamedValueNode { name: name.clone(), info: Some(info.clone()) }),
                    None if context.allow_unknown_keywords => {
                        Node::NamedValue(NamedValueNode { name: name.clone(), info: None })
                    }
                    None => return Err(context.error(ParseErrorKind::UnrecognizedNamedValue, token)),
                }
            }
            _ => match token.to_node() {
                Some(node) => node,
                None => return Err(context.error(ParseErrorKind::UnexpectedSymbol, token)),
            },
        };
        context.operands.push(node);
        Ok(())
    }

    fn push_operator(&self, context: &mut ParseContext<'_>, token: Token) -> Result<(), ParseError> {
        if token.associativity() == Associativity::LeftToRight {
            while let Some(top) = context.operators.last() {
                let is_opener = matches!(
                    top.kind,
                    TokenKind::StartGroup | TokenKind::StartIndex | TokenKind::StartParameters | TokenKind::Separator
                );
                if is_opener || token.precedence() > top.precedence() {
                    break;
                }
                self.flush_top_operator(context)?;
            }
        }

        let closes = matches!(token.kind, TokenKind::EndGroup | TokenKind::EndIndex | TokenKind::EndParameters);
        context.operators.push(token);
        if closes {
            self.flush_top_operator(context)?;
        }
        Ok(())
    }

    fn flush_top_operator(&self, context: &mut ParseContext<'_>) -> Result<(), ParseError> {
        let Some(kind) = context.operators.last().map(|t| t.kind) else {
            return Ok(());
        };
        match kind {
            TokenKind::EndGroup => {
                context.pop_operator(TokenKind::EndGroup)?;
                context.pop_operator(TokenKind::StartGroup)?;
                Ok(())
            }
            TokenKind::EndIndex => {
                context.pop_operator(TokenKind::EndIndex)?;
                let start = context.pop_operator(TokenKind::StartIndex)?;
                let mut index = Container::new(Operator::Index);
                index.parameters = context.pop_operands(2, &start)?;
                context.operands.push(Node::Operator(index));
                Ok(())
            }
            TokenKind::EndParameters => self.flush_top_end_parameters(context),
            _ => {
                let Some(token) = context.operators.pop() else {
                    return Ok(());
                };
                let Some(Node::Operator(mut container)) = token.to_node() else {
                    return Err(context.error(ParseErrorKind::UnexpectedSymbol, &token));
                };
                let operands = context.pop_operands(token.operand_count(), &token)?;
                for operand in operands {
                    // `a && b && c` is a single And with three operands.
                    match operand {
                        Node::Operator(inner)
                            if matches!(container.operator, Operator::And | Operator::Or)
                                && inner.operator == container.operator =>
                        {
                            container.parameters.extend(inner.parameters);
                        }
                        other => container.parameters.push(other),
                    }
                }
                context.operands.push(Node::Operator(container));
                Ok(())
            }
        }
    }

    fn flush_top_end_parameters(&self, context: &mut ParseContext<'_>) -> Result<(), ParseError> {
        context.pop_operator(TokenKind::EndParameters)?;

        let mut count = 0;
        if context.last_token.as_ref().map(|t| t.kind) != Some(TokenKind::StartParameters) {
            count = 1;
            while context.operators.last().is_some_and(|t| t.kind == TokenKind::Separator) {
                context.operators.pop();
                count += 1;
            }
        }

        let start = context.pop_operator(TokenKind::StartParameters)?;
        let parameters = context.pop_operands(count, &start)?;

        let arity = match context.operands.last_mut() {
            Some(Node::Function(function)) => {
                function.parameters = parameters;
                function.info.as_ref().map(|info| (info.min_parameters(), info.max_parameters()))
            }
            _ => return Err(context.error(ParseErrorKind::UnexpectedSymbol, &start)),
        };

        match arity {
            Some((min, _)) if count < min => Err(context.error(ParseErrorKind::TooFewParameters, &start)),
            Some((_, max)) if count > max => Err(context.error(ParseErrorKind::TooManyParameters, &start)),
            _ => Ok(()),
        }
    }
}

fn check_max_depth(node: &Node, depth: usize, expression: &str) -> Result<(), ParseError> {
    if depth > MAX_DEPTH {
        return Err(ParseError::new(ParseErrorKind::ExceededMaxDepth, None, expression));
    }
    for child in node.parameters() {
        check_max_depth(child, depth + 1, expression)?;
    }
    Ok(())
}

/// Mutable state of a single parse.
struct ParseContext<'a> {
    expression: &'a str,
    allow_unknown_keywords: bool,
    functions: HashMap<String, &'a FunctionInfo>,
    named_values: NamedValueTable<'a>,
    lexer: Lexer,
    operands: Vec<Node>,
    operators: Vec<Token>,
    last_token: Option<Token>,
}

impl<'a> ParseContext<'a> {
    fn new(
        expression: &'a str,
        allow_unknown_keywords: bool,
        named_values: &'a [NamedValueInfo],
        functions: &'a [FunctionInfo],
    ) -> Self {
        Self {
            expression,
            allow_unknown_keywords,
            functions: functions.iter().map(|f| (f.name().to_uppercase(), f)).collect(),
            named_values: NamedValueTable::new(named_values),
            lexer: Lexer::new(expression),
            operands: Vec::new(),
            operators: Vec::new(),
            last_token: None,
        }
    }

    fn error(&self, kind: ParseErrorKind, token: &Token) -> ParseError {
        ParseError::new(kind, Some(token), self.expression)
    }

    fn pop_operator(&mut self, expected: TokenKind) -> Result<Token, ParseError> {
        match self.operators.pop() {
            Some(token) if token.kind == expected => Ok(token),
            Some(token) => Err(self.error(ParseErrorKind::UnexpectedSymbol, &token)),
            None => Err(ParseError::new(ParseErrorKind::UnexpectedEndOfExpression, None, self.expression)),
        }
    }

    /// Pops `count` operands, returned in source order.
    fn pop_operands(&mut self, count: usize, token: &Token) -> Result<Vec<Node>, ParseError> {
        if self.operands.len() < count {
            return Err(self.error(ParseErrorKind::UnexpectedEndOfExpression, token));
        }
        let at = self.operands.len() - count;
        Ok(self.operands.split_off(at))
    }

    fn function(&self, name: &str) -> Option<&'a FunctionInfo> {
        self.functions.get(&name.to_uppercase()).copied()
    }
}
