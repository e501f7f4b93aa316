use std::sync::LazyLock;

use regex::Regex;

use crate::ast::{Token, TokenKind};
use crate::value::{Value, parse_number};

static LEGAL_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$")
        .unwrap_or_else(|e| unreachable!("invalid keyword grammar: {e}"))
});

/// Whether `s` can be written as a bare keyword, i.e. `github.event_name`
/// rather than `github['event name']`.
pub fn is_legal_keyword(s: &str) -> bool {
    LEGAL_KEYWORD.is_match(s)
}

/// Splits an expression into tokens.
///
/// The lexer rejects tokens that cannot legally follow the previous one by
/// returning a [`TokenKind::Unexpected`] token, and tracks the groups,
/// indexes and parameter lists that are still open.
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    last_kind: Option<TokenKind>,
    unclosed: Vec<TokenKind>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
            last_kind: None,
            unclosed: Vec::new(),
        }
    }

    /// Openers (`(`, `[`, function `(`) not yet matched by a closer.
    pub fn unclosed_tokens(&self) -> &[TokenKind] {
        &self.unclosed
    }

    pub fn has_unclosed_tokens(&self) -> bool {
        !self.unclosed.is_empty()
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn text(&self, start: usize) -> String {
        self.input[start..self.position].iter().collect()
    }

    fn is_boundary(ch: char) -> bool {
        matches!(ch, '(' | '[' | ')' | ']' | ',' | '.' | '!' | '>' | '<' | '=' | '&' | '|')
            || ch.is_whitespace()
    }

    /// Consumes at least one character, then everything up to the next boundary.
    fn read_to_boundary(&mut self) {
        self.advance();
        while let Some(ch) = self.current_char() {
            if Self::is_boundary(ch) {
                break;
            }
            self.advance();
        }
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        let start = self.position;
        let Some(ch) = self.current_char() else {
            return Token::new(TokenKind::EndOfExpression, "", start);
        };

        match ch {
            '(' => {
                self.advance();
                let kind = if self.last_kind == Some(TokenKind::Function) {
                    TokenKind::StartParameters
                } else {
                    TokenKind::StartGroup
                };
                self.create_token(kind, "(", start, Value::Null)
            }
            ')' => {
                self.advance();
                let kind = if self.unclosed.last() == Some(&TokenKind::StartParameters) {
                    TokenKind::EndParameters
                } else {
                    TokenKind::EndGroup
                };
                self.create_token(kind, ")", start, Value::Null)
            }
            '[' => self.single(TokenKind::StartIndex, start),
            ']' => self.single(TokenKind::EndIndex, start),
            ',' => self.single(TokenKind::Separator, start),
            '*' => self.single(TokenKind::Wildcard, start),
            '\'' => self.read_string(),
            '!' | '>' | '<' | '=' | '&' | '|' => self.read_operator(),
            '.' if self.number_allowed() => self.read_number(),
            '.' => self.single(TokenKind::Dereference, start),
            '-' | '+' | '0'..='9' => self.read_number(),
            _ => self.read_keyword(),
        }
    }

    fn single(&mut self, kind: TokenKind, start: usize) -> Token {
        self.advance();
        let raw = self.text(start);
        self.create_token(kind, raw, start, Value::Null)
    }

    /// A leading `.` starts a number only where an operand may begin.
    fn number_allowed(&self) -> bool {
        match self.last_kind {
            None => true,
            Some(kind) => {
                matches!(
                    kind,
                    TokenKind::Separator
                        | TokenKind::StartGroup
                        | TokenKind::StartIndex
                        | TokenKind::StartParameters
                ) || kind.is_logical_operator()
            }
        }
    }

    fn read_string(&mut self) -> Token {
        let start = self.position;
        self.advance();

        let mut value = String::new();
        let mut closed = false;
        while let Some(ch) = self.current_char() {
            self.advance();
            if ch == '\'' {
                if self.current_char() == Some('\'') {
                    value.push('\'');
                    self.advance();
                } else {
                    closed = true;
                    break;
                }
            } else {
                value.push(ch);
            }
        }

        let raw = self.text(start);
        if closed {
            self.create_token(TokenKind::String, raw, start, Value::String(value))
        } else {
            self.create_token(TokenKind::Unexpected, raw, start, Value::Null)
        }
    }

    fn read_operator(&mut self) -> Token {
        let start = self.position;
        let pair: String = [self.current_char(), self.peek_char(1)].into_iter().flatten().collect();

        let two = match pair.as_str() {
            "!=" => Some(TokenKind::NotEqual),
            ">=" => Some(TokenKind::GreaterThanOrEqual),
            "<=" => Some(TokenKind::LessThanOrEqual),
            "==" => Some(TokenKind::Equal),
            "&&" => Some(TokenKind::And),
            "||" => Some(TokenKind::Or),
            _ => None,
        };
        if let Some(kind) = two {
            self.position += 2;
            return self.create_token(kind, pair, start, Value::Null);
        }

        let one = match self.current_char() {
            Some('!') => Some(TokenKind::Not),
            Some('>') => Some(TokenKind::GreaterThan),
            Some('<') => Some(TokenKind::LessThan),
            _ => None,
        };
        if let Some(kind) = one {
            return self.single(kind, start);
        }

        self.read_to_boundary();
        let raw = self.text(start);
        self.create_token(TokenKind::Unexpected, raw, start, Value::Null)
    }

    fn read_number(&mut self) -> Token {
        let start = self.position;
        self.advance();
        while let Some(ch) = self.current_char() {
            if Self::is_boundary(ch) && ch != '.' {
                break;
            }
            self.advance();
        }

        let raw = self.text(start);
        let number = parse_number(&raw);
        if number.is_nan() {
            self.create_token(TokenKind::Unexpected, raw, start, Value::Null)
        } else {
            self.create_token(TokenKind::Number, raw, start, Value::Number(number))
        }
    }

    fn read_keyword(&mut self) -> Token {
        let start = self.position;
        self.read_to_boundary();
        let raw = self.text(start);

        if !is_legal_keyword(&raw) {
            return self.create_token(TokenKind::Unexpected, raw, start, Value::Null);
        }

        if self.last_kind == Some(TokenKind::Dereference) {
            return self.create_token(TokenKind::PropertyName, raw, start, Value::Null);
        }

        let (kind, value) = match raw.as_str() {
            "null" => (TokenKind::Null, Value::Null),
            s if s.eq_ignore_ascii_case("true") => (TokenKind::Boolean, Value::Boolean(true)),
            s if s.eq_ignore_ascii_case("false") => (TokenKind::Boolean, Value::Boolean(false)),
            "NaN" => (TokenKind::Number, Value::Number(f64::NAN)),
            "Infinity" => (TokenKind::Number, Value::Number(f64::INFINITY)),
            _ => {
                let mut lookahead = self.position;
                while self.input.get(lookahead).is_some_and(|c| c.is_whitespace()) {
                    lookahead += 1;
                }
                if self.input.get(lookahead) == Some(&'(') {
                    (TokenKind::Function, Value::Null)
                } else {
                    (TokenKind::NamedValue, Value::Null)
                }
            }
        };
        self.create_token(kind, raw, start, value)
    }

    /// Checks that `kind` may follow the previous token and maintains the
    /// stack of unclosed tokens. Illegal tokens come back as `Unexpected`.
    fn create_token(&mut self, kind: TokenKind, raw: impl Into<String>, index: usize, value: Value) -> Token {
        let raw = raw.into();
        let kind = if self.is_legal_after_last(kind) && self.balance(kind) {
            kind
        } else {
            TokenKind::Unexpected
        };

        self.last_kind = Some(kind);
        if kind == TokenKind::Unexpected {
            Token::new(kind, raw, index)
        } else {
            Token::with_value(kind, raw, index, value)
        }
    }

    fn is_legal_after_last(&self, kind: TokenKind) -> bool {
        let last = self.last_kind;
        let starts_operand = match last {
            None => true,
            Some(l) => {
                matches!(
                    l,
                    TokenKind::Separator
                        | TokenKind::StartGroup
                        | TokenKind::StartParameters
                        | TokenKind::StartIndex
                ) || l.is_logical_operator()
            }
        };
        let after_accessible = matches!(
            last,
            Some(
                TokenKind::EndGroup
                    | TokenKind::EndParameters
                    | TokenKind::EndIndex
                    | TokenKind::Wildcard
                    | TokenKind::PropertyName
                    | TokenKind::NamedValue
            )
        );
        let after_value = after_accessible || last.is_some_and(|l| l.is_literal());

        match kind {
            TokenKind::Unexpected | TokenKind::EndOfExpression => true,
            TokenKind::StartGroup
            | TokenKind::Not
            | TokenKind::Null
            | TokenKind::Boolean
            | TokenKind::Number
            | TokenKind::String
            | TokenKind::Function
            | TokenKind::NamedValue => starts_operand,
            TokenKind::StartIndex | TokenKind::Dereference => after_accessible,
            TokenKind::StartParameters => last == Some(TokenKind::Function),
            TokenKind::EndParameters => last == Some(TokenKind::StartParameters) || after_value,
            TokenKind::Wildcard => matches!(last, Some(TokenKind::StartIndex | TokenKind::Dereference)),
            TokenKind::PropertyName => last == Some(TokenKind::Dereference),
            TokenKind::EndGroup
            | TokenKind::EndIndex
            | TokenKind::Separator
            | TokenKind::NotEqual
            | TokenKind::GreaterThan
            | TokenKind::GreaterThanOrEqual
            | TokenKind::LessThan
            | TokenKind::LessThanOrEqual
            | TokenKind::Equal
            | TokenKind::And
            | TokenKind::Or => after_value,
        }
    }

    fn balance(&mut self, kind: TokenKind) -> bool {
        let top = self.unclosed.last().copied();
        match kind {
            TokenKind::StartGroup | TokenKind::StartIndex | TokenKind::StartParameters => {
                self.unclosed.push(kind);
                true
            }
            TokenKind::EndGroup => self.close(top, TokenKind::StartGroup),
            TokenKind::EndIndex => self.close(top, TokenKind::StartIndex),
            TokenKind::EndParameters => self.close(top, TokenKind::StartParameters),
            TokenKind::Separator => top == Some(TokenKind::StartParameters),
            _ => true,
        }
    }

    fn close(&mut self, top: Option<TokenKind>, opener: TokenKind) -> bool {
        if top == Some(opener) {
            self.unclosed.pop();
            true
        } else {
            false
        }
    }
}

impl Iterator for Lexer {
    type Item = Token;

    /// Yields tokens up to, not including, the end of the expression.
    fn next(&mut self) -> Option<Token> {
        let token = self.next_token();
        (token.kind != TokenKind::EndOfExpression).then_some(token)
    }
}
