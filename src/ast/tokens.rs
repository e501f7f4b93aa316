use crate::ast::{Container, Node, Operator};
use crate::value::Value;

/// The kind of a lexical token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Anything the lexer could not recognize, or a symbol in an illegal position
    Unexpected,

    /// No more tokens
    EndOfExpression,

    // Literals
    /// `null`
    Null,

    /// `true` or `false`, in any letter case
    Boolean,

    /// Decimal, hexadecimal (`0x`), octal (`0o`), `NaN` or `Infinity`
    ///
    /// # Examples
    /// ```text
    /// 42
    /// -1.5e3
    /// 0xff
    /// .5
    /// ```
    Number,

    /// Single-quoted string, with `''` as an escaped quote
    ///
    /// # Examples
    /// ```text
    /// 'refs/heads/main'
    /// 'it''s'
    /// ```
    String,

    // Identifiers
    /// Keyword that is not followed by `(`, resolved against the host's named-values
    ///
    /// # Examples
    /// ```text
    /// github
    /// env
    /// ```
    NamedValue,

    /// Keyword immediately followed by `(`
    Function,

    /// Keyword following a `.` dereference
    PropertyName,

    /// `*` inside an index or after a dereference
    Wildcard,

    // Grouping
    /// `(` opening a group
    StartGroup,
    /// `)` closing a group
    EndGroup,
    /// `[`
    StartIndex,
    /// `]`
    EndIndex,
    /// `(` following a function name
    StartParameters,
    /// `)` closing a parameter list
    EndParameters,
    /// `,` between parameters
    Separator,
    /// `.` between an object and a property name
    Dereference,

    // Logical operators
    /// `!`
    Not,
    /// `!=`
    NotEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// `==`
    Equal,
    /// `&&`
    And,
    /// `||`
    Or,
}

impl TokenKind {
    /// Whether the kind is one of `! != > >= < <= == && ||`.
    pub fn is_logical_operator(&self) -> bool {
        matches!(
            self,
            TokenKind::Not
                | TokenKind::NotEqual
                | TokenKind::GreaterThan
                | TokenKind::GreaterThanOrEqual
                | TokenKind::LessThan
                | TokenKind::LessThanOrEqual
                | TokenKind::Equal
                | TokenKind::And
                | TokenKind::Or
        )
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            TokenKind::Null | TokenKind::Boolean | TokenKind::Number | TokenKind::String
        )
    }

    fn operator(&self) -> Option<Operator> {
        let op = match self {
            TokenKind::Not => Operator::Not,
            TokenKind::NotEqual => Operator::NotEqual,
            TokenKind::GreaterThan => Operator::GreaterThan,
            TokenKind::GreaterThanOrEqual => Operator::GreaterThanOrEqual,
            TokenKind::LessThan => Operator::LessThan,
            TokenKind::LessThanOrEqual => Operator::LessThanOrEqual,
            TokenKind::Equal => Operator::Equal,
            TokenKind::And => Operator::And,
            TokenKind::Or => Operator::Or,
            TokenKind::StartIndex | TokenKind::Dereference => Operator::Index,
            _ => return None,
        };
        Some(op)
    }
}

/// How operators of equal precedence group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    None,
    LeftToRight,
    RightToLeft,
}

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,

    /// The source text of the token, quotes included for strings.
    pub raw_value: String,

    /// Zero-based character offset within the expression.
    pub index: usize,

    /// The parsed value of literal tokens; `Null` for everything else.
    pub value: Value,
}

impl Token {
    pub fn new(kind: TokenKind, raw_value: impl Into<String>, index: usize) -> Self {
        Self { kind, raw_value: raw_value.into(), index, value: Value::Null }
    }

    pub fn with_value(kind: TokenKind, raw_value: impl Into<String>, index: usize, value: Value) -> Self {
        Self { kind, raw_value: raw_value.into(), index, value }
    }

    pub fn associativity(&self) -> Associativity {
        match self.kind {
            TokenKind::StartGroup => Associativity::None,
            TokenKind::Not => Associativity::RightToLeft,
            _ => Associativity::LeftToRight,
        }
    }

    pub fn precedence(&self) -> u8 {
        match self.kind {
            TokenKind::StartGroup => 20,
            TokenKind::StartIndex | TokenKind::StartParameters | TokenKind::Dereference => 19,
            TokenKind::Not => 16,
            TokenKind::GreaterThan
            | TokenKind::GreaterThanOrEqual
            | TokenKind::LessThan
            | TokenKind::LessThanOrEqual => 11,
            TokenKind::Equal | TokenKind::NotEqual => 10,
            TokenKind::And => 6,
            TokenKind::Or => 5,
            TokenKind::EndGroup
            | TokenKind::EndIndex
            | TokenKind::EndParameters
            | TokenKind::Separator => 1,
            _ => 0,
        }
    }

    /// Number of operands consumed when the operator is reduced.
    pub fn operand_count(&self) -> usize {
        match self.kind {
            TokenKind::StartIndex | TokenKind::Dereference => 2,
            TokenKind::Not => 1,
            kind if kind.is_logical_operator() => 2,
            _ => 0,
        }
    }

    pub fn is_operator(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::StartGroup
                | TokenKind::StartIndex
                | TokenKind::StartParameters
                | TokenKind::EndGroup
                | TokenKind::EndIndex
                | TokenKind::EndParameters
                | TokenKind::Separator
                | TokenKind::Dereference
        ) || self.kind.is_logical_operator()
    }

    /// Converts the token into the node it stands for.
    ///
    /// Literals, property names and wildcards become leaves, operators
    /// become empty containers. Grouping tokens, named-values and functions
    /// have no standalone node and return `None`.
    pub fn to_node(&self) -> Option<Node> {
        match self.kind {
            TokenKind::Null | TokenKind::Boolean | TokenKind::Number | TokenKind::String => {
                Some(Node::Literal(self.value.clone()))
            }
            TokenKind::PropertyName => Some(Node::Literal(Value::String(self.raw_value.clone()))),
            TokenKind::Wildcard => Some(Node::Wildcard),
            kind => kind.operator().map(|op| Node::Operator(Container::new(op))),
        }
    }
}
