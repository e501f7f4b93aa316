/// Operators that combine or index sub-expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    // Logical
    /// Logical AND (`&&`), returns the first falsy operand
    And,
    /// Logical OR (`||`), returns the first truthy operand
    Or,
    /// Logical NOT (`!`)
    Not,

    // Comparison
    /// Equal (`==`)
    Equal,
    /// Not equal (`!=`)
    NotEqual,
    /// Greater than (`>`)
    GreaterThan,
    /// Greater than or equal (`>=`)
    GreaterThanOrEqual,
    /// Less than (`<`)
    LessThan,
    /// Less than or equal (`<=`)
    LessThanOrEqual,

    // Access
    /// Property or element access (`a.b`, `a[b]`)
    Index,
}

impl Operator {
    pub fn name(&self) -> &'static str {
        match self {
            Operator::And => "And",
            Operator::Or => "Or",
            Operator::Not => "Not",
            Operator::Equal => "Equal",
            Operator::NotEqual => "NotEqual",
            Operator::GreaterThan => "GreaterThan",
            Operator::GreaterThanOrEqual => "GreaterThanOrEqual",
            Operator::LessThan => "LessThan",
            Operator::LessThanOrEqual => "LessThanOrEqual",
            Operator::Index => "Index",
        }
    }

    /// Source text of infix operators. `None` for `!` and indexing.
    pub fn symbol(&self) -> Option<&'static str> {
        match self {
            Operator::And => Some("&&"),
            Operator::Or => Some("||"),
            Operator::Equal => Some("=="),
            Operator::NotEqual => Some("!="),
            Operator::GreaterThan => Some(">"),
            Operator::GreaterThanOrEqual => Some(">="),
            Operator::LessThan => Some("<"),
            Operator::LessThanOrEqual => Some("<="),
            Operator::Not | Operator::Index => None,
        }
    }
}
