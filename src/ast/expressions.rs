use std::collections::HashMap;

use crate::ast::Operator;
use crate::lexer::is_legal_keyword;
use crate::registry::{FunctionInfo, NamedValueInfo};
use crate::value::{Value, format_value};

/// A node of a parsed expression tree.
///
/// Trees are produced by [`ExpressionParser`](crate::ExpressionParser) and
/// are immutable afterwards; evaluate them with [`Node::evaluate`].
#[derive(Debug, Clone)]
pub enum Node {
    /// Constant value
    ///
    /// # Example
    /// ```text
    /// 'refs/heads/main'
    /// ```
    Literal(Value),

    /// `*` in an index position
    Wildcard,

    /// Host-supplied named-value
    ///
    /// When the parser allows unknown keywords, unresolved names are kept
    /// with no provider and evaluate to null.
    NamedValue(NamedValueNode),

    /// Function call, built-in or host-supplied
    Function(FunctionNode),

    /// Logical, comparison or index operator applied to its operands
    Operator(Container),
}

#[derive(Debug, Clone)]
pub struct NamedValueNode {
    pub(crate) name: String,
    pub(crate) info: Option<NamedValueInfo>,
}

impl NamedValueNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `false` for names accepted without a provider during syntax validation.
    pub fn is_resolved(&self) -> bool {
        self.info.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct FunctionNode {
    pub(crate) name: String,
    pub(crate) info: Option<FunctionInfo>,
    pub(crate) parameters: Vec<Node>,
}

impl FunctionNode {
    /// The name as written in the expression.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[Node] {
        &self.parameters
    }

    pub fn is_resolved(&self) -> bool {
        self.info.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Container {
    pub(crate) operator: Operator,
    pub(crate) parameters: Vec<Node>,
}

impl Container {
    pub(crate) fn new(operator: Operator) -> Self {
        Self { operator, parameters: Vec::new() }
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn parameters(&self) -> &[Node] {
        &self.parameters
    }
}

impl Node {
    /// Name used in verbose trace lines (`Evaluating Index:`).
    pub fn name(&self) -> &str {
        match self {
            Node::Literal(value) => value.kind().as_str(),
            Node::Wildcard => "Wildcard",
            Node::NamedValue(n) => &n.name,
            Node::Function(f) => &f.name,
            Node::Operator(c) => c.operator.name(),
        }
    }

    /// Child nodes, in source order. Empty for leaves.
    pub fn parameters(&self) -> &[Node] {
        match self {
            Node::Function(f) => &f.parameters,
            Node::Operator(c) => &c.parameters,
            Node::Literal(_) | Node::Wildcard | Node::NamedValue(_) => &[],
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Node::Function(_) | Node::Operator(_))
    }

    pub fn is_operator(&self, operator: Operator) -> bool {
        matches!(self, Node::Operator(c) if c.operator == operator)
    }

    pub(crate) fn named_value_name(&self) -> Option<&str> {
        match self {
            Node::NamedValue(n) => Some(&n.name),
            _ => None,
        }
    }

    /// Whether trace output records this node's result and substitutes it
    /// into the realized expression.
    pub(crate) fn traces_realized_value(&self) -> bool {
        matches!(self, Node::NamedValue(_) | Node::Function(_)) || self.is_operator(Operator::Index)
    }

    /// Identity of this node within its tree while the tree is borrowed.
    pub(crate) fn id(&self) -> usize {
        std::ptr::from_ref(self) as usize
    }

    /// Renders the tree back into normalized expression text.
    ///
    /// Groups are made explicit, so `a && b || c` becomes `((a && b) || c)`.
    pub fn to_expression(&self) -> String {
        self.render(None)
    }

    /// Renders the tree with each recorded sub-result substituted for the
    /// sub-expression that produced it.
    pub(crate) fn to_realized_expression(&self, results: &HashMap<usize, String>) -> String {
        self.render(Some(results))
    }

    fn render(&self, results: Option<&HashMap<usize, String>>) -> String {
        if let Some(results) = results
            && let Some(realized) = results.get(&self.id())
        {
            return realized.clone();
        }

        let join = |nodes: &[Node], separator: &str| {
            nodes.iter().map(|n| n.render(results)).collect::<Vec<_>>().join(separator)
        };

        match self {
            Node::Literal(value) => format_value(value, None),
            Node::Wildcard => "*".to_string(),
            Node::NamedValue(n) => n.name.clone(),
            Node::Function(f) => format!("{}({})", f.name, join(&f.parameters, ", ")),
            Node::Operator(c) => match (c.operator, c.parameters.as_slice()) {
                (Operator::Not, [operand]) => format!("!{}", operand.render(results)),
                (Operator::Index, [object, Node::Literal(Value::String(key))])
                    if is_legal_keyword(key) =>
                {
                    format!("{}.{key}", object.render(results))
                }
                (Operator::Index, [object, index]) => {
                    format!("{}[{}]", object.render(results), index.render(results))
                }
                (op, parameters) => {
                    let symbol = op.symbol().unwrap_or(op.name());
                    format!("({})", join(parameters, &format!(" {symbol} ")))
                }
            },
        }
    }

    /// Pre-order iterator over this node and all of its descendants.
    pub fn traverse(&self) -> Traverse<'_> {
        Traverse { stack: vec![self] }
    }
}

/// Pre-order walk of an expression tree.
pub struct Traverse<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for Traverse<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.parameters().iter().rev());
        Some(node)
    }
}
