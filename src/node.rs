//! Expression tree used to describe loss equations.
//!
//! An expression is either a [`Leaf`] or a compound node made of a [`Head`] and an
//! ordered list of children. The shape follows how call expressions are usually laid
//! out in a syntax tree:
//!
//! - Plain call: `Call[op, arg1, arg2, ...]`
//! - Broadcast call: `Broadcast[op, Tuple[arg1, arg2, ...]]`
//! - Tuple grouping: `Tuple[item1, item2, ...]`
//!
//! Operators appear in the head position of a call either as a symbol token (`^`, `*`)
//! or as a first-class [`Function`] value. [`Operator`] unifies both views.
//!
//! Children are stored behind [`Arc`], so a subtree can be referenced several times
//! from the same tree without being copied.

use std::fmt;
use std::sync::Arc;

use itertools::Itertools;

/// Name token of the power operator.
pub const POW_SYMBOL: &str = "^";
/// Name token of the multiplication operator.
pub const MUL_SYMBOL: &str = "*";

/// First-class callable operator values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Pow,
    Mul,
    Add,
    Sub,
    Div,
    Exp,
    Ln,
    Sqrt,
    Sin,
    Cos,
    Abs,
}

impl Function {
    /// Looks up the function an operator or function name refers to.
    ///
    /// Accepts both the infix token (`"^"`, `"*"`) and the spelled-out name
    /// (`"pow"`, `"mul"`). `"log"` is an alias of `"ln"`.
    pub fn from_name(name: &str) -> Option<Self> {
        let function = match name {
            "^" | "pow" => Function::Pow,
            "*" | "mul" => Function::Mul,
            "+" | "add" => Function::Add,
            "-" | "sub" => Function::Sub,
            "/" | "div" => Function::Div,
            "exp" => Function::Exp,
            "ln" | "log" => Function::Ln,
            "sqrt" => Function::Sqrt,
            "sin" => Function::Sin,
            "cos" => Function::Cos,
            "abs" => Function::Abs,
            _ => return None,
        };
        Some(function)
    }

    /// The spelled-out name of the function.
    pub fn name(&self) -> &'static str {
        match self {
            Function::Pow => "pow",
            Function::Mul => "mul",
            Function::Add => "add",
            Function::Sub => "sub",
            Function::Div => "div",
            Function::Exp => "exp",
            Function::Ln => "ln",
            Function::Sqrt => "sqrt",
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Abs => "abs",
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "math::{}", self.name())
    }
}

/// A terminal node.
#[derive(Debug, Clone, PartialEq)]
pub enum Leaf {
    /// An identifier or an operator name token
    Symbol(String),
    /// A callable operator value
    Function(Function),
    /// An integer literal
    Int(i64),
    /// A floating point literal
    Float(f64),
}

/// Discriminator of a compound node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Head {
    /// Scalar application, children are `[op, args...]`
    Call,
    /// Elementwise application, children are `[op, Tuple[args...]]`
    Broadcast,
    /// Ordered grouping of operands
    Tuple,
    /// Any other node kind, kept opaque
    Other(String),
}

/// A node of the expression tree.
///
/// Nodes are immutable values compared structurally.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Leaf(Leaf),
    Compound { head: Head, args: Vec<Arc<Node>> },
}

impl Node {
    pub fn symbol(name: impl Into<String>) -> Self {
        Node::Leaf(Leaf::Symbol(name.into()))
    }

    pub fn int(value: i64) -> Self {
        Node::Leaf(Leaf::Int(value))
    }

    pub fn float(value: f64) -> Self {
        Node::Leaf(Leaf::Float(value))
    }

    pub fn function(function: Function) -> Self {
        Node::Leaf(Leaf::Function(function))
    }

    pub fn compound(head: Head, args: Vec<Arc<Node>>) -> Self {
        Node::Compound { head, args }
    }

    /// Builds a plain call `op(args...)`.
    pub fn call(op: Operator, args: impl IntoIterator<Item = Node>) -> Self {
        Self::call_shared(op, args.into_iter().map(Arc::new))
    }

    /// Builds a plain call from already shared children.
    pub fn call_shared(op: Operator, args: impl IntoIterator<Item = Arc<Node>>) -> Self {
        let mut children = vec![Arc::new(op.into_node())];
        children.extend(args);
        Node::Compound {
            head: Head::Call,
            args: children,
        }
    }

    /// Builds a broadcast call `op.(args...)`, grouping `args` in a tuple.
    pub fn broadcast(op: Operator, args: impl IntoIterator<Item = Node>) -> Self {
        Self::broadcast_shared(op, args.into_iter().map(Arc::new))
    }

    /// Builds a broadcast call from already shared operands.
    pub fn broadcast_shared(op: Operator, args: impl IntoIterator<Item = Arc<Node>>) -> Self {
        Node::Compound {
            head: Head::Broadcast,
            args: vec![
                Arc::new(op.into_node()),
                Arc::new(Self::tuple_shared(args)),
            ],
        }
    }

    pub fn tuple(items: impl IntoIterator<Item = Node>) -> Self {
        Self::tuple_shared(items.into_iter().map(Arc::new))
    }

    pub fn tuple_shared(items: impl IntoIterator<Item = Arc<Node>>) -> Self {
        Node::Compound {
            head: Head::Tuple,
            args: items.into_iter().collect(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    pub fn head(&self) -> Option<&Head> {
        match self {
            Node::Leaf(_) => None,
            Node::Compound { head, .. } => Some(head),
        }
    }

    /// Children of a compound node, empty for leaves.
    pub fn args(&self) -> &[Arc<Node>] {
        match self {
            Node::Leaf(_) => &[],
            Node::Compound { args, .. } => args,
        }
    }

    /// Returns the value of an integer literal leaf.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Node::Leaf(Leaf::Int(value)) => Some(*value),
            _ => None,
        }
    }
}

/// An operator reference in either of its two representations.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    /// A name token such as `^`
    Symbolic(String),
    /// A callable value such as [`Function::Pow`]
    Callable(Function),
}

impl Operator {
    pub fn pow_symbolic() -> Self {
        Operator::Symbolic(POW_SYMBOL.to_string())
    }

    pub fn mul_symbolic() -> Self {
        Operator::Symbolic(MUL_SYMBOL.to_string())
    }

    /// Views a leaf as an operator reference. Literals are not operators.
    pub fn from_node(node: &Node) -> Option<Self> {
        match node {
            Node::Leaf(Leaf::Symbol(name)) => Some(Operator::Symbolic(name.clone())),
            Node::Leaf(Leaf::Function(function)) => Some(Operator::Callable(*function)),
            _ => None,
        }
    }

    /// The function this operator denotes, if it is a known one.
    pub fn function(&self) -> Option<Function> {
        match self {
            Operator::Symbolic(name) => Function::from_name(name),
            Operator::Callable(function) => Some(*function),
        }
    }

    /// True for both `^` and [`Function::Pow`].
    pub fn is_power(&self) -> bool {
        match self {
            Operator::Symbolic(name) => name == POW_SYMBOL,
            Operator::Callable(function) => *function == Function::Pow,
        }
    }

    /// The multiplication operator in the same representation as `self`.
    pub fn multiplication(&self) -> Self {
        match self {
            Operator::Symbolic(_) => Self::mul_symbolic(),
            Operator::Callable(_) => Operator::Callable(Function::Mul),
        }
    }

    pub fn into_node(self) -> Node {
        match self {
            Operator::Symbolic(name) => Node::Leaf(Leaf::Symbol(name)),
            Operator::Callable(function) => Node::Leaf(Leaf::Function(function)),
        }
    }
}

impl From<Function> for Operator {
    fn from(function: Function) -> Self {
        Operator::Callable(function)
    }
}

const INFIX: [&str; 5] = ["^", "*", "+", "-", "/"];

/// Formats the tree in a compact infix notation.
///
/// - Symbolic infix operators with two or more operands print as `(a * b * c)`
/// - A symbolic unary minus prints as `-(x)`
/// - Other calls print as `f(a, b)`
/// - Broadcast calls print as `f.(a, b)`
/// - Tuples print as `(a, b)`
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Leaf(Leaf::Symbol(name)) => write!(f, "{name}"),
            Node::Leaf(Leaf::Function(function)) => write!(f, "{function}"),
            Node::Leaf(Leaf::Int(value)) => write!(f, "{value}"),
            Node::Leaf(Leaf::Float(value)) => write!(f, "{value:?}"),
            Node::Compound { head, args } => match (head, args.split_first()) {
                (Head::Call, Some((op, operands))) => match &**op {
                    Node::Leaf(Leaf::Symbol(name)) if INFIX.contains(&name.as_str()) => {
                        if operands.len() == 1 {
                            write!(f, "{name}({})", operands[0])
                        } else {
                            let sep = format!(" {name} ");
                            write!(f, "({})", operands.iter().join(&sep))
                        }
                    }
                    _ => write!(f, "{op}({})", operands.iter().join(", ")),
                },
                (Head::Broadcast, Some((op, operands))) => match operands {
                    [tuple] if tuple.head() == Some(&Head::Tuple) => {
                        write!(f, "{op}.({})", tuple.args().iter().join(", "))
                    }
                    _ => write!(f, "{op}.[{}]", operands.iter().join(", ")),
                },
                (Head::Tuple, _) => write!(f, "({})", args.iter().join(", ")),
                (Head::Other(name), _) => write!(f, "{name}[{}]", args.iter().join(", ")),
                (_, None) => write!(f, "{head:?}[]"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Node {
        Node::symbol("x")
    }

    #[test]
    fn test_operator_views() {
        assert_eq!(
            Operator::from_node(&Node::symbol("^")),
            Some(Operator::pow_symbolic())
        );
        assert_eq!(
            Operator::from_node(&Node::function(Function::Pow)),
            Some(Operator::Callable(Function::Pow))
        );
        assert_eq!(Operator::from_node(&Node::int(2)), None);
        assert_eq!(Operator::from_node(&Node::tuple([x()])), None);
    }

    #[test]
    fn test_is_power() {
        assert!(Operator::pow_symbolic().is_power());
        assert!(Operator::Callable(Function::Pow).is_power());
        assert!(!Operator::mul_symbolic().is_power());
        assert!(!Operator::Callable(Function::Mul).is_power());
        // The callable name is not the symbolic token
        assert!(!Operator::Symbolic("pow".to_string()).is_power());
    }

    #[test]
    fn test_multiplication_keeps_representation() {
        assert_eq!(
            Operator::pow_symbolic().multiplication(),
            Operator::mul_symbolic()
        );
        assert_eq!(
            Operator::Callable(Function::Pow).multiplication(),
            Operator::Callable(Function::Mul)
        );
    }

    #[test]
    fn test_constructors() {
        let call = Node::call(Operator::pow_symbolic(), [x(), Node::int(2)]);
        assert_eq!(call.head(), Some(&Head::Call));
        assert_eq!(call.args().len(), 3);
        assert_eq!(*call.args()[0], Node::symbol("^"));

        let bcast = Node::broadcast(Operator::Callable(Function::Pow), [x(), Node::int(2)]);
        assert_eq!(bcast.head(), Some(&Head::Broadcast));
        assert_eq!(bcast.args().len(), 2);
        assert_eq!(bcast.args()[1].head(), Some(&Head::Tuple));
        assert_eq!(bcast.args()[1].args().len(), 2);

        assert!(x().is_leaf());
        assert!(x().args().is_empty());
        assert_eq!(Node::int(3).as_int(), Some(3));
        assert_eq!(Node::float(3.0).as_int(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", x()), "x");
        assert_eq!(format!("{}", Node::float(2.0)), "2.0");

        let pow = Node::call(Operator::pow_symbolic(), [x(), Node::int(2)]);
        assert_eq!(format!("{pow}"), "(x ^ 2)");

        let mul = Node::call(Operator::mul_symbolic(), [x(), x(), x()]);
        assert_eq!(format!("{mul}"), "(x * x * x)");

        let neg = Node::call(Operator::Symbolic("-".to_string()), [x()]);
        assert_eq!(format!("{neg}"), "-(x)");

        let callable = Node::call(Function::Mul.into(), [x(), x()]);
        assert_eq!(format!("{callable}"), "math::mul(x, x)");

        let bcast = Node::broadcast(Function::Pow.into(), [x(), Node::int(2)]);
        assert_eq!(format!("{bcast}"), "math::pow.(x, 2)");

        let exp = Node::call(Operator::Symbolic("exp".to_string()), [pow]);
        assert_eq!(format!("{exp}"), "exp((x ^ 2))");
    }
}
