//! Conversion from evalexpr operator trees into expression nodes.
//!
//! Equations are written as evalexpr strings. This module maps the parsed evalexpr
//! AST onto [`Node`] so that both operator representations and both call forms can
//! be expressed in plain text:
//!
//! | evalexpr | node |
//! |---|---|
//! | `x ^ 2` | `Call[^, x, 2]` (symbolic operator) |
//! | `math::pow(x, 2)` | `Call[math::pow, x, 2]` (callable operator) |
//! | `dot::pow(x, 2)` | `Broadcast[math::pow, Tuple[x, 2]]` |
//! | `exp(x)` | `Call[exp, x]` |
//! | `pow(x, 2)` | rejected, written `x ^ 2` |
//! | `(a, b)` | `Tuple[a, b]` |
//!
//! The main entry point is [`build_node`]; [`build_residual`] additionally turns a
//! top-level `lhs == rhs` into `lhs - rhs`.

use std::collections::{HashMap, HashSet};

use evalexpr::{Node as EvalNode, Operator as EvalOperator, Value};

use crate::errors::ConvertError;
use crate::node::{Function, Node, Operator};

/// Namespace of callable operator values.
const CALLABLE_PREFIX: &str = "math::";
/// Namespace of broadcast calls.
const BROADCAST_PREFIX: &str = "dot::";
/// Function names accepted without a namespace. Arithmetic is written infix.
const PLAIN_FUNCTIONS: [&str; 7] = ["exp", "ln", "log", "sqrt", "sin", "cos", "abs"];

/// Converts an evalexpr AST node into an expression node.
///
/// # Arguments
/// * `node` - The evalexpr AST node to convert
///
/// # Returns
/// * `Result<Node, ConvertError>` - The converted expression or an error if conversion fails
///
/// # Example
/// ```
/// use evalexpr::build_operator_tree;
/// use powexpand::convert::build_node;
///
/// let tree = build_operator_tree::<evalexpr::DefaultNumericTypes>("x^2 + 1").unwrap();
/// let node = build_node(&tree).unwrap();
/// assert_eq!(node.to_string(), "((x ^ 2) + 1)");
/// ```
pub fn build_node(node: &EvalNode) -> Result<Node, ConvertError> {
    match node.operator() {
        EvalOperator::Add => infix("+", node),
        EvalOperator::Sub => infix("-", node),
        EvalOperator::Mul => infix("*", node),
        EvalOperator::Div => infix("/", node),
        EvalOperator::Exp => infix("^", node),
        // Negated literals stay literals so that `x^-1` keeps an integer exponent
        EvalOperator::Neg => {
            let [child] = expect_children::<1>("-", node)?;
            match child.operator() {
                EvalOperator::Const {
                    value: Value::Int(i),
                } => Ok(Node::int(-*i)),
                EvalOperator::Const {
                    value: Value::Float(f),
                } => Ok(Node::float(-*f)),
                _ => Ok(Node::call(
                    Operator::Symbolic("-".to_string()),
                    [build_node(child)?],
                )),
            }
        }
        EvalOperator::Const { value } => match value {
            Value::Int(i) => Ok(Node::int(*i)),
            Value::Float(f) => Ok(Node::float(*f)),
            _ => Err(ConvertError::ConstOperator(format!("{value:?}"))),
        },
        EvalOperator::VariableIdentifierRead { identifier } => Ok(Node::symbol(identifier.as_str())),
        EvalOperator::FunctionIdentifier { identifier } => function_call(identifier, node),
        EvalOperator::Tuple => Ok(Node::tuple(
            node.children()
                .iter()
                .map(build_node)
                .collect::<Result<Vec<_>, _>>()?,
        )),
        EvalOperator::RootNode => {
            let children = node.children();
            if children.len() == 1 {
                build_node(&children[0])
            } else {
                Err(ConvertError::RootNode(format!("{children:?}")))
            }
        }
        other => Err(ConvertError::UnsupportedOperator(format!("{other:?}"))),
    }
}

/// Converts an equation into its residual expression.
///
/// `lhs == rhs` becomes `Call[-, lhs, rhs]`; any other expression is taken as the
/// residual itself.
pub fn build_residual(node: &EvalNode) -> Result<Node, ConvertError> {
    let node = skip_roots(node);
    match node.operator() {
        EvalOperator::Eq => {
            let [lhs, rhs] = expect_children::<2>("==", node)?;
            Ok(Node::call(
                Operator::Symbolic("-".to_string()),
                [build_node(lhs)?, build_node(rhs)?],
            ))
        }
        _ => build_node(node),
    }
}

/// Extracts all variable names from an evalexpr tree and assigns them indices
/// in alphabetical order.
pub fn extract_symbols(node: &EvalNode) -> HashMap<String, u32> {
    let mut symbols = HashSet::new();
    extract_symbols_from_node(node, &mut symbols);

    let mut symbols: Vec<String> = symbols.into_iter().collect();
    symbols.sort();

    symbols
        .into_iter()
        .enumerate()
        .map(|(i, v)| (v, i as u32))
        .collect()
}

/// Collects variable names of an evalexpr tree into `symbols`.
pub fn extract_symbols_from_node(node: &EvalNode, symbols: &mut HashSet<String>) {
    match node.operator() {
        EvalOperator::VariableIdentifierRead { identifier } => {
            symbols.insert(identifier.to_string());
        }
        _ => {
            for child in node.children() {
                extract_symbols_from_node(child, symbols);
            }
        }
    }
}

fn infix(symbol: &str, node: &EvalNode) -> Result<Node, ConvertError> {
    let children = node.children();
    if children.len() < 2 {
        return Err(ConvertError::Arity {
            operator: symbol.to_string(),
            expected: 2,
            got: children.len(),
        });
    }
    let args = children
        .iter()
        .map(build_node)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Node::call(Operator::Symbolic(symbol.to_string()), args))
}

fn function_call(identifier: &str, node: &EvalNode) -> Result<Node, ConvertError> {
    let args = call_arguments(node)
        .into_iter()
        .map(build_node)
        .collect::<Result<Vec<_>, _>>()?;

    let unsupported = || ConvertError::UnsupportedFunction(identifier.to_string());
    if let Some(name) = identifier.strip_prefix(BROADCAST_PREFIX) {
        let function = Function::from_name(name).ok_or_else(unsupported)?;
        Ok(Node::broadcast(function.into(), args))
    } else if let Some(name) = identifier.strip_prefix(CALLABLE_PREFIX) {
        let function = Function::from_name(name).ok_or_else(unsupported)?;
        Ok(Node::call(function.into(), args))
    } else {
        // Plain names are kept as symbols
        if !PLAIN_FUNCTIONS.contains(&identifier) {
            return Err(unsupported());
        }
        Ok(Node::call(Operator::Symbolic(identifier.to_string()), args))
    }
}

/// Arguments of a function call: a single expression, or the items of a tuple.
fn call_arguments(node: &EvalNode) -> Vec<&EvalNode> {
    match node.children() {
        [] => Vec::new(),
        [single] => {
            let single = skip_roots(single);
            match single.operator() {
                EvalOperator::Tuple => single.children().iter().collect(),
                _ => vec![single],
            }
        }
        many => many.iter().collect(),
    }
}

fn skip_roots(mut node: &EvalNode) -> &EvalNode {
    while let (EvalOperator::RootNode, [child]) = (node.operator(), node.children()) {
        node = child;
    }
    node
}

fn expect_children<'a, const N: usize>(
    operator: &str,
    node: &'a EvalNode,
) -> Result<[&'a EvalNode; N], ConvertError> {
    let children = node.children();
    let arity = || ConvertError::Arity {
        operator: operator.to_string(),
        expected: N,
        got: children.len(),
    };
    let refs: Vec<&EvalNode> = children.iter().collect();
    refs.try_into().map_err(|_| arity())
}
