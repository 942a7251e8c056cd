//! Error types for the powexpand crate.
//!
//! The power rewrite and the gating decision never fail. Errors only come from
//! the layers around them:
//!
//! - `ConvertError`: Errors during conversion from the evalexpr AST to expression nodes
//! - `EvalError`: Errors while evaluating an expression tree
//! - `LossError`: High-level errors when building or evaluating a loss function
//! - `DeviceError`: Errors reported by device classifiers
//!
//! Each error type implements the standard Error trait and provides detailed error messages.

use evalexpr::{DefaultNumericTypes, EvalexprError};
use thiserror::Error;

/// Errors that can occur during conversion from evalexpr AST to expression nodes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConvertError {
    /// Error when encountering an operator that has no node equivalent
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),
    /// Error when encountering a function that is not supported by our implementation
    #[error("Unsupported function: {0}")]
    UnsupportedFunction(String),
    /// Error when the root node does not have exactly one child
    #[error("Expected single child for root node: {0}")]
    RootNode(String),
    /// Error when a constant value is not numeric
    #[error("Expected numeric constant: {0}")]
    ConstOperator(String),
    /// Error when an operator node has the wrong number of children
    #[error("Operator {operator} expects {expected} operands, got {got}")]
    Arity {
        operator: String,
        expected: usize,
        got: usize,
    },
}

/// Errors that can occur while evaluating an expression tree.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    /// A symbol has no bound value
    #[error("Unbound symbol: {0}")]
    UnboundSymbol(String),
    /// An operator or function was used where a value is expected
    #[error("Operator used as a value: {0}")]
    NotAValue(String),
    /// The head of a call is not a known operator
    #[error("Unknown operator: {0}")]
    UnknownOperator(String),
    /// An operator was applied to the wrong number of operands
    #[error("{function} cannot take {got} operands")]
    Arity { function: String, got: usize },
    /// Broadcast operands have different lengths
    #[error("Broadcast length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },
    /// A plain call received an array operand
    #[error("Array operand in plain call to {0}, use a broadcast call")]
    ArrayInPlainCall(String),
    /// A node kind that has no value
    #[error("Cannot evaluate node: {0}")]
    UnsupportedNode(String),
}

/// High-level errors that can occur when working with loss functions.
#[derive(Debug, Error)]
pub enum LossError {
    /// Error when parsing the equation string with evalexpr
    #[error("Failed to build Evalexpr AST")]
    BuildEvalexprError(#[from] EvalexprError<DefaultNumericTypes>),
    /// Error when converting from the evalexpr AST to expression nodes
    #[error("Failed to build expression tree")]
    ConvertError(#[from] ConvertError),
    /// Error when evaluating an equation
    #[error("Failed to evaluate equation {index}: {source}")]
    EvalError { index: usize, source: EvalError },
    /// Error when a variable is not found in the equations
    #[error("Variable not found in equations: {0}")]
    VariableNotFound(String),
    /// Error when the input length is not the same as the number of variables
    #[error("Invalid input length: expected {expected}, got {got}")]
    InvalidInputLength { expected: usize, got: usize },
    /// Error when a loss is built without equations
    #[error("A loss function needs at least one equation")]
    NoEquations,
    /// Error when an equation evaluates to an array instead of a scalar residual
    #[error("Equation {0} does not evaluate to a scalar")]
    NonScalarResidual(usize),
}

/// Errors a [`DeviceClassifier`](crate::gating::DeviceClassifier) may report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The descriptor carries neither a name nor a backend
    #[error("empty device descriptor")]
    Empty,
    /// The device could not be queried
    #[error("device unavailable: {0}")]
    Unavailable(String),
}
