//! Evaluation of expression trees.
//!
//! Expressions are evaluated over any [`Number`] type. Two are provided:
//!
//! - `f64` for plain values
//! - [`Dual`] for forward-mode derivatives (value plus tangent)
//!
//! Plain calls operate on scalars. Broadcast calls apply their operator
//! elementwise; scalar operands are repeated, array operands must have equal
//! lengths.
//!
//! # Power derivatives
//! [`Dual::powf`] uses the base rule `b * a^(b-1) * a'`, and adds the exponent
//! term `a^b * ln(a) * b'` only when the exponent carries a tangent. A constant
//! exponent therefore gives finite derivatives for negative bases. At `a = 0`
//! the base rule still breaks down for small exponents: `x^0` differentiates
//! to `0 * 0^(-1)`, which is NaN. A product of factors, as produced by
//! [`transform_power_ops`](crate::rewrite::transform_power_ops), has no such term.

use std::collections::HashMap;
use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::errors::EvalError;
use crate::node::{Function, Head, Leaf, Node, Operator};

/// Arithmetic needed to evaluate an expression tree.
pub trait Number:
    Copy
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    fn constant(value: f64) -> Self;
    fn powf(self, exponent: Self) -> Self;
    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn sqrt(self) -> Self;
    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn abs(self) -> Self;
}

impl Number for f64 {
    fn constant(value: f64) -> Self {
        value
    }
    fn powf(self, exponent: Self) -> Self {
        f64::powf(self, exponent)
    }
    fn exp(self) -> Self {
        f64::exp(self)
    }
    fn ln(self) -> Self {
        f64::ln(self)
    }
    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }
    fn sin(self) -> Self {
        f64::sin(self)
    }
    fn cos(self) -> Self {
        f64::cos(self)
    }
    fn abs(self) -> Self {
        f64::abs(self)
    }
}

/// A value paired with its derivative along one direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dual {
    pub value: f64,
    pub tangent: f64,
}

impl Dual {
    pub fn new(value: f64, tangent: f64) -> Self {
        Self { value, tangent }
    }

    /// A variable seeded with tangent one.
    pub fn variable(value: f64) -> Self {
        Self::new(value, 1.0)
    }
}

impl Add for Dual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Dual::new(self.value + rhs.value, self.tangent + rhs.tangent)
    }
}

impl Sub for Dual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Dual::new(self.value - rhs.value, self.tangent - rhs.tangent)
    }
}

impl Mul for Dual {
    type Output = Self;
    // d(f * g) = f * dg + g * df
    fn mul(self, rhs: Self) -> Self {
        Dual::new(
            self.value * rhs.value,
            self.value * rhs.tangent + rhs.value * self.tangent,
        )
    }
}

impl Div for Dual {
    type Output = Self;
    // d(f / g) = (g * df - f * dg) / g^2
    fn div(self, rhs: Self) -> Self {
        Dual::new(
            self.value / rhs.value,
            (rhs.value * self.tangent - self.value * rhs.tangent) / (rhs.value * rhs.value),
        )
    }
}

impl Neg for Dual {
    type Output = Self;
    fn neg(self) -> Self {
        Dual::new(-self.value, -self.tangent)
    }
}

impl Number for Dual {
    fn constant(value: f64) -> Self {
        Dual::new(value, 0.0)
    }

    // d(f^g) = g * f^(g-1) * df + f^g * ln(f) * dg
    fn powf(self, exponent: Self) -> Self {
        let value = self.value.powf(exponent.value);
        let mut tangent = exponent.value * self.value.powf(exponent.value - 1.0) * self.tangent;
        // ln(f) is NaN for f < 0, skip it unless g varies
        if exponent.tangent != 0.0 {
            tangent += value * self.value.ln() * exponent.tangent;
        }
        Dual::new(value, tangent)
    }

    fn exp(self) -> Self {
        let value = self.value.exp();
        Dual::new(value, value * self.tangent)
    }

    fn ln(self) -> Self {
        Dual::new(self.value.ln(), self.tangent / self.value)
    }

    fn sqrt(self) -> Self {
        let value = self.value.sqrt();
        Dual::new(value, self.tangent / (2.0 * value))
    }

    fn sin(self) -> Self {
        Dual::new(self.value.sin(), self.value.cos() * self.tangent)
    }

    fn cos(self) -> Self {
        Dual::new(self.value.cos(), -self.value.sin() * self.tangent)
    }

    fn abs(self) -> Self {
        Dual::new(self.value.abs(), self.value.signum() * self.tangent)
    }
}

/// Result of evaluating a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<T> {
    Scalar(T),
    Array(Vec<T>),
}

impl<T: Number> Value<T> {
    pub fn as_scalar(&self) -> Option<T> {
        match self {
            Value::Scalar(v) => Some(*v),
            Value::Array(_) => None,
        }
    }

    fn len(&self) -> Option<usize> {
        match self {
            Value::Scalar(_) => None,
            Value::Array(items) => Some(items.len()),
        }
    }

    fn get(&self, i: usize) -> T {
        match self {
            Value::Scalar(v) => *v,
            Value::Array(items) => items[i],
        }
    }
}

/// Values bound to symbols during evaluation.
pub type Bindings<T> = HashMap<String, Value<T>>;

/// Evaluates `node` with the given symbol bindings.
///
/// # Example
/// ```
/// use powexpand::eval::{evaluate, Bindings, Value};
/// use powexpand::node::{Node, Operator};
///
/// let expr = Node::call(Operator::pow_symbolic(), [Node::symbol("x"), Node::int(3)]);
/// let bindings: Bindings<f64> = [("x".to_string(), Value::Scalar(2.0))].into();
/// assert_eq!(evaluate(&expr, &bindings).unwrap(), Value::Scalar(8.0));
/// ```
pub fn evaluate<T: Number>(node: &Node, bindings: &Bindings<T>) -> Result<Value<T>, EvalError> {
    match node {
        Node::Leaf(Leaf::Int(i)) => Ok(Value::Scalar(T::constant(*i as f64))),
        Node::Leaf(Leaf::Float(f)) => Ok(Value::Scalar(T::constant(*f))),
        Node::Leaf(Leaf::Symbol(name)) => match bindings.get(name) {
            Some(value) => Ok(value.clone()),
            None if Function::from_name(name).is_some() => Err(EvalError::NotAValue(name.clone())),
            None => Err(EvalError::UnboundSymbol(name.clone())),
        },
        Node::Leaf(Leaf::Function(function)) => Err(EvalError::NotAValue(function.to_string())),
        Node::Compound { head, args } => match (head, args.split_first()) {
            (Head::Call, Some((op, operands))) => {
                let function = resolve(op)?;
                let scalars = operands
                    .iter()
                    .map(|operand| {
                        evaluate(operand, bindings)?
                            .as_scalar()
                            .ok_or_else(|| EvalError::ArrayInPlainCall(function.to_string()))
                    })
                    .collect::<Result<Vec<T>, _>>()?;
                apply(function, &scalars).map(Value::Scalar)
            }
            (Head::Broadcast, Some((op, [tuple]))) if tuple.head() == Some(&Head::Tuple) => {
                let function = resolve(op)?;
                let values = tuple
                    .args()
                    .iter()
                    .map(|operand| evaluate(operand, bindings))
                    .collect::<Result<Vec<_>, _>>()?;
                broadcast(function, &values)
            }
            _ => Err(EvalError::UnsupportedNode(node.to_string())),
        },
    }
}

fn resolve(op: &Node) -> Result<Function, EvalError> {
    Operator::from_node(op)
        .and_then(|op| op.function())
        .ok_or_else(|| EvalError::UnknownOperator(op.to_string()))
}

fn broadcast<T: Number>(function: Function, values: &[Value<T>]) -> Result<Value<T>, EvalError> {
    let mut len: Option<usize> = None;
    for n in values.iter().filter_map(Value::len) {
        match len {
            Some(m) if m != n => return Err(EvalError::LengthMismatch { left: m, right: n }),
            _ => len = Some(n),
        }
    }

    let Some(len) = len else {
        let scalars: Vec<T> = values.iter().map(|v| v.get(0)).collect();
        return apply(function, &scalars).map(Value::Scalar);
    };

    let mut out = Vec::with_capacity(len);
    let mut row = Vec::with_capacity(values.len());
    for i in 0..len {
        row.clear();
        row.extend(values.iter().map(|v| v.get(i)));
        out.push(apply(function, &row)?);
    }
    Ok(Value::Array(out))
}

fn apply<T: Number>(function: Function, args: &[T]) -> Result<T, EvalError> {
    let arity = || EvalError::Arity {
        function: function.name().to_string(),
        got: args.len(),
    };
    let unary = |f: fn(T) -> T| match args {
        [a] => Ok(f(*a)),
        _ => Err(arity()),
    };

    match function {
        Function::Add | Function::Mul => {
            let (first, rest) = args.split_first().ok_or_else(arity)?;
            Ok(rest.iter().fold(*first, |acc, &x| {
                if function == Function::Add {
                    acc + x
                } else {
                    acc * x
                }
            }))
        }
        Function::Sub => match args {
            [a] => Ok(-*a),
            [a, b] => Ok(*a - *b),
            _ => Err(arity()),
        },
        Function::Div => match args {
            [a, b] => Ok(*a / *b),
            _ => Err(arity()),
        },
        Function::Pow => match args {
            [a, b] => Ok(a.powf(*b)),
            _ => Err(arity()),
        },
        Function::Exp => unary(T::exp),
        Function::Ln => unary(T::ln),
        Function::Sqrt => unary(T::sqrt),
        Function::Sin => unary(T::sin),
        Function::Cos => unary(T::cos),
        Function::Abs => unary(T::abs),
    }
}
