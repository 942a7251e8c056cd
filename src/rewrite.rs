//! Expansion of integer powers into multiplication chains.
//!
//! `x^n` with a non-negative integer literal `n` is replaced by `x * x * ... * x`
//! (`n` factors). Automatic differentiation of a power function includes the
//! term `x^n * ln(x)`, which is not finite at `x = 0` on some backends; a product
//! of factors has no such term.
//!
//! Both call forms are handled, and each stays in its own form:
//!
//! | input | output |
//! |---|---|
//! | `Call[^, x, 3]` | `Call[*, x, x, x]` |
//! | `Broadcast[^, Tuple[x, 2]]` | `Broadcast[*, Tuple[x, x]]` |
//! | `Call[^, x, 1]` | `x` |
//! | `Call[^, x, 0]` | `1` |
//!
//! Operator representation is preserved: a symbolic `^` becomes a symbolic `*`,
//! a callable [`Function::Pow`](crate::node::Function::Pow) becomes
//! [`Function::Mul`](crate::node::Function::Mul).
//!
//! Exponents above [`MAX_EXPANDED_EXPONENT`] are left as powers.

use std::iter;
use std::sync::Arc;

use crate::node::{Head, Node, Operator};

/// Largest exponent expanded into a product. Larger powers are kept unchanged.
pub const MAX_EXPANDED_EXPONENT: usize = 1024;

/// Rewrites every power node with a non-negative integer literal exponent.
///
/// The traversal is post-order: children are rewritten before their parent is
/// matched, so a power nested inside the base of another power is expanded
/// first. Nodes that do not match are rebuilt with their rewritten children and
/// otherwise left alone. The input is not modified.
///
/// # Example
/// ```
/// use powexpand::node::{Node, Operator};
/// use powexpand::rewrite::transform_power_ops;
///
/// let x = Node::symbol("x");
/// let cube = Node::call(Operator::pow_symbolic(), [x.clone(), Node::int(3)]);
///
/// assert_eq!(
///     transform_power_ops(&cube),
///     Node::call(Operator::mul_symbolic(), [x.clone(), x.clone(), x])
/// );
/// ```
pub fn transform_power_ops(node: &Node) -> Node {
    match node {
        Node::Leaf(_) => node.clone(),
        Node::Compound { head, args } => {
            let args = args.iter().map(|arg| rewrite_shared(arg)).collect();
            expand(Node::compound(head.clone(), args))
        }
    }
}

/// Counts the power nodes [`transform_power_ops`] would expand.
///
/// Matching is done on the input as written, so a power whose base holds
/// another expandable power counts twice.
pub fn count_power_ops(node: &Node) -> usize {
    let own = usize::from(match_power(node).is_some());
    own + node.args().iter().map(|arg| count_power_ops(arg)).sum::<usize>()
}

/// Returns true if [`transform_power_ops`] would change `node`.
pub fn contains_power_ops(node: &Node) -> bool {
    match_power(node).is_some() || node.args().iter().any(|arg| contains_power_ops(arg))
}

fn rewrite_shared(node: &Arc<Node>) -> Arc<Node> {
    match &**node {
        Node::Leaf(_) => Arc::clone(node),
        Node::Compound { .. } => Arc::new(transform_power_ops(node)),
    }
}

/// The parts of a matched power node.
struct PowerMatch<'a> {
    op: Operator,
    base: &'a Arc<Node>,
    exponent: usize,
    broadcast: bool,
}

fn match_power(node: &Node) -> Option<PowerMatch<'_>> {
    let Node::Compound { head, args } = node else {
        return None;
    };
    let (op, base, exponent, broadcast) = match (head, args.as_slice()) {
        (Head::Broadcast, [op, operands]) if operands.head() == Some(&Head::Tuple) => {
            match operands.args() {
                [base, exponent] => (op, base, exponent, true),
                _ => return None,
            }
        }
        (Head::Call, [op, base, exponent]) => (op, base, exponent, false),
        _ => return None,
    };

    let op = Operator::from_node(op).filter(Operator::is_power)?;
    let exponent = usize::try_from(exponent.as_int()?)
        .ok()
        .filter(|&n| n <= MAX_EXPANDED_EXPONENT)?;
    Some(PowerMatch {
        op,
        base,
        exponent,
        broadcast,
    })
}

fn expand(candidate: Node) -> Node {
    let expanded = match_power(&candidate).map(expand_match);
    expanded.unwrap_or(candidate)
}

fn expand_match(matched: PowerMatch<'_>) -> Node {
    let PowerMatch {
        op,
        base,
        exponent,
        broadcast,
    } = matched;

    match exponent {
        0 => Node::int(1),
        1 => (**base).clone(),
        n => {
            let mul = op.multiplication();
            let factors = iter::repeat_with(|| Arc::clone(base)).take(n);
            if broadcast {
                Node::broadcast_shared(mul, factors)
            } else {
                Node::call_shared(mul, factors)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Function, Leaf};

    fn x() -> Node {
        Node::symbol("x")
    }

    fn pow(base: Node, exponent: Node) -> Node {
        Node::call(Operator::pow_symbolic(), [base, exponent])
    }

    fn mul(factors: Vec<Node>) -> Node {
        Node::call(Operator::mul_symbolic(), factors)
    }

    fn bpow(base: Node, exponent: Node) -> Node {
        Node::broadcast(Operator::pow_symbolic(), [base, exponent])
    }

    /// Number of `x` leaves left after flattening nested multiplications.
    fn count_symbol(node: &Node, name: &str) -> usize {
        match node {
            Node::Leaf(Leaf::Symbol(s)) if s == name => 1,
            _ => node.args().iter().map(|arg| count_symbol(arg, name)).sum(),
        }
    }

    #[test]
    fn test_identity_without_power() {
        let exprs = [
            x(),
            Node::int(3),
            Node::call(Operator::Symbolic("+".into()), [x(), Node::symbol("y")]),
            Node::broadcast(Operator::mul_symbolic(), [x(), x()]),
            Node::tuple([x(), Node::int(2)]),
            Node::compound(Head::Other("block".into()), vec![Arc::new(x())]),
            Node::compound(Head::Call, vec![]),
        ];
        for expr in exprs {
            assert_eq!(transform_power_ops(&expr), expr);
        }
    }

    #[test]
    fn test_exponent_zero() {
        assert_eq!(transform_power_ops(&pow(x(), Node::int(0))), Node::int(1));
        assert_eq!(transform_power_ops(&bpow(x(), Node::int(0))), Node::int(1));
    }

    #[test]
    fn test_exponent_one() {
        assert_eq!(transform_power_ops(&pow(x(), Node::int(1))), x());
        assert_eq!(transform_power_ops(&bpow(x(), Node::int(1))), x());
    }

    #[test]
    fn test_plain_power() {
        assert_eq!(
            transform_power_ops(&pow(x(), Node::int(3))),
            mul(vec![x(), x(), x()])
        );
    }

    #[test]
    fn test_broadcast_power() {
        assert_eq!(
            transform_power_ops(&bpow(x(), Node::int(2))),
            Node::broadcast(Operator::mul_symbolic(), [x(), x()])
        );
    }

    #[test]
    fn test_callable_representation_preserved() {
        let callable = Node::call(Function::Pow.into(), [x(), Node::int(2)]);
        assert_eq!(
            transform_power_ops(&callable),
            Node::call(Function::Mul.into(), [x(), x()])
        );

        let callable = Node::broadcast(Function::Pow.into(), [x(), Node::int(3)]);
        assert_eq!(
            transform_power_ops(&callable),
            Node::broadcast(Function::Mul.into(), [x(), x(), x()])
        );
    }

    #[test]
    fn test_nested_power() {
        let inner = pow(x(), Node::int(2));
        let outer = pow(inner, Node::int(3));
        let rewritten = transform_power_ops(&outer);

        let square = mul(vec![x(), x()]);
        assert_eq!(rewritten, mul(vec![square.clone(), square.clone(), square]));
        assert_eq!(count_symbol(&rewritten, "x"), 9);
        assert!(!contains_power_ops(&rewritten));
    }

    #[test]
    fn test_power_inside_broadcast_tuple() {
        let expr = bpow(pow(x(), Node::int(2)), Node::int(2));
        let square = mul(vec![x(), x()]);
        assert_eq!(
            transform_power_ops(&expr),
            Node::broadcast(Operator::mul_symbolic(), [square.clone(), square])
        );
    }

    #[test]
    fn test_power_in_argument_position() {
        let expr = Node::call(
            Operator::Symbolic("+".into()),
            [pow(x(), Node::int(2)), Node::symbol("y")],
        );
        assert_eq!(
            transform_power_ops(&expr),
            Node::call(
                Operator::Symbolic("+".into()),
                [mul(vec![x(), x()]), Node::symbol("y")]
            )
        );
    }

    #[test]
    fn test_negative_and_symbolic_exponents_unchanged() {
        let negative = pow(x(), Node::int(-1));
        assert_eq!(transform_power_ops(&negative), negative);

        let symbolic = pow(x(), Node::symbol("y"));
        assert_eq!(transform_power_ops(&symbolic), symbolic);

        let float = pow(x(), Node::float(2.0));
        assert_eq!(transform_power_ops(&float), float);

        let broadcast = bpow(x(), Node::int(-2));
        assert_eq!(transform_power_ops(&broadcast), broadcast);
    }

    #[test]
    fn test_negative_exponent_base_still_rewritten() {
        let expr = pow(pow(x(), Node::int(2)), Node::int(-1));
        assert_eq!(
            transform_power_ops(&expr),
            pow(mul(vec![x(), x()]), Node::int(-1))
        );
    }

    #[test]
    fn test_exponent_above_bound_unchanged() {
        let bound = MAX_EXPANDED_EXPONENT as i64;

        let at_bound = transform_power_ops(&pow(x(), Node::int(bound)));
        assert_eq!(at_bound.args().len(), MAX_EXPANDED_EXPONENT + 1);
        assert_eq!(count_symbol(&at_bound, "x"), MAX_EXPANDED_EXPONENT);

        let above = pow(x(), Node::int(bound + 1));
        assert_eq!(transform_power_ops(&above), above);

        let huge = pow(pow(x(), Node::int(2)), Node::int(1 << 62));
        assert_eq!(
            transform_power_ops(&huge),
            pow(mul(vec![x(), x()]), Node::int(1 << 62))
        );
        assert_eq!(count_power_ops(&huge), 1);

        let broadcast = bpow(x(), Node::int(i64::MAX));
        assert_eq!(transform_power_ops(&broadcast), broadcast);
    }

    #[test]
    fn test_malformed_shapes_unchanged() {
        // Too many operands for a plain power
        let extra = Node::call(Operator::pow_symbolic(), [x(), Node::int(2), Node::int(3)]);
        assert_eq!(transform_power_ops(&extra), extra);

        // Broadcast without a tuple grouping
        let untupled = Node::compound(
            Head::Broadcast,
            vec![
                Arc::new(Node::symbol("^")),
                Arc::new(x()),
                Arc::new(Node::int(2)),
            ],
        );
        assert_eq!(transform_power_ops(&untupled), untupled);

        // Tuple of three elements
        let triple = Node::compound(
            Head::Broadcast,
            vec![
                Arc::new(Node::symbol("^")),
                Arc::new(Node::tuple([x(), Node::int(2), Node::int(3)])),
            ],
        );
        assert_eq!(transform_power_ops(&triple), triple);

        // Power shape under a foreign head
        let other = Node::compound(
            Head::Other("macrocall".into()),
            vec![
                Arc::new(Node::symbol("^")),
                Arc::new(x()),
                Arc::new(Node::int(2)),
            ],
        );
        assert_eq!(transform_power_ops(&other), other);
    }

    #[test]
    fn test_heads_never_cross_convert() {
        let plain = transform_power_ops(&pow(x(), Node::int(4)));
        assert_eq!(plain.head(), Some(&Head::Call));

        let bcast = transform_power_ops(&bpow(x(), Node::int(4)));
        assert_eq!(bcast.head(), Some(&Head::Broadcast));
    }

    #[test]
    fn test_copies_share_base() {
        let base = Node::call(Operator::Symbolic("+".into()), [x(), Node::int(1)]);
        let rewritten = transform_power_ops(&pow(base, Node::int(3)));
        let factors = &rewritten.args()[1..];
        assert_eq!(factors.len(), 3);
        assert!(Arc::ptr_eq(&factors[0], &factors[1]));
        assert!(Arc::ptr_eq(&factors[1], &factors[2]));
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let exprs = [
            pow(pow(x(), Node::int(2)), Node::int(3)),
            bpow(x(), Node::int(5)),
            Node::call(Function::Pow.into(), [x(), Node::int(2)]),
            pow(x(), Node::symbol("n")),
        ];
        for expr in exprs {
            let once = transform_power_ops(&expr);
            assert!(!contains_power_ops(&once));
            assert_eq!(transform_power_ops(&once), once);
        }
    }

    #[test]
    fn test_input_not_mutated() {
        let expr = pow(x(), Node::int(2));
        let snapshot = expr.clone();
        let _ = transform_power_ops(&expr);
        assert_eq!(expr, snapshot);
    }

    #[test]
    fn test_count_power_ops() {
        assert_eq!(count_power_ops(&x()), 0);
        assert_eq!(count_power_ops(&pow(x(), Node::int(2))), 1);
        assert_eq!(count_power_ops(&pow(x(), Node::int(-2))), 0);
        assert_eq!(
            count_power_ops(&pow(pow(x(), Node::int(2)), Node::int(3))),
            2
        );
        assert_eq!(count_power_ops(&bpow(x(), Node::int(2))), 1);
    }
}
