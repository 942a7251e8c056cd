//! Integer power expansion for loss-function expressions.
//!
//! Loss functions for numerical solvers are often written with integer powers such
//! as `u^2`. Differentiating a power function on an accelerator goes through
//! `x^n * ln(x)`, which is not finite at a zero base. This crate rewrites
//! `base^n` for non-negative integer literals `n` into explicit multiplication
//! chains before the loss is evaluated.
//!
//! # Features
//!
//! - Post-order rewrite of plain calls (`x ^ 3`) and broadcast calls (`^.(x, 3)`)
//! - Symbolic and callable operator representations, each preserved by the rewrite
//! - A gate deciding whether to rewrite, from a device classification and an override flag
//! - Loss functions built from [evalexpr](https://github.com/ISibboI/evalexpr) strings,
//!   with forward-mode gradients
//!
//! # Example
//!
//! ```rust
//! use powexpand::prelude::*;
//!
//! let x = Node::symbol("x");
//! let square = Node::call(Operator::pow_symbolic(), [x.clone(), Node::int(2)]);
//! assert_eq!(
//!     transform_power_ops(&square),
//!     Node::call(Operator::mul_symbolic(), [x.clone(), x])
//! );
//!
//! let loss = LossFunction::builder(vec!["x^2 - 1".to_string()])
//!     .device(&DeviceKind::Gpu)
//!     .build()
//!     .unwrap();
//! assert_eq!(loss.nodes()[0].to_string(), "((x * x) - 1)");
//! ```

pub use loss::LossFunction;
pub use rewrite::transform_power_ops;

pub mod prelude {
    pub use crate::backends::vector::Vector;
    pub use crate::config::RewriteConfig;
    pub use crate::convert::build_node;
    pub use crate::gating::{should_apply_gpu_transform, DeviceClassifier, DeviceKind};
    pub use crate::loss::LossFunction;
    pub use crate::node::{Function, Head, Leaf, Node, Operator};
    pub use crate::rewrite::transform_power_ops;
}

/// Point input types for loss evaluation
pub mod backends {
    pub mod vector;
}
/// Rewrite configuration and its environment override
pub mod config;
/// Conversion from parsed evalexpr expressions to expression nodes
pub mod convert;
/// Error types for the various failure modes
pub mod errors;
/// Evaluation of expression nodes over plain and dual numbers
pub mod eval;
/// Decision whether to apply the power rewrite
pub mod gating;
/// Loss functions built from equations
pub mod loss;
/// Expression tree representation
pub mod node;
/// Expansion of integer powers into multiplication chains
pub mod rewrite;
