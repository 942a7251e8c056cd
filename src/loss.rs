//! Loss functions built from defining equations.
//!
//! A [`LossFunction`] holds one residual expression per equation. Evaluating it at a
//! point returns the sum of squared residuals; a batch of points is averaged.
//!
//! Before the residuals are stored, the builder asks
//! [`should_apply_gpu_transform`] whether the loss will run on an accelerator. If it
//! will, every residual goes through [`transform_power_ops`], so that integer powers
//! are evaluated, and differentiated, as products.
//!
//! # Example
//!
//! ```
//! use powexpand::gating::DeviceDescriptor;
//! use powexpand::loss::LossFunction;
//!
//! let gpu = DeviceDescriptor::new("NVIDIA A100", "cuda");
//! let loss = LossFunction::builder(vec!["x^2 == y".to_string()])
//!     .device(&gpu)
//!     .build()
//!     .unwrap();
//!
//! assert!(loss.is_rewritten());
//! assert_eq!(loss.eval(&[0.0, 1.0]).unwrap(), 1.0);
//! assert_eq!(loss.gradient(&[0.0, 1.0]).unwrap(), vec![0.0, 2.0]);
//! ```

use std::collections::{HashMap, HashSet};

use colored::Colorize;
use evalexpr::{build_operator_tree, Node as EvalNode};
use itertools::Itertools;
use log::{debug, trace};
use rayon::prelude::*;

use crate::backends::vector::Vector;
use crate::config::RewriteConfig;
use crate::convert::{build_residual, extract_symbols_from_node};
use crate::errors::LossError;
use crate::eval::{evaluate, Bindings, Dual, Number, Value};
use crate::gating::{should_apply_gpu_transform, DeviceClassifier};
use crate::node::Node;
use crate::rewrite::{count_power_ops, transform_power_ops};

/// A sum-of-squares loss over a set of residual equations.
///
/// Variables are either extracted from the equations and sorted alphabetically,
/// or supplied explicitly through [`LossBuilder::variables`]. Points passed to the
/// evaluation methods must follow that ordering.
#[derive(Clone)]
pub struct LossFunction {
    equations: Vec<String>,
    residuals: Vec<Node>,
    var_map: HashMap<String, u32>,
    sorted_variables: Vec<String>,
    rewritten: bool,
}

/// Builder for [`LossFunction`].
pub struct LossBuilder<'a> {
    equations: Vec<String>,
    variables: Option<HashMap<String, u32>>,
    device: Option<&'a dyn DeviceClassifier>,
    config: RewriteConfig,
}

impl<'a> LossBuilder<'a> {
    /// Uses an explicit variable to index mapping instead of alphabetical order.
    pub fn variables(mut self, variables: HashMap<String, u32>) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Sets the parameter/device context the loss will be evaluated with.
    pub fn device(mut self, device: &'a dyn DeviceClassifier) -> Self {
        self.device = Some(device);
        self
    }

    pub fn config(mut self, config: RewriteConfig) -> Self {
        self.config = config;
        self
    }

    /// Parses the equations and builds the loss.
    ///
    /// # Errors
    /// Returns `LossError` if:
    /// - No equation was given
    /// - An equation string fails to parse or convert
    /// - An equation uses a variable missing from the explicit variable map
    pub fn build(self) -> Result<LossFunction, LossError> {
        if self.equations.is_empty() {
            return Err(LossError::NoEquations);
        }

        let trees = self
            .equations
            .iter()
            .map(|equation| build_operator_tree(equation))
            .collect::<Result<Vec<EvalNode>, _>>()?;

        let mut used = HashSet::new();
        for tree in &trees {
            extract_symbols_from_node(tree, &mut used);
        }

        let var_map = match self.variables {
            Some(variables) => {
                let missing = used
                    .iter()
                    .filter(|name| !variables.contains_key(*name))
                    .sorted()
                    .join(", ");
                if !missing.is_empty() {
                    return Err(LossError::VariableNotFound(missing));
                }
                variables
            }
            None => used
                .into_iter()
                .sorted()
                .enumerate()
                .map(|(i, name)| (name, i as u32))
                .collect(),
        };

        let sorted_variables: Vec<String> = var_map
            .iter()
            .sorted_by_key(|(_, &idx)| idx)
            .map(|(var, _)| var.clone())
            .collect();

        let residuals = trees
            .iter()
            .map(build_residual)
            .collect::<Result<Vec<_>, _>>()?;

        let rewritten = should_apply_gpu_transform(self.device, self.config.force_gpu_transform);
        let residuals = if rewritten {
            let expanded: usize = residuals.iter().map(count_power_ops).sum();
            debug!(
                "expanding {expanded} power operation(s) in {} equation(s)",
                residuals.len()
            );
            residuals.iter().map(transform_power_ops).collect()
        } else {
            residuals
        };

        for (equation, residual) in self.equations.iter().zip(&residuals) {
            trace!("residual of '{equation}': {residual}");
        }

        Ok(LossFunction {
            equations: self.equations,
            residuals,
            var_map,
            sorted_variables,
            rewritten,
        })
    }
}

impl LossFunction {
    /// Builds a loss without device context. Powers are never rewritten.
    pub fn new(equations: Vec<String>) -> Result<Self, LossError> {
        Self::builder(equations).build()
    }

    pub fn builder<'a>(equations: Vec<String>) -> LossBuilder<'a> {
        LossBuilder {
            equations,
            variables: None,
            device: None,
            config: RewriteConfig::default(),
        }
    }

    /// Evaluates every residual at `point`.
    pub fn residuals<V: Vector + ?Sized>(&self, point: &V) -> Result<Vec<f64>, LossError> {
        let values = point.values();
        self.validate_input_length(&values)?;
        self.evaluate_residuals(&self.bind(&values, |_, v| v))
    }

    /// Sum of squared residuals at `point`.
    ///
    /// # Example
    /// ```
    /// # use powexpand::loss::LossFunction;
    /// let loss = LossFunction::new(vec!["x - 1".to_string(), "y^2".to_string()]).unwrap();
    /// assert_eq!(loss.eval(&[3.0, 2.0]).unwrap(), 4.0 + 16.0);
    /// ```
    pub fn eval<V: Vector + ?Sized>(&self, point: &V) -> Result<f64, LossError> {
        Ok(self.residuals(point)?.iter().map(|r| r * r).sum())
    }

    /// Mean loss over a batch of points, evaluated in parallel.
    ///
    /// An empty batch has a loss of zero.
    pub fn eval_batch<V: Vector + Sync>(&self, points: &[V]) -> Result<f64, LossError> {
        if points.is_empty() {
            return Ok(0.0);
        }

        let num_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(8);
        let chunk_size = (points.len() / (num_threads * 4)).max(1);

        let partial_sums = points
            .par_chunks(chunk_size)
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|point| self.eval(point))
                    .sum::<Result<f64, LossError>>()
            })
            .collect::<Result<Vec<f64>, LossError>>()?;

        Ok(partial_sums.iter().sum::<f64>() / points.len() as f64)
    }

    /// Gradient of [`eval`](Self::eval) with respect to each variable, in variable order.
    ///
    /// Computed in forward mode, one pass per variable.
    pub fn gradient<V: Vector + ?Sized>(&self, point: &V) -> Result<Vec<f64>, LossError> {
        let values = point.values();
        self.validate_input_length(&values)?;

        (0..self.sorted_variables.len())
            .map(|seed| -> Result<f64, LossError> {
                let bindings = self.bind(&values, |i, v| {
                    Dual::new(v, if i == seed { 1.0 } else { 0.0 })
                });
                let loss = self
                    .evaluate_residuals(&bindings)?
                    .into_iter()
                    .fold(Dual::constant(0.0), |acc, r| acc + r * r);
                Ok(loss.tangent)
            })
            .collect()
    }

    /// The residual expressions, after rewriting if it was applied.
    pub fn nodes(&self) -> &[Node] {
        &self.residuals
    }

    pub fn equations(&self) -> &[String] {
        &self.equations
    }

    /// Variable names in index order.
    pub fn variables(&self) -> &[String] {
        &self.sorted_variables
    }

    pub fn var_map(&self) -> &HashMap<String, u32> {
        &self.var_map
    }

    /// True if the power rewrite was applied to the residuals.
    pub fn is_rewritten(&self) -> bool {
        self.rewritten
    }

    fn bind<T>(&self, values: &[f64], f: impl Fn(usize, f64) -> T) -> Bindings<T> {
        self.sorted_variables
            .iter()
            .zip(values)
            .enumerate()
            .map(|(i, (name, &v))| (name.clone(), Value::Scalar(f(i, v))))
            .collect()
    }

    fn evaluate_residuals<T: Number>(&self, bindings: &Bindings<T>) -> Result<Vec<T>, LossError> {
        self.residuals
            .iter()
            .enumerate()
            .map(|(index, residual)| {
                evaluate(residual, bindings)
                    .map_err(|source| LossError::EvalError { index, source })?
                    .as_scalar()
                    .ok_or(LossError::NonScalarResidual(index))
            })
            .collect()
    }

    fn validate_input_length(&self, values: &[f64]) -> Result<(), LossError> {
        if values.len() != self.sorted_variables.len() {
            return Err(LossError::InvalidInputLength {
                expected: self.sorted_variables.len(),
                got: values.len(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for LossFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{{")?;
        writeln!(f, "    {}: {:?}", "Equations".cyan(), self.equations)?;
        writeln!(f, "    {}: {:?}", "Variables".cyan(), self.sorted_variables)?;
        writeln!(f, "    {}: {}", "Rewritten".cyan(), self.rewritten)?;
        writeln!(f, "}}")
    }
}

impl std::fmt::Display for LossFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (equation, residual) in self.equations.iter().zip(&self.residuals) {
            writeln!(f, "{} {} {}", equation.cyan(), "=>".dimmed(), residual)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gating::DeviceKind;
    use crate::errors::ConvertError;

    fn equations(eqs: &[&str]) -> Vec<String> {
        eqs.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn test_no_device_never_rewrites() {
        let loss = LossFunction::new(equations(&["x^2 - y"])).unwrap();
        assert!(!loss.is_rewritten());
        assert_eq!(loss.nodes()[0].to_string(), "((x ^ 2) - y)");
    }

    #[test]
    fn test_gpu_device_rewrites() {
        let loss = LossFunction::builder(equations(&["x^3 == math::pow(y, 2)"]))
            .device(&DeviceKind::Gpu)
            .build()
            .unwrap();
        assert!(loss.is_rewritten());
        assert_eq!(
            loss.nodes()[0].to_string(),
            "((x * x * x) - math::mul(y, y))"
        );
    }

    #[test]
    fn test_cpu_device_respects_override() {
        let loss = LossFunction::builder(equations(&["x^2"]))
            .device(&DeviceKind::Cpu)
            .build()
            .unwrap();
        assert!(!loss.is_rewritten());

        let loss = LossFunction::builder(equations(&["x^2"]))
            .device(&DeviceKind::Cpu)
            .config(RewriteConfig::new(true))
            .build()
            .unwrap();
        assert!(loss.is_rewritten());
        assert_eq!(loss.nodes()[0].to_string(), "(x * x)");
    }

    #[test]
    fn test_override_without_device() {
        let loss = LossFunction::builder(equations(&["x^2"]))
            .config(RewriteConfig::new(true))
            .build()
            .unwrap();
        assert!(!loss.is_rewritten());
    }

    #[test]
    fn test_eval() {
        let loss = LossFunction::new(equations(&["x^2 == y", "x + y - 3"])).unwrap();
        assert_eq!(loss.variables(), &["x".to_string(), "y".to_string()]);
        // residuals: 4 - 1 = 3, 2 + 1 - 3 = 0
        assert_eq!(loss.residuals(&[2.0, 1.0]).unwrap(), vec![3.0, 0.0]);
        assert_eq!(loss.eval(&[2.0, 1.0]).unwrap(), 9.0);
    }

    #[test]
    fn test_eval_batch() {
        let loss = LossFunction::new(equations(&["x - 1"])).unwrap();
        let points = vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]];
        // squared residuals 0, 1, 4, 9
        assert_eq!(loss.eval_batch(&points).unwrap(), 3.5);
        assert_eq!(loss.eval_batch::<Vec<f64>>(&[]).unwrap(), 0.0);
    }

    #[test]
    fn test_gradient_same_after_rewrite() {
        let eqs = equations(&["x^3 + y^2 - 1"]);
        let plain = LossFunction::new(eqs.clone()).unwrap();
        let rewritten = LossFunction::builder(eqs)
            .device(&DeviceKind::Gpu)
            .build()
            .unwrap();

        // r = 8 + 9 - 1 = 16, dL/dx = 2r * 3x^2 = 384, dL/dy = 2r * 2y = 192
        let point = [2.0, 3.0];
        assert_eq!(plain.gradient(&point).unwrap(), vec![384.0, 192.0]);
        assert_eq!(rewritten.gradient(&point).unwrap(), vec![384.0, 192.0]);
    }

    #[test]
    fn test_gradient_at_zero_base() {
        let eqs = equations(&["x^0 + x^2 - 2*y"]);
        let plain = LossFunction::new(eqs.clone()).unwrap();
        let rewritten = LossFunction::builder(eqs)
            .device(&DeviceKind::Gpu)
            .build()
            .unwrap();

        // r = 1 + 0 - 2 = -1, dL/dx = 2r * 2x = 0, dL/dy = 2r * -2 = 4
        let point = [0.0, 1.0];
        assert!(plain.gradient(&point).unwrap()[0].is_nan());
        assert_eq!(rewritten.gradient(&point).unwrap(), vec![0.0, 4.0]);
    }

    #[test]
    fn test_gradient_negative_base() {
        // L = x^4, dL/dx = 4x^3
        let loss = LossFunction::new(equations(&["x^2"])).unwrap();
        assert_eq!(loss.gradient(&[-2.0]).unwrap(), vec![-32.0]);

        let loss = LossFunction::new(equations(&["x^2 - 1"])).unwrap();
        let gradient = loss.gradient(&[-1.0]).unwrap();
        assert!(gradient[0].is_finite());
        assert_eq!(gradient, vec![0.0]);
    }

    #[test]
    fn test_explicit_variables() {
        let loss = LossFunction::builder(equations(&["x - 2*y"]))
            .variables(HashMap::from([("y".to_string(), 0), ("x".to_string(), 1)]))
            .build()
            .unwrap();
        assert_eq!(loss.variables(), &["y".to_string(), "x".to_string()]);
        assert_eq!(loss.residuals(&[1.0, 5.0]).unwrap(), vec![3.0]);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            LossFunction::new(Vec::new()),
            Err(LossError::NoEquations)
        ));

        let missing = LossFunction::builder(equations(&["x + z"]))
            .variables(HashMap::from([("x".to_string(), 0)]))
            .build();
        assert!(matches!(missing, Err(LossError::VariableNotFound(v)) if v == "z"));

        let loss = LossFunction::new(equations(&["x + y"])).unwrap();
        assert!(matches!(
            loss.eval(&[1.0]),
            Err(LossError::InvalidInputLength {
                expected: 2,
                got: 1
            })
        ));

        assert!(matches!(
            LossFunction::new(equations(&["foo(x)"])),
            Err(LossError::ConvertError(_))
        ));

        // Powers must be written infix or as math::pow so the rewrite sees them
        let plain_pow = LossFunction::builder(equations(&["pow(x, 2)"]))
            .device(&DeviceKind::Gpu)
            .build();
        assert!(matches!(
            plain_pow,
            Err(LossError::ConvertError(ConvertError::UnsupportedFunction(f))) if f == "pow"
        ));
    }
}
