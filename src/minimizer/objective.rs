//! Objective functions for the minimizer.

use crate::error::Result;
use crate::utils::finite_difference;

/// A scalar function to minimize.
///
/// Only [`value`](Objective::value) is required; the gradient defaults to
/// forward differences with the step configured on the minimizer.
///
/// Any `FnMut(&[f64]) -> f64` closure is an objective.
pub trait Objective {
    /// Objective value at `x`.
    fn value(&mut self, x: &[f64]) -> Result<f64>;

    /// Gradient at `x` into `grad`.
    ///
    /// `f0` is the value at `x`, already computed by the minimizer, and
    /// `step` the configured difference step.
    fn gradient(&mut self, x: &[f64], f0: f64, step: f64, grad: &mut [f64]) -> Result<()> {
        finite_difference::gradient(|point| self.value(point), x, f0, step, grad)
    }
}

impl<F> Objective for F
where
    F: FnMut(&[f64]) -> f64,
{
    fn value(&mut self, x: &[f64]) -> Result<f64> {
        Ok(self(x))
    }
}

/// An objective with an analytic gradient, built from two closures.
pub struct WithGradient<F, G> {
    value: F,
    gradient: G,
}

impl<F, G> WithGradient<F, G>
where
    F: FnMut(&[f64]) -> f64,
    G: FnMut(&[f64], &mut [f64]),
{
    pub fn new(value: F, gradient: G) -> Self {
        Self { value, gradient }
    }
}

impl<F, G> Objective for WithGradient<F, G>
where
    F: FnMut(&[f64]) -> f64,
    G: FnMut(&[f64], &mut [f64]),
{
    fn value(&mut self, x: &[f64]) -> Result<f64> {
        Ok((self.value)(x))
    }

    fn gradient(&mut self, x: &[f64], _f0: f64, _step: f64, grad: &mut [f64]) -> Result<()> {
        (self.gradient)(x, grad);
        Ok(())
    }
}
