//! General nonlinear constraints.

use std::fmt;

use crate::error::Result;
use crate::utils::finite_difference;

type ValueFn<'a> = Box<dyn FnMut(&[f64]) -> f64 + 'a>;
type GradientFn<'a> = Box<dyn FnMut(&[f64], &mut [f64]) + 'a>;

/// Whether a constraint must vanish or stay non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// `c(x) = 0`
    Equality,
    /// `c(x) >= 0`
    Inequality,
}

/// A constraint `c(x) = 0` or `c(x) >= 0` with an optional analytic
/// gradient.
pub struct Constraint<'a> {
    kind: ConstraintKind,
    value: ValueFn<'a>,
    gradient: Option<GradientFn<'a>>,
}

impl<'a> Constraint<'a> {
    pub fn equality(value: impl FnMut(&[f64]) -> f64 + 'a) -> Self {
        Self {
            kind: ConstraintKind::Equality,
            value: Box::new(value),
            gradient: None,
        }
    }

    pub fn inequality(value: impl FnMut(&[f64]) -> f64 + 'a) -> Self {
        Self {
            kind: ConstraintKind::Inequality,
            value: Box::new(value),
            gradient: None,
        }
    }

    /// Supply `∇c(x)` instead of differencing.
    pub fn with_gradient(mut self, gradient: impl FnMut(&[f64], &mut [f64]) + 'a) -> Self {
        self.gradient = Some(Box::new(gradient));
        self
    }

    pub fn kind(&self) -> ConstraintKind {
        self.kind
    }

    pub fn is_equality(&self) -> bool {
        self.kind == ConstraintKind::Equality
    }

    pub fn value(&mut self, x: &[f64]) -> f64 {
        (self.value)(x)
    }

    /// Gradient at `x`; `c0` is the value at `x`.
    pub fn gradient(&mut self, x: &[f64], c0: f64, step: f64, grad: &mut [f64]) -> Result<()> {
        match &mut self.gradient {
            Some(gradient) => {
                gradient(x, grad);
                Ok(())
            }
            None => {
                let value = &mut self.value;
                finite_difference::gradient(|point| Ok(value(point)), x, c0, step, grad)
            }
        }
    }
}

impl fmt::Debug for Constraint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constraint")
            .field("kind", &self.kind)
            .field("analytic_gradient", &self.gradient.is_some())
            .finish()
    }
}
