//! Flat and linear backgrounds.

use crate::function::{LeafFunction, ParameterSet, PartialJacobian};

/// A flat background: f(x) = A0
#[derive(Debug, Clone)]
pub struct Constant {
    params: ParameterSet,
}

impl Constant {
    pub fn new(a0: f64) -> Self {
        Self {
            params: ParameterSet::from_distinct(&[("A0", a0)]),
        }
    }
}

impl Default for Constant {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl LeafFunction for Constant {
    const NAME: &'static str = "Constant";

    fn parameter_set(&self) -> &ParameterSet {
        &self.params
    }

    fn parameter_set_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }

    fn eval_with(&self, params: &[f64], out: &mut [f64], _x: &[f64]) {
        out.fill(params[0]);
    }

    fn eval_deriv(&self, _params: &[f64], jacobian: &mut PartialJacobian<'_>, x: &[f64]) {
        for i in 0..x.len() {
            jacobian.set(i, 0, 1.0);
        }
    }
}

/// A straight line: f(x) = A0 + A1 * x
///
/// # Examples
///
/// ```
/// use compfit::function::Function;
/// use compfit::models::Linear;
///
/// let line = Linear::new(1.0, 2.0);
/// let mut out = [0.0; 3];
/// line.function(&mut out, &[0.0, 1.0, 2.0]).unwrap();
/// assert_eq!(out, [1.0, 3.0, 5.0]);
/// ```
#[derive(Debug, Clone)]
pub struct Linear {
    params: ParameterSet,
}

impl Linear {
    /// Create a line with intercept `a0` and slope `a1`.
    pub fn new(a0: f64, a1: f64) -> Self {
        Self {
            params: ParameterSet::from_distinct(&[("A0", a0), ("A1", a1)]),
        }
    }
}

impl Default for Linear {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl LeafFunction for Linear {
    const NAME: &'static str = "Linear";

    fn parameter_set(&self) -> &ParameterSet {
        &self.params
    }

    fn parameter_set_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }

    fn eval_with(&self, params: &[f64], out: &mut [f64], x: &[f64]) {
        for (o, &xi) in out.iter_mut().zip(x) {
            *o = params[0] + params[1] * xi;
        }
    }

    fn eval_deriv(&self, _params: &[f64], jacobian: &mut PartialJacobian<'_>, x: &[f64]) {
        for (i, &xi) in x.iter().enumerate() {
            jacobian.set(i, 0, 1.0);
            jacobian.set(i, 1, xi);
        }
    }
}
