//! Exponential decay model.

use crate::function::{LeafFunction, ParameterSet, PartialJacobian};

/// f(x) = Height * exp(-x / Lifetime)
#[derive(Debug, Clone)]
pub struct Exponential {
    params: ParameterSet,
}

impl Exponential {
    pub fn new(height: f64, lifetime: f64) -> Self {
        Self {
            params: ParameterSet::from_distinct(&[("Height", height), ("Lifetime", lifetime)]),
        }
    }
}

impl Default for Exponential {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

impl LeafFunction for Exponential {
    const NAME: &'static str = "Exponential";

    fn parameter_set(&self) -> &ParameterSet {
        &self.params
    }

    fn parameter_set_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }

    fn eval_with(&self, params: &[f64], out: &mut [f64], x: &[f64]) {
        for (o, &xi) in out.iter_mut().zip(x) {
            *o = params[0] * (-xi / params[1]).exp();
        }
    }

    fn eval_deriv(&self, params: &[f64], jacobian: &mut PartialJacobian<'_>, x: &[f64]) {
        let (height, lifetime) = (params[0], params[1]);
        for (i, &xi) in x.iter().enumerate() {
            let e = (-xi / lifetime).exp();
            jacobian.set(i, 0, e);
            jacobian.set(i, 1, height * e * xi / (lifetime * lifetime));
        }
    }
}
