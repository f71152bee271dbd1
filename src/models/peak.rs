//! Peak models for fitting data.

use crate::function::{LeafFunction, ParameterSet, PartialJacobian};

/// A Gaussian peak.
///
/// f(x) = Height * exp(-(x - PeakCentre)² / (2 * Sigma²))
///
/// The full width at half maximum is `2 * sqrt(2 * ln 2) * Sigma`, about
/// `2.3548 * Sigma`.
#[derive(Debug, Clone)]
pub struct Gaussian {
    params: ParameterSet,
}

impl Gaussian {
    /// Create a new Gaussian peak.
    ///
    /// # Arguments
    ///
    /// * `height` - Value at the centre
    /// * `centre` - Position of the maximum
    /// * `sigma` - Standard deviation, controlling the width
    pub fn new(height: f64, centre: f64, sigma: f64) -> Self {
        Self {
            params: ParameterSet::from_distinct(&[
                ("Height", height),
                ("PeakCentre", centre),
                ("Sigma", sigma),
            ]),
        }
    }

    /// Full width at half maximum for the current Sigma.
    pub fn fwhm(&self) -> f64 {
        2.0 * (2.0 * std::f64::consts::LN_2).sqrt() * self.params.values()[2]
    }
}

impl Default for Gaussian {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0)
    }
}

impl LeafFunction for Gaussian {
    const NAME: &'static str = "Gaussian";

    fn parameter_set(&self) -> &ParameterSet {
        &self.params
    }

    fn parameter_set_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }

    fn eval_with(&self, params: &[f64], out: &mut [f64], x: &[f64]) {
        let (height, centre, sigma) = (params[0], params[1], params[2]);
        for (o, &xi) in out.iter_mut().zip(x) {
            let z = (xi - centre) / sigma;
            *o = height * (-0.5 * z * z).exp();
        }
    }

    fn eval_deriv(&self, params: &[f64], jacobian: &mut PartialJacobian<'_>, x: &[f64]) {
        let (height, centre, sigma) = (params[0], params[1], params[2]);
        for (i, &xi) in x.iter().enumerate() {
            let dx = xi - centre;
            let e = (-0.5 * dx * dx / (sigma * sigma)).exp();
            let value = height * e;
            jacobian.set(i, 0, e);
            jacobian.set(i, 1, value * dx / (sigma * sigma));
            jacobian.set(i, 2, value * dx * dx / (sigma * sigma * sigma));
        }
    }
}
