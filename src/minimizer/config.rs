//! Configuration options for the SLSQP minimizer.

use serde::{Deserialize, Serialize};

use crate::utils::finite_difference::DEFAULT_STEP;

/// Configuration options for [`super::Minimizer`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinimizerConfig {
    /// Maximum number of outer iterations. Default: 100
    pub max_iterations: usize,

    /// Required accuracy of the objective and the constraint violation.
    /// Default: 1e-6
    pub accuracy: f64,

    /// Select the exact (Brent) line search instead of the Armijo-type
    /// backtracking. Default: false
    pub exact_line_search: bool,

    /// Absolute step of the forward differences used for gradients that
    /// are not supplied. Default: 1e-8
    pub gradient_step: f64,
}

impl Default for MinimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            accuracy: 1e-6,
            exact_line_search: false,
            gradient_step: DEFAULT_STEP,
        }
    }
}

impl MinimizerConfig {
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = accuracy;
        self
    }

    pub fn with_exact_line_search(mut self, exact: bool) -> Self {
        self.exact_line_search = exact;
        self
    }

    pub fn with_gradient_step(mut self, step: f64) -> Self {
        self.gradient_step = step;
        self
    }
}
