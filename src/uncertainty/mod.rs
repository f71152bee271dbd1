//! # Uncertainty Calculation
//!
//! Parameter uncertainties of a converged least-squares fit:
//!
//! - Covariance matrix `(JᵀWJ)⁻¹ · χ²_red` from the Jacobian at the solution
//! - Standard errors and the correlation matrix derived from it
//!
//! The approach is the usual one of lmfit-py and Mantid: the covariance is
//! scaled by the reduced chi-square so unweighted fits still get
//! meaningful errors.

mod covariance;

pub use covariance::{
    calculate_correlation, calculate_covariance, standard_errors_from_covariance,
};

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Structure to hold uncertainty calculation results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyResult {
    /// Covariance matrix of the active parameters
    pub covariance: Array2<f64>,
    /// Standard error of each active parameter
    pub standard_errors: Array1<f64>,
    /// Correlation matrix derived from covariance
    pub correlation: Array2<f64>,
    /// Numerical rank of `JᵀWJ`
    pub rank: usize,
    /// Chi-square value at minimum
    pub chisqr: f64,
    /// Reduced chi-square (chi^2 / nfree)
    pub redchi: f64,
    /// Degrees of freedom (n_points - n_parameters)
    pub nfree: usize,
}

/// Calculator for parameter uncertainties.
#[derive(Debug, Clone)]
pub struct UncertaintyCalculator {
    /// Degrees of freedom (n_points - n_parameters), at least 1
    pub nfree: usize,
    /// Chi-square value at minimum
    pub chisqr: f64,
    /// Reduced chi-square (chi^2 / nfree)
    pub redchi: f64,
}

impl UncertaintyCalculator {
    pub fn new(ndata: usize, nvarys: usize, chisqr: f64) -> Self {
        let nfree = ndata.saturating_sub(nvarys).max(1);
        Self {
            nfree,
            chisqr,
            redchi: chisqr / nfree as f64,
        }
    }

    /// Full analysis from the Jacobian of the model (not of the weighted
    /// residuals) with respect to the active parameters.
    pub fn analyze(
        &self,
        jacobian: &Array2<f64>,
        weights: Option<&[f64]>,
    ) -> Result<UncertaintyResult> {
        let (covariance, rank) = calculate_covariance(jacobian, weights, self.redchi)?;
        Ok(UncertaintyResult {
            standard_errors: standard_errors_from_covariance(&covariance),
            correlation: calculate_correlation(&covariance),
            covariance,
            rank,
            chisqr: self.chisqr,
            redchi: self.redchi,
            nfree: self.nfree,
        })
    }
}
