//! # Covariance Matrix Calculations
//!
//! Covariance, standard errors and correlations of fitted parameters from
//! the model Jacobian at the solution.

use ndarray::{Array1, Array2};
use tracing::warn;

use crate::error::{CompFitError, Result};
use crate::slsqp::hfti;

/// Pivots of R below this fraction of the largest column norm of `JᵀWJ`
/// count as rank deficient.
const RANK_TOLERANCE: f64 = 1e-12;

/// Inverse of `JᵀWJ`, scaled by the reduced chi-square.
///
/// ```text
/// covar = redchi * inv(Jᵀ W J)
/// ```
///
/// `jacobian` is `n_data x n_params`; `weights` defaults to all ones. The
/// inverse is the minimum-length solution of `(JᵀWJ) X = I` from HFTI, so
/// a rank-deficient Jacobian yields the pseudo-inverse instead of an
/// error. Returns the matrix and the numerical rank.
pub fn calculate_covariance(
    jacobian: &Array2<f64>,
    weights: Option<&[f64]>,
    redchi: f64,
) -> Result<(Array2<f64>, usize)> {
    let (n_data, n) = jacobian.dim();
    if let Some(w) = weights {
        if w.len() != n_data {
            return Err(CompFitError::DimensionMismatch(format!(
                "{} weights for {} data points",
                w.len(),
                n_data
            )));
        }
    }
    if n == 0 {
        return Ok((Array2::zeros((0, 0)), 0));
    }

    // Normal matrix, column-major.
    let mut normal = vec![0.0; n * n];
    for j in 0..n {
        for k in 0..=j {
            let mut sum = 0.0;
            for i in 0..n_data {
                let wi = weights.map_or(1.0, |w| w[i]);
                sum += wi * jacobian[[i, j]] * jacobian[[i, k]];
            }
            normal[j + k * n] = sum;
            normal[k + j * n] = sum;
        }
    }
    let scale = (0..n)
        .map(|j| normal[j * n..(j + 1) * n].iter().map(|v| v * v).sum::<f64>().sqrt())
        .fold(0.0, f64::max);

    let mut inverse = vec![0.0; n * n];
    for j in 0..n {
        inverse[j + j * n] = 1.0;
    }
    let mut rnorm = vec![0.0; n];
    let mut h = vec![0.0; n];
    let mut g = vec![0.0; n];
    let mut ip = vec![0; n];
    let rank = hfti(
        &mut normal,
        n,
        n,
        n,
        &mut inverse,
        n,
        n,
        RANK_TOLERANCE * scale,
        &mut rnorm,
        &mut h,
        &mut g,
        &mut ip,
    );
    if rank < n {
        warn!(rank, n_params = n, "rank-deficient Jacobian, covariance is a pseudo-inverse");
    }

    let covar = Array2::from_shape_fn((n, n), |(r, c)| {
        // Symmetrize away the rounding of the two triangles.
        0.5 * (inverse[r + c * n] + inverse[c + r * n]) * redchi
    });
    Ok((covar, rank))
}

/// Calculate correlation matrix from covariance matrix.
///
/// `correl[i,j] = covar[i,j] / sqrt(covar[i,i] * covar[j,j])`, zero where a
/// variance vanishes.
pub fn calculate_correlation(covar: &Array2<f64>) -> Array2<f64> {
    let n = covar.nrows();
    Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j {
            return 1.0;
        }
        let denom = (covar[[i, i]] * covar[[j, j]]).sqrt();
        if denom > 0.0 {
            covar[[i, j]] / denom
        } else {
            0.0
        }
    })
}

/// Square roots of the diagonal; zero for non-positive variances.
pub fn standard_errors_from_covariance(covar: &Array2<f64>) -> Array1<f64> {
    covar
        .diag()
        .mapv(|v| if v > 0.0 { v.sqrt() } else { 0.0 })
}
