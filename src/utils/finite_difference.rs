//! Finite difference methods for numerical differentiation.
//!
//! Used for leaf functions without analytic derivatives and for objectives
//! and constraints that only provide values.

use crate::error::Result;
use crate::function::PartialJacobian;

/// Default absolute step for objective and constraint gradients.
pub const DEFAULT_STEP: f64 = 1e-8;

/// Relative step used when differentiating model functions.
const MODEL_EPSILON: f64 = 1e-8;

/// Step for a parameter of magnitude `value`, scaled so large parameters
/// are not perturbed below their floating point resolution.
fn scaled_step(value: f64, eps: f64) -> f64 {
    if value.abs() > eps {
        value.abs() * eps
    } else {
        eps
    }
}

/// Fill a model Jacobian with forward differences.
///
/// `eval(params, out)` evaluates the model over all `n_data` points for the
/// given parameter values.
///
/// # Arguments
///
/// * `eval` - Model evaluation for an explicit parameter vector
/// * `params` - Parameter values at which to differentiate
/// * `n_data` - Number of data points (rows of the Jacobian)
/// * `jacobian` - Output view with one column per parameter
pub fn leaf_jacobian<F>(eval: F, params: &[f64], n_data: usize, jacobian: &mut PartialJacobian<'_>)
where
    F: Fn(&[f64], &mut [f64]),
{
    let mut base = vec![0.0; n_data];
    eval(params, &mut base);

    let mut perturbed_params = params.to_vec();
    let mut perturbed = vec![0.0; n_data];
    for j in 0..params.len() {
        let step = scaled_step(params[j], MODEL_EPSILON);
        perturbed_params[j] = params[j] + step;
        eval(&perturbed_params, &mut perturbed);
        perturbed_params[j] = params[j];

        for i in 0..n_data {
            jacobian.set(i, j, (perturbed[i] - base[i]) / step);
        }
    }
}

/// Forward-difference gradient of a scalar function with a fixed absolute step.
///
/// # Arguments
///
/// * `f` - Function to differentiate
/// * `x` - Point at which to differentiate
/// * `f0` - `f(x)`, already known by the caller
/// * `step` - Absolute step added to each coordinate
/// * `grad` - Output, same length as `x`
pub fn gradient<F>(mut f: F, x: &[f64], f0: f64, step: f64, grad: &mut [f64]) -> Result<()>
where
    F: FnMut(&[f64]) -> Result<f64>,
{
    let mut shifted = x.to_vec();
    for j in 0..x.len() {
        shifted[j] = x[j] + step;
        grad[j] = (f(&shifted)? - f0) / step;
        shifted[j] = x[j];
    }
    Ok(())
}
