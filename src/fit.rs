//! Least-squares fitting of a function tree with SLSQP.
//!
//! [`fit`] minimizes `Σ w_i (f(x_i) - y_i)²` over the active parameters of
//! a [`Function`], respecting the bounds attached to them and re-applying
//! ties at every trial point. After convergence it estimates the
//! covariance of the active parameters.
//!
//! ```
//! use compfit::fit::{fit, FitConfig, FitData};
//! use compfit::function::Function;
//! use compfit::models::Linear;
//!
//! let x: Vec<f64> = (0..10).map(f64::from).collect();
//! let y: Vec<f64> = x.iter().map(|v| 1.0 + 2.0 * v).collect();
//! let data = FitData::new(x, y).unwrap();
//!
//! let mut line = Linear::new(0.0, 0.0);
//! let result = fit(&mut line, &data, &FitConfig::default()).unwrap();
//! assert!((result.value("A1").unwrap() - 2.0).abs() < 1e-3);
//! ```

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CompFitError, Result};
use crate::function::{Function, PartialJacobian};
use crate::minimizer::{Minimizer, MinimizerConfig, Objective};
use crate::slsqp::SlsqpMode;
use crate::uncertainty::{UncertaintyCalculator, UncertaintyResult};

/// Observations to fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitData {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    /// Per-point weights, typically `1 / σ²`. `None` means unit weights.
    #[serde(default)]
    pub weights: Option<Vec<f64>>,
}

impl FitData {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self> {
        if x.len() != y.len() {
            return Err(CompFitError::DimensionMismatch(format!(
                "{} x values but {} y values",
                x.len(),
                y.len()
            )));
        }
        Ok(Self {
            x,
            y,
            weights: None,
        })
    }

    pub fn with_weights(mut self, weights: Vec<f64>) -> Result<Self> {
        if weights.len() != self.x.len() {
            return Err(CompFitError::DimensionMismatch(format!(
                "{} weights for {} data points",
                weights.len(),
                self.x.len()
            )));
        }
        if weights.iter().any(|w| w.is_nan() || *w < 0.0) {
            return Err(CompFitError::invalid("weights must be non-negative"));
        }
        self.weights = Some(weights);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    fn weight(&self, i: usize) -> f64 {
        self.weights.as_ref().map_or(1.0, |w| w[i])
    }
}

/// Configuration of a fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    pub minimizer: MinimizerConfig,
    /// Estimate the covariance after convergence. Default: true
    pub compute_covariance: bool,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            minimizer: MinimizerConfig::default(),
            compute_covariance: true,
        }
    }
}

impl FitConfig {
    pub fn with_minimizer(mut self, minimizer: MinimizerConfig) -> Self {
        self.minimizer = minimizer;
        self
    }

    pub fn with_covariance(mut self, compute: bool) -> Self {
        self.compute_covariance = compute;
        self
    }
}

/// Outcome of a converged fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    /// Names of all parameters, tied ones included.
    pub parameter_names: Vec<String>,
    /// Fitted values of all parameters, ties applied.
    pub parameter_values: Vec<f64>,
    /// Names of the active parameters, in the order of the covariance rows.
    pub active_names: Vec<String>,
    /// Weighted sum of squared residuals.
    pub chi_squared: f64,
    /// `chi_squared / max(n_data - n_active, 1)`
    pub reduced_chi_squared: f64,
    pub iterations: usize,
    pub mode: SlsqpMode,
    pub message: String,
    pub uncertainty: Option<UncertaintyResult>,
    /// Serialized form of the fitted function.
    pub function: String,
}

impl FitResult {
    /// Fitted value of parameter `name`.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.parameter_names
            .iter()
            .position(|n| n == name)
            .map(|i| self.parameter_values[i])
    }

    /// Standard error of active parameter `name`, if the covariance was
    /// computed.
    pub fn standard_error(&self, name: &str) -> Option<f64> {
        let k = self.active_names.iter().position(|n| n == name)?;
        self.uncertainty.as_ref().map(|u| u.standard_errors[k])
    }
}

/// Weighted least-squares cost over the active parameters of a function.
struct LeastSquares<'f, 'd> {
    function: &'f mut dyn Function,
    data: &'d FitData,
    active: Vec<usize>,
    /// Parameters set by ties.
    tied: Vec<usize>,
    model: Vec<f64>,
    jacobian: Array2<f64>,
}

impl<'f, 'd> LeastSquares<'f, 'd> {
    fn new(function: &'f mut dyn Function, data: &'d FitData) -> Result<Self> {
        let active = active_indices(&*function)?;
        let n_params = function.n_params();
        let mut tied = Vec::new();
        for i in 0..n_params {
            if !function.is_active(i)? {
                tied.push(i);
            }
        }
        Ok(Self {
            function,
            data,
            active,
            tied,
            model: vec![0.0; data.len()],
            jacobian: Array2::zeros((data.len(), n_params)),
        })
    }

    /// Write `x` into the active parameters, re-apply ties and evaluate.
    fn evaluate_at(&mut self, x: &[f64]) -> Result<()> {
        self.function.set_active_parameters(x)?;
        self.function.apply_ties()?;
        self.function.function(&mut self.model, &self.data.x)
    }

    fn chi_squared(&self) -> f64 {
        self.model
            .iter()
            .zip(&self.data.y)
            .enumerate()
            .map(|(i, (m, y))| self.data.weight(i) * (m - y).powi(2))
            .sum()
    }
}

impl Objective for LeastSquares<'_, '_> {
    fn value(&mut self, x: &[f64]) -> Result<f64> {
        self.evaluate_at(x)?;
        Ok(self.chi_squared())
    }

    /// Chain rule through the ties: `dχ²/dx_k = Σ_j dχ²/dp_j · dp_j/dx_k`.
    ///
    /// The model derivatives are analytic. The sensitivities of tied
    /// parameters to the active ones are forward differences through
    /// `apply_ties`, which leaves the ordering rules of the ties intact.
    fn gradient(&mut self, x: &[f64], _f0: f64, step: f64, grad: &mut [f64]) -> Result<()> {
        self.evaluate_at(x)?;
        self.jacobian.fill(0.0);
        self.function
            .function_deriv(&mut PartialJacobian::new(self.jacobian.view_mut()), &self.data.x)?;
        let n_params = self.jacobian.ncols();
        let dchi: Vec<f64> = (0..n_params)
            .map(|j| {
                (0..self.data.len())
                    .map(|i| {
                        let residual = self.model[i] - self.data.y[i];
                        2.0 * self.data.weight(i) * residual * self.jacobian[[i, j]]
                    })
                    .sum()
            })
            .collect();
        for (g, &column) in grad.iter_mut().zip(&self.active) {
            *g = dchi[column];
        }
        if self.tied.is_empty() {
            return Ok(());
        }

        let base = self
            .tied
            .iter()
            .map(|&j| self.function.get_parameter(j))
            .collect::<Result<Vec<_>>>()?;
        let mut trial = x.to_vec();
        for k in 0..x.len() {
            let h = step * x[k].abs().max(1.0);
            trial[k] = x[k] + h;
            self.function.set_active_parameters(&trial)?;
            self.function.apply_ties()?;
            for (&j, &p0) in self.tied.iter().zip(&base) {
                let dp = (self.function.get_parameter(j)? - p0) / h;
                grad[k] += dchi[j] * dp;
            }
            trial[k] = x[k];
        }
        self.function.set_active_parameters(x)?;
        self.function.apply_ties()
    }
}

fn active_indices(function: &dyn Function) -> Result<Vec<usize>> {
    (0..function.n_active())
        .map(|k| function.index_of_active(k))
        .collect()
}

/// Bounds of the active parameters, or `None` if no active parameter has any.
fn active_bounds(
    function: &dyn Function,
    active: &[usize],
) -> Result<Option<(Vec<f64>, Vec<f64>)>> {
    let mut lower = Vec::with_capacity(active.len());
    let mut upper = Vec::with_capacity(active.len());
    for &index in active {
        let bounds = function.bounds(index)?;
        lower.push(bounds.map_or(f64::NEG_INFINITY, |b| b.min));
        upper.push(bounds.map_or(f64::INFINITY, |b| b.max));
    }
    let bounded = lower.iter().chain(&upper).any(|v| v.is_finite());
    Ok(bounded.then_some((lower, upper)))
}

/// Fit `function` to `data`.
///
/// On success the function holds the fitted parameters. When the optimizer
/// fails, the function holds the last iterate and the error is
/// [`CompFitError::SolverFailed`]. Structural problems, such as a tie that
/// no longer resolves, are reported before the first iteration.
pub fn fit(function: &mut dyn Function, data: &FitData, config: &FitConfig) -> Result<FitResult> {
    function.apply_ties()?;
    let x0 = function.active_parameters()?;
    let n_active = x0.len();
    info!(n_data = data.len(), n_active, "starting fit");
    if n_active == 0 {
        return Err(CompFitError::invalid("function has no active parameters"));
    }

    let objective = LeastSquares::new(function, data)?;
    let bounds = active_bounds(&*objective.function, &objective.active)?;
    let mut minimizer = Minimizer::new(objective, config.minimizer);
    if let Some((lower, upper)) = bounds {
        minimizer = minimizer.with_bounds(lower, upper);
    }
    let outcome = minimizer.minimize(&x0);
    let mut objective = minimizer.into_objective();

    let solution = match outcome {
        Ok(solution) => solution,
        Err(CompFitError::SolverFailed { mode, x }) => {
            return Err(solver_failure(&mut objective, mode, x));
        }
        Err(e) => return Err(e),
    };

    objective.evaluate_at(&solution.x)?;
    let chi_squared = objective.chi_squared();
    let calculator = UncertaintyCalculator::new(data.len(), n_active, chi_squared);

    let uncertainty = if config.compute_covariance {
        let n_data = data.len();
        let mut full = Array2::zeros((n_data, objective.function.n_params()));
        objective
            .function
            .cal_jacobian_for_covariance(&mut PartialJacobian::new(full.view_mut()), &data.x)?;
        let jacobian = Array2::from_shape_fn((n_data, n_active), |(i, k)| {
            full[[i, objective.active[k]]]
        });
        Some(calculator.analyze(&jacobian, data.weights.as_deref())?)
    } else {
        None
    };

    let function = objective.function;
    let n_params = function.n_params();
    let parameter_names = (0..n_params)
        .map(|i| function.parameter_name(i))
        .collect::<Result<Vec<_>>>()?;
    let parameter_values = (0..n_params)
        .map(|i| function.get_parameter(i))
        .collect::<Result<Vec<_>>>()?;
    let active_names = (0..n_active)
        .map(|k| function.name_of_active(k))
        .collect::<Result<Vec<_>>>()?;
    debug!(?parameter_values, "fitted parameters");
    info!(
        iterations = solution.iterations,
        chi_squared,
        reduced_chi_squared = calculator.redchi,
        "fit finished"
    );

    Ok(FitResult {
        parameter_names,
        parameter_values,
        active_names,
        chi_squared,
        reduced_chi_squared: calculator.redchi,
        iterations: solution.iterations,
        mode: solution.mode,
        message: solution.message,
        uncertainty,
        function: function.as_string()?,
    })
}

/// Leave the function at the last iterate and build the failure error.
///
/// A failed re-evaluation is only logged; the solver's reason wins.
fn solver_failure(
    objective: &mut LeastSquares<'_, '_>,
    mode: SlsqpMode,
    x: Vec<f64>,
) -> CompFitError {
    if let Err(e) = objective.evaluate_at(&x) {
        warn!(error = %e, "could not restore the last iterate");
    }
    info!(code = mode.code(), "fit failed: {}", mode);
    CompFitError::SolverFailed { mode, x }
}

/// Fit each function to its own data set.
///
/// Fits are independent: every function owns its tree and every fit its
/// workspace. With the `parallel` feature they run on the rayon pool.
pub fn fit_many<F>(
    functions: &mut [F],
    data: &[FitData],
    config: &FitConfig,
) -> Result<Vec<Result<FitResult>>>
where
    F: Function + Send,
{
    if functions.len() != data.len() {
        return Err(CompFitError::DimensionMismatch(format!(
            "{} functions for {} data sets",
            functions.len(),
            data.len()
        )));
    }
    info!(count = functions.len(), "starting independent fits");

    #[cfg(feature = "parallel")]
    let results = {
        use rayon::prelude::*;
        functions
            .par_iter_mut()
            .zip(data.par_iter())
            .map(|(function, data)| fit(function, data, config))
            .collect()
    };

    #[cfg(not(feature = "parallel"))]
    let results = functions
        .iter_mut()
        .zip(data)
        .map(|(function, data)| fit(function, data, config))
        .collect();

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::CompositeFunction;
    use crate::models::{Constant, Gaussian, Linear};
    use crate::parameters::Bounds;
    use approx::assert_abs_diff_eq;

    fn tight() -> FitConfig {
        FitConfig::default().with_minimizer(MinimizerConfig::default().with_accuracy(1e-10))
    }

    fn gaussian_data(height: f64, centre: f64, sigma: f64, background: f64) -> FitData {
        let x: Vec<f64> = (0..81).map(|i| -4.0 + 0.1 * i as f64).collect();
        let y = x
            .iter()
            .map(|v| background + height * (-0.5 * ((v - centre) / sigma).powi(2)).exp())
            .collect();
        FitData::new(x, y).unwrap()
    }

    fn two_tied_peaks() -> CompositeFunction {
        let mut model = CompositeFunction::new();
        model.add_function(Box::new(Gaussian::new(2.0, -1.5, 0.8)));
        model.add_function(Box::new(Gaussian::new(1.0, 1.5, 0.8)));
        model.tie("f1.Sigma", "f0.Sigma").unwrap();
        model.tie("f1.Height", "0.5*f0.Height").unwrap();
        model
    }

    #[test]
    fn gradient_follows_the_ties() {
        let x: Vec<f64> = (0..61).map(|i| -3.0 + 0.1 * i as f64).collect();
        let y = x.iter().map(|v| (-v * v).exp()).collect();
        let data = FitData::new(x, y).unwrap();
        let mut model = two_tied_peaks();
        let mut objective = LeastSquares::new(&mut model, &data).unwrap();
        assert_eq!(objective.tied, vec![3, 5]);

        let x0 = [2.2, -1.4, 0.7, 1.6];
        let f0 = objective.value(&x0).unwrap();
        let mut analytic = [0.0; 4];
        objective.gradient(&x0, f0, 1e-8, &mut analytic).unwrap();

        for k in 0..4 {
            let h = 1e-6;
            let mut plus = x0;
            let mut minus = x0;
            plus[k] += h;
            minus[k] -= h;
            let numeric =
                (objective.value(&plus).unwrap() - objective.value(&minus).unwrap()) / (2.0 * h);
            assert_abs_diff_eq!(analytic[k], numeric, epsilon = 1e-5 * numeric.abs().max(1.0));
        }
    }

    #[test]
    fn fits_two_peaks_with_scaled_heights() {
        let truth = {
            let mut t = two_tied_peaks();
            t.set_active_parameters(&[3.0, -2.0, 0.5, 2.0]).unwrap();
            t.apply_ties().unwrap();
            t
        };
        let x: Vec<f64> = (0..121).map(|i| -4.0 + i as f64 / 15.0).collect();
        let mut y = vec![0.0; x.len()];
        truth.function(&mut y, &x).unwrap();
        let data = FitData::new(x, y).unwrap();

        let mut model = two_tied_peaks();
        let result = fit(&mut model, &data, &tight()).unwrap();
        assert_abs_diff_eq!(result.value("f0.Height").unwrap(), 3.0, epsilon = 1e-4);
        assert_abs_diff_eq!(result.value("f1.Height").unwrap(), 1.5, epsilon = 1e-4);
        assert_abs_diff_eq!(result.value("f1.Sigma").unwrap(), 0.5, epsilon = 1e-4);
    }

    #[test]
    fn failed_restore_keeps_the_solver_reason() {
        let data = FitData::new(vec![0.0, 1.0], vec![1.0, 2.0]).unwrap();
        let mut model = Linear::new(1.0, 1.0);
        model.tie("A1", "1/A0").unwrap();
        let mut objective = LeastSquares::new(&mut model, &data).unwrap();
        // A0 = 0 makes the tie divide by zero.
        match solver_failure(&mut objective, SlsqpMode::IterationLimit, vec![0.0]) {
            CompFitError::SolverFailed { mode, x } => {
                assert_eq!(mode, SlsqpMode::IterationLimit);
                assert_eq!(x, vec![0.0]);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn fits_a_peak_on_a_background() {
        let data = gaussian_data(3.0, 0.4, 0.7, 0.5);
        let mut model = CompositeFunction::new();
        model.add_function(Box::new(Constant::new(0.0)));
        model.add_function(Box::new(Gaussian::new(2.0, 0.0, 1.0)));

        let result = fit(&mut model, &data, &tight()).unwrap();
        assert_eq!(result.mode, SlsqpMode::Success);
        assert_abs_diff_eq!(result.value("f0.A0").unwrap(), 0.5, epsilon = 1e-3);
        assert_abs_diff_eq!(result.value("f1.Height").unwrap(), 3.0, epsilon = 1e-3);
        assert_abs_diff_eq!(result.value("f1.PeakCentre").unwrap(), 0.4, epsilon = 1e-3);
        assert_abs_diff_eq!(result.value("f1.Sigma").unwrap(), 0.7, epsilon = 1e-3);
        assert!(result.chi_squared < 1e-6);
        assert!(result.uncertainty.is_some());
        assert_eq!(
            model.get_parameter_by_name("f1.Height").unwrap(),
            result.value("f1.Height").unwrap()
        );
    }

    #[test]
    fn ties_follow_the_active_parameters() {
        let data = gaussian_data(2.0, 0.0, 0.5, 0.0);
        let mut model = CompositeFunction::new();
        model.add_function(Box::new(Gaussian::new(1.0, 0.0, 0.8)));
        model.tie("f0.PeakCentre", "0").unwrap();

        let result = fit(&mut model, &data, &tight()).unwrap();
        assert_eq!(result.active_names, vec!["f0.Height", "f0.Sigma"]);
        assert_eq!(result.value("f0.PeakCentre"), Some(0.0));
        assert_abs_diff_eq!(result.value("f0.Sigma").unwrap(), 0.5, epsilon = 1e-3);
        assert_eq!(result.standard_error("f0.PeakCentre"), None);
    }

    #[test]
    fn bounds_of_active_parameters_bind() {
        let x: Vec<f64> = (0..20).map(f64::from).collect();
        let y = x.iter().map(|v| 2.0 * v - 3.0).collect();
        let data = FitData::new(x, y).unwrap();
        let mut line = Linear::new(0.0, 1.0);
        line.add_constraint("A0", Bounds::new(-1.0, 1.0).unwrap()).unwrap();

        let result = fit(&mut line, &data, &FitConfig::default().with_covariance(false)).unwrap();
        assert_abs_diff_eq!(result.value("A0").unwrap(), -1.0, epsilon = 1e-6);
        assert!(result.uncertainty.is_none());
    }

    #[test]
    fn standard_errors_of_a_noisy_line() {
        // Alternating residuals of ±0.1 around y = 1 + x.
        let x: Vec<f64> = (0..10).map(f64::from).collect();
        let y = x
            .iter()
            .enumerate()
            .map(|(i, v)| 1.0 + v + if i % 2 == 0 { 0.1 } else { -0.1 })
            .collect();
        let data = FitData::new(x, y).unwrap();
        let mut line = Linear::new(0.0, 0.0);
        let result = fit(&mut line, &data, &FitConfig::default()).unwrap();
        let uncertainty = result.uncertainty.as_ref().unwrap();
        assert_eq!(uncertainty.nfree, 8);
        assert!(result.standard_error("A0").unwrap() > 0.0);
        assert!(result.standard_error("A1").unwrap() > 0.0);
        assert_abs_diff_eq!(result.reduced_chi_squared, result.chi_squared / 8.0);
    }

    #[test]
    fn mismatched_data_is_rejected() {
        assert!(FitData::new(vec![1.0], vec![]).is_err());
        let data = FitData::new(vec![1.0, 2.0], vec![1.0, 2.0]).unwrap();
        assert!(data.clone().with_weights(vec![1.0]).is_err());
        assert!(data.with_weights(vec![1.0, -1.0]).is_err());
    }

    #[test]
    fn fully_tied_function_is_rejected() {
        let data = FitData::new(vec![0.0], vec![1.0]).unwrap();
        let mut constant = Constant::new(1.0);
        constant.fix("A0").unwrap();
        assert!(matches!(
            fit(&mut constant, &data, &FitConfig::default()),
            Err(CompFitError::InvalidArgument(_))
        ));
    }

    #[test]
    fn many_independent_fits() {
        let heights = [1.0, 2.0, 3.0, 4.0];
        let data: Vec<FitData> = heights
            .iter()
            .map(|&h| gaussian_data(h, 0.0, 1.0, 0.0))
            .collect();
        let mut models: Vec<Gaussian> = heights
            .iter()
            .map(|_| Gaussian::new(0.5, 0.1, 1.2))
            .collect();

        let results = fit_many(&mut models, &data, &tight()).unwrap();
        for (result, &h) in results.iter().zip(&heights) {
            let result = result.as_ref().unwrap();
            assert_abs_diff_eq!(result.value("Height").unwrap(), h, epsilon = 1e-3);
        }
        assert!(fit_many(&mut models, &data[..2], &FitConfig::default()).is_err());
    }
}
