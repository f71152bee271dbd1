//! End-to-end fits of composite functions.

use approx::{assert_abs_diff_eq, assert_relative_eq};
use compfit::function::{parse_string, CompositeFunction, Function};
use compfit::minimizer::MinimizerConfig;
use compfit::models::{Constant, Exponential, Gaussian, Linear};
use compfit::slsqp::SlsqpMode;
use compfit::{fit, fit_many, CompFitError, FitConfig, FitData, FitResult};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn tight() -> FitConfig {
    FitConfig::default().with_minimizer(MinimizerConfig::default().with_accuracy(1e-10))
}

fn sample(model: &dyn Function, x: Vec<f64>, noise: f64, seed: u64) -> FitData {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut y = vec![0.0; x.len()];
    model.function(&mut y, &x).unwrap();
    if noise > 0.0 {
        for v in &mut y {
            *v += rng.gen_range(-noise..noise);
        }
    }
    FitData::new(x, y).unwrap()
}

fn grid(start: f64, step: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| start + step * i as f64).collect()
}

#[test]
fn noisy_peak_on_a_sloped_background() {
    let mut truth = CompositeFunction::new();
    truth.add_function(Box::new(Linear::new(0.3, 0.05)));
    truth.add_function(Box::new(Gaussian::new(2.5, 1.2, 0.6)));
    let data = sample(&truth, grid(-3.0, 0.06, 101), 0.02, 42);

    let mut model = CompositeFunction::new();
    model.add_function(Box::new(Linear::new(0.0, 0.0)));
    model.add_function(Box::new(Gaussian::new(2.0, 1.0, 0.8)));

    let result = fit(&mut model, &data, &tight()).unwrap();
    assert_eq!(result.mode, SlsqpMode::Success);
    assert_abs_diff_eq!(result.value("f0.A0").unwrap(), 0.3, epsilon = 0.02);
    assert_abs_diff_eq!(result.value("f0.A1").unwrap(), 0.05, epsilon = 0.02);
    assert_abs_diff_eq!(result.value("f1.Height").unwrap(), 2.5, epsilon = 0.05);
    assert_abs_diff_eq!(result.value("f1.PeakCentre").unwrap(), 1.2, epsilon = 0.02);
    assert_abs_diff_eq!(result.value("f1.Sigma").unwrap(), 0.6, epsilon = 0.02);

    let uncertainty = result.uncertainty.as_ref().unwrap();
    assert_eq!(uncertainty.rank, 5);
    assert_eq!(uncertainty.nfree, 96);
    for name in &result.active_names {
        let error = result.standard_error(name).unwrap();
        assert!(error > 0.0 && error < 0.1, "{} has error {}", name, error);
    }
}

#[test]
fn parsed_function_with_a_tie() {
    // The background level follows the decay height.
    let mut truth = parse_string("name=Exponential,Height=4,Lifetime=1.5;name=Constant,A0=0.4").unwrap();
    truth.tie("f1.A0", "f0.Height/10").unwrap();
    truth.apply_ties().unwrap();
    let data = sample(truth.as_ref(), grid(0.0, 0.05, 120), 0.0, 0);

    let mut model =
        parse_string("name=Exponential,Height=3,Lifetime=1;name=Constant,A0=0;ties=(f1.A0=f0.Height/10)")
            .unwrap();
    assert_eq!(model.n_active(), 2);

    let result = fit(model.as_mut(), &data, &tight()).unwrap();
    assert_abs_diff_eq!(result.value("f0.Height").unwrap(), 4.0, epsilon = 1e-4);
    assert_abs_diff_eq!(result.value("f0.Lifetime").unwrap(), 1.5, epsilon = 1e-4);
    assert_abs_diff_eq!(result.value("f1.A0").unwrap(), 0.4, epsilon = 1e-5);
    assert!(result.function.contains("ties=(f1.A0=f0.Height/10)"));
}

#[test]
fn weights_downweight_outliers() {
    let x = grid(0.0, 1.0, 10);
    let mut y = vec![2.0; 10];
    y[9] = 50.0;
    let mut weights = vec![1.0; 10];
    weights[9] = 0.0;
    let data = FitData::new(x, y).unwrap().with_weights(weights).unwrap();

    let mut model = Constant::new(0.0);
    let result = fit(&mut model, &data, &tight()).unwrap();
    assert_abs_diff_eq!(result.value("A0").unwrap(), 2.0, epsilon = 1e-6);
}

#[test]
fn results_and_configs_survive_json() {
    let data = FitData::new(grid(0.0, 0.5, 12), grid(1.0, 1.0, 12)).unwrap();
    let mut model = Linear::new(0.0, 0.0);
    let config = tight().with_covariance(true);
    let result = fit(&mut model, &data, &config).unwrap();

    let json = serde_json::to_string(&result).unwrap();
    let back: FitResult = serde_json::from_str(&json).unwrap();
    assert_eq!(back.parameter_names, result.parameter_names);
    assert_eq!(back.active_names, result.active_names);
    assert_eq!(back.mode, result.mode);
    assert_eq!(back.function, result.function);
    for (a, b) in back.parameter_values.iter().zip(&result.parameter_values) {
        assert_relative_eq!(*a, *b, max_relative = 1e-14);
    }
    let (u, v) = (back.uncertainty.unwrap(), result.uncertainty.unwrap());
    assert_eq!(u.rank, v.rank);
    for (a, b) in u.covariance.iter().zip(v.covariance.iter()) {
        assert_relative_eq!(*a, *b, max_relative = 1e-14);
    }

    let json = serde_json::to_string(&config).unwrap();
    let back: FitConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back.compute_covariance, config.compute_covariance);
    assert_eq!(back.minimizer.max_iterations, config.minimizer.max_iterations);
    assert_relative_eq!(back.minimizer.accuracy, config.minimizer.accuracy, max_relative = 1e-14);

    // Missing fields take their defaults.
    let partial: FitConfig = serde_json::from_str(r#"{"compute_covariance": false}"#).unwrap();
    assert!(!partial.compute_covariance);
    assert_eq!(partial.minimizer, MinimizerConfig::default());
}

#[test]
fn failed_fit_leaves_the_last_iterate() {
    let data = sample(&Gaussian::new(3.0, 0.5, 0.4), grid(-2.0, 0.1, 41), 0.0, 0);
    let mut model = Gaussian::new(1.0, -0.5, 1.0);
    let config = FitConfig::default()
        .with_minimizer(MinimizerConfig::default().with_max_iterations(1));

    match fit(&mut model, &data, &config) {
        Err(CompFitError::SolverFailed { mode, x }) => {
            assert_eq!(mode, SlsqpMode::IterationLimit);
            let current: Vec<f64> = (0..3).map(|i| model.get_parameter(i).unwrap()).collect();
            assert_eq!(current, x);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn many_fits_run_independently() {
    let centres = [-1.0, -0.5, 0.0, 0.5, 1.0, 1.5];
    let data: Vec<FitData> = centres
        .iter()
        .enumerate()
        .map(|(k, &c)| sample(&Gaussian::new(2.0, c, 0.5), grid(-3.0, 0.05, 121), 0.0, k as u64))
        .collect();
    let mut models: Vec<CompositeFunction> = centres
        .iter()
        .map(|&c| {
            let mut model = CompositeFunction::new();
            model.add_function(Box::new(Gaussian::new(1.5, c + 0.2, 0.7)));
            model
        })
        .collect();

    let results = fit_many(&mut models, &data, &tight()).unwrap();
    assert_eq!(results.len(), centres.len());
    for ((result, model), &centre) in results.iter().zip(&models).zip(&centres) {
        let result = result.as_ref().unwrap();
        assert_abs_diff_eq!(result.value("f0.PeakCentre").unwrap(), centre, epsilon = 1e-4);
        assert_eq!(
            model.get_parameter_by_name("f0.PeakCentre").unwrap(),
            result.value("f0.PeakCentre").unwrap()
        );
    }

    assert!(fit_many(&mut models, &data[..2], &tight()).is_err());
}

#[test]
fn noisy_peaks_with_a_scaled_height_tie() {
    let tied_pair = |heights: (f64, f64), centres: (f64, f64), sigma: f64| {
        let mut model = CompositeFunction::new();
        model.add_function(Box::new(Gaussian::new(heights.0, centres.0, sigma)));
        model.add_function(Box::new(Gaussian::new(heights.1, centres.1, sigma)));
        model.tie("f1.Sigma", "f0.Sigma").unwrap();
        model.tie("f1.Height", "0.5*f0.Height").unwrap();
        model
    };
    let mut truth = tied_pair((3.0, 0.0), (-2.0, 2.0), 0.5);
    truth.apply_ties().unwrap();
    let data = sample(&truth, grid(-4.0, 0.05, 161), 0.1, 3);

    let mut model = tied_pair((2.0, 0.0), (-1.8, 1.8), 0.7);
    let config =
        FitConfig::default().with_minimizer(MinimizerConfig::default().with_accuracy(1e-8));
    let result = fit(&mut model, &data, &config).unwrap();
    assert_eq!(result.mode, SlsqpMode::Success);
    assert_eq!(result.active_names, vec!["f0.Height", "f0.PeakCentre", "f0.Sigma", "f1.PeakCentre"]);
    assert_abs_diff_eq!(result.value("f0.Height").unwrap(), 3.0, epsilon = 0.1);
    assert_abs_diff_eq!(result.value("f0.PeakCentre").unwrap(), -2.0, epsilon = 0.02);
    assert_abs_diff_eq!(result.value("f0.Sigma").unwrap(), 0.5, epsilon = 0.02);
    assert_abs_diff_eq!(result.value("f1.PeakCentre").unwrap(), 2.0, epsilon = 0.03);
    assert_eq!(
        result.value("f1.Height").unwrap(),
        0.5 * result.value("f0.Height").unwrap()
    );
}
