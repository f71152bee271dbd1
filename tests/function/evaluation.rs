//! Values and derivatives of composites.

use approx::assert_relative_eq;
use compfit::function::{CompositeFunction, Function, PartialJacobian};
use compfit::models::{Constant, Exponential, Gaussian, Linear};
use ndarray::Array2;

fn evaluate(function: &dyn Function, x: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; x.len()];
    function.function(&mut out, x).unwrap();
    out
}

#[test]
fn sum_and_product_of_constants() {
    let x = [-1.0, 0.0, 2.5, 10.0];

    let mut sum = CompositeFunction::new();
    sum.add_function(Box::new(Constant::new(3.0)));
    sum.add_function(Box::new(Constant::new(-1.5)));
    assert!(evaluate(&sum, &x).iter().all(|&v| v == 1.5));

    let mut product = CompositeFunction::product();
    product.add_function(Box::new(Constant::new(3.0)));
    product.add_function(Box::new(Constant::new(-1.5)));
    assert!(evaluate(&product, &x).iter().all(|&v| v == -4.5));
}

#[test]
fn empty_composite_is_the_identity_of_its_combination() {
    let x = [1.0, 2.0];
    assert_eq!(evaluate(&CompositeFunction::new(), &x), vec![0.0, 0.0]);
    assert_eq!(evaluate(&CompositeFunction::product(), &x), vec![1.0, 1.0]);
}

#[test]
fn nested_value_matches_hand_computation() {
    let mut product = CompositeFunction::product();
    product.add_function(Box::new(Linear::new(1.0, 2.0)));
    product.add_function(Box::new(Exponential::new(2.0, 4.0)));

    let mut root = CompositeFunction::new();
    root.add_function(Box::new(product));
    root.add_function(Box::new(Gaussian::new(1.0, 0.5, 0.25)));

    let x = [0.0, 0.5, 1.0, 3.0];
    let out = evaluate(&root, &x);
    for (xi, value) in x.iter().zip(&out) {
        let expected = (1.0 + 2.0 * xi) * 2.0 * (-xi / 4.0).exp()
            + (-0.5 * ((xi - 0.5) / 0.25f64).powi(2)).exp();
        assert_relative_eq!(*value, expected, epsilon = 1e-12);
    }
}

#[test]
fn composite_derivatives_match_differences() {
    let mut product = CompositeFunction::product();
    product.add_function(Box::new(Linear::new(1.0, -0.5)));
    product.add_function(Box::new(Gaussian::new(2.0, 0.3, 0.8)));

    let mut root = CompositeFunction::new();
    root.add_function(Box::new(Exponential::new(1.5, 2.0)));
    root.add_function(Box::new(product));

    let x: Vec<f64> = (0..15).map(|i| -1.0 + 0.2 * i as f64).collect();
    let n = root.n_params();
    let mut analytic = Array2::zeros((x.len(), n));
    root.function_deriv(&mut PartialJacobian::new(analytic.view_mut()), &x)
        .unwrap();

    let base = evaluate(&root, &x);
    for j in 0..n {
        let p = root.get_parameter(j).unwrap();
        let h = 1e-7 * p.abs().max(1.0);
        root.set_parameter(j, p + h).unwrap();
        let shifted = evaluate(&root, &x);
        root.set_parameter(j, p).unwrap();
        for i in 0..x.len() {
            let numeric = (shifted[i] - base[i]) / h;
            assert_relative_eq!(analytic[[i, j]], numeric, epsilon = 1e-5, max_relative = 1e-4);
        }
    }
}
