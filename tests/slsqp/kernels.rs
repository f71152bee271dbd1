//! Least-squares kernels on randomized and literal systems.

use approx::assert_relative_eq;
use compfit::slsqp::{hfti, nnls, QpStatus};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn random_matrix(rng: &mut ChaCha8Rng, m: usize, n: usize) -> Vec<f64> {
    (0..m * n).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

/// `Aᵀ (b - A x)` for column-major `a`.
fn dual(a: &[f64], m: usize, n: usize, b: &[f64], x: &[f64]) -> Vec<f64> {
    let residual: Vec<f64> = (0..m)
        .map(|i| b[i] - (0..n).map(|j| a[i + j * m] * x[j]).sum::<f64>())
        .collect();
    (0..n)
        .map(|j| (0..m).map(|i| a[i + j * m] * residual[i]).sum())
        .collect()
}

fn residual_norm(a: &[f64], m: usize, n: usize, b: &[f64], x: &[f64]) -> f64 {
    (0..m)
        .map(|i| {
            let r = b[i] - (0..n).map(|j| a[i + j * m] * x[j]).sum::<f64>();
            r * r
        })
        .sum::<f64>()
        .sqrt()
}

#[test]
fn nnls_satisfies_kkt_conditions() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    for _ in 0..50 {
        let m = rng.gen_range(3..10);
        let n = rng.gen_range(1..=m);
        let a = random_matrix(&mut rng, m, n);
        let b: Vec<f64> = (0..m).map(|_| rng.gen_range(-2.0..2.0)).collect();

        let (mut a_work, mut b_work) = (a.clone(), b.clone());
        let mut x = vec![0.0; n];
        let mut w = vec![0.0; n];
        let mut z = vec![0.0; m];
        let mut index = vec![0; n];
        let (status, rnorm) = nnls(
            &mut a_work, m, m, n, &mut b_work, &mut x, &mut w, &mut z, &mut index,
        );
        assert_eq!(status, QpStatus::Success);

        let grad = dual(&a, m, n, &b, &x);
        for j in 0..n {
            assert!(x[j] >= 0.0);
            if x[j] > 0.0 {
                assert!(grad[j].abs() < 1e-9, "dual {} on the positive set", grad[j]);
            } else {
                assert!(grad[j] < 1e-9, "dual {} on the zero set", grad[j]);
            }
        }
        assert_relative_eq!(rnorm, residual_norm(&a, m, n, &b, &x), epsilon = 1e-9);
    }
}

#[test]
fn nnls_literal_system() {
    // A = [[1,0],[0,1],[1,1]], b = [1,1,3]: the unconstrained optimum
    // (4/3, 4/3) is already feasible.
    let mut a = vec![1.0, 0.0, 1.0, 0.0, 1.0, 1.0];
    let mut b = vec![1.0, 1.0, 3.0];
    let (mut x, mut w, mut z, mut index) = (vec![0.0; 2], vec![0.0; 2], vec![0.0; 3], vec![0; 2]);
    let (status, rnorm) = nnls(&mut a, 3, 3, 2, &mut b, &mut x, &mut w, &mut z, &mut index);
    assert_eq!(status, QpStatus::Success);
    assert_relative_eq!(x[0], 4.0 / 3.0, epsilon = 1e-10);
    assert_relative_eq!(x[1], 4.0 / 3.0, epsilon = 1e-10);
    assert_relative_eq!(rnorm, (1.0f64 / 3.0).sqrt(), epsilon = 1e-10);
}

#[test]
fn hfti_normal_equations_hold() {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    for _ in 0..20 {
        let m = rng.gen_range(4..9);
        let n = rng.gen_range(1..4);
        let a = random_matrix(&mut rng, m, n);
        let rhs: Vec<f64> = (0..m).map(|_| rng.gen_range(-1.0..1.0)).collect();

        let mut a_work = a.clone();
        let mut b = rhs.clone();
        let (mut rnorm, mut h, mut g, mut ip) = ([0.0], vec![0.0; n], vec![0.0; n], vec![0; n]);
        let rank = hfti(
            &mut a_work, m, m, n, &mut b, m, 1, 1e-12, &mut rnorm, &mut h, &mut g, &mut ip,
        );
        assert_eq!(rank, n);

        let x = &b[..n];
        for value in dual(&a, m, n, &rhs, x) {
            assert!(value.abs() < 1e-10);
        }
        assert_relative_eq!(rnorm[0], residual_norm(&a, m, n, &rhs, x), epsilon = 1e-10);
    }
}

#[test]
fn hfti_duplicate_columns_split_evenly() {
    // Columns are equal, so the minimum-length solution halves the weight.
    let mut a = vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0];
    let mut b = vec![2.0, 4.0, 6.0];
    let (mut rnorm, mut h, mut g, mut ip) = ([0.0], vec![0.0; 2], vec![0.0; 2], vec![0; 2]);
    let rank = hfti(&mut a, 3, 3, 2, &mut b, 3, 1, 1e-10, &mut rnorm, &mut h, &mut g, &mut ip);
    assert_eq!(rank, 1);
    assert_relative_eq!(b[0], 1.0, epsilon = 1e-12);
    assert_relative_eq!(b[1], 1.0, epsilon = 1e-12);
    assert!(rnorm[0] < 1e-12);
}
