//! The SLSQP driver through its reverse-communication loop and through
//! the minimizer.

use approx::assert_abs_diff_eq;
use compfit::minimizer::{Constraint, Minimizer, MinimizerConfig, WithGradient};
use compfit::slsqp::{ProblemState, Request, Slsqp, SlsqpMode, WorkspaceLayout};
use compfit::CompFitError;

/// Drive `min (x-1)² + (y-2)²  s.t.  x + y = 2` to completion.
fn literal_quadratic(exact: bool) -> (ProblemState, usize) {
    let layout = WorkspaceLayout::new(2, 1, 1);
    let mut w = vec![0.0; layout.real_len()];
    let mut jw = vec![0; layout.int_len()];
    let mut p = ProblemState::new(vec![0.0, 0.0], 1, 1).unwrap();
    let mut solver = Slsqp::new(layout, &mut w, &mut jw)
        .with_accuracy(1e-6)
        .with_max_iterations(100)
        .with_exact_line_search(exact);
    loop {
        match solver.advance(&mut p) {
            Request::NeedObjective => {
                p.f = (p.x[0] - 1.0).powi(2) + (p.x[1] - 2.0).powi(2);
                p.c[0] = p.x[0] + p.x[1] - 2.0;
            }
            Request::NeedGradient => {
                p.g[0] = 2.0 * (p.x[0] - 1.0);
                p.g[1] = 2.0 * (p.x[1] - 2.0);
                p.set_constraint_gradient(0, &[1.0, 1.0]);
            }
            Request::Done => break,
            Request::Failed(mode) => panic!("driver failed: {}", mode),
        }
    }
    assert_eq!(solver.mode(), Some(SlsqpMode::Success));
    let iterations = solver.iterations();
    (p, iterations)
}

#[test]
fn literal_quadratic_through_the_driver() {
    let (p, iterations) = literal_quadratic(false);
    assert!(iterations < 100);
    assert_abs_diff_eq!(p.x[0], 0.5, epsilon = 1e-5);
    assert_abs_diff_eq!(p.x[1], 1.5, epsilon = 1e-5);
    assert_abs_diff_eq!(p.f, 0.5, epsilon = 1e-5);
}

#[test]
fn literal_quadratic_with_exact_line_search() {
    let (p, _) = literal_quadratic(true);
    assert_abs_diff_eq!(p.x[0], 0.5, epsilon = 1e-5);
    assert_abs_diff_eq!(p.x[1], 1.5, epsilon = 1e-5);
}

#[test]
fn literal_quadratic_through_the_minimizer() {
    let objective = |x: &[f64]| (x[0] - 1.0).powi(2) + (x[1] - 2.0).powi(2);
    let mut minimizer = Minimizer::new(objective, MinimizerConfig::default())
        .with_constraint(Constraint::equality(|x: &[f64]| x[0] + x[1] - 2.0));
    let result = minimizer.minimize(&[0.0, 0.0]).unwrap();
    assert_eq!(result.mode, SlsqpMode::Success);
    assert!(result.iterations < 100);
    assert_abs_diff_eq!(result.x[0], 0.5, epsilon = 1e-4);
    assert_abs_diff_eq!(result.x[1], 1.5, epsilon = 1e-4);
}

#[test]
fn workspace_one_short_decodes_exact_lengths() {
    // 13 integers needed, so both lengths survive the integer code.
    let layout = WorkspaceLayout::new(5, 2, 1);
    assert_eq!(layout.int_len(), 13);
    let mut w = vec![0.0; layout.real_len() - 1];
    let mut jw = vec![0; layout.int_len()];
    let mut p = ProblemState::new(vec![0.0; 5], 2, 1).unwrap();
    let mut solver = Slsqp::new(layout, &mut w, &mut jw);

    let mode = match solver.advance(&mut p) {
        Request::Failed(mode) => mode,
        other => panic!("expected a workspace failure, got {:?}", other),
    };
    let code = mode.code();
    assert!(code >= 10_000);
    assert_eq!(
        SlsqpMode::from_code(code),
        Some(SlsqpMode::WorkspaceTooSmall {
            need_w: layout.real_len(),
            need_jw: layout.int_len(),
        })
    );
}

#[test]
fn short_integer_workspace_is_reported() {
    let layout = WorkspaceLayout::new(5, 2, 1);
    let mut w = vec![0.0; layout.real_len()];
    let mut jw = vec![0; layout.int_len() - 1];
    let mut p = ProblemState::new(vec![0.0; 5], 2, 1).unwrap();
    let mut solver = Slsqp::new(layout, &mut w, &mut jw);
    assert!(matches!(
        solver.advance(&mut p),
        Request::Failed(SlsqpMode::WorkspaceTooSmall { .. })
    ));
}

/// Hock-Schittkowski problem 71.
#[test]
fn hock_schittkowski_71() {
    let objective = WithGradient::new(
        |x: &[f64]| x[0] * x[3] * (x[0] + x[1] + x[2]) + x[2],
        |x: &[f64], g: &mut [f64]| {
            g[0] = x[3] * (2.0 * x[0] + x[1] + x[2]);
            g[1] = x[0] * x[3];
            g[2] = x[0] * x[3] + 1.0;
            g[3] = x[0] * (x[0] + x[1] + x[2]);
        },
    );
    let config = MinimizerConfig::default().with_accuracy(1e-9);
    let mut minimizer = Minimizer::new(objective, config)
        .with_constraint(Constraint::inequality(|x: &[f64]| {
            x[0] * x[1] * x[2] * x[3] - 25.0
        }))
        .with_constraint(Constraint::equality(|x: &[f64]| {
            x.iter().map(|v| v * v).sum::<f64>() - 40.0
        }))
        .with_bounds(vec![1.0; 4], vec![5.0; 4]);

    let result = minimizer.minimize(&[1.0, 5.0, 5.0, 1.0]).unwrap();
    assert_abs_diff_eq!(result.fun, 17.014_017, epsilon = 1e-4);
    let expected = [1.0, 4.742_999, 3.821_151, 1.379_408];
    for (got, want) in result.x.iter().zip(expected) {
        assert_abs_diff_eq!(*got, want, epsilon = 1e-3);
    }
}

#[test]
fn rosenbrock_inside_the_unit_disk() {
    let rosenbrock = |x: &[f64]| 100.0 * (x[1] - x[0] * x[0]).powi(2) + (1.0 - x[0]).powi(2);
    let mut minimizer =
        Minimizer::new(rosenbrock, MinimizerConfig::default().with_accuracy(1e-10))
            .with_constraint(Constraint::inequality(|x: &[f64]| {
                1.0 - x[0] * x[0] - x[1] * x[1]
            }));
    let result = minimizer.minimize(&[0.0, 0.0]).unwrap();
    assert_abs_diff_eq!(result.x[0], 0.7864, epsilon = 1e-3);
    assert_abs_diff_eq!(result.x[1], 0.6177, epsilon = 1e-3);
    let radius = result.x[0].powi(2) + result.x[1].powi(2);
    assert!(radius <= 1.0 + 1e-6);
}

#[test]
fn contradictory_equalities_fail_with_the_last_iterate() {
    let mut minimizer = Minimizer::new(|x: &[f64]| x[0] * x[0], MinimizerConfig::default())
        .with_constraint(Constraint::equality(|x: &[f64]| x[0] - 1.0))
        .with_constraint(Constraint::equality(|x: &[f64]| x[0] - 2.0));
    match minimizer.minimize(&[0.0]) {
        Err(CompFitError::SolverFailed { mode, x }) => {
            assert!(!mode.is_success());
            assert_eq!(x.len(), 1);
            assert!(x[0].is_finite());
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}
