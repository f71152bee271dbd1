//! Closure-based façade over the SLSQP driver.
//!
//! [`Minimizer`] owns the workspace, answers the driver's requests by
//! calling the objective and the constraints, and turns the terminal mode
//! into a [`SlsqpResult`] or a [`CompFitError::SolverFailed`].
//!
//! ```
//! use compfit::minimizer::{Constraint, Minimizer, MinimizerConfig};
//!
//! let objective = |x: &[f64]| (x[0] - 1.0).powi(2) + (x[1] - 2.0).powi(2);
//! let mut minimizer = Minimizer::new(objective, MinimizerConfig::default())
//!     .with_constraint(Constraint::equality(|x: &[f64]| x[0] + x[1] - 2.0));
//! let result = minimizer.minimize(&[0.0, 0.0]).unwrap();
//! assert!((result.x[0] - 0.5).abs() < 1e-4);
//! assert!((result.x[1] - 1.5).abs() < 1e-4);
//! ```

pub mod config;
pub mod constraint;
pub mod objective;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CompFitError, Result};
use crate::slsqp::{ProblemState, Request, Slsqp, SlsqpMode, WorkspaceLayout};

pub use config::MinimizerConfig;
pub use constraint::{Constraint, ConstraintKind};
pub use objective::{Objective, WithGradient};

/// Result of a successful minimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlsqpResult {
    /// Solution
    pub x: Vec<f64>,

    /// Objective value at the solution
    pub fun: f64,

    /// Number of outer iterations
    pub iterations: usize,

    /// Terminal mode of the driver
    pub mode: SlsqpMode,

    /// Description of the terminal mode
    pub message: String,
}

impl fmt::Display for SlsqpResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Message: {} (mode {})", self.message, self.mode.code())?;
        writeln!(f, "  Objective: {:.6e}", self.fun)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Solution: {:?}", self.x)?;
        Ok(())
    }
}

/// State passed to the observer once per accepted iterate.
#[derive(Debug, Clone, Copy)]
pub struct IterationReport<'r> {
    pub iteration: usize,
    pub x: &'r [f64],
    pub f: f64,
    /// Total constraint violation at `x`.
    pub violation: f64,
}

type Observer<'a> = Box<dyn FnMut(&IterationReport<'_>) + 'a>;

/// SLSQP minimizer for an objective with bounds and nonlinear constraints.
pub struct Minimizer<'a, O> {
    objective: O,
    config: MinimizerConfig,
    constraints: Vec<Constraint<'a>>,
    bounds: Option<(Vec<f64>, Vec<f64>)>,
    observer: Option<Observer<'a>>,
}

impl<'a, O: Objective> Minimizer<'a, O> {
    pub fn new(objective: O, config: MinimizerConfig) -> Self {
        Self {
            objective,
            config,
            constraints: Vec::new(),
            bounds: None,
            observer: None,
        }
    }

    /// Add a constraint. Equalities and inequalities may be mixed freely.
    pub fn with_constraint(mut self, constraint: Constraint<'a>) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Box constraints `lower <= x <= upper`; infinite entries do not bind.
    pub fn with_bounds(mut self, lower: Vec<f64>, upper: Vec<f64>) -> Self {
        self.bounds = Some((lower, upper));
        self
    }

    /// Called after the objective has been evaluated at each accepted
    /// iterate.
    pub fn with_observer(mut self, observer: impl FnMut(&IterationReport<'_>) + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn config(&self) -> &MinimizerConfig {
        &self.config
    }

    pub fn objective(&self) -> &O {
        &self.objective
    }

    pub fn into_objective(self) -> O {
        self.objective
    }

    /// Minimize starting from `x0` with a freshly allocated workspace.
    pub fn minimize(&mut self, x0: &[f64]) -> Result<SlsqpResult> {
        let layout = self.layout(x0.len());
        let mut w = vec![0.0; layout.real_len()];
        let mut jw = vec![0; layout.int_len()];
        self.minimize_in(x0, &mut w, &mut jw)
    }

    /// Workspace layout for `n` variables and the current constraints.
    pub fn layout(&self, n: usize) -> WorkspaceLayout {
        let meq = self.constraints.iter().filter(|c| c.is_equality()).count();
        WorkspaceLayout::new(n, self.constraints.len(), meq)
    }

    /// Minimize starting from `x0` in caller-owned workspace.
    ///
    /// A workspace shorter than [`Minimizer::layout`] requires is reported
    /// as [`CompFitError::Workspace`].
    pub fn minimize_in(
        &mut self,
        x0: &[f64],
        w: &mut [f64],
        jw: &mut [usize],
    ) -> Result<SlsqpResult> {
        let n = x0.len();
        let layout = self.layout(n);

        // The driver expects equalities first.
        let mut order: Vec<usize> = (0..self.constraints.len()).collect();
        order.sort_by_key(|&j| !self.constraints[j].is_equality());

        let mut p = ProblemState::new(x0.to_vec(), layout.m(), layout.meq())?;
        if let Some((lower, upper)) = &self.bounds {
            p = p.with_bounds(lower.clone(), upper.clone())?;
        }

        let mut solver = self.solver(layout, w, jw);
        let step = self.config.gradient_step;
        let mut row = vec![0.0; n];

        let mode = loop {
            match solver.advance(&mut p) {
                Request::NeedObjective => {
                    p.f = self.objective.value(&p.x)?;
                    for (j, &k) in order.iter().enumerate() {
                        p.c[j] = self.constraints[k].value(&p.x);
                    }
                }
                Request::NeedGradient => {
                    self.objective.gradient(&p.x, p.f, step, &mut p.g[..n])?;
                    for (j, &k) in order.iter().enumerate() {
                        self.constraints[k].gradient(&p.x, p.c[j], step, &mut row)?;
                        p.set_constraint_gradient(j, &row);
                    }
                    if let Some(observer) = self.observer.as_mut() {
                        observer(&IterationReport {
                            iteration: solver.iterations(),
                            x: &p.x,
                            f: p.f,
                            violation: p.violation(),
                        });
                    }
                }
                Request::Done => break SlsqpMode::Success,
                Request::Failed(mode) => break mode,
            }
        };

        match mode {
            SlsqpMode::Success => {
                debug!(iterations = solver.iterations(), f = p.f, "minimization converged");
                Ok(SlsqpResult {
                    fun: p.f,
                    iterations: solver.iterations(),
                    mode,
                    message: mode.message().to_string(),
                    x: p.x,
                })
            }
            SlsqpMode::WorkspaceTooSmall { need_w, need_jw } => {
                Err(CompFitError::Workspace { need_w, need_jw })
            }
            mode => Err(CompFitError::SolverFailed { mode, x: p.x }),
        }
    }
}

impl<O> Minimizer<'_, O> {
    /// Driver configured from [`MinimizerConfig`]. A negative accuracy
    /// selects the exact line search as well as the flag does.
    fn solver<'w>(
        &self,
        layout: WorkspaceLayout,
        w: &'w mut [f64],
        jw: &'w mut [usize],
    ) -> Slsqp<'w> {
        let exact = self.config.exact_line_search || self.config.accuracy < 0.0;
        Slsqp::new(layout, w, jw)
            .with_accuracy(self.config.accuracy)
            .with_max_iterations(self.config.max_iterations)
            .with_exact_line_search(exact)
    }
}

impl<O> fmt::Debug for Minimizer<'_, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Minimizer")
            .field("config", &self.config)
            .field("constraints", &self.constraints)
            .field("bounds", &self.bounds)
            .finish()
    }
}
