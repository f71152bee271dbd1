//! The SLSQP outer iteration as an explicit reverse-communication state
//! machine.
//!
//! The caller owns the problem arrays ([`ProblemState`]) and the workspace.
//! Each call to [`Slsqp::advance`] runs until the driver needs new function
//! values, new derivatives, or has finished:
//!
//! ```
//! use compfit::slsqp::{ProblemState, Request, Slsqp, WorkspaceLayout};
//!
//! // min (x - 1)² + (y - 2)²  subject to  x + y - 2 = 0
//! let mut p = ProblemState::new(vec![0.0, 0.0], 1, 1).unwrap();
//! let layout = WorkspaceLayout::new(2, 1, 1);
//! let mut w = vec![0.0; layout.real_len()];
//! let mut jw = vec![0; layout.int_len()];
//! let mut solver = Slsqp::new(layout, &mut w, &mut jw);
//! loop {
//!     match solver.advance(&mut p) {
//!         Request::NeedObjective => {
//!             let (x, y) = (p.x[0], p.x[1]);
//!             p.f = (x - 1.0).powi(2) + (y - 2.0).powi(2);
//!             p.c[0] = x + y - 2.0;
//!         }
//!         Request::NeedGradient => {
//!             let (x, y) = (p.x[0], p.x[1]);
//!             p.g[0] = 2.0 * (x - 1.0);
//!             p.g[1] = 2.0 * (y - 2.0);
//!             p.set_constraint_gradient(0, &[1.0, 1.0]);
//!         }
//!         Request::Done => break,
//!         Request::Failed(mode) => panic!("{mode}"),
//!     }
//! }
//! assert!((p.x[0] - 0.5).abs() < 1e-5);
//! assert!((p.x[1] - 1.5).abs() < 1e-5);
//! ```

use tracing::{debug, trace, warn};

use super::blas::{axpy, dot, nrm2, scal};
use super::ldl::ldl;
use super::linmin::{LineMinimizer, LineStep};
use super::lsq::{clip, lsq, LsqProblem};
use super::mode::{QpStatus, SlsqpMode};
use super::workspace::WorkspaceLayout;
use crate::error::{CompFitError, Result};

/// Smallest step accepted by the line searches.
const ALFMIN: f64 = 0.1;
/// Initial weight of the augmentation variable for inconsistent
/// linearizations.
const AUGMENTED_WEIGHT: f64 = 100.0;
const MAX_RESETS: usize = 5;
const MAX_INCONSISTENT: usize = 5;
const MAX_LINE_STEPS: usize = 10;

/// Arrays exchanged between the caller and the driver.
///
/// `g` and `a` carry one extra trailing entry (column) that the driver
/// uses internally; the caller fills only the first `n`.
#[derive(Debug, Clone)]
pub struct ProblemState {
    n: usize,
    m: usize,
    meq: usize,
    /// Current iterate.
    pub x: Vec<f64>,
    pub xl: Vec<f64>,
    pub xu: Vec<f64>,
    /// Objective value at `x`.
    pub f: f64,
    /// Constraint values at `x`, equalities first.
    pub c: Vec<f64>,
    /// Objective gradient, length `n + 1`.
    pub g: Vec<f64>,
    /// Constraint Jacobian, `m x (n + 1)` column-major.
    pub a: Vec<f64>,
}

impl ProblemState {
    /// Unbounded problem starting at `x0` with `m` constraints, the first
    /// `meq` of which are equalities.
    pub fn new(x0: Vec<f64>, m: usize, meq: usize) -> Result<Self> {
        if meq > m {
            return Err(CompFitError::invalid(format!(
                "{} equality constraints but only {} constraints",
                meq, m
            )));
        }
        let n = x0.len();
        Ok(Self {
            n,
            m,
            meq,
            x: x0,
            xl: vec![f64::NEG_INFINITY; n],
            xu: vec![f64::INFINITY; n],
            f: 0.0,
            c: vec![0.0; m],
            g: vec![0.0; n + 1],
            a: vec![0.0; m * (n + 1)],
        })
    }

    /// Set lower and upper bounds; infinite entries do not bind.
    pub fn with_bounds(mut self, xl: Vec<f64>, xu: Vec<f64>) -> Result<Self> {
        if xl.len() != self.n || xu.len() != self.n {
            return Err(CompFitError::DimensionMismatch(format!(
                "bounds of length {}/{} for {} variables",
                xl.len(),
                xu.len(),
                self.n
            )));
        }
        self.xl = xl;
        self.xu = xu;
        Ok(self)
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn m(&self) -> usize {
        self.m
    }

    pub fn meq(&self) -> usize {
        self.meq
    }

    pub fn layout(&self) -> WorkspaceLayout {
        WorkspaceLayout::new(self.n, self.m, self.meq)
    }

    /// Derivative of constraint `j` with respect to variable `i`.
    pub fn constraint_gradient(&self, j: usize, i: usize) -> f64 {
        self.a[j + i * self.m]
    }

    /// Store the gradient of constraint `j` as row `j` of `a`.
    pub fn set_constraint_gradient(&mut self, j: usize, grad: &[f64]) {
        for (i, &value) in grad.iter().take(self.n).enumerate() {
            self.a[j + i * self.m] = value;
        }
    }

    /// Total violation `Σ |c_eq| + Σ max(0, -c_ineq)`.
    pub fn violation(&self) -> f64 {
        self.c
            .iter()
            .enumerate()
            .map(|(j, &cj)| (-cj).max(if j < self.meq { cj } else { 0.0 }))
            .sum()
    }
}

/// What the driver needs before it can continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Fill `f` and `c` at the current `x`.
    NeedObjective,
    /// Fill `g` and `a` at the current `x`.
    NeedGradient,
    /// Converged; `x` holds the solution.
    Done,
    /// Stopped with a failure mode; `x` holds the last iterate.
    Failed(SlsqpMode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Start,
    InitialObjective,
    InitialGradient,
    /// A trial point of the line search is being evaluated.
    LineSearch,
    /// Derivatives at the accepted point are being evaluated.
    Gradient,
    Finished(SlsqpMode),
}

/// Resumption points inside the iteration.
#[derive(Debug, Clone, Copy)]
enum Label {
    ResetHessian,
    Iterate,
    InexactStep,
    ExactStep,
    LineValue,
    CheckStep,
    RelaxedCheck,
    UpdateHessian,
}

enum Flow {
    Goto(Label),
    Yield(Request),
}

/// Sequential least-squares quadratic programming (Kraft's SLSQP).
///
/// The workspace slices are borrowed for the lifetime of the driver and
/// must be at least [`WorkspaceLayout::real_len`] and
/// [`WorkspaceLayout::int_len`] long; shorter slices make the first
/// [`advance`](Self::advance) fail with [`SlsqpMode::WorkspaceTooSmall`].
#[derive(Debug)]
pub struct Slsqp<'w> {
    layout: WorkspaceLayout,
    acc: f64,
    exact: bool,
    max_iter: usize,
    w: &'w mut [f64],
    jw: &'w mut [usize],
    stage: Stage,
    iter: usize,
    ireset: usize,
    line: usize,
    incons: usize,
    badlin: bool,
    alpha: f64,
    f0: f64,
    gs: f64,
    h1: f64,
    h2: f64,
    h3: f64,
    h4: f64,
    t: f64,
    t0: f64,
    tol: f64,
    linmin: LineMinimizer,
}

impl<'w> Slsqp<'w> {
    pub fn new(layout: WorkspaceLayout, w: &'w mut [f64], jw: &'w mut [usize]) -> Self {
        Self {
            layout,
            acc: 1e-6,
            exact: false,
            max_iter: 100,
            w,
            jw,
            stage: Stage::Start,
            iter: 0,
            ireset: 0,
            line: 0,
            incons: 0,
            badlin: false,
            alpha: 1.0,
            f0: 0.0,
            gs: 0.0,
            h1: 0.0,
            h2: 0.0,
            h3: 0.0,
            h4: 1.0,
            t: 0.0,
            t0: 0.0,
            tol: 0.0,
            linmin: LineMinimizer::new(),
        }
    }

    /// Required accuracy. A negative value selects the exact line search
    /// with accuracy `|acc|`.
    pub fn with_accuracy(mut self, acc: f64) -> Self {
        self.exact |= acc < 0.0;
        self.acc = acc.abs();
        self
    }

    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_exact_line_search(mut self, exact: bool) -> Self {
        self.exact = exact;
        self
    }

    /// Outer iterations started so far.
    pub fn iterations(&self) -> usize {
        self.iter
    }

    /// Step length of the current line search.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// The terminal mode, once finished.
    pub fn mode(&self) -> Option<SlsqpMode> {
        match self.stage {
            Stage::Finished(mode) => Some(mode),
            _ => None,
        }
    }

    /// Norm of the current search direction.
    pub fn step_norm(&self) -> f64 {
        let n = self.layout.n();
        let range = self.layout.search_direction();
        self.w
            .get(range.start..range.start + n)
            .map_or(0.0, |s| nrm2(n, s, 0, 1))
    }

    /// Whether the exact (Brent) line search is used.
    pub fn exact_line_search(&self) -> bool {
        self.exact
    }

    /// Run until the next request.
    pub fn advance(&mut self, p: &mut ProblemState) -> Request {
        match self.stage {
            Stage::Start => {
                if let Err(mode) = self.layout.check(self.w.len(), self.jw.len()) {
                    return self.finish(mode);
                }
                if p.layout() != self.layout {
                    warn!("problem dimensions do not match the workspace layout");
                    return self.finish(SlsqpMode::TooManyEqualityConstraints);
                }
                self.stage = Stage::InitialObjective;
                Request::NeedObjective
            }
            Stage::InitialObjective => {
                self.stage = Stage::InitialGradient;
                Request::NeedGradient
            }
            Stage::InitialGradient => {
                self.initialize(p);
                self.run(p, Label::ResetHessian)
            }
            Stage::LineSearch => self.run(p, Label::LineValue),
            Stage::Gradient => self.run(p, Label::UpdateHessian),
            Stage::Finished(mode) if mode.is_success() => Request::Done,
            Stage::Finished(mode) => Request::Failed(mode),
        }
    }

    fn run(&mut self, p: &mut ProblemState, mut label: Label) -> Request {
        loop {
            let flow = match label {
                Label::ResetHessian => self.reset_hessian(),
                Label::Iterate => self.iterate(p),
                Label::InexactStep => self.inexact_step(p),
                Label::ExactStep => self.exact_step(p),
                Label::LineValue => self.line_value(p),
                Label::CheckStep => self.check_step(p, self.acc, SlsqpMode::EvaluateGradient),
                Label::RelaxedCheck => {
                    self.check_step(p, self.tol, SlsqpMode::PositiveDirectionalDerivative)
                }
                Label::UpdateHessian => self.update_hessian(p),
            };
            match flow {
                Flow::Goto(next) => label = next,
                Flow::Yield(request) => return request,
            }
        }
    }

    fn finish(&mut self, mode: SlsqpMode) -> Request {
        self.stage = Stage::Finished(mode);
        if mode.is_success() {
            debug!(iterations = self.iter, "SLSQP converged");
            Request::Done
        } else {
            warn!(iterations = self.iter, code = mode.code(), "SLSQP stopped: {}", mode);
            Request::Failed(mode)
        }
    }

    fn initialize(&mut self, p: &ProblemState) {
        self.iter = 0;
        self.ireset = 0;
        self.tol = 10.0 * self.acc;
        self.f0 = p.f;
        let arrays = self.layout.split(&mut *self.w);
        arrays.s.fill(0.0);
        arrays.mu.fill(0.0);
    }

    fn reset_hessian(&mut self) -> Flow {
        self.ireset += 1;
        if self.ireset > MAX_RESETS {
            return Flow::Goto(Label::RelaxedCheck);
        }
        trace!(resets = self.ireset, "resetting quasi-Newton matrix");
        let n = self.layout.n();
        let packed = self.layout.packed_len();
        let arrays = self.layout.split(&mut *self.w);
        arrays.l[..packed].fill(0.0);
        let mut j = 0;
        for i in 0..n {
            arrays.l[j] = 1.0;
            j += n - i;
        }
        Flow::Goto(Label::Iterate)
    }

    /// Solve the QP subproblem and test for convergence.
    fn iterate(&mut self, p: &mut ProblemState) -> Flow {
        self.iter += 1;
        if self.iter > self.max_iter {
            return Flow::Yield(self.finish(SlsqpMode::IterationLimit));
        }
        let (n, m, meq) = (self.layout.n(), self.layout.m(), self.layout.meq());
        let nl = self.layout.packed_len() + 1;
        let arrays = self.layout.split(&mut *self.w);

        for i in 0..n {
            arrays.u[i] = p.xl[i] - p.x[i];
            arrays.v[i] = p.xu[i] - p.x[i];
        }
        self.h4 = 1.0;
        let problem = LsqProblem {
            m,
            meq,
            n,
            nl,
            l: arrays.l,
            g: &p.g,
            a: &p.a,
            la: m,
            b: &p.c,
            xl: arrays.u,
            xu: arrays.v,
        };
        let mut status = lsq(&problem, arrays.s, arrays.r, arrays.rest, self.jw);

        self.badlin = false;
        if status == QpStatus::SingularC && n == meq {
            status = QpStatus::Incompatible;
        }
        if status == QpStatus::Incompatible {
            // Relax the linearized constraints with one extra variable.
            self.badlin = true;
            for j in 0..m {
                p.a[j + n * m] = if j < meq {
                    -p.c[j]
                } else {
                    (-p.c[j]).max(0.0)
                };
            }
            arrays.s[..n].fill(0.0);
            self.h3 = 0.0;
            p.g[n] = 0.0;
            arrays.l[nl - 1] = AUGMENTED_WEIGHT;
            arrays.s[n] = 1.0;
            arrays.u[n] = 0.0;
            arrays.v[n] = 1.0;
            self.incons = 0;
            loop {
                let problem = LsqProblem {
                    m,
                    meq,
                    n: n + 1,
                    nl,
                    l: arrays.l,
                    g: &p.g,
                    a: &p.a,
                    la: m,
                    b: &p.c,
                    xl: arrays.u,
                    xu: arrays.v,
                };
                status = lsq(&problem, arrays.s, arrays.r, arrays.rest, self.jw);
                self.h4 = 1.0 - arrays.s[n];
                if status != QpStatus::Incompatible {
                    break;
                }
                arrays.l[nl - 1] *= 10.0;
                self.incons += 1;
                if self.incons > MAX_INCONSISTENT {
                    break;
                }
            }
        }
        if !status.is_success() {
            return Flow::Yield(self.finish(status.into()));
        }

        // Lagrangian gradient and L1 penalty weights.
        for i in 0..n {
            arrays.v[i] = p.g[i] - dot(m, &p.a, i * m, 1, arrays.r, 0, 1);
        }
        self.f0 = p.f;
        arrays.x0.copy_from_slice(&p.x);
        self.gs = dot(n, &p.g, 0, 1, arrays.s, 0, 1);
        self.h1 = self.gs.abs();
        self.h2 = 0.0;
        for j in 0..m {
            let eq = if j < meq { p.c[j] } else { 0.0 };
            self.h2 += (-p.c[j]).max(eq);
            let rj = arrays.r[j].abs();
            arrays.mu[j] = rj.max((arrays.mu[j] + rj) / 2.0);
            self.h1 += rj * p.c[j].abs();
        }
        let step_norm = nrm2(n, arrays.s, 0, 1);
        debug!(
            iteration = self.iter,
            f = p.f,
            step_norm,
            violation = self.h2,
            "SLSQP iteration"
        );

        if self.h1 < self.acc && self.h2 < self.acc && !self.badlin && !p.f.is_nan() {
            return Flow::Yield(self.finish(SlsqpMode::Success));
        }
        self.h1 = penalty(arrays.mu, &p.c, meq);
        self.t0 = p.f + self.h1;
        self.h3 = self.gs - self.h1 * self.h4;
        if self.h3 >= 0.0 {
            // Not a descent direction for the merit function.
            return Flow::Goto(Label::ResetHessian);
        }

        self.line = 0;
        self.alpha = 1.0;
        if self.exact {
            self.linmin.reset();
            Flow::Goto(Label::ExactStep)
        } else {
            Flow::Goto(Label::InexactStep)
        }
    }

    fn inexact_step(&mut self, p: &mut ProblemState) -> Flow {
        self.line += 1;
        self.h3 *= self.alpha;
        let n = self.layout.n();
        let arrays = self.layout.split(&mut *self.w);
        scal(n, self.alpha, arrays.s, 0, 1);
        p.x.copy_from_slice(arrays.x0);
        axpy(n, 1.0, arrays.s, 0, 1, &mut p.x, 0, 1);
        clip(&mut p.x, &p.xl, &p.xu);
        self.stage = Stage::LineSearch;
        Flow::Yield(Request::NeedObjective)
    }

    fn exact_step(&mut self, p: &mut ProblemState) -> Flow {
        let n = self.layout.n();
        let arrays = self.layout.split(&mut *self.w);
        if self.linmin.is_converged() {
            scal(n, self.alpha, arrays.s, 0, 1);
            return Flow::Goto(Label::CheckStep);
        }
        self.alpha = match self.linmin.step(ALFMIN, 1.0, self.t, self.tol) {
            LineStep::Evaluate(alpha) | LineStep::Converged(alpha) => alpha,
        };
        p.x.copy_from_slice(arrays.x0);
        axpy(n, self.alpha, arrays.s, 0, 1, &mut p.x, 0, 1);
        clip(&mut p.x, &p.xl, &p.xu);
        self.stage = Stage::LineSearch;
        Flow::Yield(Request::NeedObjective)
    }

    /// Merit function at the trial point just evaluated.
    fn line_value(&mut self, p: &mut ProblemState) -> Flow {
        let meq = self.layout.meq();
        let arrays = self.layout.split(&mut *self.w);
        self.t = p.f + penalty(arrays.mu, &p.c, meq);
        self.h1 = self.t - self.t0;
        if self.exact {
            return Flow::Goto(Label::ExactStep);
        }
        if self.h1 <= self.h3 / 10.0 || self.line > MAX_LINE_STEPS {
            return Flow::Goto(Label::CheckStep);
        }
        self.alpha = (self.h3 / (2.0 * (self.h3 - self.h1))).max(ALFMIN);
        Flow::Goto(Label::InexactStep)
    }

    /// Convergence test after a line search; `otherwise` is the mode used
    /// when the test fails.
    fn check_step(&mut self, p: &ProblemState, tolerance: f64, otherwise: SlsqpMode) -> Flow {
        let n = self.layout.n();
        let arrays = self.layout.split(&mut *self.w);
        let small_step = (p.f - self.f0).abs() < tolerance || nrm2(n, arrays.s, 0, 1) < tolerance;
        if small_step && p.violation() < tolerance && !self.badlin && !p.f.is_nan() {
            return Flow::Yield(self.finish(SlsqpMode::Success));
        }
        if otherwise == SlsqpMode::EvaluateGradient {
            self.stage = Stage::Gradient;
            return Flow::Yield(Request::NeedGradient);
        }
        Flow::Yield(self.finish(otherwise))
    }

    /// Damped BFGS update of the factors.
    fn update_hessian(&mut self, p: &ProblemState) -> Flow {
        let (n, m) = (self.layout.n(), self.layout.m());
        let arrays = self.layout.split(&mut *self.w);
        let (l, s, u, v) = (arrays.l, arrays.s, arrays.u, arrays.v);

        for i in 0..n {
            u[i] = p.g[i] - dot(m, &p.a, i * m, 1, arrays.r, 0, 1) - v[i];
        }

        // v = L D Lᵀ s
        let mut k = 0;
        for i in 0..n {
            let tail: f64 = (i + 1..n).map(|j| l[k + j - i] * s[j]).sum();
            v[i] = s[i] + tail;
            k += n - i;
        }
        let mut k = 0;
        for i in 0..n {
            v[i] *= l[k];
            k += n - i;
        }
        for i in (0..n).rev() {
            let mut sum = 0.0;
            let mut k = i;
            for j in 0..i {
                sum += l[k] * v[j];
                k += n - j - 1;
            }
            v[i] += sum;
        }

        self.h1 = dot(n, s, 0, 1, u, 0, 1);
        self.h2 = dot(n, s, 0, 1, v, 0, 1);
        self.h3 = 0.2 * self.h2;
        if self.h1 < self.h3 {
            self.h4 = (self.h2 - self.h3) / (self.h2 - self.h1);
            self.h1 = self.h3;
            scal(n, self.h4, u, 0, 1);
            axpy(n, 1.0 - self.h4, v, 0, 1, u, 0, 1);
        }
        if self.h1 == 0.0 || self.h2 == 0.0 {
            return Flow::Goto(Label::ResetHessian);
        }
        ldl(n, l, u, 1.0 / self.h1, v);
        ldl(n, l, v, -1.0 / self.h2, u);
        Flow::Goto(Label::Iterate)
    }
}

/// L1 penalty `Σ mu_j * violation_j`.
fn penalty(mu: &[f64], c: &[f64], meq: usize) -> f64 {
    mu.iter()
        .zip(c)
        .enumerate()
        .map(|(j, (&mu_j, &cj))| mu_j * (-cj).max(if j < meq { cj } else { 0.0 }))
        .sum()
}
