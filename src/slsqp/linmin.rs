//! Derivative-free line minimization (Brent's local minimizer) driven by
//! reverse communication.

/// Golden section ratio `(3 - sqrt(5)) / 2`.
const GOLDEN: f64 = 0.381966011;
/// Square root of the machine precision.
const EPS: f64 = 1.5e-8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Stage {
    #[default]
    Start,
    /// Waiting for the value at the first golden-section point.
    First,
    /// Waiting for the value at a trial point.
    Trial,
    Converged,
}

/// What the caller must do next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineStep {
    /// Evaluate the function at this abscissa and call [`LineMinimizer::step`] again.
    Evaluate(f64),
    /// The interval of uncertainty is below tolerance; the minimizer is here.
    Converged(f64),
}

/// Combination of golden section search and successive parabolic
/// interpolation on `[ax, bx]`.
///
/// The first call starts a new search and ignores `f`; every later call
/// passes the function value at the abscissa returned before. After
/// convergence the next call starts over.
#[derive(Debug, Clone, Default)]
pub struct LineMinimizer {
    stage: Stage,
    a: f64,
    b: f64,
    d: f64,
    e: f64,
    u: f64,
    v: f64,
    w: f64,
    x: f64,
    fv: f64,
    fw: f64,
    fx: f64,
}

impl LineMinimizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_converged(&self) -> bool {
        self.stage == Stage::Converged
    }

    pub fn reset(&mut self) {
        self.stage = Stage::Start;
    }

    pub fn step(&mut self, ax: f64, bx: f64, f: f64, tol: f64) -> LineStep {
        match self.stage {
            Stage::Start | Stage::Converged => {
                self.a = ax;
                self.b = bx;
                self.d = 0.0;
                self.e = 0.0;
                self.v = self.a + GOLDEN * (self.b - self.a);
                self.w = self.v;
                self.x = self.v;
                self.stage = Stage::First;
                return LineStep::Evaluate(self.x);
            }
            Stage::First => {
                self.fx = f;
                self.fv = f;
                self.fw = f;
            }
            Stage::Trial => self.record_trial(f),
        }
        self.next_point(tol)
    }

    fn record_trial(&mut self, fu: f64) {
        let u = self.u;
        if fu <= self.fx {
            if u >= self.x {
                self.a = self.x;
            } else {
                self.b = self.x;
            }
            self.v = self.w;
            self.fv = self.fw;
            self.w = self.x;
            self.fw = self.fx;
            self.x = u;
            self.fx = fu;
            return;
        }
        if u < self.x {
            self.a = u;
        } else {
            self.b = u;
        }
        if fu <= self.fw || self.w == self.x {
            self.v = self.w;
            self.fv = self.fw;
            self.w = u;
            self.fw = fu;
        } else if fu <= self.fv || self.v == self.x || self.v == self.w {
            self.v = u;
            self.fv = fu;
        }
    }

    fn next_point(&mut self, tol: f64) -> LineStep {
        let x = self.x;
        let m = 0.5 * (self.a + self.b);
        let tol1 = EPS * x.abs() + tol;
        let tol2 = tol1 + tol1;

        if (x - m).abs() <= tol2 - 0.5 * (self.b - self.a) {
            self.stage = Stage::Converged;
            return LineStep::Converged(x);
        }

        let (mut p, mut q, mut r) = (0.0, 0.0, 0.0);
        if self.e.abs() > tol1 {
            r = (x - self.w) * (self.fx - self.fv);
            q = (x - self.v) * (self.fx - self.fw);
            p = (x - self.v) * q - (x - self.w) * r;
            q -= r;
            q += q;
            if q > 0.0 {
                p = -p;
            }
            q = q.abs();
            r = self.e;
            self.e = self.d;
        }

        if p.abs() >= 0.5 * (q * r).abs() || p <= q * (self.a - x) || p >= q * (self.b - x) {
            self.e = if x >= m { self.a - x } else { self.b - x };
            self.d = GOLDEN * self.e;
        } else {
            self.d = p / q;
            // Keep the tentative point away from the interval ends.
            let u = x + self.d;
            if u - self.a < tol2 || self.b - u < tol2 {
                self.d = tol1.copysign(m - x);
            }
        }

        if self.d.abs() < tol1 {
            self.d = tol1.copysign(self.d);
        }
        self.u = x + self.d;
        self.stage = Stage::Trial;
        LineStep::Evaluate(self.u)
    }
}
