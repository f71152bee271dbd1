//! The quadratic subproblem of one SLSQP iteration.

use super::blas::{copy, dot, fill, scal};
use super::lsei::{lsei, LseiProblem};
use super::mode::QpStatus;

/// Inputs of the subproblem
///
/// ```text
/// min ||E x - f||   with E = D^½ Lᵀ,  f = -D^-½ L⁻¹ g
/// s.t. a_j x + b_j  = 0   (j < meq)
///      a_j x + b_j >= 0   (meq <= j < m)
///      xl <= x <= xu
/// ```
///
/// `l` is the packed factor of the quasi-Newton matrix. When `nl` differs
/// from the packed length of an `n`-variable factor plus one, the last
/// variable is an augmentation variable weighted by `l[nl - 1]`. Bounds
/// that are not finite are left out.
pub struct LsqProblem<'a> {
    pub m: usize,
    pub meq: usize,
    pub n: usize,
    pub nl: usize,
    pub l: &'a [f64],
    pub g: &'a [f64],
    /// Constraint rows, column-major with leading dimension `la`.
    pub a: &'a [f64],
    pub la: usize,
    pub b: &'a [f64],
    pub xl: &'a [f64],
    pub xu: &'a [f64],
}

/// Solve the subproblem into `x`, writing the constraint multipliers to
/// the first `m` entries of `y`.
///
/// The solution is clipped to the bounds even when the solve fails.
pub fn lsq(
    p: &LsqProblem<'_>,
    x: &mut [f64],
    y: &mut [f64],
    w: &mut [f64],
    jw: &mut [usize],
) -> QpStatus {
    let LsqProblem {
        m,
        meq,
        n,
        nl,
        l,
        g,
        a,
        la,
        b,
        xl,
        xu,
    } = *p;
    let n1 = n + 1;
    let mineq = m - meq;
    let m1 = mineq + n + n;
    let augmented = n1 * n / 2 + 1 != nl;
    let n2 = usize::from(augmented);
    let n3 = n - n2;

    let (e, w) = w.split_at_mut(n * n);
    let (f, w) = w.split_at_mut(n);
    let (c, w) = w.split_at_mut(meq * n);
    let (d, w) = w.split_at_mut(meq);
    let (gm, w) = w.split_at_mut(m1 * n);
    let (h, w) = w.split_at_mut(m1);

    // Recover E and f from the factors and the gradient.
    let (mut i2, mut i3, mut i4) = (0, 0, 0);
    for i in 0..n3 {
        let i1 = n - i;
        let diag = l[i2].sqrt();
        fill(i1, 0.0, e, i3, 1);
        copy(i1 - n2, l, i2, 1, e, i3, n);
        scal(i1 - n2, diag, e, i3, n);
        e[i3] = diag;
        f[i] = (g[i] - dot(i, e, i4, 1, f, 0, 1)) / diag;
        i2 += i1 - n2;
        i3 += n1;
        i4 += n;
    }
    if augmented {
        e[i3] = l[nl - 1];
        fill(n3, 0.0, e, i4, 1);
        f[n - 1] = 0.0;
    }
    scal(n, -1.0, f, 0, 1);

    for i in 0..meq {
        copy(n, a, i, la, c, i, meq);
    }
    for i in 0..meq {
        d[i] = -b[i];
    }
    for i in 0..mineq {
        copy(n, a, meq + i, la, gm, i, m1);
        h[i] = -b[meq + i];
    }

    // Append finite bounds as rows of +I and -I.
    let mut row = mineq;
    for i in 0..n {
        if xl[i].is_finite() {
            h[row] = xl[i];
            fill(n, 0.0, gm, row, m1);
            gm[row + m1 * i] = 1.0;
            row += 1;
        }
    }
    for i in 0..n {
        if xu[i].is_finite() {
            h[row] = -xu[i];
            fill(n, 0.0, gm, row, m1);
            gm[row + m1 * i] = -1.0;
            row += 1;
        }
    }

    let problem = LseiProblem {
        c,
        d,
        lc: meq.max(1),
        mc: meq,
        e,
        f,
        le: n,
        me: n,
        g: gm,
        h,
        lg: m1,
        mg: row,
        n,
    };
    let (status, _) = lsei(problem, x, w, jw);

    if status.is_success() {
        copy(m, w, 0, 1, y, 0, 1);
        // Bound multipliers are not used by the driver.
        if n3 > 0 {
            y[m..m + 2 * n3].fill(f64::NAN);
        }
    }
    clip(&mut x[..n], xl, xu);
    status
}

/// Clamp each component into `[lower, upper]`; NaN and infinite bounds
/// never bind.
pub(crate) fn clip(x: &mut [f64], lower: &[f64], upper: &[f64]) {
    for ((xi, &lo), &hi) in x.iter_mut().zip(lower).zip(upper) {
        if *xi < lo {
            *xi = lo;
        } else if *xi > hi {
            *xi = hi;
        }
    }
}
