//! Inequality constrained linear least squares.

use super::blas::{axpy, dot, nrm2};
use super::householder::{apply, apply_within, construct, Reflector};
use super::ldp::ldp;
use super::mode::QpStatus;

const EPMACH: f64 = 2.22e-16;

/// Solve `min ||E x - f||` subject to `G x >= h`.
///
/// `E` (`me x n`, leading dimension `le`) is reduced to upper triangular
/// form and the problem becomes a least distance problem in the
/// transformed variables. All of `e`, `f`, `g` and `h` are overwritten.
/// `w` needs `(n + 1) * (mg + 2) + 2 * mg` elements and receives the
/// multipliers of `G` in its first `mg` entries; `jw` needs `mg` entries.
///
/// Returns the status and the residual norm.
#[allow(clippy::too_many_arguments)]
pub fn lsi(
    e: &mut [f64],
    f: &mut [f64],
    g: &mut [f64],
    h: &mut [f64],
    le: usize,
    me: usize,
    lg: usize,
    mg: usize,
    n: usize,
    x: &mut [f64],
    w: &mut [f64],
    jw: &mut [usize],
) -> (QpStatus, f64) {
    for i in 0..n {
        let r = Reflector::new(i, i + 1, me);
        let next = (i + 1).min(n - 1);
        let mut up = 0.0;
        construct(r, e, i * le, 1, &mut up);
        apply_within(r, e, i * le, 1, up, next * le, 1, le, n - i - 1);
        apply(r, e, i * le, 1, up, f, 0, 1, 1, 1);
    }

    for i in 0..mg {
        for j in 0..n {
            let diag = e[j + j * le];
            if diag.abs() < EPMACH {
                return (QpStatus::SingularE, 0.0);
            }
            let s = dot(j, g, i, lg, e, j * le, 1);
            g[i + j * lg] = (g[i + j * lg] - s) / diag;
        }
        h[i] -= dot(n, g, i, lg, f, 0, 1);
    }

    let (status, xnorm) = ldp(g, lg, mg, n, h, x, w, jw);
    if !status.is_success() {
        return (status, xnorm);
    }

    axpy(n, 1.0, f, 0, 1, x, 0, 1);
    for i in (0..n).rev() {
        let s = dot(n - i - 1, e, i + (i + 1) * le, le, x, i + 1, 1);
        x[i] = (x[i] - s) / e[i + i * le];
    }
    let t = if me > n { nrm2(me - n, f, n, 1) } else { 0.0 };
    (QpStatus::Success, xnorm.hypot(t))
}
