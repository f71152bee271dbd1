//! Least distance programming through its NNLS dual.

use super::blas::{dot, nrm2};
use super::mode::QpStatus;
use super::nnls::nnls;

/// Workspace length needed by [`ldp`] for `m` constraints in `n` unknowns.
pub fn workspace_len(m: usize, n: usize) -> usize {
    (m + 2) * (n + 1) + 2 * m
}

/// Solve `min ||x||` subject to `G x >= h`.
///
/// `g` is `m x n` with leading dimension `mg`; neither `g` nor `h` is
/// modified. On success the first `m` elements of `w` hold the Lagrange
/// multipliers. `index` needs room for `m` entries.
///
/// Returns the status and `||x||`.
#[allow(clippy::too_many_arguments)]
pub fn ldp(
    g: &[f64],
    mg: usize,
    m: usize,
    n: usize,
    h: &[f64],
    x: &mut [f64],
    w: &mut [f64],
    index: &mut [usize],
) -> (QpStatus, f64) {
    if n == 0 {
        return (QpStatus::BadDimensions, 0.0);
    }
    x[..n].fill(0.0);
    if m == 0 {
        return (QpStatus::Success, 0.0);
    }

    // Dual problem: columns [G_j, h_j] against the target e_{n+1}.
    let n1 = n + 1;
    for j in 0..m {
        for i in 0..n {
            w[j * n1 + i] = g[j + i * mg];
        }
        w[j * n1 + n] = h[j];
    }
    let y_at = (m + 2) * n1;
    let (status, rnorm) = {
        let (e, rest) = w.split_at_mut(m * n1);
        let (f, rest) = rest.split_at_mut(n1);
        let (z, rest) = rest.split_at_mut(n1);
        let (y, rest) = rest.split_at_mut(m);
        f[..n].fill(0.0);
        f[n] = 1.0;
        nnls(e, n1, n1, m, f, y, &mut rest[..m], z, index)
    };
    if !status.is_success() {
        return (status, 0.0);
    }
    if rnorm <= 0.0 {
        return (QpStatus::Incompatible, 0.0);
    }

    let fac = 1.0 - dot(m, h, 0, 1, w, y_at, 1);
    if (1.0 + fac) - 1.0 <= 0.0 {
        return (QpStatus::Incompatible, 0.0);
    }
    let fac = 1.0 / fac;
    for j in 0..n {
        x[j] = fac * dot(m, g, j * mg, 1, w, y_at, 1);
    }
    let xnorm = nrm2(n, x, 0, 1);

    for j in 0..m {
        w[j] = fac * w[y_at + j];
    }
    (QpStatus::Success, xnorm)
}
