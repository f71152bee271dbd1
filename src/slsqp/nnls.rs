//! Non-negative least squares (Lawson & Hanson, chapter 23).

use super::blas::{axpy, dot, nrm2, rot_within, rotg};
use super::householder::{apply, apply_within, construct, Reflector};
use super::mode::QpStatus;

/// A candidate column is treated as dependent on the positive set when
/// its new diagonal is below this fraction of the existing column norm.
const FACTOR: f64 = 1e-2;

/// Solve `min ||A x - b||` subject to `x >= 0`.
///
/// `a` is `m x n` column-major with leading dimension `mda`. On return `a`
/// and `b` hold `Q A` and `Q b`, `x` the solution and `w` the dual vector
/// (zero on the positive set, non-positive elsewhere). `z` is scratch of
/// length `m`; `index` ends with the positive set first.
///
/// Returns the status and the residual norm.
#[allow(clippy::too_many_arguments)]
pub fn nnls(
    a: &mut [f64],
    mda: usize,
    m: usize,
    n: usize,
    b: &mut [f64],
    x: &mut [f64],
    w: &mut [f64],
    z: &mut [f64],
    index: &mut [usize],
) -> (QpStatus, f64) {
    if m == 0 || n == 0 {
        return (QpStatus::BadDimensions, 0.0);
    }
    let itmax = 3 * n;
    let mut iter = 0;
    let mut status = QpStatus::Success;
    for (i, slot) in index[..n].iter_mut().enumerate() {
        *slot = i;
    }
    x[..n].fill(0.0);

    // index[..nsetp] is the positive set P, index[nsetp..n] the zero set Z.
    let mut nsetp = 0;
    let mut up = 0.0;

    'outer: loop {
        if nsetp >= n || nsetp >= m {
            break;
        }
        for iz in nsetp..n {
            let j = index[iz];
            w[j] = dot(m - nsetp, a, nsetp + j * mda, 1, b, nsetp, 1);
        }

        // Pick the most positive dual whose column is independent of P and
        // whose trial coefficient is positive.
        let (iz, j) = loop {
            let mut wmax = 0.0;
            let mut izmax = None;
            for iz in nsetp..n {
                let j = index[iz];
                if w[j] > wmax {
                    wmax = w[j];
                    izmax = Some(iz);
                }
            }
            let Some(iz) = izmax else {
                break 'outer;
            };
            let j = index[iz];
            let col = j * mda;
            let asave = a[nsetp + col];
            let r = Reflector::new(nsetp, nsetp + 1, m);
            construct(r, a, col, 1, &mut up);
            let unorm = nrm2(nsetp, a, col, 1);
            let t = FACTOR * a[nsetp + col].abs();
            if (unorm + t) - unorm > 0.0 {
                z[..m].copy_from_slice(&b[..m]);
                apply(r, a, col, 1, up, z, 0, 1, 1, 1);
                if z[nsetp] / a[nsetp + col] > 0.0 {
                    break (iz, j);
                }
            }
            a[nsetp + col] = asave;
            w[j] = 0.0;
        };

        // Move column j from Z to P.
        b[..m].copy_from_slice(&z[..m]);
        index[iz] = index[nsetp];
        index[nsetp] = j;
        nsetp += 1;
        let col = j * mda;
        let r = Reflector::new(nsetp - 1, nsetp, m);
        for jz in nsetp..n {
            let jj = index[jz];
            apply_within(r, a, col, 1, up, jj * mda, 1, mda, 1);
        }
        a[col + nsetp..col + m].fill(0.0);
        w[j] = 0.0;

        loop {
            // Solve the triangular system for the coefficients of P.
            let mut jj = 0;
            for ip in (0..nsetp).rev() {
                if ip != nsetp - 1 {
                    axpy(ip + 1, -z[ip + 1], a, jj * mda, 1, z, 0, 1);
                }
                jj = index[ip];
                z[ip] /= a[ip + jj * mda];
            }
            iter += 1;
            if iter > itmax {
                status = QpStatus::IterationLimit;
                break 'outer;
            }

            // Step towards z, stopping where a coefficient reaches zero.
            let mut alpha = 1.0;
            let mut blocking = None;
            for ip in 0..nsetp {
                if z[ip] <= 0.0 {
                    let l = index[ip];
                    let t = -x[l] / (z[ip] - x[l]);
                    if alpha >= t {
                        alpha = t;
                        blocking = Some(ip);
                    }
                }
            }
            for ip in 0..nsetp {
                let l = index[ip];
                x[l] = (1.0 - alpha) * x[l] + alpha * z[ip];
            }
            let Some(mut jj) = blocking else {
                continue 'outer;
            };

            // Move the blocking coefficient (and any made infeasible by
            // rounding) back to Z, restoring triangular form with rotations.
            let mut i = index[jj];
            loop {
                x[i] = 0.0;
                for j in jj + 1..nsetp {
                    let ii = index[j];
                    index[j - 1] = ii;
                    let g = rotg(a[(j - 1) + ii * mda], a[j + ii * mda]);
                    rot_within(n, a, j - 1, j, mda, g.c, g.s);
                    rot_within(1, b, j - 1, j, 1, g.c, g.s);
                    a[(j - 1) + ii * mda] = g.r;
                    a[j + ii * mda] = 0.0;
                }
                nsetp -= 1;
                index[nsetp] = i;
                match (0..nsetp).find(|&p| x[index[p]] <= 0.0) {
                    Some(p) => {
                        jj = p;
                        i = index[p];
                    }
                    None => break,
                }
            }
            z[..m].copy_from_slice(&b[..m]);
        }
    }

    let rnorm = nrm2(m.saturating_sub(nsetp), b, nsetp, 1);
    if nsetp >= m {
        w[..n].fill(0.0);
    }
    (status, rnorm)
}
