//! Rank-revealing least squares via column-pivoted Householder QR.

use super::blas::{dot, nrm2};
use super::householder::{apply, apply_within, construct, Reflector};

/// Relative growth below which the downdated column norms are recomputed.
const FACTOR: f64 = 1e-3;

/// Solve `A X ≈ B` for a possibly rank-deficient `A`.
///
/// `a` is `m x n` column-major with leading dimension `mda`; `b` holds `nb`
/// right-hand sides with leading dimension `mdb >= max(m, n)` and is
/// overwritten by the `n x nb` minimum-length solution. The pseudo-rank is
/// the number of leading diagonal elements of R larger than `tau` in
/// magnitude. `rnorm[jb]` receives the residual norm of column `jb`.
///
/// `h` and `g` are scratch of length `n`; `ip` records the column
/// interchanges. Returns the pseudo-rank.
#[allow(clippy::too_many_arguments)]
pub fn hfti(
    a: &mut [f64],
    mda: usize,
    m: usize,
    n: usize,
    b: &mut [f64],
    mdb: usize,
    nb: usize,
    tau: f64,
    rnorm: &mut [f64],
    h: &mut [f64],
    g: &mut [f64],
    ip: &mut [usize],
) -> usize {
    let ldiag = m.min(n);
    if ldiag == 0 {
        return 0;
    }

    let mut hmax = 0.0;
    for j in 0..ldiag {
        let mut lmax = j;
        let mut recompute = j == 0;
        if j > 0 {
            for l in j..n {
                h[l] -= a[(j - 1) + l * mda].powi(2);
                if h[l] > h[lmax] {
                    lmax = l;
                }
            }
            recompute = (hmax + FACTOR * h[lmax]) - hmax <= 0.0;
        }
        if recompute {
            lmax = j;
            for l in j..n {
                h[l] = (j..m).map(|i| a[i + l * mda].powi(2)).sum();
                if h[l] > h[lmax] {
                    lmax = l;
                }
            }
            hmax = h[lmax];
        }

        ip[j] = lmax;
        if lmax != j {
            for i in 0..m {
                a.swap(i + j * mda, i + lmax * mda);
            }
            h[lmax] = h[j];
        }

        let r = Reflector::new(j, j + 1, m);
        let next = (j + 1).min(n - 1);
        construct(r, a, j * mda, 1, &mut h[j]);
        apply_within(r, a, j * mda, 1, h[j], next * mda, 1, mda, n - j - 1);
        apply(r, a, j * mda, 1, h[j], b, 0, 1, mdb, nb);
    }

    let k = (0..ldiag)
        .find(|&j| a[j + j * mda].abs() <= tau)
        .unwrap_or(ldiag);

    for jb in 0..nb {
        rnorm[jb] = nrm2(m - k, b, k + jb * mdb, 1);
    }
    if k == 0 {
        for jb in 0..nb {
            b[jb * mdb..jb * mdb + n].fill(0.0);
        }
        return 0;
    }

    if k < n {
        // Reduce the leading k rows to lower triangular form.
        for i in (0..k).rev() {
            let r = Reflector::new(i, k, n);
            construct(r, a, i, mda, &mut g[i]);
            apply_within(r, a, i, mda, g[i], 0, mda, 1, i);
        }
    }

    for jb in 0..nb {
        let bo = jb * mdb;
        for i in (0..k).rev() {
            let s = dot(k - i - 1, a, i + (i + 1) * mda, mda, b, bo + i + 1, 1);
            b[bo + i] = (b[bo + i] - s) / a[i + i * mda];
        }
        if k < n {
            b[bo + k..bo + n].fill(0.0);
            for i in 0..k {
                apply(Reflector::new(i, k, n), a, i, mda, g[i], b, bo, 1, mdb, 1);
            }
        }
        for j in (0..ldiag).rev() {
            if ip[j] != j {
                b.swap(bo + ip[j], bo + j);
            }
        }
    }
    k
}
