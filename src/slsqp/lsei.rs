//! Equality and inequality constrained linear least squares.
//!
//! The equality constraints are eliminated with an orthogonal basis of the
//! null space of `C`; what remains is handed to [`lsi`] when inequality
//! constraints exist and to [`hfti`] otherwise.

use super::blas::{copy, dot, fill, nrm2};
use super::hfti::hfti;
use super::householder::{apply, apply_within, construct, Reflector};
use super::lsi::lsi;
use super::mode::QpStatus;

const EPMACH: f64 = 2.22e-16;

/// Workspace length needed by [`lsei`].
pub fn workspace_len(mc: usize, me: usize, mg: usize, n: usize) -> usize {
    let l = n.saturating_sub(mc);
    let hfti_overhang = if mg == 0 { l.saturating_sub(me) } else { 0 };
    2 * mc + me + (me + mg) * l + (l + 1) * (mg + 2) + 2 * mg + hfti_overhang
}

/// The matrices of an LSEI problem, all column-major.
///
/// `C x = d` holds `mc` equality rows (leading dimension `lc`), `E x ≈ f`
/// the `me` least-squares rows (leading dimension `le`) and `G x >= h`
/// the `mg` inequality rows (leading dimension `lg`). Every array is
/// overwritten by [`lsei`].
pub struct LseiProblem<'a> {
    pub c: &'a mut [f64],
    pub d: &'a mut [f64],
    pub lc: usize,
    pub mc: usize,
    pub e: &'a mut [f64],
    pub f: &'a mut [f64],
    pub le: usize,
    pub me: usize,
    pub g: &'a mut [f64],
    pub h: &'a mut [f64],
    pub lg: usize,
    pub mg: usize,
    pub n: usize,
}

/// Solve `min ||E x - f||` subject to `C x = d` and `G x >= h`.
///
/// On success the first `mc + mg` elements of `w` hold the Lagrange
/// multipliers of the equality and inequality rows and `f` the residual
/// `E x - f`. `jw` needs `max(mg, n - mc)` entries.
///
/// Returns the status and the residual norm.
pub fn lsei(
    p: LseiProblem<'_>,
    x: &mut [f64],
    w: &mut [f64],
    jw: &mut [usize],
) -> (QpStatus, f64) {
    let LseiProblem {
        c,
        d,
        lc,
        mc,
        e,
        f,
        le,
        me,
        g,
        h,
        lg,
        mg,
        n,
    } = p;
    if mc > n {
        return (QpStatus::BadDimensions, 0.0);
    }
    let l = n - mc;
    // Householder pivots of C, then the reduced E, f and G.
    let iw = (l + 1) * (mg + 2) + 2 * mg + mc;
    let ie = iw + mc;
    let i_f = ie + me * l;
    let ig = i_f + me;

    // Triangularize C from the right and carry the factors into E and G.
    for i in 0..mc {
        let r = Reflector::new(i, i + 1, n);
        let next = (i + 1).min(lc - 1);
        let mut up = w[iw + i];
        construct(r, c, i, lc, &mut up);
        w[iw + i] = up;
        apply_within(r, c, i, lc, up, next, lc, 1, mc - i - 1);
        apply(r, c, i, lc, up, e, 0, le, 1, me);
        apply(r, c, i, lc, up, g, 0, lg, 1, mg);
    }

    for i in 0..mc {
        let diag = c[i + i * lc];
        if diag.abs() < EPMACH {
            return (QpStatus::SingularC, 0.0);
        }
        x[i] = (d[i] - dot(i, c, i, lc, x, 0, 1)) / diag;
    }
    fill(mg, 0.0, w, mc, 1);

    if mc < n {
        for i in 0..me {
            w[i_f + i] = f[i] - dot(mc, e, i, le, x, 0, 1);
        }
        for i in 0..me {
            copy(l, e, i + mc * le, le, w, ie + i, me);
        }
        for i in 0..mg {
            copy(l, g, i + mc * lg, lg, w, ig + i, mg);
        }

        if mg == 0 {
            let (head, tail) = w.split_at_mut(ie);
            let (ew, tail) = tail.split_at_mut(me * l);
            // HFTI returns l solution entries in place of the me right-hand sides.
            let fw = &mut tail[..me.max(l)];
            let (hw, gw) = head.split_at_mut(l);
            let mut rnorm = [0.0];
            let krank = hfti(
                ew,
                me,
                me,
                l,
                fw,
                le.max(n),
                1,
                EPMACH.sqrt(),
                &mut rnorm,
                hw,
                &mut gw[..l],
                jw,
            );
            copy(l, fw, 0, 1, x, mc, 1);
            if krank != l {
                return (QpStatus::RankDefect, rnorm[0]);
            }
        } else {
            for i in 0..mg {
                h[i] -= dot(mc, g, i, lg, x, 0, 1);
            }
            let (head, tail) = w.split_at_mut(ie);
            let (ew, tail) = tail.split_at_mut(me * l);
            let (fw, tail) = tail.split_at_mut(me);
            let gw = &mut tail[..mg * l];
            let (status, rnorm) = lsi(
                ew,
                fw,
                gw,
                h,
                me,
                me,
                mg,
                mg,
                l,
                &mut x[mc..],
                &mut head[mc..],
                jw,
            );
            if mc == 0 {
                return (status, rnorm);
            }
            if !status.is_success() {
                return (status, rnorm);
            }
        }
    }

    // Residual E x - f, then multipliers for the eliminated equality rows.
    for i in 0..me {
        f[i] = dot(n, e, i, le, x, 0, 1) - f[i];
    }
    let xnrm = nrm2(me, f, 0, 1);
    for i in 0..mc {
        d[i] = dot(me, e, i * le, 1, f, 0, 1) - dot(mg, g, i * lg, 1, w, mc, 1);
    }
    for i in (0..mc).rev() {
        apply(Reflector::new(i, i + 1, n), c, i, lc, w[iw + i], x, 0, 1, 1, 1);
    }
    for i in (0..mc).rev() {
        let s = dot(mc - i - 1, c, (i + 1) + i * lc, 1, w, i + 1, 1);
        w[i] = (d[i] - s) / c[i + i * lc];
    }
    (QpStatus::Success, xnrm)
}
