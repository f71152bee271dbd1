//! Rank-one updates of a packed `L D Lᵀ` factorization (Fletcher & Powell).

const EPMACH: f64 = 2.22e-16;

/// Replace the factors of `A` in `a` by those of `A + sigma z zᵀ`.
///
/// `a` stores the unit lower triangle column by column with `D` in place
/// of the unit diagonal, `n (n + 1) / 2` elements in all. `z` is
/// destroyed. `w` (length `n`) is only used when `sigma < 0`; a negative
/// update that would lose positive definiteness is damped so the result
/// stays positive definite.
pub fn ldl(n: usize, a: &mut [f64], z: &mut [f64], sigma: f64, w: &mut [f64]) {
    if sigma == 0.0 {
        return;
    }
    let mut ij = 0;
    let mut t = 1.0 / sigma;
    if sigma < 0.0 {
        w[..n].copy_from_slice(&z[..n]);
        for i in 0..n {
            let v = w[i];
            t += v * v / a[ij];
            for j in i + 1..n {
                ij += 1;
                w[j] -= v * a[ij];
            }
            ij += 1;
        }
        if t >= 0.0 {
            t = EPMACH / sigma;
        }
        for i in 0..n {
            let j = n - 1 - i;
            ij -= i + 1;
            let u = w[j];
            w[j] = t;
            t -= u * u / a[ij];
        }
    }

    for i in 0..n {
        let v = z[i];
        let delta = v / a[ij];
        let tp = if sigma < 0.0 { w[i] } else { t + delta * v };
        let alpha = tp / t;
        a[ij] *= alpha;
        if i == n - 1 {
            return;
        }
        let beta = delta / tp;
        if alpha > 4.0 {
            let gamma = t / tp;
            for j in i + 1..n {
                ij += 1;
                let u = a[ij];
                a[ij] = gamma * u + beta * z[j];
                z[j] -= v * u;
            }
        } else {
            for j in i + 1..n {
                ij += 1;
                z[j] -= v * a[ij];
                a[ij] += beta * z[j];
            }
        }
        ij += 1;
        t = tp;
    }
}
