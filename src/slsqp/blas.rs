//! Strided level-1 vector operations.
//!
//! Every vector is addressed as `(slice, offset, increment)`, so callers can
//! walk rows and columns of column-major matrices without reslicing. A
//! length of zero never touches the slice.

/// Below this magnitude squares may underflow.
const CUTLO: f64 = 8.232e-11;
/// Above `CUTHI / n` the running sum may overflow.
const CUTHI: f64 = 1.304e19;

pub fn dot(n: usize, x: &[f64], xo: usize, incx: usize, y: &[f64], yo: usize, incy: usize) -> f64 {
    let mut sum = 0.0;
    for i in 0..n {
        sum += x[xo + i * incx] * y[yo + i * incy];
    }
    sum
}

/// `y += alpha * x`
pub fn axpy(
    n: usize,
    alpha: f64,
    x: &[f64],
    xo: usize,
    incx: usize,
    y: &mut [f64],
    yo: usize,
    incy: usize,
) {
    if alpha == 0.0 {
        return;
    }
    for i in 0..n {
        y[yo + i * incy] += alpha * x[xo + i * incx];
    }
}

/// `y += alpha * x` where both vectors live in the same buffer.
pub fn axpy_within(
    n: usize,
    alpha: f64,
    buf: &mut [f64],
    xo: usize,
    incx: usize,
    yo: usize,
    incy: usize,
) {
    if alpha == 0.0 {
        return;
    }
    for i in 0..n {
        let xi = buf[xo + i * incx];
        buf[yo + i * incy] += alpha * xi;
    }
}

pub fn scal(n: usize, alpha: f64, x: &mut [f64], xo: usize, incx: usize) {
    for i in 0..n {
        x[xo + i * incx] *= alpha;
    }
}

pub fn copy(n: usize, x: &[f64], xo: usize, incx: usize, y: &mut [f64], yo: usize, incy: usize) {
    for i in 0..n {
        y[yo + i * incy] = x[xo + i * incx];
    }
}

/// Set `n` strided elements to `value`.
pub fn fill(n: usize, value: f64, x: &mut [f64], xo: usize, incx: usize) {
    for i in 0..n {
        x[xo + i * incx] = value;
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Phase {
    /// Only zeros seen so far.
    Zeros,
    /// Small values, accumulated relative to `xmax`.
    Small,
    /// Mid-range values, accumulated unscaled.
    Mid,
    /// Large values, accumulated relative to `xmax`.
    Large,
}

/// Euclidean norm without destructive underflow or overflow.
///
/// Walks the vector once, switching between an unscaled sum for mid-range
/// magnitudes and a sum scaled by the largest magnitude seen whenever the
/// squares would leave the representable range.
pub fn nrm2(n: usize, x: &[f64], xo: usize, incx: usize) -> f64 {
    if n == 0 || incx == 0 {
        return 0.0;
    }
    let hitest = CUTHI / n as f64;
    let mut phase = Phase::Zeros;
    let mut sum = 0.0;
    let mut xmax = 0.0_f64;
    let mut i = 0;
    while i < n {
        let xi = x[xo + i * incx];
        let ai = xi.abs();
        match phase {
            Phase::Zeros => {
                if ai > CUTLO {
                    phase = Phase::Mid;
                    continue;
                }
                if xi != 0.0 {
                    phase = Phase::Small;
                    xmax = ai;
                    sum += (xi / xmax) * (xi / xmax);
                }
            }
            Phase::Small => {
                if ai > CUTLO {
                    sum = (sum * xmax) * xmax;
                    phase = Phase::Mid;
                    continue;
                }
                accumulate_scaled(xi, &mut sum, &mut xmax);
            }
            Phase::Mid => {
                if ai >= hitest {
                    sum = (sum / xi) / xi;
                    xmax = ai;
                    sum += (xi / xmax) * (xi / xmax);
                    phase = Phase::Large;
                } else {
                    sum += xi * xi;
                }
            }
            Phase::Large => accumulate_scaled(xi, &mut sum, &mut xmax),
        }
        i += 1;
    }
    if phase == Phase::Mid {
        sum.sqrt()
    } else {
        xmax * sum.sqrt()
    }
}

fn accumulate_scaled(xi: f64, sum: &mut f64, xmax: &mut f64) {
    let ai = xi.abs();
    if ai <= *xmax {
        *sum += (xi / *xmax) * (xi / *xmax);
    } else {
        *sum = 1.0 + *sum * (*xmax / xi) * (*xmax / xi);
        *xmax = ai;
    }
}

/// A Givens plane rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Givens {
    pub c: f64,
    pub s: f64,
    /// Length of the rotated vector, signed like the larger input.
    pub r: f64,
    /// Reconstruction parameter.
    pub z: f64,
}

/// Construct the rotation that maps `(a, b)` onto `(r, 0)`.
pub fn rotg(a: f64, b: f64) -> Givens {
    let roe = if a.abs() > b.abs() { a } else { b };
    let scale = a.abs() + b.abs();
    if scale == 0.0 {
        return Givens {
            c: 1.0,
            s: 0.0,
            r: 0.0,
            z: 0.0,
        };
    }
    let r = scale * ((a / scale).powi(2) + (b / scale).powi(2)).sqrt();
    let r = r.copysign(roe);
    let c = a / r;
    let s = b / r;
    let z = if a.abs() > b.abs() {
        s
    } else if c != 0.0 {
        1.0 / c
    } else {
        1.0
    };
    Givens { c, s, r, z }
}

/// Apply a plane rotation to two strided vectors stored in the same buffer.
pub fn rot_within(n: usize, buf: &mut [f64], xo: usize, yo: usize, inc: usize, c: f64, s: f64) {
    for i in 0..n {
        let xi = buf[xo + i * inc];
        let yi = buf[yo + i * inc];
        buf[xo + i * inc] = c * xi + s * yi;
        buf[yo + i * inc] = c * yi - s * xi;
    }
}
