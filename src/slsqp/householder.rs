//! Householder reflections `Q = I + u uᵀ / b` (Lawson & Hanson, H12).
//!
//! A reflection is described by a pivot position `lpivot` and the range
//! `l1..m` of elements it zeroes. All positions are 0-based; the pivot
//! vector is addressed as `(slice, offset, increment)` and its elements
//! `l1..m` are left holding the reflector after [`construct`], with the
//! pivot element replaced by the signed norm and `up` by `u[lpivot]`.
//!
//! Nothing happens when `lpivot >= l1` or `l1 >= m`.

/// Indices describing one reflection.
#[derive(Debug, Clone, Copy)]
pub struct Reflector {
    pub lpivot: usize,
    pub l1: usize,
    pub m: usize,
}

impl Reflector {
    pub fn new(lpivot: usize, l1: usize, m: usize) -> Self {
        Self { lpivot, l1, m }
    }

    fn is_identity(&self) -> bool {
        self.lpivot >= self.l1 || self.l1 >= self.m
    }
}

/// Build the reflector in place.
///
/// Returns `false` (leaving `up` untouched) when the transformation is the
/// identity, either by its index range or because the vector is zero.
pub fn construct(r: Reflector, u: &mut [f64], uo: usize, iue: usize, up: &mut f64) -> bool {
    if r.is_identity() {
        return false;
    }
    let at = |j: usize| uo + j * iue;
    let mut cl = u[at(r.lpivot)].abs();
    for j in r.l1..r.m {
        cl = cl.max(u[at(j)].abs());
    }
    if cl <= 0.0 {
        return false;
    }
    let clinv = 1.0 / cl;
    let mut sm = (u[at(r.lpivot)] * clinv).powi(2);
    for j in r.l1..r.m {
        sm += (u[at(j)] * clinv).powi(2);
    }
    cl *= sm.sqrt();
    if u[at(r.lpivot)] > 0.0 {
        cl = -cl;
    }
    *up = u[at(r.lpivot)] - cl;
    u[at(r.lpivot)] = cl;
    true
}

/// Apply a constructed reflector to `ncv` vectors of `c`.
///
/// Vector `j` starts at `co + j * icv` and its elements are `ice` apart.
#[allow(clippy::too_many_arguments)]
pub fn apply(
    r: Reflector,
    u: &[f64],
    uo: usize,
    iue: usize,
    up: f64,
    c: &mut [f64],
    co: usize,
    ice: usize,
    icv: usize,
    ncv: usize,
) {
    if r.is_identity() || ncv == 0 {
        return;
    }
    let at = |j: usize| uo + j * iue;
    let pivot = u[at(r.lpivot)];
    if pivot == 0.0 {
        return;
    }
    let b = up * pivot;
    if b >= 0.0 {
        return;
    }
    let b = 1.0 / b;
    for j in 0..ncv {
        let base = co + j * icv;
        let i2 = base + ice * r.lpivot;
        let mut sm = c[i2] * up;
        for i in r.l1..r.m {
            sm += c[base + ice * i] * u[at(i)];
        }
        if sm == 0.0 {
            continue;
        }
        sm *= b;
        c[i2] += sm * up;
        for i in r.l1..r.m {
            c[base + ice * i] += sm * u[at(i)];
        }
    }
}

/// [`apply`] for vectors that share a buffer with the reflector.
///
/// The touched elements of `c` must not overlap the reflector's elements.
#[allow(clippy::too_many_arguments)]
pub fn apply_within(
    r: Reflector,
    buf: &mut [f64],
    uo: usize,
    iue: usize,
    up: f64,
    co: usize,
    ice: usize,
    icv: usize,
    ncv: usize,
) {
    if r.is_identity() || ncv == 0 {
        return;
    }
    let at = |j: usize| uo + j * iue;
    let pivot = buf[at(r.lpivot)];
    if pivot == 0.0 {
        return;
    }
    let b = up * pivot;
    if b >= 0.0 {
        return;
    }
    let b = 1.0 / b;
    for j in 0..ncv {
        let base = co + j * icv;
        let i2 = base + ice * r.lpivot;
        let mut sm = buf[i2] * up;
        for i in r.l1..r.m {
            sm += buf[base + ice * i] * buf[at(i)];
        }
        if sm == 0.0 {
            continue;
        }
        sm *= b;
        buf[i2] += sm * up;
        for i in r.l1..r.m {
            let ui = buf[at(i)];
            buf[base + ice * i] += sm * ui;
        }
    }
}
