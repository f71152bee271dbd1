//! Sizing and partitioning of the caller-owned SLSQP workspace.

use super::mode::SlsqpMode;

/// Problem dimensions that determine the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkspaceLayout {
    n: usize,
    m: usize,
    meq: usize,
}

/// The driver's named arrays carved out of one real workspace.
pub(crate) struct DriverArrays<'a> {
    /// L1 penalty weights, one per constraint.
    pub mu: &'a mut [f64],
    /// Packed `L D Lᵀ` factors plus one augmentation weight.
    pub l: &'a mut [f64],
    /// Iterate at the start of the line search.
    pub x0: &'a mut [f64],
    /// Multipliers from the QP subproblem.
    pub r: &'a mut [f64],
    /// Search direction.
    pub s: &'a mut [f64],
    pub u: &'a mut [f64],
    pub v: &'a mut [f64],
    /// Scratch for the QP subproblem.
    pub rest: &'a mut [f64],
}

impl WorkspaceLayout {
    /// Layout for `n` variables, `m` constraints of which the first `meq`
    /// are equalities.
    pub fn new(n: usize, m: usize, meq: usize) -> Self {
        Self { n, m, meq }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn m(&self) -> usize {
        self.m
    }

    pub fn meq(&self) -> usize {
        self.meq
    }

    fn mineq(&self) -> usize {
        self.m.saturating_sub(self.meq) + 2 * (self.n + 1)
    }

    /// Packed length of the factor, without the augmentation weight.
    pub(crate) fn packed_len(&self) -> usize {
        (self.n + 1) * self.n / 2
    }

    /// Number of reals the driver needs.
    pub fn real_len(&self) -> usize {
        let (n, m, meq) = (self.n, self.m, self.meq);
        let n1 = n + 1;
        let mineq = self.mineq();
        let free = n1.saturating_sub(meq);
        (3 * n1 + m) * (n1 + 1)
            + (free + 1) * (mineq + 2)
            + 2 * mineq
            + (n1 + mineq) * free
            + 2 * meq
            + n1
            + self.packed_len()
            + 2 * m
            + 3 * n
            + 3 * n1
            + 1
    }

    /// Number of integers the driver needs.
    pub fn int_len(&self) -> usize {
        self.mineq()
    }

    /// Check caller supplied lengths, reporting both requirements on failure.
    pub fn check(&self, len_w: usize, len_jw: usize) -> Result<(), SlsqpMode> {
        let (need_w, need_jw) = (self.real_len(), self.int_len());
        if len_w < need_w || len_jw < need_jw {
            return Err(SlsqpMode::WorkspaceTooSmall { need_w, need_jw });
        }
        Ok(())
    }

    /// Lengths of `mu`, `l`, `x0`, `r`, `s`, `u` and `v`, in storage order.
    fn array_lengths(&self) -> [usize; 7] {
        let (n, m) = (self.n, self.m);
        let n1 = n + 1;
        [m, self.packed_len() + 1, n, 2 * n + m, n1, n1, n1]
    }

    /// Position of the search direction `s` inside the real workspace.
    pub(crate) fn search_direction(&self) -> std::ops::Range<usize> {
        let lengths = self.array_lengths();
        let start = lengths[..4].iter().sum::<usize>();
        start..start + lengths[4]
    }

    pub(crate) fn split<'a>(&self, w: &'a mut [f64]) -> DriverArrays<'a> {
        let [mu_len, l_len, x0_len, r_len, s_len, u_len, v_len] = self.array_lengths();
        let (mu, w) = w.split_at_mut(mu_len);
        let (l, w) = w.split_at_mut(l_len);
        let (x0, w) = w.split_at_mut(x0_len);
        let (r, w) = w.split_at_mut(r_len);
        let (s, w) = w.split_at_mut(s_len);
        let (u, w) = w.split_at_mut(u_len);
        let (v, rest) = w.split_at_mut(v_len);
        DriverArrays {
            mu,
            l,
            x0,
            r,
            s,
            u,
            v,
            rest,
        }
    }
}
