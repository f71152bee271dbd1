//! Identity of functions in a tree and locators for their parameters.

use std::sync::atomic::{AtomicU64, Ordering};

use super::Function;

static NEXT_FUNCTION_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a function object.
///
/// Every leaf and composite receives a fresh id at construction. Ties hold ids
/// instead of pointers, so a reference to a destroyed function simply stops
/// resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(u64);

impl FunctionId {
    /// Allocate a new id.
    pub fn next() -> Self {
        FunctionId(NEXT_FUNCTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Fresh value for a tree-generation counter.
///
/// Values are globally increasing, so the maximum over a subtree changes
/// whenever any node in it is mutated.
pub(crate) fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// Where a function sits inside an ancestor's parameter vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// Index of the function's first parameter in the ancestor.
    pub offset: usize,
    /// Number of parameters the function owns.
    pub n_params: usize,
}

/// A parameter identified by its owning function and local index.
///
/// The reference does not own the function; it is only meaningful relative to
/// a tree that still contains that function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParameterReference {
    pub function: FunctionId,
    pub index: usize,
}

impl ParameterReference {
    pub fn new(function: FunctionId, index: usize) -> Self {
        Self { function, index }
    }

    /// Absolute index of the referenced parameter inside `root`.
    ///
    /// Returns `None` when `root` does not (transitively) contain the function
    /// or the local index is no longer valid.
    pub fn resolve<F: Function + ?Sized>(&self, root: &F) -> Option<usize> {
        let location = root.locate(self.function)?;
        if self.index < location.n_params {
            Some(location.offset + self.index)
        } else {
            None
        }
    }
}
