use thiserror::Error;

use crate::parameters::expression::ExpressionError;
use crate::slsqp::SlsqpMode;

/// Error types for the compfit library.
///
/// Structural problems with a function tree (bad names, bad indices, ties that
/// no longer resolve) are reported immediately. Numerical outcomes of the
/// optimizer are not errors inside the solver; the minimizer turns a terminal
/// failure mode into [`CompFitError::SolverFailed`] only at the façade.
#[derive(Error, Debug)]
pub enum CompFitError {
    /// A name, tie target or argument that does not exist or is malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Parameter or child index outside the valid range.
    #[error("Index {index} out of range (size {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    /// A tie whose target or referenced parameters were removed from the tree.
    #[error("Tie for '{lhs}' references a parameter that no longer exists")]
    DanglingTie { lhs: String },

    /// Error in a tie expression.
    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    /// Malformed function definition string.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Error indicating a mismatch in array dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// The SLSQP driver stopped with a failure mode.
    ///
    /// `x` holds the iterate at the time of failure so partial progress is kept.
    #[error("Solver failed to converge: {mode} (mode {code})", code = .mode.code())]
    SolverFailed { mode: SlsqpMode, x: Vec<f64> },

    /// The caller supplied workspace is smaller than the driver needs.
    #[error("Workspace too small: need {need_w} reals and {need_jw} integers")]
    Workspace { need_w: usize, need_jw: usize },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for compfit operations.
pub type Result<T> = std::result::Result<T, CompFitError>;

impl CompFitError {
    /// Shorthand for an [`CompFitError::InvalidArgument`] with a formatted message.
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        CompFitError::InvalidArgument(message.into())
    }
}
