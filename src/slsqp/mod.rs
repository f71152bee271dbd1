//! Dense sequential least-squares quadratic programming.
//!
//! This module is a self-contained port of Kraft's SLSQP together with the
//! Lawson-Hanson least-squares kernels it is built on:
//!
//! - [`nnls`]: non-negative least squares (active set)
//! - [`hfti`]: rank-revealing least squares via Householder with pivoting
//! - [`ldp`], [`lsi`], [`lsei`]: least distance, inequality constrained and
//!   equality/inequality constrained least squares
//! - [`lsq`]: the QP subproblem of one SLSQP iteration
//! - [`ldl`]: rank-one updates of the quasi-Newton factors
//! - [`linmin`]: Brent line minimization for the exact line search
//!
//! Matrices are dense and column-major with an explicit leading dimension.
//! Kernels report their outcome as a [`QpStatus`]; the driver as an
//! [`SlsqpMode`]. Neither is an error: both are normal results of a
//! numerical method.
//!
//! The driver [`Slsqp`] never calls back into user code. See
//! [`crate::minimizer`] for a closure-based wrapper.

pub mod blas;
pub mod driver;
pub mod hfti;
pub mod householder;
pub mod ldl;
pub mod ldp;
pub mod linmin;
pub mod lsei;
pub mod lsi;
pub mod lsq;
pub mod mode;
pub mod nnls;
pub mod workspace;

pub use driver::{ProblemState, Request, Slsqp};
pub use hfti::hfti;
pub use ldl::ldl;
pub use linmin::{LineMinimizer, LineStep};
pub use lsei::{lsei, LseiProblem};
pub use lsq::{lsq, LsqProblem};
pub use mode::{QpStatus, SlsqpMode};
pub use nnls::nnls;
pub use workspace::WorkspaceLayout;
