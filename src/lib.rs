//! # compfit
//!
//! `compfit` is a curve-fitting core built from two pieces:
//!
//! - A composite-function parameter tree: fit functions are nested into
//!   additive or multiplicative composites that expose one flat parameter
//!   vector, fully qualified names (`f1.f0.Sigma`), ties between parameters
//!   anywhere in the tree and a round-trippable string form.
//! - A dense SLSQP optimizer (Kraft's sequential least-squares QP) with the
//!   Lawson-Hanson kernels it depends on, driven through an explicit
//!   reverse-communication state machine.
//!
//! ## Basic Usage
//!
//! ```
//! use compfit::function::{CompositeFunction, Function};
//! use compfit::models::{Gaussian, Linear};
//!
//! let mut composite = CompositeFunction::new();
//! composite.add_function(Box::new(Linear::new(0.5, 0.0)));
//! composite.add_function(Box::new(Gaussian::new(3.0, 1.0, 0.2)));
//! composite.tie("f1.Sigma", "0.1*f1.Height").unwrap();
//!
//! assert_eq!(composite.n_params(), 5);
//! assert_eq!(composite.n_active(), 4);
//! assert_eq!(composite.parameter_name(2).unwrap(), "f1.Height");
//! ```

// Public modules
pub mod error;

// Parameter system
pub mod parameters;

// Function tree and built-in leaf functions
pub mod function;
pub mod models;

// Optimizer
pub mod minimizer;
pub mod slsqp;

// Fitting glue
pub mod fit;
pub mod uncertainty;

mod utils;

// Re-exports for convenience
pub use error::{CompFitError, Result};
pub use fit::{fit, fit_many, FitConfig, FitData, FitResult};
pub use function::{CompositeFunction, Function};
pub use minimizer::{Minimizer, MinimizerConfig, SlsqpResult};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
