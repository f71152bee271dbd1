//! Built-in leaf functions for common fitting problems.
//!
//! Each model owns a fixed, named parameter list and provides analytic
//! derivatives. They are registered in the default
//! [`FunctionFactory`](crate::function::FunctionFactory) under their type names.

mod exponential;
mod peak;
mod polynomial;

pub use exponential::Exponential;
pub use peak::Gaussian;
pub use polynomial::{Constant, Linear};
