//! Numerical helpers shared by the function tree and the minimizer.

pub mod finite_difference;
