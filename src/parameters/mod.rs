//! # Parameter attachments
//!
//! Parameters themselves live inside the functions that own them (see
//! [`crate::function::ParameterSet`]). This module holds the two things that
//! can be attached to a parameter:
//!
//! - [`Bounds`]: a lower/upper bound descriptor.
//! - [`Expression`]: the parsed form of a tie formula such as `2*f0.b + 1`.
//!
//! ## Example
//!
//! ```
//! use compfit::parameters::{Bounds, Expression};
//! use std::collections::HashMap;
//!
//! let expr = Expression::parse("2*f0.b + 1").unwrap();
//! assert_eq!(expr.variables(), vec!["f0.b".to_string()]);
//!
//! let mut values = HashMap::new();
//! values.insert("f0.b".to_string(), 3.0);
//! assert_eq!(expr.evaluate(&values).unwrap(), 7.0);
//!
//! let bounds = Bounds::new(0.0, 1.0).unwrap();
//! assert_eq!(bounds.clamp(2.0), 1.0);
//! ```

pub mod bounds;
pub mod expression;

pub use bounds::{Bounds, BoundsError};
pub use expression::{EvaluationContext, Expression, ExpressionError};
