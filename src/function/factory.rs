//! Name-keyed construction of functions.

use std::collections::BTreeMap;

use crate::error::{CompFitError, Result};
use crate::models::{Constant, Exponential, Gaussian, Linear};

use super::composite::CompositeFunction;
use super::Function;

/// Builds a function with default parameter values.
pub type Constructor = fn() -> Box<dyn Function>;

/// Registry mapping type names to constructors.
///
/// The default registry knows every built-in model plus `CompositeFunction`
/// and `ProductFunction`; callers can register their own leaf kinds.
///
/// ```
/// use compfit::function::{Function, FunctionFactory};
///
/// let factory = FunctionFactory::default();
/// let g = factory.create("Gaussian").unwrap();
/// assert_eq!(g.n_params(), 3);
/// assert!(factory.create("Voigt").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct FunctionFactory {
    constructors: BTreeMap<String, Constructor>,
}

impl Default for FunctionFactory {
    fn default() -> Self {
        let mut factory = Self::empty();
        factory.register("Constant", || Box::new(Constant::default()));
        factory.register("Linear", || Box::new(Linear::default()));
        factory.register("Gaussian", || Box::new(Gaussian::default()));
        factory.register("Exponential", || Box::new(Exponential::default()));
        factory.register("CompositeFunction", || Box::new(CompositeFunction::new()));
        factory.register("ProductFunction", || Box::new(CompositeFunction::product()));
        factory
    }
}

impl FunctionFactory {
    /// A registry without any entries.
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Register (or replace) a constructor under `name`.
    pub fn register(&mut self, name: &str, constructor: Constructor) {
        self.constructors.insert(name.to_string(), constructor);
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn Function>> {
        self.constructors
            .get(name)
            .map(|constructor| constructor())
            .ok_or_else(|| CompFitError::Parse(format!("unknown function type '{}'", name)))
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }
}

/// Create a built-in function by type name.
pub fn create_function(name: &str) -> Result<Box<dyn Function>> {
    FunctionFactory::default().create(name)
}
