//! Flat parameter storage for one leaf function.

use crate::error::{CompFitError, Result};
use crate::parameters::Bounds;

use super::reference::{next_generation, FunctionId};
use super::tie::TieList;

/// Names, values, tie flags, bounds and leaf-level ties of one atomic function.
///
/// Names are unique within the set. Local indices are stable until a
/// parameter is removed; removal shifts every later index down by one.
#[derive(Debug, Clone)]
pub struct ParameterSet {
    id: FunctionId,
    generation: u64,
    names: Vec<String>,
    values: Vec<f64>,
    tied: Vec<bool>,
    bounds: Vec<Option<Bounds>>,
    pub(crate) ties: TieList,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterSet {
    /// Create an empty set with a fresh function id.
    pub fn new() -> Self {
        Self {
            id: FunctionId::next(),
            generation: next_generation(),
            names: Vec::new(),
            values: Vec::new(),
            tied: Vec::new(),
            bounds: Vec::new(),
            ties: TieList::default(),
        }
    }

    /// Build a set from `(name, value)` pairs whose names are known to be distinct.
    pub(crate) fn from_distinct(pairs: &[(&str, f64)]) -> Self {
        let mut set = Self::new();
        for (name, value) in pairs {
            set.push(name, *value);
        }
        set
    }

    fn push(&mut self, name: &str, value: f64) -> usize {
        self.names.push(name.to_string());
        self.values.push(value);
        self.tied.push(false);
        self.bounds.push(None);
        self.names.len() - 1
    }

    /// Identity of the function owning this set.
    pub fn id(&self) -> FunctionId {
        self.id
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Add a parameter and return its local index.
    pub fn declare(&mut self, name: &str, value: f64) -> Result<usize> {
        if name.is_empty() || name.contains(['.', ',', ';', '=', '(', ')']) {
            return Err(CompFitError::invalid(format!(
                "'{}' is not a valid parameter name",
                name
            )));
        }
        if self.names.iter().any(|n| n == name) {
            return Err(CompFitError::invalid(format!(
                "parameter '{}' is already declared",
                name
            )));
        }
        self.generation = next_generation();
        Ok(self.push(name, value))
    }

    /// Remove the parameter at `index`, shifting later indices down.
    pub fn remove(&mut self, index: usize) -> Result<()> {
        self.check(index)?;
        self.names.remove(index);
        self.values.remove(index);
        self.tied.remove(index);
        self.bounds.remove(index);
        self.generation = next_generation();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, index: usize) -> Result<&str> {
        self.check(index)?;
        Ok(&self.names[index])
    }

    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| CompFitError::invalid(format!("parameter '{}' not found", name)))
    }

    pub fn value(&self, index: usize) -> Result<f64> {
        self.check(index)?;
        Ok(self.values[index])
    }

    pub fn set_value(&mut self, index: usize, value: f64) -> Result<()> {
        self.check(index)?;
        self.values[index] = value;
        Ok(())
    }

    /// All values in local index order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn is_tied(&self, index: usize) -> Result<bool> {
        self.check(index)?;
        Ok(self.tied[index])
    }

    pub fn set_tied(&mut self, index: usize, tied: bool) -> Result<()> {
        self.check(index)?;
        self.tied[index] = tied;
        Ok(())
    }

    pub fn bounds(&self, index: usize) -> Result<Option<Bounds>> {
        self.check(index)?;
        Ok(self.bounds[index])
    }

    pub fn set_bounds(&mut self, index: usize, bounds: Option<Bounds>) -> Result<()> {
        self.check(index)?;
        self.bounds[index] = bounds;
        Ok(())
    }

    fn check(&self, index: usize) -> Result<()> {
        if index < self.names.len() {
            Ok(())
        } else {
            Err(CompFitError::IndexOutOfBounds {
                index,
                len: self.names.len(),
            })
        }
    }
}
