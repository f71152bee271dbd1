//! # Fit functions and composite trees
//!
//! A fit function maps a domain `x` to values `f(x)` and owns a flat vector of
//! named parameters. Leaf functions (see [`crate::models`]) implement
//! [`LeafFunction`]; [`CompositeFunction`] combines children by summation or
//! multiplication and exposes their parameters under qualified names of the
//! form `f<k>.<local>`, recursively.
//!
//! Every function shares the [`Function`] interface: named parameter access,
//! ties, bound constraints, evaluation and derivatives. Parameters can be
//! *tied* to an expression over other parameters, which removes them from the
//! active set the optimizer sees.
//!
//! ```
//! use compfit::function::{CompositeFunction, Function};
//! use compfit::models::Gaussian;
//!
//! let mut peaks = CompositeFunction::new();
//! peaks.add_function(Box::new(Gaussian::new(2.0, -1.0, 0.3)));
//! peaks.add_function(Box::new(Gaussian::new(1.0, 1.0, 0.3)));
//!
//! peaks.tie("f1.Sigma", "f0.Sigma").unwrap();
//! peaks.set_parameter_by_name("f0.Sigma", 0.5).unwrap();
//! peaks.apply_ties().unwrap();
//!
//! assert_eq!(peaks.get_parameter_by_name("f1.Sigma").unwrap(), 0.5);
//! assert_eq!(peaks.n_active(), 5);
//! ```

pub mod composite;
pub mod factory;
pub mod jacobian;
pub mod parameter_set;
pub mod reference;
pub mod serialize;
pub mod tie;

use std::fmt;

use tracing::trace;

use crate::error::{CompFitError, Result};
use crate::parameters::{Bounds, Expression};
use crate::utils::finite_difference;

pub use composite::{Combination, CompositeFunction};
pub use factory::FunctionFactory;
pub use jacobian::PartialJacobian;
pub use parameter_set::ParameterSet;
pub use reference::{FunctionId, Location, ParameterReference};
pub use serialize::parse_string;
pub use tie::{Tie, TieList};

/// Common interface of leaf and composite fit functions.
///
/// Parameter indices are absolute within the function the method is called
/// on: for a composite they span all descendants, for a leaf they are its
/// local indices.
pub trait Function: Send + Sync + fmt::Debug {
    fn id(&self) -> FunctionId;

    /// Type name used by the serialized form, e.g. `Gaussian`.
    fn name(&self) -> &str;

    fn n_params(&self) -> usize;

    /// Name of parameter `index`; qualified (`f0.f1.Height`) inside composites.
    fn parameter_name(&self, index: usize) -> Result<String>;

    /// Index of the parameter called `name`.
    fn parameter_index(&self, name: &str) -> Result<usize>;

    fn get_parameter(&self, index: usize) -> Result<f64>;

    /// Write a parameter value. Does not re-apply ties.
    fn set_parameter(&mut self, index: usize, value: f64) -> Result<()>;

    /// Stable locator of parameter `index` that survives tree restructuring.
    fn parameter_reference(&self, index: usize) -> Result<ParameterReference>;

    fn is_tied(&self, index: usize) -> Result<bool>;

    /// Flag a parameter as tied without attaching an expression.
    ///
    /// [`Function::tie`] and [`Function::remove_tie`] call this; composites
    /// forward it to the owning leaf and refresh their index tables.
    fn mark_tied(&mut self, index: usize, tied: bool) -> Result<()>;

    fn bounds(&self, index: usize) -> Result<Option<Bounds>>;

    fn set_bounds(&mut self, index: usize, bounds: Option<Bounds>) -> Result<()>;

    /// Position of the function `id` within this function's parameter vector.
    fn locate(&self, id: FunctionId) -> Option<Location>;

    /// Counter that changes whenever the structure of this subtree changes.
    fn tree_generation(&self) -> u64;

    /// Ties declared on this node.
    fn ties(&self) -> &TieList;

    fn ties_mut(&mut self) -> &mut TieList;

    /// Evaluate `f(x)` into `out`, which must have the length of `x`.
    fn function(&self, out: &mut [f64], x: &[f64]) -> Result<()>;

    /// Fill `d f(x_i) / d p_j` for every parameter, active or not.
    fn function_deriv(&self, jacobian: &mut PartialJacobian<'_>, x: &[f64]) -> Result<()>;

    /// Jacobian used when estimating parameter uncertainties.
    fn cal_jacobian_for_covariance(
        &self,
        jacobian: &mut PartialJacobian<'_>,
        x: &[f64],
    ) -> Result<()> {
        self.function_deriv(jacobian, x)
    }

    fn as_composite(&self) -> Option<&CompositeFunction> {
        None
    }

    fn as_composite_mut(&mut self) -> Option<&mut CompositeFunction> {
        None
    }

    /// A parameter is active when it is not tied.
    fn is_active(&self, index: usize) -> Result<bool> {
        Ok(!self.is_tied(index)?)
    }

    fn n_active(&self) -> usize {
        (0..self.n_params())
            .filter(|&i| matches!(self.is_active(i), Ok(true)))
            .count()
    }

    /// Position of parameter `index` among the active parameters, if active.
    fn active_index(&self, index: usize) -> Result<Option<usize>> {
        if !self.is_active(index)? {
            return Ok(None);
        }
        let mut active = 0;
        for i in 0..index {
            if self.is_active(i)? {
                active += 1;
            }
        }
        Ok(Some(active))
    }

    /// Absolute index of the `active`-th active parameter.
    fn index_of_active(&self, active: usize) -> Result<usize> {
        let mut seen = 0;
        for i in 0..self.n_params() {
            if self.is_active(i)? {
                if seen == active {
                    return Ok(i);
                }
                seen += 1;
            }
        }
        Err(CompFitError::IndexOutOfBounds {
            index: active,
            len: seen,
        })
    }

    fn name_of_active(&self, active: usize) -> Result<String> {
        self.parameter_name(self.index_of_active(active)?)
    }

    fn get_parameter_by_name(&self, name: &str) -> Result<f64> {
        self.get_parameter(self.parameter_index(name)?)
    }

    fn set_parameter_by_name(&mut self, name: &str, value: f64) -> Result<()> {
        let index = self.parameter_index(name)?;
        self.set_parameter(index, value)
    }

    /// Values of the active parameters in active order.
    fn active_parameters(&self) -> Result<Vec<f64>> {
        (0..self.n_active())
            .map(|k| self.get_parameter(self.index_of_active(k)?))
            .collect()
    }

    /// Overwrite the active parameters, in active order.
    fn set_active_parameters(&mut self, values: &[f64]) -> Result<()> {
        let n_active = self.n_active();
        if values.len() != n_active {
            return Err(CompFitError::DimensionMismatch(format!(
                "expected {} active values, got {}",
                n_active,
                values.len()
            )));
        }
        for (k, &value) in values.iter().enumerate() {
            let index = self.index_of_active(k)?;
            self.set_parameter(index, value)?;
        }
        Ok(())
    }

    /// Tie parameter `name` to `expression`.
    ///
    /// Names in the expression are resolved against this function, so inside a
    /// composite they are qualified (`f0.Height`). An existing tie on the same
    /// parameter is replaced. The tie is stored on this node.
    fn tie(&mut self, name: &str, expression: &str) -> Result<()> {
        let index = self.parameter_index(name)?;
        let target = self.parameter_reference(index)?;
        let parsed = Expression::parse(expression)?;

        let mut references = Vec::new();
        for variable in parsed.variables() {
            let referenced = self.parameter_index(&variable).map_err(|_| {
                CompFitError::invalid(format!(
                    "tie for '{}' references unknown parameter '{}'",
                    name, variable
                ))
            })?;
            references.push((variable, self.parameter_reference(referenced)?));
        }

        self.remove_tie_at(index)?;
        trace!(function = self.name(), %name, %expression, "tie declared");
        self.ties_mut()
            .push(Tie::new(name, target, parsed, references));
        self.mark_tied(index, true)
    }

    /// Tie a parameter to its current value.
    fn fix(&mut self, name: &str) -> Result<()> {
        let value = self.get_parameter_by_name(name)?;
        self.tie(name, &value.to_string())
    }

    /// `true` if `name` is tied to a constant.
    fn is_fixed(&self, name: &str) -> Result<bool> {
        let index = self.parameter_index(name)?;
        Ok(self.tie_of(index)?.map_or(false, Tie::is_constant))
    }

    /// Remove the tie on `name`. Returns whether a tie was found.
    fn remove_tie(&mut self, name: &str) -> Result<bool> {
        let index = self.parameter_index(name)?;
        self.remove_tie_at(index)
    }

    /// The tie targeting parameter `index`, searching this node and its descendants.
    fn tie_of(&self, index: usize) -> Result<Option<&Tie>> {
        let target = self.parameter_reference(index)?;
        Ok(self.ties().find(target))
    }

    fn remove_tie_at(&mut self, index: usize) -> Result<bool> {
        let target = self.parameter_reference(index)?;
        let removed = self.ties_mut().remove_target(target);
        if removed {
            self.mark_tied(index, false)?;
        }
        Ok(removed)
    }

    /// Evaluate all ties of this subtree and write the tied values.
    fn apply_ties(&mut self) -> Result<()> {
        let mut ties = std::mem::take(self.ties_mut());
        let result = ties.apply(self);
        *self.ties_mut() = ties;
        result
    }

    fn add_constraint(&mut self, name: &str, bounds: Bounds) -> Result<()> {
        let index = self.parameter_index(name)?;
        self.set_bounds(index, Some(bounds))
    }

    fn remove_constraint(&mut self, name: &str) -> Result<()> {
        let index = self.parameter_index(name)?;
        self.set_bounds(index, None)
    }

    /// Serialized form, see [`serialize`].
    fn as_string(&self) -> Result<String> {
        serialize::to_string(self)
    }
}

/// An atomic fit function with a fixed parameter list.
///
/// Implementors provide the model formula over an explicit parameter slice;
/// the blanket [`Function`] implementation supplies everything else from the
/// [`ParameterSet`].
pub trait LeafFunction: Send + Sync + fmt::Debug {
    /// Type name, also the key in [`FunctionFactory`].
    const NAME: &'static str;

    fn parameter_set(&self) -> &ParameterSet;

    fn parameter_set_mut(&mut self) -> &mut ParameterSet;

    /// Evaluate the model for the given parameter values.
    fn eval_with(&self, params: &[f64], out: &mut [f64], x: &[f64]);

    /// Analytic derivatives. Defaults to forward differences.
    fn eval_deriv(&self, params: &[f64], jacobian: &mut PartialJacobian<'_>, x: &[f64]) {
        finite_difference::leaf_jacobian(
            |p, out| self.eval_with(p, out, x),
            params,
            x.len(),
            jacobian,
        );
    }
}

fn check_lengths(out: usize, x: usize) -> Result<()> {
    if out == x {
        Ok(())
    } else {
        Err(CompFitError::DimensionMismatch(format!(
            "output has length {} but domain has length {}",
            out, x
        )))
    }
}

impl<T: LeafFunction> Function for T {
    fn id(&self) -> FunctionId {
        self.parameter_set().id()
    }

    fn name(&self) -> &str {
        T::NAME
    }

    fn n_params(&self) -> usize {
        self.parameter_set().len()
    }

    fn parameter_name(&self, index: usize) -> Result<String> {
        self.parameter_set().name(index).map(str::to_string)
    }

    fn parameter_index(&self, name: &str) -> Result<usize> {
        self.parameter_set().index_of(name)
    }

    fn get_parameter(&self, index: usize) -> Result<f64> {
        self.parameter_set().value(index)
    }

    fn set_parameter(&mut self, index: usize, value: f64) -> Result<()> {
        self.parameter_set_mut().set_value(index, value)
    }

    fn parameter_reference(&self, index: usize) -> Result<ParameterReference> {
        self.parameter_set().name(index)?;
        Ok(ParameterReference::new(self.id(), index))
    }

    fn is_tied(&self, index: usize) -> Result<bool> {
        self.parameter_set().is_tied(index)
    }

    fn mark_tied(&mut self, index: usize, tied: bool) -> Result<()> {
        self.parameter_set_mut().set_tied(index, tied)
    }

    fn bounds(&self, index: usize) -> Result<Option<Bounds>> {
        self.parameter_set().bounds(index)
    }

    fn set_bounds(&mut self, index: usize, bounds: Option<Bounds>) -> Result<()> {
        self.parameter_set_mut().set_bounds(index, bounds)
    }

    fn locate(&self, id: FunctionId) -> Option<Location> {
        (id == self.id()).then(|| Location {
            offset: 0,
            n_params: self.n_params(),
        })
    }

    fn tree_generation(&self) -> u64 {
        self.parameter_set().generation()
    }

    fn ties(&self) -> &TieList {
        &self.parameter_set().ties
    }

    fn ties_mut(&mut self) -> &mut TieList {
        &mut self.parameter_set_mut().ties
    }

    fn function(&self, out: &mut [f64], x: &[f64]) -> Result<()> {
        check_lengths(out.len(), x.len())?;
        self.eval_with(self.parameter_set().values(), out, x);
        Ok(())
    }

    fn function_deriv(&self, jacobian: &mut PartialJacobian<'_>, x: &[f64]) -> Result<()> {
        check_lengths(jacobian.n_data(), x.len())?;
        if jacobian.n_params() != self.n_params() {
            return Err(CompFitError::DimensionMismatch(format!(
                "{} has {} parameters but the jacobian view has {} columns",
                T::NAME,
                self.n_params(),
                jacobian.n_params()
            )));
        }
        self.eval_deriv(self.parameter_set().values(), jacobian, x);
        Ok(())
    }
}
