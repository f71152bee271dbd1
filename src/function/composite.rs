//! Composite functions: sums and products of child functions.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{CompFitError, Result};
use crate::parameters::Bounds;

use super::jacobian::PartialJacobian;
use super::reference::{next_generation, FunctionId, Location, ParameterReference};
use super::tie::{Tie, TieList};
use super::Function;

/// How the values of the children are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Combination {
    Sum,
    Product,
}

impl Combination {
    fn identity(self) -> f64 {
        match self {
            Combination::Sum => 0.0,
            Combination::Product => 1.0,
        }
    }

    fn combine(self, acc: &mut [f64], values: &[f64]) {
        for (a, v) in acc.iter_mut().zip(values) {
            match self {
                Combination::Sum => *a += v,
                Combination::Product => *a *= v,
            }
        }
    }
}

/// Offsets and active-index maps, rebuilt after every structural change.
#[derive(Debug, Clone, Default)]
struct IndexTables {
    n_params: usize,
    param_offset: Vec<usize>,
    active_offset: Vec<usize>,
    global_to_active: Vec<Option<usize>>,
    active_to_global: Vec<usize>,
}

/// An ordered collection of child functions seen as one function.
///
/// Parameter `i` of the composite is parameter `i - param_offset(k)` of child
/// `k`, where `k` is the last child whose offset is `<= i`. Parameter names are
/// qualified with the child index: `f<k>.<name in child>`.
///
/// # Examples
///
/// ```
/// use compfit::function::{CompositeFunction, Function};
/// use compfit::models::{Constant, Linear};
///
/// let mut sum = CompositeFunction::new();
/// sum.add_function(Box::new(Linear::new(1.0, 2.0)));
/// sum.add_function(Box::new(Constant::new(0.5)));
///
/// assert_eq!(sum.n_params(), 3);
/// assert_eq!(sum.parameter_name(2).unwrap(), "f1.A0");
///
/// let mut out = [0.0; 2];
/// sum.function(&mut out, &[0.0, 1.0]).unwrap();
/// assert_eq!(out, [1.5, 3.5]);
/// ```
#[derive(Debug)]
pub struct CompositeFunction {
    id: FunctionId,
    combination: Combination,
    children: Vec<Box<dyn Function>>,
    ties: TieList,
    generation: u64,
    index: IndexTables,
}

impl Default for CompositeFunction {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositeFunction {
    /// An empty sum.
    pub fn new() -> Self {
        Self::with_combination(Combination::Sum)
    }

    /// An empty product.
    pub fn product() -> Self {
        Self::with_combination(Combination::Product)
    }

    pub fn with_combination(combination: Combination) -> Self {
        Self {
            id: FunctionId::next(),
            combination,
            children: Vec::new(),
            ties: TieList::default(),
            generation: next_generation(),
            index: IndexTables::default(),
        }
    }

    pub fn combination(&self) -> Combination {
        self.combination
    }

    /// Number of direct children.
    pub fn n_functions(&self) -> usize {
        self.children.len()
    }

    /// Append a child and return its position.
    pub fn add_function(&mut self, function: Box<dyn Function>) -> usize {
        trace!(
            composite = self.name(),
            child = function.name(),
            n_params = function.n_params(),
            "function added"
        );
        self.children.push(function);
        self.structure_changed();
        self.children.len() - 1
    }

    /// Destroy child `i`.
    ///
    /// Ties on this node targeting a parameter of the removed child are
    /// dropped. Ties whose expression refers to the removed child are kept and
    /// fail with [`CompFitError::DanglingTie`] when applied.
    pub fn remove_function(&mut self, i: usize) -> Result<()> {
        self.check_child(i)?;
        let removed = self.children.remove(i);
        let before = self.ties.len();
        self.ties
            .retain(|tie| removed.locate(tie.target().function).is_none());
        trace!(
            composite = self.name(),
            child = removed.name(),
            dropped_ties = before - self.ties.len(),
            "function removed"
        );
        self.structure_changed();
        Ok(())
    }

    /// Replace child `i` with `function`.
    ///
    /// Ties on this node that touch the old child are carried over by
    /// qualified name: a tie targeting `f<i>.X` is retargeted to `f<i>.X` in
    /// the new child, or dropped when the new child has no such parameter.
    /// Expression references follow the same rule but are left dangling
    /// rather than dropped.
    pub fn replace_function(&mut self, i: usize, function: Box<dyn Function>) -> Result<()> {
        self.check_child(i)?;

        let plans: Vec<(Option<String>, Vec<Option<String>>)> = self
            .ties
            .iter()
            .map(|tie| {
                let target = self.name_within_child(i, tie.target());
                let references = tie
                    .references()
                    .map(|(_, r)| self.name_within_child(i, r))
                    .collect();
                (target, references)
            })
            .collect();

        trace!(
            composite = self.name(),
            old = self.children[i].name(),
            new = function.name(),
            "function replaced"
        );
        self.children[i] = function;
        self.structure_changed();

        let mut ties = std::mem::take(&mut self.ties);
        let mut kept = TieList::default();
        let mut newly_tied = Vec::new();
        for (mut tie, (target, references)) in ties.drain().zip(plans) {
            if let Some(name) = target {
                match self.reference_by_name(&name) {
                    Some((index, reference)) => {
                        tie.retarget(reference);
                        newly_tied.push(index);
                    }
                    None => {
                        debug!(lhs = tie.lhs(), "tie dropped: target missing after replacement");
                        continue;
                    }
                }
            }
            for (position, name) in references.iter().enumerate() {
                if let Some((_, reference)) =
                    name.as_deref().and_then(|n| self.reference_by_name(n))
                {
                    tie.rebind(position, reference);
                }
            }
            kept.push(tie);
        }
        self.ties = kept;

        for index in newly_tied {
            self.mark_tied(index, true)?;
        }
        Ok(())
    }

    /// Borrow child `i`.
    pub fn get_function(&self, i: usize) -> Result<&dyn Function> {
        self.check_child(i)?;
        Ok(self.children[i].as_ref())
    }

    /// Mutate child `i` in place, then refresh this node's index tables.
    ///
    /// This is the way to restructure a nested composite:
    ///
    /// ```
    /// use compfit::function::{CompositeFunction, Function};
    /// use compfit::models::Constant;
    ///
    /// let mut root = CompositeFunction::new();
    /// root.add_function(Box::new(CompositeFunction::new()));
    /// root.update_function(0, |child| {
    ///     if let Some(inner) = child.as_composite_mut() {
    ///         inner.add_function(Box::new(Constant::new(1.0)));
    ///     }
    /// })
    /// .unwrap();
    /// assert_eq!(root.parameter_name(0).unwrap(), "f0.f0.A0");
    /// ```
    pub fn update_function<R, F>(&mut self, i: usize, update: F) -> Result<R>
    where
        F: FnOnce(&mut dyn Function) -> R,
    {
        self.check_child(i)?;
        let result = update(self.children[i].as_mut());
        self.structure_changed();
        Ok(result)
    }

    /// Index of the child owning absolute parameter `index`.
    pub fn function_index(&self, index: usize) -> Result<usize> {
        self.check_param(index)?;
        Ok(self.index.param_offset.partition_point(|&o| o <= index) - 1)
    }

    /// Child and local index of absolute parameter `index`.
    pub fn local_index(&self, index: usize) -> Result<(usize, usize)> {
        let child = self.function_index(index)?;
        Ok((child, index - self.index.param_offset[child]))
    }

    /// Absolute index of child `i`'s first parameter.
    pub fn param_offset(&self, i: usize) -> Result<usize> {
        self.check_child(i)?;
        Ok(self.index.param_offset[i])
    }

    /// Active index of child `i`'s first active parameter.
    pub fn active_offset(&self, i: usize) -> Result<usize> {
        self.check_child(i)?;
        Ok(self.index.active_offset[i])
    }

    fn check_child(&self, i: usize) -> Result<()> {
        if i < self.children.len() {
            Ok(())
        } else {
            Err(CompFitError::IndexOutOfBounds {
                index: i,
                len: self.children.len(),
            })
        }
    }

    fn check_param(&self, index: usize) -> Result<()> {
        if index < self.index.n_params {
            Ok(())
        } else {
            Err(CompFitError::IndexOutOfBounds {
                index,
                len: self.index.n_params,
            })
        }
    }

    fn structure_changed(&mut self) {
        self.generation = next_generation();
        self.rebuild_index();
    }

    fn rebuild_index(&mut self) {
        let mut tables = IndexTables::default();
        for child in &self.children {
            tables.param_offset.push(tables.n_params);
            tables.active_offset.push(tables.active_to_global.len());
            for local in 0..child.n_params() {
                let global = tables.n_params + local;
                if matches!(child.is_active(local), Ok(true)) {
                    tables.global_to_active.push(Some(tables.active_to_global.len()));
                    tables.active_to_global.push(global);
                } else {
                    tables.global_to_active.push(None);
                }
            }
            tables.n_params += child.n_params();
        }
        self.index = tables;
    }

    /// Split `f<k>.<rest>` into the child index and the remainder.
    fn split_name(name: &str) -> Option<(usize, &str)> {
        let (head, rest) = name.split_once('.')?;
        let child = head.strip_prefix('f')?.parse().ok()?;
        Some((child, rest))
    }

    /// Qualified name of `reference` if it points into child `i`.
    fn name_within_child(&self, i: usize, reference: ParameterReference) -> Option<String> {
        let location = self.children[i].locate(reference.function)?;
        if reference.index >= location.n_params {
            return None;
        }
        let index = self.index.param_offset[i] + location.offset + reference.index;
        self.parameter_name(index).ok()
    }

    fn reference_by_name(&self, name: &str) -> Option<(usize, ParameterReference)> {
        let index = self.parameter_index(name).ok()?;
        Some((index, self.parameter_reference(index).ok()?))
    }

    /// Derivatives of all children, written into their column blocks.
    fn combine_derivatives(
        &self,
        jacobian: &mut PartialJacobian<'_>,
        x: &[f64],
        for_covariance: bool,
    ) -> Result<()> {
        if jacobian.n_data() != x.len() || jacobian.n_params() != self.n_params() {
            return Err(CompFitError::DimensionMismatch(format!(
                "jacobian view is {}x{}, expected {}x{}",
                jacobian.n_data(),
                jacobian.n_params(),
                x.len(),
                self.n_params()
            )));
        }

        let child_values = match self.combination {
            Combination::Sum => Vec::new(),
            Combination::Product => self
                .children
                .iter()
                .map(|child| {
                    let mut values = vec![0.0; x.len()];
                    child.function(&mut values, x).map(|_| values)
                })
                .collect::<Result<Vec<_>>>()?,
        };

        for (k, child) in self.children.iter().enumerate() {
            let mut part = jacobian.partial(self.index.param_offset[k], child.n_params());
            if for_covariance {
                child.cal_jacobian_for_covariance(&mut part, x)?;
            } else {
                child.function_deriv(&mut part, x)?;
            }

            if self.combination == Combination::Product {
                let mut others = vec![1.0; x.len()];
                for (m, values) in child_values.iter().enumerate() {
                    if m != k {
                        Combination::Product.combine(&mut others, values);
                    }
                }
                part.scale_rows(&others);
            }
        }
        Ok(())
    }
}

impl Function for CompositeFunction {
    fn id(&self) -> FunctionId {
        self.id
    }

    fn name(&self) -> &str {
        match self.combination {
            Combination::Sum => "CompositeFunction",
            Combination::Product => "ProductFunction",
        }
    }

    fn n_params(&self) -> usize {
        self.index.n_params
    }

    fn parameter_name(&self, index: usize) -> Result<String> {
        let (child, local) = self.local_index(index)?;
        Ok(format!(
            "f{}.{}",
            child,
            self.children[child].parameter_name(local)?
        ))
    }

    fn parameter_index(&self, name: &str) -> Result<usize> {
        let not_found = || CompFitError::invalid(format!("parameter '{}' not found", name));
        let (child, rest) = Self::split_name(name).ok_or_else(not_found)?;
        let function = self.children.get(child).ok_or_else(not_found)?;
        let local = function.parameter_index(rest).map_err(|_| not_found())?;
        Ok(self.index.param_offset[child] + local)
    }

    fn get_parameter(&self, index: usize) -> Result<f64> {
        let (child, local) = self.local_index(index)?;
        self.children[child].get_parameter(local)
    }

    fn set_parameter(&mut self, index: usize, value: f64) -> Result<()> {
        let (child, local) = self.local_index(index)?;
        self.children[child].set_parameter(local, value)
    }

    fn parameter_reference(&self, index: usize) -> Result<ParameterReference> {
        let (child, local) = self.local_index(index)?;
        self.children[child].parameter_reference(local)
    }

    fn is_tied(&self, index: usize) -> Result<bool> {
        let (child, local) = self.local_index(index)?;
        self.children[child].is_tied(local)
    }

    fn mark_tied(&mut self, index: usize, tied: bool) -> Result<()> {
        let (child, local) = self.local_index(index)?;
        self.children[child].mark_tied(local, tied)?;
        self.rebuild_index();
        Ok(())
    }

    fn bounds(&self, index: usize) -> Result<Option<Bounds>> {
        let (child, local) = self.local_index(index)?;
        self.children[child].bounds(local)
    }

    fn set_bounds(&mut self, index: usize, bounds: Option<Bounds>) -> Result<()> {
        let (child, local) = self.local_index(index)?;
        self.children[child].set_bounds(local, bounds)
    }

    fn locate(&self, id: FunctionId) -> Option<Location> {
        if id == self.id {
            return Some(Location {
                offset: 0,
                n_params: self.n_params(),
            });
        }
        self.children.iter().enumerate().find_map(|(k, child)| {
            child.locate(id).map(|location| Location {
                offset: self.index.param_offset[k] + location.offset,
                n_params: location.n_params,
            })
        })
    }

    fn tree_generation(&self) -> u64 {
        self.children
            .iter()
            .map(|child| child.tree_generation())
            .fold(self.generation, u64::max)
    }

    fn ties(&self) -> &TieList {
        &self.ties
    }

    fn ties_mut(&mut self) -> &mut TieList {
        &mut self.ties
    }

    fn function(&self, out: &mut [f64], x: &[f64]) -> Result<()> {
        if out.len() != x.len() {
            return Err(CompFitError::DimensionMismatch(format!(
                "output has length {} but domain has length {}",
                out.len(),
                x.len()
            )));
        }
        out.fill(self.combination.identity());
        let mut values = vec![0.0; x.len()];
        for child in &self.children {
            child.function(&mut values, x)?;
            self.combination.combine(out, &values);
        }
        Ok(())
    }

    fn function_deriv(&self, jacobian: &mut PartialJacobian<'_>, x: &[f64]) -> Result<()> {
        self.combine_derivatives(jacobian, x, false)
    }

    fn cal_jacobian_for_covariance(
        &self,
        jacobian: &mut PartialJacobian<'_>,
        x: &[f64],
    ) -> Result<()> {
        self.combine_derivatives(jacobian, x, true)
    }

    fn as_composite(&self) -> Option<&CompositeFunction> {
        Some(self)
    }

    fn as_composite_mut(&mut self) -> Option<&mut CompositeFunction> {
        Some(self)
    }

    fn n_active(&self) -> usize {
        self.index.active_to_global.len()
    }

    fn is_active(&self, index: usize) -> Result<bool> {
        self.check_param(index)?;
        Ok(self.index.global_to_active[index].is_some())
    }

    fn active_index(&self, index: usize) -> Result<Option<usize>> {
        self.check_param(index)?;
        Ok(self.index.global_to_active[index])
    }

    fn index_of_active(&self, active: usize) -> Result<usize> {
        self.index
            .active_to_global
            .get(active)
            .copied()
            .ok_or(CompFitError::IndexOutOfBounds {
                index: active,
                len: self.index.active_to_global.len(),
            })
    }

    fn tie_of(&self, index: usize) -> Result<Option<&Tie>> {
        let target = self.parameter_reference(index)?;
        if let Some(tie) = self.ties.find(target) {
            return Ok(Some(tie));
        }
        let (child, local) = self.local_index(index)?;
        self.children[child].tie_of(local)
    }

    fn remove_tie_at(&mut self, index: usize) -> Result<bool> {
        let target = self.parameter_reference(index)?;
        if self.ties.remove_target(target) {
            self.mark_tied(index, false)?;
            return Ok(true);
        }
        let (child, local) = self.local_index(index)?;
        let removed = self.children[child].remove_tie_at(local)?;
        if removed {
            self.rebuild_index();
        }
        Ok(removed)
    }

    /// Children apply their own ties first, then this node's ties run in
    /// declaration order.
    fn apply_ties(&mut self) -> Result<()> {
        for child in &mut self.children {
            child.apply_ties()?;
        }
        let mut ties = std::mem::take(&mut self.ties);
        let result = ties.apply(self);
        self.ties = ties;
        result
    }
}
