//! Ties: parameters whose value is computed from an expression over other parameters.

use tracing::trace;

use crate::error::{CompFitError, Result};
use crate::parameters::expression::{EvaluationContext, Expression, ExpressionError};

use super::reference::ParameterReference;
use super::Function;

/// Absolute indices of a tie's target and references, valid for one tree generation.
#[derive(Debug, Clone)]
struct Resolved {
    generation: u64,
    target: usize,
    references: Vec<usize>,
}

/// A single tie `lhs = expression`.
///
/// Both the target and every identifier of the expression are bound to
/// [`ParameterReference`]s when the tie is declared, so later structural
/// changes to the tree do not change what the tie means.
#[derive(Debug, Clone)]
pub struct Tie {
    lhs: String,
    target: ParameterReference,
    expression: Expression,
    references: Vec<(String, ParameterReference)>,
    resolved: Option<Resolved>,
}

struct BoundValues<'a> {
    names: &'a [(String, ParameterReference)],
    values: Vec<f64>,
}

impl EvaluationContext for BoundValues<'_> {
    fn get_variable(&self, name: &str) -> std::result::Result<f64, ExpressionError> {
        self.names
            .iter()
            .position(|(n, _)| n == name)
            .map(|i| self.values[i])
            .ok_or_else(|| ExpressionError::UndefinedVariable {
                name: name.to_string(),
            })
    }

    fn has_variable(&self, name: &str) -> bool {
        self.names.iter().any(|(n, _)| n == name)
    }
}

impl Tie {
    pub(crate) fn new(
        lhs: &str,
        target: ParameterReference,
        expression: Expression,
        references: Vec<(String, ParameterReference)>,
    ) -> Self {
        Self {
            lhs: lhs.to_string(),
            target,
            expression,
            references,
            resolved: None,
        }
    }

    /// Name of the target as it was written when the tie was declared.
    pub fn lhs(&self) -> &str {
        &self.lhs
    }

    pub fn target(&self) -> ParameterReference {
        self.target
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    /// `true` for ties without parameter references, i.e. fixed values.
    pub fn is_constant(&self) -> bool {
        self.expression.is_constant()
    }

    /// Identifiers of the expression with the parameters they are bound to.
    pub fn references(&self) -> impl Iterator<Item = (&str, ParameterReference)> + '_ {
        self.references.iter().map(|(name, r)| (name.as_str(), *r))
    }

    pub(crate) fn retarget(&mut self, target: ParameterReference) {
        self.target = target;
        self.resolved = None;
    }

    pub(crate) fn rebind(&mut self, position: usize, reference: ParameterReference) {
        if let Some(entry) = self.references.get_mut(position) {
            entry.1 = reference;
            self.resolved = None;
        }
    }

    fn resolve<F: Function + ?Sized>(&mut self, owner: &F) -> Result<&Resolved> {
        let generation = owner.tree_generation();
        let stale = self
            .resolved
            .as_ref()
            .map_or(true, |r| r.generation != generation);

        if stale {
            let dangling = || CompFitError::DanglingTie {
                lhs: self.lhs.clone(),
            };
            let target = self.target.resolve(owner).ok_or_else(dangling)?;
            let references = self
                .references
                .iter()
                .map(|(_, r)| r.resolve(owner).ok_or_else(dangling))
                .collect::<Result<Vec<_>>>()?;
            trace!(lhs = %self.lhs, generation, "tie references resolved");
            self.resolved = Some(Resolved {
                generation,
                target,
                references,
            });
        }

        self.resolved.as_ref().ok_or_else(|| CompFitError::DanglingTie {
            lhs: self.lhs.clone(),
        })
    }

    /// Evaluate the expression against the current parameter values of `owner`.
    ///
    /// Returns the absolute index of the target and its new value.
    pub fn evaluate<F: Function + ?Sized>(&mut self, owner: &F) -> Result<(usize, f64)> {
        let resolved = self.resolve(owner)?;
        let target = resolved.target;
        let values = resolved
            .references
            .iter()
            .map(|&i| owner.get_parameter(i))
            .collect::<Result<Vec<_>>>()?;
        let context = BoundValues {
            names: &self.references,
            values,
        };
        Ok((target, self.expression.evaluate(&context)?))
    }

    /// The tie written with names valid in `owner`'s current shape.
    ///
    /// Identifiers are rewritten from their bound references, so a tie keeps
    /// pointing at the same parameters after siblings were inserted or removed.
    pub fn qualified<F: Function + ?Sized>(&self, owner: &F) -> Result<(String, String)> {
        let name_of = |reference: ParameterReference| -> Result<String> {
            let index = reference
                .resolve(owner)
                .ok_or_else(|| CompFitError::DanglingTie {
                    lhs: self.lhs.clone(),
                })?;
            owner.parameter_name(index)
        };

        let lhs = name_of(self.target)?;
        let mut renames = Vec::with_capacity(self.references.len());
        for (name, reference) in &self.references {
            renames.push((name.clone(), name_of(*reference)?));
        }
        let rhs = self.expression.rename_variables(&|name: &str| {
            renames
                .iter()
                .find(|(old, _)| old == name)
                .map(|(_, new)| new.clone())
        });
        Ok((lhs, rhs.to_string()))
    }
}

/// Ties owned by one function node, kept in declaration order.
#[derive(Debug, Clone, Default)]
pub struct TieList {
    ties: Vec<Tie>,
}

impl TieList {
    pub fn len(&self) -> usize {
        self.ties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ties.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tie> {
        self.ties.iter()
    }

    pub(crate) fn push(&mut self, tie: Tie) {
        self.ties.push(tie);
    }

    /// The tie targeting `target`, if this list has one.
    pub fn find(&self, target: ParameterReference) -> Option<&Tie> {
        self.ties.iter().find(|t| t.target == target)
    }

    pub(crate) fn remove_target(&mut self, target: ParameterReference) -> bool {
        let before = self.ties.len();
        self.ties.retain(|t| t.target != target);
        self.ties.len() != before
    }

    pub(crate) fn retain<P: FnMut(&Tie) -> bool>(&mut self, keep: P) {
        self.ties.retain(keep);
    }

    pub(crate) fn drain(&mut self) -> std::vec::Drain<'_, Tie> {
        self.ties.drain(..)
    }

    /// Evaluate every tie in declaration order and write the results into `owner`.
    ///
    /// A tie sees the values written by the ties before it. A tie whose target
    /// or references no longer resolve inside `owner` fails with
    /// [`CompFitError::DanglingTie`].
    pub fn apply<F: Function + ?Sized>(&mut self, owner: &mut F) -> Result<()> {
        for tie in &mut self.ties {
            let (index, value) = tie.evaluate(&*owner)?;
            owner.set_parameter(index, value)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a TieList {
    type Item = &'a Tie;
    type IntoIter = std::slice::Iter<'a, Tie>;

    fn into_iter(self) -> Self::IntoIter {
        self.ties.iter()
    }
}
