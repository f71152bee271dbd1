//! Text form of function trees.
//!
//! A leaf is written as comma-separated items:
//!
//! ```text
//! name=Gaussian,Height=3,PeakCentre=0.5,Sigma=0.1,constraints=(0<Sigma<1),ties=(Sigma=0.2)
//! ```
//!
//! A composite is its children joined by `;`, followed by an optional
//! `ties=(lhs=rhs,...)` segment holding the composite's own ties, in
//! declaration order, with names qualified relative to it. Nested composites are wrapped in
//! parentheses and start with `composite=<Name>`. The top level carries the
//! `composite=` header only when it is a product or has fewer than two
//! children, so that it parses back into a composite.
//!
//! Constant ties declared on a composite are written into the segment of the
//! leaf they target, next to that leaf's own ties. A constant tie whose target
//! is read by a tie that runs before it stays in the composite's clause, since
//! leaf ties are applied first.

use crate::error::{CompFitError, Result};
use crate::parameters::Bounds;

use super::composite::{Combination, CompositeFunction};
use super::factory::FunctionFactory;
use super::reference::ParameterReference;
use super::Function;

type Folded = Vec<(ParameterReference, String)>;

/// Serialize any function.
pub fn to_string<F: Function + ?Sized>(function: &F) -> Result<String> {
    match function.as_composite() {
        Some(composite) => composite_segments(composite, false, &Folded::new()),
        None => leaf_segment(function, &Folded::new()),
    }
}

fn composite_segments(
    composite: &CompositeFunction,
    nested: bool,
    inherited: &[(ParameterReference, String)],
) -> Result<String> {
    // Ties of nested composites run before this composite's ties, so a
    // constant they read must stay in this composite's clause.
    let mut readers = Vec::new();
    nested_readers(composite, &mut readers)?;
    let mut keep = Vec::with_capacity(composite.ties().len());
    let mut folded = inherited.to_vec();
    for tie in composite.ties().iter() {
        let fold = tie.is_constant() && !readers.contains(&tie.target());
        if fold {
            folded.push((tie.target(), tie.expression().to_string()));
        }
        keep.push(!fold);
        readers.extend(tie.references().map(|(_, reference)| reference));
    }

    let mut segments = Vec::new();
    if nested || composite.combination() == Combination::Product || composite.n_functions() < 2 {
        segments.push(format!("composite={}", composite.name()));
    }

    for i in 0..composite.n_functions() {
        let child = composite.get_function(i)?;
        match child.as_composite() {
            Some(inner) => segments.push(format!("({})", composite_segments(inner, true, &folded)?)),
            None => segments.push(leaf_segment(child, &folded)?),
        }
    }

    let ties = composite
        .ties()
        .iter()
        .zip(&keep)
        .filter(|(_, kept)| **kept)
        .map(|(tie, _)| tie)
        .map(|tie| tie.qualified(composite).map(|(lhs, rhs)| format!("{}={}", lhs, rhs)))
        .collect::<Result<Vec<_>>>()?;
    if !ties.is_empty() {
        segments.push(format!("ties=({})", ties.join(",")));
    }

    Ok(segments.join(";"))
}

/// Parameters read by the ties of composites nested below `composite`.
fn nested_readers(
    composite: &CompositeFunction,
    readers: &mut Vec<ParameterReference>,
) -> Result<()> {
    for i in 0..composite.n_functions() {
        if let Some(inner) = composite.get_function(i)?.as_composite() {
            nested_readers(inner, readers)?;
            readers.extend(
                inner
                    .ties()
                    .iter()
                    .flat_map(|tie| tie.references().map(|(_, reference)| reference)),
            );
        }
    }
    Ok(())
}

fn leaf_segment<F: Function + ?Sized>(
    function: &F,
    folded: &[(ParameterReference, String)],
) -> Result<String> {
    let mut items = vec![format!("name={}", function.name())];
    let mut constraints = Vec::new();

    for i in 0..function.n_params() {
        let name = function.parameter_name(i)?;
        items.push(format!("{}={}", name, function.get_parameter(i)?));
        if let Some(text) = function.bounds(i)?.and_then(|b| b.describe(&name)) {
            constraints.push(text);
        }
    }
    if !constraints.is_empty() {
        items.push(format!("constraints=({})", constraints.join(",")));
    }

    let mut ties = function
        .ties()
        .iter()
        .map(|tie| tie.qualified(function).map(|(lhs, rhs)| format!("{}={}", lhs, rhs)))
        .collect::<Result<Vec<_>>>()?;
    for (reference, value) in folded.iter().filter(|(r, _)| r.function == function.id()) {
        ties.push(format!("{}={}", function.parameter_name(reference.index)?, value));
    }
    if !ties.is_empty() {
        items.push(format!("ties=({})", ties.join(",")));
    }

    Ok(items.join(","))
}

/// Parse a function definition with the built-in factory.
///
/// # Examples
///
/// ```
/// use compfit::function::{parse_string, Function};
///
/// let f = parse_string("name=Linear,A0=1,A1=2;name=Gaussian,Height=3,PeakCentre=0,Sigma=1;ties=(f1.Sigma=f0.A1/4)").unwrap();
/// assert_eq!(f.n_params(), 5);
/// assert_eq!(f.n_active(), 4);
/// assert_eq!(f.as_string().unwrap(), "name=Linear,A0=1,A1=2;name=Gaussian,Height=3,PeakCentre=0,Sigma=1;ties=(f1.Sigma=f0.A1/4)");
/// ```
pub fn parse_string(text: &str) -> Result<Box<dyn Function>> {
    parse_with(text, &FunctionFactory::default())
}

/// Parse a function definition, creating functions through `factory`.
pub fn parse_with(text: &str, factory: &FunctionFactory) -> Result<Box<dyn Function>> {
    let segments = split_top_level(text, ';')?;
    match segments.as_slice() {
        [] => Err(CompFitError::Parse("empty function definition".to_string())),
        [single] if single.starts_with("name=") => parse_leaf(single, factory),
        _ => parse_composite(&segments, factory),
    }
}

fn parse_composite(segments: &[&str], factory: &FunctionFactory) -> Result<Box<dyn Function>> {
    let (kind, rest) = match segments.split_first() {
        Some((first, rest)) => match first.strip_prefix("composite=") {
            Some(kind) => (kind.trim(), rest),
            None => ("CompositeFunction", segments),
        },
        None => ("CompositeFunction", segments),
    };

    let mut function = factory.create(kind)?;
    let composite = function
        .as_composite_mut()
        .ok_or_else(|| CompFitError::Parse(format!("'{}' is not a composite function", kind)))?;

    let mut ties = Vec::new();
    for segment in rest {
        if let Some(inner) = segment.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
            composite.add_function(parse_with(inner, factory)?);
        } else if let Some(list) = segment.strip_prefix("ties=") {
            ties.extend(assignments(list)?);
        } else if segment.starts_with("name=") {
            composite.add_function(parse_leaf(segment, factory)?);
        } else {
            return Err(CompFitError::Parse(format!("unexpected segment '{}'", segment)));
        }
    }
    for (lhs, rhs) in ties {
        composite.tie(&lhs, &rhs)?;
    }

    Ok(function)
}

fn parse_leaf(segment: &str, factory: &FunctionFactory) -> Result<Box<dyn Function>> {
    let items = split_top_level(segment, ',')?;
    let (first, rest) = items
        .split_first()
        .ok_or_else(|| CompFitError::Parse("empty function segment".to_string()))?;
    let kind = first
        .strip_prefix("name=")
        .map(str::trim)
        .ok_or_else(|| CompFitError::Parse(format!("expected name=..., found '{}'", first)))?;

    let mut function = factory.create(kind)?;
    if function.as_composite().is_some() {
        return Err(CompFitError::Parse(format!(
            "'{}' must be declared with composite=",
            kind
        )));
    }

    let mut constraints = Vec::new();
    let mut ties = Vec::new();
    for item in rest {
        let (key, value) = item
            .split_once('=')
            .map(|(k, v)| (k.trim(), v.trim()))
            .ok_or_else(|| CompFitError::Parse(format!("expected key=value, found '{}'", item)))?;
        match key {
            "ties" => ties.extend(assignments(value)?),
            "constraints" => constraints.extend(parenthesized(value)?),
            _ => {
                let number = value.parse::<f64>().map_err(|_| {
                    CompFitError::Parse(format!("invalid value '{}' for parameter '{}'", value, key))
                })?;
                function.set_parameter_by_name(key, number)?;
            }
        }
    }

    for text in constraints {
        let (name, bounds) = Bounds::parse_description(text)
            .ok_or_else(|| CompFitError::Parse(format!("invalid constraint '{}'", text)))?;
        function.add_constraint(&name, bounds)?;
    }
    for (lhs, rhs) in ties {
        function.tie(&lhs, &rhs)?;
    }

    Ok(function)
}

/// Items of a `(a,b,...)` list.
fn parenthesized(text: &str) -> Result<Vec<&str>> {
    let inner = text
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| CompFitError::Parse(format!("expected (...), found '{}'", text)))?;
    split_top_level(inner, ',')
}

/// `(lhs=rhs,...)` pairs.
fn assignments(text: &str) -> Result<Vec<(String, String)>> {
    parenthesized(text)?
        .into_iter()
        .map(|item| {
            item.split_once('=')
                .map(|(lhs, rhs)| (lhs.trim().to_string(), rhs.trim().to_string()))
                .ok_or_else(|| CompFitError::Parse(format!("expected lhs=rhs, found '{}'", item)))
        })
        .collect()
}

/// Split at `separator` outside parentheses, trimming items and skipping empty ones.
fn split_top_level(text: &str, separator: char) -> Result<Vec<&str>> {
    let unbalanced = || CompFitError::Parse(format!("unbalanced parentheses in '{}'", text));
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1).ok_or_else(unbalanced)?,
            c if c == separator && depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(unbalanced());
    }
    parts.push(text[start..].trim());
    parts.retain(|part| !part.is_empty());
    Ok(parts)
}
