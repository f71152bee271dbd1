//! Bound constraints on single parameters
//!
//! A bound is a descriptor attached to a parameter. It never deactivates the
//! parameter: the fit driver hands the bounds of active parameters to the
//! optimizer, while bounds on tied parameters are stored but not enforced.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur when working with parameter bounds
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundsError {
    #[error("Invalid bounds: min ({min}) must be less than max ({max})")]
    InvalidBounds { min: f64, max: f64 },

    #[error("Bounds must not be NaN")]
    NotANumber,
}

/// Represents the bounds constraints on a parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Minimum allowed value for the parameter
    pub min: f64,

    /// Maximum allowed value for the parameter
    pub max: f64,
}

impl Serialize for Bounds {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("Bounds", 2)?;

        // Infinite ends are written as null
        if self.min.is_finite() {
            state.serialize_field("min", &self.min)?;
        } else {
            state.serialize_field("min", &Option::<f64>::None)?;
        }

        if self.max.is_finite() {
            state.serialize_field("max", &self.max)?;
        } else {
            state.serialize_field("max", &Option::<f64>::None)?;
        }

        state.end()
    }
}

impl<'de> Deserialize<'de> for Bounds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct BoundsHelper {
            #[serde(default)]
            min: Option<f64>,

            #[serde(default)]
            max: Option<f64>,
        }

        let helper = BoundsHelper::deserialize(deserializer)?;

        Ok(Bounds {
            min: helper.min.unwrap_or(f64::NEG_INFINITY),
            max: helper.max.unwrap_or(f64::INFINITY),
        })
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }
}

impl Bounds {
    /// Create a new bounds constraint with min and max values
    ///
    /// # Arguments
    ///
    /// * `min` - Minimum allowed value for the parameter
    /// * `max` - Maximum allowed value for the parameter
    ///
    /// # Returns
    ///
    /// A new `Bounds` object if min <= max, or an error otherwise
    ///
    /// # Examples
    ///
    /// ```
    /// use compfit::parameters::bounds::Bounds;
    ///
    /// let bounds = Bounds::new(0.0, 10.0).unwrap();
    /// assert_eq!(bounds.min, 0.0);
    /// assert_eq!(bounds.max, 10.0);
    /// assert!(Bounds::new(1.0, 0.0).is_err());
    /// ```
    pub fn new(min: f64, max: f64) -> Result<Self, BoundsError> {
        if min.is_nan() || max.is_nan() {
            return Err(BoundsError::NotANumber);
        }
        if min > max {
            return Err(BoundsError::InvalidBounds { min, max });
        }

        Ok(Self { min, max })
    }

    /// Create a bounds constraint with only a minimum value
    pub fn min_only(min: f64) -> Self {
        Self {
            min,
            max: f64::INFINITY,
        }
    }

    /// Create a bounds constraint with only a maximum value
    pub fn max_only(max: f64) -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max,
        }
    }

    /// Check if a value is within the bounds
    pub fn is_within_bounds(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// `true` if min is finite
    pub fn has_lower_bound(&self) -> bool {
        self.min.is_finite()
    }

    /// `true` if max is finite
    pub fn has_upper_bound(&self) -> bool {
        self.max.is_finite()
    }

    /// Clamp a value to be within the bounds
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    /// Render the bound around a parameter name, e.g. `0<Sigma<10` or `Height>0`.
    ///
    /// Returns `None` for a bound without finite ends.
    pub fn describe(&self, name: &str) -> Option<String> {
        match (self.has_lower_bound(), self.has_upper_bound()) {
            (true, true) => Some(format!("{}<{}<{}", self.min, name, self.max)),
            (true, false) => Some(format!("{}>{}", name, self.min)),
            (false, true) => Some(format!("{}<{}", name, self.max)),
            (false, false) => None,
        }
    }

    /// Parse a description produced by [`Bounds::describe`].
    ///
    /// Returns the parameter name and the bound.
    pub fn parse_description(text: &str) -> Option<(String, Bounds)> {
        let text = text.trim();
        if let Some((left, right)) = text.split_once('>') {
            let min = right.trim().parse::<f64>().ok()?;
            return Some((left.trim().to_string(), Bounds::min_only(min)));
        }

        let parts: Vec<&str> = text.split('<').map(str::trim).collect();
        match parts.as_slice() {
            [lo, name, hi] => {
                let bounds = Bounds::new(lo.parse().ok()?, hi.parse().ok()?).ok()?;
                Some((name.to_string(), bounds))
            }
            [name, hi] => Some((name.to_string(), Bounds::max_only(hi.parse().ok()?))),
            _ => None,
        }
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}
