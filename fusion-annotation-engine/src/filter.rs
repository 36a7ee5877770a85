//! Property filters.
//!
//! A [`PropertyFilter`] selects features by the value found at one
//! flattened property path: an inclusive numeric range or a set of
//! categorical values. A feature missing the path never matches.

use crate::error::{EngineError, Result};
use crate::path::PropertyPath;
use crate::predicate::Combinator;
use crate::value::Scalar;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Accepted values for a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterRange {
    /// Inclusive `[low, high]`.
    Numeric { low: f64, high: f64 },
    /// Any of these values.
    Categorical(BTreeSet<String>),
}

impl FilterRange {
    /// Whether `value` falls in the range. Numbers never match a
    /// categorical set and strings never match a numeric range.
    pub fn contains(&self, value: &Scalar) -> bool {
        match self {
            FilterRange::Numeric { low, high } => value
                .as_number()
                .is_some_and(|n| *low <= n && n <= *high),
            FilterRange::Categorical(values) => value
                .as_category()
                .is_some_and(|category| values.contains(&category)),
        }
    }
}

/// Filter on one property path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyFilter {
    /// Flattened path string, e.g. `"Main --> Sub"`.
    pub path: String,
    pub range: FilterRange,
    #[serde(default)]
    pub combinator: Combinator,
}

impl PropertyFilter {
    pub fn numeric(path: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            path: path.into(),
            range: FilterRange::Numeric { low, high },
            combinator: Combinator::And,
        }
    }

    pub fn categorical<I, S>(path: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into(),
            range: FilterRange::Categorical(values.into_iter().map(Into::into).collect()),
            combinator: Combinator::And,
        }
    }

    pub fn with_combinator(mut self, combinator: Combinator) -> Self {
        self.combinator = combinator;
        self
    }

    pub fn or(self) -> Self {
        self.with_combinator(Combinator::Or)
    }

    pub fn not(self) -> Self {
        self.with_combinator(Combinator::Not)
    }

    /// Parse the path and check the range. Returns the canonical path key.
    pub fn validate(&self) -> Result<String> {
        let path: PropertyPath = self.path.parse()?;
        if let FilterRange::Numeric { low, high } = self.range {
            if low.is_nan() || high.is_nan() {
                return Err(EngineError::InvalidFilter(format!(
                    "range bounds for {:?} must be numbers",
                    self.path
                )));
            }
            if low > high {
                return Err(EngineError::InvalidFilter(format!(
                    "range for {:?} is inverted: [{}, {}]",
                    self.path, low, high
                )));
            }
        }
        Ok(path.to_string())
    }

    /// Match against the value found at the path, if any.
    pub fn matches(&self, value: Option<&Scalar>) -> bool {
        value.is_some_and(|v| self.range.contains(v))
    }
}
