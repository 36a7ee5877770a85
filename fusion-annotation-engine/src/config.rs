//! Engine configuration.
//!
//! One [`EngineConfig`] is shared by schema discovery, the query composer,
//! and the spatial aggregator. It is plain data: callers usually build it
//! once per session (or load it from JSON) and pass it by reference.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Default map-nesting depth explored by the flattener.
pub const DEFAULT_MAX_DEPTH: usize = 4;

/// Properties hidden from schema discovery and aggregation by default.
///
/// These are identifiers stamped onto features by annotation stores, not
/// measurements.
pub const DEFAULT_EXCLUDED_PROPERTIES: &[&str] = &["_id", "_index"];

/// Configuration for a single engine invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of map levels the flattener descends into.
    /// Nested maps below this depth are treated as opaque and skipped.
    /// Default: 4
    pub max_depth: usize,

    /// Property keys/paths excluded from schema discovery and aggregation.
    /// Matched against top-level keys and against full flattened paths.
    pub excluded_properties: BTreeSet<String>,

    /// Linear factor applied to every `nearest` distance before evaluation.
    /// Used when distances are entered in display units but geometries are
    /// stored in image pixels.
    /// Default: 1.0
    pub distance_scale: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            excluded_properties: DEFAULT_EXCLUDED_PROPERTIES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            distance_scale: 1.0,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the flattener depth limit.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Replace the exclusion set.
    pub fn with_excluded_properties<I, S>(mut self, excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_properties = excluded.into_iter().map(Into::into).collect();
        self
    }

    /// Add one key/path to the exclusion set.
    pub fn exclude(mut self, property: impl Into<String>) -> Self {
        self.excluded_properties.insert(property.into());
        self
    }

    /// Set the distance scale factor for `nearest` predicates.
    pub fn with_distance_scale(mut self, scale: f64) -> Self {
        self.distance_scale = scale;
        self
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if !self.distance_scale.is_finite() || self.distance_scale <= 0.0 {
            return Err(EngineError::Config(format!(
                "distance_scale must be finite and positive, got {}",
                self.distance_scale
            )));
        }
        Ok(())
    }

    /// Whether a top-level key or flattened path is excluded.
    pub fn is_excluded(&self, key: &str) -> bool {
        self.excluded_properties.contains(key)
    }
}
