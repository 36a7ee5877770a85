//! Property schema discovery.
//!
//! Walks every feature of every supplied layer, flattens its properties,
//! and keeps a running summary per path:
//!
//! - numeric leaves: `{min, max}` plus a distinct counter that is bumped
//!   whenever the range widens
//! - string/boolean leaves: the set of values seen plus a distinct counter
//!   bumped on each new value
//!
//! Summaries only ever grow. A path seen with both numeric and categorical
//! values is tracked under both and reported as a
//! [`Diagnostic::TypeMismatch`].

use crate::config::EngineConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::filter::{FilterRange, PropertyFilter};
use crate::flatten::Flattener;
use crate::layer::Layer;
use crate::predicate::Combinator;
use crate::value::Scalar;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Observed numeric bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NumericRange {
    pub min: f64,
    pub max: f64,
}

/// Running summary of one property path.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SchemaEntry {
    /// Bounds of numeric values, if any were seen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric: Option<NumericRange>,

    /// Categorical values seen, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_values: Option<BTreeSet<String>>,

    /// Number of times the summary grew.
    pub distinct_count: usize,
}

/// Value kind a schema entry has observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Numeric,
    Categorical,
    Mixed,
}

impl SchemaEntry {
    pub fn kind(&self) -> ValueKind {
        match (&self.numeric, &self.unique_values) {
            (Some(_), Some(_)) => ValueKind::Mixed,
            (Some(_), None) => ValueKind::Numeric,
            _ => ValueKind::Categorical,
        }
    }

    /// Fold one observed numeric value in. Returns `true` if the entry grew.
    pub fn observe_number(&mut self, value: f64) -> bool {
        if value.is_nan() {
            return false;
        }
        match &mut self.numeric {
            None => {
                self.numeric = Some(NumericRange {
                    min: value,
                    max: value,
                });
                self.distinct_count += 1;
                true
            }
            Some(range) => {
                let mut grew = false;
                if value < range.min {
                    range.min = value;
                    self.distinct_count += 1;
                    grew = true;
                }
                if value > range.max {
                    range.max = value;
                    self.distinct_count += 1;
                    grew = true;
                }
                grew
            }
        }
    }

    /// Fold one observed categorical value in. Returns `true` if it was new.
    pub fn observe_category(&mut self, value: String) -> bool {
        let values = self.unique_values.get_or_insert_with(BTreeSet::new);
        if values.insert(value) {
            self.distinct_count += 1;
            true
        } else {
            false
        }
    }

    fn observe(&mut self, value: &Scalar) {
        match value {
            Scalar::Number(n) => {
                self.observe_number(*n);
            }
            other => {
                if let Some(category) = other.as_category() {
                    self.observe_category(category);
                }
            }
        }
    }
}

/// Discovered property schema across a working set of layers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PropertySchema {
    /// Every path observed (after exclusions).
    pub all_paths: BTreeSet<String>,

    /// Summary per path.
    pub entries: BTreeMap<String, SchemaEntry>,

    /// Layer names in the order supplied.
    pub layer_names: Vec<String>,

    /// Top-level property key → every full path nested under it. Used by
    /// callers to build selection menus.
    pub property_keys: BTreeMap<String, BTreeSet<String>>,

    /// Data-quality conditions seen during discovery.
    pub diagnostics: Diagnostics,
}

impl PropertySchema {
    pub fn get(&self, path: &str) -> Option<&SchemaEntry> {
        self.entries.get(path)
    }

    /// A filter spanning everything observed for `path`: the full numeric
    /// range, or every categorical value. Mixed paths get the numeric range.
    pub fn filter_for(&self, path: &str, combinator: Combinator) -> Option<PropertyFilter> {
        let entry = self.entries.get(path)?;
        let range = match (&entry.numeric, &entry.unique_values) {
            (Some(range), _) => FilterRange::Numeric {
                low: range.min,
                high: range.max,
            },
            (None, Some(values)) => FilterRange::Categorical(values.clone()),
            (None, None) => return None,
        };
        Some(PropertyFilter {
            path: path.to_string(),
            range,
            combinator,
        })
    }
}

/// Build the property schema of `layers`.
#[tracing::instrument(level = "debug", skip_all, fields(layers = layers.len()))]
pub fn discover_schema(layers: &[Layer], config: &EngineConfig) -> PropertySchema {
    let flattener = Flattener::new(config.max_depth);
    let mut schema = PropertySchema {
        layer_names: layers.iter().map(|l| l.name.clone()).collect(),
        ..Default::default()
    };
    // Value class first seen per path, for mismatch reporting.
    let mut first_type: BTreeMap<String, &'static str> = BTreeMap::new();

    for layer in layers {
        for feature in &layer.features {
            let flat =
                flattener.flatten_excluding(&feature.properties, &config.excluded_properties);

            for key in flat.collisions() {
                schema
                    .diagnostics
                    .record(Diagnostic::PathCollision { path: key.clone() });
            }

            for entry in flat.iter() {
                let class = entry.value.value_class();
                match first_type.get(&entry.key) {
                    None => {
                        first_type.insert(entry.key.clone(), class);
                    }
                    Some(&first) if first != class => {
                        schema.diagnostics.record(Diagnostic::TypeMismatch {
                            path: entry.key.clone(),
                            first,
                            second: class,
                        });
                    }
                    Some(_) => {}
                }

                schema.all_paths.insert(entry.key.clone());
                if let Some(top) = entry.path.top_level() {
                    schema
                        .property_keys
                        .entry(top.to_string())
                        .or_default()
                        .insert(entry.key.clone());
                }
                schema
                    .entries
                    .entry(entry.key.clone())
                    .or_default()
                    .observe(&entry.value);
            }
        }
    }

    tracing::debug!(
        paths = schema.all_paths.len(),
        diagnostics = schema.diagnostics.len(),
        "schema discovered"
    );
    schema
}
