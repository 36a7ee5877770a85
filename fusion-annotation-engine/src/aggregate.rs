//! Spatial aggregation: fold parent-layer properties onto child geometries.
//!
//! For every child feature, the aggregator finds the parent features whose
//! geometry intersects it, flattens their properties, and attaches a
//! summary under a group key:
//!
//! - `separate = true`: one group per parent layer, keyed by layer name
//! - `separate = false`: one pooled group keyed by [`MERGED_GROUP_KEY`]
//!
//! Numeric leaves become `{mean, median, max, min, sum}` (only `{mean}` when
//! `summarize = false`), re-nested at the leaf's original path.
//! Categorical leaves always become `{"Count": {value: occurrences}}`.
//!
//! Summaries also carry the number of intersecting parents and the area the
//! child shares with them.
//!
//! Summaries are deep-merged into the child's properties without
//! overwriting anything already there. A child that intersects nothing, or
//! only parents with nothing to report, is returned unchanged. Features with
//! empty geometry never match and are reported as diagnostics.

use crate::compose::LayerSelection;
use crate::config::EngineConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::Result;
use crate::flatten::{deep_merge, renest, Flattened, Flattener};
use crate::geometry::{intersection_area, is_empty_geometry};
use crate::index::SpatialIndex;
use crate::layer::{Feature, Layer};
use crate::path::PropertyPath;
use crate::value::{PropertyMap, PropertyValue, Scalar};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Group key used when parent layers are pooled.
pub const MERGED_GROUP_KEY: &str = "Aggregated";

/// Key holding categorical occurrence counts.
pub const COUNT_KEY: &str = "Count";

/// Layer label used in diagnostics for loose child features.
const CHILD_LABEL: &str = "children";

/// Key holding the number of intersecting parent features (summaries only).
pub const FEATURE_COUNT_KEY: &str = "Feature Count";

/// Key holding the area the child shares with its intersecting parents
/// (summaries only).
pub const INTERSECTION_AREA_KEY: &str = "Intersection Area";

/// Aggregation switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateOptions {
    /// One group per parent layer instead of a pooled group.
    pub separate: bool,
    /// Full numeric summaries instead of a single mean.
    pub summarize: bool,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            separate: true,
            summarize: true,
        }
    }
}

/// Summary statistics of one numeric leaf across matched parents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NumericSummary {
    pub mean: f64,
    pub median: f64,
    pub max: f64,
    pub min: f64,
    pub sum: f64,
}

impl NumericSummary {
    /// Summarize `values`, ignoring NaN. `None` if nothing is left.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut numbers: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if numbers.is_empty() {
            return None;
        }
        numbers.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let len = numbers.len();
        let sum: f64 = numbers.iter().sum();
        let median = if len.is_multiple_of(2) {
            (numbers[len / 2 - 1] + numbers[len / 2]) / 2.0
        } else {
            numbers[len / 2]
        };

        Some(Self {
            mean: sum / len as f64,
            median,
            max: numbers[len - 1],
            min: numbers[0],
            sum,
        })
    }

    fn entries(&self) -> [(&'static str, f64); 5] {
        [
            ("mean", self.mean),
            ("median", self.median),
            ("max", self.max),
            ("min", self.min),
            ("sum", self.sum),
        ]
    }
}

/// Output of [`SpatialAggregator::aggregate`].
#[derive(Debug, Clone, Default)]
pub struct AggregationResult {
    /// Child features, in input order, with aggregated properties merged in.
    pub features: Vec<Feature>,
    pub diagnostics: Diagnostics,
}

/// Aggregates parent-layer properties onto child features.
pub struct SpatialAggregator<'a> {
    layers: &'a [Layer],
    parents: LayerSelection,
    options: AggregateOptions,
    config: &'a EngineConfig,
}

/// Values collected for one group, keyed by leaf path.
#[derive(Default)]
struct GroupValues {
    features: usize,
    /// Summed child/parent overlap area.
    area: f64,
    numeric: BTreeMap<PropertyPath, Vec<f64>>,
    categorical: BTreeMap<PropertyPath, BTreeMap<String, usize>>,
}

impl GroupValues {
    fn absorb(&mut self, flat: &Flattened) {
        self.features += 1;
        for entry in flat.iter() {
            match &entry.value {
                Scalar::Number(n) => {
                    self.numeric.entry(entry.path.clone()).or_default().push(*n);
                }
                other => {
                    if let Some(category) = other.as_category() {
                        *self
                            .categorical
                            .entry(entry.path.clone())
                            .or_default()
                            .entry(category)
                            .or_default() += 1;
                    }
                }
            }
        }
    }

    /// Nested property map describing this group.
    fn into_properties(self, summarize: bool) -> PropertyMap {
        let mut flat: Vec<(PropertyPath, PropertyValue)> = Vec::new();

        if summarize {
            flat.push((
                PropertyPath::key(FEATURE_COUNT_KEY),
                PropertyValue::Number(self.features as f64),
            ));
            flat.push((
                PropertyPath::key(INTERSECTION_AREA_KEY),
                PropertyValue::Number(self.area),
            ));
        }

        for (path, values) in self.numeric {
            let Some(summary) = NumericSummary::from_values(&values) else {
                continue;
            };
            let entries = summary.entries();
            let take = if summarize { entries.len() } else { 1 };
            for &(stat, value) in &entries[..take] {
                flat.push((path.clone().child(stat), PropertyValue::Number(value)));
            }
        }

        for (path, counts) in self.categorical {
            for (category, count) in counts {
                flat.push((
                    path.clone().child(COUNT_KEY).child(category),
                    PropertyValue::Number(count as f64),
                ));
            }
        }

        renest(flat)
    }
}

impl<'a> SpatialAggregator<'a> {
    /// Aggregate from every layer in `layers` by default.
    pub fn new(layers: &'a [Layer], config: &'a EngineConfig) -> Self {
        Self {
            layers,
            parents: LayerSelection::All,
            options: AggregateOptions::default(),
            config,
        }
    }

    /// Restrict the parent layers.
    pub fn parents(mut self, selection: impl Into<LayerSelection>) -> Self {
        self.parents = selection.into();
        self
    }

    pub fn with_options(mut self, options: AggregateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn separate(mut self, separate: bool) -> Self {
        self.options.separate = separate;
        self
    }

    pub fn summarize(mut self, summarize: bool) -> Self {
        self.options.summarize = summarize;
        self
    }

    /// Aggregate onto `children`, returning new features.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(
            children = children.len(),
            separate = self.options.separate,
            summarize = self.options.summarize
        )
    )]
    pub fn aggregate(&self, children: Vec<Feature>) -> Result<AggregationResult> {
        self.run(CHILD_LABEL, children)
    }

    /// Aggregate onto every feature of `layer`, returning a new layer.
    pub fn aggregate_layer(&self, layer: &Layer) -> Result<(Layer, Diagnostics)> {
        let result = self.run(&layer.name, layer.features.clone())?;
        Ok((
            Layer::new(layer.name.clone(), layer.id.clone(), result.features),
            result.diagnostics,
        ))
    }

    fn run(&self, child_layer: &str, children: Vec<Feature>) -> Result<AggregationResult> {
        self.config.validate()?;
        let positions = self.parents.resolve(self.layers)?;
        let mut diagnostics = Diagnostics::new();

        let indexes: Vec<SpatialIndex<'_>> = positions
            .iter()
            .map(|&pos| {
                let index = SpatialIndex::build(&self.layers[pos]);
                for &skipped in index.skipped() {
                    let layer = index.layer();
                    diagnostics.empty_geometry(&layer.name, layer.features[skipped].index);
                }
                index
            })
            .collect();

        let flattener = Flattener::new(self.config.max_depth);
        // Parent properties flattened once, keyed by (index slot, feature position).
        let mut flat_cache: FxHashMap<(usize, usize), Flattened> = FxHashMap::default();
        let mut touched = 0usize;

        let mut features = Vec::with_capacity(children.len());
        for mut child in children {
            if is_empty_geometry(&child.geometry) {
                diagnostics.empty_geometry(child_layer, child.index);
                features.push(child);
                continue;
            }

            let mut groups: Vec<(String, GroupValues)> = Vec::new();
            for (slot, index) in indexes.iter().enumerate() {
                let matched = index.intersecting(&child.geometry);
                if matched.is_empty() {
                    continue;
                }
                let group_key = if self.options.separate {
                    index.layer().name.clone()
                } else {
                    MERGED_GROUP_KEY.to_string()
                };
                let position = match groups.iter().position(|(key, _)| *key == group_key) {
                    Some(position) => position,
                    None => {
                        groups.push((group_key, GroupValues::default()));
                        groups.len() - 1
                    }
                };

                for pos in matched {
                    let parent = &index.layer().features[pos];
                    let flat = flat_cache.entry((slot, pos)).or_insert_with(|| {
                        flattener
                            .flatten_excluding(&parent.properties, &self.config.excluded_properties)
                    });
                    for key in flat.collisions() {
                        diagnostics.record(Diagnostic::PathCollision { path: key.clone() });
                    }
                    let group = &mut groups[position].1;
                    group.absorb(flat);
                    if self.options.summarize {
                        group.area += intersection_area(&child.geometry, &parent.geometry);
                    }
                }
            }

            let mut addition = PropertyMap::new();
            for (group_key, values) in groups {
                tracing::trace!(
                    child = child.index,
                    group = %group_key,
                    parents = values.features,
                    "aggregating group"
                );
                let properties = values.into_properties(self.options.summarize);
                if !properties.is_empty() {
                    addition.insert(group_key, PropertyValue::Map(properties));
                }
            }
            if !addition.is_empty() {
                touched += 1;
                deep_merge(&mut child.properties, addition);
            }
            features.push(child);
        }

        tracing::debug!(
            touched,
            total = features.len(),
            "spatial aggregation complete"
        );
        Ok(AggregationResult {
            features,
            diagnostics,
        })
    }
}
