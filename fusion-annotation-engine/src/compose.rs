//! Composed spatial + property queries across named layers.
//!
//! # Evaluation
//!
//! 1. The included layers' features are concatenated into one working set,
//!    each element remembering the layer and feature it came from.
//! 2. Spatial predicates run in order against the current working set.
//!    Reference layers are always looked up among *all* supplied layers.
//!    When at least one predicate is given, features with empty geometry
//!    leave the working set first (reported as diagnostics), so even a
//!    `NOT` predicate never keeps them.
//! 3. Property filters run in order against the survivors' flattened
//!    properties. A missing path never matches.
//! 4. Survivors are emitted together with a reverse index back to their
//!    origin.
//!
//! Within steps 2 and 3 every predicate/filter combines the same way:
//!
//! - `AND` removes candidates that do not match, immediately
//! - `NOT` removes candidates that match, immediately
//! - `OR` removes nothing; it marks the candidates it matched
//!
//! When a step finishes and at least one `OR` ran in it, only candidates
//! marked by some `OR` survive. Each step therefore computes
//! `(every AND) ∧ (no NOT) ∧ (some OR, if any OR was given)`, which does
//! not depend on the order predicates are listed in.
//!
//! Removal is done by identity ([`Vec::retain`] over candidates carrying
//! their origin), never by stale position.

use crate::config::EngineConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::Result;
use crate::filter::PropertyFilter;
use crate::flatten::Flattener;
use crate::geometry::is_empty_geometry;
use crate::layer::{find_layer, layer_position, Feature, Layer};
use crate::predicate::{Combinator, PredicateEvaluator, SpatialPredicate};
use crate::value::Scalar;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Which source layers contribute candidates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LayerSelection {
    /// Every supplied layer (`"*"`).
    #[default]
    All,
    /// Only the named layers, in the order given.
    Named(Vec<String>),
}

impl LayerSelection {
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LayerSelection::Named(names.into_iter().map(Into::into).collect())
    }

    /// Positions of the selected layers in `layers`.
    pub fn resolve(&self, layers: &[Layer]) -> Result<Vec<usize>> {
        match self {
            LayerSelection::All => Ok((0..layers.len()).collect()),
            LayerSelection::Named(names) => {
                let mut positions = Vec::with_capacity(names.len());
                for name in names {
                    let pos = layer_position(layers, name)?;
                    if !positions.contains(&pos) {
                        positions.push(pos);
                    }
                }
                Ok(positions)
            }
        }
    }
}

impl From<&str> for LayerSelection {
    fn from(name: &str) -> Self {
        if name == "*" {
            LayerSelection::All
        } else {
            LayerSelection::Named(vec![name.to_string()])
        }
    }
}

impl Serialize for LayerSelection {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            LayerSelection::All => serializer.serialize_str("*"),
            LayerSelection::Named(names) => names.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for LayerSelection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            One(String),
            Many(Vec<String>),
        }
        Ok(match Repr::deserialize(deserializer)? {
            Repr::One(name) => LayerSelection::from(name.as_str()),
            Repr::Many(names) if names.iter().any(|n| n == "*") => LayerSelection::All,
            Repr::Many(names) => LayerSelection::Named(names),
        })
    }
}

/// Origin of one query result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReverseIndexEntry {
    pub layer_name: String,
    pub feature_index: usize,
}

/// Output of [`QueryComposer::execute`].
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// Surviving features, in working-set order.
    pub merged_features: Vec<Feature>,
    /// `reverse_index[i]` is the origin of `merged_features[i]`.
    pub reverse_index: Vec<ReverseIndexEntry>,
    pub diagnostics: Diagnostics,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.merged_features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merged_features.is_empty()
    }

    /// Features paired with their origin.
    pub fn iter(&self) -> impl Iterator<Item = (&Feature, &ReverseIndexEntry)> {
        self.merged_features.iter().zip(self.reverse_index.iter())
    }
}

/// A composed query: spatial predicates, property filters, and the layers
/// that supply candidates.
///
/// Deserializes from the dashboard's filter payload:
///
/// ```json
/// {"Spatial": [{"kind": "intersects", "reference_layer": "Immune"}],
///  "Filters": [{"path": "area", "range": {"low": 150, "high": 1e9}}],
///  "include": "*"}
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryComposer {
    #[serde(rename = "Spatial", default)]
    spatial: Vec<SpatialPredicate>,
    #[serde(rename = "Filters", default)]
    filters: Vec<PropertyFilter>,
    #[serde(default)]
    include: LayerSelection,
}

/// Working-set element.
struct Candidate<'a> {
    layer: usize,
    feature: &'a Feature,
    /// Set when an OR step in the current group matched.
    or_hit: bool,
    /// Flattened properties, filled in before property filters run.
    values: FxHashMap<String, Scalar>,
}

impl QueryComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a spatial predicate.
    pub fn spatial(mut self, predicate: SpatialPredicate) -> Self {
        self.spatial.push(predicate);
        self
    }

    /// Append a property filter.
    pub fn filter(mut self, filter: PropertyFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Choose the layers that supply candidates.
    pub fn include(mut self, selection: impl Into<LayerSelection>) -> Self {
        self.include = selection.into();
        self
    }

    pub fn predicates(&self) -> &[SpatialPredicate] {
        &self.spatial
    }

    pub fn filters(&self) -> &[PropertyFilter] {
        &self.filters
    }

    /// Parse a query from its JSON payload.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Check every structural input: layer names, predicate parameters,
    /// filter paths and ranges. Returns the canonical filter path keys.
    fn validate(&self, layers: &[Layer]) -> Result<Vec<String>> {
        for predicate in &self.spatial {
            predicate.validate()?;
            find_layer(layers, &predicate.reference_layer)?;
        }
        self.filters.iter().map(PropertyFilter::validate).collect()
    }

    /// Run the query over `layers`.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(
            layers = layers.len(),
            predicates = self.spatial.len(),
            filters = self.filters.len()
        )
    )]
    pub fn execute(&self, layers: &[Layer], config: &EngineConfig) -> Result<QueryResult> {
        config.validate()?;
        let filter_keys = self.validate(layers)?;
        let included = self.include.resolve(layers)?;

        let mut diagnostics = Diagnostics::new();
        let mut working: Vec<Candidate<'_>> = included
            .iter()
            .flat_map(|&layer| {
                layers[layer].features.iter().map(move |feature| Candidate {
                    layer,
                    feature,
                    or_hit: false,
                    values: FxHashMap::default(),
                })
            })
            .collect();
        tracing::debug!(candidates = working.len(), "working set assembled");

        // Step 2: spatial predicates. Empty geometries take no part in
        // spatial matching under any combinator.
        if !self.spatial.is_empty() {
            working.retain(|c| {
                let empty = is_empty_geometry(&c.feature.geometry);
                if empty {
                    diagnostics.empty_geometry(&layers[c.layer].name, c.feature.index);
                }
                !empty
            });
        }
        let mut evaluator = PredicateEvaluator::new(layers, config);
        let mut or_seen = false;
        for predicate in &self.spatial {
            let features: Vec<&Feature> = working.iter().map(|c| c.feature).collect();
            let origins: Vec<&str> = working
                .iter()
                .map(|c| layers[c.layer].name.as_str())
                .collect();
            let matches = evaluator.evaluate(&features, &origins, predicate, &mut diagnostics)?;
            or_seen |= apply_step(&mut working, &matches, predicate.combinator);
            tracing::debug!(
                reference = %predicate.reference_layer,
                combinator = %predicate.combinator,
                survivors = working.len(),
                "spatial predicate applied"
            );
        }
        close_or_group(&mut working, or_seen);

        // Step 3: property filters
        if !self.filters.is_empty() {
            let flattener = Flattener::new(config.max_depth);
            for candidate in working.iter_mut() {
                let flat = flattener.flatten(&candidate.feature.properties);
                for key in flat.collisions() {
                    diagnostics.record(Diagnostic::PathCollision { path: key.clone() });
                }
                candidate.values = flat
                    .into_entries()
                    .into_iter()
                    .map(|e| (e.key, e.value))
                    .collect();
            }

            let mut or_seen = false;
            for (filter, key) in self.filters.iter().zip(&filter_keys) {
                let matches: Vec<bool> = working
                    .iter()
                    .map(|c| filter.matches(c.values.get(key)))
                    .collect();
                or_seen |= apply_step(&mut working, &matches, filter.combinator);
                tracing::debug!(
                    path = %key,
                    combinator = %filter.combinator,
                    survivors = working.len(),
                    "property filter applied"
                );
            }
            close_or_group(&mut working, or_seen);
        }

        // Step 4: reverse index
        let mut result = QueryResult {
            merged_features: Vec::with_capacity(working.len()),
            reverse_index: Vec::with_capacity(working.len()),
            diagnostics,
        };
        for candidate in working {
            result.reverse_index.push(ReverseIndexEntry {
                layer_name: layers[candidate.layer].name.clone(),
                feature_index: candidate.feature.index,
            });
            result.merged_features.push(candidate.feature.clone());
        }

        tracing::debug!(results = result.len(), "query complete");
        Ok(result)
    }
}

/// Apply one predicate/filter outcome. Returns `true` for an OR step.
fn apply_step(working: &mut Vec<Candidate<'_>>, matches: &[bool], combinator: Combinator) -> bool {
    debug_assert_eq!(matches.len(), working.len());
    match combinator {
        Combinator::And => {
            retain_where(working, matches, true);
            false
        }
        Combinator::Not => {
            retain_where(working, matches, false);
            false
        }
        Combinator::Or => {
            for (candidate, &matched) in working.iter_mut().zip(matches) {
                candidate.or_hit |= matched;
            }
            true
        }
    }
}

/// Keep candidates whose flag equals `keep`. `retain` visits elements once,
/// in order, so the flags stay aligned while the vector shrinks.
fn retain_where(working: &mut Vec<Candidate<'_>>, matches: &[bool], keep: bool) {
    let mut flags = matches.iter();
    working.retain(|_| flags.next() == Some(&keep));
}

fn close_or_group(working: &mut Vec<Candidate<'_>>, or_seen: bool) {
    if or_seen {
        working.retain(|c| c.or_hit);
    }
    for candidate in working.iter_mut() {
        candidate.or_hit = false;
    }
}
