//! Spatial predicates.
//!
//! A [`SpatialPredicate`] tests candidate features against a named
//! reference layer. [`PredicateEvaluator`] answers predicates for a slice
//! of candidates, producing one boolean per candidate (the predicate's
//! positive sense, before its [`Combinator`] is applied).
//!
//! Reference layers are indexed lazily and the index is reused for every
//! predicate evaluated through the same evaluator, which lives for one
//! engine operation.

use crate::config::EngineConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{EngineError, Result};
use crate::geometry::{is_empty_geometry, Relation};
use crate::index::SpatialIndex;
use crate::layer::{find_layer, Feature, Layer};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Layer label used in diagnostics for candidates without a named layer.
pub const CANDIDATE_LABEL: &str = "candidates";

/// How a predicate's or filter's result combines with the running set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combinator {
    /// Keep only matching candidates.
    #[default]
    And,
    /// Broaden: candidates survive if any OR step matched.
    Or,
    /// Keep only non-matching candidates.
    Not,
}

impl FromStr for Combinator {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "and" => Ok(Combinator::And),
            "or" => Ok(Combinator::Or),
            "not" => Ok(Combinator::Not),
            other => Err(EngineError::InvalidPredicate(format!(
                "unknown combinator {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Combinator::And => "AND",
            Combinator::Or => "OR",
            Combinator::Not => "NOT",
        })
    }
}

/// Geometric test run against the reference layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SpatialRelation {
    /// Candidate overlaps at least one reference geometry.
    Intersects,
    /// Candidate lies within `max_distance` of some reference geometry.
    Nearest { max_distance: f64 },
    /// Candidate lies inside some reference geometry.
    Within,
    /// Candidate contains some reference geometry.
    Contains,
    /// Candidate touches (shares only boundary with) some reference geometry.
    Touches,
    /// Candidate partially overlaps some reference geometry.
    Overlaps,
    /// Candidate crosses some reference geometry.
    Crosses,
}

impl SpatialRelation {
    fn as_relation(&self) -> Option<Relation> {
        match self {
            SpatialRelation::Intersects => Some(Relation::Intersects),
            SpatialRelation::Within => Some(Relation::Within),
            SpatialRelation::Contains => Some(Relation::Contains),
            SpatialRelation::Touches => Some(Relation::Touches),
            SpatialRelation::Overlaps => Some(Relation::Overlaps),
            SpatialRelation::Crosses => Some(Relation::Crosses),
            SpatialRelation::Nearest { .. } => None,
        }
    }
}

/// A spatial test against a named reference layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialPredicate {
    #[serde(flatten)]
    pub relation: SpatialRelation,
    pub reference_layer: String,
    #[serde(default)]
    pub combinator: Combinator,
}

impl SpatialPredicate {
    pub fn new(relation: SpatialRelation, reference_layer: impl Into<String>) -> Self {
        Self {
            relation,
            reference_layer: reference_layer.into(),
            combinator: Combinator::And,
        }
    }

    pub fn intersects(reference_layer: impl Into<String>) -> Self {
        Self::new(SpatialRelation::Intersects, reference_layer)
    }

    pub fn nearest(reference_layer: impl Into<String>, max_distance: f64) -> Self {
        Self::new(SpatialRelation::Nearest { max_distance }, reference_layer)
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

    /// Reject unusable parameters.
    pub fn validate(&self) -> Result<()> {
        if let SpatialRelation::Nearest { max_distance } = self.relation {
            if !max_distance.is_finite() || max_distance < 0.0 {
                return Err(EngineError::InvalidPredicate(format!(
                    "nearest distance must be finite and non-negative, got {}",
                    max_distance
                )));
            }
        }
        Ok(())
    }
}

/// Evaluates spatial predicates against a fixed set of source layers.
pub struct PredicateEvaluator<'a> {
    layers: &'a [Layer],
    distance_scale: f64,
    indexes: FxHashMap<&'a str, SpatialIndex<'a>>,
}

impl<'a> PredicateEvaluator<'a> {
    pub fn new(layers: &'a [Layer], config: &EngineConfig) -> Self {
        Self {
            layers,
            distance_scale: config.distance_scale,
            indexes: FxHashMap::default(),
        }
    }

    /// Index for `name`, building it on first use.
    pub fn index(
        &mut self,
        name: &str,
        diagnostics: &mut Diagnostics,
    ) -> Result<&SpatialIndex<'a>> {
        let layer = find_layer(self.layers, name)?;
        let index = self.indexes.entry(layer.name.as_str()).or_insert_with(|| {
            let index = SpatialIndex::build(layer);
            for &pos in index.skipped() {
                diagnostics.empty_geometry(&layer.name, layer.features[pos].index);
            }
            index
        });
        Ok(index)
    }

    /// One match flag per candidate.
    ///
    /// Candidates with empty geometry never match. `candidate_layers[i]`
    /// names the layer candidate `i` came from and is only used for
    /// diagnostics; unnamed candidates are reported as [`CANDIDATE_LABEL`].
    pub fn evaluate(
        &mut self,
        candidates: &[&Feature],
        candidate_layers: &[&str],
        predicate: &SpatialPredicate,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<bool>> {
        predicate.validate()?;
        let distance_scale = self.distance_scale;
        let index = self.index(&predicate.reference_layer, diagnostics)?;

        if index.is_empty() {
            return Ok(vec![false; candidates.len()]);
        }

        let mut matches = Vec::with_capacity(candidates.len());
        for (i, feature) in candidates.iter().enumerate() {
            if is_empty_geometry(&feature.geometry) {
                let layer = candidate_layers.get(i).copied().unwrap_or(CANDIDATE_LABEL);
                diagnostics.empty_geometry(layer, feature.index);
                matches.push(false);
                continue;
            }
            let matched = match predicate.relation.as_relation() {
                Some(relation) => index.any_related(&feature.geometry, relation),
                None => {
                    let max_distance = match predicate.relation {
                        SpatialRelation::Nearest { max_distance } => max_distance * distance_scale,
                        _ => 0.0,
                    };
                    index.any_within_distance(&feature.geometry, max_distance)
                }
            };
            matches.push(matched);
        }

        tracing::trace!(
            reference = %predicate.reference_layer,
            relation = ?predicate.relation,
            matched = matches.iter().filter(|m| **m).count(),
            candidates = candidates.len(),
            "spatial predicate evaluated"
        );
        Ok(matches)
    }
}

/// Evaluate one predicate with a fresh evaluator.
pub fn evaluate_predicate(
    candidates: &[&Feature],
    predicate: &SpatialPredicate,
    layers: &[Layer],
    config: &EngineConfig,
) -> Result<(Vec<bool>, Diagnostics)> {
    let mut diagnostics = Diagnostics::new();
    let mut evaluator = PredicateEvaluator::new(layers, config);
    let matches = evaluator.evaluate(candidates, &[], predicate, &mut diagnostics)?;
    Ok((matches, diagnostics))
}
