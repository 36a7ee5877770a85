//! Query and aggregation engine for multi-layer spatial annotations.
//!
//! Given a set of annotation layers (named collections of geometries, each
//! carrying a nested property tree), this crate supports:
//!
//! - **Schema discovery** across every layer's flattened properties
//! - **Composed queries** mixing spatial predicates and property filters
//!   under AND / OR / NOT
//! - **Spatial aggregation** of parent-layer properties onto child features
//! - **Property alignment** of external tabular records onto a layer
//!
//! # Architecture
//!
//! ```text
//!   layers ──► Flattener ──► PropertySchema (ranges, value sets)
//!     │
//!     ├──► SpatialIndex (R-tree, per call)
//!     │        │
//!     │        ▼
//!     │   PredicateEvaluator ─┐
//!     │                       ├──► QueryComposer ──► QueryResult
//!     └──► PropertyFilter ────┘                      (features + reverse index)
//!     │
//!     └──► SpatialAggregator ──► child features with summaries merged in
//! ```
//!
//! All operations are pure: supplied layers are never mutated and any
//! feature with new properties is a fresh value. Non-fatal data problems are
//! returned as [`Diagnostics`] next to the result.
//!
//! # Modules
//!
//! - [`config`]: Engine configuration
//! - [`value`]: Property trees
//! - [`path`]: Flattened property paths
//! - [`flatten`]: Flattening, re-nesting and deep merge
//! - [`schema`]: Schema discovery
//! - [`layer`]: Layers and features
//! - [`geometry`]: Geometry helpers and relations
//! - [`index`]: Per-call spatial index
//! - [`predicate`]: Spatial predicates
//! - [`filter`]: Property filters
//! - [`compose`]: Query composition
//! - [`aggregate`]: Spatial aggregation
//! - [`align`]: Property alignment
//! - [`diagnostics`]: Non-fatal conditions
//! - [`error`]: Error types

pub mod aggregate;
pub mod align;
pub mod compose;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod filter;
pub mod flatten;
pub mod geometry;
pub mod index;
pub mod layer;
pub mod path;
pub mod predicate;
pub mod schema;
pub mod value;

// Re-export key types
pub use aggregate::{
    AggregateOptions, AggregationResult, NumericSummary, SpatialAggregator, COUNT_KEY,
    FEATURE_COUNT_KEY, INTERSECTION_AREA_KEY, MERGED_GROUP_KEY,
};
pub use align::{align_properties, AlignBy};
pub use compose::{LayerSelection, QueryComposer, QueryResult, ReverseIndexEntry};
pub use config::EngineConfig;
pub use diagnostics::{Diagnostic, Diagnostics};
pub use error::{EngineError, Result};
pub use filter::{FilterRange, PropertyFilter};
pub use flatten::{deep_merge, renest, FlatProperty, Flattened, Flattener};
pub use geometry::{parse_wkt, Relation};
pub use index::SpatialIndex;
pub use layer::{find_layer, Feature, Layer};
pub use path::{PathSegment, PropertyPath};
pub use predicate::{
    evaluate_predicate, Combinator, PredicateEvaluator, SpatialPredicate, SpatialRelation,
    CANDIDATE_LABEL,
};
pub use schema::{discover_schema, NumericRange, PropertySchema, SchemaEntry, ValueKind};
pub use value::{property_map_from_json, PropertyMap, PropertyValue, Scalar};
