//! Error types for the annotation engine.
//!
//! Only structural caller errors live here. Data-quality conditions
//! (mixed value types, empty geometries) are reported as
//! [`Diagnostic`](crate::diagnostics::Diagnostic)s next to a best-effort
//! result instead.

use thiserror::Error;

/// Annotation engine errors.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A predicate, selection, or aggregation names a layer that was not supplied.
    #[error("Unknown layer: {0}")]
    UnknownLayer(String),

    /// A property path string does not follow the path grammar.
    #[error("Invalid property path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// WKT parsing error.
    #[error("WKT parse error: {0}")]
    WktParse(String),

    /// Spatial predicate with unusable parameters (e.g., negative distance).
    #[error("Invalid spatial predicate: {0}")]
    InvalidPredicate(String),

    /// Property filter with unusable parameters (e.g., inverted range).
    #[error("Invalid property filter: {0}")]
    InvalidFilter(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub(crate) fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
