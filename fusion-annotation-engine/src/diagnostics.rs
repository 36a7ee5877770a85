//! Non-fatal data-quality conditions.
//!
//! Operations that hit one of these keep going and return the
//! [`Diagnostics`] next to their best-effort result. Each condition is
//! recorded once per operation and logged at `warn`.

use rustc_hash::FxHashSet;
use serde::Serialize;
use std::fmt;

/// A data-quality condition observed during an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// The same path held values of different scalar types across features.
    TypeMismatch {
        path: String,
        first: &'static str,
        second: &'static str,
    },

    /// A feature's geometry is empty or degenerate; it was left out of
    /// spatial matching.
    EmptyGeometry { layer: String, index: usize },

    /// Two distinct leaves rendered to the same path string; the first kept
    /// the path.
    PathCollision { path: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::TypeMismatch {
                path,
                first,
                second,
            } => write!(f, "property {:?} seen as both {} and {}", path, first, second),
            Diagnostic::EmptyGeometry { layer, index } => {
                write!(f, "feature {} of layer {:?} has an empty geometry", index, layer)
            }
            Diagnostic::PathCollision { path } => {
                write!(f, "multiple properties flatten to {:?}", path)
            }
        }
    }
}

/// Ordered, de-duplicated collection of diagnostics.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
    seen: FxHashSet<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic. Returns `false` if it was already recorded.
    pub fn record(&mut self, diagnostic: Diagnostic) -> bool {
        if self.seen.contains(&diagnostic) {
            return false;
        }
        tracing::warn!(%diagnostic, "annotation data-quality issue");
        self.seen.insert(diagnostic.clone());
        self.items.push(diagnostic);
        true
    }

    pub fn empty_geometry(&mut self, layer: &str, index: usize) {
        self.record(Diagnostic::EmptyGeometry {
            layer: layer.to_string(),
            index,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Serialize for Diagnostics {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.items.serialize(serializer)
    }
}
