//! Property paths.
//!
//! A [`PropertyPath`] addresses one leaf inside a feature's property tree.
//! Internally it is a sequence of [`PathSegment`]s; externally (schema keys,
//! filter paths, selection menus) it is a flat string:
//!
//! ```text
//! Main --> sub --+ Value 0 --> leaf
//! ```
//!
//! Map keys are joined with `" --> "`, list positions with `" --+ "` using
//! the `"Value {i}"` token. The leading segment is always a map key since
//! feature properties are rooted at a map.
//!
//! The string form is not escaped: a key that itself contains a separator
//! renders ambiguously. The flattener resolves such collisions
//! first-occurrence-wins and reports them.

use crate::error::{EngineError, Result};
use crate::value::{PropertyMap, PropertyValue};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Separator placed before a map key.
pub const KEY_SEPARATOR: &str = " --> ";

/// Separator placed before a list position.
pub const INDEX_SEPARATOR: &str = " --+ ";

/// Token prefix for list positions (`"Value 3"`).
pub const INDEX_TOKEN: &str = "Value ";

/// One step into a property tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathSegment {
    fn write_token(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(i) => write!(f, "{}{}", INDEX_TOKEN, i),
        }
    }
}

/// Structured address of a leaf in a property tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PropertyPath {
    segments: Vec<PathSegment>,
}

impl PropertyPath {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    /// Single-key path.
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            segments: vec![PathSegment::Key(key.into())],
        }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Extend with a map key.
    pub fn child(mut self, key: impl Into<String>) -> Self {
        self.segments.push(PathSegment::Key(key.into()));
        self
    }

    /// Extend with a list position.
    pub fn item(mut self, index: usize) -> Self {
        self.segments.push(PathSegment::Index(index));
        self
    }

    /// The top-level property key this path lives under.
    pub fn top_level(&self) -> Option<&str> {
        match self.segments.first() {
            Some(PathSegment::Key(key)) => Some(key),
            _ => None,
        }
    }

    /// Walk the path through a property map.
    pub fn resolve<'a>(&self, root: &'a PropertyMap) -> Option<&'a PropertyValue> {
        let mut segments = self.segments.iter();
        let mut current = match segments.next()? {
            PathSegment::Key(key) => root.get(key)?,
            PathSegment::Index(_) => return None,
        };
        for segment in segments {
            current = match (segment, current) {
                (PathSegment::Key(key), PropertyValue::Map(map)) => map.get(key)?,
                (PathSegment::Index(i), PropertyValue::List(items)) => items.get(*i)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(match segment {
                    PathSegment::Key(_) => KEY_SEPARATOR,
                    PathSegment::Index(_) => INDEX_SEPARATOR,
                })?;
            }
            segment.write_token(f)?;
        }
        Ok(())
    }
}

impl FromStr for PropertyPath {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(EngineError::invalid_path(s, "empty path"));
        }

        let mut segments = Vec::new();
        let mut rest = s;
        // Separator that introduced the current token; None for the leading key.
        let mut introduced_by: Option<&str> = None;

        loop {
            let next_key = rest.find(KEY_SEPARATOR);
            let next_index = rest.find(INDEX_SEPARATOR);
            let (token, next) = match (next_key, next_index) {
                (Some(k), Some(i)) if k <= i => (&rest[..k], Some((k, KEY_SEPARATOR))),
                (Some(_), Some(i)) => (&rest[..i], Some((i, INDEX_SEPARATOR))),
                (Some(k), None) => (&rest[..k], Some((k, KEY_SEPARATOR))),
                (None, Some(i)) => (&rest[..i], Some((i, INDEX_SEPARATOR))),
                (None, None) => (rest, None),
            };

            if token.is_empty() {
                return Err(EngineError::invalid_path(s, "empty segment"));
            }

            let segment = match introduced_by {
                Some(INDEX_SEPARATOR) => {
                    let position = token
                        .strip_prefix(INDEX_TOKEN)
                        .and_then(|n| n.parse::<usize>().ok())
                        .ok_or_else(|| {
                            EngineError::invalid_path(
                                s,
                                format!("expected \"{}<n>\" after list separator, got {:?}", INDEX_TOKEN, token),
                            )
                        })?;
                    PathSegment::Index(position)
                }
                _ => PathSegment::Key(token.to_string()),
            };
            segments.push(segment);

            match next {
                Some((at, separator)) => {
                    rest = &rest[at + separator.len()..];
                    introduced_by = Some(separator);
                }
                None => break,
            }
        }

        Ok(PropertyPath { segments })
    }
}

impl Serialize for PropertyPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PropertyPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
