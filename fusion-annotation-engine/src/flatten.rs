//! Property tree flattening, re-nesting, and merging.
//!
//! [`Flattener::flatten`] walks a property map depth-first and emits one
//! [`FlatProperty`] per scalar leaf. Map nesting is limited to
//! `max_depth` keys per path; a map that would exceed the limit is skipped
//! as opaque. Lists never count against the limit and are always expanded.
//!
//! [`renest`] and [`deep_merge`] go the other way: they rebuild a nested
//! tree from flat paths and fold it into an existing map without
//! overwriting anything already present.

use crate::path::{PathSegment, PropertyPath};
use crate::value::{PropertyMap, PropertyValue, Scalar};
use rustc_hash::FxHashSet;
use std::collections::BTreeSet;

/// One flattened leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatProperty {
    /// Structured path to the leaf.
    pub path: PropertyPath,
    /// Rendered path string (the external key).
    pub key: String,
    /// Leaf value.
    pub value: Scalar,
}

/// Output of one flatten call.
#[derive(Debug, Clone, Default)]
pub struct Flattened {
    entries: Vec<FlatProperty>,
    /// Rendered keys produced by more than one distinct leaf. Only the
    /// first occurrence was kept.
    collisions: Vec<String>,
}

impl Flattened {
    /// Leaves in depth-first discovery order.
    pub fn entries(&self) -> &[FlatProperty] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<FlatProperty> {
        self.entries
    }

    pub fn collisions(&self) -> &[String] {
        &self.collisions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlatProperty> {
        self.entries.iter()
    }
}

/// Depth-limited property flattener.
#[derive(Debug, Clone, Copy)]
pub struct Flattener {
    max_depth: usize,
}

impl Flattener {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Flatten a property map.
    pub fn flatten(&self, properties: &PropertyMap) -> Flattened {
        self.flatten_excluding(properties, &BTreeSet::new())
    }

    /// Flatten a property map, skipping excluded top-level keys before the
    /// walk starts and dropping any leaf whose rendered path is excluded.
    pub fn flatten_excluding(
        &self,
        properties: &PropertyMap,
        excluded: &BTreeSet<String>,
    ) -> Flattened {
        let mut walk = Walk {
            max_depth: self.max_depth,
            excluded,
            seen: FxHashSet::default(),
            out: Flattened::default(),
        };

        if self.max_depth > 0 {
            let mut path = Vec::new();
            for (key, value) in properties {
                if excluded.contains(key) {
                    continue;
                }
                path.push(PathSegment::Key(key.clone()));
                walk.visit(value, &mut path, 1);
                path.pop();
            }
        }

        walk.out
    }
}

struct Walk<'a> {
    max_depth: usize,
    excluded: &'a BTreeSet<String>,
    seen: FxHashSet<String>,
    out: Flattened,
}

impl Walk<'_> {
    /// `depth` is the number of map keys already on `path`.
    fn visit(&mut self, value: &PropertyValue, path: &mut Vec<PathSegment>, depth: usize) {
        match value {
            PropertyValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    path.push(PathSegment::Index(i));
                    self.visit(item, path, depth);
                    path.pop();
                }
            }
            PropertyValue::Map(map) => {
                if depth >= self.max_depth {
                    return;
                }
                for (key, child) in map {
                    path.push(PathSegment::Key(key.clone()));
                    self.visit(child, path, depth + 1);
                    path.pop();
                }
            }
            leaf => {
                let Some(scalar) = leaf.as_scalar() else {
                    return;
                };
                let property_path = PropertyPath::new(path.clone());
                let key = property_path.to_string();
                if self.excluded.contains(&key) {
                    return;
                }
                if !self.seen.insert(key.clone()) {
                    tracing::debug!(path = %key, "duplicate flattened path; keeping first");
                    self.out.collisions.push(key);
                    return;
                }
                self.out.entries.push(FlatProperty {
                    path: property_path,
                    key,
                    value: scalar,
                });
            }
        }
    }
}

/// Rebuild a nested property map from `(path, value)` pairs.
///
/// Paths are inserted in order; when two entries disagree about the shape
/// at some position, the first one wins. Gaps in list positions are
/// padded with empty maps, which contribute no leaves.
pub fn renest<I>(entries: I) -> PropertyMap
where
    I: IntoIterator<Item = (PropertyPath, PropertyValue)>,
{
    let mut root = PropertyMap::new();
    for (path, value) in entries {
        let mut incoming = PropertyMap::new();
        if let Some(tree) = build_branch(path.segments(), value) {
            if let Some(PathSegment::Key(top)) = path.segments().first() {
                incoming.insert(top.clone(), tree);
            }
        }
        deep_merge(&mut root, incoming);
    }
    root
}

/// Build the value stored under `segments[0]`.
fn build_branch(segments: &[PathSegment], value: PropertyValue) -> Option<PropertyValue> {
    let (_, rest) = segments.split_first()?;
    let mut node = value;
    for segment in rest.iter().rev() {
        node = match segment {
            PathSegment::Key(key) => {
                let mut map = PropertyMap::new();
                map.insert(key.clone(), node);
                PropertyValue::Map(map)
            }
            PathSegment::Index(i) => {
                let mut items = vec![PropertyValue::Map(PropertyMap::new()); *i];
                items.push(node);
                PropertyValue::List(items)
            }
        };
    }
    Some(node)
}

/// Fold `incoming` into `target` without overwriting.
///
/// New keys are added. Maps present on both sides merge recursively, lists
/// merge position by position. Any other collision keeps the existing
/// value.
pub fn deep_merge(target: &mut PropertyMap, incoming: PropertyMap) {
    for (key, value) in incoming {
        match target.get_mut(&key) {
            None => {
                target.insert(key, value);
            }
            Some(existing) => merge_value(existing, value),
        }
    }
}

fn merge_value(existing: &mut PropertyValue, incoming: PropertyValue) {
    match (existing, incoming) {
        (PropertyValue::Map(target), PropertyValue::Map(map)) => deep_merge(target, map),
        (PropertyValue::List(target), PropertyValue::List(items)) => {
            for (i, item) in items.into_iter().enumerate() {
                match target.get_mut(i) {
                    Some(slot) if is_placeholder(slot) => *slot = item,
                    Some(slot) => merge_value(slot, item),
                    None => target.push(item),
                }
            }
        }
        _ => {}
    }
}

fn is_placeholder(value: &PropertyValue) -> bool {
    matches!(value, PropertyValue::Map(map) if map.is_empty())
}
