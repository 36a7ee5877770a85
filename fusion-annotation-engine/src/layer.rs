//! Annotation layers and features.
//!
//! A [`Layer`] is a named collection of [`Feature`]s as produced by the
//! format adapters. The engine never mutates a supplied layer; operations
//! that attach properties return new features.

use crate::error::{EngineError, Result};
use crate::value::PropertyMap;
use geo_types::Geometry;
use serde::{Deserialize, Serialize};

/// One annotated geometry with its property tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub geometry: Geometry<f64>,
    #[serde(default)]
    pub properties: PropertyMap,
    /// Position of the feature in its owning layer when the engine was
    /// invoked. Assigned by the caller; never rewritten by the engine.
    pub index: usize,
}

impl Feature {
    pub fn new(geometry: Geometry<f64>, properties: PropertyMap, index: usize) -> Self {
        Self {
            geometry,
            properties,
            index,
        }
    }
}

/// Named collection of features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    pub id: String,
    pub features: Vec<Feature>,
}

impl Layer {
    pub fn new(name: impl Into<String>, id: impl Into<String>, features: Vec<Feature>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            features,
        }
    }

    /// Build a layer from geometries and property maps, assigning indices by
    /// position.
    pub fn from_parts<I>(name: impl Into<String>, id: impl Into<String>, parts: I) -> Self
    where
        I: IntoIterator<Item = (Geometry<f64>, PropertyMap)>,
    {
        let features = parts
            .into_iter()
            .enumerate()
            .map(|(index, (geometry, properties))| Feature::new(geometry, properties, index))
            .collect();
        Self::new(name, id, features)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Look a feature up by its caller-assigned index.
    pub fn feature_by_index(&self, index: usize) -> Option<&Feature> {
        match self.features.get(index) {
            Some(f) if f.index == index => Some(f),
            _ => self.features.iter().find(|f| f.index == index),
        }
    }
}

/// Find a layer by name. With duplicate names the first layer wins.
pub fn find_layer<'a>(layers: &'a [Layer], name: &str) -> Result<&'a Layer> {
    let mut matches = layers.iter().filter(|l| l.name == name);
    let layer = matches
        .next()
        .ok_or_else(|| EngineError::UnknownLayer(name.to_string()))?;
    if matches.next().is_some() {
        tracing::debug!(layer = name, "multiple layers share a name; using the first");
    }
    Ok(layer)
}

/// Position of a layer by name, same rules as [`find_layer`].
pub fn layer_position(layers: &[Layer], name: &str) -> Result<usize> {
    layers
        .iter()
        .position(|l| l.name == name)
        .ok_or_else(|| EngineError::UnknownLayer(name.to_string()))
}
