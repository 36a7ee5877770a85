//! Per-call spatial index over one layer.
//!
//! Each [`SpatialIndex`] is an R-tree of feature bounding boxes, built fresh
//! for the duration of one engine operation. Queries run in two stages:
//!
//! ```text
//!   query geometry ──► bbox (optionally grown by a distance)
//!                          │
//!                          ▼
//!                 R-tree envelope prefilter
//!                          │
//!                          ▼
//!               exact refine (geo crate)
//!                          │
//!                          ▼
//!          feature positions in the layer
//! ```
//!
//! Features with empty or degenerate geometry are never indexed; they are
//! reported once through [`SpatialIndex::skipped`].

use crate::geometry::{is_empty_geometry, min_distance, relates, BBox, Relation};
use crate::layer::Layer;
use geo_types::Geometry;
use rstar::{Envelope, RTree, RTreeObject, SelectionFunction, AABB};

/// Bounding box entry stored in the R-tree.
#[derive(Debug, Clone, Copy, PartialEq)]
struct IndexedBox {
    /// Position of the feature in `layer.features`.
    position: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedBox {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Selects entries whose envelope intersects a query box.
struct EnvelopeIntersecting(AABB<[f64; 2]>);

impl SelectionFunction<IndexedBox> for EnvelopeIntersecting {
    fn should_unpack_parent(&self, envelope: &AABB<[f64; 2]>) -> bool {
        envelope.intersects(&self.0)
    }

    fn should_unpack_leaf(&self, leaf: &IndexedBox) -> bool {
        leaf.envelope.intersects(&self.0)
    }
}

fn envelope_of(bbox: &BBox) -> AABB<[f64; 2]> {
    AABB::from_corners(bbox.lower(), bbox.upper())
}

/// Spatial index over one layer's geometries.
pub struct SpatialIndex<'a> {
    layer: &'a Layer,
    tree: RTree<IndexedBox>,
    /// Positions of features left out because their geometry is empty.
    skipped: Vec<usize>,
}

impl<'a> SpatialIndex<'a> {
    /// Bulk-load an index over `layer`.
    pub fn build(layer: &'a Layer) -> Self {
        let mut boxes = Vec::with_capacity(layer.features.len());
        let mut skipped = Vec::new();

        for (position, feature) in layer.features.iter().enumerate() {
            let bbox = if is_empty_geometry(&feature.geometry) {
                None
            } else {
                BBox::from_geometry(&feature.geometry).filter(BBox::is_finite)
            };
            match bbox {
                Some(bbox) => boxes.push(IndexedBox {
                    position,
                    envelope: envelope_of(&bbox),
                }),
                None => skipped.push(position),
            }
        }

        tracing::trace!(
            layer = %layer.name,
            indexed = boxes.len(),
            skipped = skipped.len(),
            "spatial index built"
        );

        Self {
            layer,
            tree: RTree::bulk_load(boxes),
            skipped,
        }
    }

    pub fn layer(&self) -> &'a Layer {
        self.layer
    }

    /// Number of indexed (non-empty) geometries.
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Feature positions excluded for empty geometry.
    pub fn skipped(&self) -> &[usize] {
        &self.skipped
    }

    /// Positions whose bounding box intersects `bbox`, in ascending order.
    fn candidates(&self, bbox: &BBox) -> Vec<usize> {
        let mut positions: Vec<usize> = self
            .tree
            .locate_with_selection_function(EnvelopeIntersecting(envelope_of(bbox)))
            .map(|entry| entry.position)
            .collect();
        positions.sort_unstable();
        positions
    }

    /// Positions of features whose geometry intersects `geom`, ascending.
    pub fn intersecting(&self, geom: &Geometry<f64>) -> Vec<usize> {
        self.related(geom, Relation::Intersects)
    }

    /// Positions of features `f` for which `geom <relation> f` holds, ascending.
    fn related(&self, geom: &Geometry<f64>, relation: Relation) -> Vec<usize> {
        let Some(bbox) = BBox::from_geometry(geom) else {
            return Vec::new();
        };
        self.candidates(&bbox)
            .into_iter()
            .filter(|&pos| relates(geom, &self.layer.features[pos].geometry, relation))
            .collect()
    }

    /// Whether `geom <relation> f` holds for at least one indexed feature.
    pub fn any_related(&self, geom: &Geometry<f64>, relation: Relation) -> bool {
        let Some(bbox) = BBox::from_geometry(geom) else {
            return false;
        };
        self.candidates(&bbox)
            .into_iter()
            .any(|pos| relates(geom, &self.layer.features[pos].geometry, relation))
    }

    /// Whether some indexed feature lies within `max_distance` of `geom`.
    pub fn any_within_distance(&self, geom: &Geometry<f64>, max_distance: f64) -> bool {
        let Some(bbox) = BBox::from_geometry(geom) else {
            return false;
        };
        self.candidates(&bbox.expanded(max_distance))
            .into_iter()
            .any(|pos| min_distance(geom, &self.layer.features[pos].geometry) <= max_distance)
    }
}
