//! Shared fixtures for integration tests.

#![allow(dead_code)]

use fusion_annotation_engine::{property_map_from_json, Layer, PropertyValue};
use geo_types::{point, polygon, Geometry};

pub fn square(x0: f64, y0: f64, size: f64) -> Geometry<f64> {
    Geometry::Polygon(polygon![
        (x: x0, y: y0),
        (x: x0 + size, y: y0),
        (x: x0 + size, y: y0 + size),
        (x: x0, y: y0 + size),
    ])
}

pub fn pt(x: f64, y: f64) -> Geometry<f64> {
    Geometry::Point(point!(x: x, y: y))
}

/// `Tumor`: two squares with `area` 100 and 200.
/// `Immune`: two CD8 points inside the area-200 square, one CD4 point inside
/// the area-100 square.
pub fn tumor_immune() -> Vec<Layer> {
    vec![
        Layer::from_parts(
            "Tumor",
            "tumor-1",
            vec![
                (
                    square(0.0, 0.0, 10.0),
                    property_map_from_json(serde_json::json!({"area": 100})),
                ),
                (
                    square(50.0, 0.0, 20.0),
                    property_map_from_json(serde_json::json!({"area": 200})),
                ),
            ],
        ),
        Layer::from_parts(
            "Immune",
            "immune-1",
            vec![
                (
                    pt(55.0, 5.0),
                    property_map_from_json(serde_json::json!({"celltype": "CD8"})),
                ),
                (
                    pt(60.0, 15.0),
                    property_map_from_json(serde_json::json!({"celltype": "CD8"})),
                ),
                (
                    pt(5.0, 5.0),
                    property_map_from_json(serde_json::json!({"celltype": "CD4"})),
                ),
            ],
        ),
    ]
}

/// Properties of a feature as JSON, for terse assertions.
pub fn props_json(properties: &fusion_annotation_engine::PropertyMap) -> serde_json::Value {
    PropertyValue::Map(properties.clone()).to_json()
}
