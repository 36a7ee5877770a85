//! Attach rows of an external property table to a layer.
//!
//! Rows are matched to features either by position or by a shared property
//! value, then deep-merged into the feature's properties. Values already on
//! the feature are never overwritten.

use crate::error::Result;
use crate::flatten::deep_merge;
use crate::layer::Layer;
use crate::path::PropertyPath;
use crate::value::{PropertyMap, Scalar};
use serde::{Deserialize, Serialize};

/// How table rows find their feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignBy {
    /// Row `i` goes to the feature at position `i`.
    Index,
    /// A row goes to every feature whose value at this path equals the
    /// row's value at the same path.
    Property(String),
}

/// Return a copy of `layer` with `records` merged into its features.
///
/// Rows without a matching feature are ignored.
#[tracing::instrument(level = "debug", skip_all, fields(layer = %layer.name, records = records.len()))]
pub fn align_properties(layer: &Layer, records: &[PropertyMap], by: &AlignBy) -> Result<Layer> {
    let mut aligned = layer.clone();
    let mut unmatched = 0usize;

    match by {
        AlignBy::Index => {
            for (position, record) in records.iter().enumerate() {
                match aligned.features.get_mut(position) {
                    Some(feature) => deep_merge(&mut feature.properties, record.clone()),
                    None => unmatched += 1,
                }
            }
        }
        AlignBy::Property(key) => {
            let path: PropertyPath = key.parse()?;
            let feature_keys: Vec<Option<Scalar>> = layer
                .features
                .iter()
                .map(|f| path.resolve(&f.properties).and_then(|v| v.as_scalar()))
                .collect();

            for record in records {
                let Some(wanted) = path.resolve(record).and_then(|v| v.as_scalar()) else {
                    unmatched += 1;
                    continue;
                };
                let mut hit = false;
                for (feature, have) in aligned.features.iter_mut().zip(&feature_keys) {
                    if have.as_ref() == Some(&wanted) {
                        deep_merge(&mut feature.properties, record.clone());
                        hit = true;
                    }
                }
                if !hit {
                    unmatched += 1;
                }
            }
        }
    }

    tracing::debug!(unmatched, "property alignment complete");
    Ok(aligned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::value::{property_map_from_json, PropertyValue};
    use geo_types::{point, Geometry};
    use serde_json::json;

    fn cells() -> Layer {
        Layer::from_parts(
            "Cells",
            "c",
            (0..3).map(|i| {
                (
                    Geometry::Point(point!(x: i as f64, y: 0.0)),
                    property_map_from_json(json!({"barcode": format!("B{}", i), "area": 10})),
                )
            }),
        )
    }

    fn props(layer: &Layer, i: usize) -> serde_json::Value {
        PropertyValue::Map(layer.features[i].properties.clone()).to_json()
    }

    #[test]
    fn test_align_by_index() {
        let layer = cells();
        let records = vec![
            property_map_from_json(json!({"cluster": 1})),
            property_map_from_json(json!({"cluster": 2, "area": 99})),
        ];
        let aligned = align_properties(&layer, &records, &AlignBy::Index).unwrap();

        assert_eq!(props(&aligned, 0)["cluster"], json!(1.0));
        assert_eq!(props(&aligned, 1)["cluster"], json!(2.0));
        // existing value kept
        assert_eq!(props(&aligned, 1)["area"], json!(10.0));
        assert!(props(&aligned, 2).get("cluster").is_none());
        // source untouched
        assert!(props(&layer, 0).get("cluster").is_none());
    }

    #[test]
    fn test_align_by_property() {
        let layer = cells();
        let records = vec![
            property_map_from_json(json!({"barcode": "B2", "genes": {"CD8A": 4}})),
            property_map_from_json(json!({"barcode": "B9", "genes": {"CD8A": 1}})),
            property_map_from_json(json!({"genes": {"CD4": 1}})),
        ];
        let aligned =
            align_properties(&layer, &records, &AlignBy::Property("barcode".into())).unwrap();

        assert_eq!(props(&aligned, 2)["genes"], json!({"CD8A": 4.0}));
        assert!(props(&aligned, 0).get("genes").is_none());
        assert!(props(&aligned, 1).get("genes").is_none());
    }

    #[test]
    fn test_bad_alignment_path() {
        let err = align_properties(&cells(), &[], &AlignBy::Property(String::new())).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPath { .. }));
    }
}
