//! Flattening and schema discovery properties.

mod support;

use fusion_annotation_engine::{
    discover_schema, property_map_from_json, renest, EngineConfig, Flattener, Layer,
    PropertyValue, SchemaEntry,
};
use serde_json::json;
use support::{pt, tumor_immune};

fn nested() -> fusion_annotation_engine::PropertyMap {
    property_map_from_json(json!({
        "area": 12.5,
        "Main": {
            "Sub": {"a": 1, "b": "x"},
            "list": [3, {"deep": true}, "y"],
        },
        "flag": false,
    }))
}

#[test]
fn test_flatten_idempotent() {
    let flattener = Flattener::new(4);
    let props = nested();
    let first = flattener.flatten(&props);
    let second = flattener.flatten(&props);
    assert_eq!(first.entries(), second.entries());
    assert!(first.collisions().is_empty());
}

#[test]
fn test_renest_round_trip() {
    let flattener = Flattener::new(4);
    let flat = flattener.flatten(&nested());
    let rebuilt = renest(
        flat.iter()
            .map(|e| (e.path.clone(), PropertyValue::from(e.value.clone()))),
    );
    let again = flattener.flatten(&rebuilt);

    let mut before: Vec<_> = flat.iter().map(|e| (e.key.clone(), e.value.clone())).collect();
    let mut after: Vec<_> = again.iter().map(|e| (e.key.clone(), e.value.clone())).collect();
    before.sort_by(|a, b| a.0.cmp(&b.0));
    after.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(before, after);
}

#[test]
fn test_schema_monotonic_in_any_order() {
    let values = [
        json!(5), json!("a"), json!(-2), json!(5), json!(11), json!("b"), json!(true), json!("a"),
    ];

    // forward, reverse, and an interleaved order
    let orders: Vec<Vec<usize>> = vec![
        (0..values.len()).collect(),
        (0..values.len()).rev().collect(),
        vec![3, 0, 7, 4, 1, 6, 2, 5],
    ];

    for order in orders {
        let mut entry = SchemaEntry::default();
        let mut last = entry.clone();
        for &i in &order {
            match &values[i] {
                serde_json::Value::Number(n) => {
                    entry.observe_number(n.as_f64().unwrap());
                }
                serde_json::Value::String(s) => {
                    entry.observe_category(s.clone());
                }
                serde_json::Value::Bool(b) => {
                    entry.observe_category(b.to_string());
                }
                _ => unreachable!(),
            }

            assert!(entry.distinct_count >= last.distinct_count);
            if let (Some(prev), Some(now)) = (last.numeric, entry.numeric) {
                assert!(now.min <= prev.min);
                assert!(now.max >= prev.max);
            }
            last = entry.clone();
        }

        let range = entry.numeric.unwrap();
        assert_eq!((range.min, range.max), (-2.0, 11.0));
        assert_eq!(entry.unique_values.as_ref().unwrap().len(), 3);
    }
}

#[test]
fn test_discover_schema_across_layers() {
    let mut layers = tumor_immune();
    layers.push(Layer::from_parts(
        "Spots",
        "spots-1",
        vec![(
            pt(1.0, 1.0),
            property_map_from_json(json!({"area": "unknown", "_id": "s1", "Main": {"gene": 3}})),
        )],
    ));

    let schema = discover_schema(&layers, &EngineConfig::default());
    assert_eq!(schema.layer_names, vec!["Tumor", "Immune", "Spots"]);
    assert!(schema.all_paths.contains("Main --> gene"));
    assert!(!schema.all_paths.contains("_id"));

    let area = schema.get("area").unwrap();
    assert_eq!(area.numeric.unwrap().max, 200.0);
    assert!(area.unique_values.as_ref().unwrap().contains("unknown"));
    assert_eq!(schema.diagnostics.len(), 1);

    let celltype = schema.filter_for("celltype", Default::default()).unwrap();
    assert!(celltype.validate().is_ok());
}
