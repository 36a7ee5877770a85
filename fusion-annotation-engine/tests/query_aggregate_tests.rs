//! End-to-end tests for composed queries and spatial aggregation.
//!
//! These cover:
//! - The Tumor / Immune scenario (query plus aggregation)
//! - Reverse-index bookkeeping across predicate combinations
//! - AND narrowing and OR broadening
//! - Aggregator pass-through for non-intersecting children
//! - Layers holding a partly non-finite geometry

mod support;

use fusion_annotation_engine::{
    find_layer, property_map_from_json, Combinator, Diagnostic, EngineConfig, Feature, Layer,
    PropertyFilter, QueryComposer, QueryResult, ReverseIndexEntry, SpatialAggregator,
    SpatialPredicate,
};
use geo_types::{line_string, Geometry, MultiLineString};
use serde_json::json;
use support::{props_json, pt, square, tumor_immune};

fn assert_bookkeeping(result: &QueryResult, layers: &[Layer]) {
    assert_eq!(result.merged_features.len(), result.reverse_index.len());
    for (feature, origin) in result.iter() {
        let layer = find_layer(layers, &origin.layer_name).unwrap();
        let source = layer.feature_by_index(origin.feature_index).unwrap();
        assert_eq!(source, feature);
    }
}

#[test]
fn test_tumor_immune_query() {
    let layers = tumor_immune();
    let config = EngineConfig::default();

    let result = QueryComposer::new()
        .include("Tumor")
        .spatial(SpatialPredicate::intersects("Immune"))
        .filter(PropertyFilter::numeric("area", 150.0, f64::MAX))
        .execute(&layers, &config)
        .unwrap();

    assert_eq!(
        result.reverse_index,
        vec![ReverseIndexEntry {
            layer_name: "Tumor".into(),
            feature_index: 1,
        }]
    );
    assert_eq!(props_json(&result.merged_features[0].properties)["area"], json!(200.0));
    assert!(result.diagnostics.is_empty());
    assert_bookkeeping(&result, &layers);
}

#[test]
fn test_tumor_immune_aggregation() {
    let layers = tumor_immune();
    let config = EngineConfig::default();
    let tumor = find_layer(&layers, "Tumor").unwrap();

    let result = SpatialAggregator::new(&layers, &config)
        .parents("Immune")
        .separate(true)
        .summarize(true)
        .aggregate(tumor.features.clone())
        .unwrap();

    let large = props_json(&result.features[1].properties);
    assert_eq!(large["area"], json!(200.0));
    assert_eq!(large["Immune"]["celltype"]["Count"], json!({"CD8": 2.0}));
    assert_eq!(large["Immune"]["Feature Count"], json!(2.0));

    let small = props_json(&result.features[0].properties);
    assert_eq!(small["Immune"]["celltype"]["Count"], json!({"CD4": 1.0}));

    // inputs untouched
    assert!(props_json(&tumor.features[1].properties).get("Immune").is_none());
}

#[test]
fn test_bookkeeping_across_combinations() {
    let layers = tumor_immune();
    let config = EngineConfig::default();
    let queries = vec![
        QueryComposer::new(),
        QueryComposer::new().spatial(SpatialPredicate::intersects("Tumor")),
        QueryComposer::new().spatial(SpatialPredicate::intersects("Immune").not()),
        QueryComposer::new()
            .spatial(SpatialPredicate::nearest("Immune", 3.0).or())
            .filter(PropertyFilter::categorical("celltype", ["CD4"]).or())
            .filter(PropertyFilter::numeric("area", 0.0, 150.0).or()),
    ];

    for query in queries {
        let result = query.execute(&layers, &config).unwrap();
        assert_bookkeeping(&result, &layers);
    }
}

#[test]
fn test_and_narrows_or_broadens() {
    let layers = tumor_immune();
    let config = EngineConfig::default();

    let base = QueryComposer::new().spatial(SpatialPredicate::intersects("Tumor"));
    let wide = base.clone().execute(&layers, &config).unwrap();
    let narrow = base
        .filter(PropertyFilter::categorical("celltype", ["CD8"]))
        .execute(&layers, &config)
        .unwrap();
    assert!(narrow.len() <= wide.len());
    assert_eq!(narrow.len(), 2);

    let single = QueryComposer::new()
        .spatial(SpatialPredicate::intersects("Immune").with_combinator(Combinator::Or))
        .execute(&layers, &config)
        .unwrap();
    let union = QueryComposer::new()
        .spatial(SpatialPredicate::intersects("Immune").or())
        .spatial(SpatialPredicate::nearest("Tumor", 1.0).or())
        .execute(&layers, &config)
        .unwrap();
    assert!(union.len() >= single.len());
    // both tumors, plus the three points lying in tumors
    assert_eq!(union.len(), 5);
}

#[test]
fn test_aggregator_passthrough() {
    let layers = tumor_immune();
    let config = EngineConfig::default();
    let children = vec![
        fusion_annotation_engine::Feature::new(
            square(500.0, 500.0, 5.0),
            fusion_annotation_engine::property_map_from_json(json!({"name": "far", "tags": ["x"]})),
            0,
        ),
        fusion_annotation_engine::Feature::new(
            pt(-100.0, -100.0),
            Default::default(),
            1,
        ),
    ];

    let result = SpatialAggregator::new(&layers, &config)
        .aggregate(children.clone())
        .unwrap();
    assert_eq!(result.features, children);
}

#[test]
fn test_json_payload_end_to_end() {
    let layers = tumor_immune();
    let query = QueryComposer::from_json(
        r#"{
            "Spatial": [{"kind": "intersects", "reference_layer": "Immune"}],
            "Filters": [{"path": "area", "range": {"low": 150, "high": 1000}}],
            "include": ["Tumor"]
        }"#,
    )
    .unwrap();
    let result = query.execute(&layers, &EngineConfig::default()).unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.reverse_index[0].feature_index, 1);
}

#[test]
fn test_wkt_layers_nearest_scaled() {
    let parse = |wkt: &str| fusion_annotation_engine::parse_wkt(wkt).unwrap();
    let layers = vec![
        Layer::from_parts(
            "Glomeruli",
            "g",
            vec![(parse("POLYGON((0 0, 4 0, 4 4, 0 4, 0 0))"), Default::default())],
        ),
        Layer::from_parts(
            "Arteries",
            "a",
            vec![(parse("LINESTRING(10 0, 10 10)"), Default::default())],
        ),
    ];

    let query = QueryComposer::new()
        .include("Glomeruli")
        .spatial(SpatialPredicate::nearest("Arteries", 3.0));

    let unscaled = query.execute(&layers, &EngineConfig::default()).unwrap();
    assert!(unscaled.is_empty());

    // 3 display units at 2 px per unit reaches the artery 6 px away
    let scaled = query
        .execute(&layers, &EngineConfig::default().with_distance_scale(2.0))
        .unwrap();
    assert_eq!(scaled.len(), 1);
}

#[test]
fn test_partly_non_finite_member_is_skipped() {
    let mut layers = tumor_immune();
    // one usable line inside the large tumor, one line with a NaN vertex
    let broken = Geometry::MultiLineString(MultiLineString::new(vec![
        line_string![(x: 52.0, y: 2.0), (x: 58.0, y: 8.0)],
        line_string![(x: 0.0, y: 0.0), (x: f64::NAN, y: 1.0)],
    ]));
    layers[1].features.push(Feature::new(
        broken,
        property_map_from_json(json!({"celltype": "B"})),
        3,
    ));
    let reported = Diagnostic::EmptyGeometry {
        layer: "Immune".into(),
        index: 3,
    };
    let config = EngineConfig::default();

    // every finite immune point lies in a tumor, and the broken one never matches
    for predicate in [
        SpatialPredicate::intersects("Tumor").not(),
        SpatialPredicate::intersects("Tumor").or(),
    ] {
        let result = QueryComposer::new()
            .include("Immune")
            .spatial(predicate)
            .execute(&layers, &config)
            .unwrap();
        assert!(result.reverse_index.iter().all(|e| e.feature_index != 3));
        assert!(result.diagnostics.iter().any(|d| *d == reported));
        assert_bookkeeping(&result, &layers);
    }

    let tumor = find_layer(&layers, "Tumor").unwrap();
    let result = SpatialAggregator::new(&layers, &config)
        .parents("Immune")
        .aggregate(tumor.features.clone())
        .unwrap();
    let large = props_json(&result.features[1].properties);
    assert_eq!(large["Immune"]["Feature Count"], json!(2.0));
    assert_eq!(large["Immune"]["celltype"]["Count"], json!({"CD8": 2.0}));
    assert!(result.diagnostics.iter().any(|d| *d == reported));
}
