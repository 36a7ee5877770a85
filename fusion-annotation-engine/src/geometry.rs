//! Geometry helpers.
//!
//! This module provides:
//! - WKT parsing (used by adapters, tests, and benches)
//! - Axis-aligned bounding boxes for index prefiltering
//! - Degenerate/empty geometry detection
//! - Exact relation and distance checks backed by the `geo` crate

use crate::error::{EngineError, Result};
use geo::{Area, BooleanOps, BoundingRect, CoordsIter, Distance, Euclidean, Intersects, Relate};
use geo_types::{Coord, Geometry, LineString, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in the geometry's own units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Check if this bbox intersects another.
    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Whether every bound is a finite number.
    pub fn is_finite(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
    }

    /// Grow the box by `distance` on every side.
    pub fn expanded(&self, distance: f64) -> Self {
        Self {
            min_x: self.min_x - distance,
            min_y: self.min_y - distance,
            max_x: self.max_x + distance,
            max_y: self.max_y + distance,
        }
    }

    /// Compute from a geo-types Geometry.
    pub fn from_geometry(geom: &Geometry<f64>) -> Option<Self> {
        let rect = geom.bounding_rect()?;
        Some(Self {
            min_x: rect.min().x,
            min_y: rect.min().y,
            max_x: rect.max().x,
            max_y: rect.max().y,
        })
    }

    pub fn lower(&self) -> [f64; 2] {
        [self.min_x, self.min_y]
    }

    pub fn upper(&self) -> [f64; 2] {
        [self.max_x, self.max_y]
    }
}

/// Whether a geometry is empty or too degenerate to take part in spatial
/// matching: no coordinates, a non-finite coordinate anywhere (including
/// inside one member of a multi-geometry), a line with fewer than two
/// points, or a polygon whose exterior ring has fewer than three distinct
/// vertices. A multi-geometry is empty when all of its members are.
pub fn is_empty_geometry(geom: &Geometry<f64>) -> bool {
    if geom.coords_iter().any(|c| !coord_is_finite(&c)) {
        return true;
    }
    match geom {
        Geometry::Point(_) | Geometry::Line(_) | Geometry::Rect(_) | Geometry::Triangle(_) => false,
        Geometry::LineString(ls) => line_is_degenerate(ls),
        Geometry::Polygon(poly) => polygon_is_degenerate(poly),
        Geometry::MultiPoint(mp) => mp.0.is_empty(),
        Geometry::MultiLineString(mls) => mls.0.iter().all(line_is_degenerate),
        Geometry::MultiPolygon(mp) => mp.0.iter().all(polygon_is_degenerate),
        Geometry::GeometryCollection(gc) => gc.0.iter().all(is_empty_geometry),
    }
}

fn coord_is_finite(c: &Coord<f64>) -> bool {
    c.x.is_finite() && c.y.is_finite()
}

fn line_is_degenerate(ls: &LineString<f64>) -> bool {
    ls.0.len() < 2
}

fn polygon_is_degenerate(poly: &Polygon<f64>) -> bool {
    let ring = &poly.exterior().0;
    let mut distinct: Vec<&Coord<f64>> = Vec::with_capacity(ring.len());
    for c in ring {
        if !distinct.contains(&c) {
            distinct.push(c);
        }
        if distinct.len() >= 3 {
            return false;
        }
    }
    true
}

/// Minimum Euclidean distance between two geometries (zero when they
/// intersect).
pub fn min_distance(a: &Geometry<f64>, b: &Geometry<f64>) -> f64 {
    if a.intersects(b) {
        return 0.0;
    }
    Euclidean.distance(a, b)
}

/// Area shared by two geometries. Zero unless both are polygonal.
pub fn intersection_area(a: &Geometry<f64>, b: &Geometry<f64>) -> f64 {
    match (polygonal(a), polygonal(b)) {
        (Some(a), Some(b)) => a.intersection(&b).unsigned_area(),
        _ => 0.0,
    }
}

fn polygonal(geom: &Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geom {
        Geometry::Polygon(poly) => Some(MultiPolygon::new(vec![poly.clone()])),
        Geometry::MultiPolygon(mp) => Some(mp.clone()),
        Geometry::Rect(r) => Some(MultiPolygon::new(vec![r.to_polygon()])),
        Geometry::Triangle(t) => Some(MultiPolygon::new(vec![t.to_polygon()])),
        _ => None,
    }
}

/// DE-9IM relation tests offered by spatial predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Intersects,
    Within,
    Contains,
    Touches,
    Overlaps,
    Crosses,
}

/// Evaluate `candidate <relation> reference`.
pub fn relates(candidate: &Geometry<f64>, reference: &Geometry<f64>, relation: Relation) -> bool {
    match relation {
        Relation::Intersects => candidate.intersects(reference),
        other => {
            let matrix = candidate.relate(reference);
            match other {
                Relation::Within => matrix.is_within(),
                Relation::Contains => matrix.is_contains(),
                Relation::Touches => matrix.is_touches(),
                Relation::Overlaps => matrix.is_overlaps(),
                Relation::Crosses => matrix.is_crosses(),
                Relation::Intersects => matrix.is_intersects(),
            }
        }
    }
}

/// Parse WKT string to geo-types Geometry.
pub fn parse_wkt(wkt: &str) -> Result<Geometry<f64>> {
    use wkt::TryFromWkt;
    Geometry::<f64>::try_from_wkt_str(wkt).map_err(|e| EngineError::WktParse(format!("{:?}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{line_string, point, polygon, MultiLineString, MultiPoint};

    fn square(x0: f64, y0: f64, size: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
        ])
    }

    #[test]
    fn test_parse_polygon() {
        let geom = parse_wkt("POLYGON((0 0, 1 0, 1 1, 0 1, 0 0))").unwrap();
        assert!(matches!(geom, Geometry::Polygon(_)));
        assert!(matches!(parse_wkt("POLYGON((0 0"), Err(EngineError::WktParse(_))));
    }

    #[test]
    fn test_bbox_computation() {
        let geom = parse_wkt("POLYGON((0 0, 10 0, 10 20, 0 20, 0 0))").unwrap();
        let bbox = BBox::from_geometry(&geom).unwrap();
        assert_eq!(bbox, BBox::new(0.0, 0.0, 10.0, 20.0));
        assert_eq!(bbox.expanded(1.0), BBox::new(-1.0, -1.0, 11.0, 21.0));
        assert!(bbox.intersects(&BBox::new(10.0, 20.0, 30.0, 30.0)));
        assert!(!bbox.intersects(&BBox::new(10.5, 0.0, 30.0, 30.0)));
    }

    #[test]
    fn test_empty_geometry_detection() {
        assert!(!is_empty_geometry(&square(0.0, 0.0, 1.0)));
        assert!(!is_empty_geometry(&Geometry::Point(point!(x: 1.0, y: 2.0))));

        let flat = Geometry::Polygon(polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)]);
        assert!(is_empty_geometry(&flat));
        assert!(is_empty_geometry(&Geometry::Point(point!(x: f64::NAN, y: 0.0))));
        assert!(is_empty_geometry(&Geometry::MultiPoint(MultiPoint::new(vec![]))));

        // one usable member does not rescue a member with a NaN coordinate
        let mixed = Geometry::MultiLineString(MultiLineString::new(vec![
            line_string![(x: f64::NAN, y: f64::NAN), (x: f64::NAN, y: 2.0)],
            line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)],
        ]));
        assert!(is_empty_geometry(&mixed));
        let mixed_polys = Geometry::MultiPolygon(MultiPolygon::new(vec![
            polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)],
            polygon![(x: f64::INFINITY, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)],
        ]));
        assert!(is_empty_geometry(&mixed_polys));
        assert!(is_empty_geometry(&Geometry::GeometryCollection(
            geo_types::GeometryCollection::new_from(vec![
                Geometry::Point(point!(x: 0.0, y: 0.0)),
                Geometry::Point(point!(x: 0.0, y: f64::NAN)),
            ])
        )));
    }

    #[test]
    fn test_min_distance() {
        let a = square(0.0, 0.0, 10.0);
        let inside = Geometry::Point(point!(x: 5.0, y: 5.0));
        let outside = Geometry::Point(point!(x: 13.0, y: 14.0));
        assert_eq!(min_distance(&inside, &a), 0.0);
        assert!((min_distance(&outside, &a) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_intersection_area() {
        let a = square(0.0, 0.0, 10.0);
        let b = square(5.0, 5.0, 10.0);
        assert!((intersection_area(&a, &b) - 25.0).abs() < 1e-9);
        assert_eq!(intersection_area(&a, &square(20.0, 20.0, 1.0)), 0.0);
        assert_eq!(intersection_area(&a, &Geometry::Point(point!(x: 1.0, y: 1.0))), 0.0);
    }

    #[test]
    fn test_relations() {
        let big = square(0.0, 0.0, 10.0);
        let small = square(2.0, 2.0, 2.0);
        let adjacent = square(10.0, 0.0, 5.0);
        let straddling = square(8.0, 8.0, 4.0);

        assert!(relates(&small, &big, Relation::Within));
        assert!(relates(&big, &small, Relation::Contains));
        assert!(relates(&adjacent, &big, Relation::Touches));
        assert!(!relates(&adjacent, &big, Relation::Overlaps));
        assert!(relates(&straddling, &big, Relation::Overlaps));
        assert!(relates(&adjacent, &big, Relation::Intersects));

        let line = parse_wkt("LINESTRING(-5 5, 15 5)").unwrap();
        assert!(relates(&line, &big, Relation::Crosses));
    }
}
