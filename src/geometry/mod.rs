use geo::{
    unary_union, Geometry, GeometryCollection, LineString, MultiLineString, MultiPolygon, Polygon,
    Validation,
};
use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::warn;

use crate::altitude::Altitude;

pub mod builders;
pub mod projection;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("invalid coordinate token: {0}")]
    InvalidCoordinate(String),
    #[error("could not parse coordinate pair: {0}")]
    InvalidCoordinatePair(String),
    #[error("could not parse distance: {0}")]
    InvalidDistance(String),
    #[error("polygon needs at least 3 distinct vertices, got {0}")]
    InsufficientVertices(usize),
    #[error("degenerate geometry: {0}")]
    Degenerate(String),
    #[error("unknown waypoint {0}")]
    UnknownWaypoint(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartKind {
    Polygon,
    Circle,
    Sector,
    Ellipse,
    Arc,
    LineCorridor,
    RouteSegment,
}

/// One shape recognised in the E) body together with its vertical extent.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GeometryPart {
    pub kind: PartKind,
    #[serde(serialize_with = "serialize_geometry")]
    pub shape: Geometry,
    #[serde(rename = "alt_from")]
    pub altitude_from: Altitude,
    #[serde(rename = "alt_to")]
    pub altitude_to: Altitude,
    /// Ordinal of the numbered sub-area the shape was found in.
    pub index: usize,
    pub raw: String,
}

pub(crate) fn serialize_geometry<S>(geometry: &Geometry, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    geojson::Geometry::new(geojson::Value::from(geometry)).serialize(serializer)
}

pub(crate) fn serialize_optional_geometry<S>(
    geometry: &Option<Geometry>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    geometry
        .as_ref()
        .map(|geometry| geojson::Geometry::new(geojson::Value::from(geometry)))
        .serialize(serializer)
}

fn collection(parts: &[GeometryPart]) -> Geometry {
    Geometry::GeometryCollection(GeometryCollection::new_from(
        parts.iter().map(|part| part.shape.clone()).collect(),
    ))
}

fn union_polygons(parts: &[GeometryPart], polygons: Vec<Polygon>) -> Geometry {
    if let Some(invalid) = parts.iter().find(|part| !part.shape.is_valid()) {
        warn!(
            "not merging invalid {:?} part {:?}, keeping parts separate",
            invalid.kind, invalid.raw
        );
        return collection(parts);
    }

    let MultiPolygon(mut merged) = unary_union(&polygons);
    match merged.len() {
        0 => {
            warn!("union of {} polygons is empty, keeping parts separate", polygons.len());
            collection(parts)
        }
        1 => Geometry::Polygon(merged.remove(0)),
        _ => Geometry::MultiPolygon(MultiPolygon(merged)),
    }
}

/// Combines all parts of a NOTAM into a single shape.
///
/// Polygonal parts are dissolved into a `Polygon` or `MultiPolygon`, linear
/// parts become a `(Multi)LineString`, anything mixed a `GeometryCollection`.
pub fn merge_parts(parts: &[GeometryPart]) -> Option<Geometry> {
    match parts {
        [] => return None,
        [part] => return Some(part.shape.clone()),
        _ => (),
    }

    let mut polygons = Vec::new();
    let mut lines: Vec<LineString> = Vec::new();
    let mut other = false;
    for part in parts {
        match &part.shape {
            Geometry::Polygon(polygon) => polygons.push(polygon.clone()),
            Geometry::MultiPolygon(MultiPolygon(multi)) => polygons.extend(multi.iter().cloned()),
            Geometry::LineString(line) => lines.push(line.clone()),
            Geometry::MultiLineString(MultiLineString(multi)) => {
                lines.extend(multi.iter().cloned());
            }
            _ => other = true,
        }
    }

    Some(match (polygons.is_empty(), lines.is_empty(), other) {
        (false, true, false) => union_polygons(parts, polygons),
        (true, false, false) if lines.len() == 1 => Geometry::LineString(lines.remove(0)),
        (true, false, false) => Geometry::MultiLineString(MultiLineString(lines)),
        _ => collection(parts),
    })
}

#[cfg(test)]
mod test {
    use geo::{coord, line_string, Area, Geometry, Polygon};
    use pretty_assertions_sorted::assert_eq_sorted;
    use serde_json::json;

    use super::builders::{build_circle, build_polygon};
    use super::{merge_parts, GeometryPart, PartKind};
    use crate::altitude::Altitude;

    fn part(kind: PartKind, shape: Geometry, index: usize) -> GeometryPart {
        GeometryPart {
            kind,
            shape,
            altitude_from: Altitude::Surface,
            altitude_to: Altitude::FlightLevel(100),
            index,
            raw: String::new(),
        }
    }

    fn square(x: f64, y: f64, size: f64) -> Polygon {
        build_polygon(&[
            coord! { x: x, y: y },
            coord! { x: x + size, y: y },
            coord! { x: x + size, y: y + size },
            coord! { x: x, y: y + size },
        ])
        .unwrap()
    }

    #[test]
    fn test_no_parts() {
        assert_eq!(merge_parts(&[]), None);
    }

    #[test]
    fn test_single_part_passes_through() {
        let circle = build_circle(coord! { x: 30.0, y: 60.0 }, 1000.0, 128).unwrap();
        let merged = merge_parts(&[part(PartKind::Circle, circle.clone().into(), 0)]);
        assert_eq!(merged, Some(Geometry::Polygon(circle)));
    }

    #[test]
    fn test_disjoint_polygons() {
        let merged = merge_parts(&[
            part(PartKind::Polygon, square(30.0, 60.0, 0.1).into(), 0),
            part(PartKind::Polygon, square(31.0, 60.0, 0.1).into(), 1),
        ]);
        let Some(Geometry::MultiPolygon(multi)) = merged else {
            panic!("expected MultiPolygon, got {merged:?}");
        };
        assert_eq!(multi.0.len(), 2);
    }

    #[test]
    fn test_overlapping_polygons_dissolve() {
        let merged = merge_parts(&[
            part(PartKind::Polygon, square(30.0, 60.0, 0.2).into(), 0),
            part(PartKind::Polygon, square(30.1, 60.0, 0.2).into(), 1),
        ]);
        let Some(Geometry::Polygon(polygon)) = merged else {
            panic!("expected Polygon, got {merged:?}");
        };
        assert!((polygon.unsigned_area() - 0.06).abs() < 1e-6);
    }

    #[test]
    fn test_lines() {
        let merged = merge_parts(&[
            part(
                PartKind::RouteSegment,
                line_string![(x: 30.0, y: 60.0), (x: 31.0, y: 60.0)].into(),
                0,
            ),
            part(
                PartKind::RouteSegment,
                line_string![(x: 30.0, y: 61.0), (x: 31.0, y: 61.0)].into(),
                0,
            ),
        ]);
        assert!(matches!(merged, Some(Geometry::MultiLineString(ref multi)) if multi.0.len() == 2));
    }

    #[test]
    fn test_mixed_parts() {
        let merged = merge_parts(&[
            part(PartKind::Polygon, square(30.0, 60.0, 0.1).into(), 0),
            part(
                PartKind::RouteSegment,
                line_string![(x: 30.0, y: 61.0), (x: 31.0, y: 61.0)].into(),
                1,
            ),
        ]);
        assert!(matches!(merged, Some(Geometry::GeometryCollection(ref gc)) if gc.0.len() == 2));
    }

    #[test]
    fn test_part_serialization() {
        let line = part(
            PartKind::RouteSegment,
            line_string![(x: 30.0, y: 60.0), (x: 31.0, y: 60.0)].into(),
            2,
        );
        assert_eq_sorted!(
            serde_json::to_value(&line).unwrap(),
            json!({
                "kind": "ROUTE_SEGMENT",
                "shape": {"type": "LineString", "coordinates": [[30.0, 60.0], [31.0, 60.0]]},
                "alt_from": {"type": "SFC"},
                "alt_to": {"type": "ALT", "unit": "FL", "value": 100},
                "index": 2,
                "raw": "",
            })
        );
    }
}
