use geo::orient::{Direction, Orient};
use geo::algorithm::buffer::{Buffer, BufferStyle, LineJoin};
use geo::{unary_union, Area, Centroid, Coord, LineString, Polygon, Validation};
use itertools::Itertools;
use tracing::{debug, warn};

use super::projection::LocalProjection;
use super::GeometryError;

const MIN_CIRCLE_QUADRANT_SEGMENTS: usize = 16;
const MIN_ARC_STEPS: usize = 8;

// planar offset from the projection origin along a true bearing
fn polar(distance: f64, bearing_deg: f64) -> Coord {
    let (sin, cos) = bearing_deg.to_radians().sin_cos();
    Coord {
        x: distance * sin,
        y: distance * cos,
    }
}

fn bearing_of(local: Coord) -> f64 {
    local.x.atan2(local.y).to_degrees().rem_euclid(360.0)
}

fn check_distance(what: &str, distance: f64) -> Result<(), GeometryError> {
    if distance.is_finite() && distance > 0.0 {
        Ok(())
    } else {
        Err(GeometryError::Degenerate(format!(
            "{what} must be positive, got {distance}"
        )))
    }
}

fn largest(polygons: impl IntoIterator<Item = Polygon>) -> Option<Polygon> {
    polygons
        .into_iter()
        .max_by(|a, b| a.unsigned_area().total_cmp(&b.unsigned_area()))
}

/// Validates and orients a polygon, repairing self intersections by dissolving it.
fn finish(polygon: Polygon) -> Result<Polygon, GeometryError> {
    if polygon.is_valid() {
        return Ok(polygon.orient(Direction::Default));
    }

    warn!(
        "repairing invalid polygon with {} vertices",
        polygon.exterior().0.len()
    );
    largest(unary_union([&polygon]))
        .filter(|repaired| repaired.unsigned_area() > 0.0)
        .map(|repaired| repaired.orient(Direction::Default))
        .ok_or_else(|| GeometryError::Degenerate("polygon has no area".to_string()))
}

fn wedge(projection: &LocalProjection, arc: impl Iterator<Item = Coord>) -> Polygon {
    let origin = Coord { x: 0.0, y: 0.0 };
    let ring = std::iter::once(origin)
        .chain(arc)
        .chain(std::iter::once(origin))
        .collect::<Vec<_>>();
    projection.unproject(&Polygon::new(LineString::new(ring), vec![]))
}

/// Closed polygon through `vertices`, in the given order.
pub fn build_polygon(vertices: &[Coord]) -> Result<Polygon, GeometryError> {
    let mut ring = vertices.iter().copied().dedup().collect::<Vec<_>>();
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }

    let distinct = ring
        .iter()
        .enumerate()
        .filter(|(i, coord)| !ring[..*i].contains(coord))
        .count();
    if distinct < 3 {
        return Err(GeometryError::InsufficientVertices(distinct));
    }

    finish(Polygon::new(LineString::new(ring), vec![]))
}

/// Circle of `radius_m` metres, `segments` controlling the total vertex count.
pub fn build_circle(center: Coord, radius_m: f64, segments: usize) -> Result<Polygon, GeometryError> {
    check_distance("radius", radius_m)?;
    let steps = 4 * (segments / 4).max(MIN_CIRCLE_QUADRANT_SEGMENTS);
    let projection = LocalProjection::new(center);

    let ring = (0..steps)
        .map(|i| polar(radius_m, 360.0 * i as f64 / steps as f64))
        .collect::<Vec<_>>();

    finish(projection.unproject(&Polygon::new(LineString::new(ring), vec![])))
}

/// Clockwise angular extent from `start` to `end` in `[0, 360)`.
pub fn sector_span(az_start_deg: f64, az_end_deg: f64) -> f64 {
    (az_end_deg.rem_euclid(360.0) - az_start_deg.rem_euclid(360.0)).rem_euclid(360.0)
}

/// Pie slice swept clockwise from `az_start_deg` to `az_end_deg`.
///
/// A zero span degenerates to the full circle.
pub fn build_sector(
    center: Coord,
    radius_m: f64,
    az_start_deg: f64,
    az_end_deg: f64,
    segments: usize,
) -> Result<Polygon, GeometryError> {
    check_distance("radius", radius_m)?;
    let span = sector_span(az_start_deg, az_end_deg);
    if span < 1e-9 {
        debug!("sector {az_start_deg}-{az_end_deg} has no span, building full circle");
        return build_circle(center, radius_m, segments);
    }

    let steps = ((segments as f64 * span / 360.0) as usize).max(MIN_ARC_STEPS);
    let start = az_start_deg.rem_euclid(360.0);
    let projection = LocalProjection::new(center);
    let arc = (0..=steps).map(|i| polar(radius_m, start + span * i as f64 / steps as f64));

    finish(wedge(&projection, arc))
}

/// Ellipse with full axis lengths in kilometres, major axis rotated clockwise from north.
pub fn build_ellipse(
    center: Coord,
    major_axis_km: f64,
    minor_axis_km: f64,
    azimuth_deg: f64,
    segments: usize,
) -> Result<Polygon, GeometryError> {
    check_distance("major axis", major_axis_km)?;
    check_distance("minor axis", minor_axis_km)?;
    let semi_major = major_axis_km * 1000.0 / 2.0;
    let semi_minor = minor_axis_km * 1000.0 / 2.0;
    let steps = segments.max(MIN_CIRCLE_QUADRANT_SEGMENTS);
    let (sin_az, cos_az) = azimuth_deg.to_radians().sin_cos();
    let projection = LocalProjection::new(center);

    let ring = (0..steps)
        .map(|i| {
            let t = std::f64::consts::TAU * i as f64 / steps as f64;
            // major axis along north before rotation
            let x = semi_minor * t.sin();
            let y = semi_major * t.cos();
            Coord {
                x: x * cos_az + y * sin_az,
                y: -x * sin_az + y * cos_az,
            }
        })
        .collect::<Vec<_>>();

    finish(projection.unproject(&Polygon::new(LineString::new(ring), vec![])))
}

/// Signed sweep from `start` to `end` bearing. Clockwise sweeps are positive.
/// Equal bearings sweep the full circle.
pub fn arc_sweep(start_deg: f64, end_deg: f64, clockwise: bool) -> f64 {
    let diff = end_deg - start_deg;
    if clockwise && diff <= 0.0 {
        diff + 360.0
    } else if !clockwise && diff >= 0.0 {
        diff - 360.0
    } else {
        diff
    }
}

/// Wedge bounded by the arc from `start` to `end` around `center` and the two radials.
pub fn build_arc(
    center: Coord,
    radius_m: f64,
    start: Coord,
    end: Coord,
    clockwise: bool,
    segments: usize,
) -> Result<Polygon, GeometryError> {
    check_distance("radius", radius_m)?;
    let projection = LocalProjection::new(center);
    let start_bearing = bearing_of(projection.forward(start));
    let end_bearing = bearing_of(projection.forward(end));
    let sweep = arc_sweep(start_bearing, end_bearing, clockwise);

    let steps = ((segments as f64 * sweep.abs() / 360.0) as usize).max(MIN_ARC_STEPS);
    let arc = (0..=steps)
        .map(|i| polar(radius_m, start_bearing + sweep * i as f64 / steps as f64));

    finish(wedge(&projection, arc))
}

/// Buffer of `half_width_m` around the polyline through `points`, with mitred joins.
pub fn build_line_corridor(
    points: &[Coord],
    half_width_m: f64,
    mitre_limit: f64,
) -> Result<Polygon, GeometryError> {
    check_distance("corridor width", half_width_m)?;
    let points = points.iter().copied().dedup().collect::<Vec<_>>();
    if points.len() < 2 {
        return Err(GeometryError::InsufficientVertices(points.len()));
    }

    let line = LineString::new(points);
    let center = line
        .centroid()
        .ok_or_else(|| GeometryError::Degenerate("corridor line has no centroid".to_string()))?;
    let projection = LocalProjection::new(center.0);

    let style = BufferStyle::new(half_width_m).line_join(LineJoin::Miter(mitre_limit));
    let buffered = projection.project(&line).buffer_with_style(style);

    let polygon = largest(buffered)
        .ok_or_else(|| GeometryError::Degenerate("corridor buffer is empty".to_string()))?;
    finish(projection.unproject(&polygon))
}
