use geo::{Geometry, LineString};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::altitude::Altitude;
use crate::coordinate::{
    coord_pair_regex, parse_coordinate_sequence, parse_distance, parse_latlon_pair, COORD_PATTERN,
};
use crate::geometry::builders::{
    build_arc, build_circle, build_ellipse, build_line_corridor, build_polygon, build_sector,
};
use crate::geometry::{GeometryError, PartKind};

use super::{Recognized, Recognizer, RecognizerContext};

const DIST: &str = r"[0-9]+(?:\.[0-9]+)?\s*(?:KM|NM|M)\b";
const AZIMUTH: &str = r"[0-9]{1,3}(?:\.[0-9]+)?";
const WITHIN: &str = r"W(?:I|ITHIN)";
const CENTRE: &str = r"CENT(?:RE|ER)(?:D|ED)?(?:\s+(?:AT|ON))?";

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

static CIRCLE: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"(?:{WITHIN}\s+)?CIRCLE\s+(?:WITH\s+)?RADIUS\s+(?:OF\s+)?(?P<radius>{DIST})\s+{CENTRE}\s*\(?\s*(?P<center>{COORD_PATTERN})\s*\)?"
    ))
});

static MULTI_CIRCLE: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"{WITHIN}\s+(?P<radius>{DIST})\s+RADIUS\s+{CENTRE}\s+PSNS\s*:?(?P<positions>(?:[\s,;]*(?:AND\s+)?(?:PSN\s+)?\(?{COORD_PATTERN}\)?)+)"
    ))
});

static RADIUS_CIRCLE: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"{WITHIN}\s+(?P<radius>{DIST})\s+RADIUS\s+{CENTRE}\s+(?:PSN\s+)?\(?\s*(?P<center>{COORD_PATTERN})\s*\)?"
    ))
});

static SECTOR_CENTRE_FIRST: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"(?:{WITHIN}\s+)?SECTOR\s+(?:{CENTRE}\s+)?\(?\s*(?P<center>{COORD_PATTERN})\s*\)?\s*(?:BTN\s+)?(?:AZ(?:M|MAG|IMUTH)\s+)?(?P<start>{AZIMUTH})\s*-\s*(?P<end>{AZIMUTH})\s*DEG(?:REES)?\s+RADIUS\s+(?P<radius>{DIST})"
    ))
});

static SECTOR_FROM: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"(?:{WITHIN}\s+)?SECTOR\s+(?:BTN\s+)?(?:AZ(?:M|MAG|IMUTH)\s+)?(?P<start>{AZIMUTH})\s*-\s*(?P<end>{AZIMUTH})\s*DEG(?:REES)?\s+FROM\s+\(?\s*(?P<center>{COORD_PATTERN})\s*\)?\s+(?:WITH\s+)?RADIUS\s+(?P<radius>{DIST})"
    ))
});

static ELLIPSE: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"ELLIPSE\s+{CENTRE}\s*\(?\s*(?P<center>{COORD_PATTERN})\s*\)?\s+WITH\s+AXES\s+DIMENSIONS\s+(?P<major>[0-9]+(?:\.[0-9]+)?)\s*X\s*(?P<minor>[0-9]+(?:\.[0-9]+)?)\s*(?P<unit>KM|NM|M)\b(?:\s+AZM\s+OF\s+MAJOR\s+AXIS\s+(?P<azimuth>{AZIMUTH})\s*DEG)?"
    ))
});

static ARC: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"(?P<start>{COORD_PATTERN})\s*-?\s*(?:THEN\s+)?(?P<direction>ANTICLOCKWISE|COUNTERCLOCKWISE|CLOCKWISE)\s+(?:ALONG\s+|BY\s+)?(?:THE\s+|AN\s+)?ARC\s+(?:OF\s+(?:A\s+|THE\s+)?CIRCLE\s+)?(?:WITH\s+)?(?:A\s+)?RADIUS\s+(?:OF\s+)?(?P<radius>{DIST})\s+{CENTRE}\s*\(?\s*(?P<center>{COORD_PATTERN})\s*\)?\s+TO\s+\(?\s*(?P<end>{COORD_PATTERN})\s*\)?"
    ))
});

static CORRIDOR: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"{WITHIN}\s+(?P<width>{DIST})\s+EITHER\s+SIDE\s+OF\s+(?:THE\s+)?LINE\s+(?:JOINING\s+)?(?:POINTS\s*)?:?\s*(?P<points>{COORD_PATTERN}(?:\s*[-–]\s*{COORD_PATTERN})+)"
    ))
});

// text between vertices, a full stop only directly before the next one
const AREA_GAP: &str = r"[^.]*?(?:\.\s*)?";

// vertices may be joined by prose ("THEN ALONG STATE BORDER TO")
static AREA: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"\bAREA\b(?:\s+BOUNDED\s+BY)?\s*:?(?P<chain>{AREA_GAP}{COORD_PATTERN}(?:{AREA_GAP}{COORD_PATTERN})*)"
    ))
});

static ROUTE_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"\b(?P<route>[A-Z]{1,2}[0-9]{1,4}[A-Z]?)\s+(?P<waypoints>[A-Z]{2,5}(?:\s*-\s*[A-Z]{2,5})+)\b(?:\s+FL\s?(?P<lower>[0-9]{2,3})\s*-\s*FL\s?(?P<upper>[0-9]{2,3}))?",
    )
});

fn number(captures: &Captures, name: &str) -> Result<f64, GeometryError> {
    captures[name]
        .parse()
        .map_err(|_| GeometryError::Degenerate(format!("invalid number {}", &captures[name])))
}

fn circle(captures: &Captures, context: &RecognizerContext) -> Result<Vec<Recognized>, GeometryError> {
    let radius = parse_distance(&captures["radius"])?;
    let center = parse_latlon_pair(&captures["center"])?;
    let shape = build_circle(center, radius, context.config.circle_segments)?;
    Ok(vec![Recognized::new(shape)])
}

// one circle per listed position, sharing the radius
fn multi_circle(
    captures: &Captures,
    context: &RecognizerContext,
) -> Result<Vec<Recognized>, GeometryError> {
    let radius = parse_distance(&captures["radius"])?;
    coord_pair_regex()
        .find_iter(&captures["positions"])
        .map(|position| {
            let center = parse_latlon_pair(position.as_str())?;
            let shape = build_circle(center, radius, context.config.circle_segments)?;
            Ok(Recognized::new(shape).with_raw(format!("PSN {}", position.as_str())))
        })
        .collect()
}

fn sector(captures: &Captures, context: &RecognizerContext) -> Result<Vec<Recognized>, GeometryError> {
    let center = parse_latlon_pair(&captures["center"])?;
    let radius = parse_distance(&captures["radius"])?;
    let shape = build_sector(
        center,
        radius,
        number(captures, "start")?,
        number(captures, "end")?,
        context.config.sector_segments,
    )?;
    Ok(vec![Recognized::new(shape)])
}

fn ellipse(captures: &Captures, context: &RecognizerContext) -> Result<Vec<Recognized>, GeometryError> {
    let center = parse_latlon_pair(&captures["center"])?;
    let unit = &captures["unit"];
    let major_km = parse_distance(&format!("{}{unit}", &captures["major"]))? / 1000.0;
    let minor_km = parse_distance(&format!("{}{unit}", &captures["minor"]))? / 1000.0;
    let azimuth = match captures.name("azimuth") {
        Some(_) => number(captures, "azimuth")?,
        None => 0.0,
    };
    let shape = build_ellipse(
        center,
        major_km,
        minor_km,
        azimuth,
        context.config.ellipse_segments,
    )?;
    Ok(vec![Recognized::new(shape)])
}

fn arc(captures: &Captures, context: &RecognizerContext) -> Result<Vec<Recognized>, GeometryError> {
    let start = parse_latlon_pair(&captures["start"])?;
    let end = parse_latlon_pair(&captures["end"])?;
    let center = parse_latlon_pair(&captures["center"])?;
    let radius = parse_distance(&captures["radius"])?;
    let clockwise = &captures["direction"] == "CLOCKWISE";
    let shape = build_arc(
        center,
        radius,
        start,
        end,
        clockwise,
        context.config.arc_segments,
    )?;
    Ok(vec![Recognized::new(shape)])
}

fn corridor(captures: &Captures, context: &RecognizerContext) -> Result<Vec<Recognized>, GeometryError> {
    let half_width = parse_distance(&captures["width"])?;
    let points = parse_coordinate_sequence(&captures["points"]);
    let shape = build_line_corridor(&points, half_width, context.config.mitre_limit)?;
    Ok(vec![Recognized::new(shape)])
}

fn area(captures: &Captures, _: &RecognizerContext) -> Result<Vec<Recognized>, GeometryError> {
    let vertices = parse_coordinate_sequence(&captures["chain"]);
    if vertices.len() < 3 {
        return Ok(vec![]);
    }
    Ok(vec![Recognized::new(build_polygon(&vertices)?)])
}

fn route_segment(
    captures: &Captures,
    context: &RecognizerContext,
) -> Result<Vec<Recognized>, GeometryError> {
    let Some(waypoints) = context.waypoints else {
        return Ok(vec![]);
    };

    let points = captures["waypoints"]
        .split('-')
        .map(str::trim)
        .map(|code| {
            waypoints
                .waypoint(code)
                .ok_or_else(|| GeometryError::UnknownWaypoint(code.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut recognized = Recognized::new(Geometry::LineString(LineString::new(points)));
    if let (Some(lower), Some(upper)) = (captures.name("lower"), captures.name("upper")) {
        if let (Ok(lower), Ok(upper)) = (lower.as_str().parse(), upper.as_str().parse()) {
            recognized = recognized
                .with_altitudes(Altitude::FlightLevel(lower), Altitude::FlightLevel(upper));
        }
    }
    Ok(vec![recognized])
}

/// Built-in shapes in evaluation order. Earlier entries claim their text first.
pub(super) fn default_recognizers() -> Vec<Recognizer> {
    vec![
        Recognizer::new(PartKind::Circle, CIRCLE.clone(), circle),
        Recognizer::new(PartKind::Circle, MULTI_CIRCLE.clone(), multi_circle),
        Recognizer::new(PartKind::Circle, RADIUS_CIRCLE.clone(), circle),
        Recognizer::new(PartKind::Sector, SECTOR_CENTRE_FIRST.clone(), sector),
        Recognizer::new(PartKind::Sector, SECTOR_FROM.clone(), sector),
        Recognizer::new(PartKind::Ellipse, ELLIPSE.clone(), ellipse),
        Recognizer::new(PartKind::Arc, ARC.clone(), arc),
        Recognizer::new(PartKind::LineCorridor, CORRIDOR.clone(), corridor),
        Recognizer::new(PartKind::Polygon, AREA.clone(), area),
    ]
}

pub(super) fn route_segment_recognizer() -> Recognizer {
    Recognizer::new(PartKind::RouteSegment, ROUTE_SEGMENT.clone(), route_segment)
}
