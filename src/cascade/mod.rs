//! Geometry inference from the free text of the E) clause.
//!
//! The body is split into numbered sub-areas, each of which is matched against an
//! ordered list of [`Recognizer`]s. A recognizer only gets text no earlier
//! recognizer has claimed, and a sub-area without any recognised shape falls back
//! to treating every coordinate in it as a polygon vertex.

use std::fmt;
use std::ops::Range;

use geo::Geometry;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::{debug, trace};

use crate::altitude::Altitude;
use crate::config::GeometryConfig;
use crate::coordinate::parse_coordinate_sequence;
use crate::geometry::builders::build_polygon;
use crate::geometry::{GeometryError, GeometryPart, PartKind};
use crate::lookup::WaypointLookup;

mod patterns;

static NUMBERED_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*[0-9]{1,2}\.\s*").unwrap());

/// Everything a recognizer may consult besides its own match.
pub struct RecognizerContext<'a> {
    pub config: &'a GeometryConfig,
    pub waypoints: Option<&'a (dyn WaypointLookup + Send + Sync)>,
}

/// Shape produced by a recognizer.
#[derive(Clone, Debug, PartialEq)]
pub struct Recognized {
    pub shape: Geometry,
    /// Overrides the matched text as the part's `raw`.
    pub raw: Option<String>,
    /// Overrides the F)/G) limits for this part.
    pub altitudes: Option<(Altitude, Altitude)>,
}

impl Recognized {
    pub fn new(shape: impl Into<Geometry>) -> Self {
        Self {
            shape: shape.into(),
            raw: None,
            altitudes: None,
        }
    }

    #[must_use]
    pub fn with_raw(mut self, raw: String) -> Self {
        self.raw = Some(raw);
        self
    }

    #[must_use]
    pub fn with_altitudes(mut self, lower: Altitude, upper: Altitude) -> Self {
        self.altitudes = Some((lower, upper));
        self
    }
}

pub type BuildFn =
    fn(&Captures, &RecognizerContext) -> Result<Vec<Recognized>, GeometryError>;

pub struct Recognizer {
    kind: PartKind,
    pattern: Regex,
    build: BuildFn,
}

impl Recognizer {
    pub fn new(kind: PartKind, pattern: Regex, build: BuildFn) -> Self {
        Self {
            kind,
            pattern,
            build,
        }
    }

    pub fn kind(&self) -> PartKind {
        self.kind
    }
}

impl fmt::Debug for Recognizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recognizer")
            .field("kind", &self.kind)
            .field("pattern", &self.pattern.as_str())
            .finish_non_exhaustive()
    }
}

pub struct Cascade {
    config: GeometryConfig,
    recognizers: Vec<Recognizer>,
    waypoints: Option<Box<dyn WaypointLookup + Send + Sync>>,
}

impl Default for Cascade {
    fn default() -> Self {
        Self::new(GeometryConfig::default())
    }
}

impl fmt::Debug for Cascade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cascade")
            .field("config", &self.config)
            .field("recognizers", &self.recognizers)
            .field("waypoints", &self.waypoints.is_some())
            .finish()
    }
}

impl Cascade {
    pub fn new(config: GeometryConfig) -> Self {
        Self {
            config,
            recognizers: patterns::default_recognizers(),
            waypoints: None,
        }
    }

    /// Enables ATS route segment recognition (`<route> <WPT>-<WPT> [FLxxx-FLyyy]`).
    #[must_use]
    pub fn with_waypoints(mut self, waypoints: impl WaypointLookup + Send + Sync + 'static) -> Self {
        if self.waypoints.is_none() {
            self.recognizers.push(patterns::route_segment_recognizer());
        }
        self.waypoints = Some(Box::new(waypoints));
        self
    }

    /// Appends a recognizer, evaluated after all present ones.
    pub fn push(&mut self, recognizer: Recognizer) {
        self.recognizers.push(recognizer);
    }

    pub fn config(&self) -> &GeometryConfig {
        &self.config
    }

    pub fn recognizers(&self) -> &[Recognizer] {
        &self.recognizers
    }

    /// Runs all recognizers over `body`. Shapes that fail to build are skipped.
    pub fn parts(&self, body: &str, lower: &Altitude, upper: &Altitude) -> Vec<GeometryPart> {
        let context = RecognizerContext {
            config: &self.config,
            waypoints: self.waypoints.as_deref(),
        };

        split_subareas(body)
            .iter()
            .enumerate()
            .flat_map(|(i, subarea)| {
                self.subarea_parts(i + 1, &flatten(subarea), &context, lower, upper)
            })
            .collect()
    }

    fn subarea_parts(
        &self,
        index: usize,
        text: &str,
        context: &RecognizerContext,
        lower: &Altitude,
        upper: &Altitude,
    ) -> Vec<GeometryPart> {
        let mut claimed: Vec<Range<usize>> = Vec::new();
        let mut parts = Vec::new();

        for recognizer in &self.recognizers {
            for captures in recognizer.pattern.captures_iter(text) {
                let Some(matched) = captures.get(0) else {
                    continue;
                };
                let span = matched.range();
                if claimed
                    .iter()
                    .any(|other| other.start < span.end && span.start < other.end)
                {
                    trace!(
                        "{:?} match {:?} overlaps an earlier shape",
                        recognizer.kind,
                        matched.as_str()
                    );
                    continue;
                }

                match (recognizer.build)(&captures, context) {
                    Ok(shapes) if shapes.is_empty() => (),
                    Ok(shapes) => {
                        claimed.push(span);
                        parts.extend(shapes.into_iter().map(|recognized| {
                            let (altitude_from, altitude_to) = recognized
                                .altitudes
                                .unwrap_or_else(|| (lower.clone(), upper.clone()));
                            GeometryPart {
                                kind: recognizer.kind,
                                shape: recognized.shape,
                                altitude_from,
                                altitude_to,
                                index,
                                raw: recognized
                                    .raw
                                    .unwrap_or_else(|| matched.as_str().to_string()),
                            }
                        }));
                    }
                    Err(e) => debug!(
                        "skipping {:?} {:?}: {e}",
                        recognizer.kind,
                        matched.as_str()
                    ),
                }
            }
        }

        if parts.is_empty() {
            let vertices = parse_coordinate_sequence(text);
            if vertices.len() >= 3 {
                match build_polygon(&vertices) {
                    Ok(polygon) => parts.push(GeometryPart {
                        kind: PartKind::Polygon,
                        shape: polygon.into(),
                        altitude_from: lower.clone(),
                        altitude_to: upper.clone(),
                        index,
                        raw: text.to_string(),
                    }),
                    Err(e) => debug!("no fallback polygon for sub-area {index}: {e}"),
                }
            }
        }

        parts
    }
}

fn numbered_item(line: &str) -> Option<&str> {
    let prefix = NUMBERED_ITEM.find(line)?;
    let rest = &line[prefix.end()..];
    // "0.5KM" is a distance, not an item number
    (!rest.starts_with(|c: char| c.is_ascii_digit())).then_some(rest)
}

/// Splits a body on lines starting with `1.`, `2.`, ... dropping any preamble.
/// A body without numbered items is a single sub-area.
pub fn split_subareas(body: &str) -> Vec<String> {
    let mut subareas: Vec<String> = Vec::new();
    for line in body.lines() {
        if let Some(rest) = numbered_item(line) {
            subareas.push(rest.to_string());
        } else if let Some(current) = subareas.last_mut() {
            current.push('\n');
            current.push_str(line);
        }
    }

    if subareas.is_empty() {
        return vec![body.trim().to_string()];
    }
    subareas
        .into_iter()
        .map(|subarea| subarea.trim().to_string())
        .collect()
}

fn flatten(text: &str) -> String {
    text.to_uppercase().split_whitespace().join(" ")
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use geo::{coord, Area, Centroid, Geometry, Validation};
    use pretty_assertions_sorted::assert_eq_sorted;
    use regex::Regex;

    use super::{split_subareas, Cascade, Recognized, Recognizer};
    use crate::altitude::{parse_altitude, Altitude};
    use crate::geometry::builders::build_circle;
    use crate::geometry::{merge_parts, GeometryPart, PartKind};

    fn parts(body: &str) -> Vec<GeometryPart> {
        Cascade::default().parts(body, &Altitude::Surface, &parse_altitude("UNL"))
    }

    fn kinds(parts: &[GeometryPart]) -> Vec<PartKind> {
        parts.iter().map(|part| part.kind).collect()
    }

    #[test]
    fn test_split_subareas() {
        assert_eq_sorted!(
            split_subareas("AIRSPACE CLSD AS FLW:\n1. AREA: A-B-C\n   CONTINUED\n2. WI CIRCLE"),
            vec!["AREA: A-B-C\n   CONTINUED".to_string(), "WI CIRCLE".to_string()]
        );
        assert_eq_sorted!(
            split_subareas("  WI 0.5KM EITHER SIDE\n0.5KM MORE  "),
            vec!["WI 0.5KM EITHER SIDE\n0.5KM MORE".to_string()]
        );
    }

    #[test]
    fn test_circle() {
        let parts = parts("AIRSPACE CLSD WI CIRCLE RADIUS 1KM CENTRE 585106N0304315E.");
        assert_eq!(kinds(&parts), vec![PartKind::Circle]);
        assert_eq!(parts[0].index, 1);
        assert_eq!(
            parts[0].raw,
            "WI CIRCLE RADIUS 1KM CENTRE 585106N0304315E"
        );
        let centroid = parts[0].shape.centroid().unwrap();
        assert!((centroid.x() - 30.7208).abs() < 0.01);
        assert!((centroid.y() - 58.8517).abs() < 0.01);
    }

    #[test]
    fn test_circle_with_parentheses() {
        let parts = parts("AIRSPACE CLSD WI CIRCLE RADIUS 50KM CENTRE (620536N 1294624E).");
        assert_eq!(kinds(&parts), vec![PartKind::Circle]);
    }

    #[test]
    fn test_radius_circle_phrasing() {
        let parts = parts("THE AREA WI 1KM RADIUS CENTERED ON PSN N314705E0351414");
        assert_eq!(kinds(&parts), vec![PartKind::Circle]);
        let centroid = parts[0].shape.centroid().unwrap();
        assert!((centroid.y() - 31.7847).abs() < 0.01);
        assert!((centroid.x() - 35.2372).abs() < 0.01);
    }

    #[test]
    fn test_multiple_positions() {
        let parts = parts(
            "THE AREA WI 3NM RADIUS CENTERED ON PSNS\nN314359E0341658\nN313521E0343025\nN312155E0343212",
        );
        assert_eq!(kinds(&parts), vec![PartKind::Circle; 3]);
        assert_eq!(parts[1].raw, "PSN N313521E0343025");
    }

    #[test]
    fn test_sector_orderings() {
        let centre_first = parts("WI SECTOR CENTRE 595835N0301229E AZM 321-144 DEG RADIUS 8KM.");
        assert_eq!(kinds(&centre_first), vec![PartKind::Sector]);

        let from = parts(
            "AIRSPACE CLSD WI SECTOR BTN AZMAG 360-130 DEG FROM 543830N0393418E\nRADIUS 40KM.",
        );
        assert_eq!(kinds(&from), vec![PartKind::Sector]);
        assert!(from[0].shape.is_valid());
    }

    #[test]
    fn test_sector_without_azimuth_keyword() {
        let centre_first = parts("WI SECTOR CENTRE 595835N0301229E 321-144 DEG RADIUS 8KM.");
        assert_eq!(kinds(&centre_first), vec![PartKind::Sector]);
        assert_eq_sorted!(
            parts("WI SECTOR CENTRE 595835N0301229E AZM 321-144 DEG RADIUS 8KM.")[0].shape,
            centre_first[0].shape
        );

        let from = parts("WI SECTOR BTN 360-130 DEG FROM 543830N0393418E RADIUS 40KM.");
        assert_eq!(kinds(&from), vec![PartKind::Sector]);
    }

    #[test]
    fn test_ellipse() {
        let rotated = parts(
            "ELLIPSE CENTRE 595835N0301229E WITH AXES DIMENSIONS 20X10KM AZM OF MAJOR AXIS 45DEG",
        );
        assert_eq!(kinds(&rotated), vec![PartKind::Ellipse]);

        let no_azimuth = parts("ELLIPSE CENTRE 595835N0301229E WITH AXES DIMENSIONS 10X5NM");
        assert_eq!(kinds(&no_azimuth), vec![PartKind::Ellipse]);
    }

    #[test]
    fn test_arc_claims_area_text() {
        for body in [
            "AIRSPACE CLSD WI AREA:\n620506N1294106E-622044N1295822E-THEN CLOCKWISE\nALONG ARC RADIUS 30KM CENTRE (620536N1294624E) TO\n614952N1295408E.",
            "AIRSPACE CLSD WI AREA:\n471001N1431544E-464313N1433602E THEN CLOCKWISE BY ARC OF A CIRCLE\nRADIUS OF 70KM CENTRED AT (465318N1424300E) TO 472830N1422256E.",
            "AIRSPACE CLSD WI AREA:\nFM 513432N0512308E ALONG STATE BORDER TO 512534N0502235E THEN\nCLOCKWISE ALONG ARC RADIUS 200KM CENTRE (531300N 501100E) TO\n513432N0512308E.",
            "AIRSPACE CLSD WI AREA:\n560519N0374847E THEN ANTICLOCKWISE ALONG ARC RADIUS 28KM\nCENTRE (555200N0380000E) TO 554927N0382950E.",
        ] {
            let parts = parts(body);
            assert_eq!(kinds(&parts), vec![PartKind::Arc], "{body}");
            assert!(matches!(
                merge_parts(&parts),
                Some(Geometry::Polygon(ref polygon)) if polygon.is_valid()
            ));
        }
    }

    #[test]
    fn test_corridor() {
        let parts = parts(
            "WI 0.75KM EITHER SIDE OF LINE JOINING POINTS:\n595217N0304217E-594911N0305154E.",
        );
        assert_eq!(kinds(&parts), vec![PartKind::LineCorridor]);
        assert!(parts[0].shape.unsigned_area() > 0.0);
    }

    #[test]
    fn test_area_polygon() {
        let parts = parts(
            "AIRSPACE CLSD WI AREA:\n595835N0301229E-595811N0301228E-595809N0301307E-595835N0301229E.",
        );
        assert_eq!(kinds(&parts), vec![PartKind::Polygon]);
        assert!(matches!(parts[0].shape, Geometry::Polygon(_)));
    }

    #[test]
    fn test_area_chain_through_prose() {
        let parts = parts(
            "AIRSPACE CLSD WI AREA:\n595835N0301229E-595811N0301228E-595809N0301307E THEN ALONG STATE\nBORDER TO 595830N0301320E-595835N0301229E. WI CIRCLE RADIUS 1KM CENTRE 585106N0304315E.",
        );
        assert_eq!(kinds(&parts), vec![PartKind::Circle, PartKind::Polygon]);
        let Geometry::Polygon(polygon) = &parts[1].shape else {
            panic!("expected a polygon, got {:?}", parts[1].shape);
        };
        assert_eq!(polygon.exterior().0.len(), 5);
        assert!(polygon.is_valid());

        let wrapped = self::parts(
            "AREA: 595835N0301229E-595811N0301228E.\n595809N0301307E-595835N0301229E. RWY 10/28 CLSD.",
        );
        assert_eq!(kinds(&wrapped), vec![PartKind::Polygon]);
        assert!(wrapped[0].raw.ends_with("595809N0301307E-595835N0301229E"));
    }

    #[test]
    fn test_numbered_areas() {
        let parts = parts(
            "AIRSPACE CLSD AS FLW:\n1. AREA: 601818N0303722E-603000N0303756E-603006N0304300E-601818N0303722E\n2. AREA: 600250N0303240E-600650N0303222E-600845N0303620E-600250N0303240E",
        );
        assert_eq!(kinds(&parts), vec![PartKind::Polygon, PartKind::Polygon]);
        assert_eq!(parts.iter().map(|part| part.index).collect::<Vec<_>>(), vec![1, 2]);
        assert!(matches!(
            merge_parts(&parts),
            Some(Geometry::MultiPolygon(ref multi)) if multi.0.len() == 2
        ));
    }

    #[test]
    fn test_dense_fallback() {
        let parts = parts("595835N0301229E 595811N0301228E 595809N0301307E");
        assert_eq!(kinds(&parts), vec![PartKind::Polygon]);
    }

    #[test]
    fn test_fallback_needs_three_coordinates() {
        assert!(parts("RWY 10/28 CLSD. 595835N0301229E 595811N0301228E").is_empty());
        assert!(parts("").is_empty());
    }

    #[test]
    fn test_failed_shape_is_skipped() {
        // radius of zero cannot be built, the rest still is
        let parts = parts(
            "1. WI CIRCLE RADIUS 0KM CENTRE 585106N0304315E\n2. WI CIRCLE RADIUS 2KM CENTRE 585106N0304315E",
        );
        assert_eq!(kinds(&parts), vec![PartKind::Circle]);
        assert_eq!(parts[0].index, 2);
    }

    #[test]
    fn test_altitudes_attached() {
        let parts = Cascade::default().parts(
            "WI CIRCLE RADIUS 1KM CENTRE 585106N0304315E",
            &parse_altitude("SFC"),
            &parse_altitude("1500M AMSL"),
        );
        assert_eq!(parts[0].altitude_from, Altitude::Surface);
        assert_eq!(parts[0].altitude_to, parse_altitude("1500M AMSL"));
    }

    #[test]
    fn test_route_segments() {
        let waypoints = HashMap::from([
            ("ATKUP".to_string(), coord! { x: 30.1, y: 60.1 }),
            ("LIMUS".to_string(), coord! { x: 31.2, y: 60.3 }),
            ("KROTA".to_string(), coord! { x: 32.0, y: 59.0 }),
            ("AKATI".to_string(), coord! { x: 33.0, y: 58.5 }),
        ]);
        let cascade = Cascade::default().with_waypoints(waypoints);
        let parts = cascade.parts(
            "ATS RTE SEGMENTS CLSD:\nM745 ATKUP-LIMUS FL325-FL420,\nP190 KROTA-AKATI FL075-FL540,\nB102 KROTA-NOWHR",
            &Altitude::Surface,
            &Altitude::FlightLevel(660),
        );

        assert_eq!(kinds(&parts), vec![PartKind::RouteSegment; 2]);
        assert_eq!(parts[0].altitude_from, Altitude::FlightLevel(325));
        assert_eq!(parts[0].altitude_to, Altitude::FlightLevel(420));
        assert_eq!(parts[1].altitude_from, Altitude::FlightLevel(75));
        assert!(matches!(
            merge_parts(&parts),
            Some(Geometry::MultiLineString(ref lines)) if lines.0.len() == 2
        ));
    }

    #[test]
    fn test_route_segments_need_waypoints() {
        let parts = parts("ATS RTE SEGMENTS CLSD:\nM745 ATKUP-LIMUS FL325-FL420");
        assert!(parts.is_empty());
    }

    #[test]
    fn test_custom_recognizer() {
        fn aerodrome_circle(
            _: &regex::Captures,
            context: &super::RecognizerContext,
        ) -> Result<Vec<Recognized>, crate::geometry::GeometryError> {
            let circle = build_circle(
                coord! { x: 30.2625, y: 59.8003 },
                5000.0,
                context.config.circle_segments,
            )?;
            Ok(vec![Recognized::new(circle)])
        }

        let mut cascade = Cascade::default();
        cascade.push(Recognizer::new(
            PartKind::Circle,
            Regex::new(r"\bULLI CTR\b").unwrap(),
            aerodrome_circle,
        ));
        let parts = cascade.parts("ULLI CTR CLSD", &Altitude::Surface, &Altitude::Ground);
        assert_eq!(kinds(&parts), vec![PartKind::Circle]);
        assert_eq!(cascade.recognizers().last().map(Recognizer::kind), Some(PartKind::Circle));
    }
}
