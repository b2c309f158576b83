use std::sync::OnceLock;

use geo::Coord;
use regex::Regex;
use tracing::{trace, warn};
use uom::si::f64::Length;
use uom::si::length::{kilometer, meter, nautical_mile};

use crate::geometry::GeometryError;

/// Coordinate pair in either `DDMMSSNDDDMMSSE` or hemisphere-first `NDDMMSSEDDDMMSS`
/// form, with an optional space between latitude and longitude.
pub(crate) const COORD_PATTERN: &str =
    r"(?:\b[0-9]{4,6}[NS]\s*[0-9]{5,7}[EW]|\b[NS][0-9]{4,6}\s*[EW][0-9]{5,7})";

fn dms_token_regex() -> &'static Regex {
    static DMS_TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    DMS_TOKEN_RE.get_or_init(|| Regex::new(r"^([0-9]{4,7})([NSEW])$").unwrap())
}

fn hemisphere_first_regex() -> &'static Regex {
    static HEMISPHERE_FIRST_RE: OnceLock<Regex> = OnceLock::new();
    HEMISPHERE_FIRST_RE
        .get_or_init(|| Regex::new(r"^([NS])([0-9]{4,6})\s*([EW])([0-9]{5,7})$").unwrap())
}

fn hemisphere_last_regex() -> &'static Regex {
    static HEMISPHERE_LAST_RE: OnceLock<Regex> = OnceLock::new();
    HEMISPHERE_LAST_RE.get_or_init(|| Regex::new(r"^([0-9]{4,6})([NS])\s*([0-9]{5,7})([EW])").unwrap())
}

pub(crate) fn coord_pair_regex() -> &'static Regex {
    static COORD_PAIR_RE: OnceLock<Regex> = OnceLock::new();
    COORD_PAIR_RE.get_or_init(|| Regex::new(COORD_PATTERN).unwrap())
}

fn distance_regex() -> &'static Regex {
    static DISTANCE_RE: OnceLock<Regex> = OnceLock::new();
    DISTANCE_RE.get_or_init(|| Regex::new(r"^([0-9]+(?:\.[0-9]+)?)(KM|NM|M)").unwrap())
}

// the regexes only let ASCII digits through
fn digits_value(digits: &str) -> f64 {
    digits
        .bytes()
        .fold(0.0, |acc, digit| acc * 10.0 + f64::from(digit - b'0'))
}

/// Converts a `DDMM[SS]H` / `DDDMMSSH` token into signed decimal degrees.
///
/// A 5 digit token is read as `DDMM` plus a single tens-of-seconds digit. That
/// encoding is rare and most likely a malformed token, so it is logged.
pub fn parse_dms_token(token: &str) -> Result<f64, GeometryError> {
    let token = token.trim();
    let captures = dms_token_regex()
        .captures(token)
        .ok_or_else(|| GeometryError::InvalidCoordinate(token.to_string()))?;
    let digits = &captures[1];
    let hemisphere = &captures[2];

    let (degrees, minutes, seconds) = match digits.len() {
        4 => (digits_value(&digits[..2]), digits_value(&digits[2..4]), 0.0),
        5 => {
            warn!("5 digit coordinate token {token}, reading last digit as tens of seconds");
            (
                digits_value(&digits[..2]),
                digits_value(&digits[2..4]),
                digits_value(&digits[4..5]) * 10.0,
            )
        }
        6 => (
            digits_value(&digits[..2]),
            digits_value(&digits[2..4]),
            digits_value(&digits[4..6]),
        ),
        _ => (
            digits_value(&digits[..3]),
            digits_value(&digits[3..5]),
            digits_value(&digits[5..7]),
        ),
    };

    let limit = if matches!(hemisphere, "N" | "S") {
        90.0
    } else {
        180.0
    };
    let value = degrees + minutes / 60.0 + seconds / 3600.0;
    if minutes >= 60.0 || seconds >= 60.0 || value > limit {
        return Err(GeometryError::InvalidCoordinate(token.to_string()));
    }

    Ok(if matches!(hemisphere, "S" | "W") {
        -value
    } else {
        value
    })
}

// DDMM latitudes travel with DDDMM longitudes, which must not hit the 5 digit quirk
fn align_longitude(lat_digits: &str, lng_digits: &str) -> String {
    if lat_digits.len() == 4 && lng_digits.len() == 5 {
        format!("{lng_digits}00")
    } else {
        lng_digits.to_string()
    }
}

fn coord_from_parts(
    lat_digits: &str,
    lat_hemi: &str,
    lng_digits: &str,
    lng_hemi: &str,
) -> Result<Coord, GeometryError> {
    let lat = parse_dms_token(&format!("{lat_digits}{lat_hemi}"))?;
    let lng = parse_dms_token(&format!(
        "{}{lng_hemi}",
        align_longitude(lat_digits, lng_digits)
    ))?;
    Ok(Coord { x: lng, y: lat })
}

/// Parses a single latitude/longitude pair into a `Coord` (`x` = longitude).
pub fn parse_latlon_pair(text: &str) -> Result<Coord, GeometryError> {
    let cleaned = text.trim().replace([',', '-', '–'], " ");
    let cleaned = cleaned
        .trim()
        .trim_matches(|c: char| matches!(c, '(' | ')' | '.' | ';'))
        .trim();

    if let Some(captures) = hemisphere_first_regex().captures(cleaned) {
        return coord_from_parts(&captures[2], &captures[1], &captures[4], &captures[3]);
    }
    if let Some(captures) = hemisphere_last_regex().captures(cleaned) {
        return coord_from_parts(&captures[1], &captures[2], &captures[3], &captures[4]);
    }

    Err(GeometryError::InvalidCoordinatePair(text.to_string()))
}

/// Collects every coordinate pair found in `text`, ignoring anything else.
pub fn parse_coordinate_sequence(text: &str) -> Vec<Coord> {
    coord_pair_regex()
        .find_iter(text)
        .filter_map(|pair| match parse_latlon_pair(pair.as_str()) {
            Ok(coord) => Some(coord),
            Err(e) => {
                trace!("skipping coordinate candidate {}: {e}", pair.as_str());
                None
            }
        })
        .collect()
}

/// Normalises `<number><KM|NM|M>` to metres.
pub fn parse_distance(text: &str) -> Result<f64, GeometryError> {
    let normalised = text.trim().to_uppercase().replace(' ', "");
    let captures = distance_regex()
        .captures(&normalised)
        .ok_or_else(|| GeometryError::InvalidDistance(text.to_string()))?;
    let value: f64 = captures[1]
        .parse()
        .map_err(|_| GeometryError::InvalidDistance(text.to_string()))?;

    let length = match &captures[2] {
        "KM" => Length::new::<kilometer>(value),
        "NM" => Length::new::<nautical_mile>(value),
        _ => Length::new::<meter>(value),
    };

    Ok(length.get::<meter>())
}
