use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum VerticalDatum {
    #[serde(rename = "AMSL")]
    Amsl,
    #[serde(rename = "AGL")]
    Agl,
}

impl VerticalDatum {
    fn as_str(self) -> &'static str {
        match self {
            Self::Amsl => "AMSL",
            Self::Agl => "AGL",
        }
    }
}

/// Vertical limit as written in the F) and G) clauses.
#[derive(Clone, Debug, PartialEq)]
pub enum Altitude {
    Surface,
    Ground,
    FlightLevel(u16),
    Metres {
        value: f64,
        datum: Option<VerticalDatum>,
    },
    /// Anything else, kept verbatim.
    Unknown(String),
}

fn flight_level_regex() -> &'static Regex {
    static FLIGHT_LEVEL_RE: OnceLock<Regex> = OnceLock::new();
    FLIGHT_LEVEL_RE.get_or_init(|| Regex::new(r"^FL\s?([0-9]{2,3})$").unwrap())
}

fn metres_regex() -> &'static Regex {
    static METRES_RE: OnceLock<Regex> = OnceLock::new();
    METRES_RE.get_or_init(|| Regex::new(r"^([0-9]+(?:\.[0-9]+)?)\s?M(?:\s+(AMSL|AGL))?$").unwrap())
}

pub fn parse_altitude(text: &str) -> Altitude {
    let normalised = text.trim().to_uppercase();

    match normalised.as_str() {
        "SFC" => return Altitude::Surface,
        "GND" => return Altitude::Ground,
        _ => (),
    }

    if let Some(level) = flight_level_regex()
        .captures(&normalised)
        .and_then(|captures| captures[1].parse().ok())
    {
        return Altitude::FlightLevel(level);
    }

    if let Some(captures) = metres_regex().captures(&normalised) {
        if let Ok(value) = captures[1].parse() {
            let datum = captures.get(2).map(|datum| match datum.as_str() {
                "AGL" => VerticalDatum::Agl,
                _ => VerticalDatum::Amsl,
            });
            return Altitude::Metres { value, datum };
        }
    }

    Altitude::Unknown(text.to_string())
}

impl fmt::Display for Altitude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Surface => write!(f, "SFC"),
            Self::Ground => write!(f, "GND"),
            Self::FlightLevel(level) => write!(f, "FL{level:03}"),
            Self::Metres {
                value,
                datum: Some(datum),
            } => write!(f, "{value}M {}", datum.as_str()),
            Self::Metres { value, datum: None } => write!(f, "{value}M"),
            Self::Unknown(raw) => write!(f, "{raw}"),
        }
    }
}

// {"type": "SFC"} / {"type": "ALT", "unit": "FL", "value": 100} /
// {"type": "ALT", "unit": "M", "value": 1500, "ref": "AMSL"} / {"type": "UNKNOWN", "raw": ".."}
// "ref" is left out when no datum was written
impl Serialize for Altitude {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Surface | Self::Ground => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("type", if *self == Self::Surface { "SFC" } else { "GND" })?;
                map.end()
            }
            Self::FlightLevel(level) => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("type", "ALT")?;
                map.serialize_entry("unit", "FL")?;
                map.serialize_entry("value", level)?;
                map.end()
            }
            Self::Metres { value, datum } => {
                let mut map = serializer.serialize_map(Some(3 + usize::from(datum.is_some())))?;
                map.serialize_entry("type", "ALT")?;
                map.serialize_entry("unit", "M")?;
                map.serialize_entry("value", value)?;
                if let Some(datum) = datum {
                    map.serialize_entry("ref", datum)?;
                }
                map.end()
            }
            Self::Unknown(raw) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "UNKNOWN")?;
                map.serialize_entry("raw", raw)?;
                map.end()
            }
        }
    }
}
