use std::{collections::HashMap, io, ops::Range};

use itertools::Itertools;
use phf::phf_map;
use regex::{Captures, Regex};
use thiserror::Error;

use super::read_to_string;
use crate::notam::Notam;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("clause span {start}..{end} is outside the {len} byte telegram")]
    SpanOutOfBounds { start: usize, end: usize, len: usize },
    #[error("clause span {start}..{end} does not fall on character boundaries")]
    SpanNotOnCharBoundary { start: usize, end: usize },
    #[error("clause span {start}..{end} overlaps the previous clause")]
    OverlappingSpans { start: usize, end: usize },
    #[error("failed to build abbreviation pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("failed to deserialize abbreviation dictionary: {0}")]
    Deserialize(#[from] serde_json::Error),
    #[error("failed to read abbreviation dictionary: {0}")]
    FileRead(#[from] io::Error),
}

// expansions must not contain any key, or decoding stops being idempotent
pub static ICAO_ABBREVIATIONS: phf::Map<&'static str, &'static str> = phf_map! {
    "ABV" => "Above",
    "ACT" => "Active",
    "AD" => "Aerodrome",
    "ADJ" => "Adjacent",
    "AGL" => "Above ground level",
    "ALT" => "Altitude",
    "AMSL" => "Above mean sea level",
    "APCH" => "Approach",
    "APN" => "Apron",
    "APR" => "April",
    "ARR" => "Arrival",
    "AUG" => "August",
    "AVBL" => "Available",
    "AZM" => "Azimuth",
    "BCN" => "Beacon",
    "BLW" => "Below",
    "BTN" => "Between",
    "CAT" => "Category",
    "CLSD" => "Closed",
    "COORD" => "Coordinates",
    "CTA" => "Control area",
    "CTN" => "Caution",
    "CTR" => "Control zone",
    "DEC" => "December",
    "DEG" => "Degrees",
    "DEP" => "Departure",
    "DLY" => "Daily",
    "DME" => "Distance measuring equipment",
    "EST" => "Estimated",
    "EXC" => "Except",
    "FEB" => "February",
    "FLW" => "Follows",
    "FREQ" => "Frequency",
    "FRI" => "Friday",
    "GND" => "Ground",
    "HGT" => "Height",
    "HR" => "Hours",
    "ILS" => "Instrument landing system",
    "INOP" => "Inoperative",
    "JAN" => "January",
    "JUL" => "July",
    "JUN" => "June",
    "LGT" => "Lighting",
    "MAR" => "March",
    "MAX" => "Maximum",
    "MIL" => "Military",
    "MNM" => "Minimum",
    "MON" => "Monday",
    "NDB" => "Non-directional radio beacon",
    "NOV" => "November",
    "OBST" => "Obstacle",
    "OCT" => "October",
    "OPS" => "Operations",
    "PERM" => "Permanent",
    "PSN" => "Position",
    "PSNS" => "Positions",
    "RWY" => "Runway",
    "SAT" => "Saturday",
    "SEP" => "September",
    "SER" => "Service",
    "SFC" => "Surface",
    "SUN" => "Sunday",
    "THU" => "Thursday",
    "THR" => "Threshold",
    "TEMPO" => "Temporary",
    "TUE" => "Tuesday",
    "TWR" => "Aerodrome control tower",
    "TWY" => "Taxiway",
    "U/S" => "Unserviceable",
    "UNL" => "Unlimited",
    "VOR" => "VHF omnidirectional radio range",
    "WED" => "Wednesday",
    "WEF" => "With effect from",
    "WI" => "Within",
    "WIP" => "Work in progress",
};

/// Expands whole-word abbreviations with a pattern compiled once up front.
#[derive(Clone, Debug)]
pub struct AbbreviationDecoder {
    entries: HashMap<String, String>,
    pattern: Option<Regex>,
}

impl AbbreviationDecoder {
    pub fn new<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Result<Self, DecodeError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .filter(|(key, _)| !key.is_empty())
            .collect::<HashMap<String, String>>();

        let pattern = if entries.is_empty() {
            None
        } else {
            let alternation = entries
                .keys()
                .sorted_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)))
                .map(|key| regex::escape(key))
                .join("|");
            Some(Regex::new(&format!(r"\b(?:{alternation})\b"))?)
        };

        Ok(Self { entries, pattern })
    }

    /// Decoder over the built-in ICAO table.
    pub fn icao() -> Self {
        Self::new(ICAO_ABBREVIATIONS.entries().map(|(&key, &value)| (key, value))).unwrap()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn expansion(&self, abbreviation: &str) -> Option<&str> {
        self.entries.get(abbreviation).map(String::as_str)
    }

    pub fn decode(&self, text: &str) -> String {
        let Some(pattern) = &self.pattern else {
            return text.to_string();
        };
        pattern
            .replace_all(text, |captures: &Captures| {
                let abbreviation = &captures[0];
                self.expansion(abbreviation)
                    .unwrap_or(abbreviation)
                    .to_string()
            })
            .into_owned()
    }

    /// Decodes only inside `spans`, copying the text between them verbatim.
    pub fn decode_spans(&self, text: &str, spans: &[Range<usize>]) -> Result<String, DecodeError> {
        let mut decoded = String::with_capacity(text.len());
        let mut cursor = 0;
        for span in spans.iter().sorted_by_key(|span| (span.start, span.end)) {
            let (start, end) = (span.start, span.end);
            if start > end || end > text.len() {
                return Err(DecodeError::SpanOutOfBounds {
                    start,
                    end,
                    len: text.len(),
                });
            }
            if start < cursor {
                return Err(DecodeError::OverlappingSpans { start, end });
            }
            let (Some(gap), Some(clause)) = (text.get(cursor..start), text.get(start..end)) else {
                return Err(DecodeError::SpanNotOnCharBoundary { start, end });
            };
            decoded.push_str(gap);
            decoded.push_str(&self.decode(clause));
            cursor = end;
        }
        decoded.push_str(&text[cursor..]);
        Ok(decoded)
    }

    /// The full telegram with clauses D) to G) decoded.
    pub fn decode_notam(&self, notam: &Notam) -> Result<String, DecodeError> {
        self.decode_spans(&notam.full_text, &notam.spans.free_text())
    }
}

impl Default for AbbreviationDecoder {
    fn default() -> Self {
        Self::icao()
    }
}

/// Reads a `{"ABBR": "Expansion"}` dictionary.
pub fn parse_abbreviations_json(content: &[u8]) -> Result<AbbreviationDecoder, DecodeError> {
    let content = read_to_string(content)?;
    let entries: HashMap<String, String> = serde_json::from_str(&content)?;
    AbbreviationDecoder::new(entries)
}
