use std::{collections::BTreeSet, io, ops::Range, str::FromStr};

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use geo::{Coord, Geometry};
use once_cell::sync::Lazy;
use pest::{iterators::Pair, Parser};
use pest_derive::Parser;
use regex::Regex;
use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::debug;

use super::read_to_string;
use crate::{
    altitude::parse_altitude,
    cascade::Cascade,
    coordinate::parse_latlon_pair,
    geometry::{merge_parts, serialize_optional_geometry, GeometryError, GeometryPart},
};

#[derive(Parser)]
#[grammar = "pest/notam.pest"]
pub struct NotamParser;

const SNIPPET_CONTEXT: usize = 30;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}, column {column}: {message} near {snippet:?}")]
pub struct NotamParseError {
    pub line: usize,
    pub column: usize,
    pub snippet: String,
    pub message: String,
}

impl NotamParseError {
    /// Locates `offset` (bytes into `text`) as a 1-based line and column.
    pub fn at(text: &str, offset: usize, message: impl Into<String>) -> Self {
        let mut offset = offset.min(text.len());
        while !text.is_char_boundary(offset) {
            offset -= 1;
        }
        let before = &text[..offset];
        let line = before.matches('\n').count() + 1;
        let column = before
            .rsplit('\n')
            .next()
            .map_or(0, |current| current.chars().count())
            + 1;
        let start = before
            .char_indices()
            .rev()
            .nth(SNIPPET_CONTEXT - 1)
            .map_or(0, |(index, _)| index);

        Self {
            line,
            column,
            snippet: text[start..].chars().take(2 * SNIPPET_CONTEXT).collect(),
            message: message.into(),
        }
    }

    fn from_pest(text: &str, error: &pest::error::Error<Rule>) -> Self {
        let offset = match error.location {
            pest::error::InputLocation::Pos(offset) => offset,
            pest::error::InputLocation::Span((start, _)) => start,
        };
        Self::at(text, offset, error.variant.message())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed Q) clause {clause:?}: {reason}")]
pub struct ParseQClauseError {
    pub clause: String,
    pub reason: String,
}

impl ParseQClauseError {
    fn new(clause: &str, reason: impl Into<String>) -> Self {
        Self {
            clause: clause.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum NotamError {
    #[error("corrupted NOTAM, expected a telegram enclosed in parentheses: {snippet:?}")]
    Corrupted { snippet: String },
    #[error("failed to parse NOTAM: {0}")]
    Parse(#[from] NotamParseError),
    #[error(transparent)]
    QClause(#[from] ParseQClauseError),
    #[error("NOTAM record is missing its {0}")]
    MissingClause(&'static str),
    #[error("failed to read NOTAM: {0}")]
    FileRead(#[from] io::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum NotamKind {
    #[serde(rename = "NOTAMN")]
    New,
    #[serde(rename = "NOTAMR")]
    Replace,
    #[serde(rename = "NOTAMC")]
    Cancel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum TrafficType {
    #[serde(rename = "IFR")]
    Ifr,
    #[serde(rename = "VFR")]
    Vfr,
    #[serde(rename = "CHECKLIST")]
    Checklist,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Purpose {
    #[serde(rename = "IMMEDIATE ATTENTION")]
    ImmediateAttention,
    #[serde(rename = "OPERATIONAL SIGNIFICANCE")]
    OperationalSignificance,
    #[serde(rename = "FLIGHT OPERATIONS")]
    FlightOperations,
    #[serde(rename = "MISC")]
    Misc,
    #[serde(rename = "CHECKLIST")]
    Checklist,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Scope {
    #[serde(rename = "AERODROME")]
    Aerodrome,
    #[serde(rename = "EN-ROUTE")]
    EnRoute,
    #[serde(rename = "NAV WARNING")]
    NavWarning,
    #[serde(rename = "CHECKLIST")]
    Checklist,
}

impl TryFrom<char> for TrafficType {
    type Error = char;

    fn try_from(code: char) -> Result<Self, Self::Error> {
        match code {
            'I' => Ok(Self::Ifr),
            'V' => Ok(Self::Vfr),
            'K' => Ok(Self::Checklist),
            other => Err(other),
        }
    }
}

impl TryFrom<char> for Purpose {
    type Error = char;

    fn try_from(code: char) -> Result<Self, Self::Error> {
        match code {
            'N' => Ok(Self::ImmediateAttention),
            'B' => Ok(Self::OperationalSignificance),
            'O' => Ok(Self::FlightOperations),
            'M' => Ok(Self::Misc),
            'K' => Ok(Self::Checklist),
            other => Err(other),
        }
    }
}

impl TryFrom<char> for Scope {
    type Error = char;

    fn try_from(code: char) -> Result<Self, Self::Error> {
        match code {
            'A' => Ok(Self::Aerodrome),
            'E' => Ok(Self::EnRoute),
            'W' => Ok(Self::NavWarning),
            'K' => Ok(Self::Checklist),
            other => Err(other),
        }
    }
}

/// Centre and radius (NM) of the Q) clause area of influence, kept as written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QArea {
    pub lat: String,
    pub long: String,
    pub radius: u16,
}

impl QArea {
    pub fn center(&self) -> Result<Coord, GeometryError> {
        parse_latlon_pair(&format!("{}{}", self.lat, self.long))
    }
}

/// End of validity from the C) clause.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidTill {
    Exact(DateTime<Utc>),
    Estimated(DateTime<Utc>),
    Permanent,
}

impl ValidTill {
    /// `PERM` maps to the largest representable instant.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Exact(timestamp) | Self::Estimated(timestamp) => *timestamp,
            Self::Permanent => DateTime::<Utc>::MAX_UTC,
        }
    }

    pub fn is_estimated(&self) -> bool {
        matches!(self, Self::Estimated(_))
    }
}

impl Serialize for ValidTill {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Exact(timestamp) => {
                serializer.serialize_str(&timestamp.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
            Self::Estimated(timestamp) => serializer.serialize_str(&format!(
                "{} EST",
                timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
            )),
            Self::Permanent => serializer.serialize_str("PERM"),
        }
    }
}

/// Byte ranges of each clause value within the original telegram.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClauseSpans {
    pub q: Option<Range<usize>>,
    pub a: Option<Range<usize>>,
    pub b: Option<Range<usize>>,
    pub c: Option<Range<usize>>,
    pub d: Option<Range<usize>>,
    pub e: Option<Range<usize>>,
    pub f: Option<Range<usize>>,
    pub g: Option<Range<usize>>,
}

impl ClauseSpans {
    /// Free text clauses D) to G) in telegram order.
    pub fn free_text(&self) -> Vec<Range<usize>> {
        let mut spans = [&self.d, &self.e, &self.f, &self.g]
            .into_iter()
            .flatten()
            .cloned()
            .collect::<Vec<_>>();
        spans.sort_by_key(|span| span.start);
        spans
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Notam {
    pub full_text: String,
    pub notam_id: String,
    pub notam_type: NotamKind,
    pub ref_notam_id: Option<String>,
    pub fir: String,
    pub notam_code: String,
    pub traffic_type: BTreeSet<TrafficType>,
    pub purpose: BTreeSet<Purpose>,
    pub scope: BTreeSet<Scope>,
    pub fl_lower: Option<u16>,
    pub fl_upper: Option<u16>,
    pub area: Option<QArea>,
    pub location: Vec<String>,
    pub valid_from: DateTime<Utc>,
    pub valid_till: Option<ValidTill>,
    pub schedule: Option<String>,
    pub body: String,
    pub limit_lower: Option<String>,
    pub limit_upper: Option<String>,
    #[serde(skip)]
    pub spans: ClauseSpans,
    pub parts: Vec<GeometryPart>,
    #[serde(serialize_with = "serialize_optional_geometry")]
    pub geometry: Option<Geometry>,
}

/// Fields of a Q) clause.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QClause {
    pub fir: String,
    pub notam_code: String,
    pub traffic_type: BTreeSet<TrafficType>,
    pub purpose: BTreeSet<Purpose>,
    pub scope: BTreeSet<Scope>,
    pub fl_lower: Option<u16>,
    pub fl_upper: Option<u16>,
    pub area: Option<QArea>,
}

static NOTAM_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Q[A-Z]{4}$").unwrap());
static AREA_OF_INFLUENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<lat>[0-9]{4}(?:[0-9]{2})?[NS])(?P<long>[0-9]{5}(?:[0-9]{2})?[EW])(?P<radius>[0-9]{0,3})$")
        .unwrap()
});

fn codes<T: TryFrom<char, Error = char> + Ord>(
    clause: &str,
    field: &str,
    what: &str,
) -> Result<BTreeSet<T>, ParseQClauseError> {
    field
        .trim()
        .chars()
        .map(|code| {
            T::try_from(code)
                .map_err(|code| ParseQClauseError::new(clause, format!("unknown {what} {code:?}")))
        })
        .collect()
}

fn flight_level(field: &str) -> Option<u16> {
    let field = field.trim();
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

impl FromStr for QClause {
    type Err = ParseQClauseError;

    fn from_str(clause: &str) -> Result<Self, Self::Err> {
        let fields = clause.trim().split('/').collect::<Vec<_>>();
        let [fir, notam_code, traffic, purpose, scope, lower, upper, rest @ ..] =
            fields.as_slice()
        else {
            return Err(ParseQClauseError::new(
                clause,
                format!("expected at least 7 fields, got {}", fields.len()),
            ));
        };

        let fir = fir.trim();
        if fir.len() < 4 || !fir.is_char_boundary(4) {
            return Err(ParseQClauseError::new(clause, format!("invalid FIR {fir:?}")));
        }
        let notam_code = notam_code.trim();
        if !NOTAM_CODE.is_match(notam_code) {
            return Err(ParseQClauseError::new(
                clause,
                format!("invalid NOTAM code {notam_code:?}"),
            ));
        }

        // a missing radius leaves no usable area
        let area = rest
            .first()
            .and_then(|area| AREA_OF_INFLUENCE.captures(area.trim()))
            .and_then(|captures| {
                let radius = captures["radius"].parse().ok()?;
                Some(QArea {
                    lat: captures["lat"].to_string(),
                    long: captures["long"].to_string(),
                    radius,
                })
            });

        Ok(Self {
            fir: fir[..4].to_string(),
            notam_code: notam_code.to_string(),
            traffic_type: codes(clause, traffic, "traffic type")?,
            purpose: codes(clause, purpose, "purpose")?,
            scope: codes(clause, scope, "scope")?,
            fl_lower: flight_level(lower),
            fl_upper: flight_level(upper),
            area,
        })
    }
}

/// Reads `YYMMDDHHMM` as UTC.
pub fn parse_datetime(digits: &str) -> Option<DateTime<Utc>> {
    let field = |at: usize| digits.get(at..at + 2)?.parse::<u32>().ok();
    let year = digits.get(0..2)?.parse::<i32>().ok()?;
    // pivot for two-digit years, ambiguous again once 2080 is reached
    let year = if year > 80 { 1900 + year } else { 2000 + year };
    Utc.with_ymd_and_hms(year, field(2)?, field(4)?, field(6)?, field(8)?, 0)
        .single()
}

/// Accumulates clause values during the grammar walk.
#[derive(Clone, Debug, Default)]
pub struct NotamBuilder {
    full_text: String,
    notam_id: Option<String>,
    notam_type: Option<NotamKind>,
    ref_notam_id: Option<String>,
    q: Option<QClause>,
    location: Vec<String>,
    valid_from: Option<DateTime<Utc>>,
    valid_till: Option<ValidTill>,
    schedule: Option<String>,
    body: Option<String>,
    limit_lower: Option<String>,
    limit_upper: Option<String>,
    spans: ClauseSpans,
}

impl NotamBuilder {
    pub fn new(full_text: impl Into<String>) -> Self {
        Self {
            full_text: full_text.into(),
            ..Self::default()
        }
    }

    pub fn header(&mut self, notam_id: String, kind: NotamKind, reference: Option<String>) -> &mut Self {
        self.notam_id = Some(notam_id);
        self.notam_type = Some(kind);
        self.ref_notam_id = reference;
        self
    }

    pub fn q_clause(&mut self, q: QClause, span: Range<usize>) -> &mut Self {
        self.q = Some(q);
        self.spans.q = Some(span);
        self
    }

    pub fn a_clause(&mut self, location: Vec<String>, span: Range<usize>) -> &mut Self {
        self.location = location;
        self.spans.a = Some(span);
        self
    }

    pub fn b_clause(&mut self, valid_from: DateTime<Utc>, span: Range<usize>) -> &mut Self {
        self.valid_from = Some(valid_from);
        self.spans.b = Some(span);
        self
    }

    pub fn c_clause(&mut self, valid_till: ValidTill, span: Range<usize>) -> &mut Self {
        self.valid_till = Some(valid_till);
        self.spans.c = Some(span);
        self
    }

    pub fn d_clause(&mut self, schedule: &str, span: Range<usize>) -> &mut Self {
        self.schedule = Some(schedule.trim().to_string());
        self.spans.d = Some(span);
        self
    }

    pub fn e_clause(&mut self, body: &str, span: Range<usize>) -> &mut Self {
        self.body = Some(body.trim().to_string());
        self.spans.e = Some(span);
        self
    }

    pub fn f_clause(&mut self, limit: &str, span: Range<usize>) -> &mut Self {
        self.limit_lower = Some(limit.trim().to_string());
        self.spans.f = Some(span);
        self
    }

    pub fn g_clause(&mut self, limit: &str, span: Range<usize>) -> &mut Self {
        self.limit_upper = Some(limit.trim().to_string());
        self.spans.g = Some(span);
        self
    }

    /// Finalises the record. Geometry is left empty.
    pub fn build(self) -> Result<Notam, NotamError> {
        let notam_id = self.notam_id.ok_or(NotamError::MissingClause("header"))?;
        let notam_type = self.notam_type.ok_or(NotamError::MissingClause("header"))?;
        let q = self.q.ok_or(NotamError::MissingClause("Q) clause"))?;
        let valid_from = self.valid_from.ok_or(NotamError::MissingClause("B) clause"))?;
        let body = self.body.ok_or(NotamError::MissingClause("E) clause"))?;
        if self.location.is_empty() {
            return Err(NotamError::MissingClause("A) clause"));
        }

        Ok(Notam {
            full_text: self.full_text,
            notam_id,
            notam_type,
            ref_notam_id: self.ref_notam_id,
            fir: q.fir,
            notam_code: q.notam_code,
            traffic_type: q.traffic_type,
            purpose: q.purpose,
            scope: q.scope,
            fl_lower: q.fl_lower,
            fl_upper: q.fl_upper,
            area: q.area,
            location: self.location,
            valid_from,
            valid_till: self.valid_till,
            schedule: self.schedule,
            body,
            limit_lower: self.limit_lower,
            limit_upper: self.limit_upper,
            spans: self.spans,
            parts: vec![],
            geometry: None,
        })
    }
}

static DEFAULT_CASCADE: Lazy<Cascade> = Lazy::new(Cascade::default);

fn span_of(pair: &Pair<Rule>) -> Range<usize> {
    pair.as_span().start()..pair.as_span().end()
}

fn datetime(text: &str, pair: &Pair<Rule>) -> Result<DateTime<Utc>, NotamParseError> {
    parse_datetime(pair.as_str()).ok_or_else(|| {
        NotamParseError::at(
            text,
            pair.as_span().start(),
            format!("invalid date/time {}", pair.as_str()),
        )
    })
}

fn header(builder: &mut NotamBuilder, pair: Pair<Rule>) {
    let mut header = pair.into_inner();
    let notam_id = header.next().unwrap().as_str().to_string();
    let kind = header.next().unwrap();
    let reference = kind.clone().into_inner().next().map(|id| id.as_str().to_string());
    let kind = match kind.as_rule() {
        Rule::notamr => NotamKind::Replace,
        Rule::notamc => NotamKind::Cancel,
        _ => NotamKind::New,
    };
    builder.header(notam_id, kind, reference);
}

fn valid_till(text: &str, pair: Pair<Rule>) -> Result<ValidTill, NotamParseError> {
    let mut value = pair.into_inner();
    let first = value.next().unwrap();
    if matches!(first.as_rule(), Rule::permanent) {
        return Ok(ValidTill::Permanent);
    }

    let timestamp = datetime(text, &first)?;
    Ok(match value.next() {
        Some(_) => ValidTill::Estimated(timestamp),
        None => ValidTill::Exact(timestamp),
    })
}

impl Notam {
    /// Parses a single telegram and infers its geometry with the default cascade.
    pub fn parse(text: &str) -> Result<Self, NotamError> {
        Self::parse_with(text, &DEFAULT_CASCADE)
    }

    /// Like [`Notam::parse`] for raw bytes, falling back to Windows-1252.
    pub fn parse_bytes(content: &[u8]) -> Result<Self, NotamError> {
        Self::parse(&read_to_string(content)?)
    }

    pub fn parse_with(text: &str, cascade: &Cascade) -> Result<Self, NotamError> {
        let trimmed = text.trim();
        if !(trimmed.starts_with('(') && trimmed.ends_with(')')) {
            return Err(NotamError::Corrupted {
                snippet: trimmed.chars().take(2 * SNIPPET_CONTEXT).collect(),
            });
        }

        let telegram = NotamParser::parse(Rule::notam, text)
            .map_err(|e| NotamParseError::from_pest(text, &e))?
            .next()
            .unwrap();

        let mut builder = NotamBuilder::new(text);
        for pair in telegram.into_inner() {
            let span = span_of(&pair);
            match pair.as_rule() {
                Rule::header => header(&mut builder, pair),
                Rule::q_body => {
                    builder.q_clause(pair.as_str().parse()?, span);
                }
                Rule::a_value => {
                    let location = pair.into_inner().map(|p| p.as_str().to_string()).collect();
                    builder.a_clause(location, span);
                }
                Rule::b_value => {
                    let valid_from = datetime(text, &pair.into_inner().next().unwrap())?;
                    builder.b_clause(valid_from, span);
                }
                Rule::c_value => {
                    builder.c_clause(valid_till(text, pair)?, span);
                }
                Rule::d_value => {
                    builder.d_clause(pair.as_str(), span);
                }
                Rule::e_value => {
                    builder.e_clause(pair.as_str(), span);
                }
                Rule::f_value => {
                    builder.f_clause(pair.as_str(), span);
                }
                Rule::g_value => {
                    builder.g_clause(pair.as_str(), span);
                }
                _ => (),
            }
        }

        let mut notam = builder.build()?;
        notam.infer_geometry(cascade);
        Ok(notam)
    }

    /// Runs the text geometry cascade over the E) body with the F)/G) limits.
    pub fn infer_geometry(&mut self, cascade: &Cascade) {
        let config = cascade.config();
        let lower = parse_altitude(self.limit_lower.as_deref().unwrap_or(&config.default_lower));
        let upper = parse_altitude(self.limit_upper.as_deref().unwrap_or(&config.default_upper));

        self.parts = cascade.parts(&self.body, &lower, &upper);
        self.geometry = merge_parts(&self.parts);
        debug!(
            "{}: {} geometry parts from E) clause",
            self.notam_id,
            self.parts.len()
        );
    }
}

impl FromStr for Notam {
    type Err = NotamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
