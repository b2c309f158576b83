use std::collections::HashMap;
use std::hash::BuildHasher;
use std::io;

use geo::Coord;
use pest::{iterators::Pair, Parser};
use pest_derive::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::read_to_string;

#[derive(Parser)]
#[grammar = "pest/airports.pest"]
pub struct AirportsParser;

#[derive(Error, Debug)]
pub enum AirportsError {
    #[error("failed to parse airports database: {0}")]
    Parse(#[from] pest::error::Error<Rule>),
    #[error("failed to read airports database: {0}")]
    FileRead(#[from] io::Error),
    #[error("airports database has no {0} column")]
    MissingColumn(&'static str),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Airport {
    pub ident: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl Airport {
    pub fn coordinate(&self) -> Coord {
        Coord {
            x: self.lon,
            y: self.lat,
        }
    }
}

/// Resolves an A) location indicator to an airport reference point.
pub trait AirportLookup {
    fn airport(&self, ident: &str) -> Option<&Airport>;
}

impl<S: BuildHasher> AirportLookup for HashMap<String, Airport, S> {
    fn airport(&self, ident: &str) -> Option<&Airport> {
        self.get(ident)
    }
}

/// Resolves a published waypoint designator to its position.
pub trait WaypointLookup {
    fn waypoint(&self, code: &str) -> Option<Coord>;
}

impl<S: BuildHasher> WaypointLookup for HashMap<String, Coord, S> {
    fn waypoint(&self, code: &str) -> Option<Coord> {
        self.get(code).copied()
    }
}

impl<F> WaypointLookup for F
where
    F: Fn(&str) -> Option<Coord>,
{
    fn waypoint(&self, code: &str) -> Option<Coord> {
        self(code)
    }
}

pub type AirportsResult = Result<HashMap<String, Airport>, AirportsError>;

fn field_value(pair: Pair<Rule>) -> String {
    match pair.as_rule() {
        Rule::quoted => pair
            .into_inner()
            .next()
            .map(|inner| inner.as_str().replace("\"\"", "\""))
            .unwrap_or_default(),
        _ => pair.as_str().trim().to_string(),
    }
}

fn column(header: &[String], name: &'static str) -> Result<usize, AirportsError> {
    header
        .iter()
        .position(|column| column == name)
        .ok_or(AirportsError::MissingColumn(name))
}

/// Reads an OurAirports style CSV (`ident`, `name`, `latitude_deg`, `longitude_deg`).
pub fn parse_airports_csv(content: &[u8]) -> AirportsResult {
    let unparsed_file = read_to_string(content)?;
    let mut records = AirportsParser::parse(Rule::airports, &unparsed_file)?
        .next()
        .unwrap()
        .into_inner()
        .filter(|pair| matches!(pair.as_rule(), Rule::record))
        .map(|record| record.into_inner().map(field_value).collect::<Vec<_>>())
        .filter(|fields| fields.iter().any(|field| !field.is_empty()));

    let header = records.next().unwrap_or_default();
    let ident = column(&header, "ident")?;
    let name = column(&header, "name")?;
    let lat = column(&header, "latitude_deg")?;
    let lon = column(&header, "longitude_deg")?;

    Ok(records.fold(HashMap::new(), |mut acc, fields| {
        let position = fields
            .get(lat)
            .zip(fields.get(lon))
            .and_then(|(lat, lon)| lat.parse::<f64>().ok().zip(lon.parse::<f64>().ok()));
        match (fields.get(ident), position) {
            (Some(designator), Some((lat, lon))) => {
                acc.entry(designator.clone()).or_insert(Airport {
                    ident: designator.clone(),
                    name: fields.get(name).cloned().unwrap_or_default(),
                    lat,
                    lon,
                });
            }
            _ => warn!("Could not read airport record {fields:?}"),
        }

        acc
    }))
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use geo::{coord, Coord};
    use pretty_assertions_sorted::assert_eq_sorted;

    use super::{parse_airports_csv, Airport, AirportLookup, AirportsError, WaypointLookup};

    #[test]
    fn test_airports() {
        let airports_bytes = br#"id,ident,type,name,latitude_deg,longitude_deg
1,ULLI,large_airport,"Pulkovo Airport",59.800301,30.262501
2,UUEE,large_airport,"Sheremetyevo International Airport, Moscow",55.972599,37.4146
3,XXXX,closed,"Broken ""quoted"" row",,
"#;

        let parsed = parse_airports_csv(airports_bytes).unwrap();

        assert_eq_sorted!(
            parsed,
            HashMap::from([
                (
                    "ULLI".to_string(),
                    Airport {
                        ident: "ULLI".to_string(),
                        name: "Pulkovo Airport".to_string(),
                        lat: 59.800_301,
                        lon: 30.262_501,
                    }
                ),
                (
                    "UUEE".to_string(),
                    Airport {
                        ident: "UUEE".to_string(),
                        name: "Sheremetyevo International Airport, Moscow".to_string(),
                        lat: 55.972_599,
                        lon: 37.4146,
                    }
                ),
            ])
        );
        assert_eq!(
            parsed.airport("ULLI").map(Airport::coordinate),
            Some(coord! { x: 30.262_501, y: 59.800_301 })
        );
        assert!(parsed.airport("EDDM").is_none());
    }

    #[test]
    fn test_airports_missing_column() {
        assert!(matches!(
            parse_airports_csv(b"ident,name\nULLI,Pulkovo\n"),
            Err(AirportsError::MissingColumn("latitude_deg"))
        ));
    }

    #[test]
    fn test_waypoint_lookups() {
        let table = HashMap::from([("ATKUP".to_string(), coord! { x: 30.5, y: 60.1 })]);
        assert_eq!(table.waypoint("ATKUP"), Some(coord! { x: 30.5, y: 60.1 }));
        assert_eq!(table.waypoint("LIMUS"), None);

        let function = |code: &str| -> Option<Coord> {
            (code == "LIMUS").then_some(coord! { x: 31.0, y: 60.2 })
        };
        assert_eq!(function.waypoint("LIMUS"), Some(coord! { x: 31.0, y: 60.2 }));
    }
}
