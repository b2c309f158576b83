use geo::{Geometry, Point};
use geojson::{feature::Id, Feature, FeatureCollection, JsonObject};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;
use uom::si::{
    f64::Length,
    length::{meter, nautical_mile},
};

use crate::{
    abbreviations::AbbreviationDecoder,
    config::GeometryConfig,
    geometry::builders::build_circle,
    lookup::AirportLookup,
    notam::{Notam, QArea},
};

/// Where a feature's geometry came from, most precise first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeometrySource {
    /// Shapes recognised in the E) clause.
    Text,
    /// Centre and radius of the Q) clause.
    QArea,
    /// Reference point of the first A) location.
    Airport,
}

/// Turns parsed NOTAMs into GeoJSON features.
pub struct FeatureAssembler<'a> {
    config: GeometryConfig,
    airports: Option<&'a dyn AirportLookup>,
    decoder: Option<&'a AbbreviationDecoder>,
}

impl Default for FeatureAssembler<'_> {
    fn default() -> Self {
        Self::new(GeometryConfig::default())
    }
}

impl<'a> FeatureAssembler<'a> {
    pub fn new(config: GeometryConfig) -> Self {
        Self {
            config,
            airports: None,
            decoder: None,
        }
    }

    pub fn with_airports(mut self, airports: &'a dyn AirportLookup) -> Self {
        self.airports = Some(airports);
        self
    }

    /// Adds a `decoded` property with the abbreviations of D) to G) expanded.
    pub fn with_decoder(mut self, decoder: &'a AbbreviationDecoder) -> Self {
        self.decoder = Some(decoder);
        self
    }

    fn area_geometry(&self, notam: &Notam, area: &QArea) -> Option<Geometry> {
        let center = match area.center() {
            Ok(center) => center,
            Err(e) => {
                warn!("{}: unusable Q) area: {e}", notam.notam_id);
                return None;
            }
        };

        if area.radius == 0 || area.radius >= self.config.max_area_radius_nm {
            return Some(Point::from(center).into());
        }

        let radius = Length::new::<nautical_mile>(f64::from(area.radius)).get::<meter>();
        match build_circle(center, radius, self.config.circle_segments) {
            Ok(circle) => Some(circle.into()),
            Err(e) => {
                warn!("{}: could not draw Q) area: {e}", notam.notam_id);
                Some(Point::from(center).into())
            }
        }
    }

    /// Text geometry, then the Q) area, then the airport reference point.
    pub fn geometry(&self, notam: &Notam) -> Option<(Geometry, GeometrySource)> {
        if let Some(geometry) = &notam.geometry {
            return Some((geometry.clone(), GeometrySource::Text));
        }

        if let Some(geometry) = notam
            .area
            .as_ref()
            .and_then(|area| self.area_geometry(notam, area))
        {
            return Some((geometry, GeometrySource::QArea));
        }

        self.airports
            .and_then(|airports| airports.airport(notam.location.first()?))
            .map(|airport| (Point::from(airport.coordinate()).into(), GeometrySource::Airport))
    }

    fn properties(&self, notam: &Notam, source: GeometrySource) -> JsonObject {
        let parts = notam
            .parts
            .iter()
            .map(|part| {
                json!({
                    "kind": part.kind,
                    "alt_from": part.altitude_from,
                    "alt_to": part.altitude_to,
                    "index": part.index,
                    "raw": part.raw,
                })
            })
            .collect::<Vec<_>>();

        let mut properties = JsonObject::from_iter(vec![
            ("notam_id".to_string(), notam.notam_id.clone().into()),
            ("notam_type".to_string(), json!(notam.notam_type)),
            ("ref_notam_id".to_string(), json!(notam.ref_notam_id)),
            ("fir".to_string(), notam.fir.clone().into()),
            ("notam_code".to_string(), notam.notam_code.clone().into()),
            ("location".to_string(), json!(notam.location)),
            ("valid_from".to_string(), json!(notam.valid_from)),
            ("valid_till".to_string(), json!(notam.valid_till)),
            ("schedule".to_string(), json!(notam.schedule)),
            ("body".to_string(), notam.body.clone().into()),
            ("fl_lower".to_string(), json!(notam.fl_lower)),
            ("fl_upper".to_string(), json!(notam.fl_upper)),
            ("limit_lower".to_string(), json!(notam.limit_lower)),
            ("limit_upper".to_string(), json!(notam.limit_upper)),
            ("parts".to_string(), Value::Array(parts)),
            ("geometry_source".to_string(), json!(source)),
        ]);

        if let Some(decoder) = self.decoder {
            match decoder.decode_notam(notam) {
                Ok(decoded) => {
                    properties.insert("decoded".to_string(), decoded.into());
                }
                Err(e) => {
                    warn!("{}: could not decode abbreviations: {e}", notam.notam_id);
                    properties.insert("decode_error".to_string(), e.to_string().into());
                }
            }
        }

        properties
    }

    /// `None` when no geometry could be derived for the record.
    pub fn assemble(&self, notam: &Notam) -> Option<Feature> {
        let (geometry, source) = self.geometry(notam)?;
        Some(Feature {
            id: Some(Id::String(notam.notam_id.clone())),
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&geometry))),
            properties: Some(self.properties(notam, source)),
            ..Default::default()
        })
    }

    pub fn collection<'n>(&self, notams: impl IntoIterator<Item = &'n Notam>) -> FeatureCollection {
        FeatureCollection::from_iter(notams.into_iter().filter_map(|notam| self.assemble(notam)))
    }
}

pub fn to_feature(notam: &Notam) -> Option<Feature> {
    FeatureAssembler::default().assemble(notam)
}

pub fn to_feature_collection(notams: &[Notam]) -> FeatureCollection {
    FeatureAssembler::default().collection(notams)
}
