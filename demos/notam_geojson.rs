use std::io;
use std::{env::args_os, fs};

use notam_parser::{parse_bulletin, AbbreviationDecoder, Cascade, FeatureAssembler, GeometryConfig};
use tracing::warn;

fn main() {
    tracing_subscriber::fmt().with_writer(io::stderr).init();
    let bulletin_path = args_os().nth(1).expect("missing argument: path to NOTAM bulletin");
    let geojson_path = args_os()
        .nth(2)
        .expect("missing argument: path to .geojson output");
    let config = args_os().nth(3).map_or_else(GeometryConfig::default, |path| {
        GeometryConfig::from_json(&fs::read(path).expect("could not read config"))
            .expect("invalid config")
    });

    let text = fs::read_to_string(bulletin_path).expect("could not read bulletin");
    let bulletin = parse_bulletin(&text, &Cascade::new(config.clone()));
    for failure in &bulletin.failures {
        warn!("telegram {} skipped: {}", failure.index, failure.error);
    }

    let decoder = AbbreviationDecoder::icao();
    let feature_collection = FeatureAssembler::new(config)
        .with_decoder(&decoder)
        .collection(&bulletin.notams);

    fs::write(geojson_path, feature_collection.to_string()).expect("could not write .geojson");
}
