use std::io;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

pub mod abbreviations;
pub mod altitude;
pub mod cascade;
pub mod config;
pub mod coordinate;
pub mod feature;
pub mod geometry;
pub mod lookup;
pub mod notam;

pub use abbreviations::{AbbreviationDecoder, DecodeError};
pub use cascade::Cascade;
pub use config::GeometryConfig;
pub use feature::{to_feature, to_feature_collection, FeatureAssembler};
pub use geometry::{GeometryError, GeometryPart, PartKind};
pub use notam::{Notam, NotamError};

fn read_to_string(contents: &[u8]) -> Result<String, io::Error> {
    String::from_utf8(contents.to_vec()).or_else(|_| {
        let (string, _, errors) = encoding_rs::WINDOWS_1252.decode(contents);
        if errors {
            warn!("errors while decoding win-1252");
        }
        Ok(string.to_string())
    })
}

static TELEGRAM_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\([A-Z][0-9]{4}/[0-9]{2}\s+NOTAM[NRC]\b").unwrap());

/// Cuts a bulletin into single telegrams at lines opening a NOTAM header.
///
/// Line endings are normalised, trailing whitespace is stripped per line and
/// anything before the first header is dropped.
pub fn split_bulletin(text: &str) -> Vec<String> {
    let text = text.trim_start_matches('\u{feff}').replace("\r\n", "\n").replace('\r', "\n");

    let mut blocks: Vec<Vec<&str>> = Vec::new();
    for line in text.lines().map(str::trim_end) {
        if TELEGRAM_START.is_match(line) {
            blocks.push(vec![line.trim_start()]);
        } else if let Some(block) = blocks.last_mut() {
            block.push(line);
        }
    }

    blocks
        .into_iter()
        .map(|lines| lines.join("\n").trim().to_string())
        .filter(|block| !block.is_empty())
        .collect()
}

#[derive(Debug)]
pub struct BulletinFailure {
    /// Position of the telegram within the bulletin.
    pub index: usize,
    pub text: String,
    pub error: NotamError,
}

#[derive(Debug, Default)]
pub struct Bulletin {
    pub notams: Vec<Notam>,
    pub failures: Vec<BulletinFailure>,
}

/// Parses every telegram of a bulletin, keeping failures next to the results.
pub fn parse_bulletin(text: &str, cascade: &Cascade) -> Bulletin {
    split_bulletin(text)
        .into_iter()
        .enumerate()
        .fold(Bulletin::default(), |mut acc, (index, block)| {
            match Notam::parse_with(&block, cascade) {
                Ok(notam) => acc.notams.push(notam),
                Err(error) => {
                    warn!("Could not parse NOTAM {index} of bulletin: {error}");
                    acc.failures.push(BulletinFailure {
                        index,
                        text: block,
                        error,
                    });
                }
            }

            acc
        })
}

#[cfg(test)]
mod test {
    use super::{parse_bulletin, split_bulletin, Cascade, NotamError};

    const BULLETIN: &str = "ULLL:\r\n(A0001/25 NOTAMN\r\nQ)ULLL/QRTCA/IV/BO/W/000/050/\r\nA)ULLL B)2509050601\r\nE)AIRSPACE CLSD)   \r\n\r\n(A0002/25 NOTAMN\r\nQ)ULLL/QRTCA/IV\r\nA)ULLL B)2509050601\r\nE)BROKEN Q)\r\n(A0003/25 NOTAMC A0001/25\r\nQ)ULLL/QRTCA/IV/BO/W/000/050/\r\nA)ULLL B)2509060000\r\nE)CANCELLED)\r\n";

    #[test]
    fn test_split_bulletin() {
        let blocks = split_bulletin(BULLETIN);
        assert_eq!(blocks.len(), 3);
        assert_eq!(
            blocks[0],
            "(A0001/25 NOTAMN\nQ)ULLL/QRTCA/IV/BO/W/000/050/\nA)ULLL B)2509050601\nE)AIRSPACE CLSD)"
        );
        assert!(blocks[2].starts_with("(A0003/25 NOTAMC A0001/25"));
        assert!(split_bulletin("no telegrams here\n").is_empty());
    }

    #[test]
    fn test_parse_bulletin() {
        let bulletin = parse_bulletin(BULLETIN, &Cascade::default());

        assert_eq!(
            bulletin
                .notams
                .iter()
                .map(|notam| notam.notam_id.as_str())
                .collect::<Vec<_>>(),
            vec!["A0001/25", "A0003/25"]
        );
        assert_eq!(bulletin.failures.len(), 1);
        assert_eq!(bulletin.failures[0].index, 1);
        assert!(bulletin.failures[0].text.starts_with("(A0002/25"));
        assert!(matches!(bulletin.failures[0].error, NotamError::QClause(_)));
    }
}
