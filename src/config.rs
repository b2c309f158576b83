use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::read_to_string;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read geometry config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to deserialize geometry config: {0}")]
    Deserialize(#[from] serde_json::Error),
}

/// Tunables for the text geometry cascade and the feature fallbacks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    pub circle_segments: usize,
    pub sector_segments: usize,
    pub ellipse_segments: usize,
    pub arc_segments: usize,
    /// Mitre ratio limit for corridor buffer joins.
    pub mitre_limit: f64,
    /// Q) radii at or above this many NM are too coarse to draw.
    pub max_area_radius_nm: u16,
    pub default_lower: String,
    pub default_upper: String,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            circle_segments: 128,
            sector_segments: 128,
            ellipse_segments: 128,
            arc_segments: 128,
            mitre_limit: 5.0,
            max_area_radius_nm: 500,
            default_lower: "SFC".to_string(),
            default_upper: "UNL".to_string(),
        }
    }
}

impl GeometryConfig {
    pub fn from_json(content: &[u8]) -> Result<Self, ConfigError> {
        let content = read_to_string(content)?;
        Ok(serde_json::from_str(&content)?)
    }
}
