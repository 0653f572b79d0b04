use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::enums::{FourthViewMode, Interpolation};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tunable constants of the reslice engine.
///
/// Every field has a default, so a configuration file only needs to name the
/// values it overrides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Control point hit radius in screen pixels, divided by the view zoom
    /// before hit-testing in data space.
    pub hit_tolerance_px: f64,
    pub line_length_fraction: f64,
    pub control_offset_fraction: f64,
    /// Edge length of the square resample grid.
    pub output_size: usize,
    /// Value written for samples outside the volume.
    pub background: f32,
    pub interpolation: Interpolation,
    pub outline_isovalue: f32,
    pub min_contour_points: usize,
    pub fourth_view_mode: FourthViewMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hit_tolerance_px: 15.0,
            line_length_fraction: 0.8,
            control_offset_fraction: 0.05,
            output_size: 256,
            background: -1.0,
            interpolation: Interpolation::Linear,
            outline_isovalue: 0.5,
            min_contour_points: 8,
            fourth_view_mode: FourthViewMode::Oblique,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration from a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not valid JSON
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }
}
