//! Tunables for drawing, erasing and text placement.

use crate::error::ValidationError;
use crate::model::RgbHex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default minimum pointer travel, in canvas pixels, before a point is recorded.
pub const DEFAULT_MIN_MOVE_DISTANCE: f64 = 2.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse canvas config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Canvas behaviour settings. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Moves shorter than this from the last recorded point are dropped.
    pub min_move_distance: f64,
    /// Eraser radius as a multiple of the current width.
    pub eraser_width_factor: f64,
    /// A stroke is hit within this multiple of its own width.
    pub stroke_hit_width_factor: f64,
    /// Texts are hit when their anchor is within this distance.
    pub text_erase_radius: f64,
    /// Text size as a multiple of the current width.
    pub text_size_factor: f64,
    pub default_color: RgbHex,
    pub default_width: f64,
    pub min_width: f64,
    pub max_width: f64,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            min_move_distance: DEFAULT_MIN_MOVE_DISTANCE,
            eraser_width_factor: 3.0,
            stroke_hit_width_factor: 2.0,
            text_erase_radius: 50.0,
            text_size_factor: 5.0,
            default_color: RgbHex::BLACK,
            default_width: 3.0,
            min_width: 1.0,
            max_width: 20.0,
        }
    }
}

impl CanvasConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let non_negative = [("min_move_distance", self.min_move_distance)];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ValidationError::InvalidSetting { name, value });
            }
        }
        let positive = [
            ("eraser_width_factor", self.eraser_width_factor),
            ("stroke_hit_width_factor", self.stroke_hit_width_factor),
            ("text_erase_radius", self.text_erase_radius),
            ("text_size_factor", self.text_size_factor),
            ("min_width", self.min_width),
            ("max_width", self.max_width),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ValidationError::InvalidSetting { name, value });
            }
        }
        if self.min_width > self.max_width {
            return Err(ValidationError::InvalidSetting {
                name: "min_width",
                value: self.min_width,
            });
        }
        if !(self.min_width..=self.max_width).contains(&self.default_width) {
            return Err(ValidationError::InvalidWidth(self.default_width));
        }
        Ok(())
    }

    /// Validate a user-chosen width and clamp it into the allowed range.
    pub fn clamp_width(&self, width: f64) -> Result<f64, ValidationError> {
        if !(width.is_finite() && width > 0.0) {
            return Err(ValidationError::InvalidWidth(width));
        }
        Ok(width.clamp(self.min_width, self.max_width))
    }

    pub fn eraser_radius(&self, width: f64) -> f64 {
        width * self.eraser_width_factor
    }

    pub fn text_size(&self, width: f64) -> f64 {
        width * self.text_size_factor
    }
}
