// Heatmap configuration.
//
// Every field has a default; a partial TOML document overrides only the
// fields it names.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::palette::check_stops;
use crate::types::{Color, GradientStop};

/// Default color ramp: blue → green → yellow → red.
pub fn default_gradient() -> Vec<GradientStop> {
    vec![
        GradientStop::new(0.25, Color::rgb(0, 0, 255)),
        GradientStop::new(0.55, Color::rgb(0, 255, 0)),
        GradientStop::new(0.85, Color::rgb(255, 255, 0)),
        GradientStop::new(1.0, Color::rgb(255, 0, 0)),
    ]
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapOptions {
    /// Value mapped to zero opacity.
    pub min: f32,
    /// Value mapped to full opacity. Must be greater than `min`.
    pub max: f32,
    /// Attach the density and palette surfaces for inspection.
    pub debug: bool,
    /// Ordered 4x4 dithering between adjacent palette buckets.
    pub dither: bool,
    /// Number of palette buckets.
    pub palette_size: usize,
    pub gradient: Vec<GradientStop>,
}

impl Default for HeatmapOptions {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 10.0,
            debug: false,
            dither: true,
            palette_size: 64,
            gradient: default_gradient(),
        }
    }
}

impl HeatmapOptions {
    pub fn from_toml(src: &str) -> Result<Self> {
        let options: Self = toml::from_str(src)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(Error::Configuration("min and max must be finite".into()));
        }
        if self.max <= self.min {
            return Err(Error::Configuration(format!(
                "max ({}) must be greater than min ({})",
                self.max, self.min
            )));
        }
        if self.palette_size == 0 {
            return Err(Error::Configuration("palette_size must be positive".into()));
        }
        check_stops(&self.gradient)
    }
}
