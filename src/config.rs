//! Configuration for binaura

use crate::attenuation::AttenuationCurveParams;
use crate::backend::HrtfInterpolation;
use crate::error::{BinauraError, Result};
use crate::spatial::distance::{AirAbsorptionModel, DistanceModel};

/// Current [`SpatializerConfig`] layout version.
///
/// * 0: distance model and attenuation curve only
/// * 1: adds spatial blend, HRTF interpolation and air absorption
pub const CONFIG_VERSION: u32 = 1;

/// Process-wide audio settings, queried once when an effect initializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSettings {
    pub sample_rate: u32,
    /// Fixed processing period in frames.
    pub frame_size: usize,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            frame_size: 1024,
        }
    }
}

impl AudioSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn frame_size(mut self, size: usize) -> Self {
        self.frame_size = size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(BinauraError::Configuration(
                "sample rate must be non-zero".into(),
            ));
        }
        if self.frame_size == 0 {
            return Err(BinauraError::Configuration(
                "frame size must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Converts a sample count to seconds at this sample rate.
    pub fn samples_to_seconds(&self, samples: usize) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        samples as f64 / self.sample_rate as f64
    }
}

/// Host-facing configuration of a spatializer effect.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatializerConfig {
    pub version: u32,
    pub distance_model: DistanceModel,
    pub attenuation: AttenuationCurveParams,
    pub spatial_blend: f32,
    pub interpolation: HrtfInterpolation,
    pub air_absorption: AirAbsorptionModel,
}

impl Default for SpatializerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            distance_model: DistanceModel::CustomCurve,
            attenuation: AttenuationCurveParams::default(),
            spatial_blend: 1.0,
            interpolation: HrtfInterpolation::Bilinear,
            air_absorption: AirAbsorptionModel::Default,
        }
    }
}

impl SpatializerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn distance_model(mut self, model: DistanceModel) -> Self {
        self.distance_model = model;
        self
    }

    pub fn attenuation(mut self, params: AttenuationCurveParams) -> Self {
        self.attenuation = params;
        self
    }

    pub fn spatial_blend(mut self, blend: f32) -> Self {
        self.spatial_blend = blend;
        self
    }

    pub fn interpolation(mut self, interpolation: HrtfInterpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn air_absorption(mut self, model: AirAbsorptionModel) -> Self {
        self.air_absorption = model;
        self
    }

    /// Upgrades a config stored by an older version to [`CONFIG_VERSION`].
    ///
    /// Version 0 configs did not persist blend, interpolation or air absorption, so whatever
    /// values they carry are replaced with defaults.
    pub fn migrate(mut self) -> Result<Self> {
        if self.version > CONFIG_VERSION {
            return Err(BinauraError::Configuration(format!(
                "config version {} is newer than supported version {}",
                self.version, CONFIG_VERSION
            )));
        }

        if self.version == 0 {
            let defaults = Self::default();
            self.spatial_blend = defaults.spatial_blend;
            self.interpolation = defaults.interpolation;
            self.air_absorption = defaults.air_absorption;
            log::info!("Migrated spatializer config from version 0 to {}", CONFIG_VERSION);
        }

        self.version = CONFIG_VERSION;
        Ok(self)
    }
}
