//! Capability interface over the spatial audio DSP engine.
//!
//! The pipeline never talks to a concrete SDK. It creates effects through a
//! [`SpatialBackend`], applies them through the [`DirectEffect`] / [`BinauralEffect`] traits,
//! and releases them by dropping the handle.
//!
//! Cloning a backend retains another reference to its shared state (context, HRTF, scene,
//! simulator); dropping the clone releases that reference.

pub mod panner;
#[cfg(feature = "steam-audio")]
pub mod steam;

#[cfg(test)]
pub(crate) mod mock;

use crate::buffer::AudioBuffer;
use crate::config::AudioSettings;
use crate::error::Result;
use crate::math::{Pose, Vec3};
use crate::spatial::distance::{AirAbsorptionModel, DistanceModel};

pub use panner::PannerBackend;
#[cfg(feature = "steam-audio")]
pub use steam::SteamAudioBackend;

/// Number of rays used to estimate occlusion around a source.
pub const NUM_OCCLUSION_SAMPLES: u32 = 32;
/// Number of rays used to estimate transmission through geometry.
pub const NUM_TRANSMISSION_RAYS: u32 = 32;

/// HRTF interpolation used by the binaural renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HrtfInterpolation {
    Nearest,
    #[default]
    Bilinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectEffectSettings {
    pub num_channels: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReflectionEffectSettings {
    /// Impulse response length in samples.
    pub impulse_response_size: usize,
    pub num_channels: usize,
}

impl ReflectionEffectSettings {
    /// Two second stereo convolution reverb.
    pub fn convolution(settings: &AudioSettings) -> Self {
        Self {
            impulse_response_size: settings.sample_rate as usize * 2,
            num_channels: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectEffectParams {
    pub apply_distance_attenuation: bool,
    pub apply_air_absorption: bool,
    pub distance_attenuation: f32,
    /// Low, mid and high band gains.
    pub air_absorption: [f32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinauralEffectParams {
    /// Unit vector towards the source in listener space.
    pub direction: Vec3,
    pub interpolation: HrtfInterpolation,
    /// 0 = dry, 1 = fully spatialized.
    pub spatial_blend: f32,
}

/// Per-source inputs for the engine's simulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationInputs {
    pub source: Pose,
    pub occlusion_radius: f32,
    pub num_occlusion_samples: u32,
    pub num_transmission_rays: u32,
    pub distance_model: DistanceModel,
    pub air_absorption: AirAbsorptionModel,
}

/// Direct-path filter: distance attenuation and air absorption.
pub trait DirectEffect: Send {
    fn apply(&mut self, params: &DirectEffectParams, input: &AudioBuffer, output: &mut AudioBuffer);

    /// Samples still audible after input stops.
    fn tail_size(&self) -> usize;
}

/// HRTF renderer producing stereo output.
pub trait BinauralEffect: Send {
    fn apply(
        &mut self,
        params: &BinauralEffectParams,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
    );

    /// Clears internal filter state.
    fn reset(&mut self);

    fn tail_size(&self) -> usize;
}

/// Per-instance source registered with the engine's simulator.
pub trait SimulationSource: Send {
    fn set_inputs(&mut self, inputs: &SimulationInputs);
}

/// Factory for DSP effects plus the shared simulator they register with.
pub trait SpatialBackend: Clone + Send + 'static {
    type DirectEffect: DirectEffect;
    type BinauralEffect: BinauralEffect;
    /// Only lifecycle-managed; geometry-based reverb is not computed by this crate.
    type ReflectionEffect: Send;
    type Source: SimulationSource;

    /// Human readable backend name used in logs.
    fn name(&self) -> &'static str;

    fn create_direct_effect(
        &self,
        audio_settings: &AudioSettings,
        settings: &DirectEffectSettings,
    ) -> Result<Self::DirectEffect>;

    fn create_binaural_effect(&self, audio_settings: &AudioSettings)
    -> Result<Self::BinauralEffect>;

    fn create_reflection_effect(
        &self,
        audio_settings: &AudioSettings,
        settings: &ReflectionEffectSettings,
    ) -> Result<Self::ReflectionEffect>;

    fn create_source(&self) -> Result<Self::Source>;

    /// Registers a source with the simulator.
    fn add_source(&self, source: &Self::Source);

    /// Unregisters a source. Must be called before the source is dropped.
    fn remove_source(&self, source: &Self::Source);
}
