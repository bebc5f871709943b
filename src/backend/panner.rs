//! Pure-Rust reference backend.
//!
//! No HRTF data is involved: the "binaural" effect is an equal-power panner with an interaural
//! time delay, and air absorption is approximated with a one-pole low-pass per channel.

use super::{
    BinauralEffect, BinauralEffectParams, DirectEffect, DirectEffectParams, DirectEffectSettings,
    ReflectionEffectSettings, SimulationInputs, SimulationSource, SpatialBackend,
};
use crate::buffer::AudioBuffer;
use crate::config::AudioSettings;
use crate::error::{BinauraError, Result};
use std::f32::consts::FRAC_PI_4;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Largest interaural time difference, roughly a head width at the speed of sound.
const MAX_ITD_SECONDS: f32 = 0.00066;

/// Simulator-side bookkeeping shared by every clone of a [`PannerBackend`].
#[derive(Debug, Default)]
struct PannerShared {
    registered_sources: AtomicUsize,
}

#[derive(Debug, Clone, Default)]
pub struct PannerBackend {
    shared: Arc<PannerShared>,
}

impl PannerBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sources currently registered with the simulator.
    pub fn registered_sources(&self) -> usize {
        self.shared.registered_sources.load(Ordering::Relaxed)
    }

    /// Number of live references to the shared state, this one included.
    pub fn reference_count(&self) -> usize {
        Arc::strong_count(&self.shared)
    }
}

impl SpatialBackend for PannerBackend {
    type DirectEffect = PannerDirectEffect;
    type BinauralEffect = PannerBinauralEffect;
    type ReflectionEffect = PannerReflectionEffect;
    type Source = PannerSource;

    fn name(&self) -> &'static str {
        "panner"
    }

    fn create_direct_effect(
        &self,
        _audio_settings: &AudioSettings,
        settings: &DirectEffectSettings,
    ) -> Result<Self::DirectEffect> {
        if settings.num_channels == 0 {
            return Err(BinauraError::Backend(
                "direct effect needs at least one channel".into(),
            ));
        }
        Ok(PannerDirectEffect {
            lowpass_state: vec![0.0; settings.num_channels],
        })
    }

    fn create_binaural_effect(
        &self,
        audio_settings: &AudioSettings,
    ) -> Result<Self::BinauralEffect> {
        audio_settings.validate()?;
        let max_delay = (MAX_ITD_SECONDS * audio_settings.sample_rate as f32).ceil() as usize;
        Ok(PannerBinauralEffect {
            max_delay,
            mono: vec![0.0; audio_settings.frame_size],
            history: vec![0.0; max_delay],
        })
    }

    fn create_reflection_effect(
        &self,
        _audio_settings: &AudioSettings,
        settings: &ReflectionEffectSettings,
    ) -> Result<Self::ReflectionEffect> {
        Ok(PannerReflectionEffect {
            impulse_response_size: settings.impulse_response_size,
            num_channels: settings.num_channels,
        })
    }

    fn create_source(&self) -> Result<Self::Source> {
        Ok(PannerSource::default())
    }

    fn add_source(&self, _source: &Self::Source) {
        self.shared.registered_sources.fetch_add(1, Ordering::Relaxed);
    }

    fn remove_source(&self, _source: &Self::Source) {
        self.shared.registered_sources.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Gain plus a one-pole low-pass whose cutoff follows the high/low air absorption ratio.
#[derive(Debug)]
pub struct PannerDirectEffect {
    lowpass_state: Vec<f32>,
}

impl DirectEffect for PannerDirectEffect {
    fn apply(&mut self, params: &DirectEffectParams, input: &AudioBuffer, output: &mut AudioBuffer) {
        let gain = if params.apply_distance_attenuation {
            params.distance_attenuation
        } else {
            1.0
        };
        let (band_gain, coeff) = if params.apply_air_absorption {
            let [low, _, high] = params.air_absorption;
            let ratio = if low > 0.0 { (high / low).clamp(0.0, 1.0) } else { 0.0 };
            (low, 1.0 - ratio)
        } else {
            (1.0, 0.0)
        };

        let channels = input.num_channels().min(output.num_channels());
        for (index, state) in self.lowpass_state.iter_mut().enumerate().take(channels) {
            let src = input.channel(index);
            let dst = output.channel_mut(index);
            for (out, &x) in dst.iter_mut().zip(src) {
                // y[n] = x[n] + coeff * (y[n-1] - x[n])
                *state = x + coeff * (*state - x);
                *out = *state * band_gain * gain;
            }
        }
    }

    fn tail_size(&self) -> usize {
        0
    }
}

/// Equal-power panner with an interaural delay on the far ear.
#[derive(Debug)]
pub struct PannerBinauralEffect {
    max_delay: usize,
    mono: Vec<f32>,
    /// Last `max_delay` mono samples of the previous block.
    history: Vec<f32>,
}

impl PannerBinauralEffect {
    fn delayed(&self, frame: usize, delay: usize) -> f32 {
        if frame >= delay {
            self.mono[frame - delay]
        } else {
            self.history[self.max_delay - (delay - frame)]
        }
    }

    fn remember_tail(&mut self, frames: usize) {
        if self.max_delay == 0 {
            return;
        }
        if frames >= self.max_delay {
            self.history
                .copy_from_slice(&self.mono[frames - self.max_delay..frames]);
        } else {
            self.history.rotate_left(frames);
            let start = self.max_delay - frames;
            self.history[start..].copy_from_slice(&self.mono[..frames]);
        }
    }
}

impl BinauralEffect for PannerBinauralEffect {
    fn apply(
        &mut self,
        params: &BinauralEffectParams,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
    ) {
        output.silence();
        let frames = input
            .num_frames()
            .min(output.num_frames())
            .min(self.mono.len());
        let channels = input.num_channels();
        if channels == 0 || output.num_channels() == 0 {
            return;
        }

        self.mono[..frames].fill(0.0);
        for channel in input.channels() {
            for (acc, &x) in self.mono[..frames].iter_mut().zip(channel) {
                *acc += x;
            }
        }
        let scale = 1.0 / channels as f32;
        self.mono[..frames].iter_mut().for_each(|x| *x *= scale);

        let pan = params.direction.x.clamp(-1.0, 1.0);
        let theta = (pan + 1.0) * FRAC_PI_4;
        let (left_gain, right_gain) = (theta.cos(), theta.sin());
        let delay = (pan.abs() * self.max_delay as f32).round() as usize;
        let (left_delay, right_delay) = if pan > 0.0 { (delay, 0) } else { (0, delay) };

        let blend = params.spatial_blend.clamp(0.0, 1.0);
        let dry_left = input.channel(0);
        let dry_right = input.channel(if channels > 1 { 1 } else { 0 });

        for frame in 0..frames {
            let wet_left = self.delayed(frame, left_delay) * left_gain;
            let wet_right = self.delayed(frame, right_delay) * right_gain;
            let left = dry_left[frame] * (1.0 - blend) + wet_left * blend;
            let right = dry_right[frame] * (1.0 - blend) + wet_right * blend;

            output.channel_mut(0)[frame] = left;
            if output.num_channels() > 1 {
                output.channel_mut(1)[frame] = right;
            }
        }

        self.remember_tail(frames);
    }

    fn reset(&mut self) {
        self.history.fill(0.0);
    }

    fn tail_size(&self) -> usize {
        self.max_delay
    }
}

/// Placeholder convolution effect; the panner does not simulate reflections.
#[derive(Debug)]
pub struct PannerReflectionEffect {
    pub impulse_response_size: usize,
    pub num_channels: usize,
}

#[derive(Debug, Default)]
pub struct PannerSource {
    inputs: Option<SimulationInputs>,
}

impl PannerSource {
    pub fn inputs(&self) -> Option<&SimulationInputs> {
        self.inputs.as_ref()
    }
}

impl SimulationSource for PannerSource {
    fn set_inputs(&mut self, inputs: &SimulationInputs) {
        self.inputs = Some(*inputs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HrtfInterpolation;
    use crate::math::Vec3;

    fn settings() -> AudioSettings {
        AudioSettings::new().sample_rate(48000).frame_size(64)
    }

    fn binaural_params(direction: Vec3, spatial_blend: f32) -> BinauralEffectParams {
        BinauralEffectParams {
            direction,
            interpolation: HrtfInterpolation::Bilinear,
            spatial_blend,
        }
    }

    #[test]
    fn test_source_to_the_right_is_louder_on_the_right() {
        let backend = PannerBackend::new();
        let mut effect = backend.create_binaural_effect(&settings()).unwrap();
        let input = AudioBuffer::from_channels(&[&[1.0; 64]]);
        let mut output = AudioBuffer::new(2, 64);

        effect.apply(&binaural_params(Vec3::X, 1.0), &input, &mut output);

        assert!(output.peak(1) > 0.99);
        assert!(output.peak(0) < 0.01);
    }

    #[test]
    fn test_far_ear_is_delayed() {
        let backend = PannerBackend::new();
        let mut effect = backend.create_binaural_effect(&settings()).unwrap();
        let mut impulse = [0.0; 64];
        impulse[0] = 1.0;
        let input = AudioBuffer::from_channels(&[&impulse]);
        let mut output = AudioBuffer::new(2, 64);

        let direction = Vec3::new(0.5, 0.0, -0.5).normalize();
        effect.apply(&binaural_params(direction, 1.0), &input, &mut output);

        let first_nonzero = |channel: &[f32]| channel.iter().position(|&s| s != 0.0);
        assert_eq!(first_nonzero(output.channel(1)), Some(0));
        assert!(first_nonzero(output.channel(0)).unwrap() > 0);
    }

    #[test]
    fn test_zero_blend_is_dry() {
        let backend = PannerBackend::new();
        let mut effect = backend.create_binaural_effect(&settings()).unwrap();
        let input = AudioBuffer::from_channels(&[&[0.5; 64], &[-0.25; 64]]);
        let mut output = AudioBuffer::new(2, 64);

        effect.apply(&binaural_params(Vec3::X, 0.0), &input, &mut output);

        assert_eq!(output.channel(0), input.channel(0));
        assert_eq!(output.channel(1), input.channel(1));
    }

    #[test]
    fn test_tail_and_reset() {
        let backend = PannerBackend::new();
        let mut effect = backend.create_binaural_effect(&settings()).unwrap();
        assert_eq!(effect.tail_size(), 32);

        let input = AudioBuffer::from_channels(&[&[1.0; 64]]);
        let mut output = AudioBuffer::new(2, 64);
        effect.apply(&binaural_params(Vec3::X, 1.0), &input, &mut output);
        assert!(effect.history.iter().any(|&s| s != 0.0));

        effect.reset();
        assert!(effect.history.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_direct_effect_gain_and_air_absorption() {
        let backend = PannerBackend::new();
        let mut effect = backend
            .create_direct_effect(&settings(), &DirectEffectSettings { num_channels: 1 })
            .unwrap();
        let input = AudioBuffer::from_channels(&[&[1.0; 64]]);
        let mut output = AudioBuffer::new(1, 64);

        let params = DirectEffectParams {
            apply_distance_attenuation: true,
            apply_air_absorption: true,
            distance_attenuation: 0.5,
            air_absorption: [1.0, 1.0, 1.0],
        };
        effect.apply(&params, &input, &mut output);
        assert!(output.channel(0).iter().all(|&s| (s - 0.5).abs() < 1e-6));

        let damped = DirectEffectParams {
            air_absorption: [1.0, 0.8, 0.5],
            ..params
        };
        let mut fresh = backend
            .create_direct_effect(&settings(), &DirectEffectSettings { num_channels: 1 })
            .unwrap();
        fresh.apply(&damped, &input, &mut output);
        // Low-passed step response rises towards the DC gain.
        assert!(output.channel(0)[0] < output.channel(0)[63]);
        assert!(output.channel(0)[63] <= 0.5 + 1e-6);
    }

    #[test]
    fn test_source_registration_is_counted() {
        let backend = PannerBackend::new();
        let source = backend.create_source().unwrap();
        backend.add_source(&source);
        assert_eq!(backend.registered_sources(), 1);
        backend.remove_source(&source);
        assert_eq!(backend.registered_sources(), 0);
    }
}
