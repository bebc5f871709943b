use crate::backend::{
    BinauralEffect, BinauralEffectParams, DirectEffect, DirectEffectParams, DirectEffectSettings,
    ReflectionEffectSettings, SimulationInputs, SimulationSource, SpatialBackend,
};
use crate::buffer::AudioBuffer;
use crate::config::AudioSettings;

/// Owns the DSP effect handles of one spatializer instance.
///
/// Holds its own reference to the backend's shared state for as long as any handle is alive and
/// gives it back in [`EffectLifecycle::release`].
pub struct EffectLifecycle<B: SpatialBackend> {
    backend: Option<B>,
    audio_settings: AudioSettings,
    direct_effect: Option<B::DirectEffect>,
    direct_channels: usize,
    /// Channel count whose direct effect failed to create; not retried until it changes.
    failed_direct_channels: Option<usize>,
    binaural_effect: Option<B::BinauralEffect>,
    reflection_effect: Option<B::ReflectionEffect>,
    source: Option<B::Source>,
    scratch: AudioBuffer,
}

impl<B: SpatialBackend> EffectLifecycle<B> {
    /// Retains `backend` and creates the binaural effect, reflection effect and simulation source.
    ///
    /// Creation failures are logged and leave the corresponding handle absent.
    pub fn new(backend: &B, audio_settings: AudioSettings) -> Self {
        let backend = backend.clone();

        let binaural_effect = match backend.create_binaural_effect(&audio_settings) {
            Ok(effect) => Some(effect),
            Err(e) => {
                log::error!("Failed to create binaural effect: {}", e);
                None
            }
        };

        let source = match backend.create_source() {
            Ok(source) => {
                backend.add_source(&source);
                Some(source)
            }
            Err(e) => {
                log::error!("Failed to create simulation source: {}", e);
                None
            }
        };

        let reflection_settings = ReflectionEffectSettings::convolution(&audio_settings);
        let reflection_effect =
            match backend.create_reflection_effect(&audio_settings, &reflection_settings) {
                Ok(effect) => Some(effect),
                Err(e) => {
                    log::error!("Failed to create reflection effect: {}", e);
                    None
                }
            };

        log::info!(
            "Created {} spatializer effects (binaural: {}, source: {}, reflection: {})",
            backend.name(),
            binaural_effect.is_some(),
            source.is_some(),
            reflection_effect.is_some()
        );

        Self {
            backend: Some(backend),
            audio_settings,
            direct_effect: None,
            direct_channels: 0,
            failed_direct_channels: None,
            binaural_effect,
            reflection_effect,
            source,
            scratch: AudioBuffer::default(),
        }
    }

    /// Makes sure a direct effect sized for `num_channels` exists.
    ///
    /// A channel-count change drops the old effect before creating the new one. Returns `false`
    /// when no usable direct effect is available; the failure is logged once per channel count.
    pub fn ensure_direct_effect(&mut self, num_channels: usize) -> bool {
        if self.direct_effect.is_some() && self.direct_channels == num_channels {
            return true;
        }
        if self.failed_direct_channels == Some(num_channels) {
            return false;
        }
        let Some(backend) = self.backend.as_ref() else {
            return false;
        };

        if self.direct_effect.take().is_some() {
            log::debug!(
                "Input channel count changed from {} to {}, recreating direct effect",
                self.direct_channels,
                num_channels
            );
        }
        self.direct_channels = 0;

        match backend.create_direct_effect(&self.audio_settings, &DirectEffectSettings { num_channels })
        {
            Ok(effect) => {
                self.direct_effect = Some(effect);
                self.direct_channels = num_channels;
                self.failed_direct_channels = None;
                true
            }
            Err(e) => {
                log::error!(
                    "Failed to create direct effect with {} channels: {}",
                    num_channels,
                    e
                );
                self.failed_direct_channels = Some(num_channels);
                false
            }
        }
    }

    /// Resizes the scratch buffer. Returns `true` if it had to be reallocated.
    pub fn ensure_scratch_buffer(&mut self, num_channels: usize, num_frames: usize) -> bool {
        let reallocated = self.scratch.resize(num_channels, num_frames);
        if reallocated {
            log::debug!(
                "Reallocated scratch buffer to {} channels x {} frames",
                num_channels,
                num_frames
            );
        }
        reallocated
    }

    /// Runs the direct effect into the scratch buffer, then the binaural effect into `output`.
    ///
    /// Returns `false` without touching `output` if either effect is missing.
    pub(crate) fn render(
        &mut self,
        direct_params: &DirectEffectParams,
        binaural_params: &BinauralEffectParams,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
    ) -> bool {
        let (Some(direct), Some(binaural)) =
            (self.direct_effect.as_mut(), self.binaural_effect.as_mut())
        else {
            return false;
        };

        direct.apply(direct_params, input, &mut self.scratch);
        binaural.apply(binaural_params, &self.scratch, output);
        true
    }

    pub fn set_simulation_inputs(&mut self, inputs: &SimulationInputs) {
        if let Some(source) = self.source.as_mut() {
            source.set_inputs(inputs);
        }
    }

    pub fn reset(&mut self) {
        if let Some(binaural) = self.binaural_effect.as_mut() {
            binaural.reset();
        }
    }

    /// Longest remaining tail of the binaural and direct effects, in samples.
    pub fn tail_samples(&self) -> usize {
        let binaural = self
            .binaural_effect
            .as_ref()
            .map_or(0, |effect| effect.tail_size());
        let direct = self
            .direct_effect
            .as_ref()
            .map_or(0, |effect| effect.tail_size());
        binaural.max(direct)
    }

    pub fn has_binaural_effect(&self) -> bool {
        self.binaural_effect.is_some()
    }

    pub fn has_direct_effect(&self) -> bool {
        self.direct_effect.is_some()
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn direct_channels(&self) -> usize {
        self.direct_channels
    }

    pub fn scratch(&self) -> &AudioBuffer {
        &self.scratch
    }

    pub fn is_released(&self) -> bool {
        self.backend.is_none()
    }

    /// Releases every handle exactly once.
    ///
    /// The source is unregistered before it is dropped, effects are dropped before the retained
    /// backend reference. Calling this again is a no-op.
    pub fn release(&mut self) {
        let Some(backend) = self.backend.take() else {
            return;
        };

        if let Some(source) = self.source.take() {
            backend.remove_source(&source);
            drop(source);
        }

        self.scratch = AudioBuffer::default();
        self.reflection_effect = None;
        self.binaural_effect = None;
        self.direct_effect = None;
        self.direct_channels = 0;
        self.failed_direct_channels = None;

        log::info!("Released {} spatializer effects", backend.name());
    }
}

impl<B: SpatialBackend> Drop for EffectLifecycle<B> {
    fn drop(&mut self) {
        self.release();
    }
}
