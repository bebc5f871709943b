//! Counting backend used by unit tests.

use super::{
    BinauralEffect, BinauralEffectParams, DirectEffect, DirectEffectParams, DirectEffectSettings,
    ReflectionEffectSettings, SimulationInputs, SimulationSource, SpatialBackend,
};
use crate::buffer::AudioBuffer;
use crate::config::AudioSettings;
use crate::error::{BinauraError, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) const MOCK_DIRECT_TAIL: usize = 12;
pub(crate) const MOCK_BINAURAL_TAIL: usize = 480;

#[derive(Debug, Default)]
pub(crate) struct MockStats {
    pub direct_created: AtomicUsize,
    pub direct_released: AtomicUsize,
    pub direct_attempts: AtomicUsize,
    pub binaural_created: AtomicUsize,
    pub binaural_released: AtomicUsize,
    pub binaural_resets: AtomicUsize,
    pub reflection_created: AtomicUsize,
    pub reflection_released: AtomicUsize,
    pub sources_registered: AtomicUsize,
    pub fail_direct: AtomicBool,
    pub fail_binaural: AtomicBool,
    pub events: Mutex<Vec<&'static str>>,
    pub last_direct: Mutex<Option<DirectEffectParams>>,
    pub last_binaural: Mutex<Option<BinauralEffectParams>>,
    pub last_inputs: Mutex<Option<SimulationInputs>>,
    pub inputs_updates: AtomicUsize,
}

impl MockStats {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn record(&self, event: &'static str) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }

    pub fn last_binaural(&self) -> Option<BinauralEffectParams> {
        *self.last_binaural.lock().unwrap()
    }

    pub fn last_direct(&self) -> Option<DirectEffectParams> {
        *self.last_direct.lock().unwrap()
    }

    pub fn last_inputs(&self) -> Option<SimulationInputs> {
        *self.last_inputs.lock().unwrap()
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockBackend {
    pub stats: Arc<MockStats>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_direct() -> Self {
        let backend = Self::new();
        backend.stats.fail_direct.store(true, Ordering::SeqCst);
        backend
    }

    pub fn failing_binaural() -> Self {
        let backend = Self::new();
        backend.stats.fail_binaural.store(true, Ordering::SeqCst);
        backend
    }
}

impl SpatialBackend for MockBackend {
    type DirectEffect = MockDirectEffect;
    type BinauralEffect = MockBinauralEffect;
    type ReflectionEffect = MockReflectionEffect;
    type Source = MockSource;

    fn name(&self) -> &'static str {
        "mock"
    }

    fn create_direct_effect(
        &self,
        _audio_settings: &AudioSettings,
        settings: &DirectEffectSettings,
    ) -> Result<Self::DirectEffect> {
        self.stats.direct_attempts.fetch_add(1, Ordering::SeqCst);
        if self.stats.fail_direct.load(Ordering::SeqCst) {
            return Err(BinauraError::Backend("mock direct effect failure".into()));
        }
        self.stats.direct_created.fetch_add(1, Ordering::SeqCst);
        self.stats.record("create direct");
        Ok(MockDirectEffect {
            num_channels: settings.num_channels,
            stats: self.stats.clone(),
        })
    }

    fn create_binaural_effect(
        &self,
        _audio_settings: &AudioSettings,
    ) -> Result<Self::BinauralEffect> {
        if self.stats.fail_binaural.load(Ordering::SeqCst) {
            return Err(BinauraError::Backend("mock binaural effect failure".into()));
        }
        self.stats.binaural_created.fetch_add(1, Ordering::SeqCst);
        self.stats.record("create binaural");
        Ok(MockBinauralEffect {
            stats: self.stats.clone(),
        })
    }

    fn create_reflection_effect(
        &self,
        _audio_settings: &AudioSettings,
        _settings: &ReflectionEffectSettings,
    ) -> Result<Self::ReflectionEffect> {
        self.stats.reflection_created.fetch_add(1, Ordering::SeqCst);
        self.stats.record("create reflection");
        Ok(MockReflectionEffect {
            stats: self.stats.clone(),
        })
    }

    fn create_source(&self) -> Result<Self::Source> {
        self.stats.record("create source");
        Ok(MockSource {
            stats: self.stats.clone(),
        })
    }

    fn add_source(&self, _source: &Self::Source) {
        self.stats.sources_registered.fetch_add(1, Ordering::SeqCst);
        self.stats.record("add source");
    }

    fn remove_source(&self, _source: &Self::Source) {
        self.stats.sources_registered.fetch_sub(1, Ordering::SeqCst);
        self.stats.record("remove source");
    }
}

#[derive(Debug)]
pub(crate) struct MockDirectEffect {
    pub num_channels: usize,
    stats: Arc<MockStats>,
}

impl DirectEffect for MockDirectEffect {
    fn apply(&mut self, params: &DirectEffectParams, input: &AudioBuffer, output: &mut AudioBuffer) {
        assert_eq!(input.num_channels(), self.num_channels);
        *self.stats.last_direct.lock().unwrap() = Some(*params);
        for (dst, src) in output.channels_mut().zip(input.channels()) {
            for (out, &x) in dst.iter_mut().zip(src) {
                *out = x * params.distance_attenuation;
            }
        }
    }

    fn tail_size(&self) -> usize {
        MOCK_DIRECT_TAIL
    }
}

impl Drop for MockDirectEffect {
    fn drop(&mut self) {
        self.stats.direct_released.fetch_add(1, Ordering::SeqCst);
        self.stats.record("release direct");
    }
}

/// Copies the first input channel to every output channel.
#[derive(Debug)]
pub(crate) struct MockBinauralEffect {
    stats: Arc<MockStats>,
}

impl BinauralEffect for MockBinauralEffect {
    fn apply(
        &mut self,
        params: &BinauralEffectParams,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
    ) {
        *self.stats.last_binaural.lock().unwrap() = Some(*params);
        let source = input.channel(0);
        for channel in output.channels_mut() {
            channel.copy_from_slice(source);
        }
    }

    fn reset(&mut self) {
        self.stats.binaural_resets.fetch_add(1, Ordering::SeqCst);
    }

    fn tail_size(&self) -> usize {
        MOCK_BINAURAL_TAIL
    }
}

impl Drop for MockBinauralEffect {
    fn drop(&mut self) {
        self.stats.binaural_released.fetch_add(1, Ordering::SeqCst);
        self.stats.record("release binaural");
    }
}

#[derive(Debug)]
pub(crate) struct MockReflectionEffect {
    stats: Arc<MockStats>,
}

impl Drop for MockReflectionEffect {
    fn drop(&mut self) {
        self.stats.reflection_released.fetch_add(1, Ordering::SeqCst);
        self.stats.record("release reflection");
    }
}

#[derive(Debug)]
pub(crate) struct MockSource {
    stats: Arc<MockStats>,
}

impl SimulationSource for MockSource {
    fn set_inputs(&mut self, inputs: &SimulationInputs) {
        self.stats.inputs_updates.fetch_add(1, Ordering::SeqCst);
        *self.stats.last_inputs.lock().unwrap() = Some(*inputs);
    }
}

impl Drop for MockSource {
    fn drop(&mut self) {
        self.stats.record("release source");
    }
}
