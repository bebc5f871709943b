//! Player-facing spatializer effect.
//!
//! [`SpatializerEffect`] is what a sound player attaches to a voice. It owns the
//! [`SpatializationPipeline`] until the host detaches it for the audio thread, after which every
//! setter travels to the pipeline as a [`ParamUpdate`].

use crate::attenuation::AttenuationCurveParams;
use crate::backend::{HrtfInterpolation, SpatialBackend};
use crate::config::{AudioSettings, SpatializerConfig};
use crate::error::{BinauraError, Result};
use crate::inspect::DebugSnapshot;
use crate::math::Pose;
use crate::spatial::distance::{AirAbsorptionModel, DistanceModel};
use crate::spatial::pipeline::{
    ParamUpdate, ReleaseHandle, RenderMetrics, SpatializationPipeline, clamp_spatial_blend,
};
use crossbeam_channel::Sender;
use std::sync::Arc;

/// Where an effect sits in a player's effect chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EffectOrder {
    PreSpatializer,
    Spatializer,
    PostSpatializer,
}

/// An effect a sound player can host.
pub trait PlayerEffect {
    /// Acquires resources. On error the effect stays inert.
    fn initialize(&mut self, audio_settings: &AudioSettings) -> Result<()>;

    /// Releases resources. Safe to call more than once.
    fn shutdown(&mut self);

    fn effect_name(&self) -> &'static str;

    fn processing_order(&self) -> EffectOrder;
}

/// Binaural spatializer for a single voice.
pub struct SpatializerEffect<B: SpatialBackend> {
    backend: B,
    config: SpatializerConfig,
    source_pose: Pose,
    listener_pose: Pose,
    node: Option<SpatializationPipeline<B>>,
    updates: Option<Sender<ParamUpdate>>,
    metrics: Option<Arc<RenderMetrics>>,
    release: Option<ReleaseHandle<B>>,
}

impl<B: SpatialBackend> SpatializerEffect<B> {
    pub const NAME: &'static str = "BinauralSpatializer";

    pub fn new(backend: B) -> Self {
        Self::with_config(backend, SpatializerConfig::default())
    }

    pub fn with_config(backend: B, config: SpatializerConfig) -> Self {
        Self {
            backend,
            config,
            source_pose: Pose::identity(),
            listener_pose: Pose::identity(),
            node: None,
            updates: None,
            metrics: None,
            release: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.updates.is_some()
    }

    pub fn config(&self) -> &SpatializerConfig {
        &self.config
    }

    /// Moves the source. Simulation inputs are refreshed on the next processed buffer.
    pub fn set_transform(&mut self, pose: Pose) -> Result<()> {
        self.source_pose = pose;
        self.dispatch(ParamUpdate::SourceTransform(pose))
    }

    pub fn set_listener_transform(&mut self, pose: Pose) -> Result<()> {
        self.listener_pose = pose;
        self.dispatch(ParamUpdate::ListenerTransform(pose))
    }

    pub fn set_distance_model(&mut self, model: DistanceModel) -> Result<()> {
        self.config.distance_model = model;
        self.dispatch(ParamUpdate::DistanceModel(model))
    }

    pub fn set_attenuation_curve_params(&mut self, params: AttenuationCurveParams) -> Result<()> {
        self.config.attenuation = params;
        self.dispatch(ParamUpdate::AttenuationCurve(params))
    }

    /// Clamped to `[0, 1]`; NaN selects a fully spatialized source.
    pub fn set_spatial_blend(&mut self, blend: f32) -> Result<()> {
        let blend = clamp_spatial_blend(blend);
        self.config.spatial_blend = blend;
        self.dispatch(ParamUpdate::SpatialBlend(blend))
    }

    pub fn set_interpolation_mode(&mut self, interpolation: HrtfInterpolation) -> Result<()> {
        self.config.interpolation = interpolation;
        self.dispatch(ParamUpdate::Interpolation(interpolation))
    }

    pub fn set_air_absorption(&mut self, model: AirAbsorptionModel) -> Result<()> {
        self.config.air_absorption = model;
        self.dispatch(ParamUpdate::AirAbsorption(model))
    }

    /// Pushes a (possibly older) host config to the effect.
    pub fn apply_config(&mut self, config: &SpatializerConfig) -> Result<()> {
        let config = config.clone().migrate()?;
        self.set_distance_model(config.distance_model)?;
        self.set_attenuation_curve_params(config.attenuation)?;
        self.set_spatial_blend(config.spatial_blend)?;
        self.set_interpolation_mode(config.interpolation)?;
        self.set_air_absorption(config.air_absorption)?;
        Ok(())
    }

    /// Node the host connects upstream audio to.
    pub fn input_node(&mut self) -> Option<&mut SpatializationPipeline<B>> {
        self.node.as_mut()
    }

    /// Node the host pulls rendered audio from. Same instance as [`Self::input_node`].
    pub fn output_node(&mut self) -> Option<&mut SpatializationPipeline<B>> {
        self.node.as_mut()
    }

    /// Hands the pipeline over to the audio thread. Later setters are delivered through its
    /// update channel, and [`PlayerEffect::shutdown`] still releases its handles.
    pub fn detach_node(&mut self) -> Option<SpatializationPipeline<B>> {
        self.node.take()
    }

    pub fn snapshot(&self) -> DebugSnapshot {
        let (listener_distance, distance_attenuation) = match &self.metrics {
            Some(metrics) => (metrics.listener_distance(), metrics.distance_attenuation()),
            None => (0.0, 1.0),
        };
        DebugSnapshot {
            distance_model: self.config.distance_model,
            attenuation: self.config.attenuation,
            spatial_blend: self.config.spatial_blend,
            interpolation: self.config.interpolation,
            listener_distance,
            distance_attenuation,
        }
    }

    fn dispatch(&mut self, update: ParamUpdate) -> Result<()> {
        if let Some(node) = self.node.as_mut() {
            node.apply_update(update);
            return Ok(());
        }
        // Not initialized yet: the stored config and poses are applied on initialize.
        let Some(updates) = self.updates.as_ref() else {
            return Ok(());
        };
        updates.send(update).map_err(|e| {
            BinauraError::Engine(format!("Failed to send parameter update: {}", e))
        })
    }

    fn configure(&self, node: &mut SpatializationPipeline<B>) {
        node.set_distance_model(self.config.distance_model);
        node.set_attenuation_curve(self.config.attenuation);
        node.set_spatial_blend(self.config.spatial_blend);
        node.set_interpolation(self.config.interpolation);
        node.set_air_absorption(self.config.air_absorption);
        node.set_listener_transform(self.listener_pose);
        node.set_source_transform(self.source_pose);
    }
}

impl<B: SpatialBackend> PlayerEffect for SpatializerEffect<B> {
    fn initialize(&mut self, audio_settings: &AudioSettings) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }
        if let Err(e) = audio_settings.validate() {
            log::error!("Failed to initialize {}: {}", Self::NAME, e);
            return Err(e);
        }

        let mut node = SpatializationPipeline::new(self.backend.clone(), *audio_settings);
        node.initialize();
        self.configure(&mut node);

        self.updates = Some(node.update_sender());
        self.metrics = Some(node.metrics());
        self.release = Some(node.release_handle());
        self.node = Some(node);

        log::info!(
            "{} initialized ({} Hz, {} frames, {} backend)",
            Self::NAME,
            audio_settings.sample_rate,
            audio_settings.frame_size,
            self.backend.name()
        );
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(mut node) = self.node.take() {
            node.uninitialize();
        }
        // A detached node is released in place and renders silence from then on.
        if let Some(release) = self.release.take() {
            release.release();
        }
        if self.updates.take().is_some() {
            log::info!("{} shut down", Self::NAME);
        }
        self.metrics = None;
    }

    fn effect_name(&self) -> &'static str {
        Self::NAME
    }

    fn processing_order(&self) -> EffectOrder {
        EffectOrder::Spatializer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attenuation::CurveType;
    use crate::backend::mock::{MockBackend, MockStats};
    use crate::buffer::AudioBuffer;
    use crate::math::Vec3;
    use crate::spatial::pipeline::PipelineState;

    const FRAMES: usize = 64;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn settings() -> AudioSettings {
        AudioSettings::new().sample_rate(48000).frame_size(FRAMES)
    }

    fn mono_ones() -> AudioBuffer {
        let mut buffer = AudioBuffer::new(1, FRAMES);
        buffer.data_mut().fill(1.0);
        buffer
    }

    #[test]
    fn test_identity() {
        let effect = SpatializerEffect::new(MockBackend::new());
        assert_eq!(effect.effect_name(), "BinauralSpatializer");
        assert_eq!(effect.processing_order(), EffectOrder::Spatializer);
        assert!(EffectOrder::PreSpatializer < EffectOrder::Spatializer);
    }

    #[test]
    fn test_invalid_settings_leave_effect_inert() {
        init_logger();
        let backend = MockBackend::new();
        let mut effect = SpatializerEffect::new(backend.clone());

        let result = effect.initialize(&AudioSettings::new().frame_size(0));

        assert!(matches!(result, Err(BinauraError::Configuration(_))));
        assert!(!effect.is_initialized());
        assert!(effect.input_node().is_none());
        assert_eq!(MockStats::count(&backend.stats.binaural_created), 0);
        effect.set_spatial_blend(0.5).unwrap();
    }

    #[test]
    fn test_input_and_output_are_the_same_node() {
        let mut effect = SpatializerEffect::new(MockBackend::new());
        effect.initialize(&settings()).unwrap();

        let input = effect.input_node().map(|node| node as *const _);
        let output = effect.output_node().map(|node| node as *const _);
        assert!(input.is_some());
        assert_eq!(input, output);
    }

    #[test]
    fn test_settings_made_before_initialize_are_applied() {
        let backend = MockBackend::new();
        let mut effect = SpatializerEffect::new(backend.clone());
        effect
            .set_attenuation_curve_params(AttenuationCurveParams::new(2.0, 20.0, CurveType::Linear))
            .unwrap();
        effect.set_spatial_blend(0.0).unwrap();
        effect
            .set_transform(Pose::from_position(Vec3::new(0.0, 0.0, -12.0)))
            .unwrap();

        effect.initialize(&settings()).unwrap();
        let node = effect.input_node().unwrap();
        assert_eq!(node.spatial_blend(), 0.0);
        assert_eq!(node.distance_attenuation().curve().inner_radius(), 2.0);
        assert_eq!(node.source_transform().position, Vec3::new(0.0, 0.0, -12.0));
        assert_eq!(backend.stats.last_inputs().unwrap().occlusion_radius, 2.0);
    }

    #[test]
    fn test_set_transform_updates_simulation_inputs() {
        let backend = MockBackend::new();
        let mut effect = SpatializerEffect::new(backend.clone());
        effect.initialize(&settings()).unwrap();
        effect
            .set_distance_model(DistanceModel::inverse_distance(3.0))
            .unwrap();

        let pose = Pose::from_position(Vec3::new(1.0, 2.0, 3.0));
        effect.set_transform(pose).unwrap();

        let inputs = backend.stats.last_inputs().unwrap();
        assert_eq!(inputs.source, pose);
        assert_eq!(inputs.occlusion_radius, 3.0);
        assert!(effect.input_node().unwrap().distance_attenuation().is_dirty());
    }

    #[test]
    fn test_detached_node_receives_updates_through_channel() {
        let backend = MockBackend::new();
        let mut effect = SpatializerEffect::new(backend.clone());
        effect.initialize(&settings()).unwrap();
        let mut node = effect.detach_node().unwrap();
        assert!(effect.input_node().is_none());

        effect
            .set_attenuation_curve_params(AttenuationCurveParams::new(1.0, 100.0, CurveType::Linear))
            .unwrap();
        effect
            .set_transform(Pose::from_position(Vec3::new(0.0, 0.0, -51.0)))
            .unwrap();
        assert_eq!(node.source_transform(), Pose::identity());

        let mut output = AudioBuffer::new(2, FRAMES);
        node.process(Some(&mono_ones()), &mut output, FRAMES);

        assert!((output.channel(1)[0] - 0.5).abs() < 1e-5);
        let snapshot = effect.snapshot();
        assert!((snapshot.listener_distance - 51.0).abs() < 1e-4);
        assert!((snapshot.distance_attenuation - 0.5).abs() < 1e-5);
        let marker = snapshot.listener_marker().unwrap();
        assert!((marker.t - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_send_fails_after_node_is_dropped() {
        let mut effect = SpatializerEffect::new(MockBackend::new());
        effect.initialize(&settings()).unwrap();
        drop(effect.detach_node());

        assert!(matches!(
            effect.set_spatial_blend(0.2),
            Err(BinauraError::Engine(_))
        ));
    }

    #[test]
    fn test_apply_config_migrates_and_pushes_values() {
        let mut effect = SpatializerEffect::new(MockBackend::new());
        effect.initialize(&settings()).unwrap();
        let old = SpatializerConfig {
            version: 0,
            distance_model: DistanceModel::Default,
            spatial_blend: 0.0,
            ..Default::default()
        };

        effect.apply_config(&old).unwrap();

        let snapshot = effect.snapshot();
        assert_eq!(snapshot.distance_model, DistanceModel::Default);
        assert_eq!(snapshot.spatial_blend, 1.0);
        let node = effect.input_node().unwrap();
        assert_eq!(node.distance_attenuation().model(), DistanceModel::Default);
    }

    #[test]
    fn test_shutdown_releases_once() {
        let backend = MockBackend::new();
        let mut effect = SpatializerEffect::new(backend.clone());
        effect.initialize(&settings()).unwrap();
        effect.initialize(&settings()).unwrap();
        assert_eq!(MockStats::count(&backend.stats.binaural_created), 1);

        effect.shutdown();
        effect.shutdown();
        assert_eq!(MockStats::count(&backend.stats.binaural_released), 1);
        assert_eq!(MockStats::count(&backend.stats.sources_registered), 0);
        assert!(!effect.is_initialized());
    }

    #[test]
    fn test_shutdown_releases_detached_node() {
        init_logger();
        let backend = MockBackend::new();
        let mut effect = SpatializerEffect::new(backend.clone());
        effect.initialize(&settings()).unwrap();
        let mut node = effect.detach_node().unwrap();
        let mut output = AudioBuffer::new(2, FRAMES);
        node.process(Some(&mono_ones()), &mut output, FRAMES);
        assert!(!output.is_silent());

        effect.shutdown();
        assert_eq!(MockStats::count(&backend.stats.sources_registered), 0);
        assert_eq!(MockStats::count(&backend.stats.binaural_released), 1);
        assert_eq!(MockStats::count(&backend.stats.direct_released), 1);

        node.process(Some(&mono_ones()), &mut output, FRAMES);
        assert!(output.is_silent());
        assert_eq!(node.state(), PipelineState::Released);

        drop(node);
        assert_eq!(MockStats::count(&backend.stats.binaural_released), 1);
    }

    #[test]
    fn test_snapshot_reports_clamped_blend() {
        let mut effect = SpatializerEffect::new(MockBackend::new());
        effect.set_spatial_blend(3.0).unwrap();
        assert_eq!(effect.snapshot().spatial_blend, 1.0);
        effect.set_spatial_blend(f32::NAN).unwrap();
        assert_eq!(effect.config().spatial_blend, 1.0);

        effect.initialize(&settings()).unwrap();
        effect.set_spatial_blend(-0.5).unwrap();
        assert_eq!(effect.snapshot().spatial_blend, 0.0);
        assert_eq!(effect.input_node().unwrap().spatial_blend(), 0.0);
    }
}
