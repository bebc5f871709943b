use crate::attenuation::AttenuationCurveParams;
use crate::backend::{
    BinauralEffectParams, DirectEffectParams, HrtfInterpolation, NUM_OCCLUSION_SAMPLES,
    NUM_TRANSMISSION_RAYS, SimulationInputs, SpatialBackend,
};
use crate::buffer::AudioBuffer;
use crate::config::AudioSettings;
use crate::math::{Pose, relative_direction};
use crate::node::AudioNode;
use crate::spatial::distance::{AirAbsorptionModel, DistanceAttenuation, DistanceModel};
use crate::spatial::lifecycle::EffectLifecycle;
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

/// Lifecycle state of a [`SpatializationPipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Ready,
    /// Inside a `process()` call.
    Processing,
    ShuttingDown,
    Released,
}

/// Parameter change sent from the control context to the render context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamUpdate {
    SourceTransform(Pose),
    ListenerTransform(Pose),
    DistanceModel(DistanceModel),
    AttenuationCurve(AttenuationCurveParams),
    AirAbsorption(AirAbsorptionModel),
    SpatialBlend(f32),
    Interpolation(HrtfInterpolation),
}

/// Values computed on the render path and published for inspection.
#[derive(Debug)]
pub struct RenderMetrics {
    listener_distance: AtomicU32,
    distance_attenuation: AtomicU32,
}

impl Default for RenderMetrics {
    fn default() -> Self {
        Self {
            listener_distance: AtomicU32::new(0.0f32.to_bits()),
            distance_attenuation: AtomicU32::new(1.0f32.to_bits()),
        }
    }
}

impl RenderMetrics {
    pub fn listener_distance(&self) -> f32 {
        f32::from_bits(self.listener_distance.load(Ordering::Relaxed))
    }

    pub fn distance_attenuation(&self) -> f32 {
        f32::from_bits(self.distance_attenuation.load(Ordering::Relaxed))
    }

    fn publish(&self, listener_distance: f32, distance_attenuation: f32) {
        self.listener_distance
            .store(listener_distance.to_bits(), Ordering::Relaxed);
        self.distance_attenuation
            .store(distance_attenuation.to_bits(), Ordering::Relaxed);
    }
}

/// Clamps a spatial blend to `[0, 1]`. NaN means fully spatialized.
pub fn clamp_spatial_blend(blend: f32) -> f32 {
    if blend.is_nan() {
        1.0
    } else {
        blend.clamp(0.0, 1.0)
    }
}

/// Combines spatial blend with distance attenuation.
///
/// Returns `(adjusted_attenuation, adjusted_blend)`. Keeps a fully wet source from snapping to
/// silence when its attenuation reaches exactly zero. The formula follows Steam Audio's Unity
/// integration.
pub fn blend_attenuation(spatial_blend: f32, distance_attenuation: f32) -> (f32, f32) {
    let adjusted_attenuation = (1.0 - spatial_blend) + spatial_blend * distance_attenuation;
    let adjusted_blend = if spatial_blend == 1.0 && distance_attenuation == 0.0 {
        1.0
    } else if adjusted_attenuation == 0.0 {
        // Only reachable with out-of-range inputs; keep the render path NaN-free.
        spatial_blend
    } else {
        spatial_blend * distance_attenuation / adjusted_attenuation
    };
    (adjusted_attenuation, adjusted_blend)
}

type SharedLifecycle<B> = Arc<Mutex<Option<EffectLifecycle<B>>>>;

fn lock_lifecycle<B: SpatialBackend>(
    lifecycle: &Mutex<Option<EffectLifecycle<B>>>,
) -> MutexGuard<'_, Option<EffectLifecycle<B>>> {
    lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Releases a pipeline's effect handles from the control context.
///
/// Obtained with [`SpatializationPipeline::release_handle`] before the pipeline moves to the
/// audio thread. [`ReleaseHandle::release`] waits for an in-flight `process()` call to finish;
/// the pipeline renders silence and reports [`PipelineState::Released`] afterwards.
pub struct ReleaseHandle<B: SpatialBackend> {
    lifecycle: SharedLifecycle<B>,
}

impl<B: SpatialBackend> ReleaseHandle<B> {
    /// Returns `true` if handles were still held and have now been released.
    pub fn release(&self) -> bool {
        let lifecycle = lock_lifecycle(&self.lifecycle).take();
        match lifecycle {
            Some(mut lifecycle) => {
                lifecycle.release();
                true
            }
            None => false,
        }
    }
}

/// Per-buffer spatialization state machine.
///
/// Parameters arrive either through the setters (when the caller owns the pipeline) or as
/// [`ParamUpdate`]s drained at the top of every `process()` call, which never blocks. The
/// effect handles sit behind a mutex that the render path only ever `try_lock`s.
pub struct SpatializationPipeline<B: SpatialBackend> {
    state: PipelineState,
    backend: B,
    audio_settings: AudioSettings,
    lifecycle: SharedLifecycle<B>,
    updates_tx: Sender<ParamUpdate>,
    updates_rx: Receiver<ParamUpdate>,
    source_pose: Pose,
    listener_pose: Pose,
    distance: DistanceAttenuation,
    air_absorption: AirAbsorptionModel,
    spatial_blend: f32,
    interpolation: HrtfInterpolation,
    metrics: Arc<RenderMetrics>,
}

impl<B: SpatialBackend> SpatializationPipeline<B> {
    pub fn new(backend: B, audio_settings: AudioSettings) -> Self {
        let (updates_tx, updates_rx) = crossbeam_channel::unbounded();
        Self {
            state: PipelineState::Uninitialized,
            backend,
            audio_settings,
            lifecycle: Arc::new(Mutex::new(None)),
            updates_tx,
            updates_rx,
            source_pose: Pose::identity(),
            listener_pose: Pose::identity(),
            distance: DistanceAttenuation::default(),
            air_absorption: AirAbsorptionModel::Default,
            spatial_blend: 1.0,
            interpolation: HrtfInterpolation::Bilinear,
            metrics: Arc::new(RenderMetrics::default()),
        }
    }

    /// Acquires the effect handles. A no-op when already `Ready`.
    pub fn initialize(&mut self) {
        if self.state == PipelineState::Ready {
            return;
        }
        let lifecycle = EffectLifecycle::new(&self.backend, self.audio_settings);
        *lock_lifecycle(&self.lifecycle) = Some(lifecycle);
        self.state = PipelineState::Ready;
        self.distance.mark_dirty();
        self.drain_updates();
    }

    /// Releases every handle. A no-op unless the pipeline was initialized.
    pub fn uninitialize(&mut self) {
        if matches!(
            self.state,
            PipelineState::Uninitialized | PipelineState::Released
        ) {
            return;
        }
        self.state = PipelineState::ShuttingDown;
        let lifecycle = lock_lifecycle(&self.lifecycle).take();
        if let Some(mut lifecycle) = lifecycle {
            lifecycle.release();
        }
        self.state = PipelineState::Released;
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state == PipelineState::Ready
    }

    pub fn audio_settings(&self) -> &AudioSettings {
        &self.audio_settings
    }

    /// Sender for parameter updates from another thread.
    pub fn update_sender(&self) -> Sender<ParamUpdate> {
        self.updates_tx.clone()
    }

    pub fn metrics(&self) -> Arc<RenderMetrics> {
        self.metrics.clone()
    }

    /// Handle the control context keeps to release this pipeline after handing it off.
    pub fn release_handle(&self) -> ReleaseHandle<B> {
        ReleaseHandle {
            lifecycle: self.lifecycle.clone(),
        }
    }

    /// Runs `f` on the effect handles, if they are still held. Blocks while a `process()` call
    /// holds them.
    pub fn with_lifecycle<R>(&self, f: impl FnOnce(&EffectLifecycle<B>) -> R) -> Option<R> {
        lock_lifecycle(&self.lifecycle).as_ref().map(f)
    }

    pub fn set_source_transform(&mut self, pose: Pose) {
        self.apply_update(ParamUpdate::SourceTransform(pose));
    }

    pub fn set_listener_transform(&mut self, pose: Pose) {
        self.apply_update(ParamUpdate::ListenerTransform(pose));
    }

    pub fn set_distance_model(&mut self, model: DistanceModel) {
        self.apply_update(ParamUpdate::DistanceModel(model));
    }

    pub fn set_attenuation_curve(&mut self, params: AttenuationCurveParams) {
        self.apply_update(ParamUpdate::AttenuationCurve(params));
    }

    pub fn set_air_absorption(&mut self, model: AirAbsorptionModel) {
        self.apply_update(ParamUpdate::AirAbsorption(model));
    }

    pub fn set_spatial_blend(&mut self, blend: f32) {
        self.apply_update(ParamUpdate::SpatialBlend(blend));
    }

    pub fn set_interpolation(&mut self, interpolation: HrtfInterpolation) {
        self.apply_update(ParamUpdate::Interpolation(interpolation));
    }

    pub fn source_transform(&self) -> Pose {
        self.source_pose
    }

    pub fn listener_transform(&self) -> Pose {
        self.listener_pose
    }

    pub fn distance_attenuation(&self) -> &DistanceAttenuation {
        &self.distance
    }

    pub fn spatial_blend(&self) -> f32 {
        self.spatial_blend
    }

    pub fn interpolation(&self) -> HrtfInterpolation {
        self.interpolation
    }

    /// Simulation inputs for the current source pose and distance model.
    pub fn simulation_inputs(&self) -> SimulationInputs {
        simulation_inputs(self.source_pose, &self.distance, self.air_absorption)
    }

    /// Applies a parameter change immediately. A source move also pushes fresh simulation
    /// inputs right away.
    pub fn apply_update(&mut self, update: ParamUpdate) {
        if let ParamUpdate::SourceTransform(pose) = update {
            self.source_pose = pose;
            let inputs = self.simulation_inputs();
            if let Some(lifecycle) = lock_lifecycle(&self.lifecycle).as_mut() {
                lifecycle.set_simulation_inputs(&inputs);
            }
        }
        self.store_update(update);
    }

    fn store_update(&mut self, update: ParamUpdate) {
        match update {
            ParamUpdate::SourceTransform(pose) => {
                self.source_pose = pose;
                self.distance.mark_dirty();
            }
            ParamUpdate::ListenerTransform(pose) => self.listener_pose = pose,
            ParamUpdate::DistanceModel(model) => self.distance.set_model(model),
            ParamUpdate::AttenuationCurve(params) => self.distance.set_curve(params),
            ParamUpdate::AirAbsorption(model) => {
                self.air_absorption = model;
                self.distance.mark_dirty();
            }
            ParamUpdate::SpatialBlend(blend) => self.spatial_blend = clamp_spatial_blend(blend),
            ParamUpdate::Interpolation(interpolation) => self.interpolation = interpolation,
        }
    }

    /// Source moves only mark the model dirty here; the next render pushes the inputs once.
    fn drain_updates(&mut self) {
        while let Ok(update) = self.updates_rx.try_recv() {
            self.store_update(update);
        }
    }

    /// Spatializes `input` into `output`.
    ///
    /// `frames` must equal the configured period. Anything that prevents rendering (wrong
    /// period, not initialized, missing effects, disconnected input) produces silence instead
    /// of an error.
    pub fn process(&mut self, input: Option<&AudioBuffer>, output: &mut AudioBuffer, frames: usize) {
        self.drain_updates();

        let renderable = frames == self.audio_settings.frame_size
            && output.num_frames() == frames
            && self.state == PipelineState::Ready;
        let input = match input {
            Some(input) if renderable && input.num_frames() == frames && input.num_channels() > 0 => {
                input
            }
            _ => {
                output.silence();
                return;
            }
        };

        self.state = PipelineState::Processing;
        if !self.render(input, output, frames) {
            output.silence();
        }
        if self.state == PipelineState::Processing {
            self.state = PipelineState::Ready;
        }
    }

    fn render(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, frames: usize) -> bool {
        let direction = relative_direction(
            self.source_pose.position,
            self.listener_pose.position,
            self.listener_pose.forward(),
            self.listener_pose.up(),
        );

        let mut guard = match self.lifecycle.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            // Being released from the control context.
            Err(TryLockError::WouldBlock) => return false,
        };
        let Some(lifecycle) = guard.as_mut() else {
            self.state = PipelineState::Released;
            return false;
        };
        if !lifecycle.has_binaural_effect() {
            return false;
        }

        let num_channels = input.num_channels();
        if !lifecycle.ensure_direct_effect(num_channels) {
            return false;
        }
        lifecycle.ensure_scratch_buffer(num_channels, frames);

        if self.distance.take_dirty() {
            lifecycle.set_simulation_inputs(&simulation_inputs(
                self.source_pose,
                &self.distance,
                self.air_absorption,
            ));
        }

        let distance = self.source_pose.distance(&self.listener_pose);
        let distance_attenuation = self.distance.gain(distance);
        let (adjusted_attenuation, adjusted_blend) =
            blend_attenuation(self.spatial_blend, distance_attenuation);

        let direct_params = DirectEffectParams {
            apply_distance_attenuation: true,
            apply_air_absorption: true,
            distance_attenuation: adjusted_attenuation,
            air_absorption: self.air_absorption.evaluate(distance),
        };
        let binaural_params = BinauralEffectParams {
            direction,
            interpolation: self.interpolation,
            spatial_blend: adjusted_blend,
        };

        let rendered = lifecycle.render(&direct_params, &binaural_params, input, output);
        self.metrics.publish(distance, distance_attenuation);
        rendered
    }

    /// Clears the binaural effect's filter state without releasing anything.
    pub fn reset(&mut self) {
        if let Some(lifecycle) = lock_lifecycle(&self.lifecycle).as_mut() {
            lifecycle.reset();
        }
    }

    /// Seconds the host should keep pulling after input stops.
    pub fn tail_time(&self) -> f64 {
        let samples = self
            .with_lifecycle(|lifecycle| lifecycle.tail_samples())
            .unwrap_or(0);
        self.audio_settings.samples_to_seconds(samples)
    }
}

impl<B: SpatialBackend> AudioNode for SpatializationPipeline<B> {
    fn process(&mut self, input: Option<&AudioBuffer>, output: &mut AudioBuffer, frames: usize) {
        SpatializationPipeline::process(self, input, output, frames);
    }

    fn reset(&mut self) {
        SpatializationPipeline::reset(self);
    }

    fn tail_time(&self) -> f64 {
        SpatializationPipeline::tail_time(self)
    }
}

impl<B: SpatialBackend> Drop for SpatializationPipeline<B> {
    fn drop(&mut self) {
        self.uninitialize();
    }
}

/// Builds the simulator inputs for a source at `pose`.
pub fn simulation_inputs(
    pose: Pose,
    distance: &DistanceAttenuation,
    air_absorption: AirAbsorptionModel,
) -> SimulationInputs {
    SimulationInputs {
        source: pose,
        occlusion_radius: distance.occlusion_radius(),
        num_occlusion_samples: NUM_OCCLUSION_SAMPLES,
        num_transmission_rays: NUM_TRANSMISSION_RAYS,
        distance_model: distance.model(),
        air_absorption,
    }
}
