//! Steam Audio backend over the `audionimbus` bindings.

use super::{
    BinauralEffect, BinauralEffectParams, DirectEffect, DirectEffectParams, DirectEffectSettings,
    HrtfInterpolation, ReflectionEffectSettings, SimulationInputs, SimulationSource,
    SpatialBackend,
};
use crate::buffer::AudioBuffer;
use crate::config::AudioSettings;
use crate::error::{BinauraError, Result};
use crate::math::{Pose, Vec3};
use crate::spatial::distance::{AirAbsorptionModel, DistanceModel};
use audionimbus::{
    AudioBufferSettings, Context, ContextSettings, Direct, DirectSimulationParameters,
    DirectSimulationSettings, Direction, Equalizer, Hrtf, HrtfSettings, Occlusion,
    OcclusionAlgorithm, Point, Scene, SceneParams, SceneSettings, SimulationFlags,
    SimulationSharedInputs, Simulator, Sofa, SourceSettings, TransmissionParameters, Vector3,
    VolumeNormalization, audio_buffer::AudioBuffer as NimbusAudioBuffer, geometry,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Fields drop in declaration order, simulator first and context last.
struct SteamShared {
    simulator: Mutex<Simulator<Direct>>,
    #[allow(dead_code)] // Must outlive the simulator
    scene: Scene,
    hrtf: Hrtf,
    context: Context,
}

/// Steam Audio context, HRTF, scene and simulator shared by every spatializer instance.
#[derive(Clone)]
pub struct SteamAudioBackend {
    shared: Arc<SteamShared>,
}

fn nimbus_settings(settings: &AudioSettings) -> audionimbus::AudioSettings {
    audionimbus::AudioSettings {
        sampling_rate: settings.sample_rate,
        frame_size: settings.frame_size as u32,
    }
}

fn buffer_settings(num_channels: usize) -> AudioBufferSettings {
    AudioBufferSettings {
        num_channels: Some(num_channels),
        ..Default::default()
    }
}

fn vector(v: Vec3) -> Vector3 {
    Vector3::new(v.x, v.y, v.z)
}

fn coordinate_system(pose: &Pose) -> geometry::CoordinateSystem {
    let origin = pose.position;
    geometry::CoordinateSystem {
        origin: Point::new(origin.x, origin.y, origin.z),
        right: vector(pose.right()),
        up: vector(pose.up()),
        ahead: vector(pose.forward()),
    }
}

impl SteamAudioBackend {
    /// Creates the shared Steam Audio objects with the built-in HRTF.
    pub fn new(audio_settings: &AudioSettings) -> Result<Self> {
        Self::create(audio_settings, None)
    }

    /// Creates the shared Steam Audio objects with an HRTF loaded from a SOFA file.
    pub fn with_sofa_file(audio_settings: &AudioSettings, sofa_path: &str) -> Result<Self> {
        let data = std::fs::read(sofa_path).map_err(|e| {
            BinauraError::Backend(format!("Failed to read HRTF file {}: {}", sofa_path, e))
        })?;
        Self::create(audio_settings, Some(Sofa::Buffer(data)))
    }

    fn create(audio_settings: &AudioSettings, sofa: Option<Sofa>) -> Result<Self> {
        audio_settings.validate()?;
        let settings = nimbus_settings(audio_settings);

        let context = Context::try_new(&ContextSettings::default()).map_err(|e| {
            BinauraError::Backend(format!("Failed to create Steam Audio context: {}", e))
        })?;

        let hrtf = Hrtf::try_new(
            &context,
            &settings,
            &HrtfSettings {
                volume_normalization: VolumeNormalization::None,
                sofa_information: sofa,
                ..Default::default()
            },
        )
        .map_err(|e| BinauraError::Backend(format!("Failed to create HRTF: {}", e)))?;

        let mut simulator = Simulator::builder(
            SceneParams::Default,
            audio_settings.sample_rate,
            audio_settings.frame_size as u32,
        )
        .with_direct(DirectSimulationSettings {
            max_num_occlusion_samples: super::NUM_OCCLUSION_SAMPLES as _,
        })
        .try_build(&context)
        .map_err(|e| BinauraError::Backend(format!("Failed to create simulator: {}", e)))?;

        let scene = Scene::try_new(&context, &SceneSettings::default())
            .map_err(|e| BinauraError::Backend(format!("Failed to create scene: {}", e)))?;
        simulator.set_scene(&scene);
        simulator.commit();

        log::info!(
            "Created Steam Audio backend ({} Hz, {} frames)",
            audio_settings.sample_rate,
            audio_settings.frame_size
        );

        Ok(Self {
            shared: Arc::new(SteamShared {
                simulator: Mutex::new(simulator),
                scene,
                hrtf,
                context,
            }),
        })
    }

    fn simulator(&self) -> MutexGuard<'_, Simulator<Direct>> {
        self.shared
            .simulator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies pending source additions and removals. Call once per simulation tick.
    pub fn commit(&self) {
        self.simulator().commit();
    }

    /// Commits and runs the direct simulation for a listener at `listener`.
    pub fn simulate(&self, listener: &Pose) {
        let shared_inputs = SimulationSharedInputs {
            listener: coordinate_system(listener),
            num_rays: 1024,
            num_bounces: 10,
            duration: 3.0,
            order: 2,
            irradiance_min_distance: 1.0,
            pathing_visualization_callback: None,
        };

        let mut simulator = self.simulator();
        simulator.commit();
        simulator.set_shared_inputs(SimulationFlags::DIRECT, &shared_inputs);
        simulator.run_direct();
    }

    /// Number of live handles on the shared state, including this one.
    pub fn reference_count(&self) -> usize {
        Arc::strong_count(&self.shared)
    }
}

impl SpatialBackend for SteamAudioBackend {
    type DirectEffect = SteamDirectEffect;
    type BinauralEffect = SteamBinauralEffect;
    type ReflectionEffect = SteamReflectionEffect;
    type Source = SteamSource;

    fn name(&self) -> &'static str {
        "Steam Audio"
    }

    fn create_direct_effect(
        &self,
        audio_settings: &AudioSettings,
        settings: &DirectEffectSettings,
    ) -> Result<Self::DirectEffect> {
        let effect = audionimbus::DirectEffect::try_new(
            &self.shared.context,
            &nimbus_settings(audio_settings),
            &audionimbus::DirectEffectSettings {
                num_channels: settings.num_channels,
            },
        )
        .map_err(|e| BinauraError::Backend(format!("Failed to create DirectEffect: {}", e)))?;

        Ok(SteamDirectEffect {
            effect,
            num_channels: settings.num_channels,
            _shared: self.shared.clone(),
        })
    }

    fn create_binaural_effect(
        &self,
        audio_settings: &AudioSettings,
    ) -> Result<Self::BinauralEffect> {
        let effect = audionimbus::BinauralEffect::try_new(
            &self.shared.context,
            &nimbus_settings(audio_settings),
            &audionimbus::BinauralEffectSettings {
                hrtf: &self.shared.hrtf,
            },
        )
        .map_err(|e| BinauraError::Backend(format!("Failed to create BinauralEffect: {}", e)))?;

        Ok(SteamBinauralEffect {
            effect,
            downmix: vec![0.0; audio_settings.frame_size],
            shared: self.shared.clone(),
        })
    }

    fn create_reflection_effect(
        &self,
        audio_settings: &AudioSettings,
        settings: &ReflectionEffectSettings,
    ) -> Result<Self::ReflectionEffect> {
        let effect = audionimbus::ReflectionEffect::try_new(
            &self.shared.context,
            &nimbus_settings(audio_settings),
            &audionimbus::ReflectionEffectSettings::Convolution {
                impulse_response_size: settings.impulse_response_size,
                num_channels: settings.num_channels,
            },
        )
        .map_err(|e| {
            BinauraError::Backend(format!("Failed to create ReflectionEffect: {}", e))
        })?;

        Ok(SteamReflectionEffect {
            _effect: effect,
            _shared: self.shared.clone(),
        })
    }

    fn create_source(&self) -> Result<Self::Source> {
        let source = audionimbus::Source::try_new(
            &self.simulator(),
            &SourceSettings {
                flags: SimulationFlags::DIRECT,
            },
        )
        .map_err(|e| BinauraError::Backend(format!("Failed to create source: {}", e)))?;

        Ok(SteamSource {
            source,
            _shared: self.shared.clone(),
        })
    }

    fn add_source(&self, source: &Self::Source) {
        let mut simulator = self.simulator();
        simulator.add_source(&source.source);
        simulator.commit();
    }

    fn remove_source(&self, source: &Self::Source) {
        let mut simulator = self.simulator();
        simulator.remove_source(&source.source);
        simulator.commit();
    }
}

pub struct SteamDirectEffect {
    effect: audionimbus::DirectEffect,
    num_channels: usize,
    _shared: Arc<SteamShared>,
}

impl DirectEffect for SteamDirectEffect {
    fn apply(&mut self, params: &DirectEffectParams, input: &AudioBuffer, output: &mut AudioBuffer) {
        output.silence();
        if input.num_channels() != self.num_channels || output.num_channels() != self.num_channels
        {
            return;
        }

        let nimbus_params = audionimbus::DirectEffectParams {
            distance_attenuation: params
                .apply_distance_attenuation
                .then_some(params.distance_attenuation),
            air_absorption: params
                .apply_air_absorption
                .then_some(Equalizer(params.air_absorption)),
            directivity: None,
            occlusion: None,
            transmission: None,
        };

        let Ok(input_buf) = NimbusAudioBuffer::try_with_data_and_settings(
            input.data(),
            buffer_settings(self.num_channels),
        ) else {
            return;
        };
        let Ok(output_buf) = NimbusAudioBuffer::try_with_data_and_settings(
            output.data_mut(),
            buffer_settings(self.num_channels),
        ) else {
            return;
        };

        self.effect.apply(&nimbus_params, &input_buf, &output_buf);
    }

    fn tail_size(&self) -> usize {
        self.effect.tail_size()
    }
}

pub struct SteamBinauralEffect {
    effect: audionimbus::BinauralEffect,
    /// Mono mixdown for inputs wider than stereo.
    downmix: Vec<f32>,
    shared: Arc<SteamShared>,
}

impl BinauralEffect for SteamBinauralEffect {
    fn apply(
        &mut self,
        params: &BinauralEffectParams,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
    ) {
        output.silence();
        let frames = input.num_frames();
        if output.num_channels() != 2 || output.num_frames() != frames {
            return;
        }

        let (data, num_channels) = if input.num_channels() <= 2 {
            (input.data(), input.num_channels())
        } else {
            if self.downmix.len() != frames {
                return;
            }
            let scale = 1.0 / input.num_channels() as f32;
            self.downmix.fill(0.0);
            for channel in input.channels() {
                for (mixed, &sample) in self.downmix.iter_mut().zip(channel) {
                    *mixed += sample * scale;
                }
            }
            (self.downmix.as_slice(), 1)
        };

        let direction = params.direction;
        let nimbus_params = audionimbus::BinauralEffectParams {
            direction: Direction::new(direction.x, direction.y, direction.z),
            interpolation: match params.interpolation {
                HrtfInterpolation::Nearest => audionimbus::HrtfInterpolation::Nearest,
                HrtfInterpolation::Bilinear => audionimbus::HrtfInterpolation::Bilinear,
            },
            spatial_blend: params.spatial_blend,
            hrtf: &self.shared.hrtf,
            peak_delays: None,
        };

        let Ok(input_buf) =
            NimbusAudioBuffer::try_with_data_and_settings(data, buffer_settings(num_channels))
        else {
            return;
        };
        let Ok(output_buf) =
            NimbusAudioBuffer::try_with_data_and_settings(output.data_mut(), buffer_settings(2))
        else {
            return;
        };

        self.effect.apply(&nimbus_params, &input_buf, &output_buf);
    }

    fn reset(&mut self) {
        self.effect.reset();
    }

    fn tail_size(&self) -> usize {
        self.effect.tail_size()
    }
}

/// Convolution reverb handle. Only lifecycle-managed.
pub struct SteamReflectionEffect {
    _effect: audionimbus::ReflectionEffect,
    _shared: Arc<SteamShared>,
}

pub struct SteamSource {
    source: audionimbus::Source,
    _shared: Arc<SteamShared>,
}

impl SimulationSource for SteamSource {
    fn set_inputs(&mut self, inputs: &SimulationInputs) {
        // Custom curves are evaluated by the pipeline.
        let distance_attenuation = match inputs.distance_model {
            DistanceModel::Default => audionimbus::DistanceAttenuationModel::Default,
            DistanceModel::InverseDistance { min_distance } => {
                audionimbus::DistanceAttenuationModel::InverseDistance { min_distance }
            }
            DistanceModel::CustomCurve => audionimbus::DistanceAttenuationModel::InverseDistance {
                min_distance: inputs.occlusion_radius,
            },
        };
        let air_absorption = match inputs.air_absorption {
            AirAbsorptionModel::Default => audionimbus::AirAbsorptionModel::Default,
            AirAbsorptionModel::Exponential { coefficients } => {
                audionimbus::AirAbsorptionModel::Exponential { coefficients }
            }
        };

        let simulation_inputs = audionimbus::SimulationInputs {
            source: coordinate_system(&inputs.source),
            direct_simulation: Some(DirectSimulationParameters {
                distance_attenuation: Some(distance_attenuation),
                air_absorption: Some(air_absorption),
                directivity: None,
                occlusion: Some(Occlusion {
                    transmission: Some(TransmissionParameters {
                        num_transmission_rays: inputs.num_transmission_rays as _,
                    }),
                    algorithm: OcclusionAlgorithm::Volumetric {
                        radius: inputs.occlusion_radius,
                        num_occlusion_samples: inputs.num_occlusion_samples as _,
                    },
                }),
            }),
            reflections_simulation: None,
            pathing_simulation: None,
        };

        self.source
            .set_inputs(SimulationFlags::DIRECT, simulation_inputs);
    }
}
