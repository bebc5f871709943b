//! # Binaura
//!
//! A binaural spatializer effect for a single voice in a pull-based audio graph: distance
//! attenuation through configurable curves, air absorption and HRTF rendering behind a
//! backend trait, with Steam Audio available as an optional backend.
//!
//! ## Quick Start
//!
//! ```
//! use binaura::*;
//!
//! let settings = AudioSettings::new().sample_rate(48000).frame_size(256);
//! let mut effect = SpatializerEffect::new(PannerBackend::new());
//! effect.initialize(&settings)?;
//!
//! effect.set_attenuation_curve_params(AttenuationCurveParams::new(1.0, 50.0, CurveType::Logarithmic))?;
//! effect.set_transform(Pose::from_position(Vec3::new(3.0, 0.0, -4.0)))?;
//!
//! // Hand the node to the audio thread; later setters travel over a channel.
//! let mut node = effect.detach_node().expect("initialized");
//! let input = AudioBuffer::new(1, 256);
//! let mut output = AudioBuffer::new(2, 256);
//! node.process(Some(&input), &mut output, 256);
//!
//! effect.set_spatial_blend(0.5)?;
//! # Ok::<(), BinauraError>(())
//! ```
//!
//! ## Key Components
//!
//! - **[`AttenuationCurveParams`]**: distance-to-gain curve with five curve shapes
//! - **[`SpatializationPipeline`]**: per-buffer state machine run on the audio thread
//! - **[`EffectLifecycle`]**: owns and releases the backend's effect handles
//! - **[`SpatializerEffect`]**: control-side facade implementing [`PlayerEffect`]
//! - **[`SpatialBackend`]**: DSP engine interface, implemented by [`PannerBackend`] and, with the
//!   `steam-audio` feature, `SteamAudioBackend`
//!
//! ## Threading
//!
//! The control thread owns the [`SpatializerEffect`]; the render thread owns the detached
//! pipeline. Parameter changes are queued on a channel drained at the start of every
//! `process()` call, and rendered distance/attenuation values flow back through atomics.
//! The render path never locks; it allocates and logs only when the input channel count changes.

pub mod attenuation;
pub mod backend;
pub mod buffer;
pub mod config;
pub mod effect;
pub mod error;
pub mod inspect;
pub mod math;
pub mod node;
pub mod spatial;

pub use attenuation::{AttenuationCurveParams, AttenuationShape, CurveType};
pub use backend::{HrtfInterpolation, PannerBackend, SpatialBackend};
#[cfg(feature = "steam-audio")]
pub use backend::SteamAudioBackend;
pub use buffer::AudioBuffer;
pub use config::{AudioSettings, CONFIG_VERSION, SpatializerConfig};
pub use effect::{EffectOrder, PlayerEffect, SpatializerEffect};
pub use error::{BinauraError, Result};
pub use inspect::DebugSnapshot;
pub use math::{Pose, Quat, Vec3};
pub use node::AudioNode;
pub use spatial::{
    AirAbsorptionModel, DistanceModel, EffectLifecycle, ParamUpdate, PipelineState,
    ReleaseHandle, SpatializationPipeline,
};
