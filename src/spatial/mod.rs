pub mod distance;
pub mod lifecycle;
pub mod pipeline;

pub use distance::{AirAbsorptionModel, DistanceAttenuation, DistanceModel};
pub use lifecycle::EffectLifecycle;
pub use pipeline::{
    ParamUpdate, PipelineState, ReleaseHandle, RenderMetrics, SpatializationPipeline,
    blend_attenuation, clamp_spatial_blend,
};
