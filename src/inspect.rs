//! Read-only views used by debug overlays and editor graphs.

use crate::attenuation::AttenuationCurveParams;
use crate::backend::HrtfInterpolation;
use crate::spatial::distance::DistanceModel;

/// Default resolution of an attenuation graph.
pub const CURVE_GRAPH_POINTS: usize = 256;

/// A sample of the attenuation curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    /// Position along the falloff range, 0 at the inner radius and 1 at the outer edge.
    pub t: f32,
    pub distance: f32,
    pub gain: f32,
}

/// Where the listener currently sits on the attenuation graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListenerMarker {
    pub t: f32,
    pub gain: f32,
}

/// Samples `params` at `segments + 1` evenly spaced distances from the inner radius to the outer
/// edge of the falloff range.
pub fn curve_points(params: &AttenuationCurveParams, segments: usize) -> Vec<CurvePoint> {
    if segments == 0 {
        let distance = params.inner_radius();
        return vec![CurvePoint {
            t: 0.0,
            distance,
            gain: params.calculate(distance),
        }];
    }

    (0..=segments)
        .map(|i| {
            let t = i as f32 / segments as f32;
            let distance = params.inner_radius() + params.falloff_distance() * t;
            CurvePoint {
                t,
                distance,
                gain: params.calculate(distance),
            }
        })
        .collect()
}

/// Returns the marker for a listener `distance` metres from the source, or `None` while the
/// distance is not known yet (zero or negative).
pub fn listener_marker(params: &AttenuationCurveParams, distance: f32) -> Option<ListenerMarker> {
    if distance.is_nan() || distance <= 0.0 {
        return None;
    }
    let t = (distance - params.inner_radius()) / params.falloff_distance();
    Some(ListenerMarker {
        t: t.clamp(0.0, 1.0),
        gain: params.calculate(distance),
    })
}

/// Point-in-time view of a spatializer's settings and last rendered values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebugSnapshot {
    pub distance_model: DistanceModel,
    pub attenuation: AttenuationCurveParams,
    pub spatial_blend: f32,
    pub interpolation: HrtfInterpolation,
    /// Distance seen by the last rendered buffer.
    pub listener_distance: f32,
    /// Model gain at that distance, before spatial blend is applied.
    pub distance_attenuation: f32,
}

impl DebugSnapshot {
    pub fn listener_marker(&self) -> Option<ListenerMarker> {
        listener_marker(&self.attenuation, self.listener_distance)
    }
}
