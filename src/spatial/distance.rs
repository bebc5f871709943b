//! Distance attenuation and air absorption models.

use crate::attenuation::AttenuationCurveParams;

/// Minimum distance used by [`DistanceModel::Default`].
pub const DEFAULT_MIN_DISTANCE: f32 = 1.0;

const MIN_DISTANCE_FLOOR: f32 = 1e-4;

/// Active distance attenuation model. Exactly one variant is active at a time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistanceModel {
    /// Inverse distance falloff with a one metre minimum distance.
    Default,
    /// Inverse distance falloff, no attenuation closer than `min_distance`.
    InverseDistance { min_distance: f32 },
    /// Evaluate the configured [`AttenuationCurveParams`].
    CustomCurve,
}

impl Default for DistanceModel {
    fn default() -> Self {
        Self::CustomCurve
    }
}

impl DistanceModel {
    pub fn inverse_distance(min_distance: f32) -> Self {
        Self::InverseDistance {
            min_distance: min_distance.max(MIN_DISTANCE_FLOOR),
        }
    }

    pub fn min_distance(&self) -> f32 {
        match self {
            Self::InverseDistance { min_distance } => *min_distance,
            Self::Default | Self::CustomCurve => DEFAULT_MIN_DISTANCE,
        }
    }
}

/// Distance model plus the curve it may refer to, and a dirty flag that forces simulation
/// inputs to be recomputed on the next processed buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceAttenuation {
    model: DistanceModel,
    curve: AttenuationCurveParams,
    dirty: bool,
}

impl Default for DistanceAttenuation {
    fn default() -> Self {
        Self {
            model: DistanceModel::default(),
            curve: AttenuationCurveParams::default(),
            dirty: true,
        }
    }
}

impl DistanceAttenuation {
    pub fn new(model: DistanceModel, curve: AttenuationCurveParams) -> Self {
        Self {
            model,
            curve,
            dirty: true,
        }
    }

    pub fn model(&self) -> DistanceModel {
        self.model
    }

    pub fn curve(&self) -> &AttenuationCurveParams {
        &self.curve
    }

    pub fn set_model(&mut self, model: DistanceModel) {
        self.model = match model {
            DistanceModel::InverseDistance { min_distance } => {
                DistanceModel::inverse_distance(min_distance)
            }
            other => other,
        };
        self.dirty = true;
    }

    pub fn set_curve(&mut self, curve: AttenuationCurveParams) {
        self.curve = curve;
        self.dirty = true;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns the dirty flag and clears it.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    /// Radius used for occlusion sampling around the source.
    pub fn occlusion_radius(&self) -> f32 {
        match self.model {
            DistanceModel::CustomCurve => self.curve.inner_radius(),
            other => other.min_distance(),
        }
    }

    /// Gain for a listener `distance` metres away.
    pub fn gain(&self, distance: f32) -> f32 {
        match self.model {
            DistanceModel::CustomCurve => self.curve.calculate(distance),
            DistanceModel::Default => inverse_distance_gain(distance, DEFAULT_MIN_DISTANCE),
            DistanceModel::InverseDistance { min_distance } => {
                inverse_distance_gain(distance, min_distance)
            }
        }
    }
}

fn inverse_distance_gain(distance: f32, min_distance: f32) -> f32 {
    if distance.is_nan() {
        return 0.0;
    }
    1.0 / distance.max(min_distance.max(MIN_DISTANCE_FLOOR))
}

/// Per-band (low, mid, high) air absorption model.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum AirAbsorptionModel {
    /// Exponential decay with Steam Audio's default coefficients.
    #[default]
    Default,
    /// Exponential decay, `exp(-coefficient * distance)` per band.
    Exponential { coefficients: [f32; 3] },
}

impl AirAbsorptionModel {
    pub const DEFAULT_COEFFICIENTS: [f32; 3] = [0.0002, 0.0017, 0.0182];

    pub fn coefficients(&self) -> [f32; 3] {
        match self {
            Self::Default => Self::DEFAULT_COEFFICIENTS,
            Self::Exponential { coefficients } => *coefficients,
        }
    }

    /// Per-band gain in `[0, 1]` at `distance` metres.
    pub fn evaluate(&self, distance: f32) -> [f32; 3] {
        let distance = if distance.is_nan() { 0.0 } else { distance.max(0.0) };
        self.coefficients()
            .map(|coefficient| (-coefficient.max(0.0) * distance).exp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attenuation::CurveType;

    #[test]
    fn test_default_model_is_inverse_with_unit_minimum() {
        let state = DistanceAttenuation::new(DistanceModel::Default, Default::default());
        assert_eq!(state.gain(0.25), 1.0);
        assert_eq!(state.gain(1.0), 1.0);
        assert!((state.gain(4.0) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_inverse_distance_respects_min_distance() {
        let state = DistanceAttenuation::new(
            DistanceModel::inverse_distance(2.0),
            Default::default(),
        );
        assert_eq!(state.gain(1.0), 0.5);
        assert_eq!(state.gain(8.0), 0.125);
        assert_eq!(state.occlusion_radius(), 2.0);
    }

    #[test]
    fn test_custom_curve_uses_params() {
        let curve = AttenuationCurveParams::new(1.0, 100.0, CurveType::Linear);
        let state = DistanceAttenuation::new(DistanceModel::CustomCurve, curve);
        assert!((state.gain(51.0) - 0.5).abs() < 1e-6);
        assert_eq!(state.occlusion_radius(), 1.0);
    }

    #[test]
    fn test_zero_min_distance_is_floored() {
        let mut state = DistanceAttenuation::default();
        state.set_model(DistanceModel::InverseDistance { min_distance: 0.0 });
        assert!(state.gain(0.0).is_finite());
        assert!(state.model().min_distance() > 0.0);
    }

    #[test]
    fn test_dirty_flag() {
        let mut state = DistanceAttenuation::default();
        assert!(state.take_dirty());
        assert!(!state.is_dirty());

        state.set_curve(AttenuationCurveParams::default().with_inner_radius(3.0));
        assert!(state.take_dirty());
        assert!(!state.take_dirty());

        state.set_model(DistanceModel::Default);
        assert!(state.is_dirty());
    }

    #[test]
    fn test_air_absorption_decays_high_band_fastest() {
        let model = AirAbsorptionModel::Default;
        assert_eq!(model.evaluate(0.0), [1.0, 1.0, 1.0]);

        let [low, mid, high] = model.evaluate(100.0);
        assert!(low > mid && mid > high);
        assert!(high > 0.0 && low <= 1.0);
    }

    #[test]
    fn test_air_absorption_custom_coefficients() {
        let model = AirAbsorptionModel::Exponential {
            coefficients: [0.0, 0.0, 1.0],
        };
        let [low, _, high] = model.evaluate(1.0);
        assert_eq!(low, 1.0);
        assert!((high - (-1.0f32).exp()).abs() < 1e-6);
    }
}
