//! Distance attenuation curves.
//!
//! An [`AttenuationCurveParams`] describes a sphere around the source: no attenuation inside
//! `inner_radius`, full attenuation at `inner_radius + falloff_distance`, and a configurable
//! curve in between.

/// Smallest falloff distance accepted by setters.
pub const MIN_FALLOFF_DISTANCE: f32 = 1e-3;

const MIN_CURVE_EXPONENT: f32 = 0.1;
const MAX_CURVE_EXPONENT: f32 = 10.0;

/// Shape of the attenuation volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttenuationShape {
    #[default]
    Sphere,
}

/// How gain falls off between the inner radius and the end of the falloff range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CurveType {
    #[default]
    Linear,
    Logarithmic,
    /// `inner_radius / distance`
    Inverse,
    LogReverse,
    /// Inverse square law, `(inner_radius / distance)^2`
    NaturalSound,
}

impl CurveType {
    pub const ALL: [CurveType; 5] = [
        CurveType::Linear,
        CurveType::Logarithmic,
        CurveType::Inverse,
        CurveType::LogReverse,
        CurveType::NaturalSound,
    ];
}

/// Parameters of a custom attenuation curve.
///
/// Fields are only reachable through setters so that `falloff_distance` can never reach zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttenuationCurveParams {
    shape: AttenuationShape,
    inner_radius: f32,
    falloff_distance: f32,
    curve_type: CurveType,
    curve_exponent: f32,
}

impl Default for AttenuationCurveParams {
    fn default() -> Self {
        Self {
            shape: AttenuationShape::Sphere,
            inner_radius: 1.0,
            falloff_distance: 100.0,
            curve_type: CurveType::Linear,
            curve_exponent: 1.0,
        }
    }
}

impl AttenuationCurveParams {
    pub fn new(inner_radius: f32, falloff_distance: f32, curve_type: CurveType) -> Self {
        Self::default()
            .with_inner_radius(inner_radius)
            .with_falloff_distance(falloff_distance)
            .with_curve_type(curve_type)
    }

    pub fn with_shape(mut self, shape: AttenuationShape) -> Self {
        self.set_shape(shape);
        self
    }

    pub fn with_inner_radius(mut self, inner_radius: f32) -> Self {
        self.set_inner_radius(inner_radius);
        self
    }

    pub fn with_falloff_distance(mut self, falloff_distance: f32) -> Self {
        self.set_falloff_distance(falloff_distance);
        self
    }

    pub fn with_curve_type(mut self, curve_type: CurveType) -> Self {
        self.set_curve_type(curve_type);
        self
    }

    pub fn with_curve_exponent(mut self, exponent: f32) -> Self {
        self.set_curve_exponent(exponent);
        self
    }

    pub fn set_shape(&mut self, shape: AttenuationShape) {
        self.shape = shape;
    }

    /// Negative (or NaN) radii are treated as zero.
    pub fn set_inner_radius(&mut self, inner_radius: f32) {
        self.inner_radius = inner_radius.max(0.0);
    }

    /// Clamped to [`MIN_FALLOFF_DISTANCE`].
    pub fn set_falloff_distance(&mut self, falloff_distance: f32) {
        self.falloff_distance = falloff_distance.max(MIN_FALLOFF_DISTANCE);
    }

    pub fn set_curve_type(&mut self, curve_type: CurveType) {
        self.curve_type = curve_type;
    }

    /// Persisted with host configs but not used by any curve type. Clamped to `[0.1, 10]`.
    pub fn set_curve_exponent(&mut self, exponent: f32) {
        self.curve_exponent = if exponent.is_nan() {
            1.0
        } else {
            exponent.clamp(MIN_CURVE_EXPONENT, MAX_CURVE_EXPONENT)
        };
    }

    pub fn shape(&self) -> AttenuationShape {
        self.shape
    }

    pub fn inner_radius(&self) -> f32 {
        self.inner_radius
    }

    pub fn falloff_distance(&self) -> f32 {
        self.falloff_distance
    }

    pub fn curve_type(&self) -> CurveType {
        self.curve_type
    }

    pub fn curve_exponent(&self) -> f32 {
        self.curve_exponent
    }

    /// Distance at which the curve reaches zero.
    pub fn max_distance(&self) -> f32 {
        self.inner_radius + self.falloff_distance
    }

    /// Gain in `[0, 1]` for a listener `distance` metres away from the source.
    ///
    /// Safe to call from the audio thread. A NaN distance yields 0.
    pub fn calculate(&self, distance: f32) -> f32 {
        if distance.is_nan() {
            return 0.0;
        }

        if distance <= self.inner_radius {
            return 1.0;
        }

        let effective_distance = distance - self.inner_radius;
        if effective_distance >= self.falloff_distance {
            return 0.0;
        }

        let normalized = effective_distance / self.falloff_distance;

        let attenuation = match self.curve_type {
            CurveType::Linear => 1.0 - normalized,
            CurveType::Logarithmic => 1.0 - (normalized * 9.0 + 1.0).log10(),
            CurveType::Inverse => self.inner_radius / distance,
            CurveType::NaturalSound => {
                let ratio = self.inner_radius / distance;
                ratio * ratio
            }
            CurveType::LogReverse => ((1.0 - normalized) * 9.0 + 1.0).log10(),
        };

        attenuation.clamp(0.0, 1.0)
    }
}
