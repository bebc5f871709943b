//! Math types for binaura
//!
//! Poses follow the Steam Audio convention: +X right, +Y up, -Z ahead.

pub use glam::{Quat, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * (-Vec3::Z)
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    pub fn distance(&self, other: &Self) -> f32 {
        self.position.distance(other.position)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Direction of `source` as seen from a listener at `listener` facing `ahead` with `up`.
///
/// The result is a unit vector in listener space (+X right, +Y up, -Z ahead). The listener's
/// right axis is derived as `ahead × up`. A source sitting exactly on the listener is reported
/// as straight ahead.
pub fn relative_direction(source: Vec3, listener: Vec3, ahead: Vec3, up: Vec3) -> Vec3 {
    let to_source = (source - listener).normalize_or_zero();
    if to_source == Vec3::ZERO {
        return Vec3::NEG_Z;
    }

    let right = ahead.cross(up);
    Vec3::new(
        to_source.dot(right),
        to_source.dot(up),
        -to_source.dot(ahead),
    )
}
