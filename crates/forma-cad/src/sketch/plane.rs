//! Sketch planes

use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A plane a sketch is drawn on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub id: Uuid,
    pub name: String,
    pub origin: DVec3,
    /// Local X direction (unit)
    pub x_axis: DVec3,
    /// Local Y direction (unit, orthogonal to `x_axis`)
    pub y_axis: DVec3,
}

impl Plane {
    pub fn new(name: impl Into<String>, origin: DVec3, x_axis: DVec3, y_axis: DVec3) -> Self {
        let x_axis = x_axis.normalize_or_zero();
        // Re-orthogonalize so `normal` is always a unit vector
        let y_axis = (y_axis - x_axis * y_axis.dot(x_axis)).normalize_or_zero();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            origin,
            x_axis,
            y_axis,
        }
    }

    /// XY plane
    pub fn top() -> Self {
        Self::new("Top", DVec3::ZERO, DVec3::X, DVec3::Y)
    }

    /// XZ plane
    pub fn front() -> Self {
        Self::new("Front", DVec3::ZERO, DVec3::X, DVec3::Z)
    }

    /// YZ plane
    pub fn right() -> Self {
        Self::new("Right", DVec3::ZERO, DVec3::Y, DVec3::Z)
    }

    pub fn normal(&self) -> DVec3 {
        self.x_axis.cross(self.y_axis)
    }

    /// Convert sketch coordinates to world space
    pub fn to_world(&self, p: DVec2) -> DVec3 {
        self.origin + self.x_axis * p.x + self.y_axis * p.y
    }

    /// Project a world point into sketch coordinates
    pub fn to_local(&self, p: DVec3) -> DVec2 {
        let d = p - self.origin;
        DVec2::new(d.dot(self.x_axis), d.dot(self.y_axis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_planes() {
        assert_eq!(Plane::top().normal(), DVec3::Z);
        assert_eq!(Plane::front().normal(), DVec3::NEG_Y);
        assert_eq!(Plane::right().normal(), DVec3::X);
    }

    #[test]
    fn test_local_world_round_trip() {
        let plane = Plane::new("Offset", DVec3::new(0.0, 0.0, 5.0), DVec3::Y, DVec3::Z);
        let p = DVec2::new(2.0, -3.0);
        assert_eq!(plane.to_world(p), DVec3::new(0.0, 2.0, 2.0));
        assert_eq!(plane.to_local(plane.to_world(p)), p);
    }
}
