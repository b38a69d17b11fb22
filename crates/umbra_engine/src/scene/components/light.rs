//! Light component
//!
//! Position and direction come from the owning node's world transform:
//! a light shines along the node's forward (-Z) axis.

use crate::foundation::math::Vec3;
use crate::spatial::AABB;

/// Kind-specific light parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    /// Uniform light with no position or direction
    Ambient,
    /// Parallel rays along the node's forward axis
    Directional,
    /// Omnidirectional light with a finite radius
    Point {
        /// Distance at which attenuation reaches zero
        radius: f32,
    },
    /// Cone light along the node's forward axis
    Spot {
        /// Distance at which attenuation reaches zero
        range: f32,
        /// Half-angle of the full-intensity cone, radians
        inner_angle: f32,
        /// Half-angle where intensity reaches zero, radians
        outer_angle: f32,
    },
}

/// Light attached to a scene node
#[derive(Debug, Clone)]
pub struct LightComponent {
    /// Kind and kind-specific parameters
    pub kind: LightKind,
    /// Linear RGB color
    pub color: Vec3,
    /// Intensity multiplier
    pub intensity: f32,
    /// Disabled lights are never rendered
    pub enabled: bool,
    /// Request a shadow map (ignored for ambient lights)
    pub cast_shadows: bool,
}

impl LightComponent {
    /// Ambient light
    pub fn ambient(color: Vec3, intensity: f32) -> Self {
        Self::with_kind(LightKind::Ambient, color, intensity)
    }

    /// Directional light
    pub fn directional(color: Vec3, intensity: f32) -> Self {
        Self::with_kind(LightKind::Directional, color, intensity)
    }

    /// Point light
    pub fn point(color: Vec3, intensity: f32, radius: f32) -> Self {
        Self::with_kind(LightKind::Point { radius }, color, intensity)
    }

    /// Spot light; angles are half-angles in radians
    pub fn spot(color: Vec3, intensity: f32, range: f32, inner_angle: f32, outer_angle: f32) -> Self {
        Self::with_kind(
            LightKind::Spot {
                range,
                inner_angle: inner_angle.min(outer_angle),
                outer_angle,
            },
            color,
            intensity,
        )
    }

    fn with_kind(kind: LightKind, color: Vec3, intensity: f32) -> Self {
        Self {
            kind,
            color,
            intensity,
            enabled: true,
            cast_shadows: false,
        }
    }

    /// Builder-style shadow toggle
    pub fn with_shadows(mut self, cast_shadows: bool) -> Self {
        self.cast_shadows = cast_shadows;
        self
    }

    /// Ambient and directional lights affect the whole scene
    pub fn is_global(&self) -> bool {
        matches!(self.kind, LightKind::Ambient | LightKind::Directional)
    }

    /// Radius of influence for point and spot lights
    pub fn reach(&self) -> Option<f32> {
        match self.kind {
            LightKind::Point { radius } => Some(radius.max(0.0)),
            LightKind::Spot { range, .. } => Some(range.max(0.0)),
            _ => None,
        }
    }

    /// World-space bounds of the lit volume, `None` for global lights
    pub fn bounds(&self, world_position: Vec3) -> Option<AABB> {
        self.reach()
            .map(|reach| AABB::from_center_extents(world_position, Vec3::repeat(reach)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_lights_have_no_bounds() {
        let sun = LightComponent::directional(Vec3::new(1.0, 1.0, 1.0), 1.0);
        assert!(sun.is_global());
        assert!(sun.bounds(Vec3::zeros()).is_none());
    }

    #[test]
    fn test_point_bounds_cover_radius() {
        let lamp = LightComponent::point(Vec3::new(1.0, 0.8, 0.6), 2.0, 3.0);
        let bounds = lamp.bounds(Vec3::new(1.0, 0.0, 0.0)).unwrap();
        assert_eq!(bounds.min, Vec3::new(-2.0, -3.0, -3.0));
        assert_eq!(bounds.max, Vec3::new(4.0, 3.0, 3.0));
    }

    #[test]
    fn test_spot_inner_clamped_to_outer() {
        let spot = LightComponent::spot(Vec3::new(1.0, 1.0, 1.0), 1.0, 10.0, 0.8, 0.5);
        match spot.kind {
            LightKind::Spot { inner_angle, outer_angle, .. } => assert!(inner_angle <= outer_angle),
            _ => unreachable!(),
        }
    }
}
