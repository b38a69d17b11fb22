//! Camera component
//!
//! The view matrix is the inverse of the owning node's world rotation and
//! position; node scale is ignored. Cameras look down their local -Z axis.

use crate::foundation::math::{Mat4, Mat4Ext, Transform, Vec3};

/// Perspective camera attached to a scene node
#[derive(Debug, Clone)]
pub struct CameraComponent {
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Near clip distance
    pub near: f32,
    /// Far clip distance
    pub far: f32,
    /// Fixed aspect ratio; `None` follows the viewport
    pub aspect: Option<f32>,
    /// Disabled cameras render nothing
    pub enabled: bool,
}

impl Default for CameraComponent {
    fn default() -> Self {
        Self::perspective(60.0_f32.to_radians(), 0.1, 100.0)
    }
}

impl CameraComponent {
    /// Perspective camera with a viewport-driven aspect ratio
    pub fn perspective(fov_y: f32, near: f32, far: f32) -> Self {
        Self {
            fov_y,
            near,
            far,
            aspect: None,
            enabled: true,
        }
    }

    /// Projection matrix for a viewport of the given aspect ratio
    pub fn projection(&self, viewport_aspect: f32) -> Mat4 {
        Mat4::perspective(self.fov_y, self.aspect.unwrap_or(viewport_aspect), self.near, self.far)
    }

    /// View matrix for a camera at `world` transform
    pub fn view(world: &Transform) -> Mat4 {
        let inverse_rotation = world.rotation.inverse();
        inverse_rotation.to_homogeneous() * Mat4::new_translation(&-world.position)
    }
}

/// Per-frame camera data derived from a camera node
#[derive(Debug, Clone, Copy)]
pub struct CameraView {
    /// World to view
    pub view: Mat4,
    /// View to clip
    pub projection: Mat4,
    /// Camera position in world space
    pub position: Vec3,
    /// Unit view direction in world space
    pub forward: Vec3,
    /// Near clip distance
    pub near: f32,
    /// Far clip distance
    pub far: f32,
}

impl CameraView {
    /// Build from a camera component and its node's world transform
    pub fn new(camera: &CameraComponent, world: &Transform, viewport_aspect: f32) -> Self {
        Self {
            view: CameraComponent::view(world),
            projection: camera.projection(viewport_aspect),
            position: world.position,
            forward: world.forward().normalize(),
            near: camera.near,
            far: camera.far,
        }
    }

    /// Combined view-projection matrix
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}
