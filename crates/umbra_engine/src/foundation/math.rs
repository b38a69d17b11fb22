//! Math utilities and types
//!
//! Provides fundamental math types for 3D graphics. All projection helpers
//! follow the right-handed, Y-up convention with clip-space depth in [-1, 1].

pub use nalgebra::{
    Vector2, Vector3, Vector4,
    Matrix3, Matrix4,
    Quaternion,
    Unit,
};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = nalgebra::UnitQuaternion<f32>;

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform from all three components
    pub fn new(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self { position, rotation, scale }
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Convert to a transformation matrix (translate * rotate * scale)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// Apply this transform to a point
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation * self.scale.component_mul(&point)
    }

    /// Combine this transform (as parent) with a child transform
    ///
    /// The parent's rotation and scale are applied to the child's offset
    /// before adding the parent's position.
    pub fn combine(&self, child: &Transform) -> Transform {
        Transform {
            position: self.position + self.rotation * self.scale.component_mul(&child.position),
            rotation: self.rotation * child.rotation,
            scale: self.scale.component_mul(&child.scale),
        }
    }

    /// Forward direction (-Z rotated by this transform)
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::new(0.0, 0.0, -1.0)
    }
}

/// Component-wise division that maps a zero divisor to zero instead of infinity
pub fn safe_component_div(value: &Vec3, divisor: &Vec3) -> Vec3 {
    Vec3::new(
        if divisor.x == 0.0 { 0.0 } else { value.x / divisor.x },
        if divisor.y == 0.0 { 0.0 } else { value.y / divisor.y },
        if divisor.z == 0.0 { 0.0 } else { value.z / divisor.z },
    )
}

/// Bitwise equality of two vectors.
///
/// Unlike `==`, this distinguishes `0.0` from `-0.0` and treats identical NaN
/// payloads as equal.
pub fn vec3_bits_eq(a: &Vec3, b: &Vec3) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| x.to_bits() == y.to_bits())
}

/// Bitwise equality of two rotations
pub fn quat_bits_eq(a: &Quat, b: &Quat) -> bool {
    a.coords.iter().zip(b.coords.iter()).all(|(x, y)| x.to_bits() == y.to_bits())
}

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Pi / 2
    pub const HALF_PI: f32 = PI * 0.5;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;
}

/// Math utility functions
pub mod utils {
    use super::constants;

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * constants::DEG_TO_RAD
    }

    /// Linear interpolation
    pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
        a + (b - a) * t
    }

    /// Hermite smoothstep between two edges
    pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
        if (edge1 - edge0).abs() < f32::EPSILON {
            return if x >= edge1 { 1.0 } else { 0.0 };
        }
        let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
        t * t * (3.0 - 2.0 * t)
    }
}

/// Extension trait for Mat4 with projection and view helpers
pub trait Mat4Ext {
    /// Create a perspective projection matrix (vertical field of view in radians)
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Create an orthographic projection matrix
    fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4;

    /// Create a look-at view matrix
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;

    /// Extract the translation column
    fn translation_part(&self) -> Vec3;
}

impl Mat4Ext for Mat4 {
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        Mat4::new_perspective(aspect.max(f32::EPSILON), fov_y, near, far)
    }

    fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
        Mat4::new_orthographic(left, right, bottom, top, near, far)
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        let forward = target - eye;
        // Fall back to another up axis when looking straight along it
        let up = if forward.cross(&up).norm_squared() < 1e-10 {
            if up.x.abs() < 0.9 { Vec3::x() } else { Vec3::z() }
        } else {
            up
        };
        Mat4::look_at_rh(&Point3::from(eye), &Point3::from(target), &up)
    }

    fn translation_part(&self) -> Vec3 {
        Vec3::new(self[(0, 3)], self[(1, 3)], self[(2, 3)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_combine_applies_parent_rotation_and_scale() {
        let parent = Transform::new(
            Vec3::new(1.0, 0.0, 0.0),
            Quat::from_axis_angle(&Vec3::y_axis(), constants::HALF_PI),
            Vec3::new(2.0, 2.0, 2.0),
        );
        let child = Transform::from_position(Vec3::new(0.0, 0.0, 1.0));

        let combined = parent.combine(&child);

        // (0,0,1) scaled by 2, rotated 90 degrees about Y -> (2,0,0), then offset
        assert_relative_eq!(combined.position, Vec3::new(3.0, 0.0, 0.0), epsilon = 1e-5);
        assert_relative_eq!(combined.scale, Vec3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn test_matrix_matches_transform_point() {
        let transform = Transform::new(
            Vec3::new(2.0, 3.0, 1.0),
            Quat::from_axis_angle(&Vec3::x_axis(), 0.7),
            Vec3::new(1.5, 0.5, 2.0),
        );
        let point = Vec3::new(0.3, -1.0, 4.0);

        let via_matrix = transform.to_matrix().transform_point(&Point3::from(point)).coords;
        assert_relative_eq!(via_matrix, transform.transform_point(point), epsilon = 1e-5);
    }

    #[test]
    fn test_bits_eq_distinguishes_signed_zero() {
        let a = Vec3::new(0.0, 1.0, 2.0);
        let b = Vec3::new(-0.0, 1.0, 2.0);
        assert_eq!(a, b);
        assert!(!vec3_bits_eq(&a, &b));
        assert!(vec3_bits_eq(&a, &a.clone()));
    }

    #[test]
    fn test_look_at_handles_parallel_up() {
        let view = Mat4::look_at(Vec3::zeros(), Vec3::new(0.0, -1.0, 0.0), Vec3::y());
        assert!(view.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_safe_component_div() {
        let result = safe_component_div(&Vec3::new(4.0, 2.0, 1.0), &Vec3::new(2.0, 0.0, 4.0));
        assert_relative_eq!(result, Vec3::new(2.0, 0.0, 0.25));
    }
}
