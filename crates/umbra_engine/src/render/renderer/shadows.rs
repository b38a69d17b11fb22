//! Variance shadow maps
//!
//! Directional and spot lights render depth moments into a 2D map; point
//! lights render distance moments into each face of a cube map, reusing one
//! depth scratch buffer cleared per face. Every map is blurred with a
//! separable gaussian before the light samples it.

use crate::foundation::math::{Mat4, Mat4Ext, Vec3};
use crate::render::device::{
    units, uniforms, BlendMode, ClearValues, CubeFace, CullMode, DepthFunc, DepthState, FramebufferId, ShaderProgram,
    TextureId, Uniform,
};
use crate::render::framebuffers::FramebufferSet;
use crate::render::shader_cache::ShaderPass;
use crate::render::visibility::collect_shadow_casters;
use crate::scene::LightKind;

use super::frame::Frame;
use super::lighting::LightInstance;

const SHADOW_NEAR: f32 = 0.05;

/// Moments of an empty map: everything at the far plane
const CLEARED_MOMENTS: [f32; 4] = [1.0, 1.0, 0.0, 0.0];

/// Orthographic light volume of half-size `extent` centred on `focus`
pub fn directional_view_projection(direction: Vec3, focus: Vec3, extent: f32) -> Mat4 {
    let direction = direction.try_normalize(f32::EPSILON).unwrap_or_else(|| -Vec3::z());
    let eye = focus - direction * (extent * 2.0);
    let view = Mat4::look_at(eye, focus, Vec3::y());
    Mat4::orthographic(-extent, extent, -extent, extent, 0.0, extent * 4.0) * view
}

/// Perspective volume of a spot light's outer cone
pub fn spot_view_projection(position: Vec3, direction: Vec3, outer_angle: f32, range: f32) -> Mat4 {
    let direction = direction.try_normalize(f32::EPSILON).unwrap_or_else(|| -Vec3::z());
    let fov = (outer_angle * 2.0).clamp(0.01, std::f32::consts::PI - 0.01);
    let view = Mat4::look_at(position, position + direction, Vec3::y());
    Mat4::perspective(fov, 1.0, SHADOW_NEAR, range.max(SHADOW_NEAR * 2.0)) * view
}

/// View-projection rendering one cube face around `position`
pub fn cube_face_view_projection(position: Vec3, face: CubeFace, radius: f32) -> Mat4 {
    let view = Mat4::look_at(position, position + face.direction(), face.up());
    Mat4::perspective(std::f32::consts::FRAC_PI_2, 1.0, SHADOW_NEAR, radius.max(SHADOW_NEAR * 2.0)) * view
}

impl Frame<'_> {
    /// Render the light's shadow map; false if the light kind has none
    pub(super) fn render_shadow(&mut self, targets: &FramebufferSet, light: &LightInstance) -> bool {
        match light.kind {
            LightKind::Directional => {
                let extent = self.config.shadows.directional_extent;
                let view_projection = directional_view_projection(light.direction, self.camera.position, extent);
                self.render_shadow_2d(targets, &view_projection, light.direction);
                true
            }
            LightKind::Spot { range, outer_angle, .. } => {
                let view_projection = spot_view_projection(light.position, light.direction, outer_angle, range);
                self.render_shadow_2d(targets, &view_projection, light.direction);
                true
            }
            LightKind::Point { radius } => {
                self.render_shadow_cube(targets, light.position, radius);
                true
            }
            LightKind::Ambient => false,
        }
    }

    fn render_shadow_2d(&mut self, targets: &FramebufferSet, view_projection: &Mat4, direction: Vec3) {
        let shadows = &targets.shadows;
        let casters = collect_shadow_casters(self.scene, view_projection, direction);

        self.begin(shadows.map_fb, DepthState::new(DepthFunc::Less, true), BlendMode::Replace, CullMode::Back);
        self.clear(ClearValues::all(CLEARED_MOMENTS, 1.0));
        self.uniform(uniforms::VIEW_PROJECTION, Uniform::Mat4(*view_projection));
        for id in casters {
            let items = self.draw_items(id).to_vec();
            self.draw_all(&items, ShaderPass::ShadowDepth);
        }
        self.blur(shadows.map_blur_fb, shadows.map, shadows.map_fb, shadows.map_scratch);
        self.stats.shadow_passes += 1;

        self.uniform(uniforms::LIGHT_VIEW_PROJECTION, Uniform::Mat4(*view_projection));
        self.bind_texture(units::SHADOW_MAP, shadows.map);
    }

    fn render_shadow_cube(&mut self, targets: &FramebufferSet, position: Vec3, radius: f32) {
        let shadows = &targets.shadows;
        for face in CubeFace::ALL {
            let view_projection = cube_face_view_projection(position, face, radius);
            let casters = collect_shadow_casters(self.scene, &view_projection, face.direction());

            self.begin(shadows.cube_raw_fb, DepthState::new(DepthFunc::Less, true), BlendMode::Replace, CullMode::Back);
            self.clear(ClearValues::all(CLEARED_MOMENTS, 1.0));
            self.uniform(uniforms::VIEW_PROJECTION, Uniform::Mat4(view_projection));
            self.uniform(uniforms::LIGHT_POSITION, Uniform::Vec3(position));
            self.uniform(uniforms::LIGHT_RADIUS, Uniform::Float(radius));
            for id in casters {
                let items = self.draw_items(id).to_vec();
                self.draw_all(&items, ShaderPass::ShadowDistance);
            }
            let face_fb = shadows.cube_face_fbs[face.index()];
            self.blur(shadows.cube_blur_fb, shadows.cube_raw, face_fb, shadows.cube_scratch);
            self.stats.shadow_passes += 1;
        }
        self.bind_texture(units::SHADOW_CUBE, shadows.cube);
    }

    /// Horizontal blur of `source` into `scratch_fb`, then vertical blur of
    /// `scratch` into `target_fb`
    fn blur(&mut self, scratch_fb: FramebufferId, source: TextureId, target_fb: FramebufferId, scratch: TextureId) {
        let kernel = self.config.shadows.blur;
        self.screen_pass(scratch_fb, ShaderProgram::Blur { kernel, horizontal: true }, source);
        self.screen_pass(target_fb, ShaderProgram::Blur { kernel, horizontal: false }, scratch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec4;
    use approx::assert_relative_eq;

    fn project(m: &Mat4, p: Vec3) -> Vec3 {
        let clip = m * Vec4::new(p.x, p.y, p.z, 1.0);
        clip.xyz() / clip.w
    }

    #[test]
    fn test_directional_volume_contains_focus() {
        let m = directional_view_projection(Vec3::new(0.0, -1.0, -1.0), Vec3::zeros(), 10.0);
        let ndc = project(&m, Vec3::zeros());
        assert_relative_eq!(ndc.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(ndc.y, 0.0, epsilon = 1e-5);
        assert!(ndc.z.abs() < 1.0);
    }

    #[test]
    fn test_cube_face_centres_its_axis() {
        let position = Vec3::new(1.0, 2.0, 3.0);
        for face in CubeFace::ALL {
            let m = cube_face_view_projection(position, face, 10.0);
            let ndc = project(&m, position + face.direction() * 5.0);
            assert_relative_eq!(ndc.x, 0.0, epsilon = 1e-5);
            assert_relative_eq!(ndc.y, 0.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_spot_volume_ends_at_range() {
        let m = spot_view_projection(Vec3::zeros(), -Vec3::z(), 0.5, 8.0);
        assert_relative_eq!(project(&m, Vec3::new(0.0, 0.0, -8.0)).z, 1.0, epsilon = 1e-4);
    }
}
