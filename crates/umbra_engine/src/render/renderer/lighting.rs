//! Light accumulation
//!
//! One additive sub-pass per visible light into the diffuse and specular
//! buffers, depth-tested `Equal` against the pre-pass so only the nearest
//! opaque surface is shaded. Point and spot lights are scissored to the
//! screen rectangle covered by their bounding sphere.

use crate::foundation::math::{Mat4, Vec3, Vec4};
use crate::render::commands::RenderCommand;
use crate::render::device::{
    uniforms, BlendMode, ClearValues, CullMode, DepthFunc, DepthState, LightType, ScissorRect, Uniform,
};
use crate::render::framebuffers::FramebufferSet;
use crate::render::shader_cache::ShaderPass;
use crate::render::visibility::VisibleObjects;
use crate::scene::{LightId, LightKind};

use super::frame::Frame;

/// Light data resolved from its node for one frame
#[derive(Debug, Clone, Copy)]
pub(super) struct LightInstance {
    pub light_type: LightType,
    pub kind: LightKind,
    pub radiance: Vec3,
    pub position: Vec3,
    pub direction: Vec3,
    pub cast_shadows: bool,
}

impl LightInstance {
    fn light_type(kind: LightKind) -> LightType {
        match kind {
            LightKind::Ambient => LightType::Ambient,
            LightKind::Directional => LightType::Directional,
            LightKind::Point { .. } => LightType::Point,
            LightKind::Spot { .. } => LightType::Spot,
        }
    }

    /// Radius of influence, zero for global lights
    pub fn reach(&self) -> f32 {
        match self.kind {
            LightKind::Point { radius } => radius.max(0.0),
            LightKind::Spot { range, .. } => range.max(0.0),
            _ => 0.0,
        }
    }
}

/// Pixel rectangle covering a sphere, `None` when it cannot be bounded
/// (the sphere reaches behind the camera).
///
/// The eight corners of the sphere's bounding box are projected; the
/// result is rounded outwards and clamped to the viewport.
pub fn light_scissor(view_projection: &Mat4, center: Vec3, radius: f32, width: u32, height: u32) -> Option<ScissorRect> {
    let (mut min_x, mut min_y) = (f32::INFINITY, f32::INFINITY);
    let (mut max_x, mut max_y) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
    for corner in 0..8 {
        let sign = |bit: usize| if corner & bit == 0 { -1.0 } else { 1.0 };
        let point = center + Vec3::new(sign(1), sign(2), sign(4)) * radius;
        let clip = view_projection * Vec4::new(point.x, point.y, point.z, 1.0);
        if clip.w <= f32::EPSILON {
            return None;
        }
        let (x, y) = (clip.x / clip.w, clip.y / clip.w);
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }

    let to_pixels = |ndc: f32, size: u32| ((ndc * 0.5 + 0.5) * size as f32).clamp(0.0, size as f32);
    let x0 = to_pixels(min_x, width).floor() as u32;
    let y0 = to_pixels(min_y, height).floor() as u32;
    let x1 = to_pixels(max_x, width).ceil() as u32;
    let y1 = to_pixels(max_y, height).ceil() as u32;
    Some(ScissorRect {
        x: x0,
        y: y0,
        width: x1.saturating_sub(x0),
        height: y1.saturating_sub(y0),
    })
}

impl Frame<'_> {
    pub(super) fn light_instance(&self, id: LightId) -> Option<LightInstance> {
        let attached = self.scene.light(id)?;
        let light = &attached.component;
        if !light.enabled {
            return None;
        }
        let world = self.scene.graph().world_transform(attached.node)?;
        Some(LightInstance {
            light_type: LightInstance::light_type(light.kind),
            kind: light.kind,
            radiance: light.color * light.intensity,
            position: world.position,
            direction: world.forward().normalize(),
            cast_shadows: light.cast_shadows,
        })
    }

    /// Clear the accumulation buffers and run one sub-pass per light
    pub fn light_pass(&mut self, targets: &FramebufferSet, visible: &VisibleObjects) {
        let light_fb = targets.screen.light_fb;
        self.begin(light_fb, DepthState::DISABLED, BlendMode::Replace, CullMode::Back);
        self.clear(ClearValues::color([0.0; 4]));

        let lights = visible
            .ambient_lights
            .iter()
            .chain(&visible.directional_lights)
            .chain(&visible.point_lights)
            .chain(&visible.spot_lights)
            .copied();
        for id in lights {
            let Some(light) = self.light_instance(id) else {
                continue;
            };
            let shadowed = self.config.shadows.enabled
                && light.cast_shadows
                && light.light_type != LightType::Ambient
                && self.render_shadow(targets, &light);

            self.begin(light_fb, DepthState::new(DepthFunc::Equal, false), BlendMode::Additive, CullMode::Back);
            if matches!(light.light_type, LightType::Point | LightType::Spot) {
                let scissor = light_scissor(
                    &self.camera.view_projection(),
                    light.position,
                    light.reach(),
                    targets.width(),
                    targets.height(),
                );
                self.push(RenderCommand::SetScissor(scissor));
            }
            self.set_camera_uniforms();
            self.set_light_uniforms(&light, shadowed);
            self.draw_opaque(ShaderPass::Light(light.light_type));
            self.stats.lights += 1;
        }
        self.push(RenderCommand::SetScissor(None));
    }

    fn set_light_uniforms(&mut self, light: &LightInstance, shadowed: bool) {
        self.uniform(uniforms::LIGHT_COLOR, Uniform::Vec3(light.radiance));
        self.uniform(uniforms::LIGHT_DIRECTION, Uniform::Vec3(light.direction));
        self.uniform(uniforms::LIGHT_POSITION, Uniform::Vec3(light.position));
        self.uniform(uniforms::LIGHT_RADIUS, Uniform::Float(light.reach()));
        if let LightKind::Spot { inner_angle, outer_angle, .. } = light.kind {
            let cone = Vec4::new(inner_angle.cos(), outer_angle.cos(), 0.0, 0.0);
            self.uniform(uniforms::SPOT_CONE, Uniform::Vec4(cone));
        }
        self.uniform(uniforms::SHADOW_ENABLED, Uniform::Int(i32::from(shadowed)));
    }
}
