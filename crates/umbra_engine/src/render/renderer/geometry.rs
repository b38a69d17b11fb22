//! Mesh passes: depth pre-pass, material resolve, blended and refractive

use crate::render::device::{
    units, uniforms, BlendMode, ClearValues, CullMode, DepthFunc, DepthState, ShaderProgram, Uniform,
};
use crate::render::commands::RenderCommand;
use crate::render::framebuffers::FramebufferSet;
use crate::render::shader_cache::ShaderPass;
use crate::render::visibility::VisibleObjects;
use crate::foundation::math::Vec3;

use super::frame::Frame;

impl Frame<'_> {
    /// Opaque depth into the shared depth buffer; no color
    pub fn depth_pre_pass(&mut self, targets: &FramebufferSet) {
        self.begin(targets.screen.depth_fb, DepthState::new(DepthFunc::Less, true), BlendMode::Replace, CullMode::Back);
        self.clear(ClearValues::depth(1.0));
        self.push(RenderCommand::SetColorWrite(false));
        self.set_camera_uniforms();
        self.draw_opaque(ShaderPass::Depth);
    }

    /// Resolve opaque materials against the light buffers into the composite
    pub fn material_pass(&mut self, targets: &FramebufferSet) {
        let screen = &targets.screen;
        self.begin(screen.hdr_fb, DepthState::new(DepthFunc::Equal, false), BlendMode::Replace, CullMode::Back);
        self.clear(ClearValues::color(self.config.clear_color));
        self.set_camera_uniforms();
        self.bind_texture(units::LIGHT_DIFFUSE, screen.light_diffuse);
        self.bind_texture(units::LIGHT_SPECULAR, screen.light_specular);
        self.draw_opaque(ShaderPass::Material);
    }

    /// Alpha blended meshes, back to front, lit by ambient and the first directional light
    pub fn blended_pass(&mut self, targets: &FramebufferSet, visible: &VisibleObjects) {
        if self.blended.is_empty() {
            return;
        }
        let (ambient, sun) = self.forward_lighting(visible);
        let (sun_color, sun_direction) = sun.unwrap_or((Vec3::zeros(), -Vec3::z()));

        self.begin(targets.screen.hdr_fb, DepthState::new(DepthFunc::LEqual, false), BlendMode::Alpha, CullMode::Back);
        self.set_camera_uniforms();
        self.uniform(uniforms::AMBIENT, Uniform::Vec3(ambient));
        self.uniform(uniforms::LIGHT_COLOR, Uniform::Vec3(sun_color));
        self.uniform(uniforms::LIGHT_DIRECTION, Uniform::Vec3(sun_direction));

        let items = std::mem::take(&mut self.blended);
        self.draw_all(&items, ShaderPass::Blended);
        self.blended = items;
    }

    /// Meshes sampling a snapshot of everything resolved so far
    pub fn refractive_pass(&mut self, targets: &FramebufferSet) {
        if self.refractive.is_empty() {
            return;
        }
        let screen = &targets.screen;
        self.screen_pass(screen.snapshot_fb, ShaderProgram::Copy, screen.hdr);

        self.begin(screen.hdr_fb, DepthState::new(DepthFunc::LEqual, false), BlendMode::Alpha, CullMode::Back);
        self.set_camera_uniforms();
        self.bind_texture(units::SCENE_COLOR, screen.snapshot);
        let items = std::mem::take(&mut self.refractive);
        self.draw_all(&items, ShaderPass::Refractive);
        self.refractive = items;
    }
}
