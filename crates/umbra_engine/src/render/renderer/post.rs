//! Bloom and final composition

use crate::render::device::{units, uniforms, ShaderProgram, Uniform};
use crate::render::framebuffers::FramebufferSet;

use super::frame::Frame;

impl Frame<'_> {
    fn bloom_enabled(&self) -> bool {
        self.config.hdr_enabled && self.config.bloom.enabled
    }

    /// Bright-pass into the quarter-resolution buffer, then a separable blur
    /// leaving the result in `bloom[0]`
    pub fn bloom_pass(&mut self, targets: &FramebufferSet) {
        if !self.bloom_enabled() {
            return;
        }
        let screen = &targets.screen;
        let kernel = self.config.bloom.kernel;
        self.uniform(uniforms::THRESHOLD, Uniform::Float(self.config.bloom.threshold));
        self.screen_pass(screen.bloom_fbs[0], ShaderProgram::BrightPass, screen.hdr);
        self.screen_pass(screen.bloom_fbs[1], ShaderProgram::Blur { kernel, horizontal: true }, screen.bloom[0]);
        self.screen_pass(screen.bloom_fbs[0], ShaderProgram::Blur { kernel, horizontal: false }, screen.bloom[1]);
    }

    /// Tone-map the composite into the LDR output, or copy it when HDR is off
    pub fn composite_pass(&mut self, targets: &FramebufferSet) {
        let screen = &targets.screen;
        if !self.config.hdr_enabled {
            self.screen_pass(screen.ldr_fb, ShaderProgram::Copy, screen.hdr);
            return;
        }
        let bloom_intensity = if self.bloom_enabled() { self.config.bloom.intensity } else { 0.0 };
        self.uniform(uniforms::EXPOSURE, Uniform::Float(self.config.exposure));
        self.uniform(uniforms::BLOOM_INTENSITY, Uniform::Float(bloom_intensity));
        self.bind_texture(units::BLOOM, screen.bloom[0]);
        self.screen_pass(screen.ldr_fb, ShaderProgram::ToneMap, screen.hdr);
    }
}
