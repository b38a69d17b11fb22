//! Software graphics device
//!
//! A deterministic CPU rasterizer implementing [`GraphicsDevice`]. It runs
//! the built-in [`ShaderProgram`]s, supports multiple render targets, cube
//! face attachments, scissoring and the depth/blend state the renderer
//! uses. Readback makes it the reference for headless rendering and tests.

mod programs;
mod raster;
mod texture;

use std::collections::HashMap;

use crate::foundation::math::{Vec2, Vec3, Vec4};
use crate::render::device::{
    AttachmentTarget, BlendMode, ClearValues, CullMode, DepthState, DeviceStats, FramebufferDesc,
    FramebufferId, GraphicsDevice, ScissorRect, ShaderDesc, ShaderId, TextureDesc, TextureFilter,
    TextureFormat, TextureId, Uniform, VertexArrayId, VertexData, WrapMode,
};
use crate::render::{RenderError, RenderResult};

use programs::{CompiledProgram, FragmentInput, Textures, Uniforms, VertexStage};
use raster::{PixelBounds, ScreenVertex};
use texture::Texture;

pub use programs::{attenuation, chebyshev};

#[derive(Debug, Clone)]
struct Framebuffer {
    colors: Vec<AttachmentTarget>,
    depth: Option<AttachmentTarget>,
    draw_buffers: Vec<usize>,
}

#[derive(Debug, Clone, Copy)]
struct PipelineState {
    framebuffer: Option<FramebufferId>,
    depth: DepthState,
    blend: BlendMode,
    color_write: bool,
    cull: CullMode,
    scissor: Option<ScissorRect>,
    shader: Option<ShaderId>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            framebuffer: None,
            depth: DepthState::default(),
            blend: BlendMode::Replace,
            color_write: true,
            cull: CullMode::Back,
            scissor: None,
            shader: None,
        }
    }
}

/// Attachments taken out of the texture table for the duration of a draw
struct Targets {
    textures: Vec<(TextureId, Texture)>,
    /// (slot in `textures`, layer) per active draw buffer
    colors: Vec<(usize, u32)>,
    depth: Option<(usize, u32)>,
    width: u32,
    height: u32,
}

impl Targets {
    fn texel(&self, (slot, layer): (usize, u32), x: u32, y: u32) -> Vec4 {
        let texture = &self.textures[slot].1;
        texture.texels[texture.index(layer, x, y)]
    }

    fn store(&mut self, (slot, layer): (usize, u32), x: u32, y: u32, value: Vec4) {
        let texture = &mut self.textures[slot].1;
        let index = texture.index(layer, x, y);
        texture.store(index, value);
    }
}

/// Texture bindings seen by fragment programs
struct Sampler<'a> {
    textures: &'a HashMap<TextureId, Texture>,
    bindings: &'a HashMap<u32, TextureId>,
}

impl Sampler<'_> {
    fn bound(&self, unit: u32) -> Option<&Texture> {
        self.bindings.get(&unit).and_then(|id| self.textures.get(id))
    }
}

impl Textures for Sampler<'_> {
    fn sample(&self, unit: u32, uv: Vec2) -> Vec4 {
        match self.bound(unit) {
            Some(texture) if !texture.is_cube() => texture.sample_layer(0, uv),
            _ => Vec4::zeros(),
        }
    }

    fn fetch(&self, unit: u32, x: u32, y: u32) -> Vec4 {
        self.bound(unit)
            .map_or_else(Vec4::zeros, |texture| texture.fetch(0, i64::from(x), i64::from(y)))
    }

    fn sample_cube(&self, unit: u32, direction: &Vec3) -> Vec4 {
        self.bound(unit)
            .map_or_else(Vec4::zeros, |texture| texture.sample_cube(direction))
    }

    fn size(&self, unit: u32) -> Option<(u32, u32)> {
        self.bound(unit).map(|texture| (texture.width, texture.height))
    }
}

/// CPU reference device
#[derive(Debug, Default)]
pub struct SoftwareDevice {
    textures: HashMap<TextureId, Texture>,
    framebuffers: HashMap<FramebufferId, Framebuffer>,
    shaders: HashMap<ShaderId, CompiledProgram>,
    vertex_arrays: HashMap<VertexArrayId, VertexData>,
    state: PipelineState,
    uniforms: HashMap<&'static str, Uniform>,
    bindings: HashMap<u32, TextureId>,
    stats: DeviceStats,
}

fn unknown<T: std::fmt::Debug>(id: T) -> RenderError {
    RenderError::UnknownResource(format!("{id:?}"))
}

fn blend(mode: BlendMode, src: Vec4, dst: Vec4) -> Vec4 {
    match mode {
        BlendMode::Replace => src,
        BlendMode::Additive => src + dst,
        BlendMode::Alpha => {
            let a = src.w.clamp(0.0, 1.0);
            let rgb = src.xyz() * a + dst.xyz() * (1.0 - a);
            Vec4::new(rgb.x, rgb.y, rgb.z, a + dst.w * (1.0 - a))
        }
    }
}

impl SoftwareDevice {
    /// Create an empty device
    pub fn new() -> Self {
        log::debug!("Software graphics device created");
        Self::default()
    }

    /// Number of live textures
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Number of live shaders
    pub fn shader_count(&self) -> usize {
        self.shaders.len()
    }

    fn texture_mut(&mut self, id: TextureId) -> RenderResult<&mut Texture> {
        self.textures.get_mut(&id).ok_or_else(|| unknown(id))
    }

    /// Size and layer of an attachment, validating its texture
    fn attachment_extent(&self, target: AttachmentTarget) -> RenderResult<(u32, u32, u32, TextureFormat)> {
        let texture = self.textures.get(&target.texture()).ok_or_else(|| unknown(target.texture()))?;
        let layer = match target {
            AttachmentTarget::Texture(_) if texture.is_cube() => {
                return Err(RenderError::InvalidFramebuffer(format!(
                    "{:?} is a cube map; attach a single face",
                    target.texture()
                )))
            }
            AttachmentTarget::Texture(_) => 0,
            AttachmentTarget::CubeFace(_, face) if texture.is_cube() => face.index() as u32,
            AttachmentTarget::CubeFace(id, _) => {
                return Err(RenderError::InvalidFramebuffer(format!("{id:?} is not a cube map")))
            }
        };
        Ok((texture.width, texture.height, layer, texture.format))
    }

    /// Pull the bound framebuffer's active attachments out of the table
    fn take_targets(&mut self) -> RenderResult<Targets> {
        let id = self
            .state
            .framebuffer
            .ok_or_else(|| RenderError::InvalidFramebuffer("no framebuffer bound".into()))?;
        let framebuffer = self.framebuffers.get(&id).ok_or_else(|| unknown(id))?.clone();

        let mut attachments: Vec<(AttachmentTarget, bool)> = framebuffer
            .draw_buffers
            .iter()
            .filter_map(|index| framebuffer.colors.get(*index).map(|target| (*target, false)))
            .collect();
        if let Some(depth) = framebuffer.depth {
            attachments.push((depth, true));
        }

        let mut size = None;
        let mut layers = Vec::with_capacity(attachments.len());
        for (target, _) in &attachments {
            let (width, height, layer, _) = self.attachment_extent(*target)?;
            match size {
                None => size = Some((width, height)),
                Some(existing) if existing != (width, height) => {
                    return Err(RenderError::InvalidFramebuffer(format!(
                        "{id:?} attachments differ in size"
                    )))
                }
                Some(_) => {}
            }
            layers.push(layer);
        }
        let (width, height) =
            size.ok_or_else(|| RenderError::InvalidFramebuffer(format!("{id:?} has no active attachments")))?;

        let mut targets = Targets { textures: Vec::new(), colors: Vec::new(), depth: None, width, height };
        for ((target, is_depth), layer) in attachments.into_iter().zip(layers) {
            let texture_id = target.texture();
            let slot = match targets.textures.iter().position(|(existing, _)| *existing == texture_id) {
                Some(slot) => slot,
                None => {
                    let texture = self.textures.remove(&texture_id).ok_or_else(|| unknown(texture_id))?;
                    targets.textures.push((texture_id, texture));
                    targets.textures.len() - 1
                }
            };
            if is_depth {
                targets.depth = Some((slot, layer));
            } else {
                targets.colors.push((slot, layer));
            }
        }
        Ok(targets)
    }

    fn restore_targets(&mut self, targets: Targets) {
        for (id, texture) in targets.textures {
            self.textures.insert(id, texture);
        }
    }

    fn rasterize_into(&mut self, vertex_array: VertexArrayId, targets: &mut Targets) -> RenderResult<()> {
        let Some(shader) = self.state.shader else {
            self.stats.skipped_draws += 1;
            log::trace!("Draw of {:?} skipped: no shader current", vertex_array);
            return Ok(());
        };
        let program = self.shaders.get(&shader).ok_or_else(|| unknown(shader))?;
        let data = self.vertex_arrays.get(&vertex_array).ok_or_else(|| unknown(vertex_array))?;
        self.stats.draws += 1;

        let uniforms = Uniforms::new(&self.uniforms);
        let sampler = Sampler { textures: &self.textures, bindings: &self.bindings };
        let stage = VertexStage::new(program, &uniforms);
        let transformed: Vec<_> = data
            .vertices
            .iter()
            .enumerate()
            .map(|(i, vertex)| stage.run(vertex, data.skin.as_ref().and_then(|skin| skin.get(i))))
            .collect();

        let state = self.state;
        let bounds = PixelBounds::new(targets.width, targets.height, state.scissor);
        if bounds.is_empty() {
            return Ok(());
        }
        let (width, height) = (targets.width, targets.height);
        let mut fragments = 0_u64;

        for triangle in data.indices.chunks_exact(3) {
            let corners = [
                transformed[triangle[0] as usize],
                transformed[triangle[1] as usize],
                transformed[triangle[2] as usize],
            ];
            let polygon = raster::clip_near(corners);
            for i in 1..polygon.len().saturating_sub(1) {
                let screen = [
                    ScreenVertex::from_clip(&polygon[0], width, height),
                    ScreenVertex::from_clip(&polygon[i], width, height),
                    ScreenVertex::from_clip(&polygon[i + 1], width, height),
                ];
                raster::rasterize(screen, state.cull, bounds, |fragment| {
                    let depth = fragment.depth.clamp(0.0, 1.0);
                    if let Some(depth_target) = targets.depth {
                        let stored = targets.texel(depth_target, fragment.x, fragment.y).x;
                        if !state.depth.func.passes(depth, stored) {
                            return;
                        }
                    }
                    let input = FragmentInput {
                        x: fragment.x,
                        y: fragment.y,
                        depth,
                        varyings: fragment.varyings,
                        target_size: (width, height),
                    };
                    let Some(output) = programs::shade(program, &input, &uniforms, &sampler) else {
                        return;
                    };
                    fragments += 1;
                    if state.depth.write {
                        if let Some(depth_target) = targets.depth {
                            targets.store(depth_target, fragment.x, fragment.y, Vec4::new(depth, 0.0, 0.0, 0.0));
                        }
                    }
                    if !state.color_write {
                        return;
                    }
                    for (i, color) in output.colors.iter().take(output.count).enumerate() {
                        let Some(target) = targets.colors.get(i).copied() else { break };
                        let dst = targets.texel(target, fragment.x, fragment.y);
                        targets.store(target, fragment.x, fragment.y, blend(state.blend, *color, dst));
                    }
                });
            }
        }
        self.stats.fragments += fragments;
        Ok(())
    }
}

impl GraphicsDevice for SoftwareDevice {
    fn create_texture_2d(&mut self, id: TextureId, desc: &TextureDesc) -> RenderResult<()> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RenderError::ResourceCreationFailed(format!(
                "{id:?} has zero size {}x{}",
                desc.width, desc.height
            )));
        }
        let mut texture = Texture::new(desc.width, desc.height, 1, desc.format);
        texture.filter = desc.filter;
        texture.wrap = desc.wrap;
        self.textures.insert(id, texture);
        Ok(())
    }

    fn create_texture_cube(&mut self, id: TextureId, size: u32, format: TextureFormat) -> RenderResult<()> {
        if size == 0 {
            return Err(RenderError::ResourceCreationFailed(format!("{id:?} has zero size")));
        }
        self.textures.insert(id, Texture::new(size, size, 6, format));
        Ok(())
    }

    fn create_framebuffer(&mut self, id: FramebufferId, desc: &FramebufferDesc) -> RenderResult<()> {
        let mut size = None;
        for target in &desc.colors {
            let (width, height, _, format) = self.attachment_extent(*target)?;
            if format.is_depth() {
                return Err(RenderError::InvalidFramebuffer(format!("{id:?}: depth texture used as color")));
            }
            size.get_or_insert((width, height));
        }
        if let Some(target) = desc.depth {
            let (width, height, _, format) = self.attachment_extent(target)?;
            if !format.is_depth() {
                return Err(RenderError::InvalidFramebuffer(format!("{id:?}: color texture used as depth")));
            }
            if size.is_some_and(|s| s != (width, height)) {
                return Err(RenderError::InvalidFramebuffer(format!("{id:?}: depth size mismatch")));
            }
        }
        self.framebuffers.insert(
            id,
            Framebuffer {
                colors: desc.colors.clone(),
                depth: desc.depth,
                draw_buffers: (0..desc.colors.len()).collect(),
            },
        );
        Ok(())
    }

    fn create_shader(&mut self, id: ShaderId, desc: &ShaderDesc) -> RenderResult<()> {
        let program = programs::compile(desc).map_err(|reason| RenderError::ShaderCompilationFailed {
            name: desc.name.clone(),
            reason,
        })?;
        self.shaders.insert(id, program);
        Ok(())
    }

    fn create_vertex_array(&mut self, id: VertexArrayId) -> RenderResult<()> {
        self.vertex_arrays.insert(id, VertexData::default());
        Ok(())
    }

    fn delete_texture(&mut self, id: TextureId) -> RenderResult<()> {
        self.textures.remove(&id).ok_or_else(|| unknown(id))?;
        self.bindings.retain(|_, bound| *bound != id);
        Ok(())
    }

    fn delete_framebuffer(&mut self, id: FramebufferId) -> RenderResult<()> {
        self.framebuffers.remove(&id).ok_or_else(|| unknown(id))?;
        if self.state.framebuffer == Some(id) {
            self.state.framebuffer = None;
        }
        Ok(())
    }

    fn delete_shader(&mut self, id: ShaderId) -> RenderResult<()> {
        self.shaders.remove(&id).ok_or_else(|| unknown(id))?;
        if self.state.shader == Some(id) {
            self.state.shader = None;
        }
        Ok(())
    }

    fn delete_vertex_array(&mut self, id: VertexArrayId) -> RenderResult<()> {
        self.vertex_arrays.remove(&id).map(|_| ()).ok_or_else(|| unknown(id))
    }

    fn push_texture_data(&mut self, id: TextureId, texels: &[[f32; 4]]) -> RenderResult<()> {
        let texture = self.texture_mut(id)?;
        if texels.len() != texture.texels.len() {
            return Err(RenderError::ResourceCreationFailed(format!(
                "{id:?} expects {} texels, got {}",
                texture.texels.len(),
                texels.len()
            )));
        }
        for (index, texel) in texels.iter().enumerate() {
            texture.store(index, Vec4::from(*texel));
        }
        Ok(())
    }

    fn push_vertex_data(&mut self, id: VertexArrayId, data: VertexData) -> RenderResult<()> {
        let vertex_count = data.vertices.len();
        if data.indices.iter().any(|index| *index as usize >= vertex_count) {
            return Err(RenderError::ResourceCreationFailed(format!("{id:?}: index out of range")));
        }
        if data.skin.as_ref().is_some_and(|skin| skin.len() != vertex_count) {
            return Err(RenderError::ResourceCreationFailed(format!("{id:?}: skin weight count mismatch")));
        }
        let slot = self.vertex_arrays.get_mut(&id).ok_or_else(|| unknown(id))?;
        *slot = data;
        Ok(())
    }

    fn set_texture_2d_filter(&mut self, id: TextureId, filter: TextureFilter) -> RenderResult<()> {
        self.texture_mut(id)?.filter = filter;
        Ok(())
    }

    fn set_texture_2d_wrap_mode(&mut self, id: TextureId, wrap: WrapMode) -> RenderResult<()> {
        self.texture_mut(id)?.wrap = wrap;
        Ok(())
    }

    fn set_draw_buffers(&mut self, framebuffer: FramebufferId, buffers: &[usize]) -> RenderResult<()> {
        let target = self.framebuffers.get_mut(&framebuffer).ok_or_else(|| unknown(framebuffer))?;
        if let Some(bad) = buffers.iter().find(|index| **index >= target.colors.len()) {
            return Err(RenderError::InvalidFramebuffer(format!(
                "{framebuffer:?} has no color attachment {bad}"
            )));
        }
        target.draw_buffers = buffers.to_vec();
        Ok(())
    }

    fn bind_framebuffer(&mut self, id: FramebufferId) -> RenderResult<()> {
        if !self.framebuffers.contains_key(&id) {
            self.state.framebuffer = None;
            return Err(unknown(id));
        }
        self.state.framebuffer = Some(id);
        Ok(())
    }

    fn clear(&mut self, values: &ClearValues) -> RenderResult<()> {
        let mut targets = self.take_targets()?;
        let bounds = PixelBounds::new(targets.width, targets.height, self.state.scissor);
        for y in bounds.y0..bounds.y1 {
            for x in bounds.x0..bounds.x1 {
                if let Some(color) = values.color {
                    for i in 0..targets.colors.len() {
                        let target = targets.colors[i];
                        targets.store(target, x, y, Vec4::from(color));
                    }
                }
                if let (Some(depth), Some(target)) = (values.depth, targets.depth) {
                    targets.store(target, x, y, Vec4::new(depth, 0.0, 0.0, 0.0));
                }
            }
        }
        self.restore_targets(targets);
        Ok(())
    }

    fn set_depth_state(&mut self, state: DepthState) {
        self.state.depth = state;
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        self.state.blend = mode;
    }

    fn set_color_write(&mut self, enabled: bool) {
        self.state.color_write = enabled;
    }

    fn set_cull_mode(&mut self, mode: CullMode) {
        self.state.cull = mode;
    }

    fn set_scissor(&mut self, rect: Option<ScissorRect>) {
        self.state.scissor = rect;
    }

    fn use_shader(&mut self, id: ShaderId) -> RenderResult<()> {
        self.state.shader = None;
        if !self.shaders.contains_key(&id) {
            return Err(unknown(id));
        }
        self.state.shader = Some(id);
        Ok(())
    }

    fn set_uniform(&mut self, name: &'static str, value: Uniform) {
        self.uniforms.insert(name, value);
    }

    fn bind_texture(&mut self, unit: u32, id: TextureId) -> RenderResult<()> {
        if !self.textures.contains_key(&id) {
            self.bindings.remove(&unit);
            return Err(unknown(id));
        }
        self.bindings.insert(unit, id);
        Ok(())
    }

    fn draw(&mut self, vertex_array: VertexArrayId) -> RenderResult<()> {
        let mut targets = self.take_targets()?;
        let result = self.rasterize_into(vertex_array, &mut targets);
        self.restore_targets(targets);
        result
    }

    fn texture_size(&self, id: TextureId) -> Option<(u32, u32)> {
        self.textures.get(&id).map(|texture| (texture.width, texture.height))
    }

    fn read_texture(&self, id: TextureId) -> RenderResult<Vec<[f32; 4]>> {
        let texture = self
            .textures
            .get(&id)
            .ok_or_else(|| RenderError::ReadbackFailed(format!("{id:?} does not exist")))?;
        Ok(texture.texels.iter().map(|texel| [texel.x, texel.y, texel.z, texel.w]).collect())
    }

    fn stats(&self) -> DeviceStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::mesh::MeshData;
    use crate::foundation::math::Mat4;
    use crate::render::device::{uniforms, units, DepthFunc, ShaderProgram};

    const TARGET: TextureId = TextureId(1);
    const DEPTH: TextureId = TextureId(2);
    const FB: FramebufferId = FramebufferId(3);
    const QUAD: VertexArrayId = VertexArrayId(4);

    fn device_with_target(size: u32) -> SoftwareDevice {
        let mut device = SoftwareDevice::new();
        device.create_texture_2d(TARGET, &TextureDesc::new(size, size, TextureFormat::Rgba16F)).unwrap();
        device.create_texture_2d(DEPTH, &TextureDesc::new(size, size, TextureFormat::Depth24Stencil8)).unwrap();
        device.create_framebuffer(FB, &FramebufferDesc::color(&[TARGET]).with_depth(DEPTH)).unwrap();
        device.bind_framebuffer(FB).unwrap();
        device.create_vertex_array(QUAD).unwrap();
        let quad = MeshData::fullscreen_quad();
        device
            .push_vertex_data(QUAD, VertexData { vertices: quad.vertices, indices: quad.indices, skin: None })
            .unwrap();
        device
    }

    fn use_program(device: &mut SoftwareDevice, id: u64, program: ShaderProgram) {
        device.create_shader(ShaderId(id), &ShaderDesc::new("test", program)).unwrap();
        device.use_shader(ShaderId(id)).unwrap();
    }

    #[test]
    fn test_fullscreen_unlit_fills_target() {
        let mut device = device_with_target(4);
        use_program(&mut device, 10, ShaderProgram::UnlitMaterial);
        device.set_depth_state(DepthState::DISABLED);
        device.set_uniform(uniforms::BASE_COLOR, Uniform::Vec4(Vec4::new(0.25, 0.5, 1.0, 1.0)));
        device.draw(QUAD).unwrap();

        let texels = device.read_texture(TARGET).unwrap();
        assert!(texels.iter().all(|t| *t == [0.25, 0.5, 1.0, 1.0]));
        assert_eq!(device.stats().fragments, 16);
    }

    #[test]
    fn test_depth_equal_redraw_passes() {
        let mut device = device_with_target(4);
        device.clear(&ClearValues::all([0.0; 4], 1.0)).unwrap();
        use_program(&mut device, 10, ShaderProgram::DepthOnly);
        device.draw(QUAD).unwrap();

        use_program(&mut device, 11, ShaderProgram::UnlitMaterial);
        device.set_uniform(uniforms::BASE_COLOR, Uniform::Vec4(Vec4::new(1.0, 0.0, 0.0, 1.0)));
        device.set_depth_state(DepthState::new(DepthFunc::Equal, false));
        device.draw(QUAD).unwrap();
        assert!(device.read_texture(TARGET).unwrap().iter().all(|t| t[0] == 1.0));
    }

    #[test]
    fn test_additive_blend_and_scissor_clear() {
        let mut device = device_with_target(4);
        device.set_depth_state(DepthState::DISABLED);
        device.set_blend_mode(BlendMode::Additive);
        use_program(&mut device, 10, ShaderProgram::UnlitMaterial);
        device.set_uniform(uniforms::BASE_COLOR, Uniform::Vec4(Vec4::new(0.5, 0.0, 0.0, 1.0)));
        device.draw(QUAD).unwrap();
        device.draw(QUAD).unwrap();
        assert_eq!(device.read_texture(TARGET).unwrap()[0][0], 1.0);

        device.set_scissor(Some(ScissorRect { x: 0, y: 0, width: 1, height: 1 }));
        device.clear(&ClearValues::color([0.0; 4])).unwrap();
        let texels = device.read_texture(TARGET).unwrap();
        assert_eq!(texels[0][0], 0.0);
        assert_eq!(texels[1][0], 1.0);
    }

    #[test]
    fn test_draw_without_shader_is_skipped() {
        let mut device = device_with_target(2);
        let bad = ShaderDesc::new("custom", ShaderProgram::External("water.glsl".into()));
        assert!(matches!(
            device.create_shader(ShaderId(10), &bad),
            Err(RenderError::ShaderCompilationFailed { .. })
        ));
        assert!(device.use_shader(ShaderId(10)).is_err());
        device.draw(QUAD).unwrap();
        assert_eq!(device.stats().skipped_draws, 1);
        assert_eq!(device.stats().draws, 0);
    }

    #[test]
    fn test_copy_reads_bound_source() {
        let mut device = device_with_target(2);
        let source = TextureId(20);
        device.create_texture_2d(source, &TextureDesc::new(2, 2, TextureFormat::Rgba8)).unwrap();
        device
            .push_texture_data(source, &[[1.0, 0.0, 0.0, 1.0], [0.0, 1.0, 0.0, 1.0], [0.0, 0.0, 1.0, 1.0], [1.0; 4]])
            .unwrap();
        device.bind_texture(units::SOURCE, source).unwrap();
        device.set_depth_state(DepthState::DISABLED);
        use_program(&mut device, 10, ShaderProgram::Copy);
        device.set_uniform(uniforms::MODEL, Uniform::Mat4(Mat4::identity()));
        device.draw(QUAD).unwrap();

        let copied = device.read_texture(TARGET).unwrap();
        assert!((copied[1][1] - 1.0).abs() < 1e-4);
        assert!((copied[2][2] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_framebuffer_validation() {
        let mut device = SoftwareDevice::new();
        device.create_texture_2d(TextureId(1), &TextureDesc::new(4, 4, TextureFormat::Rgba8)).unwrap();
        device.create_texture_2d(TextureId(2), &TextureDesc::new(2, 2, TextureFormat::Depth24Stencil8)).unwrap();
        let mismatched = FramebufferDesc::color(&[TextureId(1)]).with_depth(TextureId(2));
        assert!(device.create_framebuffer(FramebufferId(3), &mismatched).is_err());
        let swapped = FramebufferDesc::color(&[TextureId(2)]);
        assert!(device.create_framebuffer(FramebufferId(3), &swapped).is_err());
        assert!(device.clear(&ClearValues::color([0.0; 4])).is_err());
    }
}
