//! Per-frame recording state and draw helpers shared by every pass

use std::collections::HashMap;
use std::sync::Arc;

use crate::assets::material::{MaterialBlend, MaterialDefinition, MaterialDefinitionId, MaterialLibrary};
use crate::config::{RendererConfig, SkinningMode};
use crate::foundation::math::{Mat4, Vec3, Vec4};
use crate::render::commands::RenderCommand;
use crate::render::context::RenderContext;
use crate::render::device::{
    uniforms, units, BlendMode, ClearValues, CullMode, DepthState, FramebufferId, ShaderProgram, TextureId,
    Uniform, VertexArrayId,
};
use crate::render::shader_cache::{ShaderCache, ShaderPass};
use crate::render::visibility::VisibleObjects;
use crate::scene::components::camera::CameraView;
use crate::scene::{ModelId, Scene};

use super::{FrameStats, ScreenShaders};

/// One mesh of one model, resolved for this frame
#[derive(Debug, Clone)]
pub(super) struct DrawItem {
    pub vertex_array: VertexArrayId,
    pub world: Mat4,
    pub material: MaterialDefinitionId,
    pub definition: Arc<MaterialDefinition>,
    pub palette: Option<Vec<Mat4>>,
    /// Distance of the model's bounds center along the camera axis
    pub depth: f32,
}

impl DrawItem {
    fn gpu_skinned(&self) -> bool {
        self.palette.is_some()
    }
}

pub(super) struct Frame<'a> {
    pub ctx: &'a mut RenderContext,
    pub scene: &'a mut Scene,
    materials: &'a MaterialLibrary,
    shaders: &'a ShaderCache,
    pub config: &'a RendererConfig,
    screen: &'a mut ScreenShaders,
    quad: VertexArrayId,
    pub camera: CameraView,
    items: HashMap<ModelId, Vec<DrawItem>>,
    pub opaque: Vec<DrawItem>,
    pub blended: Vec<DrawItem>,
    pub refractive: Vec<DrawItem>,
    pub stats: FrameStats,
}

impl<'a> Frame<'a> {
    pub fn new(
        ctx: &'a mut RenderContext,
        scene: &'a mut Scene,
        materials: &'a MaterialLibrary,
        shaders: &'a ShaderCache,
        config: &'a RendererConfig,
        screen: &'a mut ScreenShaders,
        quad: VertexArrayId,
        camera: CameraView,
    ) -> Self {
        Self {
            ctx,
            scene,
            materials,
            shaders,
            config,
            screen,
            quad,
            camera,
            items: HashMap::new(),
            opaque: Vec::new(),
            blended: Vec::new(),
            refractive: Vec::new(),
            stats: FrameStats { rendered: true, ..FrameStats::default() },
        }
    }

    /// Resolve the visible models' meshes and split them by blend mode
    pub fn prepare(&mut self, visible: &VisibleObjects) {
        self.stats.models = visible.models.len();
        for &id in &visible.models {
            for item in self.draw_items(id).to_vec() {
                match item.definition.blend {
                    MaterialBlend::Opaque => self.opaque.push(item),
                    MaterialBlend::Blended => self.blended.push(item),
                    MaterialBlend::Refractive => self.refractive.push(item),
                }
            }
        }
        self.blended.sort_by(|a, b| b.depth.total_cmp(&a.depth));
    }

    /// Draw items of a model, resolved once per frame
    pub fn draw_items(&mut self, id: ModelId) -> &[DrawItem] {
        if !self.items.contains_key(&id) {
            let items = self.resolve(id);
            self.items.insert(id, items);
        }
        self.items.get(&id).map_or(&[], Vec::as_slice)
    }

    fn resolve(&mut self, id: ModelId) -> Vec<DrawItem> {
        let Some(attached) = self.scene.model(id) else {
            return Vec::new();
        };
        let world = self.scene.graph().world_matrix(attached.node).unwrap_or_else(Mat4::identity);
        let depth = attached
            .component
            .world_bounds(&world)
            .map_or(0.0, |bounds| (bounds.center() - self.camera.position).dot(&self.camera.forward));
        let definition = Arc::clone(attached.component.definition());

        let mut items = Vec::with_capacity(definition.meshes().len());
        for (index, mesh) in definition.meshes().iter().enumerate() {
            let Some(material) = self.materials.get(mesh.material) else {
                log::debug!("Skipping mesh '{}': material {:?} not loaded", mesh.name, mesh.material);
                self.stats.skipped_meshes += 1;
                continue;
            };
            let (vertex_array, palette) = match (mesh.is_skinned(), self.config.skinning) {
                (true, SkinningMode::Cpu) => {
                    let Some(skinned) = self.scene.model_mut(id).and_then(|model| model.skin_into_back(self.ctx, index))
                    else {
                        continue;
                    };
                    (skinned, None)
                }
                (true, SkinningMode::Gpu) => {
                    let palette = self.scene.model(id).map(|a| a.component.palette().to_vec());
                    (mesh.vertex_array(self.ctx), palette)
                }
                (false, _) => (mesh.vertex_array(self.ctx), None),
            };
            items.push(DrawItem {
                vertex_array,
                world,
                material: mesh.material,
                definition: Arc::clone(material),
                palette,
                depth,
            });
        }
        items
    }

    // ---------------------------------------------------------------------
    // Recording helpers

    pub fn push(&mut self, command: RenderCommand) {
        self.ctx.append_to_back_buffer(command);
    }

    pub fn uniform(&mut self, name: &'static str, value: Uniform) {
        self.push(RenderCommand::SetUniform { name, value });
    }

    pub fn bind_texture(&mut self, unit: u32, texture: TextureId) {
        self.push(RenderCommand::BindTexture { unit, texture });
    }

    /// Bind a target with a full pipeline state reset
    pub fn begin(&mut self, framebuffer: FramebufferId, depth: DepthState, blend: BlendMode, cull: CullMode) {
        self.push(RenderCommand::BindFramebuffer(framebuffer));
        self.push(RenderCommand::SetScissor(None));
        self.push(RenderCommand::SetColorWrite(true));
        self.push(RenderCommand::SetDepthState(depth));
        self.push(RenderCommand::SetBlendMode(blend));
        self.push(RenderCommand::SetCullMode(cull));
    }

    pub fn clear(&mut self, values: ClearValues) {
        self.push(RenderCommand::Clear(values));
    }

    /// Camera matrices for mesh passes
    pub fn set_camera_uniforms(&mut self) {
        self.uniform(uniforms::VIEW_PROJECTION, Uniform::Mat4(self.camera.view_projection()));
        self.uniform(uniforms::CAMERA_POSITION, Uniform::Vec3(self.camera.position));
    }

    /// Draw one item with the variant of `pass`
    pub fn draw(&mut self, item: &DrawItem, pass: ShaderPass) {
        let variant = self
            .shaders
            .get_or_create(self.ctx, item.material, &item.definition, pass, item.gpu_skinned());
        self.push(RenderCommand::UseShader(variant.shader));
        self.uniform(uniforms::MODEL, Uniform::Mat4(item.world));
        if let Some(palette) = &item.palette {
            self.uniform(uniforms::BONE_PALETTE, Uniform::Mat4Array(palette.clone()));
        }
        let material = &item.definition;
        let [r, g, b, a] = material.base_color;
        self.uniform(uniforms::BASE_COLOR, Uniform::Vec4(Vec4::new(r, g, b, a)));
        self.uniform(uniforms::SPECULAR_COLOR, Uniform::Vec3(material.specular_color));
        self.uniform(uniforms::SHININESS, Uniform::Float(material.shininess));
        self.uniform(uniforms::EMISSIVE, Uniform::Vec3(material.emissive));
        self.uniform(uniforms::REFRACTION, Uniform::Float(material.refraction_strength));
        self.push(RenderCommand::Draw(item.vertex_array));
        self.stats.draws += 1;
    }

    /// Draw a list of items with one pass
    pub fn draw_all(&mut self, items: &[DrawItem], pass: ShaderPass) {
        for item in items {
            self.draw(item, pass);
        }
    }

    /// Draw every opaque item with one pass
    pub fn draw_opaque(&mut self, pass: ShaderPass) {
        let items = std::mem::take(&mut self.opaque);
        self.draw_all(&items, pass);
        self.opaque = items;
    }

    /// Fullscreen quad with a built-in screen program reading `source`
    pub fn screen_pass(&mut self, target: FramebufferId, program: ShaderProgram, source: TextureId) {
        let shader = self.screen.get(self.ctx, program);
        self.begin(target, DepthState::DISABLED, BlendMode::Replace, CullMode::None);
        self.push(RenderCommand::UseShader(shader));
        self.bind_texture(units::SOURCE, source);
        self.push(RenderCommand::Draw(self.quad));
        self.stats.draws += 1;
    }

    /// Summed ambient radiance and the first directional light, for forward shading
    pub fn forward_lighting(&self, visible: &VisibleObjects) -> (Vec3, Option<(Vec3, Vec3)>) {
        let ambient = visible
            .ambient_lights
            .iter()
            .filter_map(|&id| self.scene.light(id))
            .fold(Vec3::zeros(), |sum, attached| sum + attached.component.color * attached.component.intensity);
        let sun = visible.directional_lights.first().and_then(|&id| {
            let attached = self.scene.light(id)?;
            let direction = self.scene.graph().world_transform(attached.node)?.forward();
            Some((attached.component.color * attached.component.intensity, direction))
        });
        (ambient, sun)
    }

    pub fn finish(self) -> FrameStats {
        self.stats
    }
}
