//! Cross-module rendering scenarios on the software device

mod contracts;
mod skinning;

use crate::assets::material::{MaterialDefinition, MaterialDefinitionId, MaterialLibrary};
use crate::assets::mesh::MeshData;
use crate::assets::model::ModelDefinition;
use crate::config::{RendererConfig, ShadowConfig};
use crate::foundation::math::Vec3;
use crate::render::backends::software::SoftwareDevice;
use crate::render::{DeferredRenderer, FrameStats, RenderContext, ViewportId};
use crate::scene::components::{CameraComponent, LightComponent, Model};
use crate::scene::{ModelId, NodeId, Scene};

pub(crate) const SIZE: u32 = 64;

/// Renderer settings small enough for the software rasterizer
pub(crate) fn test_config(hdr_enabled: bool) -> RendererConfig {
    RendererConfig {
        hdr_enabled,
        shadows: ShadowConfig {
            map_size: 32,
            cube_map_size: 16,
            ..ShadowConfig::default()
        },
        ..RendererConfig::default()
    }
}

/// Scene, renderer and one 64x64 viewport looking down -Z from (0, 0, 5)
pub(crate) struct Harness {
    pub ctx: RenderContext,
    pub renderer: DeferredRenderer,
    pub scene: Scene,
    pub materials: MaterialLibrary,
    pub viewport: ViewportId,
    pub camera: NodeId,
}

impl Harness {
    pub fn new(config: RendererConfig) -> Self {
        let mut ctx = RenderContext::new(Box::new(SoftwareDevice::new()));
        let mut renderer = DeferredRenderer::new(&mut ctx, config);
        let mut materials = MaterialLibrary::new();
        renderer.listen_to(&mut materials);
        let viewport = renderer.register_viewport(&mut ctx, SIZE, SIZE);

        let mut scene = Scene::new();
        let camera = scene.create_node("camera");
        scene.graph_mut().set_position(camera, Vec3::new(0.0, 0.0, 5.0));
        scene.attach_camera(camera, CameraComponent::default());
        renderer.set_viewport_camera(viewport, Some(camera));

        Self { ctx, renderer, scene, materials, viewport, camera }
    }

    pub fn material(&mut self, definition: MaterialDefinition) -> MaterialDefinitionId {
        self.materials.add(definition)
    }

    pub fn add_cube(&mut self, position: Vec3, material: MaterialDefinitionId) -> ModelId {
        let definition = ModelDefinition::single_mesh("cube", MeshData::cube(0.5), material);
        self.add_model(position, Model::new(definition))
    }

    pub fn add_model(&mut self, position: Vec3, model: Model) -> ModelId {
        let node = self.scene.create_node("model");
        self.scene.graph_mut().set_position(node, position);
        self.scene.attach_model(node, model).unwrap()
    }

    /// Directional light shining down -Z plus a dim ambient term
    pub fn add_default_lights(&mut self) {
        let sun = self.scene.create_node("sun");
        self.scene.attach_light(sun, LightComponent::directional(Vec3::repeat(1.0), 1.0));
        let sky = self.scene.create_node("sky");
        self.scene.attach_light(sky, LightComponent::ambient(Vec3::repeat(0.1), 1.0));
    }

    /// Record a frame and execute it
    pub fn render(&mut self) -> FrameStats {
        self.scene.sync_proxies();
        let stats = self
            .renderer
            .render_viewport(&mut self.ctx, &mut self.scene, &self.materials, self.viewport);
        let report = self.ctx.submit().unwrap();
        log::debug!("Executed {:?}", report);
        stats
    }

    /// Output texel, rows counted from the bottom
    pub fn pixel(&self, x: u32, y: u32) -> [f32; 4] {
        let output = self.renderer.output_texture(self.viewport).unwrap();
        let texels = self.ctx.device().read_texture(output).unwrap();
        texels[(y * SIZE + x) as usize]
    }

    pub fn is_lit(&self, x: u32, y: u32) -> bool {
        let [r, g, b, _] = self.pixel(x, y);
        r + g + b > 0.0
    }
}
