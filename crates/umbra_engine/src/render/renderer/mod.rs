//! Deferred scene renderer
//!
//! Per viewport and per frame, strictly in this order:
//!
//! 1. depth pre-pass over opaque meshes
//! 2. light accumulation into diffuse/specular buffers, one sub-pass per
//!    visible light, each optionally preceded by its shadow map
//! 3. opaque material resolve into the composite buffer
//! 4. alpha blended meshes, back to front
//! 5. refractive meshes over a snapshot of the composite
//! 6. bloom extraction and blur (HDR only)
//! 7. tone mapping (or a plain copy without HDR) into the LDR output
//!
//! Everything is recorded into the context's back command queue; nothing
//! touches the device until the queues are swapped and executed.

mod frame;
mod geometry;
mod lighting;
mod post;
mod shadows;

use std::collections::HashMap;
use std::sync::Arc;

use slotmap::SlotMap;

use crate::assets::material::{MaterialLibrary, MaterialLibraryListener};
use crate::assets::mesh::MeshData;
use crate::config::RendererConfig;
use crate::scene::{NodeId, Scene};

use super::context::RenderContext;
use super::device::{GpuResource, ShaderDesc, ShaderId, ShaderProgram, TextureId, VertexArrayId, VertexData};
use super::framebuffers::FramebufferSet;
use super::shader_cache::ShaderCache;
use super::viewport::{Viewport, ViewportId};
use super::visibility::{VisibilityProcessor, VisibleObjects};

use frame::Frame;

pub use lighting::light_scissor;
pub use shadows::{cube_face_view_projection, directional_view_projection, spot_view_projection};

/// What one call to [`DeferredRenderer::render_viewport`] recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    /// Draw commands recorded
    pub draws: usize,
    /// Meshes skipped because their material is missing
    pub skipped_meshes: usize,
    /// Visible models
    pub models: usize,
    /// Light sub-passes rendered
    pub lights: usize,
    /// Shadow views rendered (one per 2D map, six per cube map)
    pub shadow_passes: usize,
    /// False when the viewport had no usable camera
    pub rendered: bool,
}

/// Built-in screen-space shaders, created on first use
#[derive(Debug, Default)]
pub(crate) struct ScreenShaders {
    shaders: HashMap<ShaderProgram, ShaderId>,
}

impl ScreenShaders {
    pub(crate) fn get(&mut self, ctx: &mut RenderContext, program: ShaderProgram) -> ShaderId {
        *self.shaders.entry(program).or_insert_with_key(|program| {
            let name = format!("screen:{program:?}");
            ctx.create_shader(ShaderDesc::new(name, program.clone()))
        })
    }

    fn release(&mut self, ctx: &RenderContext) {
        for (_, shader) in self.shaders.drain() {
            ctx.mark_for_collection(GpuResource::Shader(shader));
        }
    }
}

/// Deferred renderer shared by any number of viewports
#[derive(Debug)]
pub struct DeferredRenderer {
    config: RendererConfig,
    shaders: Arc<ShaderCache>,
    visibility: VisibilityProcessor,
    viewports: SlotMap<ViewportId, Viewport>,
    screen: ScreenShaders,
    quad: VertexArrayId,
}

impl DeferredRenderer {
    /// Create a renderer, recording its shared resources into `ctx`
    pub fn new(ctx: &mut RenderContext, config: RendererConfig) -> Self {
        if let Err(e) = config.validate() {
            log::warn!("Renderer configuration is out of range: {}", e);
        }
        let quad = MeshData::fullscreen_quad();
        let quad = ctx.create_vertex_array(Some(VertexData {
            vertices: quad.vertices,
            indices: quad.indices,
            skin: None,
        }));
        log::info!(
            "Deferred renderer created (hdr: {}, bloom: {}, shadows: {})",
            config.hdr_enabled,
            config.bloom.enabled,
            config.shadows.enabled
        );
        Self {
            shaders: Arc::new(ShaderCache::new(Arc::clone(ctx.garbage()))),
            visibility: VisibilityProcessor::new(config.visibility.clone()),
            viewports: SlotMap::with_key(),
            screen: ScreenShaders::default(),
            quad,
            config,
        }
    }

    /// Settings
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Shader variant cache
    pub fn shader_cache(&self) -> &Arc<ShaderCache> {
        &self.shaders
    }

    /// Subscribe the shader cache to material reload and delete events
    pub fn listen_to(&self, library: &mut MaterialLibrary) {
        let listener: Arc<dyn MaterialLibraryListener> = self.shaders.clone();
        library.add_listener(&listener);
    }

    // ---------------------------------------------------------------------
    // Viewports

    /// Register a viewport of the given size
    pub fn register_viewport(&mut self, ctx: &mut RenderContext, width: u32, height: u32) -> ViewportId {
        let framebuffers = FramebufferSet::new(ctx, width, height, &self.config);
        let id = self
            .viewports
            .insert(Viewport::new(framebuffers, self.config.visibility.deduplicate));
        log::debug!("Registered viewport {:?} ({}x{})", id, width, height);
        id
    }

    /// Remove a viewport and release its targets
    pub fn deregister_viewport(&mut self, ctx: &RenderContext, id: ViewportId) -> bool {
        match self.viewports.remove(id) {
            Some(viewport) => {
                viewport.framebuffers.destroy(ctx);
                true
            }
            None => false,
        }
    }

    /// Resize a viewport's targets
    pub fn resize_viewport(&mut self, ctx: &mut RenderContext, id: ViewportId, width: u32, height: u32) -> bool {
        self.viewports
            .get_mut(id)
            .is_some_and(|viewport| viewport.framebuffers.resize(ctx, width, height))
    }

    /// Point a viewport at a camera node (or none)
    pub fn set_viewport_camera(&mut self, id: ViewportId, camera: Option<NodeId>) -> bool {
        match self.viewports.get_mut(id) {
            Some(viewport) => {
                viewport.camera = camera;
                true
            }
            None => false,
        }
    }

    /// Registered viewport
    pub fn viewport(&self, id: ViewportId) -> Option<&Viewport> {
        self.viewports.get(id)
    }

    /// Visibility lists of the viewport's last frame
    pub fn visible_objects(&self, id: ViewportId) -> Option<&VisibleObjects> {
        self.viewports.get(id).map(|viewport| &viewport.visible)
    }

    /// Final 8-bit color buffer of a viewport
    pub fn output_texture(&self, id: ViewportId) -> Option<TextureId> {
        self.viewports.get(id).map(|viewport| viewport.framebuffers.screen.ldr)
    }

    // ---------------------------------------------------------------------
    // Frame

    /// Record one frame of a viewport.
    ///
    /// A viewport without a camera node, or whose node carries no enabled
    /// camera, records nothing.
    pub fn render_viewport(
        &mut self,
        ctx: &mut RenderContext,
        scene: &mut Scene,
        materials: &MaterialLibrary,
        id: ViewportId,
    ) -> FrameStats {
        let Self { config, shaders, visibility, viewports, screen, quad } = self;
        let Some(viewport) = viewports.get_mut(id) else {
            log::warn!("render_viewport called with unknown viewport {:?}", id);
            return FrameStats::default();
        };
        let aspect = viewport.aspect();
        let Some(camera) = viewport.camera.and_then(|node| scene.camera_view(node, aspect)) else {
            log::debug!("Viewport {:?} has no usable camera, skipping", id);
            viewport.visible.clear();
            return FrameStats::default();
        };

        visibility.process(scene, &camera, &mut viewport.visible);

        let mut frame = Frame::new(ctx, scene, materials, shaders, config, screen, *quad, camera);
        frame.prepare(&viewport.visible);
        frame.depth_pre_pass(&viewport.framebuffers);
        frame.light_pass(&viewport.framebuffers, &viewport.visible);
        frame.material_pass(&viewport.framebuffers);
        frame.blended_pass(&viewport.framebuffers, &viewport.visible);
        frame.refractive_pass(&viewport.framebuffers);
        frame.bloom_pass(&viewport.framebuffers);
        frame.composite_pass(&viewport.framebuffers);
        let stats = frame.finish();
        log::trace!("Viewport {:?}: {:?}", id, stats);
        stats
    }

    /// Release every resource the renderer owns
    pub fn shutdown(mut self, ctx: &RenderContext) {
        for (_, viewport) in self.viewports.drain() {
            viewport.framebuffers.destroy(ctx);
        }
        self.screen.release(ctx);
        self.shaders.clear();
        ctx.mark_for_collection(GpuResource::VertexArray(self.quad));
        log::info!("Deferred renderer shut down");
    }
}
