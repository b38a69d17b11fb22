//! Render context
//!
//! Owns the device, the command queues, the garbage list and the id
//! allocator. Every renderer service is reached through a `&mut
//! RenderContext`; there is no process-wide renderer state, so several
//! contexts can coexist (one per test, for example).

use std::sync::Arc;

use super::commands::{ExecutionReport, RenderCommand, RenderQueues};
use super::device::{
    FramebufferDesc, FramebufferId, GpuResource, GraphicsDevice, ResourceIds, ShaderDesc, ShaderId,
    TextureDesc, TextureFormat, TextureId, VertexArrayId, VertexData,
};
use super::garbage::GarbageList;
use super::RenderResult;

/// Device plus the double-buffered command pipeline
pub struct RenderContext {
    device: Box<dyn GraphicsDevice>,
    queues: RenderQueues,
    garbage: Arc<GarbageList>,
    ids: Arc<ResourceIds>,
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("back", &self.queues.back().len())
            .field("front", &self.queues.front().len())
            .field("garbage", &self.garbage.pending())
            .finish_non_exhaustive()
    }
}

impl RenderContext {
    /// Start up a context around a device
    pub fn new(device: Box<dyn GraphicsDevice>) -> Self {
        log::info!("Render context started");
        Self {
            device,
            queues: RenderQueues::new(),
            garbage: Arc::new(GarbageList::new()),
            ids: Arc::new(ResourceIds::new()),
        }
    }

    /// Borrow the device (readback, inspection)
    pub fn device(&self) -> &dyn GraphicsDevice {
        self.device.as_ref()
    }

    /// Mutably borrow the device
    pub fn device_mut(&mut self) -> &mut dyn GraphicsDevice {
        self.device.as_mut()
    }

    /// Command queues
    pub fn queues(&self) -> &RenderQueues {
        &self.queues
    }

    /// Shared id allocator
    pub fn ids(&self) -> &Arc<ResourceIds> {
        &self.ids
    }

    /// Shared garbage list, for resources whose owners may drop on any thread
    pub fn garbage(&self) -> &Arc<GarbageList> {
        &self.garbage
    }

    /// Append to the back queue
    pub fn append_to_back_buffer(&mut self, command: RenderCommand) {
        self.queues.append_to_back_buffer(command);
    }

    /// Swap back and front queues (see [`RenderQueues::swap_rc_queues`])
    pub fn swap_rc_queues(&mut self) -> RenderResult<()> {
        self.queues.swap_rc_queues()?;
        self.garbage.advance_epoch();
        Ok(())
    }

    /// Drain the front queue against the device, then collect garbage
    pub fn execute_front_rc_queue(&mut self) -> ExecutionReport {
        let report = self.queues.execute_front_rc_queue(self.device.as_mut());
        self.garbage.collect_garbage(self.device.as_mut());
        report
    }

    /// Single-threaded convenience: swap then execute
    pub fn submit(&mut self) -> RenderResult<ExecutionReport> {
        self.swap_rc_queues()?;
        Ok(self.execute_front_rc_queue())
    }

    /// Request deletion of a resource
    pub fn mark_for_collection(&self, resource: GpuResource) {
        self.garbage.mark_for_collection(resource);
    }

    // ---------------------------------------------------------------------
    // Resource creation, recorded into the back queue

    /// Queue creation of a 2D texture
    pub fn create_texture_2d(&mut self, desc: TextureDesc) -> TextureId {
        let id = self.ids.texture();
        self.append_to_back_buffer(RenderCommand::CreateTexture2D { id, desc });
        id
    }

    /// Queue creation of a cube texture
    pub fn create_texture_cube(&mut self, size: u32, format: TextureFormat) -> TextureId {
        let id = self.ids.texture();
        self.append_to_back_buffer(RenderCommand::CreateTextureCube { id, size, format });
        id
    }

    /// Queue creation of a framebuffer
    pub fn create_framebuffer(&mut self, desc: FramebufferDesc) -> FramebufferId {
        let id = self.ids.framebuffer();
        self.append_to_back_buffer(RenderCommand::CreateFramebuffer { id, desc });
        id
    }

    /// Queue compilation of a shader
    pub fn create_shader(&mut self, desc: ShaderDesc) -> ShaderId {
        let id = self.ids.shader();
        self.append_to_back_buffer(RenderCommand::CreateShader { id, desc });
        id
    }

    /// Queue creation of a vertex array holding `data`
    pub fn create_vertex_array(&mut self, data: Option<VertexData>) -> VertexArrayId {
        let id = self.ids.vertex_array();
        self.append_to_back_buffer(RenderCommand::CreateVertexArray(id));
        if let Some(data) = data {
            self.append_to_back_buffer(RenderCommand::PushVertexData { id, data });
        }
        id
    }

    /// Queue immediate deletion of a resource
    pub fn delete(&mut self, resource: GpuResource) {
        self.append_to_back_buffer(RenderCommand::Delete(resource));
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        let dropped = self.queues.back().len() + self.queues.front().len();
        self.queues.clear();
        let collected = self.garbage.collect_all(self.device.as_mut());
        log::info!(
            "Render context shut down ({} queued commands dropped, {} resources collected)",
            dropped,
            collected
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::software::SoftwareDevice;

    #[test]
    fn test_created_resources_exist_after_submit() {
        let mut ctx = RenderContext::new(Box::new(SoftwareDevice::new()));
        let texture = ctx.create_texture_2d(TextureDesc::new(8, 4, TextureFormat::Rgba16F));
        assert!(ctx.device().texture_size(texture).is_none());

        let report = ctx.submit().unwrap();
        assert_eq!(report.failed, 0);
        assert_eq!(ctx.device().texture_size(texture), Some((8, 4)));
    }

    #[test]
    fn test_garbage_collected_after_execution() {
        let mut ctx = RenderContext::new(Box::new(SoftwareDevice::new()));
        let texture = ctx.create_texture_2d(TextureDesc::new(2, 2, TextureFormat::Rgba8));
        ctx.submit().unwrap();

        ctx.mark_for_collection(GpuResource::Texture(texture));
        ctx.submit().unwrap();
        assert!(ctx.device().texture_size(texture).is_none());
    }

    #[test]
    fn test_mark_before_creation_runs_waits_for_its_queue() {
        let mut ctx = RenderContext::new(Box::new(SoftwareDevice::new()));
        let texture = ctx.create_texture_2d(TextureDesc::new(4, 4, TextureFormat::Rgba8));
        ctx.mark_for_collection(GpuResource::Texture(texture));

        // Nothing swapped yet: the creation is still in the back queue
        ctx.execute_front_rc_queue();
        assert_eq!(ctx.garbage().pending(), 1);

        ctx.submit().unwrap();
        assert!(ctx.device().texture_size(texture).is_none());
        assert_eq!(ctx.garbage().pending(), 0);

        ctx.submit().unwrap();
        assert!(ctx.device().texture_size(texture).is_none());
    }

    #[test]
    fn test_independent_contexts() {
        let mut a = RenderContext::new(Box::new(SoftwareDevice::new()));
        let b = RenderContext::new(Box::new(SoftwareDevice::new()));
        a.create_texture_2d(TextureDesc::new(1, 1, TextureFormat::Rgba8));
        assert_eq!(a.queues().back().len(), 1);
        assert!(b.queues().back().is_empty());
    }
}
