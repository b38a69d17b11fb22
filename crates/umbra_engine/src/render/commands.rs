//! Render commands and the double-buffered command queue
//!
//! Commands own everything they need, so a queue can be filled on one
//! thread and drained on another after the owning frame has returned.
//!
//! Protocol: append to the back queue, swap, drain the front queue. A swap
//! is refused while the front queue still holds commands from the previous
//! swap.

use crate::foundation::collections::{DoubleBuffered, Recycle};

use super::device::{
    BlendMode, ClearValues, CullMode, DepthState, FramebufferDesc, FramebufferId, GpuResource,
    GraphicsDevice, ScissorRect, ShaderDesc, ShaderId, TextureDesc, TextureFilter, TextureFormat,
    TextureId, Uniform, VertexArrayId, VertexData, WrapMode,
};
use super::{RenderError, RenderResult};

/// Closure run against the device when the command executes
pub type CustomCommand = Box<dyn FnOnce(&mut dyn GraphicsDevice) -> RenderResult<()> + Send>;

/// A unit of deferred GPU work
pub enum RenderCommand {
    /// Create a 2D texture
    CreateTexture2D {
        /// Reserved id
        id: TextureId,
        /// Description
        desc: TextureDesc,
    },
    /// Create a cube texture
    CreateTextureCube {
        /// Reserved id
        id: TextureId,
        /// Face size
        size: u32,
        /// Format
        format: TextureFormat,
    },
    /// Create a framebuffer
    CreateFramebuffer {
        /// Reserved id
        id: FramebufferId,
        /// Attachments
        desc: FramebufferDesc,
    },
    /// Compile a shader
    CreateShader {
        /// Reserved id
        id: ShaderId,
        /// Description
        desc: ShaderDesc,
    },
    /// Create a vertex array
    CreateVertexArray(VertexArrayId),
    /// Upload texels
    PushTextureData {
        /// Target texture
        id: TextureId,
        /// Texels, bottom row first
        texels: Vec<[f32; 4]>,
    },
    /// Upload geometry
    PushVertexData {
        /// Target vertex array
        id: VertexArrayId,
        /// Geometry
        data: VertexData,
    },
    /// Change a texture's filter
    SetTextureFilter(TextureId, TextureFilter),
    /// Change a texture's wrap mode
    SetTextureWrap(TextureId, WrapMode),
    /// Select active color attachments
    SetDrawBuffers {
        /// Framebuffer
        framebuffer: FramebufferId,
        /// Attachment indices
        buffers: Vec<usize>,
    },
    /// Bind a render target
    BindFramebuffer(FramebufferId),
    /// Clear the bound target
    Clear(ClearValues),
    /// Depth state
    SetDepthState(DepthState),
    /// Blend state
    SetBlendMode(BlendMode),
    /// Color write mask
    SetColorWrite(bool),
    /// Face culling
    SetCullMode(CullMode),
    /// Scissor rectangle
    SetScissor(Option<ScissorRect>),
    /// Select a shader
    UseShader(ShaderId),
    /// Set a uniform
    SetUniform {
        /// Uniform name
        name: &'static str,
        /// Value
        value: Uniform,
    },
    /// Bind a texture unit
    BindTexture {
        /// Unit
        unit: u32,
        /// Texture
        texture: TextureId,
    },
    /// Draw a vertex array
    Draw(VertexArrayId),
    /// Delete a resource immediately
    Delete(GpuResource),
    /// Arbitrary device work
    Custom(CustomCommand),
}

impl std::fmt::Debug for RenderCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateTexture2D { id, desc } => write!(f, "CreateTexture2D({id:?}, {desc:?})"),
            Self::CreateTextureCube { id, size, format } => {
                write!(f, "CreateTextureCube({id:?}, {size}, {format:?})")
            }
            Self::CreateFramebuffer { id, desc } => write!(f, "CreateFramebuffer({id:?}, {desc:?})"),
            Self::CreateShader { id, desc } => write!(f, "CreateShader({id:?}, {})", desc.name),
            Self::CreateVertexArray(id) => write!(f, "CreateVertexArray({id:?})"),
            Self::PushTextureData { id, texels } => write!(f, "PushTextureData({id:?}, {} texels)", texels.len()),
            Self::PushVertexData { id, data } => {
                write!(f, "PushVertexData({id:?}, {} vertices)", data.vertices.len())
            }
            Self::SetTextureFilter(id, filter) => write!(f, "SetTextureFilter({id:?}, {filter:?})"),
            Self::SetTextureWrap(id, wrap) => write!(f, "SetTextureWrap({id:?}, {wrap:?})"),
            Self::SetDrawBuffers { framebuffer, buffers } => {
                write!(f, "SetDrawBuffers({framebuffer:?}, {buffers:?})")
            }
            Self::BindFramebuffer(id) => write!(f, "BindFramebuffer({id:?})"),
            Self::Clear(values) => write!(f, "Clear({values:?})"),
            Self::SetDepthState(state) => write!(f, "SetDepthState({state:?})"),
            Self::SetBlendMode(mode) => write!(f, "SetBlendMode({mode:?})"),
            Self::SetColorWrite(enabled) => write!(f, "SetColorWrite({enabled})"),
            Self::SetCullMode(mode) => write!(f, "SetCullMode({mode:?})"),
            Self::SetScissor(rect) => write!(f, "SetScissor({rect:?})"),
            Self::UseShader(id) => write!(f, "UseShader({id:?})"),
            Self::SetUniform { name, .. } => write!(f, "SetUniform({name})"),
            Self::BindTexture { unit, texture } => write!(f, "BindTexture({unit}, {texture:?})"),
            Self::Draw(id) => write!(f, "Draw({id:?})"),
            Self::Delete(resource) => write!(f, "Delete({resource:?})"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl RenderCommand {
    /// Wrap a closure as a command
    pub fn custom(work: impl FnOnce(&mut dyn GraphicsDevice) -> RenderResult<()> + Send + 'static) -> Self {
        Self::Custom(Box::new(work))
    }

    /// Run the command against a device
    pub fn execute(self, device: &mut dyn GraphicsDevice) -> RenderResult<()> {
        match self {
            Self::CreateTexture2D { id, desc } => device.create_texture_2d(id, &desc),
            Self::CreateTextureCube { id, size, format } => device.create_texture_cube(id, size, format),
            Self::CreateFramebuffer { id, desc } => device.create_framebuffer(id, &desc),
            Self::CreateShader { id, desc } => device.create_shader(id, &desc),
            Self::CreateVertexArray(id) => device.create_vertex_array(id),
            Self::PushTextureData { id, texels } => device.push_texture_data(id, &texels),
            Self::PushVertexData { id, data } => device.push_vertex_data(id, data),
            Self::SetTextureFilter(id, filter) => device.set_texture_2d_filter(id, filter),
            Self::SetTextureWrap(id, wrap) => device.set_texture_2d_wrap_mode(id, wrap),
            Self::SetDrawBuffers { framebuffer, buffers } => device.set_draw_buffers(framebuffer, &buffers),
            Self::BindFramebuffer(id) => device.bind_framebuffer(id),
            Self::Clear(values) => device.clear(&values),
            Self::SetDepthState(state) => {
                device.set_depth_state(state);
                Ok(())
            }
            Self::SetBlendMode(mode) => {
                device.set_blend_mode(mode);
                Ok(())
            }
            Self::SetColorWrite(enabled) => {
                device.set_color_write(enabled);
                Ok(())
            }
            Self::SetCullMode(mode) => {
                device.set_cull_mode(mode);
                Ok(())
            }
            Self::SetScissor(rect) => {
                device.set_scissor(rect);
                Ok(())
            }
            Self::UseShader(id) => device.use_shader(id),
            Self::SetUniform { name, value } => {
                device.set_uniform(name, value);
                Ok(())
            }
            Self::BindTexture { unit, texture } => device.bind_texture(unit, texture),
            Self::Draw(id) => device.draw(id),
            Self::Delete(resource) => delete_resource(device, resource),
            Self::Custom(work) => work(device),
        }
    }
}

/// Delete any resource through the matching device call
pub fn delete_resource(device: &mut dyn GraphicsDevice, resource: GpuResource) -> RenderResult<()> {
    match resource {
        GpuResource::Texture(id) => device.delete_texture(id),
        GpuResource::Framebuffer(id) => device.delete_framebuffer(id),
        GpuResource::Shader(id) => device.delete_shader(id),
        GpuResource::VertexArray(id) => device.delete_vertex_array(id),
    }
}

/// Ordered list of commands
#[derive(Debug, Default)]
pub struct RenderCommandQueue {
    commands: Vec<RenderCommand>,
}

impl RenderCommandQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command
    pub fn push(&mut self, command: RenderCommand) {
        self.commands.push(command);
    }

    /// Number of queued commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// True if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &RenderCommand> {
        self.commands.iter()
    }

    /// Remove and yield every command in insertion order
    pub fn drain(&mut self) -> impl Iterator<Item = RenderCommand> + '_ {
        self.commands.drain(..)
    }
}

impl Recycle for RenderCommandQueue {
    fn recycle(&mut self) {
        self.commands.clear();
    }
}

/// Outcome of draining the front queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionReport {
    /// Commands that ran successfully
    pub executed: usize,
    /// Commands that failed and were skipped
    pub failed: usize,
}

/// Back/front pair of command queues
#[derive(Debug, Default)]
pub struct RenderQueues {
    queues: DoubleBuffered<RenderCommandQueue>,
}

impl RenderQueues {
    /// Create two empty queues
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the back queue. Single producer only.
    pub fn append_to_back_buffer(&mut self, command: RenderCommand) {
        self.queues.back_mut().push(command);
    }

    /// Commands waiting in the back queue
    pub fn back(&self) -> &RenderCommandQueue {
        self.queues.back()
    }

    /// Commands waiting in the front queue
    pub fn front(&self) -> &RenderCommandQueue {
        self.queues.front()
    }

    /// Exchange back and front, then clear the new back queue.
    ///
    /// Refused with [`RenderError::QueueNotDrained`] while the front queue
    /// still holds commands, leaving both queues untouched.
    pub fn swap_rc_queues(&mut self) -> RenderResult<()> {
        let pending = self.queues.front().len();
        if pending > 0 {
            log::warn!("Refusing queue swap: {} commands not yet executed", pending);
            return Err(RenderError::QueueNotDrained { pending });
        }
        self.queues.swap();
        Ok(())
    }

    /// Execute and remove every front command in insertion order.
    ///
    /// A failing command is logged and skipped; the rest still run.
    pub fn execute_front_rc_queue(&mut self, device: &mut dyn GraphicsDevice) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        for (index, command) in self.queues.front_mut().drain().enumerate() {
            match command.execute(device) {
                Ok(()) => report.executed += 1,
                Err(e) => {
                    log::warn!("Skipping failed render command #{}: {}", index, e);
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Drop every queued command on both sides
    pub fn clear(&mut self) {
        self.queues.back_mut().recycle();
        self.queues.front_mut().recycle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_only_touches_back() {
        let mut queues = RenderQueues::new();
        queues.append_to_back_buffer(RenderCommand::SetColorWrite(false));
        assert_eq!(queues.back().len(), 1);
        assert!(queues.front().is_empty());
    }

    #[test]
    fn test_swap_refused_until_front_drained() {
        let mut queues = RenderQueues::new();
        queues.append_to_back_buffer(RenderCommand::SetColorWrite(false));
        queues.swap_rc_queues().unwrap();

        queues.append_to_back_buffer(RenderCommand::SetColorWrite(true));
        let err = queues.swap_rc_queues().unwrap_err();
        assert!(matches!(err, RenderError::QueueNotDrained { pending: 1 }));
        // Nothing moved
        assert_eq!(queues.front().len(), 1);
        assert_eq!(queues.back().len(), 1);
    }

    #[test]
    fn test_debug_names_custom_commands() {
        let command = RenderCommand::custom(|_| Ok(()));
        assert_eq!(format!("{command:?}"), "Custom(..)");
    }
}
