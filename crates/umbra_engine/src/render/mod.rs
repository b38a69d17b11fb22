//! # Rendering System
//!
//! Deferred renderer core. Scene traversal records [`RenderCommand`]s into
//! the back half of a double-buffered queue; a submission step swaps the
//! queues and drains the front half against a [`GraphicsDevice`].
//!
//! ## Architecture
//!
//! - **Device**: opaque resource factory ([`device`]) with a CPU reference
//!   implementation in [`backends::software`]
//! - **Commands**: [`commands::RenderQueues`] and the deferred deletion list
//!   in [`garbage`]
//! - **Context**: [`RenderContext`] owns the device, queues and id allocator
//!   and replaces any global renderer state
//! - **Renderer**: [`DeferredRenderer`] runs the per-viewport pass pipeline,
//!   fed by [`visibility`] and backed by per-viewport [`framebuffers`]
//!
//! ## Failure policy
//!
//! Nothing here aborts a frame. A failed command is logged and skipped; a
//! missing camera renders an empty viewport; a material whose shader cannot
//! be built skips its draws.

pub mod device;
pub mod commands;
pub mod garbage;
pub mod context;
pub mod shader_cache;
pub mod framebuffers;
pub mod viewport;
pub mod visibility;
pub mod renderer;
pub mod backends;

#[cfg(test)]
mod tests;

pub use device::{
    AttachmentTarget, BlendMode, ClearValues, CubeFace, CullMode, DepthFunc, DepthState, DeviceStats,
    FramebufferDesc, FramebufferId, GpuResource, GraphicsDevice, LightType, ResourceIds,
    ScissorRect, ShaderDesc, ShaderId, ShaderProgram, TextureDesc, TextureFilter, TextureFormat,
    TextureId, Uniform, VertexArrayId, VertexData, WrapMode,
};
pub use commands::{ExecutionReport, RenderCommand, RenderCommandQueue, RenderQueues};
pub use garbage::GarbageList;
pub use context::RenderContext;
pub use shader_cache::{ShaderCache, ShaderKey, ShaderPass, ShaderVariant};
pub use framebuffers::FramebufferSet;
pub use viewport::{Viewport, ViewportId};
pub use visibility::{VisibilityProcessor, VisibleObjects};
pub use renderer::{DeferredRenderer, FrameStats};

/// Rendering error types
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// A device resource could not be created
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// The device rejected a shader description
    #[error("Shader '{name}' failed to compile: {reason}")]
    ShaderCompilationFailed {
        /// Shader debug name
        name: String,
        /// Backend message
        reason: String,
    },

    /// A command referenced a resource the device does not know
    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    /// Framebuffer is incomplete or unbound
    #[error("Invalid framebuffer: {0}")]
    InvalidFramebuffer(String),

    /// Queues were swapped before the front queue was drained
    #[error("Front command queue still holds {pending} commands")]
    QueueNotDrained {
        /// Commands left in the front queue
        pending: usize,
    },

    /// Texture readback failed
    #[error("Readback failed: {0}")]
    ReadbackFailed(String),
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
