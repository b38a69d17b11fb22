//! Viewports registered with the renderer

use slotmap::new_key_type;

use crate::scene::NodeId;

use super::framebuffers::FramebufferSet;
use super::visibility::VisibleObjects;

new_key_type! {
    /// Handle to a registered viewport
    pub struct ViewportId;
}

/// One render target with its camera and per-frame visibility lists
#[derive(Debug)]
pub struct Viewport {
    /// Camera node; `None` renders nothing
    pub camera: Option<NodeId>,
    /// Targets sized to the viewport
    pub framebuffers: FramebufferSet,
    /// Visibility lists from the last rendered frame
    pub visible: VisibleObjects,
}

impl Viewport {
    /// Viewport over existing targets
    pub fn new(framebuffers: FramebufferSet, deduplicate: bool) -> Self {
        Self {
            camera: None,
            framebuffers,
            visible: VisibleObjects::new(deduplicate),
        }
    }

    /// Width over height
    pub fn aspect(&self) -> f32 {
        self.framebuffers.width() as f32 / self.framebuffers.height() as f32
    }
}
