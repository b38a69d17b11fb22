//! Scene node data and event types

use bitflags::bitflags;
use slotmap::new_key_type;

use crate::foundation::math::{Quat, Transform, Vec3};

use super::components::{ComponentRef, ComponentType};

new_key_type! {
    /// Generation-checked handle to a node in a [`super::SceneGraph`]
    pub struct NodeId;
}

bitflags! {
    /// Which parts of the parent's world transform a node inherits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TransformInheritance: u8 {
        /// Offset by the parent's world frame
        const POSITION = 1 << 0;
        /// Compose with the parent's world rotation
        const ROTATION = 1 << 1;
        /// Multiply by the parent's world scale
        const SCALE = 1 << 2;
    }
}

impl Default for TransformInheritance {
    fn default() -> Self {
        Self::all()
    }
}

impl TransformInheritance {
    /// Children with these bits are notified when an ancestor moves
    pub fn follows_parent_motion(self) -> bool {
        self.intersects(Self::POSITION | Self::ROTATION)
    }
}

/// Handle returned when registering a [`NodeEventHandler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub(crate) u64);

/// Notifications emitted by scene nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEvent {
    /// The node's world transform may have changed
    TransformChanged,
    /// The node was attached to or detached from a parent
    ParentChanged {
        /// Previous parent
        old: Option<NodeId>,
        /// New parent
        new: Option<NodeId>,
    },
    /// The node is about to be removed from the graph
    Destroyed,
}

/// Observer of a single node's events
pub trait NodeEventHandler: Send {
    /// Called synchronously when `node` emits `event`
    fn on_node_event(&mut self, node: NodeId, event: &NodeEvent);
}

impl<F> NodeEventHandler for F
where
    F: FnMut(NodeId, &NodeEvent) + Send,
{
    fn on_node_event(&mut self, node: NodeId, event: &NodeEvent) {
        self(node, event);
    }
}

/// A node in the scene hierarchy
pub struct SceneNode {
    pub(crate) serial: u64,
    pub(crate) name: String,
    pub(crate) position: Vec3,
    pub(crate) rotation: Quat,
    pub(crate) scale: Vec3,
    pub(crate) inheritance: TransformInheritance,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) components: [Option<ComponentRef>; ComponentType::COUNT],
    pub(crate) handlers: Vec<(HandlerId, Box<dyn NodeEventHandler>)>,
    pub(crate) event_lock: u32,
    pub(crate) pending_transform: bool,
}

impl std::fmt::Debug for SceneNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneNode")
            .field("serial", &self.serial)
            .field("name", &self.name)
            .field("position", &self.position)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

impl SceneNode {
    pub(crate) fn new(serial: u64, name: String) -> Self {
        Self {
            serial,
            name,
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
            inheritance: TransformInheritance::default(),
            parent: None,
            children: Vec::new(),
            components: [None; ComponentType::COUNT],
            handlers: Vec::new(),
            event_lock: 0,
            pending_transform: false,
        }
    }

    /// Monotonic serial number, unique for the lifetime of the graph
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Node name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Local position
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Local rotation
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    /// Local scale
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Local transform
    pub fn local_transform(&self) -> Transform {
        Transform::new(self.position, self.rotation, self.scale)
    }

    /// Inheritance toggles
    pub fn inheritance(&self) -> TransformInheritance {
        self.inheritance
    }

    /// Parent node, `None` for roots
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in attachment order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Attached component of the given type
    pub fn component(&self, component_type: ComponentType) -> Option<ComponentRef> {
        self.components[component_type.index()]
    }

    /// All attached components
    pub fn components(&self) -> impl Iterator<Item = ComponentRef> + '_ {
        self.components.iter().flatten().copied()
    }

    pub(crate) fn dispatch(&mut self, id: NodeId, event: &NodeEvent) {
        for (_, handler) in &mut self.handlers {
            handler.on_node_event(id, event);
        }
    }
}
