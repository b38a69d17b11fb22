//! Components attachable to scene nodes
//!
//! A node holds at most one component per [`ComponentType`]. The node only
//! stores a typed [`ComponentRef`]; the component data itself lives in the
//! owning [`crate::scene::Scene`].

pub mod camera;
pub mod light;
pub mod model;
pub mod script;

pub use camera::CameraComponent;
pub use light::{LightComponent, LightKind};
pub use model::Model;
pub use script::{CustomComponent, NodeScript};

use slotmap::new_key_type;

new_key_type! {
    /// Handle to a model component
    pub struct ModelId;
    /// Handle to a light component
    pub struct LightId;
    /// Handle to a camera component
    pub struct CameraId;
    /// Handle to a script component
    pub struct ScriptId;
    /// Handle to a custom component
    pub struct CustomId;
}

/// Closed set of component kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    /// Renderable model
    Model,
    /// Light source
    Light,
    /// Camera
    Camera,
    /// Per-frame behaviour
    Script,
    /// Application data
    Custom,
}

impl ComponentType {
    /// Number of component slots on a node
    pub const COUNT: usize = 5;

    /// Every component type in slot order
    pub const ALL: [ComponentType; Self::COUNT] = [
        Self::Model,
        Self::Light,
        Self::Camera,
        Self::Script,
        Self::Custom,
    ];

    /// Slot index on the node
    pub fn index(self) -> usize {
        match self {
            Self::Model => 0,
            Self::Light => 1,
            Self::Camera => 2,
            Self::Script => 3,
            Self::Custom => 4,
        }
    }
}

/// Typed reference from a node to its component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentRef {
    /// Model component
    Model(ModelId),
    /// Light component
    Light(LightId),
    /// Camera component
    Camera(CameraId),
    /// Script component
    Script(ScriptId),
    /// Custom component
    Custom(CustomId),
}

impl ComponentRef {
    /// Kind of the referenced component
    pub fn component_type(self) -> ComponentType {
        match self {
            Self::Model(_) => ComponentType::Model,
            Self::Light(_) => ComponentType::Light,
            Self::Camera(_) => ComponentType::Camera,
            Self::Script(_) => ComponentType::Script,
            Self::Custom(_) => ComponentType::Custom,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_indices_are_unique() {
        let mut seen = [false; ComponentType::COUNT];
        for ty in ComponentType::ALL {
            assert!(!seen[ty.index()]);
            seen[ty.index()] = true;
        }
    }

    #[test]
    fn test_ref_reports_type() {
        let r = ComponentRef::Light(LightId::default());
        assert_eq!(r.component_type(), ComponentType::Light);
    }
}
