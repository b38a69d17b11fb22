//! Scene graph and components
//!
//! ```text
//! Scene
//!  ├── SceneGraph        node hierarchy, transforms, events, change journal
//!  ├── component arenas  models, lights, cameras, scripts, custom data
//!  └── BroadPhase        proxies for models and bounded lights
//! ```
//!
//! Nodes own only typed references to their components. Transform changes
//! propagate lazily: world transforms are composed on read, and dependants
//! are notified through node events and the change journal the [`Scene`]
//! drains to keep broad-phase proxies current.

pub mod components;
pub mod graph;
pub mod node;
pub mod world;

pub use components::{
    CameraComponent, CameraId, ComponentRef, ComponentType, CustomComponent, CustomId, LightComponent, LightId,
    LightKind, Model, ModelId, NodeScript, ScriptId,
};
pub use graph::{SceneChange, SceneGraph};
pub use node::{HandlerId, NodeEvent, NodeEventHandler, NodeId, SceneNode, TransformInheritance};
pub use world::{Attached, Scene};
