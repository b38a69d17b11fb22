//! Script and custom components

use std::any::Any;

use crate::scene::{NodeId, SceneGraph};

/// Per-frame behaviour attached to a node
///
/// Scripts run at the start of [`crate::scene::Scene::update`], before
/// animation playback and broad-phase synchronisation.
pub trait NodeScript: Send {
    /// Advance the script by `delta_time` seconds
    fn update(&mut self, node: NodeId, graph: &mut SceneGraph, delta_time: f32);
}

impl<F> NodeScript for F
where
    F: FnMut(NodeId, &mut SceneGraph, f32) + Send,
{
    fn update(&mut self, node: NodeId, graph: &mut SceneGraph, delta_time: f32) {
        self(node, graph, delta_time);
    }
}

/// Opaque application data attached to a node
pub struct CustomComponent {
    type_name: &'static str,
    value: Box<dyn Any + Send>,
}

impl std::fmt::Debug for CustomComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomComponent").field("type_name", &self.type_name).finish()
    }
}

impl CustomComponent {
    /// Wrap a value
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            value: Box::new(value),
        }
    }

    /// Name of the wrapped type
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Borrow the value if it is a `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    /// Mutably borrow the value if it is a `T`
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.value.downcast_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_downcast() {
        let mut custom = CustomComponent::new(42_u32);
        assert_eq!(custom.downcast_ref::<u32>(), Some(&42));
        assert!(custom.downcast_ref::<i64>().is_none());
        *custom.downcast_mut::<u32>().unwrap() += 1;
        assert_eq!(custom.downcast_ref::<u32>(), Some(&43));
    }
}
