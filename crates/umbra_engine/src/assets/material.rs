//! Material definitions and the material library
//!
//! A [`MaterialDefinition`] is shared, immutable shading data. The
//! [`MaterialLibrary`] owns definitions by id and tells registered
//! listeners when one is reloaded or deleted, so caches keyed by a
//! definition (the renderer's shader variants) can drop stale entries.

use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

use crate::foundation::math::Vec3;

new_key_type! {
    /// Handle to a definition in a [`MaterialLibrary`]
    pub struct MaterialDefinitionId;
}

/// How a material is composited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaterialBlend {
    /// Depth-tested, lit through the accumulation buffers
    Opaque,
    /// Alpha blended over the opaque result, sorted back to front
    Blended,
    /// Samples a snapshot of the scene color behind it
    Refractive,
}

/// Which lighting model the material's shader implements
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShadingModel {
    /// Diffuse + specular from the light accumulation buffers
    Lit,
    /// Base color only
    Unlit,
    /// Shader supplied by name; backends may not support it
    External(String),
}

/// Shading parameters shared by every mesh that uses the material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialDefinition {
    /// Display name
    pub name: String,
    /// Composition mode
    pub blend: MaterialBlend,
    /// Linear base color and alpha
    pub base_color: [f32; 4],
    /// Specular color
    pub specular_color: Vec3,
    /// Blinn-Phong exponent
    pub shininess: f32,
    /// Emitted radiance, added after lighting
    pub emissive: Vec3,
    /// Screen-space offset scale for refractive materials
    pub refraction_strength: f32,
    /// Lighting model
    pub model: ShadingModel,
}

impl Default for MaterialDefinition {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            blend: MaterialBlend::Opaque,
            base_color: [0.8, 0.8, 0.8, 1.0],
            specular_color: Vec3::new(0.5, 0.5, 0.5),
            shininess: 32.0,
            emissive: Vec3::zeros(),
            refraction_strength: 0.0,
            model: ShadingModel::Lit,
        }
    }
}

impl MaterialDefinition {
    /// Opaque lit material
    pub fn opaque(name: impl Into<String>, base_color: [f32; 4]) -> Self {
        Self {
            name: name.into(),
            base_color,
            ..Self::default()
        }
    }

    /// Alpha-blended lit material
    pub fn blended(name: impl Into<String>, base_color: [f32; 4]) -> Self {
        Self {
            blend: MaterialBlend::Blended,
            ..Self::opaque(name, base_color)
        }
    }

    /// Refractive material
    pub fn refractive(name: impl Into<String>, tint: [f32; 4], strength: f32) -> Self {
        Self {
            blend: MaterialBlend::Refractive,
            refraction_strength: strength,
            ..Self::opaque(name, tint)
        }
    }

    /// Builder-style emissive color
    pub fn with_emissive(mut self, emissive: Vec3) -> Self {
        self.emissive = emissive;
        self
    }

    /// Builder-style shading model
    pub fn with_model(mut self, model: ShadingModel) -> Self {
        self.model = model;
        self
    }

    /// True for the opaque pipeline
    pub fn is_opaque(&self) -> bool {
        self.blend == MaterialBlend::Opaque
    }
}

/// Observer of library changes
pub trait MaterialLibraryListener: Send + Sync {
    /// The definition was removed from the library
    fn on_delete_material_definition(&self, id: MaterialDefinitionId);

    /// The definition was replaced in place
    fn on_reload_material_definition(&self, id: MaterialDefinitionId);
}

/// Owner of material definitions
#[derive(Default)]
pub struct MaterialLibrary {
    definitions: SlotMap<MaterialDefinitionId, Arc<MaterialDefinition>>,
    listeners: Vec<Weak<dyn MaterialLibraryListener>>,
}

impl std::fmt::Debug for MaterialLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaterialLibrary")
            .field("definitions", &self.definitions.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl MaterialLibrary {
    /// Create an empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition
    pub fn add(&mut self, definition: MaterialDefinition) -> MaterialDefinitionId {
        let name = definition.name.clone();
        let id = self.definitions.insert(Arc::new(definition));
        log::debug!("Added material definition '{}' as {:?}", name, id);
        id
    }

    /// Shared handle to a definition
    pub fn get(&self, id: MaterialDefinitionId) -> Option<&Arc<MaterialDefinition>> {
        self.definitions.get(id)
    }

    /// Find a definition by name
    pub fn find(&self, name: &str) -> Option<MaterialDefinitionId> {
        self.definitions.iter().find(|(_, d)| d.name == name).map(|(id, _)| id)
    }

    /// Number of definitions
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// True if the library holds no definitions
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Replace a definition and notify listeners; returns `false` for unknown ids
    pub fn reload(&mut self, id: MaterialDefinitionId, definition: MaterialDefinition) -> bool {
        let Some(slot) = self.definitions.get_mut(id) else {
            return false;
        };
        *slot = Arc::new(definition);
        log::debug!("Reloaded material definition {:?}", id);
        self.notify(|listener| listener.on_reload_material_definition(id));
        true
    }

    /// Remove a definition and notify listeners
    pub fn delete(&mut self, id: MaterialDefinitionId) -> Option<Arc<MaterialDefinition>> {
        let removed = self.definitions.remove(id)?;
        log::debug!("Deleted material definition {:?} '{}'", id, removed.name);
        self.notify(|listener| listener.on_delete_material_definition(id));
        Some(removed)
    }

    /// Subscribe to reload and delete events.
    ///
    /// Only a weak reference is kept; dropping the listener unsubscribes it.
    pub fn add_listener(&mut self, listener: &Arc<dyn MaterialLibraryListener>) {
        self.listeners.push(Arc::downgrade(listener));
    }

    /// Number of live listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.iter().filter(|l| l.strong_count() > 0).count()
    }

    fn notify(&mut self, event: impl Fn(&dyn MaterialLibraryListener)) {
        self.listeners.retain(|weak| match weak.upgrade() {
            Some(listener) => {
                event(listener.as_ref());
                true
            }
            None => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(&'static str, MaterialDefinitionId)>>,
    }

    impl MaterialLibraryListener for Recorder {
        fn on_delete_material_definition(&self, id: MaterialDefinitionId) {
            self.events.lock().unwrap().push(("delete", id));
        }

        fn on_reload_material_definition(&self, id: MaterialDefinitionId) {
            self.events.lock().unwrap().push(("reload", id));
        }
    }

    #[test]
    fn test_reload_and_delete_notify_listeners() {
        let mut library = MaterialLibrary::new();
        let recorder = Arc::new(Recorder::default());
        let listener: Arc<dyn MaterialLibraryListener> = recorder.clone();
        library.add_listener(&listener);

        let id = library.add(MaterialDefinition::opaque("red", [1.0, 0.0, 0.0, 1.0]));
        assert!(library.reload(id, MaterialDefinition::opaque("red", [0.5, 0.0, 0.0, 1.0])));
        assert_eq!(library.get(id).unwrap().base_color[0], 0.5);
        assert!(library.delete(id).is_some());
        assert!(!library.reload(id, MaterialDefinition::default()));

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events, vec![("reload", id), ("delete", id)]);
    }

    #[test]
    fn test_dropped_listener_is_pruned() {
        let mut library = MaterialLibrary::new();
        let listener: Arc<dyn MaterialLibraryListener> = Arc::new(Recorder::default());
        library.add_listener(&listener);
        assert_eq!(library.listener_count(), 1);
        drop(listener);

        let id = library.add(MaterialDefinition::default());
        library.delete(id);
        assert_eq!(library.listener_count(), 0);
    }

    #[test]
    fn test_find_by_name() {
        let mut library = MaterialLibrary::new();
        let glass = library.add(MaterialDefinition::refractive("glass", [0.9, 0.9, 1.0, 0.3], 0.05));
        library.add(MaterialDefinition::blended("smoke", [0.2, 0.2, 0.2, 0.5]));
        assert_eq!(library.find("glass"), Some(glass));
        assert!(library.find("missing").is_none());
        assert!(!library.get(glass).unwrap().is_opaque());
    }
}
