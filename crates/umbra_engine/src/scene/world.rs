//! Scene: graph, component storage and broad-phase proxies
//!
//! Components live in per-type arenas; the node keeps only a typed
//! [`ComponentRef`]. Models and bounded lights (point, spot) own a
//! broad-phase proxy that follows their node. Proxies are refreshed from the
//! graph's change journal in [`Scene::sync_proxies`], which
//! [`Scene::update`] calls after scripts and animation have run.

use slotmap::{SecondaryMap, SlotMap};

use crate::foundation::math::{Mat4, Vec3};
use crate::foundation::time::FixedTimestep;
use crate::physics::{BroadPhase, CollisionGroups, CollisionObject, DbvtBroadPhase, Partition, ProxyId};
use crate::spatial::AABB;

use super::components::camera::CameraView;
use super::components::{
    CameraComponent, CameraId, ComponentRef, ComponentType, CustomComponent, CustomId, LightComponent, LightId,
    Model, ModelId, NodeScript, ScriptId,
};
use super::graph::{SceneChange, SceneGraph};
use super::node::NodeId;

/// Component plus the node it is attached to
#[derive(Debug)]
pub struct Attached<T> {
    /// Owning node
    pub node: NodeId,
    /// Component data
    pub component: T,
    proxy: Option<ProxyId>,
}

impl<T> Attached<T> {
    fn new(node: NodeId, component: T) -> Self {
        Self { node, component, proxy: None }
    }

    /// Broad-phase proxy, if the component has bounds
    pub fn proxy(&self) -> Option<ProxyId> {
        self.proxy
    }
}

/// Scene graph plus everything attached to it
pub struct Scene {
    graph: SceneGraph,
    models: SlotMap<ModelId, Attached<Model>>,
    lights: SlotMap<LightId, Attached<LightComponent>>,
    cameras: SlotMap<CameraId, Attached<CameraComponent>>,
    scripts: SlotMap<ScriptId, Attached<Box<dyn NodeScript>>>,
    customs: SlotMap<CustomId, Attached<CustomComponent>>,
    broad_phase: Box<dyn BroadPhase>,
    proxy_owners: SecondaryMap<ProxyId, ComponentRef>,
    timestep: FixedTimestep,
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("graph", &self.graph)
            .field("models", &self.models.len())
            .field("lights", &self.lights.len())
            .field("cameras", &self.cameras.len())
            .field("proxies", &self.broad_phase.proxy_count())
            .finish_non_exhaustive()
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// Empty scene over a [`DbvtBroadPhase`] with a 60 Hz animation step
    pub fn new() -> Self {
        Self::with_broad_phase(Box::new(DbvtBroadPhase::new()))
    }

    /// Empty scene over a caller-provided broad-phase
    pub fn with_broad_phase(broad_phase: Box<dyn BroadPhase>) -> Self {
        Self {
            graph: SceneGraph::with_journal(),
            models: SlotMap::with_key(),
            lights: SlotMap::with_key(),
            cameras: SlotMap::with_key(),
            scripts: SlotMap::with_key(),
            customs: SlotMap::with_key(),
            broad_phase,
            proxy_owners: SecondaryMap::new(),
            timestep: FixedTimestep::default(),
        }
    }

    /// Builder-style animation step in seconds
    pub fn with_timestep(mut self, step: f32) -> Self {
        self.timestep = FixedTimestep::new(step);
        self
    }

    /// Node hierarchy
    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    /// Mutable node hierarchy; proxy updates are picked up by the next sync
    pub fn graph_mut(&mut self) -> &mut SceneGraph {
        &mut self.graph
    }

    /// Create a root node
    pub fn create_node(&mut self, name: impl Into<String>) -> NodeId {
        self.graph.create_node(name)
    }

    /// Broad-phase the proxies live in
    pub fn broad_phase(&self) -> &dyn BroadPhase {
        self.broad_phase.as_ref()
    }

    /// Component owning a proxy
    pub fn proxy_owner(&self, proxy: ProxyId) -> Option<ComponentRef> {
        self.proxy_owners.get(proxy).copied()
    }

    // ---------------------------------------------------------------------
    // Attachment

    /// Attach a model, replacing any model already on the node
    pub fn attach_model(&mut self, node: NodeId, model: Model) -> Option<ModelId> {
        if !self.graph.contains(node) {
            return None;
        }
        self.detach_component(node, ComponentType::Model);
        let id = self.models.insert(Attached::new(node, model));
        self.graph.set_component(node, ComponentRef::Model(id));
        self.refresh_proxy(ComponentRef::Model(id));
        Some(id)
    }

    /// Attach a light, replacing any light already on the node
    pub fn attach_light(&mut self, node: NodeId, light: LightComponent) -> Option<LightId> {
        if !self.graph.contains(node) {
            return None;
        }
        self.detach_component(node, ComponentType::Light);
        let id = self.lights.insert(Attached::new(node, light));
        self.graph.set_component(node, ComponentRef::Light(id));
        self.refresh_proxy(ComponentRef::Light(id));
        Some(id)
    }

    /// Attach a camera, replacing any camera already on the node
    pub fn attach_camera(&mut self, node: NodeId, camera: CameraComponent) -> Option<CameraId> {
        if !self.graph.contains(node) {
            return None;
        }
        self.detach_component(node, ComponentType::Camera);
        let id = self.cameras.insert(Attached::new(node, camera));
        self.graph.set_component(node, ComponentRef::Camera(id));
        Some(id)
    }

    /// Attach a per-frame script
    pub fn attach_script(&mut self, node: NodeId, script: impl NodeScript + 'static) -> Option<ScriptId> {
        if !self.graph.contains(node) {
            return None;
        }
        self.detach_component(node, ComponentType::Script);
        let id = self.scripts.insert(Attached::new(node, Box::new(script) as Box<dyn NodeScript>));
        self.graph.set_component(node, ComponentRef::Script(id));
        Some(id)
    }

    /// Attach application data
    pub fn attach_custom(&mut self, node: NodeId, custom: CustomComponent) -> Option<CustomId> {
        if !self.graph.contains(node) {
            return None;
        }
        self.detach_component(node, ComponentType::Custom);
        let id = self.customs.insert(Attached::new(node, custom));
        self.graph.set_component(node, ComponentRef::Custom(id));
        Some(id)
    }

    /// Remove the node's component of `component_type`; `false` if there was none
    pub fn detach_component(&mut self, node: NodeId, component_type: ComponentType) -> bool {
        match self.graph.remove_component(node, component_type) {
            Some(component) => {
                self.drop_component(component);
                true
            }
            None => false,
        }
    }

    /// Destroy a node and every component attached to it. Children are orphaned.
    pub fn destroy_node(&mut self, node: NodeId) -> bool {
        if !self.graph.destroy_node(node) {
            return false;
        }
        self.sync_proxies();
        true
    }

    fn drop_component(&mut self, component: ComponentRef) {
        let proxy = match component {
            ComponentRef::Model(id) => self.models.remove(id).and_then(|a| a.proxy),
            ComponentRef::Light(id) => self.lights.remove(id).and_then(|a| a.proxy),
            ComponentRef::Camera(id) => self.cameras.remove(id).and_then(|a| a.proxy),
            ComponentRef::Script(id) => self.scripts.remove(id).and_then(|a| a.proxy),
            ComponentRef::Custom(id) => self.customs.remove(id).and_then(|a| a.proxy),
        };
        if let Some(proxy) = proxy {
            self.broad_phase.remove_collision_object(proxy);
            self.proxy_owners.remove(proxy);
        }
    }

    // ---------------------------------------------------------------------
    // Access

    /// Model by id
    pub fn model(&self, id: ModelId) -> Option<&Attached<Model>> {
        self.models.get(id)
    }

    /// Mutable model by id
    pub fn model_mut(&mut self, id: ModelId) -> Option<&mut Model> {
        self.models.get_mut(id).map(|a| &mut a.component)
    }

    /// Every model
    pub fn models(&self) -> impl Iterator<Item = (ModelId, &Attached<Model>)> {
        self.models.iter()
    }

    /// Light by id
    pub fn light(&self, id: LightId) -> Option<&Attached<LightComponent>> {
        self.lights.get(id)
    }

    /// Mutable light by id. Call [`Scene::refresh_proxy`] after changing its reach.
    pub fn light_mut(&mut self, id: LightId) -> Option<&mut LightComponent> {
        self.lights.get_mut(id).map(|a| &mut a.component)
    }

    /// Every light
    pub fn lights(&self) -> impl Iterator<Item = (LightId, &Attached<LightComponent>)> {
        self.lights.iter()
    }

    /// Camera by id
    pub fn camera(&self, id: CameraId) -> Option<&Attached<CameraComponent>> {
        self.cameras.get(id)
    }

    /// Mutable camera by id
    pub fn camera_mut(&mut self, id: CameraId) -> Option<&mut CameraComponent> {
        self.cameras.get_mut(id).map(|a| &mut a.component)
    }

    /// Custom component by id
    pub fn custom(&self, id: CustomId) -> Option<&CustomComponent> {
        self.customs.get(id).map(|a| &a.component)
    }

    /// Mutable custom component by id
    pub fn custom_mut(&mut self, id: CustomId) -> Option<&mut CustomComponent> {
        self.customs.get_mut(id).map(|a| &mut a.component)
    }

    /// Per-frame view data for a camera node, `None` without an enabled camera
    pub fn camera_view(&self, node: NodeId, viewport_aspect: f32) -> Option<CameraView> {
        let Some(ComponentRef::Camera(id)) = self.graph.component(node, ComponentType::Camera) else {
            return None;
        };
        let camera = &self.cameras.get(id)?.component;
        if !camera.enabled {
            return None;
        }
        let world = self.graph.world_transform(node)?;
        Some(CameraView::new(camera, &world, viewport_aspect))
    }

    // ---------------------------------------------------------------------
    // Frame update

    /// Advance the scene by `delta_time` seconds.
    ///
    /// Runs scripts, swaps model skinning buffers, steps animations at the
    /// fixed timestep, then refreshes broad-phase proxies.
    pub fn update(&mut self, delta_time: f32) {
        for attached in self.scripts.values_mut() {
            attached.component.update(attached.node, &mut self.graph, delta_time);
        }

        let steps = self.timestep.advance(delta_time);
        let step = self.timestep.step();
        for attached in self.models.values_mut() {
            attached.component.swap_skinning_buffers();
            for _ in 0..steps {
                attached.component.step_animation(step);
            }
        }

        self.sync_proxies();
    }

    /// Apply the graph's change journal to the broad-phase
    pub fn sync_proxies(&mut self) {
        let changes = self.graph.drain_changes();
        let mut refreshed = 0;
        for change in changes {
            match change {
                SceneChange::Transform(node) | SceneChange::Parent(node) => {
                    for component_type in [ComponentType::Model, ComponentType::Light] {
                        if let Some(component) = self.graph.component(node, component_type) {
                            self.refresh_proxy(component);
                            refreshed += 1;
                        }
                    }
                }
                SceneChange::Destroyed { node, components } => {
                    log::trace!("Releasing {} components of destroyed node {:?}", components.len(), node);
                    for component in components {
                        self.drop_component(component);
                    }
                }
            }
        }
        if refreshed > 0 {
            log::trace!("Refreshed {} broad-phase proxies", refreshed);
        }
    }

    /// Recompute a component's bounds and create, move or remove its proxy
    pub fn refresh_proxy(&mut self, component: ComponentRef) {
        let (node, current, bounds, group, partition) = match component {
            ComponentRef::Model(id) => {
                let Some(attached) = self.models.get(id) else { return };
                let world = self.graph.world_matrix(attached.node).unwrap_or_else(Mat4::identity);
                let bounds = attached.component.world_bounds(&world);
                let partition = if attached.component.is_static { Partition::Static } else { Partition::Dynamic };
                (attached.node, attached.proxy, bounds, CollisionGroups::MODEL, partition)
            }
            ComponentRef::Light(id) => {
                let Some(attached) = self.lights.get(id) else { return };
                let position = self.graph.world_position(attached.node).unwrap_or_else(Vec3::zeros);
                let bounds = attached.component.bounds(position);
                (attached.node, attached.proxy, bounds, CollisionGroups::LIGHT, Partition::Dynamic)
            }
            _ => return,
        };

        let proxy = match (current, bounds) {
            (Some(proxy), Some(aabb)) => {
                self.broad_phase.update_aabb(proxy, aabb);
                self.broad_phase.set_partition(proxy, partition);
                Some(proxy)
            }
            (None, Some(aabb)) => {
                let object = CollisionObject { aabb, partition };
                let proxy = self.broad_phase.add_collision_object(object, group, CollisionGroups::all());
                self.proxy_owners.insert(proxy, component);
                log::trace!("Registered proxy {:?} for {:?} on {:?}", proxy, component, node);
                Some(proxy)
            }
            (Some(proxy), None) => {
                self.broad_phase.remove_collision_object(proxy);
                self.proxy_owners.remove(proxy);
                None
            }
            (None, None) => None,
        };
        match component {
            ComponentRef::Model(id) => {
                if let Some(attached) = self.models.get_mut(id) {
                    attached.proxy = proxy;
                }
            }
            ComponentRef::Light(id) => {
                if let Some(attached) = self.lights.get_mut(id) {
                    attached.proxy = proxy;
                }
            }
            _ => {}
        }
    }

    /// Models whose world bounds overlap `aabb`
    pub fn models_in(&self, aabb: &AABB) -> Vec<ModelId> {
        self.broad_phase
            .query_aabb(aabb, CollisionGroups::MODEL)
            .into_iter()
            .filter_map(|proxy| match self.proxy_owner(proxy) {
                Some(ComponentRef::Model(id)) => Some(id),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::mesh::MeshData;
    use crate::assets::model::ModelDefinition;
    use slotmap::KeyData;

    fn cube_model() -> Model {
        Model::new(ModelDefinition::single_mesh("cube", MeshData::cube(0.5), KeyData::from_ffi(1).into()))
    }

    #[test]
    fn test_model_proxy_follows_node() {
        let mut scene = Scene::new();
        let node = scene.create_node("cube");
        let id = scene.attach_model(node, cube_model()).unwrap();
        let proxy = scene.model(id).unwrap().proxy().unwrap();
        assert_eq!(scene.proxy_owner(proxy), Some(ComponentRef::Model(id)));

        scene.graph_mut().set_position(node, Vec3::new(10.0, 0.0, 0.0));
        scene.sync_proxies();
        let moved = scene.broad_phase().proxy_aabb(proxy).unwrap();
        assert!(moved.contains_point(Vec3::new(10.0, 0.0, 0.0)));
        assert!(!moved.contains_point(Vec3::zeros()));
    }

    #[test]
    fn test_child_proxy_follows_parent() {
        let mut scene = Scene::new();
        let parent = scene.create_node("parent");
        let child = scene.graph_mut().create_child(parent, "child");
        let id = scene.attach_model(child, cube_model()).unwrap();
        scene.sync_proxies();

        scene.graph_mut().set_position(parent, Vec3::new(0.0, 5.0, 0.0));
        scene.update(0.0);
        let proxy = scene.model(id).unwrap().proxy().unwrap();
        assert!(scene.broad_phase().proxy_aabb(proxy).unwrap().contains_point(Vec3::new(0.0, 5.0, 0.0)));
        assert_eq!(scene.models_in(&AABB::from_center_extents(Vec3::new(0.0, 5.0, 0.0), Vec3::repeat(0.1))), vec![id]);
    }

    #[test]
    fn test_scale_only_child_proxy_follows_parent_scale() {
        use crate::scene::node::TransformInheritance;

        let mut scene = Scene::new();
        let parent = scene.create_node("parent");
        let child = scene.graph_mut().create_child(parent, "child");
        scene.graph_mut().set_inheritance(child, TransformInheritance::SCALE);
        scene.graph_mut().set_position(child, Vec3::new(0.0, 0.0, 5.0));
        let id = scene.attach_model(child, cube_model()).unwrap();
        scene.sync_proxies();

        scene.graph_mut().set_scale(parent, Vec3::repeat(40.0));
        scene.update(0.0);
        let proxy = scene.model(id).unwrap().proxy().unwrap();
        let aabb = scene.broad_phase().proxy_aabb(proxy).unwrap();
        assert!(aabb.contains_point(Vec3::new(0.0, 0.0, -14.0)));
        assert!(aabb.contains_point(Vec3::new(0.0, 0.0, 24.0)));
    }

    #[test]
    fn test_global_lights_have_no_proxy() {
        let mut scene = Scene::new();
        let node = scene.create_node("sun");
        let sun = scene.attach_light(node, LightComponent::directional(Vec3::repeat(1.0), 1.0)).unwrap();
        assert!(scene.light(sun).unwrap().proxy().is_none());

        let lamp_node = scene.create_node("lamp");
        let lamp = scene.attach_light(lamp_node, LightComponent::point(Vec3::repeat(1.0), 1.0, 2.0)).unwrap();
        assert!(scene.light(lamp).unwrap().proxy().is_some());
        assert_eq!(scene.broad_phase().proxy_count(), 1);
    }

    #[test]
    fn test_destroy_releases_components() {
        let mut scene = Scene::new();
        let node = scene.create_node("cube");
        let child = scene.graph_mut().create_child(node, "child");
        let id = scene.attach_model(node, cube_model()).unwrap();
        assert!(scene.destroy_node(node));
        assert!(scene.model(id).is_none());
        assert_eq!(scene.broad_phase().proxy_count(), 0);
        assert!(scene.graph().node(child).unwrap().parent().is_none());
    }

    #[test]
    fn test_replacing_a_component_detaches_the_old_one() {
        let mut scene = Scene::new();
        let node = scene.create_node("cube");
        let first = scene.attach_model(node, cube_model()).unwrap();
        let second = scene.attach_model(node, cube_model()).unwrap();
        assert!(scene.model(first).is_none());
        assert!(scene.model(second).is_some());
        assert_eq!(scene.broad_phase().proxy_count(), 1);
    }

    #[test]
    fn test_scripts_run_on_update() {
        let mut scene = Scene::new();
        let node = scene.create_node("spinner");
        scene.attach_script(node, |node: NodeId, graph: &mut SceneGraph, dt: f32| {
            let x = graph.node(node).map_or(0.0, |n| n.position().x);
            graph.set_position(node, Vec3::new(x + dt, 0.0, 0.0));
        });
        scene.update(0.5);
        scene.update(0.5);
        assert_eq!(scene.graph().node(node).unwrap().position().x, 1.0);
    }

    #[test]
    fn test_camera_view_requires_enabled_camera() {
        let mut scene = Scene::new();
        let node = scene.create_node("camera");
        assert!(scene.camera_view(node, 1.0).is_none());
        let camera = scene.attach_camera(node, CameraComponent::default()).unwrap();
        assert!(scene.camera_view(node, 1.0).is_some());
        scene.camera_mut(camera).unwrap().enabled = false;
        assert!(scene.camera_view(node, 1.0).is_none());
    }
}
