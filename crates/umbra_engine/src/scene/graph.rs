//! Scene graph and transform propagation
//!
//! Nodes live in a generation-checked arena; parent and child links are
//! [`NodeId`]s, so cycle checks are an ancestor walk over ids and destroyed
//! nodes can never be reached through a stale handle.
//!
//! ## World transforms
//!
//! A node's world transform is composed root-down. With position inherited,
//! the node's local offset is scaled and rotated by the parent's world frame
//! and added to the parent's world position. Rotation and scale compose
//! only when their own inheritance bit is set.
//!
//! ## Notifications
//!
//! Setters compare the new value bit-for-bit with the stored one and do
//! nothing on an identical write. A real change emits
//! [`NodeEvent::TransformChanged`] on the node and on every descendant that
//! follows its parent's motion (position or rotation inheritance).
//! Compound operations hold the node's event lock so they emit one
//! notification in total.

use slotmap::SlotMap;

use crate::foundation::math::{
    quat_bits_eq, safe_component_div, vec3_bits_eq, Mat4, Quat, Transform, Vec3,
};

use super::components::{ComponentRef, ComponentType};
use super::node::{HandlerId, NodeEvent, NodeEventHandler, NodeId, SceneNode, TransformInheritance};

/// Structural change recorded for the owning scene
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneChange {
    /// World transform of the node may have changed
    Transform(NodeId),
    /// Node was reparented
    Parent(NodeId),
    /// Node was destroyed while still holding these components
    Destroyed {
        /// Destroyed node
        node: NodeId,
        /// Components still attached at destruction
        components: Vec<ComponentRef>,
    },
}

/// Hierarchy of scene nodes
pub struct SceneGraph {
    nodes: SlotMap<NodeId, SceneNode>,
    next_serial: u64,
    next_handler: u64,
    record_changes: bool,
    journal: Vec<SceneChange>,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SceneGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneGraph")
            .field("nodes", &self.nodes.len())
            .field("journal", &self.journal.len())
            .finish()
    }
}

impl SceneGraph {
    /// Create an empty graph that does not journal changes
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            next_serial: 1,
            next_handler: 1,
            record_changes: false,
            journal: Vec::new(),
        }
    }

    /// Create an empty graph that records [`SceneChange`]s
    pub fn with_journal() -> Self {
        Self { record_changes: true, ..Self::new() }
    }

    // ---------------------------------------------------------------------
    // Lifecycle

    /// Create a root node
    pub fn create_node(&mut self, name: impl Into<String>) -> NodeId {
        let serial = self.next_serial;
        self.next_serial += 1;
        let id = self.nodes.insert(SceneNode::new(serial, name.into()));
        log::trace!("Created scene node {:?} (serial {})", id, serial);
        id
    }

    /// Create a node attached under `parent`
    pub fn create_child(&mut self, parent: NodeId, name: impl Into<String>) -> NodeId {
        let id = self.create_node(name);
        self.attach_child(parent, id, false);
        id
    }

    /// Destroy a node.
    ///
    /// Children are orphaned and keep their local transforms. Returns `false`
    /// if the node does not exist.
    pub fn destroy_node(&mut self, id: NodeId) -> bool {
        if !self.nodes.contains_key(id) {
            return false;
        }

        if let Some(node) = self.nodes.get_mut(id) {
            node.dispatch(id, &NodeEvent::Destroyed);
        }

        self.unlink_from_parent(id);

        let children = self.nodes.get_mut(id).map(|n| std::mem::take(&mut n.children)).unwrap_or_default();
        for child in children {
            if let Some(child_node) = self.nodes.get_mut(child) {
                child_node.parent = None;
            }
            self.emit_parent_changed(child, Some(id), None);
            self.notify_transform(child);
        }

        if let Some(node) = self.nodes.remove(id) {
            log::trace!("Destroyed scene node {:?} '{}'", id, node.name);
            self.record(SceneChange::Destroyed {
                node: id,
                components: node.components().collect(),
            });
        }
        true
    }

    /// True if the node exists
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Borrow a node
    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over all nodes
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &SceneNode)> {
        self.nodes.iter()
    }

    /// Nodes without a parent
    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().filter(|(_, n)| n.parent.is_none()).map(|(id, _)| id)
    }

    /// First node with the given name
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().find(|(_, n)| n.name == name).map(|(id, _)| id)
    }

    /// Rename a node
    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.name = name.into();
        }
    }

    /// All descendants of a node, depth-first, excluding the node itself
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes.get(id).map(|n| n.children.iter().rev().copied().collect()).unwrap_or_default();
        while let Some(current) = stack.pop() {
            result.push(current);
            if let Some(node) = self.nodes.get(current) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        result
    }

    /// True if `ancestor` appears on the parent chain of `node`
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.nodes.get(node).and_then(|n| n.parent);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(id).and_then(|n| n.parent);
        }
        false
    }

    // ---------------------------------------------------------------------
    // Hierarchy

    /// Attach `child` under `parent`.
    ///
    /// Rejected (returns `false`, nothing changes, nothing is emitted) when
    /// either node is missing, when `child == parent`, or when `parent` is a
    /// descendant of `child`. With `keep_world_transform` the child's local
    /// transform is solved so its world transform is unchanged.
    pub fn attach_child(&mut self, parent: NodeId, child: NodeId, keep_world_transform: bool) -> bool {
        if !self.nodes.contains_key(parent) || !self.nodes.contains_key(child) {
            return false;
        }
        if parent == child || self.is_ancestor(child, parent) {
            log::debug!("Rejected attaching {:?} under {:?}: would create a cycle", child, parent);
            return false;
        }
        let old_parent = self.nodes[child].parent;
        if old_parent == Some(parent) {
            return true;
        }
        self.reparent(child, Some(parent), keep_world_transform);
        true
    }

    /// Detach a node from its parent, making it a root.
    ///
    /// Returns `false` if the node is missing or already a root.
    pub fn detach(&mut self, child: NodeId, keep_world_transform: bool) -> bool {
        match self.nodes.get(child) {
            Some(node) if node.parent.is_some() => {
                self.reparent(child, None, keep_world_transform);
                true
            }
            _ => false,
        }
    }

    fn reparent(&mut self, child: NodeId, new_parent: Option<NodeId>, keep_world_transform: bool) {
        let world = keep_world_transform.then(|| self.world_transform(child)).flatten();
        let old_parent = self.nodes.get(child).and_then(|n| n.parent);

        self.lock_events(child);
        self.unlink_from_parent(child);
        if let Some(parent) = new_parent {
            if let Some(parent_node) = self.nodes.get_mut(parent) {
                parent_node.children.push(child);
            }
        }
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = new_parent;
            node.pending_transform = true;
        }
        if let Some(world) = world {
            self.set_world_transform(child, &world);
        }
        self.emit_parent_changed(child, old_parent, new_parent);
        self.unlock_events(child);
    }

    fn unlink_from_parent(&mut self, child: NodeId) {
        let Some(parent) = self.nodes.get(child).and_then(|n| n.parent) else {
            return;
        };
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.retain(|c| *c != child);
        }
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = None;
        }
    }

    // ---------------------------------------------------------------------
    // Local transform

    /// Set the local position; returns `true` if the value changed
    pub fn set_position(&mut self, id: NodeId, position: Vec3) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        if vec3_bits_eq(&node.position, &position) {
            return false;
        }
        node.position = position;
        self.notify_transform(id);
        true
    }

    /// Set the local rotation; returns `true` if the value changed
    pub fn set_rotation(&mut self, id: NodeId, rotation: Quat) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        if quat_bits_eq(&node.rotation, &rotation) {
            return false;
        }
        node.rotation = rotation;
        self.notify_transform(id);
        true
    }

    /// Set the local scale; returns `true` if the value changed
    pub fn set_scale(&mut self, id: NodeId, scale: Vec3) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        if vec3_bits_eq(&node.scale, &scale) {
            return false;
        }
        node.scale = scale;
        self.notify_transform(id);
        true
    }

    /// Set all local components with a single notification
    pub fn set_local_transform(&mut self, id: NodeId, transform: &Transform) -> bool {
        self.lock_events(id);
        let changed = self.set_position(id, transform.position)
            | self.set_rotation(id, transform.rotation)
            | self.set_scale(id, transform.scale);
        self.unlock_events(id);
        changed
    }

    /// Change the inheritance toggles
    pub fn set_inheritance(&mut self, id: NodeId, inheritance: TransformInheritance) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        if node.inheritance == inheritance {
            return false;
        }
        node.inheritance = inheritance;
        self.notify_transform(id);
        true
    }

    /// Rotate so the node's forward (-Z) axis points at `target` in world space
    pub fn look_at(&mut self, id: NodeId, target: Vec3, up: Vec3) -> bool {
        let Some(eye) = self.world_position(id) else {
            return false;
        };
        let direction = target - eye;
        if direction.norm_squared() <= f32::EPSILON {
            return false;
        }
        // face_towards maps +Z onto the direction, so aim it away from the target
        let up = if direction.cross(&up).norm_squared() <= 1e-10 { Vec3::x() } else { up };
        let rotation = Quat::face_towards(&-direction, &up);
        self.set_world_rotation(id, rotation)
    }

    // ---------------------------------------------------------------------
    // World transform

    /// World position, rotation and scale
    pub fn world_transform(&self, id: NodeId) -> Option<Transform> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.nodes.get(node_id)?;
            chain.push(node);
            current = node.parent;
        }

        let mut nodes = chain.into_iter().rev();
        let root = nodes.next()?;
        let mut world = root.local_transform();
        for node in nodes {
            let inheritance = node.inheritance;
            world = Transform {
                position: if inheritance.contains(TransformInheritance::POSITION) {
                    world.transform_point(node.position)
                } else {
                    node.position
                },
                rotation: if inheritance.contains(TransformInheritance::ROTATION) {
                    world.rotation * node.rotation
                } else {
                    node.rotation
                },
                scale: if inheritance.contains(TransformInheritance::SCALE) {
                    world.scale.component_mul(&node.scale)
                } else {
                    node.scale
                },
            };
        }
        Some(world)
    }

    /// World position
    pub fn world_position(&self, id: NodeId) -> Option<Vec3> {
        self.world_transform(id).map(|t| t.position)
    }

    /// World rotation
    pub fn world_rotation(&self, id: NodeId) -> Option<Quat> {
        self.world_transform(id).map(|t| t.rotation)
    }

    /// World scale
    pub fn world_scale(&self, id: NodeId) -> Option<Vec3> {
        self.world_transform(id).map(|t| t.scale)
    }

    /// World matrix (translate * rotate * scale)
    pub fn world_matrix(&self, id: NodeId) -> Option<Mat4> {
        self.world_transform(id).map(|t| t.to_matrix())
    }

    fn parent_world(&self, id: NodeId) -> Option<(TransformInheritance, Transform)> {
        let node = self.nodes.get(id)?;
        let parent = node.parent?;
        Some((node.inheritance, self.world_transform(parent)?))
    }

    /// Set the world position by solving for the local position
    pub fn set_world_position(&mut self, id: NodeId, position: Vec3) -> bool {
        let local = match self.parent_world(id) {
            Some((inheritance, parent)) if inheritance.contains(TransformInheritance::POSITION) => {
                let offset = parent.rotation.inverse() * (position - parent.position);
                safe_component_div(&offset, &parent.scale)
            }
            _ => position,
        };
        self.set_position(id, local)
    }

    /// Set the world rotation by solving for the local rotation
    pub fn set_world_rotation(&mut self, id: NodeId, rotation: Quat) -> bool {
        let local = match self.parent_world(id) {
            Some((inheritance, parent)) if inheritance.contains(TransformInheritance::ROTATION) => {
                parent.rotation.inverse() * rotation
            }
            _ => rotation,
        };
        self.set_rotation(id, local)
    }

    /// Set the world scale by solving for the local scale
    pub fn set_world_scale(&mut self, id: NodeId, scale: Vec3) -> bool {
        let local = match self.parent_world(id) {
            Some((inheritance, parent)) if inheritance.contains(TransformInheritance::SCALE) => {
                safe_component_div(&scale, &parent.scale)
            }
            _ => scale,
        };
        self.set_scale(id, local)
    }

    /// Set world position, rotation and scale with a single notification
    pub fn set_world_transform(&mut self, id: NodeId, transform: &Transform) -> bool {
        self.lock_events(id);
        let changed = self.set_world_position(id, transform.position)
            | self.set_world_rotation(id, transform.rotation)
            | self.set_world_scale(id, transform.scale);
        self.unlock_events(id);
        changed
    }

    // ---------------------------------------------------------------------
    // Components

    /// Store a component reference, returning the one it replaced
    pub fn set_component(&mut self, id: NodeId, component: ComponentRef) -> Option<ComponentRef> {
        let node = self.nodes.get_mut(id)?;
        node.components[component.component_type().index()].replace(component)
    }

    /// Remove the component of the given type
    pub fn remove_component(&mut self, id: NodeId, component_type: ComponentType) -> Option<ComponentRef> {
        self.nodes.get_mut(id)?.components[component_type.index()].take()
    }

    /// Component of the given type on a node
    pub fn component(&self, id: NodeId, component_type: ComponentType) -> Option<ComponentRef> {
        self.nodes.get(id)?.component(component_type)
    }

    // ---------------------------------------------------------------------
    // Events

    /// Register a handler for one node's events
    pub fn add_event_handler(&mut self, id: NodeId, handler: impl NodeEventHandler + 'static) -> Option<HandlerId> {
        let node = self.nodes.get_mut(id)?;
        let handler_id = HandlerId(self.next_handler);
        self.next_handler += 1;
        node.handlers.push((handler_id, Box::new(handler)));
        Some(handler_id)
    }

    /// Unregister a handler; returns `false` if it was not registered
    pub fn remove_event_handler(&mut self, id: NodeId, handler: HandlerId) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        let before = node.handlers.len();
        node.handlers.retain(|(h, _)| *h != handler);
        node.handlers.len() != before
    }

    /// Suppress transform notifications from this node until the matching
    /// [`SceneGraph::unlock_events`]
    pub fn lock_events(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.event_lock += 1;
        }
    }

    /// Release one level of the event lock; emits a single pending
    /// notification when the lock reaches zero
    pub fn unlock_events(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        node.event_lock = node.event_lock.saturating_sub(1);
        if node.event_lock == 0 && node.pending_transform {
            node.pending_transform = false;
            self.notify_transform(id);
        }
    }

    /// Take every recorded change since the last call
    pub fn drain_changes(&mut self) -> Vec<SceneChange> {
        std::mem::take(&mut self.journal)
    }

    fn record(&mut self, change: SceneChange) {
        if self.record_changes {
            self.journal.push(change);
        }
    }

    fn emit_parent_changed(&mut self, id: NodeId, old: Option<NodeId>, new: Option<NodeId>) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.dispatch(id, &NodeEvent::ParentChanged { old, new });
            self.record(SceneChange::Parent(id));
        }
    }

    fn notify_transform(&mut self, id: NodeId) {
        match self.nodes.get_mut(id) {
            Some(node) if node.event_lock > 0 => {
                node.pending_transform = true;
                return;
            }
            Some(_) => {}
            None => return,
        }

        // (node, dispatch event); journal-only entries cover scale-only subtrees
        let mut stack = vec![(id, true)];
        while let Some((current, notify)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(current) else {
                continue;
            };
            if notify {
                node.dispatch(current, &NodeEvent::TransformChanged);
            }
            let children: Vec<NodeId> = node.children.clone();
            self.record(SceneChange::Transform(current));
            for child in children {
                let Some(inheritance) = self.nodes.get(child).map(|c| c.inheritance) else {
                    continue;
                };
                if notify && inheritance.follows_parent_motion() {
                    stack.push((child, true));
                } else if self.record_changes && !inheritance.is_empty() {
                    stack.push((child, false));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::constants::HALF_PI;
    use approx::assert_relative_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter(graph: &mut SceneGraph, id: NodeId) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = count.clone();
        graph.add_event_handler(id, move |_: NodeId, event: &NodeEvent| {
            if *event == NodeEvent::TransformChanged {
                handle.fetch_add(1, Ordering::SeqCst);
            }
        });
        count
    }

    fn build_chain(graph: &mut SceneGraph, depth: usize) -> Vec<NodeId> {
        let mut chain = vec![graph.create_node("n0")];
        for i in 1..depth {
            let node = graph.create_child(chain[i - 1], format!("n{i}"));
            chain.push(node);
        }
        for (i, &node) in chain.iter().enumerate() {
            let f = i as f32;
            graph.set_position(node, Vec3::new(1.0 + f, -0.5 * f, 0.25 * f));
            graph.set_rotation(node, Quat::from_euler_angles(0.1 * f, 0.3, -0.2 * f));
            graph.set_scale(node, Vec3::new(1.0 + 0.1 * f, 0.9, 1.2));
        }
        chain
    }

    #[test]
    fn test_world_position_composes_recursively() {
        let mut graph = SceneGraph::new();
        let chain = build_chain(&mut graph, 6);

        for pair in chain.windows(2) {
            let (parent, child) = (pair[0], pair[1]);
            let expected = graph.world_position(parent).unwrap()
                + graph.world_rotation(parent).unwrap()
                    * graph.world_scale(parent).unwrap().component_mul(&graph.node(child).unwrap().position());
            assert_relative_eq!(graph.world_position(child).unwrap(), expected, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_world_setter_round_trip() {
        let mut graph = SceneGraph::new();
        let chain = build_chain(&mut graph, 5);
        let leaf = *chain.last().unwrap();
        let target = Vec3::new(3.0, -2.0, 7.5);

        graph.set_world_position(leaf, target);
        assert_relative_eq!(graph.world_position(leaf).unwrap(), target, epsilon = 1e-3);

        let rotation = Quat::from_euler_angles(0.4, -1.1, 0.2);
        graph.set_world_rotation(leaf, rotation);
        assert_relative_eq!(graph.world_rotation(leaf).unwrap(), rotation, epsilon = 1e-4);

        let scale = Vec3::new(2.0, 0.5, 1.0);
        graph.set_world_scale(leaf, scale);
        assert_relative_eq!(graph.world_scale(leaf).unwrap(), scale, epsilon = 1e-4);
    }

    #[test]
    fn test_world_setter_round_trip_with_partial_inheritance() {
        let mut graph = SceneGraph::new();
        let chain = build_chain(&mut graph, 5);
        graph.set_inheritance(chain[2], TransformInheritance::POSITION);
        graph.set_inheritance(chain[4], TransformInheritance::POSITION | TransformInheritance::SCALE);

        let target = Vec3::new(-4.0, 1.0, 2.0);
        graph.set_world_position(chain[4], target);
        assert_relative_eq!(graph.world_position(chain[4]).unwrap(), target, epsilon = 1e-3);

        // Without rotation inheritance the world rotation is the local one
        let rotation = Quat::from_euler_angles(0.0, 1.0, 0.0);
        graph.set_world_rotation(chain[4], rotation);
        assert_relative_eq!(graph.node(chain[4]).unwrap().rotation(), rotation, epsilon = 1e-6);
    }

    #[test]
    fn test_cycle_rejection() {
        let mut graph = SceneGraph::new();
        let a = graph.create_node("a");
        let b = graph.create_node("b");
        let c = graph.create_node("c");

        assert!(graph.attach_child(a, b, false));
        assert!(graph.attach_child(b, c, false));
        let events = counter(&mut graph, a);

        assert!(!graph.attach_child(b, a, false));
        assert!(!graph.attach_child(c, a, false));
        assert!(!graph.attach_child(a, a, false));

        assert_eq!(graph.node(b).unwrap().parent(), Some(a));
        assert_eq!(graph.node(a).unwrap().parent(), None);
        assert_eq!(graph.node(a).unwrap().children(), &[b]);
        assert_eq!(events.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_idempotent_write_notifies_once() {
        let mut graph = SceneGraph::new();
        let node = graph.create_node("node");
        let events = counter(&mut graph, node);

        let p = Vec3::new(1.0, 2.0, 3.0);
        assert!(graph.set_position(node, p));
        assert!(!graph.set_position(node, p));
        assert_eq!(events.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_notification_reaches_inheriting_descendants_only() {
        let mut graph = SceneGraph::new();
        let root = graph.create_node("root");
        let follower = graph.create_child(root, "follower");
        let grandchild = graph.create_child(follower, "grandchild");
        let scale_only = graph.create_child(root, "scale_only");
        graph.set_inheritance(scale_only, TransformInheritance::SCALE);

        let follower_events = counter(&mut graph, follower);
        let grandchild_events = counter(&mut graph, grandchild);
        let scale_only_events = counter(&mut graph, scale_only);

        graph.set_position(root, Vec3::new(0.0, 1.0, 0.0));

        assert_eq!(follower_events.load(Ordering::SeqCst), 1);
        assert_eq!(grandchild_events.load(Ordering::SeqCst), 1);
        assert_eq!(scale_only_events.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_scale_only_subtree_is_journaled_without_events() {
        let mut graph = SceneGraph::with_journal();
        let root = graph.create_node("root");
        let scale_only = graph.create_child(root, "scale_only");
        let leaf = graph.create_child(scale_only, "leaf");
        let detached = graph.create_child(root, "detached");
        graph.set_inheritance(scale_only, TransformInheritance::SCALE);
        graph.set_inheritance(detached, TransformInheritance::empty());
        graph.drain_changes();
        let scale_only_events = counter(&mut graph, scale_only);

        graph.set_scale(root, Vec3::repeat(3.0));

        let changes = graph.drain_changes();
        assert!(changes.contains(&SceneChange::Transform(scale_only)));
        assert!(changes.contains(&SceneChange::Transform(leaf)));
        assert!(!changes.contains(&SceneChange::Transform(detached)));
        assert_eq!(scale_only_events.load(Ordering::SeqCst), 0);
        assert_relative_eq!(graph.world_scale(leaf).unwrap(), Vec3::repeat(3.0), epsilon = 1e-6);
    }

    #[test]
    fn test_compound_world_transform_notifies_once() {
        let mut graph = SceneGraph::new();
        let parent = graph.create_node("parent");
        let node = graph.create_child(parent, "node");
        graph.set_position(parent, Vec3::new(1.0, 0.0, 0.0));
        let events = counter(&mut graph, node);

        let target = Transform::new(
            Vec3::new(5.0, 5.0, 5.0),
            Quat::from_axis_angle(&Vec3::y_axis(), HALF_PI),
            Vec3::new(2.0, 2.0, 2.0),
        );
        assert!(graph.set_world_transform(node, &target));
        assert_eq!(events.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_detach_keep_world_transform() {
        let mut graph = SceneGraph::new();
        let parent = graph.create_node("parent");
        let child = graph.create_child(parent, "child");
        graph.set_position(parent, Vec3::new(10.0, 0.0, 0.0));
        graph.set_rotation(parent, Quat::from_axis_angle(&Vec3::z_axis(), HALF_PI));
        graph.set_scale(parent, Vec3::new(2.0, 2.0, 2.0));
        graph.set_position(child, Vec3::new(1.0, 0.0, 0.0));

        let world_before = graph.world_position(child).unwrap();
        let local_before = graph.node(child).unwrap().position();

        assert!(graph.detach(child, true));

        assert_relative_eq!(graph.world_position(child).unwrap(), world_before, epsilon = 1e-5);
        assert!((graph.node(child).unwrap().position() - local_before).norm() > 1.0);
        assert!(graph.node(parent).unwrap().children().is_empty());
    }

    #[test]
    fn test_attach_keep_world_transform() {
        let mut graph = SceneGraph::new();
        let parent = graph.create_node("parent");
        let child = graph.create_node("child");
        graph.set_position(parent, Vec3::new(0.0, 3.0, 0.0));
        graph.set_rotation(parent, Quat::from_axis_angle(&Vec3::x_axis(), 0.7));
        graph.set_position(child, Vec3::new(1.0, 1.0, 1.0));

        assert!(graph.attach_child(parent, child, true));
        assert_relative_eq!(graph.world_position(child).unwrap(), Vec3::new(1.0, 1.0, 1.0), epsilon = 1e-5);

        let other = graph.create_node("other");
        assert!(graph.attach_child(parent, other, false));
        assert_relative_eq!(graph.world_position(other).unwrap(), Vec3::new(0.0, 3.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_reparent_emits_parent_event() {
        let mut graph = SceneGraph::with_journal();
        let a = graph.create_node("a");
        let b = graph.create_node("b");
        let child = graph.create_child(a, "child");
        graph.drain_changes();

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        graph.add_event_handler(child, move |_: NodeId, event: &NodeEvent| {
            sink.lock().unwrap().push(*event);
        });

        assert!(graph.attach_child(b, child, false));

        let events = seen.lock().unwrap().clone();
        assert!(events.contains(&NodeEvent::ParentChanged { old: Some(a), new: Some(b) }));
        assert_eq!(events.iter().filter(|e| **e == NodeEvent::TransformChanged).count(), 1);
        assert!(graph.node(a).unwrap().children().is_empty());
        assert!(graph.drain_changes().contains(&SceneChange::Parent(child)));
    }

    #[test]
    fn test_destroy_orphans_children() {
        let mut graph = SceneGraph::with_journal();
        let root = graph.create_node("root");
        let middle = graph.create_child(root, "middle");
        let leaf = graph.create_child(middle, "leaf");
        graph.set_position(leaf, Vec3::new(1.0, 2.0, 3.0));

        assert!(graph.destroy_node(middle));
        assert!(!graph.contains(middle));
        assert!(!graph.destroy_node(middle));

        let leaf_node = graph.node(leaf).unwrap();
        assert_eq!(leaf_node.parent(), None);
        assert_eq!(leaf_node.position(), Vec3::new(1.0, 2.0, 3.0));
        assert!(graph.node(root).unwrap().children().is_empty());
        assert!(graph
            .drain_changes()
            .iter()
            .any(|c| matches!(c, SceneChange::Destroyed { node, .. } if *node == middle)));
    }

    #[test]
    fn test_remove_event_handler() {
        let mut graph = SceneGraph::new();
        let node = graph.create_node("node");
        let count = Arc::new(AtomicUsize::new(0));
        let handle = count.clone();
        let id = graph
            .add_event_handler(node, move |_: NodeId, _: &NodeEvent| {
                handle.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        graph.set_position(node, Vec3::x());
        assert!(graph.remove_event_handler(node, id));
        assert!(!graph.remove_event_handler(node, id));
        graph.set_position(node, Vec3::y());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_look_at_points_forward_axis() {
        let mut graph = SceneGraph::new();
        let camera = graph.create_node("camera");
        graph.set_position(camera, Vec3::new(0.0, 0.0, 5.0));
        graph.look_at(camera, Vec3::zeros(), Vec3::y());

        let forward = graph.world_transform(camera).unwrap().forward();
        assert_relative_eq!(forward, Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-5);
    }
}
