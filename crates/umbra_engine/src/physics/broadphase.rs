//! Broad-phase collision structure
//!
//! The renderer only consumes the broad-phase through [`BroadPhase`]:
//! proxies are registered with a group/mask pair, kept up to date with
//! [`BroadPhase::update_aabb`], and queried with rays, boxes or frusta.
//!
//! [`DbvtBroadPhase`] keeps two dynamic AABB trees, one for movable proxies
//! and one for static ones, mirroring the usual "active / static" split.

use slotmap::{new_key_type, SlotMap};

use crate::foundation::math::Vec3;
use crate::spatial::{AabbTree, LeafId, Plane, AABB};

use super::collision_layers::CollisionGroups;

new_key_type! {
    /// Handle to a broad-phase proxy
    pub struct ProxyId;
}

/// Which tree a proxy lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    /// Proxies expected to move every few frames
    Dynamic,
    /// Proxies that rarely or never move
    Static,
}

/// Description of a proxy to register
#[derive(Debug, Clone, Copy)]
pub struct CollisionObject {
    /// World-space bounds
    pub aabb: AABB,
    /// Target partition
    pub partition: Partition,
}

impl CollisionObject {
    /// A movable object
    pub fn dynamic(aabb: AABB) -> Self {
        Self { aabb, partition: Partition::Dynamic }
    }

    /// A static object
    pub fn fixed(aabb: AABB) -> Self {
        Self { aabb, partition: Partition::Static }
    }
}

/// Result of a ray test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Proxy that was hit
    pub proxy: ProxyId,
    /// Hit fraction along the tested segment, in [0, 1]
    pub fraction: f32,
}

/// Broad-phase oracle consumed by the scene and the visibility processor
pub trait BroadPhase: Send {
    /// Register a proxy
    fn add_collision_object(
        &mut self,
        object: CollisionObject,
        group: CollisionGroups,
        mask: CollisionGroups,
    ) -> ProxyId;

    /// Unregister a proxy; returns `false` for unknown ids
    fn remove_collision_object(&mut self, id: ProxyId) -> bool;

    /// Move a proxy; returns `false` for unknown ids
    fn update_aabb(&mut self, id: ProxyId, aabb: AABB) -> bool;

    /// Move a proxy to the other partition
    fn set_partition(&mut self, id: ProxyId, partition: Partition) -> bool;

    /// Current bounds of a proxy
    fn proxy_aabb(&self, id: ProxyId) -> Option<AABB>;

    /// Number of registered proxies
    fn proxy_count(&self) -> usize;

    /// All proxies hit by the segment `from -> to` whose group passes `mask`,
    /// sorted by hit fraction
    fn ray_test(&self, from: Vec3, to: Vec3, mask: CollisionGroups) -> Vec<RayHit>;

    /// Proxies overlapping `id` that pass the mutual group/mask filter
    fn contact_test(&self, id: ProxyId) -> Vec<ProxyId>;

    /// Proxies overlapping `aabb` whose group passes `mask`
    fn query_aabb(&self, aabb: &AABB, mask: CollisionGroups) -> Vec<ProxyId>;

    /// Ordered frustum traversal over both partitions.
    ///
    /// `planes` face inward; within each partition, subtrees are visited in
    /// ascending order along `sort_axis`.
    fn frustum_traversal(
        &self,
        planes: &[Plane; 6],
        sort_axis: Vec3,
        mask: CollisionGroups,
        visit: &mut dyn FnMut(ProxyId),
    );
}

#[derive(Debug)]
struct ProxyRecord {
    partition: Partition,
    leaf: LeafId,
    group: CollisionGroups,
    mask: CollisionGroups,
}

/// Two-tree dynamic bounding volume broad-phase
#[derive(Debug)]
pub struct DbvtBroadPhase {
    proxies: SlotMap<ProxyId, ProxyRecord>,
    dynamic_tree: AabbTree<ProxyId>,
    static_tree: AabbTree<ProxyId>,
}

impl Default for DbvtBroadPhase {
    fn default() -> Self {
        Self::new()
    }
}

impl DbvtBroadPhase {
    /// Create an empty broad-phase with the default fat margin
    pub fn new() -> Self {
        Self::with_margin(0.1)
    }

    /// Create an empty broad-phase inflating dynamic leaves by `margin`
    pub fn with_margin(margin: f32) -> Self {
        Self {
            proxies: SlotMap::with_key(),
            dynamic_tree: AabbTree::new(margin),
            static_tree: AabbTree::new(0.0),
        }
    }

    fn tree(&self, partition: Partition) -> &AabbTree<ProxyId> {
        match partition {
            Partition::Dynamic => &self.dynamic_tree,
            Partition::Static => &self.static_tree,
        }
    }

    fn tree_mut(&mut self, partition: Partition) -> &mut AabbTree<ProxyId> {
        match partition {
            Partition::Dynamic => &mut self.dynamic_tree,
            Partition::Static => &mut self.static_tree,
        }
    }

    fn trees(&self) -> [&AabbTree<ProxyId>; 2] {
        [&self.dynamic_tree, &self.static_tree]
    }

    fn passes(&self, id: ProxyId, mask: CollisionGroups) -> bool {
        self.proxies.get(id).is_some_and(|proxy| proxy.group.passes(mask))
    }
}

impl BroadPhase for DbvtBroadPhase {
    fn add_collision_object(
        &mut self,
        object: CollisionObject,
        group: CollisionGroups,
        mask: CollisionGroups,
    ) -> ProxyId {
        let partition = object.partition;
        let tree = match partition {
            Partition::Dynamic => &mut self.dynamic_tree,
            Partition::Static => &mut self.static_tree,
        };
        let id = self.proxies.insert_with_key(|id| ProxyRecord {
            partition,
            leaf: tree.insert(object.aabb, id),
            group,
            mask,
        });
        log::trace!("Added broad-phase proxy {:?} ({:?}, {:?})", id, partition, group);
        id
    }

    fn remove_collision_object(&mut self, id: ProxyId) -> bool {
        let Some(record) = self.proxies.remove(id) else {
            return false;
        };
        self.tree_mut(record.partition).remove(record.leaf).is_some()
    }

    fn update_aabb(&mut self, id: ProxyId, aabb: AABB) -> bool {
        let Some((partition, leaf)) = self.proxies.get(id).map(|p| (p.partition, p.leaf)) else {
            return false;
        };
        self.tree_mut(partition).update(leaf, aabb);
        true
    }

    fn set_partition(&mut self, id: ProxyId, partition: Partition) -> bool {
        let Some((current, leaf)) = self.proxies.get(id).map(|p| (p.partition, p.leaf)) else {
            return false;
        };
        if current == partition {
            return true;
        }
        let Some(aabb) = self.tree(current).leaf_aabb(leaf) else {
            return false;
        };
        self.tree_mut(current).remove(leaf);
        let new_leaf = self.tree_mut(partition).insert(aabb, id);
        if let Some(record) = self.proxies.get_mut(id) {
            record.partition = partition;
            record.leaf = new_leaf;
        }
        true
    }

    fn proxy_aabb(&self, id: ProxyId) -> Option<AABB> {
        let record = self.proxies.get(id)?;
        self.tree(record.partition).leaf_aabb(record.leaf)
    }

    fn proxy_count(&self) -> usize {
        self.proxies.len()
    }

    fn ray_test(&self, from: Vec3, to: Vec3, mask: CollisionGroups) -> Vec<RayHit> {
        let mut hits = Vec::new();
        for tree in self.trees() {
            tree.ray_cast(from, to, |_, &proxy, fraction| {
                if self.passes(proxy, mask) {
                    hits.push(RayHit { proxy, fraction });
                }
            });
        }
        hits.sort_by(|a, b| a.fraction.total_cmp(&b.fraction));
        hits
    }

    fn contact_test(&self, id: ProxyId) -> Vec<ProxyId> {
        let Some(record) = self.proxies.get(id) else {
            return Vec::new();
        };
        let Some(aabb) = self.tree(record.partition).leaf_aabb(record.leaf) else {
            return Vec::new();
        };
        let mut contacts = Vec::new();
        for tree in self.trees() {
            tree.query_aabb(&aabb, |_, &other| {
                if other == id {
                    return;
                }
                let Some(other_record) = self.proxies.get(other) else {
                    return;
                };
                if CollisionGroups::should_collide(
                    record.group, record.mask,
                    other_record.group, other_record.mask,
                ) {
                    contacts.push(other);
                }
            });
        }
        contacts
    }

    fn query_aabb(&self, aabb: &AABB, mask: CollisionGroups) -> Vec<ProxyId> {
        let mut found = Vec::new();
        for tree in self.trees() {
            tree.query_aabb(aabb, |_, &proxy| {
                if self.passes(proxy, mask) {
                    found.push(proxy);
                }
            });
        }
        found
    }

    fn frustum_traversal(
        &self,
        planes: &[Plane; 6],
        sort_axis: Vec3,
        mask: CollisionGroups,
        visit: &mut dyn FnMut(ProxyId),
    ) {
        for tree in self.trees() {
            tree.cull_ordered(planes, sort_axis, |_, &proxy| {
                if self.passes(proxy, mask) {
                    visit(proxy);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Mat4, Mat4Ext};
    use crate::spatial::Frustum;

    fn cube(center: Vec3) -> AABB {
        AABB::from_center_extents(center, Vec3::repeat(0.5))
    }

    #[test]
    fn test_add_update_remove() {
        let mut broadphase = DbvtBroadPhase::new();
        let id = broadphase.add_collision_object(
            CollisionObject::dynamic(cube(Vec3::zeros())),
            CollisionGroups::MODEL,
            CollisionGroups::all(),
        );
        assert_eq!(broadphase.proxy_count(), 1);
        assert_eq!(broadphase.proxy_aabb(id), Some(cube(Vec3::zeros())));

        assert!(broadphase.update_aabb(id, cube(Vec3::new(5.0, 0.0, 0.0))));
        let found = broadphase.query_aabb(&cube(Vec3::new(5.0, 0.0, 0.0)), CollisionGroups::all());
        assert_eq!(found, vec![id]);

        assert!(broadphase.remove_collision_object(id));
        assert!(!broadphase.remove_collision_object(id));
        assert!(!broadphase.update_aabb(id, cube(Vec3::zeros())));
        assert_eq!(broadphase.proxy_count(), 0);
    }

    #[test]
    fn test_ray_test_sorted_and_filtered() {
        let mut broadphase = DbvtBroadPhase::new();
        let far = broadphase.add_collision_object(
            CollisionObject::fixed(cube(Vec3::new(0.0, 0.0, -8.0))),
            CollisionGroups::MODEL,
            CollisionGroups::all(),
        );
        let near = broadphase.add_collision_object(
            CollisionObject::dynamic(cube(Vec3::new(0.0, 0.0, -3.0))),
            CollisionGroups::MODEL,
            CollisionGroups::all(),
        );
        broadphase.add_collision_object(
            CollisionObject::dynamic(cube(Vec3::new(0.0, 0.0, -5.0))),
            CollisionGroups::TRIGGER,
            CollisionGroups::all(),
        );

        let hits = broadphase.ray_test(Vec3::zeros(), Vec3::new(0.0, 0.0, -10.0), CollisionGroups::MODEL);
        let order: Vec<_> = hits.iter().map(|h| h.proxy).collect();
        assert_eq!(order, vec![near, far]);
    }

    #[test]
    fn test_contact_test_respects_masks() {
        let mut broadphase = DbvtBroadPhase::new();
        let a = broadphase.add_collision_object(
            CollisionObject::dynamic(cube(Vec3::zeros())),
            CollisionGroups::MODEL,
            CollisionGroups::LIGHT,
        );
        let light = broadphase.add_collision_object(
            CollisionObject::dynamic(cube(Vec3::new(0.5, 0.0, 0.0))),
            CollisionGroups::LIGHT,
            CollisionGroups::MODEL,
        );
        broadphase.add_collision_object(
            CollisionObject::fixed(cube(Vec3::new(0.0, 0.5, 0.0))),
            CollisionGroups::STATIC,
            CollisionGroups::all(),
        );

        assert_eq!(broadphase.contact_test(a), vec![light]);
    }

    #[test]
    fn test_frustum_traversal_covers_both_partitions() {
        let mut broadphase = DbvtBroadPhase::new();
        let moving = broadphase.add_collision_object(
            CollisionObject::dynamic(cube(Vec3::new(0.0, 0.0, -5.0))),
            CollisionGroups::MODEL,
            CollisionGroups::all(),
        );
        let fixed = broadphase.add_collision_object(
            CollisionObject::fixed(cube(Vec3::new(1.0, 0.0, -6.0))),
            CollisionGroups::MODEL,
            CollisionGroups::all(),
        );
        broadphase.add_collision_object(
            CollisionObject::fixed(cube(Vec3::new(0.0, 0.0, 6.0))),
            CollisionGroups::MODEL,
            CollisionGroups::all(),
        );

        let projection = Mat4::perspective(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 50.0);
        let view = Mat4::look_at(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0), Vec3::y());
        let frustum = Frustum::from_matrix(&(projection * view));

        let mut visited = Vec::new();
        broadphase.frustum_traversal(
            &frustum.planes,
            Vec3::new(0.0, 0.0, -1.0),
            CollisionGroups::VISIBLE,
            &mut |proxy| visited.push(proxy),
        );
        assert_eq!(visited, vec![moving, fixed]);
    }

    #[test]
    fn test_set_partition_moves_proxy() {
        let mut broadphase = DbvtBroadPhase::new();
        let id = broadphase.add_collision_object(
            CollisionObject::dynamic(cube(Vec3::zeros())),
            CollisionGroups::MODEL,
            CollisionGroups::all(),
        );
        assert!(broadphase.set_partition(id, Partition::Static));
        assert_eq!(broadphase.proxy_aabb(id), Some(cube(Vec3::zeros())));
        assert_eq!(broadphase.query_aabb(&cube(Vec3::zeros()), CollisionGroups::all()), vec![id]);
    }
}
