//! Dynamic bounding volume hierarchy
//!
//! Incremental AABB tree used by the broad-phase. Leaves store a "fat" box
//! (the tight box inflated by a margin) so small movements do not require
//! re-insertion; queries still test the tight box at the leaves.
//!
//! Nodes live in a `Vec` arena with an intrusive free list, and parent/child
//! links are indices, so there are no reference cycles to manage.

use crate::foundation::math::Vec3;

use super::bounds::{classify_aabb, Containment, Plane, AABB};

/// Handle to a leaf in an [`AabbTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeafId(usize);

#[derive(Debug)]
enum NodeKind<T> {
    Leaf { data: T, tight: AABB },
    Internal { children: [usize; 2] },
    Free { next: Option<usize> },
}

#[derive(Debug)]
struct Node<T> {
    aabb: AABB,
    parent: Option<usize>,
    kind: NodeKind<T>,
}

/// Dynamic AABB tree with surface-area insertion heuristic
#[derive(Debug)]
pub struct AabbTree<T> {
    nodes: Vec<Node<T>>,
    root: Option<usize>,
    free_head: Option<usize>,
    margin: f32,
    leaf_count: usize,
}

impl<T> Default for AabbTree<T> {
    fn default() -> Self {
        Self::new(0.1)
    }
}

impl<T> AabbTree<T> {
    /// Create an empty tree; `margin` is how far leaf boxes are inflated
    pub fn new(margin: f32) -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            free_head: None,
            margin: margin.max(0.0),
            leaf_count: 0,
        }
    }

    /// Number of leaves
    pub fn len(&self) -> usize {
        self.leaf_count
    }

    /// True if the tree has no leaves
    pub fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }

    /// Remove every leaf
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
        self.free_head = None;
        self.leaf_count = 0;
    }

    /// Insert a leaf and return its handle
    pub fn insert(&mut self, aabb: AABB, data: T) -> LeafId {
        let leaf = self.allocate(Node {
            aabb: aabb.inflated(self.margin),
            parent: None,
            kind: NodeKind::Leaf { data, tight: aabb },
        });
        self.insert_leaf(leaf);
        self.leaf_count += 1;
        LeafId(leaf)
    }

    /// Remove a leaf, returning its payload
    pub fn remove(&mut self, id: LeafId) -> Option<T> {
        if !self.is_leaf(id.0) {
            return None;
        }
        self.remove_leaf(id.0);
        self.leaf_count -= 1;
        match self.release(id.0) {
            NodeKind::Leaf { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Move a leaf to a new box.
    ///
    /// Returns `true` when the leaf had to be re-inserted because the new box
    /// escaped its fat margin; `false` for an in-place update or a stale id.
    pub fn update(&mut self, id: LeafId, aabb: AABB) -> bool {
        let Some(node) = self.nodes.get_mut(id.0) else {
            return false;
        };
        let NodeKind::Leaf { tight, .. } = &mut node.kind else {
            return false;
        };
        *tight = aabb;
        if node.aabb.contains(&aabb) {
            return false;
        }

        self.remove_leaf(id.0);
        self.nodes[id.0].aabb = aabb.inflated(self.margin);
        self.insert_leaf(id.0);
        true
    }

    /// Payload of a leaf
    pub fn get(&self, id: LeafId) -> Option<&T> {
        match &self.nodes.get(id.0)?.kind {
            NodeKind::Leaf { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Tight box of a leaf
    pub fn leaf_aabb(&self, id: LeafId) -> Option<AABB> {
        match &self.nodes.get(id.0)?.kind {
            NodeKind::Leaf { tight, .. } => Some(*tight),
            _ => None,
        }
    }

    /// Box of the whole tree
    pub fn root_aabb(&self) -> Option<AABB> {
        self.root.map(|root| self.nodes[root].aabb)
    }

    /// Visit every leaf whose tight box overlaps `aabb`
    pub fn query_aabb(&self, aabb: &AABB, mut visit: impl FnMut(LeafId, &T)) {
        let mut stack: Vec<usize> = self.root.into_iter().collect();
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !node.aabb.intersects(aabb) {
                continue;
            }
            match &node.kind {
                NodeKind::Leaf { data, tight } => {
                    if tight.intersects(aabb) {
                        visit(LeafId(index), data);
                    }
                }
                NodeKind::Internal { children } => stack.extend_from_slice(children),
                NodeKind::Free { .. } => {}
            }
        }
    }

    /// Visit every leaf hit by the segment `from -> to`, passing the hit
    /// fraction along the segment (0 at `from`, 1 at `to`)
    pub fn ray_cast(&self, from: Vec3, to: Vec3, mut visit: impl FnMut(LeafId, &T, f32)) {
        let direction = to - from;
        let mut stack: Vec<usize> = self.root.into_iter().collect();
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            match node.aabb.intersect_ray(from, direction) {
                Some(t) if t <= 1.0 => {}
                _ => continue,
            }
            match &node.kind {
                NodeKind::Leaf { data, tight } => {
                    if let Some(t) = tight.intersect_ray(from, direction).filter(|t| *t <= 1.0) {
                        visit(LeafId(index), data, t);
                    }
                }
                NodeKind::Internal { children } => stack.extend_from_slice(children),
                NodeKind::Free { .. } => {}
            }
        }
    }

    /// Frustum traversal with near-to-far ordering.
    ///
    /// Subtrees entirely outside any plane are rejected without descending;
    /// subtrees entirely inside skip further plane tests. Children are visited
    /// in ascending order of their center projected on `sort_axis`.
    pub fn cull_ordered(&self, planes: &[Plane], sort_axis: Vec3, mut visit: impl FnMut(LeafId, &T)) {
        let mut stack: Vec<(usize, bool)> = self.root.map(|root| (root, false)).into_iter().collect();
        while let Some((index, inside)) = stack.pop() {
            let node = &self.nodes[index];
            let inside = inside || match classify_aabb(planes, &node.aabb) {
                Containment::Outside => continue,
                Containment::Inside => true,
                Containment::Intersecting => false,
            };
            match &node.kind {
                NodeKind::Leaf { data, tight } => {
                    if inside || classify_aabb(planes, tight) != Containment::Outside {
                        visit(LeafId(index), data);
                    }
                }
                NodeKind::Internal { children: [a, b] } => {
                    let depth = |child: usize| self.nodes[child].aabb.center().dot(&sort_axis);
                    let (near, far) = if depth(*a) <= depth(*b) { (*a, *b) } else { (*b, *a) };
                    // Far is pushed first so near is popped first
                    stack.push((far, inside));
                    stack.push((near, inside));
                }
                NodeKind::Free { .. } => {}
            }
        }
    }

    /// Visit every leaf in unspecified order
    pub fn for_each(&self, mut visit: impl FnMut(LeafId, &T)) {
        for (index, node) in self.nodes.iter().enumerate() {
            if let NodeKind::Leaf { data, .. } = &node.kind {
                visit(LeafId(index), data);
            }
        }
    }

    /// Height of the tree (0 when empty)
    pub fn height(&self) -> usize {
        fn height_of<T>(tree: &AabbTree<T>, index: usize) -> usize {
            match &tree.nodes[index].kind {
                NodeKind::Internal { children: [a, b] } => {
                    1 + height_of(tree, *a).max(height_of(tree, *b))
                }
                _ => 1,
            }
        }
        self.root.map_or(0, |root| height_of(self, root))
    }

    fn is_leaf(&self, index: usize) -> bool {
        matches!(self.nodes.get(index).map(|n| &n.kind), Some(NodeKind::Leaf { .. }))
    }

    fn allocate(&mut self, node: Node<T>) -> usize {
        if let Some(index) = self.free_head {
            self.free_head = match self.nodes[index].kind {
                NodeKind::Free { next } => next,
                _ => None,
            };
            self.nodes[index] = node;
            index
        } else {
            self.nodes.push(node);
            self.nodes.len() - 1
        }
    }

    fn release(&mut self, index: usize) -> NodeKind<T> {
        let node = &mut self.nodes[index];
        node.parent = None;
        let kind = std::mem::replace(&mut node.kind, NodeKind::Free { next: self.free_head });
        self.free_head = Some(index);
        kind
    }

    fn children(&self, index: usize) -> Option<[usize; 2]> {
        match self.nodes[index].kind {
            NodeKind::Internal { children } => Some(children),
            _ => None,
        }
    }

    fn insert_leaf(&mut self, leaf: usize) {
        let Some(root) = self.root else {
            self.nodes[leaf].parent = None;
            self.root = Some(leaf);
            return;
        };

        let leaf_aabb = self.nodes[leaf].aabb;

        // Descend towards the cheapest sibling
        let mut index = root;
        while let Some([a, b]) = self.children(index) {
            let area = self.nodes[index].aabb.surface_area();
            let combined = self.nodes[index].aabb.union(&leaf_aabb).surface_area();
            let cost = 2.0 * combined;
            let inheritance = 2.0 * (combined - area);

            let child_cost = |child: usize| {
                let child_aabb = self.nodes[child].aabb;
                let union_area = child_aabb.union(&leaf_aabb).surface_area();
                if self.children(child).is_some() {
                    union_area - child_aabb.surface_area() + inheritance
                } else {
                    union_area + inheritance
                }
            };
            let (cost_a, cost_b) = (child_cost(a), child_cost(b));
            if cost < cost_a && cost < cost_b {
                break;
            }
            index = if cost_a < cost_b { a } else { b };
        }

        let sibling = index;
        let old_parent = self.nodes[sibling].parent;
        let new_parent = self.allocate(Node {
            aabb: self.nodes[sibling].aabb.union(&leaf_aabb),
            parent: old_parent,
            kind: NodeKind::Internal { children: [sibling, leaf] },
        });
        self.nodes[sibling].parent = Some(new_parent);
        self.nodes[leaf].parent = Some(new_parent);

        match old_parent {
            Some(parent) => {
                if let NodeKind::Internal { children } = &mut self.nodes[parent].kind {
                    let slot = usize::from(children[0] != sibling);
                    children[slot] = new_parent;
                }
            }
            None => self.root = Some(new_parent),
        }

        self.refit_from(self.nodes[leaf].parent);
    }

    fn remove_leaf(&mut self, leaf: usize) {
        if self.root == Some(leaf) {
            self.root = None;
            return;
        }
        let Some(parent) = self.nodes[leaf].parent else {
            return;
        };
        let Some(children) = self.children(parent) else {
            return;
        };
        let sibling = if children[0] == leaf { children[1] } else { children[0] };
        let grandparent = self.nodes[parent].parent;

        match grandparent {
            Some(grandparent) => {
                if let NodeKind::Internal { children } = &mut self.nodes[grandparent].kind {
                    let slot = usize::from(children[0] != parent);
                    children[slot] = sibling;
                }
                self.nodes[sibling].parent = Some(grandparent);
                self.release(parent);
                self.refit_from(Some(grandparent));
            }
            None => {
                self.root = Some(sibling);
                self.nodes[sibling].parent = None;
                self.release(parent);
            }
        }
        self.nodes[leaf].parent = None;
    }

    fn refit_from(&mut self, mut index: Option<usize>) {
        while let Some(current) = index {
            if let Some([a, b]) = self.children(current) {
                self.nodes[current].aabb = self.nodes[a].aabb.union(&self.nodes[b].aabb);
            }
            index = self.nodes[current].parent;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Mat4, Mat4Ext};
    use crate::spatial::bounds::Frustum;

    fn unit_box_at(x: f32, y: f32, z: f32) -> AABB {
        AABB::from_center_extents(Vec3::new(x, y, z), Vec3::repeat(0.5))
    }

    #[test]
    fn test_insert_query_remove() {
        let mut tree = AabbTree::new(0.1);
        let ids: Vec<_> = (0..20).map(|i| tree.insert(unit_box_at(i as f32 * 3.0, 0.0, 0.0), i)).collect();
        assert_eq!(tree.len(), 20);

        let mut hits = Vec::new();
        tree.query_aabb(&AABB::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(4.0, 1.0, 1.0)), |_, v| hits.push(*v));
        hits.sort_unstable();
        assert_eq!(hits, vec![0, 1]);

        assert_eq!(tree.remove(ids[1]), Some(1));
        assert_eq!(tree.remove(ids[1]), None);
        assert_eq!(tree.len(), 19);

        let mut hits = Vec::new();
        tree.query_aabb(&AABB::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(4.0, 1.0, 1.0)), |_, v| hits.push(*v));
        assert_eq!(hits, vec![0]);
    }

    #[test]
    fn test_query_matches_brute_force() {
        let mut tree = AabbTree::new(0.0);
        let boxes: Vec<AABB> = (0..256)
            .map(|i| unit_box_at((i % 16) as f32 * 2.0, (i / 16) as f32 * 2.0, 0.0))
            .collect();
        for (i, aabb) in boxes.iter().enumerate() {
            tree.insert(*aabb, i);
        }
        assert!(tree.height() > 1);

        let query = AABB::new(Vec3::new(3.0, 3.0, -1.0), Vec3::new(9.0, 7.0, 1.0));
        let mut hits = Vec::new();
        tree.query_aabb(&query, |_, v| hits.push(*v));
        hits.sort_unstable();

        let expected: Vec<usize> = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.intersects(&query))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(hits, expected);
    }

    #[test]
    fn test_update_within_margin_keeps_node() {
        let mut tree = AabbTree::new(1.0);
        let id = tree.insert(unit_box_at(0.0, 0.0, 0.0), "a");
        assert!(!tree.update(id, unit_box_at(0.2, 0.0, 0.0)));
        assert!(tree.update(id, unit_box_at(10.0, 0.0, 0.0)));
        assert_eq!(tree.leaf_aabb(id), Some(unit_box_at(10.0, 0.0, 0.0)));

        let mut hits = 0;
        tree.query_aabb(&unit_box_at(10.0, 0.0, 0.0), |_, _| hits += 1);
        assert_eq!(hits, 1);
    }

    #[test]
    fn test_ray_cast_reports_fraction() {
        let mut tree = AabbTree::new(0.1);
        tree.insert(unit_box_at(0.0, 0.0, -5.0), 'a');
        tree.insert(unit_box_at(0.0, 3.0, -5.0), 'b');

        let mut hits = Vec::new();
        tree.ray_cast(Vec3::zeros(), Vec3::new(0.0, 0.0, -10.0), |_, v, t| hits.push((*v, t)));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 'a');
        approx::assert_relative_eq!(hits[0].1, 0.45, epsilon = 1e-5);
    }

    #[test]
    fn test_cull_ordered_rejects_and_orders() {
        let projection = Mat4::perspective(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        let view = Mat4::look_at(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0), Vec3::y());
        let frustum = Frustum::from_matrix(&(projection * view));
        let forward = Vec3::new(0.0, 0.0, -1.0);

        let mut tree = AabbTree::new(0.0);
        for z in [30.0, 5.0, 15.0, 50.0, 10.0] {
            tree.insert(unit_box_at(0.0, 0.0, -z), z as i32);
        }
        // Behind the camera
        tree.insert(unit_box_at(0.0, 0.0, 10.0), -1);

        let mut visited = Vec::new();
        tree.cull_ordered(&frustum.planes, forward, |_, v| visited.push(*v));
        visited.sort_unstable();
        assert_eq!(visited, vec![5, 10, 15, 30, 50]);

        // Two siblings are visited near first regardless of insertion order
        let mut pair = AabbTree::new(0.0);
        pair.insert(unit_box_at(0.0, 0.0, -40.0), "far");
        pair.insert(unit_box_at(0.0, 0.0, -4.0), "near");
        let mut order = Vec::new();
        pair.cull_ordered(&frustum.planes, forward, |_, v| order.push(*v));
        assert_eq!(order, vec!["near", "far"]);
    }
}
