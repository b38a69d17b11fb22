//! Bone hierarchy
//!
//! Bones live in a flat table ([`BoneTree`]) and refer to each other by
//! [`BoneId`]. A parent is always added before its children, so walking
//! the table in order visits parents first.

use crate::foundation::math::{Mat4, Quat, Transform, Vec3};

/// Index of a bone within its [`BoneTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoneId(pub usize);

/// Influence of a bone on one vertex of one mesh
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexWeight {
    /// Mesh index within the model
    pub mesh: usize,
    /// Vertex index within the mesh
    pub vertex: u32,
    /// Influence weight
    pub weight: f32,
}

/// A single bone
#[derive(Debug, Clone)]
pub struct Bone {
    /// Bone name, matched against animation channels
    pub name: String,
    parent: Option<BoneId>,
    children: Vec<BoneId>,
    /// Local position relative to the parent bone
    pub position: Vec3,
    /// Local rotation relative to the parent bone
    pub rotation: Quat,
    /// Local scale
    pub scale: Vec3,
    offset: Mat4,
    /// Vertices this bone influences
    pub weights: Vec<VertexWeight>,
}

impl Bone {
    /// Create an unlinked bone with an identity local transform
    pub fn new(name: impl Into<String>, offset: Mat4) -> Self {
        Self {
            name: name.into(),
            parent: None,
            children: Vec::new(),
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
            offset,
            weights: Vec::new(),
        }
    }

    /// Builder-style local transform
    pub fn with_local(mut self, transform: Transform) -> Self {
        self.position = transform.position;
        self.rotation = transform.rotation;
        self.scale = transform.scale;
        self
    }

    /// Builder-style vertex weights
    pub fn with_weights(mut self, weights: Vec<VertexWeight>) -> Self {
        self.weights = weights;
        self
    }

    /// Copy of this bone without parent or child links
    pub fn detached_copy(&self) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            ..self.clone()
        }
    }

    /// Parent bone
    pub fn parent(&self) -> Option<BoneId> {
        self.parent
    }

    /// Child bones
    pub fn children(&self) -> &[BoneId] {
        &self.children
    }

    /// Inverse bind-pose matrix, fixed at import
    pub fn offset(&self) -> &Mat4 {
        &self.offset
    }

    /// Local transform matrix
    pub fn local_matrix(&self) -> Mat4 {
        Transform::new(self.position, self.rotation, self.scale).to_matrix()
    }
}

/// Flat table of bones forming one or more trees
#[derive(Debug, Clone, Default)]
pub struct BoneTree {
    bones: Vec<Bone>,
}

impl BoneTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bone under `parent` (or as a root).
    ///
    /// Returns `None` when `parent` does not exist yet.
    pub fn add_bone(&mut self, bone: Bone, parent: Option<BoneId>) -> Option<BoneId> {
        if parent.is_some_and(|p| p.0 >= self.bones.len()) {
            return None;
        }
        let id = BoneId(self.bones.len());
        let mut bone = bone.detached_copy();
        bone.parent = parent;
        self.bones.push(bone);
        if let Some(parent) = parent {
            self.bones[parent.0].children.push(id);
        }
        Some(id)
    }

    /// Number of bones
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    /// True if there are no bones
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    /// Borrow a bone
    pub fn get(&self, id: BoneId) -> Option<&Bone> {
        self.bones.get(id.0)
    }

    /// Mutably borrow a bone (links stay read-only)
    pub fn get_mut(&mut self, id: BoneId) -> Option<&mut Bone> {
        self.bones.get_mut(id.0)
    }

    /// Look a bone up by name
    pub fn find(&self, name: &str) -> Option<BoneId> {
        self.bones.iter().position(|b| b.name == name).map(BoneId)
    }

    /// Bones without a parent
    pub fn roots(&self) -> impl Iterator<Item = BoneId> + '_ {
        self.bones.iter().enumerate().filter(|(_, b)| b.parent.is_none()).map(|(i, _)| BoneId(i))
    }

    /// Iterate over bones in parent-first order
    pub fn iter(&self) -> impl Iterator<Item = (BoneId, &Bone)> {
        self.bones.iter().enumerate().map(|(i, b)| (BoneId(i), b))
    }

    /// Independent copy for a model instance: bones are copied unlinked and
    /// the parent/child links are rebuilt from this tree
    pub fn instantiate(&self) -> BoneTree {
        let mut copy = BoneTree { bones: self.bones.iter().map(Bone::detached_copy).collect() };
        for (index, bone) in self.bones.iter().enumerate() {
            copy.bones[index].parent = bone.parent;
            copy.bones[index].children.clone_from(&bone.children);
        }
        copy
    }

    /// Model-space transform of every bone
    pub fn global_transforms(&self) -> Vec<Mat4> {
        let mut globals: Vec<Mat4> = Vec::with_capacity(self.bones.len());
        for bone in &self.bones {
            let local = bone.local_matrix();
            let global = match bone.parent {
                Some(parent) => globals[parent.0] * local,
                None => local,
            };
            globals.push(global);
        }
        globals
    }

    /// Skinning matrices: global transform times offset matrix
    pub fn palette(&self) -> Vec<Mat4> {
        self.global_transforms()
            .into_iter()
            .zip(&self.bones)
            .map(|(global, bone)| global * bone.offset)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_bone_arm() -> BoneTree {
        let mut tree = BoneTree::new();
        let shoulder = tree
            .add_bone(Bone::new("shoulder", Mat4::identity()), None)
            .unwrap();
        let elbow_bind = Mat4::new_translation(&Vec3::new(0.0, 1.0, 0.0));
        tree.add_bone(
            Bone::new("elbow", elbow_bind.try_inverse().unwrap())
                .with_local(Transform::from_position(Vec3::new(0.0, 1.0, 0.0))),
            Some(shoulder),
        )
        .unwrap();
        tree
    }

    #[test]
    fn test_bind_pose_palette_is_identity() {
        let tree = two_bone_arm();
        for matrix in tree.palette() {
            assert_relative_eq!(matrix, Mat4::identity(), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_add_bone_rejects_missing_parent() {
        let mut tree = BoneTree::new();
        assert!(tree.add_bone(Bone::new("orphan", Mat4::identity()), Some(BoneId(3))).is_none());
    }

    #[test]
    fn test_detached_copy_has_no_links() {
        let tree = two_bone_arm();
        let elbow = tree.get(tree.find("elbow").unwrap()).unwrap();
        assert!(elbow.parent().is_some());
        let copy = elbow.detached_copy();
        assert!(copy.parent().is_none());
        assert!(copy.children().is_empty());
        assert_eq!(copy.offset(), elbow.offset());
    }

    #[test]
    fn test_instantiate_is_independent() {
        let tree = two_bone_arm();
        let mut instance = tree.instantiate();
        let shoulder = instance.find("shoulder").unwrap();
        assert_eq!(instance.get(shoulder).unwrap().children(), &[BoneId(1)]);

        instance.get_mut(shoulder).unwrap().rotation =
            Quat::from_axis_angle(&Vec3::z_axis(), std::f32::consts::FRAC_PI_2);
        // Original untouched
        assert_eq!(tree.get(shoulder).unwrap().rotation, Quat::identity());

        // Elbow follows the rotated shoulder
        let globals = instance.global_transforms();
        let elbow_origin = globals[1].transform_point(&crate::foundation::math::Point3::origin());
        assert_relative_eq!(elbow_origin.coords, Vec3::new(-1.0, 0.0, 0.0), epsilon = 1e-5);
    }
}
