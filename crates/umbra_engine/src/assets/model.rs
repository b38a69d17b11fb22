//! Shared model definitions
//!
//! An importer hands over an [`ImportedModel`]: meshes in the fixed vertex
//! layout, a bone table and animation clips. [`ModelDefinition::from_import`]
//! turns it into an immutable, `Arc`-shared definition that any number of
//! [`Model`](crate::scene::components::Model) components instantiate.
//! Vertex arrays are uploaded on first use and released through the
//! garbage list when the definition is dropped.

use std::sync::{Arc, OnceLock};

use crate::animation::{build_skin_weights, AnimationClip, BoneTree, SkinWeights};
use crate::render::context::RenderContext;
use crate::render::device::{GpuResource, VertexArrayId, VertexData};
use crate::render::garbage::GarbageList;
use crate::spatial::AABB;

use super::material::MaterialDefinitionId;
use super::mesh::MeshData;

/// One mesh as produced by an importer
#[derive(Debug, Clone)]
pub struct ImportedMesh {
    /// Mesh name
    pub name: String,
    /// Geometry in the fixed vertex layout
    pub geometry: MeshData,
    /// Material the mesh is drawn with
    pub material: MaterialDefinitionId,
}

/// Importer output
#[derive(Debug, Clone, Default)]
pub struct ImportedModel {
    /// Model name
    pub name: String,
    /// Meshes in draw order
    pub meshes: Vec<ImportedMesh>,
    /// Bone table; weights refer to meshes by index
    pub bones: BoneTree,
    /// Animation clips
    pub animations: Vec<AnimationClip>,
}

#[derive(Debug)]
struct GpuMesh {
    vertex_array: VertexArrayId,
    garbage: Arc<GarbageList>,
}

impl Drop for GpuMesh {
    fn drop(&mut self) {
        self.garbage.mark_for_collection(GpuResource::VertexArray(self.vertex_array));
    }
}

/// Immutable mesh of a [`ModelDefinition`]
#[derive(Debug)]
pub struct MeshDefinition {
    /// Mesh name
    pub name: String,
    /// Base (bind pose) geometry
    pub geometry: MeshData,
    /// Material
    pub material: MaterialDefinitionId,
    /// Per-vertex bone influences, `None` for rigid meshes
    pub skin: Option<Vec<SkinWeights>>,
    bounds: Option<AABB>,
    gpu: OnceLock<GpuMesh>,
}

impl MeshDefinition {
    fn new(mesh: ImportedMesh, skin: Option<Vec<SkinWeights>>) -> Self {
        Self {
            bounds: mesh.geometry.bounds(),
            name: mesh.name,
            geometry: mesh.geometry,
            material: mesh.material,
            skin,
            gpu: OnceLock::new(),
        }
    }

    /// Bind-pose bounds in model space
    pub fn bounds(&self) -> Option<AABB> {
        self.bounds
    }

    /// True if any vertex is bone-weighted
    pub fn is_skinned(&self) -> bool {
        self.skin.is_some()
    }

    /// Vertex array holding the base geometry, uploaded on first call
    pub fn vertex_array(&self, ctx: &mut RenderContext) -> VertexArrayId {
        self.gpu
            .get_or_init(|| {
                let data = VertexData {
                    vertices: self.geometry.vertices.clone(),
                    indices: self.geometry.indices.clone(),
                    skin: self.skin.clone(),
                };
                log::debug!("Uploading mesh '{}' ({} vertices)", self.name, data.vertices.len());
                GpuMesh {
                    vertex_array: ctx.create_vertex_array(Some(data)),
                    garbage: Arc::clone(ctx.garbage()),
                }
            })
            .vertex_array
    }

    /// Vertex array if already uploaded
    pub fn uploaded_vertex_array(&self) -> Option<VertexArrayId> {
        self.gpu.get().map(|gpu| gpu.vertex_array)
    }
}

/// Shared model data
#[derive(Debug)]
pub struct ModelDefinition {
    /// Model name
    pub name: String,
    meshes: Vec<MeshDefinition>,
    bones: BoneTree,
    animations: Vec<AnimationClip>,
    bounds: Option<AABB>,
}

impl ModelDefinition {
    /// Build a definition from importer output.
    ///
    /// Skin weights are gathered per mesh from the bone table, keeping the
    /// four strongest influences per vertex.
    pub fn from_import(import: ImportedModel) -> Arc<Self> {
        let ImportedModel { name, meshes, bones, animations } = import;
        let meshes: Vec<MeshDefinition> = meshes
            .into_iter()
            .enumerate()
            .map(|(index, mesh)| {
                let skin = (!bones.is_empty())
                    .then(|| build_skin_weights(&bones, index, mesh.geometry.vertex_count()))
                    .filter(|weights| weights.iter().any(|w| !w.is_unweighted()));
                MeshDefinition::new(mesh, skin)
            })
            .collect();
        let bounds = meshes
            .iter()
            .filter_map(MeshDefinition::bounds)
            .reduce(|a, b| a.union(&b));
        log::debug!(
            "Model definition '{}': {} meshes, {} bones, {} clips",
            name,
            meshes.len(),
            bones.len(),
            animations.len()
        );
        Arc::new(Self { name, meshes, bones, animations, bounds })
    }

    /// Definition with one rigid mesh
    pub fn single_mesh(name: impl Into<String>, geometry: MeshData, material: MaterialDefinitionId) -> Arc<Self> {
        let name = name.into();
        Self::from_import(ImportedModel {
            meshes: vec![ImportedMesh { name: name.clone(), geometry, material }],
            name,
            ..ImportedModel::default()
        })
    }

    /// Meshes in draw order
    pub fn meshes(&self) -> &[MeshDefinition] {
        &self.meshes
    }

    /// Bind-pose bone table
    pub fn bones(&self) -> &BoneTree {
        &self.bones
    }

    /// Every clip
    pub fn animations(&self) -> &[AnimationClip] {
        &self.animations
    }

    /// Clip by name
    pub fn animation(&self, name: &str) -> Option<&AnimationClip> {
        self.animations.iter().find(|clip| clip.name == name)
    }

    /// Bind-pose bounds in model space
    pub fn bounds(&self) -> Option<AABB> {
        self.bounds
    }

    /// True if any mesh is bone-weighted
    pub fn is_skinned(&self) -> bool {
        self.meshes.iter().any(MeshDefinition::is_skinned)
    }
}
