//! Asset definitions
//!
//! Meshes, materials and model definitions as handed over by an importer.
//! Definitions are immutable and shared (`Arc`); scene components and the
//! renderer refer to them by id or by handle, never by copy.

pub mod material;
pub mod mesh;
pub mod model;

pub use material::{
    MaterialBlend, MaterialDefinition, MaterialDefinitionId, MaterialLibrary, MaterialLibraryListener, ShadingModel,
};
pub use mesh::{MeshData, Vertex, VertexAttributes};
pub use model::{ImportedMesh, ImportedModel, MeshDefinition, ModelDefinition};
