//! Chunked binary serialization
//!
//! Persisted state is written as a stream of versioned chunks so that a
//! reader can skip anything it does not understand. [`chunk`] handles the
//! framing, [`registry`] the per-version dispatch and [`formats`] the
//! payloads the engine itself persists.

pub mod chunk;
pub mod formats;
pub mod registry;

pub use chunk::{
    chunk_id, ChunkError, ChunkHeader, ChunkReader, ChunkResult, ChunkWriter, PayloadReader, PayloadWriter,
    HEADER_SIZE,
};
pub use formats::{animation_state_registry, geometry_registry, write_animation_state, write_geometry};
pub use registry::{ChunkHandler, ChunkRegistry, ReadReport};
