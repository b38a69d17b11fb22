//! Payload layouts for persisted engine state
//!
//! | id     | version | target           | payload                                          |
//! |--------|---------|------------------|--------------------------------------------------|
//! | `ANIM` | 1       | `AnimationState` | clip, time, playing, looping                     |
//! | `ANIM` | 2       | `AnimationState` | clip, time, speed, playing, paused, looping      |
//! | `GEOM` | 1       | `MeshData`       | attribute bits, vertices, indices                |
//!
//! Writers always emit the newest version.

use std::io::Write;

use crate::animation::AnimationState;
use crate::assets::mesh::{MeshData, Vertex, VertexAttributes};

use super::chunk::{chunk_id, ChunkError, ChunkResult, ChunkWriter, PayloadReader, PayloadWriter};
use super::registry::ChunkRegistry;

/// Animation playback state
pub const ANIMATION_STATE: u32 = chunk_id(b"ANIM");
/// Newest animation state layout
pub const ANIMATION_STATE_VERSION: u32 = 2;

/// Mesh geometry
pub const GEOMETRY: u32 = chunk_id(b"GEOM");
/// Newest geometry layout
pub const GEOMETRY_VERSION: u32 = 1;

// -------------------------------------------------------------------------
// Animation state

/// Append an animation state chunk
pub fn write_animation_state<W: Write>(writer: &mut ChunkWriter<W>, state: &AnimationState) -> ChunkResult<()> {
    let mut payload = PayloadWriter::new();
    payload
        .string(&state.clip)?
        .f32(state.time)
        .f32(state.speed)
        .bool(state.playing)
        .bool(state.paused)
        .bool(state.looping);
    writer.write_chunk(ANIMATION_STATE, ANIMATION_STATE_VERSION, &payload.into_bytes())
}

fn read_animation_state_v1(state: &mut AnimationState, bytes: &[u8]) -> ChunkResult<()> {
    let mut reader = PayloadReader::new(bytes);
    let clip = reader.string()?;
    let time = reader.f32()?;
    let playing = reader.bool()?;
    let looping = reader.bool()?;
    reader.finish()?;
    *state = AnimationState { clip, time, playing, looping, ..AnimationState::default() };
    Ok(())
}

fn read_animation_state_v2(state: &mut AnimationState, bytes: &[u8]) -> ChunkResult<()> {
    let mut reader = PayloadReader::new(bytes);
    let clip = reader.string()?;
    let time = reader.f32()?;
    let speed = reader.f32()?;
    let playing = reader.bool()?;
    let paused = reader.bool()?;
    let looping = reader.bool()?;
    reader.finish()?;
    *state = AnimationState { clip, time, speed, playing, paused, looping };
    Ok(())
}

/// Handlers for every animation state version
pub fn animation_state_registry() -> ChunkRegistry<AnimationState> {
    ChunkRegistry::new()
        .with(ANIMATION_STATE, 1, read_animation_state_v1)
        .with(ANIMATION_STATE, 2, read_animation_state_v2)
}

// -------------------------------------------------------------------------
// Geometry

/// Append a mesh geometry chunk
pub fn write_geometry<W: Write>(writer: &mut ChunkWriter<W>, mesh: &MeshData) -> ChunkResult<()> {
    let mut payload = PayloadWriter::new();
    payload
        .u32(u32::from(mesh.attributes.bits()))
        .pod_slice(&mesh.vertices)?
        .pod_slice(&mesh.indices)?;
    writer.write_chunk(GEOMETRY, GEOMETRY_VERSION, &payload.into_bytes())
}

fn read_geometry_v1(mesh: &mut MeshData, bytes: &[u8]) -> ChunkResult<()> {
    let mut reader = PayloadReader::new(bytes);
    let bits = reader.u32()?;
    let attributes = u8::try_from(bits)
        .ok()
        .and_then(VertexAttributes::from_bits)
        .ok_or_else(|| ChunkError::Malformed(format!("unknown vertex attribute bits {bits:#x}")))?;
    let vertices: Vec<Vertex> = reader.pod_vec()?;
    let indices: Vec<u32> = reader.pod_vec()?;
    reader.finish()?;

    let decoded = MeshData::new(vertices, indices, attributes);
    if !decoded.indices_valid() {
        return Err(ChunkError::Malformed("index out of vertex range".to_string()));
    }
    *mesh = decoded;
    Ok(())
}

/// Handlers for every geometry version
pub fn geometry_registry() -> ChunkRegistry<MeshData> {
    ChunkRegistry::new().with(GEOMETRY, 1, read_geometry_v1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::registry::ReadReport;

    fn single_chunk(id: u32, version: u32, payload: &[u8]) -> Vec<u8> {
        let mut writer = ChunkWriter::new(Vec::new());
        writer.write_chunk(id, version, payload).unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn test_animation_state_survives_a_save() {
        let mut saved = AnimationState::default();
        saved.play("run", false);
        saved.time = 0.75;
        saved.speed = 2.0;
        saved.pause();

        let mut writer = ChunkWriter::new(Vec::new());
        write_animation_state(&mut writer, &saved).unwrap();
        let bytes = writer.finish().unwrap();

        let mut loaded = AnimationState::default();
        let report = animation_state_registry().read_stream(&mut loaded, bytes.as_slice()).unwrap();
        assert!(report.is_complete());
        assert_eq!(loaded, saved);
    }

    #[test]
    fn test_version_one_defaults_new_fields() {
        let mut payload = PayloadWriter::new();
        payload.string("idle").unwrap().f32(0.5).bool(true).bool(true);
        let bytes = single_chunk(ANIMATION_STATE, 1, &payload.into_bytes());

        let mut loaded = AnimationState { speed: 3.0, paused: true, ..AnimationState::default() };
        animation_state_registry().read_stream(&mut loaded, bytes.as_slice()).unwrap();
        assert_eq!(loaded.clip, "idle");
        assert_eq!(loaded.time, 0.5);
        assert_eq!(loaded.speed, 1.0);
        assert!(!loaded.paused);
        assert!(loaded.playing && loaded.looping);
    }

    #[test]
    fn test_future_version_leaves_state_untouched() {
        let bytes = single_chunk(ANIMATION_STATE, 7, &[0xFF; 40]);
        let mut loaded = AnimationState::default();
        let report = animation_state_registry().read_stream(&mut loaded, bytes.as_slice()).unwrap();
        assert_eq!(report.unsupported_version, 1);
        assert_eq!(loaded, AnimationState::default());
    }

    #[test]
    fn test_geometry_survives_a_save() {
        let mut cube = MeshData::cube(1.0);
        assert!(cube.generate_tangents());

        let mut writer = ChunkWriter::new(Vec::new());
        write_geometry(&mut writer, &cube).unwrap();
        write_animation_state(&mut writer, &AnimationState::default()).unwrap();
        let bytes = writer.finish().unwrap();

        let mut loaded = MeshData::new(Vec::new(), Vec::new(), VertexAttributes::empty());
        let report = geometry_registry().read_stream(&mut loaded, bytes.as_slice()).unwrap();
        assert_eq!(report, ReadReport { applied: 1, unknown: 1, ..ReadReport::default() });
        assert_eq!(loaded, cube);
    }

    #[test]
    fn test_geometry_with_bad_indices_rejected() {
        let mut payload = PayloadWriter::new();
        payload
            .u32(u32::from(VertexAttributes::POSITION.bits()))
            .pod_slice(&[Vertex::default()])
            .unwrap()
            .pod_slice(&[0u32, 1, 2])
            .unwrap();
        let bytes = single_chunk(GEOMETRY, 1, &payload.into_bytes());

        let mut loaded = MeshData::cube(1.0);
        let report = geometry_registry().read_stream(&mut loaded, bytes.as_slice()).unwrap();
        assert_eq!(report.rejected, 1);
        assert_eq!(loaded, MeshData::cube(1.0));
    }
}
