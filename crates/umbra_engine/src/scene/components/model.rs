//! Model component
//!
//! A [`Model`] instantiates a shared [`ModelDefinition`]: it owns a copy of
//! the bone tree, the active animation, and (for skinned meshes) a pair of
//! skinning vertex arrays per mesh. The back array is written while the
//! front one may still be read by commands recorded last frame; the scene
//! swaps them once per update.

use std::sync::Arc;

use crate::animation::{skin_vertices, AnimationState, BoneTree};
use crate::assets::mesh::Vertex;
use crate::assets::model::ModelDefinition;
use crate::foundation::collections::{DoubleBuffered, Recycle};
use crate::foundation::math::Mat4;
use crate::render::commands::RenderCommand;
use crate::render::context::RenderContext;
use crate::render::device::{GpuResource, VertexArrayId, VertexData};
use crate::render::garbage::GarbageList;
use crate::spatial::AABB;

/// One side of a mesh's skinning buffer pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkinningSlot {
    /// Vertex array, created on first use and then reused
    pub vertex_array: Option<VertexArrayId>,
    /// Skinned this frame
    pub fresh: bool,
}

impl Recycle for SkinningSlot {
    fn recycle(&mut self) {
        self.fresh = false;
    }
}

/// Renderable instance of a model definition
pub struct Model {
    definition: Arc<ModelDefinition>,
    bones: BoneTree,
    animation: AnimationState,
    palette: Vec<Mat4>,
    skinning: Vec<DoubleBuffered<SkinningSlot>>,
    scratch: Vec<Vertex>,
    garbage: Option<Arc<GarbageList>>,
    /// Registered in the static broad-phase partition
    pub is_static: bool,
    /// Hidden models are never drawn
    pub visible: bool,
    /// Drawn into shadow maps
    pub cast_shadows: bool,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("definition", &self.definition.name)
            .field("bones", &self.bones.len())
            .field("animation", &self.animation.clip)
            .field("visible", &self.visible)
            .finish_non_exhaustive()
    }
}

impl Model {
    /// Instantiate a definition in its bind pose
    pub fn new(definition: Arc<ModelDefinition>) -> Self {
        let bones = definition.bones().instantiate();
        let palette = bones.palette();
        Self {
            definition,
            bones,
            animation: AnimationState::default(),
            palette,
            skinning: Vec::new(),
            scratch: Vec::new(),
            garbage: None,
            is_static: false,
            visible: true,
            cast_shadows: true,
        }
    }

    /// Builder-style static flag
    pub fn with_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }

    /// Shared definition
    pub fn definition(&self) -> &Arc<ModelDefinition> {
        &self.definition
    }

    /// Instance bone tree
    pub fn bones(&self) -> &BoneTree {
        &self.bones
    }

    /// Playback state
    pub fn animation(&self) -> &AnimationState {
        &self.animation
    }

    /// Mutable playback state (pause, resume, speed)
    pub fn animation_mut(&mut self) -> &mut AnimationState {
        &mut self.animation
    }

    /// Current skinning matrices
    pub fn palette(&self) -> &[Mat4] {
        &self.palette
    }

    /// Start a clip by name; `false` if the definition has no such clip
    pub fn play(&mut self, clip: &str, looping: bool) -> bool {
        let Some(found) = self.definition.animation(clip) else {
            log::warn!("Model '{}' has no animation '{}'", self.definition.name, clip);
            return false;
        };
        self.animation.play(clip, looping);
        found.apply(0.0, &mut self.bones);
        self.palette = self.bones.palette();
        true
    }

    /// Advance playback by one fixed step; returns true if the pose changed
    pub fn step_animation(&mut self, delta_time: f32) -> bool {
        if !self.animation.is_advancing() {
            return false;
        }
        let Some(clip) = self.definition.animation(&self.animation.clip) else {
            self.animation.stop();
            return false;
        };
        if !self.animation.step(delta_time, clip.duration) {
            return false;
        }
        clip.apply(self.animation.time, &mut self.bones);
        self.palette = self.bones.palette();
        true
    }

    /// World-space bounds for a node matrix
    pub fn world_bounds(&self, world: &Mat4) -> Option<AABB> {
        self.definition.bounds().map(|bounds| bounds.transformed(world))
    }

    /// Skinning buffer pairs, one per mesh, allocated on first call
    pub fn skinning_slots_mut(&mut self) -> &mut [DoubleBuffered<SkinningSlot>] {
        if self.skinning.is_empty() {
            self.skinning = vec![DoubleBuffered::default(); self.definition.meshes().len()];
        }
        &mut self.skinning
    }

    /// Skin mesh `mesh` on the CPU into its back skinning array.
    ///
    /// Skins at most once per frame; later calls return the same array.
    /// `None` for rigid meshes or an out-of-range index.
    pub fn skin_into_back(&mut self, ctx: &mut RenderContext, mesh: usize) -> Option<VertexArrayId> {
        let definition = Arc::clone(&self.definition);
        let source = definition.meshes().get(mesh)?;
        let weights = source.skin.as_ref()?;
        if self.garbage.is_none() {
            self.garbage = Some(Arc::clone(ctx.garbage()));
        }

        let slot = *self.skinning_slots_mut().get(mesh)?.back();
        if slot.fresh {
            return slot.vertex_array;
        }
        let vertex_array = slot.vertex_array.unwrap_or_else(|| ctx.create_vertex_array(None));

        skin_vertices(&source.geometry.vertices, weights, &self.palette, &mut self.scratch);
        ctx.append_to_back_buffer(RenderCommand::PushVertexData {
            id: vertex_array,
            data: VertexData {
                vertices: self.scratch.clone(),
                indices: source.geometry.indices.clone(),
                skin: None,
            },
        });
        *self.skinning[mesh].back_mut() = SkinningSlot { vertex_array: Some(vertex_array), fresh: true };
        Some(vertex_array)
    }

    /// Swap every mesh's skinning pair
    pub fn swap_skinning_buffers(&mut self) {
        for pair in &mut self.skinning {
            pair.swap();
        }
    }
}

impl Drop for Model {
    fn drop(&mut self) {
        let Some(garbage) = &self.garbage else {
            return;
        };
        for pair in &self.skinning {
            for slot in pair.iter() {
                if let Some(vertex_array) = slot.vertex_array {
                    garbage.mark_for_collection(GpuResource::VertexArray(vertex_array));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{AnimationClip, Bone, BoneChannel, Keyframe, VertexWeight};
    use crate::assets::mesh::MeshData;
    use crate::assets::model::{ImportedMesh, ImportedModel};
    use crate::foundation::math::Vec3;
    use crate::render::backends::software::SoftwareDevice;
    use approx::assert_relative_eq;
    use slotmap::KeyData;

    fn rigged() -> Arc<ModelDefinition> {
        let geometry = MeshData::cube(0.5);
        let weights = (0..geometry.vertex_count() as u32)
            .map(|vertex| VertexWeight { mesh: 0, vertex, weight: 1.0 })
            .collect();
        let mut bones = BoneTree::new();
        bones.add_bone(Bone::new("root", Mat4::identity()).with_weights(weights), None);

        let mut channel = BoneChannel::new("root");
        channel.positions = vec![
            Keyframe::new(0.0, Vec3::zeros()),
            Keyframe::new(1.0, Vec3::new(2.0, 0.0, 0.0)),
        ];
        ModelDefinition::from_import(ImportedModel {
            name: "rig".into(),
            meshes: vec![ImportedMesh {
                name: "body".into(),
                geometry,
                material: KeyData::from_ffi(1).into(),
            }],
            bones,
            animations: vec![AnimationClip::new("slide", 1.0, vec![channel])],
        })
    }

    #[test]
    fn test_play_unknown_clip() {
        let mut model = Model::new(rigged());
        assert!(!model.play("jump", true));
        assert!(model.play("slide", false));
    }

    #[test]
    fn test_step_updates_palette() {
        let mut model = Model::new(rigged());
        model.play("slide", true);
        assert!(model.step_animation(0.5));
        assert_relative_eq!(model.palette()[0][(0, 3)], 1.0, epsilon = 1e-5);
        model.animation_mut().pause();
        assert!(!model.step_animation(0.25));
    }

    #[test]
    fn test_cpu_skinning_once_per_frame() {
        let mut ctx = RenderContext::new(Box::new(SoftwareDevice::new()));
        let mut model = Model::new(rigged());
        let first = model.skin_into_back(&mut ctx, 0).unwrap();
        assert_eq!(model.skin_into_back(&mut ctx, 0), Some(first));
        // CreateVertexArray + one PushVertexData
        assert_eq!(ctx.queues().back().len(), 2);

        model.swap_skinning_buffers();
        let second = model.skin_into_back(&mut ctx, 0).unwrap();
        assert_ne!(first, second);
        model.swap_skinning_buffers();
        assert_eq!(model.skin_into_back(&mut ctx, 0), Some(first));

        drop(model);
        assert_eq!(ctx.garbage().pending(), 2);
    }
}
