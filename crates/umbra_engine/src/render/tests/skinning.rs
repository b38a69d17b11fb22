//! Animated meshes in both skinning modes

use super::*;
use crate::animation::{AnimationClip, Bone, BoneChannel, BoneTree, Keyframe, VertexWeight};
use crate::assets::model::{ImportedMesh, ImportedModel};
use crate::config::SkinningMode;
use crate::foundation::math::Mat4;

/// Unit cube bound to one bone that slides two units along +x over a second
fn sliding_cube(material: MaterialDefinitionId) -> Model {
    let geometry = MeshData::cube(0.5);
    let weights = (0..geometry.vertex_count() as u32)
        .map(|vertex| VertexWeight { mesh: 0, vertex, weight: 1.0 })
        .collect();
    let mut bones = BoneTree::new();
    bones.add_bone(Bone::new("root", Mat4::identity()).with_weights(weights), None);

    let mut channel = BoneChannel::new("root");
    channel.positions = vec![Keyframe::new(0.0, Vec3::zeros()), Keyframe::new(1.0, Vec3::new(2.0, 0.0, 0.0))];
    Model::new(ModelDefinition::from_import(ImportedModel {
        name: "slider".into(),
        meshes: vec![ImportedMesh { name: "body".into(), geometry, material }],
        bones,
        animations: vec![AnimationClip::new("slide", 1.0, vec![channel])],
    }))
}

/// Render after `frames` 60 Hz scene updates
fn rendered_after(mode: SkinningMode, frames: u32) -> Harness {
    let mut config = test_config(false);
    config.skinning = mode;
    let mut h = Harness::new(config);
    let white = h.material(MaterialDefinition::opaque("white", [1.0; 4]));
    let id = h.add_model(Vec3::zeros(), sliding_cube(white));
    assert!(h.scene.model_mut(id).unwrap().play("slide", false));
    h.add_default_lights();
    for _ in 0..frames {
        h.scene.update(1.0 / 60.0);
    }
    h.render();
    h
}

#[test]
fn test_bind_pose_before_update() {
    for mode in [SkinningMode::Cpu, SkinningMode::Gpu] {
        let h = rendered_after(mode, 0);
        assert!(h.is_lit(32, 32), "{mode:?}");
        assert!(!h.is_lit(44, 32), "{mode:?}");
    }
}

#[test]
fn test_cpu_skinned_cube_moves() {
    let h = rendered_after(SkinningMode::Cpu, 30);
    assert!(h.is_lit(44, 32));
    assert!(!h.is_lit(32, 32));
}

#[test]
fn test_gpu_skinned_cube_moves() {
    let h = rendered_after(SkinningMode::Gpu, 30);
    assert!(h.is_lit(44, 32));
    assert!(!h.is_lit(32, 32));
}

#[test]
fn test_modes_agree() {
    let cpu = rendered_after(SkinningMode::Cpu, 15);
    let gpu = rendered_after(SkinningMode::Gpu, 15);
    for x in (0..SIZE).step_by(4) {
        assert_eq!(cpu.is_lit(x, 32), gpu.is_lit(x, 32), "column {x}");
    }
}
