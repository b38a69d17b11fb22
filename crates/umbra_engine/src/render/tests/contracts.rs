//! Renderer guarantees that span several modules

use std::sync::Arc;

use super::*;
use crate::render::framebuffers::bloom_size;
use crate::render::{ShaderKey, ShaderPass};

fn lit_cube() -> (Harness, MaterialDefinitionId, ModelId) {
    let mut h = Harness::new(test_config(false));
    let white = h.material(MaterialDefinition::opaque("white", [1.0; 4]));
    let cube = h.add_cube(Vec3::zeros(), white);
    h.add_default_lights();
    (h, white, cube)
}

#[test]
fn test_frame_executes_only_on_submit() {
    let (mut h, _, cube) = lit_cube();
    h.render();
    assert!(h.is_lit(32, 32));

    let node = h.scene.model(cube).unwrap().node;
    h.scene.graph_mut().set_position(node, Vec3::new(0.0, 50.0, 0.0));
    h.scene.sync_proxies();
    h.renderer.render_viewport(&mut h.ctx, &mut h.scene, &h.materials, h.viewport);
    assert!(!h.ctx.queues().back().is_empty());
    assert!(h.is_lit(32, 32));

    h.ctx.submit().unwrap();
    assert!(!h.is_lit(32, 32));
}

#[test]
fn test_visible_lists_kept_on_viewport() {
    let (mut h, white, _) = lit_cube();
    h.add_cube(Vec3::new(0.0, 0.0, 50.0), white);
    h.render();

    let visible = h.renderer.visible_objects(h.viewport).unwrap();
    assert_eq!(visible.models.len(), 1);
    assert_eq!(visible.directional_lights.len(), 1);
    assert_eq!(visible.ambient_lights.len(), 1);
}

#[test]
fn test_reload_invalidates_only_that_material() {
    let (mut h, white, _) = lit_cube();
    let red = h.material(MaterialDefinition::opaque("red", [1.0, 0.0, 0.0, 1.0]));
    h.add_cube(Vec3::new(1.5, 0.0, 0.0), red);
    h.render();

    let cache = Arc::clone(h.renderer.shader_cache());
    let key = |material| ShaderKey { material, pass: ShaderPass::Material, skinned: false };
    let white_before = cache.variant(&key(white)).unwrap();
    let red_before = cache.variant(&key(red)).unwrap();

    assert!(h.materials.reload(red, MaterialDefinition::opaque("red", [0.0, 1.0, 0.0, 1.0])));
    assert!(cache.variant(&key(red)).is_none());
    assert!(Arc::ptr_eq(&white_before, &cache.variant(&key(white)).unwrap()));

    h.render();
    let red_after = cache.variant(&key(red)).unwrap();
    assert_ne!(red_before.shader, red_after.shader);
    let [r, g, _, _] = h.pixel(50, 32);
    assert!(g > r);
}

#[test]
fn test_resize_recreates_screen_targets() {
    let (mut h, _, _) = lit_cube();
    h.render();
    let old = h.renderer.output_texture(h.viewport).unwrap();

    assert!(h.renderer.resize_viewport(&mut h.ctx, h.viewport, 32, 16));
    assert!(!h.renderer.resize_viewport(&mut h.ctx, h.viewport, 32, 16));
    h.scene.sync_proxies();
    let stats = h.renderer.render_viewport(&mut h.ctx, &mut h.scene, &h.materials, h.viewport);
    h.ctx.submit().unwrap();
    assert!(stats.rendered);

    let device = h.ctx.device();
    assert_eq!(device.texture_size(old), None);
    let framebuffers = &h.renderer.viewport(h.viewport).unwrap().framebuffers;
    for texture in framebuffers.full_resolution_textures() {
        assert_eq!(device.texture_size(texture), Some((32, 16)));
    }
    for texture in framebuffers.screen.bloom {
        assert_eq!(device.texture_size(texture), Some(bloom_size(32, 16)));
    }
    assert_eq!(bloom_size(32, 16), (8, 4));
}

#[test]
fn test_deregister_releases_targets() {
    let (mut h, _, _) = lit_cube();
    h.render();
    let output = h.renderer.output_texture(h.viewport).unwrap();

    assert!(h.renderer.deregister_viewport(&h.ctx, h.viewport));
    assert!(!h.renderer.deregister_viewport(&h.ctx, h.viewport));
    h.ctx.submit().unwrap();
    assert_eq!(h.ctx.device().texture_size(output), None);

    let stats = h.renderer.render_viewport(&mut h.ctx, &mut h.scene, &h.materials, h.viewport);
    assert!(!stats.rendered);
}

#[test]
fn test_detached_child_keeps_its_place_on_screen() {
    let (mut h, white, _) = lit_cube();
    let pivot = h.scene.create_node("pivot");
    h.scene.graph_mut().set_position(pivot, Vec3::new(1.5, 0.0, 0.0));
    let child = h.scene.graph_mut().create_child(pivot, "child");
    let definition = ModelDefinition::single_mesh("cube", MeshData::cube(0.5), white);
    h.scene.attach_model(child, Model::new(definition));
    h.render();
    assert!(h.is_lit(50, 32));

    assert!(h.scene.graph_mut().detach(child, true));
    assert_eq!(h.scene.graph().node(child).unwrap().position(), Vec3::new(1.5, 0.0, 0.0));
    h.scene.graph_mut().set_position(pivot, Vec3::new(-1.5, 0.0, 0.0));
    h.render();
    assert!(h.is_lit(50, 32));
    assert!(!h.is_lit(14, 32));
}
