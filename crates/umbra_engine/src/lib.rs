//! # Umbra Engine
//!
//! Scene graph, skeletal animation and deferred-lighting renderer core.
//!
//! ## Features
//!
//! - **Scene graph**: arena-allocated transform hierarchy with selective
//!   inheritance, typed components and change notification
//! - **Visibility**: broad-phase frustum traversal ordered near to far
//! - **Deferred lighting**: depth pre-pass, per-light accumulation with
//!   variance shadow maps, material resolve, blending, refraction, bloom
//!   and tone mapping
//! - **Command queue**: every GPU call is recorded into a double-buffered
//!   queue and executed against a [`render::GraphicsDevice`]
//! - **Skinning**: CPU or GPU bone palettes from keyframed clips
//! - **Serialization**: versioned chunk streams with forward-compatible readers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use umbra_engine::prelude::*;
//! use umbra_engine::render::backends::software::SoftwareDevice;
//!
//! let mut ctx = RenderContext::new(Box::new(SoftwareDevice::new()));
//! let mut renderer = DeferredRenderer::new(&mut ctx, RendererConfig::default());
//! let mut materials = MaterialLibrary::new();
//! renderer.listen_to(&mut materials);
//! let viewport = renderer.register_viewport(&mut ctx, 320, 240);
//!
//! let mut scene = Scene::new();
//! let camera = scene.create_node("camera");
//! scene.graph_mut().set_position(camera, Vec3::new(0.0, 1.0, 6.0));
//! scene.attach_camera(camera, CameraComponent::default());
//! renderer.set_viewport_camera(viewport, Some(camera));
//!
//! let white = materials.add(MaterialDefinition::opaque("white", [0.8, 0.8, 0.8, 1.0]));
//! let cube = scene.create_node("cube");
//! scene.attach_model(cube, Model::new(ModelDefinition::single_mesh("cube", MeshData::cube(0.5), white)));
//! let sun = scene.create_node("sun");
//! scene.attach_light(sun, LightComponent::directional(Vec3::repeat(1.0), 1.0));
//!
//! scene.update(1.0 / 60.0);
//! renderer.render_viewport(&mut ctx, &mut scene, &materials, viewport);
//! ctx.submit().expect("queue drained");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod foundation;
pub mod config;
pub mod spatial;
pub mod physics;
pub mod scene;
pub mod assets;
pub mod animation;
pub mod render;
pub mod serialization;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        assets::{MaterialDefinition, MaterialLibrary, MeshData, ModelDefinition},
        config::{ApplicationConfig, Config, EngineConfig, RendererConfig},
        foundation::math::{Mat4, Quat, Transform, Vec3},
        render::{DeferredRenderer, FrameStats, RenderContext, ViewportId},
        scene::{CameraComponent, LightComponent, Model, NodeId, Scene},
    };
}
