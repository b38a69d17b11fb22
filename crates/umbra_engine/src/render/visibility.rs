//! Visibility processor
//!
//! Frustum culling only: the camera frustum is run against both broad-phase
//! partitions and every surviving proxy is sorted into per-kind output
//! lists, near to far along the camera's forward axis. Ambient and
//! directional lights have no proxy and are appended unconditionally.
//! Lists are rebuilt from scratch every frame.

use std::collections::HashSet;

use crate::config::VisibilityConfig;
use crate::foundation::math::{Mat4, Vec3};
use crate::physics::CollisionGroups;
use crate::scene::components::camera::CameraView;
use crate::scene::{ComponentRef, LightId, LightKind, ModelId, Scene};
use crate::spatial::Frustum;

/// Per-viewport output of the visibility processor
#[derive(Debug, Clone, Default)]
pub struct VisibleObjects {
    /// Visible models, near to far
    pub models: Vec<ModelId>,
    /// Enabled ambient lights
    pub ambient_lights: Vec<LightId>,
    /// Enabled directional lights
    pub directional_lights: Vec<LightId>,
    /// Point lights whose volume touches the frustum
    pub point_lights: Vec<LightId>,
    /// Spot lights whose volume touches the frustum
    pub spot_lights: Vec<LightId>,
    deduplicate: bool,
    seen: HashSet<ComponentRef>,
}

impl VisibleObjects {
    /// Empty lists; with `deduplicate`, a component is listed at most once
    pub fn new(deduplicate: bool) -> Self {
        Self { deduplicate, ..Self::default() }
    }

    /// Empty every list
    pub fn clear(&mut self) {
        self.models.clear();
        self.ambient_lights.clear();
        self.directional_lights.clear();
        self.point_lights.clear();
        self.spot_lights.clear();
        self.seen.clear();
    }

    /// Total number of lights listed
    pub fn light_count(&self) -> usize {
        self.ambient_lights.len() + self.directional_lights.len() + self.point_lights.len() + self.spot_lights.len()
    }

    /// True if nothing is listed
    pub fn is_empty(&self) -> bool {
        self.models.is_empty() && self.light_count() == 0
    }

    /// Dispatch a component into its list; hidden models, disabled lights and
    /// non-renderable components are ignored
    pub fn add(&mut self, scene: &Scene, component: ComponentRef) -> bool {
        let list = match component {
            ComponentRef::Model(id) => match scene.model(id) {
                Some(attached) if attached.component.visible => Target::Model(id),
                _ => return false,
            },
            ComponentRef::Light(id) => match scene.light(id) {
                Some(attached) if attached.component.enabled => Target::Light(id, attached.component.kind),
                _ => return false,
            },
            _ => return false,
        };
        if self.deduplicate && !self.seen.insert(component) {
            return false;
        }
        match list {
            Target::Model(id) => self.models.push(id),
            Target::Light(id, LightKind::Ambient) => self.ambient_lights.push(id),
            Target::Light(id, LightKind::Directional) => self.directional_lights.push(id),
            Target::Light(id, LightKind::Point { .. }) => self.point_lights.push(id),
            Target::Light(id, LightKind::Spot { .. }) => self.spot_lights.push(id),
        }
        true
    }
}

enum Target {
    Model(ModelId),
    Light(LightId, LightKind),
}

/// Fills [`VisibleObjects`] from a scene's broad-phase
#[derive(Debug, Clone, Default)]
pub struct VisibilityProcessor {
    config: VisibilityConfig,
}

impl VisibilityProcessor {
    /// Processor with the given settings
    pub fn new(config: VisibilityConfig) -> Self {
        Self { config }
    }

    /// Settings
    pub fn config(&self) -> &VisibilityConfig {
        &self.config
    }

    /// Rebuild `out` for a camera
    pub fn process(&self, scene: &Scene, camera: &CameraView, out: &mut VisibleObjects) {
        out.clear();
        out.deduplicate = self.config.deduplicate;

        let frustum = Frustum::from_matrix(&camera.view_projection());
        let mut culled_in = 0usize;
        scene
            .broad_phase()
            .frustum_traversal(&frustum.planes, camera.forward, CollisionGroups::VISIBLE, &mut |proxy| {
                if let Some(owner) = scene.proxy_owner(proxy) {
                    culled_in += 1;
                    out.add(scene, owner);
                }
            });

        for (id, attached) in scene.lights() {
            if attached.component.is_global() {
                out.add(scene, ComponentRef::Light(id));
            }
        }

        log::trace!(
            "Visibility: {} proxies in frustum, {} models, {} lights",
            culled_in,
            out.models.len(),
            out.light_count()
        );
    }
}

/// Shadow-casting models inside a light's view volume, near to far along `axis`
pub fn collect_shadow_casters(scene: &Scene, light_view_projection: &Mat4, axis: Vec3) -> Vec<ModelId> {
    let frustum = Frustum::from_matrix(light_view_projection);
    let mut casters = Vec::new();
    scene
        .broad_phase()
        .frustum_traversal(&frustum.planes, axis, CollisionGroups::MODEL, &mut |proxy| {
            if let Some(ComponentRef::Model(id)) = scene.proxy_owner(proxy) {
                let casts = scene
                    .model(id)
                    .is_some_and(|attached| attached.component.visible && attached.component.cast_shadows);
                if casts && !casters.contains(&id) {
                    casters.push(id);
                }
            }
        });
    casters
}
