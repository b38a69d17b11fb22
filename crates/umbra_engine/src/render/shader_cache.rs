//! Shader variant cache
//!
//! Shaders are built lazily per (material, pass, skinning) and shared
//! through `Arc`. The cache listens to the [`MaterialLibrary`] so reloading
//! or deleting a definition drops exactly that definition's variants; the
//! next frame rebuilds them.
//!
//! [`MaterialLibrary`]: crate::assets::material::MaterialLibrary

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::assets::material::{
    MaterialBlend, MaterialDefinition, MaterialDefinitionId, MaterialLibraryListener, ShadingModel,
};

use super::context::RenderContext;
use super::device::{GpuResource, LightType, ShaderDesc, ShaderId, ShaderProgram};
use super::garbage::GarbageList;

/// Which pipeline stage a variant serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderPass {
    /// Depth pre-pass
    Depth,
    /// 2D shadow map
    ShadowDepth,
    /// Cube shadow map
    ShadowDistance,
    /// Light accumulation
    Light(LightType),
    /// Opaque material resolve
    Material,
    /// Alpha blended forward pass
    Blended,
    /// Refraction pass
    Refractive,
}

/// Cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderKey {
    /// Owning material definition
    pub material: MaterialDefinitionId,
    /// Stage
    pub pass: ShaderPass,
    /// Vertex stage applies a bone palette
    pub skinned: bool,
}

/// A built shader and the key it was built for
#[derive(Debug, PartialEq, Eq)]
pub struct ShaderVariant {
    /// Device shader
    pub shader: ShaderId,
    /// Key
    pub key: ShaderKey,
}

/// Program for a pass of a material
pub fn program_for(definition: &MaterialDefinition, pass: ShaderPass) -> ShaderProgram {
    let external = match &definition.model {
        ShadingModel::External(source) => Some(ShaderProgram::External(source.clone())),
        _ => None,
    };
    match pass {
        ShaderPass::Depth => ShaderProgram::DepthOnly,
        ShaderPass::ShadowDepth => ShaderProgram::ShadowDepth,
        ShaderPass::ShadowDistance => ShaderProgram::ShadowDistance,
        ShaderPass::Light(light) => ShaderProgram::LightAccumulation(light),
        ShaderPass::Material => external.unwrap_or(match definition.model {
            ShadingModel::Unlit => ShaderProgram::UnlitMaterial,
            _ => ShaderProgram::LitMaterial,
        }),
        ShaderPass::Blended => external.unwrap_or(ShaderProgram::Blended),
        ShaderPass::Refractive => external.unwrap_or(ShaderProgram::Refractive),
    }
}

/// Pass a material's color is resolved in
pub fn color_pass(definition: &MaterialDefinition) -> ShaderPass {
    match definition.blend {
        MaterialBlend::Opaque => ShaderPass::Material,
        MaterialBlend::Blended => ShaderPass::Blended,
        MaterialBlend::Refractive => ShaderPass::Refractive,
    }
}

/// Lazily built shader variants shared by every viewport
#[derive(Debug)]
pub struct ShaderCache {
    variants: RwLock<HashMap<ShaderKey, Arc<ShaderVariant>>>,
    garbage: Arc<GarbageList>,
}

impl ShaderCache {
    /// Create a cache that releases shaders through `garbage`
    pub fn new(garbage: Arc<GarbageList>) -> Self {
        Self {
            variants: RwLock::new(HashMap::new()),
            garbage,
        }
    }

    /// Existing variant, if built
    pub fn variant(&self, key: &ShaderKey) -> Option<Arc<ShaderVariant>> {
        self.variants.read().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }

    /// Variant for `key`, recording its creation on first use
    pub fn get_or_create(
        &self,
        ctx: &mut RenderContext,
        material: MaterialDefinitionId,
        definition: &MaterialDefinition,
        pass: ShaderPass,
        skinned: bool,
    ) -> Arc<ShaderVariant> {
        let key = ShaderKey { material, pass, skinned };
        if let Some(existing) = self.variant(&key) {
            return existing;
        }

        let mut variants = self.variants.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = variants.get(&key) {
            return Arc::clone(existing);
        }
        let name = format!("{}:{:?}", definition.name, pass);
        let desc = ShaderDesc::new(name, program_for(definition, pass)).with_skinning(skinned);
        let variant = Arc::new(ShaderVariant { shader: ctx.create_shader(desc), key });
        log::debug!("Built shader variant {:?} for '{}'", key, definition.name);
        variants.insert(key, Arc::clone(&variant));
        variant
    }

    /// Number of cached variants
    pub fn len(&self) -> usize {
        self.variants.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every variant of `material`; returns how many were dropped
    pub fn invalidate(&self, material: MaterialDefinitionId) -> usize {
        let mut variants = self.variants.write().unwrap_or_else(PoisonError::into_inner);
        let before = variants.len();
        variants.retain(|key, variant| {
            if key.material == material {
                self.garbage.mark_for_collection(GpuResource::Shader(variant.shader));
                false
            } else {
                true
            }
        });
        let dropped = before - variants.len();
        if dropped > 0 {
            log::debug!("Invalidated {} shader variants of {:?}", dropped, material);
        }
        dropped
    }

    /// Drop every variant
    pub fn clear(&self) {
        let mut variants = self.variants.write().unwrap_or_else(PoisonError::into_inner);
        for variant in variants.values() {
            self.garbage.mark_for_collection(GpuResource::Shader(variant.shader));
        }
        variants.clear();
    }
}

impl MaterialLibraryListener for ShaderCache {
    fn on_delete_material_definition(&self, id: MaterialDefinitionId) {
        self.invalidate(id);
    }

    fn on_reload_material_definition(&self, id: MaterialDefinitionId) {
        self.invalidate(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::material::MaterialLibrary;
    use crate::render::backends::software::SoftwareDevice;

    #[test]
    fn test_variants_are_shared() {
        let mut ctx = RenderContext::new(Box::new(SoftwareDevice::new()));
        let mut library = MaterialLibrary::new();
        let id = library.add(MaterialDefinition::opaque("red", [1.0, 0.0, 0.0, 1.0]));
        let cache = ShaderCache::new(Arc::clone(ctx.garbage()));
        let definition = Arc::clone(library.get(id).unwrap());

        let a = cache.get_or_create(&mut ctx, id, &definition, ShaderPass::Material, false);
        let b = cache.get_or_create(&mut ctx, id, &definition, ShaderPass::Material, false);
        let skinned = cache.get_or_create(&mut ctx, id, &definition, ShaderPass::Material, true);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &skinned));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_reload_drops_only_that_material() {
        let mut ctx = RenderContext::new(Box::new(SoftwareDevice::new()));
        let mut library = MaterialLibrary::new();
        let red = library.add(MaterialDefinition::opaque("red", [1.0, 0.0, 0.0, 1.0]));
        let blue = library.add(MaterialDefinition::opaque("blue", [0.0, 0.0, 1.0, 1.0]));
        let cache = Arc::new(ShaderCache::new(Arc::clone(ctx.garbage())));
        let listener: Arc<dyn MaterialLibraryListener> = cache.clone();
        library.add_listener(&listener);

        let red_def = Arc::clone(library.get(red).unwrap());
        let blue_def = Arc::clone(library.get(blue).unwrap());
        cache.get_or_create(&mut ctx, red, &red_def, ShaderPass::Material, false);
        cache.get_or_create(&mut ctx, red, &red_def, ShaderPass::Depth, false);
        let kept = cache.get_or_create(&mut ctx, blue, &blue_def, ShaderPass::Material, false);

        library.reload(red, MaterialDefinition::opaque("red", [0.5, 0.0, 0.0, 1.0]));
        assert_eq!(cache.len(), 1);
        assert_eq!(ctx.garbage().pending(), 2);
        let key = ShaderKey { material: blue, pass: ShaderPass::Material, skinned: false };
        assert!(Arc::ptr_eq(&cache.variant(&key).unwrap(), &kept));
    }

    #[test]
    fn test_external_model_maps_to_external_program() {
        let definition = MaterialDefinition::opaque("water", [1.0; 4])
            .with_model(ShadingModel::External("water.glsl".into()));
        assert_eq!(
            program_for(&definition, ShaderPass::Material),
            ShaderProgram::External("water.glsl".into())
        );
        assert_eq!(program_for(&definition, ShaderPass::Depth), ShaderProgram::DepthOnly);
    }
}
