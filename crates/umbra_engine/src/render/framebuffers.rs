//! Per-viewport render targets
//!
//! A [`FramebufferSet`] owns everything one viewport renders into: the
//! shared depth buffer, the two light accumulation buffers, the HDR
//! composite, the refraction snapshot, the LDR output, quarter-resolution
//! bloom buffers, and the shadow map scratch space.

use super::context::RenderContext;
use super::device::{
    AttachmentTarget, CubeFace, FramebufferDesc, FramebufferId, GpuResource, TextureDesc, TextureFormat,
    TextureId,
};
use crate::config::RendererConfig;

/// Bloom buffers are this many times smaller than the viewport
pub const BLOOM_DOWNSAMPLE: u32 = 4;

/// Resolution-dependent targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenTargets {
    /// Depth shared by every geometry pass
    pub depth: TextureId,
    /// Accumulated diffuse light
    pub light_diffuse: TextureId,
    /// Accumulated specular light
    pub light_specular: TextureId,
    /// Material composite (HDR when enabled)
    pub hdr: TextureId,
    /// Copy of the composite taken before refractive draws
    pub snapshot: TextureId,
    /// Final 8-bit output
    pub ldr: TextureId,
    /// Bloom ping-pong pair
    pub bloom: [TextureId; 2],

    /// Depth only
    pub depth_fb: FramebufferId,
    /// Diffuse + specular MRT over the shared depth
    pub light_fb: FramebufferId,
    /// Composite over the shared depth
    pub hdr_fb: FramebufferId,
    /// Refraction snapshot
    pub snapshot_fb: FramebufferId,
    /// Output
    pub ldr_fb: FramebufferId,
    /// One per bloom buffer
    pub bloom_fbs: [FramebufferId; 2],
}

/// Shadow map scratch space, sized by the shadow settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowTargets {
    /// Edge length of the 2D map
    pub map_size: u32,
    /// Edge length of a cube face
    pub cube_size: u32,
    /// Blurred moments, read by the light pass
    pub map: TextureId,
    /// Horizontal blur output
    pub map_scratch: TextureId,
    /// Depth for rendering the map
    pub map_depth: TextureId,
    /// Renders moments into `map` (also the vertical blur target)
    pub map_fb: FramebufferId,
    /// Horizontal blur target
    pub map_blur_fb: FramebufferId,

    /// Blurred cube moments
    pub cube: TextureId,
    /// One face rendered before blurring
    pub cube_raw: TextureId,
    /// Horizontal blur output for a face
    pub cube_scratch: TextureId,
    /// Depth shared by every face, cleared per face
    pub cube_depth: TextureId,
    /// Renders a face into `cube_raw`
    pub cube_raw_fb: FramebufferId,
    /// Horizontal blur target
    pub cube_blur_fb: FramebufferId,
    /// Vertical blur target, one per face
    pub cube_face_fbs: [FramebufferId; 6],
}

/// All targets of one viewport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramebufferSet {
    width: u32,
    height: u32,
    /// Resolution-dependent targets
    pub screen: ScreenTargets,
    /// Shadow scratch space
    pub shadows: ShadowTargets,
}

impl ScreenTargets {
    fn create(ctx: &mut RenderContext, width: u32, height: u32) -> Self {
        let full = |format| TextureDesc::new(width, height, format);
        let depth = ctx.create_texture_2d(full(TextureFormat::Depth24Stencil8));
        let light_diffuse = ctx.create_texture_2d(full(TextureFormat::Rgba16F));
        let light_specular = ctx.create_texture_2d(full(TextureFormat::Rgba16F));
        let hdr = ctx.create_texture_2d(full(TextureFormat::Rgba16F));
        let snapshot = ctx.create_texture_2d(full(TextureFormat::Rgba16F));
        let ldr = ctx.create_texture_2d(full(TextureFormat::Rgba8));

        let (bloom_w, bloom_h) = bloom_size(width, height);
        let bloom = [
            ctx.create_texture_2d(TextureDesc::new(bloom_w, bloom_h, TextureFormat::Rgba16F)),
            ctx.create_texture_2d(TextureDesc::new(bloom_w, bloom_h, TextureFormat::Rgba16F)),
        ];

        Self {
            depth,
            light_diffuse,
            light_specular,
            hdr,
            snapshot,
            ldr,
            bloom,
            depth_fb: ctx.create_framebuffer(FramebufferDesc::default().with_depth(depth)),
            light_fb: ctx.create_framebuffer(FramebufferDesc::color(&[light_diffuse, light_specular]).with_depth(depth)),
            hdr_fb: ctx.create_framebuffer(FramebufferDesc::color(&[hdr]).with_depth(depth)),
            snapshot_fb: ctx.create_framebuffer(FramebufferDesc::color(&[snapshot])),
            ldr_fb: ctx.create_framebuffer(FramebufferDesc::color(&[ldr])),
            bloom_fbs: [
                ctx.create_framebuffer(FramebufferDesc::color(&[bloom[0]])),
                ctx.create_framebuffer(FramebufferDesc::color(&[bloom[1]])),
            ],
        }
    }

    fn resources(&self) -> Vec<GpuResource> {
        let framebuffers = [
            self.depth_fb,
            self.light_fb,
            self.hdr_fb,
            self.snapshot_fb,
            self.ldr_fb,
            self.bloom_fbs[0],
            self.bloom_fbs[1],
        ];
        let textures = [
            self.depth,
            self.light_diffuse,
            self.light_specular,
            self.hdr,
            self.snapshot,
            self.ldr,
            self.bloom[0],
            self.bloom[1],
        ];
        framebuffers
            .into_iter()
            .map(GpuResource::Framebuffer)
            .chain(textures.into_iter().map(GpuResource::Texture))
            .collect()
    }
}

impl ShadowTargets {
    fn create(ctx: &mut RenderContext, config: &RendererConfig) -> Self {
        let map_size = config.shadows.map_size.max(1);
        let cube_size = config.shadows.cube_map_size.max(1);
        let square = |size, format| TextureDesc::new(size, size, format);

        let map = ctx.create_texture_2d(square(map_size, TextureFormat::Rg32F));
        let map_scratch = ctx.create_texture_2d(square(map_size, TextureFormat::Rg32F));
        let map_depth = ctx.create_texture_2d(square(map_size, TextureFormat::Depth24Stencil8));

        let cube = ctx.create_texture_cube(cube_size, TextureFormat::Rg32F);
        let cube_raw = ctx.create_texture_2d(square(cube_size, TextureFormat::Rg32F));
        let cube_scratch = ctx.create_texture_2d(square(cube_size, TextureFormat::Rg32F));
        let cube_depth = ctx.create_texture_2d(square(cube_size, TextureFormat::Depth24Stencil8));

        let cube_face_fbs = CubeFace::ALL.map(|face| {
            ctx.create_framebuffer(FramebufferDesc {
                colors: vec![AttachmentTarget::CubeFace(cube, face)],
                depth: None,
            })
        });

        Self {
            map_size,
            cube_size,
            map,
            map_scratch,
            map_depth,
            map_fb: ctx.create_framebuffer(FramebufferDesc::color(&[map]).with_depth(map_depth)),
            map_blur_fb: ctx.create_framebuffer(FramebufferDesc::color(&[map_scratch])),
            cube,
            cube_raw,
            cube_scratch,
            cube_depth,
            cube_raw_fb: ctx.create_framebuffer(FramebufferDesc::color(&[cube_raw]).with_depth(cube_depth)),
            cube_blur_fb: ctx.create_framebuffer(FramebufferDesc::color(&[cube_scratch])),
            cube_face_fbs,
        }
    }

    fn resources(&self) -> Vec<GpuResource> {
        let mut resources: Vec<GpuResource> = [self.map_fb, self.map_blur_fb, self.cube_raw_fb, self.cube_blur_fb]
            .into_iter()
            .chain(self.cube_face_fbs)
            .map(GpuResource::Framebuffer)
            .collect();
        resources.extend(
            [
                self.map,
                self.map_scratch,
                self.map_depth,
                self.cube,
                self.cube_raw,
                self.cube_scratch,
                self.cube_depth,
            ]
            .into_iter()
            .map(GpuResource::Texture),
        );
        resources
    }
}

/// Size of the bloom buffers for a viewport
pub fn bloom_size(width: u32, height: u32) -> (u32, u32) {
    ((width / BLOOM_DOWNSAMPLE).max(1), (height / BLOOM_DOWNSAMPLE).max(1))
}

impl FramebufferSet {
    /// Record creation of every target
    pub fn new(ctx: &mut RenderContext, width: u32, height: u32, config: &RendererConfig) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        log::debug!("Creating viewport targets {}x{}", width, height);
        Self {
            width,
            height,
            screen: ScreenTargets::create(ctx, width, height),
            shadows: ShadowTargets::create(ctx, config),
        }
    }

    /// Viewport width
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Viewport height
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Recreate the resolution-dependent targets; returns false if the size is unchanged.
    ///
    /// The old targets are marked for collection, so commands already
    /// recorded against them still execute.
    pub fn resize(&mut self, ctx: &mut RenderContext, width: u32, height: u32) -> bool {
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) == (self.width, self.height) {
            return false;
        }
        log::debug!("Resizing viewport targets {}x{} -> {}x{}", self.width, self.height, width, height);
        for resource in self.screen.resources() {
            ctx.mark_for_collection(resource);
        }
        self.screen = ScreenTargets::create(ctx, width, height);
        self.width = width;
        self.height = height;
        true
    }

    /// Release every target
    pub fn destroy(self, ctx: &RenderContext) {
        for resource in self.screen.resources().into_iter().chain(self.shadows.resources()) {
            ctx.mark_for_collection(resource);
        }
    }

    /// Textures that follow the viewport size
    pub fn full_resolution_textures(&self) -> [TextureId; 6] {
        let s = &self.screen;
        [s.depth, s.light_diffuse, s.light_specular, s.hdr, s.snapshot, s.ldr]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::software::SoftwareDevice;

    #[test]
    fn test_targets_follow_viewport_size() {
        let mut ctx = RenderContext::new(Box::new(SoftwareDevice::new()));
        let config = RendererConfig::default();
        let mut set = FramebufferSet::new(&mut ctx, 64, 32, &config);
        let report = ctx.submit().unwrap();
        assert_eq!(report.failed, 0);
        for texture in set.full_resolution_textures() {
            assert_eq!(ctx.device().texture_size(texture), Some((64, 32)));
        }
        assert_eq!(ctx.device().texture_size(set.screen.bloom[0]), Some((16, 8)));

        let old = set.screen.clone();
        assert!(set.resize(&mut ctx, 128, 64));
        assert!(!set.resize(&mut ctx, 128, 64));
        ctx.submit().unwrap();
        for texture in set.full_resolution_textures() {
            assert_eq!(ctx.device().texture_size(texture), Some((128, 64)));
        }
        assert_eq!(ctx.device().texture_size(set.screen.bloom[1]), Some((32, 16)));
        assert!(ctx.device().texture_size(old.hdr).is_none());
        assert_eq!(
            ctx.device().texture_size(set.shadows.map),
            Some((config.shadows.map_size, config.shadows.map_size))
        );
    }

    #[test]
    fn test_tiny_viewport_keeps_bloom_nonempty() {
        assert_eq!(bloom_size(2, 3), (1, 1));
        assert_eq!(bloom_size(0, 0), (1, 1));
    }
}
