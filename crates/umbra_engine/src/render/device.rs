//! Graphics resource factory
//!
//! [`GraphicsDevice`] is the only surface the renderer talks to. Resources
//! are addressed by ids that the CPU side allocates up front through
//! [`ResourceIds`], so creation can be recorded as a command and run later
//! on whichever thread owns the device.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::animation::SkinWeights;
use crate::assets::mesh::Vertex;
use crate::config::BlurKernel;
use crate::foundation::math::{Mat4, Vec3, Vec4};

use super::RenderResult;

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);
    };
}

resource_id!(
    /// Handle to a 2D or cube texture
    TextureId
);
resource_id!(
    /// Handle to a framebuffer
    FramebufferId
);
resource_id!(
    /// Handle to a compiled shader
    ShaderId
);
resource_id!(
    /// Handle to a vertex array
    VertexArrayId
);

/// Any device resource, used for deferred deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuResource {
    /// Texture
    Texture(TextureId),
    /// Framebuffer
    Framebuffer(FramebufferId),
    /// Shader
    Shader(ShaderId),
    /// Vertex array
    VertexArray(VertexArrayId),
}

/// Thread-safe id allocator shared by everything that records commands
#[derive(Debug)]
pub struct ResourceIds {
    next: AtomicU64,
}

impl Default for ResourceIds {
    fn default() -> Self {
        Self { next: AtomicU64::new(1) }
    }
}

impl ResourceIds {
    /// Create an allocator
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Reserve a texture id
    pub fn texture(&self) -> TextureId {
        TextureId(self.next())
    }

    /// Reserve a framebuffer id
    pub fn framebuffer(&self) -> FramebufferId {
        FramebufferId(self.next())
    }

    /// Reserve a shader id
    pub fn shader(&self) -> ShaderId {
        ShaderId(self.next())
    }

    /// Reserve a vertex array id
    pub fn vertex_array(&self) -> VertexArrayId {
        VertexArrayId(self.next())
    }
}

// -------------------------------------------------------------------------
// Textures and framebuffers

/// Texel storage format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit normalized RGBA
    Rgba8,
    /// Half-float RGBA
    Rgba16F,
    /// Two 32-bit float channels (shadow moments)
    Rg32F,
    /// Depth/stencil
    Depth24Stencil8,
}

impl TextureFormat {
    /// True for depth formats
    pub fn is_depth(self) -> bool {
        matches!(self, Self::Depth24Stencil8)
    }
}

/// Sampling filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFilter {
    /// Nearest texel
    Nearest,
    /// Bilinear
    #[default]
    Linear,
}

/// Addressing outside [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WrapMode {
    /// Clamp to the edge texel
    #[default]
    ClampToEdge,
    /// Tile
    Repeat,
}

/// Description of a 2D texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Storage format
    pub format: TextureFormat,
    /// Sampling filter
    pub filter: TextureFilter,
    /// Addressing mode
    pub wrap: WrapMode,
}

impl TextureDesc {
    /// Linear, clamped texture
    pub fn new(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            format,
            filter: TextureFilter::Linear,
            wrap: WrapMode::ClampToEdge,
        }
    }
}

/// Face of a cube map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    /// +X
    PositiveX,
    /// -X
    NegativeX,
    /// +Y
    PositiveY,
    /// -Y
    NegativeY,
    /// +Z
    PositiveZ,
    /// -Z
    NegativeZ,
}

impl CubeFace {
    /// All faces in layer order
    pub const ALL: [CubeFace; 6] = [
        Self::PositiveX,
        Self::NegativeX,
        Self::PositiveY,
        Self::NegativeY,
        Self::PositiveZ,
        Self::NegativeZ,
    ];

    /// Layer index
    pub fn index(self) -> usize {
        match self {
            Self::PositiveX => 0,
            Self::NegativeX => 1,
            Self::PositiveY => 2,
            Self::NegativeY => 3,
            Self::PositiveZ => 4,
            Self::NegativeZ => 5,
        }
    }

    /// Outward axis of the face
    pub fn direction(self) -> Vec3 {
        match self {
            Self::PositiveX => Vec3::x(),
            Self::NegativeX => -Vec3::x(),
            Self::PositiveY => Vec3::y(),
            Self::NegativeY => -Vec3::y(),
            Self::PositiveZ => Vec3::z(),
            Self::NegativeZ => -Vec3::z(),
        }
    }

    /// Up vector used when rendering into the face
    pub fn up(self) -> Vec3 {
        match self {
            Self::PositiveY => Vec3::z(),
            Self::NegativeY => -Vec3::z(),
            _ => -Vec3::y(),
        }
    }

    /// View-space axes of the face: `(forward, right, up)`.
    ///
    /// Matches a right-handed look-at along [`CubeFace::direction`] with
    /// [`CubeFace::up`], so a 90 degree projection through these axes lands
    /// on the same texels a render into the face wrote.
    pub fn basis(self) -> (Vec3, Vec3, Vec3) {
        let forward = self.direction();
        let back = -forward;
        let right = self.up().cross(&back).normalize();
        let up = back.cross(&right);
        (forward, right, up)
    }

    /// Face whose major axis contains `direction`
    pub fn from_direction(direction: &Vec3) -> Self {
        let abs = direction.abs();
        if abs.x >= abs.y && abs.x >= abs.z {
            if direction.x >= 0.0 { Self::PositiveX } else { Self::NegativeX }
        } else if abs.y >= abs.z {
            if direction.y >= 0.0 { Self::PositiveY } else { Self::NegativeY }
        } else if direction.z >= 0.0 {
            Self::PositiveZ
        } else {
            Self::NegativeZ
        }
    }
}

/// One framebuffer attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentTarget {
    /// Whole 2D texture
    Texture(TextureId),
    /// One face of a cube texture
    CubeFace(TextureId, CubeFace),
}

impl AttachmentTarget {
    /// Underlying texture
    pub fn texture(self) -> TextureId {
        match self {
            Self::Texture(id) | Self::CubeFace(id, _) => id,
        }
    }
}

/// Description of a framebuffer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FramebufferDesc {
    /// Color attachments in draw-buffer order
    pub colors: Vec<AttachmentTarget>,
    /// Depth/stencil attachment
    pub depth: Option<AttachmentTarget>,
}

impl FramebufferDesc {
    /// Color-only framebuffer
    pub fn color(targets: &[TextureId]) -> Self {
        Self {
            colors: targets.iter().copied().map(AttachmentTarget::Texture).collect(),
            depth: None,
        }
    }

    /// Add a depth attachment
    pub fn with_depth(mut self, depth: TextureId) -> Self {
        self.depth = Some(AttachmentTarget::Texture(depth));
        self
    }
}

// -------------------------------------------------------------------------
// Pipeline state

/// Depth comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthFunc {
    /// Always passes (test disabled)
    Always,
    /// Never passes
    Never,
    /// Closer than stored
    Less,
    /// Closer or equal
    LEqual,
    /// Exactly equal
    Equal,
    /// Further than stored
    Greater,
}

impl DepthFunc {
    /// Evaluate the comparison
    pub fn passes(self, incoming: f32, stored: f32) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Less => incoming < stored,
            Self::LEqual => incoming <= stored,
            #[allow(clippy::float_cmp)]
            Self::Equal => incoming == stored,
            Self::Greater => incoming > stored,
        }
    }
}

/// Depth test and write configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthState {
    /// Comparison against the stored depth
    pub func: DepthFunc,
    /// Write passing fragments' depth
    pub write: bool,
}

impl DepthState {
    /// No test, no write
    pub const DISABLED: Self = Self { func: DepthFunc::Always, write: false };

    /// Test with `func`, optionally writing
    pub const fn new(func: DepthFunc, write: bool) -> Self {
        Self { func, write }
    }
}

impl Default for DepthState {
    fn default() -> Self {
        Self::new(DepthFunc::Less, true)
    }
}

/// Color blending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// Overwrite
    #[default]
    Replace,
    /// dst + src
    Additive,
    /// src * a + dst * (1 - a)
    Alpha,
}

/// Triangle culling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    /// Draw both sides
    None,
    /// Skip clockwise (back-facing) triangles
    #[default]
    Back,
    /// Skip counter-clockwise triangles
    Front,
}

/// Values for [`GraphicsDevice::clear`]; `None` leaves that buffer alone
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClearValues {
    /// Color for every active draw buffer
    pub color: Option<[f32; 4]>,
    /// Depth value
    pub depth: Option<f32>,
}

impl ClearValues {
    /// Clear color and depth
    pub fn all(color: [f32; 4], depth: f32) -> Self {
        Self { color: Some(color), depth: Some(depth) }
    }

    /// Clear only color
    pub fn color(color: [f32; 4]) -> Self {
        Self { color: Some(color), depth: None }
    }

    /// Clear only depth
    pub fn depth(depth: f32) -> Self {
        Self { color: None, depth: Some(depth) }
    }
}

/// Pixel rectangle, origin at the bottom-left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScissorRect {
    /// Left column
    pub x: u32,
    /// Bottom row
    pub y: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl ScissorRect {
    /// True if the pixel lies inside
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x - self.x < self.width && y - self.y < self.height
    }
}

// -------------------------------------------------------------------------
// Shaders

/// Uniform value
#[derive(Debug, Clone, PartialEq)]
pub enum Uniform {
    /// Integer (flags, counts)
    Int(i32),
    /// Scalar
    Float(f32),
    /// 3-vector
    Vec3(Vec3),
    /// 4-vector
    Vec4(Vec4),
    /// Matrix
    Mat4(Mat4),
    /// Matrix array (bone palettes)
    Mat4Array(Vec<Mat4>),
}

/// Uniform names understood by the built-in programs
pub mod uniforms {
    /// Model to world
    pub const MODEL: &str = "u_model";
    /// World to clip
    pub const VIEW_PROJECTION: &str = "u_view_projection";
    /// Camera position in world space
    pub const CAMERA_POSITION: &str = "u_camera_position";
    /// Bone palette for GPU skinning
    pub const BONE_PALETTE: &str = "u_bone_palette";

    /// Light color times intensity
    pub const LIGHT_COLOR: &str = "u_light_color";
    /// Direction light travels in (directional, spot)
    pub const LIGHT_DIRECTION: &str = "u_light_direction";
    /// Light position (point, spot)
    pub const LIGHT_POSITION: &str = "u_light_position";
    /// Radius of influence (point, spot)
    pub const LIGHT_RADIUS: &str = "u_light_radius";
    /// Cosines of the spot inner and outer half-angles, in x and y
    pub const SPOT_CONE: &str = "u_spot_cone";
    /// 1 when the light samples a shadow map
    pub const SHADOW_ENABLED: &str = "u_shadow_enabled";
    /// World to light clip space, for 2D shadow lookups
    pub const LIGHT_VIEW_PROJECTION: &str = "u_light_view_projection";

    /// Material base color (rgba)
    pub const BASE_COLOR: &str = "u_base_color";
    /// Material specular color
    pub const SPECULAR_COLOR: &str = "u_specular_color";
    /// Specular exponent
    pub const SHININESS: &str = "u_shininess";
    /// Emitted radiance
    pub const EMISSIVE: &str = "u_emissive";
    /// Screen-space refraction offset scale
    pub const REFRACTION: &str = "u_refraction";
    /// Summed ambient radiance for forward-shaded passes
    pub const AMBIENT: &str = "u_ambient";

    /// Bright-pass threshold
    pub const THRESHOLD: &str = "u_threshold";
    /// Tone-mapping exposure
    pub const EXPOSURE: &str = "u_exposure";
    /// Bloom contribution in the final composite
    pub const BLOOM_INTENSITY: &str = "u_bloom_intensity";
}

/// Texture units used by the built-in programs
pub mod units {
    /// Diffuse light accumulation
    pub const LIGHT_DIFFUSE: u32 = 0;
    /// Specular light accumulation
    pub const LIGHT_SPECULAR: u32 = 1;
    /// 2D shadow moments
    pub const SHADOW_MAP: u32 = 2;
    /// Cube shadow moments
    pub const SHADOW_CUBE: u32 = 3;
    /// Generic source for screen passes
    pub const SOURCE: u32 = 4;
    /// Blurred bloom
    pub const BLOOM: u32 = 5;
    /// Scene color snapshot for refraction
    pub const SCENE_COLOR: u32 = 6;
}

/// Light pass flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightType {
    /// Ambient
    Ambient,
    /// Directional
    Directional,
    /// Point
    Point,
    /// Spot
    Spot,
}

/// What a shader computes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShaderProgram {
    /// Depth only; color output ignored
    DepthOnly,
    /// Window-space depth moments for 2D shadow maps
    ShadowDepth,
    /// Distance-to-light moments for cube shadow maps
    ShadowDistance,
    /// Per-light diffuse and specular accumulation (two outputs)
    LightAccumulation(LightType),
    /// Lit material resolve reading the accumulation buffers
    LitMaterial,
    /// Material that ignores lighting
    UnlitMaterial,
    /// Forward-shaded alpha blended material
    Blended,
    /// Material sampling the scene color snapshot
    Refractive,
    /// Bright-region extraction
    BrightPass,
    /// One direction of a separable gaussian blur
    Blur {
        /// Kernel size
        kernel: BlurKernel,
        /// Horizontal when true, vertical otherwise
        horizontal: bool,
    },
    /// Tone-map HDR into LDR with optional bloom
    ToneMap,
    /// Plain copy of the source
    Copy,
    /// Application shader source; backends may not support it
    External(String),
}

impl ShaderProgram {
    /// True for screen-space programs drawn with a fullscreen quad
    pub fn is_screen_pass(&self) -> bool {
        matches!(
            self,
            Self::BrightPass | Self::Blur { .. } | Self::ToneMap | Self::Copy
        )
    }
}

/// Shader to compile
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderDesc {
    /// Debug name
    pub name: String,
    /// Program
    pub program: ShaderProgram,
    /// Vertex stage applies the bone palette
    pub skinned: bool,
}

impl ShaderDesc {
    /// Unskinned shader
    pub fn new(name: impl Into<String>, program: ShaderProgram) -> Self {
        Self { name: name.into(), program, skinned: false }
    }

    /// Builder-style skinning flag
    pub fn with_skinning(mut self, skinned: bool) -> Self {
        self.skinned = skinned;
        self
    }
}

/// Geometry pushed into a vertex array
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VertexData {
    /// Vertices in the fixed layout
    pub vertices: Vec<Vertex>,
    /// Triangle indices
    pub indices: Vec<u32>,
    /// Per-vertex bone influences for GPU skinning
    pub skin: Option<Vec<SkinWeights>>,
}

/// Counters a device keeps across its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceStats {
    /// Draw calls that ran
    pub draws: u64,
    /// Draw calls skipped because no shader was current
    pub skipped_draws: u64,
    /// Fragments that passed the depth test
    pub fragments: u64,
}

/// Opaque graphics resource factory and command sink.
///
/// Every call is made from the thread that executes the front command
/// queue. Failures are reported, never panicked on; the caller decides
/// whether to skip the affected draw.
pub trait GraphicsDevice: Send {
    /// Create a 2D texture
    fn create_texture_2d(&mut self, id: TextureId, desc: &TextureDesc) -> RenderResult<()>;
    /// Create a cube texture with square faces
    fn create_texture_cube(&mut self, id: TextureId, size: u32, format: TextureFormat) -> RenderResult<()>;
    /// Create a framebuffer over existing textures
    fn create_framebuffer(&mut self, id: FramebufferId, desc: &FramebufferDesc) -> RenderResult<()>;
    /// Compile a shader
    fn create_shader(&mut self, id: ShaderId, desc: &ShaderDesc) -> RenderResult<()>;
    /// Create an empty vertex array
    fn create_vertex_array(&mut self, id: VertexArrayId) -> RenderResult<()>;

    /// Delete a texture
    fn delete_texture(&mut self, id: TextureId) -> RenderResult<()>;
    /// Delete a framebuffer
    fn delete_framebuffer(&mut self, id: FramebufferId) -> RenderResult<()>;
    /// Delete a shader
    fn delete_shader(&mut self, id: ShaderId) -> RenderResult<()>;
    /// Delete a vertex array
    fn delete_vertex_array(&mut self, id: VertexArrayId) -> RenderResult<()>;

    /// Replace a 2D texture's texels (row-major, bottom row first)
    fn push_texture_data(&mut self, id: TextureId, texels: &[[f32; 4]]) -> RenderResult<()>;
    /// Replace a vertex array's geometry
    fn push_vertex_data(&mut self, id: VertexArrayId, data: VertexData) -> RenderResult<()>;
    /// Set a texture's sampling filter
    fn set_texture_2d_filter(&mut self, id: TextureId, filter: TextureFilter) -> RenderResult<()>;
    /// Set a texture's addressing mode
    fn set_texture_2d_wrap_mode(&mut self, id: TextureId, wrap: WrapMode) -> RenderResult<()>;
    /// Select which color attachments receive fragment outputs, in order
    fn set_draw_buffers(&mut self, framebuffer: FramebufferId, buffers: &[usize]) -> RenderResult<()>;

    /// Make a framebuffer the render target
    fn bind_framebuffer(&mut self, id: FramebufferId) -> RenderResult<()>;
    /// Clear the bound framebuffer (honours the scissor rectangle)
    fn clear(&mut self, values: &ClearValues) -> RenderResult<()>;
    /// Depth test/write state
    fn set_depth_state(&mut self, state: DepthState);
    /// Blend state
    fn set_blend_mode(&mut self, mode: BlendMode);
    /// Enable or disable color writes
    fn set_color_write(&mut self, enabled: bool);
    /// Face culling
    fn set_cull_mode(&mut self, mode: CullMode);
    /// Scissor rectangle, `None` to disable
    fn set_scissor(&mut self, rect: Option<ScissorRect>);
    /// Make a shader current; on failure no shader is current
    fn use_shader(&mut self, id: ShaderId) -> RenderResult<()>;
    /// Set a uniform for subsequent draws
    fn set_uniform(&mut self, name: &'static str, value: Uniform);
    /// Bind a texture to a unit
    fn bind_texture(&mut self, unit: u32, id: TextureId) -> RenderResult<()>;
    /// Draw a vertex array with the current state
    fn draw(&mut self, vertex_array: VertexArrayId) -> RenderResult<()>;

    /// Size of a texture (per face for cube maps)
    fn texture_size(&self, id: TextureId) -> Option<(u32, u32)>;
    /// Read back a texture's texels (every face, in layer order, for cube maps)
    fn read_texture(&self, id: TextureId) -> RenderResult<Vec<[f32; 4]>>;
    /// Lifetime counters
    fn stats(&self) -> DeviceStats;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Mat4Ext, Point3};
    use approx::assert_relative_eq;

    #[test]
    fn test_ids_are_unique_across_kinds() {
        let ids = ResourceIds::new();
        let a = ids.texture().0;
        let b = ids.shader().0;
        let c = ids.vertex_array().0;
        assert!(a != b && b != c && a != c);
    }

    #[test]
    fn test_cube_basis_matches_look_at() {
        for face in CubeFace::ALL {
            let view = Mat4::look_at(Vec3::zeros(), face.direction(), face.up());
            let (forward, right, up) = face.basis();
            let probe = forward + right * 0.25 + up * 0.5;
            let view_space = view.transform_point(&Point3::from(probe));
            assert_relative_eq!(view_space.x, 0.25, epsilon = 1e-5);
            assert_relative_eq!(view_space.y, 0.5, epsilon = 1e-5);
            assert_relative_eq!(view_space.z, -1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_face_from_direction() {
        assert_eq!(CubeFace::from_direction(&Vec3::new(0.2, -3.0, 1.0)), CubeFace::NegativeY);
        assert_eq!(CubeFace::from_direction(&Vec3::new(0.0, 0.0, 2.0)), CubeFace::PositiveZ);
    }

    #[test]
    fn test_scissor_contains() {
        let rect = ScissorRect { x: 2, y: 2, width: 3, height: 1 };
        assert!(rect.contains(4, 2));
        assert!(!rect.contains(5, 2));
        assert!(!rect.contains(2, 3));
    }
}
