//! Built-in shader programs for the software device
//!
//! Each [`ShaderProgram`] maps to a vertex stage shared by every mesh
//! program (so depth-equal passes reproduce the pre-pass depth exactly)
//! and a fragment function below.

use std::collections::HashMap;

use crate::animation::{skinning, SkinWeights};
use crate::assets::mesh::Vertex;
use crate::foundation::math::{utils, Mat3, Mat4, Vec2, Vec3, Vec4};
use crate::render::device::{uniforms, units, LightType, ShaderDesc, ShaderProgram, Uniform};

/// Most color outputs a program writes
pub const MAX_OUTPUTS: usize = 2;

const SHADOW_BIAS: f32 = 0.002;
const MIN_VARIANCE: f32 = 1e-5;
const LIGHT_BLEED_REDUCTION: f32 = 0.2;

/// Program validated by `create_shader`
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    pub program: ShaderProgram,
    pub skinned: bool,
    blur_weights: Vec<f32>,
}

/// Validate a shader description
pub fn compile(desc: &ShaderDesc) -> Result<CompiledProgram, String> {
    if let ShaderProgram::External(source) = &desc.program {
        return Err(format!("external shader '{source}' is not supported by the software device"));
    }
    if desc.skinned && desc.program.is_screen_pass() {
        return Err("screen passes cannot be skinned".to_string());
    }
    let blur_weights = match desc.program {
        ShaderProgram::Blur { kernel, .. } => kernel.weights(),
        _ => Vec::new(),
    };
    Ok(CompiledProgram {
        program: desc.program.clone(),
        skinned: desc.skinned,
        blur_weights,
    })
}

// -------------------------------------------------------------------------
// Interfaces

/// Interpolated per-vertex outputs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Varyings {
    pub world: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl Varyings {
    /// Barycentric blend of three vertices
    pub fn blend(v: [&Varyings; 3], w: [f32; 3]) -> Self {
        Self {
            world: v[0].world * w[0] + v[1].world * w[1] + v[2].world * w[2],
            normal: v[0].normal * w[0] + v[1].normal * w[1] + v[2].normal * w[2],
            uv: v[0].uv * w[0] + v[1].uv * w[1] + v[2].uv * w[2],
        }
    }

    /// Linear blend of two vertices
    pub fn lerp(&self, other: &Varyings, t: f32) -> Self {
        Self {
            world: self.world.lerp(&other.world, t),
            normal: self.normal.lerp(&other.normal, t),
            uv: self.uv.lerp(&other.uv, t),
        }
    }
}

/// Vertex stage output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipVertex {
    pub clip: Vec4,
    pub varyings: Varyings,
}

/// Read-only view of the current uniform values
pub struct Uniforms<'a> {
    values: &'a HashMap<&'static str, Uniform>,
}

impl<'a> Uniforms<'a> {
    pub fn new(values: &'a HashMap<&'static str, Uniform>) -> Self {
        Self { values }
    }

    pub fn float(&self, name: &str, default: f32) -> f32 {
        match self.values.get(name) {
            Some(Uniform::Float(v)) => *v,
            Some(Uniform::Int(v)) => *v as f32,
            _ => default,
        }
    }

    pub fn int(&self, name: &str, default: i32) -> i32 {
        match self.values.get(name) {
            Some(Uniform::Int(v)) => *v,
            _ => default,
        }
    }

    pub fn vec3(&self, name: &str, default: Vec3) -> Vec3 {
        match self.values.get(name) {
            Some(Uniform::Vec3(v)) => *v,
            Some(Uniform::Vec4(v)) => v.xyz(),
            _ => default,
        }
    }

    pub fn vec4(&self, name: &str, default: Vec4) -> Vec4 {
        match self.values.get(name) {
            Some(Uniform::Vec4(v)) => *v,
            Some(Uniform::Vec3(v)) => Vec4::new(v.x, v.y, v.z, 1.0),
            _ => default,
        }
    }

    pub fn mat4(&self, name: &str) -> Mat4 {
        match self.values.get(name) {
            Some(Uniform::Mat4(m)) => *m,
            _ => Mat4::identity(),
        }
    }

    pub fn palette(&self, name: &str) -> Option<&'a [Mat4]> {
        match self.values.get(name) {
            Some(Uniform::Mat4Array(palette)) => Some(palette.as_slice()),
            _ => None,
        }
    }
}

/// Texture access for fragment functions
pub trait Textures {
    /// Filtered 2D lookup; zero when nothing is bound
    fn sample(&self, unit: u32, uv: Vec2) -> Vec4;
    /// Unfiltered texel at integer coordinates
    fn fetch(&self, unit: u32, x: u32, y: u32) -> Vec4;
    /// Cube lookup
    fn sample_cube(&self, unit: u32, direction: &Vec3) -> Vec4;
    /// Size of the bound texture
    fn size(&self, unit: u32) -> Option<(u32, u32)>;
}

/// Per-fragment inputs
#[derive(Debug, Clone, Copy)]
pub struct FragmentInput {
    pub x: u32,
    pub y: u32,
    /// Window depth in [0, 1]
    pub depth: f32,
    pub varyings: Varyings,
    pub target_size: (u32, u32),
}

/// Colors written to the active draw buffers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FragmentOutput {
    pub colors: [Vec4; MAX_OUTPUTS],
    pub count: usize,
}

impl FragmentOutput {
    fn none() -> Self {
        Self { colors: [Vec4::zeros(); MAX_OUTPUTS], count: 0 }
    }

    fn one(color: Vec4) -> Self {
        Self { colors: [color, Vec4::zeros()], count: 1 }
    }

    fn two(first: Vec4, second: Vec4) -> Self {
        Self { colors: [first, second], count: 2 }
    }
}

// -------------------------------------------------------------------------
// Vertex stage

/// Per-draw vertex transform state
pub struct VertexStage<'a> {
    screen: bool,
    model: Mat4,
    normal_matrix: Mat3,
    view_projection: Mat4,
    palette: Option<&'a [Mat4]>,
}

impl<'a> VertexStage<'a> {
    pub fn new(program: &CompiledProgram, uniforms: &Uniforms<'a>) -> Self {
        let model = uniforms.mat4(uniforms::MODEL);
        let upper: Mat3 = model.fixed_view::<3, 3>(0, 0).into_owned();
        let normal_matrix = upper.try_inverse().map_or(upper, |inverse| inverse.transpose());
        Self {
            screen: program.program.is_screen_pass(),
            model,
            normal_matrix,
            view_projection: uniforms.mat4(uniforms::VIEW_PROJECTION),
            palette: if program.skinned { uniforms.palette(uniforms::BONE_PALETTE) } else { None },
        }
    }

    pub fn run(&self, vertex: &Vertex, skin: Option<&SkinWeights>) -> ClipVertex {
        if self.screen {
            let p = vertex.position;
            return ClipVertex {
                clip: Vec4::new(p[0], p[1], p[2], 1.0),
                varyings: Varyings {
                    world: Vec3::from(p),
                    normal: vertex.normal_vec(),
                    uv: Vec2::from(vertex.tex_coord),
                },
            };
        }

        let skinned;
        let vertex = match (self.palette, skin) {
            (Some(palette), Some(weights)) => match weights.blend_matrix(palette) {
                Some(matrix) => {
                    skinned = skinning::transform_vertex(vertex, &matrix);
                    &skinned
                }
                None => vertex,
            },
            _ => vertex,
        };

        let p = vertex.position;
        let world = self.model * Vec4::new(p[0], p[1], p[2], 1.0);
        ClipVertex {
            clip: self.view_projection * world,
            varyings: Varyings {
                world: world.xyz(),
                normal: self.normal_matrix * vertex.normal_vec(),
                uv: Vec2::from(vertex.tex_coord),
            },
        }
    }
}

// -------------------------------------------------------------------------
// Fragment stage

/// Run a program's fragment function. `None` discards the fragment.
pub fn shade(
    program: &CompiledProgram,
    input: &FragmentInput,
    uniforms: &Uniforms<'_>,
    textures: &dyn Textures,
) -> Option<FragmentOutput> {
    let v = &input.varyings;
    match &program.program {
        ShaderProgram::DepthOnly => Some(FragmentOutput::none()),
        ShaderProgram::ShadowDepth => Some(FragmentOutput::one(moments(input.depth))),
        ShaderProgram::ShadowDistance => {
            let radius = uniforms.float(uniforms::LIGHT_RADIUS, 1.0).max(f32::EPSILON);
            let distance = (v.world - uniforms.vec3(uniforms::LIGHT_POSITION, Vec3::zeros())).norm();
            Some(FragmentOutput::one(moments(distance / radius)))
        }
        ShaderProgram::LightAccumulation(light) => {
            let (diffuse, specular) = accumulate_light(*light, v, uniforms, textures);
            Some(FragmentOutput::two(opaque(diffuse), opaque(specular)))
        }
        ShaderProgram::LitMaterial => {
            let diffuse = textures.fetch(units::LIGHT_DIFFUSE, input.x, input.y).xyz();
            let specular = textures.fetch(units::LIGHT_SPECULAR, input.x, input.y).xyz();
            let base = uniforms.vec4(uniforms::BASE_COLOR, Vec4::repeat(1.0));
            let color = base.xyz().component_mul(&diffuse)
                + uniforms.vec3(uniforms::SPECULAR_COLOR, Vec3::zeros()).component_mul(&specular)
                + uniforms.vec3(uniforms::EMISSIVE, Vec3::zeros());
            Some(FragmentOutput::one(opaque(color)))
        }
        ShaderProgram::UnlitMaterial => {
            let base = uniforms.vec4(uniforms::BASE_COLOR, Vec4::repeat(1.0));
            let color = base.xyz() + uniforms.vec3(uniforms::EMISSIVE, Vec3::zeros());
            Some(FragmentOutput::one(opaque(color)))
        }
        ShaderProgram::Blended => {
            let base = uniforms.vec4(uniforms::BASE_COLOR, Vec4::repeat(1.0));
            let mut light = uniforms.vec3(uniforms::AMBIENT, Vec3::zeros());
            if let Some(normal) = v.normal.try_normalize(f32::EPSILON) {
                let towards = -uniforms.vec3(uniforms::LIGHT_DIRECTION, -Vec3::z());
                let towards = towards.try_normalize(f32::EPSILON).unwrap_or_else(Vec3::z);
                light += uniforms.vec3(uniforms::LIGHT_COLOR, Vec3::zeros()) * normal.dot(&towards).max(0.0);
            }
            let color = base.xyz().component_mul(&light) + uniforms.vec3(uniforms::EMISSIVE, Vec3::zeros());
            Some(FragmentOutput::one(Vec4::new(color.x, color.y, color.z, base.w)))
        }
        ShaderProgram::Refractive => {
            let base = uniforms.vec4(uniforms::BASE_COLOR, Vec4::repeat(1.0));
            let (width, height) = input.target_size;
            let screen = Vec2::new(
                (input.x as f32 + 0.5) / width.max(1) as f32,
                (input.y as f32 + 0.5) / height.max(1) as f32,
            );
            let offset = v.normal.try_normalize(f32::EPSILON).unwrap_or_else(Vec3::zeros).xy()
                * uniforms.float(uniforms::REFRACTION, 0.0);
            let scene = textures.sample(units::SCENE_COLOR, screen + offset).xyz();
            let color = scene.component_mul(&base.xyz()) + uniforms.vec3(uniforms::EMISSIVE, Vec3::zeros());
            Some(FragmentOutput::one(Vec4::new(color.x, color.y, color.z, base.w)))
        }
        ShaderProgram::BrightPass => {
            let color = textures.sample(units::SOURCE, v.uv).xyz();
            let brightness = color.max();
            let threshold = uniforms.float(uniforms::THRESHOLD, 1.0);
            let factor = (brightness - threshold).max(0.0) / brightness.max(1e-4);
            Some(FragmentOutput::one(opaque(color * factor)))
        }
        ShaderProgram::Blur { horizontal, .. } => {
            let (width, height) = textures.size(units::SOURCE).unwrap_or((1, 1));
            let step = if *horizontal {
                Vec2::new(1.0 / width.max(1) as f32, 0.0)
            } else {
                Vec2::new(0.0, 1.0 / height.max(1) as f32)
            };
            let radius = (program.blur_weights.len() / 2) as f32;
            let sum = program
                .blur_weights
                .iter()
                .enumerate()
                .fold(Vec4::zeros(), |acc, (i, weight)| {
                    acc + textures.sample(units::SOURCE, v.uv + step * (i as f32 - radius)) * *weight
                });
            Some(FragmentOutput::one(sum))
        }
        ShaderProgram::ToneMap => {
            let hdr = textures.sample(units::SOURCE, v.uv).xyz()
                + textures.sample(units::BLOOM, v.uv).xyz() * uniforms.float(uniforms::BLOOM_INTENSITY, 0.0);
            let exposure = uniforms.float(uniforms::EXPOSURE, 1.0);
            let mapped = hdr.map(|c| 1.0 - (-c.max(0.0) * exposure).exp());
            Some(FragmentOutput::one(opaque(mapped)))
        }
        ShaderProgram::Copy => Some(FragmentOutput::one(textures.sample(units::SOURCE, v.uv))),
        ShaderProgram::External(_) => None,
    }
}

fn opaque(color: Vec3) -> Vec4 {
    Vec4::new(color.x, color.y, color.z, 1.0)
}

fn moments(depth: f32) -> Vec4 {
    Vec4::new(depth, depth * depth, 0.0, 0.0)
}

/// Quadratic falloff reaching zero at `radius`
pub fn attenuation(distance: f32, radius: f32) -> f32 {
    if radius <= 0.0 {
        return 0.0;
    }
    let t = (1.0 - distance / radius).clamp(0.0, 1.0);
    t * t
}

/// Chebyshev upper bound on the lit fraction for variance shadow maps
pub fn chebyshev(moments: Vec2, depth: f32) -> f32 {
    if depth <= moments.x {
        return 1.0;
    }
    let variance = (moments.y - moments.x * moments.x).max(MIN_VARIANCE);
    let delta = depth - moments.x;
    let p_max = variance / (variance + delta * delta);
    ((p_max - LIGHT_BLEED_REDUCTION) / (1.0 - LIGHT_BLEED_REDUCTION)).clamp(0.0, 1.0)
}

fn accumulate_light(light: LightType, v: &Varyings, uniforms: &Uniforms<'_>, textures: &dyn Textures) -> (Vec3, Vec3) {
    let color = uniforms.vec3(uniforms::LIGHT_COLOR, Vec3::zeros());
    if light == LightType::Ambient {
        return (color, Vec3::zeros());
    }
    let Some(normal) = v.normal.try_normalize(f32::EPSILON) else {
        return (Vec3::zeros(), Vec3::zeros());
    };

    let light_position = uniforms.vec3(uniforms::LIGHT_POSITION, Vec3::zeros());
    let radius = uniforms.float(uniforms::LIGHT_RADIUS, 0.0);
    let (towards, falloff) = match light {
        LightType::Directional => {
            let direction = uniforms.vec3(uniforms::LIGHT_DIRECTION, -Vec3::z());
            (-direction.try_normalize(f32::EPSILON).unwrap_or_else(|| -Vec3::z()), 1.0)
        }
        _ => {
            let offset = light_position - v.world;
            let distance = offset.norm();
            let towards = offset.try_normalize(f32::EPSILON).unwrap_or(normal);
            let mut falloff = attenuation(distance, radius);
            if light == LightType::Spot {
                let axis = uniforms
                    .vec3(uniforms::LIGHT_DIRECTION, -Vec3::z())
                    .try_normalize(f32::EPSILON)
                    .unwrap_or_else(|| -Vec3::z());
                let cone = uniforms.vec4(uniforms::SPOT_CONE, Vec4::new(1.0, 0.0, 0.0, 0.0));
                falloff *= utils::smoothstep(cone.y, cone.x, (-towards).dot(&axis));
            }
            (towards, falloff)
        }
    };

    let n_dot_l = normal.dot(&towards).max(0.0);
    if n_dot_l <= 0.0 || falloff <= 0.0 {
        return (Vec3::zeros(), Vec3::zeros());
    }

    let shadow = if uniforms.int(uniforms::SHADOW_ENABLED, 0) == 0 {
        1.0
    } else if light == LightType::Point {
        let offset = v.world - light_position;
        let stored = textures.sample_cube(units::SHADOW_CUBE, &offset).xy();
        chebyshev(stored, offset.norm() / radius.max(f32::EPSILON) - SHADOW_BIAS)
    } else {
        shadow_2d(v.world, uniforms, textures)
    };

    let camera = uniforms.vec3(uniforms::CAMERA_POSITION, Vec3::zeros());
    let view = (camera - v.world).try_normalize(f32::EPSILON).unwrap_or(normal);
    let half = (towards + view).try_normalize(f32::EPSILON).unwrap_or(normal);
    let shininess = uniforms.float(uniforms::SHININESS, 32.0).max(1.0);
    let specular = normal.dot(&half).max(0.0).powf(shininess);

    let scale = falloff * shadow;
    (color * (n_dot_l * scale), color * (specular * scale))
}

fn shadow_2d(world: Vec3, uniforms: &Uniforms<'_>, textures: &dyn Textures) -> f32 {
    let clip = uniforms.mat4(uniforms::LIGHT_VIEW_PROJECTION) * Vec4::new(world.x, world.y, world.z, 1.0);
    if clip.w <= f32::EPSILON {
        return 1.0;
    }
    let ndc = clip.xyz() / clip.w;
    let uv = Vec2::new(ndc.x * 0.5 + 0.5, ndc.y * 0.5 + 0.5);
    if !(0.0..=1.0).contains(&uv.x) || !(0.0..=1.0).contains(&uv.y) || ndc.z > 1.0 {
        return 1.0;
    }
    let stored = textures.sample(units::SHADOW_MAP, uv).xy();
    chebyshev(stored, ndc.z * 0.5 + 0.5 - SHADOW_BIAS)
}
