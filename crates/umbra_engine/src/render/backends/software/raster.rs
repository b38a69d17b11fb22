//! Triangle clipping and scan conversion

use crate::foundation::math::Vec2;
use crate::render::device::{CullMode, ScissorRect};

use super::programs::{ClipVertex, Varyings};

const MIN_W: f32 = 1e-6;

/// Vertex after the perspective divide, in window coordinates
#[derive(Debug, Clone, Copy)]
pub struct ScreenVertex {
    pub position: Vec2,
    /// Window depth in [0, 1]
    pub depth: f32,
    pub inv_w: f32,
    pub varyings: Varyings,
}

impl ScreenVertex {
    pub fn from_clip(vertex: &ClipVertex, width: u32, height: u32) -> Self {
        let inv_w = 1.0 / vertex.clip.w;
        let ndc = vertex.clip.xyz() * inv_w;
        Self {
            position: Vec2::new(
                (ndc.x * 0.5 + 0.5) * width as f32,
                (ndc.y * 0.5 + 0.5) * height as f32,
            ),
            depth: ndc.z * 0.5 + 0.5,
            inv_w,
            varyings: vertex.varyings,
        }
    }
}

/// Covered pixel with interpolated attributes
#[derive(Debug, Clone, Copy)]
pub struct Fragment {
    pub x: u32,
    pub y: u32,
    pub depth: f32,
    pub varyings: Varyings,
}

/// Half-open pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBounds {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelBounds {
    /// Whole target, narrowed by the scissor rectangle
    pub fn new(width: u32, height: u32, scissor: Option<ScissorRect>) -> Self {
        let full = Self { x0: 0, y0: 0, x1: width, y1: height };
        match scissor {
            Some(rect) => Self {
                x0: rect.x.min(width),
                y0: rect.y.min(height),
                x1: rect.x.saturating_add(rect.width).min(width),
                y1: rect.y.saturating_add(rect.height).min(height),
            },
            None => full,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }
}

/// Clip a triangle against the near plane (`z >= -w`).
///
/// Returns a convex polygon of zero, three or four vertices.
pub fn clip_near(triangle: [ClipVertex; 3]) -> Vec<ClipVertex> {
    let distance = |v: &ClipVertex| v.clip.z + v.clip.w;
    if triangle.iter().all(|v| distance(v) >= 0.0 && v.clip.w > MIN_W) {
        return triangle.to_vec();
    }

    let mut polygon = Vec::with_capacity(4);
    for i in 0..3 {
        let current = &triangle[i];
        let next = &triangle[(i + 1) % 3];
        let (dc, dn) = (distance(current), distance(next));
        if dc >= 0.0 {
            polygon.push(*current);
        }
        if (dc >= 0.0) != (dn >= 0.0) {
            let t = dc / (dc - dn);
            polygon.push(ClipVertex {
                clip: current.clip.lerp(&next.clip, t),
                varyings: current.varyings.lerp(&next.varyings, t),
            });
        }
    }
    polygon.retain(|v| v.clip.w > MIN_W);
    if polygon.len() < 3 {
        polygon.clear();
    }
    polygon
}

fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Top-left fill convention for a counter-clockwise triangle with y up
fn is_top_left(a: Vec2, b: Vec2) -> bool {
    let d = b - a;
    d.y < 0.0 || (d.y == 0.0 && d.x < 0.0)
}

fn covers(weight: f32, top_left: bool) -> bool {
    weight > 0.0 || (weight == 0.0 && top_left)
}

/// Scan-convert one triangle, calling `emit` for every covered pixel centre.
///
/// Returns false when the triangle was culled or degenerate.
pub fn rasterize(
    triangle: [ScreenVertex; 3],
    cull: CullMode,
    bounds: PixelBounds,
    mut emit: impl FnMut(Fragment),
) -> bool {
    let [mut v0, mut v1, mut v2] = triangle;
    let area = edge(v0.position, v1.position, v2.position);
    if area == 0.0 || !area.is_finite() {
        return false;
    }
    let front_facing = area > 0.0;
    match cull {
        CullMode::Back if !front_facing => return false,
        CullMode::Front if front_facing => return false,
        _ => {}
    }
    if !front_facing {
        std::mem::swap(&mut v1, &mut v2);
    }
    let area = area.abs();
    let (p0, p1, p2) = (v0.position, v1.position, v2.position);

    let min_x = p0.x.min(p1.x).min(p2.x).floor().max(bounds.x0 as f32);
    let min_y = p0.y.min(p1.y).min(p2.y).floor().max(bounds.y0 as f32);
    let max_x = p0.x.max(p1.x).max(p2.x).ceil().min(bounds.x1 as f32);
    let max_y = p0.y.max(p1.y).max(p2.y).ceil().min(bounds.y1 as f32);
    if min_x >= max_x || min_y >= max_y {
        return true;
    }

    let top_left = [is_top_left(p1, p2), is_top_left(p2, p0), is_top_left(p0, p1)];
    for y in (min_y as u32)..(max_y as u32) {
        for x in (min_x as u32)..(max_x as u32) {
            let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            let w = [edge(p1, p2, p), edge(p2, p0, p), edge(p0, p1, p)];
            if !(0..3).all(|i| covers(w[i], top_left[i])) {
                continue;
            }
            let l = [w[0] / area, w[1] / area, w[2] / area];
            let depth = l[0] * v0.depth + l[1] * v1.depth + l[2] * v2.depth;

            let mut perspective = [l[0] * v0.inv_w, l[1] * v1.inv_w, l[2] * v2.inv_w];
            let sum: f32 = perspective.iter().sum();
            if sum.abs() > f32::EPSILON {
                perspective.iter_mut().for_each(|p| *p /= sum);
            } else {
                perspective = l;
            }

            emit(Fragment {
                x,
                y,
                depth,
                varyings: Varyings::blend([&v0.varyings, &v1.varyings, &v2.varyings], perspective),
            });
        }
    }
    true
}
