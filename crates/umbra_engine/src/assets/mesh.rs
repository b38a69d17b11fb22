//! Mesh geometry in the engine's fixed vertex layout
//!
//! Every mesh uses the same interleaved layout: position, texture
//! coordinate, normal, tangent, bitangent. [`VertexAttributes`] records
//! which of those the importer actually provided, so derived data
//! (tangent frames) is only generated when its inputs exist.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{Vec2, Vec3};
use crate::spatial::AABB;

/// Interleaved vertex with the full tangent frame
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    /// Position in model space
    pub position: [f32; 3],
    /// Texture coordinates
    pub tex_coord: [f32; 2],
    /// Unit normal
    pub normal: [f32; 3],
    /// Unit tangent (+U direction)
    pub tangent: [f32; 3],
    /// Unit bitangent (+V direction)
    pub bitangent: [f32; 3],
}

impl Vertex {
    /// Create a vertex without a tangent frame
    pub fn new(position: [f32; 3], tex_coord: [f32; 2], normal: [f32; 3]) -> Self {
        Self {
            position,
            tex_coord,
            normal,
            tangent: [0.0; 3],
            bitangent: [0.0; 3],
        }
    }

    /// Position as a vector
    pub fn position_vec(&self) -> Vec3 {
        Vec3::from(self.position)
    }

    /// Normal as a vector
    pub fn normal_vec(&self) -> Vec3 {
        Vec3::from(self.normal)
    }
}

bitflags! {
    /// Vertex attributes present in a mesh
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VertexAttributes: u8 {
        /// Positions
        const POSITION = 1 << 0;
        /// Texture coordinates
        const TEX_COORD = 1 << 1;
        /// Normals
        const NORMAL = 1 << 2;
        /// Tangents
        const TANGENT = 1 << 3;
        /// Bitangents
        const BITANGENT = 1 << 4;
    }
}

impl VertexAttributes {
    /// Attributes required to derive tangents and bitangents
    pub const TANGENT_INPUTS: Self = Self::POSITION.union(Self::TEX_COORD).union(Self::NORMAL);
}

/// Indexed triangle list
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    /// Vertex data
    pub vertices: Vec<Vertex>,
    /// Triangle indices
    pub indices: Vec<u32>,
    /// Attributes the vertices actually carry
    pub attributes: VertexAttributes,
}

impl MeshData {
    /// Create a mesh with an explicit attribute set
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>, attributes: VertexAttributes) -> Self {
        Self { vertices, indices, attributes }
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of whole triangles
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Model-space bounds, `None` for an empty mesh
    pub fn bounds(&self) -> Option<AABB> {
        AABB::from_points(self.vertices.iter().map(Vertex::position_vec))
    }

    /// True if every index refers to an existing vertex
    pub fn indices_valid(&self) -> bool {
        let count = self.vertices.len();
        self.indices.iter().all(|&i| (i as usize) < count)
    }

    /// Derive per-vertex tangents and bitangents from UVs.
    ///
    /// Returns `false` and leaves the mesh untouched when positions, normals
    /// or texture coordinates are missing, or when an index is out of range.
    pub fn generate_tangents(&mut self) -> bool {
        if !self.attributes.contains(VertexAttributes::TANGENT_INPUTS) || !self.indices_valid() {
            log::debug!("Skipping tangent generation: attributes {:?}", self.attributes);
            return false;
        }

        let mut tangents = vec![Vec3::zeros(); self.vertices.len()];
        let mut bitangents = vec![Vec3::zeros(); self.vertices.len()];

        for triangle in self.indices.chunks_exact(3) {
            let [i0, i1, i2] = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];
            let (v0, v1, v2) = (&self.vertices[i0], &self.vertices[i1], &self.vertices[i2]);

            let edge1 = v1.position_vec() - v0.position_vec();
            let edge2 = v2.position_vec() - v0.position_vec();
            let duv1 = Vec2::from(v1.tex_coord) - Vec2::from(v0.tex_coord);
            let duv2 = Vec2::from(v2.tex_coord) - Vec2::from(v0.tex_coord);

            let det = duv1.x * duv2.y - duv2.x * duv1.y;
            if det.abs() <= f32::EPSILON {
                continue;
            }
            let r = 1.0 / det;
            let tangent = (edge1 * duv2.y - edge2 * duv1.y) * r;
            let bitangent = (edge2 * duv1.x - edge1 * duv2.x) * r;

            for i in [i0, i1, i2] {
                tangents[i] += tangent;
                bitangents[i] += bitangent;
            }
        }

        for ((vertex, tangent), bitangent) in self.vertices.iter_mut().zip(tangents).zip(bitangents) {
            let normal = vertex.normal_vec();
            // Gram-Schmidt against the normal
            let t = tangent - normal * normal.dot(&tangent);
            let t = t.try_normalize(f32::EPSILON).unwrap_or_else(|| any_perpendicular(&normal));
            let handedness = if normal.cross(&t).dot(&bitangent) < 0.0 { -1.0 } else { 1.0 };
            let b = normal.cross(&t) * handedness;
            vertex.tangent = t.into();
            vertex.bitangent = b.into();
        }

        self.attributes |= VertexAttributes::TANGENT | VertexAttributes::BITANGENT;
        true
    }

    /// Axis-aligned cube centered at the origin with edge length `2 * half_extent`
    pub fn cube(half_extent: f32) -> Self {
        let h = half_extent;
        // (normal, u axis, v axis) per face; corners wind counter-clockwise from outside
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, u, v) in faces {
            let (n, u, v) = (Vec3::from(normal), Vec3::from(u), Vec3::from(v));
            let base = vertices.len() as u32;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let position = (n + u * su + v * sv) * h;
                vertices.push(Vertex::new(
                    position.into(),
                    [(su + 1.0) * 0.5, (sv + 1.0) * 0.5],
                    normal,
                ));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }

        let mut mesh = Self::new(vertices, indices, VertexAttributes::TANGENT_INPUTS);
        mesh.generate_tangents();
        mesh
    }

    /// Horizontal quad in the XZ plane facing +Y
    pub fn plane(half_extent: f32) -> Self {
        let h = half_extent;
        let up = [0.0, 1.0, 0.0];
        let vertices = vec![
            Vertex::new([-h, 0.0, h], [0.0, 0.0], up),
            Vertex::new([h, 0.0, h], [1.0, 0.0], up),
            Vertex::new([h, 0.0, -h], [1.0, 1.0], up),
            Vertex::new([-h, 0.0, -h], [0.0, 1.0], up),
        ];
        let mut mesh = Self::new(vertices, vec![0, 1, 2, 2, 3, 0], VertexAttributes::TANGENT_INPUTS);
        mesh.generate_tangents();
        mesh
    }

    /// Clip-space quad covering the whole target, used by screen passes
    pub fn fullscreen_quad() -> Self {
        let n = [0.0, 0.0, 1.0];
        let vertices = vec![
            Vertex::new([-1.0, -1.0, 0.0], [0.0, 0.0], n),
            Vertex::new([1.0, -1.0, 0.0], [1.0, 0.0], n),
            Vertex::new([1.0, 1.0, 0.0], [1.0, 1.0], n),
            Vertex::new([-1.0, 1.0, 0.0], [0.0, 1.0], n),
        ];
        Self::new(vertices, vec![0, 1, 2, 2, 3, 0], VertexAttributes::TANGENT_INPUTS)
    }

    /// Closed mesh for light volumes: an octahedron-subdivided unit sphere
    pub fn sphere(radius: f32, subdivisions: u32) -> Self {
        let mut positions = vec![
            Vec3::x(), -Vec3::x(), Vec3::y(), -Vec3::y(), Vec3::z(), -Vec3::z(),
        ];
        let mut triangles: Vec<[u32; 3]> = vec![
            [4, 0, 2], [0, 5, 2], [5, 1, 2], [1, 4, 2],
            [0, 4, 3], [5, 0, 3], [1, 5, 3], [4, 1, 3],
        ];
        for _ in 0..subdivisions {
            let mut next = Vec::with_capacity(triangles.len() * 4);
            for [a, b, c] in triangles {
                let mut midpoint = |i: u32, j: u32| {
                    positions.push((positions[i as usize] + positions[j as usize]).normalize());
                    (positions.len() - 1) as u32
                };
                let (ab, bc, ca) = (midpoint(a, b), midpoint(b, c), midpoint(c, a));
                next.extend_from_slice(&[[a, ab, ca], [ab, b, bc], [ca, bc, c], [ab, bc, ca]]);
            }
            triangles = next;
        }

        let vertices = positions
            .iter()
            .map(|p| Vertex::new((p * radius).into(), [0.0, 0.0], (*p).into()))
            .collect();
        let indices = triangles.into_iter().flatten().collect();
        Self::new(vertices, indices, VertexAttributes::POSITION | VertexAttributes::NORMAL)
    }
}

fn any_perpendicular(normal: &Vec3) -> Vec3 {
    let axis = if normal.x.abs() < 0.9 { Vec3::x() } else { Vec3::y() };
    normal.cross(&axis).try_normalize(f32::EPSILON).unwrap_or_else(Vec3::x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cube_layout() {
        let cube = MeshData::cube(1.0);
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.triangle_count(), 12);
        assert!(cube.indices_valid());

        let bounds = cube.bounds().unwrap();
        assert_relative_eq!(bounds.min, Vec3::new(-1.0, -1.0, -1.0));
        assert_relative_eq!(bounds.max, Vec3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn test_cube_winding_faces_outward() {
        let cube = MeshData::cube(1.0);
        for triangle in cube.indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|i| cube.vertices[triangle[i] as usize].position_vec());
            let face_normal = (b - a).cross(&(c - a)).normalize();
            let normal = cube.vertices[triangle[0] as usize].normal_vec();
            assert_relative_eq!(face_normal, normal, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_generated_tangent_frame_is_orthonormal() {
        let cube = MeshData::cube(0.5);
        assert!(cube.attributes.contains(VertexAttributes::TANGENT | VertexAttributes::BITANGENT));
        for vertex in &cube.vertices {
            let n = vertex.normal_vec();
            let t = Vec3::from(vertex.tangent);
            let b = Vec3::from(vertex.bitangent);
            assert_relative_eq!(t.norm(), 1.0, epsilon = 1e-5);
            assert_relative_eq!(n.dot(&t), 0.0, epsilon = 1e-5);
            assert_relative_eq!(b.dot(&t), 0.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_generate_tangents_requires_inputs() {
        let mut mesh = MeshData::sphere(1.0, 1);
        let before = mesh.clone();
        assert!(!mesh.generate_tangents());
        assert_eq!(mesh, before);
    }

    #[test]
    fn test_sphere_vertices_on_radius() {
        let sphere = MeshData::sphere(2.0, 2);
        assert_eq!(sphere.triangle_count(), 8 * 16);
        for vertex in &sphere.vertices {
            assert_relative_eq!(vertex.position_vec().norm(), 2.0, epsilon = 1e-5);
        }
    }
}
