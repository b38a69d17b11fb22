//! Vertex skinning
//!
//! Per-vertex influences are packed into [`SkinWeights`] (four bones, weights
//! normalized to sum to one). CPU skinning blends the bone palette into a
//! destination vertex buffer; GPU skinning uploads the same weights as a
//! vertex stream and the palette as a uniform.

use bytemuck::{Pod, Zeroable};

use crate::assets::mesh::Vertex;
use crate::foundation::math::{Mat4, Vec3, Vec4};

use super::bone::BoneTree;

/// Maximum bone influences per vertex
pub const MAX_INFLUENCES: usize = 4;

/// Packed bone influences for one vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct SkinWeights {
    /// Palette indices
    pub bones: [u32; MAX_INFLUENCES],
    /// Weights, summing to one (or all zero for an unskinned vertex)
    pub weights: [f32; MAX_INFLUENCES],
}

impl SkinWeights {
    /// True if no bone influences the vertex
    pub fn is_unweighted(&self) -> bool {
        self.weights.iter().all(|w| *w <= 0.0)
    }

    /// Weighted sum of the referenced palette matrices.
    ///
    /// `None` for an unweighted vertex or a bone index outside `palette`.
    pub fn blend_matrix(&self, palette: &[Mat4]) -> Option<Mat4> {
        if self.is_unweighted() {
            return None;
        }
        let mut blended = Mat4::zeros();
        for (bone, weight) in self.bones.iter().zip(self.weights) {
            if weight <= 0.0 {
                continue;
            }
            blended += palette.get(*bone as usize)? * weight;
        }
        Some(blended)
    }
}

/// Collect the influences on every vertex of mesh `mesh_index`.
///
/// Keeps the strongest [`MAX_INFLUENCES`] per vertex and renormalizes.
/// Influences naming vertices past `vertex_count` are dropped.
pub fn build_skin_weights(bones: &BoneTree, mesh_index: usize, vertex_count: usize) -> Vec<SkinWeights> {
    let mut influences: Vec<Vec<(u32, f32)>> = vec![Vec::new(); vertex_count];
    for (id, bone) in bones.iter() {
        for weight in bone.weights.iter().filter(|w| w.mesh == mesh_index && w.weight > 0.0) {
            if let Some(slot) = influences.get_mut(weight.vertex as usize) {
                slot.push((id.0 as u32, weight.weight));
            }
        }
    }

    influences
        .into_iter()
        .map(|mut list| {
            list.sort_by(|a, b| b.1.total_cmp(&a.1));
            list.truncate(MAX_INFLUENCES);
            let total: f32 = list.iter().map(|(_, w)| w).sum();
            let mut packed = SkinWeights::default();
            if total > 0.0 {
                for (slot, (bone, weight)) in list.into_iter().enumerate() {
                    packed.bones[slot] = bone;
                    packed.weights[slot] = weight / total;
                }
            }
            packed
        })
        .collect()
}

/// Blend `base` through `palette` into `out`.
///
/// `out` is resized to match `base`. Unweighted vertices, and vertices whose
/// weights reference bones outside the palette, are copied unchanged.
pub fn skin_vertices(base: &[Vertex], weights: &[SkinWeights], palette: &[Mat4], out: &mut Vec<Vertex>) {
    out.clear();
    out.extend(base.iter().enumerate().map(|(index, vertex)| {
        weights
            .get(index)
            .and_then(|w| w.blend_matrix(palette))
            .map_or(*vertex, |matrix| transform_vertex(vertex, &matrix))
    }));
}

/// Apply a blended skinning matrix to one vertex
pub fn transform_vertex(vertex: &Vertex, matrix: &Mat4) -> Vertex {
    let position = Vec3::from(vertex.position);
    let position = (matrix * Vec4::new(position.x, position.y, position.z, 1.0)).xyz();
    let direction = |v: [f32; 3]| -> [f32; 3] {
        let v = Vec3::from(v);
        let moved = (matrix * Vec4::new(v.x, v.y, v.z, 0.0)).xyz();
        moved.try_normalize(f32::EPSILON).unwrap_or(v).into()
    };
    Vertex {
        position: position.into(),
        tex_coord: vertex.tex_coord,
        normal: direction(vertex.normal),
        tangent: direction(vertex.tangent),
        bitangent: direction(vertex.bitangent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::bone::{Bone, VertexWeight};
    use crate::foundation::math::{Quat, Transform};
    use approx::assert_relative_eq;

    fn weighted_tree() -> BoneTree {
        let mut tree = BoneTree::new();
        let root = tree
            .add_bone(
                Bone::new("root", Mat4::identity()).with_weights(vec![
                    VertexWeight { mesh: 0, vertex: 0, weight: 1.0 },
                    VertexWeight { mesh: 0, vertex: 1, weight: 0.5 },
                ]),
                None,
            )
            .unwrap();
        tree.add_bone(
            Bone::new("tip", Mat4::identity()).with_weights(vec![
                VertexWeight { mesh: 0, vertex: 1, weight: 1.5 },
                VertexWeight { mesh: 1, vertex: 0, weight: 1.0 },
                VertexWeight { mesh: 0, vertex: 99, weight: 1.0 },
            ]),
            Some(root),
        );
        tree
    }

    #[test]
    fn test_weights_are_normalized_and_filtered() {
        let weights = build_skin_weights(&weighted_tree(), 0, 3);
        assert_eq!(weights.len(), 3);

        assert_eq!(weights[0].bones[0], 0);
        assert_relative_eq!(weights[0].weights[0], 1.0);

        // Strongest first, renormalized from 1.5 + 0.5
        assert_eq!(weights[1].bones[..2], [1, 0]);
        assert_relative_eq!(weights[1].weights[0], 0.75);
        assert_relative_eq!(weights[1].weights[1], 0.25);

        assert!(weights[2].is_unweighted());
    }

    #[test]
    fn test_keeps_strongest_four() {
        let mut tree = BoneTree::new();
        for i in 0..6 {
            tree.add_bone(
                Bone::new(format!("b{i}"), Mat4::identity())
                    .with_weights(vec![VertexWeight { mesh: 0, vertex: 0, weight: (i + 1) as f32 }]),
                None,
            );
        }
        let weights = build_skin_weights(&tree, 0, 1);
        assert_eq!(weights[0].bones, [5, 4, 3, 2]);
        assert_relative_eq!(weights[0].weights.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_skin_vertices_blends_palette() {
        let mut tree = weighted_tree();
        tree.get_mut(crate::animation::BoneId(1)).unwrap().position = Vec3::new(0.0, 2.0, 0.0);
        let palette = tree.palette();
        let weights = build_skin_weights(&tree, 0, 3);

        let base = vec![
            Vertex::new([1.0, 0.0, 0.0], [0.0, 0.0], [0.0, 1.0, 0.0]),
            Vertex::new([1.0, 0.0, 0.0], [0.0, 0.0], [0.0, 1.0, 0.0]),
            Vertex::new([5.0, 5.0, 5.0], [0.0, 0.0], [0.0, 1.0, 0.0]),
        ];
        let mut out = Vec::new();
        skin_vertices(&base, &weights, &palette, &mut out);

        assert_eq!(out.len(), 3);
        assert_relative_eq!(Vec3::from(out[0].position), Vec3::new(1.0, 0.0, 0.0));
        // 0.75 * (tip moved up 2) + 0.25 * (root static)
        assert_relative_eq!(Vec3::from(out[1].position), Vec3::new(1.0, 1.5, 0.0), epsilon = 1e-5);
        assert_eq!(out[2], base[2]);
    }

    #[test]
    fn test_skinning_rotates_normals() {
        let mut tree = BoneTree::new();
        tree.add_bone(
            Bone::new("spin", Mat4::identity())
                .with_local(Transform::new(
                    Vec3::zeros(),
                    Quat::from_axis_angle(&Vec3::z_axis(), std::f32::consts::FRAC_PI_2),
                    Vec3::new(1.0, 1.0, 1.0),
                ))
                .with_weights(vec![VertexWeight { mesh: 0, vertex: 0, weight: 1.0 }]),
            None,
        );
        let base = vec![Vertex::new([1.0, 0.0, 0.0], [0.0, 0.0], [1.0, 0.0, 0.0])];
        let mut out = Vec::new();
        skin_vertices(&base, &build_skin_weights(&tree, 0, 1), &tree.palette(), &mut out);
        assert_relative_eq!(Vec3::from(out[0].normal), Vec3::new(0.0, 1.0, 0.0), epsilon = 1e-5);
    }
}
