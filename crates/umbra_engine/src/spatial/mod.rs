//! Spatial primitives and acceleration structures
//!
//! Bounding boxes, planes and frusta, plus the dynamic AABB tree the
//! broad-phase is built on.

pub mod bounds;
pub mod bvh;

pub use bounds::{AABB, Plane, Frustum, Containment, classify_aabb};
pub use bvh::{AabbTree, LeafId};
