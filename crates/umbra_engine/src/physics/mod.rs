//! Physics module for broad-phase collision queries
//!
//! The renderer treats collision detection as an oracle: proxies with
//! group/mask filtering, kept in a dynamic bounding volume hierarchy and
//! queried with rays, boxes, contacts and frusta.

pub mod broadphase;
pub mod collision_layers;

pub use broadphase::{
    BroadPhase, DbvtBroadPhase, CollisionObject, Partition, ProxyId, RayHit,
};
pub use collision_layers::CollisionGroups;
