//! Skeletal animation
//!
//! - [`bone`]: bone table with offset (inverse bind-pose) matrices
//! - [`clip`]: keyframed clips sampled with lerp / slerp
//! - [`state`]: playback cursor stepped at a fixed timestep
//! - [`skinning`]: per-vertex weights and CPU skinning

pub mod bone;
pub mod clip;
pub mod state;
pub mod skinning;

pub use bone::{Bone, BoneId, BoneTree, VertexWeight};
pub use clip::{AnimationClip, BoneChannel, Keyframe};
pub use state::AnimationState;
pub use skinning::{build_skin_weights, skin_vertices, SkinWeights, MAX_INFLUENCES};
