//! Keyframed animation clips

use crate::foundation::math::{Quat, Vec3};

use super::bone::BoneTree;

/// A value at a point in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe<T> {
    /// Time in seconds from the start of the clip
    pub time: f32,
    /// Value at that time
    pub value: T,
}

impl<T> Keyframe<T> {
    /// Create a keyframe
    pub fn new(time: f32, value: T) -> Self {
        Self { time, value }
    }
}

/// Keyframes driving one bone
#[derive(Debug, Clone, Default)]
pub struct BoneChannel {
    /// Name of the driven bone
    pub bone: String,
    /// Position keys, sorted by time
    pub positions: Vec<Keyframe<Vec3>>,
    /// Rotation keys, sorted by time
    pub rotations: Vec<Keyframe<Quat>>,
    /// Scale keys, sorted by time
    pub scales: Vec<Keyframe<Vec3>>,
}

impl BoneChannel {
    /// Empty channel for a bone
    pub fn new(bone: impl Into<String>) -> Self {
        Self { bone: bone.into(), ..Self::default() }
    }
}

/// Named set of bone channels
#[derive(Debug, Clone)]
pub struct AnimationClip {
    /// Clip name
    pub name: String,
    /// Length in seconds
    pub duration: f32,
    /// Per-bone channels
    pub channels: Vec<BoneChannel>,
}

impl AnimationClip {
    /// Create a clip
    pub fn new(name: impl Into<String>, duration: f32, channels: Vec<BoneChannel>) -> Self {
        Self {
            name: name.into(),
            duration: duration.max(0.0),
            channels,
        }
    }

    /// Pose `bones` at `time`. Channels naming unknown bones are ignored,
    /// and bones without a channel keep their current local transform.
    pub fn apply(&self, time: f32, bones: &mut BoneTree) {
        for channel in &self.channels {
            let Some(id) = bones.find(&channel.bone) else {
                continue;
            };
            let Some(bone) = bones.get_mut(id) else {
                continue;
            };
            if let Some(position) = sample(&channel.positions, time, |a, b, t| a.lerp(b, t)) {
                bone.position = position;
            }
            if let Some(rotation) = sample(&channel.rotations, time, |a, b, t| {
                a.try_slerp(b, t, 1e-6).unwrap_or(*b)
            }) {
                bone.rotation = rotation;
            }
            if let Some(scale) = sample(&channel.scales, time, |a, b, t| a.lerp(b, t)) {
                bone.scale = scale;
            }
        }
    }
}

/// Interpolate a sorted key list, clamping outside the keyed range
pub fn sample<T: Copy>(keys: &[Keyframe<T>], time: f32, interpolate: impl Fn(&T, &T, f32) -> T) -> Option<T> {
    let first = keys.first()?;
    let last = keys.last()?;
    if time <= first.time {
        return Some(first.value);
    }
    if time >= last.time {
        return Some(last.value);
    }
    // index of the first key strictly after `time`
    let next = keys.partition_point(|k| k.time <= time);
    let (a, b) = (&keys[next - 1], &keys[next]);
    let span = b.time - a.time;
    let t = if span > f32::EPSILON { (time - a.time) / span } else { 0.0 };
    Some(interpolate(&a.value, &b.value, t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::bone::Bone;
    use crate::foundation::math::Mat4;
    use approx::assert_relative_eq;

    #[test]
    fn test_sample_clamps_and_interpolates() {
        let keys = vec![
            Keyframe::new(0.0, Vec3::zeros()),
            Keyframe::new(1.0, Vec3::new(2.0, 0.0, 0.0)),
            Keyframe::new(3.0, Vec3::new(2.0, 4.0, 0.0)),
        ];
        let lerp3 = |a: &Vec3, b: &Vec3, t: f32| a.lerp(b, t);

        assert_relative_eq!(sample(&keys, -1.0, lerp3).unwrap(), Vec3::zeros());
        assert_relative_eq!(sample(&keys, 0.5, lerp3).unwrap(), Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(sample(&keys, 2.0, lerp3).unwrap(), Vec3::new(2.0, 2.0, 0.0));
        assert_relative_eq!(sample(&keys, 9.0, lerp3).unwrap(), Vec3::new(2.0, 4.0, 0.0));
        assert!(sample::<Vec3>(&[], 0.0, lerp3).is_none());
    }

    #[test]
    fn test_apply_poses_named_bone() {
        let mut tree = BoneTree::new();
        tree.add_bone(Bone::new("root", Mat4::identity()), None);

        let mut channel = BoneChannel::new("root");
        channel.rotations = vec![
            Keyframe::new(0.0, Quat::identity()),
            Keyframe::new(1.0, Quat::from_axis_angle(&Vec3::y_axis(), 1.0)),
        ];
        let mut ghost = BoneChannel::new("missing");
        ghost.positions = vec![Keyframe::new(0.0, Vec3::x())];
        let clip = AnimationClip::new("turn", 1.0, vec![channel, ghost]);

        clip.apply(0.5, &mut tree);
        let rotation = tree.get(crate::animation::BoneId(0)).unwrap().rotation;
        assert_relative_eq!(rotation.angle(), 0.5, epsilon = 1e-5);
    }
}
