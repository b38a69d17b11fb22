//! Collision group filtering for broad-phase proxies
//!
//! Every proxy carries a group (what it is) and a mask (what it wants to
//! see). A query with a mask only reports proxies whose group intersects it.

use bitflags::bitflags;

bitflags! {
    /// Collision group bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CollisionGroups: u32 {
        /// Renderable model proxies
        const MODEL = 1 << 0;
        /// Point and spot light volumes
        const LIGHT = 1 << 1;
        /// Static level geometry
        const STATIC = 1 << 2;
        /// Camera volumes
        const CAMERA = 1 << 3;
        /// Trigger volumes (no rendering)
        const TRIGGER = 1 << 4;
        /// Application-defined groups start here
        const CUSTOM_0 = 1 << 8;
        /// Second application-defined group
        const CUSTOM_1 = 1 << 9;
        /// Everything the visibility processor cares about
        const VISIBLE = Self::MODEL.bits() | Self::LIGHT.bits();
    }
}

impl CollisionGroups {
    /// Mutual filter: A's group must be in B's mask and B's group in A's mask
    pub fn should_collide(
        group_a: CollisionGroups,
        mask_a: CollisionGroups,
        group_b: CollisionGroups,
        mask_b: CollisionGroups,
    ) -> bool {
        group_a.intersects(mask_b) && group_b.intersects(mask_a)
    }

    /// One-way filter used by queries: does a proxy in `self` pass `mask`
    pub fn passes(self, mask: CollisionGroups) -> bool {
        self.intersects(mask)
    }
}

impl Default for CollisionGroups {
    fn default() -> Self {
        Self::all()
    }
}
