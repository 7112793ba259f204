//! Collision Filtering (Layer/Mask System)
//!
//! Bitmask-based filtering for controlling which collidables may form pairs.
//! The narrow phase consults the filters of both collidables before creating
//! a pair handler; filtered pairs never reach contact generation.
//!
//! # Usage
//!
//! ```ignore
//! use basalt_physics::filter::CollisionFilter;
//!
//! // Layer 0 = characters, layer 1 = debris
//! let character = CollisionFilter::new(1 << 0, !(1 << 1)); // ignores debris
//! let debris = CollisionFilter::new(1 << 1, u32::MAX);
//! ```

/// Collision filter using layer/mask bitmasks.
///
/// Two collidables can pair iff:
///   `(a.layer & b.mask) != 0 && (b.layer & a.mask) != 0`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CollisionFilter {
    /// Which layer(s) this collidable belongs to (bitmask)
    pub layer: u32,
    /// Which layers this collidable can pair with (bitmask)
    pub mask: u32,
    /// Collision group ID (collidables in the same non-zero group never pair)
    pub group: u32,
}

impl CollisionFilter {
    /// Default filter: layer 1, pairs with everything
    pub const DEFAULT: Self = Self {
        layer: 1,
        mask: u32::MAX,
        group: 0,
    };

    /// Filter that pairs with nothing
    pub const NONE: Self = Self {
        layer: 0,
        mask: 0,
        group: 0,
    };

    /// Create a new collision filter
    #[inline]
    pub const fn new(layer: u32, mask: u32) -> Self {
        Self {
            layer,
            mask,
            group: 0,
        }
    }

    /// Create filter with a collision group
    #[inline]
    pub const fn with_group(mut self, group: u32) -> Self {
        self.group = group;
        self
    }

    /// Check if two filters allow a pair
    #[inline]
    pub fn can_collide(a: &Self, b: &Self) -> bool {
        if a.group != 0 && a.group == b.group {
            return false;
        }
        (a.layer & b.mask) != 0 && (b.layer & a.mask) != 0
    }
}

impl Default for CollisionFilter {
    #[inline]
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        let a = CollisionFilter::DEFAULT;
        let b = CollisionFilter::DEFAULT;
        assert!(CollisionFilter::can_collide(&a, &b));
    }

    #[test]
    fn test_none_filter() {
        let a = CollisionFilter::NONE;
        let b = CollisionFilter::DEFAULT;
        assert!(!CollisionFilter::can_collide(&a, &b));
    }

    #[test]
    fn test_one_way_mask_blocks_pair() {
        let a = CollisionFilter::new(1 << 0, 1 << 1);
        let b = CollisionFilter::new(1 << 1, 0);
        assert!(!CollisionFilter::can_collide(&a, &b));
    }

    #[test]
    fn test_collision_group() {
        let a = CollisionFilter::new(u32::MAX, u32::MAX).with_group(1);
        let b = CollisionFilter::new(u32::MAX, u32::MAX).with_group(1);
        let c = CollisionFilter::new(u32::MAX, u32::MAX).with_group(2);

        assert!(!CollisionFilter::can_collide(&a, &b));
        assert!(CollisionFilter::can_collide(&a, &c));
    }
}
