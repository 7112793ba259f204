//! Axis-Aligned Bounding Boxes
//!
//! World-space AABBs used by the broad phase and by continuous-motion
//! expansion. The invariant `min <= max` (componentwise) must hold after
//! every refresh; violations indicate a caller bug and are caught by
//! `debug_assert!`.

use glam::Vec3;

/// Axis-aligned bounding box in world coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB from min and max corners.
    #[inline]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        let aabb = Self { min, max };
        debug_assert!(aabb.is_valid(), "inverted or non-finite AABB: {aabb:?}");
        aabb
    }

    /// Create an AABB from center and half-extents.
    #[inline]
    pub fn from_center_half(center: Vec3, half: Vec3) -> Self {
        Self::new(center - half, center + half)
    }

    /// An AABB containing nothing, ready for `grow_point` accumulation.
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::MAX),
        max: Vec3::splat(f32::MIN),
    };

    /// Componentwise `min <= max` with finite coordinates.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x
            && self.min.y <= self.max.y
            && self.min.z <= self.max.z
            && crate::math::is_finite(self.min)
            && crate::math::is_finite(self.max)
    }

    /// Check if two AABBs overlap on all three axes.
    #[inline]
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Check overlap on the Y and Z axes only (the sweep axis X is tested
    /// separately by the broad phase).
    #[inline]
    pub fn intersects_yz(&self, other: &Aabb) -> bool {
        self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Union of two AABBs.
    #[inline]
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Grow to include a point.
    #[inline]
    pub fn grow_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Expand symmetrically by a margin on every axis.
    #[inline]
    pub fn expanded(&self, margin: f32) -> Aabb {
        let m = Vec3::splat(margin);
        Aabb {
            min: self.min - m,
            max: self.max + m,
        }
    }

    /// Expand to enclose the swept motion `velocity * dt`. Continuous-update
    /// bodies must use this so the broad phase sees their whole trajectory
    /// for the step.
    #[inline]
    pub fn swept(&self, velocity: Vec3, dt: f32) -> Aabb {
        let d = velocity * dt;
        Aabb {
            min: self.min + d.min(Vec3::ZERO),
            max: self.max + d.max(Vec3::ZERO),
        }
    }

    /// Center point.
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half-extents.
    #[inline]
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Check whether a point lies inside (inclusive).
    #[inline]
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersection() {
        let a = Aabb::new(Vec3::ZERO, Vec3::splat(2.0));
        let b = Aabb::new(Vec3::splat(1.0), Vec3::splat(3.0));
        let c = Aabb::new(Vec3::splat(5.0), Vec3::splat(6.0));

        assert!(a.intersects(&b), "a and b should intersect");
        assert!(!a.intersects(&c), "a and c should not intersect");
        assert!(a.intersects_yz(&b));
    }

    #[test]
    fn test_touching_boxes_intersect() {
        // Shared face counts as overlap: the narrow phase decides contact.
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 1.0, 1.0));
        assert!(a.intersects(&b));
    }

    #[test]
    fn test_union() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::splat(2.0), Vec3::splat(3.0));
        let u = a.union(&b);
        assert_eq!(u.min, Vec3::ZERO);
        assert_eq!(u.max, Vec3::splat(3.0));
    }

    #[test]
    fn test_swept_expansion() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let swept = a.swept(Vec3::new(60.0, -30.0, 0.0), 1.0 / 60.0);
        assert_eq!(swept.max.x, 2.0);
        assert_eq!(swept.min.y, -0.5);
        assert_eq!(swept.min.x, 0.0, "motion only extends the leading side");
        assert!(swept.is_valid());
    }

    #[test]
    fn test_center_half_round_trip() {
        let a = Aabb::from_center_half(Vec3::new(1.0, 2.0, 3.0), Vec3::splat(0.5));
        assert!((a.center() - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-6);
        assert!((a.half_extents() - Vec3::splat(0.5)).length() < 1e-6);
    }

    #[test]
    fn test_contains_point() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert!(a.contains_point(Vec3::splat(0.5)));
        assert!(a.contains_point(Vec3::ONE));
        assert!(!a.contains_point(Vec3::splat(1.1)));
    }

    #[test]
    #[should_panic]
    #[cfg(debug_assertions)]
    fn test_inverted_aabb_asserts() {
        let _ = Aabb::new(Vec3::ONE, Vec3::ZERO);
    }
}
