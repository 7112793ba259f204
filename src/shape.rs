//! Collision Shapes
//!
//! Convex shape primitives and their support mappings. The narrow phase
//! dispatches on shape pairs: common pairs get analytic contact generators,
//! everything else goes through GJK/EPA on the support mappings defined here.
//!
//! Half-spaces are unbounded static geometry: they have no support mapping
//! and are excluded from the grid broad phase; the pipeline tests them
//! against every mobile collidable directly.

use glam::{Quat, Vec3};

use crate::aabb::Aabb;
use crate::math::Pose;

/// Convex shape primitive, in local space centered on the body's center of
/// mass. Capsules and cylinders are aligned along local Y.
#[derive(Clone, Debug)]
pub enum Shape {
    /// Sphere around the origin
    Sphere {
        /// Sphere radius
        radius: f32,
    },
    /// Axis-aligned box around the origin (world orientation comes from the pose)
    Box {
        /// Half-extent along each local axis
        half_extents: Vec3,
    },
    /// Capsule: segment along local Y with hemispherical caps
    Capsule {
        /// Cap and side radius
        radius: f32,
        /// Half-length of the core segment
        half_height: f32,
    },
    /// Cylinder along local Y with flat caps
    Cylinder {
        /// Side radius
        radius: f32,
        /// Half-height along the axis
        half_height: f32,
    },
    /// Convex hull given by its vertices (no face topology required)
    ConvexHull {
        /// Hull vertices, local space
        points: Vec<Vec3>,
    },
    /// Unbounded solid half-space `dot(normal, p) <= offset` (static geometry)
    HalfSpace {
        /// Outward surface normal, unit length
        normal: Vec3,
        /// Plane offset along the normal
        offset: f32,
    },
}

impl Shape {
    /// Whether this shape has a bounded support mapping usable by GJK.
    #[inline]
    pub fn is_bounded(&self) -> bool {
        !matches!(self, Shape::HalfSpace { .. })
    }

    /// Support point in local space: the furthest point in `dir`.
    ///
    /// Must not be called on a half-space (no bounded support exists).
    pub fn support_local(&self, dir: Vec3) -> Vec3 {
        match self {
            Shape::Sphere { radius } => dir.normalize_or_zero() * *radius,
            Shape::Box { half_extents } => Vec3::new(
                if dir.x >= 0.0 {
                    half_extents.x
                } else {
                    -half_extents.x
                },
                if dir.y >= 0.0 {
                    half_extents.y
                } else {
                    -half_extents.y
                },
                if dir.z >= 0.0 {
                    half_extents.z
                } else {
                    -half_extents.z
                },
            ),
            Shape::Capsule {
                radius,
                half_height,
            } => {
                let cap = Vec3::new(0.0, if dir.y >= 0.0 { *half_height } else { -*half_height }, 0.0);
                cap + dir.normalize_or_zero() * *radius
            }
            Shape::Cylinder {
                radius,
                half_height,
            } => {
                let radial = Vec3::new(dir.x, 0.0, dir.z);
                let side = radial.normalize_or_zero() * *radius;
                Vec3::new(
                    side.x,
                    if dir.y >= 0.0 { *half_height } else { -*half_height },
                    side.z,
                )
            }
            Shape::ConvexHull { points } => {
                let mut best = points.first().copied().unwrap_or(Vec3::ZERO);
                let mut best_dot = best.dot(dir);
                for &p in points.iter().skip(1) {
                    let d = p.dot(dir);
                    if d > best_dot {
                        best = p;
                        best_dot = d;
                    }
                }
                best
            }
            Shape::HalfSpace { .. } => {
                debug_assert!(false, "half-space has no support mapping");
                Vec3::ZERO
            }
        }
    }

    /// Support point in world space under `pose`.
    #[inline]
    pub fn support_world(&self, pose: &Pose, dir: Vec3) -> Vec3 {
        let local_dir = pose.inverse_transform_vector(dir);
        pose.transform_point(self.support_local(local_dir))
    }

    /// World-space AABB under `pose`.
    ///
    /// Bounded shapes use their support mapping along the six world axes.
    /// Half-spaces return a large slab so queries still have something to
    /// test against; they never enter the grid broad phase.
    pub fn compute_aabb(&self, pose: &Pose) -> Aabb {
        match self {
            Shape::Sphere { radius } => {
                Aabb::from_center_half(pose.position, Vec3::splat(*radius))
            }
            Shape::HalfSpace { normal, offset } => {
                const BOUND: f32 = 1.0e6;
                let n = pose.transform_vector(*normal);
                let off = *offset + n.dot(pose.position);
                let mut min = Vec3::splat(-BOUND);
                let mut max = Vec3::splat(BOUND);
                // Clamp the axis-aligned case to the surface.
                if n.abs_diff_eq(Vec3::Y, 1.0e-6) {
                    max.y = off;
                } else if n.abs_diff_eq(Vec3::X, 1.0e-6) {
                    max.x = off;
                } else if n.abs_diff_eq(Vec3::Z, 1.0e-6) {
                    max.z = off;
                }
                Aabb { min, max }
            }
            _ => {
                let mut min = Vec3::ZERO;
                let mut max = Vec3::ZERO;
                for axis in 0..3 {
                    let mut dir = Vec3::ZERO;
                    dir[axis] = 1.0;
                    max[axis] = self.support_world(pose, dir)[axis];
                    dir[axis] = -1.0;
                    min[axis] = self.support_world(pose, dir)[axis];
                }
                Aabb::new(min, max)
            }
        }
    }

    /// Radius of the smallest origin-centered sphere enclosing the shape.
    /// Used by swept-sphere CCD. Half-spaces report infinity.
    pub fn bounding_radius(&self) -> f32 {
        match self {
            Shape::Sphere { radius } => *radius,
            Shape::Box { half_extents } => half_extents.length(),
            Shape::Capsule {
                radius,
                half_height,
            } => half_height + radius,
            Shape::Cylinder {
                radius,
                half_height,
            } => (radius * radius + half_height * half_height).sqrt(),
            Shape::ConvexHull { points } => points
                .iter()
                .map(|p| p.length())
                .fold(0.0_f32, f32::max),
            Shape::HalfSpace { .. } => f32::INFINITY,
        }
    }

    /// World-space normal and offset of a half-space under `pose`.
    ///
    /// Returns `None` for bounded shapes.
    pub fn world_halfspace(&self, pose: &Pose) -> Option<(Vec3, f32)> {
        match self {
            Shape::HalfSpace { normal, offset } => {
                let n = pose.transform_vector(*normal);
                Some((n, *offset + n.dot(pose.position)))
            }
            _ => None,
        }
    }

    /// World-space corners of a box shape under `pose`.
    pub fn box_corners(&self, pose: &Pose) -> Option<[Vec3; 8]> {
        match self {
            Shape::Box { half_extents } => {
                let h = *half_extents;
                let mut corners = [Vec3::ZERO; 8];
                for (i, corner) in corners.iter_mut().enumerate() {
                    let local = Vec3::new(
                        if i & 1 != 0 { h.x } else { -h.x },
                        if i & 2 != 0 { h.y } else { -h.y },
                        if i & 4 != 0 { h.z } else { -h.z },
                    );
                    *corner = pose.transform_point(local);
                }
                Some(corners)
            }
            _ => None,
        }
    }
}

/// A shape paired with a world pose, implementing the support-mapping
/// interface GJK consumes.
#[derive(Clone, Copy)]
pub struct TransformedShape<'a> {
    /// The local-space shape
    pub shape: &'a Shape,
    /// World pose
    pub pose: Pose,
}

impl<'a> TransformedShape<'a> {
    /// Wrap a shape with its world pose.
    pub fn new(shape: &'a Shape, pose: Pose) -> Self {
        Self { shape, pose }
    }
}

/// Support function interface for GJK/EPA.
pub trait SupportMap {
    /// Returns the point on the shape furthest in the given world direction.
    fn support(&self, direction: Vec3) -> Vec3;
}

impl SupportMap for TransformedShape<'_> {
    #[inline]
    fn support(&self, direction: Vec3) -> Vec3 {
        self.shape.support_world(&self.pose, direction)
    }
}

/// Helper: pose from position only with identity orientation.
#[inline]
pub fn static_pose(position: Vec3) -> Pose {
    Pose::new(position, Quat::IDENTITY)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_support() {
        let s = Shape::Sphere { radius: 2.0 };
        let sup = s.support_local(Vec3::X);
        assert!((sup - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_box_support() {
        let s = Shape::Box {
            half_extents: Vec3::new(1.0, 2.0, 3.0),
        };
        let sup = s.support_local(Vec3::new(1.0, -1.0, 0.5));
        assert_eq!(sup, Vec3::new(1.0, -2.0, 3.0));
    }

    #[test]
    fn test_capsule_support() {
        let s = Shape::Capsule {
            radius: 0.5,
            half_height: 1.0,
        };
        let sup = s.support_local(Vec3::Y);
        assert!((sup.y - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_cylinder_support() {
        let s = Shape::Cylinder {
            radius: 0.5,
            half_height: 1.0,
        };
        let sup = s.support_local(Vec3::new(1.0, 1.0, 0.0));
        assert!((sup - Vec3::new(0.5, 1.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_hull_support() {
        let s = Shape::ConvexHull {
            points: vec![
                Vec3::new(-1.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 2.0, 0.0),
            ],
        };
        assert_eq!(s.support_local(Vec3::Y), Vec3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn test_rotated_box_aabb() {
        use core::f32::consts::FRAC_PI_4;
        let s = Shape::Box {
            half_extents: Vec3::splat(1.0),
        };
        let pose = Pose::new(Vec3::ZERO, Quat::from_rotation_y(FRAC_PI_4));
        let aabb = s.compute_aabb(&pose);
        // A unit cube rotated 45 degrees spans sqrt(2) on X and Z.
        let expected = 2.0_f32.sqrt();
        assert!((aabb.max.x - expected).abs() < 1e-5);
        assert!((aabb.max.z - expected).abs() < 1e-5);
        assert!((aabb.max.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_translated_sphere_aabb() {
        let s = Shape::Sphere { radius: 1.0 };
        let aabb = s.compute_aabb(&Pose::from_position(Vec3::new(5.0, 0.0, 0.0)));
        assert!((aabb.min.x - 4.0).abs() < 1e-6);
        assert!((aabb.max.x - 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_halfspace_world_plane() {
        let s = Shape::HalfSpace {
            normal: Vec3::Y,
            offset: 0.0,
        };
        let (n, off) = s
            .world_halfspace(&Pose::from_position(Vec3::new(0.0, 2.0, 0.0)))
            .unwrap();
        assert!((n - Vec3::Y).length() < 1e-6);
        assert!((off - 2.0).abs() < 1e-6);
        assert!(!s.is_bounded());
    }

    #[test]
    fn test_bounding_radius() {
        let b = Shape::Box {
            half_extents: Vec3::splat(1.0),
        };
        assert!((b.bounding_radius() - 3.0_f32.sqrt()).abs() < 1e-6);

        let c = Shape::Capsule {
            radius: 0.5,
            half_height: 1.0,
        };
        assert!((c.bounding_radius() - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_box_corners() {
        let s = Shape::Box {
            half_extents: Vec3::splat(1.0),
        };
        let corners = s.box_corners(&Pose::from_position(Vec3::Y)).unwrap();
        assert_eq!(corners.len(), 8);
        let lowest = corners.iter().map(|c| c.y).fold(f32::MAX, f32::min);
        assert!((lowest - 0.0).abs() < 1e-6);
    }
}
