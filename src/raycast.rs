//! Ray Casting Queries
//!
//! Ray tests against the shape primitives, used by the character stepper's
//! vertical probes and exposed publicly for gameplay queries. All tests are
//! performed in shape-local space and transformed back.

use glam::Vec3;

use crate::math::Pose;
use crate::shape::Shape;

/// A ray with unit direction.
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    /// Ray origin, world space
    pub origin: Vec3,
    /// Unit direction
    pub direction: Vec3,
}

impl Ray {
    /// Create a ray; the direction is normalized.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// Point at parameter `t`.
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// A ray hit.
#[derive(Clone, Copy, Debug)]
pub struct RayHit {
    /// Distance along the ray
    pub t: f32,
    /// Surface normal at the hit, world space
    pub normal: Vec3,
}

/// Cast a ray against a posed shape. Returns the first hit within `max_t`.
pub fn raycast_shape(shape: &Shape, pose: &Pose, ray: &Ray, max_t: f32) -> Option<RayHit> {
    // Half-spaces are tested in world space directly.
    if let Some((n, off)) = shape.world_halfspace(pose) {
        return ray_halfspace(ray, n, off, max_t);
    }

    let local_ray = Ray {
        origin: pose.inverse_transform_point(ray.origin),
        direction: pose.inverse_transform_vector(ray.direction),
    };

    let local_hit = match shape {
        Shape::Sphere { radius } => ray_sphere_local(&local_ray, *radius, max_t),
        Shape::Box { half_extents } => ray_box_local(&local_ray, *half_extents, max_t),
        Shape::Capsule {
            radius,
            half_height,
        } => ray_capsule_local(&local_ray, *radius, *half_height, max_t),
        Shape::Cylinder {
            radius,
            half_height,
        } => ray_cylinder_local(&local_ray, *radius, *half_height, max_t),
        // Hulls fall back to their local bounding box (conservative).
        Shape::ConvexHull { points } => {
            let mut min = Vec3::splat(f32::MAX);
            let mut max = Vec3::splat(f32::MIN);
            for &p in points {
                min = min.min(p);
                max = max.max(p);
            }
            if points.is_empty() {
                return None;
            }
            let center = (min + max) * 0.5;
            let shifted = Ray {
                origin: local_ray.origin - center,
                direction: local_ray.direction,
            };
            ray_box_local(&shifted, (max - min) * 0.5, max_t)
        }
        Shape::HalfSpace { .. } => unreachable!("handled above"),
    };

    local_hit.map(|hit| RayHit {
        t: hit.t,
        normal: pose.transform_vector(hit.normal),
    })
}

/// Ray against a world-space half-space surface.
pub fn ray_halfspace(ray: &Ray, n: Vec3, offset: f32, max_t: f32) -> Option<RayHit> {
    let start = n.dot(ray.origin) - offset;
    if start <= 0.0 {
        // Starting inside the solid: immediate hit.
        return Some(RayHit { t: 0.0, normal: n });
    }
    let denom = n.dot(ray.direction);
    if denom >= -1.0e-9 {
        return None; // moving parallel or away
    }
    let t = -start / denom;
    (t <= max_t).then_some(RayHit { t, normal: n })
}

fn ray_sphere_local(ray: &Ray, radius: f32, max_t: f32) -> Option<RayHit> {
    let oc = ray.origin;
    let b = oc.dot(ray.direction);
    let c = oc.length_squared() - radius * radius;
    if c <= 0.0 {
        return Some(RayHit {
            t: 0.0,
            normal: oc.normalize_or_zero(),
        });
    }
    if b > 0.0 {
        return None; // moving away
    }
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let t = -b - disc.sqrt();
    if t < 0.0 || t > max_t {
        return None;
    }
    Some(RayHit {
        t,
        normal: ray.at(t).normalize_or_zero(),
    })
}

fn ray_box_local(ray: &Ray, half: Vec3, max_t: f32) -> Option<RayHit> {
    let mut t_enter = 0.0_f32;
    let mut t_exit = max_t;
    let mut enter_axis = 0;
    let mut enter_sign = 0.0_f32;

    for axis in 0..3 {
        let o = ray.origin[axis];
        let d = ray.direction[axis];
        let h = half[axis];
        if d.abs() < 1.0e-9 {
            if o.abs() > h {
                return None;
            }
            continue;
        }
        let inv = 1.0 / d;
        let mut t0 = (-h - o) * inv;
        let mut t1 = (h - o) * inv;
        let mut sign = -1.0;
        if t0 > t1 {
            core::mem::swap(&mut t0, &mut t1);
            sign = 1.0;
        }
        if t0 > t_enter {
            t_enter = t0;
            enter_axis = axis;
            enter_sign = sign;
        }
        t_exit = t_exit.min(t1);
        if t_enter > t_exit {
            return None;
        }
    }

    let mut normal = Vec3::ZERO;
    normal[enter_axis] = enter_sign;
    if normal == Vec3::ZERO {
        normal = -ray.direction; // started inside
    }
    Some(RayHit {
        t: t_enter,
        normal,
    })
}

fn ray_capsule_local(ray: &Ray, radius: f32, half_height: f32, max_t: f32) -> Option<RayHit> {
    // Side: infinite cylinder about Y, accepted only within the segment span.
    let mut best: Option<RayHit> = None;
    if let Some(hit) = ray_infinite_cylinder(ray, radius, max_t) {
        let y = ray.at(hit.t).y;
        if y.abs() <= half_height {
            best = Some(hit);
        }
    }

    // Caps: spheres at the segment ends.
    for sign in [1.0_f32, -1.0] {
        let center = Vec3::new(0.0, half_height * sign, 0.0);
        let shifted = Ray {
            origin: ray.origin - center,
            direction: ray.direction,
        };
        if let Some(hit) = ray_sphere_local(&shifted, radius, max_t) {
            if best.map_or(true, |b| hit.t < b.t) {
                best = Some(hit);
            }
        }
    }

    best
}

fn ray_cylinder_local(ray: &Ray, radius: f32, half_height: f32, max_t: f32) -> Option<RayHit> {
    let mut best: Option<RayHit> = None;

    if let Some(hit) = ray_infinite_cylinder(ray, radius, max_t) {
        let y = ray.at(hit.t).y;
        if y.abs() <= half_height {
            best = Some(hit);
        }
    }

    // Flat caps.
    if ray.direction.y.abs() > 1.0e-9 {
        for sign in [1.0_f32, -1.0] {
            let plane_y = half_height * sign;
            let t = (plane_y - ray.origin.y) / ray.direction.y;
            if t >= 0.0 && t <= max_t {
                let p = ray.at(t);
                if p.x * p.x + p.z * p.z <= radius * radius
                    && best.map_or(true, |b| t < b.t)
                {
                    best = Some(RayHit {
                        t,
                        normal: Vec3::new(0.0, sign, 0.0),
                    });
                }
            }
        }
    }

    best
}

fn ray_infinite_cylinder(ray: &Ray, radius: f32, max_t: f32) -> Option<RayHit> {
    let ox = ray.origin.x;
    let oz = ray.origin.z;
    let dx = ray.direction.x;
    let dz = ray.direction.z;

    let a = dx * dx + dz * dz;
    if a < 1.0e-12 {
        return None; // parallel to the axis: caps handle it
    }
    let b = ox * dx + oz * dz;
    let c = ox * ox + oz * oz - radius * radius;
    if c <= 0.0 {
        return None; // inside the tube: caps or exit only
    }
    let disc = b * b - a * c;
    if disc < 0.0 {
        return None;
    }
    let t = (-b - disc.sqrt()) / a;
    if t < 0.0 || t > max_t {
        return None;
    }
    let p = ray.at(t);
    Some(RayHit {
        t,
        normal: Vec3::new(p.x, 0.0, p.z).normalize_or_zero(),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn test_ray_sphere_direct_hit() {
        let shape = Shape::Sphere { radius: 1.0 };
        let pose = Pose::from_position(Vec3::new(0.0, 0.0, 5.0));
        let ray = Ray::new(Vec3::ZERO, Vec3::Z);
        let hit = raycast_shape(&shape, &pose, &ray, 100.0).expect("should hit");
        assert!((hit.t - 4.0).abs() < 1e-5);
        assert!(hit.normal.z < -0.99);
    }

    #[test]
    fn test_ray_sphere_miss() {
        let shape = Shape::Sphere { radius: 1.0 };
        let pose = Pose::from_position(Vec3::new(0.0, 5.0, 5.0));
        let ray = Ray::new(Vec3::ZERO, Vec3::Z);
        assert!(raycast_shape(&shape, &pose, &ray, 100.0).is_none());
    }

    #[test]
    fn test_ray_box_face_hit() {
        let shape = Shape::Box {
            half_extents: Vec3::splat(1.0),
        };
        let pose = Pose::from_position(Vec3::new(0.0, -3.0, 0.0));
        let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Y);
        let hit = raycast_shape(&shape, &pose, &ray, 100.0).expect("should hit");
        assert!((hit.t - 2.0).abs() < 1e-5);
        assert!(hit.normal.y > 0.99);
    }

    #[test]
    fn test_ray_rotated_box() {
        let shape = Shape::Box {
            half_extents: Vec3::new(2.0, 0.5, 0.5),
        };
        // Box rotated 90 degrees about Y: long axis now along Z.
        let pose = Pose::new(
            Vec3::new(0.0, 0.0, 4.0),
            Quat::from_rotation_y(core::f32::consts::FRAC_PI_2),
        );
        let ray = Ray::new(Vec3::ZERO, Vec3::Z);
        let hit = raycast_shape(&shape, &pose, &ray, 100.0).expect("should hit");
        assert!((hit.t - 2.0).abs() < 1e-4, "t = {}", hit.t);
    }

    #[test]
    fn test_ray_halfspace() {
        let shape = Shape::HalfSpace {
            normal: Vec3::Y,
            offset: 0.0,
        };
        let ray = Ray::new(Vec3::new(0.0, 2.0, 0.0), Vec3::NEG_Y);
        let hit = raycast_shape(&shape, &Pose::IDENTITY, &ray, 10.0).expect("should hit");
        assert!((hit.t - 2.0).abs() < 1e-6);
        assert!(hit.normal.y > 0.99);

        // Pointing away: no hit.
        let up = Ray::new(Vec3::new(0.0, 2.0, 0.0), Vec3::Y);
        assert!(raycast_shape(&shape, &Pose::IDENTITY, &up, 10.0).is_none());
    }

    #[test]
    fn test_ray_capsule_side() {
        let shape = Shape::Capsule {
            radius: 0.5,
            half_height: 1.0,
        };
        let ray = Ray::new(Vec3::new(-5.0, 0.5, 0.0), Vec3::X);
        let hit = raycast_shape(&shape, &Pose::IDENTITY, &ray, 100.0).expect("should hit side");
        assert!((hit.t - 4.5).abs() < 1e-4);
        assert!(hit.normal.x < -0.99);
    }

    #[test]
    fn test_ray_capsule_cap() {
        let shape = Shape::Capsule {
            radius: 0.5,
            half_height: 1.0,
        };
        let ray = Ray::new(Vec3::new(0.0, 5.0, 0.0), Vec3::NEG_Y);
        let hit = raycast_shape(&shape, &Pose::IDENTITY, &ray, 100.0).expect("should hit cap");
        // Top of the capsule is at y = 1.5.
        assert!((hit.t - 3.5).abs() < 1e-4);
    }

    #[test]
    fn test_ray_cylinder_cap() {
        let shape = Shape::Cylinder {
            radius: 0.5,
            half_height: 1.0,
        };
        let ray = Ray::new(Vec3::new(0.2, 5.0, 0.0), Vec3::NEG_Y);
        let hit = raycast_shape(&shape, &Pose::IDENTITY, &ray, 100.0).expect("should hit cap");
        assert!((hit.t - 4.0).abs() < 1e-4);
        assert!(hit.normal.y > 0.99);
    }

    #[test]
    fn test_ray_max_t_respected() {
        let shape = Shape::Sphere { radius: 1.0 };
        let pose = Pose::from_position(Vec3::new(0.0, 0.0, 50.0));
        let ray = Ray::new(Vec3::ZERO, Vec3::Z);
        assert!(raycast_shape(&shape, &pose, &ray, 10.0).is_none());
    }
}
