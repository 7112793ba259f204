//! Mass Property Computation from Geometry
//!
//! Computes mass, center of mass, and local inertia tensors for the shape
//! primitives. The inverse inertia stored on a body is derived from these and
//! rotated into world space once per step.
//!
//! # Parallel Axis Theorem
//!
//! [`translate_inertia`] shifts an inertia tensor to a new reference point.

use glam::{Mat3, Vec3};

use crate::shape::Shape;

/// Mass, center of mass, and inertia tensor for a rigid body.
#[derive(Clone, Copy, Debug)]
pub struct MassProperties {
    /// Total mass
    pub mass: f32,
    /// Center of mass in local coordinates
    pub center_of_mass: Vec3,
    /// Inertia tensor about the center of mass (3x3 matrix)
    pub inertia_tensor: Mat3,
}

impl MassProperties {
    /// Zero mass properties (massless / infinitely light).
    pub const ZERO: Self = Self {
        mass: 0.0,
        center_of_mass: Vec3::ZERO,
        inertia_tensor: Mat3::ZERO,
    };

    /// Inverse inertia tensor, or zero when the inertia is singular.
    pub fn inverse_inertia(&self) -> Mat3 {
        if self.inertia_tensor.determinant().abs() <= f32::EPSILON {
            Mat3::ZERO
        } else {
            self.inertia_tensor.inverse()
        }
    }
}

/// Compute mass properties of a solid sphere.
///
/// Inertia: `I = 2/5 * m * r^2` (diagonal, all axes equal).
#[must_use]
pub fn sphere_mass_properties(radius: f32, mass: f32) -> MassProperties {
    let i = 0.4 * mass * radius * radius;
    MassProperties {
        mass,
        center_of_mass: Vec3::ZERO,
        inertia_tensor: Mat3::from_diagonal(Vec3::splat(i)),
    }
}

/// Compute mass properties of a box defined by half-extents.
///
/// Inertia: `Ixx = m/12 * (h^2 + d^2)`, etc., with `(w, h, d)` the full
/// extents.
#[must_use]
pub fn box_mass_properties(half_extents: Vec3, mass: f32) -> MassProperties {
    let full = half_extents * 2.0;
    let w2 = full.x * full.x;
    let h2 = full.y * full.y;
    let d2 = full.z * full.z;
    let factor = mass / 12.0;

    MassProperties {
        mass,
        center_of_mass: Vec3::ZERO,
        inertia_tensor: Mat3::from_diagonal(Vec3::new(
            factor * (h2 + d2),
            factor * (w2 + d2),
            factor * (w2 + h2),
        )),
    }
}

/// Compute mass properties of a solid cylinder aligned along the Y axis.
#[must_use]
pub fn cylinder_mass_properties(radius: f32, half_height: f32, mass: f32) -> MassProperties {
    let h = half_height * 2.0;
    let r2 = radius * radius;

    // Iyy (along axis) = m * r^2 / 2; Ixx = Izz = m/12 * (3r^2 + h^2)
    let iyy = 0.5 * mass * r2;
    let ixx = mass / 12.0 * (3.0 * r2 + h * h);

    MassProperties {
        mass,
        center_of_mass: Vec3::ZERO,
        inertia_tensor: Mat3::from_diagonal(Vec3::new(ixx, iyy, ixx)),
    }
}

/// Compute mass properties of a capsule (cylinder + two hemisphere caps)
/// aligned along Y.
///
/// The cylinder segment and the hemispheres are combined with their exact
/// volume ratio; the hemisphere inertia is shifted by the parallel axis
/// theorem.
#[must_use]
pub fn capsule_mass_properties(radius: f32, half_height: f32, mass: f32) -> MassProperties {
    use core::f32::consts::PI;

    let h = half_height * 2.0;
    let r2 = radius * radius;

    let cyl_volume = PI * r2 * h;
    let sph_volume = 4.0 / 3.0 * PI * r2 * radius;
    let total_volume = cyl_volume + sph_volume;
    let cyl_mass = mass * cyl_volume / total_volume;
    let sph_mass = mass - cyl_mass;

    // Cylinder part
    let cyl_iyy = 0.5 * cyl_mass * r2;
    let cyl_ixx = cyl_mass / 12.0 * (3.0 * r2 + h * h);

    // Two hemispheres = one sphere, each shifted to a cap center
    let sph_i = 0.4 * sph_mass * r2;
    let offset = half_height;
    // Parallel axis for the transverse axes only; the cap centers lie on Y.
    let sph_ixx = sph_i + sph_mass * offset * offset;

    MassProperties {
        mass,
        center_of_mass: Vec3::ZERO,
        inertia_tensor: Mat3::from_diagonal(Vec3::new(
            cyl_ixx + sph_ixx,
            cyl_iyy + sph_i,
            cyl_ixx + sph_ixx,
        )),
    }
}

/// Mass properties of a convex hull approximated by its bounding box.
///
/// Exact tetrahedron-decomposition inertia needs face topology the hull
/// shape does not store; the box approximation keeps stacking behavior sane.
#[must_use]
pub fn hull_mass_properties(points: &[Vec3], mass: f32) -> MassProperties {
    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for &p in points {
        min = min.min(p);
        max = max.max(p);
    }
    if points.is_empty() {
        return MassProperties::ZERO;
    }
    box_mass_properties((max - min) * 0.5, mass)
}

/// Compute mass properties for any shape primitive.
///
/// Half-spaces are static-only geometry and report zero mass.
#[must_use]
pub fn shape_mass_properties(shape: &Shape, mass: f32) -> MassProperties {
    match shape {
        Shape::Sphere { radius } => sphere_mass_properties(*radius, mass),
        Shape::Box { half_extents } => box_mass_properties(*half_extents, mass),
        Shape::Capsule {
            radius,
            half_height,
        } => capsule_mass_properties(*radius, *half_height, mass),
        Shape::Cylinder {
            radius,
            half_height,
        } => cylinder_mass_properties(*radius, *half_height, mass),
        Shape::ConvexHull { points } => hull_mass_properties(points, mass),
        Shape::HalfSpace { .. } => MassProperties::ZERO,
    }
}

/// Shift an inertia tensor to a new reference point (parallel axis theorem):
/// `I' = I + m * (dot(d, d) * E - outer(d, d))`.
#[must_use]
pub fn translate_inertia(inertia: Mat3, mass: f32, offset: Vec3) -> Mat3 {
    let d2 = offset.dot(offset);
    let outer = Mat3::from_cols(
        offset * offset.x,
        offset * offset.y,
        offset * offset.z,
    );
    let shift = Mat3::from_diagonal(Vec3::splat(d2)) - outer;
    inertia + shift * mass
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_inertia() {
        let props = sphere_mass_properties(1.0, 1.0);
        // 2/5 * 1 * 1 = 0.4
        assert!((props.inertia_tensor.x_axis.x - 0.4).abs() < 1e-6);
        assert!((props.inertia_tensor.y_axis.y - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_unit_cube_inertia() {
        let props = box_mass_properties(Vec3::splat(0.5), 1.0);
        // m/12 * (1 + 1) = 1/6
        let expected = 1.0 / 6.0;
        assert!((props.inertia_tensor.x_axis.x - expected).abs() < 1e-6);
        assert!((props.inertia_tensor.y_axis.y - expected).abs() < 1e-6);
        assert!((props.inertia_tensor.z_axis.z - expected).abs() < 1e-6);
    }

    #[test]
    fn test_cylinder_axis_inertia_smaller() {
        // Tall thin cylinder: spinning about its axis is easier than tumbling.
        let props = cylinder_mass_properties(0.3, 1.0, 2.0);
        assert!(props.inertia_tensor.y_axis.y < props.inertia_tensor.x_axis.x);
    }

    #[test]
    fn test_capsule_total_mass_preserved() {
        let props = capsule_mass_properties(0.5, 0.6, 3.0);
        assert!((props.mass - 3.0).abs() < 1e-6);
        assert!(props.inertia_tensor.x_axis.x > 0.0);
    }

    #[test]
    fn test_inverse_inertia() {
        let props = box_mass_properties(Vec3::splat(0.5), 1.0);
        let inv = props.inverse_inertia();
        let product = props.inertia_tensor * inv;
        assert!((product.x_axis.x - 1.0).abs() < 1e-5);
        assert!(product.x_axis.y.abs() < 1e-5);
    }

    #[test]
    fn test_zero_mass_inverse() {
        assert_eq!(MassProperties::ZERO.inverse_inertia(), Mat3::ZERO);
    }

    #[test]
    fn test_parallel_axis() {
        let base = sphere_mass_properties(1.0, 2.0).inertia_tensor;
        let shifted = translate_inertia(base, 2.0, Vec3::new(0.0, 3.0, 0.0));
        // Shifting along Y adds m*d^2 to the X and Z axes, not Y.
        assert!((shifted.y_axis.y - base.y_axis.y).abs() < 1e-5);
        assert!((shifted.x_axis.x - (base.x_axis.x + 2.0 * 9.0)).abs() < 1e-4);
    }

    #[test]
    fn test_half_space_massless() {
        let props = shape_mass_properties(
            &Shape::HalfSpace {
                normal: Vec3::Y,
                offset: 0.0,
            },
            10.0,
        );
        assert_eq!(props.mass, 0.0);
    }
}
