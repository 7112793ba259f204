//! Simulation Math Helpers
//!
//! Thin layer over [`glam`] holding the helpers the simulation pipeline needs
//! beyond plain vector algebra: tangent-frame construction for friction,
//! skew-symmetric cross matrices for jacobian assembly, world-space inverse
//! inertia, and incremental quaternion integration.
//!
//! Convention: `concatenate(a, b)` applies `a` then `b`, i.e. the result is
//! `b * a`.

use glam::{Mat3, Quat, Vec3};

/// Rigid transform: rotation followed by translation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    /// World-space translation
    pub position: Vec3,
    /// World-space orientation (unit quaternion)
    pub orientation: Quat,
}

impl Pose {
    /// Identity transform.
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
    };

    /// Create a pose from translation and orientation.
    #[inline]
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Create a pure translation.
    #[inline]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            orientation: Quat::IDENTITY,
        }
    }

    /// Local point to world space.
    #[inline]
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.position + self.orientation * p
    }

    /// World point to local space.
    #[inline]
    pub fn inverse_transform_point(&self, p: Vec3) -> Vec3 {
        self.orientation.inverse() * (p - self.position)
    }

    /// Local direction to world space (rotation only).
    #[inline]
    pub fn transform_vector(&self, v: Vec3) -> Vec3 {
        self.orientation * v
    }

    /// World direction to local space (rotation only).
    #[inline]
    pub fn inverse_transform_vector(&self, v: Vec3) -> Vec3 {
        self.orientation.inverse() * v
    }
}

/// Build an orthonormal tangent frame `(t1, t2)` perpendicular to `normal`.
///
/// Picks the world axis least parallel to the normal as the reference so the
/// frame stays stable for near-axis-aligned normals.
pub fn tangent_frame(normal: Vec3) -> (Vec3, Vec3) {
    let abs = normal.abs();
    let reference = if abs.x <= abs.y && abs.x <= abs.z {
        Vec3::X
    } else if abs.y <= abs.z {
        Vec3::Y
    } else {
        Vec3::Z
    };

    let t1 = normal.cross(reference).normalize();
    let t2 = normal.cross(t1);
    (t1, t2)
}

/// Skew-symmetric cross-product matrix: `skew(v) * w == v.cross(w)`.
#[inline]
pub fn skew(v: Vec3) -> Mat3 {
    Mat3::from_cols(
        Vec3::new(0.0, v.z, -v.y),
        Vec3::new(-v.z, 0.0, v.x),
        Vec3::new(v.y, -v.x, 0.0),
    )
}

/// Transform a local-space inverse inertia tensor into world space:
/// `R * I_local^-1 * R^T`.
#[inline]
pub fn world_inverse_inertia(local_inv_inertia: Mat3, orientation: Quat) -> Mat3 {
    let r = Mat3::from_quat(orientation);
    r * local_inv_inertia * r.transpose()
}

/// Integrate an orientation by an angular velocity over `dt` and renormalize.
///
/// Uses the quaternion derivative `q' = q + 0.5 * w_quat * q * dt`, which is
/// exact to first order and cheap enough to run per body per step. The result
/// is always unit length.
pub fn integrate_orientation(orientation: Quat, angular_velocity: Vec3, dt: f32) -> Quat {
    let w = Quat::from_xyzw(angular_velocity.x, angular_velocity.y, angular_velocity.z, 0.0);
    let dq = w * orientation;
    let result = Quat::from_xyzw(
        orientation.x + 0.5 * dq.x * dt,
        orientation.y + 0.5 * dq.y * dt,
        orientation.z + 0.5 * dq.z * dt,
        orientation.w + 0.5 * dq.w * dt,
    );
    result.normalize()
}

/// Apply transform `a` then transform `b` to produce the combined rotation.
#[inline]
pub fn concatenate(a: Quat, b: Quat) -> Quat {
    b * a
}

/// Componentwise `a * scale + b` for impulse accumulation without
/// intermediate allocations.
#[inline]
pub fn mul_add(a: Vec3, scale: f32, b: Vec3) -> Vec3 {
    a * scale + b
}

/// Check that every lane of a vector is finite. Used by hot-path
/// `debug_assert!`s guarding against NaN velocities leaking into the pipeline.
#[inline]
pub fn is_finite(v: Vec3) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

// ============================================================================
// Tests
// ============================================================================
