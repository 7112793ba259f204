//! Articulated Single-Bone Constraints
//!
//! A bone is a rigid body driven by the articulated layer, typically one
//! without a collidable, created through [`new_bone`]. A
//! [`SingleBoneConstraint`] couples one bone to a world-space goal through
//! 3x3 linear and angular jacobians, with softness, Baumgarte-style error
//! correction, and a magnitude-clamped accumulated impulse.
//!
//! Effective mass: `E = Jl m^-1 Jl^T + Ja I^-1 Ja^T + softness * I`,
//! inverted once per step. Velocity solve per iteration:
//! `v_err = Jl v + Ja w - v_bias + softness * lambda`,
//! `dl = -E^-1 v_err`, then the accumulated impulse is rescaled onto the
//! sphere `|lambda| = max_impulse` whenever it leaves it.

use core::any::Any;

use glam::{Mat3, Quat, Vec3};

use crate::body::{BodyId, BodySet, RigidBody};
use crate::constraint::{SolverTuning, SolverUpdateable};
use crate::error::PhysicsError;
use crate::math::skew;

/// Create a bone: a dynamic body with sphere inertia that participates in
/// the articulated layer but owns no collidable.
pub fn new_bone(position: Vec3, orientation: Quat, mass: f32) -> RigidBody {
    let mut body = RigidBody::new_dynamic(position, mass);
    body.orientation = orientation;
    body.refresh_world_inertia();
    body
}

/// Goal driving a single-bone constraint.
#[derive(Clone, Copy, Debug)]
pub enum BoneGoal {
    /// Pin a bone-local point to a world-space position.
    LinearAnchor {
        /// Attachment point in the bone's local frame
        local_offset: Vec3,
        /// World-space target the attachment is pinned to
        target: Vec3,
    },
    /// Drive the bone's orientation toward a world-space target.
    AngularGoal {
        /// Target orientation
        target: Quat,
    },
}

/// One-bone articulated constraint with full 3x3 jacobians.
#[derive(Clone, Debug)]
pub struct SingleBoneConstraint {
    /// The constrained bone
    pub bone: BodyId,
    /// Goal configuration
    pub goal: BoneGoal,
    /// Diagonal softness added to the effective mass; 0 is fully rigid
    pub softness: f32,
    /// Fraction of position error converted to velocity bias per step
    pub error_correction_factor: f32,
    max_impulse: f32,
    max_impulse_squared: f32,
    /// Accumulated impulse (warm start)
    pub accumulated_impulse: Vec3,
    // Per-step state built by prepare:
    jacobian_linear: Mat3,
    jacobian_angular: Mat3,
    effective_mass: Mat3,
    velocity_bias: Vec3,
}

impl SingleBoneConstraint {
    /// Pin `local_offset` on the bone to the world-space `target`.
    pub fn anchor(bone: BodyId, local_offset: Vec3, target: Vec3) -> Self {
        Self::new(bone, BoneGoal::LinearAnchor {
            local_offset,
            target,
        })
    }

    /// Drive the bone's orientation toward `target`.
    pub fn angular_goal(bone: BodyId, target: Quat) -> Self {
        Self::new(bone, BoneGoal::AngularGoal { target })
    }

    fn new(bone: BodyId, goal: BoneGoal) -> Self {
        Self {
            bone,
            goal,
            softness: 0.0,
            error_correction_factor: 0.2,
            max_impulse: f32::INFINITY,
            max_impulse_squared: f32::INFINITY,
            accumulated_impulse: Vec3::ZERO,
            jacobian_linear: Mat3::ZERO,
            jacobian_angular: Mat3::ZERO,
            effective_mass: Mat3::ZERO,
            velocity_bias: Vec3::ZERO,
        }
    }

    /// Set the impulse magnitude cap. Errors on negative values; infinity
    /// disables the clamp.
    pub fn set_max_impulse(&mut self, max: f32) -> Result<(), PhysicsError> {
        if max < 0.0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "max_impulse must be >= 0",
            });
        }
        self.max_impulse = max;
        // The squared cache avoids a sqrt on every clamp test.
        self.max_impulse_squared = if max.is_finite() {
            max * max
        } else {
            f32::INFINITY
        };
        Ok(())
    }

    /// Current impulse magnitude cap.
    #[inline]
    pub fn max_impulse(&self) -> f32 {
        self.max_impulse
    }

    /// Move the world target of a linear anchor.
    pub fn set_target_position(&mut self, new_target: Vec3) {
        if let BoneGoal::LinearAnchor { target, .. } = &mut self.goal {
            *target = new_target;
        }
    }

    /// Small-angle orientation error `target * inverse(current)` as a
    /// rotation vector.
    fn orientation_error(current: Quat, target: Quat) -> Vec3 {
        let mut delta = target * current.inverse();
        // Take the short way around.
        if delta.w < 0.0 {
            delta = Quat::from_xyzw(-delta.x, -delta.y, -delta.z, -delta.w);
        }
        let (axis, angle) = delta.to_axis_angle();
        axis * angle
    }
}

impl SolverUpdateable for SingleBoneConstraint {
    fn prepare(&mut self, bodies: &mut BodySet, dt: f32, _tuning: &SolverTuning) {
        let Some(body) = bodies.get(self.bone) else {
            self.effective_mass = Mat3::ZERO;
            return;
        };

        let (jl, ja, error) = match self.goal {
            BoneGoal::LinearAnchor {
                local_offset,
                target,
            } => {
                let r = body.orientation * local_offset;
                let world_point = body.position + r;
                // Point velocity: v + w x r = Jl v + Ja w.
                (Mat3::IDENTITY, -skew(r), world_point - target)
            }
            BoneGoal::AngularGoal { target } => (
                Mat3::ZERO,
                Mat3::IDENTITY,
                -Self::orientation_error(body.orientation, target),
            ),
        };

        self.jacobian_linear = jl;
        self.jacobian_angular = ja;

        // E = Jl m^-1 Jl^T + Ja I^-1 Ja^T + softness I, then invert.
        let linear_term = jl * Mat3::from_diagonal(Vec3::splat(body.inv_mass)) * jl.transpose();
        let angular_term = ja * body.inv_inertia_world * ja.transpose();
        let softness_term = Mat3::from_diagonal(Vec3::splat(self.softness));
        let e = linear_term + angular_term + softness_term;
        self.effective_mass = if e.determinant().abs() > 1.0e-12 {
            e.inverse()
        } else {
            Mat3::ZERO
        };

        // Desired constraint-space velocity: remove a fraction of the
        // position error over the step.
        self.velocity_bias = -error * (self.error_correction_factor / dt);
    }

    fn warm_start(&mut self, bodies: &mut BodySet) {
        let Some(body) = bodies.get_mut(self.bone) else {
            return;
        };
        if !body.is_dynamic() {
            return;
        }
        let lambda = self.accumulated_impulse;
        body.linear_velocity += body.inv_mass * (self.jacobian_linear.transpose() * lambda);
        body.angular_velocity +=
            body.inv_inertia_world * (self.jacobian_angular.transpose() * lambda);
    }

    fn solve_velocity(&mut self, bodies: &mut BodySet) {
        let Some(body) = bodies.get_mut(self.bone) else {
            return;
        };
        if !body.is_dynamic() {
            return;
        }

        let constraint_velocity = self.jacobian_linear * body.linear_velocity
            + self.jacobian_angular * body.angular_velocity;
        let velocity_error =
            constraint_velocity - self.velocity_bias + self.softness * self.accumulated_impulse;

        let mut delta = -(self.effective_mass * velocity_error);
        let tentative = self.accumulated_impulse + delta;

        // Rescale onto the cap sphere instead of clamping per component.
        if tentative.length_squared() > self.max_impulse_squared {
            let clamped = tentative * (self.max_impulse / tentative.length());
            delta = clamped - self.accumulated_impulse;
            self.accumulated_impulse = clamped;
        } else {
            self.accumulated_impulse = tentative;
        }

        body.linear_velocity += body.inv_mass * (self.jacobian_linear.transpose() * delta);
        body.angular_velocity +=
            body.inv_inertia_world * (self.jacobian_angular.transpose() * delta);
    }

    fn clear_accumulated_impulses(&mut self) {
        self.accumulated_impulse = Vec3::ZERO;
    }

    fn collect_bodies(&self, out: &mut Vec<BodyId>) {
        out.push(self.bone);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn step(
        constraint: &mut SingleBoneConstraint,
        bodies: &mut BodySet,
        dt: f32,
        gravity: Vec3,
        iterations: u32,
    ) {
        let tuning = SolverTuning::default();
        let bone = constraint.bone;
        {
            let body = bodies.get_mut(bone).unwrap();
            body.linear_velocity += gravity * dt;
        }
        constraint.prepare(bodies, dt, &tuning);
        constraint.warm_start(bodies);
        for _ in 0..iterations {
            constraint.solve_velocity(bodies);
        }
        let body = bodies.get_mut(bone).unwrap();
        let (v, w) = (body.linear_velocity, body.angular_velocity);
        body.position += v * dt;
        body.orientation = crate::math::integrate_orientation(body.orientation, w, dt);
        body.refresh_world_inertia();
    }

    #[test]
    fn test_anchor_holds_bone_against_gravity() {
        let mut bodies = BodySet::new();
        // Bone centered at (0.5, 0, 0), anchored at its -X end to origin.
        let bone = bodies.add(new_bone(Vec3::new(0.5, 0.0, 0.0), Quat::IDENTITY, 1.0));
        let mut c =
            SingleBoneConstraint::anchor(bone, Vec3::new(-0.5, 0.0, 0.0), Vec3::ZERO);
        c.error_correction_factor = 0.2;

        let dt = 1.0 / 60.0;
        for _ in 0..120 {
            step(&mut c, &mut bodies, dt, Vec3::new(0.0, -9.81, 0.0), 10);
        }

        // The anchored end must stay near the origin while the bone swings.
        let body = &bodies[bone];
        let anchor_world = body.position + body.orientation * Vec3::new(-0.5, 0.0, 0.0);
        assert!(
            anchor_world.length() < 0.05,
            "anchor drifted to {:?}",
            anchor_world
        );
    }

    #[test]
    fn test_accumulated_impulse_within_cap() {
        let mut bodies = BodySet::new();
        let bone = bodies.add(new_bone(Vec3::new(0.0, -2.0, 0.0), Quat::IDENTITY, 10.0));
        let mut c = SingleBoneConstraint::anchor(bone, Vec3::ZERO, Vec3::new(0.0, 5.0, 0.0));
        c.set_max_impulse(0.5).unwrap();

        let dt = 1.0 / 60.0;
        for _ in 0..30 {
            step(&mut c, &mut bodies, dt, Vec3::ZERO, 10);
            assert!(
                c.accumulated_impulse.length() <= c.max_impulse() + 1.0e-4,
                "|lambda| = {} exceeds cap",
                c.accumulated_impulse.length()
            );
        }
    }

    #[test]
    fn test_negative_max_impulse_rejected() {
        let mut bodies = BodySet::new();
        let bone = bodies.add(new_bone(Vec3::ZERO, Quat::IDENTITY, 1.0));
        let mut c = SingleBoneConstraint::anchor(bone, Vec3::ZERO, Vec3::ZERO);
        assert!(c.set_max_impulse(-1.0).is_err());
        assert!(c.set_max_impulse(0.0).is_ok());
    }

    #[test]
    fn test_softness_lets_constraint_give() {
        let dt = 1.0 / 60.0;
        let pull = Vec3::new(0.0, -9.81, 0.0);

        let residual = |softness: f32| -> f32 {
            let mut bodies = BodySet::new();
            let bone = bodies.add(new_bone(Vec3::ZERO, Quat::IDENTITY, 1.0));
            let mut c = SingleBoneConstraint::anchor(bone, Vec3::ZERO, Vec3::ZERO);
            c.softness = softness;
            for _ in 0..120 {
                step(&mut c, &mut bodies, dt, pull, 10);
            }
            bodies[bone].position.length()
        };

        let rigid = residual(0.0);
        let soft = residual(0.5);
        assert!(rigid < 0.02, "rigid constraint residual = {rigid}");
        assert!(soft > rigid, "softness must allow larger sag");
    }

    #[test]
    fn test_angular_goal_aligns_bone() {
        let mut bodies = BodySet::new();
        let start = Quat::from_rotation_z(1.0);
        let bone = bodies.add(new_bone(Vec3::ZERO, start, 1.0));
        let target = Quat::IDENTITY;
        let mut c = SingleBoneConstraint::angular_goal(bone, target);
        c.error_correction_factor = 0.3;

        let dt = 1.0 / 60.0;
        for _ in 0..240 {
            step(&mut c, &mut bodies, dt, Vec3::ZERO, 10);
        }

        let aligned = bodies[bone].orientation.dot(target).abs();
        assert!(aligned > 0.999, "orientation alignment = {aligned}");
    }

    #[test]
    fn test_clear_accumulated() {
        let mut bodies = BodySet::new();
        let bone = bodies.add(new_bone(Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY, 1.0));
        let mut c = SingleBoneConstraint::anchor(bone, Vec3::ZERO, Vec3::ZERO);
        step(&mut c, &mut bodies, 1.0 / 60.0, Vec3::new(0.0, -9.81, 0.0), 10);
        assert!(c.accumulated_impulse.length() > 0.0);
        c.clear_accumulated_impulses();
        assert_eq!(c.accumulated_impulse, Vec3::ZERO);
    }
}
