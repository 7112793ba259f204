//! Solver Constraints
//!
//! The hot-loop constraint types are a closed set dispatched without
//! virtual calls (contact manifolds here, articulated single-bone
//! constraints in [`crate::bone`]); user constraints plug in through the
//! [`SolverUpdateable`] trait at registration time.
//!
//! Every constraint follows the same contract: compute effective mass,
//! warm start from accumulated impulses, iterate velocity impulses with
//! clamping, and optionally correct positions after integration.

use core::any::Any;

use glam::Vec3;

use crate::body::{BodyId, BodySet};
use crate::manifold::{ContactManifold, MAX_CONTACTS};
use crate::math::tangent_frame;

/// Stable handle to a pair in the narrow phase (declared here to keep the
/// constraint's back-pointer free of module cycles).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PairId(pub u32);

/// Solver tuning knobs shared by every constraint type.
#[derive(Clone, Copy, Debug)]
pub struct SolverTuning {
    /// Velocity iterations per step
    pub velocity_iterations: u32,
    /// Position (split-impulse) iterations per step; 0 folds correction
    /// into the velocity bias instead
    pub position_iterations: u32,
    /// Penetration below which no position correction is applied
    pub allowed_penetration: f32,
    /// Fraction of position error fed back per step (velocity-bias variant)
    pub baumgarte: f32,
    /// Fraction of position error recovered per position iteration
    pub position_correction_factor: f32,
    /// Cap on a single position correction, in length units
    pub max_position_correction: f32,
    /// Relative normal speed below which restitution is zero
    pub restitution_threshold: f32,
}

impl Default for SolverTuning {
    fn default() -> Self {
        Self {
            velocity_iterations: 10,
            position_iterations: 2,
            allowed_penetration: 0.01,
            baumgarte: 0.2,
            position_correction_factor: 0.2,
            max_position_correction: 0.2,
            restitution_threshold: 1.0,
        }
    }
}

/// Capability contract for user-registered constraints.
///
/// The built-in constraint types implement the same methods directly; this
/// trait exists for extensibility at the registration seam (the character's
/// horizontal motion constraint is the in-tree consumer).
pub trait SolverUpdateable: Send {
    /// Build `J M^-1 J^T` terms and biases for this step.
    fn prepare(&mut self, bodies: &mut BodySet, dt: f32, tuning: &SolverTuning);
    /// Apply the previous frame's accumulated impulses.
    fn warm_start(&mut self, bodies: &mut BodySet);
    /// One projected Gauss-Seidel impulse update.
    fn solve_velocity(&mut self, bodies: &mut BodySet);
    /// Optional position-level correction after pose integration.
    fn solve_position(&mut self, _bodies: &mut BodySet, _tuning: &SolverTuning) {}
    /// Reset accumulated impulses (large topology changes).
    fn clear_accumulated_impulses(&mut self);
    /// Bodies this constraint touches, for island linking.
    fn collect_bodies(&self, out: &mut Vec<BodyId>);
    /// Downcast hook so owners can reach their registered constraint.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// ============================================================================
// Contact constraint
// ============================================================================

/// Per-point solver state.
#[derive(Clone, Copy, Debug, Default)]
struct ContactPointState {
    r_a: Vec3,
    r_b: Vec3,
    normal: Vec3,
    tangent: [Vec3; 2],
    normal_mass: f32,
    tangent_mass: [f32; 2],
    velocity_bias: f32,
    depth: f32,
    normal_impulse: f32,
    friction_impulse: [f32; 2],
    feature_id: u32,
}

/// Non-penetration plus coupled two-axis friction for up to four manifold
/// points between two bodies (either side may be static geometry).
#[derive(Clone, Debug)]
pub struct ContactConstraint {
    /// Owning pair; `None` after orphaning
    pub pair: Option<PairId>,
    /// First body (`None` = static geometry)
    pub body_a: Option<BodyId>,
    /// Second body (`None` = static geometry)
    pub body_b: Option<BodyId>,
    /// Blended friction coefficient
    pub friction: f32,
    /// Blended restitution coefficient
    pub restitution: f32,
    points: [ContactPointState; MAX_CONTACTS],
    point_count: usize,
    pos_a0: Vec3,
    pos_b0: Vec3,
}

impl ContactConstraint {
    /// Create an empty contact constraint for a pair.
    pub fn new(pair: PairId, body_a: Option<BodyId>, body_b: Option<BodyId>) -> Self {
        Self {
            pair: Some(pair),
            body_a,
            body_b,
            friction: 0.5,
            restitution: 0.0,
            points: [ContactPointState::default(); MAX_CONTACTS],
            point_count: 0,
            pos_a0: Vec3::ZERO,
            pos_b0: Vec3::ZERO,
        }
    }

    /// Number of active points.
    #[inline]
    pub fn point_count(&self) -> usize {
        self.point_count
    }

    /// Copy the manifold's current points and accumulated impulses in.
    pub fn sync_from_manifold(&mut self, manifold: &ContactManifold) {
        self.point_count = manifold.len().min(MAX_CONTACTS);
        for (state, point) in self.points.iter_mut().zip(manifold.points()) {
            *state = ContactPointState {
                normal: point.normal,
                depth: point.depth,
                normal_impulse: point.normal_impulse,
                friction_impulse: point.friction_impulse,
                feature_id: point.feature_id,
                // Holds the world position until prepare rebuilds the
                // geometry terms.
                r_a: point.position,
                r_b: point.position,
                ..ContactPointState::default()
            };
        }
    }

    /// Write accumulated impulses back into the manifold for next frame's
    /// warm start.
    pub fn store_impulses(&self, manifold: &mut ContactManifold) {
        for (state, point) in self.points.iter().take(self.point_count).zip(manifold.points_mut()) {
            if state.feature_id == point.feature_id {
                point.normal_impulse = state.normal_impulse;
                point.friction_impulse = state.friction_impulse;
            }
        }
    }

    /// Post-solve accumulated normal impulse of a point (diagnostics/tests).
    pub fn normal_impulse(&self, idx: usize) -> f32 {
        self.points[idx].normal_impulse
    }

    /// Post-solve accumulated friction impulse of a point.
    pub fn friction_impulse(&self, idx: usize) -> [f32; 2] {
        self.points[idx].friction_impulse
    }

    fn body_state(bodies: &BodySet, id: Option<BodyId>) -> (f32, glam::Mat3, Vec3, Vec3, Vec3) {
        match id.and_then(|id| bodies.get(id)) {
            Some(b) if b.is_dynamic() => (
                b.inv_mass,
                b.inv_inertia_world,
                b.linear_velocity,
                b.angular_velocity,
                b.position,
            ),
            Some(b) => (
                0.0,
                glam::Mat3::ZERO,
                b.linear_velocity,
                b.angular_velocity,
                b.position,
            ),
            None => (0.0, glam::Mat3::ZERO, Vec3::ZERO, Vec3::ZERO, Vec3::ZERO),
        }
    }

    fn apply_impulse(bodies: &mut BodySet, id: Option<BodyId>, impulse: Vec3, at: Vec3) {
        if let Some(body) = id.and_then(|id| bodies.get_mut(id)) {
            if body.is_dynamic() {
                body.linear_velocity += impulse * body.inv_mass;
                let torque = (at - body.position).cross(impulse);
                body.angular_velocity += body.inv_inertia_world * torque;
            }
        }
    }

    /// Contact-space relative velocity at a point: `vel_b - vel_a`.
    fn relative_velocity(
        bodies: &BodySet,
        body_a: Option<BodyId>,
        body_b: Option<BodyId>,
        point: Vec3,
    ) -> Vec3 {
        let vel = |id: Option<BodyId>| {
            id.and_then(|id| bodies.get(id))
                .map_or(Vec3::ZERO, |b| b.velocity_at_point(point))
        };
        vel(body_b) - vel(body_a)
    }

    /// Build effective masses and velocity biases.
    pub fn prepare(&mut self, bodies: &BodySet, dt: f32, tuning: &SolverTuning) {
        let (inv_mass_a, inv_inertia_a, _, _, pos_a) = Self::body_state(bodies, self.body_a);
        let (inv_mass_b, inv_inertia_b, _, _, pos_b) = Self::body_state(bodies, self.body_b);
        self.pos_a0 = pos_a;
        self.pos_b0 = pos_b;

        for i in 0..self.point_count {
            // `r_a` temporarily holds the world contact position from sync.
            let position = self.points[i].r_a;
            let p = &mut self.points[i];
            p.r_a = position - pos_a;
            p.r_b = position - pos_b;

            let n = p.normal;
            let (t1, t2) = tangent_frame(n);
            p.tangent = [t1, t2];

            let angular_term = |axis: Vec3, r: Vec3, inv_inertia: glam::Mat3| -> f32 {
                let rxn = r.cross(axis);
                rxn.dot(inv_inertia * rxn)
            };

            let k_normal = inv_mass_a
                + inv_mass_b
                + angular_term(n, p.r_a, inv_inertia_a)
                + angular_term(n, p.r_b, inv_inertia_b);
            p.normal_mass = if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 };

            for (axis_idx, t) in [t1, t2].into_iter().enumerate() {
                let k = inv_mass_a
                    + inv_mass_b
                    + angular_term(t, p.r_a, inv_inertia_a)
                    + angular_term(t, p.r_b, inv_inertia_b);
                p.tangent_mass[axis_idx] = if k > 0.0 { 1.0 / k } else { 0.0 };
            }

            // Restitution engages above the approach-speed threshold.
            let approach =
                Self::relative_velocity(bodies, self.body_a, self.body_b, position).dot(n);
            let mut bias = 0.0;
            if approach < -tuning.restitution_threshold {
                bias = -self.restitution * approach;
            }

            // Without a position pass the penetration error feeds the
            // velocity bias instead (Baumgarte).
            if tuning.position_iterations == 0 {
                let overlap = (p.depth - tuning.allowed_penetration).max(0.0);
                bias = bias.max(tuning.baumgarte / dt * overlap);
            }
            p.velocity_bias = bias;
        }
    }

    /// Apply accumulated impulses from the previous frame.
    pub fn warm_start(&mut self, bodies: &mut BodySet) {
        for i in 0..self.point_count {
            let p = self.points[i];
            let impulse = p.normal * p.normal_impulse
                + p.tangent[0] * p.friction_impulse[0]
                + p.tangent[1] * p.friction_impulse[1];
            let at = self.pos_a0 + p.r_a;
            Self::apply_impulse(bodies, self.body_a, -impulse, at);
            Self::apply_impulse(bodies, self.body_b, impulse, at);
        }
    }

    /// One velocity iteration: friction first, then the unilateral normal.
    pub fn solve_velocity(&mut self, bodies: &mut BodySet) {
        for i in 0..self.point_count {
            let p = self.points[i];
            let at = self.pos_a0 + p.r_a;

            // Friction along both tangents, then project the accumulated
            // impulse into the cone |f| <= mu * normal_impulse.
            let max_friction = self.friction * p.normal_impulse;
            let mut new_accum = p.friction_impulse;
            for axis in 0..2 {
                let dv = Self::relative_velocity(bodies, self.body_a, self.body_b, at);
                let vt = dv.dot(p.tangent[axis]);
                let lambda = -p.tangent_mass[axis] * vt;
                let target = new_accum[axis] + lambda;
                // Apply the per-axis delta now; the cone projection below
                // trims any excess.
                let delta = target - self.points[i].friction_impulse[axis];
                new_accum[axis] = target;
                let impulse = p.tangent[axis] * delta;
                Self::apply_impulse(bodies, self.body_a, -impulse, at);
                Self::apply_impulse(bodies, self.body_b, impulse, at);
                self.points[i].friction_impulse[axis] = target;
            }

            let len_sq = new_accum[0] * new_accum[0] + new_accum[1] * new_accum[1];
            if len_sq > max_friction * max_friction && len_sq > 0.0 {
                let scale = max_friction / len_sq.sqrt();
                let clamped = [new_accum[0] * scale, new_accum[1] * scale];
                let excess0 = clamped[0] - self.points[i].friction_impulse[0];
                let excess1 = clamped[1] - self.points[i].friction_impulse[1];
                let impulse = p.tangent[0] * excess0 + p.tangent[1] * excess1;
                Self::apply_impulse(bodies, self.body_a, -impulse, at);
                Self::apply_impulse(bodies, self.body_b, impulse, at);
                self.points[i].friction_impulse = clamped;
            }

            // Normal: unilateral, accumulated impulse clamped at zero.
            let dv = Self::relative_velocity(bodies, self.body_a, self.body_b, at);
            let vn = dv.dot(p.normal);
            let lambda = -p.normal_mass * (vn - p.velocity_bias);
            let old = self.points[i].normal_impulse;
            let new = (old + lambda).max(0.0);
            let delta = new - old;
            self.points[i].normal_impulse = new;

            let impulse = p.normal * delta;
            Self::apply_impulse(bodies, self.body_a, -impulse, at);
            Self::apply_impulse(bodies, self.body_b, impulse, at);
        }
    }

    /// Split-impulse position pass: linear pseudo-translation along the
    /// normal, applied after pose integration. Does not touch velocities.
    pub fn solve_position(&mut self, bodies: &mut BodySet, tuning: &SolverTuning) {
        let inv_mass = |id: Option<BodyId>| -> f32 {
            id.and_then(|id| bodies.get(id))
                .filter(|b| b.is_dynamic())
                .map_or(0.0, |b| b.inv_mass)
        };
        let inv_mass_a = inv_mass(self.body_a);
        let inv_mass_b = inv_mass(self.body_b);
        let total = inv_mass_a + inv_mass_b;
        if total == 0.0 {
            return;
        }

        let pos = |bodies: &BodySet, id: Option<BodyId>, fallback: Vec3| -> Vec3 {
            id.and_then(|id| bodies.get(id)).map_or(fallback, |b| b.position)
        };

        for i in 0..self.point_count {
            let p = self.points[i];
            let moved_a = pos(bodies, self.body_a, self.pos_a0) - self.pos_a0;
            let moved_b = pos(bodies, self.body_b, self.pos_b0) - self.pos_b0;
            // Separation accumulated since prepare reduces the depth.
            let depth_now = p.depth - (moved_b - moved_a).dot(p.normal);
            let error = depth_now - tuning.allowed_penetration;
            if error <= 0.0 {
                continue;
            }

            let correction = (tuning.position_correction_factor * error)
                .min(tuning.max_position_correction);
            let shift = p.normal * (correction / total);

            if let Some(body) = self.body_a.and_then(|id| bodies.get_mut(id)) {
                if body.is_dynamic() {
                    body.position -= shift * body.inv_mass;
                }
            }
            if let Some(body) = self.body_b.and_then(|id| bodies.get_mut(id)) {
                if body.is_dynamic() {
                    body.position += shift * body.inv_mass;
                }
            }
        }
    }

    /// Reset accumulated impulses.
    pub fn clear_accumulated_impulses(&mut self) {
        for p in &mut self.points {
            p.normal_impulse = 0.0;
            p.friction_impulse = [0.0; 2];
        }
    }

    /// Bodies touched, for island linking.
    pub fn collect_bodies(&self, out: &mut Vec<BodyId>) {
        if let Some(a) = self.body_a {
            out.push(a);
        }
        if let Some(b) = self.body_b {
            out.push(b);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::RigidBody;
    use crate::contact_gen::ContactData;
    use crate::math::Pose;

    fn manifold_single(normal: Vec3, depth: f32, position: Vec3) -> ContactManifold {
        let mut m = ContactManifold::new();
        m.update_from(
            &[ContactData {
                position,
                normal,
                depth,
                feature_id: 0,
            }],
            &Pose::IDENTITY,
            &Pose::IDENTITY,
        );
        m
    }

    /// One dynamic body falling onto static geometry below: after enough
    /// velocity iterations the approach velocity along the normal is gone
    /// and the accumulated normal impulse is non-negative.
    #[test]
    fn test_normal_impulse_stops_approach() {
        let mut bodies = BodySet::new();
        let a = bodies.add(RigidBody::new_dynamic(Vec3::new(0.0, 0.5, 0.0), 1.0));
        bodies[a].linear_velocity = Vec3::new(0.0, -2.0, 0.0);

        // A above static floor: normal A->B points down.
        let manifold = manifold_single(Vec3::NEG_Y, 0.01, Vec3::ZERO);
        let mut c = ContactConstraint::new(PairId(0), Some(a), None);
        c.sync_from_manifold(&manifold);

        let tuning = SolverTuning::default();
        c.prepare(&bodies, 1.0 / 60.0, &tuning);
        c.warm_start(&mut bodies);
        for _ in 0..10 {
            c.solve_velocity(&mut bodies);
        }

        assert!(
            bodies[a].linear_velocity.y > -1e-3,
            "approach velocity must be cancelled, v = {:?}",
            bodies[a].linear_velocity
        );
        assert!(c.normal_impulse(0) >= 0.0);
        // Impulse to stop 2 m/s on 1 kg is 2 N*s.
        assert!((c.normal_impulse(0) - 2.0).abs() < 1e-2);
    }

    #[test]
    fn test_separating_contact_applies_nothing() {
        let mut bodies = BodySet::new();
        let a = bodies.add(RigidBody::new_dynamic(Vec3::new(0.0, 0.5, 0.0), 1.0));
        bodies[a].linear_velocity = Vec3::new(0.0, 3.0, 0.0); // moving away

        let manifold = manifold_single(Vec3::NEG_Y, 0.001, Vec3::ZERO);
        let mut c = ContactConstraint::new(PairId(0), Some(a), None);
        c.sync_from_manifold(&manifold);

        let mut tuning = SolverTuning::default();
        tuning.position_iterations = 2; // keep bias out of the velocity solve
        c.prepare(&bodies, 1.0 / 60.0, &tuning);
        for _ in 0..10 {
            c.solve_velocity(&mut bodies);
        }

        assert_eq!(c.normal_impulse(0), 0.0);
        assert!((bodies[a].linear_velocity.y - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_friction_cone_respected() {
        let mut bodies = BodySet::new();
        let a = bodies.add(RigidBody::new_dynamic(Vec3::new(0.0, 0.5, 0.0), 1.0));
        // Pressing down and sliding sideways fast.
        bodies[a].linear_velocity = Vec3::new(5.0, -1.0, 0.0);
        bodies[a].lock_rotation();

        let manifold = manifold_single(Vec3::NEG_Y, 0.01, Vec3::ZERO);
        let mut c = ContactConstraint::new(PairId(0), Some(a), None);
        c.friction = 0.5;
        c.sync_from_manifold(&manifold);

        let tuning = SolverTuning::default();
        c.prepare(&bodies, 1.0 / 60.0, &tuning);
        for _ in 0..10 {
            c.solve_velocity(&mut bodies);
        }

        let f = c.friction_impulse(0);
        let f_mag_sq = f[0] * f[0] + f[1] * f[1];
        let cone = c.friction * c.normal_impulse(0);
        assert!(
            f_mag_sq <= cone * cone + 1e-6,
            "friction {:?} exceeds cone {}",
            f,
            cone
        );
        // Sliding must have slowed, but friction cannot reverse the slide.
        assert!(bodies[a].linear_velocity.x < 5.0);
        assert!(bodies[a].linear_velocity.x >= -1e-3);
    }

    #[test]
    fn test_restitution_bounces() {
        let mut bodies = BodySet::new();
        let a = bodies.add(RigidBody::new_dynamic(Vec3::new(0.0, 0.5, 0.0), 1.0));
        bodies[a].linear_velocity = Vec3::new(0.0, -4.0, 0.0);

        let manifold = manifold_single(Vec3::NEG_Y, 0.01, Vec3::ZERO);
        let mut c = ContactConstraint::new(PairId(0), Some(a), None);
        c.restitution = 1.0;
        c.sync_from_manifold(&manifold);

        let tuning = SolverTuning::default();
        c.prepare(&bodies, 1.0 / 60.0, &tuning);
        for _ in 0..10 {
            c.solve_velocity(&mut bodies);
        }

        // Perfect restitution reflects the approach speed.
        assert!(
            (bodies[a].linear_velocity.y - 4.0).abs() < 0.05,
            "v = {:?}",
            bodies[a].linear_velocity
        );
    }

    #[test]
    fn test_warm_start_reapplies_impulse() {
        let mut bodies = BodySet::new();
        let a = bodies.add(RigidBody::new_dynamic(Vec3::new(0.0, 0.5, 0.0), 1.0));

        let mut manifold = manifold_single(Vec3::NEG_Y, 0.01, Vec3::ZERO);
        manifold.points_mut().next().unwrap().normal_impulse = 1.5;

        let mut c = ContactConstraint::new(PairId(0), Some(a), None);
        c.sync_from_manifold(&manifold);
        let tuning = SolverTuning::default();
        c.prepare(&bodies, 1.0 / 60.0, &tuning);
        c.warm_start(&mut bodies);

        // Normal is -Y; -impulse on A pushes it up.
        assert!(
            (bodies[a].linear_velocity.y - 1.5).abs() < 1e-5,
            "v = {:?}",
            bodies[a].linear_velocity
        );
    }

    #[test]
    fn test_store_impulses_round_trip() {
        let mut bodies = BodySet::new();
        let a = bodies.add(RigidBody::new_dynamic(Vec3::new(0.0, 0.5, 0.0), 1.0));
        bodies[a].linear_velocity = Vec3::new(0.0, -2.0, 0.0);

        let mut manifold = manifold_single(Vec3::NEG_Y, 0.01, Vec3::ZERO);
        let mut c = ContactConstraint::new(PairId(0), Some(a), None);
        c.sync_from_manifold(&manifold);
        let tuning = SolverTuning::default();
        c.prepare(&bodies, 1.0 / 60.0, &tuning);
        for _ in 0..10 {
            c.solve_velocity(&mut bodies);
        }
        c.store_impulses(&mut manifold);

        assert!(manifold.points().next().unwrap().normal_impulse > 0.0);
    }

    #[test]
    fn test_position_pass_pushes_out() {
        let mut bodies = BodySet::new();
        let a = bodies.add(RigidBody::new_dynamic(Vec3::new(0.0, 0.4, 0.0), 1.0));

        // Deep penetration into the floor below.
        let manifold = manifold_single(Vec3::NEG_Y, 0.1, Vec3::ZERO);
        let mut c = ContactConstraint::new(PairId(0), Some(a), None);
        c.sync_from_manifold(&manifold);
        let tuning = SolverTuning::default();
        c.prepare(&bodies, 1.0 / 60.0, &tuning);

        let y0 = bodies[a].position.y;
        for _ in 0..tuning.position_iterations {
            c.solve_position(&mut bodies, &tuning);
        }
        assert!(
            bodies[a].position.y > y0,
            "position pass must push the body out of the floor"
        );
        // And never through the allowed-penetration band in one go.
        assert!(bodies[a].position.y - y0 <= tuning.max_position_correction + 1e-6);
    }
}
