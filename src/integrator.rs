//! Pose and Velocity Integration
//!
//! Semi-implicit Euler: forces become tentative velocities before the
//! collision pipeline runs, and poses integrate from the solver-corrected
//! velocities afterwards. Orientations are renormalized every step and the
//! world-space inverse inertia is refreshed from the new orientation.
//!
//! Continuous-update bodies sweep their bounding sphere against static
//! geometry and clamp the pose advance at the first impact.

use glam::Vec3;

use crate::body::{BodySet, BodyType, PositionUpdateMode};
use crate::ccd::{conservative_advancement, needs_ccd, CcdConfig};
use crate::collidable::CollidableSet;
use crate::math::{integrate_orientation, is_finite};

/// Apply gravity and damping to produce tentative velocities.
pub fn integrate_velocities(bodies: &mut BodySet, gravity: Vec3, dt: f32) {
    let per_body = |body: &mut crate::body::RigidBody| {
        if body.tombstone || !body.is_active || body.body_type != BodyType::Dynamic {
            return;
        }
        debug_assert!(is_finite(body.linear_velocity), "NaN velocity is a caller bug");

        body.linear_velocity += gravity * body.gravity_scale * dt;
        body.linear_velocity *= 1.0 / (1.0 + body.linear_damping * dt);
        body.angular_velocity *= 1.0 / (1.0 + body.angular_damping * dt);
    };

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        bodies.slots_mut().par_iter_mut().for_each(per_body);
    }

    #[cfg(not(feature = "parallel"))]
    {
        bodies.slots_mut().iter_mut().for_each(per_body);
    }
}

/// Integrate corrected velocities into poses.
///
/// Kinematic bodies advance by their prescribed velocity; static bodies do
/// not move. Returns the number of CCD sweeps performed.
pub fn integrate_poses(
    bodies: &mut BodySet,
    collidables: &CollidableSet,
    dt: f32,
    ccd: &CcdConfig,
) -> u32 {
    let mut ccd_sweeps = 0;

    // Pose advance first (cheap, parallel-friendly)...
    let per_body = |body: &mut crate::body::RigidBody| {
        if body.tombstone || !body.is_active || body.body_type == BodyType::Static {
            return;
        }
        body.position += body.linear_velocity * dt;
        if body.angular_velocity.length_squared() > 0.0 {
            body.orientation = integrate_orientation(body.orientation, body.angular_velocity, dt);
        }
        body.refresh_world_inertia();
    };

    // ...but continuous bodies are handled below with their motion clamped,
    // so collect them before advancing.
    let continuous: Vec<(crate::body::BodyId, f32)> = bodies
        .iter()
        .filter(|(_, b)| {
            b.is_active
                && b.is_dynamic()
                && b.position_update_mode == PositionUpdateMode::Continuous
        })
        .map(|(id, b)| {
            // The swept radius comes from the body's collidables.
            let radius = collidables
                .iter()
                .filter(|(_, c)| c.body == Some(id))
                .map(|(_, c)| c.shape.bounding_radius())
                .fold(0.0_f32, f32::max);
            (id, radius)
        })
        .collect();

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        let continuous_ids: std::collections::HashSet<u32> =
            continuous.iter().map(|(id, _)| id.0).collect();
        bodies
            .slots_mut()
            .par_iter_mut()
            .enumerate()
            .filter(|(i, _)| !continuous_ids.contains(&(*i as u32)))
            .for_each(|(_, b)| per_body(b));
    }

    #[cfg(not(feature = "parallel"))]
    {
        let continuous_ids: std::collections::HashSet<u32> =
            continuous.iter().map(|(id, _)| id.0).collect();
        for (i, b) in bodies.slots_mut().iter_mut().enumerate() {
            if !continuous_ids.contains(&(i as u32)) {
                per_body(b);
            }
        }
    }

    // Continuous bodies: clamp the linear advance at the earliest impact
    // against static geometry.
    for (id, radius) in continuous {
        let body = &bodies[id];
        let displacement = body.linear_velocity * dt;
        let start = body.position;

        let mut earliest_t = 1.0_f32;
        if radius > 0.0 && needs_ccd(displacement, radius, ccd) {
            for (_, collidable) in collidables.iter() {
                if collidable.is_mobile() {
                    continue;
                }
                ccd_sweeps += 1;
                if let Some(toi) = conservative_advancement(
                    start,
                    radius,
                    displacement,
                    &collidable.shape,
                    &collidable.pose,
                    ccd,
                ) {
                    earliest_t = earliest_t.min(toi.t);
                }
            }
        }

        let body = &mut bodies[id];
        body.position += displacement * earliest_t;
        if body.angular_velocity.length_squared() > 0.0 {
            body.orientation = integrate_orientation(body.orientation, body.angular_velocity, dt);
        }
        body.refresh_world_inertia();
    }

    ccd_sweeps
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::RigidBody;
    use crate::collidable::Collidable;
    use crate::math::Pose;
    use crate::shape::Shape;

    const DT: f32 = 1.0 / 60.0;
    const GRAVITY: Vec3 = Vec3::new(0.0, -9.81, 0.0);

    #[test]
    fn test_free_fall_matches_ballistics() {
        let mut bodies = BodySet::new();
        let collidables = CollidableSet::new();
        let mut body = RigidBody::new_dynamic(Vec3::new(0.0, 100.0, 0.0), 1.0);
        body.linear_damping = 0.0;
        let id = bodies.add(body);

        let t_total = 1.0;
        let steps = (t_total / DT) as usize;
        for _ in 0..steps {
            integrate_velocities(&mut bodies, GRAVITY, DT);
            integrate_poses(&mut bodies, &collidables, DT, &CcdConfig::default());
        }

        // Semi-implicit Euler lands within O(dt) of the closed form.
        let expected = 100.0 + 0.5 * GRAVITY.y * t_total * t_total;
        let actual = bodies[id].position.y;
        assert!(
            (actual - expected).abs() < 0.2,
            "expected ~{expected}, got {actual}"
        );
    }

    #[test]
    fn test_orientation_stays_unit() {
        let mut bodies = BodySet::new();
        let collidables = CollidableSet::new();
        let mut body = RigidBody::new_dynamic(Vec3::ZERO, 1.0);
        body.angular_velocity = Vec3::new(3.0, 5.0, -2.0);
        body.angular_damping = 0.0;
        let id = bodies.add(body);

        for _ in 0..600 {
            integrate_poses(&mut bodies, &collidables, DT, &CcdConfig::default());
        }
        assert!((bodies[id].orientation.length() - 1.0).abs() < 1.0e-5);
    }

    #[test]
    fn test_static_and_inactive_bodies_do_not_move() {
        let mut bodies = BodySet::new();
        let collidables = CollidableSet::new();
        let s = bodies.add(RigidBody::new_static(Vec3::ZERO));
        let mut sleeping = RigidBody::new_dynamic(Vec3::new(5.0, 0.0, 0.0), 1.0);
        sleeping.is_active = false;
        sleeping.linear_velocity = Vec3::new(1.0, 0.0, 0.0);
        let d = bodies.add(sleeping);

        integrate_velocities(&mut bodies, GRAVITY, DT);
        integrate_poses(&mut bodies, &collidables, DT, &CcdConfig::default());

        assert_eq!(bodies[s].position, Vec3::ZERO);
        assert_eq!(bodies[d].position, Vec3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn test_kinematic_follows_prescribed_velocity() {
        let mut bodies = BodySet::new();
        let collidables = CollidableSet::new();
        let mut body = RigidBody::new_kinematic(Vec3::ZERO);
        body.linear_velocity = Vec3::new(2.0, 0.0, 0.0);
        let id = bodies.add(body);

        integrate_velocities(&mut bodies, GRAVITY, DT);
        integrate_poses(&mut bodies, &collidables, DT, &CcdConfig::default());

        // Gravity must not touch it; the prescribed velocity must.
        assert!((bodies[id].position.x - 2.0 * DT).abs() < 1e-6);
        assert_eq!(bodies[id].linear_velocity.y, 0.0);
    }

    #[test]
    fn test_continuous_body_stopped_by_thin_wall() {
        let mut bodies = BodySet::new();
        let mut collidables = CollidableSet::new();

        // Thin wall at x = 3.
        collidables.add(Collidable::new_static(
            Shape::Box {
                half_extents: Vec3::new(0.05, 5.0, 5.0),
            },
            Pose::from_position(Vec3::new(3.0, 0.0, 0.0)),
        ));

        let mut bullet = RigidBody::new_dynamic(Vec3::ZERO, 0.1);
        bullet.position_update_mode = PositionUpdateMode::Continuous;
        bullet.linear_velocity = Vec3::new(200.0, 0.0, 0.0);
        bullet.linear_damping = 0.0;
        let id = bodies.add(bullet);

        let c = Collidable::new(Shape::Sphere { radius: 0.1 }, id);
        collidables.add(c);

        let sweeps = integrate_poses(&mut bodies, &collidables, DT, &CcdConfig::default());
        assert!(sweeps > 0, "fast mover must be swept");

        // 200 m/s * 1/60 s = 3.33 m of motion; the wall face is at 2.95.
        let x = bodies[id].position.x;
        assert!(x < 2.96, "body tunnelled to x = {x}");
        assert!(x > 2.5, "body stopped far too early at x = {x}");
    }

    #[test]
    fn test_discrete_body_ignores_ccd() {
        let mut bodies = BodySet::new();
        let mut collidables = CollidableSet::new();
        collidables.add(Collidable::new_static(
            Shape::Box {
                half_extents: Vec3::new(0.05, 5.0, 5.0),
            },
            Pose::from_position(Vec3::new(3.0, 0.0, 0.0)),
        ));

        let mut bullet = RigidBody::new_dynamic(Vec3::ZERO, 0.1);
        bullet.linear_velocity = Vec3::new(200.0, 0.0, 0.0);
        bullet.linear_damping = 0.0;
        let id = bodies.add(bullet);
        collidables.add(Collidable::new(Shape::Sphere { radius: 0.1 }, id));

        integrate_poses(&mut bodies, &collidables, DT, &CcdConfig::default());
        // Discrete mode flies straight through (the known trade-off).
        assert!(bodies[id].position.x > 3.0);
    }
}
