//! Character Controller
//!
//! A worked compound consumer of the kernel: a vertical cylinder body
//! (continuous updating, rotation locked so it cannot tip) driven by
//! constraints. A [`SupportFinder`] classifies the character's contacts into
//! none / support / support-with-traction; a [`HorizontalMotionConstraint`]
//! registered through the solver's extensibility seam drives planar motion
//! against the ground; a [`Stepper`] resolves short ledges by teleporting;
//! ground glue keeps pose integration from floating the character off its
//! support.
//!
//! The controller implements all three update phases: support collection,
//! jumping, stepping and constraint hand-off happen in `BeforeSolver`; the
//! glue block runs again in `BeforePositionUpdate` against the solver's
//! corrected velocities; `EndOfTimeStep` is intentionally empty.
//!
//! Contact normals below follow the pipeline convention, oriented from the
//! character toward the support (roughly downward when standing).

use core::any::Any;

use glam::{Vec2, Vec3};

use crate::body::{BodyId, BodySet, PositionUpdateMode, RigidBody};
use crate::collidable::{Collidable, CollidableId};
use crate::constraint::{SolverTuning, SolverUpdateable};
use crate::error::PhysicsError;
use crate::mass_properties::cylinder_mass_properties;
use crate::narrow_phase::PairState;
use crate::raycast::Ray;
use crate::shape::Shape;
use crate::solver::ConstraintHandle;
use crate::space::{Space, Updateable};

/// World up direction used by the controller.
const UP: Vec3 = Vec3::Y;

/// Character tuning.
#[derive(Clone, Copy, Debug)]
pub struct CharacterConfig {
    /// Cylinder radius
    pub radius: f32,
    /// Cylinder total height
    pub height: f32,
    /// Body mass
    pub mass: f32,
    /// Target horizontal speed with traction
    pub speed: f32,
    /// Maximum horizontal force with traction
    pub traction_force: f32,
    /// Maximum horizontal force while merely supported
    pub sliding_force: f32,
    /// Upward speed set by a jump from traction
    pub jump_speed: f32,
    /// Speed along the support normal for a sliding jump
    pub sliding_jump_speed: f32,
    /// Fraction of the jump impulse applied as reaction to dynamic supports
    pub jump_force_factor: f32,
    /// Maximum downward-relative speed the glue block cancels
    pub glue_speed: f32,
    /// Maximum ledge height the stepper resolves
    pub max_step_height: f32,
    /// Steepest walkable slope, in radians from horizontal
    pub max_slope: f32,
    /// Collision margin on the character's collidable
    pub collision_margin: f32,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            radius: 0.6,
            height: 1.7,
            mass: 10.0,
            speed: 8.0,
            traction_force: 1000.0,
            sliding_force: 250.0,
            jump_speed: 4.5,
            sliding_jump_speed: 3.0,
            jump_force_factor: 1.0,
            glue_speed: 5.0,
            max_step_height: 1.0,
            max_slope: core::f32::consts::FRAC_PI_4,
            collision_margin: 0.1,
        }
    }
}

impl CharacterConfig {
    /// Validate configuration invariants.
    pub fn validate(&self) -> Result<(), PhysicsError> {
        if self.jump_force_factor < 0.0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "jump_force_factor must be >= 0",
            });
        }
        if !(self.radius > 0.0 && self.height > 2.0 * self.radius) {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "character height must exceed its diameter",
            });
        }
        if self.mass <= 0.0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "character mass must be positive",
            });
        }
        Ok(())
    }
}

/// A chosen support contact.
#[derive(Clone, Copy, Debug)]
pub struct SupportData {
    /// Contact position, world space
    pub position: Vec3,
    /// Contact normal, character toward support (downward-ish)
    pub normal: Vec3,
    /// Penetration depth
    pub depth: f32,
    /// Supporting body, if the support is dynamic or kinematic
    pub support_body: Option<BodyId>,
    /// Supporting collidable
    pub support_collidable: CollidableId,
    /// Whether the slope is shallow enough to walk on
    pub has_traction: bool,
}

/// Classifies the character's contacts into support categories.
#[derive(Clone, Copy, Debug)]
pub struct SupportFinder {
    /// Cosine of the steepest walkable slope
    pub max_slope_cos: f32,
}

impl SupportFinder {
    fn new(max_slope: f32) -> Self {
        Self {
            max_slope_cos: max_slope.cos(),
        }
    }

    /// Scan the character's touching pairs for the best support contact.
    /// Preference order: traction over plain support, then the most vertical
    /// normal, then depth.
    pub fn update_supports(
        &self,
        space: &Space,
        character_collidable: CollidableId,
    ) -> Option<SupportData> {
        let mut best: Option<SupportData> = None;
        let mut best_rating = f32::MIN;

        for (_, pair) in space.narrow_phase.pairs_involving(character_collidable) {
            if pair.state != PairState::Touching {
                continue;
            }
            let key = pair.key.expect("touching pair has a key");
            let character_is_a = key.a == character_collidable;
            let other = if character_is_a { key.b } else { key.a };
            let Some(other_collidable) = space.collidables.get(other) else {
                continue;
            };

            for point in pair.manifold.points() {
                // Orient the normal from the character toward the other side.
                let normal = if character_is_a {
                    point.normal
                } else {
                    -point.normal
                };

                // Supports push the character up: normal points down.
                let downness = normal.dot(-UP);
                if downness < 0.01 {
                    continue;
                }
                let has_traction = downness >= self.max_slope_cos;
                let base = if has_traction { downness + 1.0 } else { downness };
                let rating = base + point.depth * 0.01;
                if rating > best_rating {
                    best_rating = rating;
                    best = Some(SupportData {
                        position: point.position,
                        normal,
                        depth: point.depth,
                        support_body: other_collidable.body,
                        support_collidable: other,
                        has_traction,
                    });
                }
            }
        }

        best
    }
}

// ============================================================================
// Horizontal motion constraint
// ============================================================================

/// Drives the character's planar velocity toward the movement target,
/// limited by a traction-dependent force budget. Registered with the solver
/// through the `SolverUpdateable` seam; the controller hands it fresh
/// support data every step before the solver runs (the hand-off is not
/// thread-safe, which is why it happens outside the solve).
pub struct HorizontalMotionConstraint {
    body: BodyId,
    support_body: Option<BodyId>,
    active: bool,
    /// Basis on the horizontal plane: forward then strafe.
    basis: [Vec3; 2],
    target_velocity: Vec2,
    max_impulse: f32,
    effective_mass: [f32; 2],
    accumulated: Vec2,
}

impl HorizontalMotionConstraint {
    fn new(body: BodyId) -> Self {
        Self {
            body,
            support_body: None,
            active: false,
            basis: [Vec3::X, Vec3::Z],
            target_velocity: Vec2::ZERO,
            max_impulse: 0.0,
            effective_mass: [0.0; 2],
            accumulated: Vec2::ZERO,
        }
    }

    /// Per-step hand-off from the controller.
    fn configure(
        &mut self,
        support_body: Option<BodyId>,
        movement_direction: Option<Vec2>,
        target_speed: f32,
        max_force: f32,
        dt: f32,
        active: bool,
    ) {
        self.support_body = support_body;
        self.active = active;
        self.max_impulse = max_force * dt;

        let forward = match movement_direction {
            Some(dir) if dir.length_squared() > 1.0e-8 => {
                let d = dir.normalize();
                Vec3::new(d.x, 0.0, d.y)
            }
            _ => Vec3::X,
        };
        self.basis = [forward, Vec3::new(-forward.z, 0.0, forward.x)];
        self.target_velocity = if movement_direction.is_some() {
            Vec2::new(target_speed, 0.0)
        } else {
            Vec2::ZERO
        };
    }

    fn support_velocity(&self, bodies: &BodySet, at: Vec3) -> Vec3 {
        self.support_body
            .and_then(|id| bodies.get(id))
            .map_or(Vec3::ZERO, |b| b.velocity_at_point(at))
    }
}

impl SolverUpdateable for HorizontalMotionConstraint {
    fn prepare(&mut self, bodies: &mut BodySet, _dt: f32, _tuning: &SolverTuning) {
        if !self.active {
            return;
        }
        let inv_mass_char = bodies.get(self.body).map_or(0.0, |b| b.inv_mass);
        let inv_mass_support = self
            .support_body
            .and_then(|id| bodies.get(id))
            .filter(|b| b.is_dynamic())
            .map_or(0.0, |b| b.inv_mass);
        let k = inv_mass_char + inv_mass_support;
        let mass = if k > 0.0 { 1.0 / k } else { 0.0 };
        self.effective_mass = [mass, mass];
    }

    fn warm_start(&mut self, bodies: &mut BodySet) {
        if !self.active {
            self.accumulated = Vec2::ZERO;
            return;
        }
        let impulse = self.basis[0] * self.accumulated.x + self.basis[1] * self.accumulated.y;
        let position = bodies.get(self.body).map_or(Vec3::ZERO, |b| b.position);
        if let Some(body) = bodies.get_mut(self.body) {
            body.apply_impulse(impulse);
        }
        if let Some(support) = self.support_body.and_then(|id| bodies.get_mut(id)) {
            support.apply_impulse_at(-impulse, position);
        }
    }

    fn solve_velocity(&mut self, bodies: &mut BodySet) {
        if !self.active {
            return;
        }
        let Some(body) = bodies.get(self.body) else {
            return;
        };
        let position = body.position;
        let relative =
            body.linear_velocity - self.support_velocity(bodies, position);

        let error = Vec2::new(
            relative.dot(self.basis[0]) - self.target_velocity.x,
            relative.dot(self.basis[1]) - self.target_velocity.y,
        );
        let lambda = Vec2::new(
            -self.effective_mass[0] * error.x,
            -self.effective_mass[1] * error.y,
        );

        // Accumulate and clamp the total impulse magnitude to the force
        // budget for this step.
        let mut next = self.accumulated + lambda;
        let len_sq = next.length_squared();
        if len_sq > self.max_impulse * self.max_impulse && len_sq > 0.0 {
            next *= self.max_impulse / len_sq.sqrt();
        }
        let delta = next - self.accumulated;
        self.accumulated = next;

        let impulse = self.basis[0] * delta.x + self.basis[1] * delta.y;
        if let Some(body) = bodies.get_mut(self.body) {
            body.apply_impulse(impulse);
        }
        if let Some(support) = self.support_body.and_then(|id| bodies.get_mut(id)) {
            support.apply_impulse_at(-impulse, position);
        }
    }

    fn clear_accumulated_impulses(&mut self) {
        self.accumulated = Vec2::ZERO;
    }

    fn collect_bodies(&self, out: &mut Vec<BodyId>) {
        out.push(self.body);
        if let Some(id) = self.support_body {
            out.push(id);
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ============================================================================
// Stepper
// ============================================================================

/// Probes vertically to resolve short up/down steps by teleporting the
/// character body.
#[derive(Clone, Copy, Debug)]
pub struct Stepper {
    /// Maximum ledge height resolved
    pub max_step_height: f32,
}

impl Stepper {
    /// Try to snap the character down onto ground within step height below
    /// its feet. Returns the new body position.
    fn try_step_down(
        &self,
        space: &Space,
        body_position: Vec3,
        collidable: CollidableId,
        config: &CharacterConfig,
        slope_cos: f32,
    ) -> Option<Vec3> {
        let half_height = config.height * 0.5;
        let ray = Ray::new(body_position, -UP);
        let max_t = half_height + self.max_step_height;
        let (_, hit) = space.raycast(&ray, max_t, Some(collidable))?;

        if hit.normal.dot(UP) < slope_cos {
            return None; // too steep to stand on
        }

        let gap = hit.t - half_height;
        // Worth a teleport only when actually separated but within reach.
        if gap <= config.collision_margin || gap > self.max_step_height {
            return None;
        }

        Some(body_position - UP * (gap - config.collision_margin * 0.5))
    }

    /// Try to climb a ledge ahead of the character. Returns the new body
    /// position.
    fn try_step_up(
        &self,
        space: &Space,
        body_position: Vec3,
        collidable: CollidableId,
        forward: Vec3,
        config: &CharacterConfig,
        slope_cos: f32,
    ) -> Option<Vec3> {
        let half_height = config.height * 0.5;
        let probe_start =
            body_position + UP * self.max_step_height + forward * (config.radius + config.collision_margin);
        let ray = Ray::new(probe_start, -UP);
        let max_t = half_height + self.max_step_height;
        let (_, hit) = space.raycast(&ray, max_t, Some(collidable))?;

        if hit.normal.dot(UP) < slope_cos {
            return None;
        }

        let ground_y = probe_start.y - hit.t;
        let rise = ground_y - (body_position.y - half_height);
        if rise <= config.collision_margin || rise > self.max_step_height {
            return None;
        }

        Some(Vec3::new(
            probe_start.x,
            ground_y + half_height + config.collision_margin * 0.5,
            probe_start.z,
        ))
    }
}

// ============================================================================
// Controller
// ============================================================================

/// The character controller. Register it as an updateable after creation:
///
/// ```ignore
/// let character = CharacterController::new(&mut space, start, config)?;
/// let handle = space.add_updateable(Box::new(character));
/// // later:
/// let character = space
///     .updateable_mut::<CharacterController>(handle)
///     .unwrap();
/// character.set_movement(Some(Vec2::new(1.0, 0.0)));
/// ```
pub struct CharacterController {
    /// The cylinder body
    pub body: BodyId,
    /// The cylinder collidable
    pub collidable: CollidableId,
    /// Tuning
    pub config: CharacterConfig,
    /// Contact classifier
    pub support_finder: SupportFinder,
    /// Step resolver
    pub stepper: Stepper,
    motion_constraint: ConstraintHandle,
    movement_direction: Option<Vec2>,
    jump_requested: bool,
    /// The support chosen this step
    pub support: Option<SupportData>,
    had_traction: bool,
}

impl CharacterController {
    /// Create the character body and collidable inside the space and wire up
    /// its constraint and events.
    pub fn new(
        space: &mut Space,
        position: Vec3,
        config: CharacterConfig,
    ) -> Result<Self, PhysicsError> {
        config.validate()?;

        let mut body = RigidBody::new_dynamic(position, config.mass);
        body.set_mass_properties(&cylinder_mass_properties(
            config.radius,
            config.height * 0.5,
            config.mass,
        ));
        // Zero local inertia prevents tipping; stepping and fast falls want
        // continuous updating.
        body.lock_rotation();
        body.position_update_mode = PositionUpdateMode::Continuous;
        body.linear_damping = 0.0;
        body.angular_damping = 0.0;
        let body_id = space.add_body(body);

        let mut collidable = Collidable::new(
            Shape::Cylinder {
                radius: config.radius,
                half_height: config.height * 0.5,
            },
            body_id,
        );
        collidable.margin = config.collision_margin;
        let collidable_id = space.add_collidable(collidable);

        // The motion constraint owns horizontal friction, so the regular
        // contact friction is zeroed on every pair the character creates.
        space.events.entry(collidable_id).creating_pair =
            Some(Box::new(|_own, _other, material| {
                material.friction = 0.0;
            }));

        let motion_constraint = space
            .solver
            .add_custom(Box::new(HorizontalMotionConstraint::new(body_id)));

        Ok(Self {
            body: body_id,
            collidable: collidable_id,
            config,
            support_finder: SupportFinder::new(config.max_slope),
            stepper: Stepper {
                max_step_height: config.max_step_height,
            },
            motion_constraint,
            movement_direction: None,
            jump_requested: false,
            support: None,
            had_traction: false,
        })
    }

    /// Set the movement input on the horizontal (X, Z) plane; `None` brakes.
    pub fn set_movement(&mut self, direction: Option<Vec2>) {
        self.movement_direction = direction.filter(|d| d.length_squared() > 1.0e-8);
    }

    /// Request a jump on the next step.
    pub fn request_jump(&mut self) {
        self.jump_requested = true;
    }

    /// Whether the character currently stands on a walkable surface.
    pub fn has_traction(&self) -> bool {
        self.support.map_or(false, |s| s.has_traction)
    }

    /// Relative velocity of the character against its support.
    fn relative_velocity(&self, space: &Space) -> Vec3 {
        let velocity = space.bodies[self.body].linear_velocity;
        match self.support {
            Some(s) => {
                let support_velocity = s
                    .support_body
                    .and_then(|id| space.bodies.get(id))
                    .map_or(Vec3::ZERO, |b| b.velocity_at_point(s.position));
                velocity - support_velocity
            }
            None => velocity,
        }
    }

    fn collect_support(&mut self, space: &Space) {
        self.support = self.support_finder.update_supports(space, self.collidable);
    }

    /// The glue block: cancel a small separating velocity so pose
    /// integration does not float the character off its support.
    fn apply_ground_glue(&mut self, space: &mut Space) {
        let Some(support) = self.support else { return };
        if !support.has_traction {
            return;
        }
        let relative = self.relative_velocity(space);
        // Normal points down into the support: negative vertical means the
        // character is drifting upward, away from the ground.
        let vertical = relative.dot(support.normal);
        if -self.config.glue_speed < vertical && vertical < 0.0 {
            // The correction applies to the character only, never the support.
            let body = &mut space.bodies[self.body];
            body.linear_velocity += support.normal * (-vertical);
        }
    }

    fn teleport(&mut self, space: &mut Space, new_position: Vec3, dt: f32) {
        space.bodies[self.body].position = new_position;
        space.refresh_collidable(self.collidable);
        space.update_pairs_involving(self.collidable, dt);
        self.collect_support(space);
    }

    fn handle_jump(&mut self, space: &mut Space) {
        if !self.jump_requested {
            return;
        }
        self.jump_requested = false;

        let Some(support) = self.support else { return };
        let velocity = space.bodies[self.body].linear_velocity;

        let (delta_v, reaction_point) = if support.has_traction {
            let current_up = velocity.dot(UP);
            (UP * (self.config.jump_speed - current_up), support.position)
        } else {
            let away = -support.normal;
            let current = velocity.dot(away);
            (
                away * (self.config.sliding_jump_speed - current),
                support.position,
            )
        };

        space.bodies[self.body].linear_velocity += delta_v;

        // Dynamic supports feel the launch.
        if let Some(support_id) = support.support_body {
            let reaction = -delta_v * self.config.mass * self.config.jump_force_factor;
            if let Some(support_body) = space.bodies.get_mut(support_id) {
                support_body.apply_impulse_at(reaction, reaction_point);
            }
        }

        // The character left the ground by fiat; forget the support.
        self.support = None;
    }

    fn attempt_stepping(&mut self, space: &mut Space, dt: f32) {
        let position = space.bodies[self.body].position;
        let slope_cos = self.support_finder.max_slope_cos;

        // Down-step: traction was just lost while walking; snap back down
        // if ground is within reach.
        let lost_ground = self.had_traction && !self.has_traction();
        if lost_ground {
            if let Some(new_position) = self.stepper.try_step_down(
                space,
                position,
                self.collidable,
                &self.config,
                slope_cos,
            ) {
                self.teleport(space, new_position, dt);
                return;
            }
        }

        // Up-step: moving into a short ledge while standing.
        let Some(direction) = self.movement_direction else {
            return;
        };
        if !self.has_traction() {
            return;
        }
        let forward3 = Vec3::new(direction.x, 0.0, direction.y).normalize_or_zero();

        // Blocked check: a steep contact facing the movement direction.
        let blocked = space
            .narrow_phase
            .pairs_involving(self.collidable)
            .filter(|(_, pair)| pair.state == PairState::Touching)
            .flat_map(|(_, pair)| {
                let flip = pair.key.map_or(false, |k| k.b == self.collidable);
                pair.manifold
                    .points()
                    .map(move |p| if flip { -p.normal } else { p.normal })
                    .collect::<Vec<_>>()
            })
            .any(|n| n.dot(UP).abs() < 0.3 && n.dot(forward3) > 0.5);
        if !blocked {
            return;
        }

        if let Some(new_position) = self.stepper.try_step_up(
            space,
            position,
            self.collidable,
            forward3,
            &self.config,
            slope_cos,
        ) {
            self.teleport(space, new_position, dt);
        }
    }
}

impl Updateable for CharacterController {
    fn before_solver(&mut self, space: &mut Space, dt: f32) {
        // 1. Remember whether we stood on something last step.
        let had_traction = self.had_traction;

        // 2. Collect support data from the narrow phase.
        self.collect_support(space);

        // 3-4. Decompose the relative velocity against the support.
        if let Some(support) = self.support {
            let relative = self.relative_velocity(space);
            let vertical = relative.dot(support.normal);

            // 5. Traction just acquired while flying away: we never really
            // stood on it.
            if !had_traction && support.has_traction && vertical < 0.0 {
                self.support = None;
            }
        }

        // 6. Jumping.
        self.handle_jump(space);

        // 7. Stepping (teleports re-run the narrow phase and re-collect
        // support).
        self.attempt_stepping(space, dt);

        // 8. Ground glue.
        self.apply_ground_glue(space);

        // 9. Hand the fresh support off to the motion constraint. This is
        // not thread-safe and must stay outside the solver's own pass.
        let support = self.support;
        let has_traction = self.has_traction();
        let max_force = if has_traction {
            self.config.traction_force
        } else {
            self.config.sliding_force
        };
        let movement = self.movement_direction;
        let speed = self.config.speed;
        let active = support.is_some();
        if let Some(constraint) = space
            .solver
            .custom_mut::<HorizontalMotionConstraint>(self.motion_constraint)
        {
            constraint.configure(
                support.and_then(|s| s.support_body),
                movement,
                speed,
                max_force,
                dt,
                active,
            );
        }

        self.had_traction = self.has_traction();
    }

    fn before_position_update(&mut self, space: &mut Space, _dt: f32) {
        // Repeat the glue block against the solver's corrected velocities so
        // pose integration cannot separate the character from the ground.
        self.apply_ground_glue(space);
    }

    fn end_of_time_step(&mut self, _space: &mut Space, _dt: f32) {
        // Intentionally empty.
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
