//! Rigid Bodies
//!
//! Body state, body-type semantics, and the arena that stores them. Bodies
//! are addressed by stable [`BodyId`] indices; removal tombstones the slot
//! and recycles it later, so ids held by constraints and collidables never
//! dangle silently.
//!
//! Invariants: the orientation is unit length after every integration;
//! `inv_mass >= 0`; a zero inverse mass means the velocity is prescribed
//! (kinematic) or zero (static).

use glam::{Mat3, Quat, Vec3};

use crate::error::PhysicsError;
use crate::material::{MaterialId, DEFAULT_MATERIAL};
use crate::math::{world_inverse_inertia, Pose};

/// Stable handle to a body slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub u32);

/// Type of rigid body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BodyType {
    /// Moved by physics (gravity, constraints, impulses)
    Dynamic = 0,
    /// Never moves
    Static = 1,
    /// Moved by prescribed velocity, pushes dynamic bodies but is not
    /// affected by them
    Kinematic = 2,
}

/// How the integrator advances this body's pose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PositionUpdateMode {
    /// Teleport to the end-of-step pose
    #[default]
    Discrete,
    /// Sweep the bounding sphere and clamp at the first impact (fast movers)
    Continuous,
}

/// Rigid body state.
#[derive(Clone, Copy, Debug)]
pub struct RigidBody {
    /// Position of the center of mass
    pub position: Vec3,
    /// Orientation (unit quaternion)
    pub orientation: Quat,
    /// Linear velocity
    pub linear_velocity: Vec3,
    /// Angular velocity
    pub angular_velocity: Vec3,
    /// Inverse mass (0 = kinematic/static)
    pub inv_mass: f32,
    /// Inverse inertia tensor in local space
    pub local_inv_inertia: Mat3,
    /// Inverse inertia tensor in world space (refreshed each step)
    pub inv_inertia_world: Mat3,
    /// Material id used for contact blending
    pub material: MaterialId,
    /// Body type
    pub body_type: BodyType,
    /// Discrete or continuous pose updating
    pub position_update_mode: PositionUpdateMode,
    /// Linear damping coefficient (per second)
    pub linear_damping: f32,
    /// Angular damping coefficient (per second)
    pub angular_damping: f32,
    /// Gravity multiplier (1.0 = normal)
    pub gravity_scale: f32,
    /// Activity flag: inactive bodies are skipped by integration and solving
    pub is_active: bool,
    pub(crate) tombstone: bool,
}

impl RigidBody {
    /// Create a dynamic body with the inertia of a unit sphere of the given
    /// mass. Use [`RigidBody::set_mass_properties`] for shape-accurate
    /// inertia.
    pub fn new_dynamic(position: Vec3, mass: f32) -> Self {
        debug_assert!(mass >= 0.0, "negative mass is a caller bug");
        let inv_mass = if mass > 0.0 { 1.0 / mass } else { 0.0 };
        let inertia = 0.4 * mass;
        let local_inv_inertia = if inertia > 0.0 {
            Mat3::from_diagonal(Vec3::splat(1.0 / inertia))
        } else {
            Mat3::ZERO
        };

        Self {
            position,
            orientation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            inv_mass,
            local_inv_inertia,
            inv_inertia_world: local_inv_inertia,
            material: DEFAULT_MATERIAL,
            body_type: BodyType::Dynamic,
            position_update_mode: PositionUpdateMode::Discrete,
            linear_damping: 0.03,
            angular_damping: 0.15,
            gravity_scale: 1.0,
            is_active: true,
            tombstone: false,
        }
    }

    /// Create a static (immovable) body.
    pub fn new_static(position: Vec3) -> Self {
        Self {
            inv_mass: 0.0,
            local_inv_inertia: Mat3::ZERO,
            inv_inertia_world: Mat3::ZERO,
            body_type: BodyType::Static,
            linear_damping: 0.0,
            angular_damping: 0.0,
            gravity_scale: 0.0,
            ..Self::new_dynamic(position, 0.0)
        }
    }

    /// Create a kinematic body: infinite mass, moved by its prescribed
    /// velocity, unaffected by impulses.
    pub fn new_kinematic(position: Vec3) -> Self {
        Self {
            body_type: BodyType::Kinematic,
            gravity_scale: 0.0,
            ..Self::new_static(position)
        }
    }

    /// Replace mass and inertia from computed mass properties.
    pub fn set_mass_properties(&mut self, props: &crate::mass_properties::MassProperties) {
        self.inv_mass = if props.mass > 0.0 {
            1.0 / props.mass
        } else {
            0.0
        };
        self.local_inv_inertia = props.inverse_inertia();
        self.refresh_world_inertia();
    }

    /// Zero out rotational response (infinite inertia) while keeping linear
    /// mass. The character controller uses this to prevent tipping.
    pub fn lock_rotation(&mut self) {
        self.local_inv_inertia = Mat3::ZERO;
        self.inv_inertia_world = Mat3::ZERO;
    }

    /// Current pose.
    #[inline]
    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.orientation)
    }

    /// Whether this body responds to impulses.
    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    /// Whether this body never moves.
    #[inline]
    pub fn is_static(&self) -> bool {
        self.body_type == BodyType::Static
    }

    /// Whether this body follows a prescribed velocity.
    #[inline]
    pub fn is_kinematic(&self) -> bool {
        self.body_type == BodyType::Kinematic
    }

    /// Recompute the world-space inverse inertia from the current
    /// orientation.
    #[inline]
    pub fn refresh_world_inertia(&mut self) {
        self.inv_inertia_world = world_inverse_inertia(self.local_inv_inertia, self.orientation);
    }

    /// Velocity of a world-space point rigidly attached to this body.
    #[inline]
    pub fn velocity_at_point(&self, point: Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(point - self.position)
    }

    /// Apply an impulse at the center of mass.
    pub fn apply_impulse(&mut self, impulse: Vec3) {
        if self.is_dynamic() {
            self.linear_velocity += impulse * self.inv_mass;
            self.is_active = true;
        }
    }

    /// Apply an impulse at a world-space point.
    pub fn apply_impulse_at(&mut self, impulse: Vec3, point: Vec3) {
        if self.is_dynamic() {
            self.linear_velocity += impulse * self.inv_mass;
            let torque = (point - self.position).cross(impulse);
            self.angular_velocity += self.inv_inertia_world * torque;
            self.is_active = true;
        }
    }

    /// Kinetic energy `0.5 m v^2 + 0.5 w . L`. Zero for infinite-mass bodies.
    pub fn kinetic_energy(&self) -> f32 {
        if self.inv_mass == 0.0 {
            return 0.0;
        }
        let mass = 1.0 / self.inv_mass;
        let linear = 0.5 * mass * self.linear_velocity.length_squared();
        // Angular term via the world inertia (inverse of the inverse).
        let angular = if self.inv_inertia_world.determinant().abs() > f32::EPSILON {
            let inertia = self.inv_inertia_world.inverse();
            0.5 * self.angular_velocity.dot(inertia * self.angular_velocity)
        } else {
            0.0
        };
        linear + angular
    }
}

// ============================================================================
// Body arena
// ============================================================================

/// Dense body storage with stable ids and slot recycling.
#[derive(Default)]
pub struct BodySet {
    slots: Vec<RigidBody>,
    free: Vec<u32>,
}

impl BodySet {
    /// Create an empty body set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a body, reusing a tombstoned slot when available.
    pub fn add(&mut self, body: RigidBody) -> BodyId {
        debug_assert!(body.inv_mass >= 0.0);
        if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = body;
            BodyId(idx)
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(body);
            BodyId(idx)
        }
    }

    /// Remove a body, tombstoning its slot.
    pub fn remove(&mut self, id: BodyId) -> Result<(), PhysicsError> {
        let count = self.slots.len();
        let slot = self
            .slots
            .get_mut(id.0 as usize)
            .filter(|b| !b.tombstone)
            .ok_or(PhysicsError::InvalidBody {
                index: id.0,
                count,
            })?;
        slot.tombstone = true;
        slot.is_active = false;
        slot.linear_velocity = Vec3::ZERO;
        slot.angular_velocity = Vec3::ZERO;
        self.free.push(id.0);
        Ok(())
    }

    /// Borrow a live body.
    pub fn get(&self, id: BodyId) -> Option<&RigidBody> {
        self.slots.get(id.0 as usize).filter(|b| !b.tombstone)
    }

    /// Mutably borrow a live body.
    pub fn get_mut(&mut self, id: BodyId) -> Option<&mut RigidBody> {
        self.slots.get_mut(id.0 as usize).filter(|b| !b.tombstone)
    }

    /// Iterate live bodies with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (BodyId, &RigidBody)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.tombstone)
            .map(|(i, b)| (BodyId(i as u32), b))
    }

    /// Iterate live bodies mutably with their ids.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (BodyId, &mut RigidBody)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter(|(_, b)| !b.tombstone)
            .map(|(i, b)| (BodyId(i as u32), b))
    }

    /// All slots including tombstones (integration loops skip them by flag).
    #[inline]
    pub(crate) fn slots_mut(&mut self) -> &mut [RigidBody] {
        &mut self.slots
    }

    /// Number of slots (live and tombstoned).
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of live bodies.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Whether no live bodies exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl core::ops::Index<BodyId> for BodySet {
    type Output = RigidBody;

    #[inline]
    fn index(&self, id: BodyId) -> &RigidBody {
        &self.slots[id.0 as usize]
    }
}

impl core::ops::IndexMut<BodyId> for BodySet {
    #[inline]
    fn index_mut(&mut self, id: BodyId) -> &mut RigidBody {
        &mut self.slots[id.0 as usize]
    }
}

// ============================================================================
// Tests
// ============================================================================
