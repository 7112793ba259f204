//! Collidables
//!
//! A collidable binds a shape to a world pose and, for mobile entries, to an
//! owning body. Each collidable belongs to exactly one body; a body may own
//! several collidables. Static geometry (including half-spaces) has no body
//! and keeps a fixed pose.
//!
//! The cached world AABB is refreshed once per step before the broad phase
//! runs; continuous-update bodies get their AABB expanded by the step's
//! swept motion.

use crate::aabb::Aabb;
use crate::body::{BodyId, BodySet, PositionUpdateMode};
use crate::error::PhysicsError;
use crate::filter::CollisionFilter;
use crate::material::{MaterialId, DEFAULT_MATERIAL};
use crate::math::Pose;
use crate::shape::Shape;

/// Stable handle to a collidable slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollidableId(pub u32);

/// A shape instance participating in collision detection.
#[derive(Debug)]
pub struct Collidable {
    /// Collision shape, local space
    pub shape: Shape,
    /// Owning body; `None` marks static geometry
    pub body: Option<BodyId>,
    /// World pose (mirrors the owning body each step, fixed for statics)
    pub pose: Pose,
    /// Speculative margin added to the AABB on every axis
    pub margin: f32,
    /// Material used for contact blending
    pub material: MaterialId,
    /// Pair-creation filter
    pub filter: CollisionFilter,
    /// Cached world bounds, refreshed each step
    pub aabb: Aabb,
    pub(crate) tombstone: bool,
}

impl Collidable {
    /// Create a collidable owned by a body.
    pub fn new(shape: Shape, body: BodyId) -> Self {
        let aabb = shape.compute_aabb(&Pose::IDENTITY);
        Self {
            shape,
            body: Some(body),
            pose: Pose::IDENTITY,
            margin: 0.04,
            material: DEFAULT_MATERIAL,
            filter: CollisionFilter::DEFAULT,
            aabb,
            tombstone: false,
        }
    }

    /// Create static geometry at a fixed pose.
    pub fn new_static(shape: Shape, pose: Pose) -> Self {
        let aabb = shape.compute_aabb(&pose);
        Self {
            shape,
            body: None,
            pose,
            margin: 0.04,
            material: DEFAULT_MATERIAL,
            filter: CollisionFilter::DEFAULT,
            aabb,
            tombstone: false,
        }
    }

    /// Whether this collidable can move.
    #[inline]
    pub fn is_mobile(&self) -> bool {
        self.body.is_some()
    }

    /// Refresh the pose and cached AABB from the owning body.
    pub fn refresh_bounds(&mut self, bodies: &BodySet, dt: f32) {
        if let Some(body_id) = self.body {
            if let Some(body) = bodies.get(body_id) {
                self.pose = body.pose();
                let mut aabb = self.shape.compute_aabb(&self.pose).expanded(self.margin);
                if body.position_update_mode == PositionUpdateMode::Continuous {
                    aabb = aabb.swept(body.linear_velocity, dt);
                }
                debug_assert!(aabb.is_valid(), "collidable produced invalid AABB");
                self.aabb = aabb;
            }
        }
        // Statics computed their bounds once at creation.
    }
}

/// Collidable arena with stable ids.
#[derive(Default)]
pub struct CollidableSet {
    slots: Vec<Collidable>,
    free: Vec<u32>,
}

impl CollidableSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a collidable.
    pub fn add(&mut self, collidable: Collidable) -> CollidableId {
        if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = collidable;
            CollidableId(idx)
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(collidable);
            CollidableId(idx)
        }
    }

    /// Remove a collidable, tombstoning its slot. The space is responsible
    /// for deregistering broad-phase cells and destroying pairs first.
    pub fn remove(&mut self, id: CollidableId) -> Result<(), PhysicsError> {
        let slot = self
            .slots
            .get_mut(id.0 as usize)
            .filter(|c| !c.tombstone)
            .ok_or(PhysicsError::InvalidCollidable { index: id.0 })?;
        slot.tombstone = true;
        self.free.push(id.0);
        Ok(())
    }

    /// Borrow a live collidable.
    pub fn get(&self, id: CollidableId) -> Option<&Collidable> {
        self.slots.get(id.0 as usize).filter(|c| !c.tombstone)
    }

    /// Mutably borrow a live collidable.
    pub fn get_mut(&mut self, id: CollidableId) -> Option<&mut Collidable> {
        self.slots.get_mut(id.0 as usize).filter(|c| !c.tombstone)
    }

    /// Iterate live collidables.
    pub fn iter(&self) -> impl Iterator<Item = (CollidableId, &Collidable)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.tombstone)
            .map(|(i, c)| (CollidableId(i as u32), c))
    }

    /// Refresh bounds of every mobile collidable.
    pub fn refresh_all_bounds(&mut self, bodies: &BodySet, dt: f32) {
        for c in self.slots.iter_mut().filter(|c| !c.tombstone) {
            c.refresh_bounds(bodies, dt);
        }
    }

    /// Number of live collidables.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Whether no live collidables exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl core::ops::Index<CollidableId> for CollidableSet {
    type Output = Collidable;

    #[inline]
    fn index(&self, id: CollidableId) -> &Collidable {
        &self.slots[id.0 as usize]
    }
}

impl core::ops::IndexMut<CollidableId> for CollidableSet {
    #[inline]
    fn index_mut(&mut self, id: CollidableId) -> &mut Collidable {
        &mut self.slots[id.0 as usize]
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::RigidBody;
    use glam::Vec3;

    #[test]
    fn test_bounds_follow_body() {
        let mut bodies = BodySet::new();
        let id = bodies.add(RigidBody::new_dynamic(Vec3::new(3.0, 0.0, 0.0), 1.0));

        let mut c = Collidable::new(Shape::Sphere { radius: 1.0 }, id);
        c.margin = 0.0;
        c.refresh_bounds(&bodies, 1.0 / 60.0);

        assert!((c.aabb.center().x - 3.0).abs() < 1e-6);
        assert!((c.aabb.half_extents().x - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_continuous_body_sweeps_bounds() {
        let mut bodies = BodySet::new();
        let mut body = RigidBody::new_dynamic(Vec3::ZERO, 1.0);
        body.position_update_mode = PositionUpdateMode::Continuous;
        body.linear_velocity = Vec3::new(120.0, 0.0, 0.0);
        let id = bodies.add(body);

        let mut c = Collidable::new(Shape::Sphere { radius: 0.1 }, id);
        c.margin = 0.0;
        c.refresh_bounds(&bodies, 1.0 / 60.0);

        // Two meters of motion this step must be inside the box.
        assert!(c.aabb.max.x >= 2.0);
        assert!(c.aabb.min.x <= -0.1 + 1e-6);
    }

    #[test]
    fn test_static_pose_fixed() {
        let bodies = BodySet::new();
        let mut c = Collidable::new_static(
            Shape::HalfSpace {
                normal: Vec3::Y,
                offset: 0.0,
            },
            Pose::IDENTITY,
        );
        let before = c.aabb;
        c.refresh_bounds(&bodies, 1.0 / 60.0);
        assert_eq!(before, c.aabb);
        assert!(!c.is_mobile());
    }

    #[test]
    fn test_set_add_remove() {
        let mut bodies = BodySet::new();
        let body = bodies.add(RigidBody::new_dynamic(Vec3::ZERO, 1.0));

        let mut set = CollidableSet::new();
        let a = set.add(Collidable::new(Shape::Sphere { radius: 1.0 }, body));
        assert_eq!(set.len(), 1);
        set.remove(a).unwrap();
        assert!(set.get(a).is_none());
        assert!(set.remove(a).is_err());
    }
}
