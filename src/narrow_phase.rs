//! Narrow Phase: Pair Handlers
//!
//! Consumes the broad phase's candidate overlaps and maintains one pair
//! handler per colliding pair. The handler owns the persistent contact
//! manifold and drives the state machine
//! `Unassigned -> Initialized -> Touching <-> Separated -> Cleaning`:
//! on the first contact the pair's constraint enters the solver and
//! `initial_collision_detected` fires; when the last contact dies the
//! constraint leaves and `collision_ended` fires; pairs the broad phase has
//! stopped reporting are cleaned up after a few stale frames and recycled
//! through the resource pool.
//!
//! Pair identity is order-independent (lower collidable id first), so the
//! broad phase's emission order never matters.

use std::collections::HashMap;

use crate::body::BodySet;
use crate::collidable::{CollidableId, CollidableSet};
use crate::constraint::{ContactConstraint, PairId};
use crate::contact_gen::{generate_contacts, ContactData};
use crate::event::EventTable;
use crate::filter::CollisionFilter;
use crate::manifold::ContactManifold;
use crate::material::{CombinedMaterial, MaterialTable};
use crate::pool::ResourcePool;
use crate::shape::Shape;
use crate::solver::{ConstraintHandle, Solver};

/// Order-independent pair identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PairKey {
    /// Lower collidable id
    pub a: CollidableId,
    /// Higher collidable id
    pub b: CollidableId,
}

impl PairKey {
    /// Build the canonical key for two collidables.
    pub fn new(x: CollidableId, y: CollidableId) -> Self {
        if x < y {
            Self { a: x, b: y }
        } else {
            Self { a: y, b: x }
        }
    }
}

/// Pair handler lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PairState {
    /// Freshly pooled, not yet bound to a pair
    #[default]
    Unassigned,
    /// Bound to a pair, no contacts seen yet
    Initialized,
    /// Manifold has at least one contact; constraint is in the solver
    Touching,
    /// Contacts existed and all died; constraint removed
    Separated,
    /// Being torn down
    Cleaning,
}

/// Persistent per-pair state.
#[derive(Debug, Default)]
pub struct PairHandler {
    /// Pair identity
    pub key: Option<PairKey>,
    /// Lifecycle state
    pub state: PairState,
    /// Persistent contact manifold
    pub manifold: ContactManifold,
    /// Solver constraint while touching
    pub constraint: Option<ConstraintHandle>,
    /// Blended pair material (creating-pair hooks may have overridden it)
    pub material: CombinedMaterial,
    /// Frames since the broad phase last reported this pair
    pub stale_frames: u32,
}

impl PairHandler {
    /// Bind a pooled handler to a pair.
    fn initialize(&mut self, key: PairKey, material: CombinedMaterial) {
        debug_assert_eq!(self.state, PairState::Unassigned);
        self.key = Some(key);
        self.state = PairState::Initialized;
        self.material = material;
        self.manifold.clear();
        self.constraint = None;
        self.stale_frames = 0;
    }

    /// Reset for return to the pool.
    fn reset(&mut self) {
        self.key = None;
        self.state = PairState::Unassigned;
        self.manifold.clear();
        self.constraint = None;
        self.stale_frames = 0;
    }
}

/// The narrow phase: pair arena plus dispatch into contact generation.
pub struct NarrowPhase {
    slots: Vec<PairHandler>,
    free: Vec<u32>,
    index: HashMap<PairKey, u32>,
    handler_pool: ResourcePool<PairHandler>,
    contact_buffers: ResourcePool<Vec<ContactData>>,
    /// Frames a pair survives without a broad-phase overlap
    pub max_stale_frames: u32,
    /// Pair updates performed this step (for stats)
    pub tests_this_step: u32,
}

impl NarrowPhase {
    /// Create an empty narrow phase.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            handler_pool: ResourcePool::new(256),
            contact_buffers: ResourcePool::new(32),
            max_stale_frames: 2,
            tests_this_step: 0,
        }
    }

    /// Look up a pair handler.
    pub fn pair(&self, key: PairKey) -> Option<&PairHandler> {
        self.index.get(&key).map(|&i| &self.slots[i as usize])
    }

    /// Pairs involving a collidable (support finding, diagnostics).
    pub fn pairs_involving(
        &self,
        id: CollidableId,
    ) -> impl Iterator<Item = (PairId, &PairHandler)> {
        self.slots.iter().enumerate().filter_map(move |(i, p)| {
            let key = p.key?;
            (key.a == id || key.b == id).then_some((PairId(i as u32), p))
        })
    }

    /// Number of live pairs.
    pub fn pair_count(&self) -> usize {
        self.index.len()
    }

    /// Number of touching manifolds and total contacts.
    pub fn contact_counts(&self) -> (u32, u32) {
        let mut manifolds = 0;
        let mut contacts = 0;
        for p in &self.slots {
            if p.state == PairState::Touching {
                manifolds += 1;
                contacts += p.manifold.len() as u32;
            }
        }
        (manifolds, contacts)
    }

    /// Run one narrow-phase step over the broad phase's candidate pairs.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        overlaps: &[(CollidableId, CollidableId)],
        collidables: &CollidableSet,
        bodies: &mut BodySet,
        materials: &MaterialTable,
        events: &mut EventTable,
        solver: &mut Solver,
        dt: f32,
    ) {
        self.tests_this_step = 0;

        // Age every pair; refreshed ones reset below.
        for p in self.slots.iter_mut().filter(|p| p.key.is_some()) {
            p.stale_frames += 1;
        }

        for &(x, y) in overlaps {
            let key = PairKey::new(x, y);
            let slot = match self.index.get(&key) {
                Some(&slot) => slot,
                None => match self.create_pair(key, collidables, bodies, materials, events) {
                    Some(slot) => slot,
                    None => continue, // filtered or inert pair
                },
            };
            self.slots[slot as usize].stale_frames = 0;
            self.update_collision(slot, collidables, bodies, events, solver, dt);
        }

        // Clean up pairs the broad phase stopped reporting.
        let stale: Vec<PairKey> = self
            .index
            .iter()
            .filter(|(_, &slot)| self.slots[slot as usize].stale_frames > self.max_stale_frames)
            .map(|(&key, _)| key)
            .collect();
        for key in stale {
            self.destroy_pair(key, events, solver);
        }
    }

    /// Re-run collision for every pair involving `id` (after a teleport the
    /// character stepper performs).
    pub fn update_pairs_involving(
        &mut self,
        id: CollidableId,
        collidables: &CollidableSet,
        bodies: &mut BodySet,
        events: &mut EventTable,
        solver: &mut Solver,
        dt: f32,
    ) {
        let slots: Vec<u32> = self
            .index
            .iter()
            .filter(|(key, _)| key.a == id || key.b == id)
            .map(|(_, &slot)| slot)
            .collect();
        for slot in slots {
            self.update_collision(slot, collidables, bodies, events, solver, dt);
        }
    }

    /// Tear down every pair involving a collidable being removed.
    pub fn remove_collidable(
        &mut self,
        id: CollidableId,
        events: &mut EventTable,
        solver: &mut Solver,
    ) {
        let keys: Vec<PairKey> = self
            .index
            .keys()
            .filter(|key| key.a == id || key.b == id)
            .copied()
            .collect();
        for key in keys {
            self.destroy_pair(key, events, solver);
        }
    }

    /// Copy solver impulse accumulators back into the manifolds so next
    /// frame's constraints warm start.
    pub fn store_impulses(&mut self, solver: &Solver) {
        for p in &mut self.slots {
            if let Some(handle) = p.constraint {
                if let Some(constraint) = solver.contact(handle) {
                    constraint.store_impulses(&mut p.manifold);
                }
            }
        }
    }

    fn create_pair(
        &mut self,
        key: PairKey,
        collidables: &CollidableSet,
        bodies: &BodySet,
        materials: &MaterialTable,
        events: &mut EventTable,
    ) -> Option<u32> {
        let ca = collidables.get(key.a)?;
        let cb = collidables.get(key.b)?;

        if !CollisionFilter::can_collide(&ca.filter, &cb.filter) {
            return None;
        }

        // A pair with no dynamic side never produces a response.
        let dynamic = |c: &crate::collidable::Collidable| {
            c.body
                .and_then(|id| bodies.get(id))
                .map_or(false, |b| b.is_dynamic())
        };
        if !dynamic(ca) && !dynamic(cb) {
            return None;
        }

        let mut material = materials.combine(ca.material, cb.material);
        events.fire_creating_pair(key.a, key.b, &mut material);

        let mut handler = self.handler_pool.take();
        handler.initialize(key, material);

        let slot = if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = handler;
            idx
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(handler);
            idx
        };
        self.index.insert(key, slot);
        Some(slot)
    }

    /// Refresh the manifold and run the state transitions for one pair.
    fn update_collision(
        &mut self,
        slot: u32,
        collidables: &CollidableSet,
        bodies: &mut BodySet,
        events: &mut EventTable,
        solver: &mut Solver,
        _dt: f32,
    ) {
        let Some(key) = self.slots[slot as usize].key else {
            return;
        };
        let (Some(ca), Some(cb)) = (collidables.get(key.a), collidables.get(key.b)) else {
            return;
        };

        self.tests_this_step += 1;

        let mut buffer = self.contact_buffers.take();
        buffer.clear();
        generate_contacts(&ca.shape, &ca.pose, &cb.shape, &cb.pose, &mut buffer);

        let handler = &mut self.slots[slot as usize];
        if uses_incremental_manifold(&ca.shape, &cb.shape) {
            handler.manifold.refresh(&ca.pose, &cb.pose);
            for c in &buffer {
                handler.manifold.merge_point(c, &ca.pose, &cb.pose);
            }
        } else {
            handler.manifold.update_from(&buffer, &ca.pose, &cb.pose);
        }
        buffer.clear();
        self.contact_buffers.give_back(buffer);

        let touching = !handler.manifold.is_empty();
        let was_touching = handler.constraint.is_some();

        match (was_touching, touching) {
            (false, true) => {
                // 0 -> >0: constraint enters the solver.
                let mut constraint =
                    ContactConstraint::new(PairId(slot), ca.body, cb.body);
                constraint.friction = handler.material.friction;
                constraint.restitution = handler.material.restitution;
                constraint.sync_from_manifold(&handler.manifold);
                handler.constraint = Some(solver.add_contact(constraint));
                handler.state = PairState::Touching;

                // New contact wakes both sides.
                for body_id in [ca.body, cb.body].into_iter().flatten() {
                    if let Some(body) = bodies.get_mut(body_id) {
                        if body.is_dynamic() {
                            body.is_active = true;
                        }
                    }
                }

                events.fire_initial_collision(key.a, key.b);
                events.fire_pair_touching(key.a, key.b);
            }
            (true, true) => {
                let handle = handler.constraint.expect("touching pair has constraint");
                if let Some(constraint) = solver.contact_mut(handle) {
                    constraint.friction = handler.material.friction;
                    constraint.restitution = handler.material.restitution;
                    constraint.sync_from_manifold(&handler.manifold);
                }
                handler.state = PairState::Touching;
                events.fire_pair_touching(key.a, key.b);
            }
            (true, false) => {
                // >0 -> 0: constraint leaves the solver.
                if let Some(handle) = handler.constraint.take() {
                    solver.remove(handle);
                }
                handler.state = PairState::Separated;
                events.fire_collision_ended(key.a, key.b);
            }
            (false, false) => {
                if handler.state == PairState::Touching {
                    handler.state = PairState::Separated;
                }
            }
        }

        events.fire_pair_updated(key.a, key.b);
    }

    fn destroy_pair(&mut self, key: PairKey, events: &mut EventTable, solver: &mut Solver) {
        let Some(slot) = self.index.remove(&key) else {
            return;
        };
        let handler = &mut self.slots[slot as usize];
        handler.state = PairState::Cleaning;

        if let Some(handle) = handler.constraint.take() {
            // Mid-step detach: the solver disposes the slot on its next pass.
            solver.orphan(handle);
            events.fire_collision_ended(key.a, key.b);
        }

        let mut handler = core::mem::take(&mut self.slots[slot as usize]);
        handler.reset();
        self.handler_pool.give_back(handler);
        self.free.push(slot);
    }
}

impl Default for NarrowPhase {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a shape pair goes through the incremental GJK/EPA manifold
/// (one point per step, accumulated) instead of a full analytic manifold.
pub fn uses_incremental_manifold(a: &Shape, b: &Shape) -> bool {
    !matches!(
        (a, b),
        (Shape::Sphere { .. }, Shape::Sphere { .. })
            | (Shape::HalfSpace { .. }, _)
            | (_, Shape::HalfSpace { .. })
            | (Shape::Box { .. }, Shape::Box { .. })
            | (Shape::Sphere { .. }, Shape::Box { .. })
            | (Shape::Box { .. }, Shape::Sphere { .. })
            | (Shape::Sphere { .. }, Shape::Capsule { .. })
            | (Shape::Capsule { .. }, Shape::Sphere { .. })
    )
}

// ============================================================================
// Tests
// ============================================================================
