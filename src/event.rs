//! Collision Event Dispatch
//!
//! A callback table owned by the space, keyed by collidable id. The narrow
//! phase fires hooks synchronously as pair state changes inside the step;
//! handlers run within the phase boundary and must not re-enter the solver.
//!
//! Hooks per collidable:
//! - `creating_pair`: a new pair is being built; the handler may mutate the
//!   blended pair material (the character controller zeroes friction on its
//!   own pairs here).
//! - `pair_updated`: the pair ran narrow-phase collision this step.
//! - `pair_touching`: the pair has at least one contact this step.
//! - `initial_collision_detected`: the pair transitioned 0 -> >0 contacts.
//! - `collision_ended`: the pair transitioned >0 -> 0 contacts or died.

use std::collections::HashMap;

use crate::collidable::CollidableId;
use crate::material::CombinedMaterial;

/// Handler for pair lifecycle notifications: `(own, other)`.
pub type PairEventHandler = Box<dyn FnMut(CollidableId, CollidableId) + Send>;

/// Handler invoked while a pair is being created; may mutate the blended
/// material: `(own, other, pair_material)`.
pub type CreatingPairHandler =
    Box<dyn FnMut(CollidableId, CollidableId, &mut CombinedMaterial) + Send>;

/// Event hooks for one collidable.
#[derive(Default)]
pub struct CollidableEvents {
    /// Pair creation (material still mutable)
    pub creating_pair: Option<CreatingPairHandler>,
    /// Narrow phase updated the pair
    pub pair_updated: Option<PairEventHandler>,
    /// Pair currently has contacts
    pub pair_touching: Option<PairEventHandler>,
    /// First contact appeared
    pub initial_collision_detected: Option<PairEventHandler>,
    /// Last contact disappeared
    pub collision_ended: Option<PairEventHandler>,
}

/// Space-owned callback table.
#[derive(Default)]
pub struct EventTable {
    handlers: HashMap<u32, CollidableEvents>,
}

impl EventTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the hooks for a collidable.
    pub fn set(&mut self, id: CollidableId, events: CollidableEvents) {
        self.handlers.insert(id.0, events);
    }

    /// Borrow the hooks of a collidable, creating an empty entry on demand.
    pub fn entry(&mut self, id: CollidableId) -> &mut CollidableEvents {
        self.handlers.entry(id.0).or_default()
    }

    /// Drop the hooks of a collidable (on removal).
    pub fn remove(&mut self, id: CollidableId) {
        self.handlers.remove(&id.0);
    }

    /// Fire `creating_pair` on both sides.
    pub fn fire_creating_pair(
        &mut self,
        a: CollidableId,
        b: CollidableId,
        material: &mut CombinedMaterial,
    ) {
        if let Some(h) = self
            .handlers
            .get_mut(&a.0)
            .and_then(|e| e.creating_pair.as_mut())
        {
            h(a, b, material);
        }
        if let Some(h) = self
            .handlers
            .get_mut(&b.0)
            .and_then(|e| e.creating_pair.as_mut())
        {
            h(b, a, material);
        }
    }

    /// Fire `pair_updated` on both sides.
    pub fn fire_pair_updated(&mut self, a: CollidableId, b: CollidableId) {
        self.fire_symmetric(a, b, |e| e.pair_updated.as_mut());
    }

    /// Fire `pair_touching` on both sides.
    pub fn fire_pair_touching(&mut self, a: CollidableId, b: CollidableId) {
        self.fire_symmetric(a, b, |e| e.pair_touching.as_mut());
    }

    /// Fire `initial_collision_detected` on both sides.
    pub fn fire_initial_collision(&mut self, a: CollidableId, b: CollidableId) {
        self.fire_symmetric(a, b, |e| e.initial_collision_detected.as_mut());
    }

    /// Fire `collision_ended` on both sides.
    pub fn fire_collision_ended(&mut self, a: CollidableId, b: CollidableId) {
        self.fire_symmetric(a, b, |e| e.collision_ended.as_mut());
    }

    fn fire_symmetric(
        &mut self,
        a: CollidableId,
        b: CollidableId,
        mut select: impl FnMut(&mut CollidableEvents) -> Option<&mut PairEventHandler>,
    ) {
        if let Some(h) = self.handlers.get_mut(&a.0).and_then(&mut select) {
            h(a, b);
        }
        if let Some(h) = self.handlers.get_mut(&b.0).and_then(&mut select) {
            h(b, a);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
