//! Iterative Constraint Solver (Projected Gauss-Seidel)
//!
//! Velocity-impulse solver over the active constraint set: touching contact
//! constraints, articulated single-bone constraints, and user constraints
//! registered through the [`SolverUpdateable`] seam.
//!
//! Per step: dispose orphans, compute effective masses, warm start from the
//! previous frame's accumulated impulses, then run K velocity iterations in
//! insertion order (never rebalanced mid-iteration, so single-thread results
//! are reproducible). The optional position pass runs after pose
//! integration; with it enabled, penetration error is kept out of the
//! velocity bias.
//!
//! Islands (connected components of the body-constraint graph) partition the
//! active set: a body belongs to at most one island per step, constraints
//! whose island is asleep are skipped wholesale, and the island linking is
//! rebuilt from the constraint graph every step.

use crate::body::{BodyId, BodySet};
use crate::bone::SingleBoneConstraint;
use crate::constraint::{ContactConstraint, SolverTuning, SolverUpdateable};
use crate::island::IslandManager;

/// Stable handle to a solver constraint slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConstraintHandle(pub u32);

/// A constraint slot: the closed hot-loop variants plus the open trait seam.
enum ConstraintSlot {
    Free,
    /// Detached by its owner while enqueued; disposed at the next solve.
    Orphaned,
    Contact(ContactConstraint),
    SingleBone(SingleBoneConstraint),
    Custom(Box<dyn SolverUpdateable>),
}

impl ConstraintSlot {
    fn is_live(&self) -> bool {
        matches!(
            self,
            ConstraintSlot::Contact(_) | ConstraintSlot::SingleBone(_) | ConstraintSlot::Custom(_)
        )
    }
}

/// The constraint solver.
pub struct Solver {
    slots: Vec<ConstraintSlot>,
    free: Vec<u32>,
    /// Insertion order of live handles; iteration follows this exactly.
    order: Vec<u32>,
    scratch_bodies: Vec<BodyId>,
}

impl Solver {
    /// Create an empty solver.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            order: Vec::new(),
            scratch_bodies: Vec::new(),
        }
    }

    fn insert(&mut self, slot: ConstraintSlot) -> ConstraintHandle {
        let idx = if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = slot;
            idx
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(slot);
            idx
        };
        self.order.push(idx);
        ConstraintHandle(idx)
    }

    /// Register a contact constraint.
    pub fn add_contact(&mut self, constraint: ContactConstraint) -> ConstraintHandle {
        self.insert(ConstraintSlot::Contact(constraint))
    }

    /// Register an articulated single-bone constraint.
    pub fn add_single_bone(&mut self, constraint: SingleBoneConstraint) -> ConstraintHandle {
        self.insert(ConstraintSlot::SingleBone(constraint))
    }

    /// Register a user constraint.
    pub fn add_custom(&mut self, constraint: Box<dyn SolverUpdateable>) -> ConstraintHandle {
        self.insert(ConstraintSlot::Custom(constraint))
    }

    /// Remove a constraint immediately.
    pub fn remove(&mut self, handle: ConstraintHandle) {
        let idx = handle.0 as usize;
        if idx < self.slots.len() && self.slots[idx].is_live() {
            self.slots[idx] = ConstraintSlot::Free;
            self.free.push(handle.0);
            self.order.retain(|&h| h != handle.0);
        }
    }

    /// Detach a constraint whose owner is going away mid-step; the solver
    /// disposes the slot on its next pass.
    pub fn orphan(&mut self, handle: ConstraintHandle) {
        let idx = handle.0 as usize;
        if idx < self.slots.len() && self.slots[idx].is_live() {
            if let ConstraintSlot::Contact(c) = &mut self.slots[idx] {
                c.pair = None;
            }
            self.slots[idx] = ConstraintSlot::Orphaned;
        }
    }

    /// Borrow a contact constraint.
    pub fn contact_mut(&mut self, handle: ConstraintHandle) -> Option<&mut ContactConstraint> {
        match self.slots.get_mut(handle.0 as usize) {
            Some(ConstraintSlot::Contact(c)) => Some(c),
            _ => None,
        }
    }

    /// Borrow a contact constraint immutably.
    pub fn contact(&self, handle: ConstraintHandle) -> Option<&ContactConstraint> {
        match self.slots.get(handle.0 as usize) {
            Some(ConstraintSlot::Contact(c)) => Some(c),
            _ => None,
        }
    }

    /// Borrow a single-bone constraint.
    pub fn single_bone_mut(
        &mut self,
        handle: ConstraintHandle,
    ) -> Option<&mut SingleBoneConstraint> {
        match self.slots.get_mut(handle.0 as usize) {
            Some(ConstraintSlot::SingleBone(c)) => Some(c),
            _ => None,
        }
    }

    /// Borrow a registered user constraint, downcast to its concrete type.
    pub fn custom_mut<T: SolverUpdateable + 'static>(
        &mut self,
        handle: ConstraintHandle,
    ) -> Option<&mut T> {
        match self.slots.get_mut(handle.0 as usize) {
            Some(ConstraintSlot::Custom(c)) => c.as_any_mut().downcast_mut::<T>(),
            _ => None,
        }
    }

    /// Number of live constraints.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no live constraints exist.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Reset every accumulated impulse (large topology changes).
    pub fn clear_accumulated_impulses(&mut self) {
        for &idx in &self.order {
            match &mut self.slots[idx as usize] {
                ConstraintSlot::Contact(c) => c.clear_accumulated_impulses(),
                ConstraintSlot::SingleBone(c) => c.clear_accumulated_impulses(),
                ConstraintSlot::Custom(c) => c.clear_accumulated_impulses(),
                _ => {}
            }
        }
    }

    /// Link this step's constraint graph into the island manager.
    pub fn link_islands(&mut self, bodies: &BodySet, islands: &mut IslandManager) {
        for &idx in &self.order {
            self.scratch_bodies.clear();
            match &self.slots[idx as usize] {
                ConstraintSlot::Contact(c) => c.collect_bodies(&mut self.scratch_bodies),
                ConstraintSlot::SingleBone(c) => c.collect_bodies(&mut self.scratch_bodies),
                ConstraintSlot::Custom(c) => c.collect_bodies(&mut self.scratch_bodies),
                _ => continue,
            }
            for pair in self.scratch_bodies.windows(2) {
                islands.link(bodies, pair[0], pair[1]);
            }
        }
    }

    fn dispose_orphans(&mut self) {
        for idx in 0..self.slots.len() {
            if matches!(self.slots[idx], ConstraintSlot::Orphaned) {
                self.slots[idx] = ConstraintSlot::Free;
                self.free.push(idx as u32);
                self.order.retain(|&h| h != idx as u32);
            }
        }
    }

    /// Whether a constraint touches only inactive bodies and can be skipped.
    fn is_asleep(&self, slot_idx: u32, bodies: &BodySet) -> bool {
        let mut ids = Vec::new();
        match &self.slots[slot_idx as usize] {
            ConstraintSlot::Contact(c) => c.collect_bodies(&mut ids),
            ConstraintSlot::SingleBone(c) => c.collect_bodies(&mut ids),
            ConstraintSlot::Custom(c) => c.collect_bodies(&mut ids),
            _ => return true,
        }
        !ids.iter().any(|&id| {
            bodies
                .get(id)
                .map_or(false, |b| b.is_dynamic() && b.is_active)
        })
    }

    /// Run warm start plus K velocity iterations over the active set.
    ///
    /// Returns the number of constraints solved.
    pub fn solve_velocities(
        &mut self,
        bodies: &mut BodySet,
        dt: f32,
        tuning: &SolverTuning,
    ) -> usize {
        self.dispose_orphans();

        // Gather this step's active list in insertion order.
        let active: Vec<u32> = self
            .order
            .iter()
            .copied()
            .filter(|&idx| !self.is_asleep(idx, bodies))
            .collect();

        for &idx in &active {
            match &mut self.slots[idx as usize] {
                ConstraintSlot::Contact(c) => c.prepare(bodies, dt, tuning),
                ConstraintSlot::SingleBone(c) => c.prepare(bodies, dt, tuning),
                ConstraintSlot::Custom(c) => c.prepare(bodies, dt, tuning),
                _ => {}
            }
        }

        for &idx in &active {
            match &mut self.slots[idx as usize] {
                ConstraintSlot::Contact(c) => c.warm_start(bodies),
                ConstraintSlot::SingleBone(c) => c.warm_start(bodies),
                ConstraintSlot::Custom(c) => c.warm_start(bodies),
                _ => {}
            }
        }

        for _ in 0..tuning.velocity_iterations {
            for &idx in &active {
                match &mut self.slots[idx as usize] {
                    ConstraintSlot::Contact(c) => c.solve_velocity(bodies),
                    ConstraintSlot::SingleBone(c) => c.solve_velocity(bodies),
                    ConstraintSlot::Custom(c) => c.solve_velocity(bodies),
                    _ => {}
                }
            }
        }

        active.len()
    }

    /// Run J position iterations (split impulses) after pose integration.
    pub fn solve_positions(&mut self, bodies: &mut BodySet, tuning: &SolverTuning) {
        let order = self.order.clone();
        for _ in 0..tuning.position_iterations {
            for &idx in &order {
                match &mut self.slots[idx as usize] {
                    ConstraintSlot::Contact(c) => c.solve_position(bodies, tuning),
                    ConstraintSlot::SingleBone(_) => {}
                    ConstraintSlot::Custom(c) => c.solve_position(bodies, tuning),
                    _ => {}
                }
            }
        }
    }
}

impl Default for Solver {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::RigidBody;
    use crate::bone::new_bone;
    use crate::constraint::PairId;
    use glam::{Quat, Vec3};

    #[test]
    fn test_add_remove_recycles_slots() {
        let mut solver = Solver::new();
        let a = solver.add_contact(ContactConstraint::new(PairId(0), None, None));
        assert_eq!(solver.len(), 1);
        solver.remove(a);
        assert_eq!(solver.len(), 0);

        let b = solver.add_contact(ContactConstraint::new(PairId(1), None, None));
        assert_eq!(b, a, "slot must be recycled");
    }

    #[test]
    fn test_orphan_disposed_on_next_solve() {
        let mut bodies = BodySet::new();
        let mut solver = Solver::new();
        let h = solver.add_contact(ContactConstraint::new(PairId(0), None, None));
        solver.orphan(h);
        assert!(solver.contact(h).is_none(), "orphan is no longer a contact");

        solver.solve_velocities(&mut bodies, 1.0 / 60.0, &SolverTuning::default());
        assert_eq!(solver.len(), 0);

        // The slot is free again afterwards.
        let h2 = solver.add_contact(ContactConstraint::new(PairId(2), None, None));
        assert_eq!(h2, h);
    }

    #[test]
    fn test_insertion_order_is_stable() {
        let mut solver = Solver::new();
        let a = solver.add_contact(ContactConstraint::new(PairId(0), None, None));
        let b = solver.add_contact(ContactConstraint::new(PairId(1), None, None));
        let c = solver.add_contact(ContactConstraint::new(PairId(2), None, None));
        solver.remove(b);
        assert_eq!(solver.order, vec![a.0, c.0]);
    }

    #[test]
    fn test_single_bone_through_solver() {
        let mut bodies = BodySet::new();
        let bone = bodies.add(new_bone(Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY, 1.0));
        let mut solver = Solver::new();
        let h = solver.add_single_bone(crate::bone::SingleBoneConstraint::anchor(
            bone,
            Vec3::ZERO,
            Vec3::new(0.0, 1.0, 0.0),
        ));

        // Give the bone velocity; the anchor must cancel it.
        bodies[bone].linear_velocity = Vec3::new(2.0, 0.0, 0.0);
        solver.solve_velocities(&mut bodies, 1.0 / 60.0, &SolverTuning::default());
        assert!(
            bodies[bone].linear_velocity.length() < 1e-3,
            "anchored bone should not drift"
        );
        assert!(solver.single_bone_mut(h).is_some());
    }

    #[test]
    fn test_sleeping_constraints_skipped() {
        let mut bodies = BodySet::new();
        let a = bodies.add(RigidBody::new_dynamic(Vec3::ZERO, 1.0));
        bodies[a].is_active = false;
        bodies[a].linear_velocity = Vec3::new(0.0, -1.0, 0.0);

        let mut solver = Solver::new();
        let mut c = ContactConstraint::new(PairId(0), Some(a), None);
        let mut manifold = crate::manifold::ContactManifold::new();
        manifold.update_from(
            &[crate::contact_gen::ContactData {
                position: Vec3::ZERO,
                normal: Vec3::NEG_Y,
                depth: 0.01,
                feature_id: 0,
            }],
            &crate::math::Pose::IDENTITY,
            &crate::math::Pose::IDENTITY,
        );
        c.sync_from_manifold(&manifold);
        solver.add_contact(c);

        let solved = solver.solve_velocities(&mut bodies, 1.0 / 60.0, &SolverTuning::default());
        assert_eq!(solved, 0, "sleeping island must be skipped");
        assert!((bodies[a].linear_velocity.y + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_clear_accumulated_impulses() {
        let mut bodies = BodySet::new();
        let bone = bodies.add(new_bone(Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY, 1.0));
        let mut solver = Solver::new();
        let h = solver.add_single_bone(crate::bone::SingleBoneConstraint::anchor(
            bone,
            Vec3::ZERO,
            Vec3::ZERO,
        ));
        solver.solve_velocities(&mut bodies, 1.0 / 60.0, &SolverTuning::default());
        assert!(
            solver
                .single_bone_mut(h)
                .unwrap()
                .accumulated_impulse
                .length()
                > 0.0
        );
        solver.clear_accumulated_impulses();
        assert_eq!(
            solver.single_bone_mut(h).unwrap().accumulated_impulse,
            Vec3::ZERO
        );
    }
}
