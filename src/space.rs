//! Simulation Space
//!
//! The root container: owns the bodies, collidables, broad phase, narrow
//! phase, solver, event table, and profiler, and advances them through one
//! fixed time step per [`Space::update`] call.
//!
//! Per tick: tentative velocities from gravity and damping; bounding-box
//! refresh and broad phase; narrow-phase manifold updates; the
//! `BeforeSolver` updateable phase; island linking and activity; warm-started
//! velocity iterations; the `BeforePositionUpdate` phase; pose integration
//! with swept-sphere CCD; the position pass; the `EndOfTimeStep` phase.
//!
//! All tuning lives in [`WorldConfig`]; there is no global state.

use core::any::Any;
use std::time::Instant;

use glam::Vec3;

use crate::body::{BodyId, BodySet, RigidBody};
use crate::bone::SingleBoneConstraint;
use crate::broad_phase::{Grid2dSortAndSweep, DEFAULT_CELL_SIZE};
use crate::ccd::CcdConfig;
use crate::collidable::{Collidable, CollidableId, CollidableSet};
use crate::constraint::SolverTuning;
use crate::error::PhysicsError;
use crate::event::EventTable;
use crate::integrator::{integrate_poses, integrate_velocities};
use crate::island::{IslandManager, SleepConfig};
use crate::material::MaterialTable;
use crate::narrow_phase::NarrowPhase;
use crate::profiling::{
    PhysicsProfiler, STAGE_BROAD_PHASE, STAGE_INTEGRATION, STAGE_NARROW_PHASE, STAGE_SOLVER,
    STAGE_TOTAL_STEP, STAGE_UPDATEABLES,
};
use crate::raycast::{raycast_shape, Ray, RayHit};
use crate::solver::{ConstraintHandle, Solver};

/// World-level configuration. Replaces the original design's globals; every
/// subsystem reads its knobs from here through the space.
#[derive(Clone, Copy, Debug)]
pub struct WorldConfig {
    /// Gravity acceleration
    pub gravity: Vec3,
    /// Broad-phase grid quantum on (Y, Z)
    pub cell_size: f32,
    /// Solver iteration counts and correction tuning
    pub solver: SolverTuning,
    /// Activity thresholds
    pub sleep: SleepConfig,
    /// Swept-sphere CCD tuning
    pub ccd: CcdConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            cell_size: DEFAULT_CELL_SIZE,
            solver: SolverTuning::default(),
            sleep: SleepConfig::default(),
            ccd: CcdConfig::default(),
        }
    }
}

impl WorldConfig {
    /// Validate configuration invariants.
    pub fn validate(&self) -> Result<(), PhysicsError> {
        if !(self.cell_size > 0.0) {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "cell_size must be positive",
            });
        }
        if self.solver.velocity_iterations == 0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "velocity_iterations must be at least 1",
            });
        }
        if self.solver.allowed_penetration < 0.0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "allowed_penetration must be >= 0",
            });
        }
        Ok(())
    }
}

/// Update phases pumped by the space each step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdatePhase {
    /// After the narrow phase, before the solver runs
    BeforeSolver,
    /// After the solver, before pose integration
    BeforePositionUpdate,
    /// After everything else
    EndOfTimeStep,
}

/// A participant in the space's update phases (the character controller is
/// the in-tree implementation).
pub trait Updateable: Send {
    /// Called between the narrow phase and the solver.
    fn before_solver(&mut self, _space: &mut Space, _dt: f32) {}
    /// Called between the solver and pose integration.
    fn before_position_update(&mut self, _space: &mut Space, _dt: f32) {}
    /// Called at the end of the step.
    fn end_of_time_step(&mut self, _space: &mut Space, _dt: f32) {}
    /// Downcast hook.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Handle to a registered updateable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpdateableHandle(u32);

/// The simulation space.
pub struct Space {
    /// World configuration
    pub config: WorldConfig,
    /// Rigid bodies (bones included)
    pub bodies: BodySet,
    /// Collidables
    pub collidables: CollidableSet,
    /// Material registry
    pub materials: MaterialTable,
    /// Broad phase
    pub broad_phase: Grid2dSortAndSweep,
    /// Narrow phase
    pub narrow_phase: NarrowPhase,
    /// Constraint solver
    pub solver: Solver,
    /// Event callback table
    pub events: EventTable,
    /// Stage timings and per-step counters
    pub profiler: PhysicsProfiler,
    islands: IslandManager,
    updateables: Vec<Option<Box<dyn Updateable>>>,
}

impl Space {
    /// Create a space from a validated configuration.
    pub fn new(config: WorldConfig) -> Result<Self, PhysicsError> {
        config.validate()?;
        Ok(Self {
            config,
            bodies: BodySet::new(),
            collidables: CollidableSet::new(),
            materials: MaterialTable::new(),
            broad_phase: Grid2dSortAndSweep::new(config.cell_size),
            narrow_phase: NarrowPhase::new(),
            solver: Solver::new(),
            events: EventTable::new(),
            profiler: PhysicsProfiler::new(),
            islands: IslandManager::new(config.sleep),
            updateables: Vec::new(),
        })
    }

    /// Create a space with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(WorldConfig::default()).expect("default config is valid")
    }

    // ========================================================================
    // Population
    // ========================================================================

    /// Add a body.
    pub fn add_body(&mut self, body: RigidBody) -> BodyId {
        self.bodies.add(body)
    }

    /// Remove a body. Fails while collidables still reference it.
    pub fn remove_body(&mut self, id: BodyId) -> Result<(), PhysicsError> {
        let attached = self
            .collidables
            .iter()
            .filter(|(_, c)| c.body == Some(id))
            .count();
        if attached > 0 {
            return Err(PhysicsError::BodyStillReferenced {
                collidables: attached,
            });
        }
        self.bodies.remove(id)
    }

    /// Add a collidable and register it with the broad phase.
    pub fn add_collidable(&mut self, mut collidable: Collidable) -> CollidableId {
        collidable.refresh_bounds(&self.bodies, 0.0);
        let halfspace = collidable.shape.world_halfspace(&collidable.pose);
        let aabb = collidable.aabb;
        let id = self.collidables.add(collidable);
        match halfspace {
            Some((n, off)) => self.broad_phase.add_unbounded(id, n, off),
            None => self.broad_phase.add(id, aabb),
        }
        id
    }

    /// Remove a collidable: destroys its pairs (removing any outstanding
    /// constraints from the solver), deregisters every broad-phase cell,
    /// and drops its event hooks.
    pub fn remove_collidable(&mut self, id: CollidableId) -> Result<(), PhysicsError> {
        self.narrow_phase
            .remove_collidable(id, &mut self.events, &mut self.solver);
        self.broad_phase.remove(id);
        self.events.remove(id);
        self.collidables.remove(id)
    }

    /// Register an articulated single-bone constraint with the solver.
    pub fn add_single_bone_constraint(
        &mut self,
        constraint: SingleBoneConstraint,
    ) -> Result<ConstraintHandle, PhysicsError> {
        if self.bodies.get(constraint.bone).is_none() {
            return Err(PhysicsError::InvalidConstraint {
                reason: "bone body does not exist",
            });
        }
        Ok(self.solver.add_single_bone(constraint))
    }

    /// Register an updateable for the phase pump.
    pub fn add_updateable(&mut self, updateable: Box<dyn Updateable>) -> UpdateableHandle {
        let idx = self.updateables.len() as u32;
        self.updateables.push(Some(updateable));
        UpdateableHandle(idx)
    }

    /// Borrow a registered updateable, downcast to its concrete type.
    pub fn updateable_mut<T: Updateable + 'static>(
        &mut self,
        handle: UpdateableHandle,
    ) -> Option<&mut T> {
        self.updateables
            .get_mut(handle.0 as usize)?
            .as_mut()?
            .as_any_mut()
            .downcast_mut::<T>()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Cast a ray against every collidable; returns the closest hit.
    pub fn raycast(
        &self,
        ray: &Ray,
        max_t: f32,
        exclude: Option<CollidableId>,
    ) -> Option<(CollidableId, RayHit)> {
        let mut best: Option<(CollidableId, RayHit)> = None;
        for (id, collidable) in self.collidables.iter() {
            if Some(id) == exclude {
                continue;
            }
            let limit = best.map_or(max_t, |(_, h)| h.t);
            if let Some(hit) = raycast_shape(&collidable.shape, &collidable.pose, ray, limit) {
                if best.map_or(true, |(_, b)| hit.t < b.t) {
                    best = Some((id, hit));
                }
            }
        }
        best
    }

    /// Sum of kinetic energy over live bodies (test and diagnostics aid).
    pub fn total_kinetic_energy(&self) -> f32 {
        self.bodies.iter().map(|(_, b)| b.kinetic_energy()).sum()
    }

    /// Refresh one collidable's pose and bounds immediately (after a
    /// teleport, outside the normal pipeline point).
    pub fn refresh_collidable(&mut self, id: CollidableId) {
        if let Some(c) = self.collidables.get_mut(id) {
            c.refresh_bounds(&self.bodies, 0.0);
        }
    }

    /// Re-run narrow-phase collision for every pair involving `id` (the
    /// character stepper calls this after teleporting).
    pub fn update_pairs_involving(&mut self, id: CollidableId, dt: f32) {
        self.narrow_phase.update_pairs_involving(
            id,
            &self.collidables,
            &mut self.bodies,
            &mut self.events,
            &mut self.solver,
            dt,
        );
    }

    /// Wake a body and its island.
    pub fn wake_body(&mut self, id: BodyId) {
        self.islands.wake_body(&mut self.bodies, id);
    }

    // ========================================================================
    // The step
    // ========================================================================

    /// Advance the simulation by `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        debug_assert!(dt > 0.0 && dt.is_finite(), "dt must be positive");
        let step_start = Instant::now();
        self.profiler.begin_frame();

        // 1. External forces -> tentative velocities.
        let t = Instant::now();
        integrate_velocities(&mut self.bodies, self.config.gravity, dt);
        let mut integration_nanos = t.elapsed().as_nanos() as u64;

        // 2. Bounding boxes + broad phase.
        let t = Instant::now();
        self.collidables.refresh_all_bounds(&self.bodies, dt);
        let overlaps: Vec<(CollidableId, CollidableId)> = self
            .broad_phase
            .update(&self.collidables)
            .iter()
            .map(|o| (o.a, o.b))
            .collect();
        self.profiler
            .record(STAGE_BROAD_PHASE, t.elapsed().as_nanos() as u64);
        self.profiler.stats.broad_phase_overlaps = overlaps.len() as u32;

        // 3. Narrow phase: manifolds, events, constraint add/remove.
        let t = Instant::now();
        self.narrow_phase.update(
            &overlaps,
            &self.collidables,
            &mut self.bodies,
            &self.materials,
            &mut self.events,
            &mut self.solver,
            dt,
        );
        self.profiler
            .record(STAGE_NARROW_PHASE, t.elapsed().as_nanos() as u64);
        self.profiler.stats.narrow_phase_tests = self.narrow_phase.tests_this_step;
        let (manifolds, contacts) = self.narrow_phase.contact_counts();
        self.profiler.stats.active_manifolds = manifolds;
        self.profiler.stats.active_contacts = contacts;

        // 4. BeforeSolver phase (character support collection, stepping).
        let t = Instant::now();
        self.pump(UpdatePhase::BeforeSolver, dt);
        let mut updateable_nanos = t.elapsed().as_nanos() as u64;

        // 5. Islands, warm-started velocity iterations, then activity from
        //    the corrected velocities.
        let t = Instant::now();
        self.islands.begin_step(&self.bodies);
        self.solver.link_islands(&self.bodies, &mut self.islands);

        let solved = self
            .solver
            .solve_velocities(&mut self.bodies, dt, &self.config.solver);
        self.narrow_phase.store_impulses(&self.solver);

        let island_count = self.islands.update_activity(&mut self.bodies);
        self.profiler.stats.island_count = island_count as u32;
        self.profiler
            .record(STAGE_SOLVER, t.elapsed().as_nanos() as u64);
        self.profiler.stats.velocity_iterations =
            self.config.solver.velocity_iterations * solved as u32;

        // 6. BeforePositionUpdate phase (character ground glue).
        let t = Instant::now();
        self.pump(UpdatePhase::BeforePositionUpdate, dt);
        updateable_nanos += t.elapsed().as_nanos() as u64;

        // 7. Pose integration with CCD clamping, then the position pass.
        let t = Instant::now();
        let sweeps = integrate_poses(&mut self.bodies, &self.collidables, dt, &self.config.ccd);
        self.profiler.stats.ccd_sweeps = sweeps;
        integration_nanos += t.elapsed().as_nanos() as u64;
        self.profiler.record(STAGE_INTEGRATION, integration_nanos);

        self.solver
            .solve_positions(&mut self.bodies, &self.config.solver);
        self.profiler.stats.position_iterations = self.config.solver.position_iterations;

        // 8. EndOfTimeStep phase.
        let t = Instant::now();
        self.pump(UpdatePhase::EndOfTimeStep, dt);
        updateable_nanos += t.elapsed().as_nanos() as u64;
        self.profiler.record(STAGE_UPDATEABLES, updateable_nanos);

        self.profiler.stats.active_bodies = self
            .bodies
            .iter()
            .filter(|(_, b)| b.is_dynamic() && b.is_active)
            .count() as u32;
        self.profiler
            .record(STAGE_TOTAL_STEP, step_start.elapsed().as_nanos() as u64);
    }

    /// Run the registered updateables for one phase. Handlers receive the
    /// space itself; registering new updateables from inside a phase is not
    /// supported.
    fn pump(&mut self, phase: UpdatePhase, dt: f32) {
        let mut updateables = core::mem::take(&mut self.updateables);
        for updateable in updateables.iter_mut().flatten() {
            match phase {
                UpdatePhase::BeforeSolver => updateable.before_solver(self, dt),
                UpdatePhase::BeforePositionUpdate => updateable.before_position_update(self, dt),
                UpdatePhase::EndOfTimeStep => updateable.end_of_time_step(self, dt),
            }
        }
        debug_assert!(
            self.updateables.is_empty(),
            "updateables must not be registered from inside a phase"
        );
        self.updateables = updateables;
    }
}

// ============================================================================
// Tests
// ============================================================================
