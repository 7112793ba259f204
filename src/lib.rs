//! basalt-physics: Real-Time 3D Rigid-Body Simulation Kernel
//!
//! Advances a population of rigid bodies through discrete time steps,
//! detecting and resolving contacts so that bodies behave plausibly under
//! gravity, collision, friction, and articulated constraints. Built for
//! interactive applications (games, previsualization, robotics sandboxes)
//! running at 30-240 Hz on commodity hardware.
//!
//! # Architecture
//!
//! Four tightly coupled subsystems make up the core:
//!
//! 1. **Broad phase** ([`broad_phase`]): a 2D grid + sort-and-sweep scheme
//!    prunes the O(N^2) pair space to a candidate overlap stream in
//!    O(N + K) expected time.
//! 2. **Narrow phase** ([`narrow_phase`], [`manifold`], [`contact_gen`]):
//!    persistent contact manifolds per pair, via analytic tests and GJK/EPA
//!    on convex primitives.
//! 3. **Solver** ([`solver`], [`constraint`], [`bone`]): projected
//!    Gauss-Seidel over velocity impulses with warm starting and accumulated
//!    impulses, covering contacts and articulated single-bone constraints.
//! 4. **Character controller** ([`character`]): a worked compound consumer
//!    with support detection, ground gluing, and stepping.
//!
//! # Example
//!
//! ```rust
//! use basalt_physics::prelude::*;
//! use glam::Vec3;
//!
//! let mut space = Space::with_defaults();
//!
//! // Static floor.
//! space.add_collidable(Collidable::new_static(
//!     Shape::HalfSpace { normal: Vec3::Y, offset: 0.0 },
//!     Pose::IDENTITY,
//! ));
//!
//! // A falling crate.
//! let body = space.add_body(RigidBody::new_dynamic(Vec3::new(0.0, 5.0, 0.0), 1.0));
//! space.add_collidable(Collidable::new(
//!     Shape::Box { half_extents: Vec3::splat(0.5) },
//!     body,
//! ));
//!
//! for _ in 0..120 {
//!     space.update(1.0 / 60.0);
//! }
//! assert!(space.bodies[body].position.y < 5.0);
//! ```
//!
//! # Concurrency
//!
//! The pipeline is synchronous; with the `parallel` feature the broad-phase
//! entry and cell passes, the integrator, and other data-parallel loops fan
//! out through Rayon behind the [`parallel`] abstraction. Solver iteration
//! order is deterministic per step on a single thread.

#![warn(missing_docs)]

pub mod aabb;
pub mod body;
pub mod bone;
pub mod broad_phase;
pub mod ccd;
pub mod character;
pub mod collidable;
pub mod collision;
pub mod constraint;
pub mod contact_gen;
pub mod error;
pub mod event;
pub mod filter;
pub mod integrator;
pub mod island;
pub mod manifold;
pub mod mass_properties;
pub mod material;
pub mod math;
pub mod narrow_phase;
pub mod parallel;
pub mod pool;
pub mod profiling;
pub mod raycast;
pub mod shape;
pub mod solver;
pub mod space;

// Re-export commonly used types
pub use aabb::Aabb;
pub use body::{BodyId, BodySet, BodyType, PositionUpdateMode, RigidBody};
pub use bone::{new_bone, BoneGoal, SingleBoneConstraint};
pub use broad_phase::{BroadPhaseOverlap, Grid2dSortAndSweep, DEFAULT_CELL_SIZE};
pub use ccd::{CcdConfig, Toi};
pub use character::{
    CharacterConfig, CharacterController, HorizontalMotionConstraint, Stepper, SupportData,
    SupportFinder,
};
pub use collidable::{Collidable, CollidableId, CollidableSet};
pub use constraint::{ContactConstraint, PairId, SolverTuning, SolverUpdateable};
pub use contact_gen::ContactData;
pub use error::PhysicsError;
pub use event::{CollidableEvents, EventTable};
pub use filter::CollisionFilter;
pub use island::{Island, IslandManager, SleepConfig};
pub use manifold::{ContactManifold, ContactPoint, MAX_CONTACTS};
pub use mass_properties::MassProperties;
pub use material::{CombineRule, CombinedMaterial, MaterialId, MaterialTable, PhysicsMaterial};
pub use math::Pose;
pub use narrow_phase::{NarrowPhase, PairKey, PairState};
pub use profiling::{PhysicsProfiler, ProfileEntry, StepStats};
pub use raycast::{Ray, RayHit};
pub use shape::Shape;
pub use solver::{ConstraintHandle, Solver};
pub use space::{Space, Updateable, UpdateableHandle, UpdatePhase, WorldConfig};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::aabb::Aabb;
    pub use crate::body::{BodyId, BodyType, PositionUpdateMode, RigidBody};
    pub use crate::bone::{new_bone, SingleBoneConstraint};
    pub use crate::character::{CharacterConfig, CharacterController};
    pub use crate::collidable::{Collidable, CollidableId};
    pub use crate::constraint::SolverTuning;
    pub use crate::error::PhysicsError;
    pub use crate::material::{CombineRule, PhysicsMaterial};
    pub use crate::math::Pose;
    pub use crate::raycast::{Ray, RayHit};
    pub use crate::shape::Shape;
    pub use crate::space::{Space, WorldConfig};
}

#[cfg(test)]
mod compile_smoke_tests {
    //! Verify that core types from the prelude and key modules are
    //! accessible. These tests catch accidental breakage of public
    //! re-exports.

    use super::prelude::*;
    use glam::Vec3;

    #[test]
    fn test_prelude_types_accessible() {
        let _ = WorldConfig::default();
        let _ = SolverTuning::default();
        let _ = CharacterConfig::default();
        let _ = RigidBody::new_static(Vec3::ZERO);
        let _ = Pose::IDENTITY;
    }

    #[test]
    fn test_error_type_accessible() {
        let e = PhysicsError::InvalidBody { index: 0, count: 0 };
        let _ = format!("{}", e);
    }

    #[test]
    fn test_space_accessible() {
        let mut space = Space::with_defaults();
        let body = space.add_body(RigidBody::new_dynamic(Vec3::ZERO, 1.0));
        space.add_collidable(Collidable::new(Shape::Sphere { radius: 0.5 }, body));
        space.update(1.0 / 60.0);
        assert_eq!(space.bodies.len(), 1);
    }
}
