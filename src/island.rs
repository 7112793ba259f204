//! Islands and Activity Management
//!
//! Groups bodies connected through constraints into islands (connected
//! components of the body-constraint graph) and manages the activity flag:
//! bodies whose velocities stay below the thresholds for long enough are
//! deactivated, and whole islands wake as a unit so a sleeping stack cannot
//! be half-awake.
//!
//! Static and kinematic bodies never link islands; a shared floor must not
//! merge every stack standing on it.

use crate::body::{BodyId, BodySet};

/// Configuration for the activity system.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SleepConfig {
    /// Linear speed below which a body counts as idle
    pub linear_threshold: f32,
    /// Angular speed below which a body counts as idle
    pub angular_threshold: f32,
    /// Consecutive idle frames before deactivation
    pub frames_to_sleep: u32,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            linear_threshold: 0.05,
            angular_threshold: 0.05,
            frames_to_sleep: 60,
        }
    }
}

/// Island: a group of connected dynamic bodies.
#[derive(Clone, Debug)]
pub struct Island {
    /// Live body ids in this island
    pub bodies: Vec<BodyId>,
    /// Whether every body in the island is idle enough to sleep
    pub all_idle: bool,
}

/// Island manager: union-find over body slots plus per-body idle counters.
pub struct IslandManager {
    parent: Vec<u32>,
    rank: Vec<u32>,
    idle_frames: Vec<u32>,
    /// Activity configuration
    pub config: SleepConfig,
}

impl IslandManager {
    /// Create a manager with the given configuration.
    pub fn new(config: SleepConfig) -> Self {
        Self {
            parent: Vec::new(),
            rank: Vec::new(),
            idle_frames: Vec::new(),
            config,
        }
    }

    /// Reset the union-find forest for a new step, sized to the body arena.
    pub fn begin_step(&mut self, bodies: &BodySet) {
        let n = bodies.slot_count();
        self.parent.clear();
        self.parent.extend(0..n as u32);
        self.rank.clear();
        self.rank.resize(n, 0);
        self.idle_frames.resize(n, 0);
    }

    /// Find root with path halving.
    fn find(&mut self, mut x: u32) -> u32 {
        while self.parent[x as usize] != x {
            self.parent[x as usize] = self.parent[self.parent[x as usize] as usize];
            x = self.parent[x as usize];
        }
        x
    }

    /// Link two bodies into the same island. Infinite-mass bodies are
    /// ignored so static geometry does not merge islands.
    pub fn link(&mut self, bodies: &BodySet, a: BodyId, b: BodyId) {
        let link_a = bodies.get(a).map_or(false, |body| body.is_dynamic());
        let link_b = bodies.get(b).map_or(false, |body| body.is_dynamic());
        if !link_a || !link_b {
            return;
        }

        let ra = self.find(a.0);
        let rb = self.find(b.0);
        if ra == rb {
            return;
        }
        match self.rank[ra as usize].cmp(&self.rank[rb as usize]) {
            core::cmp::Ordering::Less => self.parent[ra as usize] = rb,
            core::cmp::Ordering::Greater => self.parent[rb as usize] = ra,
            core::cmp::Ordering::Equal => {
                self.parent[rb as usize] = ra;
                self.rank[ra as usize] += 1;
            }
        }
    }

    /// Update idle counters and apply island-wide sleep/wake to the activity
    /// flags. Call after linking this step's constraints. Returns the number
    /// of islands.
    pub fn update_activity(&mut self, bodies: &mut BodySet) -> usize {
        let config = self.config;

        // Per-body idle bookkeeping.
        let ids: Vec<BodyId> = bodies.iter().map(|(id, _)| id).collect();
        for &id in &ids {
            let body = &bodies[id];
            if !body.is_dynamic() {
                continue;
            }
            let idle = body.linear_velocity.length_squared()
                < config.linear_threshold * config.linear_threshold
                && body.angular_velocity.length_squared()
                    < config.angular_threshold * config.angular_threshold;
            let counter = &mut self.idle_frames[id.0 as usize];
            if idle {
                *counter = counter.saturating_add(1);
            } else {
                *counter = 0;
            }
        }

        // A body woken externally (impulse, new contact) wakes its island;
        // an island sleeps only when every member has been idle long enough.
        let islands = self.build_islands(bodies);
        for island in &islands {
            let any_disturbed = island.bodies.iter().any(|&id| {
                bodies[id].is_active && self.idle_frames[id.0 as usize] == 0
            });
            let all_idle = island
                .bodies
                .iter()
                .all(|&id| self.idle_frames[id.0 as usize] >= config.frames_to_sleep);

            for &id in &island.bodies {
                if all_idle {
                    bodies[id].is_active = false;
                } else if any_disturbed {
                    bodies[id].is_active = true;
                }
            }
        }

        islands.len()
    }

    /// Build the island list for the current step.
    pub fn build_islands(&mut self, bodies: &BodySet) -> Vec<Island> {
        let mut root_to_island: Vec<Option<usize>> = vec![None; self.parent.len()];
        let mut islands: Vec<Island> = Vec::new();

        let ids: Vec<BodyId> = bodies
            .iter()
            .filter(|(_, b)| b.is_dynamic())
            .map(|(id, _)| id)
            .collect();

        for id in ids {
            let root = self.find(id.0) as usize;
            let island_idx = match root_to_island[root] {
                Some(idx) => idx,
                None => {
                    let idx = islands.len();
                    root_to_island[root] = Some(idx);
                    islands.push(Island {
                        bodies: Vec::new(),
                        all_idle: true,
                    });
                    idx
                }
            };
            islands[island_idx].bodies.push(id);
            if self.idle_frames[id.0 as usize] < self.config.frames_to_sleep {
                islands[island_idx].all_idle = false;
            }
        }

        islands
    }

    /// Wake a body and reset its idle counter (applied to its island on the
    /// next activity update).
    pub fn wake_body(&mut self, bodies: &mut BodySet, id: BodyId) {
        if let Some(body) = bodies.get_mut(id) {
            if body.is_dynamic() {
                body.is_active = true;
            }
        }
        if let Some(counter) = self.idle_frames.get_mut(id.0 as usize) {
            *counter = 0;
        }
    }

    /// Number of inactive dynamic bodies.
    pub fn sleeping_count(&self, bodies: &BodySet) -> usize {
        bodies
            .iter()
            .filter(|(_, b)| b.is_dynamic() && !b.is_active)
            .count()
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

    fn still_body() -> RigidBody {
        RigidBody::new_dynamic(Vec3::ZERO, 1.0)
    }

    #[test]
    fn test_islands_partition() {
        let mut bodies = BodySet::new();
        let a = bodies.add(still_body());
        let b = bodies.add(still_body());
        let c = bodies.add(still_body());
        let d = bodies.add(still_body());

        let mut mgr = IslandManager::new(SleepConfig::default());
        mgr.begin_step(&bodies);
        mgr.link(&bodies, a, b);
        mgr.link(&bodies, c, d);

        let islands = mgr.build_islands(&bodies);
        assert_eq!(islands.len(), 2);
        let total: usize = islands.iter().map(|i| i.bodies.len()).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_static_does_not_link() {
        let mut bodies = BodySet::new();
        let a = bodies.add(still_body());
        let floor = bodies.add(RigidBody::new_static(Vec3::ZERO));
        let b = bodies.add(still_body());

        let mut mgr = IslandManager::new(SleepConfig::default());
        mgr.begin_step(&bodies);
        mgr.link(&bodies, a, floor);
        mgr.link(&bodies, b, floor);

        let islands = mgr.build_islands(&bodies);
        assert_eq!(islands.len(), 2, "floor must not merge the two islands");
    }

    #[test]
    fn test_sleep_after_threshold() {
        let mut bodies = BodySet::new();
        let a = bodies.add(still_body());

        let mut mgr = IslandManager::new(SleepConfig {
            frames_to_sleep: 3,
            ..Default::default()
        });

        for _ in 0..3 {
            mgr.begin_step(&bodies);
            mgr.update_activity(&mut bodies);
        }
        assert!(!bodies[a].is_active, "idle body should deactivate");
    }

    #[test]
    fn test_motion_resets_idle() {
        let mut bodies = BodySet::new();
        let a = bodies.add(still_body());

        let mut mgr = IslandManager::new(SleepConfig {
            frames_to_sleep: 2,
            ..Default::default()
        });

        mgr.begin_step(&bodies);
        mgr.update_activity(&mut bodies);

        // Give the body speed: the counter resets and it stays awake.
        bodies[a].linear_velocity = Vec3::new(1.0, 0.0, 0.0);
        mgr.begin_step(&bodies);
        mgr.update_activity(&mut bodies);
        assert!(bodies[a].is_active);
        assert_eq!(mgr.idle_frames[a.0 as usize], 0);
    }

    #[test]
    fn test_island_sleeps_as_unit() {
        let mut bodies = BodySet::new();
        let a = bodies.add(still_body());
        let b = bodies.add(still_body());

        let mut mgr = IslandManager::new(SleepConfig {
            frames_to_sleep: 2,
            ..Default::default()
        });

        // b keeps moving: the island must stay awake, a included.
        bodies[b].linear_velocity = Vec3::new(1.0, 0.0, 0.0);
        for _ in 0..4 {
            mgr.begin_step(&bodies);
            mgr.link(&bodies, a, b);
            mgr.update_activity(&mut bodies);
        }
        assert!(bodies[a].is_active, "island with a moving member stays awake");

        // Once b stops, the island deactivates together.
        bodies[b].linear_velocity = Vec3::ZERO;
        for _ in 0..4 {
            mgr.begin_step(&bodies);
            mgr.link(&bodies, a, b);
            mgr.update_activity(&mut bodies);
        }
        assert!(!bodies[a].is_active);
        assert!(!bodies[b].is_active);
    }

    #[test]
    fn test_wake_body() {
        let mut bodies = BodySet::new();
        let a = bodies.add(still_body());
        let mut mgr = IslandManager::new(SleepConfig {
            frames_to_sleep: 1,
            ..Default::default()
        });
        mgr.begin_step(&bodies);
        mgr.update_activity(&mut bodies);
        assert!(!bodies[a].is_active);

        mgr.wake_body(&mut bodies, a);
        assert!(bodies[a].is_active);
    }
}
