//! Physics Profiling API
//!
//! Lightweight performance counters and timers for the pipeline stages. The
//! `Space` records wall-clock nanoseconds per stage each step; `StepStats`
//! carries the per-frame counters (pair counts, narrow-phase tests, solver
//! iterations) that the stages report as they run.

/// A single profiling timer entry
#[derive(Clone, Debug)]
pub struct ProfileEntry {
    /// Stage name
    pub name: &'static str,
    /// Total accumulated nanoseconds
    pub total_nanos: u64,
    /// Number of invocations
    pub call_count: u64,
    /// Last frame's nanoseconds
    pub last_nanos: u64,
    /// Peak nanoseconds (single frame)
    pub peak_nanos: u64,
}

impl ProfileEntry {
    /// Create a new profile entry
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            total_nanos: 0,
            call_count: 0,
            last_nanos: 0,
            peak_nanos: 0,
        }
    }

    /// Average nanoseconds per call
    #[inline]
    pub fn average_nanos(&self) -> u64 {
        if self.call_count == 0 {
            0
        } else {
            self.total_nanos / self.call_count
        }
    }

    /// Record a measurement
    pub fn record(&mut self, nanos: u64) {
        self.total_nanos += nanos;
        self.call_count += 1;
        self.last_nanos = nanos;
        if nanos > self.peak_nanos {
            self.peak_nanos = nanos;
        }
    }

    /// Reset all counters
    pub fn reset(&mut self) {
        self.total_nanos = 0;
        self.call_count = 0;
        self.last_nanos = 0;
        self.peak_nanos = 0;
    }
}

/// Physics step statistics (per-frame counters)
#[derive(Clone, Copy, Debug, Default)]
pub struct StepStats {
    /// Number of broad-phase overlaps emitted
    pub broad_phase_overlaps: u32,
    /// Number of narrow-phase pair updates performed
    pub narrow_phase_tests: u32,
    /// Number of active contact points
    pub active_contacts: u32,
    /// Number of touching manifolds
    pub active_manifolds: u32,
    /// Number of active (awake, dynamic) bodies
    pub active_bodies: u32,
    /// Number of solver velocity iterations performed
    pub velocity_iterations: u32,
    /// Number of solver position iterations performed
    pub position_iterations: u32,
    /// Number of CCD sweeps performed
    pub ccd_sweeps: u32,
    /// Number of solver islands this step
    pub island_count: u32,
}

/// Stage index: broad phase
pub const STAGE_BROAD_PHASE: usize = 0;
/// Stage index: narrow phase
pub const STAGE_NARROW_PHASE: usize = 1;
/// Stage index: solver
pub const STAGE_SOLVER: usize = 2;
/// Stage index: continuous collision detection
pub const STAGE_CCD: usize = 3;
/// Stage index: integration
pub const STAGE_INTEGRATION: usize = 4;
/// Stage index: updateable phases
pub const STAGE_UPDATEABLES: usize = 5;
/// Stage index: whole step
pub const STAGE_TOTAL_STEP: usize = 6;

/// Physics profiler: collects timing and statistics
pub struct PhysicsProfiler {
    /// Stage timers
    entries: Vec<ProfileEntry>,
    /// Current frame stats
    pub stats: StepStats,
    /// Frame counter
    pub frame_count: u64,
    /// Whether profiling is enabled
    pub enabled: bool,
}

impl PhysicsProfiler {
    /// Create a new profiler with the default stages
    pub fn new() -> Self {
        let entries = vec![
            ProfileEntry::new("broad_phase"),
            ProfileEntry::new("narrow_phase"),
            ProfileEntry::new("solver"),
            ProfileEntry::new("ccd"),
            ProfileEntry::new("integration"),
            ProfileEntry::new("updateables"),
            ProfileEntry::new("total_step"),
        ];

        Self {
            entries,
            stats: StepStats::default(),
            frame_count: 0,
            enabled: true,
        }
    }

    /// Record nanoseconds for a stage
    #[inline]
    pub fn record(&mut self, stage: usize, nanos: u64) {
        if self.enabled && stage < self.entries.len() {
            self.entries[stage].record(nanos);
        }
    }

    /// Begin a new frame (reset per-frame stats)
    pub fn begin_frame(&mut self) {
        self.stats = StepStats::default();
        self.frame_count += 1;
    }

    /// Get a profile entry by stage index
    pub fn get(&self, stage: usize) -> Option<&ProfileEntry> {
        self.entries.get(stage)
    }

    /// Get last frame's nanoseconds for a stage
    pub fn last_nanos(&self, stage: usize) -> u64 {
        self.entries.get(stage).map_or(0, |e| e.last_nanos)
    }

    /// Get average nanoseconds for a stage
    pub fn average_nanos(&self, stage: usize) -> u64 {
        self.entries
            .get(stage)
            .map_or(0, ProfileEntry::average_nanos)
    }

    /// Reset all profiling data
    pub fn reset(&mut self) {
        for entry in &mut self.entries {
            entry.reset();
        }
        self.stats = StepStats::default();
        self.frame_count = 0;
    }

    /// Get a summary of all stages: `(name, last, average, peak)`
    pub fn summary(&self) -> Vec<(&'static str, u64, u64, u64)> {
        self.entries
            .iter()
            .map(|e| (e.name, e.last_nanos, e.average_nanos(), e.peak_nanos))
            .collect()
    }
}

impl Default for PhysicsProfiler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_entry() {
        let mut entry = ProfileEntry::new("test");
        entry.record(100);
        entry.record(200);
        entry.record(150);

        assert_eq!(entry.call_count, 3);
        assert_eq!(entry.total_nanos, 450);
        assert_eq!(entry.average_nanos(), 150);
        assert_eq!(entry.peak_nanos, 200);
        assert_eq!(entry.last_nanos, 150);
    }

    #[test]
    fn test_profiler() {
        let mut profiler = PhysicsProfiler::new();
        profiler.begin_frame();

        profiler.record(STAGE_BROAD_PHASE, 100);
        profiler.record(STAGE_SOLVER, 500);

        assert_eq!(profiler.last_nanos(STAGE_BROAD_PHASE), 100);
        assert_eq!(profiler.last_nanos(STAGE_SOLVER), 500);
        assert_eq!(profiler.frame_count, 1);
    }

    #[test]
    fn test_profiler_summary() {
        let mut profiler = PhysicsProfiler::new();
        profiler.record(STAGE_NARROW_PHASE, 42);

        let summary = profiler.summary();
        assert_eq!(summary.len(), 7);
        assert_eq!(summary[STAGE_NARROW_PHASE].1, 42);
    }

    #[test]
    fn test_profiler_reset() {
        let mut profiler = PhysicsProfiler::new();
        profiler.record(STAGE_BROAD_PHASE, 100);
        profiler.reset();
        assert_eq!(profiler.last_nanos(STAGE_BROAD_PHASE), 0);
        assert_eq!(profiler.frame_count, 0);
    }
}
