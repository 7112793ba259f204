//! Broad Phase: Grid2D + Sort-and-Sweep
//!
//! World space is quantized on the (Y, Z) plane into square cells of side
//! `cell_size`. Each bounded entry registers in every cell its AABB projects
//! into; within a cell, entries are kept sorted on X and a single sweep
//! enumerates overlapping pairs in O(N + K) expected time.
//!
//! A pair spanning several shared cells is emitted exactly once: only the
//! lowest shared cell, `(max(min_y), max(min_z))` of the two entries' cell
//! ranges, reports it, so the cell pass needs no shared flags.
//!
//! Unbounded half-space geometry never enters the grid; it is tested against
//! every bounded entry's AABB directly at the end of the update.
//!
//! Concurrency: the entry-update loop and the cell-sweep loop are each
//! dispatchable through the parallel-for. Entry updates serialize their
//! mutations of the sorted cell set behind a spin lock; the cell sweep is
//! embarrassingly parallel, with per-cell overlap buckets concatenated at
//! the barrier.

use glam::Vec3;
use std::collections::HashMap;

use crate::aabb::Aabb;
use crate::collidable::{CollidableId, CollidableSet};
use crate::parallel::SpinLock;

/// Default grid quantum on the (Y, Z) plane.
pub const DEFAULT_CELL_SIZE: f32 = 8.0;

const PRIME_Y: u32 = 15_485_863;
const PRIME_Z: u32 = 32_452_843;

/// Candidate overlapping pair, ordered `a < b`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BroadPhaseOverlap {
    /// Lower collidable id
    pub a: CollidableId,
    /// Higher collidable id
    pub b: CollidableId,
}

impl BroadPhaseOverlap {
    fn ordered(x: CollidableId, y: CollidableId) -> Self {
        if x < y {
            Self { a: x, b: y }
        } else {
            Self { a: y, b: x }
        }
    }
}

/// Cell key: hash first for ordering, raw coordinates for equality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct CellKey {
    hash: u32,
    y: i32,
    z: i32,
}

impl CellKey {
    #[inline]
    fn new(y: i32, z: i32) -> Self {
        let hash = (y as u32)
            .wrapping_mul(PRIME_Y)
            .wrapping_add((z as u32).wrapping_mul(PRIME_Z));
        Self { hash, y, z }
    }
}

/// Inclusive integer cell range on (Y, Z).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct CellRange {
    min_y: i32,
    max_y: i32,
    min_z: i32,
    max_z: i32,
}

impl CellRange {
    fn from_aabb(aabb: &Aabb, inv_cell_size: f32) -> Self {
        Self {
            min_y: (aabb.min.y * inv_cell_size).floor() as i32,
            max_y: (aabb.max.y * inv_cell_size).floor() as i32,
            min_z: (aabb.min.z * inv_cell_size).floor() as i32,
            max_z: (aabb.max.z * inv_cell_size).floor() as i32,
        }
    }

    #[inline]
    fn contains(&self, y: i32, z: i32) -> bool {
        y >= self.min_y && y <= self.max_y && z >= self.min_z && z <= self.max_z
    }
}

/// An entry tracked by the grid: its last-observed AABB and cell range.
#[derive(Clone, Copy, Debug)]
struct Grid2dEntry {
    collidable: CollidableId,
    aabb: Aabb,
    range: CellRange,
    active: bool,
}

/// One occupied grid cell with its X-sortable entry list.
#[derive(Clone, Debug)]
struct GridCell {
    key: CellKey,
    entries: Vec<u32>,
}

/// Ordered sparse set of occupied cells, kept in ascending key order.
#[derive(Default)]
pub struct SortedGrid2dSet {
    cells: Vec<GridCell>,
}

impl SortedGrid2dSet {
    fn find(&self, key: CellKey) -> Result<usize, usize> {
        self.cells.binary_search_by(|c| c.key.cmp(&key))
    }

    fn add_entry(&mut self, key: CellKey, entry: u32) {
        match self.find(key) {
            Ok(idx) => self.cells[idx].entries.push(entry),
            Err(idx) => self.cells.insert(
                idx,
                GridCell {
                    key,
                    entries: vec![entry],
                },
            ),
        }
    }

    fn remove_entry(&mut self, key: CellKey, entry: u32) {
        if let Ok(idx) = self.find(key) {
            let cell = &mut self.cells[idx];
            if let Some(pos) = cell.entries.iter().position(|&e| e == entry) {
                cell.entries.swap_remove(pos);
            }
        }
    }

    fn prune_empty(&mut self) {
        self.cells.retain(|c| !c.entries.is_empty());
    }

    /// Number of occupied cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }
}

/// The Grid2D sort-and-sweep broad phase.
pub struct Grid2dSortAndSweep {
    /// Grid quantum on (Y, Z)
    pub cell_size: f32,
    inv_cell_size: f32,
    entries: Vec<Grid2dEntry>,
    free_entries: Vec<u32>,
    entry_of: HashMap<CollidableId, u32>,
    cells: SpinLock<SortedGrid2dSet>,
    /// Half-space geometry: (collidable, world normal, world offset)
    unbounded: Vec<(CollidableId, Vec3, f32)>,
    overlaps: Vec<BroadPhaseOverlap>,
}

impl Grid2dSortAndSweep {
    /// Create a broad phase with the given cell size.
    pub fn new(cell_size: f32) -> Self {
        debug_assert!(cell_size > 0.0);
        Self {
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            entries: Vec::new(),
            free_entries: Vec::new(),
            entry_of: HashMap::new(),
            cells: SpinLock::new(SortedGrid2dSet::default()),
            unbounded: Vec::new(),
            overlaps: Vec::new(),
        }
    }

    /// Register a bounded collidable with its initial AABB.
    pub fn add(&mut self, id: CollidableId, aabb: Aabb) {
        debug_assert!(aabb.is_valid());
        let range = CellRange::from_aabb(&aabb, self.inv_cell_size);
        let entry = Grid2dEntry {
            collidable: id,
            aabb,
            range,
            active: true,
        };

        let entry_idx = if let Some(idx) = self.free_entries.pop() {
            self.entries[idx as usize] = entry;
            idx
        } else {
            let idx = self.entries.len() as u32;
            self.entries.push(entry);
            idx
        };
        self.entry_of.insert(id, entry_idx);

        let cells = self.cells.get_mut();
        for y in range.min_y..=range.max_y {
            for z in range.min_z..=range.max_z {
                cells.add_entry(CellKey::new(y, z), entry_idx);
            }
        }
    }

    /// Register an unbounded half-space collidable.
    pub fn add_unbounded(&mut self, id: CollidableId, normal: Vec3, offset: f32) {
        self.unbounded.push((id, normal, offset));
    }

    /// Deregister a collidable from every cell it occupies.
    pub fn remove(&mut self, id: CollidableId) {
        if let Some(entry_idx) = self.entry_of.remove(&id) {
            let entry = self.entries[entry_idx as usize];
            let cells = self.cells.get_mut();
            for y in entry.range.min_y..=entry.range.max_y {
                for z in entry.range.min_z..=entry.range.max_z {
                    cells.remove_entry(CellKey::new(y, z), entry_idx);
                }
            }
            cells.prune_empty();
            self.entries[entry_idx as usize].active = false;
            self.free_entries.push(entry_idx);
        } else {
            self.unbounded.retain(|(c, _, _)| *c != id);
        }
    }

    /// Number of occupied cells (diagnostics).
    pub fn cell_count(&mut self) -> usize {
        self.cells.get_mut().cell_count()
    }

    /// Refresh entries from the collidable set and emit this step's
    /// candidate pairs.
    pub fn update(&mut self, collidables: &CollidableSet) -> &[BroadPhaseOverlap] {
        self.update_entries(collidables);
        self.sweep_cells();
        self.emit_unbounded_overlaps();
        &self.overlaps
    }

    /// Candidate pairs from the last update.
    pub fn overlaps(&self) -> &[BroadPhaseOverlap] {
        &self.overlaps
    }

    /// Per-entry pass: recompute cell ranges and incrementally move entries
    /// between cells. Cell-set mutations serialize behind the spin lock.
    fn update_entries(&mut self, collidables: &CollidableSet) {
        let inv_cell_size = self.inv_cell_size;
        let cells = &self.cells;

        let per_entry = |entry_idx: usize, entry: &mut Grid2dEntry| {
            if !entry.active {
                return;
            }
            let Some(collidable) = collidables.get(entry.collidable) else {
                return;
            };
            let aabb = collidable.aabb;
            debug_assert!(aabb.is_valid());
            let new_range = CellRange::from_aabb(&aabb, inv_cell_size);
            let old_range = entry.range;
            entry.aabb = aabb;

            if new_range == old_range {
                return;
            }

            let mut guard = cells.lock();
            for y in old_range.min_y..=old_range.max_y {
                for z in old_range.min_z..=old_range.max_z {
                    if !new_range.contains(y, z) {
                        guard.remove_entry(CellKey::new(y, z), entry_idx as u32);
                    }
                }
            }
            for y in new_range.min_y..=new_range.max_y {
                for z in new_range.min_z..=new_range.max_z {
                    if !old_range.contains(y, z) {
                        guard.add_entry(CellKey::new(y, z), entry_idx as u32);
                    }
                }
            }
            drop(guard);

            entry.range = new_range;
        };

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            self.entries
                .par_iter_mut()
                .enumerate()
                .for_each(|(i, e)| per_entry(i, e));
        }

        #[cfg(not(feature = "parallel"))]
        {
            for (i, e) in self.entries.iter_mut().enumerate() {
                per_entry(i, e);
            }
        }

        self.cells.get_mut().prune_empty();
    }

    /// Per-cell pass: insertion-sort each cell on `aabb.min.x` (optimal under
    /// temporal coherence) and sweep for overlaps. Each cell appends to its
    /// own bucket; buckets are concatenated serially at the barrier.
    fn sweep_cells(&mut self) {
        self.overlaps.clear();

        let entries = &self.entries;
        let cells = self.cells.get_mut();

        let sweep_one = |cell: &mut GridCell| -> Vec<BroadPhaseOverlap> {
            insertion_sort_by_min_x(&mut cell.entries, entries);

            let mut bucket = Vec::new();
            let list = &cell.entries;
            for i in 0..list.len() {
                let ei = &entries[list[i] as usize];
                for &j_idx in list.iter().skip(i + 1) {
                    let ej = &entries[j_idx as usize];
                    if ej.aabb.min.x > ei.aabb.max.x {
                        break; // sorted on X: nothing further can overlap
                    }
                    if !ei.aabb.intersects_yz(&ej.aabb) {
                        continue;
                    }
                    // Lowest-shared-cell ownership: exactly one cell emits.
                    let owner_y = ei.range.min_y.max(ej.range.min_y);
                    let owner_z = ei.range.min_z.max(ej.range.min_z);
                    if cell.key.y == owner_y && cell.key.z == owner_z {
                        bucket.push(BroadPhaseOverlap::ordered(ei.collidable, ej.collidable));
                    }
                }
            }
            bucket
        };

        #[cfg(feature = "parallel")]
        let buckets: Vec<Vec<BroadPhaseOverlap>> = {
            use rayon::prelude::*;
            cells.cells.par_iter_mut().map(sweep_one).collect()
        };

        #[cfg(not(feature = "parallel"))]
        let buckets: Vec<Vec<BroadPhaseOverlap>> =
            cells.cells.iter_mut().map(sweep_one).collect();

        for bucket in buckets {
            self.overlaps.extend(bucket);
        }
    }

    /// Half-spaces against every bounded entry whose AABB reaches the
    /// surface.
    fn emit_unbounded_overlaps(&mut self) {
        for &(hs_id, n, off) in &self.unbounded {
            let abs_n = n.abs();
            for entry in self.entries.iter().filter(|e| e.active) {
                let center = entry.aabb.center();
                let extent = abs_n.dot(entry.aabb.half_extents());
                if n.dot(center) - extent <= off {
                    self.overlaps
                        .push(BroadPhaseOverlap::ordered(entry.collidable, hs_id));
                }
            }
        }
    }
}

impl Default for Grid2dSortAndSweep {
    fn default() -> Self {
        Self::new(DEFAULT_CELL_SIZE)
    }
}

/// Insertion sort of a cell's entry list keyed by `aabb.min.x`. Lists are
/// nearly sorted frame to frame, which keeps this linear in practice.
fn insertion_sort_by_min_x(list: &mut [u32], entries: &[Grid2dEntry]) {
    for i in 1..list.len() {
        let current = list[i];
        let key = entries[current as usize].aabb.min.x;
        let mut j = i;
        while j > 0 && entries[list[j - 1] as usize].aabb.min.x > key {
            list[j] = list[j - 1];
            j -= 1;
        }
        list[j] = current;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodySet, RigidBody};
    use crate::collidable::Collidable;
    use crate::math::Pose;
    use crate::shape::Shape;

    fn setup_world(
        positions: &[Vec3],
        half: f32,
    ) -> (BodySet, CollidableSet, Grid2dSortAndSweep, Vec<CollidableId>) {
        let mut bodies = BodySet::new();
        let mut collidables = CollidableSet::new();
        let mut bp = Grid2dSortAndSweep::new(DEFAULT_CELL_SIZE);
        let mut ids = Vec::new();

        for &p in positions {
            let body = bodies.add(RigidBody::new_dynamic(p, 1.0));
            let mut c = Collidable::new(
                Shape::Box {
                    half_extents: Vec3::splat(half),
                },
                body,
            );
            c.margin = 0.0;
            c.refresh_bounds(&bodies, 1.0 / 60.0);
            let aabb = c.aabb;
            let id = collidables.add(c);
            bp.add(id, aabb);
            ids.push(id);
        }

        (bodies, collidables, bp, ids)
    }

    #[test]
    fn test_overlapping_pair_emitted_once() {
        let (_bodies, collidables, mut bp, ids) = setup_world(
            &[Vec3::ZERO, Vec3::new(0.5, 0.0, 0.0), Vec3::new(50.0, 0.0, 0.0)],
            0.5,
        );

        let overlaps = bp.update(&collidables).to_vec();
        assert_eq!(overlaps.len(), 1);
        assert_eq!(overlaps[0], BroadPhaseOverlap::ordered(ids[0], ids[1]));
    }

    #[test]
    fn test_pair_spanning_cells_deduplicated() {
        // Two boxes straddling a cell boundary on Y and Z share 4 cells;
        // the pair must still be emitted exactly once.
        let (_bodies, collidables, mut bp, _ids) = setup_world(
            &[
                Vec3::new(0.0, 7.9, 7.9),
                Vec3::new(0.3, 8.1, 8.1),
            ],
            1.0,
        );

        let overlaps = bp.update(&collidables);
        assert_eq!(overlaps.len(), 1, "shared-cell pair must be deduplicated");
    }

    #[test]
    fn test_rerun_on_unchanged_world_is_idempotent() {
        let (_bodies, collidables, mut bp, _ids) = setup_world(
            &[
                Vec3::ZERO,
                Vec3::new(0.5, 0.0, 0.0),
                Vec3::new(0.0, 0.7, 0.0),
            ],
            0.5,
        );

        let mut first: Vec<_> = bp.update(&collidables).to_vec();
        let mut second: Vec<_> = bp.update(&collidables).to_vec();
        first.sort_by_key(|o| (o.a, o.b));
        second.sort_by_key(|o| (o.a, o.b));
        assert_eq!(first, second);
    }

    #[test]
    fn test_entry_moves_between_cells() {
        let (mut bodies, mut collidables, mut bp, ids) =
            setup_world(&[Vec3::ZERO, Vec3::new(40.0, 40.0, 0.0)], 0.5);

        assert!(bp.update(&collidables).is_empty());

        // Teleport the second body next to the first; pairs must appear.
        let body_id = collidables[ids[1]].body.unwrap();
        bodies[body_id].position = Vec3::new(0.6, 0.0, 0.0);
        collidables.refresh_all_bounds(&bodies, 1.0 / 60.0);

        let overlaps = bp.update(&collidables);
        assert_eq!(overlaps.len(), 1);

        // And disappear again when it leaves.
        bodies[body_id].position = Vec3::new(0.0, -90.0, 30.0);
        collidables.refresh_all_bounds(&bodies, 1.0 / 60.0);
        assert!(bp.update(&collidables).is_empty());
    }

    #[test]
    fn test_removed_entry_emits_nothing() {
        let (_bodies, collidables, mut bp, ids) =
            setup_world(&[Vec3::ZERO, Vec3::new(0.5, 0.0, 0.0)], 0.5);

        bp.remove(ids[0]);
        assert!(bp.update(&collidables).is_empty());
    }

    #[test]
    fn test_halfspace_pairs_with_nearby_entries() {
        let (_bodies, mut collidables, mut bp, ids) =
            setup_world(&[Vec3::new(0.0, 0.4, 0.0), Vec3::new(0.0, 30.0, 0.0)], 0.5);

        let floor = collidables.add(Collidable::new_static(
            Shape::HalfSpace {
                normal: Vec3::Y,
                offset: 0.0,
            },
            Pose::IDENTITY,
        ));
        bp.add_unbounded(floor, Vec3::Y, 0.0);

        let overlaps = bp.update(&collidables);
        // Only the low box touches the floor.
        assert_eq!(overlaps.len(), 1);
        let expected = BroadPhaseOverlap::ordered(ids[0], floor);
        assert_eq!(overlaps[0], expected);
    }

    #[test]
    fn test_scaling_emission_count_deterministic() {
        // A grid of touching boxes: the overlap count must be identical
        // across repeated builds and updates.
        let mut positions = Vec::new();
        for i in 0..10 {
            for j in 0..10 {
                positions.push(Vec3::new(i as f32 * 0.9, j as f32 * 0.9, 0.0));
            }
        }

        let count = |positions: &[Vec3]| {
            let (_b, collidables, mut bp, _i) = setup_world(positions, 0.5);
            bp.update(&collidables).len()
        };

        let c1 = count(&positions);
        let c2 = count(&positions);
        assert!(c1 > 0);
        assert_eq!(c1, c2, "overlap count must be deterministic");
    }

    #[test]
    fn test_cell_hash_ascending_keys() {
        let a = CellKey::new(0, 0);
        let b = CellKey::new(1, 0);
        let c = CellKey::new(0, 1);
        // Keys differ and order consistently.
        assert_ne!(a, b);
        assert_ne!(a, c);
        let mut keys = [b, c, a];
        keys.sort();
        let mut again = [a, c, b];
        again.sort();
        assert_eq!(keys, again);
    }
}
