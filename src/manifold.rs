//! Persistent Contact Manifolds
//!
//! Up to four contact points per pair, carried across frames. Points are
//! matched by feature id (falling back to positional proximity), and matched
//! points keep their accumulated impulses so the solver warm starts without
//! jitter. When a fifth point arrives, the reduction keeps the deepest point
//! plus the three that maximize manifold area.

use glam::Vec3;

use crate::contact_gen::ContactData;
use crate::math::Pose;

/// Maximum contact points per manifold.
pub const MAX_CONTACTS: usize = 4;

/// Distance beyond which a persistent point is considered drifted and
/// dropped (squared, ~2 cm).
const DRIFT_THRESHOLD_SQ: f32 = 4.0e-4;

/// A single persistent contact point.
#[derive(Clone, Copy, Debug)]
pub struct ContactPoint {
    /// Contact position, world space
    pub position: Vec3,
    /// Unit normal pointing from A toward B
    pub normal: Vec3,
    /// Penetration depth (positive = overlapping)
    pub depth: f32,
    /// Identifier used to match this point against the previous frame
    pub feature_id: u32,
    /// Anchor in A's local frame (for refresh between narrow-phase updates)
    pub local_a: Vec3,
    /// Anchor in B's local frame
    pub local_b: Vec3,
    /// Accumulated normal impulse (warm start)
    pub normal_impulse: f32,
    /// Accumulated friction impulses along the two tangents (warm start)
    pub friction_impulse: [f32; 2],
}

impl ContactPoint {
    fn from_data(c: &ContactData, pose_a: &Pose, pose_b: &Pose) -> Self {
        Self {
            position: c.position,
            normal: c.normal,
            depth: c.depth,
            feature_id: c.feature_id,
            local_a: pose_a.inverse_transform_point(c.position),
            local_b: pose_b.inverse_transform_point(c.position),
            normal_impulse: 0.0,
            friction_impulse: [0.0; 2],
        }
    }
}

/// Persistent contact set for one collidable pair.
#[derive(Clone, Debug, Default)]
pub struct ContactManifold {
    points: [Option<ContactPoint>; MAX_CONTACTS],
    count: usize,
}

impl ContactManifold {
    /// Create an empty manifold.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active points.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the manifold has no contacts.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Active contact points.
    pub fn points(&self) -> impl Iterator<Item = &ContactPoint> {
        self.points.iter().take(self.count).filter_map(Option::as_ref)
    }

    /// Active contact points, mutable.
    pub fn points_mut(&mut self) -> impl Iterator<Item = &mut ContactPoint> {
        self.points
            .iter_mut()
            .take(self.count)
            .filter_map(Option::as_mut)
    }

    /// Point by slot index.
    pub fn point(&self, idx: usize) -> Option<&ContactPoint> {
        self.points.get(idx).and_then(Option::as_ref)
    }

    /// Drop all points.
    pub fn clear(&mut self) {
        self.points = [None; MAX_CONTACTS];
        self.count = 0;
    }

    /// Reset every accumulated impulse (on large topology changes).
    pub fn clear_accumulated_impulses(&mut self) {
        for p in self.points_mut() {
            p.normal_impulse = 0.0;
            p.friction_impulse = [0.0; 2];
        }
    }

    /// Replace the manifold with a freshly generated full contact set,
    /// carrying accumulated impulses over feature-id matches. Used by the
    /// analytic generators that produce a complete manifold each step.
    pub fn update_from(&mut self, fresh: &[ContactData], pose_a: &Pose, pose_b: &Pose) {
        let mut next: [Option<ContactPoint>; MAX_CONTACTS] = [None; MAX_CONTACTS];
        let mut next_count = 0;

        for c in fresh.iter().take(MAX_CONTACTS) {
            let mut point = ContactPoint::from_data(c, pose_a, pose_b);
            if let Some(old) = self.find_match(c) {
                point.normal_impulse = old.normal_impulse;
                point.friction_impulse = old.friction_impulse;
            }
            next[next_count] = Some(point);
            next_count += 1;
        }

        self.points = next;
        self.count = next_count;
    }

    /// Refresh persistent points against the current poses: recompute world
    /// positions and depth, and drop points that separated or drifted
    /// tangentially. Used by the incremental GJK/EPA path before merging the
    /// frame's new point.
    pub fn refresh(&mut self, pose_a: &Pose, pose_b: &Pose) {
        let mut kept: [Option<ContactPoint>; MAX_CONTACTS] = [None; MAX_CONTACTS];
        let mut kept_count = 0;

        for i in 0..self.count {
            let Some(mut p) = self.points[i] else { continue };
            let world_a = pose_a.transform_point(p.local_a);
            let world_b = pose_b.transform_point(p.local_b);
            let drift = world_b - world_a;

            // Separation along the normal shrinks the depth.
            let new_depth = p.depth - drift.dot(p.normal);
            let tangential = drift - p.normal * drift.dot(p.normal);

            if new_depth <= 0.0 || tangential.length_squared() > DRIFT_THRESHOLD_SQ {
                continue;
            }

            // Re-anchor at the refreshed midpoint so the next refresh
            // measures incremental drift only.
            p.depth = new_depth;
            p.position = 0.5 * (world_a + world_b);
            p.local_a = pose_a.inverse_transform_point(p.position);
            p.local_b = pose_b.inverse_transform_point(p.position);
            kept[kept_count] = Some(p);
            kept_count += 1;
        }

        self.points = kept;
        self.count = kept_count;
    }

    /// Merge one new contact into the manifold, preserving impulses on a
    /// match and reducing to the best four points when full.
    pub fn merge_point(&mut self, c: &ContactData, pose_a: &Pose, pose_b: &Pose) {
        let mut point = ContactPoint::from_data(c, pose_a, pose_b);

        // Feature-id match first, then positional proximity.
        for i in 0..self.count {
            let Some(existing) = &self.points[i] else { continue };
            let id_match = existing.feature_id == c.feature_id;
            let near = existing.position.distance_squared(c.position) < DRIFT_THRESHOLD_SQ;
            if id_match || near {
                point.normal_impulse = existing.normal_impulse;
                point.friction_impulse = existing.friction_impulse;
                self.points[i] = Some(point);
                return;
            }
        }

        if self.count < MAX_CONTACTS {
            self.points[self.count] = Some(point);
            self.count += 1;
        } else {
            self.reduce_with(point);
        }
    }

    /// Choose the best four of five points: keep the deepest, then the three
    /// maximizing the spanned area.
    fn reduce_with(&mut self, candidate: ContactPoint) {
        let mut all: Vec<ContactPoint> = self.points().copied().collect();
        all.push(candidate);

        let deepest_idx = all
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.depth.total_cmp(&b.depth))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let deepest = all.swap_remove(deepest_idx);

        // Furthest from the deepest point.
        let far_idx = all
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                a.position
                    .distance_squared(deepest.position)
                    .total_cmp(&b.position.distance_squared(deepest.position))
            })
            .map(|(i, _)| i)
            .unwrap_or(0);
        let far = all.swap_remove(far_idx);

        // Third point maximizing triangle area with the first two.
        let edge = far.position - deepest.position;
        let third_idx = all
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                let area_a = edge.cross(a.position - deepest.position).length_squared();
                let area_b = edge.cross(b.position - deepest.position).length_squared();
                area_a.total_cmp(&area_b)
            })
            .map(|(i, _)| i)
            .unwrap_or(0);
        let third = all.swap_remove(third_idx);

        // Fourth point furthest from the triangle's plane edges: keep the one
        // with the largest summed distance to the chosen three.
        let fourth = all
            .into_iter()
            .max_by(|a, b| {
                let da = a.position.distance_squared(deepest.position)
                    + a.position.distance_squared(far.position)
                    + a.position.distance_squared(third.position);
                let db = b.position.distance_squared(deepest.position)
                    + b.position.distance_squared(far.position)
                    + b.position.distance_squared(third.position);
                da.total_cmp(&db)
            });

        let mut next: [Option<ContactPoint>; MAX_CONTACTS] = [None; MAX_CONTACTS];
        next[0] = Some(deepest);
        next[1] = Some(far);
        next[2] = Some(third);
        let mut count = 3;
        if let Some(p) = fourth {
            next[3] = Some(p);
            count = 4;
        }
        self.points = next;
        self.count = count;
    }

    fn find_match(&self, c: &ContactData) -> Option<&ContactPoint> {
        self.points()
            .find(|p| p.feature_id == c.feature_id)
            .or_else(|| {
                self.points()
                    .find(|p| p.position.distance_squared(c.position) < DRIFT_THRESHOLD_SQ)
            })
    }
}

// ============================================================================
// Tests
// ============================================================================
