//! Contact Generation
//!
//! Produces raw contact data for a shape pair. Common pairs use analytic
//! generators (sphere/sphere, convex/half-space, box/box via SAT with
//! reference-face clipping, sphere/box, sphere/capsule); the general
//! convex-convex case falls back to GJK/EPA, producing one point per step
//! that the persistent manifold accumulates across frames.
//!
//! Normal convention: every contact normal points from shape A toward
//! shape B. Positive depth means penetration.

use glam::{Mat3, Vec3};

use crate::collision::{epa, gjk};
use crate::math::{tangent_frame, Pose};
use crate::shape::{Shape, TransformedShape};

/// One raw contact produced by a generator, before manifold persistence.
#[derive(Clone, Copy, Debug)]
pub struct ContactData {
    /// Contact position, world space
    pub position: Vec3,
    /// Unit normal pointing from A toward B
    pub normal: Vec3,
    /// Penetration depth (positive = overlapping)
    pub depth: f32,
    /// Stable identifier used to match this contact across frames
    pub feature_id: u32,
}

/// Generate contacts between two posed shapes into `out`.
///
/// `out` is not cleared; callers own the buffer lifecycle (they come from
/// the space's resource pool).
pub fn generate_contacts(
    shape_a: &Shape,
    pose_a: &Pose,
    shape_b: &Shape,
    pose_b: &Pose,
    out: &mut Vec<ContactData>,
) {
    match (shape_a, shape_b) {
        (Shape::Sphere { radius: ra }, Shape::Sphere { radius: rb }) => {
            sphere_sphere(pose_a.position, *ra, pose_b.position, *rb, out);
        }
        (Shape::HalfSpace { .. }, Shape::HalfSpace { .. }) => {
            // Two unbounded solids never form a contact pair.
        }
        (Shape::HalfSpace { .. }, _) => {
            let start = out.len();
            generate_contacts(shape_b, pose_b, shape_a, pose_a, out);
            flip_contacts(&mut out[start..]);
        }
        (_, Shape::HalfSpace { .. }) => {
            let (n, off) = shape_b
                .world_halfspace(pose_b)
                .expect("checked half-space variant");
            convex_halfspace(shape_a, pose_a, n, off, out);
        }
        (Shape::Box { half_extents: ha }, Shape::Box { half_extents: hb }) => {
            box_box(*ha, pose_a, *hb, pose_b, out);
        }
        (Shape::Sphere { radius }, Shape::Box { half_extents }) => {
            sphere_box(pose_a.position, *radius, *half_extents, pose_b, out);
        }
        (Shape::Box { half_extents }, Shape::Sphere { radius }) => {
            let start = out.len();
            sphere_box(pose_b.position, *radius, *half_extents, pose_a, out);
            flip_contacts(&mut out[start..]);
        }
        (
            Shape::Sphere { radius },
            Shape::Capsule {
                radius: cap_radius,
                half_height,
            },
        ) => {
            sphere_capsule(
                pose_a.position,
                *radius,
                pose_b,
                *cap_radius,
                *half_height,
                out,
            );
        }
        (
            Shape::Capsule {
                radius: cap_radius,
                half_height,
            },
            Shape::Sphere { radius },
        ) => {
            let start = out.len();
            sphere_capsule(
                pose_b.position,
                *radius,
                pose_a,
                *cap_radius,
                *half_height,
                out,
            );
            flip_contacts(&mut out[start..]);
        }
        _ => general_convex(shape_a, pose_a, shape_b, pose_b, out),
    }
}

/// Reverse the A/B roles of freshly generated contacts.
fn flip_contacts(contacts: &mut [ContactData]) {
    for c in contacts {
        c.normal = -c.normal;
    }
}

// ============================================================================
// Analytic generators
// ============================================================================

fn sphere_sphere(ca: Vec3, ra: f32, cb: Vec3, rb: f32, out: &mut Vec<ContactData>) {
    let d = cb - ca;
    let dist_sq = d.length_squared();
    let combined = ra + rb;
    if dist_sq >= combined * combined {
        return;
    }

    let dist = dist_sq.sqrt();
    let normal = if dist > 1.0e-9 { d / dist } else { Vec3::Y };
    let depth = combined - dist;
    out.push(ContactData {
        position: ca + normal * (ra - 0.5 * depth),
        normal,
        depth,
        feature_id: 0,
    });
}

/// Convex shape (A) against a world half-space (B) with outward normal `n`
/// and offset `off`. Emits up to four points so box faces rest without
/// rocking. Contact normals point into the half-space (`-n`).
fn convex_halfspace(shape: &Shape, pose: &Pose, n: Vec3, off: f32, out: &mut Vec<ContactData>) {
    let depth_of = |p: Vec3| off - n.dot(p);

    match shape {
        Shape::Sphere { radius } => {
            let deepest = pose.position - n * *radius;
            let depth = depth_of(deepest);
            if depth > 0.0 {
                out.push(ContactData {
                    position: deepest,
                    normal: -n,
                    depth,
                    feature_id: 0,
                });
            }
        }
        Shape::Box { .. } => {
            let corners = shape.box_corners(pose).expect("box variant");
            let mut penetrating: Vec<(usize, f32)> = corners
                .iter()
                .enumerate()
                .filter_map(|(i, c)| {
                    let depth = depth_of(*c);
                    (depth > 0.0).then_some((i, depth))
                })
                .collect();
            penetrating.sort_by(|x, y| y.1.total_cmp(&x.1));
            for &(i, depth) in penetrating.iter().take(4) {
                out.push(ContactData {
                    position: corners[i],
                    normal: -n,
                    depth,
                    feature_id: i as u32,
                });
            }
        }
        Shape::Capsule {
            radius,
            half_height,
        } => {
            let axis = pose.transform_vector(Vec3::Y);
            for (i, sign) in [1.0_f32, -1.0].iter().enumerate() {
                let cap = pose.position + axis * (*half_height * sign);
                let deepest = cap - n * *radius;
                let depth = depth_of(deepest);
                if depth > 0.0 {
                    out.push(ContactData {
                        position: deepest,
                        normal: -n,
                        depth,
                        feature_id: i as u32,
                    });
                }
            }
        }
        Shape::Cylinder {
            radius,
            half_height,
        } => {
            let axis = pose.transform_vector(Vec3::Y);
            let align = axis.dot(n);
            let toward_plane = if align >= 0.0 { -1.0 } else { 1.0 };
            let cap = pose.position + axis * (*half_height * toward_plane);

            let radial = -n - axis * (-n).dot(axis);
            if radial.length_squared() < 1.0e-8 {
                // Cap face flat on the plane: sample four rim points.
                let (t1, t2) = tangent_frame(axis);
                for (i, dir) in [t1, -t1, t2, -t2].iter().enumerate() {
                    let p = cap + *dir * *radius;
                    let depth = depth_of(p);
                    if depth > 0.0 {
                        out.push(ContactData {
                            position: p,
                            normal: -n,
                            depth,
                            feature_id: i as u32,
                        });
                    }
                }
            } else {
                // Tilted: deepest rim points of both caps.
                let dir = radial.normalize();
                for (i, sign) in [toward_plane, -toward_plane].iter().enumerate() {
                    let p = pose.position + axis * (*half_height * sign) + dir * *radius;
                    let depth = depth_of(p);
                    if depth > 0.0 {
                        out.push(ContactData {
                            position: p,
                            normal: -n,
                            depth,
                            feature_id: i as u32,
                        });
                    }
                }
            }
        }
        Shape::ConvexHull { points } => {
            let mut penetrating: Vec<(usize, Vec3, f32)> = points
                .iter()
                .enumerate()
                .filter_map(|(i, p)| {
                    let world = pose.transform_point(*p);
                    let depth = depth_of(world);
                    (depth > 0.0).then_some((i, world, depth))
                })
                .collect();
            penetrating.sort_by(|x, y| y.2.total_cmp(&x.2));
            for &(i, world, depth) in penetrating.iter().take(4) {
                out.push(ContactData {
                    position: world,
                    normal: -n,
                    depth,
                    feature_id: i as u32,
                });
            }
        }
        Shape::HalfSpace { .. } => {
            // Two half-spaces never form a contact pair.
        }
    }
}

fn sphere_box(
    center: Vec3,
    radius: f32,
    half_extents: Vec3,
    box_pose: &Pose,
    out: &mut Vec<ContactData>,
) {
    let local = box_pose.inverse_transform_point(center);
    let clamped = local.clamp(-half_extents, half_extents);

    if (local - clamped).length_squared() > 1.0e-12 {
        // Sphere center outside the box: closest-point test.
        let delta = local - clamped;
        let dist = delta.length();
        if dist >= radius {
            return;
        }
        // Normal from sphere (A) into the box (B).
        let normal = box_pose.transform_vector(-delta / dist);
        out.push(ContactData {
            position: box_pose.transform_point(clamped),
            normal,
            depth: radius - dist,
            feature_id: 0,
        });
    } else {
        // Center inside the box: push out through the nearest face.
        let mut min_gap = f32::MAX;
        let mut axis = 0;
        let mut sign = 1.0;
        for i in 0..3 {
            let gap_pos = half_extents[i] - local[i];
            let gap_neg = half_extents[i] + local[i];
            if gap_pos < min_gap {
                min_gap = gap_pos;
                axis = i;
                sign = 1.0;
            }
            if gap_neg < min_gap {
                min_gap = gap_neg;
                axis = i;
                sign = -1.0;
            }
        }
        let mut local_normal = Vec3::ZERO;
        local_normal[axis] = sign;
        // Sphere sits inside B: push A out against the face direction.
        let normal = box_pose.transform_vector(-local_normal);
        out.push(ContactData {
            position: center,
            normal,
            depth: min_gap + radius,
            feature_id: 0,
        });
    }
}

fn sphere_capsule(
    center: Vec3,
    radius: f32,
    capsule_pose: &Pose,
    cap_radius: f32,
    half_height: f32,
    out: &mut Vec<ContactData>,
) {
    let axis = capsule_pose.transform_vector(Vec3::Y);
    let rel = center - capsule_pose.position;
    let t = rel.dot(axis).clamp(-half_height, half_height);
    let closest = capsule_pose.position + axis * t;
    sphere_sphere(center, radius, closest, cap_radius, out);
}

// ============================================================================
// Box-box: SAT with reference-face clipping
// ============================================================================

struct SatResult {
    axis: Vec3, // unit, oriented A -> B
    depth: f32,
    kind: SatAxisKind,
}

#[derive(Clone, Copy, PartialEq)]
enum SatAxisKind {
    FaceA,
    FaceB,
    Edge(usize, usize),
}

fn box_box(ha: Vec3, pose_a: &Pose, hb: Vec3, pose_b: &Pose, out: &mut Vec<ContactData>) {
    let ra = Mat3::from_quat(pose_a.orientation);
    let rb = Mat3::from_quat(pose_b.orientation);
    let a_axes = [ra.x_axis, ra.y_axis, ra.z_axis];
    let b_axes = [rb.x_axis, rb.y_axis, rb.z_axis];
    let d = pose_b.position - pose_a.position;

    let projected_radius = |axes: &[Vec3; 3], half: Vec3, l: Vec3| -> f32 {
        half.x * axes[0].dot(l).abs() + half.y * axes[1].dot(l).abs() + half.z * axes[2].dot(l).abs()
    };

    let mut best: Option<SatResult> = None;

    // Edge axes must beat a face axis by a margin to win; face manifolds are
    // far more stable than single edge contacts.
    const EDGE_BIAS: f32 = 0.95;

    let mut test_axis = |axis: Vec3, kind: SatAxisKind, best: &mut Option<SatResult>| -> bool {
        let len_sq = axis.length_squared();
        if len_sq < 1.0e-8 {
            return true; // degenerate cross product, skip
        }
        let l = axis / len_sq.sqrt();
        let dist = d.dot(l);
        let depth = projected_radius(&a_axes, ha, l) + projected_radius(&b_axes, hb, l) - dist.abs();
        if depth < 0.0 {
            return false; // separating axis found
        }
        let oriented = if dist >= 0.0 { l } else { -l };
        let effective = if matches!(kind, SatAxisKind::Edge(..)) {
            depth / EDGE_BIAS
        } else {
            depth
        };
        let replace = match best {
            None => true,
            Some(b) => {
                let b_effective = if matches!(b.kind, SatAxisKind::Edge(..)) {
                    b.depth / EDGE_BIAS
                } else {
                    b.depth
                };
                effective < b_effective
            }
        };
        if replace {
            *best = Some(SatResult {
                axis: oriented,
                depth,
                kind,
            });
        }
        true
    };

    for i in 0..3 {
        if !test_axis(a_axes[i], SatAxisKind::FaceA, &mut best) {
            return;
        }
    }
    for j in 0..3 {
        if !test_axis(b_axes[j], SatAxisKind::FaceB, &mut best) {
            return;
        }
    }
    for i in 0..3 {
        for j in 0..3 {
            if !test_axis(a_axes[i].cross(b_axes[j]), SatAxisKind::Edge(i, j), &mut best) {
                return;
            }
        }
    }

    let Some(sat) = best else { return };

    match sat.kind {
        SatAxisKind::Edge(i, j) => {
            edge_edge_contact(&sat, i, j, ha, pose_a, &a_axes, hb, pose_b, &b_axes, out);
        }
        SatAxisKind::FaceA => {
            // Reference face on A (outward normal = +axis), incident on B.
            clip_face_contact(
                sat.axis, pose_a, ha, &a_axes, pose_b, hb, &b_axes, sat.axis, 0, out,
            );
        }
        SatAxisKind::FaceB => {
            // Reference face on B (outward normal faces A = -axis), incident on A.
            clip_face_contact(
                -sat.axis, pose_b, hb, &b_axes, pose_a, ha, &a_axes, sat.axis, 0x100, out,
            );
        }
    }
}

/// Build the 4 world vertices of the face of a box whose outward normal is
/// most aligned with `dir`. Returns (vertices, face_index).
fn most_aligned_face(
    dir: Vec3,
    half: Vec3,
    pose: &Pose,
    axes: &[Vec3; 3],
) -> ([Vec3; 4], usize) {
    let mut face_axis = 0;
    let mut best = f32::MIN;
    let mut sign = 1.0;
    for (i, axis) in axes.iter().enumerate() {
        let dot = axis.dot(dir);
        if dot.abs() > best {
            best = dot.abs();
            face_axis = i;
            sign = if dot >= 0.0 { 1.0 } else { -1.0 };
        }
    }

    let u = (face_axis + 1) % 3;
    let v = (face_axis + 2) % 3;
    let center = pose.position + axes[face_axis] * (half[face_axis] * sign);
    let du = axes[u] * half[u];
    let dv = axes[v] * half[v];
    (
        [
            center + du + dv,
            center - du + dv,
            center - du - dv,
            center + du - dv,
        ],
        face_axis * 2 + if sign > 0.0 { 0 } else { 1 },
    )
}

/// Clip the incident face against the reference face's side planes and emit
/// the penetrating points. `contact_normal` is the final A->B normal;
/// `id_base` keeps ids distinct between FaceA and FaceB cases.
#[allow(clippy::too_many_arguments)]
fn clip_face_contact(
    ref_outward: Vec3,
    ref_pose: &Pose,
    ref_half: Vec3,
    ref_axes: &[Vec3; 3],
    inc_pose: &Pose,
    inc_half: Vec3,
    inc_axes: &[Vec3; 3],
    contact_normal: Vec3,
    id_base: u32,
    out: &mut Vec<ContactData>,
) {
    let (ref_face, ref_face_idx) = most_aligned_face(ref_outward, ref_half, ref_pose, ref_axes);
    let (incident, _) = most_aligned_face(-ref_outward, inc_half, inc_pose, inc_axes);

    // Side planes of the reference face (pointing inward).
    let mut poly: Vec<Vec3> = incident.to_vec();
    for i in 0..4 {
        let edge_a = ref_face[i];
        let edge_b = ref_face[(i + 1) % 4];
        let edge = edge_b - edge_a;
        let plane_normal = ref_outward.cross(edge).normalize_or_zero();
        if plane_normal.length_squared() < 0.5 {
            continue;
        }
        poly = clip_polygon(&poly, plane_normal, plane_normal.dot(edge_a));
        if poly.is_empty() {
            return;
        }
    }

    // Keep points at or below the reference face surface.
    let face_offset = ref_outward.dot(ref_face[0]);
    let mut contacts: Vec<(Vec3, f32)> = poly
        .into_iter()
        .filter_map(|p| {
            let depth = face_offset - ref_outward.dot(p);
            (depth > 0.0).then_some((p, depth))
        })
        .collect();

    // Cap at the four deepest.
    contacts.sort_by(|x, y| y.1.total_cmp(&x.1));
    contacts.truncate(4);

    for (slot, (p, depth)) in contacts.into_iter().enumerate() {
        out.push(ContactData {
            position: p,
            normal: contact_normal,
            depth,
            feature_id: id_base | ((ref_face_idx as u32) << 4) | slot as u32,
        });
    }
}

/// Sutherland-Hodgman clip: keeps the polygon region with
/// `dot(n, p) <= offset`.
fn clip_polygon(poly: &[Vec3], n: Vec3, offset: f32) -> Vec<Vec3> {
    let mut result = Vec::with_capacity(poly.len() + 2);
    for i in 0..poly.len() {
        let current = poly[i];
        let next = poly[(i + 1) % poly.len()];
        let d_current = n.dot(current) - offset;
        let d_next = n.dot(next) - offset;

        if d_current <= 0.0 {
            result.push(current);
        }
        if (d_current < 0.0) != (d_next < 0.0) && (d_current - d_next).abs() > 1.0e-9 {
            let t = d_current / (d_current - d_next);
            result.push(current + (next - current) * t);
        }
    }
    result
}

/// Single contact at the closest points of the two supporting edges.
#[allow(clippy::too_many_arguments)]
fn edge_edge_contact(
    sat: &SatResult,
    edge_a_axis: usize,
    edge_b_axis: usize,
    ha: Vec3,
    pose_a: &Pose,
    a_axes: &[Vec3; 3],
    hb: Vec3,
    pose_b: &Pose,
    b_axes: &[Vec3; 3],
    out: &mut Vec<ContactData>,
) {
    // Supporting corner of A along the contact axis, with the edge axis free.
    let mut pa = pose_a.position;
    for k in 0..3 {
        if k != edge_a_axis {
            let sign = if a_axes[k].dot(sat.axis) >= 0.0 { 1.0 } else { -1.0 };
            pa += a_axes[k] * (ha[k] * sign);
        }
    }
    let mut pb = pose_b.position;
    for k in 0..3 {
        if k != edge_b_axis {
            let sign = if b_axes[k].dot(sat.axis) >= 0.0 { -1.0 } else { 1.0 };
            pb += b_axes[k] * (hb[k] * sign);
        }
    }

    // Closest points between the two edge lines.
    let da = a_axes[edge_a_axis];
    let db = b_axes[edge_b_axis];
    let r = pb - pa;
    let a_dot_b = da.dot(db);
    let denom = 1.0 - a_dot_b * a_dot_b;
    let (s, t) = if denom.abs() > 1.0e-8 {
        let ta = (r.dot(da) - a_dot_b * r.dot(db)) / denom;
        let tb = (a_dot_b * r.dot(da) - r.dot(db)) / denom;
        (
            ta.clamp(-ha[edge_a_axis], ha[edge_a_axis]),
            tb.clamp(-hb[edge_b_axis], hb[edge_b_axis]),
        )
    } else {
        (0.0, 0.0)
    };

    let point_a = pa + da * s;
    let point_b = pb + db * t;

    out.push(ContactData {
        position: 0.5 * (point_a + point_b),
        normal: sat.axis,
        depth: sat.depth,
        feature_id: 0x1000 | (edge_a_axis * 3 + edge_b_axis) as u32,
    });
}

// ============================================================================
// General convex fallback (GJK + EPA, one point per step)
// ============================================================================

fn general_convex(
    shape_a: &Shape,
    pose_a: &Pose,
    shape_b: &Shape,
    pose_b: &Pose,
    out: &mut Vec<ContactData>,
) {
    let a = TransformedShape::new(shape_a, *pose_a);
    let b = TransformedShape::new(shape_b, *pose_b);

    let gjk_result = gjk(&a, &b);
    if !gjk_result.colliding {
        return;
    }

    let Some(pen) = epa(&a, &b, &gjk_result) else {
        return;
    };

    let position = 0.5 * (pen.point_a + pen.point_b);

    // Feature id from the quantized local witness point so persistent
    // manifolds can match the contact next frame.
    let local = pose_a.inverse_transform_point(pen.point_a);
    let q = |v: f32| (v * 20.0).round() as i32 as u32;
    let feature_id = q(local.x)
        .wrapping_mul(73856093)
        .wrapping_add(q(local.y).wrapping_mul(19349663))
        .wrapping_add(q(local.z).wrapping_mul(83492791));

    out.push(ContactData {
        position,
        normal: pen.normal,
        depth: pen.depth,
        feature_id,
    });
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    fn contacts_for(shape_a: &Shape, pose_a: Pose, shape_b: &Shape, pose_b: Pose) -> Vec<ContactData> {
        let mut out = Vec::new();
        generate_contacts(shape_a, &pose_a, shape_b, &pose_b, &mut out);
        out
    }

    #[test]
    fn test_sphere_sphere_overlap() {
        let s = Shape::Sphere { radius: 1.0 };
        let contacts = contacts_for(
            &s,
            Pose::from_position(Vec3::ZERO),
            &s,
            Pose::from_position(Vec3::new(1.5, 0.0, 0.0)),
        );
        assert_eq!(contacts.len(), 1);
        assert!((contacts[0].depth - 0.5).abs() < 1e-5);
        assert!(contacts[0].normal.x > 0.99, "normal points A->B");
    }

    #[test]
    fn test_sphere_sphere_separated() {
        let s = Shape::Sphere { radius: 1.0 };
        let contacts = contacts_for(
            &s,
            Pose::from_position(Vec3::ZERO),
            &s,
            Pose::from_position(Vec3::new(3.0, 0.0, 0.0)),
        );
        assert!(contacts.is_empty());
    }

    #[test]
    fn test_box_on_floor_four_points() {
        let cube = Shape::Box {
            half_extents: Vec3::splat(0.5),
        };
        let floor = Shape::HalfSpace {
            normal: Vec3::Y,
            offset: 0.0,
        };
        // Cube resting slightly below the surface.
        let contacts = contacts_for(
            &cube,
            Pose::from_position(Vec3::new(0.0, 0.45, 0.0)),
            &floor,
            Pose::IDENTITY,
        );
        assert_eq!(contacts.len(), 4, "resting cube needs a full face manifold");
        for c in &contacts {
            assert!((c.depth - 0.05).abs() < 1e-5);
            assert!(c.normal.y < -0.99, "contact normal points into the floor");
        }
        // Distinct feature ids so warm starting can match them next frame.
        let mut ids: Vec<u32> = contacts.iter().map(|c| c.feature_id).collect();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_sphere_above_floor_no_contact() {
        let sphere = Shape::Sphere { radius: 0.5 };
        let floor = Shape::HalfSpace {
            normal: Vec3::Y,
            offset: 0.0,
        };
        let contacts = contacts_for(
            &sphere,
            Pose::from_position(Vec3::new(0.0, 1.0, 0.0)),
            &floor,
            Pose::IDENTITY,
        );
        assert!(contacts.is_empty());
    }

    #[test]
    fn test_halfspace_as_first_shape_flips_normal() {
        let sphere = Shape::Sphere { radius: 0.5 };
        let floor = Shape::HalfSpace {
            normal: Vec3::Y,
            offset: 0.0,
        };
        let contacts = contacts_for(
            &floor,
            Pose::IDENTITY,
            &sphere,
            Pose::from_position(Vec3::new(0.0, 0.4, 0.0)),
        );
        assert_eq!(contacts.len(), 1);
        // A = floor, B = sphere: normal must point up toward the sphere.
        assert!(contacts[0].normal.y > 0.99);
    }

    #[test]
    fn test_box_box_stacked_face_manifold() {
        let cube = Shape::Box {
            half_extents: Vec3::splat(0.5),
        };
        // Upper cube overlapping the lower by 0.1.
        let contacts = contacts_for(
            &cube,
            Pose::from_position(Vec3::ZERO),
            &cube,
            Pose::from_position(Vec3::new(0.0, 0.9, 0.0)),
        );
        assert_eq!(contacts.len(), 4, "aligned stack should clip to 4 points");
        for c in &contacts {
            assert!((c.depth - 0.1).abs() < 1e-4, "depth = {}", c.depth);
            assert!(c.normal.y > 0.99, "normal points from lower to upper cube");
        }
    }

    #[test]
    fn test_box_box_separated() {
        let cube = Shape::Box {
            half_extents: Vec3::splat(0.5),
        };
        let contacts = contacts_for(
            &cube,
            Pose::from_position(Vec3::ZERO),
            &cube,
            Pose::from_position(Vec3::new(2.0, 0.0, 0.0)),
        );
        assert!(contacts.is_empty());
    }

    #[test]
    fn test_box_box_rotated_yields_contacts() {
        let cube = Shape::Box {
            half_extents: Vec3::splat(0.5),
        };
        let contacts = contacts_for(
            &cube,
            Pose::from_position(Vec3::ZERO),
            &cube,
            Pose::new(
                Vec3::new(0.0, 0.95, 0.0),
                Quat::from_rotation_y(0.3),
            ),
        );
        assert!(!contacts.is_empty());
        for c in &contacts {
            assert!(c.normal.y > 0.9);
            assert!(c.depth > 0.0);
        }
    }

    #[test]
    fn test_sphere_box_face_contact() {
        let sphere = Shape::Sphere { radius: 0.5 };
        let cube = Shape::Box {
            half_extents: Vec3::splat(1.0),
        };
        // Sphere pressed onto the top face of the box.
        let contacts = contacts_for(
            &sphere,
            Pose::from_position(Vec3::new(0.0, 1.4, 0.0)),
            &cube,
            Pose::IDENTITY,
        );
        assert_eq!(contacts.len(), 1);
        assert!((contacts[0].depth - 0.1).abs() < 1e-5);
        // Normal from sphere into the box: downward.
        assert!(contacts[0].normal.y < -0.99);
    }

    #[test]
    fn test_sphere_capsule_contact() {
        let sphere = Shape::Sphere { radius: 0.5 };
        let capsule = Shape::Capsule {
            radius: 0.5,
            half_height: 1.0,
        };
        let contacts = contacts_for(
            &sphere,
            Pose::from_position(Vec3::new(0.9, 0.5, 0.0)),
            &capsule,
            Pose::IDENTITY,
        );
        assert_eq!(contacts.len(), 1);
        assert!((contacts[0].depth - 0.1).abs() < 1e-5);
        assert!(contacts[0].normal.x < -0.99, "normal points toward capsule axis");
    }

    #[test]
    fn test_capsule_floor_two_points_when_lying() {
        let capsule = Shape::Capsule {
            radius: 0.5,
            half_height: 1.0,
        };
        let floor = Shape::HalfSpace {
            normal: Vec3::Y,
            offset: 0.0,
        };
        // Lying on its side (axis along X), slightly sunk.
        let contacts = contacts_for(
            &capsule,
            Pose::new(
                Vec3::new(0.0, 0.45, 0.0),
                Quat::from_rotation_z(core::f32::consts::FRAC_PI_2),
            ),
            &floor,
            Pose::IDENTITY,
        );
        assert_eq!(contacts.len(), 2, "both caps should touch");
    }

    #[test]
    fn test_cylinder_gjk_fallback_vs_box() {
        let cylinder = Shape::Cylinder {
            radius: 0.5,
            half_height: 0.5,
        };
        let cube = Shape::Box {
            half_extents: Vec3::splat(0.5),
        };
        let contacts = contacts_for(
            &cylinder,
            Pose::from_position(Vec3::new(0.0, 0.8, 0.0)),
            &cube,
            Pose::IDENTITY,
        );
        assert!(!contacts.is_empty(), "overlapping shapes must produce a contact");
        assert!(contacts[0].depth > 0.0);
    }
}
