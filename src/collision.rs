//! Convex Collision Detection using GJK and EPA
//!
//! - **GJK (Gilbert-Johnson-Keerthi)** determines whether two convex support
//!   mappings intersect and hands the terminating simplex to EPA.
//! - **EPA (Expanding Polytope Algorithm)** computes penetration depth and
//!   the contact normal for intersecting shapes.
//!
//! Both run with hard iteration caps; non-convergence falls back to the last
//! best answer rather than spinning.

use glam::Vec3;

use crate::shape::SupportMap;

/// Minkowski difference support function
#[inline]
fn minkowski_support<A: SupportMap, B: SupportMap>(a: &A, b: &B, direction: Vec3) -> Vec3 {
    a.support(direction) - b.support(-direction)
}

/// Simplex for GJK (up to 4 points in 3D)
#[derive(Clone, Debug)]
struct Simplex {
    points: [Vec3; 4],
    size: usize,
}

impl Simplex {
    fn new() -> Self {
        Self {
            points: [Vec3::ZERO; 4],
            size: 0,
        }
    }

    fn push(&mut self, point: Vec3) {
        for i in (1..4).rev() {
            self.points[i] = self.points[i - 1];
        }
        self.points[0] = point;
        self.size = (self.size + 1).min(4);
    }

    fn set(&mut self, points: &[Vec3]) {
        for (i, &p) in points.iter().enumerate().take(4) {
            self.points[i] = p;
        }
        self.size = points.len().min(4);
    }
}

/// GJK result: intersection flag plus the terminating simplex (seed for EPA).
#[derive(Clone, Copy, Debug)]
pub struct GjkResult {
    /// Whether the two shapes are intersecting
    pub colliding: bool,
    /// Terminating simplex vertices (valid entries: `simplex_size`)
    pub simplex: [Vec3; 4],
    /// Number of valid simplex vertices
    pub simplex_size: usize,
}

/// GJK intersection test for two support mappings.
pub fn gjk<A: SupportMap, B: SupportMap>(a: &A, b: &B) -> GjkResult {
    const MAX_ITERATIONS: usize = 64;

    let mut direction = Vec3::X;
    let mut simplex = Simplex::new();
    simplex.push(minkowski_support(a, b, direction));
    direction = -simplex.points[0];

    for _ in 0..MAX_ITERATIONS {
        if direction.length_squared() < 1.0e-12 {
            // Origin lies on the simplex boundary: treat as touching.
            return GjkResult {
                colliding: true,
                simplex: simplex.points,
                simplex_size: simplex.size,
            };
        }

        let new_point = minkowski_support(a, b, direction);

        if new_point.dot(direction) < 0.0 {
            // The support point never crossed the origin: shapes are apart.
            return GjkResult {
                colliding: false,
                simplex: simplex.points,
                simplex_size: simplex.size,
            };
        }

        simplex.push(new_point);

        if do_simplex(&mut simplex, &mut direction) {
            return GjkResult {
                colliding: true,
                simplex: simplex.points,
                simplex_size: simplex.size,
            };
        }
    }

    GjkResult {
        colliding: false,
        simplex: simplex.points,
        simplex_size: simplex.size,
    }
}

/// Process simplex and update direction toward origin.
/// Returns true once the simplex encloses the origin.
fn do_simplex(simplex: &mut Simplex, direction: &mut Vec3) -> bool {
    match simplex.size {
        2 => do_simplex_line(simplex, direction),
        3 => do_simplex_triangle(simplex, direction),
        4 => do_simplex_tetrahedron(simplex, direction),
        _ => false,
    }
}

fn do_simplex_line(simplex: &mut Simplex, direction: &mut Vec3) -> bool {
    let a = simplex.points[0];
    let b = simplex.points[1];
    let ab = b - a;
    let ao = -a;

    if ab.dot(ao) > 0.0 {
        *direction = ab.cross(ao).cross(ab);
    } else {
        simplex.set(&[a]);
        *direction = ao;
    }

    false
}

fn do_simplex_triangle(simplex: &mut Simplex, direction: &mut Vec3) -> bool {
    let a = simplex.points[0];
    let b = simplex.points[1];
    let c = simplex.points[2];

    let ab = b - a;
    let ac = c - a;
    let ao = -a;
    let abc = ab.cross(ac);

    if abc.cross(ac).dot(ao) > 0.0 {
        if ac.dot(ao) > 0.0 {
            simplex.set(&[a, c]);
            *direction = ac.cross(ao).cross(ac);
        } else {
            simplex.set(&[a, b]);
            return do_simplex_line(simplex, direction);
        }
    } else if ab.cross(abc).dot(ao) > 0.0 {
        simplex.set(&[a, b]);
        return do_simplex_line(simplex, direction);
    } else if abc.dot(ao) > 0.0 {
        *direction = abc;
    } else {
        simplex.set(&[a, c, b]);
        *direction = -abc;
    }

    false
}

fn do_simplex_tetrahedron(simplex: &mut Simplex, direction: &mut Vec3) -> bool {
    let a = simplex.points[0];
    let b = simplex.points[1];
    let c = simplex.points[2];
    let d = simplex.points[3];

    let ab = b - a;
    let ac = c - a;
    let ad = d - a;
    let ao = -a;

    let abc = ab.cross(ac);
    let acd = ac.cross(ad);
    let adb = ad.cross(ab);

    if abc.dot(ao) > 0.0 {
        simplex.set(&[a, b, c]);
        return do_simplex_triangle(simplex, direction);
    }

    if acd.dot(ao) > 0.0 {
        simplex.set(&[a, c, d]);
        return do_simplex_triangle(simplex, direction);
    }

    if adb.dot(ao) > 0.0 {
        simplex.set(&[a, d, b]);
        return do_simplex_triangle(simplex, direction);
    }

    true
}

// ============================================================================
// EPA (Expanding Polytope Algorithm)
// ============================================================================

/// Penetration info from EPA.
#[derive(Clone, Copy, Debug)]
pub struct Penetration {
    /// Penetration depth (positive when overlapping)
    pub depth: f32,
    /// Contact normal pointing from shape A toward shape B
    pub normal: Vec3,
    /// Deepest point of A, world space
    pub point_a: Vec3,
    /// Deepest point of B, world space
    pub point_b: Vec3,
}

/// EPA face (triangle)
#[derive(Clone, Copy, Debug)]
struct EpaFace {
    indices: [usize; 3],
    normal: Vec3,
    distance: f32,
}

/// EPA penetration query. Call after [`gjk`] reports a collision with a full
/// tetrahedron simplex; degenerate simplices are inflated first.
pub fn epa<A: SupportMap, B: SupportMap>(
    a: &A,
    b: &B,
    gjk_result: &GjkResult,
) -> Option<Penetration> {
    const MAX_ITERATIONS: usize = 48;
    const EPSILON: f32 = 1.0e-4;

    let mut vertices: Vec<Vec3> =
        gjk_result.simplex[..gjk_result.simplex_size].to_vec();

    // Inflate a sub-tetrahedron simplex by probing the axis directions.
    if vertices.len() < 4 {
        for dir in [
            Vec3::X,
            Vec3::NEG_X,
            Vec3::Y,
            Vec3::NEG_Y,
            Vec3::Z,
            Vec3::NEG_Z,
        ] {
            let p = minkowski_support(a, b, dir);
            if !vertices.iter().any(|v| v.distance_squared(p) < 1.0e-10) {
                vertices.push(p);
            }
            if vertices.len() >= 4 {
                break;
            }
        }
        if vertices.len() < 4 {
            return None;
        }
    }

    let mut faces: Vec<EpaFace> = Vec::with_capacity(64);
    add_face(&mut faces, &vertices, 0, 1, 2);
    add_face(&mut faces, &vertices, 0, 3, 1);
    add_face(&mut faces, &vertices, 0, 2, 3);
    add_face(&mut faces, &vertices, 1, 3, 2);

    for _ in 0..MAX_ITERATIONS {
        let closest_face = *faces
            .iter()
            .min_by(|x, y| x.distance.total_cmp(&y.distance))?;

        let support = minkowski_support(a, b, closest_face.normal);
        let distance = support.dot(closest_face.normal);

        if distance - closest_face.distance < EPSILON {
            // Converged: the closest face gives depth and normal. For the
            // difference A - B the outward face normal already points from
            // A toward B (separating A means translating it against it).
            return Some(Penetration {
                depth: closest_face.distance,
                normal: closest_face.normal,
                point_a: a.support(closest_face.normal),
                point_b: b.support(-closest_face.normal),
            });
        }

        let new_idx = vertices.len();
        vertices.push(support);

        // Remove faces visible from the new vertex and stitch the hole.
        let mut edges: Vec<(usize, usize)> = Vec::new();
        faces.retain(|face| {
            let v = vertices[face.indices[0]];
            if face.normal.dot(support - v) > 0.0 {
                for i in 0..3 {
                    let edge = (face.indices[i], face.indices[(i + 1) % 3]);
                    if let Some(pos) = edges.iter().position(|&e| e == (edge.1, edge.0)) {
                        edges.remove(pos);
                    } else {
                        edges.push(edge);
                    }
                }
                false
            } else {
                true
            }
        });

        for (i, j) in edges {
            add_face(&mut faces, &vertices, i, j, new_idx);
        }

        if faces.is_empty() {
            return None;
        }
    }

    // Iteration cap hit: report the best face found so far.
    let closest_face = *faces
        .iter()
        .min_by(|x, y| x.distance.total_cmp(&y.distance))?;
    Some(Penetration {
        depth: closest_face.distance,
        normal: closest_face.normal,
        point_a: a.support(closest_face.normal),
        point_b: b.support(-closest_face.normal),
    })
}

fn add_face(faces: &mut Vec<EpaFace>, vertices: &[Vec3], i: usize, j: usize, k: usize) {
    let a = vertices[i];
    let b = vertices[j];
    let c = vertices[k];

    let normal = (b - a).cross(c - a);
    let len = normal.length();
    if len < 1.0e-10 {
        return; // degenerate sliver
    }
    let normal = normal / len;

    // Ensure the face normal points away from the origin.
    let distance = a.dot(normal);
    let (normal, distance) = if distance < 0.0 {
        (-normal, -distance)
    } else {
        (normal, distance)
    };

    faces.push(EpaFace {
        indices: [i, j, k],
        normal,
        distance,
    });
}

// ============================================================================
// Tests
// ============================================================================
