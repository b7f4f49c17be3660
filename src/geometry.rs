//! Geometric primitives used by the checkers
//!
//! Thin helpers over nalgebra: rigid transforms in a serializable form,
//! triangle soups, and the handful of intersection/distance queries the
//! osteotomy and obstacle checks need. Mesh-wide queries take a
//! cancellation token and poll it between triangle batches.

use crate::error::{QcError, QcResultOf};
use nalgebra::{Isometry3, Point3, Vector3};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Tolerance for parallel ray detection and degenerate segments
pub const EPSILON: f64 = 1e-9;

/// Triangles processed between two cancellation polls
const CANCEL_POLL_INTERVAL: usize = 256;

/// Rigid transformation in a plain-data form.
///
/// `rotation` is a scaled axis (axis * angle in radians), `translation`
/// is applied after the rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct RigidTransform {
    #[serde(default)]
    pub rotation: [f64; 3],
    #[serde(default)]
    pub translation: [f64; 3],
}

impl RigidTransform {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self {
            rotation: [0.0; 3],
            translation: [x, y, z],
        }
    }

    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::new(
            Vector3::from(self.translation),
            Vector3::from(self.rotation),
        )
    }
}

impl From<Isometry3<f64>> for RigidTransform {
    fn from(iso: Isometry3<f64>) -> Self {
        let axis = iso.rotation.scaled_axis();
        let t = iso.translation.vector;
        Self {
            rotation: [axis.x, axis.y, axis.z],
            translation: [t.x, t.y, t.z],
        }
    }
}

/// Indexed triangle soup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3<f64>>,
    pub triangles: Vec<[u32; 3]>,
}

impl TriangleMesh {
    pub fn new(vertices: Vec<Point3<f64>>, triangles: Vec<[u32; 3]>) -> Self {
        Self {
            vertices,
            triangles,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Resolve triangle `i` to its three corner points.
    pub fn triangle(&self, i: usize) -> QcResultOf<[Point3<f64>; 3]> {
        let tri = self
            .triangles
            .get(i)
            .ok_or_else(|| QcError::InvalidGeometry(format!("triangle {} out of range", i)))?;
        let mut corners = [Point3::origin(); 3];
        for (slot, &idx) in corners.iter_mut().zip(tri.iter()) {
            *slot = *self.vertices.get(idx as usize).ok_or_else(|| {
                QcError::InvalidGeometry(format!(
                    "vertex index {} out of range ({} vertices)",
                    idx,
                    self.vertices.len()
                ))
            })?;
        }
        Ok(corners)
    }

    pub fn transformed(&self, iso: &Isometry3<f64>) -> Self {
        Self {
            vertices: self.vertices.iter().map(|v| iso * v).collect(),
            triangles: self.triangles.clone(),
        }
    }
}

/// Line segment between two points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: Point3<f64>,
    pub end: Point3<f64>,
}

impl Segment {
    pub fn new(start: Point3<f64>, end: Point3<f64>) -> Self {
        Self { start, end }
    }

    pub fn length(&self) -> f64 {
        (self.end - self.start).norm()
    }

    /// Extend the segment beyond `end` by `amount` along its own direction.
    pub fn extended(&self, amount: f64) -> Self {
        let dir = self.end - self.start;
        let len = dir.norm();
        if len < EPSILON || amount == 0.0 {
            return *self;
        }
        Self {
            start: self.start,
            end: self.end + dir / len * amount,
        }
    }

    pub fn transformed(&self, iso: &Isometry3<f64>) -> Self {
        Self {
            start: iso * self.start,
            end: iso * self.end,
        }
    }
}

/// Ray-triangle intersection using Möller-Trumbore algorithm.
///
/// Returns `Some(t)` with the hit at `origin + t * direction`, `t > epsilon`.
pub fn ray_triangle_intersect(
    origin: &Point3<f64>,
    direction: &Vector3<f64>,
    v0: &Point3<f64>,
    v1: &Point3<f64>,
    v2: &Point3<f64>,
    epsilon: f64,
) -> Option<f64> {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    let h = direction.cross(&edge2);
    let a = edge1.dot(&h);

    // Ray is parallel to triangle
    if a.abs() < epsilon {
        return None;
    }

    let f = 1.0 / a;
    let s = origin - v0;
    let u = f * s.dot(&h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(&edge1);
    let v = f * direction.dot(&q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(&q);
    if t > epsilon {
        Some(t)
    } else {
        None
    }
}

/// Whether a segment crosses a triangle
pub fn segment_triangle_intersect(segment: &Segment, tri: &[Point3<f64>; 3]) -> bool {
    let direction = segment.end - segment.start;
    if direction.norm() < EPSILON {
        return false;
    }
    // Parameter is relative to the full segment, so t in (0, 1] is a hit
    ray_triangle_intersect(&segment.start, &direction, &tri[0], &tri[1], &tri[2], EPSILON)
        .is_some_and(|t| t <= 1.0)
}

/// Whether a segment crosses an infinite plane (touching counts)
pub fn segment_plane_intersect(
    segment: &Segment,
    origin: &Point3<f64>,
    normal: &Vector3<f64>,
) -> bool {
    let d0 = (segment.start - origin).dot(normal);
    let d1 = (segment.end - origin).dot(normal);
    d0 * d1 <= 0.0
}

/// Closest point on a triangle to `p` (Ericson, Real-Time Collision Detection 5.1.5)
pub fn closest_point_on_triangle(p: &Point3<f64>, tri: &[Point3<f64>; 3]) -> Point3<f64> {
    let [a, b, c] = tri;
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return *a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return *b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return *c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

/// Minimum distance between two segments
pub fn segment_segment_distance(s1: &Segment, s2: &Segment) -> f64 {
    let d1 = s1.end - s1.start;
    let d2 = s2.end - s2.start;
    let r = s1.start - s2.start;
    let a = d1.dot(&d1);
    let e = d2.dot(&d2);
    let f = d2.dot(&r);

    let (s, t) = if a <= EPSILON && e <= EPSILON {
        (0.0, 0.0)
    } else if a <= EPSILON {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(&r);
        if e <= EPSILON {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(&d2);
            let denom = a * e - b * b;
            let mut s = if denom > EPSILON {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };

    let c1 = s1.start + d1 * s;
    let c2 = s2.start + d2 * t;
    (c1 - c2).norm()
}

/// Minimum distance between a segment and a triangle, 0 when they cross
pub fn segment_triangle_distance(segment: &Segment, tri: &[Point3<f64>; 3]) -> f64 {
    if segment_triangle_intersect(segment, tri) {
        return 0.0;
    }
    let mut best = (segment.start - closest_point_on_triangle(&segment.start, tri)).norm();
    best = best.min((segment.end - closest_point_on_triangle(&segment.end, tri)).norm());
    for (i, j) in [(0, 1), (1, 2), (2, 0)] {
        let edge = Segment::new(tri[i], tri[j]);
        best = best.min(segment_segment_distance(segment, &edge));
    }
    best
}

fn poll(cancel: &CancellationToken, i: usize) -> QcResultOf<()> {
    if i % CANCEL_POLL_INTERVAL == 0 && cancel.is_cancelled() {
        return Err(QcError::Cancelled);
    }
    Ok(())
}

/// Whether a segment crosses any triangle of the mesh
pub fn segment_mesh_intersect(
    segment: &Segment,
    mesh: &TriangleMesh,
    cancel: &CancellationToken,
) -> QcResultOf<bool> {
    for i in 0..mesh.triangles.len() {
        poll(cancel, i)?;
        if segment_triangle_intersect(segment, &mesh.triangle(i)?) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Minimum distance between a segment and a mesh; `None` for an empty mesh
pub fn segment_mesh_distance(
    segment: &Segment,
    mesh: &TriangleMesh,
    cancel: &CancellationToken,
) -> QcResultOf<Option<f64>> {
    let mut best: Option<f64> = None;
    for i in 0..mesh.triangles.len() {
        poll(cancel, i)?;
        let d = segment_triangle_distance(segment, &mesh.triangle(i)?);
        if d == 0.0 {
            return Ok(Some(0.0));
        }
        best = Some(best.map_or(d, |b| b.min(d)));
    }
    Ok(best)
}
