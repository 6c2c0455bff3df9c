//! Narrow Phase
//!
//! Manifold generation for circle/circle, polygon/circle, and
//! polygon/polygon pairs, plus the GJK distance query used by continuous
//! collision. Manifolds are stored in the local frame of the reference
//! shape so warm-start impulses survive body motion; [`WorldManifold`]
//! re-expresses them in world space for the solver.

use crate::math::{cross_sv, cross_vs, Transform, Vec2};
use crate::settings::{LINEAR_SLOP, MAX_MANIFOLD_POINTS, MAX_POLYGON_VERTICES};
use crate::shapes::{Polygon, Shape, POLYGON_RADIUS};

// ============================================================================
// Contact features
// ============================================================================

const FEATURE_VERTEX: u8 = 0;
const FEATURE_FACE: u8 = 1;

/// Identifies which shape features produced a manifold point. Stable across
/// steps while the contact configuration persists, which is what lets the
/// solver match warm-start impulses to reappearing points.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ContactFeature {
    pub index_a: u8,
    pub index_b: u8,
    pub type_a: u8,
    pub type_b: u8,
}

impl ContactFeature {
    #[inline]
    #[must_use]
    pub fn key(self) -> u32 {
        u32::from_le_bytes([self.index_a, self.index_b, self.type_a, self.type_b])
    }

    #[inline]
    #[must_use]
    fn flipped(self) -> Self {
        Self {
            index_a: self.index_b,
            index_b: self.index_a,
            type_a: self.type_b,
            type_b: self.type_a,
        }
    }
}

// ============================================================================
// Manifold
// ============================================================================

/// How the manifold's `local_normal` and `local_point` are interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManifoldKind {
    /// Point-to-point; `local_point` is circle A's center
    Circles,
    /// Face of shape A against shape B
    FaceA,
    /// Face of shape B against shape A
    FaceB,
}

/// One contact point. `local_point` lives in the frame of the non-reference
/// shape (shape B for `FaceA`, shape A for `FaceB`, shape B for `Circles`).
#[derive(Clone, Copy, Debug, Default)]
pub struct ManifoldPoint {
    pub local_point: Vec2,
    /// Warm-start impulse along the normal
    pub normal_impulse: f32,
    /// Warm-start impulse along the tangent
    pub tangent_impulse: f32,
    pub id: ContactFeature,
}

/// Contact manifold in reference-shape-local coordinates.
#[derive(Clone, Copy, Debug)]
pub struct Manifold {
    pub kind: ManifoldKind,
    /// Reference normal (face normal, or unused for `Circles`)
    pub local_normal: Vec2,
    /// Reference point (face midpoint, or circle A center)
    pub local_point: Vec2,
    pub points: [ManifoldPoint; MAX_MANIFOLD_POINTS],
    pub count: usize,
}

impl Default for Manifold {
    fn default() -> Self {
        Self {
            kind: ManifoldKind::Circles,
            local_normal: Vec2::ZERO,
            local_point: Vec2::ZERO,
            points: [ManifoldPoint::default(); MAX_MANIFOLD_POINTS],
            count: 0,
        }
    }
}

/// World-space view of a [`Manifold`].
#[derive(Clone, Copy, Debug, Default)]
pub struct WorldManifold {
    pub normal: Vec2,
    pub points: [Vec2; MAX_MANIFOLD_POINTS],
    pub separations: [f32; MAX_MANIFOLD_POINTS],
}

impl WorldManifold {
    /// Expand a local manifold into world-space points midway between the
    /// two shape surfaces.
    #[must_use]
    pub fn evaluate(
        manifold: &Manifold,
        xf_a: &Transform,
        radius_a: f32,
        xf_b: &Transform,
        radius_b: f32,
    ) -> Self {
        let mut out = Self::default();
        if manifold.count == 0 {
            return out;
        }
        match manifold.kind {
            ManifoldKind::Circles => {
                let point_a = xf_a.apply(manifold.local_point);
                let point_b = xf_b.apply(manifold.points[0].local_point);
                let d = point_b - point_a;
                out.normal = if d.length_squared() > f32::EPSILON * f32::EPSILON {
                    d.normalize()
                } else {
                    Vec2::UNIT_X
                };
                let c_a = point_a + radius_a * out.normal;
                let c_b = point_b - radius_b * out.normal;
                out.points[0] = 0.5 * (c_a + c_b);
                out.separations[0] = (c_b - c_a).dot(out.normal);
            }
            ManifoldKind::FaceA => {
                out.normal = xf_a.q.apply(manifold.local_normal);
                let plane_point = xf_a.apply(manifold.local_point);
                for i in 0..manifold.count {
                    let clip = xf_b.apply(manifold.points[i].local_point);
                    let c_a = clip + (radius_a - (clip - plane_point).dot(out.normal)) * out.normal;
                    let c_b = clip - radius_b * out.normal;
                    out.points[i] = 0.5 * (c_a + c_b);
                    out.separations[i] = (c_b - c_a).dot(out.normal);
                }
            }
            ManifoldKind::FaceB => {
                let normal = xf_b.q.apply(manifold.local_normal);
                let plane_point = xf_b.apply(manifold.local_point);
                for i in 0..manifold.count {
                    let clip = xf_a.apply(manifold.points[i].local_point);
                    let c_b = clip + (radius_b - (clip - plane_point).dot(normal)) * normal;
                    let c_a = clip - radius_a * normal;
                    out.points[i] = 0.5 * (c_a + c_b);
                    out.separations[i] = (c_a - c_b).dot(normal);
                }
                // Report the normal as pointing from A to B.
                out.normal = -normal;
            }
        }
        out
    }
}

// ============================================================================
// Pair dispatch
// ============================================================================

/// Compute the manifold for a shape pair. Returns a zero-count manifold
/// when the shapes are separated.
#[must_use]
pub fn collide(shape_a: &Shape, xf_a: &Transform, shape_b: &Shape, xf_b: &Transform) -> Manifold {
    match (shape_a, shape_b) {
        (Shape::Circle { center: ca, radius: ra }, Shape::Circle { center: cb, radius: rb }) => {
            collide_circles(*ca, *ra, xf_a, *cb, *rb, xf_b)
        }
        (Shape::Polygon(poly), Shape::Circle { center, radius }) => {
            collide_polygon_circle(poly, xf_a, *center, *radius, xf_b)
        }
        (Shape::Circle { .. }, Shape::Polygon(_)) => {
            // Normalized by the contact layer: circle-vs-polygon pairs are
            // always stored polygon-first.
            debug_assert!(false, "unnormalized circle/polygon pair");
            Manifold::default()
        }
        (Shape::Polygon(pa), Shape::Polygon(pb)) => collide_polygons(pa, xf_a, pb, xf_b),
    }
}

fn collide_circles(
    center_a: Vec2,
    radius_a: f32,
    xf_a: &Transform,
    center_b: Vec2,
    radius_b: f32,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();
    let p_a = xf_a.apply(center_a);
    let p_b = xf_b.apply(center_b);
    let d = p_b - p_a;
    let r = radius_a + radius_b;
    if d.length_squared() > r * r {
        return manifold;
    }
    manifold.kind = ManifoldKind::Circles;
    manifold.local_point = center_a;
    manifold.points[0].local_point = center_b;
    manifold.points[0].id = ContactFeature::default();
    manifold.count = 1;
    manifold
}

fn collide_polygon_circle(
    poly: &Polygon,
    xf_a: &Transform,
    center: Vec2,
    radius: f32,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    // Circle center in the polygon's frame.
    let c_local = xf_a.apply_t(xf_b.apply(center));
    let total_radius = POLYGON_RADIUS + radius;

    // Edge of maximum separation.
    let n = poly.verts.len();
    let mut separation = -f32::MAX;
    let mut normal_index = 0;
    for i in 0..n {
        let s = poly.normals[i].dot(c_local - poly.verts[i]);
        if s > total_radius {
            return manifold;
        }
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    let v1 = poly.verts[normal_index];
    let v2 = poly.verts[(normal_index + 1) % n];

    manifold.kind = ManifoldKind::FaceA;
    manifold.count = 1;
    manifold.points[0].local_point = center;
    manifold.points[0].id = ContactFeature::default();

    if separation < f32::EPSILON {
        // Center inside the polygon: use the face normal directly.
        manifold.local_normal = poly.normals[normal_index];
        manifold.local_point = 0.5 * (v1 + v2);
        return manifold;
    }

    // Voronoi regions of the face.
    let u1 = (c_local - v1).dot(v2 - v1);
    let u2 = (c_local - v2).dot(v1 - v2);
    if u1 <= 0.0 {
        if (c_local - v1).length_squared() > total_radius * total_radius {
            manifold.count = 0;
            return manifold;
        }
        manifold.local_normal = (c_local - v1).normalize();
        manifold.local_point = v1;
    } else if u2 <= 0.0 {
        if (c_local - v2).length_squared() > total_radius * total_radius {
            manifold.count = 0;
            return manifold;
        }
        manifold.local_normal = (c_local - v2).normalize();
        manifold.local_point = v2;
    } else {
        let face_center = 0.5 * (v1 + v2);
        if (c_local - face_center).dot(poly.normals[normal_index]) > total_radius {
            manifold.count = 0;
            return manifold;
        }
        manifold.local_normal = poly.normals[normal_index];
        manifold.local_point = face_center;
    }
    manifold
}

// ============================================================================
// Polygon vs polygon (SAT + clipping)
// ============================================================================

#[derive(Clone, Copy, Default)]
struct ClipVertex {
    v: Vec2,
    id: ContactFeature,
}

/// Maximum separation of `poly2` from the faces of `poly1`, and the index
/// of the best face.
fn find_max_separation(
    poly1: &Polygon,
    xf1: &Transform,
    poly2: &Polygon,
    xf2: &Transform,
) -> (f32, usize) {
    let mut best_separation = -f32::MAX;
    let mut best_index = 0;
    for (i, (&normal, &vert)) in poly1.normals.iter().zip(poly1.verts.iter()).enumerate() {
        let n = xf1.q.apply(normal);
        let v1 = xf1.apply(vert);
        let mut si = f32::MAX;
        for &v in &poly2.verts {
            si = si.min(n.dot(xf2.apply(v) - v1));
        }
        if si > best_separation {
            best_separation = si;
            best_index = i;
        }
    }
    (best_separation, best_index)
}

/// The edge of `poly2` most anti-parallel to face `edge1` of `poly1`.
fn find_incident_edge(
    poly1: &Polygon,
    edge1: usize,
    xf1: &Transform,
    poly2: &Polygon,
    xf2: &Transform,
) -> [ClipVertex; 2] {
    // Reference normal in poly2's frame.
    let normal1 = xf2.q.apply_t(xf1.q.apply(poly1.normals[edge1]));

    let n2 = poly2.verts.len();
    let mut incident = 0;
    let mut min_dot = f32::MAX;
    for (i, &normal) in poly2.normals.iter().enumerate() {
        let dot = normal1.dot(normal);
        if dot < min_dot {
            min_dot = dot;
            incident = i;
        }
    }

    let i1 = incident;
    let i2 = (incident + 1) % n2;
    [
        ClipVertex {
            v: xf2.apply(poly2.verts[i1]),
            id: ContactFeature {
                index_a: edge1 as u8,
                index_b: i1 as u8,
                type_a: FEATURE_FACE,
                type_b: FEATURE_VERTEX,
            },
        },
        ClipVertex {
            v: xf2.apply(poly2.verts[i2]),
            id: ContactFeature {
                index_a: edge1 as u8,
                index_b: i2 as u8,
                type_a: FEATURE_FACE,
                type_b: FEATURE_VERTEX,
            },
        },
    ]
}

/// Sutherland-Hodgman clip of a two-point segment against a half-plane.
/// Returns `None` unless two points survive.
fn clip_segment(
    input: [ClipVertex; 2],
    normal: Vec2,
    offset: f32,
    vertex_index_a: u8,
) -> Option<[ClipVertex; 2]> {
    let d0 = normal.dot(input[0].v) - offset;
    let d1 = normal.dot(input[1].v) - offset;

    let mut out = [ClipVertex::default(); 2];
    let mut count = 0;
    if d0 <= 0.0 {
        out[count] = input[0];
        count += 1;
    }
    if d1 <= 0.0 {
        out[count] = input[1];
        count += 1;
    }
    if d0 * d1 < 0.0 {
        let t = d0 / (d0 - d1);
        out[count] = ClipVertex {
            v: input[0].v + t * (input[1].v - input[0].v),
            id: ContactFeature {
                index_a: vertex_index_a,
                index_b: input[0].id.index_b,
                type_a: FEATURE_VERTEX,
                type_b: FEATURE_FACE,
            },
        };
        count += 1;
    }
    (count == 2).then_some(out)
}

fn collide_polygons(
    poly_a: &Polygon,
    xf_a: &Transform,
    poly_b: &Polygon,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();
    let total_radius = 2.0 * POLYGON_RADIUS;

    let (separation_a, edge_a) = find_max_separation(poly_a, xf_a, poly_b, xf_b);
    if separation_a > total_radius {
        return manifold;
    }
    let (separation_b, edge_b) = find_max_separation(poly_b, xf_b, poly_a, xf_a);
    if separation_b > total_radius {
        return manifold;
    }

    // Prefer the reference face from the previous step when the two
    // separations are near-equal, so the manifold does not flip-flop.
    let (poly1, xf1, poly2, xf2, edge1, flip) =
        if separation_b > separation_a + 0.1 * LINEAR_SLOP {
            manifold.kind = ManifoldKind::FaceB;
            (poly_b, xf_b, poly_a, xf_a, edge_b, true)
        } else {
            manifold.kind = ManifoldKind::FaceA;
            (poly_a, xf_a, poly_b, xf_b, edge_a, false)
        };

    let incident = find_incident_edge(poly1, edge1, xf1, poly2, xf2);

    let n1 = poly1.verts.len();
    let iv1 = edge1;
    let iv2 = (edge1 + 1) % n1;
    let mut v11 = poly1.verts[iv1];
    let mut v12 = poly1.verts[iv2];

    let local_tangent = (v12 - v11).normalize();
    let local_normal = cross_vs(local_tangent, 1.0);
    let plane_point = 0.5 * (v11 + v12);

    let tangent = xf1.q.apply(local_tangent);
    let normal = cross_vs(tangent, 1.0);

    v11 = xf1.apply(v11);
    v12 = xf1.apply(v12);

    let front_offset = normal.dot(v11);
    let side_offset1 = -tangent.dot(v11) + total_radius;
    let side_offset2 = tangent.dot(v12) + total_radius;

    let Some(clip1) = clip_segment(incident, -tangent, side_offset1, iv1 as u8) else {
        return manifold;
    };
    let Some(clip2) = clip_segment(clip1, tangent, side_offset2, iv2 as u8) else {
        return manifold;
    };

    manifold.local_normal = local_normal;
    manifold.local_point = plane_point;

    let mut count = 0;
    for cv in clip2 {
        if normal.dot(cv.v) - front_offset <= total_radius {
            manifold.points[count] = ManifoldPoint {
                local_point: xf2.apply_t(cv.v),
                normal_impulse: 0.0,
                tangent_impulse: 0.0,
                id: if flip { cv.id.flipped() } else { cv.id },
            };
            count += 1;
        }
    }
    manifold.count = count;
    manifold
}

// ============================================================================
// GJK distance
// ============================================================================

/// Closest points between two shapes. `distance` is between the shape
/// surfaces (skin radii subtracted) and is zero when they overlap.
#[derive(Clone, Copy, Debug)]
pub struct DistanceOutput {
    pub point_a: Vec2,
    pub point_b: Vec2,
    pub distance: f32,
}

struct Proxy<'a> {
    verts: &'a [Vec2],
    circle: [Vec2; 1],
    radius: f32,
}

impl<'a> Proxy<'a> {
    fn new(shape: &'a Shape) -> Self {
        match shape {
            Shape::Circle { center, radius } => Self {
                verts: &[],
                circle: [*center],
                radius: *radius,
            },
            Shape::Polygon(poly) => Self {
                verts: &poly.verts,
                circle: [Vec2::ZERO],
                radius: POLYGON_RADIUS,
            },
        }
    }

    #[inline]
    fn verts(&self) -> &[Vec2] {
        if self.verts.is_empty() {
            &self.circle
        } else {
            self.verts
        }
    }

    fn support(&self, d: Vec2) -> usize {
        let verts = self.verts();
        let mut best = 0;
        let mut best_dot = verts[0].dot(d);
        for (i, v) in verts.iter().enumerate().skip(1) {
            let dot = v.dot(d);
            if dot > best_dot {
                best_dot = dot;
                best = i;
            }
        }
        best
    }
}

#[derive(Clone, Copy, Default)]
struct SimplexVertex {
    w_a: Vec2,
    w_b: Vec2,
    /// w_b - w_a
    w: Vec2,
    /// Barycentric weight
    a: f32,
    index_a: usize,
    index_b: usize,
}

struct Simplex {
    v: [SimplexVertex; 3],
    count: usize,
}

impl Simplex {
    fn search_direction(&self) -> Vec2 {
        match self.count {
            1 => -self.v[0].w,
            2 => {
                let e = self.v[1].w - self.v[0].w;
                let sgn = e.cross(-self.v[0].w);
                if sgn > 0.0 {
                    cross_sv(1.0, e)
                } else {
                    cross_vs(e, 1.0)
                }
            }
            _ => Vec2::ZERO,
        }
    }

    fn closest_point(&self) -> Vec2 {
        match self.count {
            1 => self.v[0].w,
            2 => self.v[0].a * self.v[0].w + self.v[1].a * self.v[1].w,
            _ => Vec2::ZERO,
        }
    }

    fn witness_points(&self) -> (Vec2, Vec2) {
        match self.count {
            1 => (self.v[0].w_a, self.v[0].w_b),
            2 => (
                self.v[0].a * self.v[0].w_a + self.v[1].a * self.v[1].w_a,
                self.v[0].a * self.v[0].w_b + self.v[1].a * self.v[1].w_b,
            ),
            _ => {
                let p = self.v[0].a * self.v[0].w_a
                    + self.v[1].a * self.v[1].w_a
                    + self.v[2].a * self.v[2].w_a;
                (p, p)
            }
        }
    }

    /// Closest point on a segment to the origin.
    fn solve2(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let e = w2 - w1;

        let d12_2 = -w1.dot(e);
        if d12_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }
        let d12_1 = w2.dot(e);
        if d12_1 <= 0.0 {
            self.v[0] = self.v[1];
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }
        let inv = 1.0 / (d12_1 + d12_2);
        self.v[0].a = d12_1 * inv;
        self.v[1].a = d12_2 * inv;
        self.count = 2;
    }

    /// Closest point on a triangle to the origin.
    fn solve3(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let w3 = self.v[2].w;

        let e12 = w2 - w1;
        let d12_1 = w2.dot(e12);
        let d12_2 = -w1.dot(e12);

        let e13 = w3 - w1;
        let d13_1 = w3.dot(e13);
        let d13_2 = -w1.dot(e13);

        let e23 = w3 - w2;
        let d23_1 = w3.dot(e23);
        let d23_2 = -w2.dot(e23);

        let n123 = e12.cross(e13);
        let d123_1 = n123 * w2.cross(w3);
        let d123_2 = n123 * w3.cross(w1);
        let d123_3 = n123 * w1.cross(w2);

        // Vertex regions
        if d12_2 <= 0.0 && d13_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }
        // Edge 12
        if d12_1 > 0.0 && d12_2 > 0.0 && d123_3 <= 0.0 {
            let inv = 1.0 / (d12_1 + d12_2);
            self.v[0].a = d12_1 * inv;
            self.v[1].a = d12_2 * inv;
            self.count = 2;
            return;
        }
        // Edge 13
        if d13_1 > 0.0 && d13_2 > 0.0 && d123_2 <= 0.0 {
            let inv = 1.0 / (d13_1 + d13_2);
            self.v[0].a = d13_1 * inv;
            self.v[2].a = d13_2 * inv;
            self.v[1] = self.v[2];
            self.count = 2;
            return;
        }
        if d12_1 <= 0.0 && d23_2 <= 0.0 {
            self.v[0] = self.v[1];
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }
        if d13_1 <= 0.0 && d23_1 <= 0.0 {
            self.v[0] = self.v[2];
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }
        // Edge 23
        if d23_1 > 0.0 && d23_2 > 0.0 && d123_1 <= 0.0 {
            let inv = 1.0 / (d23_1 + d23_2);
            self.v[1].a = d23_1 * inv;
            self.v[2].a = d23_2 * inv;
            self.v[0] = self.v[2];
            self.count = 2;
            return;
        }
        // Interior
        let inv = 1.0 / (d123_1 + d123_2 + d123_3);
        self.v[0].a = d123_1 * inv;
        self.v[1].a = d123_2 * inv;
        self.v[2].a = d123_3 * inv;
        self.count = 3;
    }
}

/// GJK closest-distance query between two transformed shapes.
#[must_use]
pub fn distance(
    shape_a: &Shape,
    xf_a: &Transform,
    shape_b: &Shape,
    xf_b: &Transform,
) -> DistanceOutput {
    let proxy_a = Proxy::new(shape_a);
    let proxy_b = Proxy::new(shape_b);
    let (mut point_a, mut point_b) = gjk_witness(&proxy_a, xf_a, &proxy_b, xf_b);
    let mut dist = (point_b - point_a).length();

    // Peel off the skin radii, collapsing to the midpoint on overlap.
    let r_a = proxy_a.radius;
    let r_b = proxy_b.radius;
    if dist > r_a + r_b && dist > f32::EPSILON {
        let normal = (point_b - point_a).normalize();
        dist -= r_a + r_b;
        point_a += r_a * normal;
        point_b -= r_b * normal;
    } else {
        let mid = 0.5 * (point_a + point_b);
        point_a = mid;
        point_b = mid;
        dist = 0.0;
    }

    DistanceOutput {
        point_a,
        point_b,
        distance: dist,
    }
}

/// Distance between the shapes' convex cores, skin radii not subtracted.
/// The time-of-impact solver advances against core separation so grazing
/// configurations still leave it a positive gap to work with.
#[must_use]
pub(crate) fn core_distance(
    shape_a: &Shape,
    xf_a: &Transform,
    shape_b: &Shape,
    xf_b: &Transform,
) -> DistanceOutput {
    let proxy_a = Proxy::new(shape_a);
    let proxy_b = Proxy::new(shape_b);
    let (point_a, point_b) = gjk_witness(&proxy_a, xf_a, &proxy_b, xf_b);
    DistanceOutput {
        point_a,
        point_b,
        distance: (point_b - point_a).length(),
    }
}

/// Combined skin radius used by the TOI target separation.
#[must_use]
pub(crate) fn total_radius(shape_a: &Shape, shape_b: &Shape) -> f32 {
    Proxy::new(shape_a).radius + Proxy::new(shape_b).radius
}

fn gjk_witness(
    proxy_a: &Proxy<'_>,
    xf_a: &Transform,
    proxy_b: &Proxy<'_>,
    xf_b: &Transform,
) -> (Vec2, Vec2) {
    let mut simplex = Simplex {
        v: [SimplexVertex::default(); 3],
        count: 1,
    };
    simplex.v[0] = make_vertex(proxy_a, xf_a, 0, proxy_b, xf_b, 0);

    const MAX_GJK_ITERATIONS: usize = 20;
    let mut saved: [(usize, usize); 3] = [(usize::MAX, usize::MAX); 3];

    for _ in 0..MAX_GJK_ITERATIONS {
        for i in 0..simplex.count {
            saved[i] = (simplex.v[i].index_a, simplex.v[i].index_b);
        }
        let saved_count = simplex.count;

        match simplex.count {
            2 => simplex.solve2(),
            3 => simplex.solve3(),
            _ => {}
        }

        // Overlap: origin is inside the Minkowski difference.
        if simplex.count == 3 {
            break;
        }

        let d = simplex.search_direction();
        if d.length_squared() < f32::EPSILON * f32::EPSILON {
            break;
        }

        let index_a = proxy_a.support(xf_a.q.apply_t(-d));
        let index_b = proxy_b.support(xf_b.q.apply_t(d));
        let vertex = make_vertex(proxy_a, xf_a, index_a, proxy_b, xf_b, index_b);

        // Repeated support point means no progress is possible.
        let mut duplicate = false;
        for &(ia, ib) in saved.iter().take(saved_count) {
            if ia == index_a && ib == index_b {
                duplicate = true;
                break;
            }
        }
        if duplicate {
            break;
        }

        simplex.v[simplex.count] = vertex;
        simplex.count += 1;
    }

    simplex.witness_points()
}

fn make_vertex(
    proxy_a: &Proxy<'_>,
    xf_a: &Transform,
    index_a: usize,
    proxy_b: &Proxy<'_>,
    xf_b: &Transform,
    index_b: usize,
) -> SimplexVertex {
    let w_a = xf_a.apply(proxy_a.verts()[index_a]);
    let w_b = xf_b.apply(proxy_b.verts()[index_b]);
    SimplexVertex {
        w_a,
        w_b,
        w: w_b - w_a,
        a: 1.0,
        index_a,
        index_b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Transform;

    fn xf(x: f32, y: f32) -> Transform {
        Transform::new(Vec2::new(x, y), 0.0)
    }

    #[test]
    fn circles_overlapping() {
        let a = Shape::circle(1.0);
        let b = Shape::circle(1.0);
        let m = collide(&a, &xf(0.0, 0.0), &b, &xf(1.5, 0.0));
        assert_eq!(m.count, 1);
        assert_eq!(m.kind, ManifoldKind::Circles);

        let wm = WorldManifold::evaluate(&m, &xf(0.0, 0.0), 1.0, &xf(1.5, 0.0), 1.0);
        assert!((wm.normal - Vec2::UNIT_X).length() < 1e-6);
        assert!((wm.separations[0] - (-0.5)).abs() < 1e-5);
    }

    #[test]
    fn circles_separated() {
        let a = Shape::circle(1.0);
        let b = Shape::circle(1.0);
        let m = collide(&a, &xf(0.0, 0.0), &b, &xf(3.0, 0.0));
        assert_eq!(m.count, 0);
    }

    #[test]
    fn box_on_box_two_points() {
        let a = Shape::rect(1.0, 1.0);
        let b = Shape::rect(1.0, 1.0);
        // b rests on a with slight overlap
        let m = collide(&a, &xf(0.0, 0.0), &b, &xf(0.0, 1.98));
        assert_eq!(m.count, 2, "face contact should produce two points");

        let wm = WorldManifold::evaluate(
            &m,
            &xf(0.0, 0.0),
            POLYGON_RADIUS,
            &xf(0.0, 1.98),
            POLYGON_RADIUS,
        );
        assert!(wm.normal.y > 0.99, "normal should point from a to b");
        assert!(wm.separations[0] < 0.0);
        assert!(wm.separations[1] < 0.0);
    }

    #[test]
    fn box_ids_stable_under_small_motion() {
        let a = Shape::rect(2.0, 0.5);
        let b = Shape::rect(0.5, 0.5);
        let m1 = collide(&a, &xf(0.0, 0.0), &b, &xf(0.1, 0.99));
        let m2 = collide(&a, &xf(0.0, 0.0), &b, &xf(0.12, 0.99));
        assert_eq!(m1.count, 2);
        assert_eq!(m2.count, 2);
        for i in 0..2 {
            assert_eq!(m1.points[i].id.key(), m2.points[i].id.key());
        }
    }

    #[test]
    fn polygon_circle_face_contact() {
        let a = Shape::rect(2.0, 0.5);
        let b = Shape::circle(0.5);
        let m = collide(&a, &xf(0.0, 0.0), &b, &xf(0.0, 0.9));
        assert_eq!(m.count, 1);
        assert_eq!(m.kind, ManifoldKind::FaceA);
        assert!((m.local_normal - Vec2::UNIT_Y).length() < 1e-6);
    }

    #[test]
    fn distance_separated_circles() {
        let a = Shape::circle(1.0);
        let b = Shape::circle(1.0);
        let out = distance(&a, &xf(0.0, 0.0), &b, &xf(5.0, 0.0));
        assert!((out.distance - 3.0).abs() < 1e-4);
        assert!((out.point_a - Vec2::new(1.0, 0.0)).length() < 1e-4);
        assert!((out.point_b - Vec2::new(4.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn distance_boxes() {
        let a = Shape::rect(1.0, 1.0);
        let b = Shape::rect(1.0, 1.0);
        let out = distance(&a, &xf(0.0, 0.0), &b, &xf(4.0, 0.0));
        let expected = 2.0 - 2.0 * POLYGON_RADIUS;
        assert!((out.distance - expected).abs() < 1e-4);
    }

    #[test]
    fn distance_overlap_is_zero() {
        let a = Shape::rect(1.0, 1.0);
        let b = Shape::rect(1.0, 1.0);
        let out = distance(&a, &xf(0.0, 0.0), &b, &xf(0.5, 0.0));
        assert_eq!(out.distance, 0.0);
    }
}
