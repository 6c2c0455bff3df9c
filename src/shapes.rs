//! Collision Shapes
//!
//! Minimal shape collaborator for the pipeline: circles and convex polygons.
//! Shapes are immutable value types owned by fixtures; the pipeline only
//! needs bounding boxes, mass properties, and GJK support points from them.

use crate::math::{sqrt, Aabb, RayCastInput, RayCastOutput, Transform, Vec2};
use crate::settings::{LINEAR_SLOP, MAX_POLYGON_VERTICES};

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Skin radius of polygon shapes. Keeps polygon cores slightly apart so
/// the distance/TOI iteration never has to operate at zero separation.
pub const POLYGON_RADIUS: f32 = 2.0 * LINEAR_SLOP;

/// Mass properties computed from a shape and a density.
#[derive(Clone, Copy, Debug, Default)]
pub struct MassData {
    /// Mass, kg
    pub mass: f32,
    /// Center of mass in shape-local coordinates
    pub center: Vec2,
    /// Rotational inertia about the shape origin, kg·m²
    pub inertia: f32,
}

/// Convex polygon with up to [`MAX_POLYGON_VERTICES`] counter-clockwise
/// vertices.
#[derive(Clone, Debug)]
pub struct Polygon {
    /// Vertices in local coordinates, CCW
    pub verts: Vec<Vec2>,
    /// Outward edge normals, `normals[i]` belongs to edge `verts[i] → verts[i+1]`
    pub normals: Vec<Vec2>,
    /// Area centroid in local coordinates
    pub centroid: Vec2,
}

/// A collision shape.
#[derive(Clone, Debug)]
pub enum Shape {
    /// Circle with a local-space center offset
    Circle {
        /// Center in shape-local coordinates
        center: Vec2,
        /// Radius, meters
        radius: f32,
    },
    /// Convex polygon
    Polygon(Polygon),
}

impl Shape {
    /// Circle centered on the body origin.
    #[must_use]
    pub fn circle(radius: f32) -> Self {
        Self::Circle {
            center: Vec2::ZERO,
            radius,
        }
    }

    /// Axis-aligned box of the given half extents, centered on the origin.
    #[must_use]
    pub fn rect(half_width: f32, half_height: f32) -> Self {
        let verts = [
            Vec2::new(-half_width, -half_height),
            Vec2::new(half_width, -half_height),
            Vec2::new(half_width, half_height),
            Vec2::new(-half_width, half_height),
        ];
        Self::polygon(&verts)
    }

    /// Convex polygon from CCW vertices.
    ///
    /// The caller is responsible for convexity and winding; this is a
    /// programmer-error precondition, checked in debug builds.
    #[must_use]
    pub fn polygon(vertices: &[Vec2]) -> Self {
        debug_assert!(vertices.len() >= 3);
        debug_assert!(vertices.len() <= MAX_POLYGON_VERTICES);
        let n = vertices.len();
        let mut normals = Vec::with_capacity(n);
        for i in 0..n {
            let edge = vertices[(i + 1) % n] - vertices[i];
            debug_assert!(edge.length_squared() > f32::EPSILON * f32::EPSILON);
            normals.push(Vec2::new(edge.y, -edge.x).normalize());
        }
        let centroid = polygon_centroid(vertices);
        Self::Polygon(Polygon {
            verts: vertices.to_vec(),
            normals,
            centroid,
        })
    }

    /// Skin radius of the shape.
    #[inline]
    #[must_use]
    pub fn radius(&self) -> f32 {
        match self {
            Self::Circle { radius, .. } => *radius,
            Self::Polygon(_) => POLYGON_RADIUS,
        }
    }

    /// Tight world-space AABB under `xf`.
    #[must_use]
    pub fn compute_aabb(&self, xf: &Transform) -> Aabb {
        match self {
            Self::Circle { center, radius } => {
                let p = xf.apply(*center);
                let r = Vec2::new(*radius, *radius);
                Aabb::new(p - r, p + r)
            }
            Self::Polygon(poly) => {
                let mut lower = xf.apply(poly.verts[0]);
                let mut upper = lower;
                for v in &poly.verts[1..] {
                    let p = xf.apply(*v);
                    lower = lower.min(p);
                    upper = upper.max(p);
                }
                let r = Vec2::new(POLYGON_RADIUS, POLYGON_RADIUS);
                Aabb::new(lower - r, upper + r)
            }
        }
    }

    /// Mass, centroid, and inertia for the given density (kg/m²).
    #[must_use]
    pub fn compute_mass(&self, density: f32) -> MassData {
        match self {
            Self::Circle { center, radius } => {
                let r2 = radius * radius;
                let mass = density * core::f32::consts::PI * r2;
                MassData {
                    mass,
                    center: *center,
                    // Disc inertia about its center, shifted to the origin.
                    inertia: mass * (0.5 * r2 + center.length_squared()),
                }
            }
            Self::Polygon(poly) => polygon_mass(poly, density),
        }
    }

    /// Cast a segment against the shape under `xf`. Returns `None` when the
    /// segment misses or starts inside.
    #[must_use]
    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        match self {
            Self::Circle { center, radius } => {
                // Solve |p1 + t*d - c| = r as a quadratic in t.
                let position = xf.apply(*center);
                let s = input.p1 - position;
                let b = s.length_squared() - radius * radius;

                let d = input.p2 - input.p1;
                let c = s.dot(d);
                let rr = d.length_squared();
                let sigma = c * c - rr * b;
                if sigma < 0.0 || rr < f32::EPSILON {
                    return None;
                }
                let t = -(c + sqrt(sigma));
                if 0.0 <= t && t <= input.max_fraction * rr {
                    let fraction = t / rr;
                    Some(RayCastOutput {
                        normal: (s + fraction * d).normalize(),
                        fraction,
                    })
                } else {
                    None
                }
            }
            Self::Polygon(poly) => {
                // Clip the segment against every edge half-plane, tracking
                // the entering edge.
                let p1 = xf.apply_t(input.p1);
                let p2 = xf.apply_t(input.p2);
                let d = p2 - p1;

                let mut lower = 0.0f32;
                let mut upper = input.max_fraction;
                let mut index = None;

                for i in 0..poly.verts.len() {
                    let numerator = poly.normals[i].dot(poly.verts[i] - p1);
                    let denominator = poly.normals[i].dot(d);

                    if denominator == 0.0 {
                        if numerator < 0.0 {
                            return None;
                        }
                    } else {
                        let t = numerator / denominator;
                        if denominator < 0.0 && t > lower {
                            lower = t;
                            index = Some(i);
                        } else if denominator > 0.0 && t < upper {
                            upper = t;
                        }
                    }
                    if upper < lower {
                        return None;
                    }
                }

                let i = index?;
                debug_assert!(0.0 <= lower && lower <= input.max_fraction);
                Some(RayCastOutput {
                    normal: xf.q.apply(poly.normals[i]),
                    fraction: lower,
                })
            }
        }
    }

    /// GJK support point: the local vertex furthest along `d`.
    ///
    /// Returns the *core* point; the skin [`Shape::radius`] is applied by
    /// the distance routine.
    #[must_use]
    pub fn support(&self, d: Vec2) -> Vec2 {
        match self {
            Self::Circle { center, .. } => *center,
            Self::Polygon(poly) => {
                let mut best = poly.verts[0];
                let mut best_dot = best.dot(d);
                for v in &poly.verts[1..] {
                    let dot = v.dot(d);
                    if dot > best_dot {
                        best_dot = dot;
                        best = *v;
                    }
                }
                best
            }
        }
    }
}

fn polygon_centroid(verts: &[Vec2]) -> Vec2 {
    // Triangle fan from the first vertex, area-weighted.
    let mut c = Vec2::ZERO;
    let mut area = 0.0;
    let origin = verts[0];
    for i in 1..verts.len() - 1 {
        let e1 = verts[i] - origin;
        let e2 = verts[i + 1] - origin;
        let a = 0.5 * e1.cross(e2);
        area += a;
        c += (e1 + e2) * (a / 3.0);
    }
    debug_assert!(area > f32::EPSILON, "degenerate polygon");
    origin + c / area
}

fn polygon_mass(poly: &Polygon, density: f32) -> MassData {
    let mut center = Vec2::ZERO;
    let mut area = 0.0;
    let mut inertia = 0.0;
    let origin = poly.verts[0];

    for i in 1..poly.verts.len() - 1 {
        let e1 = poly.verts[i] - origin;
        let e2 = poly.verts[i + 1] - origin;
        let d = e1.cross(e2);
        let tri_area = 0.5 * d;
        area += tri_area;
        center += (e1 + e2) * (tri_area / 3.0);

        let intx2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
        let inty2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
        inertia += (0.25 / 3.0) * d * (intx2 + inty2);
    }

    let mass = density * area;
    center = origin + center / area;
    // Parallel axis: inertia above is about `origin`; report about the
    // shape origin through the centroid.
    let inertia = density * inertia + mass * (center.length_squared() - (center - origin).length_squared());
    MassData {
        mass,
        center,
        inertia,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Transform;

    #[test]
    fn circle_aabb() {
        let shape = Shape::circle(2.0);
        let xf = Transform::new(Vec2::new(10.0, -1.0), 0.0);
        let aabb = shape.compute_aabb(&xf);
        assert_eq!(aabb.lower, Vec2::new(8.0, -3.0));
        assert_eq!(aabb.upper, Vec2::new(12.0, 1.0));
    }

    #[test]
    fn rect_winding_and_normals() {
        let Shape::Polygon(poly) = Shape::rect(1.0, 0.5) else {
            panic!("rect must be a polygon");
        };
        assert_eq!(poly.verts.len(), 4);
        // Bottom edge normal points down.
        assert!((poly.normals[0] - Vec2::new(0.0, -1.0)).length() < 1e-6);
        // Right edge normal points right.
        assert!((poly.normals[1] - Vec2::new(1.0, 0.0)).length() < 1e-6);
        assert!(poly.centroid.length() < 1e-6);
    }

    #[test]
    fn box_mass_matches_closed_form() {
        let shape = Shape::rect(1.0, 2.0); // 2 x 4 box
        let md = shape.compute_mass(3.0);
        assert!((md.mass - 24.0).abs() < 1e-3); // rho * w * h
        assert!(md.center.length() < 1e-4);
        // I = m/12 * (w^2 + h^2)
        let expected = 24.0 / 12.0 * (4.0 + 16.0);
        assert!((md.inertia - expected).abs() < 0.05 * expected);
    }

    #[test]
    fn circle_mass() {
        let shape = Shape::circle(2.0);
        let md = shape.compute_mass(1.0);
        let expected_mass = core::f32::consts::PI * 4.0;
        assert!((md.mass - expected_mass).abs() < 1e-3);
        assert!((md.inertia - expected_mass * 2.0).abs() < 1e-2);
    }

    #[test]
    fn polygon_support() {
        let shape = Shape::rect(1.0, 1.0);
        let s = shape.support(Vec2::new(1.0, 1.0));
        assert_eq!(s, Vec2::new(1.0, 1.0));
        let s = shape.support(Vec2::new(-1.0, 0.1));
        assert_eq!(s, Vec2::new(-1.0, 1.0));
    }
}
