//! 2D Vector and Transform Math
//!
//! Small `f32` linear algebra for the physics pipeline: [`Vec2`], [`Rot`]
//! (a cached sine/cosine pair), [`Transform`], the motion [`Sweep`] used by
//! continuous collision, and axis-aligned boxes ([`Aabb`]).
//!
//! Determinism note: the engine guarantees deterministic *ordering of
//! effects*, not bit-identical floats across platforms, so plain `f32` is
//! used throughout.

use core::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

/// Square root shim that works without `std`.
#[inline]
pub(crate) fn sqrt(x: f32) -> f32 {
    #[cfg(feature = "std")]
    {
        x.sqrt()
    }
    #[cfg(all(not(feature = "std"), feature = "libm"))]
    {
        libm::sqrtf(x)
    }
}

/// Sine/cosine shim that works without `std`.
#[inline]
pub(crate) fn sin_cos(x: f32) -> (f32, f32) {
    #[cfg(feature = "std")]
    {
        x.sin_cos()
    }
    #[cfg(all(not(feature = "std"), feature = "libm"))]
    {
        (libm::sinf(x), libm::cosf(x))
    }
}

/// Absolute value without relying on the `std`-only `f32::abs`.
#[inline]
pub(crate) fn abs(x: f32) -> f32 {
    f32::from_bits(x.to_bits() & 0x7fff_ffff)
}

/// Clamp `x` into `[lo, hi]`.
#[inline]
pub(crate) fn clamp(x: f32, lo: f32, hi: f32) -> f32 {
    x.max(lo).min(hi)
}

// ============================================================================
// Vec2
// ============================================================================

/// 2D vector with `f32` components.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct Vec2 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
}

impl Vec2 {
    /// Zero vector (0, 0)
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };
    /// Unit X vector (1, 0)
    pub const UNIT_X: Self = Self { x: 1.0, y: 0.0 };
    /// Unit Y vector (0, 1)
    pub const UNIT_Y: Self = Self { x: 0.0, y: 1.0 };

    /// Create a new vector
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Dot product
    #[inline]
    #[must_use]
    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y
    }

    /// 2D cross product (returns the scalar z component)
    #[inline]
    #[must_use]
    pub fn cross(self, rhs: Self) -> f32 {
        self.x * rhs.y - self.y * rhs.x
    }

    /// Squared length
    #[inline]
    #[must_use]
    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    /// Length
    #[inline]
    #[must_use]
    pub fn length(self) -> f32 {
        sqrt(self.length_squared())
    }

    /// Normalize, returning the zero vector for near-zero input.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len < f32::EPSILON {
            Self::ZERO
        } else {
            self * (1.0 / len)
        }
    }

    /// Counter-clockwise perpendicular: (-y, x)
    #[inline]
    #[must_use]
    pub fn perp(self) -> Self {
        Self::new(-self.y, self.x)
    }

    /// Component-wise absolute value
    #[inline]
    #[must_use]
    pub fn abs(self) -> Self {
        Self::new(abs(self.x), abs(self.y))
    }

    /// Component-wise minimum
    #[inline]
    #[must_use]
    pub fn min(self, rhs: Self) -> Self {
        Self::new(self.x.min(rhs.x), self.y.min(rhs.y))
    }

    /// Component-wise maximum
    #[inline]
    #[must_use]
    pub fn max(self, rhs: Self) -> Self {
        Self::new(self.x.max(rhs.x), self.y.max(rhs.y))
    }

    /// All components finite
    #[inline]
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Vec2 {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl SubAssign for Vec2 {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl Mul<Vec2> for f32 {
    type Output = Vec2;
    #[inline]
    fn mul(self, rhs: Vec2) -> Vec2 {
        rhs * self
    }
}

impl Div<f32> for Vec2 {
    type Output = Self;
    #[inline]
    fn div(self, rhs: f32) -> Self {
        Self::new(self.x / rhs, self.y / rhs)
    }
}

impl Neg for Vec2 {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

/// Cross product of a scalar and a vector: `s × v = (-s·vy, s·vx)`
#[inline]
#[must_use]
pub fn cross_sv(s: f32, v: Vec2) -> Vec2 {
    Vec2::new(-s * v.y, s * v.x)
}

/// Cross product of a vector and a scalar: `v × s = (s·vy, -s·vx)`
#[inline]
#[must_use]
pub fn cross_vs(v: Vec2, s: f32) -> Vec2 {
    Vec2::new(s * v.y, -s * v.x)
}

// ============================================================================
// Rot — rotation as a sine/cosine pair
// ============================================================================

/// 2D rotation stored as `(sin, cos)` so transforms never re-evaluate
/// trigonometric functions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rot {
    /// sin(angle)
    pub s: f32,
    /// cos(angle)
    pub c: f32,
}

impl Rot {
    /// Identity rotation
    pub const IDENTITY: Self = Self { s: 0.0, c: 1.0 };

    /// Create from an angle in radians
    #[inline]
    #[must_use]
    pub fn new(angle: f32) -> Self {
        let (s, c) = sin_cos(angle);
        Self { s, c }
    }

    /// Rotate a vector
    #[inline]
    #[must_use]
    pub fn apply(self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x - self.s * v.y, self.s * v.x + self.c * v.y)
    }

    /// Inverse-rotate a vector
    #[inline]
    #[must_use]
    pub fn apply_t(self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x + self.s * v.y, -self.s * v.x + self.c * v.y)
    }
}

impl Default for Rot {
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

// ============================================================================
// Transform
// ============================================================================

/// Rigid transform: rotation followed by translation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// Translation
    pub p: Vec2,
    /// Rotation
    pub q: Rot,
}

impl Transform {
    /// Identity transform
    pub const IDENTITY: Self = Self {
        p: Vec2::ZERO,
        q: Rot::IDENTITY,
    };

    /// Create from position and angle
    #[inline]
    #[must_use]
    pub fn new(p: Vec2, angle: f32) -> Self {
        Self {
            p,
            q: Rot::new(angle),
        }
    }

    /// Transform a local point into world space
    #[inline]
    #[must_use]
    pub fn apply(self, v: Vec2) -> Vec2 {
        self.q.apply(v) + self.p
    }

    /// Transform a world point into local space
    #[inline]
    #[must_use]
    pub fn apply_t(self, v: Vec2) -> Vec2 {
        self.q.apply_t(v - self.p)
    }
}

impl Default for Transform {
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

// ============================================================================
// Sweep — motion of a body over one step, for TOI
// ============================================================================

/// Describes the motion of a body's center of mass and angle over a step.
/// Positions are stored for `t0` (`c0`, `a0`) and `t1` (`c`, `a`);
/// `alpha0` is the normalized time the `t0` state corresponds to, advanced
/// by TOI sub-stepping.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Sweep {
    /// Local center of mass offset
    pub local_center: Vec2,
    /// Center of mass at the start of the (remaining) step
    pub c0: Vec2,
    /// Center of mass at the end of the step
    pub c: Vec2,
    /// Angle at the start of the (remaining) step
    pub a0: f32,
    /// Angle at the end of the step
    pub a: f32,
    /// Fraction of the step already consumed by TOI advancement
    pub alpha0: f32,
}

impl Sweep {
    /// Interpolated transform at normalized time `beta` within `[alpha0, 1]`.
    #[must_use]
    pub fn transform_at(&self, beta: f32) -> Transform {
        let p = self.c0 * (1.0 - beta) + self.c * beta;
        let angle = self.a0 * (1.0 - beta) + self.a * beta;
        let q = Rot::new(angle);
        // Shift from center of mass back to body origin.
        Transform {
            p: p - q.apply(self.local_center),
            q,
        }
    }

    /// Advance the `t0` state to time `alpha`, keeping the `t1` state.
    pub fn advance(&mut self, alpha: f32) {
        debug_assert!(self.alpha0 < 1.0);
        let beta = (alpha - self.alpha0) / (1.0 - self.alpha0);
        self.c0 += (self.c - self.c0) * beta;
        self.a0 += (self.a - self.a0) * beta;
        self.alpha0 = alpha;
    }
}

// ============================================================================
// Aabb
// ============================================================================

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    /// Lower corner
    pub lower: Vec2,
    /// Upper corner
    pub upper: Vec2,
}

impl Aabb {
    /// Create from corners
    #[inline]
    #[must_use]
    pub const fn new(lower: Vec2, upper: Vec2) -> Self {
        Self { lower, upper }
    }

    /// Box center
    #[inline]
    #[must_use]
    pub fn center(&self) -> Vec2 {
        (self.lower + self.upper) * 0.5
    }

    /// Half extents
    #[inline]
    #[must_use]
    pub fn extents(&self) -> Vec2 {
        (self.upper - self.lower) * 0.5
    }

    /// Perimeter (the 2D analogue of surface area, used as the tree cost metric)
    #[inline]
    #[must_use]
    pub fn perimeter(&self) -> f32 {
        let d = self.upper - self.lower;
        2.0 * (d.x + d.y)
    }

    /// Union of two boxes
    #[inline]
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            lower: self.lower.min(other.lower),
            upper: self.upper.max(other.upper),
        }
    }

    /// Whether `other` fits entirely inside `self`
    #[inline]
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.lower.x <= other.lower.x
            && self.lower.y <= other.lower.y
            && other.upper.x <= self.upper.x
            && other.upper.y <= self.upper.y
    }

    /// Whether two boxes overlap
    #[inline]
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        other.lower.x <= self.upper.x
            && other.lower.y <= self.upper.y
            && self.lower.x <= other.upper.x
            && self.lower.y <= other.upper.y
    }

    /// Grow the box by `margin` in every direction
    #[inline]
    #[must_use]
    pub fn fattened(&self, margin: f32) -> Self {
        let m = Vec2::new(margin, margin);
        Self {
            lower: self.lower - m,
            upper: self.upper + m,
        }
    }
}

// ============================================================================
// Ray casting input/output
// ============================================================================

/// Ray cast input: the ray extends from `p1` to `p1 + max_fraction * (p2 - p1)`.
#[derive(Clone, Copy, Debug)]
pub struct RayCastInput {
    /// Ray start
    pub p1: Vec2,
    /// Ray end (at fraction 1)
    pub p2: Vec2,
    /// Clip fraction in `(0, 1]`
    pub max_fraction: f32,
}

/// Ray cast hit: point is `p1 + fraction * (p2 - p1)`.
#[derive(Clone, Copy, Debug)]
pub struct RayCastOutput {
    /// Surface normal at the hit
    pub normal: Vec2,
    /// Hit fraction along the ray
    pub fraction: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec2_ops() {
        let a = Vec2::new(1.0, 2.0);
        let b = Vec2::new(3.0, -1.0);
        assert_eq!(a + b, Vec2::new(4.0, 1.0));
        assert_eq!(a.dot(b), 1.0);
        assert_eq!(a.cross(b), -7.0);
        assert_eq!((a * 2.0).length_squared(), 20.0);
        assert_eq!(a.perp().dot(a), 0.0);
    }

    #[test]
    fn rot_roundtrip() {
        let q = Rot::new(0.7);
        let v = Vec2::new(2.0, -3.0);
        let w = q.apply_t(q.apply(v));
        assert!((w - v).length() < 1e-5);
    }

    #[test]
    fn transform_roundtrip() {
        let xf = Transform::new(Vec2::new(5.0, -2.0), 1.2);
        let v = Vec2::new(0.5, 0.25);
        let w = xf.apply_t(xf.apply(v));
        assert!((w - v).length() < 1e-5);
    }

    #[test]
    fn sweep_advance() {
        let mut sweep = Sweep {
            c0: Vec2::ZERO,
            c: Vec2::new(10.0, 0.0),
            ..Sweep::default()
        };
        sweep.advance(0.5);
        assert!((sweep.c0.x - 5.0).abs() < 1e-6);
        assert_eq!(sweep.alpha0, 0.5);
        // t1 state untouched
        assert_eq!(sweep.c.x, 10.0);
    }

    #[test]
    fn aabb_union_contains() {
        let a = Aabb::new(Vec2::ZERO, Vec2::new(1.0, 1.0));
        let b = Aabb::new(Vec2::new(2.0, 2.0), Vec2::new(3.0, 3.0));
        let u = a.union(&b);
        assert!(u.contains(&a) && u.contains(&b));
        assert!(!a.overlaps(&b));
        assert!(a.fattened(1.5).overlaps(&b));
    }
}
