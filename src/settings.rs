//! Engine Tuning Constants
//!
//! Global epsilons and solver tuning values. These are not meant to be
//! adjusted per world; per-world knobs live in [`crate::config`].

/// Fat AABB margin applied by the spatial index, in meters. Lets proxies
/// jitter without tree churn.
pub const AABB_MARGIN: f32 = 0.1;

/// How much of one step's displacement is folded into the fat AABB so a
/// moving proxy is not re-inserted every step.
pub const AABB_MULTIPLIER: f32 = 4.0;

/// Collision/constraint tolerance: penetrations smaller than this are left
/// alone, keeping contacts warm without jitter.
pub const LINEAR_SLOP: f32 = 0.005;

/// Angular counterpart of [`LINEAR_SLOP`].
pub const ANGULAR_SLOP: f32 = 2.0 / 180.0 * core::f32::consts::PI;

/// Baumgarte factor: fraction of remaining penetration corrected per
/// position iteration.
pub const BAUMGARTE: f32 = 0.2;

/// Baumgarte factor for TOI sub-step position correction.
pub const TOI_BAUMGARTE: f32 = 0.75;

/// Largest positional correction applied in one iteration; prevents
/// overshoot on deep penetrations.
pub const MAX_LINEAR_CORRECTION: f32 = 0.2;

/// Relative approach speed below which restitution is ignored (objects
/// settle instead of micro-bouncing).
pub const VELOCITY_THRESHOLD: f32 = 1.0;

/// Maximum manifold points for a 2D contact.
pub const MAX_MANIFOLD_POINTS: usize = 2;

/// Maximum vertices of a convex polygon shape.
pub const MAX_POLYGON_VERTICES: usize = 8;

/// A small length used by the GJK/TOI iteration as a convergence target.
pub const TOI_TARGET_SLOP: f32 = 3.0 * LINEAR_SLOP;

/// Iteration cap for one conservative-advancement TOI query.
pub const TOI_MAX_ITERATIONS: usize = 20;

/// Cap on TOI sub-steps within one world step.
pub const MAX_TOI_SUBSTEPS: usize = 8;

/// Velocity iterations used by restricted TOI sub-solves.
pub const TOI_VELOCITY_ITERATIONS: usize = 6;

/// Position iterations used by restricted TOI sub-solves.
pub const TOI_POSITION_ITERATIONS: usize = 20;

/// A body sleeps after its velocity stays under the thresholds this long
/// (seconds).
pub const TIME_TO_SLEEP: f32 = 0.5;

/// Linear sleep threshold, m/s.
pub const LINEAR_SLEEP_TOLERANCE: f32 = 0.01;

/// Angular sleep threshold, rad/s.
pub const ANGULAR_SLEEP_TOLERANCE: f32 = 2.0 / 180.0 * core::f32::consts::PI;

/// Hard cap on per-step translation (meters); faster motion is clamped to
/// keep the solver stable. Bullets rely on TOI instead.
pub const MAX_TRANSLATION: f32 = 2.0;

/// Hard cap on per-step rotation (radians).
pub const MAX_ROTATION: f32 = 0.5 * core::f32::consts::PI;
