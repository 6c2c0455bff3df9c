//! World Configuration
//!
//! Per-world tuning knobs and the per-step parameter block handed to the
//! solver stages. Global constants that are not meant to vary per world
//! live in [`crate::settings`].

use crate::math::Vec2;

/// Per-world configuration.
#[derive(Clone, Copy, Debug)]
pub struct WorldConfig {
    /// Gravity applied to dynamic bodies each step
    pub gravity: Vec2,
    /// Whether bodies may fall asleep
    pub allow_sleeping: bool,
    /// Whether the TOI sub-step pass runs after the discrete solve
    pub continuous: bool,
    /// Whether contact impulses are warm-started from the previous step
    pub warm_starting: bool,
    /// Whether accumulated forces are zeroed at the end of each step
    pub auto_clear_forces: bool,
    /// Number of worker lanes used by the parallel phases. The simulation
    /// result is identical for any value >= 1.
    pub workers: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vec2::new(0.0, -9.81),
            allow_sleeping: true,
            continuous: true,
            warm_starting: true,
            auto_clear_forces: true,
            workers: 1,
        }
    }
}

/// Parameters of one solver step, derived from the frame dt.
#[derive(Clone, Copy, Debug)]
pub struct TimeStep {
    /// Step duration, seconds
    pub dt: f32,
    /// 1/dt, or zero for a zero-length step
    pub inv_dt: f32,
    /// dt divided by the previous step's dt; scales warm-start impulses
    /// when the frame rate changes
    pub dt_ratio: f32,
    /// Sequential impulse iterations over contact velocities
    pub velocity_iterations: usize,
    /// Position correction iterations
    pub position_iterations: usize,
    /// Whether impulses carry over from the previous step
    pub warm_starting: bool,
}

impl TimeStep {
    #[must_use]
    pub fn new(
        dt: f32,
        inv_dt0: f32,
        velocity_iterations: usize,
        position_iterations: usize,
        warm_starting: bool,
    ) -> Self {
        let inv_dt = if dt > 0.0 { 1.0 / dt } else { 0.0 };
        Self {
            dt,
            inv_dt,
            dt_ratio: inv_dt0 * dt,
            velocity_iterations,
            position_iterations,
            warm_starting,
        }
    }
}
