//! Time of Impact
//!
//! Conservative advancement between two moving shapes. The query walks
//! forward along the pair's sweeps, at each step measuring the core
//! separation with GJK and advancing by the largest time slice that
//! provably cannot close the remaining gap. It terminates when the shapes
//! come within the target separation (a hit), when the motion cannot reach
//! the target (separated), or when the iteration limit runs out.
//!
//! Times are normalized: `0.0` is the sweeps' `alpha0` state and `1.0` the
//! end of the step.

use crate::math::{abs, Sweep, Vec2};
use crate::narrow::{core_distance, total_radius};
use crate::settings::{LINEAR_SLOP, TOI_MAX_ITERATIONS, TOI_TARGET_SLOP};
use crate::shapes::Shape;

/// Input sweeps must share the same `alpha0`.
pub(crate) struct ToiInput<'a> {
    pub shape_a: &'a Shape,
    pub shape_b: &'a Shape,
    pub sweep_a: Sweep,
    pub sweep_b: Sweep,
    /// Latest normalized time of interest
    pub t_max: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ToiState {
    /// Shapes already overlap at the start of the interval
    Overlapped,
    /// Shapes reach the target separation at `t`
    Touching,
    /// Shapes never come within the target separation before `t_max`
    Separated,
    /// Iteration limit hit; `t` is a safe lower bound
    Failed,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct ToiOutput {
    pub state: ToiState,
    pub t: f32,
    pub iterations: u32,
}

/// Farthest point of the shape from the body's center of mass. Bounds the
/// speed a rotation can impart to any point on the shape.
fn rotation_radius(shape: &Shape, local_center: Vec2) -> f32 {
    match shape {
        Shape::Circle { center, radius } => (*center - local_center).length() + radius,
        Shape::Polygon(poly) => {
            let mut max = 0.0f32;
            for &v in &poly.verts {
                max = max.max((v - local_center).length());
            }
            max
        }
    }
}

pub(crate) fn time_of_impact(input: &ToiInput<'_>) -> ToiOutput {
    let sweep_a = input.sweep_a;
    let sweep_b = input.sweep_b;

    // Keep the hit separation a bit above the slop the position solver
    // tolerates, so TOI results do not immediately re-trigger.
    let total = total_radius(input.shape_a, input.shape_b);
    let target = LINEAR_SLOP.max(total - TOI_TARGET_SLOP);
    let tolerance = 0.25 * LINEAR_SLOP;
    debug_assert!(target > tolerance);

    // Per-unit-time motion bounds.
    let rel = (sweep_b.c - sweep_b.c0) - (sweep_a.c - sweep_a.c0);
    let omega_a = abs(sweep_a.a - sweep_a.a0);
    let omega_b = abs(sweep_b.a - sweep_b.a0);
    let r_a = rotation_radius(input.shape_a, sweep_a.local_center);
    let r_b = rotation_radius(input.shape_b, sweep_b.local_center);

    let mut t = 0.0f32;
    let mut iterations = 0u32;

    loop {
        let xf_a = sweep_a.transform_at(t);
        let xf_b = sweep_b.transform_at(t);
        let out = core_distance(input.shape_a, &xf_a, input.shape_b, &xf_b);

        if out.distance <= 0.0 {
            // Deep overlap; let the discrete solver push them apart.
            return ToiOutput {
                state: ToiState::Overlapped,
                t,
                iterations,
            };
        }
        if out.distance < target + tolerance {
            return ToiOutput {
                state: ToiState::Touching,
                t,
                iterations,
            };
        }

        let normal = (out.point_b - out.point_a) / out.distance;
        let bound = abs(rel.dot(normal)) + omega_a * r_a + omega_b * r_b;
        if bound <= f32::EPSILON {
            return ToiOutput {
                state: ToiState::Separated,
                t: input.t_max,
                iterations,
            };
        }

        t += (out.distance - target) / bound;
        if t >= input.t_max {
            return ToiOutput {
                state: ToiState::Separated,
                t: input.t_max,
                iterations,
            };
        }

        iterations += 1;
        if iterations as usize == TOI_MAX_ITERATIONS {
            return ToiOutput {
                state: ToiState::Failed,
                t,
                iterations,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Rot;

    fn linear_sweep(from: Vec2, to: Vec2) -> Sweep {
        Sweep {
            local_center: Vec2::ZERO,
            c0: from,
            c: to,
            a0: 0.0,
            a: 0.0,
            alpha0: 0.0,
        }
    }

    #[test]
    fn head_on_circles_hit_midway() {
        let a = Shape::circle(0.5);
        let b = Shape::circle(0.5);
        let input = ToiInput {
            shape_a: &a,
            shape_b: &b,
            sweep_a: linear_sweep(Vec2::new(-2.0, 0.0), Vec2::new(2.0, 0.0)),
            sweep_b: linear_sweep(Vec2::new(2.0, 0.0), Vec2::new(-2.0, 0.0)),
            t_max: 1.0,
        };
        let out = time_of_impact(&input);
        assert_eq!(out.state, ToiState::Touching);
        // Centers close at 8 units per step from a 4 unit gap; surfaces
        // meet when 1 unit of radius remains, so just past t = 3/8.
        assert!(out.t > 0.3 && out.t < 0.45, "t = {}", out.t);
    }

    #[test]
    fn bullet_through_thin_wall_is_caught() {
        let bullet = Shape::circle(0.1);
        let wall = Shape::rect(0.05, 2.0);
        let input = ToiInput {
            shape_a: &bullet,
            shape_b: &wall,
            sweep_a: linear_sweep(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0)),
            sweep_b: linear_sweep(Vec2::ZERO, Vec2::ZERO),
            t_max: 1.0,
        };
        let out = time_of_impact(&input);
        // Start and end positions straddle the wall; only a TOI query can
        // see the crossing.
        assert_eq!(out.state, ToiState::Touching);
        assert!(out.t > 0.3 && out.t < 0.5, "t = {}", out.t);
    }

    #[test]
    fn diverging_shapes_are_separated() {
        let a = Shape::circle(0.5);
        let b = Shape::circle(0.5);
        let input = ToiInput {
            shape_a: &a,
            shape_b: &b,
            sweep_a: linear_sweep(Vec2::new(-2.0, 0.0), Vec2::new(-4.0, 0.0)),
            sweep_b: linear_sweep(Vec2::new(2.0, 0.0), Vec2::new(4.0, 0.0)),
            t_max: 1.0,
        };
        let out = time_of_impact(&input);
        assert_eq!(out.state, ToiState::Separated);
    }

    #[test]
    fn initial_overlap_reports_overlapped() {
        let a = Shape::circle(0.5);
        let b = Shape::circle(0.5);
        let input = ToiInput {
            shape_a: &a,
            shape_b: &b,
            sweep_a: linear_sweep(Vec2::new(-0.25, 0.0), Vec2::new(0.0, 0.0)),
            sweep_b: linear_sweep(Vec2::new(0.25, 0.0), Vec2::new(0.0, 0.0)),
            t_max: 1.0,
        };
        let out = time_of_impact(&input);
        assert_eq!(out.state, ToiState::Overlapped);
        assert_eq!(out.t, 0.0);
    }

    #[test]
    fn rotation_contributes_to_the_motion_bound() {
        // A spinning bar with no translation still sweeps space; the bound
        // must account for it rather than reporting separation.
        let bar = Shape::rect(1.5, 0.05);
        let ball = Shape::circle(0.2);
        let input = ToiInput {
            shape_a: &bar,
            shape_b: &ball,
            sweep_a: Sweep {
                local_center: Vec2::ZERO,
                c0: Vec2::ZERO,
                c: Vec2::ZERO,
                a0: 0.0,
                a: core::f32::consts::FRAC_PI_2,
                alpha0: 0.0,
            },
            sweep_b: linear_sweep(Vec2::new(0.0, 1.0), Vec2::new(0.0, 1.0)),
            t_max: 1.0,
        };
        let out = time_of_impact(&input);
        assert_eq!(out.state, ToiState::Touching);
        assert!(out.t > 0.0 && out.t < 1.0, "t = {}", out.t);
    }
}
