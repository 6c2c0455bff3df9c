//! Joints
//!
//! Constraints that connect two bodies. Joints participate in island
//! construction (a joint merges its bodies' islands) and are solved by the
//! same sequential-impulse iterations as contacts, on the island's local
//! position/velocity arrays.

use crate::arena::Arena;
use crate::body::{Body, BodyHandle};
use crate::config::TimeStep;
use crate::island::{Position, Velocity};
use crate::math::{cross_sv, Rot, Vec2};
use crate::settings::{LINEAR_SLOP, MAX_LINEAR_CORRECTION};

/// Joint type enumeration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JointType {
    Distance,
}

/// Blueprint for [`crate::world::World::create_distance_joint`].
#[derive(Clone, Copy, Debug)]
pub struct DistanceJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    /// Anchor in body A's local space
    pub local_anchor_a: Vec2,
    /// Anchor in body B's local space
    pub local_anchor_b: Vec2,
    /// Rest length between the anchors
    pub length: f32,
    /// Whether the connected bodies may still generate contacts
    pub collide_connected: bool,
}

/// Rigid distance constraint: keeps two anchor points a fixed length apart.
#[derive(Clone, Copy, Debug)]
pub struct DistanceJoint {
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub length: f32,

    // Solver scratch, valid between init and the end of the island solve.
    impulse: f32,
    index_a: usize,
    index_b: usize,
    u: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    inv_mass_a: f32,
    inv_mass_b: f32,
    inv_inertia_a: f32,
    inv_inertia_b: f32,
    local_center_a: Vec2,
    local_center_b: Vec2,
    mass: f32,
}

/// A joint between two bodies.
#[derive(Clone, Copy, Debug)]
pub struct Joint {
    pub(crate) body_a: BodyHandle,
    pub(crate) body_b: BodyHandle,
    pub(crate) collide_connected: bool,
    pub(crate) island_flag: bool,
    kind: JointKind,
}

#[derive(Clone, Copy, Debug)]
enum JointKind {
    Distance(DistanceJoint),
}

impl Joint {
    pub(crate) fn distance(def: &DistanceJointDef) -> Self {
        Self {
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            island_flag: false,
            kind: JointKind::Distance(DistanceJoint {
                local_anchor_a: def.local_anchor_a,
                local_anchor_b: def.local_anchor_b,
                length: def.length,
                impulse: 0.0,
                index_a: 0,
                index_b: 0,
                u: Vec2::ZERO,
                r_a: Vec2::ZERO,
                r_b: Vec2::ZERO,
                inv_mass_a: 0.0,
                inv_mass_b: 0.0,
                inv_inertia_a: 0.0,
                inv_inertia_b: 0.0,
                local_center_a: Vec2::ZERO,
                local_center_b: Vec2::ZERO,
                mass: 0.0,
            }),
        }
    }

    #[inline]
    #[must_use]
    pub fn joint_type(&self) -> JointType {
        match self.kind {
            JointKind::Distance(_) => JointType::Distance,
        }
    }

    #[inline]
    #[must_use]
    pub fn bodies(&self) -> (BodyHandle, BodyHandle) {
        (self.body_a, self.body_b)
    }

    #[inline]
    #[must_use]
    pub fn collide_connected(&self) -> bool {
        self.collide_connected
    }

    #[inline]
    pub(crate) fn connects(&self, a: BodyHandle, b: BodyHandle) -> bool {
        (self.body_a == a && self.body_b == b) || (self.body_a == b && self.body_b == a)
    }

    /// Capture body data and warm-start on the island's solver arrays.
    pub(crate) fn init_velocity_constraints(
        &mut self,
        step: &TimeStep,
        bodies: &Arena<Body>,
        positions: &[Position],
        velocities: &mut [Velocity],
    ) {
        match &mut self.kind {
            JointKind::Distance(joint) => {
                let (Some(body_a), Some(body_b)) =
                    (bodies.get(self.body_a), bodies.get(self.body_b))
                else {
                    return;
                };
                joint.index_a = body_a.island_index as usize;
                joint.index_b = body_b.island_index as usize;
                joint.inv_mass_a = body_a.inv_mass;
                joint.inv_mass_b = body_b.inv_mass;
                joint.inv_inertia_a = body_a.inv_inertia;
                joint.inv_inertia_b = body_b.inv_inertia;
                joint.local_center_a = body_a.sweep.local_center;
                joint.local_center_b = body_b.sweep.local_center;

                let pos_a = positions[joint.index_a];
                let pos_b = positions[joint.index_b];
                let q_a = Rot::new(pos_a.a);
                let q_b = Rot::new(pos_b.a);
                joint.r_a = q_a.apply(joint.local_anchor_a - joint.local_center_a);
                joint.r_b = q_b.apply(joint.local_anchor_b - joint.local_center_b);
                let d = pos_b.c + joint.r_b - pos_a.c - joint.r_a;

                let length = d.length();
                joint.u = if length > LINEAR_SLOP {
                    d / length
                } else {
                    Vec2::ZERO
                };

                let cr_a = joint.r_a.cross(joint.u);
                let cr_b = joint.r_b.cross(joint.u);
                let inv_mass = joint.inv_mass_a
                    + joint.inv_inertia_a * cr_a * cr_a
                    + joint.inv_mass_b
                    + joint.inv_inertia_b * cr_b * cr_b;
                joint.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

                if step.warm_starting {
                    joint.impulse *= step.dt_ratio;
                    let p = joint.impulse * joint.u;
                    velocities[joint.index_a].v -= joint.inv_mass_a * p;
                    velocities[joint.index_a].w -= joint.inv_inertia_a * joint.r_a.cross(p);
                    velocities[joint.index_b].v += joint.inv_mass_b * p;
                    velocities[joint.index_b].w += joint.inv_inertia_b * joint.r_b.cross(p);
                } else {
                    joint.impulse = 0.0;
                }
            }
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, velocities: &mut [Velocity]) {
        match &mut self.kind {
            JointKind::Distance(joint) => {
                let vel_a = velocities[joint.index_a];
                let vel_b = velocities[joint.index_b];

                let vp_a = vel_a.v + cross_sv(vel_a.w, joint.r_a);
                let vp_b = vel_b.v + cross_sv(vel_b.w, joint.r_b);
                let c_dot = joint.u.dot(vp_b - vp_a);

                let impulse = -joint.mass * c_dot;
                joint.impulse += impulse;

                let p = impulse * joint.u;
                velocities[joint.index_a].v -= joint.inv_mass_a * p;
                velocities[joint.index_a].w -= joint.inv_inertia_a * joint.r_a.cross(p);
                velocities[joint.index_b].v += joint.inv_mass_b * p;
                velocities[joint.index_b].w += joint.inv_inertia_b * joint.r_b.cross(p);
            }
        }
    }

    /// Returns true when the position error is within tolerance.
    pub(crate) fn solve_position_constraints(&mut self, positions: &mut [Position]) -> bool {
        match &mut self.kind {
            JointKind::Distance(joint) => {
                let pos_a = positions[joint.index_a];
                let pos_b = positions[joint.index_b];
                let q_a = Rot::new(pos_a.a);
                let q_b = Rot::new(pos_b.a);
                let r_a = q_a.apply(joint.local_anchor_a - joint.local_center_a);
                let r_b = q_b.apply(joint.local_anchor_b - joint.local_center_b);
                let d = pos_b.c + r_b - pos_a.c - r_a;

                let length = d.length();
                if length < LINEAR_SLOP {
                    return true;
                }
                let u = d / length;
                let c = crate::math::clamp(
                    length - joint.length,
                    -MAX_LINEAR_CORRECTION,
                    MAX_LINEAR_CORRECTION,
                );

                let impulse = -joint.mass * c;
                let p = impulse * u;

                positions[joint.index_a].c -= joint.inv_mass_a * p;
                positions[joint.index_a].a -= joint.inv_inertia_a * r_a.cross(p);
                positions[joint.index_b].c += joint.inv_mass_b * p;
                positions[joint.index_b].a += joint.inv_inertia_b * r_b.cross(p);

                crate::math::abs(c) < LINEAR_SLOP
            }
        }
    }
}
