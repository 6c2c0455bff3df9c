//! Constraint Islands
//!
//! An island is a connected component of awake bodies linked by touching
//! contacts and joints. The world builds islands sequentially (so island
//! membership and ordering are deterministic), each island is *prepared*
//! against the shared arenas, and then `solve` runs on island-local arrays
//! only, which is what lets disjoint islands solve on different workers.
//! The write-back to bodies and contacts happens single-threaded, in island
//! build order.
//!
//! The solver is sequential impulses with warm starting, followed by a
//! Baumgarte position correction pass with an early exit.

use crate::arena::Arena;
use crate::body::{Body, BodyHandle, BodyType, ContactHandle, Fixture, JointHandle};
use crate::callbacks::{ContactImpulse, ContactListener, ContactView};
use crate::config::TimeStep;
use crate::contact::Contact;
use crate::joint::Joint;
use crate::math::{clamp, cross_sv, Rot, Transform, Vec2};
use crate::narrow::{Manifold, ManifoldKind, WorldManifold};
use crate::settings::{
    ANGULAR_SLEEP_TOLERANCE, BAUMGARTE, LINEAR_SLEEP_TOLERANCE, LINEAR_SLOP,
    MAX_LINEAR_CORRECTION, MAX_MANIFOLD_POINTS, MAX_ROTATION, MAX_TRANSLATION, TIME_TO_SLEEP,
    TOI_BAUMGARTE, VELOCITY_THRESHOLD,
};

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Island-local position state: center of mass and angle.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Position {
    pub c: Vec2,
    pub a: f32,
}

/// Island-local velocity state.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Velocity {
    pub v: Vec2,
    pub w: f32,
}

/// Per-body data the sleep bookkeeping needs, captured at prepare time.
#[derive(Clone, Copy, Debug)]
struct BodyData {
    body_type: BodyType,
    allow_sleep: bool,
    sleep_time: f32,
}

// ============================================================================
// Contact solver
// ============================================================================

#[derive(Clone, Copy, Debug, Default)]
struct VelocityPoint {
    r_a: Vec2,
    r_b: Vec2,
    normal_impulse: f32,
    tangent_impulse: f32,
    normal_mass: f32,
    tangent_mass: f32,
    velocity_bias: f32,
}

struct VelocityConstraint {
    points: [VelocityPoint; MAX_MANIFOLD_POINTS],
    count: usize,
    normal: Vec2,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f32,
    inv_mass_b: f32,
    inv_inertia_a: f32,
    inv_inertia_b: f32,
    friction: f32,
    restitution: f32,
    /// Index into the island's contact list
    contact: usize,
}

struct PositionConstraint {
    local_points: [Vec2; MAX_MANIFOLD_POINTS],
    count: usize,
    kind: ManifoldKind,
    local_normal: Vec2,
    local_point: Vec2,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f32,
    inv_mass_b: f32,
    inv_inertia_a: f32,
    inv_inertia_b: f32,
    local_center_a: Vec2,
    local_center_b: Vec2,
    radius_a: f32,
    radius_b: f32,
}

/// World-space point/separation for one position iteration.
struct PositionSolverManifold {
    normal: Vec2,
    point: Vec2,
    separation: f32,
}

impl PositionSolverManifold {
    fn new(pc: &PositionConstraint, xf_a: &Transform, xf_b: &Transform, index: usize) -> Self {
        debug_assert!(pc.count > 0);
        match pc.kind {
            ManifoldKind::Circles => {
                let point_a = xf_a.apply(pc.local_point);
                let point_b = xf_b.apply(pc.local_points[0]);
                let d = point_b - point_a;
                let normal = if d.length_squared() > f32::EPSILON * f32::EPSILON {
                    d.normalize()
                } else {
                    Vec2::UNIT_X
                };
                Self {
                    normal,
                    point: 0.5 * (point_a + point_b),
                    separation: d.dot(normal) - pc.radius_a - pc.radius_b,
                }
            }
            ManifoldKind::FaceA => {
                let normal = xf_a.q.apply(pc.local_normal);
                let plane_point = xf_a.apply(pc.local_point);
                let clip = xf_b.apply(pc.local_points[index]);
                Self {
                    normal,
                    point: clip,
                    separation: (clip - plane_point).dot(normal) - pc.radius_a - pc.radius_b,
                }
            }
            ManifoldKind::FaceB => {
                let normal = xf_b.q.apply(pc.local_normal);
                let plane_point = xf_b.apply(pc.local_point);
                let clip = xf_a.apply(pc.local_points[index]);
                Self {
                    // Point from A to B
                    normal: -normal,
                    point: clip,
                    separation: (clip - plane_point).dot(normal) - pc.radius_a - pc.radius_b,
                }
            }
        }
    }
}

fn island_transform(position: &Position, local_center: Vec2) -> Transform {
    let q = Rot::new(position.a);
    Transform {
        p: position.c - q.apply(local_center),
        q,
    }
}

// ============================================================================
// Island
// ============================================================================

/// One connected component, with everything `solve` needs captured locally.
pub(crate) struct Island {
    pub(crate) bodies: Vec<BodyHandle>,
    pub(crate) contacts: Vec<ContactHandle>,
    pub(crate) joints: Vec<JointHandle>,

    positions: Vec<Position>,
    velocities: Vec<Velocity>,
    body_data: Vec<BodyData>,

    velocity_constraints: Vec<VelocityConstraint>,
    position_constraints: Vec<PositionConstraint>,
    /// Joint snapshots; written back after the solve
    joint_solvers: Vec<Joint>,
    /// Manifold snapshots for impulse write-back, parallel to `contacts`
    manifolds: Vec<Manifold>,
    /// Handle tuples for event views, parallel to `contacts`
    views: Vec<Option<ContactRefs>>,
    /// Positions after the TOI repair pass, adopted as the new sweep start
    safe_positions: Vec<Position>,

    /// Filled by `solve`
    pub(crate) impulses: Vec<ContactImpulse>,
    /// Per contact, whether an immediate hook consumed the deferred
    /// `post_solve`
    pub(crate) post_solve_consumed: Vec<bool>,
    pub(crate) position_solved: bool,
    pub(crate) slept: bool,
}

#[derive(Clone, Copy)]
struct ContactRefs {
    fixture_a: crate::body::FixtureHandle,
    fixture_b: crate::body::FixtureHandle,
    body_a: BodyHandle,
    body_b: BodyHandle,
}

impl Island {
    pub(crate) fn new() -> Self {
        Self {
            bodies: Vec::new(),
            contacts: Vec::new(),
            joints: Vec::new(),
            positions: Vec::new(),
            velocities: Vec::new(),
            body_data: Vec::new(),
            velocity_constraints: Vec::new(),
            position_constraints: Vec::new(),
            joint_solvers: Vec::new(),
            manifolds: Vec::new(),
            views: Vec::new(),
            safe_positions: Vec::new(),
            impulses: Vec::new(),
            post_solve_consumed: Vec::new(),
            position_solved: false,
            slept: false,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.bodies.clear();
        self.contacts.clear();
        self.joints.clear();
        self.positions.clear();
        self.velocities.clear();
        self.body_data.clear();
        self.velocity_constraints.clear();
        self.position_constraints.clear();
        self.joint_solvers.clear();
        self.manifolds.clear();
        self.views.clear();
        self.safe_positions.clear();
        self.impulses.clear();
        self.post_solve_consumed.clear();
        self.position_solved = false;
        self.slept = false;
    }

    /// Add a body and assign its island-local index. The sweep start is
    /// re-anchored at the current state so the step's swept AABBs and TOI
    /// queries cover exactly this step's motion.
    pub(crate) fn add_body(&mut self, handle: BodyHandle, body: &mut Body) {
        body.island_index = self.bodies.len() as u32;
        body.sweep.c0 = body.sweep.c;
        body.sweep.a0 = body.sweep.a;
        self.bodies.push(handle);
    }

    pub(crate) fn add_contact(&mut self, handle: ContactHandle) {
        self.contacts.push(handle);
    }

    pub(crate) fn add_joint(&mut self, handle: JointHandle) {
        self.joints.push(handle);
    }

    /// Capture body state, integrate forces into the local velocity array,
    /// build the contact constraints, and warm-start. Runs sequentially,
    /// with shared access to the arenas.
    pub(crate) fn prepare(
        &mut self,
        step: &TimeStep,
        gravity: Vec2,
        bodies: &Arena<Body>,
        contacts: &Arena<Contact>,
        fixtures: &Arena<Fixture>,
        joints: &Arena<Joint>,
    ) {
        for &handle in &self.bodies {
            let Some(body) = bodies.get(handle) else {
                continue;
            };
            let mut v = body.linear_velocity;
            let mut w = body.angular_velocity;
            if body.body_type == BodyType::Dynamic {
                v += step.dt * (body.gravity_scale * gravity + body.inv_mass * body.force);
                w += step.dt * body.inv_inertia * body.torque;
                // Implicit damping: v2 = v1 / (1 + dt * d)
                v = v * (1.0 / (1.0 + step.dt * body.linear_damping));
                w *= 1.0 / (1.0 + step.dt * body.angular_damping);
            }
            self.positions.push(Position {
                c: body.sweep.c,
                a: body.sweep.a,
            });
            self.velocities.push(Velocity { v, w });
            self.body_data.push(BodyData {
                body_type: body.body_type,
                allow_sleep: body.allow_sleep,
                sleep_time: body.sleep_time,
            });
        }

        for (i, &handle) in self.contacts.iter().enumerate() {
            // Keep the per-contact vectors aligned with `contacts` even if
            // a handle went stale.
            self.manifolds.push(Manifold::default());
            self.views.push(None);
            let Some(contact) = contacts.get(handle) else {
                continue;
            };
            let (Some(body_a), Some(body_b)) =
                (bodies.get(contact.body_a), bodies.get(contact.body_b))
            else {
                continue;
            };
            let (Some(fa), Some(fb)) = (
                fixtures.get(contact.fixture_a),
                fixtures.get(contact.fixture_b),
            ) else {
                continue;
            };
            let manifold = contact.manifold;
            debug_assert!(manifold.count > 0);
            self.views[i] = Some(ContactRefs {
                fixture_a: contact.fixture_a,
                fixture_b: contact.fixture_b,
                body_a: contact.body_a,
                body_b: contact.body_b,
            });

            let mut vc = VelocityConstraint {
                points: [VelocityPoint::default(); MAX_MANIFOLD_POINTS],
                count: manifold.count,
                normal: Vec2::ZERO,
                index_a: body_a.island_index as usize,
                index_b: body_b.island_index as usize,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                inv_inertia_a: body_a.inv_inertia,
                inv_inertia_b: body_b.inv_inertia,
                friction: contact.friction,
                restitution: contact.restitution,
                contact: i,
            };
            let mut pc = PositionConstraint {
                local_points: [Vec2::ZERO; MAX_MANIFOLD_POINTS],
                count: manifold.count,
                kind: manifold.kind,
                local_normal: manifold.local_normal,
                local_point: manifold.local_point,
                index_a: vc.index_a,
                index_b: vc.index_b,
                inv_mass_a: vc.inv_mass_a,
                inv_mass_b: vc.inv_mass_b,
                inv_inertia_a: vc.inv_inertia_a,
                inv_inertia_b: vc.inv_inertia_b,
                local_center_a: body_a.sweep.local_center,
                local_center_b: body_b.sweep.local_center,
                radius_a: fa.shape.radius(),
                radius_b: fb.shape.radius(),
            };
            for j in 0..manifold.count {
                let mp = &manifold.points[j];
                pc.local_points[j] = mp.local_point;
                vc.points[j].normal_impulse = if step.warm_starting {
                    step.dt_ratio * mp.normal_impulse
                } else {
                    0.0
                };
                vc.points[j].tangent_impulse = if step.warm_starting {
                    step.dt_ratio * mp.tangent_impulse
                } else {
                    0.0
                };
            }
            self.manifolds[i] = manifold;
            self.velocity_constraints.push(vc);
            self.position_constraints.push(pc);
        }

        self.init_velocity_constraints();
        if step.warm_starting {
            self.warm_start();
        }

        for &handle in &self.joints {
            let Some(joint) = joints.get(handle) else {
                continue;
            };
            let mut solver = *joint;
            solver.init_velocity_constraints(step, bodies, &self.positions, &mut self.velocities);
            self.joint_solvers.push(solver);
        }
    }

    fn init_velocity_constraints(&mut self) {
        for (vc, pc) in self
            .velocity_constraints
            .iter_mut()
            .zip(&self.position_constraints)
        {
            let manifold = &self.manifolds[vc.contact];
            let xf_a = island_transform(&self.positions[vc.index_a], pc.local_center_a);
            let xf_b = island_transform(&self.positions[vc.index_b], pc.local_center_b);
            let world = WorldManifold::evaluate(manifold, &xf_a, pc.radius_a, &xf_b, pc.radius_b);
            vc.normal = world.normal;
            let tangent = crate::math::cross_vs(vc.normal, 1.0);

            let pos_a = self.positions[vc.index_a];
            let pos_b = self.positions[vc.index_b];
            let vel_a = self.velocities[vc.index_a];
            let vel_b = self.velocities[vc.index_b];

            for j in 0..vc.count {
                let point = &mut vc.points[j];
                point.r_a = world.points[j] - pos_a.c;
                point.r_b = world.points[j] - pos_b.c;

                let rn_a = point.r_a.cross(vc.normal);
                let rn_b = point.r_b.cross(vc.normal);
                let k_normal = vc.inv_mass_a
                    + vc.inv_mass_b
                    + vc.inv_inertia_a * rn_a * rn_a
                    + vc.inv_inertia_b * rn_b * rn_b;
                point.normal_mass = if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 };

                let rt_a = point.r_a.cross(tangent);
                let rt_b = point.r_b.cross(tangent);
                let k_tangent = vc.inv_mass_a
                    + vc.inv_mass_b
                    + vc.inv_inertia_a * rt_a * rt_a
                    + vc.inv_inertia_b * rt_b * rt_b;
                point.tangent_mass = if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 };

                // Restitution bias from the approach speed.
                point.velocity_bias = 0.0;
                let v_rel = vc.normal.dot(
                    vel_b.v + cross_sv(vel_b.w, point.r_b)
                        - vel_a.v
                        - cross_sv(vel_a.w, point.r_a),
                );
                if v_rel < -VELOCITY_THRESHOLD {
                    point.velocity_bias = -vc.restitution * v_rel;
                }
            }
        }
    }

    fn warm_start(&mut self) {
        for vc in &self.velocity_constraints {
            let tangent = crate::math::cross_vs(vc.normal, 1.0);
            let mut vel_a = self.velocities[vc.index_a];
            let mut vel_b = self.velocities[vc.index_b];
            for point in vc.points.iter().take(vc.count) {
                let p = point.normal_impulse * vc.normal + point.tangent_impulse * tangent;
                vel_a.v -= vc.inv_mass_a * p;
                vel_a.w -= vc.inv_inertia_a * point.r_a.cross(p);
                vel_b.v += vc.inv_mass_b * p;
                vel_b.w += vc.inv_inertia_b * point.r_b.cross(p);
            }
            self.velocities[vc.index_a] = vel_a;
            self.velocities[vc.index_b] = vel_b;
        }
    }

    /// Run the solver on local state only. Safe to call from any worker;
    /// `listener` is only used for the immediate (racy) post-solve hook.
    pub(crate) fn solve(
        &mut self,
        step: &TimeStep,
        allow_sleeping: bool,
        listener: Option<&dyn ContactListener>,
    ) {
        for _ in 0..step.velocity_iterations {
            for joint in &mut self.joint_solvers {
                joint.solve_velocity_constraints(&mut self.velocities);
            }
            self.solve_velocity_iteration();
        }

        self.integrate_positions(step.dt);

        let mut position_solved = false;
        for _ in 0..step.position_iterations {
            let contacts_ok = self.solve_position_iteration();
            let mut joints_ok = true;
            for joint in &mut self.joint_solvers {
                joints_ok &= joint.solve_position_constraints(&mut self.positions);
            }
            if contacts_ok && joints_ok {
                position_solved = true;
                break;
            }
        }
        self.position_solved = position_solved;

        self.collect_impulses();
        self.report(listener);
        self.update_sleep(step, allow_sleeping, position_solved);
    }

    /// Restricted solve for one TOI sub-step. The sub-step's transforms
    /// were already advanced; only position repair plus a velocity pass
    /// runs here, anchored on the two TOI bodies.
    pub(crate) fn solve_toi(
        &mut self,
        step: &TimeStep,
        toi_index_a: usize,
        toi_index_b: usize,
        listener: Option<&dyn ContactListener>,
    ) {
        for _ in 0..step.position_iterations {
            if self.solve_toi_position_iteration(toi_index_a, toi_index_b) {
                break;
            }
        }

        // The repaired positions become the new sweep start: a known
        // non-penetrating state to advance from.
        self.safe_positions.clear();
        self.safe_positions.extend_from_slice(&self.positions);

        // The TOI constraint init intentionally skips warm starting: stored
        // impulses belong to the discrete step that was cut short.
        self.init_velocity_constraints();
        for _ in 0..step.velocity_iterations {
            self.solve_velocity_iteration();
        }

        self.integrate_positions(step.dt);
        self.collect_impulses();
        self.report(listener);
    }

    /// Fire the immediate post-solve hooks and record which deferred
    /// deliveries they consumed.
    fn report(&mut self, listener: Option<&dyn ContactListener>) {
        self.post_solve_consumed.clear();
        self.post_solve_consumed.resize(self.contacts.len(), false);
        let Some(listener) = listener else {
            return;
        };
        for (i, refs) in self.views.iter().enumerate() {
            let Some(refs) = refs else {
                continue;
            };
            let view = ContactView {
                fixture_a: refs.fixture_a,
                fixture_b: refs.fixture_b,
                body_a: refs.body_a,
                body_b: refs.body_b,
                manifold: &self.manifolds[i],
                touching: true,
            };
            self.post_solve_consumed[i] = listener.post_solve_immediate(view, &self.impulses[i]);
        }
    }

    fn solve_velocity_iteration(&mut self) {
        for vc in &mut self.velocity_constraints {
            let tangent = crate::math::cross_vs(vc.normal, 1.0);
            let mut vel_a = self.velocities[vc.index_a];
            let mut vel_b = self.velocities[vc.index_b];

            // Friction first, clamped against the accumulated normal
            // impulse from the previous iteration.
            for point in vc.points.iter_mut().take(vc.count) {
                let dv = vel_b.v + cross_sv(vel_b.w, point.r_b)
                    - vel_a.v
                    - cross_sv(vel_a.w, point.r_a);
                let vt = dv.dot(tangent);
                let mut lambda = point.tangent_mass * -vt;

                let max_friction = vc.friction * point.normal_impulse;
                let new_impulse = clamp(point.tangent_impulse + lambda, -max_friction, max_friction);
                lambda = new_impulse - point.tangent_impulse;
                point.tangent_impulse = new_impulse;

                let p = lambda * tangent;
                vel_a.v -= vc.inv_mass_a * p;
                vel_a.w -= vc.inv_inertia_a * point.r_a.cross(p);
                vel_b.v += vc.inv_mass_b * p;
                vel_b.w += vc.inv_inertia_b * point.r_b.cross(p);
            }

            for point in vc.points.iter_mut().take(vc.count) {
                let dv = vel_b.v + cross_sv(vel_b.w, point.r_b)
                    - vel_a.v
                    - cross_sv(vel_a.w, point.r_a);
                let vn = dv.dot(vc.normal);
                let mut lambda = -point.normal_mass * (vn - point.velocity_bias);

                let new_impulse = (point.normal_impulse + lambda).max(0.0);
                lambda = new_impulse - point.normal_impulse;
                point.normal_impulse = new_impulse;

                let p = lambda * vc.normal;
                vel_a.v -= vc.inv_mass_a * p;
                vel_a.w -= vc.inv_inertia_a * point.r_a.cross(p);
                vel_b.v += vc.inv_mass_b * p;
                vel_b.w += vc.inv_inertia_b * point.r_b.cross(p);
            }

            self.velocities[vc.index_a] = vel_a;
            self.velocities[vc.index_b] = vel_b;
        }
    }

    fn integrate_positions(&mut self, dt: f32) {
        for (position, velocity) in self.positions.iter_mut().zip(self.velocities.iter_mut()) {
            let mut translation = dt * velocity.v;
            if translation.length_squared() > MAX_TRANSLATION * MAX_TRANSLATION {
                let ratio = MAX_TRANSLATION / translation.length();
                velocity.v = velocity.v * ratio;
                translation = dt * velocity.v;
            }
            let mut rotation = dt * velocity.w;
            if rotation * rotation > MAX_ROTATION * MAX_ROTATION {
                let ratio = MAX_ROTATION / crate::math::abs(rotation);
                velocity.w *= ratio;
                rotation = dt * velocity.w;
            }
            position.c += translation;
            position.a += rotation;
        }
    }

    /// One Baumgarte position pass; true when every separation is within
    /// tolerance.
    fn solve_position_iteration(&mut self) -> bool {
        let mut min_separation: f32 = 0.0;
        for pc in &self.position_constraints {
            let mut pos_a = self.positions[pc.index_a];
            let mut pos_b = self.positions[pc.index_b];

            for j in 0..pc.count {
                let xf_a = island_transform(&pos_a, pc.local_center_a);
                let xf_b = island_transform(&pos_b, pc.local_center_b);
                let psm = PositionSolverManifold::new(pc, &xf_a, &xf_b, j);

                let r_a = psm.point - pos_a.c;
                let r_b = psm.point - pos_b.c;
                min_separation = min_separation.min(psm.separation);

                let c = clamp(
                    BAUMGARTE * (psm.separation + LINEAR_SLOP),
                    -MAX_LINEAR_CORRECTION,
                    0.0,
                );
                let rn_a = r_a.cross(psm.normal);
                let rn_b = r_b.cross(psm.normal);
                let k = pc.inv_mass_a
                    + pc.inv_mass_b
                    + pc.inv_inertia_a * rn_a * rn_a
                    + pc.inv_inertia_b * rn_b * rn_b;
                let impulse = if k > 0.0 { -c / k } else { 0.0 };
                let p = impulse * psm.normal;

                pos_a.c -= pc.inv_mass_a * p;
                pos_a.a -= pc.inv_inertia_a * r_a.cross(p);
                pos_b.c += pc.inv_mass_b * p;
                pos_b.a += pc.inv_inertia_b * r_b.cross(p);
            }

            self.positions[pc.index_a] = pos_a;
            self.positions[pc.index_b] = pos_b;
        }
        // Allow some slop; the Baumgarte push resolves the rest next step.
        min_separation >= -3.0 * LINEAR_SLOP
    }

    fn solve_toi_position_iteration(&mut self, toi_index_a: usize, toi_index_b: usize) -> bool {
        let mut min_separation: f32 = 0.0;
        for pc in &self.position_constraints {
            let mut pos_a = self.positions[pc.index_a];
            let mut pos_b = self.positions[pc.index_b];

            // Only the two TOI bodies move; everything else is an anchor.
            let (mass_a, inertia_a) = if pc.index_a == toi_index_a || pc.index_a == toi_index_b {
                (pc.inv_mass_a, pc.inv_inertia_a)
            } else {
                (0.0, 0.0)
            };
            let (mass_b, inertia_b) = if pc.index_b == toi_index_a || pc.index_b == toi_index_b {
                (pc.inv_mass_b, pc.inv_inertia_b)
            } else {
                (0.0, 0.0)
            };

            for j in 0..pc.count {
                let xf_a = island_transform(&pos_a, pc.local_center_a);
                let xf_b = island_transform(&pos_b, pc.local_center_b);
                let psm = PositionSolverManifold::new(pc, &xf_a, &xf_b, j);

                let r_a = psm.point - pos_a.c;
                let r_b = psm.point - pos_b.c;
                min_separation = min_separation.min(psm.separation);

                let c = clamp(
                    TOI_BAUMGARTE * (psm.separation + LINEAR_SLOP),
                    -MAX_LINEAR_CORRECTION,
                    0.0,
                );
                let rn_a = r_a.cross(psm.normal);
                let rn_b = r_b.cross(psm.normal);
                let k = mass_a + mass_b + inertia_a * rn_a * rn_a + inertia_b * rn_b * rn_b;
                let impulse = if k > 0.0 { -c / k } else { 0.0 };
                let p = impulse * psm.normal;

                pos_a.c -= mass_a * p;
                pos_a.a -= inertia_a * r_a.cross(p);
                pos_b.c += mass_b * p;
                pos_b.a += inertia_b * r_b.cross(p);
            }

            self.positions[pc.index_a] = pos_a;
            self.positions[pc.index_b] = pos_b;
        }
        min_separation >= -1.5 * LINEAR_SLOP
    }

    fn collect_impulses(&mut self) {
        self.impulses.clear();
        self.impulses
            .resize(self.contacts.len(), ContactImpulse::default());
        for vc in &self.velocity_constraints {
            let manifold = &mut self.manifolds[vc.contact];
            let impulse = &mut self.impulses[vc.contact];
            impulse.count = vc.count;
            for j in 0..vc.count {
                manifold.points[j].normal_impulse = vc.points[j].normal_impulse;
                manifold.points[j].tangent_impulse = vc.points[j].tangent_impulse;
                impulse.normal_impulses[j] = vc.points[j].normal_impulse;
                impulse.tangent_impulses[j] = vc.points[j].tangent_impulse;
            }
        }
    }

    fn update_sleep(&mut self, step: &TimeStep, allow_sleeping: bool, position_solved: bool) {
        if !allow_sleeping {
            return;
        }
        let lin_tol2 = LINEAR_SLEEP_TOLERANCE * LINEAR_SLEEP_TOLERANCE;
        let ang_tol2 = ANGULAR_SLEEP_TOLERANCE * ANGULAR_SLEEP_TOLERANCE;
        let mut min_sleep_time = f32::MAX;

        for (data, velocity) in self.body_data.iter_mut().zip(&self.velocities) {
            if data.body_type == BodyType::Static {
                continue;
            }
            if !data.allow_sleep
                || velocity.w * velocity.w > ang_tol2
                || velocity.v.length_squared() > lin_tol2
            {
                data.sleep_time = 0.0;
                min_sleep_time = 0.0;
            } else {
                data.sleep_time += step.dt;
                min_sleep_time = min_sleep_time.min(data.sleep_time);
            }
        }

        // All-or-nothing: the island sleeps only as a whole.
        self.slept = min_sleep_time >= TIME_TO_SLEEP && position_solved;
    }

    /// Write island results back to the bodies. Sequential. Returns the
    /// number of bodies put to sleep.
    pub(crate) fn finish(&self, bodies: &mut Arena<Body>) -> u32 {
        let mut slept = 0;
        for (i, &handle) in self.bodies.iter().enumerate() {
            let Some(body) = bodies.get_mut(handle) else {
                continue;
            };
            body.sweep.c = self.positions[i].c;
            body.sweep.a = self.positions[i].a;
            body.linear_velocity = self.velocities[i].v;
            body.angular_velocity = self.velocities[i].w;
            body.sleep_time = self.body_data[i].sleep_time;
            body.synchronize_transform();
            if self.slept && body.body_type != BodyType::Static && body.awake {
                body.sleep();
                slept += 1;
            }
        }
        slept
    }

    /// Write back after a TOI sub-step: the repaired positions become the
    /// sweep start and the integrated ones its end. Sequential.
    pub(crate) fn finish_toi(&self, bodies: &mut Arena<Body>) {
        for (i, &handle) in self.bodies.iter().enumerate() {
            let Some(body) = bodies.get_mut(handle) else {
                continue;
            };
            body.sweep.c0 = self.safe_positions[i].c;
            body.sweep.a0 = self.safe_positions[i].a;
            body.sweep.c = self.positions[i].c;
            body.sweep.a = self.positions[i].a;
            body.linear_velocity = self.velocities[i].v;
            body.angular_velocity = self.velocities[i].w;
            body.synchronize_transform();
        }
    }

    /// Write solved impulses back into the persistent manifolds. Sequential.
    pub(crate) fn store_impulses(&self, contacts: &mut Arena<Contact>) {
        for (i, &handle) in self.contacts.iter().enumerate() {
            let Some(contact) = contacts.get_mut(handle) else {
                continue;
            };
            let manifold = &self.manifolds[i];
            for j in 0..manifold.count {
                contact.manifold.points[j].normal_impulse = manifold.points[j].normal_impulse;
                contact.manifold.points[j].tangent_impulse = manifold.points[j].tangent_impulse;
            }
        }
    }

    /// Write back joint warm-start state. Sequential.
    pub(crate) fn store_joints(&self, joints: &mut Arena<Joint>) {
        for (&handle, solver) in self.joints.iter().zip(&self.joint_solvers) {
            if let Some(joint) = joints.get_mut(handle) {
                *joint = *solver;
            }
        }
    }

    /// Seed the local arrays directly; used by the TOI sub-solver where
    /// velocities come from the clipped step rather than force integration.
    pub(crate) fn prepare_toi(
        &mut self,
        bodies: &Arena<Body>,
        contacts: &Arena<Contact>,
        fixtures: &Arena<Fixture>,
    ) {
        for &handle in &self.bodies {
            let Some(body) = bodies.get(handle) else {
                continue;
            };
            self.positions.push(Position {
                c: body.sweep.c,
                a: body.sweep.a,
            });
            self.velocities.push(Velocity {
                v: body.linear_velocity,
                w: body.angular_velocity,
            });
            self.body_data.push(BodyData {
                body_type: body.body_type,
                allow_sleep: body.allow_sleep,
                sleep_time: body.sleep_time,
            });
        }

        for (i, &handle) in self.contacts.iter().enumerate() {
            self.manifolds.push(Manifold::default());
            self.views.push(None);
            let Some(contact) = contacts.get(handle) else {
                continue;
            };
            let (Some(body_a), Some(body_b)) =
                (bodies.get(contact.body_a), bodies.get(contact.body_b))
            else {
                continue;
            };
            let (Some(fa), Some(fb)) = (
                fixtures.get(contact.fixture_a),
                fixtures.get(contact.fixture_b),
            ) else {
                continue;
            };
            let manifold = contact.manifold;
            self.views[i] = Some(ContactRefs {
                fixture_a: contact.fixture_a,
                fixture_b: contact.fixture_b,
                body_a: contact.body_a,
                body_b: contact.body_b,
            });

            let mut vc = VelocityConstraint {
                points: [VelocityPoint::default(); MAX_MANIFOLD_POINTS],
                count: manifold.count,
                normal: Vec2::ZERO,
                index_a: body_a.island_index as usize,
                index_b: body_b.island_index as usize,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                inv_inertia_a: body_a.inv_inertia,
                inv_inertia_b: body_b.inv_inertia,
                friction: contact.friction,
                restitution: contact.restitution,
                contact: i,
            };
            let mut pc = PositionConstraint {
                local_points: [Vec2::ZERO; MAX_MANIFOLD_POINTS],
                count: manifold.count,
                kind: manifold.kind,
                local_normal: manifold.local_normal,
                local_point: manifold.local_point,
                index_a: vc.index_a,
                index_b: vc.index_b,
                inv_mass_a: vc.inv_mass_a,
                inv_mass_b: vc.inv_mass_b,
                inv_inertia_a: vc.inv_inertia_a,
                inv_inertia_b: vc.inv_inertia_b,
                local_center_a: body_a.sweep.local_center,
                local_center_b: body_b.sweep.local_center,
                radius_a: fa.shape.radius(),
                radius_b: fb.shape.radius(),
            };
            for j in 0..manifold.count {
                pc.local_points[j] = manifold.points[j].local_point;
                vc.points[j].normal_impulse = 0.0;
                vc.points[j].tangent_impulse = 0.0;
            }
            self.manifolds[i] = manifold;
            self.velocity_constraints.push(vc);
            self.position_constraints.push(pc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::TIME_TO_SLEEP;

    #[test]
    fn island_transform_places_the_center_of_mass() {
        let position = Position {
            c: Vec2::new(3.0, 4.0),
            a: core::f32::consts::FRAC_PI_2,
        };
        let local_center = Vec2::new(1.0, 0.0);
        let xf = island_transform(&position, local_center);
        // Applying the transform to the local center must land on c.
        assert!((xf.apply(local_center) - position.c).length() < 1e-6);
    }

    #[test]
    fn island_sleep_is_all_or_nothing() {
        let step = TimeStep::new(1.0 / 60.0, 60.0, 8, 3, true);
        let mut island = Island::new();
        for _ in 0..2 {
            island.body_data.push(BodyData {
                body_type: BodyType::Dynamic,
                allow_sleep: true,
                sleep_time: 0.0,
            });
        }
        island.velocities.push(Velocity::default());
        island.velocities.push(Velocity {
            v: Vec2::new(5.0, 0.0),
            w: 0.0,
        });

        // One fast body pins the whole island awake.
        let steps = (TIME_TO_SLEEP / step.dt) as usize + 2;
        for _ in 0..steps {
            island.update_sleep(&step, true, true);
        }
        assert!(!island.slept);

        // Once every member is idle, the island sleeps as a whole.
        island.velocities[1] = Velocity::default();
        for _ in 0..steps {
            island.update_sleep(&step, true, true);
        }
        assert!(island.slept);
    }
}
