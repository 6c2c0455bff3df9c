//! Physics World
//!
//! Owns the bodies, fixtures, joints, and the contact manager, and drives
//! the step pipeline:
//!
//! 1. pair search over the broad-phase move buffer (parallel, deferred)
//! 2. narrow phase over all contacts (parallel, deferred)
//! 3. island construction (sequential) and island solve (parallel)
//! 4. fixture synchronization and a second pair search
//! 5. time-of-impact sub-steps for tunneling candidates (sequential)
//!
//! Every parallel phase defers its effects into per-worker buffers that are
//! merged in an order derived from the data, so stepping with one worker or
//! many produces bit-identical results.
//!
//! The world is *locked* while stepping: structural mutations from inside
//! callbacks return [`PhysicsError::WorldLocked`].

use crate::arena::Arena;
use crate::body::{
    Body, BodyDef, BodyHandle, BodyType, ContactHandle, Fixture, FixtureDef, FixtureHandle,
    JointHandle,
};
use crate::callbacks::{
    ContactFilter, ContactListener, ContactView, DefaultFilter, DestructionListener,
};
use crate::config::{TimeStep, WorldConfig};
use crate::contact::Contact;
use crate::contact_manager::ContactManager;
use crate::error::PhysicsError;
use crate::island::Island;
use crate::joint::{DistanceJointDef, Joint};
use crate::math::{Aabb, RayCastInput, Rot, Sweep, Transform, Vec2};
use crate::profile::Profile;
use crate::settings::{
    MAX_TOI_SUBSTEPS, TOI_POSITION_ITERATIONS, TOI_VELOCITY_ITERATIONS,
};
use crate::toi::{self, ToiState};
use crate::worker::{self, WorkerContext};

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, vec::Vec};

/// A hit reported to the [`World::ray_cast`] callback.
#[derive(Clone, Copy, Debug)]
pub struct RayHit {
    pub fixture: FixtureHandle,
    /// World-space hit point
    pub point: Vec2,
    /// World-space surface normal at the hit
    pub normal: Vec2,
    /// Fraction along the segment, in `[0, 1]`
    pub fraction: f32,
}

/// The simulation container.
pub struct World {
    bodies: Arena<Body>,
    fixtures: Arena<Fixture>,
    joints: Arena<Joint>,
    contact_manager: ContactManager,

    contexts: Vec<WorkerContext>,
    islands: Vec<Island>,

    config: WorldConfig,
    filter: Box<dyn ContactFilter>,
    listener: Option<Box<dyn ContactListener>>,
    destruction_listener: Option<Box<dyn DestructionListener>>,

    profile: Profile,
    locked: bool,
    /// Fixtures were created since the last pair search
    new_fixtures: bool,
    /// 1/dt of the previous step, for warm-start scaling
    inv_dt0: f32,
}

impl World {
    #[must_use]
    pub fn new(config: WorldConfig) -> Self {
        let workers = config.workers.max(1);
        let mut contexts = Vec::with_capacity(workers);
        contexts.resize_with(workers, WorkerContext::default);
        Self {
            bodies: Arena::new(),
            fixtures: Arena::new(),
            joints: Arena::new(),
            contact_manager: ContactManager::new(),
            contexts,
            islands: Vec::new(),
            config,
            filter: Box::new(DefaultFilter),
            listener: None,
            destruction_listener: None,
            profile: Profile::default(),
            locked: false,
            new_fixtures: false,
            inv_dt0: 0.0,
        }
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    pub fn set_contact_listener(&mut self, listener: Box<dyn ContactListener>) {
        self.listener = Some(listener);
    }

    pub fn set_contact_filter(&mut self, filter: Box<dyn ContactFilter>) {
        self.filter = filter;
    }

    pub fn set_destruction_listener(&mut self, listener: Box<dyn DestructionListener>) {
        self.destruction_listener = Some(listener);
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.config.gravity = gravity;
    }

    #[inline]
    #[must_use]
    pub fn gravity(&self) -> Vec2 {
        self.config.gravity
    }

    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Counters from the most recent step.
    #[inline]
    #[must_use]
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    // ========================================================================
    // Bodies and fixtures
    // ========================================================================

    pub fn create_body(&mut self, def: &BodyDef) -> Result<BodyHandle, PhysicsError> {
        if self.locked {
            return Err(PhysicsError::WorldLocked);
        }
        Ok(self.bodies.insert(Body::new(def)))
    }

    /// Destroy a body together with its fixtures, contacts, and joints.
    pub fn destroy_body(&mut self, handle: BodyHandle) -> Result<(), PhysicsError> {
        if self.locked {
            return Err(PhysicsError::WorldLocked);
        }
        let Some(body) = self.bodies.get(handle) else {
            return Err(PhysicsError::StaleHandle { kind: "body" });
        };
        let joints: Vec<JointHandle> = body.joints.clone();
        let contacts: Vec<ContactHandle> = body.contacts.clone();
        let fixtures: Vec<FixtureHandle> = body.fixtures.clone();

        for jh in joints {
            if let Some(listener) = self.destruction_listener.as_deref_mut() {
                listener.joint_destroyed(jh);
            }
            self.unlink_joint(jh);
        }
        for ch in contacts {
            self.contact_manager
                .destroy_contact(ch, &mut self.bodies, self.listener.as_deref_mut());
        }
        for fh in fixtures {
            if let Some(listener) = self.destruction_listener.as_deref_mut() {
                listener.fixture_destroyed(fh);
            }
            if let Some(fixture) = self.fixtures.remove(fh) {
                self.contact_manager
                    .broad_phase
                    .destroy_proxy(fixture.proxy);
            }
        }
        self.bodies.remove(handle);
        Ok(())
    }

    /// Attach a shape to a body.
    pub fn create_fixture(
        &mut self,
        body: BodyHandle,
        def: &FixtureDef,
    ) -> Result<FixtureHandle, PhysicsError> {
        if self.locked {
            return Err(PhysicsError::WorldLocked);
        }
        if def.density < 0.0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "fixture density must be non-negative",
            });
        }
        let Some(body_ref) = self.bodies.get(body) else {
            return Err(PhysicsError::StaleHandle { kind: "body" });
        };
        let xf = body_ref.transform();

        let handle = self.fixtures.insert(Fixture {
            body,
            shape: def.shape.clone(),
            density: def.density,
            friction: def.friction,
            restitution: def.restitution,
            filter: def.filter,
            proxy: 0,
        });
        let aabb = def.shape.compute_aabb(&xf);
        let proxy = self
            .contact_manager
            .broad_phase
            .create_proxy(aabb, handle.index());
        if let Some(fixture) = self.fixtures.get_mut(handle) {
            fixture.proxy = proxy;
        }
        if let Some(body_ref) = self.bodies.get_mut(body) {
            body_ref.fixtures.push(handle);
        }

        self.reset_mass_data(body);
        self.new_fixtures = true;
        Ok(handle)
    }

    /// Detach and destroy a fixture, destroying its contacts.
    pub fn destroy_fixture(&mut self, handle: FixtureHandle) -> Result<(), PhysicsError> {
        if self.locked {
            return Err(PhysicsError::WorldLocked);
        }
        let Some(fixture) = self.fixtures.get(handle) else {
            return Err(PhysicsError::StaleHandle { kind: "fixture" });
        };
        let body = fixture.body;
        let proxy = fixture.proxy;

        if let Some(body_ref) = self.bodies.get(body) {
            let doomed: Vec<ContactHandle> = body_ref
                .contacts
                .iter()
                .copied()
                .filter(|&ch| {
                    self.contact_manager
                        .contacts
                        .get(ch)
                        .is_some_and(|c| c.fixture_a() == handle || c.fixture_b() == handle)
                })
                .collect();
            for ch in doomed {
                self.contact_manager.destroy_contact(
                    ch,
                    &mut self.bodies,
                    self.listener.as_deref_mut(),
                );
            }
        }

        self.contact_manager.broad_phase.destroy_proxy(proxy);
        self.fixtures.remove(handle);
        if let Some(body_ref) = self.bodies.get_mut(body) {
            if let Some(pos) = body_ref.fixtures.iter().position(|&f| f == handle) {
                body_ref.fixtures.swap_remove(pos);
            }
        }
        self.reset_mass_data(body);
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn body(&self, handle: BodyHandle) -> Option<&Body> {
        self.bodies.get(handle)
    }

    /// Mutable body access for velocities, forces, and impulses. Structural
    /// changes go through the world methods.
    #[inline]
    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut Body> {
        self.bodies.get_mut(handle)
    }

    #[inline]
    #[must_use]
    pub fn fixture(&self, handle: FixtureHandle) -> Option<&Fixture> {
        self.fixtures.get(handle)
    }

    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Teleport a body, resetting its sweep so no motion is swept through
    /// the jump.
    pub fn set_transform(
        &mut self,
        handle: BodyHandle,
        position: Vec2,
        angle: f32,
    ) -> Result<(), PhysicsError> {
        if self.locked {
            return Err(PhysicsError::WorldLocked);
        }
        let Some(body) = self.bodies.get_mut(handle) else {
            return Err(PhysicsError::StaleHandle { kind: "body" });
        };
        body.xf = Transform::new(position, angle);
        body.sweep.c = body.xf.apply(body.sweep.local_center);
        body.sweep.a = angle;
        body.sweep.c0 = body.sweep.c;
        body.sweep.a0 = angle;

        let fixtures: Vec<FixtureHandle> = body.fixtures.clone();
        let xf = body.xf;
        for fh in fixtures {
            if let Some(fixture) = self.fixtures.get(fh) {
                let aabb = fixture.shape.compute_aabb(&xf);
                self.contact_manager
                    .broad_phase
                    .move_proxy(fixture.proxy, aabb, Vec2::ZERO);
            }
        }
        Ok(())
    }

    /// Wake a body. Static bodies stay asleep.
    pub fn wake_body(&mut self, handle: BodyHandle) -> Result<(), PhysicsError> {
        let Some(body) = self.bodies.get_mut(handle) else {
            return Err(PhysicsError::StaleHandle { kind: "body" });
        };
        body.wake();
        Ok(())
    }

    /// Put a body to sleep immediately, zeroing its velocities.
    pub fn sleep_body(&mut self, handle: BodyHandle) -> Result<(), PhysicsError> {
        let Some(body) = self.bodies.get_mut(handle) else {
            return Err(PhysicsError::StaleHandle { kind: "body" });
        };
        body.sleep();
        Ok(())
    }

    /// Re-run the contact filter for a fixture's contacts during the next
    /// collide phase, and re-pair it against the broad phase.
    pub fn refilter_fixture(&mut self, handle: FixtureHandle) -> Result<(), PhysicsError> {
        let Some(fixture) = self.fixtures.get(handle) else {
            return Err(PhysicsError::StaleHandle { kind: "fixture" });
        };
        let owner = fixture.body;
        let proxy = fixture.proxy;
        self.contact_manager
            .mark_for_refilter(handle, owner, &self.bodies);
        self.contact_manager.broad_phase.touch_proxy(proxy);
        Ok(())
    }

    /// Toggle the bullet flag, repartitioning the body's contacts across
    /// the TOI candidate boundary.
    pub fn set_bullet(&mut self, handle: BodyHandle, bullet: bool) -> Result<(), PhysicsError> {
        let Some(body) = self.bodies.get_mut(handle) else {
            return Err(PhysicsError::StaleHandle { kind: "body" });
        };
        if body.bullet == bullet {
            return Ok(());
        }
        body.bullet = bullet;
        let contacts: Vec<ContactHandle> = body.contacts.clone();
        for ch in contacts {
            self.contact_manager.update_candidacy(ch, &self.bodies);
        }
        Ok(())
    }

    /// Change a body's type. Existing contacts are destroyed and re-created
    /// by the next pair search under the new rules.
    pub fn set_body_type(
        &mut self,
        handle: BodyHandle,
        body_type: BodyType,
    ) -> Result<(), PhysicsError> {
        if self.locked {
            return Err(PhysicsError::WorldLocked);
        }
        let Some(body) = self.bodies.get_mut(handle) else {
            return Err(PhysicsError::StaleHandle { kind: "body" });
        };
        if body.body_type == body_type {
            return Ok(());
        }
        body.body_type = body_type;
        if body_type == BodyType::Static {
            body.linear_velocity = Vec2::ZERO;
            body.angular_velocity = 0.0;
            body.sweep.c0 = body.sweep.c;
            body.sweep.a0 = body.sweep.a;
            body.awake = false;
        } else {
            body.wake();
        }
        body.force = Vec2::ZERO;
        body.torque = 0.0;

        let contacts: Vec<ContactHandle> = body.contacts.clone();
        let fixtures: Vec<FixtureHandle> = body.fixtures.clone();
        for ch in contacts {
            self.contact_manager
                .destroy_contact(ch, &mut self.bodies, self.listener.as_deref_mut());
        }
        for fh in fixtures {
            if let Some(fixture) = self.fixtures.get(fh) {
                self.contact_manager.broad_phase.touch_proxy(fixture.proxy);
            }
        }
        self.reset_mass_data(handle);
        Ok(())
    }

    /// Recompute mass, center of mass, and inertia from the body's fixtures.
    pub fn reset_mass_data(&mut self, handle: BodyHandle) {
        let Some(body) = self.bodies.get(handle) else {
            return;
        };
        if body.body_type() != BodyType::Dynamic {
            // Keep the sweep anchored at the origin for non-dynamic bodies.
            if let Some(body) = self.bodies.get_mut(handle) {
                body.mass = 0.0;
                body.inv_mass = 0.0;
                body.inertia = 0.0;
                body.inv_inertia = 0.0;
                body.sweep.local_center = Vec2::ZERO;
                body.sweep.c = body.xf.p;
                body.sweep.c0 = body.sweep.c;
            }
            return;
        }

        let mut mass = 0.0;
        let mut center = Vec2::ZERO;
        let mut inertia = 0.0;
        for &fh in &body.fixtures {
            let Some(fixture) = self.fixtures.get(fh) else {
                continue;
            };
            if fixture.density == 0.0 {
                continue;
            }
            let data = fixture.shape.compute_mass(fixture.density);
            mass += data.mass;
            center += data.mass * data.center;
            inertia += data.inertia;
        }
        if mass > 0.0 {
            center = center * (1.0 / mass);
        }
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_mass_data(mass, center, inertia);
        }
    }

    // ========================================================================
    // Joints
    // ========================================================================

    pub fn create_distance_joint(
        &mut self,
        def: &DistanceJointDef,
    ) -> Result<JointHandle, PhysicsError> {
        if self.locked {
            return Err(PhysicsError::WorldLocked);
        }
        if self.bodies.get(def.body_a).is_none() || self.bodies.get(def.body_b).is_none() {
            return Err(PhysicsError::StaleHandle { kind: "body" });
        }
        if def.body_a == def.body_b {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "joint must connect two distinct bodies",
            });
        }

        let handle = self.joints.insert(Joint::distance(def));
        for bh in [def.body_a, def.body_b] {
            if let Some(body) = self.bodies.get_mut(bh) {
                body.joints.push(handle);
                body.wake();
            }
        }

        // Suppressed pairs must not keep an existing contact alive.
        if !def.collide_connected {
            if let Some(body) = self.bodies.get(def.body_a) {
                let doomed: Vec<ContactHandle> = body
                    .contacts
                    .iter()
                    .copied()
                    .filter(|&ch| {
                        self.contact_manager.contacts.get(ch).is_some_and(|c| {
                            (c.body_a == def.body_a && c.body_b == def.body_b)
                                || (c.body_a == def.body_b && c.body_b == def.body_a)
                        })
                    })
                    .collect();
                for ch in doomed {
                    self.contact_manager.destroy_contact(
                        ch,
                        &mut self.bodies,
                        self.listener.as_deref_mut(),
                    );
                }
            }
        }
        Ok(handle)
    }

    pub fn destroy_joint(&mut self, handle: JointHandle) -> Result<(), PhysicsError> {
        if self.locked {
            return Err(PhysicsError::WorldLocked);
        }
        if self.joints.get(handle).is_none() {
            return Err(PhysicsError::StaleHandle { kind: "joint" });
        }
        self.unlink_joint(handle);
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn joint(&self, handle: JointHandle) -> Option<&Joint> {
        self.joints.get(handle)
    }

    fn unlink_joint(&mut self, handle: JointHandle) {
        let Some(joint) = self.joints.remove(handle) else {
            return;
        };
        for bh in [joint.body_a, joint.body_b] {
            if let Some(body) = self.bodies.get_mut(bh) {
                if let Some(pos) = body.joints.iter().position(|&j| j == handle) {
                    body.joints.swap_remove(pos);
                }
                body.wake();
                // Let suppressed pairs re-form through the broad phase.
                if !joint.collide_connected {
                    for &fh in body.fixtures.clone().iter() {
                        if let Some(fixture) = self.fixtures.get(fh) {
                            self.contact_manager.broad_phase.touch_proxy(fixture.proxy);
                        }
                    }
                }
            }
        }
    }

    // ========================================================================
    // Contacts
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn contact_count(&self) -> usize {
        self.contact_manager.contact_count()
    }

    /// Live contacts, in pipeline order.
    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.contact_manager
            .ordered()
            .iter()
            .filter_map(|&h| self.contact_manager.contacts.get(h))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Report every fixture whose fat AABB overlaps `aabb`. Return false
    /// from the callback to stop early.
    pub fn query_aabb<F: FnMut(FixtureHandle) -> bool>(&self, aabb: &Aabb, mut callback: F) {
        self.contact_manager.broad_phase.query(aabb, |data| {
            match self.fixtures.handle_at(data) {
                Some(handle) => callback(handle),
                None => true,
            }
        });
    }

    /// Cast a segment through the world, reporting precise shape hits.
    ///
    /// The callback's return value controls the continuation: `0.0` stops
    /// the cast, `1.0` continues unclipped, and any other value clips the
    /// segment to that fraction (pass `hit.fraction` to find the closest
    /// hit).
    pub fn ray_cast<F: FnMut(&RayHit) -> f32>(&self, p1: Vec2, p2: Vec2, mut callback: F) {
        let input = RayCastInput {
            p1,
            p2,
            max_fraction: 1.0,
        };
        self.contact_manager.broad_phase.ray_cast(&input, |sub, data| {
            let Some(handle) = self.fixtures.handle_at(data) else {
                return sub.max_fraction;
            };
            let Some(fixture) = self.fixtures.get(handle) else {
                return sub.max_fraction;
            };
            let Some(body) = self.bodies.get(fixture.body) else {
                return sub.max_fraction;
            };
            match fixture.shape.ray_cast(sub, &body.transform()) {
                Some(output) => {
                    let point = sub.p1 + output.fraction * (sub.p2 - sub.p1);
                    callback(&RayHit {
                        fixture: handle,
                        point,
                        normal: output.normal,
                        fraction: output.fraction,
                    })
                }
                None => sub.max_fraction,
            }
        });
    }

    // ========================================================================
    // Stepping
    // ========================================================================

    /// Advance the simulation by `dt` seconds.
    pub fn step(&mut self, dt: f32, velocity_iterations: usize, position_iterations: usize) {
        self.profile.reset();

        // Pair new fixtures before locking so their contacts exist this step.
        if self.new_fixtures {
            self.find_new_contacts();
            self.new_fixtures = false;
        }

        self.locked = true;
        let step = TimeStep::new(
            dt,
            self.inv_dt0,
            velocity_iterations,
            position_iterations,
            self.config.warm_starting,
        );

        self.contact_manager.collide(
            &mut self.contexts,
            &self.fixtures,
            &mut self.bodies,
            &*self.filter,
            self.listener.as_deref_mut(),
            &mut self.profile,
        );

        if step.dt > 0.0 {
            self.solve(&step);
            if self.config.continuous {
                self.solve_toi(&step);
            }
            self.inv_dt0 = step.inv_dt;
        }

        if self.config.auto_clear_forces {
            self.clear_forces();
        }
        self.locked = false;
    }

    /// Zero accumulated forces and torques on all bodies.
    pub fn clear_forces(&mut self) {
        for (_, body) in self.bodies.iter_mut() {
            body.force = Vec2::ZERO;
            body.torque = 0.0;
        }
    }

    fn find_new_contacts(&mut self) {
        self.contact_manager.find_new_contacts(
            &mut self.contexts,
            &self.fixtures,
            &mut self.bodies,
            &self.joints,
            &*self.filter,
            &mut self.profile,
        );
    }

    // ========================================================================
    // Discrete solve
    // ========================================================================

    fn solve(&mut self, step: &TimeStep) {
        for island in &mut self.islands {
            island.clear();
        }

        for (_, body) in self.bodies.iter_mut() {
            body.island_flag = false;
        }
        for (_, contact) in self.contact_manager.contacts.iter_mut() {
            contact.island_flag = false;
        }
        for (_, joint) in self.joints.iter_mut() {
            joint.island_flag = false;
        }

        // Flood-fill islands from every awake non-static body. Arena order
        // makes the island list deterministic.
        let mut island_count = 0;
        let mut stack: Vec<BodyHandle> = Vec::new();
        let seeds: Vec<BodyHandle> = self.bodies.handles().collect();
        for seed in seeds {
            {
                let Some(body) = self.bodies.get(seed) else {
                    continue;
                };
                if body.island_flag
                    || !body.is_awake()
                    || body.body_type() == BodyType::Static
                {
                    continue;
                }
            }

            if self.islands.len() == island_count {
                self.islands.push(Island::new());
            }
            let mut island = core::mem::replace(&mut self.islands[island_count], Island::new());
            island_count += 1;

            stack.clear();
            stack.push(seed);
            if let Some(body) = self.bodies.get_mut(seed) {
                body.island_flag = true;
            }

            while let Some(bh) = stack.pop() {
                let Some(body) = self.bodies.get_mut(bh) else {
                    continue;
                };
                body.wake();
                island.add_body(bh, body);

                // Statics join the island but do not propagate it.
                if body.body_type() == BodyType::Static {
                    continue;
                }

                let contacts: Vec<ContactHandle> = body.contacts.clone();
                let joint_edges: Vec<JointHandle> = body.joints.clone();

                for ch in contacts {
                    let Some(contact) = self.contact_manager.contacts.get_mut(ch) else {
                        continue;
                    };
                    if contact.island_flag || !contact.touching || !contact.enabled {
                        continue;
                    }
                    contact.island_flag = true;
                    island.add_contact(ch);

                    let other = if contact.body_a == bh {
                        contact.body_b
                    } else {
                        contact.body_a
                    };
                    if let Some(other_body) = self.bodies.get_mut(other) {
                        if !other_body.island_flag {
                            other_body.island_flag = true;
                            stack.push(other);
                        }
                    }
                }

                for jh in joint_edges {
                    let Some(joint) = self.joints.get_mut(jh) else {
                        continue;
                    };
                    if joint.island_flag {
                        continue;
                    }
                    joint.island_flag = true;
                    island.add_joint(jh);

                    let (a, b) = joint.bodies();
                    let other = if a == bh { b } else { a };
                    if let Some(other_body) = self.bodies.get_mut(other) {
                        if !other_body.island_flag {
                            other_body.island_flag = true;
                            stack.push(other);
                        }
                    }
                }
            }

            // Statics may anchor any number of islands: release their flag
            // so the next flood fill can pick them up again. Their slot in
            // this island's arrays was already captured.
            for &bh in &island.bodies {
                if let Some(body) = self.bodies.get_mut(bh) {
                    if body.body_type() == BodyType::Static {
                        body.island_flag = false;
                    }
                }
            }

            island.prepare(
                step,
                self.config.gravity,
                &self.bodies,
                &self.contact_manager.contacts,
                &self.fixtures,
                &self.joints,
            );
            self.islands[island_count - 1] = island;
        }

        // Islands are disjoint, so they solve independently on any worker.
        {
            let islands = &mut self.islands[..island_count];
            let allow_sleeping = self.config.allow_sleeping;
            let listener: Option<&dyn ContactListener> = self.listener.as_deref();
            worker::for_each(islands, |island| {
                island.solve(step, allow_sleeping, listener);
            });
        }

        // Write-back and deferred post-solve events, in island build order.
        self.profile.islands = island_count as u32;
        for i in 0..island_count {
            let island = &self.islands[i];
            let bodies_in_island = island.bodies.len() as u32;
            self.profile.island_bodies += bodies_in_island;
            self.profile.max_island_bodies =
                self.profile.max_island_bodies.max(bodies_in_island);

            self.profile.bodies_slept += island.finish(&mut self.bodies);
            island.store_impulses(&mut self.contact_manager.contacts);
            island.store_joints(&mut self.joints);

            if let Some(listener) = self.listener.as_deref_mut() {
                for (j, &ch) in island.contacts.iter().enumerate() {
                    if island.post_solve_consumed[j] {
                        continue;
                    }
                    let Some(contact) = self.contact_manager.contacts.get(ch) else {
                        continue;
                    };
                    listener.post_solve(
                        ContactView {
                            fixture_a: contact.fixture_a(),
                            fixture_b: contact.fixture_b(),
                            body_a: contact.body_a,
                            body_b: contact.body_b,
                            manifold: contact.manifold(),
                            touching: true,
                        },
                        &island.impulses[j],
                    );
                }
            }
        }

        // Refresh broad-phase proxies along each moved body's swept path.
        for i in 0..island_count {
            let handles: Vec<BodyHandle> = self.islands[i].bodies.clone();
            for bh in handles {
                let Some(body) = self.bodies.get(bh) else {
                    continue;
                };
                if body.body_type() == BodyType::Static || !body.is_awake() {
                    continue;
                }
                self.synchronize_fixtures(bh);
            }
        }

        self.find_new_contacts();
    }

    /// Push a body's proxies to the union of its start and end AABBs.
    fn synchronize_fixtures(&mut self, handle: BodyHandle) {
        let Some(body) = self.bodies.get(handle) else {
            return;
        };
        let sweep = body.sweep;
        let q0 = Rot::new(sweep.a0);
        let xf0 = Transform {
            p: sweep.c0 - q0.apply(sweep.local_center),
            q: q0,
        };
        let xf1 = body.transform();
        let displacement = sweep.c - sweep.c0;

        let fixtures: Vec<FixtureHandle> = body.fixtures.clone();
        for fh in fixtures {
            if let Some(fixture) = self.fixtures.get(fh) {
                let aabb = fixture
                    .shape
                    .compute_aabb(&xf0)
                    .union(&fixture.shape.compute_aabb(&xf1));
                self.contact_manager
                    .broad_phase
                    .move_proxy(fixture.proxy, aabb, displacement);
            }
        }
    }

    // ========================================================================
    // Continuous solve
    // ========================================================================

    fn solve_toi(&mut self, step: &TimeStep) {
        for (_, body) in self.bodies.iter_mut() {
            body.island_flag = false;
            body.sweep.alpha0 = 0.0;
        }
        for (_, contact) in self.contact_manager.contacts.iter_mut() {
            contact.island_flag = false;
            contact.toi_valid = false;
            contact.toi_count = 0;
        }

        let mut island = Island::new();

        // Each pass handles the earliest impact, then re-evaluates; bounded
        // by the per-contact sub-step cap.
        loop {
            let mut min_contact: Option<ContactHandle> = None;
            let mut min_alpha = 1.0f32;

            for idx in 0..self.contact_manager.toi_candidate_count() {
                let ch = self.contact_manager.ordered()[idx];
                let Some(contact) = self.contact_manager.contacts.get(ch) else {
                    continue;
                };
                if !contact.enabled || contact.toi_count as usize > MAX_TOI_SUBSTEPS {
                    continue;
                }

                let alpha = if contact.toi_valid {
                    contact.toi
                } else {
                    let Some(alpha) = self.compute_contact_toi(ch) else {
                        continue;
                    };
                    alpha
                };
                if alpha < min_alpha {
                    min_alpha = alpha;
                    min_contact = Some(ch);
                }
            }

            let Some(ch) = min_contact else {
                break;
            };
            if min_alpha >= 1.0 - 10.0 * f32::EPSILON {
                break;
            }

            self.profile.toi_substeps += 1;
            self.advance_and_solve(ch, min_alpha, step, &mut island);
        }
    }

    /// Compute and cache the normalized impact time for one contact.
    /// Returns `None` when the pair cannot produce a TOI this step.
    fn compute_contact_toi(&mut self, ch: ContactHandle) -> Option<f32> {
        let contact = self.contact_manager.contacts.get(ch)?;
        let (fh_a, fh_b) = (contact.fixture_a(), contact.fixture_b());
        let (bh_a, bh_b) = (contact.body_a, contact.body_b);
        let fa = self.fixtures.get(fh_a)?;
        let fb = self.fixtures.get(fh_b)?;
        let ba = self.bodies.get(bh_a)?;
        let bb = self.bodies.get(bh_b)?;

        let active_a = ba.is_awake() && ba.body_type() != BodyType::Static;
        let active_b = bb.is_awake() && bb.body_type() != BodyType::Static;
        if !active_a && !active_b {
            return None;
        }

        // Bring both sweeps to the later body's local time before querying.
        let alpha0 = ba.sweep.alpha0.max(bb.sweep.alpha0);
        if alpha0 >= 1.0 {
            return None;
        }
        let mut sweep_a = ba.sweep;
        let mut sweep_b = bb.sweep;
        if sweep_a.alpha0 < alpha0 {
            sweep_a.advance(alpha0);
        }
        if sweep_b.alpha0 < alpha0 {
            sweep_b.advance(alpha0);
        }

        self.profile.toi_queries += 1;
        let output = toi::time_of_impact(&toi::ToiInput {
            shape_a: &fa.shape,
            shape_b: &fb.shape,
            sweep_a,
            sweep_b,
            t_max: 1.0,
        });

        let alpha = if output.state == ToiState::Touching {
            (alpha0 + (1.0 - alpha0) * output.t).min(1.0)
        } else {
            1.0
        };
        let contact = self.contact_manager.contacts.get_mut(ch)?;
        contact.toi = alpha;
        contact.toi_valid = true;
        Some(alpha)
    }

    /// Advance the impacting pair to its TOI, re-collide there, and run a
    /// restricted sub-step solve over the pair and its neighborhood.
    fn advance_and_solve(
        &mut self,
        ch: ContactHandle,
        min_alpha: f32,
        step: &TimeStep,
        island: &mut Island,
    ) {
        let Some(contact) = self.contact_manager.contacts.get(ch) else {
            return;
        };
        let (bh_a, bh_b) = (contact.body_a, contact.body_b);

        let (Some(backup_a), Some(backup_b)) = (
            self.bodies.get(bh_a).map(|b| b.sweep),
            self.bodies.get(bh_b).map(|b| b.sweep),
        ) else {
            return;
        };

        for bh in [bh_a, bh_b] {
            if let Some(body) = self.bodies.get_mut(bh) {
                body.advance(min_alpha);
            }
        }

        // Re-collide at the impact time.
        self.contact_manager.update_contact(
            ch,
            &self.fixtures,
            &self.bodies,
            self.listener.as_deref_mut(),
        );
        if let Some(contact) = self.contact_manager.contacts.get_mut(ch) {
            contact.toi_valid = false;
            contact.toi_count += 1;
        }

        let still_touching = self
            .contact_manager
            .contacts
            .get(ch)
            .is_some_and(|c| c.enabled && c.touching);
        if !still_touching {
            // Grazing pass: restore the sweeps and ignore this contact for
            // the rest of the step.
            if let Some(contact) = self.contact_manager.contacts.get_mut(ch) {
                contact.enabled = false;
            }
            restore_sweep(&mut self.bodies, bh_a, backup_a);
            restore_sweep(&mut self.bodies, bh_b, backup_b);
            return;
        }

        for bh in [bh_a, bh_b] {
            if let Some(body) = self.bodies.get_mut(bh) {
                body.wake();
            }
        }

        // Seed the sub-step island with the impacting pair.
        island.clear();
        for bh in [bh_a, bh_b] {
            if let Some(body) = self.bodies.get_mut(bh) {
                body.island_flag = true;
                island.add_body(bh, body);
            }
        }
        if let Some(contact) = self.contact_manager.contacts.get_mut(ch) {
            contact.island_flag = true;
        }
        island.add_contact(ch);

        // Pull in contacts of the two bodies so the sub-solve sees the
        // local environment.
        for bh in [bh_a, bh_b] {
            let is_dynamic = self
                .bodies
                .get(bh)
                .is_some_and(|b| b.body_type() == BodyType::Dynamic);
            if !is_dynamic {
                continue;
            }
            let edges: Vec<ContactHandle> = match self.bodies.get(bh) {
                Some(body) => body.contacts.clone(),
                None => continue,
            };
            for edge in edges {
                let Some(contact) = self.contact_manager.contacts.get(edge) else {
                    continue;
                };
                if contact.island_flag || !contact.enabled {
                    continue;
                }
                let other = if contact.body_a == bh {
                    contact.body_b
                } else {
                    contact.body_a
                };
                let Some(other_body) = self.bodies.get(other) else {
                    continue;
                };

                // Mid-substep, only bullets chase moving dynamic bodies.
                let body_is_bullet = self.bodies.get(bh).is_some_and(|b| b.is_bullet());
                if other_body.body_type() == BodyType::Dynamic
                    && !body_is_bullet
                    && !other_body.is_bullet()
                {
                    continue;
                }

                let other_in_island = other_body.island_flag;
                let other_backup = other_body.sweep;
                if !other_in_island {
                    if let Some(other_body) = self.bodies.get_mut(other) {
                        other_body.advance(min_alpha);
                    }
                }

                self.contact_manager.update_contact(
                    edge,
                    &self.fixtures,
                    &self.bodies,
                    self.listener.as_deref_mut(),
                );
                let live = self
                    .contact_manager
                    .contacts
                    .get(edge)
                    .is_some_and(|c| c.enabled && c.touching);
                if !live {
                    if !other_in_island {
                        restore_sweep(&mut self.bodies, other, other_backup);
                    }
                    continue;
                }

                if let Some(contact) = self.contact_manager.contacts.get_mut(edge) {
                    contact.island_flag = true;
                }
                island.add_contact(edge);

                if !other_in_island {
                    if let Some(other_body) = self.bodies.get_mut(other) {
                        other_body.island_flag = true;
                        if other_body.body_type() != BodyType::Static {
                            other_body.wake();
                        }
                        island.add_body(other, other_body);
                    }
                }
            }
        }

        let sub_step = TimeStep::new(
            (1.0 - min_alpha) * step.dt,
            0.0,
            TOI_VELOCITY_ITERATIONS,
            TOI_POSITION_ITERATIONS,
            false,
        );
        island.prepare_toi(&self.bodies, &self.contact_manager.contacts, &self.fixtures);
        island.solve_toi(&sub_step, 0, 1, self.listener.as_deref());
        island.finish_toi(&mut self.bodies);

        // The sub-island bodies moved: refresh proxies and invalidate the
        // cached TOIs of everything they touch.
        let members: Vec<BodyHandle> = island.bodies.clone();
        for bh in members {
            if let Some(body) = self.bodies.get_mut(bh) {
                body.island_flag = false;
                if body.body_type() != BodyType::Dynamic {
                    continue;
                }
            } else {
                continue;
            }
            self.synchronize_fixtures(bh);

            let edges: Vec<ContactHandle> = match self.bodies.get(bh) {
                Some(body) => body.contacts.clone(),
                None => continue,
            };
            for edge in edges {
                if let Some(contact) = self.contact_manager.contacts.get_mut(edge) {
                    contact.island_flag = false;
                    contact.toi_valid = false;
                }
            }
        }

        // New overlaps created by the sub-step motion join immediately.
        self.find_new_contacts();
    }

    /// Partition invariant check. Test support.
    #[cfg(test)]
    pub(crate) fn toi_partition_ok(&self) -> bool {
        self.contact_manager.partition_ok(&self.bodies)
    }
}

fn restore_sweep(bodies: &mut Arena<Body>, handle: BodyHandle, sweep: Sweep) {
    if let Some(body) = bodies.get_mut(handle) {
        body.sweep = sweep;
        body.synchronize_transform();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyDef;
    use crate::shapes::Shape;

    fn overlapping_stack() -> (World, BodyHandle, BodyHandle) {
        let mut world = World::new(WorldConfig::default());
        let floor = world.create_body(&BodyDef::default()).unwrap();
        world
            .create_fixture(floor, &FixtureDef::new(Shape::rect(10.0, 1.0)))
            .unwrap();
        let a = world
            .create_body(&BodyDef::dynamic().at(Vec2::new(0.0, 1.45)))
            .unwrap();
        world
            .create_fixture(a, &FixtureDef::new(Shape::rect(0.5, 0.5)))
            .unwrap();
        let b = world
            .create_body(&BodyDef::dynamic().at(Vec2::new(0.6, 1.45)))
            .unwrap();
        world
            .create_fixture(b, &FixtureDef::new(Shape::rect(0.5, 0.5)))
            .unwrap();
        (world, a, b)
    }

    #[test]
    fn bullet_toggles_keep_the_toi_partition() {
        let (mut world, a, _) = overlapping_stack();
        world.step(1.0 / 60.0, 8, 3);
        assert!(world.toi_partition_ok());

        // The dynamic-vs-dynamic contact crosses the boundary both ways.
        world.set_bullet(a, true).unwrap();
        assert!(world.toi_partition_ok());
        world.set_bullet(a, false).unwrap();
        assert!(world.toi_partition_ok());
    }

    #[test]
    fn type_changes_keep_the_toi_partition() {
        let (mut world, _, b) = overlapping_stack();
        world.step(1.0 / 60.0, 8, 3);
        assert!(world.toi_partition_ok());

        world.set_body_type(b, BodyType::Kinematic).unwrap();
        assert!(world.toi_partition_ok());
        world.step(1.0 / 60.0, 8, 3);
        assert!(world.toi_partition_ok());

        world.set_body_type(b, BodyType::Dynamic).unwrap();
        world.step(1.0 / 60.0, 8, 3);
        assert!(world.toi_partition_ok());
    }
}
