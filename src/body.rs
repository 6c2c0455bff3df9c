//! Rigid Bodies and Fixtures
//!
//! A body carries the dynamic state (transform, sweep, velocities, mass);
//! fixtures attach shapes, material properties, and a collision filter to
//! it. Bodies and fixtures live in generational arenas owned by the world;
//! everything here references them by handle.

use crate::arena::Handle;
use crate::contact::Contact;
use crate::joint::Joint;
use crate::math::{Sweep, Transform, Vec2};
use crate::shapes::Shape;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

pub type BodyHandle = Handle<Body>;
pub type FixtureHandle = Handle<Fixture>;
pub type JointHandle = Handle<Joint>;
pub(crate) type ContactHandle = Handle<Contact>;

/// How a body participates in the simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyType {
    /// Zero mass, zero velocity, moved only by [`crate::world::World::set_transform`]
    Static,
    /// Zero mass, velocity set by the user, unaffected by forces
    Kinematic,
    /// Positive mass, fully simulated
    Dynamic,
}

/// Category/mask/group collision filter.
///
/// Two fixtures collide when each one's mask accepts the other's category,
/// unless they share a non-zero group: a positive shared group always
/// collides, a negative one never does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Filter {
    pub category: u16,
    pub mask: u16,
    pub group: i16,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            category: 0x0001,
            mask: 0xFFFF,
            group: 0,
        }
    }
}

impl Filter {
    #[must_use]
    pub fn accepts(&self, other: &Filter) -> bool {
        if self.group == other.group && self.group != 0 {
            return self.group > 0;
        }
        (self.mask & other.category) != 0 && (other.mask & self.category) != 0
    }
}

/// Blueprint for [`crate::world::World::create_body`].
#[derive(Clone, Copy, Debug)]
pub struct BodyDef {
    pub body_type: BodyType,
    pub position: Vec2,
    pub angle: f32,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    /// Starts awake
    pub awake: bool,
    /// May be put to sleep by the island solver
    pub allow_sleep: bool,
    /// Rotation locked (infinite inertia)
    pub fixed_rotation: bool,
    /// Swept through the step by the TOI pass instead of tunneling
    pub bullet: bool,
    pub gravity_scale: f32,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            position: Vec2::ZERO,
            angle: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            awake: true,
            allow_sleep: true,
            fixed_rotation: false,
            bullet: false,
            gravity_scale: 1.0,
        }
    }
}

impl BodyDef {
    #[must_use]
    pub fn dynamic() -> Self {
        Self {
            body_type: BodyType::Dynamic,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn at(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }

    #[must_use]
    pub fn with_velocity(mut self, v: Vec2) -> Self {
        self.linear_velocity = v;
        self
    }

    #[must_use]
    pub fn as_bullet(mut self) -> Self {
        self.bullet = true;
        self
    }
}

/// Blueprint for [`crate::world::World::create_fixture`].
#[derive(Clone, Debug)]
pub struct FixtureDef {
    pub shape: Shape,
    /// kg/m²
    pub density: f32,
    pub friction: f32,
    pub restitution: f32,
    pub filter: Filter,
}

impl FixtureDef {
    #[must_use]
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            density: 1.0,
            friction: 0.2,
            restitution: 0.0,
            filter: Filter::default(),
        }
    }
}

/// A shape attached to a body.
#[derive(Clone, Debug)]
pub struct Fixture {
    pub(crate) body: BodyHandle,
    pub shape: Shape,
    pub density: f32,
    pub friction: f32,
    pub restitution: f32,
    pub filter: Filter,
    /// Leaf in the broad-phase tree
    pub(crate) proxy: u32,
}

impl Fixture {
    /// Owning body.
    #[inline]
    #[must_use]
    pub fn body(&self) -> BodyHandle {
        self.body
    }
}

/// A rigid body.
#[derive(Clone, Debug)]
pub struct Body {
    pub(crate) body_type: BodyType,
    /// Current transform (origin, not center of mass)
    pub(crate) xf: Transform,
    /// Center-of-mass motion over the current step
    pub(crate) sweep: Sweep,

    pub(crate) linear_velocity: Vec2,
    pub(crate) angular_velocity: f32,
    pub(crate) force: Vec2,
    pub(crate) torque: f32,

    pub(crate) mass: f32,
    pub(crate) inv_mass: f32,
    /// Rotational inertia about the center of mass
    pub(crate) inertia: f32,
    pub(crate) inv_inertia: f32,

    pub(crate) linear_damping: f32,
    pub(crate) angular_damping: f32,
    pub(crate) gravity_scale: f32,

    pub(crate) sleep_time: f32,
    pub(crate) awake: bool,
    pub(crate) allow_sleep: bool,
    pub(crate) fixed_rotation: bool,
    pub(crate) bullet: bool,

    pub(crate) fixtures: Vec<FixtureHandle>,
    pub(crate) contacts: Vec<ContactHandle>,
    pub(crate) joints: Vec<JointHandle>,

    /// Scratch used by the island builder within one step
    pub(crate) island_flag: bool,
    pub(crate) island_index: u32,
}

impl Body {
    pub(crate) fn new(def: &BodyDef) -> Self {
        let xf = Transform::new(def.position, def.angle);
        let sweep = Sweep {
            local_center: Vec2::ZERO,
            c0: def.position,
            c: def.position,
            a0: def.angle,
            a: def.angle,
            alpha0: 0.0,
        };
        let (mass, inv_mass) = if def.body_type == BodyType::Dynamic {
            (1.0, 1.0)
        } else {
            (0.0, 0.0)
        };
        Self {
            body_type: def.body_type,
            xf,
            sweep,
            linear_velocity: def.linear_velocity,
            angular_velocity: def.angular_velocity,
            force: Vec2::ZERO,
            torque: 0.0,
            mass,
            inv_mass,
            inertia: 0.0,
            inv_inertia: 0.0,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            gravity_scale: def.gravity_scale,
            sleep_time: 0.0,
            awake: def.awake && def.body_type != BodyType::Static,
            allow_sleep: def.allow_sleep,
            fixed_rotation: def.fixed_rotation,
            bullet: def.bullet,
            fixtures: Vec::new(),
            contacts: Vec::new(),
            joints: Vec::new(),
            island_flag: false,
            island_index: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    #[inline]
    #[must_use]
    pub fn transform(&self) -> Transform {
        self.xf
    }

    #[inline]
    #[must_use]
    pub fn position(&self) -> Vec2 {
        self.xf.p
    }

    #[inline]
    #[must_use]
    pub fn angle(&self) -> f32 {
        self.sweep.a
    }

    #[inline]
    #[must_use]
    pub fn world_center(&self) -> Vec2 {
        self.sweep.c
    }

    #[inline]
    #[must_use]
    pub fn linear_velocity(&self) -> Vec2 {
        self.linear_velocity
    }

    #[inline]
    #[must_use]
    pub fn angular_velocity(&self) -> f32 {
        self.angular_velocity
    }

    #[inline]
    #[must_use]
    pub fn mass(&self) -> f32 {
        self.mass
    }

    #[inline]
    #[must_use]
    pub fn is_awake(&self) -> bool {
        self.awake
    }

    #[inline]
    #[must_use]
    pub fn is_bullet(&self) -> bool {
        self.bullet
    }

    /// Fixtures attached to this body.
    #[must_use]
    pub fn fixtures(&self) -> &[FixtureHandle] {
        &self.fixtures
    }

    pub fn set_linear_velocity(&mut self, v: Vec2) {
        if self.body_type == BodyType::Static {
            return;
        }
        if v.length_squared() > 0.0 {
            self.wake();
        }
        self.linear_velocity = v;
    }

    pub fn set_angular_velocity(&mut self, w: f32) {
        if self.body_type == BodyType::Static {
            return;
        }
        if w * w > 0.0 {
            self.wake();
        }
        self.angular_velocity = w;
    }

    /// Accumulate a force at the center of mass for this step.
    pub fn apply_force(&mut self, force: Vec2) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.wake();
        self.force += force;
    }

    /// Accumulate a force at a world point, inducing torque.
    pub fn apply_force_at(&mut self, force: Vec2, point: Vec2) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.wake();
        self.force += force;
        self.torque += (point - self.sweep.c).cross(force);
    }

    pub fn apply_torque(&mut self, torque: f32) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.wake();
        self.torque += torque;
    }

    /// Instantaneous momentum change at a world point.
    pub fn apply_linear_impulse(&mut self, impulse: Vec2, point: Vec2) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.wake();
        self.linear_velocity += self.inv_mass * impulse;
        self.angular_velocity += self.inv_inertia * (point - self.sweep.c).cross(impulse);
    }

    pub(crate) fn wake(&mut self) {
        if self.body_type == BodyType::Static {
            return;
        }
        // Reset the sleep timer only on the transition, so a body that
        // stays awake can still accumulate idle time toward sleeping.
        if !self.awake {
            self.awake = true;
            self.sleep_time = 0.0;
        }
    }

    pub(crate) fn sleep(&mut self) {
        self.awake = false;
        self.sleep_time = 0.0;
        self.linear_velocity = Vec2::ZERO;
        self.angular_velocity = 0.0;
        self.force = Vec2::ZERO;
        self.torque = 0.0;
    }

    /// Recompute `xf` from the end-of-sweep state.
    pub(crate) fn synchronize_transform(&mut self) {
        self.xf = Transform::new(Vec2::ZERO, self.sweep.a);
        self.xf.p = self.sweep.c - self.xf.q.apply(self.sweep.local_center);
    }

    /// Advance the sweep origin to `alpha` and adopt it as the transform.
    /// Used by the TOI pass to move a body to its time of impact.
    pub(crate) fn advance(&mut self, alpha: f32) {
        self.sweep.advance(alpha);
        self.sweep.c = self.sweep.c0;
        self.sweep.a = self.sweep.a0;
        self.synchronize_transform();
    }

    /// Install new mass properties; velocity is preserved.
    pub(crate) fn set_mass_data(&mut self, mass: f32, center: Vec2, inertia_about_origin: f32) {
        debug_assert!(self.body_type == BodyType::Dynamic);
        let old_center = self.sweep.c;

        self.mass = if mass > 0.0 { mass } else { 1.0 };
        self.inv_mass = 1.0 / self.mass;

        if self.fixed_rotation {
            self.inertia = 0.0;
            self.inv_inertia = 0.0;
        } else {
            // Shift inertia from the body origin to the center of mass.
            let i = inertia_about_origin - self.mass * center.length_squared();
            self.inertia = if i > 0.0 { i } else { 0.0 };
            self.inv_inertia = if i > 0.0 { 1.0 / i } else { 0.0 };
        }

        self.sweep.local_center = center;
        self.sweep.c = self.xf.apply(center);
        self.sweep.c0 = self.sweep.c;

        // The center moved; keep the world-space velocity of the new center.
        self.linear_velocity +=
            crate::math::cross_sv(self.angular_velocity, self.sweep.c - old_center);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_defaults_collide() {
        let a = Filter::default();
        let b = Filter::default();
        assert!(a.accepts(&b));
    }

    #[test]
    fn filter_group_overrides_mask() {
        let mut a = Filter::default();
        let mut b = Filter::default();
        a.group = -3;
        b.group = -3;
        assert!(!a.accepts(&b), "shared negative group never collides");
        a.group = 3;
        b.group = 3;
        a.mask = 0;
        assert!(a.accepts(&b), "shared positive group always collides");
    }

    #[test]
    fn filter_mask_category() {
        let a = Filter {
            category: 0x0002,
            mask: 0x0004,
            group: 0,
        };
        let b = Filter {
            category: 0x0004,
            mask: 0x0002,
            group: 0,
        };
        let c = Filter {
            category: 0x0008,
            mask: 0xFFFF,
            group: 0,
        };
        assert!(a.accepts(&b));
        assert!(!a.accepts(&c));
    }

    #[test]
    fn static_body_has_no_mass_and_stays_asleep() {
        let body = Body::new(&BodyDef::default());
        assert_eq!(body.inv_mass, 0.0);
        assert!(!body.is_awake());
    }

    #[test]
    fn impulse_changes_velocity_through_mass() {
        let mut body = Body::new(&BodyDef::dynamic());
        body.set_mass_data(2.0, Vec2::ZERO, 1.0);
        body.apply_linear_impulse(Vec2::new(4.0, 0.0), body.world_center());
        assert!((body.linear_velocity().x - 2.0).abs() < 1e-6);
    }

    #[test]
    fn mass_data_shifts_inertia_to_center() {
        let mut body = Body::new(&BodyDef::dynamic());
        // Unit mass at center (1, 0): inertia about origin includes m*d².
        body.set_mass_data(1.0, Vec2::new(1.0, 0.0), 2.0);
        assert!((body.inertia - 1.0).abs() < 1e-6);
    }
}
