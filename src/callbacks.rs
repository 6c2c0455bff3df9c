//! World Callbacks
//!
//! User hooks into the contact pipeline. Deterministic callbacks
//! (`begin_contact`, `end_contact`, `pre_solve`, `post_solve`) are queued
//! during the parallel phases and delivered single-threaded in contact
//! order, so they see the same sequence on every run regardless of worker
//! count. Each has an `*_immediate` twin that fires from inside a worker
//! the moment the event is detected; those run concurrently and in
//! nondeterministic order, and must be cheap and thread-safe. An immediate
//! hook returns `true` to consume the event, suppressing the deferred
//! deterministic delivery.

use crate::body::{BodyHandle, Fixture, FixtureHandle, JointHandle};
use crate::narrow::Manifold;
use crate::settings::MAX_MANIFOLD_POINTS;

/// Read-only snapshot of a contact, valid for the duration of a callback.
#[derive(Clone, Copy)]
pub struct ContactView<'a> {
    pub fixture_a: FixtureHandle,
    pub fixture_b: FixtureHandle,
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub manifold: &'a Manifold,
    pub touching: bool,
}

/// Restricted mutation handle passed to [`ContactListener::pre_solve_immediate`].
///
/// Worker phases never mutate shared state, so an immediate hook cannot
/// touch the contact itself; the only legal effect, disabling the contact
/// for this step, is staged on the worker's own update record and applied
/// during the deterministic merge.
pub struct ImmediateContact<'a> {
    pub view: ContactView<'a>,
    enabled: &'a mut bool,
}

impl<'a> ImmediateContact<'a> {
    pub(crate) fn new(view: ContactView<'a>, enabled: &'a mut bool) -> Self {
        Self { view, enabled }
    }

    /// Skip this contact in the solver for the current step only.
    pub fn disable(&mut self) {
        *self.enabled = false;
    }

    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        *self.enabled
    }
}

/// Impulses applied by the solver to one contact, for `post_solve`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContactImpulse {
    pub normal_impulses: [f32; MAX_MANIFOLD_POINTS],
    pub tangent_impulses: [f32; MAX_MANIFOLD_POINTS],
    pub count: usize,
}

/// Decides whether two fixtures may collide. Consulted once per contact
/// creation, and again for existing contacts after
/// [`crate::world::World::refilter_fixture`].
pub trait ContactFilter: Send + Sync {
    fn should_collide(&self, a: &Fixture, b: &Fixture) -> bool {
        a.filter.accepts(&b.filter)
    }
}

/// The category/mask/group rules from [`crate::body::Filter`], unmodified.
pub struct DefaultFilter;

impl ContactFilter for DefaultFilter {}

/// Contact lifecycle hooks.
///
/// The deterministic methods take `&mut self` and run single-threaded; the
/// immediate ones take `&self` and may run concurrently from any worker.
#[allow(unused_variables)]
pub trait ContactListener: Send + Sync {
    /// Two fixtures started touching.
    fn begin_contact(&mut self, contact: ContactView<'_>) {}

    /// Two fixtures stopped touching (or their contact was destroyed while
    /// touching).
    fn end_contact(&mut self, contact: ContactView<'_>) {}

    /// A touching contact is about to be solved. `old_manifold` is the
    /// manifold from before this step's narrow phase. The contact may be
    /// disabled through the handle.
    fn pre_solve(&mut self, contact: &mut ImmediateContact<'_>, old_manifold: &Manifold) {}

    /// The solver finished with this contact; `impulse` holds the applied
    /// normal and tangent impulses.
    fn post_solve(&mut self, contact: ContactView<'_>, impulse: &ContactImpulse) {}

    /// Racy twin of [`Self::begin_contact`]. Return true to consume the
    /// event.
    fn begin_contact_immediate(&self, contact: ContactView<'_>) -> bool {
        false
    }

    /// Racy twin of [`Self::end_contact`]. Return true to consume the
    /// event.
    fn end_contact_immediate(&self, contact: ContactView<'_>) -> bool {
        false
    }

    /// Racy twin of [`Self::pre_solve`]; may disable the contact through
    /// the handle. Return true to consume the event.
    fn pre_solve_immediate(
        &self,
        contact: &mut ImmediateContact<'_>,
        old_manifold: &Manifold,
    ) -> bool {
        false
    }

    /// Racy twin of [`Self::post_solve`]. Return true to consume the
    /// event.
    fn post_solve_immediate(&self, contact: ContactView<'_>, impulse: &ContactImpulse) -> bool {
        false
    }
}

/// Notified when destroying one object implicitly destroys another.
#[allow(unused_variables)]
pub trait DestructionListener {
    /// A fixture was destroyed because its body was destroyed.
    fn fixture_destroyed(&mut self, fixture: FixtureHandle) {}

    /// A joint was destroyed because one of its bodies was destroyed.
    fn joint_destroyed(&mut self, joint: JointHandle) {}
}
