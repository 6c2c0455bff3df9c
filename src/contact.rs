//! Persistent Contacts
//!
//! A contact exists for as long as two fixtures' fat AABBs overlap, whether
//! or not the shapes actually touch. It carries the manifold between steps
//! so the solver can warm-start, and a handful of flags the pipeline uses
//! to route it through the collide, island, and TOI phases.

use crate::body::{Body, BodyHandle, BodyType, Fixture, FixtureHandle};
use crate::math::sqrt;
use crate::narrow::Manifold;

/// A persistent contact between two fixtures.
#[derive(Clone, Debug)]
pub struct Contact {
    pub(crate) fixture_a: FixtureHandle,
    pub(crate) fixture_b: FixtureHandle,
    pub(crate) body_a: BodyHandle,
    pub(crate) body_b: BodyHandle,

    pub(crate) manifold: Manifold,
    pub(crate) friction: f32,
    pub(crate) restitution: f32,

    /// Shapes overlap (not just fat AABBs)
    pub(crate) touching: bool,
    /// Cleared by `pre_solve` hooks to skip solving for one step
    pub(crate) enabled: bool,
    /// Island builder scratch
    pub(crate) island_flag: bool,
    /// Filter must be re-checked in the next collide phase
    pub(crate) refilter: bool,

    /// Cached time of impact for the current TOI sub-step
    pub(crate) toi: f32,
    pub(crate) toi_valid: bool,
    /// Sub-steps already spent on this contact this step
    pub(crate) toi_count: u32,

    /// Position in the contact manager's ordered list. Maintained so the
    /// TOI-candidate prefix can be kept partitioned with O(1) swaps.
    pub(crate) order_index: u32,
}

impl Contact {
    pub(crate) fn new(
        fixture_a: FixtureHandle,
        body_a: BodyHandle,
        fixture_b: FixtureHandle,
        body_b: BodyHandle,
        a: &Fixture,
        b: &Fixture,
    ) -> Self {
        Self {
            fixture_a,
            fixture_b,
            body_a,
            body_b,
            manifold: Manifold::default(),
            friction: mix_friction(a.friction, b.friction),
            restitution: mix_restitution(a.restitution, b.restitution),
            touching: false,
            enabled: true,
            island_flag: false,
            refilter: false,
            toi: 0.0,
            toi_valid: false,
            toi_count: 0,
            order_index: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn fixture_a(&self) -> FixtureHandle {
        self.fixture_a
    }

    #[inline]
    #[must_use]
    pub fn fixture_b(&self) -> FixtureHandle {
        self.fixture_b
    }

    #[inline]
    #[must_use]
    pub fn is_touching(&self) -> bool {
        self.touching
    }

    #[inline]
    #[must_use]
    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    /// Refresh mixed material properties after a fixture changed.
    pub(crate) fn reset_materials(&mut self, a: &Fixture, b: &Fixture) {
        self.friction = mix_friction(a.friction, b.friction);
        self.restitution = mix_restitution(a.restitution, b.restitution);
    }

    /// Whether this contact belongs in the TOI-candidate prefix: continuous
    /// collision only runs bullets against anything and dynamic bodies
    /// against non-dynamic ones.
    pub(crate) fn is_toi_candidate(body_a: &Body, body_b: &Body) -> bool {
        body_a.bullet
            || body_b.bullet
            || body_a.body_type != BodyType::Dynamic
            || body_b.body_type != BodyType::Dynamic
    }
}

/// Geometric mean, so one slippery surface dominates.
#[inline]
#[must_use]
pub fn mix_friction(f1: f32, f2: f32) -> f32 {
    sqrt(f1 * f2)
}

/// Maximum, so one bouncy surface dominates.
#[inline]
#[must_use]
pub fn mix_restitution(r1: f32, r2: f32) -> f32 {
    if r1 > r2 {
        r1
    } else {
        r2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyDef;

    #[test]
    fn friction_mixing_is_geometric() {
        assert!((mix_friction(0.4, 0.9) - sqrt(0.36)).abs() < 1e-6);
        assert_eq!(mix_friction(0.0, 1.0), 0.0);
    }

    #[test]
    fn restitution_mixing_is_max() {
        assert_eq!(mix_restitution(0.2, 0.8), 0.8);
    }

    #[test]
    fn toi_candidacy() {
        let dynamic = Body::new(&BodyDef::dynamic());
        let static_body = Body::new(&BodyDef::default());
        let bullet = Body::new(&BodyDef::dynamic().as_bullet());

        assert!(!Contact::is_toi_candidate(&dynamic, &dynamic));
        assert!(Contact::is_toi_candidate(&dynamic, &static_body));
        assert!(Contact::is_toi_candidate(&bullet, &dynamic));
    }
}
