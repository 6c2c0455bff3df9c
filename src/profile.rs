//! Step Profiling
//!
//! Deterministic per-step counters for the pipeline stages. Counts work
//! items rather than wall-clock time so profiles are reproducible and
//! available without `std`.

/// Counters for the most recent [`crate::world::World::step`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Profile {
    /// Proxies drained from the broad-phase move buffer
    pub moved_proxies: u32,
    /// Candidate pairs emitted by the tree queries (before dedup)
    pub raw_pairs: u32,
    /// Contacts created this step
    pub contacts_created: u32,
    /// Contacts destroyed this step
    pub contacts_destroyed: u32,
    /// Narrow-phase manifold evaluations
    pub narrow_tests: u32,
    /// Contacts currently touching after the collide phase
    pub touching_contacts: u32,
    /// Begin-touch events delivered
    pub begin_events: u32,
    /// End-touch events delivered
    pub end_events: u32,
    /// Islands solved
    pub islands: u32,
    /// Bodies solved across all islands
    pub island_bodies: u32,
    /// Largest island, in bodies
    pub max_island_bodies: u32,
    /// Bodies put to sleep this step
    pub bodies_slept: u32,
    /// TOI sub-steps executed
    pub toi_substeps: u32,
    /// Conservative-advancement root findings performed
    pub toi_queries: u32,
}

impl Profile {
    /// Zero all counters at the start of a step.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
