//! # impulse2d
//!
//! **Deterministic 2D Rigid-Body Physics Core**
//!
//! A Rust library implementing the concurrent collision pipeline and
//! constraint-island solver of a 2D physics engine: swept broad phase over
//! a balanced AABB tree, persistent contacts with warm starting, sequential
//! impulse islands, and time-of-impact sub-stepping for fast bodies.
//!
//! ## Features
//!
//! | Stage | Structure | Parallelism |
//! |-------|-----------|-------------|
//! | **Spatial index** | SAH-built AVL AABB tree | read-only queries |
//! | **Broad phase** | move buffer + tree queries | disjoint buffer ranges |
//! | **Narrow phase** | SAT clipping / GJK distance | disjoint contact ranges |
//! | **Islands** | flood-filled components | one worker per island |
//! | **Continuous** | conservative advancement | sequential sub-steps |
//!
//! ## Design Principles
//!
//! - **Determinism**: parallel phases defer their effects into per-worker
//!   buffers and merge them in data order, so any worker count produces
//!   bit-identical simulations
//! - **No sharing**: workers get read-only views plus their own context;
//!   there are no locks and no atomics in the pipeline
//! - **no_std Compatible**: the core runs without `std` (math via `libm`);
//!   `parallel` adds a rayon-backed execution of the worker phases
//!
//! ## Quick Start
//!
//! ```rust
//! use impulse2d::prelude::*;
//!
//! let mut world = World::new(WorldConfig::default());
//!
//! // A static floor
//! let floor = world.create_body(&BodyDef::default()).unwrap();
//! world
//!     .create_fixture(floor, &FixtureDef::new(Shape::rect(50.0, 1.0)))
//!     .unwrap();
//!
//! // A falling box
//! let body = world
//!     .create_body(&BodyDef::dynamic().at(Vec2::new(0.0, 10.0)))
//!     .unwrap();
//! world
//!     .create_fixture(body, &FixtureDef::new(Shape::rect(0.5, 0.5)))
//!     .unwrap();
//!
//! for _ in 0..60 {
//!     world.step(1.0 / 60.0, 8, 3);
//! }
//! assert!(world.body(body).unwrap().position().y < 10.0);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(all(not(feature = "std"), not(feature = "libm")))]
compile_error!("impulse2d requires either the `std` or the `libm` feature");

pub mod arena;
pub mod body;
pub mod broad_phase;
pub mod callbacks;
pub mod config;
pub mod contact;
pub mod dynamic_tree;
pub mod error;
pub mod joint;
pub mod math;
pub mod narrow;
pub mod profile;
pub mod settings;
pub mod shapes;
pub mod world;

mod contact_manager;
mod island;
mod toi;
mod worker;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::body::{
        Body, BodyDef, BodyHandle, BodyType, Filter, Fixture, FixtureDef, FixtureHandle,
        JointHandle,
    };
    pub use crate::callbacks::{
        ContactFilter, ContactImpulse, ContactListener, ContactView, DestructionListener,
        ImmediateContact,
    };
    pub use crate::config::WorldConfig;
    pub use crate::contact::Contact;
    pub use crate::error::PhysicsError;
    pub use crate::joint::{DistanceJointDef, JointType};
    pub use crate::math::{Aabb, Rot, Transform, Vec2};
    pub use crate::narrow::Manifold;
    pub use crate::profile::Profile;
    pub use crate::shapes::Shape;
    pub use crate::world::{RayHit, World};
}

// Re-export main types at crate root
pub use prelude::*;
