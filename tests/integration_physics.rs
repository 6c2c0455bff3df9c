//! Integration tests for impulse2d
//!
//! End-to-end behaviour of the step pipeline through the public API only:
//! pair search, narrow phase, island solving, contact events, sleeping,
//! and the continuous (TOI) pass. Every test is deterministic.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use impulse2d::prelude::*;

// ============================================================================
// Helpers
// ============================================================================

const DT: f32 = 1.0 / 60.0;

/// Run a world for `steps` frames at 60 Hz with the default iteration counts.
fn run_world(world: &mut World, steps: usize) {
    for _ in 0..steps {
        world.step(DT, 8, 3);
    }
}

fn zero_gravity() -> WorldConfig {
    WorldConfig {
        gravity: Vec2::ZERO,
        ..WorldConfig::default()
    }
}

/// Static floor spanning the scene, top surface at y = 1.
fn add_floor(world: &mut World) -> BodyHandle {
    let floor = world.create_body(&BodyDef::default()).unwrap();
    world
        .create_fixture(floor, &FixtureDef::new(Shape::rect(50.0, 1.0)))
        .unwrap();
    floor
}

// ============================================================================
// Test 1 — Free fall matches the integrator closed form
// ============================================================================

/// A lone dynamic body under gravity follows the semi-implicit Euler
/// trajectory exactly: y_n = y_0 + g*dt^2 * n*(n+1)/2.
#[test]
fn free_fall_trajectory() {
    let mut world = World::new(WorldConfig::default());
    let body = world
        .create_body(&BodyDef::dynamic().at(Vec2::new(0.0, 10.0)))
        .unwrap();
    world
        .create_fixture(body, &FixtureDef::new(Shape::circle(0.5)))
        .unwrap();

    let steps = 60;
    run_world(&mut world, steps);

    let n = steps as f32;
    let expected = 10.0 - 9.81 * DT * DT * (n * (n + 1.0) / 2.0);
    let y = world.body(body).unwrap().position().y;
    assert!((y - expected).abs() < 1e-3, "y = {y}, expected {expected}");
}

// ============================================================================
// Test 2 — Worker count does not change the simulation
// ============================================================================

/// The same scene stepped with 1 and 4 worker lanes must produce bit-exact
/// identical positions: every parallel phase defers into per-worker buffers
/// and merges them in data order.
#[test]
fn determinism_across_worker_counts() {
    fn simulate(workers: usize) -> Vec<(u32, u32, u32)> {
        let mut world = World::new(WorldConfig {
            workers,
            ..WorldConfig::default()
        });
        add_floor(&mut world);

        // A small pyramid plus a rolling ball, enough for several islands
        // that merge over time.
        let mut handles = Vec::new();
        for row in 0..4 {
            for col in 0..(4 - row) {
                let x = col as f32 * 1.05 + row as f32 * 0.5;
                let y = 1.55 + row as f32 * 1.05;
                let h = world
                    .create_body(&BodyDef::dynamic().at(Vec2::new(x, y)))
                    .unwrap();
                world
                    .create_fixture(h, &FixtureDef::new(Shape::rect(0.5, 0.5)))
                    .unwrap();
                handles.push(h);
            }
        }
        let ball = world
            .create_body(
                &BodyDef::dynamic()
                    .at(Vec2::new(-6.0, 1.6))
                    .with_velocity(Vec2::new(5.0, 0.0)),
            )
            .unwrap();
        world
            .create_fixture(ball, &FixtureDef::new(Shape::circle(0.5)))
            .unwrap();
        handles.push(ball);

        run_world(&mut world, 120);

        handles
            .iter()
            .map(|&h| {
                let body = world.body(h).unwrap();
                (
                    body.position().x.to_bits(),
                    body.position().y.to_bits(),
                    body.angle().to_bits(),
                )
            })
            .collect()
    }

    let single = simulate(1);
    let quad = simulate(4);
    assert_eq!(single, quad, "positions diverged across worker counts");
}

// ============================================================================
// Test 3 — Begin/end contact events
// ============================================================================

#[derive(Default)]
struct EventLog {
    begins: usize,
    ends: usize,
}

struct Recorder(Arc<Mutex<EventLog>>);

impl ContactListener for Recorder {
    fn begin_contact(&mut self, _contact: ContactView<'_>) {
        self.0.lock().unwrap().begins += 1;
    }
    fn end_contact(&mut self, _contact: ContactView<'_>) {
        self.0.lock().unwrap().ends += 1;
    }
}

/// Two circles fly at each other, bounce (restitution 1), and separate:
/// exactly one begin-touch and one end-touch must be delivered.
#[test]
fn contact_events_on_approach_and_separation() {
    let log = Arc::new(Mutex::new(EventLog::default()));
    let mut world = World::new(zero_gravity());
    world.set_contact_listener(Box::new(Recorder(log.clone())));

    let mut bouncy = FixtureDef::new(Shape::circle(0.5));
    bouncy.restitution = 1.0;

    let a = world
        .create_body(
            &BodyDef::dynamic()
                .at(Vec2::new(-2.0, 0.0))
                .with_velocity(Vec2::new(2.0, 0.0)),
        )
        .unwrap();
    world.create_fixture(a, &bouncy).unwrap();
    let b = world
        .create_body(
            &BodyDef::dynamic()
                .at(Vec2::new(2.0, 0.0))
                .with_velocity(Vec2::new(-2.0, 0.0)),
        )
        .unwrap();
    world.create_fixture(b, &bouncy).unwrap();

    run_world(&mut world, 120);

    {
        let log = log.lock().unwrap();
        assert_eq!(log.begins, 1, "begin events");
        assert_eq!(log.ends, 1, "end events");
    }

    // Elastic head-on bounce: both reversed.
    assert!(world.body(a).unwrap().linear_velocity().x < 0.0);
    assert!(world.body(b).unwrap().linear_velocity().x > 0.0);
}

/// The contact record appears as soon as the fat AABBs overlap, several
/// steps before the shapes touch. In that window it must report
/// `is_touching() == false` with no begin event delivered; begin fires on
/// the step the manifold first gains points.
#[test]
fn contact_record_precedes_begin_touch() {
    let log = Arc::new(Mutex::new(EventLog::default()));
    let mut world = World::new(zero_gravity());
    world.set_contact_listener(Box::new(Recorder(log.clone())));

    for (x, vx) in [(-2.0, 1.0), (2.0, -1.0)] {
        let h = world
            .create_body(
                &BodyDef::dynamic()
                    .at(Vec2::new(x, 0.0))
                    .with_velocity(Vec2::new(vx, 0.0)),
            )
            .unwrap();
        world
            .create_fixture(h, &FixtureDef::new(Shape::rect(0.5, 0.5)))
            .unwrap();
    }

    let mut pending_steps = 0;
    let mut begin_step = None;
    for step in 0..120 {
        world.step(DT, 8, 3);
        let begins = log.lock().unwrap().begins;
        if begins == 0 && world.contact_count() == 1 {
            assert!(
                world.contacts().all(|c| !c.is_touching()),
                "contact touching before begin fired"
            );
            pending_steps += 1;
        }
        if begins == 1 && begin_step.is_none() {
            begin_step = Some(step);
            assert!(
                world
                    .contacts()
                    .any(|c| c.is_touching() && c.manifold().count > 0),
                "begin fired without manifold points"
            );
        }
    }

    assert!(
        pending_steps > 0,
        "no window where the contact existed untouched"
    );
    assert!(begin_step.is_some(), "begin never fired");
    assert_eq!(log.lock().unwrap().begins, 1);
}

// ============================================================================
// Test 4 — Immediate hooks consume deferred delivery
// ============================================================================

struct ImmediateConsumer {
    immediate_begins: AtomicUsize,
    deferred: Arc<Mutex<EventLog>>,
}

impl ContactListener for ImmediateConsumer {
    fn begin_contact(&mut self, _contact: ContactView<'_>) {
        self.deferred.lock().unwrap().begins += 1;
    }
    fn begin_contact_immediate(&self, _contact: ContactView<'_>) -> bool {
        self.immediate_begins.fetch_add(1, Ordering::Relaxed);
        true
    }
}

/// An immediate begin hook that returns true sees the event; the deferred
/// begin_contact for the same event is suppressed.
#[test]
fn immediate_hook_consumes_deferred_event() {
    let deferred = Arc::new(Mutex::new(EventLog::default()));
    let listener = ImmediateConsumer {
        immediate_begins: AtomicUsize::new(0),
        deferred: deferred.clone(),
    };

    let mut world = World::new(WorldConfig::default());
    world.set_contact_listener(Box::new(listener));
    add_floor(&mut world);
    let ball = world
        .create_body(&BodyDef::dynamic().at(Vec2::new(0.0, 2.0)))
        .unwrap();
    world
        .create_fixture(ball, &FixtureDef::new(Shape::circle(0.5)))
        .unwrap();

    run_world(&mut world, 60);

    assert_eq!(deferred.lock().unwrap().begins, 0, "deferred begin leaked");
    // The ball landed, so the begin-touch happened somewhere.
    assert!(world.body(ball).unwrap().position().y < 2.0);
}

// ============================================================================
// Test 5 — pre_solve can disable a contact
// ============================================================================

struct Ghost;

impl ContactListener for Ghost {
    fn pre_solve(&mut self, contact: &mut ImmediateContact<'_>, _old: &Manifold) {
        contact.disable();
    }
}

/// Disabling every contact in pre_solve turns the floor intangible: the
/// ball falls straight through it.
#[test]
fn disabled_contacts_are_not_solved() {
    let mut world = World::new(WorldConfig::default());
    world.set_contact_listener(Box::new(Ghost));
    add_floor(&mut world);
    let ball = world
        .create_body(&BodyDef::dynamic().at(Vec2::new(0.0, 2.0)))
        .unwrap();
    world
        .create_fixture(ball, &FixtureDef::new(Shape::circle(0.5)))
        .unwrap();

    run_world(&mut world, 90);

    let y = world.body(ball).unwrap().position().y;
    assert!(y < -1.0, "ball was stopped at y = {y}");
}

// ============================================================================
// Test 6 — Island construction
// ============================================================================

/// A row of mutually overlapping boxes on the floor floods into a single
/// island containing every box plus the floor.
#[test]
fn touching_row_forms_one_island() {
    let mut world = World::new(WorldConfig::default());
    add_floor(&mut world);
    for i in 0..10 {
        let h = world
            .create_body(&BodyDef::dynamic().at(Vec2::new(i as f32 * 0.9, 1.49)))
            .unwrap();
        world
            .create_fixture(h, &FixtureDef::new(Shape::rect(0.5, 0.5)))
            .unwrap();
    }

    world.step(DT, 8, 3);

    let profile = world.profile();
    assert_eq!(profile.islands, 1, "islands");
    assert_eq!(profile.max_island_bodies, 11, "bodies in the island");
}

/// Separated boxes only share the static floor, which anchors islands
/// without merging them: one island per box.
#[test]
fn separated_boxes_form_separate_islands() {
    let mut world = World::new(WorldConfig::default());
    add_floor(&mut world);
    for i in 0..10 {
        let h = world
            .create_body(&BodyDef::dynamic().at(Vec2::new(i as f32 * 3.0, 1.49)))
            .unwrap();
        world
            .create_fixture(h, &FixtureDef::new(Shape::rect(0.5, 0.5)))
            .unwrap();
    }

    world.step(DT, 8, 3);

    let profile = world.profile();
    assert_eq!(profile.islands, 10, "islands");
    assert_eq!(profile.max_island_bodies, 2, "box plus floor");
}

// ============================================================================
// Test 7 — Continuous collision stops a tunneling bullet
// ============================================================================

fn bullet_vs_wall(continuous: bool) -> f32 {
    let mut world = World::new(WorldConfig {
        gravity: Vec2::ZERO,
        continuous,
        ..WorldConfig::default()
    });

    // A thin static wall; discrete 1.5-unit hops straddle it cleanly.
    let wall = world
        .create_body(&BodyDef::default().at(Vec2::new(5.0, 0.0)))
        .unwrap();
    world
        .create_fixture(wall, &FixtureDef::new(Shape::rect(0.05, 2.0)))
        .unwrap();

    let bullet = world
        .create_body(
            &BodyDef::dynamic()
                .with_velocity(Vec2::new(90.0, 0.0))
                .as_bullet(),
        )
        .unwrap();
    world
        .create_fixture(bullet, &FixtureDef::new(Shape::circle(0.1)))
        .unwrap();

    run_world(&mut world, 10);
    world.body(bullet).unwrap().position().x
}

#[test]
fn bullet_is_stopped_by_thin_wall() {
    let x = bullet_vs_wall(true);
    assert!(x < 5.0, "bullet tunneled to x = {x}");
    assert!(x > 4.0, "bullet stopped short at x = {x}");
}

#[test]
fn discrete_only_stepping_tunnels() {
    // Control: the same scene without the TOI pass passes straight through,
    // which is exactly what the continuous pass exists to prevent.
    let x = bullet_vs_wall(false);
    assert!(x > 6.0, "expected tunneling, stopped at x = {x}");
}

// ============================================================================
// Test 8 — Sleeping and waking
// ============================================================================

/// A box resting on the floor falls asleep once its island has been idle
/// long enough, and an impulse wakes it again. A second box far along the
/// floor forms its own island and must stay asleep through the wake: the
/// shared static floor anchors both islands without connecting them.
#[test]
fn resting_body_sleeps_and_wakes() {
    let mut world = World::new(WorldConfig::default());
    add_floor(&mut world);
    let bx = world
        .create_body(&BodyDef::dynamic().at(Vec2::new(0.0, 1.51)))
        .unwrap();
    world
        .create_fixture(bx, &FixtureDef::new(Shape::rect(0.5, 0.5)))
        .unwrap();
    let far = world
        .create_body(&BodyDef::dynamic().at(Vec2::new(20.0, 1.51)))
        .unwrap();
    world
        .create_fixture(far, &FixtureDef::new(Shape::rect(0.5, 0.5)))
        .unwrap();

    let mut slept = 0;
    for _ in 0..180 {
        world.step(DT, 8, 3);
        slept += world.profile().bodies_slept;
    }
    assert!(slept >= 2, "both boxes should have been put to sleep");
    assert!(!world.body(bx).unwrap().is_awake());
    assert!(!world.body(far).unwrap().is_awake());

    let center = world.body(bx).unwrap().world_center();
    world
        .body_mut(bx)
        .unwrap()
        .apply_linear_impulse(Vec2::new(3.0, 0.0), center);
    assert!(world.body(bx).unwrap().is_awake());

    // Only the perturbed island wakes; the distant one sleeps on.
    run_world(&mut world, 10);
    assert!(
        !world.body(far).unwrap().is_awake(),
        "unrelated island was woken"
    );

    // It rested near its settled height throughout.
    let y = world.body(bx).unwrap().position().y;
    assert!((y - 1.5).abs() < 0.05, "settled at y = {y}");
}

// ============================================================================
// Test 9 — Distance joint holds its length
// ============================================================================

#[test]
fn distance_joint_holds_length_under_gravity() {
    let mut world = World::new(WorldConfig::default());
    let anchor = world
        .create_body(&BodyDef::default().at(Vec2::new(0.0, 5.0)))
        .unwrap();
    let bob = world
        .create_body(&BodyDef::dynamic().at(Vec2::new(0.0, 3.0)))
        .unwrap();
    world
        .create_fixture(bob, &FixtureDef::new(Shape::circle(0.2)))
        .unwrap();
    world
        .create_distance_joint(&DistanceJointDef {
            body_a: anchor,
            body_b: bob,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            length: 2.0,
            collide_connected: false,
        })
        .unwrap();

    run_world(&mut world, 120);

    let p = world.body(bob).unwrap().world_center();
    let length = (p - Vec2::new(0.0, 5.0)).length();
    assert!((length - 2.0).abs() < 0.05, "length = {length}");
}

// ============================================================================
// Test 10 — Queries
// ============================================================================

#[test]
fn ray_cast_reports_the_closest_hit() {
    let mut world = World::new(zero_gravity());
    let near = world
        .create_body(&BodyDef::default().at(Vec2::new(5.0, 0.0)))
        .unwrap();
    let near_fix = world
        .create_fixture(near, &FixtureDef::new(Shape::circle(0.5)))
        .unwrap();
    let far = world
        .create_body(&BodyDef::default().at(Vec2::new(10.0, 0.0)))
        .unwrap();
    world
        .create_fixture(far, &FixtureDef::new(Shape::circle(0.5)))
        .unwrap();

    let mut closest: Option<RayHit> = None;
    world.ray_cast(Vec2::ZERO, Vec2::new(20.0, 0.0), |hit| {
        closest = Some(*hit);
        hit.fraction
    });

    let hit = closest.expect("ray missed everything");
    assert_eq!(hit.fixture, near_fix);
    assert!(
        (hit.fraction - 0.225).abs() < 1e-3,
        "fraction = {}",
        hit.fraction
    );
    assert!((hit.point.x - 4.5).abs() < 1e-3);
    assert!((hit.normal - Vec2::new(-1.0, 0.0)).length() < 1e-3);
}

#[test]
fn aabb_query_finds_overlapping_fixtures() {
    let mut world = World::new(zero_gravity());
    let a = world
        .create_body(&BodyDef::default().at(Vec2::new(5.0, 0.0)))
        .unwrap();
    let fix_a = world
        .create_fixture(a, &FixtureDef::new(Shape::circle(0.5)))
        .unwrap();
    let b = world
        .create_body(&BodyDef::default().at(Vec2::new(10.0, 0.0)))
        .unwrap();
    world
        .create_fixture(b, &FixtureDef::new(Shape::circle(0.5)))
        .unwrap();

    let mut found = Vec::new();
    let probe = Aabb::new(Vec2::new(4.0, -1.0), Vec2::new(6.0, 1.0));
    world.query_aabb(&probe, |fixture| {
        found.push(fixture);
        true
    });

    assert_eq!(found, vec![fix_a]);
}

// ============================================================================
// Test 11 — Restitution threshold
// ============================================================================

/// Below the restitution velocity threshold, bounces are killed so resting
/// contact converges instead of jittering forever.
#[test]
fn slow_impacts_do_not_bounce() {
    let mut world = World::new(WorldConfig::default());
    add_floor(&mut world);

    let mut bouncy = FixtureDef::new(Shape::circle(0.5));
    bouncy.restitution = 0.9;
    let ball = world
        .create_body(&BodyDef::dynamic().at(Vec2::new(0.0, 1.52)))
        .unwrap();
    world.create_fixture(ball, &bouncy).unwrap();

    // Dropped from a hair above rest, the impact speed stays below the
    // threshold: it must settle rather than gain energy.
    run_world(&mut world, 240);
    let body = world.body(ball).unwrap();
    assert!((body.position().y - 1.5).abs() < 0.05);
    assert!(body.linear_velocity().length() < 0.1);
}
