//! Contact Manager
//!
//! Owns the broad phase and the persistent contact set, and runs the two
//! parallel phases of the pipeline:
//!
//! - **Pair search** drains the broad-phase move buffer in worker ranges,
//!   merges the per-worker pair buffers with a sort keyed on fixture slot
//!   indices, and creates one contact per surviving pair. Sorting on data
//!   rather than discovery order is what makes contact creation identical
//!   for any worker count.
//! - **Collide** re-evaluates every contact's manifold in worker ranges.
//!   Workers are read-only; each records a [`CollideUpdate`] per contact
//!   into its own context, and the single-threaded merge applies them in
//!   contact order, firing the deterministic begin/end/pre-solve callbacks.
//!
//! The ordered contact list keeps all TOI candidates in a prefix
//! (`0..toi_count`), maintained with O(1) swaps on insert, remove, and
//! candidacy change, so the TOI pass never scans non-candidates.

use crate::arena::Arena;
use crate::body::{Body, BodyHandle, ContactHandle, Fixture, FixtureHandle};
use crate::broad_phase::BroadPhase;
use crate::callbacks::{ContactFilter, ContactListener, ContactView, ImmediateContact};
use crate::contact::Contact;
use crate::joint::Joint;
use crate::narrow::{self, Manifold};
use crate::profile::Profile;
use crate::shapes::Shape;
use crate::worker::{self, WorkerContext};

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// One worker's verdict on one contact, applied during the merge.
pub(crate) enum CollideUpdate {
    /// Fat AABBs no longer overlap; the contact is dead.
    Destroy { order_index: u32 },
    /// Fresh narrow-phase result.
    Manifold {
        order_index: u32,
        manifold: Manifold,
        touching: bool,
        /// False if an immediate pre-solve hook disabled the contact
        enabled: bool,
        /// Which deferred callbacks were consumed by immediate hooks
        begin_consumed: bool,
        end_consumed: bool,
        pre_solve_consumed: bool,
    },
}

impl CollideUpdate {
    fn order_index(&self) -> u32 {
        match self {
            Self::Destroy { order_index } | Self::Manifold { order_index, .. } => *order_index,
        }
    }
}

pub(crate) struct ContactManager {
    pub(crate) broad_phase: BroadPhase,
    pub(crate) contacts: Arena<Contact>,
    /// All live contacts; TOI candidates occupy `0..toi_count`
    order: Vec<ContactHandle>,
    toi_count: usize,
}

impl ContactManager {
    pub(crate) fn new() -> Self {
        Self {
            broad_phase: BroadPhase::new(),
            contacts: Arena::new(),
            order: Vec::new(),
            toi_count: 0,
        }
    }

    #[inline]
    pub(crate) fn contact_count(&self) -> usize {
        self.order.len()
    }

    /// Contacts in pipeline order; the first [`Self::toi_candidate_count`]
    /// entries are the TOI candidates.
    #[inline]
    pub(crate) fn ordered(&self) -> &[ContactHandle] {
        &self.order
    }

    #[inline]
    pub(crate) fn toi_candidate_count(&self) -> usize {
        self.toi_count
    }

    // ========================================================================
    // Pair search
    // ========================================================================

    /// Drain the broad-phase move buffer and create contacts for new
    /// overlapping pairs.
    pub(crate) fn find_new_contacts(
        &mut self,
        contexts: &mut [WorkerContext],
        fixtures: &Arena<Fixture>,
        bodies: &mut Arena<Body>,
        joints: &Arena<Joint>,
        filter: &dyn ContactFilter,
        profile: &mut Profile,
    ) {
        let total = self.broad_phase.move_count();
        profile.moved_proxies += total as u32;

        {
            let broad_phase = &self.broad_phase;
            worker::for_each_range(contexts, total, |ctx, start, end| {
                broad_phase.query_range(start, end, &mut ctx.pairs);
            });
        }

        // Deterministic merge: fixture slot indices order the pairs the
        // same way regardless of which worker found them.
        let mut pairs: Vec<(u32, u32)> = Vec::new();
        for ctx in contexts.iter_mut() {
            pairs.append(&mut ctx.pairs);
        }
        profile.raw_pairs += pairs.len() as u32;
        pairs.sort_unstable();
        pairs.dedup();

        for (index_a, index_b) in pairs {
            self.create_contact(index_a, index_b, fixtures, bodies, joints, filter, profile);
        }

        self.broad_phase.reset_buffers();
    }

    fn create_contact(
        &mut self,
        index_a: u32,
        index_b: u32,
        fixtures: &Arena<Fixture>,
        bodies: &mut Arena<Body>,
        joints: &Arena<Joint>,
        filter: &dyn ContactFilter,
        profile: &mut Profile,
    ) {
        let (Some(fh_a), Some(fh_b)) = (fixtures.handle_at(index_a), fixtures.handle_at(index_b))
        else {
            return;
        };
        let (Some(fa), Some(fb)) = (fixtures.get(fh_a), fixtures.get(fh_b)) else {
            return;
        };
        if fa.body == fb.body {
            return;
        }

        // One contact per fixture pair: scan the sparser body's edge list.
        let (Some(body_a), Some(body_b)) = (bodies.get(fa.body), bodies.get(fb.body)) else {
            return;
        };
        let scan = if body_a.contacts.len() <= body_b.contacts.len() {
            &body_a.contacts
        } else {
            &body_b.contacts
        };
        for &ch in scan {
            if let Some(existing) = self.contacts.get(ch) {
                let same = (existing.fixture_a == fh_a && existing.fixture_b == fh_b)
                    || (existing.fixture_a == fh_b && existing.fixture_b == fh_a);
                if same {
                    return;
                }
            }
        }

        if !should_collide_bodies(bodies, joints, fa.body, fb.body) {
            return;
        }
        if !filter.should_collide(fa, fb) {
            return;
        }

        // Normalize mixed pairs polygon-first for narrow-phase dispatch.
        let flip = matches!(fa.shape, Shape::Circle { .. }) && matches!(fb.shape, Shape::Polygon(_));
        let (fh_a, fh_b, fa, fb) = if flip {
            (fh_b, fh_a, fb, fa)
        } else {
            (fh_a, fh_b, fa, fb)
        };

        let contact = Contact::new(fh_a, fa.body, fh_b, fb.body, fa, fb);
        let candidate = {
            let a = bodies.get(fa.body);
            let b = bodies.get(fb.body);
            match (a, b) {
                (Some(a), Some(b)) => Contact::is_toi_candidate(a, b),
                _ => false,
            }
        };
        let handle = self.contacts.insert(contact);
        self.push_ordered(handle, candidate);

        if let Some(body) = bodies.get_mut(fa.body) {
            body.contacts.push(handle);
        }
        if let Some(body) = bodies.get_mut(fb.body) {
            body.contacts.push(handle);
        }
        profile.contacts_created += 1;
    }

    // ========================================================================
    // Collide phase
    // ========================================================================

    /// Re-evaluate all contacts. Workers produce update records over
    /// disjoint ranges of the ordered list; the merge applies them in
    /// order and fires the deterministic callbacks.
    pub(crate) fn collide(
        &mut self,
        contexts: &mut [WorkerContext],
        fixtures: &Arena<Fixture>,
        bodies: &mut Arena<Body>,
        filter: &dyn ContactFilter,
        mut listener: Option<&mut (dyn ContactListener + '_)>,
        profile: &mut Profile,
    ) {
        let total = self.order.len();
        {
            let contacts = &self.contacts;
            let order = &self.order;
            let broad_phase = &self.broad_phase;
            let bodies: &Arena<Body> = bodies;
            let immediate: Option<&dyn ContactListener> = listener.as_deref();
            worker::for_each_range(contexts, total, |ctx, start, end| {
                for idx in start..end {
                    let Some(contact) = contacts.get(order[idx]) else {
                        continue;
                    };
                    collide_one(
                        idx as u32,
                        contact,
                        fixtures,
                        bodies,
                        broad_phase,
                        filter,
                        immediate,
                        &mut ctx.updates,
                    );
                }
            });
        }

        // Merge. Ranges are contiguous and ascending, but sort anyway so
        // the apply order never depends on how ranges were assigned.
        let mut updates: Vec<CollideUpdate> = Vec::new();
        for ctx in contexts.iter_mut() {
            updates.append(&mut ctx.updates);
        }
        updates.sort_unstable_by_key(CollideUpdate::order_index);
        profile.narrow_tests += updates.len() as u32;

        // Destroys shift later order indices, so resolve every index to a
        // handle up front.
        let resolved: Vec<ContactHandle> = updates
            .iter()
            .map(|u| self.order[u.order_index() as usize])
            .collect();

        for (update, handle) in updates.into_iter().zip(resolved) {
            match update {
                CollideUpdate::Destroy { .. } => {
                    self.destroy_contact(handle, bodies, listener.as_deref_mut());
                    profile.contacts_destroyed += 1;
                }
                CollideUpdate::Manifold {
                    manifold,
                    touching,
                    mut enabled,
                    begin_consumed,
                    end_consumed,
                    pre_solve_consumed,
                    ..
                } => {
                    let Some(contact) = self.contacts.get_mut(handle) else {
                        continue;
                    };
                    let was_touching = contact.touching;
                    let old_manifold = contact.manifold;
                    contact.manifold = manifold;
                    contact.touching = touching;
                    contact.refilter = false;

                    if touching {
                        profile.touching_contacts += 1;
                    }

                    let view = ContactView {
                        fixture_a: contact.fixture_a,
                        fixture_b: contact.fixture_b,
                        body_a: contact.body_a,
                        body_b: contact.body_b,
                        manifold: &manifold,
                        touching,
                    };
                    if let Some(listener) = listener.as_deref_mut() {
                        if touching && !was_touching && !begin_consumed {
                            listener.begin_contact(view);
                            profile.begin_events += 1;
                        }
                        if !touching && was_touching && !end_consumed {
                            listener.end_contact(view);
                            profile.end_events += 1;
                        }
                        if touching && !pre_solve_consumed {
                            let mut ic = ImmediateContact::new(view, &mut enabled);
                            listener.pre_solve(&mut ic, &old_manifold);
                        }
                    }
                    // Re-borrow: the view borrowed `manifold`, not the contact.
                    if let Some(contact) = self.contacts.get_mut(handle) {
                        contact.enabled = enabled;
                    }
                }
            }
        }
    }

    /// Sequential contact update used by the TOI pass, where events may
    /// fire immediately because the caller is single-threaded.
    pub(crate) fn update_contact(
        &mut self,
        handle: ContactHandle,
        fixtures: &Arena<Fixture>,
        bodies: &Arena<Body>,
        listener: Option<&mut (dyn ContactListener + '_)>,
    ) {
        let Some(contact) = self.contacts.get(handle) else {
            return;
        };
        let (Some(fa), Some(fb)) = (fixtures.get(contact.fixture_a), fixtures.get(contact.fixture_b))
        else {
            return;
        };
        let (Some(ba), Some(bb)) = (bodies.get(contact.body_a), bodies.get(contact.body_b)) else {
            return;
        };

        let mut manifold = narrow::collide(&fa.shape, &ba.xf, &fb.shape, &bb.xf);
        match_impulses(&mut manifold, &contact.manifold);
        let touching = manifold.count > 0;

        let Some(contact) = self.contacts.get_mut(handle) else {
            return;
        };
        let was_touching = contact.touching;
        let old_manifold = contact.manifold;
        contact.manifold = manifold;
        contact.touching = touching;
        let mut enabled = true;

        let view = ContactView {
            fixture_a: contact.fixture_a,
            fixture_b: contact.fixture_b,
            body_a: contact.body_a,
            body_b: contact.body_b,
            manifold: &manifold,
            touching,
        };
        if let Some(listener) = listener {
            if touching && !was_touching {
                listener.begin_contact(view);
            }
            if !touching && was_touching {
                listener.end_contact(view);
            }
            if touching {
                let mut ic = ImmediateContact::new(view, &mut enabled);
                listener.pre_solve(&mut ic, &old_manifold);
            }
        }
        if let Some(contact) = self.contacts.get_mut(handle) {
            contact.enabled = enabled;
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Destroy a contact, firing `end_contact` if it was touching, and
    /// unlink it from both bodies.
    pub(crate) fn destroy_contact(
        &mut self,
        handle: ContactHandle,
        bodies: &mut Arena<Body>,
        listener: Option<&mut (dyn ContactListener + '_)>,
    ) {
        let Some(contact) = self.contacts.get(handle) else {
            return;
        };
        if contact.touching {
            if let Some(listener) = listener {
                listener.end_contact(ContactView {
                    fixture_a: contact.fixture_a,
                    fixture_b: contact.fixture_b,
                    body_a: contact.body_a,
                    body_b: contact.body_b,
                    manifold: &contact.manifold,
                    touching: true,
                });
            }
        }

        let order_index = contact.order_index as usize;
        let body_a = contact.body_a;
        let body_b = contact.body_b;

        self.remove_ordered(order_index);
        self.contacts.remove(handle);

        for bh in [body_a, body_b] {
            if let Some(body) = bodies.get_mut(bh) {
                if let Some(pos) = body.contacts.iter().position(|&c| c == handle) {
                    body.contacts.swap_remove(pos);
                }
            }
        }
    }

    /// Move a contact across the TOI partition boundary after a change to
    /// a body's type or bullet flag.
    pub(crate) fn update_candidacy(&mut self, handle: ContactHandle, bodies: &Arena<Body>) {
        let Some(contact) = self.contacts.get(handle) else {
            return;
        };
        let (Some(a), Some(b)) = (bodies.get(contact.body_a), bodies.get(contact.body_b)) else {
            return;
        };
        let candidate = Contact::is_toi_candidate(a, b);
        let idx = contact.order_index as usize;
        let in_prefix = idx < self.toi_count;
        if candidate == in_prefix {
            return;
        }
        if candidate {
            // Swap with the first non-candidate, then grow the prefix.
            let boundary = self.toi_count;
            self.order.swap(idx, boundary);
            self.fix_order_index(idx);
            self.fix_order_index(boundary);
            self.toi_count += 1;
        } else {
            let boundary = self.toi_count - 1;
            self.order.swap(idx, boundary);
            self.fix_order_index(idx);
            self.fix_order_index(boundary);
            self.toi_count -= 1;
        }
    }

    /// Mark every contact of `fixture` for a filter re-check in the next
    /// collide phase. `owner` is the fixture's body.
    pub(crate) fn mark_for_refilter(
        &mut self,
        fixture: FixtureHandle,
        owner: BodyHandle,
        bodies: &Arena<Body>,
    ) {
        let Some(body) = bodies.get(owner) else {
            return;
        };
        let edges: Vec<ContactHandle> = body.contacts.clone();
        for ch in edges {
            if let Some(contact) = self.contacts.get_mut(ch) {
                if contact.fixture_a == fixture || contact.fixture_b == fixture {
                    contact.refilter = true;
                }
            }
        }
    }

    /// Partition invariant check. Test support.
    #[cfg(test)]
    pub(crate) fn partition_ok(&self, bodies: &Arena<Body>) -> bool {
        for (idx, &handle) in self.order.iter().enumerate() {
            let Some(contact) = self.contacts.get(handle) else {
                return false;
            };
            if contact.order_index as usize != idx {
                return false;
            }
            let (Some(a), Some(b)) = (bodies.get(contact.body_a), bodies.get(contact.body_b))
            else {
                return false;
            };
            let candidate = Contact::is_toi_candidate(a, b);
            if candidate != (idx < self.toi_count) {
                return false;
            }
        }
        true
    }

    fn push_ordered(&mut self, handle: ContactHandle, candidate: bool) {
        self.order.push(handle);
        let last = self.order.len() - 1;
        self.fix_order_index(last);
        if candidate {
            let boundary = self.toi_count;
            self.order.swap(last, boundary);
            self.fix_order_index(last);
            self.fix_order_index(boundary);
            self.toi_count += 1;
        }
    }

    fn remove_ordered(&mut self, mut idx: usize) {
        if idx < self.toi_count {
            // Pull the last candidate down, shrinking the prefix; the
            // removal slot moves to the partition boundary.
            let boundary = self.toi_count - 1;
            self.order.swap(idx, boundary);
            self.fix_order_index(idx);
            self.toi_count -= 1;
            idx = boundary;
        }
        let last = self.order.len() - 1;
        self.order.swap(idx, last);
        self.order.pop();
        if idx < self.order.len() {
            self.fix_order_index(idx);
        }
    }

    fn fix_order_index(&mut self, idx: usize) {
        let handle = self.order[idx];
        if let Some(contact) = self.contacts.get_mut(handle) {
            contact.order_index = idx as u32;
        }
    }
}

/// At least one body must be dynamic, and joints with
/// `collide_connected == false` suppress contacts between the bodies they
/// connect.
pub(crate) fn should_collide_bodies(
    bodies: &Arena<Body>,
    joints: &Arena<Joint>,
    a: BodyHandle,
    b: BodyHandle,
) -> bool {
    let (Some(body_a), Some(body_b)) = (bodies.get(a), bodies.get(b)) else {
        return false;
    };
    if body_a.body_type() != crate::body::BodyType::Dynamic
        && body_b.body_type() != crate::body::BodyType::Dynamic
    {
        return false;
    }
    for &jh in &body_a.joints {
        if let Some(joint) = joints.get(jh) {
            if joint.connects(a, b) && !joint.collide_connected() {
                return false;
            }
        }
    }
    true
}

/// Carry warm-start impulses over to a fresh manifold by feature id.
fn match_impulses(new: &mut Manifold, old: &Manifold) {
    for mp in new.points.iter_mut().take(new.count) {
        for old_mp in old.points.iter().take(old.count) {
            if old_mp.id == mp.id {
                mp.normal_impulse = old_mp.normal_impulse;
                mp.tangent_impulse = old_mp.tangent_impulse;
                break;
            }
        }
    }
}

/// Worker-side evaluation of one contact. Read-only; the verdict goes into
/// the worker's update buffer.
#[allow(clippy::too_many_arguments)]
fn collide_one(
    order_index: u32,
    contact: &Contact,
    fixtures: &Arena<Fixture>,
    bodies: &Arena<Body>,
    broad_phase: &BroadPhase,
    filter: &dyn ContactFilter,
    listener: Option<&dyn ContactListener>,
    out: &mut Vec<CollideUpdate>,
) {
    let (Some(fa), Some(fb)) = (fixtures.get(contact.fixture_a), fixtures.get(contact.fixture_b))
    else {
        return;
    };
    let (Some(ba), Some(bb)) = (bodies.get(contact.body_a), bodies.get(contact.body_b)) else {
        return;
    };

    if contact.refilter && !filter.should_collide(fa, fb) {
        out.push(CollideUpdate::Destroy { order_index });
        return;
    }

    // Neither body awake: leave the contact untouched this step.
    if !ba.awake && !bb.awake {
        return;
    }

    if !broad_phase.test_overlap(fa.proxy, fb.proxy) {
        out.push(CollideUpdate::Destroy { order_index });
        return;
    }

    let mut manifold = narrow::collide(&fa.shape, &ba.xf, &fb.shape, &bb.xf);
    match_impulses(&mut manifold, &contact.manifold);
    let touching = manifold.count > 0;
    let was_touching = contact.touching;

    let mut enabled = true;
    let mut begin_consumed = false;
    let mut end_consumed = false;
    let mut pre_solve_consumed = false;

    if let Some(listener) = listener {
        let view = ContactView {
            fixture_a: contact.fixture_a,
            fixture_b: contact.fixture_b,
            body_a: contact.body_a,
            body_b: contact.body_b,
            manifold: &manifold,
            touching,
        };
        if touching && !was_touching {
            begin_consumed = listener.begin_contact_immediate(view);
        }
        if !touching && was_touching {
            end_consumed = listener.end_contact_immediate(view);
        }
        if touching {
            let mut immediate = ImmediateContact::new(view, &mut enabled);
            pre_solve_consumed = listener.pre_solve_immediate(&mut immediate, &contact.manifold);
        }
    }

    out.push(CollideUpdate::Manifold {
        order_index,
        manifold,
        touching,
        enabled,
        begin_consumed,
        end_consumed,
        pre_solve_consumed,
    });
}
