//! Broad Phase
//!
//! Pairs the dynamic tree with a move buffer. Structural changes (create,
//! destroy, move) enqueue the affected proxy; the pair search later drains
//! the buffer, querying the tree once per moved proxy. Queries over the
//! buffer are read-only, so disjoint buffer ranges can be searched by
//! different workers into separate output buffers; the contact manager
//! merges those with a deterministic sort.

use crate::dynamic_tree::DynamicTree;
use crate::math::{Aabb, RayCastInput, Vec2};

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Tombstone in the move buffer for proxies destroyed after being enqueued.
pub const NULL_PROXY: u32 = u32::MAX;

/// A candidate pair keyed by the proxies' user data, normalized `a < b`.
pub type ProxyPair = (u32, u32);

pub struct BroadPhase {
    tree: DynamicTree,
    /// Proxies whose fat AABB changed since the last pair search
    move_buffer: Vec<u32>,
}

impl BroadPhase {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tree: DynamicTree::new(),
            move_buffer: Vec::new(),
        }
    }

    /// Insert a proxy and schedule it for pairing.
    pub fn create_proxy(&mut self, aabb: Aabb, user_data: u32) -> u32 {
        let proxy = self.tree.create_proxy(aabb, user_data);
        self.move_buffer.push(proxy);
        proxy
    }

    /// Remove a proxy, tombstoning any pending move entries so buffered
    /// positions keep their meaning for in-flight range splits.
    pub fn destroy_proxy(&mut self, proxy: u32) {
        for entry in &mut self.move_buffer {
            if *entry == proxy {
                *entry = NULL_PROXY;
            }
        }
        self.tree.destroy_proxy(proxy);
    }

    /// Update a proxy's AABB; schedules it for pairing only if the tree
    /// re-inserted it.
    pub fn move_proxy(&mut self, proxy: u32, aabb: Aabb, displacement: Vec2) {
        if self.tree.move_proxy(proxy, aabb, displacement) {
            self.move_buffer.push(proxy);
        }
    }

    /// Force a proxy through the next pair search without moving it.
    /// Used when a fixture's filter data changes.
    pub fn touch_proxy(&mut self, proxy: u32) {
        self.tree.set_moved(proxy);
        self.move_buffer.push(proxy);
    }

    #[inline]
    #[must_use]
    pub fn fat_aabb(&self, proxy: u32) -> Aabb {
        self.tree.fat_aabb(proxy)
    }

    #[inline]
    #[must_use]
    pub fn user_data(&self, proxy: u32) -> u32 {
        self.tree.user_data(proxy)
    }

    /// Whether two proxies' fat AABBs overlap.
    #[inline]
    #[must_use]
    pub fn test_overlap(&self, a: u32, b: u32) -> bool {
        self.tree.fat_aabb(a).overlaps(&self.tree.fat_aabb(b))
    }

    #[inline]
    #[must_use]
    pub fn proxy_count(&self) -> usize {
        self.tree.proxy_count()
    }

    /// Pending move-buffer length, including tombstones. Pair-search ranges
    /// are carved out of `0..move_count()`.
    #[inline]
    #[must_use]
    pub fn move_count(&self) -> usize {
        self.move_buffer.len()
    }

    /// Search one slice of the move buffer for candidate pairs, appending
    /// `(user_data_a, user_data_b)` pairs with `a < b` to `out`.
    ///
    /// Read-only: safe to call from several workers over disjoint ranges.
    /// The output is unsorted and may contain duplicates; callers merge
    /// and dedup.
    pub fn query_range(&self, start: usize, end: usize, out: &mut Vec<ProxyPair>) {
        for &query_proxy in &self.move_buffer[start..end] {
            if query_proxy == NULL_PROXY {
                continue;
            }
            let query_data = self.tree.user_data(query_proxy);
            let fat = self.tree.fat_aabb(query_proxy);

            self.tree.query(&fat, |proxy| {
                if proxy == query_proxy {
                    return true;
                }
                // Both proxies moved: let only the query with the lower
                // user data emit the pair, so each pair surfaces once.
                let data = self.tree.user_data(proxy);
                if self.tree.was_moved(proxy) && data < query_data {
                    return true;
                }
                if data < query_data {
                    out.push((data, query_data));
                } else {
                    out.push((query_data, data));
                }
                true
            });
        }
    }

    /// Clear moved flags and drop the consumed move buffer. Call once per
    /// step, after every range of the buffer has been searched.
    pub fn reset_buffers(&mut self) {
        for &proxy in &self.move_buffer {
            if proxy != NULL_PROXY {
                self.tree.clear_moved(proxy);
            }
        }
        self.move_buffer.clear();
    }

    /// AABB query against the tree; the callback gets proxy user data and
    /// returns false to stop.
    pub fn query<F: FnMut(u32) -> bool>(&self, aabb: &Aabb, mut callback: F) {
        self.tree
            .query(aabb, |proxy| callback(self.tree.user_data(proxy)));
    }

    /// Ray cast against the tree; see [`DynamicTree::ray_cast`] for the
    /// fraction protocol.
    pub fn ray_cast<F: FnMut(&RayCastInput, u32) -> f32>(
        &self,
        input: &RayCastInput,
        mut callback: F,
    ) {
        self.tree
            .ray_cast(input, |sub, proxy| callback(sub, self.tree.user_data(proxy)));
    }

    /// Structural validation of the underlying tree. Test support.
    #[must_use]
    pub fn validate(&self) -> bool {
        self.tree.validate()
    }
}

impl Default for BroadPhase {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aabb(x: f32, y: f32, w: f32, h: f32) -> Aabb {
        Aabb::new(Vec2::new(x, y), Vec2::new(x + w, y + h))
    }

    fn drain_pairs(bp: &BroadPhase, splits: &[usize]) -> Vec<ProxyPair> {
        // Search the move buffer in the given chunks, then merge the way
        // the contact manager does.
        let mut pairs = Vec::new();
        let mut start = 0;
        for &end in splits {
            bp.query_range(start, end, &mut pairs);
            start = end;
        }
        bp.query_range(start, bp.move_count(), &mut pairs);
        pairs.sort_unstable();
        pairs.dedup();
        pairs
    }

    #[test]
    fn overlapping_proxies_pair_once() {
        let mut bp = BroadPhase::new();
        bp.create_proxy(aabb(0.0, 0.0, 2.0, 2.0), 0);
        bp.create_proxy(aabb(1.0, 1.0, 2.0, 2.0), 1);
        bp.create_proxy(aabb(50.0, 50.0, 1.0, 1.0), 2);

        let pairs = drain_pairs(&bp, &[]);
        assert_eq!(pairs, vec![(0, 1)]);
    }

    #[test]
    fn pair_set_independent_of_range_split() {
        let mut bp = BroadPhase::new();
        for i in 0..8 {
            // A chain: each proxy overlaps its neighbors.
            bp.create_proxy(aabb(1.5 * i as f32, 0.0, 2.0, 2.0), i);
        }
        let serial = drain_pairs(&bp, &[]);
        let split_two = drain_pairs(&bp, &[4]);
        let split_many = drain_pairs(&bp, &[1, 3, 5, 7]);
        assert_eq!(serial, split_two);
        assert_eq!(serial, split_many);
        assert!(serial.contains(&(0, 1)));
        assert!(serial.contains(&(6, 7)));
    }

    #[test]
    fn destroyed_proxy_leaves_tombstone() {
        let mut bp = BroadPhase::new();
        let a = bp.create_proxy(aabb(0.0, 0.0, 2.0, 2.0), 0);
        bp.create_proxy(aabb(1.0, 1.0, 2.0, 2.0), 1);
        assert_eq!(bp.move_count(), 2);

        bp.destroy_proxy(a);
        // Buffer length unchanged; the entry is tombstoned, not removed.
        assert_eq!(bp.move_count(), 2);
        let pairs = drain_pairs(&bp, &[]);
        assert!(pairs.is_empty());
    }

    #[test]
    fn reset_buffers_clears_moves() {
        let mut bp = BroadPhase::new();
        bp.create_proxy(aabb(0.0, 0.0, 2.0, 2.0), 0);
        bp.create_proxy(aabb(1.0, 1.0, 2.0, 2.0), 1);
        bp.reset_buffers();
        assert_eq!(bp.move_count(), 0);
        assert!(drain_pairs(&bp, &[]).is_empty());

        // A later move re-buffers only the mover, and re-pairing still
        // sees the stationary neighbor.
        bp.move_proxy(0, aabb(20.0, 0.0, 2.0, 2.0), Vec2::new(20.0, 0.0));
        assert_eq!(bp.move_count(), 1);
        let pairs = drain_pairs(&bp, &[]);
        assert!(pairs.is_empty());

        bp.move_proxy(0, aabb(1.2, 1.2, 2.0, 2.0), Vec2::new(-19.0, 1.2));
        let pairs = drain_pairs(&bp, &[]);
        assert_eq!(pairs, vec![(0, 1)]);
    }

    #[test]
    fn small_jitter_produces_no_moves() {
        let mut bp = BroadPhase::new();
        bp.create_proxy(aabb(0.0, 0.0, 1.0, 1.0), 0);
        bp.reset_buffers();
        bp.move_proxy(0, aabb(0.01, 0.0, 1.0, 1.0), Vec2::new(0.01, 0.0));
        assert_eq!(bp.move_count(), 0, "fat margin should absorb jitter");
    }
}
