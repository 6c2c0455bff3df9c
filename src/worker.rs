//! Worker Execution
//!
//! The parallel phases (pair search, narrow phase) run a closure over
//! contiguous ranges of a work list, one range per worker. Workers never
//! share mutable state: each gets exclusive access to its own
//! [`WorkerContext`] and read-only access to everything else, and records
//! its results into the context for a single-threaded merge afterwards.
//! With the `parallel` feature the ranges run on rayon; without it they
//! run back to back on the caller. The merged result is identical either
//! way, and for any worker count.

use crate::broad_phase::ProxyPair;
use crate::contact_manager::CollideUpdate;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Per-worker scratch buffers for one step's deferred records.
#[derive(Default)]
pub struct WorkerContext {
    /// Candidate pairs found by the pair search
    pub(crate) pairs: Vec<ProxyPair>,
    /// Narrow-phase results awaiting the deterministic merge
    pub(crate) updates: Vec<CollideUpdate>,
}

/// Bounds of chunk `i` when `total` items are split across `n` workers.
/// Chunks are contiguous and cover `0..total` in order.
pub(crate) fn chunk_bounds(total: usize, n: usize, i: usize) -> (usize, usize) {
    debug_assert!(i < n);
    let base = total / n;
    let rem = total % n;
    let start = i * base + i.min(rem);
    let len = base + usize::from(i < rem);
    (start, start + len)
}

/// Run `f(context, start, end)` for each worker's chunk of `0..total`.
#[cfg(feature = "parallel")]
pub(crate) fn for_each_range<C, F>(contexts: &mut [C], total: usize, f: F)
where
    C: Send,
    F: Fn(&mut C, usize, usize) + Sync,
{
    use rayon::prelude::*;
    let n = contexts.len();
    contexts.par_iter_mut().enumerate().for_each(|(i, ctx)| {
        let (start, end) = chunk_bounds(total, n, i);
        f(ctx, start, end);
    });
}

#[cfg(not(feature = "parallel"))]
pub(crate) fn for_each_range<C, F>(contexts: &mut [C], total: usize, f: F)
where
    C: Send,
    F: Fn(&mut C, usize, usize) + Sync,
{
    let n = contexts.len();
    for (i, ctx) in contexts.iter_mut().enumerate() {
        let (start, end) = chunk_bounds(total, n, i);
        f(ctx, start, end);
    }
}

/// Run `f` once per item. Used for whole-item work units such as island
/// solves, where every item already owns all the state it mutates.
#[cfg(feature = "parallel")]
pub(crate) fn for_each<T, F>(items: &mut [T], f: F)
where
    T: Send,
    F: Fn(&mut T) + Sync,
{
    use rayon::prelude::*;
    items.par_iter_mut().for_each(f);
}

#[cfg(not(feature = "parallel"))]
pub(crate) fn for_each<T, F>(items: &mut [T], f: F)
where
    T: Send,
    F: Fn(&mut T) + Sync,
{
    for item in items.iter_mut() {
        f(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_cover_range_exactly() {
        for total in [0usize, 1, 7, 64, 100] {
            for n in 1..=8 {
                let mut next = 0;
                for i in 0..n {
                    let (start, end) = chunk_bounds(total, n, i);
                    assert_eq!(start, next);
                    assert!(end >= start);
                    next = end;
                }
                assert_eq!(next, total);
            }
        }
    }

    #[test]
    fn ranges_visit_every_item_once() {
        let mut contexts: Vec<Vec<usize>> = vec![Vec::new(); 3];
        for_each_range(&mut contexts, 10, |ctx, start, end| {
            ctx.extend(start..end);
        });
        let mut seen: Vec<usize> = contexts.into_iter().flatten().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }
}
