//! Generational Arena
//!
//! Typed handle storage for bodies, fixtures, and contacts. A [`Handle`] is
//! a small (index, generation) pair: indices are recycled through a free
//! list, and the generation counter makes stale handles resolve to `None`
//! instead of aliasing a new occupant. This is the type-erased back-reference
//! the pipeline threads through the spatial index instead of raw pointers.

use core::fmt;
use core::marker::PhantomData;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Typed handle into an [`Arena<T>`].
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Raw slot index. Stable for the lifetime of the referenced value and
    /// usable as a deterministic sort key.
    #[inline]
    #[must_use]
    pub fn index(self) -> u32 {
        self.index
    }

    /// Generation counter of this handle.
    #[inline]
    #[must_use]
    pub fn generation(self) -> u32 {
        self.generation
    }

    const fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }
}

// Manual impls: derive would bound them on T.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Handle<T> {}
impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}
impl<T> Eq for Handle<T> {}
impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        (self.index, self.generation).cmp(&(other.index, other.generation))
    }
}
impl<T> core::hash::Hash for Handle<T> {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}
impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Growable slot arena with generation-checked handles.
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Arena<T> {
    /// Create an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Number of live values.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the arena holds no live values.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Upper bound of slot indices ever handed out (live or free).
    #[inline]
    #[must_use]
    pub fn capacity_bound(&self) -> usize {
        self.slots.len()
    }

    /// Insert a value, reusing a free slot when available.
    pub fn insert(&mut self, value: T) -> Handle<T> {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.value.is_none());
            slot.value = Some(value);
            Handle::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                value: Some(value),
            });
            Handle::new(index, 0)
        }
    }

    /// Remove a value; returns `None` if the handle is stale.
    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation || slot.value.is_none() {
            return None;
        }
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;
        slot.value.take()
    }

    /// Resolve a handle.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    /// Resolve a handle mutably.
    #[inline]
    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Resolve two distinct handles mutably at once.
    pub fn get2_mut(&mut self, a: Handle<T>, b: Handle<T>) -> Option<(&mut T, &mut T)> {
        debug_assert_ne!(a.index, b.index, "handles must be distinct");
        let (lo, hi, swapped) = if a.index < b.index {
            (a, b, false)
        } else {
            (b, a, true)
        };
        let (head, tail) = self.slots.split_at_mut(hi.index as usize);
        let lo_slot = head.get_mut(lo.index as usize)?;
        let hi_slot = tail.first_mut()?;
        if lo_slot.generation != lo.generation || hi_slot.generation != hi.generation {
            return None;
        }
        match (lo_slot.value.as_mut(), hi_slot.value.as_mut()) {
            (Some(x), Some(y)) => Some(if swapped { (y, x) } else { (x, y) }),
            _ => None,
        }
    }

    /// Iterate over live values with their handles, in slot-index order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.value
                .as_ref()
                .map(|v| (Handle::new(i as u32, slot.generation), v))
        })
    }

    /// Iterate mutably over live values with their handles.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            let generation = slot.generation;
            slot.value
                .as_mut()
                .map(move |v| (Handle::new(i as u32, generation), v))
        })
    }

    /// Reconstruct the handle of the live value in slot `index`, if any.
    /// Used to resolve compact indices stored in external structures (the
    /// spatial index stores bare slot indices as proxy payloads).
    #[must_use]
    pub fn handle_at(&self, index: u32) -> Option<Handle<T>> {
        let slot = self.slots.get(index as usize)?;
        slot.value
            .as_ref()
            .map(|_| Handle::new(index, slot.generation))
    }

    /// Handles of all live values, in slot-index order.
    pub fn handles(&self) -> impl Iterator<Item = Handle<T>> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.value
                .as_ref()
                .map(|_| Handle::new(i as u32, slot.generation))
        })
    }

}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let mut arena: Arena<&str> = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.remove(a), Some("a"));
        assert_eq!(arena.get(a), None, "stale handle must not resolve");
        assert_eq!(arena.get(b), Some(&"b"));
    }

    #[test]
    fn slot_reuse_bumps_generation() {
        let mut arena: Arena<u32> = Arena::new();
        let a = arena.insert(1);
        arena.remove(a);
        let b = arena.insert(2);
        assert_eq!(a.index(), b.index(), "slot should be recycled");
        assert_ne!(a.generation(), b.generation());
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.get(b), Some(&2));
    }

    #[test]
    fn get2_mut_distinct() {
        let mut arena: Arena<u32> = Arena::new();
        let a = arena.insert(1);
        let b = arena.insert(2);
        let (x, y) = arena.get2_mut(b, a).unwrap();
        *x += 10;
        *y += 20;
        assert_eq!(arena.get(a), Some(&21));
        assert_eq!(arena.get(b), Some(&12));
    }

    #[test]
    fn iter_is_index_ordered() {
        let mut arena: Arena<u32> = Arena::new();
        let h: Vec<_> = (0..5).map(|i| arena.insert(i)).collect();
        arena.remove(h[2]);
        let values: Vec<u32> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, [0, 1, 3, 4]);
    }
}
