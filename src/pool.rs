//! Pool Allocator.
//!
//! A generic bounded-cache free-list arena. `alloc` draws from the free
//! list when one is available, otherwise grows the backing storage (the
//! "host allocator" in the original source's terms). `dealloc` always
//! returns the freed slot to circulation — every index handed out by
//! `alloc` remains reusable for the life of the pool, matching the
//! original free-list allocator, where a block evicted from the capped
//! cache still returns to the general heap and can service the very next
//! allocation rather than being lost.
//!
//! The `cap` only bounds the `hot` list: indices pushed there are drawn
//! from first, so a pool under steady churn keeps reusing the same
//! handful of slots instead of cycling through every freed index in
//! turn. Once `hot` is full, freed indices spill into `cold`, an
//! unbounded overflow list that `alloc` only consults once `hot` is
//! empty. Both lists are emptied by `clear()`.
//!
//! Magic-number corruption sentinels from the original free-list
//! discipline are unnecessary here — the type system already prevents
//! reading a freed slot.

use alloc::vec::Vec;

pub(crate) struct Pool<T> {
    items: Vec<Option<T>>,
    hot: Vec<usize>,
    cold: Vec<usize>,
    cap: usize,
}

impl<T> Pool<T> {
    pub(crate) fn new(cap: usize) -> Self {
        Pool { items: Vec::new(), hot: Vec::new(), cold: Vec::new(), cap }
    }

    pub(crate) fn alloc(&mut self, value: T) -> usize {
        if let Some(idx) = self.hot.pop().or_else(|| self.cold.pop()) {
            debug_assert!(self.items[idx].is_none(), "free index must point at a vacated slot");
            self.items[idx] = Some(value);
            idx
        } else {
            self.items.push(Some(value));
            self.items.len() - 1
        }
    }

    pub(crate) fn dealloc(&mut self, idx: usize) -> Option<T> {
        let value = self.items[idx].take();
        debug_assert!(value.is_some(), "dealloc of an already-vacant slot");
        if self.hot.len() < self.cap {
            self.hot.push(idx);
        } else {
            self.cold.push(idx);
        }
        value
    }

    pub(crate) fn get(&self, idx: usize) -> Option<&T> {
        self.items.get(idx).and_then(|slot| slot.as_ref())
    }

    pub(crate) fn get_mut(&mut self, idx: usize) -> Option<&mut T> {
        self.items.get_mut(idx).and_then(|slot| slot.as_mut())
    }

    /// Drains the pool entirely: live slots are dropped, and both the hot
    /// cache and the cold overflow are emptied. Used by `Scheduler::clear()`.
    pub(crate) fn clear(&mut self) {
        self.items.clear();
        self.hot.clear();
        self.cold.clear();
    }

    /// Number of slots currently holding a live value (for test assertions
    /// of: no allocator block remains outstanding after `clear()`).
    #[cfg(test)]
    pub(crate) fn live_count(&self) -> usize {
        self.items.iter().filter(|s| s.is_some()).count()
    }

    /// Total freed-and-reusable indices, hot cache plus cold overflow.
    #[cfg(test)]
    pub(crate) fn free_count(&self) -> usize {
        self.hot.len() + self.cold.len()
    }

    #[cfg(test)]
    pub(crate) fn hot_count(&self) -> usize {
        self.hot.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_freed_slots_before_growing() {
        let mut pool: Pool<u32> = Pool::new(2);
        let a = pool.alloc(1);
        let b = pool.alloc(2);
        pool.dealloc(a);
        let c = pool.alloc(3);
        assert_eq!(c, a, "dealloc'd slot should be reused, not grown past");
        assert_eq!(*pool.get(b).unwrap(), 2);
        assert_eq!(*pool.get(c).unwrap(), 3);
    }

    #[test]
    fn cache_caps_the_hot_list_but_every_index_stays_reusable() {
        let mut pool: Pool<u32> = Pool::new(1);
        let a = pool.alloc(1);
        let b = pool.alloc(2);
        let c = pool.alloc(3);
        pool.dealloc(a);
        pool.dealloc(b);
        pool.dealloc(c);
        // cap=1: only one of the three freed indices sits in the hot cache...
        assert_eq!(pool.hot_count(), 1);
        // ...but all three remain reusable rather than being lost once the
        // backing storage stops growing.
        assert_eq!(pool.free_count(), 3);
        let d = pool.alloc(4);
        let e = pool.alloc(5);
        let f = pool.alloc(6);
        assert_eq!(pool.free_count(), 0);
        assert!([a, b, c].contains(&d));
        assert!([a, b, c].contains(&e));
        assert!([a, b, c].contains(&f));
        // No growth past the three originally allocated slots was needed.
        assert_eq!(pool.live_count(), 3);
    }

    #[test]
    fn clear_drains_everything() {
        let mut pool: Pool<u32> = Pool::new(4);
        let a = pool.alloc(1);
        pool.alloc(2);
        pool.dealloc(a);
        pool.clear();
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.free_count(), 0);
    }
}
