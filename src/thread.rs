//! Thread lifecycle: the runnable unit, its arena,
//! and the `Task` trait the host implements to supply step/destruct
//! behavior.
//!
//! The original source's embedded prev/next pointers and sentinel "dummy"
//! thread per list are replaced with an arena (`Vec<ThreadSlot<T>>`) plus
//! generational indices, per the design notes: a slot's `generation`
//! field is the incarnation, and validity is "this slot still holds a
//! thread, and its generation matches the handle's".

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::types::{ClockTime, Location, StepResult, ThreadId, ThreadStatus};

/// A unit of cooperative work. The host implements this once per kind of
/// task; `step` is invoked at most once per dispatch and must return
/// promptly. `Self` is the thread's `data` from the original design —
/// Rust's `&mut self` receiver already gives a step direct access to it,
/// which is why there is no separate `self_data()` accessor on
/// [`crate::scheduler::StepCtx`]: the capability exists, just without the
/// extra indirection the original's `void*` callback required.
pub trait Task {
    /// Advance the thread by one bounded step.
    fn step(&mut self, ctx: &mut crate::scheduler::StepCtx<'_, Self>) -> StepResult
    where
        Self: Sized;

    /// Invoked exactly once, when the thread is destructed. The default
    /// does nothing.
    fn on_destruct(&mut self) {}
}

/// Everything about a thread besides its task payload: queue membership,
/// status, inbox, subscriptions, and any pending timeout deadline.
///
/// Split out from `Thread<T>` so that during a step the scheduler can hand
/// out `&mut ThreadMeta` and the owned `task: T` as two independent
/// borrows — `task.step(&mut ctx)` takes `&mut T` as its receiver while
/// `ctx` holds `&mut ThreadMeta` plus `&mut Scheduler<T>` (which, for the
/// duration of the step, no longer contains this thread's slot at all).
/// Without the split, `StepCtx` would need a second path back into the
/// same struct the `&mut self` receiver already borrows.
pub(crate) struct ThreadMeta {
    pub(crate) priority: u8,
    pub(crate) status: ThreadStatus,
    pub(crate) location: Location,
    pub(crate) msg_q: VecDeque<usize>,
    pub(crate) subscriptions: Vec<usize>,
    pub(crate) deadline: Option<ClockTime>,
}

impl ThreadMeta {
    pub(crate) fn new(priority: u8, status: ThreadStatus, location: Location) -> Self {
        ThreadMeta { priority, status, location, msg_q: VecDeque::new(), subscriptions: Vec::new(), deadline: None }
    }
}

pub(crate) struct Thread<T> {
    pub(crate) task: T,
    pub(crate) meta: ThreadMeta,
}

struct ThreadSlot<T> {
    generation: u32,
    thread: Option<Thread<T>>,
}

/// Arena of thread slots (the handle registry plus the thread half of the
/// data store). Slots are cached without bound: a vacated slot is
/// never physically dropped from the arena while the scheduler is alive,
/// only returned to the free list, which is what keeps a stale `ThreadId`
/// comparison well-defined forever (the slot index stays meaningful; only
/// the generation changes).
pub(crate) struct ThreadArena<T> {
    slots: Vec<ThreadSlot<T>>,
    free: Vec<usize>,
}

impl<T> ThreadArena<T> {
    pub(crate) fn new() -> Self {
        ThreadArena { slots: Vec::new(), free: Vec::new() }
    }

    pub(crate) fn alloc(&mut self, thread: Thread<T>) -> ThreadId {
        if let Some(idx) = self.free.pop() {
            let slot = &mut self.slots[idx];
            debug_assert!(slot.thread.is_none());
            // Incarnation advances only on reuse, matching `alloc_ct`.
            slot.generation = slot.generation.wrapping_add(1);
            slot.thread = Some(thread);
            ThreadId { index: idx as u32, generation: slot.generation }
        } else {
            self.slots.push(ThreadSlot { generation: 0, thread: Some(thread) });
            ThreadId { index: (self.slots.len() - 1) as u32, generation: 0 }
        }
    }

    pub(crate) fn is_valid(&self, id: ThreadId) -> bool {
        self.slots
            .get(id.index as usize)
            .map(|slot| slot.thread.is_some() && slot.generation == id.generation)
            .unwrap_or(false)
    }

    pub(crate) fn get(&self, id: ThreadId) -> Option<&Thread<T>> {
        self.slots.get(id.index as usize).filter(|s| s.generation == id.generation).and_then(|s| s.thread.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: ThreadId) -> Option<&mut Thread<T>> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.thread.as_mut())
    }

    /// Removes the thread from its slot without returning the slot to the
    /// free list yet (used while a step temporarily owns the thread).
    pub(crate) fn take(&mut self, id: ThreadId) -> Option<Thread<T>> {
        self.slots.get_mut(id.index as usize).filter(|s| s.generation == id.generation).and_then(|s| s.thread.take())
    }

    pub(crate) fn put_back(&mut self, id: ThreadId, thread: Thread<T>) {
        if let Some(slot) = self.slots.get_mut(id.index as usize) {
            debug_assert_eq!(slot.generation, id.generation);
            slot.thread = Some(thread);
        }
    }

    /// Returns the slot to the free list. Called once a thread has fully
    /// destructed (inbox and subscriptions already torn down).
    pub(crate) fn retire(&mut self, id: ThreadId) {
        if let Some(slot) = self.slots.get_mut(id.index as usize) {
            if slot.generation == id.generation {
                slot.thread = None;
                self.free.push(id.index as usize);
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }

    /// Iterates every live (non-destructed) handle. Used by broadcast
    /// dispatch (`Dispatch::All`) and by `clear()`'s final sweep.
    pub(crate) fn live_handles(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            slot.thread.as_ref().map(|_| ThreadId { index: idx as u32, generation: slot.generation })
        })
    }
}
