//! Subscription Dispatcher: the publish/subscribe registry keyed by
//! message type.
//!
//! The original's hand-rolled, pointer-linked outer list of type-heads
//! (sorted ascending by type, found by a linear `seek`) is replaced with a
//! `BTreeMap<MsgType, usize>` — ascending order and the "exactly one head
//! per subscribed type" invariant both fall out of the map directly,
//! with no manual sentinel bookkeeping. The type-head and subscription
//! records themselves stay pool-allocated, preserving the bounded
//! `MAX_FREE_SUB`/`MAX_FREE_HEAD` cache discipline.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::pool::Pool;
use crate::types::{MsgType, ThreadId, MAX_FREE_HEAD, MAX_FREE_SUB};

pub(crate) struct Subscription {
    pub(crate) msg_type: MsgType,
    pub(crate) thread: ThreadId,
}

pub(crate) struct SubHead {
    pub(crate) msg_type: MsgType,
    pub(crate) members: Vec<usize>,
}

pub(crate) struct SubscriptionDispatcher {
    subs: Pool<Subscription>,
    heads: Pool<SubHead>,
    by_type: BTreeMap<MsgType, usize>,
}

impl SubscriptionDispatcher {
    pub(crate) fn new() -> Self {
        SubscriptionDispatcher {
            subs: Pool::new(MAX_FREE_SUB),
            heads: Pool::new(MAX_FREE_HEAD),
            by_type: BTreeMap::new(),
        }
    }

    /// `true` if `thread` already subscribes to `msg_type` (subscribe is
    /// idempotent).
    fn already_subscribed(&self, thread_subs: &[usize], msg_type: MsgType) -> bool {
        thread_subs.iter().any(|&sub_id| self.subs.get(sub_id).map(|s| s.msg_type == msg_type).unwrap_or(false))
    }

    /// Registers `thread` as a subscriber of `msg_type`. Returns the
    /// subscription id to push onto the thread's own subscription list,
    /// or `None` if already subscribed (idempotent no-op).
    pub(crate) fn subscribe(&mut self, thread_subs: &[usize], msg_type: MsgType, thread: ThreadId) -> Option<usize> {
        if self.already_subscribed(thread_subs, msg_type) {
            return None;
        }
        let head_id = *self.by_type.entry(msg_type).or_insert_with(|| {
            self.heads.alloc(SubHead { msg_type, members: Vec::new() })
        });
        let sub_id = self.subs.alloc(Subscription { msg_type, thread });
        if let Some(head) = self.heads.get_mut(head_id) {
            head.members.push(sub_id);
        }
        Some(sub_id)
    }

    /// Removes the subscription identified by `sub_id` from its type's
    /// member list, discarding the type-head if that list becomes empty.
    fn unlink(&mut self, sub_id: usize) {
        let msg_type = match self.subs.get(sub_id) {
            Some(sub) => sub.msg_type,
            None => return,
        };
        if let Some(&head_id) = self.by_type.get(&msg_type) {
            if let Some(head) = self.heads.get_mut(head_id) {
                head.members.retain(|&id| id != sub_id);
                if head.members.is_empty() {
                    self.by_type.remove(&msg_type);
                    self.heads.dealloc(head_id);
                }
            }
        }
        self.subs.dealloc(sub_id);
    }

    /// Removes the one subscription in `thread_subs` matching `msg_type`,
    /// if any, and returns its index in `thread_subs` for the caller to
    /// remove from the thread's own list. Silently a no-op if the pair was
    /// never subscribed.
    pub(crate) fn unsubscribe(&mut self, thread_subs: &[usize], msg_type: MsgType) -> Option<usize> {
        let pos = thread_subs
            .iter()
            .position(|&sub_id| self.subs.get(sub_id).map(|s| s.msg_type == msg_type).unwrap_or(false))?;
        self.unlink(thread_subs[pos]);
        Some(pos)
    }

    /// Tears down every subscription in `thread_subs`. The per-thread list
    /// itself (owned `Vec<usize>`, non-circular) is what bounds this
    /// loop — it is always finite because it is ordinary owned storage,
    /// not a pointer chain that could be malformed into a cycle.
    pub(crate) fn unsubscribe_all(&mut self, thread_subs: &[usize]) {
        for &sub_id in thread_subs {
            self.unlink(sub_id);
        }
    }

    /// Subscribers of `msg_type`, in the implementation-defined iteration
    /// order (insertion order here). Empty if no one subscribes.
    pub(crate) fn subscriber_threads(&self, msg_type: MsgType) -> Vec<ThreadId> {
        match self.by_type.get(&msg_type) {
            Some(&head_id) => match self.heads.get(head_id) {
                Some(head) => head.members.iter().filter_map(|&id| self.subs.get(id).map(|s| s.thread)).collect(),
                None => Vec::new(),
            },
            None => Vec::new(),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.subs.clear();
        self.heads.clear();
        self.by_type.clear();
    }

    #[cfg(test)]
    pub(crate) fn head_count(&self) -> usize {
        self.by_type.len()
    }

    #[cfg(test)]
    pub(crate) fn is_sorted_ascending(&self) -> bool {
        let keys: Vec<MsgType> = self.by_type.keys().copied().collect();
        keys.windows(2).all(|w| w[0] < w[1])
    }
}
