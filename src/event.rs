//! Event and message-node types.
//!
//! The original `Ct_event` struct carried `ev_type` and `dispatch_type` as
//! two fields with mutually exclusive meaning depending on each other;
//! per the design notes this is re-expressed as tagged variants: `Dispatch`
//! says *who* receives the event, `EventBody` says *what* is delivered
//! (a message with a payload, or a bare wakeup with none).

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::types::{MsgType, ThreadId, MSG_BUF_LEN};

/// Inline-or-owned payload storage. Short payloads (`<= MSG_BUF_LEN`) live
/// inline in a `heapless::Vec` so the common case never touches the
/// allocator; longer payloads fall back to an owned, heap-allocated
/// buffer that the event keeps until its refcount reaches zero.
pub(crate) enum Payload {
    Inline(heapless::Vec<u8, MSG_BUF_LEN>),
    Owned(Box<[u8]>),
}

impl Payload {
    pub(crate) fn new(bytes: &[u8]) -> Payload {
        if bytes.len() <= MSG_BUF_LEN {
            let mut buf = heapless::Vec::new();
            // Length was just checked against the buffer's capacity.
            buf.extend_from_slice(bytes).ok();
            Payload::Inline(buf)
        } else {
            let owned: Vec<u8> = bytes.to_vec();
            Payload::Owned(owned.into_boxed_slice())
        }
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        match self {
            Payload::Inline(buf) => buf.as_slice(),
            Payload::Owned(buf) => buf,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.as_slice().len()
    }
}

/// Who an event's targets are resolved against.
#[derive(Clone, Copy)]
pub(crate) enum Dispatch {
    /// Deliver to exactly one thread; silently dropped if the handle is
    /// stale at delivery time.
    Addressee(ThreadId),
    /// Deliver to every thread currently subscribed to the event's
    /// `msg_type`.
    Subscriber,
    /// Deliver to every live thread regardless of subscription.
    All,
}

/// What is delivered. `Msg` carries a payload and is retained (via a
/// message node) in each recipient's inbox until dequeued; `Enq` is a bare
/// wakeup signal with no payload and no inbox footprint — it never reaches
/// `query_msg`/`dequeue_msg`.
pub(crate) enum EventBody {
    Msg(Payload),
    Enq,
}

pub(crate) struct Event {
    pub(crate) msg_type: MsgType,
    pub(crate) dispatch: Dispatch,
    pub(crate) body: EventBody,
    pub(crate) refcount: u32,
}

impl Event {
    /// The delivered payload bytes; empty for an `Enq` body (which never
    /// reaches a message node, but callers that only hold an event id
    /// during dispatch may still ask before knowing which body it has).
    pub(crate) fn payload_slice(&self) -> &[u8] {
        match &self.body {
            EventBody::Msg(payload) => payload.as_slice(),
            EventBody::Enq => &[],
        }
    }

    pub(crate) fn body_len(&self) -> usize {
        self.payload_slice().len()
    }
}

/// An inbox entry: a thread's reference to a shared, pool-allocated
/// `Event`. Dropping the last message node pointing at an event destructs
/// it (see `Scheduler::release_event`).
pub(crate) struct MessageNode {
    pub(crate) event: usize,
}
