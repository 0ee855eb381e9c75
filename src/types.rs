//! Shared scalar types: handles, message types, clock values, and the
//! build/configure-time constants named in the external API.

use core::fmt;

/// Priority numbering runs backwards: 0 is the highest priority.
pub const PRIORITY_MAX: u8 = 15;

/// Number of steps run between queue scrunches.
pub const DEFAULT_COUNTDOWN: u32 = 8;

/// Maximum payload length carried inline in an event without a heap buffer.
pub const MSG_BUF_LEN: usize = 16;

/// Bounded free-list cache sizes for the pool allocator.
pub const MAX_FREE_MSGNODE: usize = 15;
pub const MAX_FREE_EVENT: usize = 6;
pub const MAX_FREE_SUB: usize = 10;
pub const MAX_FREE_HEAD: usize = 3;

/// Reserved message type used for timeout delivery. Never routed through
/// the subscription dispatcher; always delivered directly to the overdue
/// thread.
pub const TIMEOUT_MSGTYPE: MsgType = MsgType(u32::MAX);

/// A message's application-level type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MsgType(pub u32);

impl MsgType {
    pub fn is_reserved(self) -> bool {
        self == TIMEOUT_MSGTYPE
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-type({})", self.0)
    }
}

/// Opaque handle to a thread: a slot index paired with the slot's
/// incarnation at the time the handle was issued. A handle is valid only
/// while the slot it names still holds a thread of the same incarnation
/// (see [`crate::thread::ThreadArena::is_valid`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread[{}#{}]", self.index, self.generation)
    }
}

/// Two-word monotonic clock value: `tick` counts within the current `era`,
/// and `era` counts rollovers of `tick`'s underlying width. Comparisons are
/// always era-major, so timeouts stay orderable across a tick rollover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ClockTime {
    pub era: u32,
    pub tick: u32,
}

impl ClockTime {
    pub const ZERO: ClockTime = ClockTime { era: 0, tick: 0 };

    /// Adds an interval expressed in ticks, carrying into `era` on overflow.
    pub fn advance(self, interval: u32) -> ClockTime {
        match self.tick.checked_add(interval) {
            Some(tick) => ClockTime { era: self.era, tick },
            None => {
                let tick = interval.wrapping_sub(u32::MAX - self.tick).wrapping_sub(1);
                ClockTime { era: self.era.wrapping_add(1), tick }
            }
        }
    }
}

/// Outcome of one thread's step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Ok,
    Err,
}

impl StepResult {
    pub fn is_ok(self) -> bool {
        matches!(self, StepResult::Ok)
    }
}

/// Status a thread can be re-classified into at the end of a step, plus the
/// internal `Dummy`-free set the scheduler core dispatches over. `Defunct`
/// is terminal: the thread is destructed rather than re-queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    Active,
    Awakened,
    Asleep,
    Timeout,
    Defunct,
}

/// Where a thread currently physically sits. Tracked so detaching a thread
/// ahead of a step or an event delivery touches only the one queue it's
/// actually in, instead of scanning every priority level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Location {
    Priority(u8),
    Sleeping,
    TimeoutSegment,
    /// Detached for the duration of its own step.
    Running,
}
