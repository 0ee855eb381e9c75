//! Pluggable clock. A clock is any `FnMut() -> ClockTime`; the
//! scheduler ships a trivial default that advances by one tick per call,
//! which is enough to exercise timeouts in tests without a real time
//! source.

use alloc::boxed::Box;

use crate::types::ClockTime;

pub(crate) type ClockFn = Box<dyn FnMut() -> ClockTime>;

pub(crate) fn default_clock() -> ClockFn {
    let mut now = ClockTime::ZERO;
    Box::new(move || {
        let current = now;
        now = now.advance(1);
        current
    })
}
