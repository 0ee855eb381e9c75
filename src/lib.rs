//! A cooperative, priority-ordered user-space thread scheduler for
//! resource-constrained targets.
//!
//! A single host loop ([`Scheduler::schedule`]) drives many lightweight
//! [`Task`]s that each advance by one bounded step per dispatch, yield by
//! returning, and communicate through asynchronous messages. There is no
//! preemption, no stack per task, and no dynamic OS dependency beyond a
//! heap allocator and (optionally) a monotonic clock.
//!
//! Extracted and generalized from a kernel's internal scheduler module;
//! kept `no_std` + `alloc` so it can run with or without an OS underneath
//! it. Disable the default `std` feature to build strictly `no_std`.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

mod clock;
mod config;
mod error;
mod event;
mod pool;
mod scheduler;
mod subscription;
mod thread;
mod types;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use scheduler::{Scheduler, StepCtx};
pub use thread::Task;
pub use types::{
    ClockTime, MsgType, StepResult, ThreadId, ThreadStatus, DEFAULT_COUNTDOWN, MAX_FREE_EVENT,
    MAX_FREE_HEAD, MAX_FREE_MSGNODE, MAX_FREE_SUB, MSG_BUF_LEN, PRIORITY_MAX, TIMEOUT_MSGTYPE,
};
