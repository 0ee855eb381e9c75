//! Error type for the scheduler core.
//!
//! No `thiserror`/`anyhow` here, matching the donor kernel: a plain enum
//! with a hand-written [`core::fmt::Display`] impl, the same shape as
//! `scheduler::ipc::IpcError` in the donor.

use core::fmt;

/// Fatal and step-reported failures the scheduler core distinguishes.
/// Benign invalidity (a stale handle at delivery time, an unsubscribe of a
/// non-subscribed pair) is never represented here — those are logged at
/// `warn!` and resolved to a no-op, per the error handling design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    /// A required-valid handle was invalid (programmer misuse).
    InvalidHandle,
    /// `subscribe` was called with a reserved or zero message type.
    InvalidMsgType,
    /// `schedule()` was invoked while already running.
    Reentrant,
    /// A step function, or the post-step hook, returned `StepResult::Err`.
    StepFailed,
    /// The pre-step hook rejected a step before it ran.
    PreHookRejected,
    /// A step explicitly reported a fatal condition via `StepCtx::fatal_error`.
    ReportedFatal,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            SchedulerError::InvalidHandle => "handle is invalid or stale",
            SchedulerError::InvalidMsgType => "message type 0 or the reserved timeout type cannot be subscribed",
            SchedulerError::Reentrant => "schedule() invoked re-entrantly",
            SchedulerError::StepFailed => "a step or the post-step hook returned an error",
            SchedulerError::PreHookRejected => "pre-step hook rejected the step",
            SchedulerError::ReportedFatal => "a step reported a fatal condition",
        };
        f.write_str(msg)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SchedulerError {}
