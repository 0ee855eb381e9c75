//! Build/configure-time constants, exposed as a small config struct
//! rather than compile-time `cfg` overrides so one process can run
//! multiple independently-tuned schedulers — consistent with replacing
//! the original's global singletons with an explicit, host-owned context.

use crate::types::{DEFAULT_COUNTDOWN, PRIORITY_MAX};

/// Tunable constants for a [`crate::scheduler::Scheduler`]. `Default`
/// reproduces the crate's standard priority-queue depth and scrunch cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Highest-numbered (lowest-priority) queue index; queues `0..=priority_max`
    /// are created.
    pub priority_max: u8,
    /// Steps run between automatic scrunches.
    pub default_countdown: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig { priority_max: PRIORITY_MAX, default_countdown: DEFAULT_COUNTDOWN }
    }
}
