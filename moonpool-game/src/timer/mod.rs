//! Timers whose callbacks run as tasks in the owning actor's mailbox.

mod handler;
mod scheduler;

use std::fmt;

pub use handler::{TimerHandler, TimerHandlerTable};
pub use scheduler::{TimerScheduler, TimerSpec};

/// Handle of a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}
