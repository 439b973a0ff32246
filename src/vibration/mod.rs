//! Vibration scheduling
//!
//! Turns a stream of prioritised, time-limited vibration requests into one
//! strength at a time for the devices:
//!
//! 1. [`event`] - the immutable request and its priority levels
//! 2. [`queue`] - one locked deque per priority level
//! 3. [`scheduler`] - resolution passes, expiry timers and debouncing
//!
//! ```text
//! Death    [■■■■■■■■■■]
//! Hurt     [■■■■■■]            ──► highest live event ──► Actuator
//! Health   [■]
//! Potion   [■■■■]
//! Debuff   [■■■■■][■■■■■]
//! ```

pub mod event;
pub mod queue;
pub mod scheduler;

pub use event::{Priority, UnknownPriority, VibrationEvent};
pub use queue::PriorityQueues;
pub use scheduler::{Scheduler, SchedulerStatus};

/// Errors raised while setting up the scheduler
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("No tokio runtime available to drive vibration timers")]
    NoRuntime,
}
