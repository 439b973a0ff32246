//! hapticd: priority-arbitrated haptic feedback for game events.
//!
//! Game code reports what happened through [`GameTriggers`]; the triggers
//! turn those facts into timed vibration events for the [`Scheduler`], which
//! keeps one queue per [`Priority`] and drives every connected [`Device`] with
//! the strength of the winning event.

pub mod command;
pub mod config;
pub mod device;
pub mod triggers;
pub mod vibration;

pub use command::{CommandError, GameCommand};
pub use config::{ConfigError, HapticConfig, SharedConfig};
pub use device::{Device, DeviceError, DeviceHub};
pub use triggers::GameTriggers;
pub use vibration::{Priority, Scheduler, SchedulerError, VibrationEvent};
