//! Device boundary
//!
//! The scheduler never talks to hardware directly. It hands strengths to an
//! [`ActuatorHandle`], whose worker task fans each command out to every device
//! a [`DeviceHub`] currently exposes:
//!
//! ```text
//! Scheduler ──[strength]──► Actuator worker ──► DeviceHub::devices() ──► Device::vibrate
//!            (unbounded FIFO)   (clamp + scale)
//! ```
//!
//! Discovery, connection and reconnection belong to the hub implementation.

pub mod actuator;
pub mod console;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

pub use actuator::ActuatorHandle;
pub use console::{ConsoleDevice, ConsoleHub};

/// Errors reported by a single device while applying an intensity
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error("Device disconnected: {0}")]
    Disconnected(String),

    #[error("Device rejected command: {0}")]
    CommandRejected(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// One addressable vibration device.
#[async_trait]
pub trait Device: Send + Sync {
    fn name(&self) -> &str;

    /// Sets the motor intensity, `0.0` (off) to `1.0` (full).
    async fn vibrate(&self, intensity: f64) -> Result<(), DeviceError>;
}

/// Collection of devices owned by the transport layer.
pub trait DeviceHub: Send + Sync {
    /// Whether the transport is connected. Producers check this before
    /// submitting; the actuator itself just uses whatever `devices` returns.
    fn is_connected(&self) -> bool;

    /// Snapshot of the currently connected devices, possibly empty.
    fn devices(&self) -> Vec<Arc<dyn Device>>;
}

/// Clamps a requested strength into `[0, 1]`, warning when it had to.
/// NaN becomes `0.0`.
pub fn clamp_strength(strength: f32) -> f32 {
    if strength.is_nan() {
        warn!("Tried to vibrate at a NaN strength! Using 0.");
        0.0
    } else if strength < 0.0 {
        warn!(strength, "Tried to vibrate at a strength below 0! Clamping.");
        0.0
    } else if strength > 1.0 {
        warn!(strength, "Tried to vibrate at a strength above 1! Clamping.");
        1.0
    } else {
        strength
    }
}
