//! Actuator worker - applies strengths to every connected device
//!
//! Commands are queued on an unbounded channel so callers never suspend, and
//! a single worker task applies them in order. A failing device is logged and
//! skipped; nothing is reported back to the caller.

use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace};

use super::{clamp_strength, DeviceHub};

#[derive(Debug, Clone, Copy, PartialEq)]
enum ActuatorCommand {
    Apply(f32),
    SetMaxIntensity(f32),
}

/// Cloneable sender side of the actuator worker.
#[derive(Debug, Clone)]
pub struct ActuatorHandle {
    tx: mpsc::UnboundedSender<ActuatorCommand>,
}

impl ActuatorHandle {
    /// Starts the worker on `runtime`.
    ///
    /// `max_intensity` scales every strength before it reaches a device. The
    /// worker stops once every handle has been dropped.
    pub fn spawn(runtime: &Handle, hub: Arc<dyn DeviceHub>, max_intensity: f32) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        runtime.spawn(run_actuator(rx, hub, clamp_strength(max_intensity)));
        info!(max_intensity, "Actuator worker spawned");
        Self { tx }
    }

    /// Queues a strength for all devices. Out-of-range values are clamped.
    pub fn apply(&self, strength: f32) {
        self.send(ActuatorCommand::Apply(strength));
    }

    /// Shorthand for applying zero.
    pub fn stop(&self) {
        self.apply(0.0);
    }

    /// Changes the scale applied to later commands.
    pub fn set_max_intensity(&self, max_intensity: f32) {
        self.send(ActuatorCommand::SetMaxIntensity(max_intensity));
    }

    fn send(&self, command: ActuatorCommand) {
        if self.tx.send(command).is_err() {
            debug!(?command, "Actuator worker gone, dropping command");
        }
    }
}

async fn run_actuator(
    mut rx: mpsc::UnboundedReceiver<ActuatorCommand>,
    hub: Arc<dyn DeviceHub>,
    mut max_intensity: f32,
) {
    debug!("Actuator worker started");
    while let Some(command) = rx.recv().await {
        match command {
            ActuatorCommand::Apply(strength) => {
                apply_to_all(hub.as_ref(), strength, max_intensity).await;
            }
            ActuatorCommand::SetMaxIntensity(max) => {
                max_intensity = clamp_strength(max);
                debug!(max_intensity, "Actuator max intensity updated");
            }
        }
    }
    debug!("Actuator channel closed, worker exiting");
}

async fn apply_to_all(hub: &dyn DeviceHub, strength: f32, max_intensity: f32) {
    let strength = clamp_strength(strength);
    let intensity = f64::from(strength * max_intensity);
    let devices = hub.devices();
    trace!(strength, intensity, devices = devices.len(), "Applying strength");

    for device in devices {
        if let Err(e) = device.vibrate(intensity).await {
            error!(
                device = device.name(),
                strength, "Couldn't vibrate device: {}", e
            );
        }
    }
}
