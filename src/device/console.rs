//! Simulated devices that log what they would do.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

use super::{Device, DeviceError, DeviceHub};

#[derive(Debug)]
pub struct ConsoleDevice {
    name: String,
    // f64 bits of the last intensity
    intensity: AtomicU64,
}

impl ConsoleDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            intensity: AtomicU64::new(0f64.to_bits()),
        }
    }

    pub fn intensity(&self) -> f64 {
        f64::from_bits(self.intensity.load(Ordering::Relaxed))
    }
}

#[async_trait]
impl Device for ConsoleDevice {
    fn name(&self) -> &str {
        &self.name
    }

    async fn vibrate(&self, intensity: f64) -> Result<(), DeviceError> {
        self.intensity.store(intensity.to_bits(), Ordering::Relaxed);
        info!(device = %self.name, intensity, "Vibrating");
        Ok(())
    }
}

/// Hub of console devices, connected from the start.
#[derive(Debug)]
pub struct ConsoleHub {
    devices: Vec<Arc<ConsoleDevice>>,
    connected: AtomicBool,
}

impl ConsoleHub {
    pub fn new(device_count: usize) -> Self {
        Self {
            devices: (1..=device_count)
                .map(|i| Arc::new(ConsoleDevice::new(format!("console-{i}"))))
                .collect(),
            connected: AtomicBool::new(true),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
        info!(connected, "Console hub connection changed");
    }

    pub fn console_devices(&self) -> &[Arc<ConsoleDevice>] {
        &self.devices
    }
}

impl DeviceHub for ConsoleHub {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn devices(&self) -> Vec<Arc<dyn Device>> {
        if !self.is_connected() {
            return Vec::new();
        }
        self.devices
            .iter()
            .map(|d| Arc::clone(d) as Arc<dyn Device>)
            .collect()
    }
}
