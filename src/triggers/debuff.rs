//! Damage-over-time pulse
//!
//! While a debuff is active the devices alternate between a high and a low
//! strength. Each half is a Debuff event appended to the back of its queue,
//! slightly longer than the pulse period so consecutive halves overlap and the
//! output never drops to zero in between.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::HapticConfig;
use crate::device::DeviceHub;
use crate::vibration::{Priority, Scheduler};

/// Game ticks per second; debuff and respawn timers count in ticks.
pub const TICKS_PER_SECOND: u64 = 60;

/// Extra length per pulse half so neighbouring halves overlap.
pub const PULSE_OVERLAP_MS: u64 = 10;

pub(super) struct DebuffPulse {
    pub scheduler: Scheduler,
    pub config: Arc<RwLock<HapticConfig>>,
    pub hub: Arc<dyn DeviceHub>,
    pub duration_ticks: u64,
}

impl DebuffPulse {
    /// Runs until the debuff time is used up, the trigger is switched off or
    /// `token` is cancelled. Cancels `token` on the way out, so a cancelled
    /// token also means "no pulse running".
    pub async fn run(self, token: CancellationToken) {
        let _done = token.clone().drop_guard();
        let mut remaining_ms = self.duration_ticks * 1000 / TICKS_PER_SECOND;
        let mut high = true;
        debug!(remaining_ms, "Debuff pulse started");

        while remaining_ms > 0 && !token.is_cancelled() {
            let Some((strength, delay_ms)) = self.next_half(high) else {
                debug!("Debuff vibration switched off, ending pulse");
                break;
            };

            trace!(strength, delay_ms, "Debuff pulse half");
            self.scheduler.submit(
                Priority::Debuff,
                delay_ms + PULSE_OVERLAP_MS,
                strength,
                false,
                false,
            );
            high = !high;
            remaining_ms = remaining_ms.saturating_sub(delay_ms);

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
            }
        }

        debug!("Debuff pulse finished");
    }

    /// Reads the current settings for one half of the pulse, or `None` when
    /// the pulse should stop.
    fn next_half(&self, high: bool) -> Option<(f32, u64)> {
        let config = self.config.read().unwrap_or_else(PoisonError::into_inner);
        if !config.enabled || !config.debuff.enabled || !self.hub.is_connected() {
            return None;
        }
        let strength = if high {
            config.debuff.max_intensity
        } else {
            config.debuff.min_intensity
        };
        // a zero delay would never consume the remaining time
        Some((strength, config.debuff.delay_ms.max(1)))
    }
}
