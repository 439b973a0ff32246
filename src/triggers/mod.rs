//! Game-event triggers
//!
//! Maps game facts (health level, hits taken, death, debuffs, potions) onto
//! scheduler submissions. The priority, strength and duration of every
//! vibration are decided here from the [`HapticConfig`]; the scheduler only
//! arbitrates between them.
//!
//! | Trigger            | Priority        | Insert | Clears level |
//! |--------------------|-----------------|--------|--------------|
//! | `died`             | `Death`         | front  | no           |
//! | `damaged`          | `Hurt`          | front  | no           |
//! | `health_updated`   | `HealthPercent` | front  | yes          |
//! | `potion_used`      | `Potion`        | front  | no           |
//! | `damage_over_time` | `Debuff`        | back   | no           |
//! | `respawned`        | `HealthPercent` | front  | yes          |
//!
//! Every trigger does nothing while vibration is disabled in the config, its
//! own section is disabled, or the device hub is not connected.

mod debuff;

pub use debuff::{PULSE_OVERLAP_MS, TICKS_PER_SECOND};

use std::sync::{Arc, Mutex, PoisonError, RwLockReadGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{HapticConfig, SharedConfig};
use crate::device::DeviceHub;
use crate::vibration::{Priority, Scheduler};
use debuff::DebuffPulse;

/// Lifetime of one health-level event. Renewed every game tick, so it only
/// needs to outlast the gap between two ticks.
pub const HEALTH_EVENT_MS: u64 = 100;

pub struct GameTriggers {
    scheduler: Scheduler,
    config: SharedConfig,
    hub: Arc<dyn DeviceHub>,
    debuff_pulse: Mutex<Option<CancellationToken>>,
}

impl GameTriggers {
    pub fn new(scheduler: Scheduler, config: SharedConfig, hub: Arc<dyn DeviceHub>) -> Self {
        Self {
            scheduler,
            config,
            hub,
            debuff_pulse: Mutex::new(None),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Config guard, or `None` when triggers should stay quiet.
    fn armed(&self) -> Option<RwLockReadGuard<'_, HapticConfig>> {
        let config = self.config.read().unwrap_or_else(PoisonError::into_inner);
        if !config.enabled || !self.hub.is_connected() {
            return None;
        }
        Some(config)
    }

    /// Vibrates in proportion to missing health, replacing the previous
    /// health-level event.
    pub fn health_updated(&self, current_hp: u32, max_hp: u32, is_dead: bool) {
        let Some(config) = self.armed() else { return };
        if !config.health.enabled || is_dead || max_hp == 0 {
            return;
        }

        let missing = 1.0 - current_hp as f32 / max_hp as f32;
        let range = config.health.max_intensity - config.health.min_intensity;
        let strength = (missing * range + config.health.min_intensity).clamp(0.0, 1.0);
        drop(config);

        self.scheduler
            .submit(Priority::HealthPercent, HEALTH_EVENT_MS, strength, true, true);
    }

    /// Vibrates for a hit, either at the configured intensity or scaled by the
    /// share of maximum health lost.
    pub fn damaged(&self, damage: u32, max_hp: u32) {
        let Some(config) = self.armed() else { return };
        let damage_config = &config.damage;
        if !damage_config.enabled || damage < damage_config.minimum_damage {
            return;
        }

        let strength = if damage_config.static_strength || max_hp == 0 {
            damage_config.intensity
        } else {
            damage as f32 / max_hp as f32
        };
        let duration_ms = damage_config.duration_ms;
        drop(config);

        debug!(damage, strength, "Damage vibration");
        self.scheduler
            .submit(Priority::Hurt, duration_ms, strength, true, false);
    }

    /// Vibrates on death, for a fixed time or until the respawn timer runs out.
    pub fn died(&self, respawn_ticks: u32) {
        let Some(config) = self.armed() else { return };
        if !config.death.enabled {
            return;
        }

        let duration_ms = if config.death.static_length {
            config.death.duration_ms
        } else {
            // whole seconds only, like the respawn counter shown to the player
            u64::from(respawn_ticks) / TICKS_PER_SECOND * 1000
        };
        let strength = config.death.intensity;
        drop(config);

        info!(duration_ms, "Death vibration");
        self.scheduler
            .submit(Priority::Death, duration_ms, strength, true, false);
    }

    pub fn potion_used(&self) {
        let Some(config) = self.armed() else { return };
        if !config.potion.enabled {
            return;
        }
        let (duration_ms, strength) = (config.potion.duration_ms, config.potion.intensity);
        drop(config);

        self.scheduler
            .submit(Priority::Potion, duration_ms, strength, true, false);
    }

    /// Starts a high/low pulse lasting `duration_ticks` unless one is already
    /// running. Returns whether a new pulse was started.
    pub fn damage_over_time(&self, duration_ticks: u32) -> bool {
        {
            let Some(config) = self.armed() else {
                return false;
            };
            if !config.debuff.enabled {
                return false;
            }
        }

        let mut slot = self
            .debuff_pulse
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|token| !token.is_cancelled()) {
            return false;
        }

        let token = CancellationToken::new();
        let pulse = DebuffPulse {
            scheduler: self.scheduler.clone(),
            config: Arc::clone(&self.config),
            hub: Arc::clone(&self.hub),
            duration_ticks: u64::from(duration_ticks),
        };
        self.scheduler.runtime().spawn(pulse.run(token.clone()));
        *slot = Some(token);
        true
    }

    pub fn debuff_active(&self) -> bool {
        self.debuff_pulse
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    /// Stops a running debuff pulse. Events it already queued play out.
    pub fn reset(&self) {
        if let Some(token) = self
            .debuff_pulse
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
            debug!("Debuff pulse reset");
        }
    }

    /// Stops everything: the debuff pulse, all queued events and the devices.
    pub fn disable(&self) {
        self.reset();
        self.scheduler.halt();
    }

    /// Clears the pulse left over from the previous life, then reports the
    /// health the player respawned with.
    pub fn respawned(&self, current_hp: u32, max_hp: u32) {
        self.reset();
        self.health_updated(current_hp, max_hp, false);
    }

    /// Replaces the shared config and pushes the new global scale to the
    /// devices. Turning the master switch off stops everything.
    pub fn apply_config(&self, config: HapticConfig) {
        let max_intensity = config.max_intensity;
        let enabled = config.enabled;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;

        self.scheduler.set_max_intensity(max_intensity);
        info!(enabled, max_intensity, "Configuration applied");
        if !enabled {
            self.disable();
        }
    }
}
