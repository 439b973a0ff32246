//! Priority scheduler - decides which event drives the devices
//!
//! Every submission and every timer wake-up runs a resolution pass:
//!
//! ```text
//! submit ──► queue[priority] ──► resolve ──► drive(strength) ──► actuator
//!                                   ▲                │
//!                                   │          sleep_until(expiry)
//!                                   └── continuation ◄┘
//! ```
//!
//! A pass scans levels from `Death` down to `Debuff`, prunes expired events
//! from the front of each queue and picks the first live one. If that is the
//! event already driving output nothing happens. Otherwise it becomes the
//! active event, the devices are driven to its strength and a one-shot timer
//! re-runs resolution when it expires. When nothing is live any more the
//! devices are stopped and no timer is armed.
//!
//! # Locking
//!
//! - one lock per priority queue (see [`PriorityQueues`])
//! - `active`, held for the whole select-and-commit step of a pass
//! - `last_applied`, the debounce cache, never held together with the others
//!
//! # Generations
//!
//! Each change of the driving event, and each halt, bumps a generation
//! counter. Timers and drive requests carry the generation they were created
//! under and become no-ops once it has moved on, so superseded timers never
//! need cancelling and a slow pass cannot overwrite a newer strength.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use super::event::{Priority, VibrationEvent};
use super::queue::PriorityQueues;
use super::SchedulerError;
use crate::device::{clamp_strength, ActuatorHandle, DeviceHub};

/// Handle to the vibration scheduler.
///
/// Cloning is cheap and every clone drives the same queues and devices. The
/// scheduler shuts down (timers become no-ops, the actuator worker exits) once
/// the last clone is dropped.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

/// Point-in-time view of the scheduler, for logging and diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerStatus {
    /// Queued events per level, highest precedence first. Expired events that
    /// have not been pruned yet are counted.
    pub queued: Vec<(Priority, usize)>,
    pub last_applied_strength: f32,
    pub active: bool,
}

struct SchedulerInner {
    queues: PriorityQueues,
    active: Mutex<Option<ActiveEvent>>,
    resolving: AtomicBool,
    rerun: AtomicBool,
    generation: AtomicU64,
    last_applied: Mutex<f32>,
    actuator: ActuatorHandle,
    runtime: Handle,
}

/// The event currently driving output. Held weakly: the queue owns it.
struct ActiveEvent {
    event: Weak<VibrationEvent>,
    expires_at: Instant,
}

impl ActiveEvent {
    fn new(event: &Arc<VibrationEvent>) -> Self {
        Self {
            event: Arc::downgrade(event),
            expires_at: event.expires_at(),
        }
    }

    // The weak reference keeps the allocation alive, so addresses are never reused
    fn is(&self, event: &Arc<VibrationEvent>) -> bool {
        std::ptr::eq(self.event.as_ptr(), Arc::as_ptr(event))
    }

    fn has_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// What a resolution pass decided, carried out after the pass has ended.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Resolution {
    Idle,
    Unchanged,
    Stop {
        generation: u64,
    },
    Drive {
        strength: f32,
        expires_at: Instant,
        generation: u64,
    },
}

impl Scheduler {
    /// Spawns the scheduler and its actuator worker on the current tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NoRuntime`] when called outside a runtime.
    pub fn spawn(hub: Arc<dyn DeviceHub>, max_intensity: f32) -> Result<Self, SchedulerError> {
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        Ok(Self::spawn_on(runtime, hub, max_intensity))
    }

    /// Like [`Scheduler::spawn`] with an explicit runtime, for callers living
    /// on threads the runtime does not own.
    pub fn spawn_on(runtime: Handle, hub: Arc<dyn DeviceHub>, max_intensity: f32) -> Self {
        let actuator = ActuatorHandle::spawn(&runtime, hub, max_intensity);
        info!("Vibration scheduler initialized");
        Self {
            inner: Arc::new(SchedulerInner {
                queues: PriorityQueues::new(),
                active: Mutex::new(None),
                resolving: AtomicBool::new(false),
                rerun: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                last_applied: Mutex::new(0.0),
                actuator,
                runtime,
            }),
        }
    }

    /// Queues a vibration and re-resolves what should be driving the devices.
    ///
    /// * `duration_ms` - how long the event stays live, counted from now
    /// * `strength` - `0.0` to `1.0`; out-of-range values are clamped
    /// * `insert_at_front` - take precedence over events already queued at
    ///   this priority instead of waiting behind them
    /// * `clear_others` - drop every event already queued at this priority,
    ///   live or not, before inserting
    ///
    /// Never blocks beyond short lock hold times and never waits on a device.
    pub fn submit(
        &self,
        priority: Priority,
        duration_ms: u64,
        strength: f32,
        insert_at_front: bool,
        clear_others: bool,
    ) {
        let event = Arc::new(VibrationEvent::new(duration_ms, strength));
        trace!(
            %priority,
            duration_ms,
            strength,
            insert_at_front,
            clear_others,
            "Submitting vibration event"
        );
        self.inner
            .queues
            .push(priority, event, insert_at_front, clear_others);
        self.inner.process_events();
    }

    /// Clears every queue and stops all devices.
    ///
    /// The stop command bypasses the debounce cache so it reaches the devices
    /// even when the scheduler believes they are already off.
    pub fn halt(&self) {
        self.inner.halt();
    }

    /// Forwards a new global intensity scale to the actuator.
    pub fn set_max_intensity(&self, max_intensity: f32) {
        self.inner.actuator.set_max_intensity(max_intensity);
    }

    /// Runtime the scheduler's timers run on.
    pub(crate) fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    pub fn last_applied_strength(&self) -> f32 {
        *lock(&self.inner.last_applied)
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            queued: Priority::DESCENDING
                .into_iter()
                .map(|priority| (priority, self.inner.queues.len(priority)))
                .collect(),
            last_applied_strength: self.last_applied_strength(),
            active: lock(&self.inner.active).is_some(),
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("generation", &self.inner.generation.load(Ordering::SeqCst))
            .field("status", &self.status())
            .finish()
    }
}

impl SchedulerInner {
    /// Runs resolution passes until no request is left outstanding.
    ///
    /// A request arriving while a pass is running only raises `rerun`; the
    /// running pass loops once more when it finishes, so nothing queued is
    /// ever left unresolved.
    fn process_events(self: &Arc<Self>) {
        self.rerun.store(true, Ordering::SeqCst);
        loop {
            if self
                .resolving
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                trace!("Resolution already in progress, coalescing");
                return;
            }
            self.rerun.store(false, Ordering::SeqCst);

            let resolution = self.resolve();

            // released before actuating so a fast timer can start the next pass
            self.resolving.store(false, Ordering::SeqCst);
            self.carry_out(resolution);

            if !self.rerun.load(Ordering::SeqCst) {
                return;
            }
        }
    }

    fn resolve(&self) -> Resolution {
        let mut active = lock(&self.active);
        let mut now = Instant::now();

        loop {
            let Some((priority, event)) = self.queues.select(now) else {
                let previous_expired = active.as_ref().map(|previous| previous.has_expired(now));
                return match previous_expired {
                    Some(true) => {
                        debug!("All events passed, stopping devices");
                        *active = None;
                        Resolution::Stop {
                            generation: self.generation.load(Ordering::SeqCst),
                        }
                    }
                    // cleared while still running; its own timer stops output at expiry
                    Some(false) => Resolution::Idle,
                    None => Resolution::Idle,
                };
            };

            if active.as_ref().is_some_and(|current| current.is(&event)) {
                trace!(%priority, "Event ongoing");
                return Resolution::Unchanged;
            }

            // The clock may have moved past the event while the levels above
            // were scanned. A zero wait would re-enter resolution immediately,
            // so rescan instead; the event is pruned as expired.
            let fresh = Instant::now();
            if event.remaining(fresh).is_zero() {
                now = fresh;
                continue;
            }

            *active = Some(ActiveEvent::new(&event));
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            debug!(
                %priority,
                strength = event.strength(),
                remaining_ms = event.remaining(now).as_millis() as u64,
                generation,
                "Event found"
            );
            return Resolution::Drive {
                strength: event.strength(),
                expires_at: event.expires_at(),
                generation,
            };
        }
    }

    fn carry_out(self: &Arc<Self>, resolution: Resolution) {
        match resolution {
            Resolution::Idle | Resolution::Unchanged => {}
            Resolution::Stop { generation } => {
                self.drive(generation, 0.0);
            }
            Resolution::Drive {
                strength,
                expires_at,
                generation,
            } => {
                if self.drive(generation, strength) {
                    self.schedule_continuation(generation, expires_at);
                }
            }
        }
    }

    /// Sends `strength` to the actuator unless it equals the last value sent.
    ///
    /// Returns false when `generation` is stale; a newer pass or a halt owns
    /// the output and the request is dropped.
    fn drive(&self, generation: u64, strength: f32) -> bool {
        let strength = clamp_strength(strength);
        let mut last_applied = lock(&self.last_applied);

        if self.generation.load(Ordering::SeqCst) != generation {
            trace!(generation, "Dropping stale drive request");
            return false;
        }
        if *last_applied == strength {
            trace!(strength, "Strength unchanged, not re-sending");
            return true;
        }

        debug!(strength, "Vibrating at new strength");
        *last_applied = strength;
        self.actuator.apply(strength);
        true
    }

    fn schedule_continuation(self: &Arc<Self>, generation: u64, expires_at: Instant) {
        let scheduler = Arc::downgrade(self);
        self.runtime.spawn(async move {
            tokio::time::sleep_until(expires_at).await;

            let Some(scheduler) = scheduler.upgrade() else {
                return;
            };
            if scheduler.generation.load(Ordering::SeqCst) != generation {
                trace!(generation, "Superseded timer woke up, ignoring");
                return;
            }
            trace!(generation, "Event finished, re-resolving");
            scheduler.process_events();
        });
    }

    fn halt(&self) {
        self.queues.clear_all();
        {
            let mut active = lock(&self.active);
            *active = None;
            self.generation.fetch_add(1, Ordering::SeqCst);
        }

        let mut last_applied = lock(&self.last_applied);
        *last_applied = 0.0;
        self.actuator.stop();
        info!("Vibration halted");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::testing::{assert_applied, RecordingHub};
    use std::time::Duration;
    use tokio::time::sleep;

    fn scheduler(hub: &Arc<RecordingHub>) -> Scheduler {
        Scheduler::spawn(hub.clone(), 1.0).unwrap()
    }

    /// Lets the actuator worker drain without crossing any event boundary
    async fn settle() {
        sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_death_preempts_hurt_then_stops() {
        let hub = RecordingHub::with_devices(1);
        let scheduler = scheduler(&hub);

        scheduler.submit(Priority::Hurt, 600, 0.5, true, false);
        scheduler.submit(Priority::Death, 1000, 0.7, true, false);
        settle().await;
        assert_applied(&hub.applied(), &[0.5, 0.7]);

        // hurt expires underneath death without changing the output
        sleep(Duration::from_millis(700)).await;
        assert_applied(&hub.applied(), &[0.5, 0.7]);

        sleep(Duration::from_millis(400)).await;
        assert_applied(&hub.applied(), &[0.5, 0.7, 0.0]);
        assert!(scheduler.status().queued.iter().all(|(_, n)| *n == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lower_priority_resumes_after_preemption() {
        let hub = RecordingHub::with_devices(1);
        let scheduler = scheduler(&hub);

        scheduler.submit(Priority::Hurt, 1500, 0.5, true, false);
        scheduler.submit(Priority::Death, 1000, 0.7, true, false);
        settle().await;

        sleep(Duration::from_millis(1100)).await;
        assert_applied(&hub.applied(), &[0.5, 0.7, 0.5]);
        assert_eq!(scheduler.last_applied_strength(), 0.5);

        sleep(Duration::from_millis(500)).await;
        assert_applied(&hub.applied(), &[0.5, 0.7, 0.5, 0.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lower_priority_never_interrupts_higher() {
        let hub = RecordingHub::with_devices(1);
        let scheduler = scheduler(&hub);

        scheduler.submit(Priority::Death, 1000, 0.7, false, false);
        scheduler.submit(Priority::Debuff, 300, 0.2, true, false);
        scheduler.submit(Priority::Potion, 300, 0.4, true, false);
        settle().await;

        assert_applied(&hub.applied(), &[0.7]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_debuff_pulses_alternate_without_gap() {
        let hub = RecordingHub::with_devices(1);
        let scheduler = scheduler(&hub);

        scheduler.submit(Priority::Debuff, 510, 0.45, false, false);
        sleep(Duration::from_millis(500)).await;
        scheduler.submit(Priority::Debuff, 510, 0.2, false, false);
        settle().await;
        // the older entry still holds the front
        assert_applied(&hub.applied(), &[0.45]);

        sleep(Duration::from_millis(100)).await;
        assert_applied(&hub.applied(), &[0.45, 0.2]);

        sleep(Duration::from_millis(500)).await;
        assert_applied(&hub.applied(), &[0.45, 0.2, 0.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_front_insert_takes_over_same_priority() {
        let hub = RecordingHub::with_devices(1);
        let scheduler = scheduler(&hub);

        scheduler.submit(Priority::Hurt, 1000, 0.3, false, false);
        scheduler.submit(Priority::Hurt, 200, 0.9, true, false);
        settle().await;
        assert_applied(&hub.applied(), &[0.3, 0.9]);

        sleep(Duration::from_millis(300)).await;
        assert_applied(&hub.applied(), &[0.3, 0.9, 0.3]);

        sleep(Duration::from_millis(800)).await;
        assert_applied(&hub.applied(), &[0.3, 0.9, 0.3, 0.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_replaces_pending_events_at_one_level() {
        let hub = RecordingHub::with_devices(1);
        let scheduler = scheduler(&hub);

        scheduler.submit(Priority::Potion, 400, 0.4, true, false);
        scheduler.submit(Priority::HealthPercent, 5000, 0.3, true, false);
        scheduler.submit(Priority::HealthPercent, 5000, 0.35, false, false);
        scheduler.submit(Priority::HealthPercent, 100, 0.6, true, true);
        settle().await;

        let status = scheduler.status();
        assert!(status.queued.contains(&(Priority::HealthPercent, 1)));
        assert!(status.queued.contains(&(Priority::Potion, 1)));
        assert_applied(&hub.applied(), &[0.4, 0.3, 0.6]);

        // health entry gone after 100ms, potion takes over until 400ms
        sleep(Duration::from_millis(150)).await;
        assert_applied(&hub.applied(), &[0.4, 0.3, 0.6, 0.4]);
        sleep(Duration::from_millis(300)).await;
        assert_applied(&hub.applied(), &[0.4, 0.3, 0.6, 0.4, 0.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_equal_strength_is_debounced() {
        let hub = RecordingHub::with_devices(1);
        let scheduler = scheduler(&hub);

        scheduler.submit(Priority::Hurt, 300, 0.5, true, false);
        scheduler.submit(Priority::Death, 600, 0.5, true, false);
        settle().await;
        assert_applied(&hub.applied(), &[0.5]);

        scheduler.submit(Priority::Death, 600, 0.8, true, false);
        settle().await;
        assert_applied(&hub.applied(), &[0.5, 0.8]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_strength_clamped_before_caching() {
        let hub = RecordingHub::with_devices(1);
        let scheduler = scheduler(&hub);

        scheduler.submit(Priority::Hurt, 300, 1.5, true, false);
        scheduler.submit(Priority::Death, 300, 1.0, true, false);
        settle().await;

        assert_applied(&hub.applied(), &[1.0]);
        assert_eq!(scheduler.last_applied_strength(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_exactly_once_and_goes_quiet() {
        let hub = RecordingHub::with_devices(1);
        let scheduler = scheduler(&hub);

        scheduler.submit(Priority::Potion, 200, 0.4, true, false);
        sleep(Duration::from_millis(300)).await;
        assert_applied(&hub.applied(), &[0.4, 0.0]);
        assert!(!scheduler.status().active);

        // an already-expired submission triggers a pass that finds nothing to do
        scheduler.submit(Priority::Potion, 0, 0.9, true, false);
        sleep(Duration::from_millis(2000)).await;
        assert_applied(&hub.applied(), &[0.4, 0.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_ever_active_stays_silent() {
        let hub = RecordingHub::with_devices(1);
        let scheduler = scheduler(&hub);

        scheduler.submit(Priority::Death, 0, 0.7, true, false);
        sleep(Duration::from_millis(100)).await;

        assert!(hub.applied().is_empty());
        assert!(!scheduler.status().active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_halt_always_reaches_devices() {
        let hub = RecordingHub::with_devices(2);
        let scheduler = scheduler(&hub);

        scheduler.submit(Priority::Death, 1000, 0.7, true, false);
        scheduler.submit(Priority::Debuff, 1000, 0.2, false, false);
        settle().await;

        scheduler.halt();
        settle().await;
        assert_applied(&hub.applied(), &[0.7, 0.0]);
        assert!(scheduler.status().queued.iter().all(|(_, n)| *n == 0));

        // cache already says zero, the stop still goes out
        scheduler.halt();
        settle().await;
        assert_applied(&hub.applied(), &[0.7, 0.0, 0.0]);
        for device in &hub.devices {
            assert_applied(&device.applied(), &[0.7, 0.0, 0.0]);
        }

        // the death event's timer is stale and must not produce anything
        sleep(Duration::from_millis(1500)).await;
        assert_applied(&hub.applied(), &[0.7, 0.0, 0.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_with_superseded_generation_is_dropped() {
        let hub = RecordingHub::with_devices(1);
        let scheduler = scheduler(&hub);

        scheduler.submit(Priority::Hurt, 300, 0.4, true, false);
        settle().await;
        let generation = scheduler.inner.generation.load(Ordering::SeqCst);

        scheduler.halt();
        assert!(!scheduler.inner.drive(generation, 0.9));
        settle().await;

        assert_applied(&hub.applied(), &[0.4, 0.0]);
        assert_eq!(scheduler.last_applied_strength(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_after_halt_starts_fresh() {
        let hub = RecordingHub::with_devices(1);
        let scheduler = scheduler(&hub);

        scheduler.submit(Priority::Hurt, 500, 0.5, true, false);
        scheduler.halt();
        scheduler.submit(Priority::Hurt, 500, 0.5, true, false);
        settle().await;
        assert_applied(&hub.applied(), &[0.5, 0.0, 0.5]);

        sleep(Duration::from_millis(600)).await;
        assert_applied(&hub.applied(), &[0.5, 0.0, 0.5, 0.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_health_updates_keeps_one_entry() {
        let hub = RecordingHub::with_devices(1);
        let scheduler = scheduler(&hub);

        for tick in 0..30u32 {
            let strength = if tick % 2 == 0 { 0.3 } else { 0.6 };
            scheduler.submit(Priority::HealthPercent, 100, strength, true, true);
            sleep(Duration::from_millis(16)).await;
        }
        assert!(scheduler
            .status()
            .queued
            .contains(&(Priority::HealthPercent, 1)));
        // no gap: the output never returned to zero while updates kept coming
        assert!(!hub.applied().contains(&0.0));

        sleep(Duration::from_millis(200)).await;
        assert_eq!(hub.applied().last(), Some(&0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_scheduler_silences_timers() {
        let hub = RecordingHub::with_devices(1);
        let scheduler = scheduler(&hub);

        scheduler.submit(Priority::Hurt, 200, 0.5, true, false);
        settle().await;
        drop(scheduler);

        sleep(Duration::from_millis(500)).await;
        assert_applied(&hub.applied(), &[0.5]);
    }

    #[test]
    fn test_spawn_outside_runtime_fails() {
        let hub = RecordingHub::with_devices(1);
        let result = Scheduler::spawn(hub, 1.0);
        assert!(matches!(result, Err(SchedulerError::NoRuntime)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_submit_from_foreign_thread() {
        let hub = RecordingHub::with_devices(1);
        let scheduler = scheduler(&hub);

        let producer = scheduler.clone();
        std::thread::spawn(move || producer.submit(Priority::Death, 2000, 0.6, true, false))
            .join()
            .unwrap();

        sleep(Duration::from_millis(100)).await;
        assert_applied(&hub.applied(), &[0.6]);

        scheduler.halt();
        sleep(Duration::from_millis(50)).await;
        assert_applied(&hub.applied(), &[0.6, 0.0]);
    }
}
