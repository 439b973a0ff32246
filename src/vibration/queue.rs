//! Per-priority event queues.
//!
//! Each level owns its own lock so a producer appending a debuff pulse never
//! waits on a pass pruning the death queue.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use tracing::trace;

use super::event::{Priority, VibrationEvent};

type EventQueue = VecDeque<Arc<VibrationEvent>>;

#[derive(Debug, Default)]
pub struct PriorityQueues {
    levels: [Mutex<EventQueue>; Priority::COUNT],
}

impl PriorityQueues {
    pub fn new() -> Self {
        Self::default()
    }

    fn level(&self, priority: Priority) -> MutexGuard<'_, EventQueue> {
        // a panic while holding a queue lock leaves the deque itself intact
        self.levels[priority.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts an event, optionally dropping everything already queued at
    /// that level first. Clearing and inserting happen under one lock.
    pub fn push(
        &self,
        priority: Priority,
        event: Arc<VibrationEvent>,
        insert_at_front: bool,
        clear_others: bool,
    ) {
        let mut queue = self.level(priority);
        if clear_others && !queue.is_empty() {
            trace!(%priority, dropped = queue.len(), "Clearing queue before insert");
            queue.clear();
        }
        if insert_at_front {
            queue.push_front(event);
        } else {
            queue.push_back(event);
        }
    }

    /// Pops expired events off the front of one level and returns the first
    /// live one, leaving it queued.
    ///
    /// Expired events behind a live front stay queued until they reach the
    /// front themselves.
    pub fn next_live(&self, priority: Priority, now: Instant) -> Option<Arc<VibrationEvent>> {
        let mut queue = self.level(priority);
        while let Some(front) = queue.front() {
            if !front.has_expired(now) {
                return Some(Arc::clone(front));
            }
            queue.pop_front();
            trace!(%priority, "Pruned expired event");
        }
        None
    }

    /// Highest-precedence live event across all levels.
    pub fn select(&self, now: Instant) -> Option<(Priority, Arc<VibrationEvent>)> {
        Priority::DESCENDING
            .into_iter()
            .find_map(|priority| self.next_live(priority, now).map(|event| (priority, event)))
    }

    pub fn clear(&self, priority: Priority) {
        self.level(priority).clear();
    }

    pub fn clear_all(&self) {
        for priority in Priority::DESCENDING {
            self.clear(priority);
        }
    }

    /// Queued events at one level, expired ones included.
    pub fn len(&self, priority: Priority) -> usize {
        self.level(priority).len()
    }

    pub fn is_empty(&self) -> bool {
        Priority::DESCENDING
            .into_iter()
            .all(|priority| self.level(priority).is_empty())
    }
}
