use std::fmt::{self, Display};
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;

/// Precedence class of a vibration event.
///
/// Variants are declared lowest first so the derived `Ord` matches precedence:
/// a live `Death` event always wins over a live `Hurt` event, and so on down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Debuff,
    Potion,
    HealthPercent,
    Hurt,
    Death,
}

impl Priority {
    /// Number of priority levels, one queue each.
    pub const COUNT: usize = 5;

    /// All levels, highest precedence first. Resolution scans in this order.
    pub const DESCENDING: [Priority; Priority::COUNT] = [
        Priority::Death,
        Priority::Hurt,
        Priority::HealthPercent,
        Priority::Potion,
        Priority::Debuff,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Debuff => write!(f, "debuff"),
            Priority::Potion => write!(f, "potion"),
            Priority::HealthPercent => write!(f, "health"),
            Priority::Hurt => write!(f, "hurt"),
            Priority::Death => write!(f, "death"),
        }
    }
}

/// Error returned when a priority name is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown priority: {0}")]
pub struct UnknownPriority(pub String);

impl FromStr for Priority {
    type Err = UnknownPriority;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debuff" => Ok(Priority::Debuff),
            "potion" => Ok(Priority::Potion),
            "health" | "health_percent" => Ok(Priority::HealthPercent),
            "hurt" | "damage" => Ok(Priority::Hurt),
            "death" => Ok(Priority::Death),
            other => Err(UnknownPriority(other.to_string())),
        }
    }
}

/// A request to hold a vibration strength for a fixed time.
///
/// Events are immutable once created. The scheduler compares them by identity
/// (the `Arc` allocation they live in), never by value: two events with equal
/// strength and duration are still different requests.
#[derive(Debug)]
pub struct VibrationEvent {
    created_at: Instant,
    duration: Duration,
    strength: f32,
}

impl VibrationEvent {
    pub fn new(duration_ms: u64, strength: f32) -> Self {
        Self::starting_at(Instant::now(), duration_ms, strength)
    }

    pub fn starting_at(created_at: Instant, duration_ms: u64, strength: f32) -> Self {
        Self {
            created_at,
            duration: Duration::from_millis(duration_ms),
            strength,
        }
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Requested strength, not yet clamped.
    pub fn strength(&self) -> f32 {
        self.strength
    }

    pub fn expires_at(&self) -> Instant {
        self.created_at + self.duration
    }

    pub fn has_expired(&self, now: Instant) -> bool {
        now >= self.expires_at()
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.expires_at().saturating_duration_since(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order_matches_precedence() {
        assert!(Priority::Death > Priority::Hurt);
        assert!(Priority::Hurt > Priority::HealthPercent);
        assert!(Priority::HealthPercent > Priority::Potion);
        assert!(Priority::Potion > Priority::Debuff);

        let mut sorted = Priority::DESCENDING;
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(sorted, Priority::DESCENDING);
    }

    #[test]
    fn test_priority_indices_are_dense() {
        let mut seen = [false; Priority::COUNT];
        for priority in Priority::DESCENDING {
            seen[priority.index()] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_priority_parsing() {
        assert_eq!("Death".parse::<Priority>(), Ok(Priority::Death));
        assert_eq!("health".parse::<Priority>(), Ok(Priority::HealthPercent));
        assert_eq!("damage".parse::<Priority>(), Ok(Priority::Hurt));
        assert!("poison".parse::<Priority>().is_err());
    }

    #[test]
    fn test_expiry_boundary() {
        let start = Instant::now();
        let event = VibrationEvent::starting_at(start, 500, 0.5);

        assert!(!event.has_expired(start));
        assert!(!event.has_expired(start + Duration::from_millis(499)));
        // expiry is inclusive of the end instant
        assert!(event.has_expired(start + Duration::from_millis(500)));
        assert_eq!(event.remaining(start + Duration::from_millis(200)), Duration::from_millis(300));
        assert_eq!(event.remaining(start + Duration::from_secs(5)), Duration::ZERO);
    }

    #[test]
    fn test_zero_duration_is_born_expired() {
        let start = Instant::now();
        let event = VibrationEvent::starting_at(start, 0, 1.0);
        assert!(event.has_expired(start));
    }
}
