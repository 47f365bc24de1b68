//! A point in time that work must finish by.
//!
//! Shared by the session watchdog, the timed turn waits and any agent that wants
//! to bound its own thinking time.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
        }
    }

    pub fn at(instant: Instant) -> Self {
        Self { at: instant }
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    /// Time left, zero once expired
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// The earlier of the two
    pub fn min(self, other: Deadline) -> Deadline {
        if other.at < self.at { other } else { self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_deadline_is_expired() {
        let d = Deadline::after(Duration::ZERO);
        assert!(d.expired());
        assert_eq!(d.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_future_deadline_counts_down() {
        let d = Deadline::after(Duration::from_secs(60));
        assert!(!d.expired());
        assert!(d.remaining() > Duration::from_secs(59));
        let soon = Deadline::after(Duration::from_secs(1));
        assert_eq!(d.min(soon), soon);
        assert_eq!(soon.min(d), soon);
    }
}
