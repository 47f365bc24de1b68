//! Session timing configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Set to `1`, `true`, `yes` or `on` to run sessions without the watchdog
pub const DISABLE_WATCHDOG_ENV: &str = "QUORIDOR_DISABLE_WATCHDOG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// A move in flight longer than this ends the game
    pub move_timeout: Duration,
    pub watchdog_enabled: bool,
    /// Upper bound on a single watchdog sleep
    pub watchdog_poll: Duration,
    /// Moves finishing faster are padded out to this
    pub min_move_duration: Duration,
    /// Pause after an agent fails before asking it again
    pub missed_tick_backoff: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            move_timeout: Duration::from_secs(30),
            watchdog_enabled: true,
            watchdog_poll: Duration::from_millis(250),
            min_move_duration: Duration::from_millis(100),
            missed_tick_backoff: Duration::from_millis(50),
        }
    }
}

impl SessionConfig {
    /// Defaults, with the watchdog switch read from the environment
    pub fn from_env() -> Self {
        let disabled = parse_flag(std::env::var(DISABLE_WATCHDOG_ENV).ok().as_deref());
        Self {
            watchdog_enabled: !disabled,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_move_timeout(mut self, timeout: Duration) -> Self {
        self.move_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_watchdog(mut self, enabled: bool) -> Self {
        self.watchdog_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_min_move_duration(mut self, duration: Duration) -> Self {
        self.min_move_duration = duration;
        self
    }
}

/// Boolean-style environment value
pub fn parse_flag(value: Option<&str>) -> bool {
    value.is_some_and(|v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        for on in ["1", "true", "TRUE", " yes ", "On"] {
            assert!(parse_flag(Some(on)), "{on}");
        }
        for off in ["0", "false", "", "nope"] {
            assert!(!parse_flag(Some(off)), "{off}");
        }
        assert!(!parse_flag(None));
    }

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert!(config.watchdog_enabled);
        assert_eq!(config.move_timeout, Duration::from_secs(30));
        let quick = config.with_min_move_duration(Duration::ZERO).with_watchdog(false);
        assert_eq!(quick.min_move_duration, Duration::ZERO);
        assert!(!quick.watchdog_enabled);
    }
}
