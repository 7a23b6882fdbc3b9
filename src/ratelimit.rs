use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A service-reported request budget for one endpoint.
///
/// `reset` is the Unix time (seconds) at which `remaining` goes back to `limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub limit: u32,
    pub remaining: u32,
    pub reset: u64,
}

impl Default for RateLimit {
    fn default() -> Self {
        RateLimit {
            limit: 1,
            remaining: 1,
            reset: 0,
        }
    }
}

impl RateLimit {
    /// Whether a request may be issued at `now`.
    ///
    /// Once the reset time has passed the window is replenished.
    pub fn can_refresh(&mut self, now: u64) -> bool {
        if self.reset < now {
            self.remaining = self.limit;
            true
        } else {
            self.remaining > 0
        }
    }
}

/// Current Unix time in seconds.
pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_window_blocks() {
        let mut limit = RateLimit {
            limit: 15,
            remaining: 0,
            reset: 2_000,
        };
        assert!(!limit.can_refresh(1_000));
        assert_eq!(limit.remaining, 0);
    }

    #[test]
    fn test_past_reset_replenishes() {
        let mut limit = RateLimit {
            limit: 15,
            remaining: 0,
            reset: 500,
        };
        assert!(limit.can_refresh(1_000));
        assert_eq!(limit.remaining, 15);
    }

    #[test]
    fn test_remaining_budget_allows() {
        let mut limit = RateLimit {
            limit: 15,
            remaining: 3,
            reset: 2_000,
        };
        assert!(limit.can_refresh(1_000));
    }
}
