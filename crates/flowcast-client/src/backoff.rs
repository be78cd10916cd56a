//! Reconnect backoff.

use std::time::Duration;

/// Bounded exponential backoff: `min(base * 2^attempt, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    /// Delay before the given (1-based) attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// What to do after a connection closed or failed to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconnect {
    /// Try again after `delay`.
    After { attempt: u32, delay: Duration },
    /// Budget exhausted. `notify` is true only the first time.
    GiveUp { notify: bool },
}

/// Per-manager retry counter and "already told the user" flag.
#[derive(Debug, Clone)]
pub struct ReconnectState {
    policy: ReconnectPolicy,
    attempts: u32,
    notified: bool,
}

impl ReconnectState {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            notified: false,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// A connection opened: start the budget over and allow a fresh notice.
    pub fn on_open(&mut self) {
        self.reset();
    }

    /// A connection closed unexpectedly or failed to open.
    pub fn on_close(&mut self) -> Reconnect {
        if self.attempts < self.policy.max_attempts {
            self.attempts += 1;
            Reconnect::After {
                attempt: self.attempts,
                delay: self.policy.delay_for(self.attempts),
            }
        } else {
            let notify = !self.notified;
            self.notified = true;
            Reconnect::GiveUp { notify }
        }
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.notified = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
        }
    }

    #[test]
    fn test_three_failures_back_off_then_give_up_once() {
        let mut state = ReconnectState::new(policy());
        let secs = |s| Duration::from_secs(s);

        assert_eq!(state.on_close(), Reconnect::After { attempt: 1, delay: secs(2) });
        assert_eq!(state.on_close(), Reconnect::After { attempt: 2, delay: secs(4) });
        assert_eq!(state.on_close(), Reconnect::After { attempt: 3, delay: secs(8) });
        assert_eq!(state.on_close(), Reconnect::GiveUp { notify: true });
        assert_eq!(state.on_close(), Reconnect::GiveUp { notify: false });
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = policy();
        assert_eq!(policy.delay_for(4), Duration::from_millis(10_000));
        assert_eq!(policy.delay_for(40), Duration::from_millis(10_000));
    }

    #[test]
    fn test_open_resets_budget_and_notice() {
        let mut state = ReconnectState::new(policy());
        for _ in 0..4 {
            state.on_close();
        }
        state.on_open();
        assert_eq!(state.attempts(), 0);
        assert!(matches!(state.on_close(), Reconnect::After { attempt: 1, .. }));
        for _ in 0..2 {
            state.on_close();
        }
        assert_eq!(state.on_close(), Reconnect::GiveUp { notify: true });
    }
}
