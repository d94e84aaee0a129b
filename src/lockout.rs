//! Brute-force lockout.
//!
//! Pure state transitions over the counters stored on an account. A lock is
//! never "released" explicitly: it expires when `now` passes `locked_until`.

use chrono::{DateTime, Duration, Utc};

pub const DEFAULT_THRESHOLD: u32 = 5;
pub const DEFAULT_LOCK_MINUTES: i64 = 15;
/// One year.
pub const MAX_LOCK_MINUTES: i64 = 525_600;

/// Lockout counters as persisted on an account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoginState {
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockoutStatus {
    Active,
    Locked { until: DateTime<Utc> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockoutPolicy {
    threshold: u32,
    lock_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            lock_duration: Duration::minutes(DEFAULT_LOCK_MINUTES),
        }
    }
}

impl LockoutPolicy {
    #[must_use]
    pub fn new(threshold: u32, lock_duration: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            lock_duration,
        }
    }

    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    #[must_use]
    pub fn lock_duration(&self) -> Duration {
        self.lock_duration
    }

    #[must_use]
    pub fn evaluate(&self, state: &LoginState, now: DateTime<Utc>) -> LockoutStatus {
        match state.locked_until {
            Some(until) if now < until => LockoutStatus::Locked { until },
            _ => LockoutStatus::Active,
        }
    }

    /// Counts a failed attempt. Reaching the threshold locks the account and
    /// zeroes the counter.
    #[must_use]
    pub fn on_failure(&self, state: &LoginState, now: DateTime<Utc>) -> LoginState {
        let failed_attempts = state.failed_attempts.saturating_add(1);
        if failed_attempts >= self.threshold {
            let until = now
                .checked_add_signed(self.lock_duration)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            LoginState {
                failed_attempts: 0,
                locked_until: Some(until),
            }
        } else {
            LoginState {
                failed_attempts,
                locked_until: state.locked_until,
            }
        }
    }

    #[must_use]
    pub fn on_success(&self) -> LoginState {
        LoginState::default()
    }
}
