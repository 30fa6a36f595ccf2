//! Brute-force protection for sign-in.
//!
//! The failure counter and lock deadline live on the user row. The policy here
//! only decides what they mean.

use chrono::{DateTime, TimeDelta, Utc};

pub const DEFAULT_MAX_FAILED_ATTEMPTS: i32 = 3;
pub const DEFAULT_LOCK_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Open,
    Locked { until: DateTime<Utc> },
}

impl LockState {
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    max_failed_attempts: i32,
    lock_duration: TimeDelta,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_FAILED_ATTEMPTS,
            TimeDelta::minutes(DEFAULT_LOCK_MINUTES),
        )
    }
}

impl LockoutPolicy {
    #[must_use]
    pub const fn new(max_failed_attempts: i32, lock_duration: TimeDelta) -> Self {
        Self {
            max_failed_attempts,
            lock_duration,
        }
    }

    #[must_use]
    pub const fn max_failed_attempts(&self) -> i32 {
        self.max_failed_attempts
    }

    #[must_use]
    pub const fn lock_duration(&self) -> TimeDelta {
        self.lock_duration
    }

    /// Locked while `locked_until` is strictly in the future.
    #[must_use]
    pub fn state(&self, locked_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> LockState {
        match locked_until {
            Some(until) if until > now => LockState::Locked { until },
            _ => LockState::Open,
        }
    }

    /// Deadline to store after a failure, given the already incremented counter.
    /// A deadline past the end of the calendar saturates.
    #[must_use]
    pub fn lock_after_failure(
        &self,
        failed_attempts: i32,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        (failed_attempts >= self.max_failed_attempts).then(|| {
            now.checked_add_signed(self.lock_duration)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let policy = LockoutPolicy::default();
        assert_eq!(policy.max_failed_attempts(), 3);
        assert_eq!(policy.lock_duration(), TimeDelta::minutes(15));
    }

    #[test]
    fn locks_at_threshold() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        assert_eq!(policy.lock_after_failure(1, now), None);
        assert_eq!(policy.lock_after_failure(2, now), None);
        assert_eq!(
            policy.lock_after_failure(3, now),
            Some(now + TimeDelta::minutes(15))
        );
        assert!(policy.lock_after_failure(7, now).is_some());
    }

    #[test]
    fn huge_lock_saturates() {
        let policy = LockoutPolicy::new(1, TimeDelta::MAX);
        let now = Utc::now();
        let until = policy.lock_after_failure(1, now);
        assert_eq!(until, Some(DateTime::<Utc>::MAX_UTC));
        assert!(policy.state(until, now).is_locked());
    }

    #[test]
    fn state_follows_deadline() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        assert_eq!(policy.state(None, now), LockState::Open);
        assert!(policy.state(Some(now + TimeDelta::seconds(1)), now).is_locked());
        assert!(!policy.state(Some(now), now).is_locked());
        assert!(!policy.state(Some(now - TimeDelta::minutes(1)), now).is_locked());
    }
}
