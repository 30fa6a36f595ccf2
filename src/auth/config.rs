use chrono::TimeDelta;

use super::lockout::{DEFAULT_LOCK_MINUTES, DEFAULT_MAX_FAILED_ATTEMPTS, LockoutPolicy};

pub const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 15 * 60;
pub const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
pub const DEFAULT_LOCKOUT_SECONDS: i64 = DEFAULT_LOCK_MINUTES * 60;
/// Upper bound for every lifetime setting: ten years.
pub const MAX_DURATION_SECONDS: i64 = 10 * 365 * 24 * 60 * 60;

/// Clamp into `1..=MAX_DURATION_SECONDS`.
const fn bounded_seconds(seconds: i64) -> i64 {
    if seconds < 1 {
        1
    } else if seconds > MAX_DURATION_SECONDS {
        MAX_DURATION_SECONDS
    } else {
        seconds
    }
}

fn duration(seconds: i64) -> TimeDelta {
    TimeDelta::try_seconds(bounded_seconds(seconds)).unwrap_or(TimeDelta::zero())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthConfig {
    access_token_ttl_seconds: i64,
    refresh_token_ttl_seconds: i64,
    max_failed_logins: i32,
    lockout_seconds: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            refresh_token_ttl_seconds: DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
            max_failed_logins: DEFAULT_MAX_FAILED_ATTEMPTS,
            lockout_seconds: DEFAULT_LOCKOUT_SECONDS,
        }
    }

    #[must_use]
    pub const fn with_access_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_token_ttl_seconds = bounded_seconds(seconds);
        self
    }

    #[must_use]
    pub const fn with_refresh_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_token_ttl_seconds = bounded_seconds(seconds);
        self
    }

    #[must_use]
    pub const fn with_max_failed_logins(mut self, attempts: i32) -> Self {
        self.max_failed_logins = attempts;
        self
    }

    #[must_use]
    pub const fn with_lockout_seconds(mut self, seconds: i64) -> Self {
        self.lockout_seconds = bounded_seconds(seconds);
        self
    }

    #[must_use]
    pub fn access_token_ttl(&self) -> TimeDelta {
        duration(self.access_token_ttl_seconds)
    }

    #[must_use]
    pub fn refresh_token_ttl(&self) -> TimeDelta {
        duration(self.refresh_token_ttl_seconds)
    }

    /// Cookie `Max-Age` for the refresh token.
    #[must_use]
    pub const fn refresh_token_ttl_seconds(&self) -> i64 {
        self.refresh_token_ttl_seconds
    }

    #[must_use]
    pub fn lockout_policy(&self) -> LockoutPolicy {
        LockoutPolicy::new(
            self.max_failed_logins,
            duration(self.lockout_seconds),
        )
    }
}
