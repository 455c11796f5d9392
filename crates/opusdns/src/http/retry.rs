use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::time::Instant;

use crate::errors::{OpusDnsError, Result};

/// Symmetric jitter applied to every backoff
const JITTER: f64 = 0.2;

/// Longest `Retry-After` delay honoured
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Retry limits for one executor
///
/// `max_attempts` counts retries: a call is dispatched at most
/// `max_attempts + 1` times, attempt 0 being the undelayed first try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, min_backoff: Duration, max_backoff: Duration) -> Result<Self> {
        let policy = Self {
            max_attempts,
            min_backoff,
            max_backoff,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Never retry
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_backoff > self.max_backoff {
            return Err(OpusDnsError::config(
                "retry_wait_min",
                format!(
                    "min backoff {:?} exceeds max backoff {:?}",
                    self.min_backoff, self.max_backoff
                ),
            ));
        }
        Ok(())
    }

    /// Jittered delay before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = rand::thread_rng().gen_range(-JITTER..=JITTER);
        self.backoff_with_jitter(retry, factor)
    }

    /// Delay for `retry` with an explicit jitter factor in `[-0.2, 0.2]`
    pub fn backoff_with_jitter(&self, retry: u32, factor: f64) -> Duration {
        let base = self.base_backoff(retry);
        base.mul_f64(1.0 + factor.clamp(-JITTER, JITTER))
    }

    /// `min_backoff * 2^(retry-1)`, capped at `max_backoff`
    pub fn base_backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.min_backoff
            .checked_mul(1u32 << exponent)
            .map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }
}

/// Shared "do not send before" deadline set by 429 responses
///
/// Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct RateLimitState {
    limited_until: Arc<Mutex<Option<Instant>>>,
}

impl RateLimitState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current deadline, cleared once it has passed
    pub fn limited_until(&self) -> Option<Instant> {
        let mut guard = self
            .limited_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.is_some_and(|until| until <= Instant::now()) {
            *guard = None;
        }
        *guard
    }

    /// Extend the deadline, never shortening an existing one
    pub fn limit_until(&self, until: Instant) {
        let mut guard = self
            .limited_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.map_or(true, |current| until > current) {
            *guard = Some(until);
        }
    }

    /// Time left before requests may be dispatched
    pub fn remaining(&self) -> Option<Duration> {
        self.limited_until()
            .map(|until| until.saturating_duration_since(Instant::now()))
            .filter(|d| !d.is_zero())
    }

    pub fn clear(&self) {
        let mut guard = self
            .limited_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = None;
    }
}

/// Parse a `Retry-After` value: delay seconds or an HTTP-date
///
/// The result is capped at [`MAX_RETRY_AFTER`].
pub fn parse_retry_after(value: &str, now: SystemTime) -> Option<Duration> {
    let value = value.trim();
    let delay = if let Ok(secs) = value.parse::<u64>() {
        Duration::from_secs(secs)
    } else {
        let date = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
        let now: DateTime<Utc> = now.into();
        (date - now).to_std().unwrap_or(Duration::ZERO)
    };
    Some(delay.min(MAX_RETRY_AFTER))
}
