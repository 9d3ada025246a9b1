//! Retry policy: retry budget and backoff delays.

use std::time::Duration;

/// Retry policy for failed sends.
///
/// The k-th retry (k starting at 1) waits `base_delay * multiplier^(k-1)`,
/// optionally capped by `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt. 0 means "never retry".
    pub max_retries: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for a single delay.
    pub max_delay: Option<Duration>,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);
    pub const DEFAULT_MULTIPLIER: f64 = 2.0;

    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            multiplier: Self::DEFAULT_MULTIPLIER,
            max_delay: None,
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Is there retry budget left for an item that has been retried `retry_count` times?
    pub fn allows_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }

    /// Delay before the next retry.
    ///
    /// # Arguments
    /// * `retry_count` - Retries already performed (value *before* increment).
    ///
    /// Example with base_delay=2s, multiplier=2.0:
    /// - retry_count 0 (first retry): 2s
    /// - retry_count 1: 4s
    /// - retry_count 2: 8s
    pub fn next_delay(&self, retry_count: u32) -> Duration {
        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        // 桁あふれ（inf / 巨大値）は上限に張り付ける
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Sum of every backoff an always-failing item waits through.
    pub fn total_backoff(&self) -> Duration {
        (0..self.max_retries)
            .map(|k| self.next_delay(k))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_RETRIES, Self::DEFAULT_BASE_DELAY)
    }
}
