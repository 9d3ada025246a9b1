//! Pipeline configuration.
//!
//! Two layers:
//! - [`RawPipelineConfig`]: serde-friendly shape (durations in milliseconds,
//!   every field defaulted). This is what a config file deserializes into.
//! - [`PipelineConfig`]: validated and immutable. The only way to get one is
//!   through `TryFrom<RawPipelineConfig>` (or the builder, which uses it), so a
//!   bad value is rejected up front instead of surfacing mid-pipeline.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::queue::{OverflowPolicy, RetryPolicy};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("capacity must be greater than 0")]
    ZeroCapacity,

    #[error("worker_count must be greater than 0")]
    ZeroWorkers,

    #[error("backoff_base must be greater than 0")]
    ZeroBackoffBase,

    #[error("backoff_multiplier must be a finite number >= 1.0 (got {0})")]
    InvalidMultiplier(f64),

    #[error("backoff_max ({max:?}) must not be shorter than backoff_base ({base:?})")]
    BackoffMaxBelowBase { max: Duration, base: Duration },

    #[error("metrics_interval must be greater than 0")]
    ZeroMetricsInterval,

    #[error("send_timeout must be greater than 0 when set")]
    ZeroSendTimeout,

    #[error("producer.min_batch must be at least 1")]
    ZeroBatch,

    #[error("producer.max_batch ({max}) must be >= producer.min_batch ({min})")]
    BatchRange { min: usize, max: usize },

    #[error("producer.max_delay ({max:?}) must be >= producer.min_delay ({min:?})")]
    DelayRange { min: Duration, max: Duration },

    #[error("{field} must be a whole number of milliseconds (got {value:?})")]
    SubMillisecond { field: &'static str, value: Duration },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ========================================
// Raw (serde) layer
// ========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawPipelineConfig {
    pub capacity: usize,
    pub worker_count: usize,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_multiplier: f64,
    pub backoff_max_ms: Option<u64>,
    pub metrics_interval_ms: u64,
    pub overflow_policy: OverflowPolicy,
    pub send_timeout_ms: Option<u64>,
    pub producer: RawProducerConfig,
}

impl RawPipelineConfig {
    /// Parse without validating; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }
}

impl Default for RawPipelineConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            worker_count: 4,
            max_retries: RetryPolicy::DEFAULT_MAX_RETRIES,
            backoff_base_ms: 2_000,
            backoff_multiplier: RetryPolicy::DEFAULT_MULTIPLIER,
            backoff_max_ms: None,
            metrics_interval_ms: 5_000,
            overflow_policy: OverflowPolicy::Block,
            send_timeout_ms: None,
            producer: RawProducerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawProducerConfig {
    pub min_batch: usize,
    pub max_batch: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub seed: Option<u64>,
}

impl Default for RawProducerConfig {
    fn default() -> Self {
        Self {
            min_batch: 1,
            max_batch: 10,
            min_delay_ms: 100,
            max_delay_ms: 1_000,
            seed: None,
        }
    }
}

// ========================================
// Validated layer
// ========================================

/// Validated producer rate knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerConfig {
    min_batch: usize,
    max_batch: usize,
    min_delay: Duration,
    max_delay: Duration,
    seed: Option<u64>,
}

impl ProducerConfig {
    pub fn min_batch(&self) -> usize {
        self.min_batch
    }

    pub fn max_batch(&self) -> usize {
        self.max_batch
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// RNG seed for reproducible batch sizes and delays.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }
}

impl TryFrom<RawProducerConfig> for ProducerConfig {
    type Error = ConfigError;

    fn try_from(raw: RawProducerConfig) -> Result<Self, Self::Error> {
        if raw.min_batch == 0 {
            return Err(ConfigError::ZeroBatch);
        }
        if raw.max_batch < raw.min_batch {
            return Err(ConfigError::BatchRange {
                min: raw.min_batch,
                max: raw.max_batch,
            });
        }
        let min_delay = Duration::from_millis(raw.min_delay_ms);
        let max_delay = Duration::from_millis(raw.max_delay_ms);
        if max_delay < min_delay {
            return Err(ConfigError::DelayRange {
                min: min_delay,
                max: max_delay,
            });
        }
        Ok(Self {
            min_batch: raw.min_batch,
            max_batch: raw.max_batch,
            min_delay,
            max_delay,
            seed: raw.seed,
        })
    }
}

/// Immutable pipeline configuration, validated at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    capacity: usize,
    worker_count: usize,
    retry_policy: RetryPolicy,
    metrics_interval: Duration,
    overflow_policy: OverflowPolicy,
    send_timeout: Option<Duration>,
    producer: ProducerConfig,
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Self::try_from(RawPipelineConfig::from_json_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::try_from(RawPipelineConfig::from_json_file(path)?)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn max_retries(&self) -> u32 {
        self.retry_policy.max_retries
    }

    pub fn backoff_base(&self) -> Duration {
        self.retry_policy.base_delay
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow_policy
    }

    /// Per-attempt bound on the send collaborator.
    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout
    }

    pub fn producer(&self) -> &ProducerConfig {
        &self.producer
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let raw = RawPipelineConfig::default();
        Self {
            capacity: raw.capacity,
            worker_count: raw.worker_count,
            retry_policy: RetryPolicy::default(),
            metrics_interval: Duration::from_millis(raw.metrics_interval_ms),
            overflow_policy: raw.overflow_policy,
            send_timeout: None,
            producer: ProducerConfig {
                min_batch: raw.producer.min_batch,
                max_batch: raw.producer.max_batch,
                min_delay: Duration::from_millis(raw.producer.min_delay_ms),
                max_delay: Duration::from_millis(raw.producer.max_delay_ms),
                seed: None,
            },
        }
    }
}

impl TryFrom<RawPipelineConfig> for PipelineConfig {
    type Error = ConfigError;

    fn try_from(raw: RawPipelineConfig) -> Result<Self, Self::Error> {
        if raw.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if raw.worker_count == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if raw.backoff_base_ms == 0 {
            return Err(ConfigError::ZeroBackoffBase);
        }
        if !raw.backoff_multiplier.is_finite() || raw.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidMultiplier(raw.backoff_multiplier));
        }
        let base = Duration::from_millis(raw.backoff_base_ms);
        let mut retry_policy =
            RetryPolicy::new(raw.max_retries, base).with_multiplier(raw.backoff_multiplier);
        if let Some(max_ms) = raw.backoff_max_ms {
            let max = Duration::from_millis(max_ms);
            if max < base {
                return Err(ConfigError::BackoffMaxBelowBase { max, base });
            }
            retry_policy = retry_policy.with_max_delay(max);
        }
        if raw.metrics_interval_ms == 0 {
            return Err(ConfigError::ZeroMetricsInterval);
        }
        if raw.send_timeout_ms == Some(0) {
            return Err(ConfigError::ZeroSendTimeout);
        }

        Ok(Self {
            capacity: raw.capacity,
            worker_count: raw.worker_count,
            retry_policy,
            metrics_interval: Duration::from_millis(raw.metrics_interval_ms),
            overflow_policy: raw.overflow_policy,
            send_timeout: raw.send_timeout_ms.map(Duration::from_millis),
            producer: ProducerConfig::try_from(raw.producer)?,
        })
    }
}

/// Fluent construction on top of [`RawPipelineConfig`]; `build()` validates.
///
/// Durations are stored in milliseconds. A `Duration` with a sub-millisecond
/// remainder is rejected by `build()` rather than silently truncated.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    raw: RawPipelineConfig,
    // 最初に見つかった ms 未満の端数を持つ値
    sub_millisecond: Option<(&'static str, Duration)>,
}

impl PipelineConfigBuilder {
    pub fn from_raw(raw: RawPipelineConfig) -> Self {
        Self {
            raw,
            sub_millisecond: None,
        }
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.raw.capacity = capacity;
        self
    }

    pub fn worker_count(mut self, worker_count: usize) -> Self {
        self.raw.worker_count = worker_count;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.raw.max_retries = max_retries;
        self
    }

    pub fn backoff_base(mut self, base: Duration) -> Self {
        self.raw.backoff_base_ms = self.millis("backoff_base", base);
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.raw.backoff_multiplier = multiplier;
        self
    }

    pub fn backoff_max(mut self, max: Duration) -> Self {
        self.raw.backoff_max_ms = Some(self.millis("backoff_max", max));
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.raw.metrics_interval_ms = self.millis("metrics_interval", interval);
        self
    }

    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.raw.overflow_policy = policy;
        self
    }

    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.raw.send_timeout_ms = Some(self.millis("send_timeout", timeout));
        self
    }

    pub fn batch_size(mut self, min: usize, max: usize) -> Self {
        self.raw.producer.min_batch = min;
        self.raw.producer.max_batch = max;
        self
    }

    pub fn batch_delay(mut self, min: Duration, max: Duration) -> Self {
        self.raw.producer.min_delay_ms = self.millis("producer.min_delay", min);
        self.raw.producer.max_delay_ms = self.millis("producer.max_delay", max);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.raw.producer.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<PipelineConfig, ConfigError> {
        if let Some((field, value)) = self.sub_millisecond {
            return Err(ConfigError::SubMillisecond { field, value });
        }
        PipelineConfig::try_from(self.raw)
    }

    fn millis(&mut self, field: &'static str, d: Duration) -> u64 {
        if d.subsec_nanos() % 1_000_000 != 0 && self.sub_millisecond.is_none() {
            self.sub_millisecond = Some((field, d));
        }
        u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
    }
}
