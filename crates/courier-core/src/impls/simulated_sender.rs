//! SimulatedSender - 開発用の送信先
//!
//! ランダムな遅延と失敗率で外部呼び出しを模倣します。

use std::ops::RangeInclusive;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::{SendOutcome, WorkItem};
use crate::error::CourierError;
use crate::ports::Sender;

/// Fails a configurable share of sends with a transient error after a random
/// latency.
pub struct SimulatedSender {
    failure_rate: f64,
    latency_ms: RangeInclusive<u64>,
    rng: Mutex<StdRng>,
}

impl SimulatedSender {
    /// `failure_rate` is clamped into `0.0..=1.0`.
    pub fn new(failure_rate: f64) -> Self {
        Self {
            failure_rate: failure_rate.clamp(0.0, 1.0),
            latency_ms: 0..=0,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_latency(mut self, min: Duration, max: Duration) -> Self {
        let min_ms = u64::try_from(min.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX).max(min_ms);
        self.latency_ms = min_ms..=max_ms;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Draw latency and verdict up front so the lock is never held across `.await`.
    fn roll(&self) -> (Duration, bool) {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let latency = Duration::from_millis(rng.gen_range(self.latency_ms.clone()));
        let fails = rng.gen_bool(self.failure_rate);
        (latency, fails)
    }
}

#[async_trait]
impl Sender for SimulatedSender {
    async fn send(&self, item: &WorkItem) -> Result<SendOutcome, CourierError> {
        let (latency, fails) = self.roll();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if fails {
            return Ok(SendOutcome::transient(format!(
                "simulated transient failure for {}",
                item.id()
            )));
        }
        Ok(SendOutcome::delivered())
    }
}
