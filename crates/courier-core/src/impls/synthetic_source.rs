//! SyntheticSource - デモ用の payload 生成器
//!
//! 宛先・件名・本文を持つ「通知メール」風の payload を作ります。

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::ports::{ItemSource, NewItem};

/// Generates notification-style payloads, optionally up to a fixed count.
pub struct SyntheticSource {
    limit: Option<u64>,
    rng: StdRng,
}

impl SyntheticSource {
    pub fn unbounded() -> Self {
        Self {
            limit: None,
            rng: StdRng::from_entropy(),
        }
    }

    /// Stop after `limit` items.
    pub fn limited(limit: u64) -> Self {
        Self {
            limit: Some(limit),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }
}

impl ItemSource for SyntheticSource {
    fn next_item(&mut self, sequence: u64) -> Option<NewItem> {
        if self.limit.is_some_and(|limit| sequence >= limit) {
            return None;
        }
        let recipient = self.rng.gen_range(1..=500u32);
        let priority = self.rng.gen_range(0..=2);
        let payload = serde_json::json!({
            "to": format!("user{recipient}@example.com"),
            "subject": format!("Notification #{sequence}"),
            "body": format!("This is generated message {sequence}."),
        });
        Some(NewItem::new(payload).with_priority(priority))
    }
}
