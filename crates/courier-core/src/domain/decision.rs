//! Decision model: what a worker does after a send attempt.
//!
//! The decision is a pure function of `(retry_count, outcome)`. Executing it
//! (sleeping, re-enqueueing, counting) is the worker's job.

use std::time::Duration;

use super::SendOutcome;
use crate::queue::RetryPolicy;

/// The next action to take for an item after one attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Delivered; count it as processed.
    Complete,

    /// Wait `delay`, then re-enqueue with `next_retry_count`.
    Retry {
        delay: Duration,
        next_retry_count: u32,
        reason: String,
    },

    /// Retry budget exhausted; count it as permanently failed and drop it.
    GiveUp { reason: String },
}

/// Decides the next action from the retry counter and the latest outcome.
///
/// Implementations must be pure: no side effects, no state mutation.
pub trait Decider: Send + Sync {
    fn decide(&self, retry_count: u32, outcome: &SendOutcome) -> Decision;
}

/// Budget-based retry with exponential backoff, driven by [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct DefaultDecider {
    retry_policy: RetryPolicy,
}

impl DefaultDecider {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self { retry_policy }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }
}

impl Decider for DefaultDecider {
    fn decide(&self, retry_count: u32, outcome: &SendOutcome) -> Decision {
        self.retry_policy.decide(retry_count, outcome)
    }
}

impl RetryPolicy {
    /// Pure retry decision for an item retried `retry_count` times so far.
    pub fn decide(&self, retry_count: u32, outcome: &SendOutcome) -> Decision {
        let SendOutcome::TransientFailure { reason } = outcome else {
            return Decision::Complete;
        };

        if self.allows_retry(retry_count) {
            Decision::Retry {
                delay: self.next_delay(retry_count),
                next_retry_count: retry_count + 1,
                reason: reason.clone(),
            }
        } else {
            Decision::GiveUp {
                reason: format!(
                    "retries exhausted ({}/{}): {reason}",
                    retry_count, self.max_retries
                ),
            }
        }
    }
}
