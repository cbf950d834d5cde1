use std::time::Duration;

use tracing::warn;

use crate::{bus::MessageBus, error::PublishError, metrics::BridgeMetrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Wait before attempt `attempt + 1`, doubling from `base_delay`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Publishes `payload`, retrying transient failures with exponential backoff.
/// Returns the number of attempts it took.
pub async fn publish_with_retry(
    bus: &dyn MessageBus,
    topic: &str,
    payload: &[u8],
    policy: &RetryPolicy,
    metrics: &BridgeMetrics,
) -> Result<u32, PublishError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let err = match bus.publish(topic, payload.to_vec()).await {
            Ok(()) => return Ok(attempt),
            Err(PublishError::Closed) => return Err(PublishError::Closed),
            Err(e) => e,
        };

        if attempt >= policy.max_attempts {
            return Err(PublishError::RetriesExhausted {
                topic: topic.to_string(),
                attempts: attempt,
                last_error: err.to_string(),
            });
        }

        let delay = policy.delay_after(attempt);
        BridgeMetrics::incr(&metrics.publish_retries);
        warn!(topic, attempt, ?delay, "publish failed, retrying: {}", err);
        tokio::time::sleep(delay).await;
    }
}
