//! Process-wide throttle in front of the upstream provider.
//!
//! Every dispatch passes one shared gate that enforces a minimum interval
//! since the previous dispatch, so concurrent callers serialize here no matter
//! how many keys are in flight. The gate timestamp is taken immediately
//! before dispatch, so a slow or timed-out call still occupies its slot.
//! A rate-limit rejection is retried exactly once after a longer cooldown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::provider::UpstreamTextProvider;
use crate::error::UpstreamError;
use crate::metrics::{metric_names, MetricsRegistry};

#[derive(Debug, Clone, Copy)]
pub struct ThrottleConfig {
    /// Minimum gap between two dispatches, across all callers.
    pub min_interval: Duration,
    /// Wait after a rate-limit rejection before the single retry.
    pub cooldown: Duration,
    /// Per-attempt limit; an elapsed attempt counts as `UpstreamError::Timeout`.
    pub request_timeout: Option<Duration>,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(4000),
            cooldown: Duration::from_millis(15_000),
            request_timeout: Some(Duration::from_secs(30)),
        }
    }
}

pub struct RateLimitedClient {
    provider: Arc<dyn UpstreamTextProvider>,
    /// Dispatch time of the most recent attempt.
    last_call: Mutex<Option<Instant>>,
    config: ThrottleConfig,
    metrics: Arc<MetricsRegistry>,
}

impl RateLimitedClient {
    pub fn new(
        provider: Arc<dyn UpstreamTextProvider>,
        config: ThrottleConfig,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            provider,
            last_call: Mutex::new(None),
            config,
            metrics,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Wait until `min_interval` has passed since the last dispatch, then
    /// claim the slot.
    async fn wait_for_slot(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let next = prev + self.config.min_interval;
            if next > Instant::now() {
                debug!(wait_ms = (next - Instant::now()).as_millis() as u64, "throttle wait");
                tokio::time::sleep_until(next).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Hold the gate for the full cooldown so nobody else dispatches into a
    /// provider that is rejecting us, then claim the slot for the retry.
    async fn cool_down(&self) {
        let mut last = self.last_call.lock().await;
        tokio::time::sleep(self.config.cooldown).await;
        *last = Some(Instant::now());
    }

    async fn dispatch(&self, prompt: &str) -> Result<String, UpstreamError> {
        self.metrics.incr(metric_names::UPSTREAM_ATTEMPTS);
        let span = self.metrics.span(metric_names::UPSTREAM_CALL);
        let result = match self.config.request_timeout {
            Some(limit) => tokio::time::timeout(limit, self.provider.generate(prompt))
                .await
                .unwrap_or(Err(UpstreamError::Timeout)),
            None => self.provider.generate(prompt).await,
        };
        span.finish();
        if matches!(result, Err(UpstreamError::RateLimited { .. })) {
            self.metrics.incr(metric_names::UPSTREAM_RATE_LIMITED);
        }
        result
    }

    /// Send `prompt` upstream under the global throttle.
    pub async fn generate(&self, prompt: &str) -> Result<String, UpstreamError> {
        self.wait_for_slot().await;
        match self.dispatch(prompt).await {
            Err(e) if e.is_rate_limited() => {
                warn!(
                    cooldown_ms = self.config.cooldown.as_millis() as u64,
                    error = %e,
                    "upstream rate limited, retrying once after cooldown"
                );
                self.cool_down().await;
                let retry = self.dispatch(prompt).await;
                if let Err(ref e) = retry {
                    warn!(error = %e, "upstream retry failed");
                }
                retry
            }
            other => other,
        }
    }
}
