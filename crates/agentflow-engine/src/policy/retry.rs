use std::time::Duration;

use futures::future::BoxFuture;
use tracing::warn;

use agentflow_core::config::{BackoffKind, RetryConfig};
use agentflow_core::error::{FlowError, Result};
use agentflow_core::types::Payload;

use super::{ErrorPolicy, Work};

/// Retry allow-listed errors with exponential, linear or fixed backoff.
///
/// The work runs at most `max_retries + 1` times; the last error is returned
/// once retries are exhausted.
#[derive(Debug, Clone)]
pub struct RetryWithBackoff {
    config: RetryConfig,
}

impl RetryWithBackoff {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    fn is_retryable(&self, e: &FlowError) -> bool {
        self.config.retry_on.is_empty() || self.config.retry_on.contains(&e.kind())
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.config.initial_delay_ms as f64;
        let ms = match self.config.backoff {
            BackoffKind::Exponential => base * 2f64.powi(attempt.min(62) as i32),
            BackoffKind::Linear => base * (attempt as f64 + 1.0),
            BackoffKind::Fixed => base,
        };
        let ms = ms.min(self.config.max_delay_ms as f64);
        // Jitter: 0.5x to 1.5x
        let ms = if self.config.jitter {
            ms * (0.5 + rand::random::<f64>())
        } else {
            ms
        };
        Duration::from_millis(ms as u64)
    }
}

impl ErrorPolicy for RetryWithBackoff {
    fn name(&self) -> &'static str {
        "retry"
    }

    fn execute<'a>(&'a self, work: Work<'a>) -> BoxFuture<'a, Result<Payload>> {
        Box::pin(async move {
            let max_retries = self.config.max_retries;
            let mut attempt = 0u32;
            loop {
                match work().await {
                    Ok(value) => return Ok(value),
                    Err(e) => {
                        if attempt >= max_retries || !self.is_retryable(&e) {
                            return Err(e);
                        }
                        let backoff = self.delay_for(attempt);
                        warn!(
                            attempt = attempt + 1,
                            max_retries,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "Retrying agent invocation"
                        );
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                    }
                }
            }
        })
    }
}
