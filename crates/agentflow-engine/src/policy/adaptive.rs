use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use agentflow_core::config::AdaptiveRetryConfig;
use agentflow_core::error::Result;
use agentflow_core::types::Payload;

use super::{ErrorPolicy, Work};

const MAX_DELAY_MS: f64 = 30_000.0;
const RAISE_BELOW: f64 = 0.5;

#[derive(Debug)]
struct AdaptiveState {
    current_retries: u32,
    history: VecDeque<bool>,
}

/// Retry whose budget follows the recent success rate.
///
/// Every attempt records an outcome into a rolling window. Once the window is
/// full, a success rate above the threshold lowers the budget by one and a
/// rate below one half raises it by one, within `[min_retries, max_retries]`.
pub struct AdaptiveRetry {
    config: AdaptiveRetryConfig,
    inner: Mutex<AdaptiveState>,
}

impl AdaptiveRetry {
    pub fn new(config: AdaptiveRetryConfig) -> Self {
        let max = config.max_retries.max(config.min_retries);
        let current_retries = config.initial_retries.clamp(config.min_retries, max);
        let window = config.adjustment_window.max(1);
        Self {
            config,
            inner: Mutex::new(AdaptiveState {
                current_retries,
                history: VecDeque::with_capacity(window),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AdaptiveState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn window(&self) -> usize {
        self.config.adjustment_window.max(1)
    }

    pub fn current_retries(&self) -> u32 {
        self.lock().current_retries
    }

    /// Success rate over the current window, or `None` before any outcome.
    pub fn success_rate(&self) -> Option<f64> {
        let inner = self.lock();
        if inner.history.is_empty() {
            return None;
        }
        let ok = inner.history.iter().filter(|s| **s).count();
        Some(ok as f64 / inner.history.len() as f64)
    }

    /// Push one outcome and retune the retry budget.
    pub fn record_outcome(&self, success: bool) {
        let window = self.window();
        let mut inner = self.lock();
        if inner.history.len() == window {
            inner.history.pop_front();
        }
        inner.history.push_back(success);
        if inner.history.len() < window {
            return;
        }

        let ok = inner.history.iter().filter(|s| **s).count();
        let rate = ok as f64 / window as f64;
        let before = inner.current_retries;
        if rate > self.config.success_rate_threshold {
            inner.current_retries = before.saturating_sub(1).max(self.config.min_retries);
        } else if rate < RAISE_BELOW {
            inner.current_retries = (before + 1).min(self.config.max_retries);
        }
        if inner.current_retries != before {
            debug!(
                success_rate = rate,
                from = before,
                to = inner.current_retries,
                "Adjusted retry budget"
            );
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay_ms as f64 * 2f64.powi(attempt.min(62) as i32);
        let ms = (base * (0.5 + rand::random::<f64>())).min(MAX_DELAY_MS);
        Duration::from_millis(ms as u64)
    }
}

impl ErrorPolicy for AdaptiveRetry {
    fn name(&self) -> &'static str {
        "adaptive_retry"
    }

    fn execute<'a>(&'a self, work: Work<'a>) -> BoxFuture<'a, Result<Payload>> {
        Box::pin(async move {
            let mut attempt = 0u32;
            loop {
                match work().await {
                    Ok(value) => {
                        self.record_outcome(true);
                        return Ok(value);
                    }
                    Err(e) => {
                        self.record_outcome(false);
                        let budget = self.current_retries();
                        if attempt >= budget {
                            return Err(e);
                        }
                        let backoff = self.delay_for(attempt);
                        warn!(
                            attempt = attempt + 1,
                            budget,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "Adaptive retry"
                        );
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::work;
    use agentflow_core::error::FlowError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config() -> AdaptiveRetryConfig {
        AdaptiveRetryConfig {
            min_retries: 1,
            max_retries: 5,
            initial_retries: 3,
            adjustment_window: 10,
            success_rate_threshold: 0.8,
            base_delay_ms: 1,
        }
    }

    #[test]
    fn test_high_success_rate_lowers_budget() {
        let policy = AdaptiveRetry::new(config());
        for _ in 0..9 {
            policy.record_outcome(true);
        }
        assert_eq!(policy.current_retries(), 3);
        policy.record_outcome(false);
        // 9/10 = 0.9 > 0.8
        assert_eq!(policy.current_retries(), 2);
    }

    #[test]
    fn test_low_success_rate_raises_budget() {
        let policy = AdaptiveRetry::new(config());
        for _ in 0..4 {
            policy.record_outcome(true);
        }
        for _ in 0..6 {
            policy.record_outcome(false);
        }
        assert_eq!(policy.current_retries(), 4);
        assert_eq!(policy.success_rate(), Some(0.4));
    }

    #[test]
    fn test_budget_respects_bounds() {
        let policy = AdaptiveRetry::new(config());
        for _ in 0..50 {
            policy.record_outcome(true);
        }
        assert_eq!(policy.current_retries(), 1);
        for _ in 0..50 {
            policy.record_outcome(false);
        }
        assert_eq!(policy.current_retries(), 5);
    }

    #[test]
    fn test_initial_budget_clamped() {
        let policy = AdaptiveRetry::new(AdaptiveRetryConfig {
            initial_retries: 20,
            ..config()
        });
        assert_eq!(policy.current_retries(), 5);
        assert_eq!(policy.success_rate(), None);
    }

    #[tokio::test]
    async fn test_execute_retries_within_budget() {
        let policy = AdaptiveRetry::new(config());
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let out = policy
            .execute(work(move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(FlowError::agent("flaky", "not yet"))
                } else {
                    Ok(Payload::text("done"))
                }
            }))
            .await
            .unwrap();

        assert_eq!(out.as_str(), Some("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(policy.success_rate(), Some(1.0 / 3.0));
    }

    #[tokio::test]
    async fn test_execute_raises_last_error() {
        let policy = AdaptiveRetry::new(AdaptiveRetryConfig {
            initial_retries: 1,
            ..config()
        });
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let err = policy
            .execute(work(move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Err(FlowError::agent("broken", format!("attempt {}", n)))
            }))
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(err.to_string().contains("attempt 1"));
    }
}
