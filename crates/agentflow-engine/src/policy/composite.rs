use std::sync::Arc;

use futures::future::BoxFuture;

use agentflow_core::error::Result;
use agentflow_core::types::Payload;

use super::{ErrorPolicy, Work};

/// Nest several policies around one invocation.
///
/// `strategies[0]` is the outermost wrapper, so `[retry, timeout]` retries
/// each attempt that times out.
pub struct CompositeStrategy {
    strategies: Vec<Arc<dyn ErrorPolicy>>,
}

impl CompositeStrategy {
    pub fn new(strategies: Vec<Arc<dyn ErrorPolicy>>) -> Self {
        Self { strategies }
    }

    pub fn strategies(&self) -> &[Arc<dyn ErrorPolicy>] {
        &self.strategies
    }
}

impl ErrorPolicy for CompositeStrategy {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn execute<'a>(&'a self, work: Work<'a>) -> BoxFuture<'a, Result<Payload>> {
        let mut wrapped = work;
        for strategy in self.strategies.iter().rev() {
            let inner = wrapped;
            let strategy: &'a dyn ErrorPolicy = strategy.as_ref();
            wrapped = Arc::new(move || strategy.execute(inner.clone()));
        }
        wrapped()
    }

    fn should_fail_workflow(&self) -> bool {
        self.strategies.iter().any(|s| s.should_fail_workflow())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{work, FailFast, RetryWithBackoff, SkipOnError, TimeoutStrategy};
    use agentflow_core::config::RetryConfig;
    use agentflow_core::error::{ErrorKind, FlowError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn retry(max_retries: u32) -> Arc<dyn ErrorPolicy> {
        Arc::new(RetryWithBackoff::new(RetryConfig {
            max_retries,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            jitter: false,
            ..RetryConfig::default()
        }))
    }

    #[tokio::test]
    async fn test_retry_around_timeout() {
        let policy = CompositeStrategy::new(vec![
            retry(2),
            Arc::new(TimeoutStrategy::new(Duration::from_millis(20), None)),
        ]);
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let out = policy
            .execute(work(move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                Ok(Payload::text("second try"))
            }))
            .await
            .unwrap();

        assert_eq!(out.as_str(), Some("second try"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(policy.should_fail_workflow());
    }

    #[tokio::test]
    async fn test_inner_error_propagates_through_layers() {
        let policy = CompositeStrategy::new(vec![retry(1), Arc::new(FailFast)]);
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let err = policy
            .execute(work(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(FlowError::agent("broken", "still broken"))
            }))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Agent);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(policy.should_fail_workflow());
    }

    #[tokio::test]
    async fn test_skip_outermost_absorbs_exhausted_retry() {
        let policy = CompositeStrategy::new(vec![
            Arc::new(SkipOnError::with_default(Payload::text("default"))),
            retry(1),
        ]);
        let out = policy
            .execute(work(|| async { Err(FlowError::agent("a", "nope")) }))
            .await
            .unwrap();
        assert_eq!(out.as_str(), Some("default"));
        assert!(!policy.should_fail_workflow());
    }

    #[tokio::test]
    async fn test_empty_composite_runs_work() {
        let policy = CompositeStrategy::new(vec![]);
        let out = policy
            .execute(work(|| async { Ok(Payload::text("plain")) }))
            .await
            .unwrap();
        assert_eq!(out.as_str(), Some("plain"));
        assert_eq!(policy.strategies().len(), 0);
    }
}
