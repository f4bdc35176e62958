use std::time::Duration;

use futures::future::BoxFuture;
use tracing::warn;

use agentflow_core::error::{FlowError, Result};
use agentflow_core::types::Payload;

use super::{ErrorPolicy, Work};

/// Bound one invocation by a deadline.
///
/// On expiry the fallback is returned if configured, otherwise
/// `FlowError::Timeout`. Errors raised by the work itself pass through.
#[derive(Debug, Clone)]
pub struct TimeoutStrategy {
    timeout: Duration,
    fallback: Option<Payload>,
}

impl TimeoutStrategy {
    pub fn new(timeout: Duration, fallback: Option<Payload>) -> Self {
        Self { timeout, fallback }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl ErrorPolicy for TimeoutStrategy {
    fn name(&self) -> &'static str {
        "timeout"
    }

    fn execute<'a>(&'a self, work: Work<'a>) -> BoxFuture<'a, Result<Payload>> {
        Box::pin(async move {
            match tokio::time::timeout(self.timeout, work()).await {
                Ok(result) => result,
                Err(_) => {
                    let timeout_ms = self.timeout.as_millis() as u64;
                    warn!(timeout_ms, has_fallback = self.fallback.is_some(), "Agent invocation timed out");
                    match &self.fallback {
                        Some(value) => Ok(value.clone()),
                        None => Err(FlowError::Timeout { timeout_ms }),
                    }
                }
            }
        })
    }

    fn should_fail_workflow(&self) -> bool {
        self.fallback.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::work;
    use agentflow_core::error::ErrorKind;

    fn slow<'a>() -> Work<'a> {
        work(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Payload::text("too late"))
        })
    }

    #[tokio::test]
    async fn test_expiry_without_fallback_errors() {
        let policy = TimeoutStrategy::new(Duration::from_millis(20), None);
        let err = policy.execute(slow()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.to_string().contains("20"));
        assert!(policy.should_fail_workflow());
    }

    #[tokio::test]
    async fn test_expiry_with_fallback() {
        let policy = TimeoutStrategy::new(Duration::from_millis(20), Some(Payload::text("cached")));
        let out = policy.execute(slow()).await.unwrap();
        assert_eq!(out.as_str(), Some("cached"));
        assert!(!policy.should_fail_workflow());
    }

    #[tokio::test]
    async fn test_fast_work_and_inner_errors_pass_through() {
        let policy = TimeoutStrategy::new(Duration::from_secs(1), Some(Payload::text("cached")));
        let out = policy
            .execute(work(|| async { Ok(Payload::text("fresh")) }))
            .await
            .unwrap();
        assert_eq!(out.as_str(), Some("fresh"));

        let err = policy
            .execute(work(|| async { Err(FlowError::agent("a", "bad input")) }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Agent);
    }
}
