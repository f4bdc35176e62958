use futures::future::BoxFuture;
use tracing::warn;

use agentflow_core::error::{FlowError, Result};
use agentflow_core::types::Payload;

use super::{ErrorPolicy, Work};

/// Run once; on error log it and return the configured default instead.
///
/// Without a default the error surfaces as `FlowError::Skipped`, which the
/// workflow treats as "no result" and routes on with the previous data.
#[derive(Debug, Clone, Default)]
pub struct SkipOnError {
    default: Option<Payload>,
}

impl SkipOnError {
    pub fn new(default: Option<Payload>) -> Self {
        Self { default }
    }

    pub fn with_default(default: Payload) -> Self {
        Self::new(Some(default))
    }
}

impl ErrorPolicy for SkipOnError {
    fn name(&self) -> &'static str {
        "skip"
    }

    fn execute<'a>(&'a self, work: Work<'a>) -> BoxFuture<'a, Result<Payload>> {
        Box::pin(async move {
            match work().await {
                Ok(value) => Ok(value),
                Err(e) => {
                    warn!(error = %e, has_default = self.default.is_some(), "Skipping failed invocation");
                    match &self.default {
                        Some(value) => Ok(value.clone()),
                        None => Err(FlowError::Skipped(e.to_string())),
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
    use agentflow_core::error::ErrorKind;

    #[tokio::test]
    async fn test_returns_default_on_error() {
        let policy = SkipOnError::with_default(Payload::text("fallback"));
        let out = policy
            .execute(work(|| async { Err(FlowError::agent("a", "boom")) }))
            .await
            .unwrap();
        assert_eq!(out.as_str(), Some("fallback"));
        assert!(!policy.should_fail_workflow());
    }

    #[tokio::test]
    async fn test_without_default_marks_skipped() {
        let policy = SkipOnError::default();
        let err = policy
            .execute(work(|| async { Err(FlowError::agent("a", "boom")) }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Skipped);
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_success_untouched() {
        let policy = SkipOnError::with_default(Payload::text("fallback"));
        let out = policy
            .execute(work(|| async { Ok(Payload::text("real")) }))
            .await
            .unwrap();
        assert_eq!(out.as_str(), Some("real"));
    }
}
