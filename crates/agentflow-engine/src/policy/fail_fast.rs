use futures::future::BoxFuture;
use tracing::debug;

use agentflow_core::error::Result;
use agentflow_core::types::Payload;

use super::{ErrorPolicy, Work};

/// Run once and propagate any error; errors always abort the workflow.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailFast;

impl ErrorPolicy for FailFast {
    fn name(&self) -> &'static str {
        "fail_fast"
    }

    fn execute<'a>(&'a self, work: Work<'a>) -> BoxFuture<'a, Result<Payload>> {
        Box::pin(async move {
            let result = work().await;
            if let Err(ref e) = result {
                debug!(error = %e, "Fail-fast policy propagating error");
            }
            result
        })
    }

    fn should_fail_workflow(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::work;
    use agentflow_core::error::FlowError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_runs_once_and_propagates() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let err = FailFast
            .execute(work(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(FlowError::agent("always_fails", "kaput"))
            }))
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(err.to_string().contains("kaput"));
        assert!(FailFast.should_fail_workflow());
    }

    #[tokio::test]
    async fn test_passes_success_through() {
        let out = FailFast
            .execute(work(|| async { Ok(Payload::text("ok")) }))
            .await
            .unwrap();
        assert_eq!(out.as_str(), Some("ok"));
    }
}
