use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use agentflow_core::error::Result;
use agentflow_core::traits::Agent;
use agentflow_core::types::{Payload, TypeTag};

type ProcessFn = Arc<dyn Fn(Payload) -> BoxFuture<'static, Result<Payload>> + Send + Sync>;
type CleanupFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// An agent backed by a plain async function.
///
/// ```ignore
/// let upper = FnAgent::new("upper", "string", "string", |p: Payload| async move {
///     let text = p.as_str().unwrap_or_default().to_uppercase();
///     Ok(Payload::text(text))
/// });
/// ```
#[derive(Clone)]
pub struct FnAgent {
    id: String,
    input: TypeTag,
    output: TypeTag,
    capabilities: Vec<String>,
    process: ProcessFn,
    cleanup: Option<CleanupFn>,
}

impl FnAgent {
    pub fn new<F, Fut>(
        id: impl Into<String>,
        input: impl Into<TypeTag>,
        output: impl Into<TypeTag>,
        f: F,
    ) -> Self
    where
        F: Fn(Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Payload>> + Send + 'static,
    {
        Self {
            id: id.into(),
            input: input.into(),
            output: output.into(),
            capabilities: vec![],
            process: Arc::new(move |payload| -> BoxFuture<'static, Result<Payload>> {
                Box::pin(f(payload))
            }),
            cleanup: None,
        }
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// Run `f` once when the workflow tears down.
    pub fn with_cleanup<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cleanup = Some(Arc::new(move || -> BoxFuture<'static, ()> { Box::pin(f()) }));
        self
    }
}

impl std::fmt::Debug for FnAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnAgent")
            .field("id", &self.id)
            .field("input", &self.input)
            .field("output", &self.output)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl Agent for FnAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_type(&self) -> TypeTag {
        self.input.clone()
    }

    fn output_type(&self) -> TypeTag {
        self.output.clone()
    }

    fn capabilities(&self) -> Vec<String> {
        self.capabilities.clone()
    }

    fn process(&self, input: Payload) -> BoxFuture<'_, Result<Payload>> {
        (self.process)(input)
    }

    fn cleanup(&self) -> BoxFuture<'_, ()> {
        match &self.cleanup {
            Some(f) => f(),
            None => Box::pin(async {}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_fn_agent_processes() {
        let agent = FnAgent::new("upper", "string", "string", |p: Payload| async move {
            let text = p.as_str().unwrap_or_default().to_uppercase();
            Ok(Payload::text(text))
        })
        .with_capabilities(["text", "transform"]);

        assert_eq!(agent.id(), "upper");
        assert_eq!(agent.input_type().as_str(), "string");
        assert_eq!(agent.capabilities(), vec!["text", "transform"]);

        let out = agent.process(Payload::text("hi")).await.unwrap();
        assert_eq!(out.as_str(), Some("HI"));
    }

    #[tokio::test]
    async fn test_cleanup_hook_runs() {
        let cleaned = Arc::new(AtomicBool::new(false));
        let flag = cleaned.clone();
        let agent = FnAgent::new("a", "any", "any", |p: Payload| async move { Ok(p) })
            .with_cleanup(move || {
                let flag = flag.clone();
                async move { flag.store(true, Ordering::SeqCst) }
            });

        agent.cleanup().await;
        assert!(cleaned.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_default_cleanup_is_noop() {
        let agent = FnAgent::new("a", "any", "any", |p: Payload| async move { Ok(p) });
        agent.cleanup().await;
        assert!(format!("{:?}", agent).contains("FnAgent"));
    }
}
