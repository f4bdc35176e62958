//! Error policies: pluggable failure handling around one agent invocation.
//!
//! Every policy wraps a `Work` closure that produces a fresh future per call,
//! so retrying policies can invoke it repeatedly and composites can nest.
//!
//! | Policy             | On error                                   | Fails workflow |
//! |--------------------|--------------------------------------------|----------------|
//! | `FailFast`         | propagate                                  | always         |
//! | `RetryWithBackoff` | retry allow-listed kinds with backoff      | no             |
//! | `SkipOnError`      | return the configured default              | no             |
//! | `CircuitBreaker`   | count, open after threshold, reject fast   | while open     |
//! | `AdaptiveRetry`    | retry with a budget tuned by success rate  | no             |
//! | `TimeoutStrategy`  | fallback value or timeout error            | without fallback |
//! | `CompositeStrategy`| nested, outermost first                    | if any inner does |
//!
//! Stateful policies (circuit breaker, adaptive retry) guard their counters
//! with a mutex, so one instance may be shared across concurrent runs.

pub mod adaptive;
pub mod circuit_breaker;
pub mod composite;
pub mod fail_fast;
pub mod retry;
pub mod skip;
pub mod timeout;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use agentflow_core::config::PolicyConfig;
use agentflow_core::error::Result;
use agentflow_core::types::Payload;

pub use adaptive::AdaptiveRetry;
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use composite::CompositeStrategy;
pub use fail_fast::FailFast;
pub use retry::RetryWithBackoff;
pub use skip::SkipOnError;
pub use timeout::TimeoutStrategy;

/// A re-invocable unit of asynchronous work.
pub type Work<'a> = Arc<dyn Fn() -> BoxFuture<'a, Result<Payload>> + Send + Sync + 'a>;

/// Wrap a closure returning a future as `Work`.
pub fn work<'a, F, Fut>(f: F) -> Work<'a>
where
    F: Fn() -> Fut + Send + Sync + 'a,
    Fut: Future<Output = Result<Payload>> + Send + 'a,
{
    Arc::new(move || -> BoxFuture<'a, Result<Payload>> { Box::pin(f()) })
}

/// Failure handling strategy around a unit of work.
pub trait ErrorPolicy: Send + Sync + 'static {
    /// Strategy name, for logs and metrics.
    fn name(&self) -> &'static str;

    /// Run `work` under this policy.
    fn execute<'a>(&'a self, work: Work<'a>) -> BoxFuture<'a, Result<Payload>>;

    /// Whether an error surfacing from this policy should abort the workflow.
    fn should_fail_workflow(&self) -> bool {
        false
    }
}

/// Build a fresh policy instance from configuration.
pub fn build_policy(config: &PolicyConfig) -> Arc<dyn ErrorPolicy> {
    match config {
        PolicyConfig::FailFast => Arc::new(FailFast),
        PolicyConfig::Retry(cfg) => Arc::new(RetryWithBackoff::new(cfg.clone())),
        PolicyConfig::Skip(cfg) => Arc::new(SkipOnError::new(config_payload(
            cfg.default.as_ref(),
            cfg.default_type.as_deref(),
        ))),
        PolicyConfig::CircuitBreaker(cfg) => Arc::new(CircuitBreaker::new(cfg.clone())),
        PolicyConfig::AdaptiveRetry(cfg) => Arc::new(AdaptiveRetry::new(cfg.clone())),
        PolicyConfig::Timeout(cfg) => Arc::new(TimeoutStrategy::new(
            Duration::from_millis(cfg.timeout_ms),
            config_payload(cfg.fallback.as_ref(), cfg.fallback_type.as_deref()),
        )),
        PolicyConfig::Composite { strategies } => Arc::new(CompositeStrategy::new(
            strategies.iter().map(build_policy).collect(),
        )),
    }
}

/// Turn a configured JSON value into a payload, tagging it explicitly when a
/// type is given and by shape otherwise.
fn config_payload(value: Option<&serde_json::Value>, tag: Option<&str>) -> Option<Payload> {
    let value = value?.clone();
    Some(match tag {
        Some(tag) => Payload::new(tag, value),
        None => Payload::infer(value),
    })
}
