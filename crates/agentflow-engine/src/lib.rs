pub mod agent;
pub mod policy;
pub mod router;
pub mod routes;
pub mod workflow;

pub use agent::FnAgent;
pub use policy::{
    build_policy, work, AdaptiveRetry, CircuitBreaker, CircuitState, CompositeStrategy,
    ErrorPolicy, FailFast, RetryWithBackoff, SkipOnError, TimeoutStrategy, Work,
};
pub use router::{Connection, TypeGraph, TypeRouter, ValidationReport};
pub use routes::{Route, RouteCondition, RouteTable};
pub use workflow::{PolicySource, Registration, WorkflowEngine, WorkflowResult, WorkflowState};
