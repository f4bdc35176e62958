use std::sync::Arc;

use agentflow_core::config::PolicyConfig;
use agentflow_core::traits::Agent;

use crate::policy::{build_policy, ErrorPolicy};

/// Where an agent's error policy comes from.
#[derive(Clone)]
pub enum PolicySource {
    /// Built fresh for every run, so counters never leak between runs.
    Config(PolicyConfig),
    /// One instance reused by every run of this engine.
    Shared(Arc<dyn ErrorPolicy>),
}

impl PolicySource {
    /// Resolve to an instance for one run.
    pub fn instantiate(&self) -> Arc<dyn ErrorPolicy> {
        match self {
            Self::Config(cfg) => build_policy(cfg),
            Self::Shared(policy) => policy.clone(),
        }
    }
}

impl std::fmt::Debug for PolicySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(cfg) => write!(f, "Config({})", cfg.strategy_name()),
            Self::Shared(policy) => write!(f, "Shared({})", policy.name()),
        }
    }
}

/// An agent as registered with a workflow.
#[derive(Clone)]
pub struct Registration {
    pub instance_id: String,
    pub agent: Arc<dyn Agent>,
    /// `None` falls back to the engine's default policy.
    pub policy: Option<PolicySource>,
}

impl Registration {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self {
            instance_id: agent.id().to_string(),
            agent,
            policy: None,
        }
    }

    /// Register the same agent under a different instance id.
    pub fn with_instance_id(mut self, id: impl Into<String>) -> Self {
        self.instance_id = id.into();
        self
    }

    pub fn with_policy(mut self, config: PolicyConfig) -> Self {
        self.policy = Some(PolicySource::Config(config));
        self
    }

    pub fn with_shared_policy(mut self, policy: Arc<dyn ErrorPolicy>) -> Self {
        self.policy = Some(PolicySource::Shared(policy));
        self
    }
}

impl<A: Agent> From<A> for Registration {
    fn from(agent: A) -> Self {
        Self::new(Arc::new(agent))
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("instance_id", &self.instance_id)
            .field("input", &self.agent.input_type())
            .field("output", &self.agent.output_type())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::FnAgent;
    use crate::policy::FailFast;
    use agentflow_core::types::Payload;

    fn echo() -> FnAgent {
        FnAgent::new("echo", "any", "any", |p: Payload| async move { Ok(p) })
    }

    #[test]
    fn test_instance_id_defaults_to_agent_id() {
        let reg = Registration::from(echo());
        assert_eq!(reg.instance_id, "echo");
        assert!(reg.policy.is_none());

        let reg = reg.with_instance_id("echo-2");
        assert_eq!(reg.instance_id, "echo-2");
        assert_eq!(reg.agent.id(), "echo");
    }

    #[test]
    fn test_config_source_builds_fresh_instances() {
        let source = PolicySource::Config(PolicyConfig::CircuitBreaker(Default::default()));
        let a = source.instantiate();
        let b = source.instantiate();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.name(), "circuit_breaker");
    }

    #[test]
    fn test_shared_source_reuses_instance() {
        let shared: Arc<dyn ErrorPolicy> = Arc::new(FailFast);
        let reg = Registration::from(echo()).with_shared_policy(shared.clone());
        let source = reg.policy.as_ref().unwrap();
        assert!(Arc::ptr_eq(&source.instantiate(), &shared));
        assert!(format!("{:?}", reg).contains("Shared(fail_fast)"));
    }
}
