use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, FlowError, Result};

/// Top-level agentflow configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub workflow: WorkflowConfig,
    /// Per-instance overrides keyed by agent instance id.
    #[serde(default)]
    pub agents: HashMap<String, AgentConfig>,
    /// Manual route overrides.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Overall wall-clock deadline for one run.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Publish progress events to the transport.
    #[serde(default)]
    pub observability: bool,
    /// Consult the intervention hook before each agent.
    #[serde(default)]
    pub intervention: bool,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Policy for agents that do not configure their own.
    #[serde(default)]
    pub default_policy: PolicyConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            timeout_secs: None,
            observability: false,
            intervention: false,
            event_capacity: default_event_capacity(),
            default_policy: PolicyConfig::default(),
        }
    }
}

fn default_max_iterations() -> usize { 100 }
fn default_event_capacity() -> usize { 256 }

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub policy: Option<PolicyConfig>,
}

/// A manual route override as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub priority: i32,
    /// Expression such as `kind == "short"`; omitted means always.
    #[serde(default)]
    pub when: Option<String>,
}

/// Error handling strategy configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum PolicyConfig {
    #[default]
    FailFast,
    Retry(RetryConfig),
    Skip(SkipConfig),
    CircuitBreaker(CircuitBreakerConfig),
    AdaptiveRetry(AdaptiveRetryConfig),
    Timeout(TimeoutConfig),
    /// Outermost strategy first.
    Composite { strategies: Vec<PolicyConfig> },
}

impl PolicyConfig {
    /// Build a policy config from a strategy name and a JSON options object.
    pub fn from_name(name: &str, options: &serde_json::Value) -> Result<Self> {
        let strategy = match name.trim().to_lowercase().replace('-', "_").as_str() {
            "fail_fast" | "failfast" => "fail_fast",
            "retry" | "retry_with_backoff" => "retry",
            "skip" | "skip_on_error" => "skip",
            "circuit_breaker" => "circuit_breaker",
            "adaptive_retry" | "adaptive" => "adaptive_retry",
            "timeout" => "timeout",
            "composite" => "composite",
            _ => return Err(FlowError::UnknownPolicy(name.to_string())),
        };

        let mut object = match options {
            serde_json::Value::Object(map) => map.clone(),
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                return Err(FlowError::Config(format!(
                    "options for strategy '{}' must be an object, got {}",
                    name, other
                )))
            }
        };
        object.insert("strategy".into(), serde_json::Value::String(strategy.into()));

        serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|e| FlowError::Config(format!("invalid options for '{}': {}", name, e)))
    }

    /// Strategy name as used in config files.
    pub fn strategy_name(&self) -> &'static str {
        match self {
            Self::FailFast => "fail_fast",
            Self::Retry(_) => "retry",
            Self::Skip(_) => "skip",
            Self::CircuitBreaker(_) => "circuit_breaker",
            Self::AdaptiveRetry(_) => "adaptive_retry",
            Self::Timeout(_) => "timeout",
            Self::Composite { .. } => "composite",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Exponential,
    Linear,
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub backoff: BackoffKind,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
    /// Error kinds worth retrying; empty retries everything.
    #[serde(default)]
    pub retry_on: Vec<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff: BackoffKind::default(),
            jitter: default_jitter(),
            retry_on: vec![],
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_delay() -> u64 { 1000 }
fn default_max_delay() -> u64 { 30000 }
fn default_jitter() -> bool { true }

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkipConfig {
    /// Value returned in place of the error.
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    /// Type tag of the default value; inferred from its shape when omitted.
    #[serde(default)]
    pub default_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_recovery_timeout")]
    pub recovery_timeout_ms: u64,
    #[serde(default = "default_half_open_requests")]
    pub half_open_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_ms: default_recovery_timeout(),
            half_open_requests: default_half_open_requests(),
        }
    }
}

fn default_failure_threshold() -> u32 { 5 }
fn default_recovery_timeout() -> u64 { 60000 }
fn default_half_open_requests() -> u32 { 1 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveRetryConfig {
    #[serde(default = "default_min_retries")]
    pub min_retries: u32,
    #[serde(default = "default_adaptive_max_retries")]
    pub max_retries: u32,
    /// Starting retry budget; clamped into `[min_retries, max_retries]`.
    #[serde(default = "default_max_retries")]
    pub initial_retries: u32,
    #[serde(default = "default_adjustment_window")]
    pub adjustment_window: usize,
    #[serde(default = "default_success_rate_threshold")]
    pub success_rate_threshold: f64,
    #[serde(default = "default_initial_delay")]
    pub base_delay_ms: u64,
}

impl Default for AdaptiveRetryConfig {
    fn default() -> Self {
        Self {
            min_retries: default_min_retries(),
            max_retries: default_adaptive_max_retries(),
            initial_retries: default_max_retries(),
            adjustment_window: default_adjustment_window(),
            success_rate_threshold: default_success_rate_threshold(),
            base_delay_ms: default_initial_delay(),
        }
    }
}

fn default_min_retries() -> u32 { 1 }
fn default_adaptive_max_retries() -> u32 { 5 }
fn default_adjustment_window() -> usize { 10 }
fn default_success_rate_threshold() -> f64 { 0.8 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Value returned when the deadline expires.
    #[serde(default)]
    pub fallback: Option<serde_json::Value>,
    #[serde(default)]
    pub fallback_type: Option<String>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            fallback: None,
            fallback_type: None,
        }
    }
}

fn default_timeout_ms() -> u64 { 30000 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| FlowError::ConfigNotFound(path.display().to_string()))?;

        Self::parse(&content)
    }

    /// Parse config from TOML text, with env var expansion.
    pub fn parse(content: &str) -> Result<Self> {
        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| FlowError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but cannot be used.
    pub fn validate(&self) -> Result<()> {
        if self.workflow.event_capacity == 0 {
            return Err(FlowError::Config(
                "workflow.event_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Load config, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(FlowError::ConfigNotFound(p)) => {
                tracing::debug!(path = %p, "Config file not found, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_zero_event_capacity_rejected() {
        let err = AppConfig::parse("[workflow]\nobservability = true\nevent_capacity = 0\n")
            .unwrap_err();
        assert!(matches!(err, FlowError::Config(ref m) if m.contains("event_capacity")));
        assert!(AppConfig::parse("[workflow]\nevent_capacity = 1\n").is_ok());
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_AGENTFLOW_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_AGENTFLOW_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
    }

    #[test]
    fn test_expand_missing_env_var_kept() {
        let result = expand_env_vars("key = \"${AGENTFLOW_SURELY_UNSET_VAR}\"");
        assert_eq!(result, "key = \"${AGENTFLOW_SURELY_UNSET_VAR}\"");
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.workflow.max_iterations, 100);
        assert!(config.workflow.timeout_secs.is_none());
        assert!(!config.workflow.observability);
        assert!(matches!(config.workflow.default_policy, PolicyConfig::FailFast));
        assert!(config.routes.is_empty());
    }

    #[test]
    fn test_policy_from_name() {
        let policy = PolicyConfig::from_name("retry", &json!({"max_retries": 5, "backoff": "linear"}))
            .unwrap();
        match policy {
            PolicyConfig::Retry(cfg) => {
                assert_eq!(cfg.max_retries, 5);
                assert_eq!(cfg.backoff, BackoffKind::Linear);
                assert_eq!(cfg.initial_delay_ms, 1000);
                assert!(cfg.jitter);
            }
            other => panic!("unexpected policy: {:?}", other),
        }
    }

    #[test]
    fn test_policy_from_name_aliases() {
        let policy = PolicyConfig::from_name("Circuit-Breaker", &serde_json::Value::Null).unwrap();
        assert_eq!(policy.strategy_name(), "circuit_breaker");

        let policy = PolicyConfig::from_name("skip_on_error", &json!({"default": "n/a"})).unwrap();
        match policy {
            PolicyConfig::Skip(cfg) => assert_eq!(cfg.default, Some(json!("n/a"))),
            other => panic!("unexpected policy: {:?}", other),
        }
    }

    #[test]
    fn test_policy_from_name_unknown() {
        let err = PolicyConfig::from_name("pray", &json!({})).unwrap_err();
        assert!(matches!(err, FlowError::UnknownPolicy(_)));
    }

    #[test]
    fn test_policy_from_name_bad_options() {
        let err = PolicyConfig::from_name("retry", &json!(3)).unwrap_err();
        assert!(matches!(err, FlowError::Config(_)));
    }

    #[test]
    fn test_composite_policy_toml() {
        let config = AppConfig::parse(
            r#"
[workflow.default_policy]
strategy = "composite"
strategies = [
    { strategy = "timeout", timeout_ms = 250 },
    { strategy = "retry", max_retries = 2, retry_on = ["timeout"] },
]
"#,
        )
        .unwrap();

        match config.workflow.default_policy {
            PolicyConfig::Composite { strategies } => {
                assert_eq!(strategies.len(), 2);
                assert_eq!(strategies[0].strategy_name(), "timeout");
                match &strategies[1] {
                    PolicyConfig::Retry(cfg) => {
                        assert_eq!(cfg.retry_on, vec![ErrorKind::Timeout]);
                    }
                    other => panic!("unexpected policy: {:?}", other),
                }
            }
            other => panic!("unexpected policy: {:?}", other),
        }
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = AppConfig::load_or_default(Path::new("/nonexistent/agentflow.toml")).unwrap();
        assert_eq!(config.workflow.max_iterations, 100);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = AppConfig::parse("[workflow\nmax_iterations = ").unwrap_err();
        assert!(matches!(err, FlowError::Config(_)));
    }
}
