use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    // Routing errors
    #[error("No agents registered")]
    NoAgents,

    #[error("No agent accepts type: {0}")]
    NoAgentForType(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Duplicate agent instance id: {0}")]
    DuplicateAgent(String),

    // Agent execution errors
    #[error("Agent {agent} failed: {message}")]
    Agent { agent: String, message: String },

    // Policy errors
    #[error("Circuit open, retry after {retry_after_ms}ms")]
    CircuitOpen { retry_after_ms: u64 },

    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Skipped after error: {0}")]
    Skipped(String),

    // Workflow errors
    #[error("Workflow timed out after {timeout_secs}s")]
    WorkflowTimeout { timeout_secs: u64 },

    #[error("Workflow exceeded max iterations ({0})")]
    IterationLimit(usize),

    #[error("Workflow cancelled")]
    Cancelled,

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    #[error("Unknown error handling strategy: {0}")]
    UnknownPolicy(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FlowError {
    /// Convenience constructor for an agent execution failure.
    pub fn agent(agent: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Agent {
            agent: agent.into(),
            message: message.into(),
        }
    }

    /// Coarse classification used by retry allow-lists.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoAgents
            | Self::NoAgentForType(_)
            | Self::AgentNotFound(_)
            | Self::DuplicateAgent(_) => ErrorKind::Routing,
            Self::Agent { .. } => ErrorKind::Agent,
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Self::Timeout { .. } | Self::WorkflowTimeout { .. } => ErrorKind::Timeout,
            Self::Skipped(_) => ErrorKind::Skipped,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Config(_) | Self::ConfigNotFound(_) | Self::UnknownPolicy(_) => ErrorKind::Config,
            Self::IterationLimit(_)
            | Self::InvalidTransition { .. }
            | Self::Io(_)
            | Self::Json(_) => ErrorKind::Internal,
        }
    }
}

/// Error categories an error policy can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Routing,
    Agent,
    CircuitOpen,
    Timeout,
    Skipped,
    Cancelled,
    Config,
    Internal,
}

pub type Result<T> = std::result::Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_error_display() {
        let err = FlowError::agent("parse", "bad input");
        assert_eq!(err.to_string(), "Agent parse failed: bad input");
        assert_eq!(err.kind(), ErrorKind::Agent);
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(FlowError::NoAgents.kind(), ErrorKind::Routing);
        assert_eq!(
            FlowError::CircuitOpen { retry_after_ms: 10 }.kind(),
            ErrorKind::CircuitOpen
        );
        assert_eq!(FlowError::Timeout { timeout_ms: 5 }.kind(), ErrorKind::Timeout);
        assert_eq!(FlowError::IterationLimit(100).kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_kind_serde_names() {
        let json = serde_json::to_string(&ErrorKind::CircuitOpen).unwrap();
        assert_eq!(json, "\"circuit_open\"");
        let parsed: ErrorKind = serde_json::from_str("\"timeout\"").unwrap();
        assert_eq!(parsed, ErrorKind::Timeout);
    }
}
