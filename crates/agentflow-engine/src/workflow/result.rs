use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agentflow_core::types::Payload;

use super::state::WorkflowState;

/// Outcome of one `run()`.
///
/// Failures are reported through `state` and `error`; `run()` itself never
/// returns an `Err`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub workflow_id: String,
    pub state: WorkflowState,
    /// Last value produced, also kept on failure for diagnosis.
    pub result: Option<Payload>,
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Agent instance ids in invocation order.
    pub path: Vec<String>,
    pub metrics: HashMap<String, serde_json::Value>,
}

impl WorkflowResult {
    pub(crate) fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            state: WorkflowState::Pending,
            result: None,
            error: None,
            start_time: Utc::now(),
            end_time: None,
            path: vec![],
            metrics: HashMap::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == WorkflowState::Completed
    }

    pub fn metric(&self, key: &str) -> Option<&serde_json::Value> {
        self.metrics.get(key)
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds())
    }
}
