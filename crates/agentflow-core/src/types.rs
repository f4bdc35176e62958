use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Semantic type tag declared by agents and carried by payloads.
///
/// Tags are plain names (`"string"`, `"Tokens"`, `"Report"`). The tag `"any"`
/// is the wildcard: an agent declaring it as its input accepts every payload.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeTag(pub String);

impl TypeTag {
    pub const ANY: &'static str = "any";

    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The wildcard tag.
    pub fn any() -> Self {
        Self(Self::ANY.to_string())
    }

    pub fn is_any(&self) -> bool {
        self.0 == Self::ANY
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TypeTag {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TypeTag {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A value flowing between agents, together with its type tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub tag: TypeTag,
    pub body: serde_json::Value,
}

impl Payload {
    pub fn new(tag: impl Into<TypeTag>, body: serde_json::Value) -> Self {
        Self {
            tag: tag.into(),
            body,
        }
    }

    /// A plain string payload, tagged `string`.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new("string", serde_json::Value::String(text.into()))
    }

    /// Tag a raw JSON value by its shape.
    pub fn infer(body: serde_json::Value) -> Self {
        let tag = match &body {
            serde_json::Value::Null => "null",
            serde_json::Value::Bool(_) => "bool",
            serde_json::Value::Number(_) => "number",
            serde_json::Value::String(_) => "string",
            serde_json::Value::Array(_) => "array",
            serde_json::Value::Object(_) => "object",
        };
        Self::new(tag, body)
    }

    pub fn tag(&self) -> &TypeTag {
        &self.tag
    }

    /// The body as a string slice, if it is a JSON string.
    pub fn as_str(&self) -> Option<&str> {
        self.body.as_str()
    }

    /// Look up a top-level field of an object body.
    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.body.as_object().and_then(|obj| obj.get(key))
    }
}

/// Events published to the transport while a workflow runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A run entered RUNNING.
    Started {
        workflow_id: String,
        timestamp: DateTime<Utc>,
    },
    /// An agent is about to be invoked on data of `produced_type`.
    Progress {
        workflow_id: String,
        agent_id: String,
        timestamp: DateTime<Utc>,
        produced_type: TypeTag,
    },
    /// An agent invocation failed after its policy gave up.
    AgentFailed {
        workflow_id: String,
        agent_id: String,
        error: String,
        recovered: bool,
    },
    /// The run reached COMPLETED.
    Completed {
        workflow_id: String,
        iterations: usize,
    },
    /// The run reached FAILED.
    Failed { workflow_id: String, error: String },
    /// The run reached CANCELLED.
    Cancelled { workflow_id: String },
}

impl WorkflowEvent {
    pub fn workflow_id(&self) -> &str {
        match self {
            Self::Started { workflow_id, .. }
            | Self::Progress { workflow_id, .. }
            | Self::AgentFailed { workflow_id, .. }
            | Self::Completed { workflow_id, .. }
            | Self::Failed { workflow_id, .. }
            | Self::Cancelled { workflow_id } => workflow_id,
        }
    }

    /// Topic this event is published under.
    pub fn topic(&self) -> String {
        format!("workflow.{}", self.workflow_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_tag_wildcard() {
        assert!(TypeTag::any().is_any());
        assert!(!TypeTag::from("Tokens").is_any());
        assert_eq!(TypeTag::from("Report").to_string(), "Report");
    }

    #[test]
    fn test_payload_text() {
        let p = Payload::text("hello world");
        assert_eq!(p.tag.as_str(), "string");
        assert_eq!(p.as_str(), Some("hello world"));
    }

    #[test]
    fn test_payload_infer() {
        assert_eq!(Payload::infer(json!(3)).tag.as_str(), "number");
        assert_eq!(Payload::infer(json!([1, 2])).tag.as_str(), "array");
        assert_eq!(Payload::infer(json!({"a": 1})).tag.as_str(), "object");
        assert_eq!(Payload::infer(json!(null)).tag.as_str(), "null");
    }

    #[test]
    fn test_payload_field() {
        let p = Payload::new("Report", json!({"words": 2}));
        assert_eq!(p.field("words"), Some(&json!(2)));
        assert_eq!(p.field("missing"), None);
        assert_eq!(Payload::text("x").field("words"), None);
    }

    #[test]
    fn test_event_topic() {
        let event = WorkflowEvent::Failed {
            workflow_id: "wf-1".into(),
            error: "boom".into(),
        };
        assert_eq!(event.topic(), "workflow.wf-1");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "failed");
    }
}
