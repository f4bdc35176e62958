//! Demonstration text pipeline: `tokenize → analyze → summarize`.

use std::collections::HashSet;

use serde_json::json;

use agentflow_core::config::AppConfig;
use agentflow_core::error::{FlowError, Result};
use agentflow_core::types::Payload;
use agentflow_engine::{FnAgent, WorkflowEngine};

/// Texts shorter than this many words are reported as `short`.
const SHORT_TEXT_WORDS: usize = 5;

fn split_words(input: &Payload) -> Result<Payload> {
    let text = input
        .as_str()
        .ok_or_else(|| FlowError::agent("tokenize", "input is not a string"))?;
    let tokens: Vec<String> = text
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();
    if tokens.is_empty() {
        return Err(FlowError::agent("tokenize", "no words in input"));
    }
    Ok(Payload::new("Tokens", json!({ "tokens": tokens })))
}

fn build_report(input: &Payload) -> Result<Payload> {
    let tokens: Vec<&str> = input
        .field("tokens")
        .and_then(|t| t.as_array())
        .ok_or_else(|| FlowError::agent("analyze", "missing tokens"))?
        .iter()
        .filter_map(|t| t.as_str())
        .collect();
    let unique: HashSet<&str> = tokens.iter().copied().collect();
    // First of the longest words.
    let longest = tokens
        .iter()
        .copied()
        .fold("", |best, t| if t.len() > best.len() { t } else { best });
    let kind = if tokens.len() < SHORT_TEXT_WORDS {
        "short"
    } else {
        "long"
    };
    Ok(Payload::new(
        "Report",
        json!({
            "words": tokens.len(),
            "unique": unique.len(),
            "longest": longest,
            "kind": kind,
        }),
    ))
}

fn render_summary(input: &Payload) -> Result<Payload> {
    let words = input.field("words").and_then(|v| v.as_u64()).unwrap_or(0);
    let unique = input.field("unique").and_then(|v| v.as_u64()).unwrap_or(0);
    let longest = input
        .field("longest")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    Ok(Payload::new(
        "Summary",
        json!(format!("{} words ({} unique), longest: {}", words, unique, longest)),
    ))
}

pub fn tokenize() -> FnAgent {
    FnAgent::new("tokenize", "string", "Tokens", |input: Payload| async move {
        split_words(&input)
    })
    .with_capabilities(["text", "parse"])
}

pub fn analyze() -> FnAgent {
    FnAgent::new("analyze", "Tokens", "Report", |input: Payload| async move {
        build_report(&input)
    })
    .with_capabilities(["text", "analysis"])
}

pub fn summarize() -> FnAgent {
    FnAgent::new("summarize", "Report", "Summary", |input: Payload| async move {
        render_summary(&input)
    })
    .with_capabilities(["text", "report"])
}

/// The demo pipeline configured from `config`.
pub fn pipeline(config: &AppConfig) -> WorkflowEngine {
    WorkflowEngine::from_config(config).add_agents([tokenize(), analyze(), summarize()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_engine::WorkflowState;

    #[tokio::test]
    async fn test_pipeline_summarizes_text() {
        let engine = pipeline(&AppConfig::default());
        let result = engine.run(Payload::text("The quick fox, the end.")).await;

        assert_eq!(result.state, WorkflowState::Completed);
        assert_eq!(result.path, vec!["tokenize", "analyze", "summarize"]);
        let summary = result.result.unwrap();
        assert_eq!(summary.tag.as_str(), "Summary");
        assert_eq!(summary.as_str(), Some("5 words (4 unique), longest: quick"));
    }

    #[tokio::test]
    async fn test_empty_text_fails() {
        let engine = pipeline(&AppConfig::default());
        let result = engine.run(Payload::text("   ")).await;
        assert_eq!(result.state, WorkflowState::Failed);
        assert!(result.error.unwrap().contains("no words"));
    }

    #[test]
    fn test_report_kind() {
        let report = build_report(&Payload::new("Tokens", json!({"tokens": ["a", "bb"]}))).unwrap();
        assert_eq!(report.field("kind"), Some(&json!("short")));
        assert_eq!(report.field("words"), Some(&json!(2)));
        assert_eq!(report.field("longest"), Some(&json!("bb")));

        let err = build_report(&Payload::text("oops")).unwrap_err();
        assert!(err.to_string().contains("missing tokens"));
    }

    #[test]
    fn test_demo_graph_is_a_chain() {
        let graph = pipeline(&AppConfig::default()).type_graph();
        assert!(graph.is_connected("tokenize", "analyze"));
        assert!(graph.is_connected("analyze", "summarize"));
        assert_eq!(graph.connections().len(), 2);
    }
}
