//! Mermaid rendering of the type graph.

use super::graph::{TypeGraph, EXACT_CONFIDENCE};
use super::TypeRouter;

/// Mermaid node identifiers must be alphanumeric (plus underscores).
pub fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Render a graph as a left-to-right Mermaid flowchart.
///
/// Exact connections are solid arrows; wildcard connections are dotted.
pub fn render(graph: &TypeGraph) -> String {
    let mut out = String::from("flowchart LR\n");

    for agent in graph.agents() {
        out.push_str(&format!(
            "    {}[\"{}<br/>{} → {}\"]\n",
            sanitize_id(&agent.id),
            agent.id,
            agent.input,
            agent.output
        ));
    }

    for conn in graph.connections() {
        let arrow = if conn.confidence >= EXACT_CONFIDENCE { "-->" } else { "-.->" };
        out.push_str(&format!(
            "    {} {}|\"{} ({:.2})\"| {}\n",
            sanitize_id(&conn.from),
            arrow,
            conn.shared_type,
            conn.confidence,
            sanitize_id(&conn.to)
        ));
    }

    out
}

impl TypeRouter {
    /// Mermaid flowchart of the current graph.
    pub fn to_mermaid(&self) -> String {
        render(self.graph())
    }
}
