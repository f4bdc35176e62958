use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use agentflow_core::types::TypeTag;

/// Confidence of a connection whose types match exactly.
pub const EXACT_CONFIDENCE: f64 = 1.0;
/// Confidence of a connection into an agent that accepts `any`.
pub const WILDCARD_CONFIDENCE: f64 = 0.8;

/// Declared types of one registered agent instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTypes {
    pub id: String,
    pub input: TypeTag,
    pub output: TypeTag,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// A directed edge between two agents sharing a type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub from: String,
    pub to: String,
    pub shared_type: TypeTag,
    pub confidence: f64,
}

/// Graph of agents connected by their declared input/output types.
///
/// Agents keep their registration order, which makes every scan over the
/// graph deterministic.
#[derive(Debug, Clone, Default)]
pub struct TypeGraph {
    agents: Vec<AgentTypes>,
    index: HashMap<String, usize>,
    type_to_agents: HashMap<TypeTag, Vec<String>>,
    connections: Vec<Connection>,
}

impl TypeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an agent, then recompute all connections.
    pub fn insert(&mut self, agent: AgentTypes) {
        match self.index.get(&agent.id) {
            Some(&pos) => self.agents[pos] = agent,
            None => {
                self.index.insert(agent.id.clone(), self.agents.len());
                self.agents.push(agent);
            }
        }
        self.rebuild();
    }

    fn rebuild(&mut self) {
        self.type_to_agents.clear();
        for agent in &self.agents {
            self.type_to_agents
                .entry(agent.input.clone())
                .or_default()
                .push(agent.id.clone());
        }

        self.connections.clear();
        for from in &self.agents {
            for to in &self.agents {
                if from.id == to.id {
                    continue;
                }
                let confidence = if from.output == to.input {
                    EXACT_CONFIDENCE
                } else if to.input.is_any() {
                    WILDCARD_CONFIDENCE
                } else {
                    continue;
                };
                self.connections.push(Connection {
                    from: from.id.clone(),
                    to: to.id.clone(),
                    shared_type: from.output.clone(),
                    confidence,
                });
            }
        }
    }

    pub fn agents(&self) -> &[AgentTypes] {
        &self.agents
    }

    pub fn agent(&self, id: &str) -> Option<&AgentTypes> {
        self.index.get(id).map(|&pos| &self.agents[pos])
    }

    /// Instance ids whose declared input is exactly `tag`, in registration order.
    pub fn accepting(&self, tag: &TypeTag) -> &[String] {
        self.type_to_agents
            .get(tag)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Outgoing connections of one agent.
    pub fn outgoing(&self, from: &str) -> Vec<&Connection> {
        self.connections.iter().filter(|c| c.from == from).collect()
    }

    pub fn is_connected(&self, from: &str, to: &str) -> bool {
        self.connections.iter().any(|c| c.from == from && c.to == to)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
