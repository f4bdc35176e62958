//! Type-based routing. Agents are linked by the types they declare.
//!
//! The `TypeRouter` owns a `TypeGraph` built from agent type declarations and
//! answers the questions the workflow loop asks: which agent can consume this
//! value, and which agent comes after the one that just produced it.
//! Compatibility beyond exact tag equality comes from declared supertypes and
//! aliases, never from reflection.

pub mod graph;
pub mod visualize;

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use agentflow_core::error::{FlowError, Result};
use agentflow_core::types::{Payload, TypeTag};

pub use graph::{AgentTypes, Connection, TypeGraph, EXACT_CONFIDENCE, WILDCARD_CONFIDENCE};

/// Outcome of checking an explicit agent sequence against the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<String>,
}

/// Builds and queries the type graph.
#[derive(Debug, Clone, Default)]
pub struct TypeRouter {
    graph: TypeGraph,
    /// Tag -> tags it may stand in for.
    supertypes: HashMap<TypeTag, Vec<TypeTag>>,
}

impl TypeRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent's declared types and recompute connections.
    pub fn register_agent(
        &mut self,
        id: impl Into<String>,
        input: impl Into<TypeTag>,
        output: impl Into<TypeTag>,
    ) {
        self.register_agent_with_capabilities(id, input, output, vec![]);
    }

    pub fn register_agent_with_capabilities(
        &mut self,
        id: impl Into<String>,
        input: impl Into<TypeTag>,
        output: impl Into<TypeTag>,
        capabilities: Vec<String>,
    ) {
        let types = AgentTypes {
            id: id.into(),
            input: input.into(),
            output: output.into(),
            capabilities,
        };
        debug!(agent = %types.id, input = %types.input, output = %types.output, "Registering agent types");
        self.graph.insert(types);
    }

    /// Declare that values tagged `sub` may be consumed where `sup` is accepted.
    pub fn register_supertype(&mut self, sub: impl Into<TypeTag>, sup: impl Into<TypeTag>) {
        let sup = sup.into();
        let entry = self.supertypes.entry(sub.into()).or_default();
        if !entry.contains(&sup) {
            entry.push(sup);
        }
    }

    /// Declare two tags interchangeable.
    pub fn register_alias(&mut self, a: impl Into<TypeTag>, b: impl Into<TypeTag>) {
        let (a, b) = (a.into(), b.into());
        self.register_supertype(a.clone(), b.clone());
        self.register_supertype(b, a);
    }

    pub fn graph(&self) -> &TypeGraph {
        &self.graph
    }

    pub fn connections(&self) -> &[Connection] {
        self.graph.connections()
    }

    /// Whether a value tagged `value` satisfies a declared `accepted` tag,
    /// through equality or the supertype/alias closure. The wildcard is not
    /// considered here.
    pub fn is_compatible(&self, value: &TypeTag, accepted: &TypeTag) -> bool {
        if value == accepted {
            return true;
        }
        let mut seen: HashSet<&TypeTag> = HashSet::new();
        let mut stack: Vec<&TypeTag> = vec![value];
        while let Some(tag) = stack.pop() {
            if !seen.insert(tag) {
                continue;
            }
            if let Some(sups) = self.supertypes.get(tag) {
                for sup in sups {
                    if sup == accepted {
                        return true;
                    }
                    stack.push(sup);
                }
            }
        }
        false
    }

    /// Find an agent able to consume `value`.
    pub fn find_agent_for_type(&self, value: &Payload) -> Option<&str> {
        self.find_agent_for_tag(&value.tag, None)
    }

    /// Find an agent accepting `tag`, optionally skipping one instance.
    ///
    /// Lookup order: exact tag, then a linear compatibility scan, then any
    /// agent declaring the wildcard input.
    pub fn find_agent_for_tag(&self, tag: &TypeTag, exclude: Option<&str>) -> Option<&str> {
        let allowed = |id: &str| exclude != Some(id);

        if let Some(id) = self.graph.accepting(tag).iter().find(|id| allowed(id.as_str())) {
            return Some(id.as_str());
        }

        let compatible = self.graph.agents().iter().find(|a| {
            allowed(a.id.as_str()) && !a.input.is_any() && self.is_compatible(tag, &a.input)
        });
        if let Some(agent) = compatible {
            return Some(agent.id.as_str());
        }

        self.graph
            .accepting(&TypeTag::any())
            .iter()
            .find(|id| allowed(id.as_str()))
            .map(String::as_str)
    }

    /// Pick the agent that should consume what `current` just produced.
    ///
    /// Prefers the highest-confidence outgoing connection whose shared type
    /// matches the produced tag, then falls back to a type lookup that never
    /// returns `current` itself.
    pub fn find_next_agent(&self, current: &str, produced: &Payload) -> Option<&str> {
        let mut best: Option<&Connection> = None;
        for conn in self.graph.outgoing(current) {
            if !self.is_compatible(&produced.tag, &conn.shared_type) {
                continue;
            }
            if best.map_or(true, |b| conn.confidence > b.confidence) {
                best = Some(conn);
            }
        }

        if let Some(conn) = best {
            return Some(conn.to.as_str());
        }

        self.find_agent_for_tag(&produced.tag, Some(current))
    }

    /// Breadth-first search for a chain of agents turning `input` into `output`.
    ///
    /// Returns the empty path when nothing is found within `max_length` agents
    /// or within `max_length * agent_count` expansions.
    pub fn find_workflow_path(
        &self,
        input: &TypeTag,
        output: &TypeTag,
        max_length: usize,
    ) -> Vec<String> {
        if max_length == 0 {
            return vec![];
        }
        let budget = max_length.saturating_mul(self.graph.len());

        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<Vec<&str>> = VecDeque::new();
        for agent in self.graph.agents() {
            if agent.input.is_any() || self.is_compatible(input, &agent.input) {
                visited.insert(agent.id.as_str());
                queue.push_back(vec![agent.id.as_str()]);
            }
        }

        let mut expansions = 0usize;
        while let Some(path) = queue.pop_front() {
            let Some(&last) = path.last() else { continue };
            let Some(agent) = self.graph.agent(last) else { continue };

            if self.is_compatible(&agent.output, output) {
                return path.into_iter().map(String::from).collect();
            }
            if expansions >= budget {
                debug!(budget, "Path search budget exhausted");
                break;
            }
            expansions += 1;
            if path.len() >= max_length {
                continue;
            }

            for conn in self.graph.outgoing(last) {
                if visited.insert(conn.to.as_str()) {
                    let mut next = path.clone();
                    next.push(conn.to.as_str());
                    queue.push_back(next);
                }
            }
        }

        vec![]
    }

    /// Like `find_workflow_path`, but an input type no agent accepts is an
    /// error rather than an empty path.
    pub fn plan_workflow(
        &self,
        input: &TypeTag,
        output: &TypeTag,
        max_length: usize,
    ) -> Result<Vec<String>> {
        if self.find_agent_for_tag(input, None).is_none() {
            return Err(FlowError::NoAgentForType(input.to_string()));
        }
        Ok(self.find_workflow_path(input, output, max_length))
    }

    /// Check that an explicit agent sequence can carry `input` through to
    /// `expected_output`.
    pub fn validate_workflow_completeness(
        &self,
        sequence: &[&str],
        input: &TypeTag,
        expected_output: Option<&TypeTag>,
    ) -> ValidationReport {
        let mut issues = Vec::new();

        if sequence.is_empty() {
            issues.push("Agent sequence is empty".to_string());
            return ValidationReport { valid: false, issues };
        }

        for id in sequence {
            if self.graph.agent(*id).is_none() {
                issues.push(format!("Agent '{}' is not registered", id));
            }
        }

        if let Some(first) = self.graph.agent(sequence[0]) {
            if !first.input.is_any() && !self.is_compatible(input, &first.input) {
                issues.push(format!(
                    "First agent '{}' accepts {} but input is {}",
                    first.id, first.input, input
                ));
            }
        }

        for pair in sequence.windows(2) {
            if !self.graph.is_connected(pair[0], pair[1]) {
                issues.push(format!("No connection from '{}' to '{}'", pair[0], pair[1]));
            }
        }

        if let Some(expected) = expected_output {
            let last = sequence[sequence.len() - 1];
            if let Some(agent) = self.graph.agent(last) {
                if !self.is_compatible(&agent.output, expected) {
                    issues.push(format!(
                        "Last agent '{}' produces {} but {} is expected",
                        agent.id, agent.output, expected
                    ));
                }
            }
        }

        ValidationReport {
            valid: issues.is_empty(),
            issues,
        }
    }

    /// Instance ids advertising a capability, in registration order.
    pub fn agents_with_capability(&self, capability: &str) -> Vec<&str> {
        self.graph
            .agents()
            .iter()
            .filter(|a| a.capabilities.iter().any(|c| c == capability))
            .map(|a| a.id.as_str())
            .collect()
    }
}
