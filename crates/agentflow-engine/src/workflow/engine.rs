use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use agentflow_core::config::{AppConfig, PolicyConfig};
use agentflow_core::error::{FlowError, Result};
use agentflow_core::event::{Envelope, EventBus};
use agentflow_core::traits::{Agent, InterventionHook, Transport};
use agentflow_core::types::{Payload, TypeTag, WorkflowEvent};

use super::registration::{PolicySource, Registration};
use super::result::WorkflowResult;
use super::state::WorkflowState;
use crate::policy::{work, ErrorPolicy};
use crate::router::{TypeGraph, TypeRouter};
use crate::routes::{Route, RouteTable};

const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Bookkeeping for one run, readable after the run future is dropped.
#[derive(Debug, Default)]
struct RunTrace {
    iterations: usize,
    path: Vec<String>,
    last: Option<Payload>,
    agent_durations_ms: HashMap<String, u64>,
    recovered_errors: usize,
}

/// Drives agents through the type graph, one at a time.
///
/// Each `run()` rebuilds the type graph from the registered agents, picks a
/// starting agent for the input's tag, then loops: invoke the current agent
/// under its error policy, consult manual routes, fall back to type routing,
/// and stop when no next agent exists or the iteration bound is hit.
pub struct WorkflowEngine {
    registrations: Vec<Registration>,
    routes: RouteTable,
    supertypes: Vec<(TypeTag, TypeTag)>,
    default_policy: PolicyConfig,
    /// Config-file overrides keyed by instance id; these win over code.
    policy_overrides: HashMap<String, PolicyConfig>,
    observability: bool,
    intervention: bool,
    timeout: Option<Duration>,
    max_iterations: usize,
    transport: Option<Arc<dyn Transport>>,
    event_bus: Option<Arc<EventBus>>,
    hook: Option<Arc<dyn InterventionHook>>,
    cancel: CancellationToken,
    /// Runs currently using the agents. Cleanup waits for the last one.
    active_runs: tokio::sync::Mutex<usize>,
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowEngine {
    pub fn new() -> Self {
        Self {
            registrations: vec![],
            routes: RouteTable::new(),
            supertypes: vec![],
            default_policy: PolicyConfig::FailFast,
            policy_overrides: HashMap::new(),
            observability: false,
            intervention: false,
            timeout: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            transport: None,
            event_bus: None,
            hook: None,
            cancel: CancellationToken::new(),
            active_runs: tokio::sync::Mutex::new(0),
        }
    }

    /// Apply workflow settings, per-agent policy overrides and routes.
    ///
    /// With observability enabled an `EventBus` sized by `event_capacity`
    /// becomes the transport.
    pub fn from_config(config: &AppConfig) -> Self {
        let wf = &config.workflow;
        let mut engine = Self::new()
            .with_max_iterations(wf.max_iterations)
            .with_observability(wf.observability)
            .with_intervention(wf.intervention)
            .with_error_handling(wf.default_policy.clone());
        if let Some(secs) = wf.timeout_secs {
            engine = engine.with_timeout(secs);
        }
        if wf.observability {
            engine = engine.with_event_bus(Arc::new(EventBus::new(wf.event_capacity)));
        }
        for (id, agent) in &config.agents {
            if let Some(policy) = &agent.policy {
                engine.policy_overrides.insert(id.clone(), policy.clone());
            }
        }
        for route in &config.routes {
            engine.routes.add(Route::from(route));
        }
        debug!(
            routes = engine.routes.len(),
            overrides = engine.policy_overrides.len(),
            "Engine configured"
        );
        engine
    }

    pub fn add_agent(self, agent: impl Agent) -> Self {
        self.add_registration(Registration::from(agent))
    }

    pub fn add_agents<I, R>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Registration>,
    {
        self.registrations.extend(agents.into_iter().map(Into::into));
        self
    }

    pub fn add_registration(mut self, registration: Registration) -> Self {
        self.registrations.push(registration);
        self
    }

    pub fn add_route(mut self, route: Route) -> Self {
        self.routes.add(route);
        self
    }

    /// Declare that values tagged `sub` may be consumed where `sup` is accepted.
    pub fn with_supertype(mut self, sub: impl Into<TypeTag>, sup: impl Into<TypeTag>) -> Self {
        self.supertypes.push((sub.into(), sup.into()));
        self
    }

    /// Default policy for agents that do not configure their own.
    pub fn with_error_handling(mut self, policy: PolicyConfig) -> Self {
        self.default_policy = policy;
        self
    }

    /// Default policy by strategy name and JSON options.
    pub fn with_error_handling_named(
        self,
        strategy: &str,
        options: &serde_json::Value,
    ) -> Result<Self> {
        Ok(self.with_error_handling(PolicyConfig::from_name(strategy, options)?))
    }

    pub fn with_observability(mut self, enabled: bool) -> Self {
        self.observability = enabled;
        self
    }

    pub fn with_intervention(mut self, enabled: bool) -> Self {
        self.intervention = enabled;
        self
    }

    /// Overall wall-clock deadline for one run.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(Duration::from_secs(secs));
        self
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use an in-process bus as the transport, keeping it reachable for
    /// `subscribe()`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.transport = Some(bus.clone());
        self.event_bus = Some(bus);
        self
    }

    pub fn with_intervention_hook(mut self, hook: Arc<dyn InterventionHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Token that cancels in-flight and future runs of this engine.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn subscribe(&self) -> Option<tokio::sync::broadcast::Receiver<Envelope>> {
        self.event_bus.as_ref().map(|bus| bus.subscribe())
    }

    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    pub fn route_table(&self) -> &RouteTable {
        &self.routes
    }

    /// Build the router a run would use.
    pub fn router(&self) -> TypeRouter {
        let mut router = TypeRouter::new();
        for (sub, sup) in &self.supertypes {
            router.register_supertype(sub.clone(), sup.clone());
        }
        for reg in &self.registrations {
            router.register_agent_with_capabilities(
                reg.instance_id.clone(),
                reg.agent.input_type(),
                reg.agent.output_type(),
                reg.agent.capabilities(),
            );
        }
        router
    }

    pub fn type_graph(&self) -> TypeGraph {
        self.router().graph().clone()
    }

    pub fn agents_with_capability(&self, capability: &str) -> Vec<String> {
        self.router()
            .agents_with_capability(capability)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Policy for one run: config override, then registration, then default.
    fn policy_for(&self, reg: &Registration) -> Arc<dyn ErrorPolicy> {
        if let Some(cfg) = self.policy_overrides.get(&reg.instance_id) {
            return PolicySource::Config(cfg.clone()).instantiate();
        }
        match &reg.policy {
            Some(source) => source.instantiate(),
            None => PolicySource::Config(self.default_policy.clone()).instantiate(),
        }
    }

    fn publish(&self, event: WorkflowEvent) {
        if !self.observability {
            return;
        }
        let Some(transport) = &self.transport else {
            return;
        };
        if let Err(e) = transport.publish(&event.topic(), event) {
            warn!(error = %e, "Failed to publish workflow event");
        }
    }

    /// Run the workflow on `input`. Never returns an error; failures are
    /// reported through the result's state.
    pub async fn run(&self, input: Payload) -> WorkflowResult {
        let workflow_id = Uuid::new_v4().to_string();
        let mut result = WorkflowResult::new(workflow_id.clone());
        let mut trace = RunTrace::default();
        let start = Instant::now();

        if self.cancel.is_cancelled() {
            info!(workflow_id = %workflow_id, "Workflow cancelled before start");
            self.finish(&mut result, &trace, start, Err(FlowError::Cancelled));
            return result;
        }

        *self.active_runs.lock().await += 1;
        if let Err(e) = result.state.transition(WorkflowState::Running) {
            error!(error = %e, "Workflow could not start");
        }
        info!(workflow_id = %workflow_id, input_type = %input.tag, "Workflow started");
        self.publish(WorkflowEvent::Started {
            workflow_id: workflow_id.clone(),
            timestamp: result.start_time,
        });

        let outcome = {
            let drive = self.drive(&workflow_id, input, &mut trace);
            let bounded = async {
                match self.timeout {
                    Some(limit) => match tokio::time::timeout(limit, drive).await {
                        Ok(r) => r,
                        Err(_) => Err(FlowError::WorkflowTimeout {
                            timeout_secs: limit.as_secs(),
                        }),
                    },
                    None => drive.await,
                }
            };
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(FlowError::Cancelled),
                r = bounded => r,
            }
        };

        self.release_agents().await;
        self.finish(&mut result, &trace, start, outcome);
        result
    }

    /// The routing loop.
    async fn drive(
        &self,
        workflow_id: &str,
        input: Payload,
        trace: &mut RunTrace,
    ) -> Result<Payload> {
        if self.registrations.is_empty() {
            return Err(FlowError::NoAgents);
        }

        let mut agents: HashMap<&str, (&Registration, Arc<dyn ErrorPolicy>)> = HashMap::new();
        for reg in &self.registrations {
            if agents.contains_key(reg.instance_id.as_str()) {
                return Err(FlowError::DuplicateAgent(reg.instance_id.clone()));
            }
            agents.insert(reg.instance_id.as_str(), (reg, self.policy_for(reg)));
        }

        let router = self.router();
        let mut current = match router.find_agent_for_type(&input) {
            Some(id) => id.to_string(),
            None => {
                let first = self.registrations[0].instance_id.clone();
                info!(
                    input_type = %input.tag,
                    agent_id = %first,
                    "No agent accepts input type, starting with first registered agent"
                );
                first
            }
        };
        let mut data = input;

        for iteration in 0..self.max_iterations {
            trace.iterations = iteration + 1;

            self.publish(WorkflowEvent::Progress {
                workflow_id: workflow_id.to_string(),
                agent_id: current.clone(),
                timestamp: Utc::now(),
                produced_type: data.tag.clone(),
            });

            if self.intervention {
                if let Some(hook) = &self.hook {
                    if let Some(target) = hook.redirect(workflow_id, &current, &data).await {
                        if agents.contains_key(target.as_str()) {
                            info!(from = %current, to = %target, "Intervention redirected workflow");
                            current = target;
                        } else {
                            warn!(target = %target, "Intervention named an unknown agent, ignoring");
                        }
                    }
                }
            }

            let (reg, policy) = agents
                .get(current.as_str())
                .ok_or_else(|| FlowError::AgentNotFound(current.clone()))?;

            debug!(agent_id = %current, policy = policy.name(), iteration, "Invoking agent");
            let agent: &dyn Agent = reg.agent.as_ref();
            let payload = &data;
            let agent_start = Instant::now();
            let outcome = policy
                .execute(work(move || agent.process(payload.clone())))
                .await;
            let elapsed_ms = agent_start.elapsed().as_millis() as u64;
            *trace.agent_durations_ms.entry(current.clone()).or_default() += elapsed_ms;
            trace.path.push(current.clone());

            match outcome {
                Ok(output) => {
                    debug!(agent_id = %current, output_type = %output.tag, elapsed_ms, "Agent complete");
                    data = output;
                    trace.last = Some(data.clone());
                }
                Err(e) if policy.should_fail_workflow() => {
                    error!(agent_id = %current, error = %e, "Agent failed, aborting workflow");
                    self.publish(WorkflowEvent::AgentFailed {
                        workflow_id: workflow_id.to_string(),
                        agent_id: current.clone(),
                        error: e.to_string(),
                        recovered: false,
                    });
                    return Err(e);
                }
                Err(e) => {
                    warn!(agent_id = %current, error = %e, "Agent failed, continuing with previous data");
                    trace.recovered_errors += 1;
                    self.publish(WorkflowEvent::AgentFailed {
                        workflow_id: workflow_id.to_string(),
                        agent_id: current.clone(),
                        error: e.to_string(),
                        recovered: true,
                    });
                }
            }

            let next = match self.routes.resolve(&current, &data) {
                Some(to) => {
                    debug!(from = %current, to, "Manual route matched");
                    Some(to.to_string())
                }
                None => router.find_next_agent(&current, &data).map(str::to_string),
            };

            match next {
                Some(next) => current = next,
                None => {
                    debug!(agent_id = %current, "No next agent, workflow complete");
                    return Ok(data);
                }
            }
        }

        warn!(max_iterations = self.max_iterations, "Workflow hit iteration limit");
        Err(FlowError::IterationLimit(self.max_iterations))
    }

    /// Leave the run; the last run out cleans the agents up.
    ///
    /// The lock is held through cleanup so a run starting meanwhile waits
    /// for it instead of using agents that are being released.
    async fn release_agents(&self) {
        let mut active = self.active_runs.lock().await;
        *active = active.saturating_sub(1);
        if *active > 0 {
            debug!(active = *active, "Other runs in flight, deferring agent cleanup");
            return;
        }
        self.cleanup_agents().await;
    }

    /// Call each distinct agent's cleanup hook once.
    async fn cleanup_agents(&self) {
        let mut seen: Vec<usize> = Vec::new();
        for reg in &self.registrations {
            let ptr = Arc::as_ptr(&reg.agent) as *const () as usize;
            if seen.contains(&ptr) {
                continue;
            }
            seen.push(ptr);
            reg.agent.cleanup().await;
        }
    }

    fn finish(
        &self,
        result: &mut WorkflowResult,
        trace: &RunTrace,
        start: Instant,
        outcome: Result<Payload>,
    ) {
        let workflow_id = result.workflow_id.clone();
        match outcome {
            Ok(value) => {
                self.settle(result, WorkflowState::Completed);
                result.result = Some(value);
                info!(workflow_id = %workflow_id, iterations = trace.iterations, "Workflow completed");
                self.publish(WorkflowEvent::Completed {
                    workflow_id,
                    iterations: trace.iterations,
                });
            }
            Err(FlowError::Cancelled) => {
                self.settle(result, WorkflowState::Cancelled);
                result.result = trace.last.clone();
                result.error = Some(FlowError::Cancelled.to_string());
                info!(workflow_id = %workflow_id, "Workflow cancelled");
                self.publish(WorkflowEvent::Cancelled { workflow_id });
            }
            Err(e) => {
                self.settle(result, WorkflowState::Failed);
                result.result = trace.last.clone();
                result.error = Some(e.to_string());
                error!(workflow_id = %workflow_id, error = %e, "Workflow failed");
                self.publish(WorkflowEvent::Failed {
                    workflow_id,
                    error: e.to_string(),
                });
            }
        }

        result.path = trace.path.clone();
        result.end_time = Some(Utc::now());
        let m = &mut result.metrics;
        m.insert("iterations".into(), json!(trace.iterations));
        m.insert("duration_ms".into(), json!(start.elapsed().as_millis() as u64));
        m.insert("agent_invocations".into(), json!(trace.path.len()));
        m.insert("agent_durations_ms".into(), json!(trace.agent_durations_ms));
        m.insert("recovered_errors".into(), json!(trace.recovered_errors));
        m.insert("path".into(), json!(trace.path));
    }

    fn settle(&self, result: &mut WorkflowResult, to: WorkflowState) {
        if let Err(e) = result.state.transition(to) {
            error!(error = %e, "Illegal workflow state transition");
        }
    }
}
