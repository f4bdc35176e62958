use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{Payload, TypeTag, WorkflowEvent};

/// A unit of work with declared input and output types.
pub trait Agent: Send + Sync + 'static {
    /// Identifier; used as the instance id unless the registration overrides it.
    fn id(&self) -> &str;

    /// Type tag this agent accepts.
    fn input_type(&self) -> TypeTag;

    /// Type tag this agent produces.
    fn output_type(&self) -> TypeTag;

    /// Capability tags for coarse selection.
    fn capabilities(&self) -> Vec<String> {
        vec![]
    }

    /// Process one input.
    fn process(&self, input: Payload) -> BoxFuture<'_, Result<Payload>>;

    /// Release resources at workflow teardown.
    fn cleanup(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

/// Carries progress events out of the engine.
///
/// Implementations must not block; the engine treats publishing as
/// fire-and-forget and only logs failures.
pub trait Transport: Send + Sync + 'static {
    fn publish(&self, topic: &str, event: WorkflowEvent) -> Result<()>;
}

/// May redirect the workflow before an agent runs.
pub trait InterventionHook: Send + Sync + 'static {
    /// Return `Some(agent_id)` to jump to that agent instead of `current_agent`.
    fn redirect(
        &self,
        workflow_id: &str,
        current_agent: &str,
        data: &Payload,
    ) -> BoxFuture<'_, Option<String>>;
}
