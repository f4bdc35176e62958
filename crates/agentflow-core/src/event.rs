use crate::error::Result;
use crate::traits::Transport;
use crate::types::WorkflowEvent;

/// An event together with the topic it was published under.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub topic: String,
    pub event: WorkflowEvent,
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<Envelope>,
}

impl EventBus {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, topic: impl Into<String>, event: WorkflowEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(Envelope {
            topic: topic.into(),
            event,
        });
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Transport for EventBus {
    fn publish(&self, topic: &str, event: WorkflowEvent) -> Result<()> {
        EventBus::publish(self, topic, event);
        Ok(())
    }
}
