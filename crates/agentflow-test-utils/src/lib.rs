//! Scripted agents, transports and fixtures shared by agentflow tests.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;

use agentflow_core::error::{FlowError, Result};
use agentflow_core::traits::{Agent, Transport};
use agentflow_core::types::{Payload, TypeTag, WorkflowEvent};

/// Shared call and cleanup counters, readable after the agent moved into an engine.
#[derive(Debug, Clone, Default)]
pub struct Counters {
    calls: Arc<AtomicUsize>,
    cleanups: Arc<AtomicUsize>,
}

impl Counters {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn cleanups(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }
}

/// Fails a fixed number of times, then passes the body through retagged.
pub struct FlakyAgent {
    id: String,
    input: TypeTag,
    output: TypeTag,
    failures: usize,
    counters: Counters,
}

impl FlakyAgent {
    pub fn new(
        id: impl Into<String>,
        input: impl Into<TypeTag>,
        output: impl Into<TypeTag>,
        failures: usize,
    ) -> Self {
        Self {
            id: id.into(),
            input: input.into(),
            output: output.into(),
            failures,
            counters: Counters::default(),
        }
    }

    pub fn counters(&self) -> Counters {
        self.counters.clone()
    }
}

impl Agent for FlakyAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_type(&self) -> TypeTag {
        self.input.clone()
    }

    fn output_type(&self) -> TypeTag {
        self.output.clone()
    }

    fn process(&self, input: Payload) -> BoxFuture<'_, Result<Payload>> {
        Box::pin(async move {
            let n = self.counters.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(FlowError::agent(&self.id, format!("scripted failure {}", n + 1)));
            }
            Ok(Payload::new(self.output.clone(), input.body))
        })
    }

    fn cleanup(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.counters.cleanups.fetch_add(1, Ordering::SeqCst);
        })
    }
}

/// Fails on every call with the given message.
pub struct AlwaysFails {
    id: String,
    input: TypeTag,
    message: String,
    counters: Counters,
}

impl AlwaysFails {
    pub fn new(id: impl Into<String>, input: impl Into<TypeTag>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            input: input.into(),
            message: message.into(),
            counters: Counters::default(),
        }
    }

    pub fn counters(&self) -> Counters {
        self.counters.clone()
    }
}

impl Agent for AlwaysFails {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_type(&self) -> TypeTag {
        self.input.clone()
    }

    fn output_type(&self) -> TypeTag {
        self.input.clone()
    }

    fn process(&self, _input: Payload) -> BoxFuture<'_, Result<Payload>> {
        Box::pin(async move {
            self.counters.calls.fetch_add(1, Ordering::SeqCst);
            Err(FlowError::agent(&self.id, self.message.clone()))
        })
    }

    fn cleanup(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.counters.cleanups.fetch_add(1, Ordering::SeqCst);
        })
    }
}

/// Passes the body through under a new tag, optionally after a delay.
pub struct EchoAgent {
    id: String,
    input: TypeTag,
    output: TypeTag,
    delay: Option<Duration>,
    counters: Counters,
}

impl EchoAgent {
    pub fn new(id: impl Into<String>, input: impl Into<TypeTag>, output: impl Into<TypeTag>) -> Self {
        Self {
            id: id.into(),
            input: input.into(),
            output: output.into(),
            delay: None,
            counters: Counters::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn counters(&self) -> Counters {
        self.counters.clone()
    }
}

impl Agent for EchoAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_type(&self) -> TypeTag {
        self.input.clone()
    }

    fn output_type(&self) -> TypeTag {
        self.output.clone()
    }

    fn process(&self, input: Payload) -> BoxFuture<'_, Result<Payload>> {
        Box::pin(async move {
            self.counters.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(Payload::new(self.output.clone(), input.body))
        })
    }

    fn cleanup(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.counters.cleanups.fetch_add(1, Ordering::SeqCst);
        })
    }
}

/// Transport that records every published event.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    events: Mutex<Vec<(String, WorkflowEvent)>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, WorkflowEvent)> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Transport for RecordingTransport {
    fn publish(&self, topic: &str, event: WorkflowEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((topic.to_string(), event));
        Ok(())
    }
}

/// Transport whose every publish fails.
#[derive(Debug, Default)]
pub struct FailingTransport;

impl Transport for FailingTransport {
    fn publish(&self, _topic: &str, _event: WorkflowEvent) -> Result<()> {
        Err(FlowError::Config("transport unavailable".into()))
    }
}

/// Write a TOML config to a temp file that lives as long as the handle.
pub fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("create temp config");
    file.write_all(content.as_bytes()).expect("write temp config");
    file
}
