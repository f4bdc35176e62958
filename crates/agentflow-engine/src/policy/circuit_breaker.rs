//! Circuit breaker that stops calling an agent which keeps failing.
//!
//! Transitions:
//! - Closed: failures are counted; reaching `failure_threshold` opens the circuit.
//! - Open: calls are rejected with `FlowError::CircuitOpen` without running the
//!   work, until `recovery_timeout` has elapsed since the last failure.
//! - Half-open: trial calls run; `half_open_requests` successes close the
//!   circuit, any failure opens it again.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use agentflow_core::config::CircuitBreakerConfig;
use agentflow_core::error::{FlowError, Result};
use agentflow_core::types::Payload;

use super::{ErrorPolicy, Work};

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    half_open_successes: u32,
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                half_open_successes: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.config.recovery_timeout_ms)
    }

    /// Current state, without applying the open → half-open timeout.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Decide whether a call may proceed, moving open → half-open once the
    /// recovery timeout has elapsed.
    fn admit(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.state != CircuitState::Open {
            return Ok(());
        }

        let elapsed = inner
            .last_failure
            .map(|t| t.elapsed())
            .unwrap_or(Duration::MAX);
        let timeout = self.recovery_timeout();
        if elapsed >= timeout {
            info!("Circuit breaker half-open, allowing trial requests");
            inner.state = CircuitState::HalfOpen;
            inner.half_open_successes = 0;
            Ok(())
        } else {
            let retry_after_ms = (timeout - elapsed).as_millis() as u64;
            debug!(retry_after_ms, "Circuit open, rejecting call");
            Err(FlowError::CircuitOpen { retry_after_ms })
        }
    }

    fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.half_open_requests {
                    info!(
                        successes = inner.half_open_successes,
                        "Circuit breaker closing after successful recovery"
                    );
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.half_open_successes = 0;
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.lock();
        inner.last_failure = Some(Instant::now());
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    warn!(
                        failures = inner.failure_count,
                        "Circuit breaker opening due to failures"
                    );
                    inner.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                warn!("Circuit breaker re-opening after half-open failure");
                inner.state = CircuitState::Open;
                inner.half_open_successes = 0;
            }
            CircuitState::Open => {}
        }
    }
}

impl ErrorPolicy for CircuitBreaker {
    fn name(&self) -> &'static str {
        "circuit_breaker"
    }

    fn execute<'a>(&'a self, work: Work<'a>) -> BoxFuture<'a, Result<Payload>> {
        Box::pin(async move {
            self.admit()?;
            let result = work().await;
            match &result {
                Ok(_) => self.record_success(),
                Err(_) => self.record_failure(),
            }
            result
        })
    }

    fn should_fail_workflow(&self) -> bool {
        self.state() == CircuitState::Open
    }
}
