//! Circuit breaker for remote agent calls
//!
//! Closed: calls pass through. Open: calls are rejected until the recovery
//! timeout elapses. HalfOpen: one probe call at a time passes; enough
//! successes close the circuit, any failure reopens it.

use super::{AgentTransport, RemoteReply};
use crate::config::CircuitBreakerConfig;
use crate::error::{CoordinatorError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
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

/// Breaker for one endpoint
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_at: None,
            probe_in_flight: false,
        }
    }

    /// Current state, promoting Open to HalfOpen once the recovery timeout passed
    pub fn state(&mut self) -> CircuitState {
        if self.state == CircuitState::Open {
            let elapsed = self.opened_at.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
            if elapsed >= self.config.recovery_timeout() {
                self.transition(CircuitState::HalfOpen, "recovery timeout elapsed");
            }
        }
        self.state
    }

    /// Whether a call may go through now. While half-open only one probe is
    /// admitted until it is recorded or released.
    pub fn allow(&mut self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen if self.probe_in_flight => false,
            CircuitState::HalfOpen => {
                self.probe_in_flight = true;
                true
            }
        }
    }

    /// Give back an admitted probe whose call never completed
    pub fn release_probe(&mut self) {
        self.probe_in_flight = false;
    }

    pub fn record_success(&mut self) {
        self.probe_in_flight = false;
        self.consecutive_failures = 0;
        if self.state == CircuitState::HalfOpen {
            self.consecutive_successes += 1;
            if self.consecutive_successes >= self.config.success_threshold {
                self.transition(CircuitState::Closed, "probe calls succeeded");
            }
        }
    }

    pub fn record_failure(&mut self) {
        self.probe_in_flight = false;
        self.consecutive_successes = 0;
        self.consecutive_failures += 1;
        match self.state {
            CircuitState::HalfOpen => self.transition(CircuitState::Open, "probe call failed"),
            CircuitState::Closed if self.consecutive_failures >= self.config.failure_threshold => {
                self.transition(CircuitState::Open, "failure threshold reached")
            }
            _ => {}
        }
    }

    fn transition(&mut self, to: CircuitState, reason: &str) {
        if self.state == to {
            return;
        }
        match to {
            CircuitState::Open => {
                warn!("Circuit breaker '{}' {} -> {} ({})", self.name, self.state, to, reason);
                self.opened_at = Some(Instant::now());
            }
            _ => info!("Circuit breaker '{}' {} -> {} ({})", self.name, self.state, to, reason),
        }
        self.state = to;
        self.probe_in_flight = false;
        if to != CircuitState::HalfOpen {
            self.consecutive_successes = 0;
        }
        if to == CircuitState::Closed {
            self.consecutive_failures = 0;
            self.opened_at = None;
        }
    }
}

/// Transport wrapper adding a timeout and a per-endpoint circuit breaker
pub struct GuardedTransport {
    inner: Arc<dyn AgentTransport>,
    timeout: Duration,
    config: CircuitBreakerConfig,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
}

impl GuardedTransport {
    pub fn new(inner: Arc<dyn AgentTransport>, timeout: Duration, config: CircuitBreakerConfig) -> Self {
        Self {
            inner,
            timeout,
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// State of the breaker guarding an endpoint
    pub fn circuit_state(&self, endpoint: &str) -> CircuitState {
        let mut breakers = self.lock_breakers();
        breakers
            .get_mut(endpoint)
            .map(|b| b.state())
            .unwrap_or(CircuitState::Closed)
    }

    fn lock_breakers(&self) -> std::sync::MutexGuard<'_, HashMap<String, CircuitBreaker>> {
        // A poisoned map only means a panic elsewhere; the counters are still usable
        self.breakers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_breaker<R>(&self, endpoint: &str, f: impl FnOnce(&mut CircuitBreaker) -> R) -> R {
        let mut breakers = self.lock_breakers();
        let breaker = breakers
            .entry(endpoint.to_string())
            .or_insert_with(|| CircuitBreaker::new(endpoint, self.config.clone()));
        f(breaker)
    }
}

/// Releases an admitted probe if the call is dropped before its outcome is recorded
struct PendingCall<'a> {
    transport: &'a GuardedTransport,
    endpoint: &'a str,
    settled: bool,
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.transport.with_breaker(self.endpoint, |b| b.release_probe());
        }
    }
}

#[async_trait::async_trait]
impl AgentTransport for GuardedTransport {
    async fn call(&self, agent_id: &str, endpoint: &str, payload: serde_json::Value) -> Result<RemoteReply> {
        let (allowed, state) = self.with_breaker(endpoint, |b| (b.allow(), b.state()));
        if !allowed {
            return Err(CoordinatorError::delivery(
                agent_id,
                format!("circuit {} for {}, try again later", state, endpoint),
            ));
        }
        let mut pending = PendingCall {
            transport: self,
            endpoint,
            settled: false,
        };

        let result = match tokio::time::timeout(self.timeout, self.inner.call(agent_id, endpoint, payload)).await {
            Ok(result) => result,
            Err(_) => Err(CoordinatorError::delivery(
                agent_id,
                format!("no response within {:?}", self.timeout),
            )),
        };

        self.with_breaker(endpoint, |b| match &result {
            Ok(_) => b.record_success(),
            Err(_) => b.record_failure(),
        });
        pending.settled = true;

        result
    }
}
