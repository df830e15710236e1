//! Circuit Breaker
//!
//! Failure-threshold breaker guarding calls to one external dependency.
//!
//! ```text
//! CLOSED ──(max_failures)──> OPEN ──(reset_timeout)──> HALF_OPEN ──┬──> CLOSED (success)
//!                             ▲                                    │
//!                             └────────────(failure)───────────────┘
//! ```
//!
//! All state lives behind one mutex per breaker.

pub mod registry;

pub use registry::{BreakerRegistry, FEATURE_SERVICE};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_MAX_FAILURES: u32 = 5;
pub const DEFAULT_RESET_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_HALF_OPEN_MAX: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit
    pub max_failures: u32,
    /// Time after the last failure before a trial call is let through
    pub reset_timeout_ms: u64,
    /// Trial calls permitted while half-open
    pub half_open_max: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: DEFAULT_MAX_FAILURES,
            reset_timeout_ms: DEFAULT_RESET_TIMEOUT_MS,
            half_open_max: DEFAULT_HALF_OPEN_MAX,
        }
    }
}

impl BreakerConfig {
    /// Zero values fall back to the defaults
    fn normalized(mut self) -> Self {
        if self.max_failures == 0 {
            self.max_failures = DEFAULT_MAX_FAILURES;
        }
        if self.reset_timeout_ms == 0 {
            self.reset_timeout_ms = DEFAULT_RESET_TIMEOUT_MS;
        }
        if self.half_open_max == 0 {
            self.half_open_max = DEFAULT_HALF_OPEN_MAX;
        }
        self
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BreakerError<E> {
    #[error("Circuit breaker '{name}' is open")]
    CircuitOpen { name: String },

    #[error(transparent)]
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn code(&self) -> &'static str {
        match self {
            BreakerError::CircuitOpen { .. } => "CIRCUIT_OPEN",
            BreakerError::Inner(_) => "UPSTREAM_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            BreakerError::CircuitOpen { .. } => 503,
            BreakerError::Inner(_) => 502,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failures: u32,
    last_failure: Option<Instant>,
    half_open_calls: u32,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config: config.normalized(),
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: 0,
                last_failure: None,
                half_open_calls: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn failures(&self) -> u32 {
        self.inner.lock().failures
    }

    /// Whether a call may proceed now.
    ///
    /// The call that moves an open breaker to half-open is the first trial.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let elapsed = inner
                    .last_failure
                    .is_none_or(|at| at.elapsed() >= self.config.reset_timeout());
                if !elapsed {
                    return false;
                }
                inner.state = BreakerState::HalfOpen;
                inner.half_open_calls = 1;
                info!(breaker = %self.name, "Circuit half-open, allowing trial call");
                true
            }
            BreakerState::HalfOpen => {
                if inner.half_open_calls < self.config.half_open_max {
                    inner.half_open_calls += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state == BreakerState::HalfOpen {
            inner.state = BreakerState::Closed;
            inner.half_open_calls = 0;
            info!(breaker = %self.name, "Circuit closed");
        }
        inner.failures = 0;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failures += 1;
        inner.last_failure = Some(Instant::now());
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.half_open_calls = 0;
                warn!(breaker = %self.name, "Trial call failed, circuit re-opened");
            }
            BreakerState::Closed if inner.failures >= self.config.max_failures => {
                inner.state = BreakerState::Open;
                warn!(
                    breaker = %self.name,
                    failures = inner.failures,
                    "Circuit opened"
                );
            }
            _ => {}
        }
    }
}

/// Run `fut` through the breaker, counting every `Err` as a failure
pub async fn guard<T, E, F>(breaker: &CircuitBreaker, fut: F) -> Result<T, BreakerError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    guard_with(breaker, fut, |_| true).await
}

/// Like [`guard`], but only errors for which `is_failure` holds trip the breaker
pub async fn guard_with<T, E, F>(
    breaker: &CircuitBreaker,
    fut: F,
    is_failure: impl Fn(&E) -> bool,
) -> Result<T, BreakerError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    if !breaker.allow() {
        return Err(BreakerError::CircuitOpen {
            name: breaker.name().to_string(),
        });
    }
    match fut.await {
        Ok(v) => {
            breaker.record_success();
            Ok(v)
        }
        Err(e) => {
            if is_failure(&e) {
                breaker.record_failure();
            } else {
                breaker.record_success();
            }
            Err(BreakerError::Inner(e))
        }
    }
}
