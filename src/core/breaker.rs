use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

/// State of a single circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation, calls pass through.
    Closed,
    /// Failing fast, calls are rejected until the cooldown elapses.
    Open,
    /// Cooldown elapsed, a single probe call is allowed through.
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

#[derive(Debug, Error)]
#[error("'{name}' is temporarily unavailable (circuit open, retry in {retry_in:?})")]
pub struct BreakerOpen {
    pub name: &'static str,
    pub retry_in: Duration,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    total_successes: u64,
    total_failures: u64,
}

/// Counters snapshot used by the health endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BreakerStats {
    pub state: String,
    pub consecutive_failures: u32,
    pub total_successes: u64,
    pub total_failures: u64,
}

/// Failure-count circuit breaker guarding one class of downstream calls.
///
/// After `failure_threshold` consecutive failures the breaker opens and
/// `check()` rejects callers for `cooldown`. The first caller after the
/// cooldown gets a half-open probe; its outcome decides whether the breaker
/// closes again or re-opens.
pub struct CircuitBreaker {
    name: &'static str,
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            name,
            failure_threshold: failure_threshold.max(1),
            cooldown,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                last_failure: None,
                total_successes: 0,
                total_failures: 0,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Gate a call. `Ok(())` means the caller may proceed and must report the
    /// outcome via `record_success` / `record_failure`.
    pub fn check(&self) -> Result<(), BreakerOpen> {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|t| t.elapsed())
                    .unwrap_or(self.cooldown);
                if elapsed >= self.cooldown {
                    info!("circuit '{}' half-open, allowing probe", self.name);
                    inner.state = BreakerState::HalfOpen;
                    Ok(())
                } else {
                    Err(BreakerOpen {
                        name: self.name,
                        retry_in: self.cooldown - elapsed,
                    })
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.total_successes += 1;
        inner.consecutive_failures = 0;
        if inner.state != BreakerState::Closed {
            info!("circuit '{}' closed after successful call", self.name);
            inner.state = BreakerState::Closed;
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.total_failures += 1;
        inner.consecutive_failures += 1;
        inner.last_failure = Some(Instant::now());
        match inner.state {
            BreakerState::HalfOpen => {
                warn!("circuit '{}' probe failed, re-opening", self.name);
                inner.state = BreakerState::Open;
            }
            BreakerState::Closed if inner.consecutive_failures >= self.failure_threshold => {
                warn!(
                    "circuit '{}' open after {} consecutive failures",
                    self.name, inner.consecutive_failures
                );
                inner.state = BreakerState::Open;
            }
            _ => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().expect("breaker lock poisoned").state
    }

    pub fn stats(&self) -> BreakerStats {
        let inner = self.inner.lock().expect("breaker lock poisoned");
        BreakerStats {
            state: inner.state.as_str().to_string(),
            consecutive_failures: inner.consecutive_failures,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
        }
    }

    /// Run `fut` under the breaker, recording the outcome.
    pub async fn guard<T, F>(&self, fut: F) -> anyhow::Result<T>
    where
        F: std::future::Future<Output = anyhow::Result<T>>,
    {
        self.check()?;
        match fut.await {
            Ok(v) => {
                self.record_success();
                Ok(v)
            }
            Err(e) => {
                self.record_failure();
                Err(e)
            }
        }
    }
}

/// One breaker per downstream operation class, constructed once at startup
/// and shared by reference through `AppState`.
pub struct ServiceBreakers {
    pub read: CircuitBreaker,
    pub write: CircuitBreaker,
    pub auth: CircuitBreaker,
    pub search: CircuitBreaker,
}

impl ServiceBreakers {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            read: CircuitBreaker::new("store_read", failure_threshold * 2, cooldown),
            write: CircuitBreaker::new("store_write", failure_threshold, cooldown * 2),
            auth: CircuitBreaker::new("auth", failure_threshold, cooldown),
            search: CircuitBreaker::new("web_search", failure_threshold, cooldown),
        }
    }
}
