// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Retry and circuit-breaker primitives shared by every coordination
//! component that talks to something fallible.
//!
//! - [`RetryPolicy`] + [`retry_with_backoff`]: re-run an operation while it
//!   fails with a [`Transient`] fault, sleeping `initial * multiplier^n`
//!   (capped) between attempts. Permanent faults return immediately.
//! - [`CircuitBreaker`]: Closed → Open after N consecutive failures, Open →
//!   HalfOpen once the reset timeout elapses, HalfOpen admits one trial call.

use std::fmt::Display;
use std::future::Future;
use std::io;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::config::ResilienceConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&ResilienceConfig::default())
    }
}

impl From<&ResilienceConfig> for RetryPolicy {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            multiplier: config.multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep after the `failures`-th consecutive failure (1-based).
    pub fn delay_after(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1) as i32;
        let millis = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }
}

/// Classifies a failure as worth retrying.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// I/O kinds produced by flaky or network-synced filesystems.
pub fn is_transient_io_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ResourceBusy
            | io::ErrorKind::StaleNetworkFileHandle
    )
}

impl Transient for io::Error {
    fn is_transient(&self) -> bool {
        is_transient_io_kind(self.kind())
    }
}

/// Run `operation` under `policy`, retrying transient failures.
///
/// Returns the last error once `max_attempts` is exhausted.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    let mut failures = 0u32;
    loop {
        match operation().await {
            Ok(value) => {
                if failures > 0 {
                    debug!(operation = operation_name, failures, "Operation recovered after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() && failures + 1 < policy.max_attempts => {
                failures += 1;
                let delay = policy.delay_after(failures);
                warn!(
                    operation = operation_name,
                    attempt = failures,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Requests flow normally
    Closed,
    /// Requests are rejected
    Open,
    /// One trial request decides whether to close again
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self::new(
            config.breaker_failure_threshold,
            Duration::from_secs(config.breaker_reset_timeout_secs),
        )
    }

    /// Current state, promoting Open to HalfOpen once the timeout has passed.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        inner.state
    }

    /// Whether a call may proceed now. In HalfOpen only one caller is let through.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            debug!("Circuit breaker closing after successful trial");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        let reopen = inner.state == CircuitState::HalfOpen
            || inner.consecutive_failures >= self.failure_threshold;
        if reopen {
            if inner.state != CircuitState::Open {
                warn!(
                    failures = inner.consecutive_failures,
                    reset_timeout_ms = self.reset_timeout.as_millis() as u64,
                    "Circuit breaker opened"
                );
            }
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
        inner.trial_in_flight = false;
    }

    fn refresh(&self, inner: &mut BreakerState) {
        if inner.state == CircuitState::Open {
            let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
            if elapsed >= self.reset_timeout {
                inner.state = CircuitState::HalfOpen;
                inner.trial_in_flight = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_millis(300),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(300));
        assert_eq!(policy.delay_after(4), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, io::Error> = retry_with_backoff(&fast_policy(3), "flaky", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(io::Error::new(io::ErrorKind::TimedOut, "slow disk"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<(), io::Error> = retry_with_backoff(&fast_policy(5), "perm", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(io::Error::new(io::ErrorKind::PermissionDenied, "nope")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<(), io::Error> = retry_with_backoff(&fast_policy(3), "down", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")) }
        })
        .await;

        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_breaker_opens_after_threshold() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        assert!(breaker.allow_request());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn test_breaker_half_open_trial() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        assert!(breaker.allow_request());
        assert!(!breaker.allow_request(), "only one trial in half-open");

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_breaker_reopens_on_failed_trial() {
        let breaker = CircuitBreaker::new(3, Duration::from_millis(20));
        for _ in 0..3 {
            breaker.record_failure();
        }
        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.allow_request());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
