//! Circuit breaker for repeated registry failures.

use signalwatch_core::CircuitConfig;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    Closed { failures: u32 },
    Open { until: Instant },
    HalfOpen,
}

/// Opens after `failure_threshold` consecutive failed calls and fails fast
/// until the cool-down elapses; then a single trial call decides whether it
/// closes again.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    state: CircuitState,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    #[must_use]
    pub fn new(config: &CircuitConfig) -> Self {
        Self {
            threshold: config.failure_threshold.max(1),
            cooldown: Duration::from_secs(config.cooldown_secs),
            state: CircuitState::Closed { failures: 0 },
        }
    }

    /// Check whether a call may proceed.
    ///
    /// # Errors
    /// Returns the remaining cool-down while the circuit is open.
    pub fn check(&mut self, now: Instant) -> Result<(), Duration> {
        match self.state {
            CircuitState::Open { until } if now < until => Err(until - now),
            CircuitState::Open { .. } => {
                tracing::info!("circuit half-open, allowing trial call");
                self.state = CircuitState::HalfOpen;
                Ok(())
            }
            CircuitState::Closed { .. } | CircuitState::HalfOpen => Ok(()),
        }
    }

    /// Record a call the registry answered.
    pub fn record_success(&mut self) {
        if self.state == CircuitState::HalfOpen {
            tracing::info!("circuit closed");
        }
        self.state = CircuitState::Closed { failures: 0 };
    }

    /// Record a call that failed after all retries.
    pub fn record_failure(&mut self, now: Instant) {
        let failures = match self.state {
            CircuitState::Closed { failures } => failures + 1,
            CircuitState::HalfOpen | CircuitState::Open { .. } => self.threshold,
        };

        if failures >= self.threshold {
            tracing::warn!(cooldown = ?self.cooldown, "circuit opened");
            self.state = CircuitState::Open {
                until: now + self.cooldown,
            };
        } else {
            self.state = CircuitState::Closed { failures };
        }
    }

    /// Remaining cool-down while the circuit is open.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        match self.state {
            CircuitState::Open { until } if now < until => Some(until - now),
            _ => None,
        }
    }

    /// Whether calls are currently being rejected.
    #[must_use]
    pub fn is_open(&self, now: Instant) -> bool {
        self.remaining(now).is_some()
    }
}
