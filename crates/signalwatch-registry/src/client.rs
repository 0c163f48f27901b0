//! Rate-governed registry client.
//!
//! Every request passes through three gates in order: the circuit breaker,
//! the sliding-window budget (one slot per attempt) and a bounded timeout.
//! 429, 5xx, transport errors and timeouts are retried with exponential
//! backoff plus jitter; `Retry-After` hints are honoured.

use crate::budget::{RateBudget, RateBudgetSnapshot, RateStatus};
use crate::circuit::CircuitBreaker;
use crate::error::{RegistryError, Result};
use crate::transport::{ApiRequest, ApiResponse, Endpoint, HttpTransport, RegistryTransport};
use rand::Rng;
use signalwatch_core::{AppConfig, CircuitConfig, RetryConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Backoff multiplier applied to 429 responses that carry no `Retry-After`.
const RATE_LIMIT_BACKOFF_MULTIPLIER: u32 = 3;

/// Whether a caller waits for budget or gets a wait hint back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Sleep until a slot frees up
    #[default]
    Blocking,
    /// Fail with [`RegistryError::RateLimitExceeded`] when the window is full
    NonBlocking,
}

/// Registry client enforcing the call budget, retry policy and circuit breaker.
pub struct RateLimitedClient {
    transport: Arc<dyn RegistryTransport>,
    budget: Mutex<RateBudget>,
    circuit: Mutex<CircuitBreaker>,
    retry: RetryConfig,
    call_timeout: Duration,
}

impl RateLimitedClient {
    /// Create a client over an arbitrary transport.
    #[must_use]
    pub fn new(
        transport: Arc<dyn RegistryTransport>,
        budget: RateBudget,
        retry: RetryConfig,
        circuit: &CircuitConfig,
        call_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            budget: Mutex::new(budget),
            circuit: Mutex::new(CircuitBreaker::new(circuit)),
            retry,
            call_timeout,
        }
    }

    /// Create a client over the given transport using budget, retry and
    /// circuit settings from the application config.
    #[must_use]
    pub fn with_transport(transport: Arc<dyn RegistryTransport>, config: &AppConfig) -> Self {
        let budget = RateBudget::new(
            config.scan.rate_limit_cap,
            Duration::from_secs(config.scan.rate_limit_window_seconds),
        );
        Self::new(
            transport,
            budget,
            config.retry.clone(),
            &config.circuit,
            Duration::from_secs(config.registry.timeout_secs),
        )
    }

    /// Create an HTTP client from the application config.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config.registry, config.scan.api_key.clone())?;
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    /// Issue a blocking GET with no parameters.
    pub async fn get(&self, endpoint: Endpoint) -> Result<ApiResponse> {
        self.request(&ApiRequest::new(endpoint), RequestMode::Blocking)
            .await
    }

    /// Issue a request.
    ///
    /// # Errors
    /// - [`RegistryError::RateLimitExceeded`] when non-blocking and the window is full
    /// - [`RegistryError::Network`] after retries are exhausted or while the circuit is open
    /// - [`RegistryError::Auth`] / [`RegistryError::NotFound`] / [`RegistryError::Http`]
    ///   immediately, without retry
    pub async fn request(&self, request: &ApiRequest, mode: RequestMode) -> Result<ApiResponse> {
        if let Err(wait) = self.circuit.lock().await.check(Instant::now()) {
            return Err(RegistryError::Network(format!(
                "circuit open, failing fast for another {wait:?}"
            )));
        }

        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..max_attempts {
            self.acquire(mode).await?;

            let outcome = match tokio::time::timeout(
                self.call_timeout,
                self.transport.send(request),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(RegistryError::Network(format!(
                    "request to {} timed out after {:?}",
                    request.endpoint, self.call_timeout
                ))),
            };

            let (error, hint) = match outcome {
                Ok(response) if response.is_success() => {
                    self.circuit.lock().await.record_success();
                    return Ok(response);
                }
                Ok(response) => match Self::classify(&request.endpoint, &response) {
                    Retry::Transient(error) => (error, response.retry_after),
                    Retry::Throttled(error) => (
                        error,
                        Some(response.retry_after.unwrap_or_else(|| {
                            self.backoff_delay(attempt) * RATE_LIMIT_BACKOFF_MULTIPLIER
                        })),
                    ),
                    Retry::Never(error) => {
                        self.circuit.lock().await.record_success();
                        return Err(error);
                    }
                },
                Err(error) if error.is_retryable() => (error, None),
                Err(error) => return Err(error),
            };

            if attempt + 1 < max_attempts {
                let delay = hint.map_or_else(
                    || self.backoff_delay(attempt),
                    |hint| hint.max(self.backoff_delay(attempt)),
                );
                tracing::warn!(
                    endpoint = %request.endpoint,
                    attempt = attempt + 1,
                    max_attempts,
                    delay = ?delay,
                    error = %error,
                    "registry call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            } else {
                tracing::warn!(
                    endpoint = %request.endpoint,
                    attempt = attempt + 1,
                    max_attempts,
                    error = %error,
                    "registry call failed, retries exhausted"
                );
            }
            last_error = Some(error);
        }

        self.circuit.lock().await.record_failure(Instant::now());
        Err(last_error.unwrap_or_else(|| {
            RegistryError::Network(format!("request to {} failed", request.endpoint))
        }))
    }

    /// Take one slot from the budget, waiting if allowed.
    async fn acquire(&self, mode: RequestMode) -> Result<()> {
        loop {
            let wait = {
                let mut budget = self.budget.lock().await;
                match budget.try_acquire(Instant::now()) {
                    Ok(()) => return Ok(()),
                    Err(wait) => wait,
                }
            };

            if mode == RequestMode::NonBlocking {
                return Err(RegistryError::RateLimitExceeded { retry_after: wait });
            }

            tracing::debug!(wait = ?wait, "rate budget exhausted, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    fn classify(endpoint: &Endpoint, response: &ApiResponse) -> Retry {
        match response.status {
            401 | 403 => Retry::Never(RegistryError::Auth(format!(
                "status {} for {endpoint}",
                response.status
            ))),
            404 => Retry::Never(RegistryError::NotFound(endpoint.to_string())),
            429 => Retry::Throttled(RegistryError::Network(format!(
                "throttled by registry (429) for {endpoint}"
            ))),
            500..=599 => Retry::Transient(RegistryError::Network(format!(
                "status {} for {endpoint}",
                response.status
            ))),
            status => Retry::Never(RegistryError::Http {
                status,
                message: response.excerpt(),
            }),
        }
    }

    /// Exponential backoff for the given zero-based attempt, plus jitter.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .retry
            .base_delay_ms
            .saturating_mul(1_u64 << attempt.min(16))
            .min(self.retry.max_delay_ms);
        let jitter = if self.retry.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.retry.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(exponential + jitter)
    }

    /// Calls still allowed in the current window.
    pub async fn headroom(&self) -> usize {
        self.budget.lock().await.remaining(Instant::now())
    }

    /// Time left before an open circuit lets a trial call through.
    pub async fn circuit_wait(&self) -> Option<Duration> {
        self.circuit.lock().await.remaining(Instant::now())
    }

    /// Current budget status.
    pub async fn rate_status(&self) -> RateStatus {
        self.budget.lock().await.status(Instant::now())
    }

    /// Persistable snapshot of the budget.
    pub async fn budget_snapshot(&self) -> RateBudgetSnapshot {
        self.budget.lock().await.snapshot(Instant::now())
    }

    /// Re-seed the budget from a snapshot.
    pub async fn restore_budget(&self, snapshot: &RateBudgetSnapshot) {
        self.budget.lock().await.restore(snapshot, Instant::now());
    }
}

enum Retry {
    Transient(RegistryError),
    Throttled(RegistryError),
    Never(RegistryError),
}
