//! Circuit breaker middleware.
//!
//! After `failure_threshold` consecutive server-side failures the circuit
//! opens and calls fail fast with [`Error::CircuitOpen`] without touching the
//! network. Once `open_duration` has passed, calls are let through again
//! (half-open); `success_threshold` successes close the circuit, a single
//! failure reopens it.
//!
//! Only 5xx responses and transport failures count against the server.
//! Authentication errors and cancellations say nothing about its health and
//! are ignored.

use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tower::{Layer, Service};
use tracing::warn;

use super::ServiceFuture;
use crate::{Error, Request, Response, Result};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests are rejected immediately.
    Open,
    /// Trial requests are let through.
    HalfOpen,
}

/// Configuration for the circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before going half-open.
    pub open_duration: Duration,
    /// Successes needed to close the circuit from half-open.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

impl CircuitBreakerConfig {
    /// Set the failure threshold.
    #[must_use]
    pub const fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the open duration.
    #[must_use]
    pub const fn with_open_duration(mut self, duration: Duration) -> Self {
        self.open_duration = duration;
        self
    }

    /// Set the success threshold.
    #[must_use]
    pub const fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }
}

#[derive(Debug)]
struct Breaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
}

impl Breaker {
    fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            failures: 0,
            successes: 0,
            opened_at: None,
        }
    }

    fn admit(&mut self) -> bool {
        if self.state != CircuitState::Open {
            return true;
        }
        let cooled = self
            .opened_at
            .is_none_or(|at| at.elapsed() >= self.config.open_duration);
        if cooled {
            self.state = CircuitState::HalfOpen;
            self.successes = 0;
        }
        cooled
    }

    fn open(&mut self) {
        warn!(failures = self.failures, "circuit breaker opened");
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
    }

    fn record_success(&mut self) {
        match self.state {
            CircuitState::Closed => self.failures = 0,
            CircuitState::HalfOpen => {
                self.successes += 1;
                if self.successes >= self.config.success_threshold {
                    self.state = CircuitState::Closed;
                    self.failures = 0;
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&mut self) {
        match self.state {
            CircuitState::Closed => {
                self.failures += 1;
                if self.failures >= self.config.failure_threshold {
                    self.open();
                }
            }
            CircuitState::HalfOpen => self.open(),
            CircuitState::Open => {}
        }
    }
}

#[derive(Debug, Clone)]
struct Shared(Arc<Mutex<Breaker>>);

impl Shared {
    fn with<T>(&self, f: impl FnOnce(&mut Breaker) -> T) -> T {
        let mut breaker = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut breaker)
    }
}

/// Outcome classification: `Some(true)` healthy, `Some(false)` failure,
/// `None` not attributable to the server.
fn health(result: &Result<Response<Bytes>>) -> Option<bool> {
    match result {
        Ok(response) => Some(!response.is_server_error()),
        Err(err) if err.is_connection() || err.is_timeout() => Some(false),
        Err(_) => None,
    }
}

/// Layer that applies the circuit breaker pattern.
///
/// Every service built from one layer (or its clones) shares one breaker.
///
/// # Example
///
/// ```ignore
/// use rivet::middleware::{CircuitBreakerConfig, CircuitBreakerLayer};
/// use std::time::Duration;
///
/// let layer = CircuitBreakerLayer::new(
///     CircuitBreakerConfig::default()
///         .with_failure_threshold(3)
///         .with_open_duration(Duration::from_secs(60)),
/// );
/// ```
#[derive(Debug, Clone)]
pub struct CircuitBreakerLayer {
    shared: Shared,
}

impl CircuitBreakerLayer {
    /// Create a circuit breaker with the given configuration.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            shared: Shared(Arc::new(Mutex::new(Breaker::new(config)))),
        }
    }

    /// Current circuit state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.shared.with(|b| b.state)
    }
}

impl Default for CircuitBreakerLayer {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl<S> Layer<S> for CircuitBreakerLayer {
    type Service = CircuitBreaker<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CircuitBreaker {
            inner,
            shared: self.shared.clone(),
        }
    }
}

/// Service that applies the circuit breaker pattern.
#[derive(Debug, Clone)]
pub struct CircuitBreaker<S> {
    inner: S,
    shared: Shared,
}

impl<S> CircuitBreaker<S> {
    /// Current circuit state.
    #[must_use]
    pub fn circuit_state(&self) -> CircuitState {
        self.shared.with(|b| b.state)
    }
}

impl<S> Service<Request<Bytes>> for CircuitBreaker<S>
where
    S: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let shared = self.shared.clone();

        if !shared.with(Breaker::admit) {
            return Box::pin(async { Err(Error::CircuitOpen) });
        }

        let mut inner = self.inner.clone();
        Box::pin(async move {
            let result = inner.call(request).await;

            match health(&result) {
                Some(true) => shared.with(Breaker::record_success),
                Some(false) => shared.with(Breaker::record_failure),
                None => {}
            }

            result
        })
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};
    use tower::ServiceExt;

    use super::*;
    use crate::middleware::mock::{MockService, request, status};

    fn quick(threshold: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig::default()
            .with_failure_threshold(threshold)
            .with_open_duration(Duration::from_secs(60))
            .with_success_threshold(1)
    }

    #[test]
    fn config_default() {
        let config = CircuitBreakerConfig::default();
        check!(config.failure_threshold == 5);
        check!(config.open_duration == Duration::from_secs(30));
        check!(config.success_threshold == 2);
    }

    #[tokio::test]
    async fn success_stays_closed() {
        let mock = MockService::new(200);
        let mut service = CircuitBreakerLayer::new(quick(3)).layer(mock.clone());

        for _ in 0..5 {
            let result = service.ready().await.expect("ready").call(request()).await;
            check!(result.is_ok());
        }
        check!(service.circuit_state() == CircuitState::Closed);
        check!(mock.call_count() == 5);
    }

    #[tokio::test]
    async fn opens_after_transport_failures_and_fails_fast() {
        let mock = MockService::new(200).script((0..3).map(|_| Err(Error::connection("refused"))));
        let layer = CircuitBreakerLayer::new(quick(3));
        let mut service = layer.layer(mock.clone());

        for _ in 0..3 {
            let result = service.ready().await.expect("ready").call(request()).await;
            check!(result.is_err());
        }
        check!(layer.state() == CircuitState::Open);

        let result = service.ready().await.expect("ready").call(request()).await;
        let_assert!(Err(Error::CircuitOpen) = result);
        check!(mock.call_count() == 3);
    }

    #[tokio::test]
    async fn opens_on_5xx_responses() {
        let mock = MockService::new(500);
        let mut service = CircuitBreakerLayer::new(quick(2)).layer(mock);

        for _ in 0..2 {
            let result = service.ready().await.expect("ready").call(request()).await;
            check!(result.is_ok());
        }
        check!(service.circuit_state() == CircuitState::Open);
    }

    #[tokio::test]
    async fn auth_errors_do_not_count() {
        let mock = MockService::new(200).script(
            (0..5).map(|_| Err(Error::authentication("bearer", "token is empty"))),
        );
        let mut service = CircuitBreakerLayer::new(quick(2)).layer(mock);

        for _ in 0..5 {
            let _ = service.ready().await.expect("ready").call(request()).await;
        }
        check!(service.circuit_state() == CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_success_closes() {
        let mock = MockService::new(200).script([Ok(status(503))]);
        let mut service = CircuitBreakerLayer::new(quick(1)).layer(mock);

        let _ = service.ready().await.expect("ready").call(request()).await;
        check!(service.circuit_state() == CircuitState::Open);

        tokio::time::advance(Duration::from_secs(61)).await;

        let result = service.ready().await.expect("ready").call(request()).await;
        check!(result.expect("trial").status() == 200);
        check!(service.circuit_state() == CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failure_reopens() {
        let mock = MockService::new(502);
        let mut service = CircuitBreakerLayer::new(quick(1)).layer(mock.clone());

        let _ = service.ready().await.expect("ready").call(request()).await;
        tokio::time::advance(Duration::from_secs(61)).await;
        let _ = service.ready().await.expect("ready").call(request()).await;

        check!(service.circuit_state() == CircuitState::Open);
        check!(mock.call_count() == 2);
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let mock = MockService::new(200).script([
            Err(Error::Timeout),
            Ok(status(200)),
            Err(Error::Timeout),
            Ok(status(200)),
            Err(Error::Timeout),
        ]);
        let mut service = CircuitBreakerLayer::new(quick(2)).layer(mock);

        for _ in 0..5 {
            let _ = service.ready().await.expect("ready").call(request()).await;
            check!(service.circuit_state() == CircuitState::Closed);
        }
    }
}
