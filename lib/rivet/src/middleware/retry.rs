//! Retry-with-backoff middleware.
//!
//! Retries 500, 502, 503 and 504 responses and transient transport failures
//! (connection errors and timeouts). 429 is left to
//! [`RateLimitRecoveryLayer`](super::RateLimitRecoveryLayer), so this layer
//! never sees a `Retry-After` wait as its own.

use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use tower::{Layer, Service, ServiceExt};
use tracing::debug;

use super::ServiceFuture;
use crate::{Error, Request, Response, Result};

/// Exponential backoff with symmetric jitter.
///
/// The delay before retry `n` (0-based) is `min(base * 2^n, max)` scaled by a
/// random factor in `[1 - jitter, 1 + jitter]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Delay before the first retry.
    pub base: Duration,
    /// Upper bound before jitter.
    pub max: Duration,
    /// Relative jitter, clamped to `[0, 1]`; non-finite values mean none.
    pub jitter: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            max: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

impl Backoff {
    /// Backoff with the given base and cap and the default jitter.
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            ..Self::default()
        }
    }

    /// Set the relative jitter.
    #[must_use]
    pub const fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry `attempt` (0-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let capped = self
            .base
            .saturating_mul(2_u32.saturating_pow(attempt))
            .min(self.max);

        let jitter = if self.jitter.is_finite() {
            self.jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if jitter == 0.0 {
            return capped;
        }
        let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
        Duration::try_from_secs_f64(capped.as_secs_f64() * factor).unwrap_or(capped)
    }
}

/// Delay before retry `attempt` under the default [`Backoff`] (100 ms base,
/// 30 s cap, 25 % jitter).
#[must_use]
pub fn calculate_backoff(attempt: u32) -> Duration {
    Backoff::default().delay(attempt)
}

/// Statuses this layer retries.
#[must_use]
pub const fn is_retryable_status(status: u16) -> bool {
    matches!(status, 500 | 502 | 503 | 504)
}

fn is_retryable_error(error: &Error) -> bool {
    error.is_connection() || error.is_timeout()
}

/// Layer that retries transient failures.
///
/// # Example
///
/// ```ignore
/// use rivet::middleware::{Backoff, RetryLayer};
/// use std::time::Duration;
///
/// let layer = RetryLayer::new(3)
///     .with_backoff(Backoff::new(Duration::from_millis(200), Duration::from_secs(10)));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RetryLayer {
    max_retries: u32,
    backoff: Backoff,
}

impl RetryLayer {
    /// Allow up to `max_retries` retries after the first attempt.
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::default(),
        }
    }

    /// Use a custom backoff schedule.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = Retry<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Retry {
            inner,
            max_retries: self.max_retries,
            backoff: self.backoff,
        }
    }
}

/// Service that retries transient failures.
#[derive(Debug, Clone)]
pub struct Retry<S> {
    inner: S,
    max_retries: u32,
    backoff: Backoff,
}

impl<S> Service<Request<Bytes>> for Retry<S>
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
        let inner = self.inner.clone();
        let max_retries = self.max_retries;
        let backoff = self.backoff;

        Box::pin(async move {
            let context = request.context().clone();
            let mut attempt = 0_u32;

            loop {
                if let Some(err) = context.err() {
                    return Err(err);
                }

                let mut service = inner.clone();
                let result = service.ready().await?.call(request.clone()).await;
                let last = attempt >= max_retries;

                match result {
                    Ok(response) if !is_retryable_status(response.status()) || last => {
                        return Ok(response);
                    }
                    Ok(response) => {
                        debug!(
                            status = response.status(),
                            attempt = attempt + 1,
                            "retryable status, backing off"
                        );
                        drop(response);
                    }
                    Err(err) if !is_retryable_error(&err) => return Err(err),
                    Err(err) if last => {
                        return Err(if attempt == 0 {
                            err
                        } else {
                            Error::retries_exhausted(attempt + 1, err)
                        });
                    }
                    Err(err) => {
                        debug!(error = %err, attempt = attempt + 1, "transient error, backing off");
                    }
                }

                context.sleep(backoff.delay(attempt)).await?;
                attempt += 1;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::*;
    use crate::CallContext;
    use crate::middleware::mock::{MockService, request, status};

    fn fast() -> Backoff {
        Backoff::new(Duration::from_millis(1), Duration::from_millis(5))
    }

    #[test]
    fn backoff_stays_within_jitter_bounds() {
        for attempt in 0..=10 {
            let nominal = Duration::from_millis(100)
                .saturating_mul(2_u32.pow(attempt))
                .min(Duration::from_secs(30));
            let delay = calculate_backoff(attempt);
            check!(delay >= nominal.mul_f64(0.75), "attempt {attempt}: {delay:?}");
            check!(delay <= nominal.mul_f64(1.25), "attempt {attempt}: {delay:?}");
        }
    }

    #[test]
    fn backoff_is_capped() {
        let backoff = Backoff::default().with_jitter(0.0);
        check!(backoff.delay(40) == Duration::from_secs(30));
        check!(backoff.delay(0) == Duration::from_millis(100));
        check!(backoff.delay(3) == Duration::from_millis(800));
    }

    #[test]
    fn non_finite_jitter_is_ignored() {
        for jitter in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let backoff = Backoff::default().with_jitter(jitter);
            check!(backoff.delay(1) == Duration::from_millis(200));
        }
    }

    #[test]
    fn retryable_statuses() {
        for code in [500, 502, 503, 504] {
            check!(is_retryable_status(code));
        }
        for code in [200, 400, 401, 404, 429, 501] {
            check!(!is_retryable_status(code));
        }
    }

    #[tokio::test]
    async fn success_is_not_retried() {
        let mock = MockService::new(200);
        let mut service = RetryLayer::new(3).with_backoff(fast()).layer(mock.clone());

        let response = service.ready().await.expect("ready").call(request()).await;
        check!(response.expect("response").status() == 200);
        check!(mock.call_count() == 1);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        for code in [400, 404, 429] {
            let mock = MockService::new(code);
            let mut service = RetryLayer::new(3).with_backoff(fast()).layer(mock.clone());

            let response = service.ready().await.expect("ready").call(request()).await;
            check!(response.expect("response").status() == code);
            check!(mock.call_count() == 1);
        }
    }

    #[tokio::test]
    async fn persistent_5xx_makes_n_plus_one_calls() {
        let mock = MockService::new(503);
        let mut service = RetryLayer::new(2).with_backoff(fast()).layer(mock.clone());

        let response = service.ready().await.expect("ready").call(request()).await;
        check!(response.expect("last response").status() == 503);
        check!(mock.call_count() == 3);
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let mock = MockService::new(200).script([
            Err(Error::connection("connection reset")),
            Ok(status(502)),
        ]);
        let mut service = RetryLayer::new(3).with_backoff(fast()).layer(mock.clone());

        let response = service.ready().await.expect("ready").call(request()).await;
        check!(response.expect("response").status() == 200);
        check!(mock.call_count() == 3);
    }

    #[tokio::test]
    async fn exhausted_transport_errors_are_wrapped() {
        let mock = MockService::new(200).script([
            Err(Error::Timeout),
            Err(Error::connection("refused")),
            Err(Error::connection("refused")),
        ]);
        let mut service = RetryLayer::new(2).with_backoff(fast()).layer(mock.clone());

        let result = service.ready().await.expect("ready").call(request()).await;
        let_assert!(Err(err) = result);
        check!(err.attempts() == Some(3));
        check!(err.is_connection());
        check!(mock.call_count() == 3);
    }

    #[tokio::test]
    async fn non_transient_errors_pass_through() {
        let mock =
            MockService::new(200).script([Err(Error::authentication("bearer", "token is empty"))]);
        let mut service = RetryLayer::new(3).with_backoff(fast()).layer(mock.clone());

        let result = service.ready().await.expect("ready").call(request()).await;
        let_assert!(Err(Error::Authentication { .. }) = result);
        check!(mock.call_count() == 1);
    }

    #[tokio::test]
    async fn cancelled_context_makes_no_calls() {
        let mock = MockService::new(200);
        let mut service = RetryLayer::new(3).layer(mock.clone());

        let ctx = CallContext::background();
        ctx.cancel();
        let mut cancelled = request();
        cancelled.set_context(ctx);

        let result = service.ready().await.expect("ready").call(cancelled).await;
        let_assert!(Err(Error::Cancelled) = result);
        check!(mock.call_count() == 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff_stops_retrying() {
        let mock = MockService::new(503);
        let backoff = Backoff::new(Duration::from_secs(60), Duration::from_secs(60));
        let mut service = RetryLayer::new(5).with_backoff(backoff).layer(mock.clone());

        let ctx = CallContext::background();
        let mut req = request();
        req.set_context(ctx.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            ctx.cancel();
        });

        let result = service.ready().await.expect("ready").call(req).await;
        let_assert!(Err(Error::Cancelled) = result);
        check!(mock.call_count() == 1);
        canceller.await.expect("canceller");
    }
}
