//! 429 recovery middleware.
//!
//! When the server answers 429, the layer honours `Retry-After` (integer
//! seconds or an HTTP-date) plus a small buffer, then re-issues the request
//! exactly once and returns whatever that attempt produces.

use std::task::{Context, Poll};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use tower::{Layer, Service, ServiceExt};
use tracing::debug;

use super::ServiceFuture;
use crate::{Error, Request, Response, Result};

/// Wait used when `Retry-After` is absent or unparsable.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Parse a `Retry-After` header value.
///
/// Accepts delay-seconds (`"120"`) or an HTTP-date, which yields the time
/// remaining until that date (zero if it has passed). Anything else yields
/// [`DEFAULT_RETRY_AFTER`].
#[must_use]
pub fn parse_retry_after(value: &str) -> Duration {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Duration::from_secs(seconds);
    }
    match httpdate::parse_http_date(value) {
        Ok(at) => at
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO),
        Err(_) => DEFAULT_RETRY_AFTER,
    }
}

/// Rate-limit budget advertised through `X-RateLimit-*` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateLimitInfo {
    /// `X-RateLimit-Limit`
    pub limit: Option<u64>,
    /// `X-RateLimit-Remaining`
    pub remaining: Option<u64>,
    /// `X-RateLimit-Reset`
    pub reset: Option<u64>,
}

impl RateLimitInfo {
    /// Read the rate-limit headers; `None` when the response carries none.
    #[must_use]
    pub fn from_response<B>(response: &Response<B>) -> Option<Self> {
        let read = |name: &str| response.header(name).and_then(|v| v.trim().parse().ok());
        let info = Self {
            limit: read("X-RateLimit-Limit"),
            remaining: read("X-RateLimit-Remaining"),
            reset: read("X-RateLimit-Reset"),
        };
        (info != Self::default()).then_some(info)
    }
}

/// Layer that recovers from 429 responses.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitRecoveryLayer {
    buffer: Duration,
}

impl Default for RateLimitRecoveryLayer {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

impl RateLimitRecoveryLayer {
    /// Add `buffer` on top of every `Retry-After` wait.
    #[must_use]
    pub const fn new(buffer: Duration) -> Self {
        Self { buffer }
    }
}

impl<S> Layer<S> for RateLimitRecoveryLayer {
    type Service = RateLimitRecovery<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitRecovery {
            inner,
            buffer: self.buffer,
        }
    }
}

/// Service that waits out a 429 and re-issues the request once.
#[derive(Debug, Clone)]
pub struct RateLimitRecovery<S> {
    inner: S,
    buffer: Duration,
}

impl<S> Service<Request<Bytes>> for RateLimitRecovery<S>
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
        let mut inner = self.inner.clone();
        let buffer = self.buffer;

        Box::pin(async move {
            let context = request.context().clone();
            let reissue = request.clone();

            let response = inner.ready().await?.call(request).await?;
            if let Some(info) = RateLimitInfo::from_response(&response) {
                debug!(
                    limit = ?info.limit,
                    remaining = ?info.remaining,
                    reset = ?info.reset,
                    "rate limit budget"
                );
            }
            if response.status() != 429 {
                return Ok(response);
            }

            let wait = parse_retry_after(response.header("Retry-After").unwrap_or_default())
                .saturating_add(buffer);
            debug!(wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX), "rate limited, waiting");
            drop(response);

            context.sleep(wait).await?;
            inner.ready().await?.call(reissue).await
        })
    }
}
