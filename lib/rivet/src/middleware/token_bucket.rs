//! Client-side token bucket using governor.
//!
//! A resilience alternative to 429 recovery: requests are paced before they
//! leave, so the server's limit is not hit in the first place. The wait for a
//! token is raced against the call context.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use governor::{Quota, RateLimiter, clock::DefaultClock, state::InMemoryState};
use tower::{Layer, Service};

use super::ServiceFuture;
use crate::{Error, Request, Response, Result};

/// Type alias for the governor rate limiter.
type GovernorLimiter = RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>;

/// Layer that paces requests through a shared token bucket.
///
/// Clones of the layer, and every service it builds, draw from the same bucket.
///
/// # Example
///
/// ```ignore
/// use rivet::Client;
/// use rivet::middleware::TokenBucketLayer;
/// use std::num::NonZeroU32;
///
/// let client = Client::builder()
///     .base_url("https://jira.example.com/rest/api/3")
///     .resilience(TokenBucketLayer::per_second(NonZeroU32::new(10).unwrap()))
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct TokenBucketLayer {
    limiter: Arc<GovernorLimiter>,
}

impl TokenBucketLayer {
    /// Allow `count` requests per second.
    #[must_use]
    pub fn per_second(count: NonZeroU32) -> Self {
        Self::with_quota(Quota::per_second(count))
    }

    /// Allow `count` requests per minute.
    #[must_use]
    pub fn per_minute(count: NonZeroU32) -> Self {
        Self::with_quota(Quota::per_minute(count))
    }

    /// Use a custom quota.
    #[must_use]
    pub fn with_quota(quota: Quota) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }
}

impl<S> Layer<S> for TokenBucketLayer {
    type Service = TokenBucket<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TokenBucket {
            inner,
            limiter: Arc::clone(&self.limiter),
        }
    }
}

/// Service that waits for a token before each request.
#[derive(Debug, Clone)]
pub struct TokenBucket<S> {
    inner: S,
    limiter: Arc<GovernorLimiter>,
}

impl<S> Service<Request<Bytes>> for TokenBucket<S>
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
        let limiter = Arc::clone(&self.limiter);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            request
                .context()
                .run(async {
                    limiter.until_ready().await;
                    Ok(())
                })
                .await?;

            inner.call(request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use assert2::{check, let_assert};
    use tower::ServiceExt;

    use super::*;
    use crate::CallContext;
    use crate::middleware::mock::{MockService, request};

    fn per_second(count: u32) -> TokenBucketLayer {
        TokenBucketLayer::per_second(NonZeroU32::new(count).expect("non-zero"))
    }

    #[tokio::test]
    async fn allows_burst_within_quota() {
        let mock = MockService::new(200);
        let mut service = per_second(1000).layer(mock.clone());

        let start = Instant::now();
        for _ in 0..10 {
            let result = service.ready().await.expect("ready").call(request()).await;
            check!(result.is_ok());
        }

        check!(mock.call_count() == 10);
        check!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn paces_requests_over_quota() {
        let mock = MockService::new(200);
        let mut service = per_second(1).layer(mock.clone());

        let start = Instant::now();
        for _ in 0..2 {
            let result = service.ready().await.expect("ready").call(request()).await;
            check!(result.is_ok());
        }

        check!(
            start.elapsed() >= Duration::from_millis(900),
            "second request should wait for a token"
        );
        check!(mock.call_count() == 2);
    }

    #[tokio::test]
    async fn cancelled_wait_sends_nothing() {
        let mock = MockService::new(200);
        let layer = per_second(1);
        let mut service = layer.layer(mock.clone());

        service
            .ready()
            .await
            .expect("ready")
            .call(request())
            .await
            .expect("first");

        let ctx = CallContext::background().with_timeout(Duration::from_millis(50));
        let mut req = request();
        req.set_context(ctx);

        let result = service.ready().await.expect("ready").call(req).await;
        let_assert!(Err(Error::DeadlineExceeded) = result);
        check!(mock.call_count() == 1);
    }

    #[tokio::test]
    async fn clones_share_the_bucket() {
        let layer = per_second(1);
        let mock = MockService::new(200);
        let mut first = layer.layer(mock.clone());
        let mut second = layer.clone().layer(mock.clone());

        let start = Instant::now();
        first.ready().await.expect("ready").call(request()).await.expect("first");
        second.ready().await.expect("ready").call(request()).await.expect("second");

        check!(start.elapsed() >= Duration::from_millis(900));
    }
}
