//! `User-Agent` middleware.

use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use tower::{Layer, Service};

use super::ServiceFuture;
use crate::{Error, Request, Response, Result};

/// Layer that sets the `User-Agent` header on every request, replacing any
/// value the caller set.
#[derive(Debug, Clone)]
pub struct UserAgentLayer {
    user_agent: Arc<str>,
}

impl UserAgentLayer {
    /// Create a layer sending `user_agent`.
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: Arc::from(user_agent.into()),
        }
    }
}

impl<S> Layer<S> for UserAgentLayer {
    type Service = UserAgent<S>;

    fn layer(&self, inner: S) -> Self::Service {
        UserAgent {
            inner,
            user_agent: Arc::clone(&self.user_agent),
        }
    }
}

/// Service that sets the `User-Agent` header.
#[derive(Debug, Clone)]
pub struct UserAgent<S> {
    inner: S,
    user_agent: Arc<str>,
}

impl<S> Service<Request<Bytes>> for UserAgent<S>
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

    fn call(&mut self, mut request: Request<Bytes>) -> Self::Future {
        request.set_header("User-Agent", &*self.user_agent);

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(request).await })
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;
    use tower::ServiceExt;

    use super::*;
    use crate::middleware::mock::{MockService, request};

    #[tokio::test]
    async fn overrides_caller_user_agent() {
        let mock = MockService::new(200);
        let mut service = UserAgentLayer::new("rivet-test/1.0").layer(mock.clone());

        let mut req = request();
        req.set_header("user-agent", "curl/8.4");
        service
            .ready()
            .await
            .expect("ready")
            .call(req)
            .await
            .expect("response");

        let seen = mock.requests();
        check!(seen.len() == 1);
        check!(seen[0].header("User-Agent") == Some("rivet-test/1.0"));
        check!(seen[0].headers().len() == 1);
    }
}
