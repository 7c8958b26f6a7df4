//! Authentication middleware.
//!
//! Runs an [`Authenticator`] on every request before passing it on. If the
//! authenticator fails, the call ends with [`Error::Authentication`] and the
//! inner service is never called.

use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use tower::{Layer, Service};

use super::ServiceFuture;
use crate::auth::Authenticator;
use crate::{Error, Request, Response, Result};

/// Layer that authenticates requests with `A`.
///
/// # Example
///
/// ```ignore
/// use rivet::BearerAuth;
/// use rivet::middleware::AuthLayer;
/// use tower::ServiceBuilder;
///
/// let service = ServiceBuilder::new()
///     .layer(AuthLayer::new(BearerAuth::new("my-secret-token")))
///     .service(transport);
/// ```
#[derive(Debug)]
pub struct AuthLayer<A> {
    authenticator: Arc<A>,
}

impl<A> Clone for AuthLayer<A> {
    fn clone(&self) -> Self {
        Self {
            authenticator: Arc::clone(&self.authenticator),
        }
    }
}

impl<A: Authenticator> AuthLayer<A> {
    /// Create a layer applying `authenticator`.
    pub fn new(authenticator: A) -> Self {
        Self {
            authenticator: Arc::new(authenticator),
        }
    }
}

impl<S, A> Layer<S> for AuthLayer<A> {
    type Service = Auth<S, A>;

    fn layer(&self, inner: S) -> Self::Service {
        Auth {
            inner,
            authenticator: Arc::clone(&self.authenticator),
        }
    }
}

/// Service that authenticates requests.
#[derive(Debug)]
pub struct Auth<S, A> {
    inner: S,
    authenticator: Arc<A>,
}

impl<S: Clone, A> Clone for Auth<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            authenticator: Arc::clone(&self.authenticator),
        }
    }
}

/// Report any authenticator failure as an authentication error, keeping
/// cancellation distinguishable.
fn normalize(kind: &'static str, err: Error) -> Error {
    match err {
        Error::Authentication { .. } | Error::Cancelled | Error::DeadlineExceeded => err,
        other => Error::authentication(kind, other.to_string()),
    }
}

impl<S, A> Service<Request<Bytes>> for Auth<S, A>
where
    S: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
    A: Authenticator + 'static,
{
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Bytes>) -> Self::Future {
        let authenticator = Arc::clone(&self.authenticator);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            authenticator
                .authenticate(&mut request)
                .await
                .map_err(|err| normalize(authenticator.kind(), err))?;

            inner.call(request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};
    use tower::ServiceExt;

    use super::*;
    use crate::BearerAuth;
    use crate::middleware::mock::{MockService, request};

    struct Broken;

    impl Authenticator for Broken {
        async fn authenticate(&self, _request: &mut Request<Bytes>) -> Result<()> {
            Err(Error::connection("vault unreachable"))
        }

        fn kind(&self) -> &'static str {
            "vault"
        }
    }

    #[tokio::test]
    async fn attaches_credentials() {
        let mock = MockService::new(200);
        let mut service = AuthLayer::new(BearerAuth::new("secret")).layer(mock.clone());

        service
            .ready()
            .await
            .expect("ready")
            .call(request())
            .await
            .expect("response");

        let seen = mock.requests();
        check!(seen[0].header("Authorization") == Some("Bearer secret"));
    }

    #[tokio::test]
    async fn failure_skips_network_and_is_normalized() {
        let mock = MockService::new(200);
        let mut service = AuthLayer::new(Broken).layer(mock.clone());

        let result = service.ready().await.expect("ready").call(request()).await;

        let_assert!(Err(Error::Authentication { kind, message }) = result);
        check!(kind == "vault");
        check!(message.contains("vault unreachable"));
        check!(mock.call_count() == 0);
    }

    #[tokio::test]
    async fn cancellation_is_not_rewritten() {
        check!(matches!(normalize("oauth2", Error::Cancelled), Error::Cancelled));
        check!(matches!(
            normalize("oauth2", Error::DeadlineExceeded),
            Error::DeadlineExceeded
        ));
    }
}
