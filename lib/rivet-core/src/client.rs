//! HTTP execution trait.
//!
//! [`HttpClient`] is the seam between code that builds requests and code that
//! sends them: the raw transport, the fully layered client, and test doubles
//! all implement it.

use std::future::Future;

use bytes::Bytes;

use crate::{Request, Response, Result};

/// Core HTTP client trait.
pub trait HttpClient: Send + Sync {
    /// Execute an HTTP request and return the response.
    ///
    /// Failure statuses are returned as `Ok` responses; only transport,
    /// authentication and cancellation failures are errors at this level.
    fn execute(
        &self,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<Response<Bytes>>> + Send;
}

/// Extension trait for [`HttpClient`] that decodes bodies.
pub trait HttpClientExt: HttpClient {
    /// Execute a request and decode the JSON body into `T`.
    ///
    /// Failure statuses become [`crate::Error::Http`].
    fn execute_json<T>(&self, request: Request<Bytes>) -> impl Future<Output = Result<T>> + Send
    where
        T: serde::de::DeserializeOwned,
    {
        async move {
            let response = self.execute(request).await?;
            crate::decode(&response)
        }
    }

    /// Execute a request whose response body is not needed.
    fn execute_empty(&self, request: Request<Bytes>) -> impl Future<Output = Result<()>> + Send {
        async move {
            let response = self.execute(request).await?;
            crate::ensure_success(&response)
        }
    }
}

impl<T: HttpClient> HttpClientExt for T {}

impl<C: HttpClient> HttpClient for std::sync::Arc<C> {
    fn execute(
        &self,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<Response<Bytes>>> + Send {
        C::execute(self, request)
    }
}
