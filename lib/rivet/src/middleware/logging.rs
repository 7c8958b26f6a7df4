//! Request/response logging middleware.
//!
//! Each logical call produces exactly one record on the configured
//! [`Logger`], whatever the retry and rate-limit layers did underneath:
//!
//! | Outcome | Level |
//! |---------|-------|
//! | error (transport, auth, cancellation, ...) | `Error` |
//! | 5xx | `Error` |
//! | 4xx | `Warn` |
//! | anything else | `Info` |

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use tower::{Layer, Service};
use tracing::{Instrument, Level, span};

use super::ServiceFuture;
use crate::logger::{Field, LogLevel, Logger, TracingLogger};
use crate::{Error, Request, Response, Result};

/// Layer that logs one record per call.
#[derive(Clone)]
pub struct LoggingLayer {
    logger: Arc<dyn Logger>,
}

impl std::fmt::Debug for LoggingLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingLayer").finish_non_exhaustive()
    }
}

impl Default for LoggingLayer {
    fn default() -> Self {
        Self::new(Arc::new(TracingLogger::new()))
    }
}

impl LoggingLayer {
    /// Log through `logger`.
    #[must_use]
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self { logger }
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = Logging<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Logging {
            inner,
            logger: Arc::clone(&self.logger),
        }
    }
}

/// Service that logs requests and responses.
#[derive(Clone)]
pub struct Logging<S> {
    inner: S,
    logger: Arc<dyn Logger>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for Logging<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logging")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

/// Level for a call outcome.
fn level_for(result: &Result<Response<Bytes>>) -> LogLevel {
    match result {
        Err(_) => LogLevel::Error,
        Ok(response) if response.is_server_error() => LogLevel::Error,
        Ok(response) if response.is_client_error() => LogLevel::Warn,
        Ok(_) => LogLevel::Info,
    }
}

impl<S> Service<Request<Bytes>> for Logging<S>
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
        let method = request.method();
        let url = request.url().to_string();
        let context = request.context().clone();
        let logger = Arc::clone(&self.logger);

        let span = span!(Level::INFO, "http_request", %method, %url);

        let mut inner = self.inner.clone();
        Box::pin(
            async move {
                let start = Instant::now();
                let result = inner.call(request).await;

                // Saturating conversion to u64 (truncates after ~584 million years)
                let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

                let mut fields = vec![
                    Field::new("method", method),
                    Field::new("url", &url),
                    Field::new("elapsed_ms", elapsed_ms),
                ];
                let message = match &result {
                    Ok(response) => {
                        fields.push(Field::new("status", response.status()));
                        if response.is_success() {
                            "request completed"
                        } else {
                            "request failed with HTTP error"
                        }
                    }
                    Err(err) => {
                        fields.push(Field::new("error", err));
                        if let Some(attempts) = err.attempts() {
                            fields.push(Field::new("attempts", attempts));
                        }
                        "request failed"
                    }
                };

                logger.log(level_for(&result), &context, message, &fields);
                result
            }
            .instrument(span),
        )
    }
}
