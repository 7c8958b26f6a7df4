//! The layered HTTP client.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use tower::util::BoxCloneSyncService;
use tower::{Layer, ServiceExt};
use tower_service::Service;

use crate::auth::{Authenticator, BasicAuth, BearerAuth};
use crate::config::{ClientConfig, ClientConfigBuilder};
use crate::logger::{Logger, TracingLogger};
use crate::middleware::{
    AuthLayer, Backoff, LoggingLayer, RateLimitRecoveryLayer, RetryLayer, ServiceFuture,
    UserAgentLayer,
};
use crate::transport::Transport;
use crate::{Error, Method, Request, RequestBuilder, Response, Result};

/// Type-erased service for middleware composition.
///
/// This type allows storing and composing arbitrary Tower layers without
/// exposing complex generic types to users.
pub type BoxedService = BoxCloneSyncService<Request<Bytes>, Response<Bytes>, Error>;

type LayerFn = Arc<dyn Fn(BoxedService) -> BoxedService + Send + Sync>;

/// Authenticated, retrying, rate-limit-aware HTTP client.
///
/// Cloning is cheap and clones share the connection pool and any stateful
/// layers (token cache, token bucket, circuit breaker).
///
/// # Example
///
/// ```ignore
/// use rivet::{Client, Method};
///
/// let client = Client::builder()
///     .base_url("https://jira.example.com/rest/api/3")
///     .bearer_auth(token)
///     .build()?;
///
/// let request = client.request(Method::Get, "issue/OPS-1")?.build();
/// let issue: Issue = client.execute_json(request).await?;
/// ```
#[derive(Clone)]
pub struct Client {
    service: BoxedService,
    config: Arc<ClientConfig>,
    base_url: url::Url,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url.as_str())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a new client builder.
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// The client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The base URL every relative path is resolved against.
    #[must_use]
    pub fn base_url(&self) -> &url::Url {
        &self.base_url
    }

    /// Start a request to `path`, resolved against the base URL.
    ///
    /// A leading `/` is ignored so that `"issue/OPS-1"` and `"/issue/OPS-1"`
    /// both stay below the base path.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder<Bytes>> {
        let url = self.base_url.join(path.trim_start_matches('/'))?;
        Ok(Request::builder(method, url).header("Accept", "application/json"))
    }

    /// Send `request` through the pipeline.
    ///
    /// Failure statuses come back as `Ok` responses; use
    /// [`execute_json`](Self::execute_json) or [`Response::error_for_status`]
    /// to turn them into errors.
    pub async fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        self.service.clone().oneshot(request).await
    }

    /// Send `request` and decode the JSON response into `T`.
    pub async fn execute_json<T: serde::de::DeserializeOwned>(
        &self,
        request: Request<Bytes>,
    ) -> Result<T> {
        let response = self.execute(request).await?;
        rivet_core::decode(&response)
    }
}

impl rivet_core::HttpClient for Client {
    async fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        Self::execute(self, request).await
    }
}

impl Service<Request<Bytes>> for Client {
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let service = self.service.clone();
        Box::pin(service.oneshot(request))
    }
}

/// Builder for [`Client`].
///
/// The pipeline is assembled in a fixed order around the transport,
/// innermost first: authentication, user agent, 429 recovery, retry, logging,
/// then the caller's own layers with the first one added outermost.
///
/// # Example
///
/// ```ignore
/// use rivet::Client;
/// use rivet::middleware::CircuitBreakerLayer;
/// use std::time::Duration;
///
/// let client = Client::builder()
///     .base_url("https://jira.example.com/rest/api/3")
///     .basic_auth("ops@example.com", api_token)
///     .user_agent("jira-sync/2.1")
///     .max_retries(5)
///     .layer(CircuitBreakerLayer::default())
///     .build()?;
/// ```
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfigBuilder,
    base_url: Option<String>,
    auth: Option<LayerFn>,
    resilience: Option<LayerFn>,
    logger: Option<Arc<dyn Logger>>,
    layers: Vec<LayerFn>,
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("config", &self.config)
            .field("base_url", &self.base_url)
            .field("has_auth", &self.auth.is_some())
            .field("has_resilience", &self.resilience.is_some())
            .field("layers_count", &self.layers.len())
            .finish_non_exhaustive()
    }
}

fn boxed_layer<L>(layer: L) -> LayerFn
where
    L: Layer<BoxedService> + Send + Sync + 'static,
    L::Service: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error>
        + Clone
        + Send
        + Sync
        + 'static,
    <L::Service as Service<Request<Bytes>>>::Future: Send + 'static,
{
    Arc::new(move |service| BoxCloneSyncService::new(layer.layer(service)))
}

impl ClientBuilder {
    // ========================================================================
    // Core Configuration
    // ========================================================================

    /// Set the base URL relative request paths are resolved against.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: ClientConfigBuilder) -> Self {
        self.config = config;
        self
    }

    /// Cap each network exchange at `timeout`. Unset by default.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.timeout(timeout);
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.connect_timeout(timeout);
        self
    }

    /// Set the maximum idle connections per host.
    #[must_use]
    pub fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.config = self.config.pool_idle_per_host(count);
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.pool_idle_timeout(timeout);
        self
    }

    /// Set the `User-Agent` header value.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config = self.config.user_agent(user_agent);
        self
    }

    /// Set the number of retries after the first attempt.
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config = self.config.max_retries(retries);
        self
    }

    /// Set the retry backoff schedule.
    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.config = self.config.backoff(backoff);
        self
    }

    /// Set the buffer added on top of `Retry-After` waits.
    #[must_use]
    pub fn rate_limit_buffer(mut self, buffer: Duration) -> Self {
        self.config = self.config.rate_limit_buffer(buffer);
        self
    }

    // ========================================================================
    // Authentication & Logging
    // ========================================================================

    /// Authenticate every request with `authenticator`.
    #[must_use]
    pub fn authenticator<A: Authenticator + 'static>(mut self, authenticator: A) -> Self {
        self.auth = Some(boxed_layer(AuthLayer::new(authenticator)));
        self
    }

    /// Authenticate with HTTP basic credentials.
    #[must_use]
    pub fn basic_auth(self, username: impl AsRef<str>, password: impl AsRef<str>) -> Self {
        self.authenticator(BasicAuth::new(username, password))
    }

    /// Authenticate with a static bearer token.
    #[must_use]
    pub fn bearer_auth(self, token: impl Into<String>) -> Self {
        self.authenticator(BearerAuth::new(token))
    }

    /// Send call records to `logger` instead of `tracing`.
    #[must_use]
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    // ========================================================================
    // Middleware
    // ========================================================================

    /// Replace the built-in 429 recovery and retry layers with `layer`.
    ///
    /// Combine several layers with [`tower::ServiceBuilder`].
    #[must_use]
    pub fn resilience<L>(mut self, layer: L) -> Self
    where
        L: Layer<BoxedService> + Send + Sync + 'static,
        L::Service: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error>
            + Clone
            + Send
            + Sync
            + 'static,
        <L::Service as Service<Request<Bytes>>>::Future: Send + 'static,
    {
        self.resilience = Some(boxed_layer(layer));
        self
    }

    /// Add a Tower layer outside the built-in pipeline.
    ///
    /// Layers are applied in order: first added = outermost (sees the
    /// request first and the result last).
    #[must_use]
    pub fn layer<L>(mut self, layer: L) -> Self
    where
        L: Layer<BoxedService> + Send + Sync + 'static,
        L::Service: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error>
            + Clone
            + Send
            + Sync
            + 'static,
        <L::Service as Service<Request<Bytes>>>::Future: Send + 'static,
    {
        self.layers.push(boxed_layer(layer));
        self
    }

    /// Add middleware using the reqwest-middleware style `.with()` method.
    ///
    /// This is an alias for `.layer()`.
    #[must_use]
    pub fn with<L>(self, layer: L) -> Self
    where
        L: Layer<BoxedService> + Send + Sync + 'static,
        L::Service: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error>
            + Clone
            + Send
            + Sync
            + 'static,
        <L::Service as Service<Request<Bytes>>>::Future: Send + 'static,
    {
        self.layer(layer)
    }

    // ========================================================================
    // Build
    // ========================================================================

    /// Build the client over the hyper transport.
    pub fn build(self) -> Result<Client> {
        let transport = Transport::new(&self.config.clone().build());
        self.build_with_transport(transport)
    }

    /// Build the client over a custom innermost service.
    pub fn build_with_transport<S>(self, transport: S) -> Result<Client>
    where
        S: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        let config = self.config.build();
        let base_url = parse_base_url(self.base_url.as_deref())?;

        let mut service = BoxCloneSyncService::new(transport);

        if let Some(auth) = &self.auth {
            service = auth(service);
        }
        service = BoxCloneSyncService::new(
            UserAgentLayer::new(config.user_agent.clone()).layer(service),
        );

        match &self.resilience {
            Some(resilience) => service = resilience(service),
            None => {
                service = BoxCloneSyncService::new(
                    RateLimitRecoveryLayer::new(config.rate_limit_buffer).layer(service),
                );
                service = BoxCloneSyncService::new(
                    RetryLayer::new(config.max_retries)
                        .with_backoff(config.backoff)
                        .layer(service),
                );
            }
        }

        let logger = self
            .logger
            .unwrap_or_else(|| Arc::new(TracingLogger::new()));
        service = BoxCloneSyncService::new(LoggingLayer::new(logger).layer(service));

        // Wrap the last-added layer first so the first-added ends up outermost.
        for layer in self.layers.iter().rev() {
            service = layer(service);
        }

        Ok(Client {
            service,
            config: Arc::new(config),
            base_url,
        })
    }
}

/// Parse the base URL, making sure its path ends with `/` so that joins
/// append to it instead of replacing its last segment.
fn parse_base_url(raw: Option<&str>) -> Result<url::Url> {
    let raw = raw.ok_or_else(|| Error::invalid_request("base URL is required"))?;
    let mut url = url::Url::parse(raw)?;
    if url.cannot_be_a_base() {
        return Err(Error::invalid_request(format!(
            "base URL cannot be a base: {raw}"
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
