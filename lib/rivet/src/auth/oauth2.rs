//! OAuth2 bearer authentication with refresh-token renewal.
//!
//! The access token is cached together with its expiry. Once it is within
//! [`REFRESH_SKEW`] of expiring, the next request performs a `refresh_token`
//! grant against the token endpoint before being sent. Concurrent requests
//! wait for a single refresh instead of each starting their own.

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use super::Authenticator;
use crate::transport::Transport;
use crate::{CallContext, Error, HttpClient, Method, Request, Result};

/// Tokens this close to expiry are refreshed before use.
pub const REFRESH_SKEW: Duration = Duration::from_secs(30);

const KIND: &str = "oauth2";

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// New access token.
    pub access_token: String,
    /// Lifetime of the access token in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Rotated refresh token, when the server issues one.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Token type, normally `Bearer`.
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
    client_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_secret: Option<&'a str>,
}

#[derive(Default)]
struct TokenState {
    access_token: Option<String>,
    /// `None` means the token does not expire.
    expires_at: Option<Instant>,
    refresh_token: Option<String>,
}

impl TokenState {
    fn valid_token(&self) -> Option<&str> {
        let fresh = self
            .expires_at
            .is_none_or(|expires_at| Instant::now() + REFRESH_SKEW < expires_at);
        self.access_token.as_deref().filter(|_| fresh)
    }
}

/// OAuth2 authenticator that refreshes its access token on demand.
///
/// Token requests go through `C`, by default a bare [`Transport`], so they
/// are not themselves authenticated, retried or logged.
///
/// # Example
///
/// ```ignore
/// use rivet::{Client, OAuth2Auth, Transport};
///
/// let oauth = OAuth2Auth::new(Transport::default(), token_url, "my-client-id")
///     .client_secret(secret)
///     .refresh_token(refresh_token);
///
/// let client = Client::builder()
///     .base_url("https://api.atlassian.com/ex/jira/cloud-id/rest/api/3")
///     .authenticator(oauth)
///     .build()?;
/// ```
pub struct OAuth2Auth<C = Transport> {
    http: C,
    token_url: url::Url,
    client_id: String,
    client_secret: Option<String>,
    state: RwLock<TokenState>,
}

impl<C> std::fmt::Debug for OAuth2Auth<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Auth")
            .field("token_url", &self.token_url.as_str())
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl<C: HttpClient> OAuth2Auth<C> {
    /// Create an authenticator posting refresh grants to `token_url` via `http`.
    pub fn new(http: C, token_url: url::Url, client_id: impl Into<String>) -> Self {
        Self {
            http,
            token_url,
            client_id: client_id.into(),
            client_secret: None,
            state: RwLock::new(TokenState::default()),
        }
    }

    /// Set the client secret sent with refresh grants.
    #[must_use]
    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Set the refresh token.
    #[must_use]
    pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
        self.state.get_mut().refresh_token = Some(token.into());
        self
    }

    /// Seed the cache with an access token valid for `expires_in`.
    #[must_use]
    pub fn with_token(mut self, access_token: impl Into<String>, expires_in: Duration) -> Self {
        let state = self.state.get_mut();
        state.access_token = Some(access_token.into());
        state.expires_at = Some(Instant::now() + expires_in);
        self
    }

    /// A valid access token, refreshing first if needed.
    ///
    /// The refresh request is bound to `context`.
    pub async fn access_token(&self, context: &CallContext) -> Result<String> {
        {
            let state = self.state.read().await;
            if let Some(token) = state.valid_token() {
                return Ok(token.to_string());
            }
        }

        let mut state = self.state.write().await;

        // Another task may have refreshed while we waited for the lock.
        if let Some(token) = state.valid_token() {
            return Ok(token.to_string());
        }

        let Some(refresh_token) = state.refresh_token.clone() else {
            return Err(Error::authentication(KIND, "no refresh token available"));
        };

        let response = self.refresh(context, &refresh_token).await?;
        debug!(expires_in = ?response.expires_in, "access token refreshed");

        state.expires_at = response
            .expires_in
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        if let Some(rotated) = response.refresh_token {
            state.refresh_token = Some(rotated);
        }
        state.access_token = Some(response.access_token.clone());

        Ok(response.access_token)
    }

    async fn refresh(&self, context: &CallContext, refresh_token: &str) -> Result<TokenResponse> {
        let grant = RefreshGrant {
            grant_type: "refresh_token",
            refresh_token,
            client_id: &self.client_id,
            client_secret: self.client_secret.as_deref(),
        };

        let request = Request::builder(Method::Post, self.token_url.clone())
            .header("Accept", "application/json")
            .form(&grant)?
            .context(context.clone())
            .build();

        let response = self.http.execute(request).await.map_err(into_auth_error)?;
        if !response.is_success() {
            let err = rivet_core::ensure_success(&response)
                .err()
                .map_or_else(|| format!("HTTP {}", response.status()), |e| e.to_string());
            return Err(Error::authentication(KIND, format!("token refresh failed: {err}")));
        }

        let token: TokenResponse = rivet_core::from_json(response.body()).map_err(into_auth_error)?;
        if token.access_token.is_empty() {
            return Err(Error::authentication(
                KIND,
                "token endpoint returned an empty access token",
            ));
        }
        Ok(token)
    }
}

fn into_auth_error(err: Error) -> Error {
    match err {
        Error::Cancelled | Error::DeadlineExceeded | Error::Authentication { .. } => err,
        other => Error::authentication(KIND, format!("token refresh failed: {other}")),
    }
}

impl<C: HttpClient> Authenticator for OAuth2Auth<C> {
    async fn authenticate(&self, request: &mut Request<Bytes>) -> Result<()> {
        let token = self.access_token(request.context()).await?;
        request.set_header("Authorization", format!("Bearer {token}"));
        Ok(())
    }

    fn kind(&self) -> &'static str {
        KIND
    }
}
