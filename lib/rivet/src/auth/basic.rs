//! HTTP basic authentication.

use std::sync::Arc;

use base64::Engine;
use bytes::Bytes;

use super::Authenticator;
use crate::{Error, Request, Result};

/// Sends `Authorization: Basic <base64(username:password)>`.
///
/// # Example
///
/// ```ignore
/// use rivet::{BasicAuth, Client};
///
/// let client = Client::builder()
///     .base_url("https://jira.example.com/rest/api/3")
///     .authenticator(BasicAuth::new("ops@example.com", api_token))
///     .build()?;
/// ```
#[derive(Clone)]
pub struct BasicAuth {
    username: Arc<str>,
    /// Base64-encoded "username:password".
    encoded_credentials: Arc<str>,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl BasicAuth {
    /// Create basic credentials.
    pub fn new(username: impl AsRef<str>, password: impl AsRef<str>) -> Self {
        let credentials = format!("{}:{}", username.as_ref(), password.as_ref());
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        Self {
            username: Arc::from(username.as_ref()),
            encoded_credentials: Arc::from(encoded),
        }
    }
}

impl Authenticator for BasicAuth {
    async fn authenticate(&self, request: &mut Request<Bytes>) -> Result<()> {
        if self.username.is_empty() {
            return Err(Error::authentication(self.kind(), "username is empty"));
        }
        request.set_header(
            "Authorization",
            format!("Basic {}", self.encoded_credentials),
        );
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "basic"
    }
}
