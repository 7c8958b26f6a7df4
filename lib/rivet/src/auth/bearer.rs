//! Static bearer token authentication.

use std::sync::Arc;

use bytes::Bytes;

use super::Authenticator;
use crate::{Error, Request, Result};

/// Sends `Authorization: Bearer <token>`.
#[derive(Clone)]
pub struct BearerAuth {
    token: Arc<str>,
}

impl std::fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuth").finish_non_exhaustive()
    }
}

impl BearerAuth {
    /// Create a bearer authenticator for `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Arc::from(token.into()),
        }
    }
}

impl Authenticator for BearerAuth {
    async fn authenticate(&self, request: &mut Request<Bytes>) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(Error::authentication(self.kind(), "token is empty"));
        }
        request.set_header("Authorization", format!("Bearer {}", self.token));
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "bearer"
    }
}
