//! Authenticators.
//!
//! An [`Authenticator`] attaches credentials to an outgoing request. It runs
//! inside the retry loop, so every attempt is authenticated afresh and a
//! refreshed token is picked up by the next retry.
//!
//! - [`BasicAuth`] - `Authorization: Basic <base64(user:password)>`
//! - [`BearerAuth`] - `Authorization: Bearer <token>`
//! - [`OAuth2Auth`] - bearer token kept fresh with the `refresh_token` grant

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;

use crate::{Request, Result};

mod basic;
mod bearer;
mod oauth2;

pub use basic::BasicAuth;
pub use bearer::BearerAuth;
pub use oauth2::{OAuth2Auth, REFRESH_SKEW, TokenResponse};

/// Applies credentials to a request.
///
/// An error means no request is sent; [`AuthLayer`](crate::middleware::AuthLayer)
/// reports it as [`Error::Authentication`](crate::Error::Authentication).
pub trait Authenticator: Send + Sync {
    /// Attach credentials to `request`.
    fn authenticate(&self, request: &mut Request<Bytes>) -> impl Future<Output = Result<()>> + Send;

    /// Short name used in diagnostics (`basic`, `bearer`, `oauth2`, ...).
    fn kind(&self) -> &'static str;
}

impl<A: Authenticator> Authenticator for Arc<A> {
    fn authenticate(&self, request: &mut Request<Bytes>) -> impl Future<Output = Result<()>> + Send {
        A::authenticate(self, request)
    }

    fn kind(&self) -> &'static str {
        A::kind(self)
    }
}
