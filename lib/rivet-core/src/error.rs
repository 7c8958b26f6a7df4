//! Error types for rivet.
//!
//! One enum covers every failure a call can produce. Callers classify with the
//! predicate methods (`is_not_found`, `is_transient`, `is_cancelled`, ...)
//! rather than by matching message text.

use bytes::Bytes;
use derive_more::{Display, Error, From};

use crate::ApiErrorBody;

/// Main error type for rivet operations.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// The server answered with a failure status (`>= 400`).
    #[display("HTTP error {status}: {message}")]
    #[from(skip)]
    Http {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the error body.
        message: String,
        /// Structured error body, when the server sent one.
        #[error(not(source))]
        details: ApiErrorBody,
        /// Raw response body, if any.
        #[error(not(source))]
        body: Option<Bytes>,
    },

    /// The authenticator could not attach credentials; no request was sent.
    #[display("authentication failed ({kind}): {message}")]
    #[from(skip)]
    Authentication {
        /// Authenticator kind (`basic`, `bearer`, `oauth2`, ...).
        kind: String,
        /// What went wrong.
        message: String,
    },

    /// Network/connection errors.
    #[display("connection error: {_0}")]
    #[from(skip)]
    Connection(#[error(not(source))] String),

    /// TLS/SSL errors.
    #[display("TLS error: {_0}")]
    #[from(skip)]
    Tls(#[error(not(source))] String),

    /// Transport-level timeout.
    #[display("request timeout")]
    #[from(skip)]
    Timeout,

    /// The call context was cancelled.
    #[display("call cancelled")]
    #[from(skip)]
    Cancelled,

    /// The call context deadline passed.
    #[display("call deadline exceeded")]
    #[from(skip)]
    DeadlineExceeded,

    /// Every allowed attempt failed with a transient error.
    #[display("request failed after {attempts} attempts: {source}")]
    #[from(skip)]
    RetriesExhausted {
        /// Number of attempts made, including the first.
        attempts: u32,
        /// Error from the last attempt.
        source: Box<Error>,
    },

    /// A circuit breaker rejected the call without sending it.
    #[display("circuit breaker is open")]
    #[from(skip)]
    CircuitOpen,

    /// Invalid request configuration.
    #[display("invalid request: {_0}")]
    #[from(skip)]
    InvalidRequest(#[error(not(source))] String),

    /// JSON serialization error.
    #[display("JSON serialization error: {_0}")]
    #[from]
    JsonSerialization(serde_json::Error),

    /// JSON deserialization error with path context.
    #[display("JSON deserialization error at '{path}': {message}")]
    #[from(skip)]
    JsonDeserialization {
        /// JSON path to the error (e.g., "fields.assignee.name").
        path: String,
        /// Error message.
        message: String,
    },

    /// Form URL-encoded serialization error.
    #[display("form serialization error: {_0}")]
    #[from]
    FormSerialization(serde_html_form::ser::Error),

    /// URL parsing error.
    #[display("invalid URL: {_0}")]
    #[from]
    InvalidUrl(url::ParseError),
}

/// Result type alias using [`crate::Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an HTTP error from status code and message.
    #[must_use]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
            details: ApiErrorBody::default(),
            body: None,
        }
    }

    /// Create an authentication error.
    #[must_use]
    pub fn authentication(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Authentication {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a TLS error.
    #[must_use]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create a JSON deserialization error with path context.
    #[must_use]
    pub fn json_deserialization(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JsonDeserialization {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Wrap the last error of an exhausted retry loop.
    #[must_use]
    pub fn retries_exhausted(attempts: u32, last: Self) -> Self {
        Self::RetriesExhausted {
            attempts,
            source: Box::new(last),
        }
    }

    /// The innermost error, looking through [`Error::RetriesExhausted`].
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::RetriesExhausted { source, .. } => source.root(),
            other => other,
        }
    }

    /// Number of attempts made, if the error came out of a retry loop.
    #[must_use]
    pub const fn attempts(&self) -> Option<u32> {
        match self {
            Self::RetriesExhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// Returns the HTTP status code if this is an HTTP error.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self.root() {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` if this is a timeout error.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), Self::Timeout)
    }

    /// Returns `true` if this is a connection error.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self.root(), Self::Connection(_))
    }

    /// Returns `true` if no request was sent because credentials could not be applied.
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        matches!(self.root(), Self::Authentication { .. })
    }

    /// Returns `true` if the call context was cancelled or its deadline passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Returns `true` for failures worth trying again later: transport
    /// errors, 429 and 5xx statuses.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self.root() {
            Self::Connection(_) | Self::Timeout | Self::CircuitOpen => true,
            Self::Http { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }

    /// Returns `true` if this is a client error (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status().is_some_and(|s| (400..500).contains(&s))
    }

    /// Returns `true` if this is a server error (5xx).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| (500..600).contains(&s))
    }

    /// Returns `true` if this is a 404 Not Found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Returns `true` if this is a 401 Unauthorized error.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Returns `true` if this is a 403 Forbidden error.
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(403)
    }

    /// Returns `true` if this is a 429 Too Many Requests error.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }

    /// Structured error body if this is an HTTP error.
    #[must_use]
    pub fn details(&self) -> Option<&ApiErrorBody> {
        match self.root() {
            Self::Http { details, .. } => Some(details),
            _ => None,
        }
    }

    /// Returns the response body if this is an HTTP error with a body.
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        match self.root() {
            Self::Http { body, .. } => body.as_ref(),
            _ => None,
        }
    }

    /// Try to decode the HTTP error body as JSON.
    ///
    /// Returns `None` if there is no body or this is not an HTTP error.
    pub fn decode_body<T: serde::de::DeserializeOwned>(&self) -> Option<Result<T>> {
        self.body().map(|body| crate::from_json(body))
    }
}
