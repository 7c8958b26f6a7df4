//! JSON codec and error body decoding.
//!
//! Outgoing bodies are encoded with [`to_json`] (or [`to_form`] for token
//! endpoints). Incoming bodies go through [`decode`], which branches on the
//! status code: success bodies deserialize into the caller's type, failure
//! bodies become an [`Error::Http`] carrying the status and the best message
//! that could be extracted.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::Deserialize;

use crate::{Error, Response, Result};

/// Content type for request bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// `application/json`
    Json,
    /// `application/x-www-form-urlencoded`
    FormUrlEncoded,
}

impl ContentType {
    /// Get the MIME type string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::FormUrlEncoded => "application/x-www-form-urlencoded",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialize a value to JSON bytes.
///
/// # Example
///
/// ```
/// use rivet_core::to_json;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Comment { body: String }
///
/// let bytes = to_json(&Comment { body: "LGTM".to_string() }).expect("serialize");
/// assert_eq!(bytes.as_ref(), br#"{"body":"LGTM"}"#);
/// ```
pub fn to_json<T: serde::Serialize>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(Into::into)
}

/// Serialize a value to form URL-encoded bytes.
pub fn to_form<T: serde::Serialize>(value: &T) -> Result<Bytes> {
    serde_html_form::to_string(value)
        .map(|s| Bytes::from(s.into_bytes()))
        .map_err(Into::into)
}

/// Deserialize JSON bytes with path-aware error messages.
///
/// # Example
///
/// ```
/// use rivet_core::from_json;
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize)]
/// struct Issue { key: String }
///
/// let err = from_json::<Issue>(br#"{"key": 7}"#).unwrap_err();
/// assert!(err.to_string().contains("'key'"));
/// ```
pub fn from_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize(&mut deserializer)
        .map_err(|e| Error::json_deserialization(e.path().to_string(), e.inner().to_string()))
}

/// Decode a response body into `T`, or into an [`Error::Http`] when the
/// status is `>= 400`.
pub fn decode<T: serde::de::DeserializeOwned>(response: &Response<Bytes>) -> Result<T> {
    ensure_success(response)?;
    from_json(response.body())
}

/// Check the status of a response whose body the caller does not need.
pub fn ensure_success(response: &Response<Bytes>) -> Result<()> {
    if response.status() < 400 {
        Ok(())
    } else {
        Err(http_error(response.status(), response.body()))
    }
}

/// Build the [`Error::Http`] for a failed response.
fn http_error(status: u16, body: &Bytes) -> Error {
    let details = serde_json::from_slice::<ApiErrorBody>(body).unwrap_or_default();
    let message = details
        .summary()
        .or_else(|| raw_message(body))
        .unwrap_or_else(|| canonical_reason(status));

    Error::Http {
        status,
        message,
        details,
        body: (!body.is_empty()).then(|| body.clone()),
    }
}

fn raw_message(body: &Bytes) -> Option<String> {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn canonical_reason(status: u16) -> String {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("unknown status")
        .to_string()
}

/// Structured error body.
///
/// Servers send any one of `{"message": "..."}`,
/// `{"errorMessages": ["..."]}` or `{"errors": {"field": "..."}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    /// Single message.
    #[serde(default)]
    pub message: Option<String>,
    /// List of messages.
    #[serde(default)]
    pub error_messages: Vec<String>,
    /// Field name to message.
    #[serde(default)]
    pub errors: BTreeMap<String, String>,
}

impl ApiErrorBody {
    /// Returns `true` if none of the known shapes were present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.message.as_deref().is_none_or(str::is_empty)
            && self.error_messages.is_empty()
            && self.errors.is_empty()
    }

    /// One-line message built from whichever shape is present.
    #[must_use]
    pub fn summary(&self) -> Option<String> {
        if let Some(message) = self.message.as_deref().filter(|m| !m.is_empty()) {
            return Some(message.to_string());
        }
        if !self.error_messages.is_empty() {
            return Some(self.error_messages.join("; "));
        }
        if !self.errors.is_empty() {
            let fields: Vec<String> = self
                .errors
                .iter()
                .map(|(field, message)| format!("{field}: {message}"))
                .collect();
            return Some(fields.join("; "));
        }
        None
    }
}
