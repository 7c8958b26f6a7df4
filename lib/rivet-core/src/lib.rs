//! Core types for the rivet HTTP client.
//!
//! This crate provides the transport-independent building blocks used by `rivet`:
//! - [`Method`] - HTTP method enum
//! - [`Request`] and [`RequestBuilder`] - requests bound to a [`CallContext`]
//! - [`Response`] - buffered HTTP response
//! - [`CallContext`] - per-call cancellation and deadline
//! - [`Error`] and [`Result`] - the error taxonomy shared by every layer
//! - [`to_json`], [`from_json`], [`decode`], [`ensure_success`] - the JSON codec
//! - [`HttpClient`] - the execution seam implemented by transports and clients
//! - [`Paginator`] - lazy item sequence over paginated list endpoints

mod client;
mod codec;
mod context;
mod error;
mod method;
pub mod pagination;
pub mod prelude;
mod request;
mod response;

pub use client::{HttpClient, HttpClientExt};
pub use codec::{ApiErrorBody, ContentType, decode, ensure_success, from_json, to_form, to_json};
pub use context::CallContext;
pub use error::{Error, Result};
pub use method::Method;
pub use pagination::{Cursor, OffsetPage, Page, PageInfo, Paginator, TokenPage};
pub use request::{Request, RequestBuilder};
pub use response::Response;

// Re-export http crate types for status codes and headers
pub use http::{StatusCode, header};
