//! Authenticated, retrying, rate-limit-aware HTTP client.
//!
//! Calls go through a fixed [tower] pipeline around a pooled hyper/rustls
//! transport: authentication, user agent, 429 recovery, retry with backoff
//! and logging, plus any layers you add. List endpoints are consumed through
//! [`Paginator`], which hides page boundaries behind a lazy item sequence.
//!
//! # Example
//!
//! ```ignore
//! use rivet::prelude::*;
//!
//! #[derive(Debug, Deserialize)]
//! struct Issue {
//!     key: String,
//! }
//!
//! let client = Client::builder()
//!     .base_url("https://jira.example.com/rest/api/3")
//!     .basic_auth("ops@example.com", api_token)
//!     .build()?;
//!
//! let ctx = CallContext::background().with_timeout(Duration::from_secs(30));
//! let request = client.request(Method::Get, "issue/OPS-1")?.context(ctx).build();
//! let issue: Issue = client.execute_json(request).await?;
//!
//! let mut issues = Paginator::offset(|cursor: Cursor| {
//!     let client = client.clone();
//!     async move {
//!         let request = client
//!             .request(Method::Get, "search")?
//!             .query("jql", "project = OPS")
//!             .query("startAt", &cursor.offset().to_string())
//!             .build();
//!         let page: OffsetPage<Issue> = client.execute_json(request).await?;
//!         Ok(page.into())
//!     }
//! });
//! while let Some(issue) = issues.next().await? {
//!     println!("{}", issue.key);
//! }
//! ```

pub mod auth;
mod client;
mod config;
mod logger;
pub mod middleware;
pub mod prelude;
mod transport;

pub use auth::{Authenticator, BasicAuth, BearerAuth, OAuth2Auth};
pub use client::{BoxedService, Client, ClientBuilder};
pub use config::{ClientConfig, ClientConfigBuilder, DEFAULT_USER_AGENT};
pub use logger::{Field, LogLevel, Logger, TracingLogger};
pub use middleware::ServiceFuture;
pub use transport::Transport;

// Re-export tower for middleware composition
pub use tower;

// Re-export core types
pub use rivet_core::{
    ApiErrorBody, CallContext, ContentType, Cursor, Error, HttpClient, HttpClientExt, Method,
    OffsetPage, Page, PageInfo, Paginator, Request, RequestBuilder, Response, Result, TokenPage,
    decode, ensure_success, from_json, to_form, to_json,
};

// Re-export http types for status codes and headers
pub use rivet_core::{StatusCode, header};

// Re-export crates used in public signatures
pub use url;
