//! Prelude module for convenient imports.
//!
//! ```ignore
//! use rivet::prelude::*;
//! ```

pub use crate::{
    Authenticator, BasicAuth, BearerAuth, CallContext, Client, ClientBuilder, ClientConfig,
    ContentType, Cursor, Error, HttpClient, HttpClientExt, Logger, Method, OAuth2Auth, OffsetPage,
    Page, PageInfo, Paginator, Request, RequestBuilder, Response, Result, StatusCode, TokenPage,
    decode, from_json, header, to_form, to_json,
};
pub use serde::{Deserialize, Serialize};
pub use std::time::Duration;
