//! Prelude module for convenient imports.
//!
//! ```ignore
//! use rivet_core::prelude::*;
//! ```

pub use crate::{
    CallContext, ContentType, Cursor, Error, HttpClient, HttpClientExt, Method, OffsetPage, Page,
    PageInfo, Paginator, Request, RequestBuilder, Response, Result, TokenPage, decode,
    ensure_success, from_json, to_form, to_json,
};
