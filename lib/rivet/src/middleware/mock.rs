//! Scripted inner service for middleware unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use tower::Service;

use super::ServiceFuture;
use crate::{Error, Method, Request, Response, Result};

/// Returns scripted outcomes in order, then `fallback` forever.
#[derive(Clone)]
pub(crate) struct MockService {
    script: Arc<Mutex<VecDeque<Result<Response<Bytes>>>>>,
    fallback: u16,
    call_count: Arc<AtomicU32>,
    requests: Arc<Mutex<Vec<Request<Bytes>>>>,
}

impl MockService {
    pub(crate) fn new(fallback: u16) -> Self {
        Self {
            script: Arc::default(),
            fallback,
            call_count: Arc::new(AtomicU32::new(0)),
            requests: Arc::default(),
        }
    }

    pub(crate) fn script(self, outcomes: impl IntoIterator<Item = Result<Response<Bytes>>>) -> Self {
        self.script
            .lock()
            .expect("script lock")
            .extend(outcomes);
        self
    }

    pub(crate) fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<Request<Bytes>> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl Service<Request<Bytes>> for MockService {
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().expect("requests lock").push(request);
        let outcome = self
            .script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| Ok(status(self.fallback)));

        Box::pin(async move { outcome })
    }
}

pub(crate) fn status(code: u16) -> Response<Bytes> {
    Response::new(code, HashMap::new(), Bytes::new())
}

pub(crate) fn status_with_header(code: u16, name: &str, value: &str) -> Response<Bytes> {
    let mut headers = HashMap::new();
    headers.insert(name.to_string(), value.to_string());
    Response::new(code, headers, Bytes::new())
}

pub(crate) fn request() -> Request<Bytes> {
    let url = url::Url::parse("https://jira.example.com/rest/api/3/myself").expect("valid url");
    Request::builder(Method::Get, url).build()
}
