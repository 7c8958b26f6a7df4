//! Lazy iteration over paginated list endpoints.
//!
//! A [`Paginator`] is built from a single page-fetch callback and hides page
//! boundaries: each call to [`Paginator::next`] returns one item, fetching the
//! next page only once the buffered one is used up.
//!
//! Two cursor conventions are supported:
//! - offset pagination (`startAt` / `maxResults` / `total` / `isLast`), and
//! - token pagination (`nextPageToken` / `isLast`).
//!
//! # Example
//!
//! ```ignore
//! let mut issues = Paginator::offset(|cursor: Cursor| {
//!     let client = client.clone();
//!     async move {
//!         let request = client
//!             .request(Method::Get, "search")?
//!             .query("startAt", &cursor.offset().to_string())
//!             .build();
//!         let page: OffsetPage<Issue> = client.execute_json(request).await?;
//!         Ok(page.into())
//!     }
//! });
//!
//! while let Some(issue) = issues.next().await? {
//!     println!("{}", issue.key);
//! }
//! ```

use std::collections::VecDeque;
use std::future::Future;

use serde::Deserialize;

use crate::Result;

/// Where the next page begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    /// First page of a token-paginated listing.
    Start,
    /// Zero-based item offset.
    Offset(u64),
    /// Opaque continuation token.
    Token(String),
}

impl Cursor {
    /// Item offset; `0` for [`Cursor::Start`] and token cursors.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        match self {
            Self::Offset(offset) => *offset,
            Self::Start | Self::Token(_) => 0,
        }
    }

    /// Continuation token, if this is a token cursor.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Token(token) => Some(token),
            Self::Start | Self::Offset(_) => None,
        }
    }
}

/// Position metadata of a fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageInfo {
    /// Offset-paginated page.
    Offset {
        /// Offset of the first item on this page.
        start_at: u64,
        /// Page size the server applied.
        page_size: u64,
        /// Total number of items, when the server reports it.
        total: Option<u64>,
        /// Explicit last-page flag, when the server reports it.
        is_last: Option<bool>,
    },
    /// Token-paginated page.
    Token {
        /// Token for the following page.
        next_token: Option<String>,
        /// Explicit last-page flag, when the server reports it.
        is_last: Option<bool>,
    },
}

impl PageInfo {
    /// Offset page metadata without total or last flag.
    #[must_use]
    pub const fn offset(start_at: u64, page_size: u64) -> Self {
        Self::Offset {
            start_at,
            page_size,
            total: None,
            is_last: None,
        }
    }

    /// Token page metadata.
    #[must_use]
    pub const fn token(next_token: Option<String>) -> Self {
        Self::Token {
            next_token,
            is_last: None,
        }
    }

    /// Set the total item count (offset pages only).
    #[must_use]
    pub fn with_total(mut self, count: u64) -> Self {
        if let Self::Offset { total, .. } = &mut self {
            *total = Some(count);
        }
        self
    }

    /// Set the explicit last-page flag.
    #[must_use]
    pub fn with_is_last(mut self, last: bool) -> Self {
        match &mut self {
            Self::Offset { is_last, .. } | Self::Token { is_last, .. } => *is_last = Some(last),
        }
        self
    }

    /// Explicit last-page flag.
    #[must_use]
    pub const fn is_last(&self) -> Option<bool> {
        match self {
            Self::Offset { is_last, .. } | Self::Token { is_last, .. } => *is_last,
        }
    }

    /// Cursor of the page after this one, or `None` when the listing is exhausted.
    ///
    /// `fetched` is the number of items this page carried. `is_last == true`
    /// always ends the listing; without it, offset pages end once
    /// `start_at + page_size >= total`, on an empty page, or (with no total)
    /// on a short page, and token pages end on a missing or empty token.
    #[must_use]
    pub fn next_cursor(&self, fetched: usize) -> Option<Cursor> {
        if self.is_last() == Some(true) {
            return None;
        }

        match self {
            Self::Offset {
                start_at,
                page_size,
                total,
                is_last,
            } => {
                let fetched = u64::try_from(fetched).unwrap_or(u64::MAX);
                if fetched == 0 {
                    return None;
                }
                let next = start_at.saturating_add(fetched);
                if let Some(total) = *total {
                    if start_at.saturating_add(*page_size) >= total || next >= total {
                        return None;
                    }
                } else if is_last.is_none() && *page_size > 0 && fetched < *page_size {
                    return None;
                }
                Some(Cursor::Offset(next))
            }
            Self::Token { next_token, .. } => next_token
                .as_deref()
                .filter(|token| !token.is_empty())
                .map(|token| Cursor::Token(token.to_string())),
        }
    }
}

/// One fetched page: its items and where it sits in the listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Items on this page, in server order.
    pub items: Vec<T>,
    /// Position metadata.
    pub info: PageInfo,
}

impl<T> Page<T> {
    /// Creates a page.
    #[must_use]
    pub const fn new(items: Vec<T>, info: PageInfo) -> Self {
        Self { items, info }
    }
}

/// Offset-paginated wire envelope.
///
/// Items are read from `values`, `issues` or `items`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct OffsetPage<T> {
    /// Offset of the first item.
    #[serde(default)]
    pub start_at: u64,
    /// Page size the server applied.
    #[serde(default)]
    pub max_results: u64,
    /// Total item count.
    #[serde(default)]
    pub total: Option<u64>,
    /// Explicit last-page flag.
    #[serde(default)]
    pub is_last: Option<bool>,
    /// Items.
    #[serde(default, alias = "issues", alias = "items")]
    pub values: Vec<T>,
}

impl<T> From<OffsetPage<T>> for Page<T> {
    fn from(page: OffsetPage<T>) -> Self {
        Self::new(
            page.values,
            PageInfo::Offset {
                start_at: page.start_at,
                page_size: page.max_results,
                total: page.total,
                is_last: page.is_last,
            },
        )
    }
}

/// Token-paginated wire envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct TokenPage<T> {
    /// Token for the following page.
    #[serde(default)]
    pub next_page_token: Option<String>,
    /// Explicit last-page flag.
    #[serde(default)]
    pub is_last: Option<bool>,
    /// Items.
    #[serde(default, alias = "issues", alias = "items")]
    pub values: Vec<T>,
}

impl<T> From<TokenPage<T>> for Page<T> {
    fn from(page: TokenPage<T>) -> Self {
        Self::new(
            page.values,
            PageInfo::Token {
                next_token: page.next_page_token,
                is_last: page.is_last,
            },
        )
    }
}

/// Lazy, finite, non-restartable sequence of items over a paginated endpoint.
///
/// Built from `fetch(cursor) -> Future<Output = Result<Page<T>>>`. No request
/// is made until the first call to [`next`](Self::next). A fetch error is
/// returned once and ends the sequence, as does a token page whose next
/// token equals the one it was fetched with. To iterate again, build a new
/// paginator.
pub struct Paginator<T, F> {
    fetch: F,
    buffer: VecDeque<T>,
    next: Option<Cursor>,
    pages: usize,
}

impl<T, F> std::fmt::Debug for Paginator<T, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Paginator")
            .field("buffered", &self.buffer.len())
            .field("next", &self.next)
            .field("pages", &self.pages)
            .finish_non_exhaustive()
    }
}

impl<T, F, Fut> Paginator<T, F>
where
    F: FnMut(Cursor) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    /// Start from an explicit cursor.
    pub fn new(start: Cursor, fetch: F) -> Self {
        Self {
            fetch,
            buffer: VecDeque::new(),
            next: Some(start),
            pages: 0,
        }
    }

    /// Offset pagination starting at item 0.
    pub fn offset(fetch: F) -> Self {
        Self::new(Cursor::Offset(0), fetch)
    }

    /// Token pagination starting at the first page.
    pub fn token(fetch: F) -> Self {
        Self::new(Cursor::Start, fetch)
    }

    /// Number of pages fetched so far.
    #[must_use]
    pub const fn pages_fetched(&self) -> usize {
        self.pages
    }

    /// Advance to the next item.
    ///
    /// Returns `Ok(None)` once the listing is exhausted, and after a fetch
    /// error has been returned.
    pub async fn next(&mut self) -> Result<Option<T>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }

            // Taking the cursor first means a failed fetch leaves nothing to resume.
            let Some(cursor) = self.next.take() else {
                return Ok(None);
            };

            let used = cursor.token().map(str::to_owned);
            let page = (self.fetch)(cursor).await?;
            self.pages += 1;
            // A token equal to the one just sent never advances.
            self.next = page
                .info
                .next_cursor(page.items.len())
                .filter(|next| used.is_none() || next.token() != used.as_deref());
            self.buffer.extend(page.items);
        }
    }

    /// Collect all remaining items into a `Vec`.
    pub async fn collect(mut self) -> Result<Vec<T>> {
        let mut all = Vec::new();
        while let Some(item) = self.next().await? {
            all.push(item);
        }
        Ok(all)
    }

    /// Turn the paginator into a [`Stream`](futures_util::Stream) of items.
    #[cfg(feature = "stream")]
    pub fn into_stream(self) -> impl futures_util::Stream<Item = Result<T>> {
        futures_util::stream::try_unfold(self, |mut pager| async move {
            Ok(pager.next().await?.map(|item| (item, pager)))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert2::{check, let_assert};

    use super::*;
    use crate::Error;

    fn offset_source(items: Vec<u32>, page_size: usize) -> impl FnMut(Cursor) -> std::future::Ready<Result<Page<u32>>> {
        move |cursor| {
            let start = usize::try_from(cursor.offset()).unwrap_or(usize::MAX);
            let page: Vec<u32> = items.iter().skip(start).take(page_size).copied().collect();
            let info = PageInfo::offset(cursor.offset(), page_size as u64).with_total(items.len() as u64);
            std::future::ready(Ok(Page::new(page, info)))
        }
    }

    #[tokio::test]
    async fn yields_every_item_across_pages() {
        let source: Vec<u32> = (1..=8).collect();
        let mut pager = Paginator::offset(offset_source(source.clone(), 3));

        let mut seen = Vec::new();
        while let Some(item) = pager.next().await.expect("page") {
            seen.push(item);
        }

        check!(seen == source);
        check!(pager.pages_fetched() == 3);
        check!(pager.next().await.expect("exhausted").is_none());
    }

    #[tokio::test]
    async fn ninth_call_ends_sequence() {
        let mut pager = Paginator::offset(offset_source((0..8).collect(), 3));
        for _ in 0..8 {
            check!(pager.next().await.expect("item").is_some());
        }
        check!(pager.next().await.expect("end").is_none());
    }

    #[tokio::test]
    async fn no_fetch_before_first_next() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let pager = Paginator::offset(move |_cursor| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(Page::<u32>::new(vec![], PageInfo::offset(0, 10))))
        });

        check!(calls.load(Ordering::SeqCst) == 0);
        drop(pager);
    }

    #[tokio::test]
    async fn is_last_stops_even_when_total_says_more() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let pager = Paginator::offset(move |_cursor| {
            counter.fetch_add(1, Ordering::SeqCst);
            let info = PageInfo::offset(0, 2).with_total(100).with_is_last(true);
            std::future::ready(Ok(Page::new(vec![1, 2], info)))
        });

        let items = pager.collect().await.expect("items");
        check!(items == vec![1, 2]);
        check!(calls.load(Ordering::SeqCst) == 1);
    }

    #[tokio::test]
    async fn token_pages_follow_tokens() {
        let pager = Paginator::token(|cursor: Cursor| {
            let page = match cursor {
                Cursor::Start => Page::new(vec!["a", "b"], PageInfo::token(Some("p2".to_string()))),
                Cursor::Token(ref t) if t == "p2" => Page::new(vec!["c"], PageInfo::token(Some("p3".to_string()))),
                Cursor::Token(_) => Page::new(vec!["d"], PageInfo::token(Some(String::new()))),
                Cursor::Offset(_) => unreachable!("token listing"),
            };
            std::future::ready(Ok(page))
        });

        check!(pager.collect().await.expect("items") == vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn empty_token_page_is_skipped() {
        let pager = Paginator::token(|cursor: Cursor| {
            let page = match cursor {
                Cursor::Start => Page::new(vec![], PageInfo::token(Some("next".to_string()))),
                _ => Page::new(vec![7], PageInfo::token(None)),
            };
            std::future::ready(Ok(page))
        });

        check!(pager.collect().await.expect("items") == vec![7]);
    }

    #[tokio::test]
    async fn repeated_token_ends_listing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let pager = Paginator::token(move |_cursor: Cursor| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(Page::<u32>::new(vec![], PageInfo::token(Some("same".to_string())))))
        });

        check!(pager.collect().await.expect("items").is_empty());
        check!(calls.load(Ordering::SeqCst) == 2);
    }

    #[tokio::test]
    async fn fetch_error_terminates() {
        let pager_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pager_calls);
        let mut pager = Paginator::offset(move |cursor: Cursor| {
            counter.fetch_add(1, Ordering::SeqCst);
            let result = if cursor.offset() == 0 {
                Ok(Page::new(vec![1, 2], PageInfo::offset(0, 2).with_total(10)))
            } else {
                Err(Error::http(503, "unavailable"))
            };
            std::future::ready(result)
        });

        check!(pager.next().await.expect("first") == Some(1));
        check!(pager.next().await.expect("second") == Some(2));
        let_assert!(Err(err) = pager.next().await);
        check!(err.status() == Some(503));
        check!(pager.next().await.expect("terminated").is_none());
        check!(pager_calls.load(Ordering::SeqCst) == 2);
    }

    #[test]
    fn offset_exhaustion_rules() {
        check!(PageInfo::offset(0, 50).with_total(50).next_cursor(50) == None);
        check!(PageInfo::offset(0, 50).with_total(120).next_cursor(50) == Some(Cursor::Offset(50)));
        check!(PageInfo::offset(0, 50).next_cursor(50) == Some(Cursor::Offset(50)));
        check!(PageInfo::offset(0, 50).next_cursor(20) == None);
        check!(PageInfo::offset(0, 50).next_cursor(0) == None);
        check!(PageInfo::offset(0, 50).with_is_last(false).next_cursor(20) == Some(Cursor::Offset(20)));
    }

    #[test]
    fn offset_envelope_from_json() {
        let page: OffsetPage<serde_json::Value> = serde_json::from_str(
            r#"{"startAt":50,"maxResults":50,"total":75,"issues":[{"key":"A-1"}]}"#,
        )
        .expect("envelope");
        let page: Page<serde_json::Value> = page.into();

        check!(page.items.len() == 1);
        check!(page.info == PageInfo::offset(50, 50).with_total(75));
        check!(page.info.next_cursor(page.items.len()) == None);
    }

    #[test]
    fn token_envelope_from_json() {
        let page: TokenPage<u32> =
            serde_json::from_str(r#"{"nextPageToken":"abc","isLast":false,"values":[1,2]}"#)
                .expect("envelope");
        let page: Page<u32> = page.into();

        check!(page.info.next_cursor(2) == Some(Cursor::Token("abc".to_string())));
    }

    #[cfg(feature = "stream")]
    #[tokio::test]
    async fn stream_yields_items() {
        use futures_util::TryStreamExt;

        let stream = Paginator::offset(offset_source((0..5).collect(), 2)).into_stream();
        let items: Vec<u32> = stream.try_collect().await.expect("items");
        check!(items == vec![0, 1, 2, 3, 4]);
    }
}
