//! Per-call cancellation and deadlines.
//!
//! Every [`Request`](crate::Request) carries a [`CallContext`]. Layers that
//! wait (backoff, `Retry-After`, token refresh, the network exchange itself)
//! race the wait against the context, so cancelling a context guarantees that
//! no further attempt is started once the cancellation is observed.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Cancellation token plus optional deadline, scoped to one logical call.
///
/// Contexts are cheap to clone; clones observe the same cancellation.
/// Derived contexts ([`child`](Self::child), [`with_timeout`](Self::with_timeout))
/// are cancelled when their parent is, but cancelling a child leaves the
/// parent untouched.
///
/// # Example
///
/// ```ignore
/// let ctx = CallContext::background().with_timeout(Duration::from_secs(5));
/// let request = client.request(Method::Get, "issue/ABC-1")?.context(ctx).build();
/// ```
#[derive(Debug, Clone)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for CallContext {
    fn default() -> Self {
        Self::background()
    }
}

impl CallContext {
    /// A context that is never cancelled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Wrap an existing cancellation token.
    #[must_use]
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Derive a child context that expires after `timeout`.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a child context that expires at `deadline`.
    ///
    /// The earlier of the parent's deadline and `deadline` wins.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = self.deadline.map_or(deadline, |parent| parent.min(deadline));
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Derive a child context with the same deadline.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancel this context and every context derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The underlying cancellation token.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline, if any.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns the context error if the context is already done.
    ///
    /// Cancellation takes priority over an expired deadline.
    #[must_use]
    pub fn err(&self) -> Option<Error> {
        if self.token.is_cancelled() {
            return Some(Error::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Error::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> Error {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                () = self.token.cancelled() => Error::Cancelled,
                () = tokio::time::sleep_until(deadline) => Error::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                Error::Cancelled
            }
        }
    }

    /// Sleep for `duration`, returning early with the context error if the
    /// context is done first.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }

    /// Drive `future` to completion unless the context finishes first.
    ///
    /// An already-done context never polls `future`.
    pub async fn run<T, F>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            result = future => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use assert2::{check, let_assert};

    use super::*;

    #[tokio::test]
    async fn background_is_never_done() {
        let ctx = CallContext::background();
        check!(ctx.err().is_none());
        check!(ctx.deadline().is_none());
        check!(ctx.remaining().is_none());
    }

    #[tokio::test]
    async fn cancel_reports_cancelled() {
        let ctx = CallContext::background();
        ctx.cancel();
        let_assert!(Some(Error::Cancelled) = ctx.err());
    }

    #[tokio::test]
    async fn cancelling_parent_cancels_child() {
        let parent = CallContext::background();
        let child = parent.child();
        parent.cancel();
        check!(child.err().is_some_and(|err| err.is_cancelled()));
    }

    #[tokio::test]
    async fn cancelling_child_leaves_parent() {
        let parent = CallContext::background();
        let child = parent.child();
        child.cancel();
        check!(parent.err().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expires() {
        let ctx = CallContext::background().with_timeout(Duration::from_secs(1));
        check!(ctx.err().is_none());
        tokio::time::advance(Duration::from_secs(2)).await;
        let_assert!(Some(Error::DeadlineExceeded) = ctx.err());
    }

    #[tokio::test(start_paused = true)]
    async fn earlier_parent_deadline_wins() {
        let parent = CallContext::background().with_timeout(Duration::from_secs(1));
        let child = parent.with_timeout(Duration::from_secs(10));
        check!(child.deadline() == parent.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_completes_when_not_cancelled() {
        let ctx = CallContext::background();
        let result = ctx.sleep(Duration::from_millis(250)).await;
        check!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_is_interrupted_by_cancel() {
        let ctx = CallContext::background();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let result = ctx.sleep(Duration::from_secs(60)).await;

        let_assert!(Err(Error::Cancelled) = result);
        check!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_is_interrupted_by_deadline() {
        let ctx = CallContext::background().with_timeout(Duration::from_millis(100));
        let result = ctx.sleep(Duration::from_secs(60)).await;
        let_assert!(Err(Error::DeadlineExceeded) = result);
    }

    #[tokio::test]
    async fn run_skips_future_when_already_cancelled() {
        let ctx = CallContext::background();
        ctx.cancel();

        let polled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&polled);
        let result = ctx
            .run(async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;

        check!(result.is_err());
        check!(!polled.load(Ordering::SeqCst));
    }
}
