//! Abstract ordered-change-feed contract.
//!
//! The core never speaks a wire protocol; it consumes this trait. A live
//! subscription delivers full ordered snapshots (not deltas) — dedup and
//! merge are the consumer's job. One-shot paged fetches use opaque cursors
//! minted only by a prior fetch from the same feed.

pub mod memory;

use chrono::{DateTime, Utc};
use eddy_types::{Message, Result};
use tokio::sync::mpsc;

pub use memory::InMemoryFeed;

/// Cap on documents per change batch.
pub const BATCH_LIMIT: usize = 50;

/// Opaque pagination token. Continue a fetch by passing back the token the
/// previous page produced; no other component recomputes one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(String);

impl Cursor {
    /// Mint a token. Feed implementations only.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

/// One emission from a live subscription: a full ordered snapshot of the
/// newest documents for a room, `created_at` descending, at most
/// [`BATCH_LIMIT`] entries.
#[derive(Debug, Clone)]
pub struct ChangeBatch {
    pub room_id: String,
    pub messages: Vec<Message>,
}

/// Result of a one-shot paged fetch, ordered `created_at` descending.
#[derive(Debug, Clone)]
pub struct FetchPage {
    pub items: Vec<Message>,
    pub next_cursor: Option<Cursor>,
    pub is_last_page: bool,
}

/// Caller-owned teardown for one live subscription.
///
/// Cancellation runs exactly once per setup: explicit [`cancel`] consumes
/// the teardown closure, and dropping an un-cancelled handle runs it too.
/// There is no module-level unsubscribe state anywhere.
///
/// [`cancel`]: SubscriptionHandle::cancel
pub struct SubscriptionHandle {
    teardown: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionHandle {
    pub fn new(teardown: impl FnOnce() + Send + 'static) -> Self {
        Self { teardown: Some(Box::new(teardown)) }
    }

    /// No-op handle, returned for invalid subscriptions (e.g. an empty room
    /// id) so callers need no defensive branching.
    pub fn noop() -> Self {
        Self { teardown: None }
    }

    pub fn cancel(&mut self) {
        if let Some(f) = self.teardown.take() {
            f();
        }
    }

    pub fn is_active(&self) -> bool {
        self.teardown.is_some()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// A live subscription: the batch stream plus its teardown handle.
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub batches: mpsc::UnboundedReceiver<ChangeBatch>,
}

impl Subscription {
    /// Closed, inert subscription for invalid inputs.
    pub fn noop() -> Self {
        let (_, rx) = mpsc::unbounded_channel();
        Self { handle: SubscriptionHandle::noop(), batches: rx }
    }
}

/// The remote ordered event log, as the core sees it.
pub trait RemoteChangeFeed {
    /// Open a live subscription for one room, optionally bounded below by a
    /// timestamp. An empty `room_id` yields an inert subscription rather
    /// than an error.
    fn subscribe(&self, room_id: &str, since: Option<DateTime<Utc>>) -> Subscription;

    /// One-shot page, ordered `created_at` descending. Pass the previous
    /// page's `next_cursor` to continue.
    fn fetch(
        &self,
        room_id: &str,
        cursor: Option<&Cursor>,
        page_size: usize,
    ) -> impl Future<Output = Result<FetchPage>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_cancel_runs_exactly_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let mut handle = SubscriptionHandle::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handle.is_active());
        handle.cancel();
        handle.cancel();
        drop(handle);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_cancels_unreleased_handle() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        {
            let _handle = SubscriptionHandle::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_noop_handle_is_inert() {
        let mut handle = SubscriptionHandle::noop();
        assert!(!handle.is_active());
        handle.cancel();
    }
}
