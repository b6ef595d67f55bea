//! Per-room orchestration: feed batches in, merged snapshots and page
//! windows out, with asynchronous persistence to the local store.
//!
//! The session owns the current immutable snapshot for one room. Merge and
//! page rebuild are pure, so no lock guards them; the only atomic step is
//! the keyed swap into the [`ViewCache`]. Persistence is a side effect of
//! an already-materialized snapshot and never blocks the visible path.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use eddy_feed::{ChangeBatch, RemoteChangeFeed, Subscription, SubscriptionHandle};
use eddy_store::LocalStore;
use eddy_types::{DeliveryStatus, Message, SyncError};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::cache::ViewCache;
use crate::merge::{canonical_cmp, merge};
use crate::pages::{PagedWindow, rebuild_pages};

/// One optimistic mutation: the pre-mutation snapshot, the applied change,
/// and a mechanical rollback. Cancellation and retry reduce to calling the
/// right method; no ad hoc cache surgery.
pub struct MutationCommand {
    before: Vec<Message>,
    message: Message,
}

impl MutationCommand {
    pub fn new(before: &[Message], message: Message) -> Self {
        Self { before: before.to_vec(), message }
    }

    /// Snapshot with the pending message applied. A deliberate local
    /// overwrite: unlike a remote batch, it replaces even a `Failed` copy
    /// of the same id, which is what a retry is.
    pub fn apply(&self) -> Vec<Message> {
        upsert_into(&self.before, &self.message)
    }

    /// The pre-mutation snapshot, verbatim.
    pub fn rollback(&self) -> Vec<Message> {
        self.before.clone()
    }

    pub fn message(&self) -> &Message {
        &self.message
    }
}

pub struct RoomSession<F: RemoteChangeFeed> {
    feed: F,
    store: Arc<LocalStore>,
    cache: Arc<ViewCache<PagedWindow<Message>>>,
    page_size: usize,
    room_id: String,
    snapshot: Vec<Message>,
    handle: SubscriptionHandle,
    batches: mpsc::UnboundedReceiver<ChangeBatch>,
    in_flight: HashMap<String, MutationCommand>,
}

impl<F: RemoteChangeFeed> RoomSession<F> {
    /// Cold-start a room: load the offline mirror, publish the first
    /// window, then go live on the feed.
    pub async fn open(
        feed: F,
        store: Arc<LocalStore>,
        cache: Arc<ViewCache<PagedWindow<Message>>>,
        room_id: &str,
        page_size: usize,
    ) -> Result<Self> {
        let snapshot = load_snapshot(&store, room_id).await?;
        let Subscription { handle, batches } = feed.subscribe(room_id, None);

        let mut session = Self {
            feed,
            store,
            cache,
            page_size,
            room_id: room_id.to_string(),
            snapshot,
            handle,
            batches,
            in_flight: HashMap::new(),
        };
        session.publish_window();
        Ok(session)
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn snapshot(&self) -> &[Message] {
        &self.snapshot
    }

    /// Tear down the current subscription (exactly once) and go live on a
    /// different room, reloading its mirror.
    pub async fn switch_room(&mut self, room_id: &str) -> Result<()> {
        self.handle.cancel();
        self.in_flight.clear();

        self.snapshot = load_snapshot(&self.store, room_id).await?;
        self.room_id = room_id.to_string();
        let Subscription { handle, batches } = self.feed.subscribe(room_id, None);
        self.handle = handle;
        self.batches = batches;
        self.publish_window();
        Ok(())
    }

    /// Apply the next live batch. Returns false once the subscription
    /// stream has closed.
    pub async fn pump(&mut self) -> bool {
        match self.batches.recv().await {
            Some(batch) => {
                self.apply_batch(batch);
                true
            }
            None => false,
        }
    }

    /// Fold one remote batch into the current snapshot and swap the visible
    /// window. Persistence happens off the visible path; a failed local
    /// write is logged and retried implicitly by the next batch.
    pub fn apply_batch(&mut self, batch: ChangeBatch) {
        if batch.room_id != self.room_id {
            debug!("dropping batch for {} while viewing {}", batch.room_id, self.room_id);
            return;
        }

        // A confirmed copy arriving for an in-flight send settles it.
        for msg in &batch.messages {
            if msg.is_confirmed() {
                self.in_flight.remove(&msg.id);
            }
        }

        self.snapshot = merge(&self.snapshot, &batch.messages);
        self.publish_window();
        self.persist_async(self.snapshot.clone());
    }

    /// Optimistic send. Validates, shows the message as `Pending`
    /// immediately, and write-aheads it to the local store. The feed later
    /// supersedes it in place with the confirmed copy; on a send failure
    /// the caller reports back via [`fail_send`].
    ///
    /// [`fail_send`]: RoomSession::fail_send
    pub async fn begin_send(&mut self, message: Message) -> Result<String> {
        validate_outgoing(&message)?;

        self.cache.cancel_in_flight(&self.room_id);
        let command = MutationCommand::new(&self.snapshot, message.clone());

        self.snapshot = command.apply();
        self.publish_window();

        let store = self.store.clone();
        let room_id = self.room_id.clone();
        let ahead = message.clone();
        tokio::task::spawn_blocking(move || store.upsert_many(&room_id, &[ahead]))
            .await
            .context("write-ahead task panicked")??;

        let id = message.id.clone();
        self.in_flight.insert(id.clone(), command);
        Ok(id)
    }

    /// The remote send failed: restore the pre-mutation snapshot verbatim,
    /// then surface the message as `Failed` so it stays visible and
    /// retryable. The cache never shows a failed write as succeeded.
    pub async fn fail_send(&mut self, id: &str) -> Result<()> {
        let Some(command) = self.in_flight.remove(id) else {
            return Ok(());
        };

        let mut failed = command.message().clone();
        failed.status = DeliveryStatus::Failed;

        self.snapshot = upsert_into(&command.rollback(), &failed);
        self.publish_window();

        let store = self.store.clone();
        let room_id = self.room_id.clone();
        tokio::task::spawn_blocking(move || store.upsert_many(&room_id, &[failed]))
            .await
            .context("failed-status write task panicked")??;
        Ok(())
    }

    /// Remove a message from both the store and the visible snapshot.
    pub async fn delete(&mut self, id: &str) -> Result<()> {
        let store = self.store.clone();
        let room_id = self.room_id.clone();
        let owned = id.to_string();
        tokio::task::spawn_blocking(move || store.delete_by_id(&room_id, &owned))
            .await
            .context("delete task panicked")??;

        self.snapshot.retain(|m| m.id != id);
        self.in_flight.remove(id);
        self.publish_window();
        Ok(())
    }

    /// Rebuild the paged window from the current snapshot and swap it in.
    /// Goes through the token path: a writer whose key was cancelled since
    /// it started (an optimistic mutation bumped the generation) commits
    /// nothing instead of clobbering the newer window.
    fn publish_window(&self) {
        let token = self.cache.begin_write(&self.room_id);
        let previous = self.cache.get(&self.room_id).unwrap_or_default();
        let window = rebuild_pages(&self.snapshot, &previous, self.page_size, canonical_cmp);
        if !self.cache.commit(&token, window) {
            debug!("window for {} superseded before commit", self.room_id);
        }
    }

    fn persist_async(&self, snapshot: Vec<Message>) {
        let store = self.store.clone();
        let room_id = self.room_id.clone();
        tokio::spawn(async move {
            let result =
                tokio::task::spawn_blocking(move || store.upsert_many(&room_id, &snapshot)).await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("snapshot persistence failed: {e}"),
                Err(e) => error!("snapshot persistence task panicked: {e}"),
            }
        });
    }
}

/// Replace-or-insert one message by id, re-sorting canonically.
fn upsert_into(snapshot: &[Message], message: &Message) -> Vec<Message> {
    let mut next = snapshot.to_vec();
    match next.iter_mut().find(|m| m.id == message.id) {
        Some(slot) => *slot = message.clone(),
        None => next.push(message.clone()),
    }
    next.sort_by(canonical_cmp);
    next
}

async fn load_snapshot(store: &Arc<LocalStore>, room_id: &str) -> Result<Vec<Message>> {
    let store = store.clone();
    let room_id = room_id.to_string();
    let mut snapshot = tokio::task::spawn_blocking(move || store.get_all(&room_id))
        .await
        .context("store load task panicked")??;
    snapshot.sort_by(canonical_cmp);
    Ok(snapshot)
}

/// Reject invalid drafts before they reach any store.
fn validate_outgoing(message: &Message) -> Result<(), SyncError> {
    match &message.kind {
        eddy_types::MessageKind::Text { body } if body.trim().is_empty() => {
            Err(SyncError::Validation("empty message body".into()))
        }
        eddy_types::MessageKind::Image { url, .. } | eddy_types::MessageKind::File { url, .. }
            if url.is_empty() =>
        {
            Err(SyncError::Validation("attachment without url".into()))
        }
        _ => Ok(()),
    }
}
