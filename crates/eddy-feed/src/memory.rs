//! In-process feed used by tests and local development.
//!
//! Keeps the same contract a production backend would: subscriptions emit
//! full ordered snapshots capped at [`BATCH_LIMIT`], fetches page with
//! opaque cursors, teardown is per-subscription and exactly-once.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use eddy_types::{Message, RawDocument, Result, SyncError, ingest};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::{BATCH_LIMIT, ChangeBatch, Cursor, FetchPage, RemoteChangeFeed, Subscription, SubscriptionHandle};

#[derive(Default)]
struct RoomState {
    messages: Vec<Message>,
    /// Subscriber registry: sub id -> (sender, lower bound).
    subscribers: HashMap<Uuid, (mpsc::UnboundedSender<ChangeBatch>, Option<DateTime<Utc>>)>,
}

/// Shared in-memory event log keyed by room.
#[derive(Clone, Default)]
pub struct InMemoryFeed {
    rooms: Arc<RwLock<HashMap<String, RoomState>>>,
}

impl InMemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest raw remote documents for a room: normalize (quarantining
    /// malformed ones), store, and emit a fresh snapshot batch to every
    /// live subscriber.
    pub fn publish(&self, room_id: &str, docs: Vec<RawDocument>) {
        self.publish_messages(room_id, ingest::normalize_batch(docs));
    }

    /// Ingest already-normalized messages. Test convenience.
    pub fn publish_messages(&self, room_id: &str, messages: Vec<Message>) {
        let mut rooms = self.rooms.write().expect("feed lock poisoned");
        let room = rooms.entry(room_id.to_string()).or_default();

        for msg in messages {
            match room.messages.iter_mut().find(|m| m.id == msg.id) {
                Some(slot) => *slot = msg,
                None => room.messages.push(msg),
            }
        }

        let log = &room.messages;
        room.subscribers.retain(|_, (tx, since)| {
            let batch = snapshot_batch(room_id, log, *since);
            // A send failure means the receiver is gone; drop the entry.
            tx.send(batch).is_ok()
        });
    }

    /// Highest confirmed seq for a room, as the remote log sees it.
    pub fn last_seq(&self, room_id: &str) -> i64 {
        let rooms = self.rooms.read().expect("feed lock poisoned");
        rooms
            .get(room_id)
            .map(|r| r.messages.iter().filter_map(|m| m.seq).max().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl RemoteChangeFeed for InMemoryFeed {
    fn subscribe(&self, room_id: &str, since: Option<DateTime<Utc>>) -> Subscription {
        if room_id.is_empty() {
            return Subscription::noop();
        }

        let sub_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut rooms = self.rooms.write().expect("feed lock poisoned");
            let room = rooms.entry(room_id.to_string()).or_default();

            // Initial snapshot so a new subscriber does not wait for the
            // next remote write.
            let _ = tx.send(snapshot_batch(room_id, &room.messages, since));
            room.subscribers.insert(sub_id, (tx, since));
        }

        let rooms = self.rooms.clone();
        let key = room_id.to_string();
        let handle = SubscriptionHandle::new(move || {
            if let Ok(mut rooms) = rooms.write() {
                if let Some(room) = rooms.get_mut(&key) {
                    room.subscribers.remove(&sub_id);
                }
            }
            debug!("subscription {sub_id} for room {key} torn down");
        });

        Subscription { handle, batches: rx }
    }

    async fn fetch(
        &self,
        room_id: &str,
        cursor: Option<&Cursor>,
        page_size: usize,
    ) -> Result<FetchPage> {
        if page_size == 0 {
            return Err(SyncError::Feed("fetch with zero page size".into()));
        }

        let rooms = self.rooms.read().expect("feed lock poisoned");
        let mut ordered: Vec<&Message> =
            rooms.get(room_id).map(|r| r.messages.iter().collect()).unwrap_or_default();
        // Sort at the same millisecond precision the cursor carries, so
        // sub-millisecond timestamp spread cannot reorder rows around the
        // cursor position and skip or repeat them.
        ordered.sort_by_key(|m| Reverse((m.created_at.timestamp_millis(), m.id.clone())));

        // Position strictly after the cursor's (created_at, id) pair, so a
        // cursor stays valid even if its exact row was deleted meanwhile.
        let start = match cursor.map(decode_cursor).transpose()? {
            Some((millis, id)) => ordered
                .iter()
                .position(|m| (m.created_at.timestamp_millis(), m.id.as_str()) < (millis, id.as_str()))
                .unwrap_or(ordered.len()),
            None => 0,
        };

        let items: Vec<Message> =
            ordered.iter().skip(start).take(page_size).map(|m| (*m).clone()).collect();
        let is_last_page = start + items.len() >= ordered.len();
        let next_cursor = if is_last_page { None } else { items.last().map(mint_cursor) };

        Ok(FetchPage { items, next_cursor, is_last_page })
    }
}

fn snapshot_batch(room_id: &str, messages: &[Message], since: Option<DateTime<Utc>>) -> ChangeBatch {
    let mut snapshot: Vec<Message> = messages
        .iter()
        .filter(|m| since.is_none_or(|s| m.created_at >= s))
        .cloned()
        .collect();
    snapshot.sort_by_key(|m| Reverse((m.created_at, m.id.clone())));
    snapshot.truncate(BATCH_LIMIT);
    ChangeBatch { room_id: room_id.to_string(), messages: snapshot }
}

fn mint_cursor(last: &Message) -> Cursor {
    Cursor::new(format!("{}:{}", last.created_at.timestamp_millis(), last.id))
}

fn decode_cursor(cursor: &Cursor) -> Result<(i64, String)> {
    let (millis, id) = cursor
        .token()
        .split_once(':')
        .ok_or_else(|| SyncError::Feed(format!("malformed cursor {:?}", cursor.token())))?;
    let millis = millis
        .parse()
        .map_err(|_| SyncError::Feed(format!("malformed cursor {:?}", cursor.token())))?;
    Ok((millis, id.to_string()))
}
