//! Per-user, per-room read position bookkeeping.
//!
//! Unread counts derive purely from `ChatRoom` state
//! ([`ChatRoom::unread`]); this module owns the write side, driven by
//! view-blur events.

use std::collections::HashMap;

use chrono::Utc;
use eddy_types::{Message, Result};
use tracing::warn;

/// Destination for read-position writes — in production the remote room
/// document, in tests an in-memory room directory.
pub trait ReadPositionUpdater {
    fn update(
        &self,
        room_id: &str,
        user_id: &str,
        seq: i64,
        at: chrono::DateTime<Utc>,
    ) -> Result<()>;
}

/// Tracks the last read seq persisted per `(room, user)` and issues at most
/// one remote update per blur event.
#[derive(Default)]
pub struct ReadPositionTracker {
    last_persisted: HashMap<(String, String), i64>,
}

impl ReadPositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// View-blur hook. Computes the candidate read position from the
    /// currently loaded messages and persists it if it moved forward.
    ///
    /// The update is fire-and-forget: a failure is logged and the cached
    /// value left untouched, so the next blur re-issues it naturally —
    /// there is no retry loop and no error surfaces to the view.
    pub fn on_blur(
        &mut self,
        room_id: &str,
        user_id: &str,
        loaded: &[Message],
        updater: &impl ReadPositionUpdater,
    ) {
        let candidate = loaded.iter().filter_map(|m| m.seq).max().unwrap_or(0);
        let key = (room_id.to_string(), user_id.to_string());
        let last = self.last_persisted.get(&key).copied().unwrap_or(0);

        // Strictly greater keeps the persisted value monotonically
        // non-decreasing even when a partially loaded window blurs.
        if candidate <= last {
            return;
        }

        match updater.update(room_id, user_id, candidate, Utc::now()) {
            Ok(()) => {
                self.last_persisted.insert(key, candidate);
            }
            Err(e) => {
                warn!("read position update failed for {room_id}/{user_id}: {e}");
            }
        }
    }

    pub fn last_persisted(&self, room_id: &str, user_id: &str) -> Option<i64> {
        self.last_persisted.get(&(room_id.to_string(), user_id.to_string())).copied()
    }
}
