use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed variant per message type. Remote documents are parsed into this
/// at the ingestion boundary; nothing inward of the feed sees loose shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageKind {
    Text { body: String },
    Image { url: String, caption: Option<String> },
    File { url: String, name: String },
}

impl MessageKind {
    /// Discriminant string as persisted in the `kind` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::File { .. } => "file",
        }
    }

    /// Display body: the text for text messages, the caption or file name
    /// for attachments.
    pub fn body(&self) -> &str {
        match self {
            Self::Text { body } => body,
            Self::Image { caption, .. } => caption.as_deref().unwrap_or(""),
            Self::File { name, .. } => name,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Text { .. } => None,
            Self::Image { url, .. } | Self::File { url, .. } => Some(url),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Optimistic local write, not yet acknowledged by the remote log.
    Pending,
    /// Confirmed by the remote log (carries a `seq`).
    Sent,
    /// Send failed locally. Never silently erased by a batch that merely
    /// omits this id; only a confirmed copy of the same id supersedes it.
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A single conversation entry.
///
/// `id` is client-generated and stable across the optimistic→confirmed
/// transition: the confirmed copy from the feed supersedes the pending one
/// in place. `seq` is server-assigned and monotonic per room; pending
/// messages carry none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    #[serde(flatten)]
    pub kind: MessageKind,
    pub created_at: DateTime<Utc>,
    pub seq: Option<i64>,
    pub status: DeliveryStatus,
}

impl Message {
    /// New optimistic text message, shown immediately pending confirmation.
    pub fn pending_text(room_id: &str, sender_id: &str, body: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            room_id: room_id.to_string(),
            sender_id: sender_id.to_string(),
            kind: MessageKind::Text { body: body.to_string() },
            created_at: Utc::now(),
            seq: None,
            status: DeliveryStatus::Pending,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.seq.is_some()
    }
}

/// Room-level sync state. `last_read_seqs` is written only by the read
/// position tracker, monotonically non-decreasing per user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRoom {
    pub id: String,
    pub last_seq: i64,
    pub last_read_seqs: HashMap<String, i64>,
    pub last_read_timestamps: HashMap<String, DateTime<Utc>>,
}

impl ChatRoom {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string(), ..Default::default() }
    }

    /// Unread count for one user. Never negative, even while
    /// `last_read_seqs[u] > last_seq` transiently between writes.
    pub fn unread(&self, user_id: &str) -> i64 {
        let read = self.last_read_seqs.get(user_id).copied().unwrap_or(0);
        (self.last_seq - read).max(0)
    }

    /// Record a read position, keeping it monotonically non-decreasing.
    pub fn mark_read(&mut self, user_id: &str, seq: i64, at: DateTime<Utc>) {
        let entry = self.last_read_seqs.entry(user_id.to_string()).or_insert(0);
        if seq > *entry {
            *entry = seq;
            self.last_read_timestamps.insert(user_id.to_string(), at);
        }
    }
}
