//! Ingestion boundary for loosely-shaped remote documents.
//!
//! Every document entering from the change feed passes through [`normalize`]
//! exactly once. Inward of this module, `Message` records are always fully
//! populated; null-coalescing lives here and nowhere else.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::error::{Result, SyncError};
use crate::models::{DeliveryStatus, Message, MessageKind};

/// Permissive wire shape. Everything optional; [`normalize`] decides what is
/// required, what is coalesced, and what is rejected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDocument {
    pub id: Option<String>,
    #[serde(alias = "roomId")]
    pub room_id: Option<String>,
    #[serde(alias = "senderId")]
    pub sender_id: Option<String>,
    pub text: Option<String>,
    #[serde(alias = "imageUrl")]
    pub image_url: Option<String>,
    #[serde(alias = "fileName")]
    pub file_name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Server wall clock, unix millis.
    #[serde(alias = "createdAt")]
    pub created_at: Option<i64>,
    pub seq: Option<i64>,
    pub status: Option<String>,
}

/// Parse one remote document into a fully-populated `Message`.
///
/// Requires a stable `id` and a `room_id`; everything else is coalesced or
/// validated. Empty text and an image without a URL are `Validation` errors
/// and never reach a store.
pub fn normalize(raw: RawDocument) -> Result<Message> {
    let id = raw
        .id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SyncError::Validation("document missing id".into()))?;
    let room_id = raw
        .room_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SyncError::Validation(format!("document {id} missing room id")))?;

    let kind = match raw.kind.as_deref().unwrap_or("text") {
        "text" => {
            let body = raw.text.unwrap_or_default();
            if body.trim().is_empty() {
                return Err(SyncError::Validation(format!("document {id}: empty text")));
            }
            MessageKind::Text { body }
        }
        "image" => {
            let url = raw
                .image_url
                .filter(|u| !u.is_empty())
                .ok_or_else(|| SyncError::Validation(format!("document {id}: image without url")))?;
            MessageKind::Image { url, caption: raw.text.filter(|t| !t.is_empty()) }
        }
        "file" => {
            let url = raw
                .image_url
                .filter(|u| !u.is_empty())
                .ok_or_else(|| SyncError::Validation(format!("document {id}: file without url")))?;
            MessageKind::File { url, name: raw.file_name.unwrap_or_else(|| "file".into()) }
        }
        other => {
            return Err(SyncError::Validation(format!("document {id}: unknown type {other:?}")));
        }
    };

    let created_at = raw
        .created_at
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or(DateTime::UNIX_EPOCH);

    // A seq-carrying document is confirmed regardless of what the remote
    // claims its status is.
    let status = if raw.seq.is_some() {
        DeliveryStatus::Sent
    } else {
        raw.status.as_deref().and_then(DeliveryStatus::parse).unwrap_or(DeliveryStatus::Pending)
    };

    Ok(Message {
        id,
        room_id,
        sender_id: raw.sender_id.filter(|s| !s.is_empty()).unwrap_or_else(|| "unknown".into()),
        kind,
        created_at,
        seq: raw.seq,
        status,
    })
}

/// Normalize a whole incoming batch, quarantining malformed documents with a
/// warning instead of failing the batch.
pub fn normalize_batch(raw: Vec<RawDocument>) -> Vec<Message> {
    raw.into_iter()
        .filter_map(|doc| match normalize(doc) {
            Ok(msg) => Some(msg),
            Err(e) => {
                warn!("quarantined malformed remote document: {e}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_text(id: &str, text: &str) -> RawDocument {
        RawDocument {
            id: Some(id.into()),
            room_id: Some("r1".into()),
            sender_id: Some("u1".into()),
            text: Some(text.into()),
            created_at: Some(1_700_000_000_000),
            seq: Some(1),
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize_text() {
        let msg = normalize(raw_text("m1", "hello")).unwrap();
        assert_eq!(msg.kind, MessageKind::Text { body: "hello".into() });
        assert_eq!(msg.status, DeliveryStatus::Sent);
        assert_eq!(msg.seq, Some(1));
    }

    #[test]
    fn test_empty_text_rejected() {
        let err = normalize(raw_text("m1", "   ")).unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[test]
    fn test_image_requires_url() {
        let mut raw = raw_text("m1", "caption");
        raw.kind = Some("image".into());
        assert!(matches!(normalize(raw.clone()), Err(SyncError::Validation(_))));

        raw.image_url = Some("https://x/a.png".into());
        let msg = normalize(raw).unwrap();
        assert_eq!(msg.kind.as_str(), "image");
        assert_eq!(msg.kind.url(), Some("https://x/a.png"));
    }

    #[test]
    fn test_missing_id_rejected() {
        let mut raw = raw_text("m1", "hi");
        raw.id = None;
        assert!(matches!(normalize(raw), Err(SyncError::Validation(_))));
    }

    #[test]
    fn test_coalesced_fields() {
        let mut raw = raw_text("m1", "hi");
        raw.sender_id = None;
        raw.created_at = None;
        raw.seq = None;
        raw.status = None;
        let msg = normalize(raw).unwrap();
        assert_eq!(msg.sender_id, "unknown");
        assert_eq!(msg.created_at, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(msg.status, DeliveryStatus::Pending);
    }

    #[test]
    fn test_batch_quarantines_bad_documents() {
        let batch = vec![raw_text("m1", "hi"), RawDocument::default(), raw_text("m2", "yo")];
        let msgs = normalize_batch(batch);
        assert_eq!(msgs.len(), 2);
    }
}
