use chrono::DateTime;
use eddy_types::{DeliveryStatus, Message, MessageKind, Result, SyncError};
use rusqlite::Connection;

use crate::LocalStore;

impl LocalStore {
    /// Write a batch of messages in one all-or-nothing transaction. A single
    /// statement failure aborts the whole batch; no partial writes are ever
    /// visible to readers.
    pub fn upsert_many(&self, room_id: &str, messages: &[Message]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction().map_err(write_err)?;
            {
                let mut stmt = tx
                    .prepare(
                        "INSERT INTO messages
                            (id, room_id, sender_id, body, kind, image_url, status, created_at, seq)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                         ON CONFLICT(id) DO UPDATE SET
                            sender_id = excluded.sender_id,
                            body = excluded.body,
                            kind = excluded.kind,
                            image_url = excluded.image_url,
                            status = excluded.status,
                            created_at = excluded.created_at,
                            seq = excluded.seq",
                    )
                    .map_err(write_err)?;

                for msg in messages {
                    stmt.execute(rusqlite::params![
                        msg.id,
                        room_id,
                        msg.sender_id,
                        msg.kind.body(),
                        msg.kind.as_str(),
                        msg.kind.url(),
                        msg.status.as_str(),
                        msg.created_at.timestamp_millis(),
                        msg.seq.unwrap_or(0),
                    ])
                    .map_err(write_err)?;
                }
            }
            tx.commit().map_err(write_err)
        })
    }

    pub fn delete_by_id(&self, room_id: &str, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM messages WHERE room_id = ?1 AND id = ?2", [room_id, id])
                .map_err(write_err)?;
            Ok(())
        })
    }

    /// All rows for a room, `seq` ascending. Cold-start load and migration
    /// tooling both read through here.
    pub fn get_all(&self, room_id: &str) -> Result<Vec<Message>> {
        self.with_conn(|conn| query_all(conn, room_id))
    }

    pub fn table_exists(&self) -> Result<bool> {
        self.with_conn(|conn| {
            table_exists(conn).map_err(write_err)
        })
    }
}

/// Whether the messages table exists at all; gates fresh-create vs the
/// migrate path at startup.
pub fn table_exists(conn: &Connection) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'messages'",
        [],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn query_all(conn: &Connection, room_id: &str) -> Result<Vec<Message>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, sender_id, body, kind, image_url, status, created_at, seq
             FROM messages WHERE room_id = ?1
             ORDER BY seq ASC, created_at ASC",
        )
        .map_err(write_err)?;

    let rows = stmt
        .query_map([room_id], |row| {
            let id: String = row.get(0)?;
            let sender_id: String = row.get(1)?;
            let body: String = row.get(2)?;
            let kind: String = row.get(3)?;
            let image_url: Option<String> = row.get(4)?;
            let status: String = row.get(5)?;
            let created_at: i64 = row.get(6)?;
            let seq: i64 = row.get(7)?;
            Ok((id, sender_id, body, kind, image_url, status, created_at, seq))
        })
        .map_err(write_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(write_err)?;

    let messages = rows
        .into_iter()
        .map(|(id, sender_id, body, kind, image_url, status, created_at, seq)| {
            let kind = match kind.as_str() {
                "image" => MessageKind::Image {
                    url: image_url.unwrap_or_default(),
                    caption: Some(body).filter(|b| !b.is_empty()),
                },
                "file" => MessageKind::File { url: image_url.unwrap_or_default(), name: body },
                _ => MessageKind::Text { body },
            };
            Message {
                id,
                room_id: room_id.to_string(),
                sender_id,
                kind,
                created_at: DateTime::from_timestamp_millis(created_at)
                    .unwrap_or(DateTime::UNIX_EPOCH),
                seq: Some(seq).filter(|s| *s > 0),
                status: DeliveryStatus::parse(&status).unwrap_or(DeliveryStatus::Sent),
            }
        })
        .collect();

    Ok(messages)
}

fn write_err(e: rusqlite::Error) -> SyncError {
    SyncError::LocalWrite(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str, seq: i64, body: &str) -> Message {
        Message {
            id: id.into(),
            room_id: "r1".into(),
            sender_id: "u1".into(),
            kind: MessageKind::Text { body: body.into() },
            created_at: DateTime::from_timestamp_millis(1_700_000_000_000 + seq).unwrap(),
            seq: Some(seq),
            status: DeliveryStatus::Sent,
        }
    }

    #[test]
    fn test_upsert_roundtrip_ordered_by_seq() {
        let store = LocalStore::open_in_memory().unwrap();
        store.upsert_many("r1", &[msg("c", 3, "three"), msg("a", 1, "one")]).unwrap();
        store.upsert_many("r1", &[msg("b", 2, "two")]).unwrap();

        let all = store.get_all("r1").unwrap();
        assert_eq!(all.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_upsert_overwrites_in_place() {
        let store = LocalStore::open_in_memory().unwrap();
        store.upsert_many("r1", &[msg("a", 1, "draft")]).unwrap();
        store.upsert_many("r1", &[msg("a", 1, "edited")]).unwrap();

        let all = store.get_all("r1").unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].kind.body(), "edited");
    }

    #[test]
    fn test_pending_message_roundtrips_without_seq() {
        let store = LocalStore::open_in_memory().unwrap();
        let mut pending = msg("p1", 0, "on its way");
        pending.seq = None;
        pending.status = DeliveryStatus::Pending;
        store.upsert_many("r1", &[pending]).unwrap();

        let all = store.get_all("r1").unwrap();
        assert_eq!(all[0].seq, None);
        assert_eq!(all[0].status, DeliveryStatus::Pending);
    }

    #[test]
    fn test_delete_by_id() {
        let store = LocalStore::open_in_memory().unwrap();
        store.upsert_many("r1", &[msg("a", 1, "one"), msg("b", 2, "two")]).unwrap();
        store.delete_by_id("r1", "a").unwrap();

        let all = store.get_all("r1").unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "b");
    }

    #[test]
    fn test_rooms_are_isolated() {
        let store = LocalStore::open_in_memory().unwrap();
        store.upsert_many("r1", &[msg("a", 1, "one")]).unwrap();
        store.upsert_many("r2", &[msg("b", 1, "uno")]).unwrap();

        assert_eq!(store.get_all("r1").unwrap().len(), 1);
        assert_eq!(store.get_all("r2").unwrap().len(), 1);
    }

    #[test]
    fn test_image_roundtrip() {
        let store = LocalStore::open_in_memory().unwrap();
        let mut m = msg("i1", 5, "");
        m.kind = MessageKind::Image { url: "https://x/p.png".into(), caption: None };
        store.upsert_many("r1", &[m.clone()]).unwrap();

        let all = store.get_all("r1").unwrap();
        assert_eq!(all[0].kind, m.kind);
    }
}
