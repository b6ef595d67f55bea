//! End-to-end session flow against the in-memory feed and a real sqlite
//! store: cold start, live batches, optimistic sends, failure rollback,
//! room switching, and offline restart.

use std::sync::Arc;

use chrono::DateTime;
use eddy_feed::InMemoryFeed;
use eddy_store::LocalStore;
use eddy_sync::{PagedWindow, RoomSession, ViewCache};
use eddy_types::{DeliveryStatus, Message, MessageKind, SyncError};

const PAGE_SIZE: usize = 4;

fn confirmed(room: &str, id: &str, seq: i64) -> Message {
    Message {
        id: id.into(),
        room_id: room.into(),
        sender_id: "remote-user".into(),
        kind: MessageKind::Text { body: format!("message {id}") },
        created_at: DateTime::from_timestamp_millis(1_000 * seq).unwrap(),
        seq: Some(seq),
        status: DeliveryStatus::Sent,
    }
}

struct Fixture {
    feed: InMemoryFeed,
    store: Arc<LocalStore>,
    cache: Arc<ViewCache<PagedWindow<Message>>>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            feed: InMemoryFeed::new(),
            store: Arc::new(LocalStore::open_in_memory().unwrap()),
            cache: Arc::new(ViewCache::new()),
        }
    }

    async fn open(&self, room: &str) -> RoomSession<InMemoryFeed> {
        RoomSession::open(
            self.feed.clone(),
            self.store.clone(),
            self.cache.clone(),
            room,
            PAGE_SIZE,
        )
        .await
        .unwrap()
    }

    fn visible_ids(&self, room: &str) -> Vec<String> {
        self.cache
            .get(room)
            .map(|w| w.flatten().iter().map(|m| m.id.clone()).collect())
            .unwrap_or_default()
    }
}

#[tokio::test]
async fn live_batches_update_window_and_store() {
    let fx = Fixture::new();
    fx.feed.publish_messages("r1", (1..=6).map(|s| confirmed("r1", &format!("m{s}"), s)).collect());

    let mut session = fx.open("r1").await;
    // initial snapshot batch
    assert!(session.pump().await);

    let ids = fx.visible_ids("r1");
    assert_eq!(ids, vec!["m1", "m2", "m3", "m4", "m5", "m6"]);

    let window = fx.cache.get("r1").unwrap();
    let sizes: Vec<usize> = window.pages.iter().map(|p| p.items.len()).collect();
    assert_eq!(sizes, vec![4, 2]);
    assert!(window.pages[1].is_last_page);

    // a new remote write lands as another full snapshot
    fx.feed.publish_messages("r1", vec![confirmed("r1", "m7", 7)]);
    assert!(session.pump().await);
    assert_eq!(fx.visible_ids("r1").len(), 7);

    // persistence is async; yield until it lands
    for _ in 0..100 {
        if fx.store.get_all("r1").unwrap().len() == 7 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert_eq!(fx.store.get_all("r1").unwrap().len(), 7);
}

#[tokio::test]
async fn optimistic_send_confirm_in_place() {
    let fx = Fixture::new();
    let mut session = fx.open("r1").await;
    session.pump().await;

    let draft = Message::pending_text("r1", "me", "hello there");
    let id = session.begin_send(draft).await.unwrap();

    // pending immediately visible and write-ahead persisted
    let visible = fx.cache.get("r1").unwrap().flatten();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].status, DeliveryStatus::Pending);
    assert_eq!(fx.store.get_all("r1").unwrap().len(), 1);

    // remote confirms under the same id
    let mut done = confirmed("r1", &id, 1);
    done.kind = MessageKind::Text { body: "hello there".into() };
    fx.feed.publish_messages("r1", vec![done]);
    session.pump().await;

    let visible = fx.cache.get("r1").unwrap().flatten();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].status, DeliveryStatus::Sent);
    assert_eq!(visible[0].seq, Some(1));
}

#[tokio::test]
async fn failed_send_rolls_back_then_surfaces_failed() {
    let fx = Fixture::new();
    fx.feed.publish_messages("r1", vec![confirmed("r1", "m1", 1)]);
    let mut session = fx.open("r1").await;
    session.pump().await;

    let id = session.begin_send(Message::pending_text("r1", "me", "doomed")).await.unwrap();
    session.fail_send(&id).await.unwrap();

    let visible = fx.cache.get("r1").unwrap().flatten();
    assert_eq!(visible.len(), 2);
    let failed = visible.iter().find(|m| m.id == id).unwrap();
    assert_eq!(failed.status, DeliveryStatus::Failed);

    // the failed copy survives remote batches that omit it
    fx.feed.publish_messages("r1", vec![confirmed("r1", "m2", 2)]);
    session.pump().await;
    assert!(session.snapshot().iter().any(|m| m.status == DeliveryStatus::Failed));
}

#[tokio::test]
async fn send_orphans_stale_window_writers() {
    let fx = Fixture::new();
    fx.feed.publish_messages("r1", vec![confirmed("r1", "m1", 1)]);
    let mut session = fx.open("r1").await;
    session.pump().await;

    // a slow background rebuild starts before the user hits send
    let stale = fx.cache.begin_write("r1");

    let id = session.begin_send(Message::pending_text("r1", "me", "racing")).await.unwrap();
    assert!(fx.visible_ids("r1").contains(&id));

    // the straggler commits after the send; it must lose, not clobber
    assert!(!fx.cache.commit(&stale, PagedWindow::default()));
    assert!(fx.visible_ids("r1").contains(&id));
}

#[tokio::test]
async fn validation_rejects_before_any_store() {
    let fx = Fixture::new();
    let mut session = fx.open("r1").await;

    let err = session
        .begin_send(Message::pending_text("r1", "me", "   "))
        .await
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<SyncError>(), Some(SyncError::Validation(_))));
    assert!(fx.store.get_all("r1").unwrap().is_empty());
    assert!(fx.visible_ids("r1").is_empty());
}

#[tokio::test]
async fn delete_removes_from_store_and_view() {
    let fx = Fixture::new();
    fx.feed
        .publish_messages("r1", vec![confirmed("r1", "m1", 1), confirmed("r1", "m2", 2)]);
    let mut session = fx.open("r1").await;
    session.pump().await;

    session.delete("m1").await.unwrap();
    assert_eq!(fx.visible_ids("r1"), vec!["m2"]);
    assert!(fx.store.get_all("r1").unwrap().iter().all(|m| m.id != "m1"));
}

#[tokio::test]
async fn switch_room_tears_down_and_reloads() {
    let fx = Fixture::new();
    fx.feed.publish_messages("r1", vec![confirmed("r1", "a1", 1)]);
    fx.feed.publish_messages("r2", vec![confirmed("r2", "b1", 1)]);

    let mut session = fx.open("r1").await;
    session.pump().await;
    assert_eq!(fx.visible_ids("r1"), vec!["a1"]);

    session.switch_room("r2").await.unwrap();
    session.pump().await;
    assert_eq!(session.room_id(), "r2");
    assert_eq!(fx.visible_ids("r2"), vec!["b1"]);

    // writes to the old room no longer reach this session
    fx.feed.publish_messages("r1", vec![confirmed("r1", "a2", 2)]);
    fx.feed.publish_messages("r2", vec![confirmed("r2", "b2", 2)]);
    session.pump().await;
    assert_eq!(session.snapshot().len(), 2);
    assert!(session.snapshot().iter().all(|m| m.room_id == "r2"));
}

#[tokio::test]
async fn cold_start_serves_offline_mirror() {
    let fx = Fixture::new();
    fx.store
        .upsert_many("r1", &[confirmed("r1", "m2", 2), confirmed("r1", "m1", 1)])
        .unwrap();

    // no remote data published; the mirror alone feeds the first window
    let session = fx.open("r1").await;
    assert_eq!(fx.visible_ids("r1"), vec!["m1", "m2"]);
    assert_eq!(session.snapshot().len(), 2);
}
