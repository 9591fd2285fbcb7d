//! End-to-end behaviour of the sync crate against an on-disk store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tether_shared::constants::NS_MESSAGE;
use tether_shared::{Bus, EventPayload, InboundMessage, State, StatusMachine};
use tether_store::{Database, MessageStatus, OutboxStatus};
use tether_sync::{
    shared, submit_text, IdentityCache, Lifecycle, OutboxSender, SendError, SharedDatabase,
    SyncEngine, TextSender, UpstreamSignal,
};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

fn open(dir: &tempfile::TempDir) -> SharedDatabase {
    shared(Database::open_at(&dir.path().join("tether.db")).unwrap())
}

fn inbound(chat: &str, id: &str, body: &str, ts: i64) -> InboundMessage {
    InboundMessage {
        chat_jid: chat.into(),
        msg_id: id.into(),
        sender_jid: String::new(),
        sender_name: String::new(),
        body: body.into(),
        message_type: "text".into(),
        from_me: false,
        timestamp: ts,
    }
}

fn ready(bus: &Bus) -> Arc<StatusMachine> {
    let status = Arc::new(StatusMachine::new(bus.clone()));
    for s in [State::Connecting, State::Syncing, State::Ready] {
        status.transition(s).unwrap();
    }
    status
}

/// Poll `check` until it holds or two seconds pass.
async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

/// Blocks every send until released, so a test can look at the store
/// while the network call is in flight.
struct GatedSender {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl TextSender for GatedSender {
    async fn send_text(&self, _chat: &str, _text: &str, _id: &str) -> Result<String, SendError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok("srv-1".into())
    }
}

struct AlwaysOk;

#[async_trait]
impl TextSender for AlwaysOk {
    async fn send_text(&self, _chat: &str, _text: &str, id: &str) -> Result<String, SendError> {
        Ok(format!("srv-{id}"))
    }
}

#[tokio::test]
async fn test_upstream_signals_land_in_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);
    let bus = Bus::new();
    let status = Arc::new(StatusMachine::new(bus.clone()));
    let cancel = CancellationToken::new();
    let engine = SyncEngine::new(db.clone(), bus.clone()).spawn(64, cancel.clone());
    let lifecycle = Lifecycle::new(status.clone(), bus.clone(), Arc::new(IdentityCache::new()));

    lifecycle.handle(UpstreamSignal::Connected);
    lifecycle.handle(UpstreamSignal::HistorySync {
        messages: vec![inbound("a@s.whatsapp.net", "h1", "old", 1)],
        contacts: Vec::new(),
    });
    lifecycle.handle(UpstreamSignal::Message(inbound("a@s.whatsapp.net", "m1", "v1", 10)));
    lifecycle.handle(UpstreamSignal::Message(inbound("a@s.whatsapp.net", "m1", "v2", 10)));

    eventually(|| {
        let db = db.lock().unwrap();
        db.get_message("a@s.whatsapp.net", "m1")
            .map(|m| m.body == "v2")
            .unwrap_or(false)
    })
    .await;
    assert_eq!(status.current(), State::Ready);
    assert_eq!(db.lock().unwrap().message_count().unwrap(), 2);

    cancel.cancel();
    engine.await.unwrap();
}

#[tokio::test]
async fn test_outgoing_message_is_visible_while_sending() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);
    let bus = Bus::new();
    let sender = Arc::new(GatedSender {
        entered: Notify::new(),
        release: Notify::new(),
    });
    let outbox = OutboxSender::new(db.clone(), bus.clone(), ready(&bus), sender.clone());
    db.lock().unwrap().queue_outbox("c1", "chat@s", "hi").unwrap();

    let worker = {
        let outbox = outbox.clone();
        tokio::spawn(async move { outbox.process_pending().await })
    };
    sender.entered.notified().await;

    let rows = db.lock().unwrap().list_messages("chat@s", None, 10).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, MessageStatus::Sending);
    assert!(rows[0].from_me);
    assert_eq!(rows[0].body, "hi");

    sender.release.notify_one();
    assert_eq!(worker.await.unwrap().unwrap(), 1);
    let rows = db.lock().unwrap().list_messages("chat@s", None, 10).unwrap();
    assert_eq!(rows[0].status, MessageStatus::Sent);
}

#[tokio::test]
async fn test_interrupted_send_is_retried_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = open(&dir);
        let db = db.lock().unwrap();
        db.queue_outbox("c1", "chat@s", "hi").unwrap();
        db.mark_outbox_sending("c1").unwrap();
        // Process dies here.
    }

    let db = open(&dir);
    let bus = Bus::new();
    let outbox = OutboxSender::new(db.clone(), bus.clone(), ready(&bus), Arc::new(AlwaysOk));
    assert_eq!(outbox.recover().unwrap(), 1);
    assert_eq!(
        db.lock().unwrap().get_outbox_entry("c1").unwrap().status,
        OutboxStatus::Queued
    );

    assert_eq!(outbox.process_pending().await.unwrap(), 1);
    let entry = db.lock().unwrap().get_outbox_entry("c1").unwrap();
    assert_eq!(entry.status, OutboxStatus::Sent);
    assert_eq!(entry.server_msg_id.as_deref(), Some("srv-c1"));
}

#[tokio::test]
async fn test_spawned_sender_delivers_submitted_text() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);
    let bus = Bus::new();
    let (mut acks, _sub) = bus.subscribe("message.send_ack", 8);
    let cancel = CancellationToken::new();
    let task = OutboxSender::new(db.clone(), bus.clone(), ready(&bus), Arc::new(AlwaysOk))
        .spawn(Duration::from_millis(10), cancel.clone());

    let id = submit_text(&db, "chat@s", "hello").unwrap();
    let ack = tokio::time::timeout(Duration::from_secs(2), acks.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        ack.payload,
        EventPayload::SendAck {
            client_msg_id: id.clone(),
            server_msg_id: format!("srv-{id}"),
        }
    );

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_missed_notifications_are_recovered_by_rereading_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);
    let bus = Bus::new();
    let engine = SyncEngine::new(db.clone(), bus.clone());
    let (mut rx, _sub) = bus.subscribe(NS_MESSAGE, 1);

    for i in 0..5 {
        engine
            .ingest_message(inbound("a@s", &format!("m{i}"), "x", i))
            .unwrap();
    }

    // Only the first notification fit; the rest were dropped.
    assert!(rx.try_recv().is_ok());
    assert!(rx.try_recv().is_err());
    assert_eq!(bus.dropped(), 4);

    // The store still has everything.
    let rows = db.lock().unwrap().list_messages("a@s", None, 50).unwrap();
    assert_eq!(rows.len(), 5);
}
