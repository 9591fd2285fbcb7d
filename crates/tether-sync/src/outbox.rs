//! Outbox sender: delivers queued outgoing messages while the session is
//! ready.
//!
//! Entries are sent one at a time in enqueue order. Each entry's message
//! row is written as `sending` before the network call so readers see it
//! immediately, then corrected to `sent` or `failed`.

use std::sync::Arc;
use std::time::Duration;

use tether_shared::{Bus, EventPayload, State, StatusMachine};
use tether_store::{Message, MessageStatus, OutboxEntry};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::SyncError;
use crate::upstream::TextSender;
use crate::{with_db, SharedDatabase};

#[derive(Clone)]
pub struct OutboxSender {
    db: SharedDatabase,
    bus: Bus,
    status: Arc<StatusMachine>,
    sender: Arc<dyn TextSender>,
}

impl OutboxSender {
    pub fn new(
        db: SharedDatabase,
        bus: Bus,
        status: Arc<StatusMachine>,
        sender: Arc<dyn TextSender>,
    ) -> Self {
        Self {
            db,
            bus,
            status,
            sender,
        }
    }

    /// Requeue entries left `sending` by a previous run. Call once before
    /// the first tick.
    pub fn recover(&self) -> Result<usize, SyncError> {
        with_db(&self.db, |db| db.recover_outbox())
    }

    /// Poll the outbox every `interval` until `cancel` fires. A tick in
    /// progress always finishes before the loop exits.
    pub fn spawn(self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_ms = interval.as_millis() as u64, "outbox sender started");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.process_pending().await {
                            error!(error = %e, "failed to read outbox");
                        }
                    }
                }
            }
            info!("outbox sender stopped");
        })
    }

    /// Send every queued entry, oldest first. Does nothing unless the
    /// session is [`State::Ready`], and stops early if it leaves that state.
    ///
    /// Returns the number of entries attempted.
    pub async fn process_pending(&self) -> Result<usize, SyncError> {
        if self.status.current() != State::Ready {
            return Ok(0);
        }

        let pending = with_db(&self.db, |db| db.pending_outbox())?;
        let mut attempted = 0;
        for entry in pending {
            if self.status.current() != State::Ready {
                debug!(remaining = %entry.client_msg_id, "session left ready, pausing outbox");
                break;
            }
            let client_msg_id = entry.client_msg_id.clone();
            match self.send_one(entry).await {
                Ok(true) => attempted += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(error = %e, client_msg_id = %client_msg_id, "outbox entry abandoned");
                }
            }
        }
        Ok(attempted)
    }

    /// Returns `false` if the entry was no longer queued.
    ///
    /// Once claimed, an entry always reaches the send call and always ends
    /// with a `send_ack` or `send_failed` event. Store errors after the claim
    /// are logged rather than propagated.
    async fn send_one(&self, entry: OutboxEntry) -> Result<bool, SyncError> {
        let claimed = with_db(&self.db, |db| db.mark_outbox_sending(&entry.client_msg_id))?;
        if !claimed {
            return Ok(false);
        }

        let optimistic = outgoing_message(&entry, MessageStatus::Sending);
        let written = with_db(&self.db, |db| {
            db.touch_chat(&entry.chat_jid, optimistic.timestamp, &entry.body)?;
            db.upsert_message(&optimistic)
        });
        match written {
            Ok(()) => self.bus.publish(EventPayload::MessageUpserted {
                chat_jid: entry.chat_jid.clone(),
                msg_id: entry.client_msg_id.clone(),
            }),
            Err(e) => warn!(
                error = %e,
                client_msg_id = %entry.client_msg_id,
                "optimistic write failed, sending anyway"
            ),
        }

        match self
            .sender
            .send_text(&entry.chat_jid, &entry.body, &entry.client_msg_id)
            .await
        {
            Ok(server_msg_id) => {
                let sent = outgoing_message(&entry, MessageStatus::Sent);
                let recorded = with_db(&self.db, |db| {
                    db.mark_outbox_sent(&entry.client_msg_id, &server_msg_id)?;
                    db.upsert_message(&sent)
                });
                if let Err(e) = recorded {
                    error!(error = %e, client_msg_id = %entry.client_msg_id, "failed to record send ack");
                }
                info!(
                    client_msg_id = %entry.client_msg_id,
                    server_msg_id = %server_msg_id,
                    "message sent"
                );
                self.bus.publish(EventPayload::SendAck {
                    client_msg_id: entry.client_msg_id,
                    server_msg_id,
                });
            }
            Err(e) => {
                let failed = outgoing_message(&entry, MessageStatus::Failed);
                let reason = e.to_string();
                let recorded = with_db(&self.db, |db| {
                    db.mark_outbox_failed(&entry.client_msg_id, &reason)?;
                    db.upsert_message(&failed)
                });
                if let Err(e) = recorded {
                    error!(error = %e, client_msg_id = %entry.client_msg_id, "failed to record send failure");
                }
                warn!(client_msg_id = %entry.client_msg_id, error = %reason, "send failed");
                self.bus.publish(EventPayload::SendFailed {
                    client_msg_id: entry.client_msg_id,
                    error: reason,
                });
            }
        }
        Ok(true)
    }
}

/// The message row mirroring an outbox entry, keyed by the client id.
fn outgoing_message(entry: &OutboxEntry, status: MessageStatus) -> Message {
    Message {
        chat_jid: entry.chat_jid.clone(),
        msg_id: entry.client_msg_id.clone(),
        sender_jid: String::new(),
        sender_name: String::new(),
        body: entry.body.clone(),
        message_type: "text".to_string(),
        from_me: true,
        status,
        timestamp: entry.created_at,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tether_shared::constants::NS_MESSAGE;
    use tether_store::OutboxStatus;

    use super::*;
    use crate::error::SendError;
    use crate::test_support::temp_shared;

    /// Records every call; fails sends whose body is `"fail"`.
    #[derive(Default)]
    struct RecordingSender {
        calls: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl TextSender for RecordingSender {
        async fn send_text(
            &self,
            chat_jid: &str,
            text: &str,
            client_msg_id: &str,
        ) -> Result<String, SendError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push((chat_jid.into(), text.into(), client_msg_id.into()));
            if text == "fail" {
                return Err(SendError::new("upstream rejected"));
            }
            Ok(format!("srv-{}", calls.len()))
        }
    }

    fn ready_machine(bus: &Bus) -> Arc<StatusMachine> {
        let machine = Arc::new(StatusMachine::new(bus.clone()));
        for s in [State::Connecting, State::Syncing, State::Ready] {
            machine.transition(s).unwrap();
        }
        machine
    }

    #[tokio::test]
    async fn test_does_nothing_unless_ready() {
        let (_dir, db) = temp_shared();
        let bus = Bus::new();
        let sender = Arc::new(RecordingSender::default());
        let outbox = OutboxSender::new(
            db.clone(),
            bus.clone(),
            Arc::new(StatusMachine::new(bus)),
            sender.clone(),
        );
        db.lock().unwrap().queue_outbox("c1", "chat@s", "hi").unwrap();

        assert_eq!(outbox.process_pending().await.unwrap(), 0);
        assert!(sender.calls.lock().unwrap().is_empty());
        assert_eq!(
            db.lock().unwrap().get_outbox_entry("c1").unwrap().status,
            OutboxStatus::Queued
        );
    }

    #[tokio::test]
    async fn test_sends_in_order_and_records_outcomes() {
        let (_dir, db) = temp_shared();
        let bus = Bus::new();
        let (mut rx, _sub) = bus.subscribe(NS_MESSAGE, 16);
        let sender = Arc::new(RecordingSender::default());
        let outbox = OutboxSender::new(db.clone(), bus.clone(), ready_machine(&bus), sender.clone());
        {
            let db = db.lock().unwrap();
            db.queue_outbox("c1", "chat@s", "first").unwrap();
            db.queue_outbox("c2", "chat@s", "fail").unwrap();
            db.queue_outbox("c3", "chat@s", "third").unwrap();
        }

        assert_eq!(outbox.process_pending().await.unwrap(), 3);

        let order: Vec<_> = sender
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, id)| id.clone())
            .collect();
        assert_eq!(order, ["c1", "c2", "c3"]);

        let db_guard = db.lock().unwrap();
        let c1 = db_guard.get_outbox_entry("c1").unwrap();
        assert_eq!(c1.status, OutboxStatus::Sent);
        assert_eq!(c1.server_msg_id.as_deref(), Some("srv-1"));
        let c2 = db_guard.get_outbox_entry("c2").unwrap();
        assert_eq!(c2.status, OutboxStatus::Failed);
        assert_eq!(c2.error_message.as_deref(), Some("upstream rejected"));

        assert_eq!(db_guard.get_message("chat@s", "c1").unwrap().status, MessageStatus::Sent);
        assert_eq!(db_guard.get_message("chat@s", "c2").unwrap().status, MessageStatus::Failed);
        assert!(db_guard.get_message("chat@s", "c3").unwrap().from_me);
        drop(db_guard);

        let kinds: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind())
            .collect();
        assert_eq!(
            kinds,
            [
                "message.upserted",
                "message.send_ack",
                "message.upserted",
                "message.send_failed",
                "message.upserted",
                "message.send_ack",
            ]
        );

        // Terminal entries are never retried.
        assert_eq!(outbox.process_pending().await.unwrap(), 0);
    }

    fn reject_message_writes(db: &SharedDatabase) {
        db.lock()
            .unwrap()
            .conn()
            .execute_batch(
                "CREATE TRIGGER reject_messages BEFORE INSERT ON messages
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();
    }

    #[tokio::test]
    async fn test_store_fault_after_claim_still_sends_and_acks() {
        let (_dir, db) = temp_shared();
        let bus = Bus::new();
        let (mut rx, _sub) = bus.subscribe(NS_MESSAGE, 16);
        let sender = Arc::new(RecordingSender::default());
        let outbox = OutboxSender::new(db.clone(), bus.clone(), ready_machine(&bus), sender.clone());
        db.lock().unwrap().queue_outbox("c1", "chat@s", "hi").unwrap();
        reject_message_writes(&db);

        assert_eq!(outbox.process_pending().await.unwrap(), 1);

        assert_eq!(sender.calls.lock().unwrap().len(), 1);
        let entry = db.lock().unwrap().get_outbox_entry("c1").unwrap();
        assert_eq!(entry.status, OutboxStatus::Sent);
        assert_eq!(entry.server_msg_id.as_deref(), Some("srv-1"));

        let kinds: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind())
            .collect();
        assert_eq!(kinds, ["message.send_ack"]);

        // Nothing is left behind for a later tick.
        assert_eq!(outbox.process_pending().await.unwrap(), 0);
        assert_eq!(sender.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_store_fault_after_claim_still_reports_failure() {
        let (_dir, db) = temp_shared();
        let bus = Bus::new();
        let (mut rx, _sub) = bus.subscribe(NS_MESSAGE, 16);
        let sender = Arc::new(RecordingSender::default());
        let outbox = OutboxSender::new(db.clone(), bus.clone(), ready_machine(&bus), sender.clone());
        db.lock().unwrap().queue_outbox("c1", "chat@s", "fail").unwrap();
        reject_message_writes(&db);

        assert_eq!(outbox.process_pending().await.unwrap(), 1);

        assert_eq!(
            db.lock().unwrap().get_outbox_entry("c1").unwrap().status,
            OutboxStatus::Failed
        );
        match rx.try_recv().unwrap().payload {
            EventPayload::SendFailed { client_msg_id, error } => {
                assert_eq!(client_msg_id, "c1");
                assert_eq!(error, "upstream rejected");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_recover_makes_interrupted_entries_sendable() {
        let (_dir, db) = temp_shared();
        let bus = Bus::new();
        let sender = Arc::new(RecordingSender::default());
        let outbox = OutboxSender::new(db.clone(), bus.clone(), ready_machine(&bus), sender.clone());
        {
            let db = db.lock().unwrap();
            db.queue_outbox("c1", "chat@s", "hi").unwrap();
            db.mark_outbox_sending("c1").unwrap();
        }

        assert_eq!(outbox.process_pending().await.unwrap(), 0);
        assert_eq!(outbox.recover().unwrap(), 1);
        assert_eq!(outbox.process_pending().await.unwrap(), 1);
        assert_eq!(
            db.lock().unwrap().get_outbox_entry("c1").unwrap().status,
            OutboxStatus::Sent
        );
    }
}
