//! Synchronization engine: projects upstream events into the store.
//!
//! The engine is the only consumer of the `upstream.` namespace. Every unit
//! of work (one message, one batch, one contact set) succeeds or fails on
//! its own; failures are logged and the unit is dropped, since the upstream
//! redelivers on reconnect.

use tether_shared::constants::NS_UPSTREAM;
use tether_shared::{Bus, ContactUpdate, Event, EventPayload, InboundMessage};
use tether_store::{BatchSummary, Contact, Message};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::SyncError;
use crate::{with_db, SharedDatabase};

#[derive(Clone)]
pub struct SyncEngine {
    db: SharedDatabase,
    bus: Bus,
}

impl SyncEngine {
    pub fn new(db: SharedDatabase, bus: Bus) -> Self {
        Self { db, bus }
    }

    /// Subscribe to upstream events and consume them until `cancel` fires.
    ///
    /// The subscription is registered before this returns, so nothing
    /// published afterwards is missed.
    pub fn spawn(self, capacity: usize, cancel: CancellationToken) -> JoinHandle<()> {
        let (mut rx, subscription) = self.bus.subscribe(NS_UPSTREAM, capacity);

        tokio::spawn(async move {
            info!("sync engine started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(event) => self.handle(event),
                        None => break,
                    },
                }
            }
            subscription.unsubscribe();
            info!("sync engine stopped");
        })
    }

    /// Apply one upstream event. Errors are logged, never returned.
    pub fn handle(&self, event: Event) {
        match event.payload {
            EventPayload::UpstreamMessage(message) => {
                let msg_id = message.msg_id.clone();
                if let Err(e) = self.ingest_message(message) {
                    error!(error = %e, msg_id = %msg_id, "failed to ingest message");
                }
            }
            EventPayload::UpstreamHistoryBatch(messages) => {
                let attempted = messages.len();
                match self.ingest_history(messages) {
                    Ok(summary) => info!(
                        messages = summary.message_count,
                        chats = summary.chat_count,
                        "history batch ingested"
                    ),
                    Err(e) => error!(error = %e, count = attempted, "failed to ingest history batch"),
                }
            }
            EventPayload::UpstreamContact(contact) => {
                if let Err(e) = self.ingest_contacts(vec![contact]) {
                    error!(error = %e, "failed to ingest contact");
                }
            }
            EventPayload::UpstreamContactBatch(contacts) => {
                let attempted = contacts.len();
                if let Err(e) = self.ingest_contacts(contacts) {
                    error!(error = %e, count = attempted, "failed to ingest contact batch");
                }
            }
            other => debug!(kind = other.kind(), "sync engine ignoring event"),
        }
    }

    /// Upsert one live message and announce it as `message.upserted`.
    pub fn ingest_message(&self, message: InboundMessage) -> Result<(), SyncError> {
        let message = Message::from(message.normalized());
        with_db(&self.db, |db| db.ingest_message(&message))?;

        self.bus.publish(EventPayload::MessageUpserted {
            chat_jid: message.chat_jid,
            msg_id: message.msg_id,
        });
        Ok(())
    }

    /// Apply a history batch atomically and announce its summary.
    pub fn ingest_history(&self, messages: Vec<InboundMessage>) -> Result<BatchSummary, SyncError> {
        let messages: Vec<Message> = messages
            .into_iter()
            .map(|m| Message::from(m.normalized()))
            .collect();
        let summary = with_db(&self.db, |db| db.ingest_history_batch(&messages))?;

        self.bus.publish(EventPayload::HistoryBatch {
            message_count: summary.message_count,
            chat_count: summary.chat_count,
        });
        Ok(summary)
    }

    /// Merge contacts and announce `sync.contacts` if any were written.
    pub fn ingest_contacts(&self, contacts: Vec<ContactUpdate>) -> Result<usize, SyncError> {
        let contacts: Vec<Contact> = contacts
            .into_iter()
            .map(|mut c| {
                c.jid = tether_shared::jid::normalize_jid(&c.jid);
                Contact::from(c)
            })
            .collect();
        let count = with_db(&self.db, |db| db.upsert_contacts(&contacts))?;

        if count > 0 {
            self.bus.publish(EventPayload::ContactsUpdated { count });
        }
        Ok(count)
    }
}
