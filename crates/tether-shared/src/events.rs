//! Typed bus events.
//!
//! Every event has a kind string (`namespace.name`) used for prefix routing
//! and a fixed payload shape per kind. Serialized form is
//! `{"at": ..., "kind": ..., "payload": ...}` for presentation layers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::status::StatusChange;
use crate::types::{ContactUpdate, InboundMessage};

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            at: Utc::now(),
            payload,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}

impl From<EventPayload> for Event {
    fn from(payload: EventPayload) -> Self {
        Self::new(payload)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "payload")]
pub enum EventPayload {
    // -- upstream-origin, consumed by the sync engine --
    #[serde(rename = "upstream.message")]
    UpstreamMessage(InboundMessage),
    #[serde(rename = "upstream.history_batch")]
    UpstreamHistoryBatch(Vec<InboundMessage>),
    #[serde(rename = "upstream.contact")]
    UpstreamContact(ContactUpdate),
    #[serde(rename = "upstream.contact_batch")]
    UpstreamContactBatch(Vec<ContactUpdate>),

    // -- connection lifecycle and ingestion summaries --
    #[serde(rename = "sync.connected")]
    Connected,
    #[serde(rename = "sync.disconnected")]
    Disconnected,
    #[serde(rename = "sync.history_batch")]
    HistoryBatch {
        message_count: usize,
        chat_count: usize,
    },
    #[serde(rename = "sync.contacts")]
    ContactsUpdated { count: usize },

    // -- session --
    #[serde(rename = "session.status_changed")]
    StatusChanged(StatusChange),
    #[serde(rename = "session.logged_out")]
    LoggedOut { reason: String },

    // -- store changes visible to readers --
    #[serde(rename = "message.upserted")]
    MessageUpserted { chat_jid: String, msg_id: String },
    #[serde(rename = "message.reconciled")]
    MessagesReconciled { merged: usize },
    #[serde(rename = "message.send_ack")]
    SendAck {
        client_msg_id: String,
        server_msg_id: String,
    },
    #[serde(rename = "message.send_failed")]
    SendFailed { client_msg_id: String, error: String },
}

impl EventPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpstreamMessage(_) => "upstream.message",
            Self::UpstreamHistoryBatch(_) => "upstream.history_batch",
            Self::UpstreamContact(_) => "upstream.contact",
            Self::UpstreamContactBatch(_) => "upstream.contact_batch",
            Self::Connected => "sync.connected",
            Self::Disconnected => "sync.disconnected",
            Self::HistoryBatch { .. } => "sync.history_batch",
            Self::ContactsUpdated { .. } => "sync.contacts",
            Self::StatusChanged(_) => "session.status_changed",
            Self::LoggedOut { .. } => "session.logged_out",
            Self::MessageUpserted { .. } => "message.upserted",
            Self::MessagesReconciled { .. } => "message.reconciled",
            Self::SendAck { .. } => "message.send_ack",
            Self::SendFailed { .. } => "message.send_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::State;

    #[test]
    fn test_serialized_kind_matches_routing_kind() {
        let payloads = vec![
            EventPayload::Connected,
            EventPayload::HistoryBatch {
                message_count: 2,
                chat_count: 1,
            },
            EventPayload::StatusChanged(StatusChange {
                from: State::Booting,
                to: State::Connecting,
            }),
            EventPayload::SendFailed {
                client_msg_id: "c1".into(),
                error: "boom".into(),
            },
        ];
        for payload in payloads {
            let event = Event::new(payload);
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["kind"], event.kind());
            assert!(value.get("at").is_some());
        }
    }

    #[test]
    fn test_status_change_payload_shape() {
        let event = Event::new(EventPayload::StatusChanged(StatusChange {
            from: State::Syncing,
            to: State::Ready,
        }));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["payload"]["from"], "SYNCING");
        assert_eq!(value["payload"]["to"], "READY");
    }
}
