//! Domain model structs persisted in the local SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to a presentation layer. Timestamps are Unix epoch milliseconds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Chat metadata as written by callers. `name` is the chat's own name and
/// may be empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chat {
    pub jid: String,
    pub name: String,
    pub is_group: bool,
    pub unread_count: i64,
    pub last_message_at: i64,
    pub last_message_preview: String,
}

/// A chat as returned by queries, with its display name resolved from the
/// current contact data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatView {
    pub jid: String,
    /// Chat name, else contact push name, else contact name, else `jid`.
    pub display_name: String,
    pub is_group: bool,
    pub unread_count: i64,
    pub last_message_at: i64,
    pub last_message_preview: String,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Lifecycle status of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Received,
    Queued,
    Sending,
    Sent,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Queued => "queued",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(Self::Received),
            "queued" => Ok(Self::Queued),
            "sending" => Ok(Self::Sending),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// A single chat message. `(chat_jid, msg_id)` is the idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub chat_jid: String,
    pub msg_id: String,
    pub sender_jid: String,
    /// Sender name as reported upstream. Query results carry the resolved
    /// display name here instead.
    pub sender_name: String,
    pub body: String,
    pub message_type: String,
    pub from_me: bool,
    pub status: MessageStatus,
    pub timestamp: i64,
}

/// Upstream messages are already delivered; ones we authored elsewhere count
/// as sent.
impl From<tether_shared::InboundMessage> for Message {
    fn from(m: tether_shared::InboundMessage) -> Self {
        let status = if m.from_me {
            MessageStatus::Sent
        } else {
            MessageStatus::Received
        };
        Self {
            chat_jid: m.chat_jid,
            msg_id: m.msg_id,
            sender_jid: m.sender_jid,
            sender_name: m.sender_name,
            body: m.body,
            message_type: m.message_type,
            from_me: m.from_me,
            status,
            timestamp: m.timestamp,
        }
    }
}

/// A full-text search match with a highlighted excerpt (`<<term>>`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchHit {
    pub message: Message,
    pub snippet: String,
}

/// Summary of one committed history batch.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchSummary {
    pub message_count: usize,
    pub chat_count: usize,
}

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

/// A known remote party. Empty fields never erase stored values.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    pub jid: String,
    /// Formal (address book) name.
    pub name: String,
    /// Name the party chose for themselves.
    pub push_name: String,
}

impl From<tether_shared::ContactUpdate> for Contact {
    fn from(c: tether_shared::ContactUpdate) -> Self {
        Self {
            jid: c.jid,
            name: c.name,
            push_name: c.push_name,
        }
    }
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Queued,
    Sending,
    Sent,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "sending" => Ok(Self::Sending),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// A locally queued outgoing message, keyed by the client-generated id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutboxEntry {
    pub client_msg_id: String,
    pub chat_jid: String,
    pub body: String,
    pub status: OutboxStatus,
    pub server_msg_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: i64,
}

// ---------------------------------------------------------------------------
// Identity mapping
// ---------------------------------------------------------------------------

/// Alternate identifier known upstream to belong to a canonical one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct IdentityMapping {
    pub alternate_jid: String,
    pub canonical_jid: String,
}
