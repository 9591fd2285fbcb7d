use serde::{Deserialize, Serialize};

use crate::jid::normalize_jid;

/// A message as delivered by the upstream service, before it is projected
/// into the store. Timestamps are Unix epoch milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat_jid: String,
    pub msg_id: String,
    #[serde(default)]
    pub sender_jid: String,
    #[serde(default)]
    pub sender_name: String,
    #[serde(default)]
    pub body: String,
    #[serde(default = "default_message_type")]
    pub message_type: String,
    #[serde(default)]
    pub from_me: bool,
    pub timestamp: i64,
}

impl InboundMessage {
    /// Return a copy with chat and sender identifiers normalized.
    pub fn normalized(mut self) -> Self {
        self.chat_jid = normalize_jid(&self.chat_jid);
        self.sender_jid = normalize_jid(&self.sender_jid);
        self
    }
}

fn default_message_type() -> String {
    "text".to_string()
}

/// An identity signal about a remote party. Empty fields carry no
/// information and never erase stored data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactUpdate {
    pub jid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub push_name: String,
}
