//! The boundary with the upstream service: the signals it delivers and the
//! capabilities the daemon calls back into.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde::Deserialize;
use tether_shared::{ContactUpdate, InboundMessage};
use tether_store::IdentityMapping;

use crate::error::{SendError, SyncError};

/// Outbound text capability. Only the outbox sender calls it.
#[async_trait]
pub trait TextSender: Send + Sync {
    /// Send `text` to `chat_jid` and return the server-assigned message id.
    ///
    /// `client_msg_id` is stable across retries of the same outbox entry;
    /// implementations that support idempotency tokens should forward it.
    async fn send_text(
        &self,
        chat_jid: &str,
        text: &str,
        client_msg_id: &str,
    ) -> Result<String, SendError>;
}

/// Source of the upstream's current alternate-to-canonical mapping.
#[async_trait]
pub trait IdentitySource: Send + Sync {
    async fn identity_mappings(&self) -> Result<Vec<IdentityMapping>, SyncError>;
}

/// One signal from the upstream connection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpstreamSignal {
    Connected,
    Disconnected,
    LoggedOut {
        #[serde(default)]
        reason: String,
    },
    Message(InboundMessage),
    HistorySync {
        #[serde(default)]
        messages: Vec<InboundMessage>,
        #[serde(default)]
        contacts: Vec<ContactUpdate>,
    },
    PushName {
        jid: String,
        push_name: String,
    },
    IdentityMap {
        mappings: Vec<IdentityMapping>,
    },
}

/// Last identity mapping pushed by the upstream.
#[derive(Debug, Default)]
pub struct IdentityCache {
    mappings: RwLock<Vec<IdentityMapping>>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, mappings: Vec<IdentityMapping>) {
        *self.mappings.write().unwrap_or_else(PoisonError::into_inner) = mappings;
    }

    pub fn len(&self) -> usize {
        self.mappings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl IdentitySource for IdentityCache {
    async fn identity_mappings(&self) -> Result<Vec<IdentityMapping>, SyncError> {
        Ok(self
            .mappings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
