//! Operations the presentation layer performs against a running session.

use serde::Serialize;
use tether_shared::jid::normalize_jid;
use tether_shared::{State, StatusMachine};
use uuid::Uuid;

use crate::error::SyncError;
use crate::{with_db, SharedDatabase};

/// Queue `body` for delivery to `chat_jid` and return the generated client
/// id. The outbox sender picks it up on its next tick.
pub fn submit_text(db: &SharedDatabase, chat_jid: &str, body: &str) -> Result<String, SyncError> {
    let chat_jid = normalize_jid(chat_jid);
    if chat_jid.is_empty() {
        return Err(SyncError::InvalidRequest("chat id must not be empty"));
    }
    if body.trim().is_empty() {
        return Err(SyncError::InvalidRequest("message body must not be empty"));
    }

    let client_msg_id = Uuid::new_v4().to_string();
    with_db(db, |db| db.queue_outbox(&client_msg_id, &chat_jid, body))?;
    tracing::debug!(client_msg_id = %client_msg_id, chat_jid = %chat_jid, "message queued");
    Ok(client_msg_id)
}

/// Point-in-time summary of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub state: State,
    /// Number of stored chats.
    pub chats: i64,
    /// Number of stored messages.
    pub messages: i64,
    /// Outbox entries still waiting to be sent.
    pub pending_outbox: usize,
}

impl SessionSnapshot {
    pub fn capture(db: &SharedDatabase, status: &StatusMachine) -> Result<Self, SyncError> {
        let (chats, messages, pending_outbox) = with_db(db, |db| {
            Ok((
                db.chat_count()?,
                db.message_count()?,
                db.pending_outbox()?.len(),
            ))
        })?;
        Ok(Self {
            state: status.current(),
            chats,
            messages,
            pending_outbox,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_shared;
    use tether_shared::Bus;
    use tether_store::OutboxStatus;

    #[test]
    fn test_submit_queues_with_fresh_id() {
        let (_dir, db) = temp_shared();
        let a = submit_text(&db, "chat@s.whatsapp.net", "hi").unwrap();
        let b = submit_text(&db, "chat@s.whatsapp.net", "hi").unwrap();
        assert_ne!(a, b);

        let entry = db.lock().unwrap().get_outbox_entry(&a).unwrap();
        assert_eq!(entry.status, OutboxStatus::Queued);
        assert_eq!(entry.body, "hi");
    }

    #[test]
    fn test_submit_rejects_blank_input() {
        let (_dir, db) = temp_shared();
        assert!(matches!(
            submit_text(&db, "  ", "hi"),
            Err(SyncError::InvalidRequest(_))
        ));
        assert!(matches!(
            submit_text(&db, "chat@s", " \n"),
            Err(SyncError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_snapshot_counts() {
        let (_dir, db) = temp_shared();
        let status = StatusMachine::new(Bus::new());
        submit_text(&db, "chat@s", "queued").unwrap();

        let snapshot = SessionSnapshot::capture(&db, &status).unwrap();
        assert_eq!(
            snapshot,
            SessionSnapshot {
                state: State::Booting,
                chats: 0,
                messages: 0,
                pending_outbox: 1,
            }
        );
    }
}
