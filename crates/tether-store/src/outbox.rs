//! Outgoing message queue.
//!
//! Entries move `queued -> sending -> sent | failed`. The only backwards
//! edge is [`Database::recover_outbox`], run once at startup.

use rusqlite::{params, OptionalExtension};

use crate::database::{now_millis, Database};
use crate::error::{Result, StoreError};
use crate::models::{OutboxEntry, OutboxStatus};

const OUTBOX_COLUMNS: &str =
    "client_msg_id, chat_jid, body, status, server_msg_id, error_message, created_at";

impl Database {
    /// Queue a message for sending. Queuing the same client id twice keeps
    /// the first entry.
    pub fn queue_outbox(&self, client_msg_id: &str, chat_jid: &str, body: &str) -> Result<OutboxEntry> {
        let now = now_millis();
        self.conn().execute(
            "INSERT INTO outbox (client_msg_id, chat_jid, body, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'queued', ?4, ?4)
             ON CONFLICT(client_msg_id) DO NOTHING",
            params![client_msg_id, chat_jid, body, now],
        )?;
        self.get_outbox_entry(client_msg_id)
    }

    /// Entries still waiting to be sent, oldest first.
    pub fn pending_outbox(&self) -> Result<Vec<OutboxEntry>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM outbox
             WHERE status = 'queued'
             ORDER BY created_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map([], row_to_outbox_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    pub fn get_outbox_entry(&self, client_msg_id: &str) -> Result<OutboxEntry> {
        self.conn()
            .query_row(
                &format!("SELECT {OUTBOX_COLUMNS} FROM outbox WHERE client_msg_id = ?1"),
                params![client_msg_id],
                row_to_outbox_entry,
            )
            .optional()?
            .ok_or(StoreError::NotFound)
    }

    /// Claim a queued entry. Returns `false` if it was not `queued`.
    pub fn mark_outbox_sending(&self, client_msg_id: &str) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE outbox SET status = 'sending', updated_at = ?2
             WHERE client_msg_id = ?1 AND status = 'queued'",
            params![client_msg_id, now_millis()],
        )?;
        Ok(changed > 0)
    }

    /// Record a successful send. Terminal entries are left alone.
    pub fn mark_outbox_sent(&self, client_msg_id: &str, server_msg_id: &str) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE outbox SET status = 'sent', server_msg_id = ?2, error_message = NULL, updated_at = ?3
             WHERE client_msg_id = ?1 AND status IN ('queued', 'sending')",
            params![client_msg_id, server_msg_id, now_millis()],
        )?;
        Ok(changed > 0)
    }

    /// Record a failed send with its error text. Terminal entries are left
    /// alone.
    pub fn mark_outbox_failed(&self, client_msg_id: &str, error: &str) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE outbox SET status = 'failed', error_message = ?2, updated_at = ?3
             WHERE client_msg_id = ?1 AND status IN ('queued', 'sending')",
            params![client_msg_id, error, now_millis()],
        )?;
        Ok(changed > 0)
    }

    /// Requeue entries whose send outcome is unknown because the process
    /// stopped mid-send. Returns how many were requeued.
    pub fn recover_outbox(&self) -> Result<usize> {
        let changed = self.conn().execute(
            "UPDATE outbox SET status = 'queued', updated_at = ?1 WHERE status = 'sending'",
            params![now_millis()],
        )?;
        if changed > 0 {
            tracing::warn!(count = changed, "requeued outbox entries interrupted mid-send");
        }
        Ok(changed)
    }
}

fn row_to_outbox_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutboxEntry> {
    let status_str: String = row.get(3)?;
    let status = status_str.parse::<OutboxStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(OutboxEntry {
        client_msg_id: row.get(0)?,
        chat_jid: row.get(1)?,
        body: row.get(2)?,
        status,
        server_msg_id: row.get(4)?,
        error_message: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::temp_db;

    #[test]
    fn test_queue_and_fetch() {
        let (_dir, db) = temp_db();
        let entry = db.queue_outbox("c1", "chat@s", "hi").unwrap();
        assert_eq!(entry.status, OutboxStatus::Queued);
        assert_eq!(entry.server_msg_id, None);
        assert_eq!(db.get_outbox_entry("c1").unwrap(), entry);
    }

    #[test]
    fn test_queue_is_idempotent_on_client_id() {
        let (_dir, db) = temp_db();
        db.queue_outbox("c1", "chat@s", "first").unwrap();
        let again = db.queue_outbox("c1", "chat@s", "second").unwrap();
        assert_eq!(again.body, "first");
        assert_eq!(db.pending_outbox().unwrap().len(), 1);
    }

    #[test]
    fn test_pending_is_fifo() {
        let (_dir, db) = temp_db();
        for id in ["c1", "c2", "c3"] {
            db.queue_outbox(id, "chat@s", id).unwrap();
        }
        let ids: Vec<_> = db
            .pending_outbox()
            .unwrap()
            .into_iter()
            .map(|e| e.client_msg_id)
            .collect();
        assert_eq!(ids, ["c1", "c2", "c3"]);
    }

    #[test]
    fn test_lifecycle_sent() {
        let (_dir, db) = temp_db();
        db.queue_outbox("c1", "chat@s", "hi").unwrap();
        assert!(db.mark_outbox_sending("c1").unwrap());
        assert!(!db.mark_outbox_sending("c1").unwrap());
        assert!(db.pending_outbox().unwrap().is_empty());

        assert!(db.mark_outbox_sent("c1", "srv-1").unwrap());
        let entry = db.get_outbox_entry("c1").unwrap();
        assert_eq!(entry.status, OutboxStatus::Sent);
        assert_eq!(entry.server_msg_id.as_deref(), Some("srv-1"));

        // Terminal states do not move.
        assert!(!db.mark_outbox_failed("c1", "late").unwrap());
        assert_eq!(db.get_outbox_entry("c1").unwrap().status, OutboxStatus::Sent);
    }

    #[test]
    fn test_lifecycle_failed() {
        let (_dir, db) = temp_db();
        db.queue_outbox("c1", "chat@s", "hi").unwrap();
        db.mark_outbox_sending("c1").unwrap();
        assert!(db.mark_outbox_failed("c1", "network down").unwrap());

        let entry = db.get_outbox_entry("c1").unwrap();
        assert_eq!(entry.status, OutboxStatus::Failed);
        assert_eq!(entry.error_message.as_deref(), Some("network down"));
        assert_eq!(db.recover_outbox().unwrap(), 0);
    }

    #[test]
    fn test_recover_requeues_sending_only() {
        let (_dir, db) = temp_db();
        db.queue_outbox("c1", "chat@s", "a").unwrap();
        db.queue_outbox("c2", "chat@s", "b").unwrap();
        db.mark_outbox_sending("c1").unwrap();

        assert_eq!(db.recover_outbox().unwrap(), 1);
        assert_eq!(db.get_outbox_entry("c1").unwrap().status, OutboxStatus::Queued);
        assert_eq!(db.pending_outbox().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_entry() {
        let (_dir, db) = temp_db();
        assert!(matches!(db.get_outbox_entry("nope"), Err(StoreError::NotFound)));
    }
}
