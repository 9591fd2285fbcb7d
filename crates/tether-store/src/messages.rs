//! Message rows and the ingestion paths that project upstream messages
//! into the store. `(chat_jid, msg_id)` is the idempotency key on every path.

use std::collections::HashSet;

use rusqlite::{params, Connection, OptionalExtension};
use tether_shared::constants::DEFAULT_PAGE_SIZE;

use crate::chats::touch_chat_in;
use crate::contacts::upsert_contact_in;
use crate::database::{now_millis, Database};
use crate::error::{Result, StoreError};
use crate::models::{BatchSummary, Contact, Message, MessageStatus};

const MESSAGE_COLUMNS: &str =
    "chat_jid, msg_id, sender_jid, sender_name, body, message_type, from_me, status, timestamp";

impl Database {
    /// Insert a message, or refresh sender name, body and status if the key
    /// already exists. Never creates a duplicate.
    pub fn upsert_message(&self, message: &Message) -> Result<()> {
        upsert_message_in(self.conn(), message)
    }

    /// Project one live message: advance its chat, upsert the message and
    /// learn the sender's push name, all in one transaction.
    ///
    /// A message seen for the first time that did not come from us bumps the
    /// chat's unread counter.
    pub fn ingest_message(&mut self, message: &Message) -> Result<()> {
        let tx = self.conn_mut().transaction()?;

        let is_new = !message_exists_in(&tx, &message.chat_jid, &message.msg_id)?;
        touch_chat_in(&tx, &message.chat_jid, message.timestamp, &message.body)?;
        upsert_message_in(&tx, message)?;
        if is_new && !message.from_me {
            tx.execute(
                "UPDATE chats SET unread_count = unread_count + 1 WHERE jid = ?1",
                params![message.chat_jid],
            )?;
        }
        if let Some(contact) = sender_contact(message) {
            upsert_contact_in(&tx, &contact)?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Apply a history batch atomically: either every row lands or none do.
    pub fn ingest_history_batch(&mut self, messages: &[Message]) -> Result<BatchSummary> {
        let tx = self.conn_mut().transaction()?;
        let mut chats = HashSet::new();

        for message in messages {
            touch_chat_in(&tx, &message.chat_jid, message.timestamp, &message.body)?;
            upsert_message_in(&tx, message)?;
            if let Some(contact) = sender_contact(message) {
                upsert_contact_in(&tx, &contact)?;
            }
            chats.insert(message.chat_jid.as_str());
        }

        let summary = BatchSummary {
            message_count: messages.len(),
            chat_count: chats.len(),
        };
        tx.commit()?;
        Ok(summary)
    }

    /// Messages of one chat, newest first, strictly older than `before_ts`
    /// when given. `sender_name` carries the resolved display name: message
    /// sender name, else contact push name, else contact name, else sender id.
    pub fn list_messages(
        &self,
        chat_jid: &str,
        before_ts: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Message>> {
        let limit = if limit == 0 { DEFAULT_PAGE_SIZE } else { limit };
        let before_ts = before_ts.unwrap_or(i64::MAX);

        let mut stmt = self.conn().prepare(
            "SELECT m.chat_jid, m.msg_id, m.sender_jid,
                    COALESCE(NULLIF(m.sender_name, ''), NULLIF(ct.push_name, ''), NULLIF(ct.name, ''), m.sender_jid),
                    m.body, m.message_type, m.from_me, m.status, m.timestamp
             FROM messages m
             LEFT JOIN contacts ct ON ct.jid = m.sender_jid
             WHERE m.chat_jid = ?1 AND m.timestamp < ?2
             ORDER BY m.timestamp DESC, m.id DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![chat_jid, before_ts, limit], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Fetch one message exactly as stored.
    pub fn get_message(&self, chat_jid: &str, msg_id: &str) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE chat_jid = ?1 AND msg_id = ?2"),
                params![chat_jid, msg_id],
                row_to_message,
            )
            .optional()?
            .ok_or(StoreError::NotFound)
    }

    pub fn message_count(&self) -> Result<i64> {
        Ok(self
            .conn()
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn upsert_message_in(conn: &Connection, m: &Message) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO messages ({MESSAGE_COLUMNS}, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(chat_jid, msg_id) DO UPDATE SET
                sender_name = excluded.sender_name,
                body = excluded.body,
                status = excluded.status"
        ),
        params![
            m.chat_jid,
            m.msg_id,
            m.sender_jid,
            m.sender_name,
            m.body,
            m.message_type,
            m.from_me,
            m.status.as_str(),
            m.timestamp,
            now_millis(),
        ],
    )?;
    Ok(())
}

fn message_exists_in(conn: &Connection, chat_jid: &str, msg_id: &str) -> Result<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM messages WHERE chat_jid = ?1 AND msg_id = ?2",
            params![chat_jid, msg_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

/// The push name carried by an inbound message, as a contact update.
fn sender_contact(m: &Message) -> Option<Contact> {
    if m.from_me || m.sender_jid.is_empty() || m.sender_name.is_empty() {
        return None;
    }
    Some(Contact {
        jid: m.sender_jid.clone(),
        name: String::new(),
        push_name: m.sender_name.clone(),
    })
}

pub(crate) fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let status_str: String = row.get(7)?;
    let status = status_str.parse::<MessageStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Message {
        chat_jid: row.get(0)?,
        msg_id: row.get(1)?,
        sender_jid: row.get(2)?,
        sender_name: row.get(3)?,
        body: row.get(4)?,
        message_type: row.get(5)?,
        from_me: row.get(6)?,
        status,
        timestamp: row.get(8)?,
    })
}
