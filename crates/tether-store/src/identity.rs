//! Alternate-identifier mapping and reconciliation.
//!
//! The upstream can know one remote party under a canonical identifier and
//! an alternate one at the same time. The mapping table mirrors what the
//! upstream currently knows and is only read by [`Database::reconcile_identities`];
//! live ingestion never consults it.

use rusqlite::params;
use tether_shared::jid::is_alternate_jid;

use crate::database::{now_millis, Database};
use crate::error::Result;
use crate::models::IdentityMapping;

/// Create or advance the canonical chat of every mapped alternate chat.
/// `WHERE true` keeps SQLite from reading `ON CONFLICT` as a join clause.
const MERGE_CHATS_SQL: &str = "
    INSERT INTO chats (jid, name, is_group, unread_count, last_message_at, last_message_preview, updated_at)
    SELECT m.canonical_jid, a.name, a.is_group, a.unread_count, a.last_message_at, a.last_message_preview, ?1
    FROM chats a
    JOIN identity_map m ON m.alternate_jid = a.jid
    WHERE true
    ON CONFLICT(jid) DO UPDATE SET
        last_message_preview = CASE WHEN excluded.last_message_at > chats.last_message_at
            THEN excluded.last_message_preview ELSE chats.last_message_preview END,
        last_message_at = MAX(chats.last_message_at, excluded.last_message_at),
        name = CASE WHEN chats.name = '' THEN excluded.name ELSE chats.name END,
        is_group = MAX(chats.is_group, excluded.is_group),
        unread_count = chats.unread_count + excluded.unread_count,
        updated_at = excluded.updated_at";

/// Move messages to the canonical chat. A message whose key already exists
/// there is left behind and removed with the alternate chat.
const MOVE_MESSAGES_SQL: &str = "
    UPDATE OR IGNORE messages
    SET chat_jid = (SELECT canonical_jid FROM identity_map WHERE alternate_jid = messages.chat_jid)
    WHERE chat_jid IN (SELECT alternate_jid FROM identity_map)";

const REMAP_SENDERS_SQL: &str = "
    UPDATE messages
    SET sender_jid = (SELECT canonical_jid FROM identity_map WHERE alternate_jid = messages.sender_jid)
    WHERE sender_jid IN (SELECT alternate_jid FROM identity_map)";

/// Same merge rule as every other contact write, with the alternate
/// contact as the incoming side.
const MERGE_CONTACTS_SQL: &str = "
    INSERT INTO contacts (jid, name, push_name, updated_at)
    SELECT m.canonical_jid, c.name, c.push_name, ?1
    FROM contacts c
    JOIN identity_map m ON m.alternate_jid = c.jid
    WHERE true
    ON CONFLICT(jid) DO UPDATE SET
        name = CASE WHEN excluded.name <> '' THEN excluded.name ELSE contacts.name END,
        push_name = CASE WHEN excluded.push_name <> '' THEN excluded.push_name ELSE contacts.push_name END,
        updated_at = excluded.updated_at";

impl Database {
    /// Replace the whole mapping with the upstream's current view.
    /// A pair is kept only when its alternate side uses the alternate scheme
    /// and its canonical side does not, which also rules out blank and
    /// self-referencing pairs. Returns the number of pairs stored.
    pub fn replace_identity_map(&mut self, mappings: &[IdentityMapping]) -> Result<usize> {
        let tx = self.conn_mut().transaction()?;
        tx.execute("DELETE FROM identity_map", [])?;

        let mut stored = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO identity_map (alternate_jid, canonical_jid) VALUES (?1, ?2)",
            )?;
            for m in mappings {
                if !is_alternate_jid(&m.alternate_jid)
                    || is_alternate_jid(&m.canonical_jid)
                    || m.canonical_jid.is_empty()
                {
                    continue;
                }
                stmt.execute(params![m.alternate_jid, m.canonical_jid])?;
                stored += 1;
            }
        }

        tx.commit()?;
        tracing::debug!(count = stored, "identity map replaced");
        Ok(stored)
    }

    pub fn identity_map(&self) -> Result<Vec<IdentityMapping>> {
        let mut stmt = self.conn().prepare(
            "SELECT alternate_jid, canonical_jid FROM identity_map ORDER BY alternate_jid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(IdentityMapping {
                alternate_jid: row.get(0)?,
                canonical_jid: row.get(1)?,
            })
        })?;

        let mut mappings = Vec::new();
        for row in rows {
            mappings.push(row?);
        }
        Ok(mappings)
    }

    /// Fold every mapped alternate chat into its canonical chat in one
    /// transaction. Returns the number of alternate chats merged.
    pub fn reconcile_identities(&mut self) -> Result<usize> {
        let now = now_millis();
        let tx = self.conn_mut().transaction()?;

        tx.execute(MERGE_CHATS_SQL, params![now])?;
        tx.execute(MOVE_MESSAGES_SQL, [])?;
        tx.execute(REMAP_SENDERS_SQL, [])?;
        tx.execute(
            "DELETE FROM messages WHERE chat_jid IN (SELECT alternate_jid FROM identity_map)",
            [],
        )?;
        tx.execute(MERGE_CONTACTS_SQL, params![now])?;
        tx.execute(
            "DELETE FROM contacts WHERE jid IN (SELECT alternate_jid FROM identity_map)",
            [],
        )?;
        let merged = tx.execute(
            "DELETE FROM chats WHERE jid IN (SELECT alternate_jid FROM identity_map)",
            [],
        )?;

        tx.commit()?;
        if merged > 0 {
            tracing::info!(merged, "reconciled alternate-identifier chats");
        }
        Ok(merged)
    }
}
