//! Chat rows: metadata upserts, ingestion-side activity updates and
//! display-name-resolving reads.

use rusqlite::{params, Connection, OptionalExtension};
use tether_shared::constants::{DEFAULT_PAGE_SIZE, PREVIEW_MAX_CHARS};

use crate::database::{now_millis, Database};
use crate::error::{Result, StoreError};
use crate::models::{Chat, ChatView};

/// Display name resolution: own name -> contact push name -> contact name -> jid.
const CHAT_VIEW_SELECT: &str = "
    SELECT c.jid,
           COALESCE(NULLIF(c.name, ''), NULLIF(ct.push_name, ''), NULLIF(ct.name, ''), c.jid),
           c.is_group, c.unread_count, c.last_message_at, c.last_message_preview
    FROM chats c
    LEFT JOIN contacts ct ON ct.jid = c.jid";

impl Database {
    // ------------------------------------------------------------------
    // Write
    // ------------------------------------------------------------------

    /// Insert or update chat metadata.
    ///
    /// A non-empty name replaces the stored one, the group flag is sticky,
    /// and last activity only moves forward.
    pub fn upsert_chat(&self, chat: &Chat) -> Result<()> {
        self.conn().execute(
            "INSERT INTO chats (jid, name, is_group, unread_count, last_message_at, last_message_preview, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(jid) DO UPDATE SET
                name = CASE WHEN excluded.name <> '' THEN excluded.name ELSE chats.name END,
                is_group = MAX(chats.is_group, excluded.is_group),
                unread_count = excluded.unread_count,
                last_message_preview = CASE WHEN excluded.last_message_at > chats.last_message_at
                    THEN excluded.last_message_preview ELSE chats.last_message_preview END,
                last_message_at = MAX(chats.last_message_at, excluded.last_message_at),
                updated_at = excluded.updated_at",
            params![
                chat.jid,
                chat.name,
                chat.is_group,
                chat.unread_count,
                chat.last_message_at,
                truncate_preview(&chat.last_message_preview),
                now_millis(),
            ],
        )?;
        Ok(())
    }

    /// Record activity on a chat, creating it if unseen.
    pub fn touch_chat(&self, jid: &str, timestamp: i64, preview: &str) -> Result<()> {
        touch_chat_in(self.conn(), jid, timestamp, preview)
    }

    /// Reset the unread counter. Returns `false` if the chat does not exist.
    pub fn mark_chat_read(&self, jid: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE chats SET unread_count = 0, updated_at = ?2 WHERE jid = ?1",
            params![jid, now_millis()],
        )?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// List chats by last activity, newest first. Chats under the alternate
    /// identifier scheme are hidden; they are merged by reconciliation.
    pub fn list_chats(&self, limit: u32, offset: u32) -> Result<Vec<ChatView>> {
        let limit = if limit == 0 { DEFAULT_PAGE_SIZE } else { limit };
        let sql = format!(
            "{CHAT_VIEW_SELECT}
             WHERE c.jid NOT LIKE '%@' || ?3
             ORDER BY c.last_message_at DESC, c.jid ASC
             LIMIT ?1 OFFSET ?2"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(
            params![limit, offset, tether_shared::constants::ALTERNATE_SERVER],
            row_to_chat_view,
        )?;

        let mut chats = Vec::new();
        for row in rows {
            chats.push(row?);
        }
        Ok(chats)
    }

    /// Fetch a single chat by identifier.
    pub fn get_chat(&self, jid: &str) -> Result<ChatView> {
        let sql = format!("{CHAT_VIEW_SELECT} WHERE c.jid = ?1");
        self.conn()
            .query_row(&sql, params![jid], row_to_chat_view)
            .optional()?
            .ok_or(StoreError::NotFound)
    }

    pub fn chat_count(&self) -> Result<i64> {
        Ok(self
            .conn()
            .query_row("SELECT COUNT(*) FROM chats", [], |row| row.get(0))?)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Create the chat if missing; advance activity and preview only when
/// `timestamp` is newer than what is stored.
pub(crate) fn touch_chat_in(conn: &Connection, jid: &str, timestamp: i64, preview: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO chats (jid, last_message_at, last_message_preview, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(jid) DO UPDATE SET
            last_message_preview = CASE WHEN excluded.last_message_at > chats.last_message_at
                THEN excluded.last_message_preview ELSE chats.last_message_preview END,
            last_message_at = MAX(chats.last_message_at, excluded.last_message_at),
            updated_at = excluded.updated_at",
        params![jid, timestamp, truncate_preview(preview), now_millis()],
    )?;
    Ok(())
}

/// Cut a preview to [`PREVIEW_MAX_CHARS`] characters.
pub(crate) fn truncate_preview(body: &str) -> &str {
    match body.char_indices().nth(PREVIEW_MAX_CHARS) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

fn row_to_chat_view(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatView> {
    Ok(ChatView {
        jid: row.get(0)?,
        display_name: row.get(1)?,
        is_group: row.get(2)?,
        unread_count: row.get(3)?,
        last_message_at: row.get(4)?,
        last_message_preview: row.get(5)?,
    })
}
