//! Full-text search over message bodies.

use rusqlite::params;
use tether_shared::constants::DEFAULT_PAGE_SIZE;

use crate::database::Database;
use crate::error::Result;
use crate::messages::row_to_message;
use crate::models::SearchHit;

impl Database {
    /// Search message bodies, best match first, optionally within one chat.
    ///
    /// Every whitespace-separated word of `query` must appear; the words are
    /// matched literally so user input never reaches FTS syntax. An empty
    /// query returns no hits.
    pub fn search_messages(
        &self,
        query: &str,
        chat_jid: Option<&str>,
        limit: u32,
    ) -> Result<Vec<SearchHit>> {
        let Some(fts_query) = to_fts_query(query) else {
            return Ok(Vec::new());
        };
        let limit = if limit == 0 { DEFAULT_PAGE_SIZE } else { limit };

        let mut stmt = self.conn().prepare(
            "SELECT m.chat_jid, m.msg_id, m.sender_jid, m.sender_name, m.body,
                    m.message_type, m.from_me, m.status, m.timestamp,
                    snippet(messages_fts, 0, '<<', '>>', '...', 32)
             FROM messages_fts
             JOIN messages m ON m.id = messages_fts.rowid
             WHERE messages_fts MATCH ?1
               AND (?2 IS NULL OR m.chat_jid = ?2)
             ORDER BY rank, m.timestamp DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![fts_query, chat_jid, limit], |row| {
            Ok(SearchHit {
                message: row_to_message(row)?,
                snippet: row.get(9)?,
            })
        })?;

        let mut hits = Vec::new();
        for row in rows {
            hits.push(row?);
        }
        Ok(hits)
    }
}

/// Quote each word as an FTS string literal; words are implicitly ANDed.
fn to_fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|word| format!("\"{}\"", word.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}
