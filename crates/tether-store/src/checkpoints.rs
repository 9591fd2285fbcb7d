//! Generic key/value checkpoints for resumable sync cursors.

use rusqlite::{params, OptionalExtension};

use crate::database::{now_millis, Database};
use crate::error::Result;

impl Database {
    pub fn set_checkpoint(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO sync_state (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now_millis()],
        )?;
        Ok(())
    }

    /// `None` if the key was never written.
    pub fn checkpoint(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT value FROM sync_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }
}
