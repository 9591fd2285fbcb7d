//! v001 -- Initial schema creation.
//!
//! Creates the core tables: `chats`, `messages`, `contacts`, `outbox`,
//! `identity_map` and `sync_state`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Chats
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chats (
    jid                  TEXT PRIMARY KEY NOT NULL CHECK (jid <> ''),
    name                 TEXT NOT NULL DEFAULT '',      -- chat's own name only
    is_group             INTEGER NOT NULL DEFAULT 0,    -- boolean 0/1
    unread_count         INTEGER NOT NULL DEFAULT 0,
    last_message_at      INTEGER NOT NULL DEFAULT 0,    -- unix millis, only moves forward
    last_message_preview TEXT NOT NULL DEFAULT '',
    updated_at           INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_chats_last_message ON chats(last_message_at DESC);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,     -- FTS rowid
    chat_jid     TEXT NOT NULL CHECK (chat_jid <> ''),
    msg_id       TEXT NOT NULL CHECK (msg_id <> ''),
    sender_jid   TEXT NOT NULL DEFAULT '',
    sender_name  TEXT NOT NULL DEFAULT '',
    body         TEXT NOT NULL DEFAULT '',
    message_type TEXT NOT NULL DEFAULT 'text',
    from_me      INTEGER NOT NULL DEFAULT 0,            -- boolean 0/1
    status       TEXT NOT NULL DEFAULT 'received',
    timestamp    INTEGER NOT NULL DEFAULT 0,            -- unix millis
    created_at   INTEGER NOT NULL DEFAULT 0,

    UNIQUE (chat_jid, msg_id)
);

CREATE INDEX IF NOT EXISTS idx_messages_chat_ts ON messages(chat_jid, timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(sender_jid);

-- ----------------------------------------------------------------
-- Contacts
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS contacts (
    jid        TEXT PRIMARY KEY NOT NULL CHECK (jid <> ''),
    name       TEXT NOT NULL DEFAULT '',
    push_name  TEXT NOT NULL DEFAULT '',
    updated_at INTEGER NOT NULL DEFAULT 0
);

-- ----------------------------------------------------------------
-- Outbox
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS outbox (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,    -- enqueue order tiebreak
    client_msg_id TEXT NOT NULL UNIQUE CHECK (client_msg_id <> ''),
    chat_jid      TEXT NOT NULL CHECK (chat_jid <> ''),
    body          TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'queued'
                  CHECK (status IN ('queued', 'sending', 'sent', 'failed')),
    server_msg_id TEXT,
    error_message TEXT,
    created_at    INTEGER NOT NULL DEFAULT 0,
    updated_at    INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_outbox_status ON outbox(status, created_at, id);

-- ----------------------------------------------------------------
-- Alternate -> canonical identifier mapping (replaced on every sync)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS identity_map (
    alternate_jid TEXT PRIMARY KEY NOT NULL,
    canonical_jid TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Sync checkpoints (generic key/value)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS sync_state (
    key        TEXT PRIMARY KEY NOT NULL,
    value      TEXT NOT NULL,
    updated_at INTEGER NOT NULL DEFAULT 0
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
