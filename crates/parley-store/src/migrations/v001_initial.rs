//! v001 -- Initial schema creation.
//!
//! Creates the `messages`, `groups`, `group_members` and `users` tables.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Messages: one row per send. Exactly one of recipient_id / group_id.
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT, -- store order
    id           TEXT UNIQUE NOT NULL,              -- UUID v4
    sender_id    TEXT NOT NULL,
    recipient_id TEXT,
    group_id     TEXT,
    content      TEXT NOT NULL,
    content_lang TEXT NOT NULL,
    reply_to     TEXT,
    reply_text   TEXT,
    reply_sender TEXT,
    files        TEXT NOT NULL DEFAULT '[]',        -- JSON array
    created_at   TEXT NOT NULL,                     -- RFC-3339
    delivered    INTEGER,                           -- DMs only, 0/1
    delivered_at TEXT,

    CHECK ((recipient_id IS NULL) <> (group_id IS NULL)),
    CHECK ((recipient_id IS NULL) = (delivered IS NULL))
);

CREATE INDEX IF NOT EXISTS idx_messages_undelivered
    ON messages(recipient_id, delivered);

CREATE INDEX IF NOT EXISTS idx_messages_group
    ON messages(group_id, created_at);

-- ----------------------------------------------------------------
-- Groups and their (grow-only) membership
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS groups (
    id         TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    name       TEXT NOT NULL,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS group_members (
    seq      INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id TEXT NOT NULL,
    user_id  TEXT NOT NULL,

    UNIQUE (group_id, user_id),
    FOREIGN KEY (group_id) REFERENCES groups(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Users, written by the auth layer; read here for display names
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id           TEXT PRIMARY KEY NOT NULL,
    name         TEXT,
    display_name TEXT,
    created_at   TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
