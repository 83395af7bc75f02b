//! v001 -- Initial schema creation.
//!
//! Creates the `messages` collection and its ordering index.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id          TEXT PRIMARY KEY NOT NULL,  -- UUID v4, store-assigned
    sender_id   TEXT NOT NULL,              -- display name of the author
    text        TEXT NOT NULL,
    created_at  INTEGER NOT NULL,           -- microseconds since the Unix epoch
    client_key  TEXT UNIQUE                 -- optional sender idempotency key
);

-- Ordering key used by every query: (created_at, id).
CREATE INDEX IF NOT EXISTS idx_messages_created_id
    ON messages(created_at, id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
