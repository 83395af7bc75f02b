//! CRUD operations for [`Message`] records.
//!
//! Every read orders by `(created_at, id)`, the same key the client merges
//! on, so equal timestamps always come back in one deterministic order.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use parley_shared::protocol::{Message, NewMessage, PageQuery, SortDirection};
use parley_shared::types::{MessageId, SenderId};

use crate::database::Database;
use crate::error::{Result, StoreError};

const SELECT_COLUMNS: &str = "SELECT id, sender_id, text, created_at, client_key FROM messages";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a fully formed record, timestamp included.
    ///
    /// Timestamps are stored with microsecond precision; the returned record
    /// carries `created_at` as stored, so its `order_key()` matches what
    /// later reads return.
    pub fn insert_message(&self, message: &Message) -> Result<Message> {
        let stored = Message {
            created_at: truncate_to_micros(message.created_at)?,
            ..message.clone()
        };
        self.conn().execute(
            "INSERT INTO messages (id, sender_id, text, created_at, client_key)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                stored.id.to_string(),
                stored.sender_id.as_str(),
                stored.text,
                stored.created_at.timestamp_micros(),
                stored.client_key.map(|k| k.to_string()),
            ],
        )?;
        Ok(stored)
    }

    /// Append a new record, assigning its identity and creation time.
    ///
    /// A record carrying a `client_key` that was already committed is not
    /// written twice; the existing record is returned instead.
    pub fn append_message(&self, record: &NewMessage) -> Result<Message> {
        if let Some(key) = record.client_key {
            if let Some(existing) = self.get_message_by_client_key(key)? {
                tracing::debug!(id = %existing.id, "append replayed, returning committed record");
                return Ok(existing);
            }
        }

        self.insert_message(&Message {
            id: MessageId::new(),
            sender_id: record.sender_id.clone(),
            text: record.text.clone(),
            created_at: Utc::now(),
            client_key: record.client_key,
        })
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Run a cursor-paginated query, returning records in `query.direction`.
    pub fn query_messages(&self, query: &PageQuery) -> Result<Vec<Message>> {
        let order = match query.direction {
            SortDirection::Ascending => "ORDER BY created_at ASC, id ASC",
            SortDirection::Descending => "ORDER BY created_at DESC, id DESC",
        };

        let mut messages = Vec::new();
        match query.after {
            Some(cursor) => {
                let key = cursor.key();
                let filter = match query.direction {
                    SortDirection::Ascending => {
                        "WHERE created_at > ?1 OR (created_at = ?1 AND id > ?2)"
                    }
                    SortDirection::Descending => {
                        "WHERE created_at < ?1 OR (created_at = ?1 AND id < ?2)"
                    }
                };
                let sql = format!("{SELECT_COLUMNS} {filter} {order} LIMIT ?3");
                let mut stmt = self.conn().prepare(&sql)?;
                let rows = stmt.query_map(
                    params![key.created_at.timestamp_micros(), key.id.to_string(), query.limit],
                    row_to_message,
                )?;
                for row in rows {
                    messages.push(row?);
                }
            }
            None => {
                let sql = format!("{SELECT_COLUMNS} {order} LIMIT ?1");
                let mut stmt = self.conn().prepare(&sql)?;
                let rows = stmt.query_map(params![query.limit], row_to_message)?;
                for row in rows {
                    messages.push(row?);
                }
            }
        }
        Ok(messages)
    }

    pub fn get_message_by_client_key(&self, key: Uuid) -> Result<Option<Message>> {
        let message = self
            .conn()
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE client_key = ?1"),
                params![key.to_string()],
                row_to_message,
            )
            .optional()?;
        Ok(message)
    }

    /// Total number of stored records.
    pub fn count_messages(&self) -> Result<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn truncate_to_micros(at: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let micros = at.timestamp_micros();
    DateTime::from_timestamp_micros(micros).ok_or(StoreError::InvalidTimestamp(micros))
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let sender_id: String = row.get(1)?;
    let text: String = row.get(2)?;
    let created_micros: i64 = row.get(3)?;
    let client_key_str: Option<String> = row.get(4)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at = DateTime::from_timestamp_micros(created_micros).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Integer,
            Box::new(StoreError::InvalidTimestamp(created_micros)),
        )
    })?;

    let client_key = client_key_str
        .map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Message {
        id: MessageId(id),
        sender_id: SenderId(sender_id),
        text,
        created_at,
        client_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use parley_shared::protocol::Cursor;

    fn msg(secs: i64, id: u128, text: &str) -> Message {
        Message {
            id: MessageId(Uuid::from_u128(id)),
            sender_id: SenderId("A".into()),
            text: text.into(),
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
            client_key: None,
        }
    }

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        for (secs, id, text) in [(10, 1, "a"), (20, 2, "b"), (20, 3, "c"), (30, 4, "d")] {
            db.insert_message(&msg(secs, id, text)).unwrap();
        }
        db
    }

    fn texts(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.text.as_str()).collect()
    }

    #[test]
    fn test_descending_query_returns_newest_first() {
        let db = seeded();
        let page = db
            .query_messages(&PageQuery {
                direction: SortDirection::Descending,
                after: None,
                limit: 3,
            })
            .unwrap();
        assert_eq!(texts(&page), vec!["d", "c", "b"]);
    }

    #[test]
    fn test_descending_cursor_breaks_timestamp_ties_by_id() {
        let db = seeded();
        let cursor = Cursor::at(&msg(20, 3, "c"));
        let page = db
            .query_messages(&PageQuery {
                direction: SortDirection::Descending,
                after: Some(cursor),
                limit: 10,
            })
            .unwrap();
        assert_eq!(texts(&page), vec!["b", "a"]);
    }

    #[test]
    fn test_ascending_cursor_excludes_cursor_record() {
        let db = seeded();
        let cursor = Cursor::at(&msg(20, 2, "b"));
        let page = db
            .query_messages(&PageQuery {
                direction: SortDirection::Ascending,
                after: Some(cursor),
                limit: 10,
            })
            .unwrap();
        assert_eq!(texts(&page), vec!["c", "d"]);
    }

    #[test]
    fn test_page_past_oldest_is_empty() {
        let db = seeded();
        let page = db
            .query_messages(&PageQuery {
                direction: SortDirection::Descending,
                after: Some(Cursor::at(&msg(10, 1, "a"))),
                limit: 10,
            })
            .unwrap();
        assert!(page.is_empty());
    }

    #[test]
    fn test_append_assigns_identity_and_time() {
        let db = Database::open_in_memory().unwrap();
        let stored = db
            .append_message(&NewMessage {
                sender_id: SenderId("B".into()),
                text: "yo".into(),
                client_key: None,
            })
            .unwrap();

        let page = db
            .query_messages(&PageQuery {
                direction: SortDirection::Descending,
                after: None,
                limit: 10,
            })
            .unwrap();
        assert_eq!(page, vec![stored]);
    }

    #[test]
    fn test_append_with_same_client_key_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let record = NewMessage {
            sender_id: SenderId("B".into()),
            text: "once".into(),
            client_key: Some(Uuid::new_v4()),
        };

        let first = db.append_message(&record).unwrap();
        let second = db.append_message(&record).unwrap();

        assert_eq!(first, second);
        assert_eq!(db.count_messages().unwrap(), 1);
    }

    #[test]
    fn test_insert_returns_record_as_stored() {
        let db = Database::open_in_memory().unwrap();
        let mut input = msg(40, 9, "precise");
        input.created_at = Utc.timestamp_opt(40, 123_456_789).unwrap();

        let stored = db.insert_message(&input).unwrap();
        assert_eq!(stored.created_at, Utc.timestamp_opt(40, 123_456_000).unwrap());
        assert_ne!(stored.order_key(), input.order_key());

        let page = db
            .query_messages(&PageQuery {
                direction: SortDirection::Descending,
                after: None,
                limit: 1,
            })
            .unwrap();
        assert_eq!(page[0], stored);
        assert_eq!(page[0].order_key(), stored.order_key());
    }
}
