//! Records and query descriptors exchanged with the remote message store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{MessageId, SenderId};

/// A committed chat record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Store-assigned document identity.
    pub id: MessageId,
    /// Display name of the author.
    pub sender_id: SenderId,
    /// Message body.
    pub text: String,
    /// Server-assigned creation time. Never changes once assigned.
    pub created_at: DateTime<Utc>,
    /// Idempotency key supplied by the sending client, if any.
    pub client_key: Option<Uuid>,
}

impl Message {
    pub fn order_key(&self) -> OrderKey {
        OrderKey {
            created_at: self.created_at,
            id: self.id,
        }
    }
}

/// Record handed to the store on append. The store assigns `id` and
/// `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: SenderId,
    pub text: String,
    pub client_key: Option<Uuid>,
}

/// Total order over committed records: creation time, then store identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderKey {
    pub created_at: DateTime<Utc>,
    pub id: MessageId,
}

/// Opaque pagination handle pointing at one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor(OrderKey);

impl Cursor {
    pub fn at(message: &Message) -> Self {
        Self(message.order_key())
    }

    pub fn from_key(key: OrderKey) -> Self {
        Self(key)
    }

    pub fn key(&self) -> OrderKey {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Bounded query kept open by a live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveQuery {
    pub direction: SortDirection,
    pub limit: u32,
}

/// One-shot page request. `after` excludes the cursor record itself and
/// everything before it in `direction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    pub direction: SortDirection,
    pub after: Option<Cursor>,
    pub limit: u32,
}

/// Full result set of a live query at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSnapshot {
    /// Records in the query's direction.
    pub messages: Vec<Message>,
    /// Oldest record of the result set, `None` when empty.
    pub cursor: Option<Cursor>,
}

impl LiveSnapshot {
    pub fn new(messages: Vec<Message>) -> Self {
        let cursor = messages.iter().min_by_key(|m| m.order_key()).map(Cursor::at);
        Self { messages, cursor }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn msg(secs: i64, id: u128) -> Message {
        Message {
            id: MessageId(Uuid::from_u128(id)),
            sender_id: SenderId("A".into()),
            text: "hi".into(),
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
            client_key: None,
        }
    }

    #[test]
    fn test_order_key_breaks_ties_by_id() {
        let a = msg(10, 2);
        let b = msg(10, 1);
        let c = msg(9, 3);
        assert!(b.order_key() < a.order_key());
        assert!(c.order_key() < b.order_key());
    }

    #[test]
    fn test_snapshot_cursor_is_oldest_record() {
        let snapshot = LiveSnapshot::new(vec![msg(30, 1), msg(10, 2), msg(20, 3)]);
        assert_eq!(snapshot.cursor, Some(Cursor::at(&msg(10, 2))));
        assert_eq!(LiveSnapshot::new(Vec::new()).cursor, None);
    }

    #[test]
    fn test_message_serializes_with_client_key() {
        let mut m = msg(1, 1);
        m.client_key = Some(Uuid::from_u128(7));
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["sender_id"], "A");
        assert_eq!(json["client_key"], Uuid::from_u128(7).to_string());
    }
}
