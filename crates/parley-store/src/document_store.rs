//! SQLite-backed [`RemoteStore`] with in-process live query fan-out.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use parley_shared::protocol::{LiveQuery, LiveSnapshot, Message, NewMessage, PageQuery};
use parley_shared::types::SubscriptionId;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::remote::{LiveSubscription, RemoteStore};

type SnapshotSender = mpsc::UnboundedSender<std::result::Result<LiveSnapshot, StoreError>>;

struct Subscriber {
    query: LiveQuery,
    tx: SnapshotSender,
}

// Lock order: `db` before `subscribers`.
struct Inner {
    db: Mutex<Database>,
    subscribers: Mutex<HashMap<SubscriptionId, Subscriber>>,
    next_id: AtomicU64,
}

/// Cloneable handle to one message collection.
#[derive(Clone)]
pub struct DocumentStore {
    inner: Arc<Inner>,
}

impl DocumentStore {
    pub fn new(db: Database) -> Self {
        Self {
            inner: Arc::new(Inner {
                db: Mutex::new(db),
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Open (or create) a store backed by the database file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Database::open_at(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    /// Insert a fully formed record (timestamp included) and notify live
    /// queries. Used for imports and seeding.
    ///
    /// `created_at` is kept to the microsecond; the record is returned as
    /// stored.
    pub fn insert(&self, message: &Message) -> Result<Message> {
        self.inner.insert(message)
    }

    /// Number of open live queries.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .map(|subs| subs.len())
            .unwrap_or(0)
    }
}

impl Inner {
    fn db(&self) -> Result<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn subscribers(&self) -> Result<MutexGuard<'_, HashMap<SubscriptionId, Subscriber>>> {
        self.subscribers.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn subscribe(&self, query: LiveQuery) -> Result<LiveSubscription> {
        let db = self.db()?;
        let initial = run_live_query(&db, query)?;

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is still in hand, so this send cannot fail.
        let _ = tx.send(Ok(initial));

        self.subscribers()?.insert(id, Subscriber { query, tx });
        info!(subscription = %id, limit = query.limit, "live query opened");

        Ok(LiveSubscription { id, snapshots: rx })
    }

    fn append(&self, record: &NewMessage) -> Result<Message> {
        let db = self.db()?;
        let message = db.append_message(record)?;
        debug!(id = %message.id, sender = %message.sender_id, "record appended");
        self.notify(&db)?;
        Ok(message)
    }

    fn insert(&self, message: &Message) -> Result<Message> {
        let db = self.db()?;
        let stored = db.insert_message(message)?;
        self.notify(&db)?;
        Ok(stored)
    }

    fn fetch_page(&self, query: &PageQuery) -> Result<Vec<Message>> {
        self.db()?.query_messages(query)
    }

    /// Re-run every live query and push the full result set.
    ///
    /// Subscribers whose receiver is gone are dropped. A subscriber whose
    /// query fails receives the error and is dropped as well.
    fn notify(&self, db: &Database) -> Result<()> {
        let mut subscribers = self.subscribers()?;
        subscribers.retain(|id, sub| match run_live_query(db, sub.query) {
            Ok(snapshot) => sub.tx.send(Ok(snapshot)).is_ok(),
            Err(e) => {
                warn!(subscription = %id, error = %e, "live query failed");
                let _ = sub.tx.send(Err(e));
                false
            }
        });
        Ok(())
    }

    fn cancel(&self, id: SubscriptionId) {
        match self.subscribers() {
            Ok(mut subs) => {
                if subs.remove(&id).is_some() {
                    info!(subscription = %id, "live query cancelled");
                }
            }
            Err(e) => warn!(subscription = %id, error = %e, "cancel failed"),
        }
    }
}

fn run_live_query(db: &Database, query: LiveQuery) -> Result<LiveSnapshot> {
    let messages = db.query_messages(&PageQuery {
        direction: query.direction,
        after: None,
        limit: query.limit,
    })?;
    Ok(LiveSnapshot::new(messages))
}

impl RemoteStore for DocumentStore {
    fn subscribe_live(&self, query: LiveQuery) -> BoxFuture<'static, Result<LiveSubscription>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || inner.subscribe(query))
                .await
                .map_err(|e| StoreError::Task(e.to_string()))?
        })
    }

    fn fetch_page(&self, query: PageQuery) -> BoxFuture<'static, Result<Vec<Message>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || inner.fetch_page(&query))
                .await
                .map_err(|e| StoreError::Task(e.to_string()))?
        })
    }

    fn append(&self, record: NewMessage) -> BoxFuture<'static, Result<Message>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || inner.append(&record))
                .await
                .map_err(|e| StoreError::Task(e.to_string()))?
        })
    }

    fn cancel(&self, id: SubscriptionId) {
        self.inner.cancel(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use parley_shared::protocol::{Cursor, SortDirection};
    use parley_shared::types::{MessageId, SenderId};
    use uuid::Uuid;

    fn msg(secs: i64, id: u128, text: &str) -> Message {
        Message {
            id: MessageId(Uuid::from_u128(id)),
            sender_id: SenderId("A".into()),
            text: text.into(),
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
            client_key: None,
        }
    }

    fn newest(limit: u32) -> LiveQuery {
        LiveQuery {
            direction: SortDirection::Descending,
            limit,
        }
    }

    fn texts(snapshot: &LiveSnapshot) -> Vec<&str> {
        snapshot.messages.iter().map(|m| m.text.as_str()).collect()
    }

    #[tokio::test]
    async fn test_subscription_delivers_initial_snapshot() {
        let store = DocumentStore::open_in_memory().unwrap();
        store.insert(&msg(1, 1, "hi")).unwrap();

        let mut sub = store.subscribe_live(newest(25)).await.unwrap();
        let snapshot = sub.snapshots.recv().await.unwrap().unwrap();

        assert_eq!(texts(&snapshot), vec!["hi"]);
        assert_eq!(snapshot.cursor, Some(Cursor::at(&msg(1, 1, "hi"))));
    }

    #[tokio::test]
    async fn test_append_pushes_full_bounded_result_set() {
        let store = DocumentStore::open_in_memory().unwrap();
        store.insert(&msg(1, 1, "a")).unwrap();
        store.insert(&msg(2, 2, "b")).unwrap();

        let mut sub = store.subscribe_live(newest(2)).await.unwrap();
        let _initial = sub.snapshots.recv().await.unwrap().unwrap();

        let appended = store
            .append(NewMessage {
                sender_id: SenderId("B".into()),
                text: "c".into(),
                client_key: None,
            })
            .await
            .unwrap();

        let snapshot = sub.snapshots.recv().await.unwrap().unwrap();
        assert_eq!(texts(&snapshot), vec!["c", "b"]);
        assert_eq!(snapshot.messages[0], appended);
        assert_eq!(snapshot.cursor, Some(Cursor::at(&msg(2, 2, "b"))));
    }

    #[tokio::test]
    async fn test_cancel_stops_delivery_and_is_idempotent() {
        let store = DocumentStore::open_in_memory().unwrap();
        let mut sub = store.subscribe_live(newest(25)).await.unwrap();
        let _initial = sub.snapshots.recv().await.unwrap().unwrap();

        store.cancel(sub.id);
        store.cancel(sub.id);
        assert_eq!(store.subscriber_count(), 0);

        store.insert(&msg(5, 5, "late")).unwrap();
        assert!(sub.snapshots.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_pruned_on_next_change() {
        let store = DocumentStore::open_in_memory().unwrap();
        let sub = store.subscribe_live(newest(25)).await.unwrap();
        drop(sub);
        assert_eq!(store.subscriber_count(), 1);

        store.insert(&msg(5, 5, "x")).unwrap();
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_page_walks_backwards() {
        let store = DocumentStore::open_in_memory().unwrap();
        for i in 1..=5 {
            store.insert(&msg(i as i64, i, &format!("m{i}"))).unwrap();
        }

        let page = store
            .fetch_page(PageQuery {
                direction: SortDirection::Descending,
                after: Some(Cursor::at(&msg(4, 4, "m4"))),
                limit: 2,
            })
            .await
            .unwrap();
        let got: Vec<&str> = page.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(got, vec!["m3", "m2"]);
    }

    #[tokio::test]
    async fn test_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");

        {
            let store = DocumentStore::open(&path).unwrap();
            store
                .append(NewMessage {
                    sender_id: SenderId("A".into()),
                    text: "persisted".into(),
                    client_key: None,
                })
                .await
                .unwrap();
        }

        let store = DocumentStore::open(&path).unwrap();
        let mut sub = store.subscribe_live(newest(25)).await.unwrap();
        let snapshot = sub.snapshots.recv().await.unwrap().unwrap();
        assert_eq!(texts(&snapshot), vec!["persisted"]);
    }
}
