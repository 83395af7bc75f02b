//! The contract the chat client requires from a remote message store.
//!
//! Four operations: open a live query, fetch one page, append one record,
//! cancel a live query.  Everything else about the store (replication,
//! durability, query consistency) is the store's own business.

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use parley_shared::protocol::{LiveQuery, LiveSnapshot, Message, NewMessage, PageQuery};
use parley_shared::types::SubscriptionId;

use crate::error::{Result, StoreError};

/// An open live query.
///
/// The first item is the result set at subscription time; every later item
/// is the full result set after a change.  An `Err` item means the stream
/// failed and nothing further will be delivered.
#[derive(Debug)]
pub struct LiveSubscription {
    pub id: SubscriptionId,
    pub snapshots: mpsc::UnboundedReceiver<std::result::Result<LiveSnapshot, StoreError>>,
}

pub trait RemoteStore: Send + Sync + 'static {
    /// Open a live query bounded to `query.limit` records.
    fn subscribe_live(&self, query: LiveQuery) -> BoxFuture<'static, Result<LiveSubscription>>;

    /// Fetch one page of records strictly past `query.after`.
    fn fetch_page(&self, query: PageQuery) -> BoxFuture<'static, Result<Vec<Message>>>;

    /// Durably append a record. The store assigns identity and creation time.
    fn append(&self, record: NewMessage) -> BoxFuture<'static, Result<Message>>;

    /// Release a live query. Unknown or already-cancelled ids are ignored.
    fn cancel(&self, id: SubscriptionId);
}
