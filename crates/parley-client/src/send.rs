//! Send path: validate compose text and durably append it.
//!
//! Sends are not inserted into the window here.  The committed record shows
//! up once the live subscription delivers it back; optimistic placeholders,
//! when enabled, are handled by the session.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, warn};
use uuid::Uuid;

use parley_shared::protocol::{Message, NewMessage};
use parley_shared::types::SenderId;
use parley_store::RemoteStore;

use crate::error::{ClientError, Result};

pub struct SendCoordinator<S> {
    store: Arc<S>,
    sender_id: SenderId,
}

impl<S: RemoteStore> SendCoordinator<S> {
    pub fn new(store: Arc<S>, sender_id: SenderId) -> Self {
        Self { store, sender_id }
    }

    pub fn sender_id(&self) -> &SenderId {
        &self.sender_id
    }

    /// Build the record for `text`, or `None` if there is nothing to send.
    ///
    /// Blank input is a silent no-op, the same as a disabled send button.
    /// Non-blank text is sent exactly as typed.
    pub fn prepare(&self, text: &str) -> Option<NewMessage> {
        if text.trim().is_empty() {
            return None;
        }
        Some(NewMessage {
            sender_id: self.sender_id.clone(),
            text: text.to_string(),
            client_key: Some(Uuid::new_v4()),
        })
    }

    /// Issue one durable append for a prepared record.
    pub fn append(&self, record: NewMessage) -> BoxFuture<'static, Result<Message>> {
        let text = record.text.clone();
        let fut = self.store.append(record);
        Box::pin(async move {
            match fut.await {
                Ok(message) => {
                    debug!(id = %message.id, "send committed");
                    Ok(message)
                }
                Err(source) => {
                    warn!(error = %source, "send failed");
                    Err(ClientError::AppendFailed { text, source })
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_shared::protocol::{LiveQuery, PageQuery, SortDirection};
    use parley_shared::types::SubscriptionId;
    use parley_store::{DocumentStore, LiveSubscription, StoreError};

    fn coordinator() -> (Arc<DocumentStore>, SendCoordinator<DocumentStore>) {
        let store = Arc::new(DocumentStore::open_in_memory().unwrap());
        let coordinator = SendCoordinator::new(store.clone(), SenderId("A".into()));
        (store, coordinator)
    }

    #[test]
    fn test_blank_text_is_not_prepared() {
        let (_store, coordinator) = coordinator();
        assert!(coordinator.prepare("").is_none());
        assert!(coordinator.prepare("   ").is_none());
        assert!(coordinator.prepare("\n\t").is_none());
    }

    #[test]
    fn test_prepared_record_is_tagged_and_untrimmed() {
        let (_store, coordinator) = coordinator();
        let record = coordinator.prepare("  hi ").unwrap();
        assert_eq!(record.sender_id, SenderId("A".into()));
        assert_eq!(record.text, "  hi ");
        assert!(record.client_key.is_some());
    }

    #[test]
    fn test_each_prepare_gets_a_fresh_client_key() {
        let (_store, coordinator) = coordinator();
        let first = coordinator.prepare("same").unwrap();
        let second = coordinator.prepare("same").unwrap();
        assert_ne!(first.client_key, second.client_key);
    }

    #[tokio::test]
    async fn test_append_commits_with_sender_identity() {
        let (store, coordinator) = coordinator();
        let record = coordinator.prepare("hello").unwrap();
        let client_key = record.client_key;

        let message = coordinator.append(record).await.unwrap();
        assert_eq!(message.sender_id.as_str(), "A");
        assert_eq!(message.text, "hello");
        assert_eq!(message.client_key, client_key);

        let mut sub = store
            .subscribe_live(LiveQuery {
                direction: SortDirection::Descending,
                limit: 25,
            })
            .await
            .unwrap();
        let snapshot = sub.snapshots.recv().await.unwrap().unwrap();
        assert_eq!(snapshot.messages, vec![message]);
    }

    struct FailingStore;

    impl RemoteStore for FailingStore {
        fn subscribe_live(&self, _query: LiveQuery) -> BoxFuture<'static, parley_store::Result<LiveSubscription>> {
            Box::pin(async { Err(StoreError::SubscriptionClosed) })
        }

        fn fetch_page(&self, _query: PageQuery) -> BoxFuture<'static, parley_store::Result<Vec<Message>>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn append(&self, _record: NewMessage) -> BoxFuture<'static, parley_store::Result<Message>> {
            Box::pin(async { Err(StoreError::LockPoisoned) })
        }

        fn cancel(&self, _id: SubscriptionId) {}
    }

    #[tokio::test]
    async fn test_failed_append_returns_text() {
        let coordinator = SendCoordinator::new(Arc::new(FailingStore), SenderId("A".into()));
        let record = coordinator.prepare("lost words").unwrap();
        let err = coordinator.append(record).await.unwrap_err();
        match err {
            ClientError::AppendFailed { text, .. } => assert_eq!(text, "lost words"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
