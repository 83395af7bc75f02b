use serde::Serialize;
use thiserror::Error;

use parley_shared::error::IdentityError;
use parley_store::StoreError;

/// Errors surfaced by a chat session. None of them is fatal to the process.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A history page could not be fetched. Pagination state is unchanged.
    #[error("History fetch failed: {0}")]
    FetchFailed(#[source] StoreError),

    /// A send was not committed. `text` is the body that was lost, so the
    /// shell can put it back into the compose field.
    #[error("Message not sent: {source}")]
    AppendFailed {
        text: String,
        #[source]
        source: StoreError,
    },

    /// The live subscription failed and could not be re-established.
    #[error("Live subscription failed: {0}")]
    SubscriptionFailed(#[source] StoreError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    /// The session's event loop has stopped.
    #[error("Chat session is closed")]
    SessionClosed,
}

/// Transient error classes reported to the presentation shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    FetchFailed,
    AppendFailed,
    SubscriptionFailed,
}

impl ClientError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ClientError::FetchFailed(_) => Some(ErrorKind::FetchFailed),
            ClientError::AppendFailed { .. } => Some(ErrorKind::AppendFailed),
            ClientError::SubscriptionFailed(_) => Some(ErrorKind::SubscriptionFailed),
            ClientError::Identity(_) | ClientError::SessionClosed => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
