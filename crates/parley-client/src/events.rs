use serde::Serialize;

use parley_shared::protocol::Message;

use crate::error::{ClientError, ErrorKind};
use crate::sync::SyncState;
use crate::window::PendingMessage;

/// What the presentation shell renders. Published on every window change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowSnapshot {
    /// Committed records, oldest first.
    pub messages: Vec<Message>,
    /// Optimistic placeholders, oldest first. Always empty unless optimistic
    /// sends are enabled.
    pub pending: Vec<PendingMessage>,
    pub state: SyncState,
}

impl Default for WindowSnapshot {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            pending: Vec::new(),
            state: SyncState::Idle,
        }
    }
}

/// Out-of-band notifications for the presentation shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(SyncState),
    /// The live subscription dropped and was re-established.
    Reconnected,
    /// The live subscription is gone; the window stays at its last state.
    LiveFrozen,
    Error { kind: ErrorKind, message: String },
}

impl SessionEvent {
    pub fn from_error(err: &ClientError) -> Option<Self> {
        err.kind().map(|kind| SessionEvent::Error {
            kind,
            message: err.to_string(),
        })
    }
}
