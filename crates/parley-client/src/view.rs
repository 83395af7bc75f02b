//! Presentation helpers for the terminal shell.
//!
//! The window is kept oldest first; everything here renders it newest first,
//! the way a chat list scrolled to the bottom reads from the compose field
//! upwards.

use chrono::{DateTime, Utc};
use serde::Serialize;

use parley_shared::protocol::Message;
use parley_shared::types::SenderId;

use crate::events::WindowSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Side {
    Mine,
    Theirs,
}

/// Which side of the transcript a record from `sender` belongs on.
pub fn bubble_side(sender: &SenderId, me: &SenderId) -> Side {
    if sender == me {
        Side::Mine
    } else {
        Side::Theirs
    }
}

/// One renderable row, committed or pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    /// Record id, or the idempotency key for a pending send.
    pub id: String,
    pub sender: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub side: Side,
    pub pending: bool,
}

impl MessageDto {
    fn committed(message: &Message, me: &SenderId) -> Self {
        Self {
            id: message.id.to_string(),
            sender: message.sender_id.to_string(),
            text: message.text.clone(),
            created_at: message.created_at,
            side: bubble_side(&message.sender_id, me),
            pending: false,
        }
    }
}

/// Rows newest first: pending sends on top, then committed records.
pub fn newest_first(snapshot: &WindowSnapshot, me: &SenderId) -> Vec<MessageDto> {
    let pending = snapshot.pending.iter().rev().map(|p| MessageDto {
        id: p.client_key.to_string(),
        sender: p.sender_id.to_string(),
        text: p.text.clone(),
        created_at: p.queued_at,
        side: bubble_side(&p.sender_id, me),
        pending: true,
    });
    let committed = snapshot
        .messages
        .iter()
        .rev()
        .map(|m| MessageDto::committed(m, me));

    pending.chain(committed).collect()
}

/// Plain-text transcript lines, newest first.
pub fn render_lines(snapshot: &WindowSnapshot, me: &SenderId) -> Vec<String> {
    newest_first(snapshot, me)
        .into_iter()
        .map(|row| {
            let time = row.created_at.format("%H:%M");
            let marker = if row.pending { " (sending)" } else { "" };
            match row.side {
                Side::Mine => format!("{:>48} [{time}] {}{marker}", row.text, "me"),
                Side::Theirs => format!("[{time}] {}: {}{marker}", row.sender, row.text),
            }
        })
        .collect()
}

pub fn render_json(snapshot: &WindowSnapshot, me: &SenderId) -> serde_json::Result<String> {
    serde_json::to_string(&newest_first(snapshot, me))
}
