//! The message window: every record currently materialized for display.
//!
//! Committed records are kept in a single map keyed by [`OrderKey`], so the
//! oldest-first order and the by-id uniqueness hold no matter in which order
//! live snapshots and history pages arrive.  The window also remembers which
//! keys came from the most recent live snapshot, because each snapshot
//! replaces that portion wholesale.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use parley_shared::protocol::{Message, NewMessage, OrderKey};
use parley_shared::types::{MessageId, SenderId};

/// Local placeholder for a send that has not been committed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingMessage {
    pub client_key: Uuid,
    pub sender_id: SenderId,
    pub text: String,
    /// Local clock at the time the send was issued.
    pub queued_at: DateTime<Utc>,
}

impl PendingMessage {
    /// Placeholder for `record`. Returns `None` if the record has no
    /// idempotency key to reconcile against.
    pub fn for_record(record: &NewMessage) -> Option<Self> {
        Some(Self {
            client_key: record.client_key?,
            sender_id: record.sender_id.clone(),
            text: record.text.clone(),
            queued_at: Utc::now(),
        })
    }
}

#[derive(Debug, Default, Clone)]
pub struct MessageWindow {
    entries: BTreeMap<OrderKey, Message>,
    by_id: HashMap<MessageId, OrderKey>,
    live: BTreeSet<OrderKey>,
    pending: Vec<PendingMessage>,
}

impl MessageWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the live portion with a full live-query result set.
    ///
    /// Records that left the live query because newer ones pushed them past
    /// its bound stay in the window as history. Records that vanished from
    /// inside the bound are dropped. Returns `true` if the visible sequence
    /// changed.
    pub fn apply_live_snapshot(&mut self, records: Vec<Message>) -> bool {
        let new_live: BTreeSet<OrderKey> = records.iter().map(Message::order_key).collect();
        let floor = new_live.first().copied();

        let departed: Vec<OrderKey> = self.live.difference(&new_live).copied().collect();
        let mut changed = false;
        for key in departed {
            let scrolled_out = floor.map_or(false, |f| key < f);
            if !scrolled_out {
                changed |= self.remove(key);
            }
        }

        for message in records {
            changed |= self.upsert(message);
        }
        self.live = new_live;
        changed
    }

    /// Merge one page of older records.
    ///
    /// Records already materialized are left untouched. Returns the number of
    /// records newly added.
    pub fn prepend_history_page(&mut self, records: Vec<Message>) -> usize {
        let mut added = 0;
        for message in records {
            if self.by_id.contains_key(&message.id) {
                continue;
            }
            self.reconcile_pending(&message);
            let key = message.order_key();
            self.by_id.insert(message.id, key);
            self.entries.insert(key, message);
            added += 1;
        }
        added
    }

    /// Committed records, oldest first.
    pub fn as_ordered_sequence(&self) -> Vec<Message> {
        self.entries.values().cloned().collect()
    }

    pub fn oldest_key(&self) -> Option<OrderKey> {
        self.entries.keys().next().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pending(&self) -> &[PendingMessage] {
        &self.pending
    }

    /// Queue a placeholder. Ignored if one with the same key is queued.
    pub fn push_pending(&mut self, pending: PendingMessage) -> bool {
        if self.pending.iter().any(|p| p.client_key == pending.client_key) {
            return false;
        }
        self.pending.push(pending);
        true
    }

    pub fn discard_pending(&mut self, client_key: Uuid) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| p.client_key != client_key);
        before != self.pending.len()
    }

    fn upsert(&mut self, message: Message) -> bool {
        let key = message.order_key();
        let mut changed = self.reconcile_pending(&message);

        // Same record seen under another timestamp: keep only the newest copy.
        if let Some(stale) = self.by_id.get(&message.id).copied() {
            if stale != key {
                self.entries.remove(&stale);
                self.live.remove(&stale);
                changed = true;
            }
        }

        self.by_id.insert(message.id, key);
        match self.entries.insert(key, message) {
            None => true,
            Some(previous) => changed || self.entries.get(&key) != Some(&previous),
        }
    }

    fn remove(&mut self, key: OrderKey) -> bool {
        match self.entries.remove(&key) {
            Some(message) => {
                self.by_id.remove(&message.id);
                true
            }
            None => false,
        }
    }

    fn reconcile_pending(&mut self, message: &Message) -> bool {
        match message.client_key {
            Some(key) => self.discard_pending(key),
            None => false,
        }
    }
}
