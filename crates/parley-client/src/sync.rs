//! Pagination state machine.
//!
//! [`SyncController`] owns the [`MessageWindow`] and the pagination cursor.
//! It never touches the store itself: it hands out [`PageRequest`]s and is
//! told about live snapshots and page results, so every transition can be
//! driven (and tested) without a runtime.
//!
//! ```text
//! Idle --start--> Live --scroll--> FetchingHistory --page--> Live
//!                                         |
//!                                         +--empty page--> Exhausted (sticky)
//! any --stop--> Idle
//! ```

use serde::Serialize;
use tracing::{debug, info};

use parley_shared::constants::{DEFAULT_LIVE_LIMIT, DEFAULT_PAGE_SIZE};
use parley_shared::protocol::{Cursor, LiveQuery, LiveSnapshot, Message, PageQuery, SortDirection};
use parley_store::StoreError;

use crate::window::MessageWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncState {
    /// Not subscribed.
    Idle,
    /// Subscribed, no history fetch pending.
    Live,
    /// One history fetch in flight.
    FetchingHistory,
    /// The store reported no older records. Live updates still apply.
    Exhausted,
}

/// Identifies one history fetch. Results carrying any other ticket are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub ticket: FetchTicket,
    pub query: PageQuery,
}

#[derive(Debug)]
pub enum PageOutcome {
    /// The page was merged; `added` records were new.
    Merged { added: usize },
    /// The page was empty; pagination is over for this session.
    Exhausted,
    /// The fetch failed; back to `Live` with the cursor unchanged.
    Failed(StoreError),
    /// Stale ticket or stopped controller; the result was dropped.
    Discarded,
}

#[derive(Debug)]
pub struct SyncController {
    window: MessageWindow,
    state: SyncState,
    cursor: Option<Cursor>,
    in_flight: Option<FetchTicket>,
    next_ticket: u64,
    live_limit: u32,
    page_size: u32,
}

impl Default for SyncController {
    fn default() -> Self {
        Self::new(DEFAULT_LIVE_LIMIT, DEFAULT_PAGE_SIZE)
    }
}

impl SyncController {
    pub fn new(live_limit: u32, page_size: u32) -> Self {
        Self {
            window: MessageWindow::new(),
            state: SyncState::Idle,
            cursor: None,
            in_flight: None,
            next_ticket: 1,
            live_limit: live_limit.max(1),
            page_size: page_size.max(1),
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn cursor(&self) -> Option<Cursor> {
        self.cursor
    }

    pub fn window(&self) -> &MessageWindow {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut MessageWindow {
        &mut self.window
    }

    /// The live query: most recent `live_limit` records, newest first.
    pub fn live_query(&self) -> LiveQuery {
        LiveQuery {
            direction: SortDirection::Descending,
            limit: self.live_limit,
        }
    }

    /// `Idle -> Live`. Returns the query to subscribe with, or `None` if
    /// already started.
    pub fn start(&mut self) -> Option<LiveQuery> {
        if self.state != SyncState::Idle {
            return None;
        }
        self.state = SyncState::Live;
        self.cursor = self.window.oldest_key().map(Cursor::from_key);
        info!(limit = self.live_limit, "sync started");
        Some(self.live_query())
    }

    /// Apply a live result set. Returns `true` if the window changed.
    pub fn on_live_snapshot(&mut self, snapshot: LiveSnapshot) -> bool {
        if self.state == SyncState::Idle {
            debug!("live snapshot ignored while idle");
            return false;
        }
        let changed = self.window.apply_live_snapshot(snapshot.messages);
        if self.state != SyncState::Exhausted {
            self.cursor = self.window.oldest_key().map(Cursor::from_key);
        }
        changed
    }

    /// The user scrolled near the oldest end.
    ///
    /// Only effective in `Live` with a cursor. Repeated calls while a fetch
    /// is in flight return `None`: they are neither queued nor coalesced.
    pub fn on_scroll_near_oldest(&mut self) -> Option<PageRequest> {
        if self.state != SyncState::Live {
            debug!(state = ?self.state, "scroll ignored");
            return None;
        }
        let cursor = self.cursor?;

        let ticket = FetchTicket(self.next_ticket);
        self.next_ticket += 1;
        self.in_flight = Some(ticket);
        self.state = SyncState::FetchingHistory;

        debug!(ticket = ticket.0, limit = self.page_size, "history fetch issued");
        Some(PageRequest {
            ticket,
            query: PageQuery {
                direction: SortDirection::Descending,
                after: Some(cursor),
                limit: self.page_size,
            },
        })
    }

    /// Resolve the fetch identified by `ticket`.
    pub fn on_page_loaded(
        &mut self,
        ticket: FetchTicket,
        result: Result<Vec<Message>, StoreError>,
    ) -> PageOutcome {
        if self.state != SyncState::FetchingHistory || self.in_flight != Some(ticket) {
            debug!(ticket = ticket.0, state = ?self.state, "stale page discarded");
            return PageOutcome::Discarded;
        }
        self.in_flight = None;

        match result {
            Err(e) => {
                self.state = SyncState::Live;
                PageOutcome::Failed(e)
            }
            Ok(records) if records.is_empty() => {
                self.state = SyncState::Exhausted;
                self.cursor = None;
                info!("history exhausted");
                PageOutcome::Exhausted
            }
            Ok(records) => {
                let added = self.window.prepend_history_page(records);
                self.cursor = self.window.oldest_key().map(Cursor::from_key);
                self.state = SyncState::Live;
                PageOutcome::Merged { added }
            }
        }
    }

    /// Any state to `Idle`. Outstanding tickets become stale. Returns `true`
    /// if the controller was running.
    pub fn stop(&mut self) -> bool {
        self.in_flight = None;
        if self.state == SyncState::Idle {
            return false;
        }
        self.state = SyncState::Idle;
        info!("sync stopped");
        true
    }
}
