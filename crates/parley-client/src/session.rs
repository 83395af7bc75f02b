//! Chat session event loop.
//!
//! A [`ChatSession`] runs in a dedicated tokio task and is the only place the
//! message window is mutated.  Shell commands, live snapshots, page results
//! and append results are all funnelled into that task through channels, so
//! they are applied one at a time in arrival order.  Store calls run in
//! their own tasks and report back through the completion channel; a live
//! snapshot can therefore land while a page fetch is still in flight.
//!
//! The presentation shell talks to the session through a [`SessionHandle`].

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use parley_shared::constants::{DEFAULT_LIVE_LIMIT, DEFAULT_PAGE_SIZE};
use parley_shared::protocol::{LiveSnapshot, Message};
use parley_shared::types::SenderId;
use parley_store::{LiveSubscription, RemoteStore, StoreError};

use crate::error::{ClientError, Result};
use crate::events::{SessionEvent, WindowSnapshot};
use crate::send::SendCoordinator;
use crate::sync::{FetchTicket, PageOutcome, SyncController, SyncState};
use crate::window::PendingMessage;

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Records covered by the live subscription.
    pub live_limit: u32,
    /// Records requested per history page.
    pub page_size: u32,
    /// Show a pending placeholder for each send until it is committed.
    pub optimistic_sends: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            live_limit: DEFAULT_LIVE_LIMIT,
            page_size: DEFAULT_PAGE_SIZE,
            optimistic_sends: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank text; nothing was sent.
    Skipped,
    /// Durably committed. It reaches the window through the live
    /// subscription, not from here.
    Committed(Message),
}

enum Command {
    ScrollNearOldest,
    Send {
        text: String,
        reply: oneshot::Sender<Result<SendOutcome>>,
    },
    Stop(oneshot::Sender<()>),
}

enum Completion {
    Page {
        ticket: FetchTicket,
        result: parley_store::Result<Vec<Message>>,
    },
    Append {
        client_key: Option<Uuid>,
        result: Result<Message>,
        reply: oneshot::Sender<Result<SendOutcome>>,
    },
    Resubscribed {
        result: parley_store::Result<LiveSubscription>,
    },
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Shell-facing side of a running session. Cheap to clone.
#[derive(Clone)]
pub struct SessionHandle {
    identity: SenderId,
    commands: mpsc::Sender<Command>,
    window: watch::Receiver<WindowSnapshot>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    /// The identity captured at session start.
    pub fn identity(&self) -> &SenderId {
        &self.identity
    }

    pub fn current_window(&self) -> WindowSnapshot {
        self.window.borrow().clone()
    }

    /// Wait for the next window change and return it.
    pub async fn window_changed(&mut self) -> Result<WindowSnapshot> {
        self.window
            .changed()
            .await
            .map_err(|_| ClientError::SessionClosed)?;
        Ok(self.window.borrow_and_update().clone())
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn scroll_near_oldest(&self) -> Result<()> {
        self.commands
            .send(Command::ScrollNearOldest)
            .await
            .map_err(|_| ClientError::SessionClosed)
    }

    /// Send `text` as the session identity. Resolves once the append is
    /// committed or has failed.
    pub async fn send(&self, text: impl Into<String>) -> Result<SendOutcome> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Send {
                text: text.into(),
                reply,
            })
            .await
            .map_err(|_| ClientError::SessionClosed)?;
        rx.await.map_err(|_| ClientError::SessionClosed)?
    }

    /// Cancel the live subscription and end the session. Safe to call any
    /// number of times, from any state.
    pub async fn stop(&self) {
        let (ack, rx) = oneshot::channel();
        if self.commands.send(Command::Stop(ack)).await.is_ok() {
            let _ = rx.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct ChatSession<S: RemoteStore> {
    store: Arc<S>,
    config: SessionConfig,
    controller: SyncController,
    sender: SendCoordinator<S>,
    subscription: Option<LiveSubscription>,
    fetch_task: Option<JoinHandle<()>>,
    resubscribe_task: Option<JoinHandle<()>>,
    /// Set from a reconnect attempt until the new subscription delivers its
    /// first snapshot.
    reconnecting: bool,
    commands: mpsc::Receiver<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    window_tx: watch::Sender<WindowSnapshot>,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl<S: RemoteStore> ChatSession<S> {
    /// Open the live subscription and spawn the event loop.
    ///
    /// Fails with `SubscriptionFailed` if the subscription cannot be opened
    /// after one retry.
    pub async fn spawn(store: Arc<S>, identity: SenderId, config: SessionConfig) -> Result<SessionHandle> {
        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (window_tx, window_rx) = watch::channel(WindowSnapshot::default());
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER);

        let mut session = ChatSession {
            sender: SendCoordinator::new(store.clone(), identity.clone()),
            store,
            config,
            controller: SyncController::new(config.live_limit, config.page_size),
            subscription: None,
            fetch_task: None,
            resubscribe_task: None,
            reconnecting: false,
            commands,
            completions_tx,
            completions,
            window_tx,
            events_tx: events_tx.clone(),
        };
        session.start().await?;

        tokio::spawn(session.run());

        Ok(SessionHandle {
            identity,
            commands: commands_tx,
            window: window_rx,
            events: events_tx,
        })
    }

    async fn start(&mut self) -> Result<()> {
        let Some(query) = self.controller.start() else {
            return Ok(());
        };

        let store = self.store.clone();
        let opened = match store.subscribe_live(query).await {
            Ok(subscription) => Ok(subscription),
            Err(first) => {
                warn!(error = %first, "live subscription failed, retrying once");
                store
                    .subscribe_live(query)
                    .await
                    .map_err(ClientError::SubscriptionFailed)
            }
        };

        match opened {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                self.publish();
                Ok(())
            }
            Err(e) => {
                self.controller.stop();
                Err(e)
            }
        }
    }

    async fn run(mut self) {
        info!(sender = %self.sender.sender_id(), "chat session running");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::ScrollNearOldest) => self.begin_fetch(),
                    Some(Command::Send { text, reply }) => self.begin_send(text, reply),
                    Some(Command::Stop(ack)) => {
                        self.shutdown();
                        let _ = ack.send(());
                        return;
                    }
                    None => {
                        info!("all session handles dropped");
                        break;
                    }
                },
                Some(completion) = self.completions.recv() => self.handle_completion(completion),
                item = next_snapshot(&mut self.subscription) => self.handle_live(item),
            }
        }

        self.shutdown();
    }

    fn begin_fetch(&mut self) {
        let Some(request) = self.controller.on_scroll_near_oldest() else {
            return;
        };

        let fut = self.store.fetch_page(request.query);
        let tx = self.completions_tx.clone();
        self.fetch_task = Some(tokio::spawn(async move {
            let result = fut.await;
            let _ = tx.send(Completion::Page {
                ticket: request.ticket,
                result,
            });
        }));

        self.emit(SessionEvent::StateChanged(self.controller.state()));
        self.publish();
    }

    fn begin_send(&mut self, text: String, reply: oneshot::Sender<Result<SendOutcome>>) {
        let Some(record) = self.sender.prepare(&text) else {
            debug!("blank send ignored");
            let _ = reply.send(Ok(SendOutcome::Skipped));
            return;
        };

        let client_key = record.client_key;
        if self.config.optimistic_sends {
            if let Some(pending) = PendingMessage::for_record(&record) {
                if self.controller.window_mut().push_pending(pending) {
                    self.publish();
                }
            }
        }

        let fut = self.sender.append(record);
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = fut.await;
            // Session gone: answer the caller directly.
            if let Err(mpsc::error::SendError(Completion::Append { result, reply, .. })) =
                tx.send(Completion::Append {
                    client_key,
                    result,
                    reply,
                })
            {
                let _ = reply.send(result.map(SendOutcome::Committed));
            }
        });
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Page { ticket, result } => {
                self.fetch_task = None;
                match self.controller.on_page_loaded(ticket, result) {
                    PageOutcome::Merged { added } => {
                        debug!(added, window = self.controller.window().len(), "history page merged")
                    }
                    PageOutcome::Exhausted => {}
                    PageOutcome::Failed(e) => {
                        let err = ClientError::FetchFailed(e);
                        warn!(error = %err, "history page not merged");
                        self.emit_error(&err);
                    }
                    PageOutcome::Discarded => return,
                }
                self.emit(SessionEvent::StateChanged(self.controller.state()));
                self.publish();
            }

            Completion::Append {
                client_key,
                result,
                reply,
            } => {
                if let Err(ref err) = result {
                    if let Some(key) = client_key {
                        if self.controller.window_mut().discard_pending(key) {
                            self.publish();
                        }
                    }
                    self.emit_error(err);
                }
                let _ = reply.send(result.map(SendOutcome::Committed));
            }

            Completion::Resubscribed { result } => {
                self.resubscribe_task = None;
                match result {
                    Ok(subscription) => {
                        info!(subscription = %subscription.id, "live subscription re-established");
                        self.subscription = Some(subscription);
                        self.emit(SessionEvent::Reconnected);
                    }
                    Err(e) => self.freeze(ClientError::SubscriptionFailed(e)),
                }
            }
        }
    }

    fn handle_live(&mut self, item: Option<parley_store::Result<LiveSnapshot>>) {
        match item {
            Some(Ok(snapshot)) => {
                self.reconnecting = false;
                let count = snapshot.messages.len();
                if self.controller.on_live_snapshot(snapshot) {
                    debug!(count, window = self.controller.window().len(), "live snapshot applied");
                    self.publish();
                }
            }
            Some(Err(e)) => self.on_subscription_lost(e),
            None => self.on_subscription_lost(StoreError::SubscriptionClosed),
        }
    }

    /// One reconnect attempt per loss. A replacement that fails before its
    /// first snapshot counts as the failed attempt and freezes the window.
    fn on_subscription_lost(&mut self, cause: StoreError) {
        warn!(error = %cause, "live subscription lost");
        if let Some(old) = self.subscription.take() {
            self.store.cancel(old.id);
        }

        if self.reconnecting {
            self.freeze(ClientError::SubscriptionFailed(cause));
            return;
        }
        self.reconnecting = true;

        let fut = self.store.subscribe_live(self.controller.live_query());
        let tx = self.completions_tx.clone();
        self.resubscribe_task = Some(tokio::spawn(async move {
            let result = fut.await;
            let _ = tx.send(Completion::Resubscribed { result });
        }));
    }

    fn freeze(&mut self, err: ClientError) {
        error!(error = %err, "reconnect failed, window frozen");
        if let Some(task) = self.fetch_task.take() {
            task.abort();
        }
        self.controller.stop();
        self.emit_error(&err);
        self.emit(SessionEvent::LiveFrozen);
        self.publish();
    }

    fn shutdown(&mut self) {
        for task in [self.fetch_task.take(), self.resubscribe_task.take()].into_iter().flatten() {
            task.abort();
        }
        if let Some(subscription) = self.subscription.take() {
            self.store.cancel(subscription.id);
        }

        // Settle work that finished but was never picked up.
        while let Ok(completion) = self.completions.try_recv() {
            match completion {
                Completion::Resubscribed {
                    result: Ok(subscription),
                } => self.store.cancel(subscription.id),
                Completion::Append { result, reply, .. } => {
                    let _ = reply.send(result.map(SendOutcome::Committed));
                }
                _ => {}
            }
        }

        if self.controller.stop() {
            self.emit(SessionEvent::StateChanged(SyncState::Idle));
            self.publish();
        }
        info!("chat session stopped");
    }

    fn publish(&self) {
        let window = self.controller.window();
        self.window_tx.send_replace(WindowSnapshot {
            messages: window.as_ordered_sequence(),
            pending: window.pending().to_vec(),
            state: self.controller.state(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }

    fn emit_error(&self, err: &ClientError) {
        if let Some(event) = SessionEvent::from_error(err) {
            self.emit(event);
        }
    }
}

async fn next_snapshot(
    subscription: &mut Option<LiveSubscription>,
) -> Option<parley_store::Result<LiveSnapshot>> {
    match subscription {
        Some(sub) => sub.snapshots.recv().await,
        None => std::future::pending().await,
    }
}
