//! # parley
//!
//! Line-oriented terminal shell for the chat client.
//!
//! Type a line to send it, `/more` to load older history and `/quit` to
//! leave. The transcript is reprinted newest first on every change.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use parley_client::config::{ClientConfig, RenderMode};
use parley_client::error::ErrorKind;
use parley_client::events::SessionEvent;
use parley_client::{view, ChatSession, ClientError, SendOutcome, SessionHandle};
use parley_shared::constants::APP_NAME;
use parley_shared::types::SenderId;
use parley_store::{Database, DocumentStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Tracing and configuration
    // -----------------------------------------------------------------------
    parley_client::init_tracing();
    info!("Starting {} v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 2. Store
    // -----------------------------------------------------------------------
    let db = match &config.db_path {
        Some(path) => Database::open_at(path),
        None => Database::new(),
    }
    .context("failed to open message database")?;
    info!(path = ?db.path(), messages = db.count_messages()?, "Opened message store");
    let store = Arc::new(DocumentStore::new(db));

    // -----------------------------------------------------------------------
    // 3. Identity
    // -----------------------------------------------------------------------
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let identity = match config.display_name.as_deref() {
        Some(name) => SenderId::from_display_name(name).context("invalid PARLEY_DISPLAY_NAME")?,
        None => match prompt_display_name(&mut lines).await? {
            Some(identity) => identity,
            None => return Ok(()),
        },
    };

    // -----------------------------------------------------------------------
    // 4. Session and shell loop
    // -----------------------------------------------------------------------
    let handle = ChatSession::spawn(store, identity, config.session_config()).await?;
    info!(sender = %handle.identity(), "Session started");

    let printer = tokio::spawn(print_window(handle.clone(), config.render));
    let notifier = tokio::spawn(print_events(handle.clone()));

    tokio::select! {
        result = read_commands(&handle, &mut lines) => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    handle.stop().await;
    printer.abort();
    notifier.abort();
    Ok(())
}

/// Ask until a valid name is entered. `None` on end of input.
async fn prompt_display_name(lines: &mut Lines<BufReader<Stdin>>) -> anyhow::Result<Option<SenderId>> {
    loop {
        println!("Please enter your name:");
        let Some(line) = lines.next_line().await? else {
            return Ok(None);
        };
        match SenderId::from_display_name(&line) {
            Ok(identity) => return Ok(Some(identity)),
            Err(e) => println!("{e}"),
        }
    }
}

async fn read_commands(handle: &SessionHandle, lines: &mut Lines<BufReader<Stdin>>) -> anyhow::Result<()> {
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "/quit" => break,
            "/more" => handle.scroll_near_oldest().await?,
            _ => {
                // Don't block input on the append round trip.
                let handle = handle.clone();
                tokio::spawn(async move {
                    match handle.send(line).await {
                        Ok(SendOutcome::Committed(message)) => {
                            info!(id = %message.id, "Message sent")
                        }
                        Ok(SendOutcome::Skipped) => {}
                        Err(ClientError::AppendFailed { text, .. }) => {
                            println!("! not sent, copy it back if you like: {text}")
                        }
                        Err(e) => warn!(error = %e, "Send failed"),
                    }
                });
            }
        }
    }
    Ok(())
}

async fn print_window(mut handle: SessionHandle, mode: RenderMode) {
    let me = handle.identity().clone();
    while let Ok(snapshot) = handle.window_changed().await {
        match mode {
            RenderMode::Text => {
                println!("---- {:?} ----", snapshot.state);
                for line in view::render_lines(&snapshot, &me) {
                    println!("{line}");
                }
            }
            RenderMode::Json => match view::render_json(&snapshot, &me) {
                Ok(json) => println!("{json}"),
                Err(e) => warn!(error = %e, "Failed to render window"),
            },
        }
    }
}

async fn print_events(handle: SessionHandle) {
    let mut events = handle.subscribe_events();
    loop {
        match events.recv().await {
            // The send path reports these with the lost text.
            Ok(SessionEvent::Error {
                kind: ErrorKind::AppendFailed,
                ..
            }) => {}
            Ok(SessionEvent::Error { message, .. }) => println!("! {message}"),
            Ok(SessionEvent::Reconnected) => println!("! live updates reconnected"),
            Ok(SessionEvent::LiveFrozen) => println!("! live updates stopped; restart to resume"),
            Ok(SessionEvent::StateChanged(_)) => {}
            Err(RecvError::Lagged(n)) => warn!(skipped = n, "Event receiver lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
