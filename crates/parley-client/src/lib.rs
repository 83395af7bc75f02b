//! # parley-client
//!
//! Message sync and pagination for a single shared chat room.
//!
//! The client keeps a window of recent messages in step with the store: a
//! live subscription covers the newest records, older history is pulled in
//! page by page as the user scrolls, and sends are appended durably and show
//! up through the subscription.
//!
//! - [`window`]: the ordered, de-duplicated message window
//! - [`sync`]: live subscription and pagination state machine
//! - [`send`]: compose validation and durable append
//! - [`session`]: the event loop tying the three to a store
//! - [`view`]: newest-first rendering for the terminal shell

pub mod config;
pub mod error;
pub mod events;
pub mod send;
pub mod session;
pub mod sync;
pub mod view;
pub mod window;

use tracing_subscriber::{fmt, EnvFilter};

pub use error::{ClientError, Result};
pub use session::{ChatSession, SendOutcome, SessionConfig, SessionHandle};

/// Install the global tracing subscriber. Honours `RUST_LOG`; logs go to
/// stderr so stdout stays the transcript.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("parley_client=debug,parley_store=info,warn"));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
