//! # parley-store
//!
//! The remote message store contract used by the chat client, plus
//! [`DocumentStore`], a SQLite-backed implementation of it.
//!
//! The store holds a single append-only collection of timestamped text
//! records.  It answers cursor-paginated queries ordered by creation time and
//! keeps live queries open: every append re-evaluates each subscriber's
//! bounded query and pushes the full result set to it.

pub mod database;
pub mod document_store;
pub mod messages;
pub mod migrations;
pub mod remote;

mod error;

pub use database::Database;
pub use document_store::DocumentStore;
pub use error::{Result, StoreError};
pub use remote::{LiveSubscription, RemoteStore};
