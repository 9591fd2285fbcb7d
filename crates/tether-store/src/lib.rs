//! # tether-store
//!
//! Durable replica of the upstream chat state, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed, idempotent helpers for chats,
//! messages, contacts, the outbox, the identity mapping and sync
//! checkpoints. Multi-statement operations that must be atomic (history
//! batches, identity reconciliation) run inside a single transaction.

pub mod chats;
pub mod checkpoints;
pub mod contacts;
pub mod database;
pub mod identity;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod outbox;
pub mod search;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
