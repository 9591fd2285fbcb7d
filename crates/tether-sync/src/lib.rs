//! # tether-sync
//!
//! The moving parts between the upstream connection and the store:
//!
//! - [`SyncEngine`] projects upstream events from the bus into the store.
//! - [`OutboxSender`] drains queued sends while the session is ready.
//! - [`Lifecycle`] turns upstream signals into status transitions and bus
//!   events.
//! - [`spawn_identity_reconciler`] folds alternate-identifier chats into
//!   their canonical chats once the connection is up.
//!
//! Every task takes a [`CancellationToken`](tokio_util::sync::CancellationToken)
//! and drops its bus subscription on exit.

pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod outbox;
pub mod reconciler;
pub mod session;
pub mod upstream;

use std::sync::{Arc, Mutex};

use tether_store::Database;

pub use engine::SyncEngine;
pub use error::{SendError, SyncError};
pub use lifecycle::Lifecycle;
pub use outbox::OutboxSender;
pub use reconciler::{reconcile_identities, spawn_identity_reconciler};
pub use session::{submit_text, SessionSnapshot};
pub use upstream::{IdentityCache, IdentitySource, TextSender, UpstreamSignal};

/// The store handle shared by every task.
pub type SharedDatabase = Arc<Mutex<Database>>;

pub fn shared(db: Database) -> SharedDatabase {
    Arc::new(Mutex::new(db))
}

/// Run one store call under the lock. The guard never outlives `f`, so no
/// caller can hold it across an `.await` or a bus publish.
pub(crate) fn with_db<T>(
    db: &SharedDatabase,
    f: impl FnOnce(&mut Database) -> tether_store::Result<T>,
) -> Result<T, SyncError> {
    let mut guard = db.lock().map_err(|_| SyncError::LockPoisoned)?;
    Ok(f(&mut guard)?)
}
