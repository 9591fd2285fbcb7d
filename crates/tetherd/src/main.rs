//! # tetherd
//!
//! Local daemon that keeps one upstream chat session mirrored on disk.
//!
//! This binary wires together:
//! - the **status machine** tracking connectivity
//! - the **sync engine** projecting upstream events into SQLite
//! - the **outbox sender** delivering queued messages while ready
//! - a **one-shot identity reconciler** run after the first connection
//! - a **stdio bridge** standing in for the upstream connection (signals on
//!   stdin, sends on stdout; logs go to stderr)

mod bridge;
mod config;
mod error;
mod session;

use std::sync::Arc;

use anyhow::Context;
use tether_shared::{Bus, State, StatusMachine};
use tether_store::Database;
use tether_sync::{
    spawn_identity_reconciler, IdentityCache, Lifecycle, OutboxSender, SessionSnapshot,
    SyncEngine,
};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::bridge::LineSender;
use crate::config::{DaemonConfig, DEFAULT_LOG_FILTER};
use crate::session::{SessionLock, SessionPaths};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG). Stdout belongs to the bridge.
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting tetherd v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration and claim the session
    // -----------------------------------------------------------------------
    let config = DaemonConfig::from_env();
    info!(?config, "Loaded configuration");

    let paths = SessionPaths::new(config.home()?, &config.session)?;
    paths.ensure()?;
    let lock = SessionLock::acquire(&paths.lock_path())?;
    info!(session = %config.session, dir = %paths.dir().display(), "Session locked");

    let result = run(&config, &paths).await;

    if let Err(e) = lock.release() {
        warn!(error = %e, "Failed to release session lock");
    }
    result
}

async fn run(config: &DaemonConfig, paths: &SessionPaths) -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 3. Open the store and recover interrupted sends
    // -----------------------------------------------------------------------
    let db = Database::open_at(&paths.db_path())
        .with_context(|| format!("opening store at {}", paths.db_path().display()))?;
    let db = tether_sync::shared(db);

    let bus = Bus::new();
    let status = Arc::new(StatusMachine::new(bus.clone()));
    let identities = Arc::new(IdentityCache::new());

    let outbox = OutboxSender::new(
        db.clone(),
        bus.clone(),
        status.clone(),
        Arc::new(LineSender::new(tokio::io::stdout())),
    );
    let recovered = outbox.recover().context("recovering outbox")?;
    if recovered > 0 {
        info!(count = recovered, "Outbox entries requeued after restart");
    }

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------
    let cancel = CancellationToken::new();

    let engine_task =
        SyncEngine::new(db.clone(), bus.clone()).spawn(config.bus_capacity, cancel.child_token());
    let outbox_task = outbox.spawn(config.outbox_interval, cancel.child_token());
    let reconciler_task = spawn_identity_reconciler(
        db.clone(),
        bus.clone(),
        identities.clone(),
        config.reconcile_delay,
        cancel.child_token(),
    );

    let lifecycle = Lifecycle::new(status.clone(), bus.clone(), identities);
    status.transition(State::Connecting)?;

    let snapshot = SessionSnapshot::capture(&db, &status)?;
    info!(?snapshot, "Daemon running");

    // -----------------------------------------------------------------------
    // 5. Serve the upstream bridge until it closes or we are interrupted
    // -----------------------------------------------------------------------
    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = bridge::read_signals(stdin, &lifecycle, cancel.child_token()) => match result {
            Ok(handled) => info!(signals = handled, "Upstream closed, shutting down"),
            Err(e) => error!(error = %e, "Upstream read failed, shutting down"),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    // -----------------------------------------------------------------------
    // 6. Stop every task and wait for it
    // -----------------------------------------------------------------------
    cancel.cancel();
    let (engine, outbox, reconciler) = tokio::join!(engine_task, outbox_task, reconciler_task);
    for (name, joined) in [("sync engine", engine), ("outbox sender", outbox), ("reconciler", reconciler)] {
        if let Err(e) = joined {
            error!(task = name, error = %e, "Task did not stop cleanly");
        }
    }

    match SessionSnapshot::capture(&db, &status) {
        Ok(snapshot) => info!(?snapshot, "Daemon stopped"),
        Err(e) => warn!(error = %e, "Failed to capture final snapshot"),
    }
    Ok(())
}
