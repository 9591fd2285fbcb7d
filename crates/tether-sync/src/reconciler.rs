//! One-shot identity reconciliation after the first connection.

use std::sync::Arc;
use std::time::Duration;

use tether_shared::{Bus, EventPayload};
use tether_store::IdentityMapping;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::SyncError;
use crate::upstream::IdentitySource;
use crate::{with_db, SharedDatabase};

/// Replace the stored mapping with `mappings` and merge alternate chats.
///
/// Publishes `message.reconciled` when at least one chat was merged.
/// Returns the number of merged chats.
pub fn reconcile_identities(
    db: &SharedDatabase,
    bus: &Bus,
    mappings: &[IdentityMapping],
) -> Result<usize, SyncError> {
    let merged = with_db(db, |db| {
        db.replace_identity_map(mappings)?;
        db.reconcile_identities()
    })?;

    if merged > 0 {
        bus.publish(EventPayload::MessagesReconciled { merged });
    }
    Ok(merged)
}

/// Wait for exactly one `sync.connected`, give the upstream `settle` to
/// finish resolving identities, reconcile once, then exit.
pub fn spawn_identity_reconciler(
    db: SharedDatabase,
    bus: Bus,
    source: Arc<dyn IdentitySource>,
    settle: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let (mut rx, subscription) = bus.subscribe("sync.connected", 1);

    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            event = rx.recv() => {
                if event.is_some() {
                    // The trigger has fired; later connections are not our concern.
                    subscription.unsubscribe();
                    run_once(&db, &bus, source.as_ref(), settle, &cancel).await;
                }
            }
        }
        subscription.unsubscribe();
    })
}

async fn run_once(
    db: &SharedDatabase,
    bus: &Bus,
    source: &dyn IdentitySource,
    settle: Duration,
    cancel: &CancellationToken,
) {
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(settle) => {}
    }

    let mappings = match source.identity_mappings().await {
        Ok(mappings) => mappings,
        Err(e) => {
            error!(error = %e, "failed to fetch identity mapping");
            return;
        }
    };
    if mappings.is_empty() {
        debug!("no identity mapping available, skipping reconciliation");
        return;
    }

    match reconcile_identities(db, bus, &mappings) {
        Ok(merged) => info!(merged, mappings = mappings.len(), "identity reconciliation finished"),
        Err(e) => error!(error = %e, "identity reconciliation failed"),
    }
}
