//! Daemon configuration loaded from environment variables.
//!
//! Every setting has a default so the daemon starts with zero
//! configuration. Invalid values are logged and ignored.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tether_shared::constants::{
    APP_NAME, OUTBOX_POLL_INTERVAL_MS, RECONCILE_SETTLE_DELAY_MS, SYNC_QUEUE_CAPACITY,
};

use crate::error::DaemonError;

/// Log filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tetherd=debug,tether_sync=debug,tether_store=info";

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Session name, one daemon per session.
    /// Env: `TETHER_SESSION`
    /// Default: `default`
    pub session: String,

    /// Root directory holding every session.
    /// Env: `TETHER_HOME`
    /// Default: the platform data directory, else `~/.tether`. `None` when
    /// neither is known and the variable is unset.
    pub home: Option<PathBuf>,

    /// How often the outbox is polled.
    /// Env: `TETHER_OUTBOX_INTERVAL_MS`
    pub outbox_interval: Duration,

    /// Pause between `sync.connected` and reading the identity mapping.
    /// Env: `TETHER_RECONCILE_DELAY_MS`
    pub reconcile_delay: Duration,

    /// Queue capacity of the sync engine's bus subscription.
    /// Env: `TETHER_BUS_CAPACITY`
    pub bus_capacity: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            session: "default".to_string(),
            home: default_home(),
            outbox_interval: Duration::from_millis(OUTBOX_POLL_INTERVAL_MS),
            reconcile_delay: Duration::from_millis(RECONCILE_SETTLE_DELAY_MS),
            bus_capacity: SYNC_QUEUE_CAPACITY,
        }
    }
}

impl DaemonConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(session) = lookup("TETHER_SESSION") {
            config.session = session;
        }

        if let Some(home) = lookup("TETHER_HOME") {
            if home.is_empty() {
                tracing::warn!("Empty TETHER_HOME, using default");
            } else {
                config.home = Some(PathBuf::from(home));
            }
        }

        if let Some(ms) = positive(&lookup, "TETHER_OUTBOX_INTERVAL_MS") {
            config.outbox_interval = Duration::from_millis(ms);
        }

        // Zero is a valid settle delay.
        if let Some(val) = lookup("TETHER_RECONCILE_DELAY_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.reconcile_delay = Duration::from_millis(ms),
                Err(_) => tracing::warn!(
                    value = %val,
                    "Invalid TETHER_RECONCILE_DELAY_MS, using default"
                ),
            }
        }

        if let Some(n) = positive(&lookup, "TETHER_BUS_CAPACITY") {
            config.bus_capacity = n as usize;
        }

        // RUST_LOG is read directly by tracing-subscriber's EnvFilter.

        config
    }

    /// The resolved home directory.
    pub fn home(&self) -> Result<&Path, DaemonError> {
        self.home.as_deref().ok_or(DaemonError::NoHomeDirectory)
    }
}

/// Parse a strictly positive integer setting, warning on anything else.
fn positive(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let val = lookup(key)?;
    match val.parse::<u64>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            tracing::warn!(key, value = %val, "Invalid value, using default");
            None
        }
    }
}

fn default_home() -> Option<PathBuf> {
    if let Some(dirs) = directories::ProjectDirs::from("", "", APP_NAME) {
        return Some(dirs.data_dir().to_path_buf());
    }
    directories::BaseDirs::new().map(|base| base.home_dir().join(format!(".{APP_NAME}")))
}
