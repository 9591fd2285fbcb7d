use std::path::PathBuf;

use thiserror::Error;

/// Startup failures. Anything here stops the daemon before it serves.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Invalid session name {0:?}: must match ^[a-z0-9_-]{{1,64}}$")]
    InvalidSessionName(String),

    #[error("Session lock held by PID {pid} ({})", path.display())]
    LockHeld { pid: u32, path: PathBuf },

    #[error("No home directory: set TETHER_HOME")]
    NoHomeDirectory,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
