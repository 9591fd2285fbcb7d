//! Per-session directory layout and the single-instance lock.
//!
//! ```text
//! <home>/sessions/<name>/
//!     tether.db
//!     LOCK
//!     logs/
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use fs2::FileExt;

use crate::error::DaemonError;

/// Session names are used as directory names.
pub fn validate_session_name(name: &str) -> Result<(), DaemonError> {
    let valid = (1..=64).contains(&name.len())
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(DaemonError::InvalidSessionName(name.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct SessionPaths {
    dir: PathBuf,
}

impl SessionPaths {
    pub fn new(home: &Path, name: &str) -> Result<Self, DaemonError> {
        validate_session_name(name)?;
        Ok(Self {
            dir: home.join("sessions").join(name),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.join("tether.db")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join("LOCK")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.dir.join("logs")
    }

    /// Create the session tree, owner-only on Unix.
    pub fn ensure(&self) -> Result<(), DaemonError> {
        for dir in [self.dir.clone(), self.log_dir()] {
            fs::create_dir_all(&dir)?;
            restrict(&dir)?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn restrict(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn restrict(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Exclusive advisory lock on the session's `LOCK` file. The file records
/// the holder's PID and start time for diagnostics.
#[derive(Debug)]
pub struct SessionLock {
    file: File,
    path: PathBuf,
}

impl SessionLock {
    pub fn acquire(path: &Path) -> Result<Self, DaemonError> {
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() != fs2::lock_contended_error().kind() {
                return Err(e.into());
            }
            let mut content = String::new();
            file.read_to_string(&mut content)?;
            return Err(DaemonError::LockHeld {
                pid: parse_pid(&content).unwrap_or(0),
                path: path.to_path_buf(),
            });
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        write!(
            file,
            "pid={}\ntime={}\n",
            std::process::id(),
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        )?;
        file.flush()?;

        tracing::debug!(path = %path.display(), "session lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Remove the lock file and release the lock.
    pub fn release(self) -> Result<(), DaemonError> {
        fs::remove_file(&self.path)?;
        self.file.unlock()?;
        tracing::debug!(path = %self.path.display(), "session lock released");
        Ok(())
    }
}

fn parse_pid(content: &str) -> Option<u32> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("pid="))
        .and_then(|pid| pid.trim().parse().ok())
}
