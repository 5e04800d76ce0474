//! Persisted session file: `(user_id, token, issued_at)`.
//!
//! The file holds a bearer token but never key material. Writers replace
//! the whole file in one rename and serialize against each other with an
//! advisory lock, so a `login` racing a `logout` cannot shear the contents.
//! Readers take no lock: the atomic replace means a read sees one complete
//! version or the other, and a stale token just earns a 401 from the
//! server. Both the session file and its lock are created 0600.

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use thiserror::Error;

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// The persisted part of a session. The DEK is deliberately absent; it
/// lives only in process memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub user_id: i64,
    pub token: String,
    pub issued_at: u64,
}

#[derive(Debug, Error)]
pub enum SessionIoError {
    #[error("io error")]
    Io(#[from] std::io::Error),

    #[error("session file is corrupt")]
    Corrupt(#[from] serde_json::Error),

    #[error("session path has no parent directory")]
    NoParentDir,
}

pub fn save(session_path: &Path, session: &PersistedSession) -> Result<(), SessionIoError> {
    let dir = parent_dir(session_path)?;
    fs::create_dir_all(dir)?;
    let _lock = WriteLock::acquire(session_path)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    // Restrict the temp file before the token touches it, not after.
    restrict_permissions(tmp.path())?;
    tmp.write_all(&serde_json::to_vec(session)?)?;
    tmp.as_file().sync_all()?;
    tmp.persist(session_path)
        .map_err(|err| SessionIoError::Io(err.error))?;

    // Make the rename itself durable, not just the file contents.
    #[cfg(unix)]
    File::open(dir)?.sync_all()?;

    Ok(())
}

/// Returns `Ok(None)` when no session has been persisted.
pub fn load(session_path: &Path) -> Result<Option<PersistedSession>, SessionIoError> {
    match fs::read(session_path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(SessionIoError::Io(err)),
    }
}

pub fn clear(session_path: &Path) -> Result<(), SessionIoError> {
    if !session_path.exists() {
        return Ok(());
    }

    let _lock = WriteLock::acquire(session_path)?;
    match fs::remove_file(session_path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(SessionIoError::Io(err)),
    }
}

fn parent_dir(session_path: &Path) -> Result<&Path, SessionIoError> {
    session_path.parent().ok_or(SessionIoError::NoParentDir)
}

fn restrict_permissions(path: &Path) -> Result<(), SessionIoError> {
    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Exclusive advisory lock among session writers, held for the guard's
/// lifetime. The lock file sits next to the session file so both live on
/// the same filesystem as the rename. On non-unix platforms the atomic
/// rename is the only serialization, which suffices for a single-user CLI.
#[derive(Debug)]
struct WriteLock {
    #[allow(dead_code)]
    file: File,
}

impl WriteLock {
    fn acquire(session_path: &Path) -> Result<Self, SessionIoError> {
        let lock_path = session_path.with_extension("lock");

        #[cfg(unix)]
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .mode(0o600)
            .open(&lock_path)?;

        #[cfg(not(unix))]
        let file = OpenOptions::new().write(true).create(true).open(&lock_path)?;

        #[cfg(unix)]
        {
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if rc != 0 {
                return Err(SessionIoError::Io(std::io::Error::last_os_error()));
            }
        }

        Ok(Self { file })
    }
}
