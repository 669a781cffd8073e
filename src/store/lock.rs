//! Advisory locking around the ledger file.
//!
//! The lock lives on a sibling `<ledger>.lock` file rather than on the ledger
//! itself, because `update` replaces the ledger by rename and a lock held on
//! the old inode would no longer exclude anyone.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fd_lock::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{GovernanceError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Bounded-wait policy for acquiring the ledger lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockPolicy {
    /// How long a single attempt polls before timing out.
    pub timeout_ms: u64,
    /// Extra attempts after the first timeout.
    pub retries: u32,
    /// Pause before the first retry; doubles on each subsequent one.
    pub backoff_ms: u64,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 2000,
            retries: 2,
            backoff_ms: 100,
        }
    }
}

impl LockPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockMode {
    Shared,
    Exclusive,
}

/// Path of the lock file guarding `ledger`.
pub fn lock_path(ledger: &Path) -> PathBuf {
    let mut name = ledger
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    ledger.with_file_name(name)
}

fn open_lock_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

/// Run `f` while holding the ledger lock in `mode`.
///
/// Each attempt polls for up to `policy.timeout_ms`; after a timeout the
/// attempt is retried `policy.retries` times with doubling backoff before
/// [`GovernanceError::LockTimeout`] is returned.
pub(crate) fn with_lock<T, F>(ledger: &Path, mode: LockMode, policy: &LockPolicy, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let path = lock_path(ledger);
    let mut lock = RwLock::new(open_lock_file(&path)?);
    let mut backoff = Duration::from_millis(policy.backoff_ms);
    let started = Instant::now();

    for attempt in 0..=policy.retries {
        if attempt > 0 {
            tracing::warn!(
                lock = %path.display(),
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                "ledger lock busy, retrying"
            );
            thread::sleep(backoff);
            backoff = backoff.saturating_mul(2);
        }

        let deadline = Instant::now() + policy.timeout();
        loop {
            match mode {
                LockMode::Shared => match lock.try_read() {
                    Ok(_guard) => return f(),
                    Err(e) => would_block(e)?,
                },
                LockMode::Exclusive => match lock.try_write() {
                    Ok(_guard) => return f(),
                    Err(e) => would_block(e)?,
                },
            }
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    Err(GovernanceError::LockTimeout {
        path,
        waited: started.elapsed(),
    })
}

/// Contention is expected and polled; anything else is a real I/O failure.
fn would_block(e: io::Error) -> Result<()> {
    if e.kind() == io::ErrorKind::WouldBlock {
        Ok(())
    } else {
        Err(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn quick() -> LockPolicy {
        LockPolicy {
            timeout_ms: 50,
            retries: 1,
            backoff_ms: 10,
        }
    }

    #[test]
    fn test_lock_path_is_sibling() {
        let p = lock_path(Path::new("data/issues.jsonl"));
        assert_eq!(p, PathBuf::from("data/issues.jsonl.lock"));
    }

    #[test]
    fn test_runs_closure_when_free() {
        let temp = TempDir::new().unwrap();
        let ledger = temp.path().join("issues.jsonl");
        let value = with_lock(&ledger, LockMode::Exclusive, &quick(), || Ok(42)).unwrap();
        assert_eq!(value, 42);
        assert!(lock_path(&ledger).exists());
    }

    #[test]
    fn test_times_out_when_held_exclusively() {
        let temp = TempDir::new().unwrap();
        let ledger = temp.path().join("issues.jsonl");
        let mut holder = RwLock::new(open_lock_file(&lock_path(&ledger)).unwrap());
        let _held = holder.write().unwrap();

        let err = with_lock(&ledger, LockMode::Exclusive, &quick(), || Ok(())).unwrap_err();
        assert!(matches!(err, GovernanceError::LockTimeout { .. }));

        let err = with_lock(&ledger, LockMode::Shared, &quick(), || Ok(())).unwrap_err();
        assert!(matches!(err, GovernanceError::LockTimeout { .. }));
    }

    #[test]
    fn test_shared_locks_coexist() {
        let temp = TempDir::new().unwrap();
        let ledger = temp.path().join("issues.jsonl");
        let mut holder = RwLock::new(open_lock_file(&lock_path(&ledger)).unwrap());
        let _held = holder.read().unwrap();

        let value = with_lock(&ledger, LockMode::Shared, &quick(), || Ok("read")).unwrap();
        assert_eq!(value, "read");
    }

    #[test]
    fn test_closure_error_passes_through() {
        let temp = TempDir::new().unwrap();
        let ledger = temp.path().join("issues.jsonl");
        let err = with_lock::<(), _>(&ledger, LockMode::Exclusive, &quick(), || {
            Err(GovernanceError::Validation("nope".into()))
        })
        .unwrap_err();
        assert!(matches!(err, GovernanceError::Validation(_)));
    }
}
