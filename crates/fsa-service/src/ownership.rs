//! Spool ownership.
//!
//! Within one process at most one service may own a spool directory
//! ([`SpoolClaim`]). Across processes at most one may run the compactor over
//! it ([`CompactorLock`], an advisory `flock` on a file inside the spool).

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use fs2::FileExt;
use fsa_config::path::normalize_or_original;
use once_cell::sync::Lazy;

use crate::error::{Result, ServiceError};

static CLAIMED_SPOOLS: Lazy<Mutex<HashSet<PathBuf>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Lock file name; it has no `.asset` extension so the compactor ignores it.
pub const COMPACTOR_LOCK_FILE: &str = ".compactor.lock";

/// In-process claim on a spool directory, released on drop.
#[derive(Debug)]
pub(crate) struct SpoolClaim {
    path: PathBuf,
}

impl SpoolClaim {
    pub(crate) fn acquire(spool: &Path) -> Result<Self> {
        let path = normalize_or_original(spool);
        let mut claimed = CLAIMED_SPOOLS
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !claimed.insert(path.clone()) {
            return Err(ServiceError::SpoolInUse(path));
        }
        Ok(Self { path })
    }
}

impl Drop for SpoolClaim {
    fn drop(&mut self) {
        CLAIMED_SPOOLS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.path);
    }
}

/// Cross-process exclusive lock held while the compactor runs.
///
/// The lock is released when the file handle is dropped.
#[derive(Debug)]
pub(crate) struct CompactorLock {
    _file: File,
}

impl CompactorLock {
    pub(crate) fn acquire(spool: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(spool.join(COMPACTOR_LOCK_FILE))?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { _file: file }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Err(ServiceError::SpoolInUse(spool.to_path_buf()))
            }
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                Err(ServiceError::SpoolInUse(spool.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_claim_is_refused_until_release() {
        let temp = TempDir::new().unwrap();
        let first = SpoolClaim::acquire(temp.path()).unwrap();
        assert!(matches!(
            SpoolClaim::acquire(temp.path()),
            Err(ServiceError::SpoolInUse(_))
        ));
        drop(first);
        assert!(SpoolClaim::acquire(temp.path()).is_ok());
    }

    #[test]
    fn test_compactor_lock_is_exclusive() {
        let temp = TempDir::new().unwrap();
        let lock = CompactorLock::acquire(temp.path()).unwrap();
        assert!(matches!(
            CompactorLock::acquire(temp.path()),
            Err(ServiceError::SpoolInUse(_))
        ));
        drop(lock);
        assert!(CompactorLock::acquire(temp.path()).is_ok());
    }
}
