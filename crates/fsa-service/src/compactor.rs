//! Write-behind compactor: moves spooled blobs into the committed tier.
//!
//! Each cycle lists the spool, then for every blob:
//! 1. read and verify the spool copy
//! 2. write the committed copy (skipped if it is already there)
//! 3. delete the spool copy
//!
//! The spool copy is only removed after the committed write succeeded, so a
//! blob is readable from one tier or the other at every instant. Failures are
//! per file; the spool copy stays put and is retried next cycle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use fsa_cas::{BlobStore, CasError};
use fsa_config::{log_compactor_debug, log_compactor_error, log_compactor_info};
use tracing::field::display;

/// Outcome of one compaction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Spool files found at the start of the cycle
    pub scanned: usize,
    /// Blobs newly written to the committed tier
    pub moved: usize,
    /// Blobs already committed; only the spool copy was dropped
    pub deduplicated: usize,
    /// Blobs left in the spool for the next cycle
    pub failed: usize,
    pub elapsed: Duration,
}

enum Migration {
    Moved,
    Deduplicated,
    /// Another pass got there first.
    Vanished,
}

pub struct Compactor {
    store: Arc<BlobStore>,
}

impl Compactor {
    pub fn new(store: Arc<BlobStore>) -> Self {
        Self { store }
    }

    /// Drain everything currently in the spool.
    pub fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::default();

        let hashes = match self.store.spooled_hashes() {
            Ok(hashes) => hashes,
            Err(e) => {
                log_compactor_error!(
                    "Failed to list spool",
                    spool = display(self.store.spool_dir().display()),
                    error = display(&e),
                );
                report.elapsed = started.elapsed();
                return report;
            }
        };
        report.scanned = hashes.len();

        for hash in &hashes {
            match self.migrate(hash) {
                Ok(Migration::Moved) => report.moved += 1,
                Ok(Migration::Deduplicated) => report.deduplicated += 1,
                Ok(Migration::Vanished) => {}
                Err(e) => {
                    report.failed += 1;
                    log_compactor_error!("Failed to commit blob", hash = hash.as_str(), error = display(&e));
                }
            }
        }

        report.elapsed = started.elapsed();
        if report.scanned > 0 {
            let secs = report.elapsed.as_secs_f64().max(f64::EPSILON);
            log_compactor_info!(
                "Compaction cycle complete",
                moved = report.moved,
                deduplicated = report.deduplicated,
                failed = report.failed,
                elapsed_ms = report.elapsed.as_millis() as u64,
                blobs_per_sec = (report.scanned as f64 / secs) as u64,
            );
        } else {
            log_compactor_debug!("Spool empty");
        }
        report
    }

    fn migrate(&self, hash: &str) -> Result<Migration, CasError> {
        let data = match self.store.read_spooled(hash) {
            Ok(data) => data,
            Err(CasError::NotFound { .. }) => return Ok(Migration::Vanished),
            Err(e @ CasError::HashMismatch { .. }) => {
                // Retrying can never succeed; get it out of the loop.
                match self.store.quarantine_spooled(hash) {
                    Ok(path) => log_compactor_error!(
                        "Quarantined corrupt spool file",
                        path = display(path.display()),
                    ),
                    Err(qe) => log_compactor_error!(
                        "Failed to quarantine corrupt spool file",
                        hash = hash,
                        error = display(&qe),
                    ),
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let written = self.store.write(hash, &data)?;
        self.store.remove_spooled(hash)?;
        Ok(if written {
            Migration::Moved
        } else {
            Migration::Deduplicated
        })
    }
}
