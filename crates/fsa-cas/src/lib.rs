//! # fsa-cas
//!
//! Content-addressed blob storage for FSAssets.
//!
//! Blobs are keyed by the lowercase hex SHA-256 of their bytes. New content
//! lands in an uncompressed spool directory first and is later migrated into
//! a sharded, gzip-compressed tree by the write-behind compactor.
//!
//! ## Directory Layout
//!
//! ```text
//! <spool>/
//! └── 2cf24dba...9824.asset          # raw bytes, pending compaction
//!
//! <base>/                            # four-level layout
//! └── 2c/
//!     └── f2/
//!         └── 4d/
//!             └── ba/
//!                 └── 2cf24dba...9824.gz
//! ```
//!
//! The two-level layout uses three characters per level instead
//! (`2cf/24d/<hash>.gz`). The layout is chosen once per deployment.

mod repair;
mod shard;
mod store;

pub use shard::ShardLayout;
pub use store::{BlobStats, BlobStore};

use std::io;
use std::path::PathBuf;

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Length of a hex-encoded SHA-256 digest.
pub const HASH_HEX_LEN: usize = 64;

/// Extension of spooled (uncompressed) blobs.
pub const SPOOL_EXT: &str = "asset";

/// Extension of committed (gzip) blobs.
pub const COMMITTED_EXT: &str = "gz";

/// Errors that can occur during CAS operations
#[derive(Error, Debug)]
pub enum CasError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Blob not found: {hash}")]
    NotFound { hash: String },

    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Invalid content hash: {0:?}")]
    InvalidHash(String),

    #[error("Unresolved directory collision at {path}: {source}")]
    Collision {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

impl CasError {
    /// True for the expected "no such blob" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CasError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, CasError>;

/// Compute the content hash (lowercase hex SHA-256) of the given bytes.
#[inline]
pub fn compute_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Check that `s` looks like a digest produced by [`compute_hash`].
///
/// Every path-building operation validates its input with this, so a
/// malformed hash can never escape the store root.
pub fn is_valid_hash(s: &str) -> bool {
    s.len() == HASH_HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
