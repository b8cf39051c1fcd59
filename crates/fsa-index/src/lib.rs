//! # fsa-index
//!
//! Metadata index for FSAssets.
//!
//! The index maps asset IDs to their metadata and content hash. Many IDs
//! may share one hash; the index keeps a per-hash reference count so admin
//! tooling can tell which blobs are still referenced. Blobs themselves are
//! never touched here.
//!
//! ## Storage Backends
//!
//! - `MemoryIndex`: sharded in-memory map (tests, ephemeral stores)
//! - `LmdbIndex`: LMDB-backed with ACID transactions

pub mod import;
pub mod lmdb;
pub mod memory;
pub mod types;

pub use import::{ImportReport, ImportSource, JsonlSource, RowIter};
pub use lmdb::LmdbIndex;
pub use memory::MemoryIndex;
pub use types::{
    asset_type, default_content_type, type_name, unix_now, Asset, AssetFlags, AssetMetadata,
    IndexEntry,
};

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during index operations
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("LMDB error: {0}")]
    Heed(#[from] heed::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid import table name: {0:?}")]
    InvalidTable(String),

    #[error("Bad row {line} in table {table}: {reason}")]
    BadRow {
        table: String,
        line: usize,
        reason: String,
    },
}

pub type IndexResult<T> = std::result::Result<T, IndexError>;

/// Error type returned by an import store callback.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// The identity layer: asset ID → (metadata, content hash).
///
/// Implementations provide their own concurrency discipline and must give
/// a single caller read-your-writes.
pub trait MetadataIndex: Send + Sync {
    /// Look up an asset record.
    fn get(&self, id: &Uuid) -> IndexResult<Option<IndexEntry>>;

    /// Insert or replace the record for `metadata.id`.
    ///
    /// Returns `true` when a new record was created, `false` when an
    /// existing one was updated.
    fn put(&self, metadata: &AssetMetadata, hash: &str) -> IndexResult<bool>;

    /// Remove a record. Returns `true` if it existed.
    fn delete(&self, id: &Uuid) -> IndexResult<bool>;

    /// Batched existence check, one answer per input ID.
    fn exists(&self, ids: &[Uuid]) -> IndexResult<Vec<bool>> {
        ids.iter()
            .map(|id| self.get(id).map(|entry| entry.is_some()))
            .collect()
    }

    /// Number of records.
    fn count(&self) -> IndexResult<u64>;

    /// Number of records whose content hash is `hash`.
    fn references(&self, hash: &str) -> IndexResult<u64>;

    /// Record an access time. Returns `false` if the asset is unknown.
    fn touch(&self, id: &Uuid, access_time: i64) -> IndexResult<bool>;

    /// Bulk import of legacy rows.
    ///
    /// Reads up to `count` rows of `table` starting at `start_offset`.
    /// Rows whose ID already exists are skipped unless `overwrite` is set;
    /// every other row is handed to `store`, which is responsible for
    /// writing the blob and the index record.
    fn import(
        &self,
        source: &dyn ImportSource,
        table: &str,
        start_offset: usize,
        count: usize,
        overwrite: bool,
        store: &mut dyn FnMut(Asset) -> Result<(), CallbackError>,
    ) -> IndexResult<ImportReport> {
        import::run_import(self, source, table, start_offset, count, overwrite, store)
    }
}
