//! The asset store façade.
//!
//! Write path: hash → spool → index. Read path: index → blob (spool first,
//! then committed) → fallback. A background compactor drains the spool into
//! the committed tier and a reporter logs read statistics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use fsa_cas::{compute_hash, BlobStats, BlobStore};
use fsa_config::{
    log_fallback_debug, log_fallback_warn, log_store_debug, log_store_error, log_store_info,
    log_store_warn, Config, LimitsConfig,
};
use fsa_index::{
    default_content_type, unix_now, Asset, AssetMetadata, CallbackError, ImportReport,
    ImportSource, IndexEntry, LmdbIndex, MetadataIndex,
};
use tracing::field::display;
use uuid::Uuid;

use crate::compactor::{Compactor, CycleReport};
use crate::error::{Result, ServiceError};
use crate::fallback::{FallbackResolver, FallbackService};
use crate::ownership::{CompactorLock, SpoolClaim};
use crate::stats::{self, ReadStats, StatsSnapshot};
use crate::worker::Worker;

/// Attempts at writing the spool copy before a store fails.
const SPOOL_ATTEMPTS: u32 = 3;
const SPOOL_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Handle to an asset store. Cheap to clone; all clones share one store.
///
/// Background workers are not running until [`AssetStoreService::start`].
/// They stop on [`AssetStoreService::shutdown`] or when the last handle is
/// dropped.
#[derive(Clone)]
pub struct AssetStoreService {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<BlobStore>,
    index: Arc<dyn MetadataIndex>,
    fallback: Option<FallbackResolver>,
    limits: LimitsConfig,
    compactor_interval: Duration,
    stats_interval: Duration,
    stats: Arc<ReadStats>,
    workers: Mutex<Option<Workers>>,
    /// Held for the duration of each compaction pass
    cycle: Arc<Mutex<()>>,
    pending_fills: AtomicUsize,
    _claim: SpoolClaim,
}

struct Workers {
    compactor: Worker,
    reporter: Worker,
    _lock: CompactorLock,
}

impl Workers {
    fn stop(self) {
        self.compactor.stop();
        self.reporter.stop();
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let workers = self
            .workers
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(workers) = workers {
            workers.stop();
        }
    }
}

/// Everything known about one stored asset, for admin tooling.
#[derive(Debug, Clone)]
pub struct AssetDigest {
    pub entry: IndexEntry,
    /// Records sharing this content hash
    pub references: u64,
    pub spooled: bool,
    pub committed: bool,
    /// Decoded size, if the blob is readable
    pub size: Option<usize>,
    /// Hex of the first bytes of content
    pub preview: String,
}

const PREVIEW_BYTES: usize = 32;

/// Builds an [`AssetStoreService`] from a [`Config`].
///
/// The index defaults to LMDB at `storage.index_path`; the fallback defaults
/// to the secondary store in `[fallback]`, if one is configured.
pub struct ServiceBuilder {
    config: Config,
    index: Option<Arc<dyn MetadataIndex>>,
    fallback: Option<Arc<dyn FallbackService>>,
}

impl ServiceBuilder {
    pub fn index(mut self, index: Arc<dyn MetadataIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn fallback(mut self, fallback: Arc<dyn FallbackService>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn build(self) -> Result<AssetStoreService> {
        let config = self.config;
        config.validate()?;

        let storage = &config.storage;
        let store = BlobStore::new(&storage.base_dir, storage.spool_dir(), storage.layout)?;
        let claim = SpoolClaim::acquire(store.spool_dir())?;

        let index: Arc<dyn MetadataIndex> = match self.index {
            Some(index) => index,
            None => Arc::new(LmdbIndex::open(storage.index_path())?),
        };

        let fallback = match self.fallback {
            Some(service) => Some(service),
            None => secondary_store(&config)?,
        };
        let fallback = fallback.map(|service| FallbackResolver::new(service, config.fallback.timeout()));

        log_store_info!(
            "Asset store opened",
            base = display(store.base().display()),
            spool = display(store.spool_dir().display()),
            layout = display(store.layout()),
            fallback = fallback.as_ref().map_or("none", |f| f.name()),
        );

        Ok(AssetStoreService {
            inner: Arc::new(Inner {
                store: Arc::new(store),
                index,
                fallback,
                limits: config.limits.clone(),
                compactor_interval: config.compactor.interval(),
                stats_interval: config.stats.interval(),
                stats: Arc::new(ReadStats::new()),
                workers: Mutex::new(None),
                cycle: Arc::new(Mutex::new(())),
                pending_fills: AtomicUsize::new(0),
                _claim: claim,
            }),
        })
    }
}

/// The `[fallback]` secondary store, opened as a service of its own.
fn secondary_store(config: &Config) -> Result<Option<Arc<dyn FallbackService>>> {
    let Some(storage) = config.fallback.storage() else {
        return Ok(None);
    };
    let mut secondary = Config::default();
    secondary.storage = storage;
    secondary.limits = config.limits.clone();
    let service = AssetStoreService::builder(secondary).build()?;
    Ok(Some(Arc::new(service)))
}

impl AssetStoreService {
    pub fn builder(config: Config) -> ServiceBuilder {
        ServiceBuilder {
            config,
            index: None,
            fallback: None,
        }
    }

    /// Open with the default LMDB index and configured fallback.
    pub fn open(config: &Config) -> Result<Self> {
        Self::builder(config.clone()).build()
    }

    pub fn blob_store(&self) -> &BlobStore {
        &self.inner.store
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------

    /// Store an asset and return its ID.
    ///
    /// A nil ID is replaced with a fresh one. Over-long names and
    /// descriptions are truncated. Storing an existing ID with the same
    /// content updates its metadata; different content is refused with
    /// [`ServiceError::ContentChanged`].
    ///
    /// On success the asset is immediately readable, even though it may not
    /// reach the committed tier until the next compaction.
    pub fn store(&self, asset: Asset) -> Result<Uuid> {
        self.store_inner(asset, false)
    }

    fn store_inner(&self, mut asset: Asset, replace_content: bool) -> Result<Uuid> {
        let limits = &self.inner.limits;
        let meta = &mut asset.metadata;
        if meta.id.is_nil() {
            meta.id = Uuid::new_v4();
        }
        let id = meta.id;

        truncate_field(&id, "name", &mut meta.name, limits.max_name_len);
        truncate_field(&id, "description", &mut meta.description, limits.max_description_len);
        if meta.content_type.is_empty() {
            meta.content_type = default_content_type(meta.asset_type).to_string();
        }

        let now = unix_now();
        if meta.created == 0 {
            meta.created = now;
        }
        if meta.access_time == 0 {
            meta.access_time = now;
        }

        let hash = compute_hash(&asset.data);
        if let Some(existing) = self.inner.index.get(&id)? {
            if existing.hash != hash && !replace_content {
                return Err(ServiceError::ContentChanged { id });
            }
            if existing.metadata.created != 0 {
                meta.created = existing.metadata.created;
            }
        }

        self.spool_with_retry(&hash, &asset.data)?;
        let created = self.inner.index.put(&asset.metadata, &hash)?;

        log_store_debug!(
            "Stored asset",
            id = display(&id),
            hash = hash.as_str(),
            bytes = asset.data.len(),
            created = created,
        );
        Ok(id)
    }

    fn spool_with_retry(&self, hash: &str, data: &[u8]) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.inner.store.spool(hash, data) {
                Ok(_) => return Ok(()),
                Err(e) if attempt < SPOOL_ATTEMPTS => {
                    log_store_warn!(
                        "Spool write failed; retrying",
                        hash = hash,
                        attempt = attempt,
                        error = display(&e),
                    );
                    thread::sleep(SPOOL_RETRY_DELAY * attempt);
                    attempt += 1;
                }
                Err(e) => {
                    log_store_error!(
                        "Spool write failed; giving up",
                        hash = hash,
                        attempts = attempt,
                        error = display(&e),
                    );
                    return Err(e.into());
                }
            }
        }
    }

    /// Remove an asset's index record. Returns `false` if it did not exist.
    ///
    /// The blob stays; other records may share it.
    pub fn delete(&self, id: &str) -> bool {
        let Some(id) = parse_id(id) else {
            return false;
        };
        match self.inner.index.delete(&id) {
            Ok(deleted) => {
                if deleted {
                    log_store_info!("Deleted asset", id = display(&id));
                }
                deleted
            }
            Err(e) => {
                log_store_error!("Index delete failed", id = display(&id), error = display(&e));
                false
            }
        }
    }

    /// Bulk-import legacy rows through the normal store path.
    ///
    /// With `overwrite`, existing IDs are re-stored even when their content
    /// changed.
    pub fn import(
        &self,
        source: &dyn ImportSource,
        table: &str,
        start_offset: usize,
        count: usize,
        overwrite: bool,
    ) -> Result<ImportReport> {
        let report = self.inner.index.import(
            source,
            table,
            start_offset,
            count,
            overwrite,
            &mut |asset| {
                self.store_inner(asset, overwrite)
                    .map(|_| ())
                    .map_err(|e| Box::new(e) as CallbackError)
            },
        )?;
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------

    /// Fetch an asset. `None` for unknown or malformed IDs and for read
    /// failures, which are logged.
    ///
    /// A local miss consults the fallback; a fallback hit is returned at
    /// once and written back into this store in the background.
    pub fn get(&self, id: &str) -> Option<Asset> {
        let started = Instant::now();
        let result = parse_id(id).and_then(|id| self.resolve(&id));
        self.inner.stats.record_read(started.elapsed());
        result
    }

    pub fn get_data(&self, id: &str) -> Option<Vec<u8>> {
        self.get(id).map(|asset| asset.data)
    }

    /// Metadata only. Reads no blob locally; a local miss still goes to the
    /// fallback.
    pub fn get_metadata(&self, id: &str) -> Option<AssetMetadata> {
        let id = parse_id(id)?;
        if let Some(entry) = self.lookup(&id) {
            return Some(entry.metadata);
        }
        self.fetch_fallback(&id).map(|asset| asset.metadata)
    }

    /// Fetch on the shared thread pool; `callback` runs exactly once with
    /// the same result [`AssetStoreService::get`] would give.
    pub fn get_async<F>(&self, id: &str, callback: F)
    where
        F: FnOnce(Option<Asset>) + Send + 'static,
    {
        let service = self.clone();
        let id = id.to_string();
        rayon::spawn(move || callback(service.get(&id)));
    }

    /// Batched existence check against the index, one answer per input.
    /// Malformed IDs answer `false`.
    pub fn exists(&self, ids: &[&str]) -> Vec<bool> {
        let parsed: Vec<Option<Uuid>> = ids.iter().map(|id| parse_id(id)).collect();
        let valid: Vec<Uuid> = parsed.iter().flatten().copied().collect();

        let found = match self.inner.index.exists(&valid) {
            Ok(found) => found,
            Err(e) => {
                log_store_error!("Index existence check failed", error = display(&e));
                return vec![false; ids.len()];
            }
        };

        let mut found = found.into_iter();
        parsed
            .iter()
            .map(|id| id.is_some() && found.next().unwrap_or(false))
            .collect()
    }

    pub fn count(&self) -> Result<u64> {
        Ok(self.inner.index.count()?)
    }

    /// Index record, reference count and blob state of one asset.
    pub fn digest(&self, id: &str) -> Result<Option<AssetDigest>> {
        let Some(id) = parse_id(id) else {
            return Ok(None);
        };
        let Some(entry) = self.inner.index.get(&id)? else {
            return Ok(None);
        };

        let store = &self.inner.store;
        let references = self.inner.index.references(&entry.hash)?;
        let data = store.read(&entry.hash).ok();
        Ok(Some(AssetDigest {
            references,
            spooled: store.is_spooled(&entry.hash),
            committed: store.is_committed(&entry.hash),
            size: data.as_ref().map(Vec::len),
            preview: data
                .as_deref()
                .map(|d| hex::encode(&d[..d.len().min(PREVIEW_BYTES)]))
                .unwrap_or_default(),
            entry,
        }))
    }

    fn resolve(&self, id: &Uuid) -> Option<Asset> {
        let stats = &self.inner.stats;
        if let Some(asset) = self.get_local(id) {
            stats.record_hit();
            return Some(asset);
        }
        stats.record_local_miss();

        match self.fetch_fallback(id) {
            Some(asset) => {
                stats.record_fallback_hit();
                self.cache_fill(asset.clone());
                Some(asset)
            }
            None => {
                stats.record_fallback_miss();
                None
            }
        }
    }

    fn get_local(&self, id: &Uuid) -> Option<Asset> {
        let entry = self.lookup(id)?;
        match self.inner.store.read(&entry.hash) {
            Ok(data) => {
                self.refresh_access_time(&entry);
                Some(Asset {
                    metadata: entry.metadata,
                    data,
                })
            }
            Err(e) if e.is_not_found() => {
                log_store_warn!(
                    "Indexed asset has no blob",
                    id = display(id),
                    hash = entry.hash.as_str(),
                );
                None
            }
            Err(e) => {
                log_store_error!(
                    "Blob read failed",
                    id = display(id),
                    hash = entry.hash.as_str(),
                    error = display(&e),
                );
                None
            }
        }
    }

    fn lookup(&self, id: &Uuid) -> Option<IndexEntry> {
        match self.inner.index.get(id) {
            Ok(entry) => entry,
            Err(e) => {
                log_store_error!("Index lookup failed", id = display(id), error = display(&e));
                None
            }
        }
    }

    fn refresh_access_time(&self, entry: &IndexEntry) {
        let window = i64::try_from(self.inner.limits.access_time_window_secs).unwrap_or(i64::MAX);
        let now = unix_now();
        if now.saturating_sub(entry.metadata.access_time) <= window {
            return;
        }
        if let Err(e) = self.inner.index.touch(&entry.metadata.id, now) {
            log_store_debug!(
                "Access time update failed",
                id = display(&entry.metadata.id),
                error = display(&e),
            );
        }
    }

    fn fetch_fallback(&self, id: &Uuid) -> Option<Asset> {
        let resolver = self.inner.fallback.as_ref()?;
        let asset = resolver.fetch(id);
        if asset.is_some() {
            log_fallback_debug!("Fallback hit", id = display(id), service = resolver.name());
        }
        asset
    }

    fn cache_fill(&self, asset: Asset) {
        let service = self.clone();
        self.inner.pending_fills.fetch_add(1, Ordering::SeqCst);
        rayon::spawn(move || {
            let id = asset.id();
            match service.store_inner(asset, true) {
                Ok(_) => log_fallback_debug!("Cached fallback asset", id = display(&id)),
                Err(e) => log_fallback_warn!(
                    "Failed to cache fallback asset",
                    id = display(&id),
                    error = display(&e),
                ),
            }
            service.inner.pending_fills.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Background cache-fills not yet finished.
    pub fn pending_cache_fills(&self) -> usize {
        self.inner.pending_fills.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Background work
    // ------------------------------------------------------------------

    /// Start the compactor and stats reporter.
    ///
    /// Fails with [`ServiceError::SpoolInUse`] if another process runs a
    /// compactor over the same spool.
    pub fn start(&self) -> Result<()> {
        let mut workers = self
            .inner
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if workers.is_some() {
            return Err(ServiceError::AlreadyRunning);
        }

        let lock = CompactorLock::acquire(self.inner.store.spool_dir())?;

        let compactor = Compactor::new(Arc::clone(&self.inner.store));
        let cycle = Arc::clone(&self.inner.cycle);
        let compactor = Worker::spawn("compactor", self.inner.compactor_interval, move || {
            let _cycle = cycle.lock().unwrap_or_else(PoisonError::into_inner);
            compactor.run_cycle();
        })?;

        let read_stats = Arc::clone(&self.inner.stats);
        let reporter = Worker::spawn("stats", self.inner.stats_interval, move || {
            stats::report_window(&read_stats);
        })?;

        *workers = Some(Workers {
            compactor,
            reporter,
            _lock: lock,
        });
        log_store_info!(
            "Background workers started",
            compactor_ms = self.inner.compactor_interval.as_millis() as u64,
            stats_secs = self.inner.stats_interval.as_secs(),
        );
        Ok(())
    }

    /// Stop background workers, waiting for an in-flight cycle to finish.
    /// Blobs still spooled stay readable and are picked up on next start.
    pub fn shutdown(&self) {
        let workers = self
            .inner
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(workers) = workers {
            workers.stop();
            log_store_info!("Background workers stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Run one compaction pass on the calling thread.
    ///
    /// Passes never overlap with this service's background compactor. When
    /// that is not running the cross-process compactor lock is held for the
    /// pass, so this fails with [`ServiceError::SpoolInUse`] while another
    /// process compacts the same spool.
    pub fn compact_now(&self) -> Result<CycleReport> {
        let _lock = {
            let workers = self
                .inner
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if workers.is_some() {
                None
            } else {
                Some(CompactorLock::acquire(self.inner.store.spool_dir())?)
            }
        };
        let _cycle = self.inner.cycle.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(Compactor::new(Arc::clone(&self.inner.store)).run_cycle())
    }

    /// Read counters since the last reporting window.
    pub fn read_stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn blob_stats(&self) -> Result<BlobStats> {
        Ok(self.inner.store.stats()?)
    }

    /// Blobs waiting for the compactor. Cheaper than [`Self::blob_stats`];
    /// the committed tree is not walked.
    pub fn spool_backlog(&self) -> Result<usize> {
        Ok(self.inner.store.spooled_hashes()?.len())
    }
}

/// A store can serve as another store's fallback.
impl FallbackService for AssetStoreService {
    fn get(&self, id: &Uuid) -> Option<Asset> {
        self.resolve(id)
    }

    fn name(&self) -> &str {
        "secondary-store"
    }
}

fn parse_id(id: &str) -> Option<Uuid> {
    match Uuid::parse_str(id.trim()) {
        Ok(id) => Some(id),
        Err(_) => {
            log_store_debug!("Malformed asset ID", id = id);
            None
        }
    }
}

/// Truncate to at most `max` characters, logging when it happens.
fn truncate_field(id: &Uuid, field: &'static str, value: &mut String, max: usize) {
    if let Some((cut, _)) = value.char_indices().nth(max) {
        log_store_warn!(
            "Truncating over-long field",
            id = display(id),
            field = field,
            length = value.chars().count(),
            max = max,
        );
        value.truncate(cut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_field_by_chars() {
        let id = Uuid::nil();
        let mut value = "é".repeat(70);
        truncate_field(&id, "name", &mut value, 64);
        assert_eq!(value.chars().count(), 64);

        let mut short = "short".to_string();
        truncate_field(&id, "name", &mut short, 64);
        assert_eq!(short, "short");

        let mut exact = "x".repeat(64);
        truncate_field(&id, "name", &mut exact, 64);
        assert_eq!(exact.len(), 64);
    }

    #[test]
    fn test_parse_id() {
        assert!(parse_id("not-a-uuid").is_none());
        assert!(parse_id("").is_none());
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string()), Some(id));
    }
}
