//! Two-tier blob store: spool staging plus the sharded gzip tree.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, error, instrument, warn};
use walkdir::WalkDir;

use crate::repair::clear_blocking_file;
use crate::{
    compute_hash, is_valid_hash, CasError, Result, ShardLayout, COMMITTED_EXT, SPOOL_EXT,
};

/// Content-addressed blob store.
///
/// A blob is *spooled* (raw bytes under the spool directory), *committed*
/// (gzip under the sharded base directory) or, during compaction, both.
/// Reads prefer the spool copy. Every file becomes visible through an
/// atomic rename, so readers never observe a partial blob.
#[derive(Debug, Clone)]
pub struct BlobStore {
    base: PathBuf,
    spool: PathBuf,
    layout: ShardLayout,
}

impl BlobStore {
    /// Open a store, creating the base and spool directories if needed.
    pub fn new<P: AsRef<Path>, S: AsRef<Path>>(
        base: P,
        spool: S,
        layout: ShardLayout,
    ) -> Result<Self> {
        let base = base.as_ref().to_path_buf();
        let spool = spool.as_ref().to_path_buf();
        fs::create_dir_all(&base)?;
        fs::create_dir_all(&spool)?;
        Ok(Self {
            base,
            spool,
            layout,
        })
    }

    /// Root of the committed tree.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Spool (staging) directory.
    pub fn spool_dir(&self) -> &Path {
        &self.spool
    }

    pub fn layout(&self) -> ShardLayout {
        self.layout
    }

    /// Path of the committed (gzip) file for `hash`.
    pub fn committed_path(&self, hash: &str) -> PathBuf {
        self.base
            .join(self.layout.shard_path(hash))
            .join(format!("{hash}.{COMMITTED_EXT}"))
    }

    /// Path of the spool file for `hash`.
    pub fn spool_path(&self, hash: &str) -> PathBuf {
        self.spool.join(format!("{hash}.{SPOOL_EXT}"))
    }

    /// True if the blob is present in either tier.
    pub fn exists(&self, hash: &str) -> bool {
        self.is_spooled(hash) || self.is_committed(hash)
    }

    pub fn is_spooled(&self, hash: &str) -> bool {
        is_valid_hash(hash) && self.spool_path(hash).is_file()
    }

    pub fn is_committed(&self, hash: &str) -> bool {
        is_valid_hash(hash) && self.committed_path(hash).is_file()
    }

    /// Stage raw bytes in the spool.
    ///
    /// No-op if the blob is already committed or a spool copy with matching
    /// content exists. A spool copy that fails verification is replaced.
    /// Returns `true` when a new spool file was written.
    #[instrument(skip(self, data), level = "debug")]
    pub fn spool(&self, hash: &str, data: &[u8]) -> Result<bool> {
        check_hash(hash)?;
        if self.is_committed(hash) {
            return Ok(false);
        }
        match self.read_spooled(hash) {
            Ok(_) => return Ok(false),
            Err(CasError::NotFound { .. }) => {}
            Err(e) => warn!(hash, error = %e, "Replacing unreadable spool file"),
        }

        let path = self.spool_path(hash);
        let temp_path = temp_path_for(&path);
        if let Err(e) = write_synced(&temp_path, |w| w.write_all(data)) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        publish(&temp_path, &path)
    }

    /// Write a blob into the committed tier.
    ///
    /// Idempotent: if the committed file already exists this is a no-op and
    /// returns `false`; a committed blob is never rewritten. The shard
    /// directory is created (repairing a blocking legacy file if needed),
    /// the data is compressed into a temp file in that directory and then
    /// renamed into place.
    #[instrument(skip(self, data), level = "debug")]
    pub fn write(&self, hash: &str, data: &[u8]) -> Result<bool> {
        check_hash(hash)?;
        let path = self.committed_path(hash);
        if path.exists() {
            return Ok(false);
        }

        if let Some(dir) = path.parent() {
            self.ensure_shard_dir(dir)?;
        }

        let temp_path = temp_path_for(&path);
        let written = write_synced(&temp_path, |w| {
            let mut encoder = GzEncoder::new(w, Compression::default());
            encoder.write_all(data)?;
            encoder.finish()?;
            Ok(())
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        publish(&temp_path, &path)
    }

    /// Read a blob, preferring the spool copy.
    ///
    /// The content is re-hashed and compared against `hash`. A spool copy
    /// that cannot be read or fails the check falls through to the
    /// committed copy; the spool error is returned only if that is missing.
    #[instrument(skip(self), level = "debug")]
    pub fn read(&self, hash: &str) -> Result<Vec<u8>> {
        let spool_err = match self.read_spooled(hash) {
            Ok(data) => return Ok(data),
            Err(e @ CasError::InvalidHash(_)) => return Err(e),
            Err(CasError::NotFound { .. }) => None,
            Err(e) => {
                warn!(hash, error = %e, "Spool copy unusable, trying committed copy");
                Some(e)
            }
        };

        let data = match (self.read_committed(hash), spool_err) {
            (Ok(data), _) => data,
            (Err(CasError::NotFound { .. }), Some(e)) => return Err(e),
            (Err(e), _) => return Err(e),
        };

        let actual = compute_hash(&data);
        if actual != hash {
            return Err(CasError::HashMismatch {
                expected: hash.to_string(),
                actual,
            });
        }
        Ok(data)
    }

    fn read_committed(&self, hash: &str) -> Result<Vec<u8>> {
        let file = match File::open(self.committed_path(hash)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CasError::NotFound {
                    hash: hash.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let mut data = Vec::new();
        GzDecoder::new(BufReader::new(file)).read_to_end(&mut data)?;
        Ok(data)
    }

    /// Best-effort removal from both tiers. Returns `true` if anything was
    /// removed.
    pub fn delete(&self, hash: &str) -> Result<bool> {
        check_hash(hash)?;
        let mut removed = false;
        for path in [self.spool_path(hash), self.committed_path(hash)] {
            match fs::remove_file(&path) {
                Ok(()) => removed = true,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }

    /// Remove the spool copy once the committed copy exists.
    pub fn remove_spooled(&self, hash: &str) -> Result<()> {
        check_hash(hash)?;
        match fs::remove_file(self.spool_path(hash)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Read the spool copy only, verifying its content hash.
    pub fn read_spooled(&self, hash: &str) -> Result<Vec<u8>> {
        check_hash(hash)?;
        let data = match fs::read(self.spool_path(hash)) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CasError::NotFound {
                    hash: hash.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let actual = compute_hash(&data);
        if actual != hash {
            return Err(CasError::HashMismatch {
                expected: hash.to_string(),
                actual,
            });
        }
        Ok(data)
    }

    /// Move a spool file whose content does not match its name out of the
    /// compactor's way (`<hash>.asset.corrupt`). Returns the new path.
    pub fn quarantine_spooled(&self, hash: &str) -> Result<PathBuf> {
        check_hash(hash)?;
        let path = self.spool_path(hash);
        let target = path.with_extension(format!("{SPOOL_EXT}.corrupt"));
        fs::rename(&path, &target)?;
        Ok(target)
    }

    /// Hashes currently waiting in the spool.
    ///
    /// In-flight temp files and names that are not `<hash>.asset` are
    /// skipped.
    pub fn spooled_hashes(&self) -> Result<Vec<String>> {
        let mut hashes = Vec::new();
        for entry in fs::read_dir(&self.spool)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            match name.strip_suffix(SPOOL_EXT).and_then(|s| s.strip_suffix('.')) {
                Some(stem) if is_valid_hash(stem) => hashes.push(stem.to_string()),
                _ => debug!(file = name, "Skipping non-spool file"),
            }
        }
        Ok(hashes)
    }

    /// Enumerate committed hashes.
    pub fn iter_committed(&self) -> impl Iterator<Item = Result<String>> + '_ {
        self.walk_committed().filter_map(|entry| match entry {
            Ok(entry) => committed_hash(entry.path()).map(Ok),
            Err(e) => Some(Err(CasError::Walk(e))),
        })
    }

    /// Get statistics about both tiers.
    pub fn stats(&self) -> Result<BlobStats> {
        let mut stats = BlobStats::default();

        for entry in self.walk_committed() {
            let entry = entry?;
            if committed_hash(entry.path()).is_some() {
                stats.committed_blobs += 1;
                stats.committed_bytes += entry.metadata()?.len();
            }
        }

        for hash in self.spooled_hashes()? {
            stats.spooled_blobs += 1;
            stats.spooled_bytes += fs::metadata(self.spool_path(&hash))
                .map(|m| m.len())
                .unwrap_or(0);
        }

        Ok(stats)
    }

    fn walk_committed(&self) -> impl Iterator<Item = walkdir::Result<walkdir::DirEntry>> + '_ {
        let spool = self.spool.clone();
        WalkDir::new(&self.base)
            .min_depth(1)
            .max_depth(self.layout.levels() + 1)
            .into_iter()
            .filter_entry(move |e| e.path() != spool)
            .filter(|e| e.as_ref().map_or(true, |e| e.file_type().is_file()))
    }

    fn ensure_shard_dir(&self, dir: &Path) -> Result<()> {
        let first = match fs::create_dir_all(dir) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        if clear_blocking_file(&self.base, dir) {
            if let Err(e) = fs::create_dir_all(dir) {
                error!(path = %dir.display(), error = %e, "Shard directory still blocked after repair");
                return Err(CasError::Collision {
                    path: dir.to_path_buf(),
                    source: e,
                });
            }
            return Ok(());
        }

        error!(path = %dir.display(), error = %first, "Could not create shard directory");
        Err(CasError::Collision {
            path: dir.to_path_buf(),
            source: first,
        })
    }
}

/// Statistics about a blob store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobStats {
    /// Blobs in the compressed tree
    pub committed_blobs: u64,
    /// Compressed bytes on disk
    pub committed_bytes: u64,
    /// Blobs waiting in the spool
    pub spooled_blobs: u64,
    /// Raw bytes waiting in the spool
    pub spooled_bytes: u64,
}

fn check_hash(hash: &str) -> Result<()> {
    if is_valid_hash(hash) {
        Ok(())
    } else {
        Err(CasError::InvalidHash(hash.to_string()))
    }
}

fn committed_hash(path: &Path) -> Option<String> {
    if path.extension().is_some_and(|ext| ext == COMMITTED_EXT) {
        let stem = path.file_stem()?.to_str()?;
        if is_valid_hash(stem) {
            return Some(stem.to_string());
        }
    }
    None
}

/// Unique sibling temp name so concurrent writers never share a file.
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(
        "{}.{}.{:?}.tmp",
        name,
        std::process::id(),
        std::thread::current().id()
    ))
}

fn write_synced<F>(path: &Path, fill: F) -> io::Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let mut writer = BufWriter::new(File::create(path)?);
    fill(&mut writer)?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}

/// Rename a finished temp file into place. Losing a race against another
/// writer of the same content counts as success.
fn publish(temp_path: &Path, path: &Path) -> Result<bool> {
    if let Err(e) = fs::rename(temp_path, path) {
        let _ = fs::remove_file(temp_path);
        if path.exists() {
            return Ok(false);
        }
        return Err(CasError::Io(e));
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(temp: &TempDir, layout: ShardLayout) -> BlobStore {
        BlobStore::new(temp.path().join("base"), temp.path().join("spool"), layout).unwrap()
    }

    #[test]
    fn test_spool_and_read() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp, ShardLayout::FourLevel);

        let data = b"Hello, spool!";
        let hash = compute_hash(data);
        assert!(store.spool(&hash, data).unwrap());

        assert!(store.is_spooled(&hash));
        assert!(!store.is_committed(&hash));
        assert_eq!(store.read(&hash).unwrap(), data);
    }

    #[test]
    fn test_write_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp, ShardLayout::FourLevel);

        let data = b"Duplicate content";
        let hash = compute_hash(data);
        assert!(store.write(&hash, data).unwrap());
        assert!(!store.write(&hash, data).unwrap());

        let stats = store.stats().unwrap();
        assert_eq!(stats.committed_blobs, 1);
    }

    #[test]
    fn test_committed_file_is_gzip() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp, ShardLayout::TwoLevel);

        let data = b"compress me compress me compress me";
        let hash = compute_hash(data);
        store.write(&hash, data).unwrap();

        let raw = fs::read(store.committed_path(&hash)).unwrap();
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);

        let mut decoded = Vec::new();
        GzDecoder::new(&raw[..]).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_committed_path_follows_layout() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp, ShardLayout::TwoLevel);
        let hash = compute_hash(b"layout");

        let expected = temp
            .path()
            .join("base")
            .join(&hash[..3])
            .join(&hash[3..6])
            .join(format!("{hash}.gz"));
        assert_eq!(store.committed_path(&hash), expected);
    }

    #[test]
    fn test_read_prefers_spool_then_committed() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp, ShardLayout::FourLevel);

        let data = b"both tiers";
        let hash = compute_hash(data);
        store.spool(&hash, data).unwrap();
        store.write(&hash, data).unwrap();
        assert_eq!(store.read(&hash).unwrap(), data);

        store.remove_spooled(&hash).unwrap();
        assert!(!store.is_spooled(&hash));
        assert_eq!(store.read(&hash).unwrap(), data);
    }

    #[test]
    fn test_spool_skips_committed_blob() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp, ShardLayout::FourLevel);

        let data = b"already committed";
        let hash = compute_hash(data);
        store.write(&hash, data).unwrap();
        assert!(!store.spool(&hash, data).unwrap());
        assert!(!store.is_spooled(&hash));
    }

    #[test]
    fn test_not_found() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp, ShardLayout::FourLevel);

        let result = store.read(&"0".repeat(64));
        assert!(matches!(result, Err(CasError::NotFound { .. })));
    }

    #[test]
    fn test_invalid_hash_rejected() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp, ShardLayout::FourLevel);

        assert!(matches!(store.read("../etc/passwd"), Err(CasError::InvalidHash(_))));
        assert!(matches!(store.write("xyz", b""), Err(CasError::InvalidHash(_))));
        assert!(!store.exists("not-a-hash"));
    }

    #[test]
    fn test_corrupt_spool_detected() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp, ShardLayout::FourLevel);

        let hash = compute_hash(b"original");
        fs::write(store.spool_path(&hash), b"tampered").unwrap();
        assert!(matches!(store.read(&hash), Err(CasError::HashMismatch { .. })));
    }

    #[test]
    fn test_corrupt_spool_falls_back_to_committed() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp, ShardLayout::FourLevel);

        let data = b"good committed copy";
        let hash = compute_hash(data);
        store.write(&hash, data).unwrap();
        fs::write(store.spool_path(&hash), b"torn").unwrap();

        assert!(store.is_committed(&hash));
        assert_eq!(store.read(&hash).unwrap(), data);
    }

    #[test]
    fn test_spool_replaces_corrupt_spool_file() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp, ShardLayout::FourLevel);

        let data = b"caller bytes";
        let hash = compute_hash(data);
        fs::write(store.spool_path(&hash), b"torn").unwrap();

        assert!(store.spool(&hash, data).unwrap());
        assert_eq!(store.read_spooled(&hash).unwrap(), data);
        assert!(!store.spool(&hash, data).unwrap());
    }

    #[test]
    fn test_quarantine_moves_corrupt_spool_file() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp, ShardLayout::FourLevel);

        let hash = compute_hash(b"expected");
        fs::write(store.spool_path(&hash), b"something else").unwrap();
        assert!(matches!(
            store.read_spooled(&hash),
            Err(CasError::HashMismatch { .. })
        ));

        let moved = store.quarantine_spooled(&hash).unwrap();
        assert!(moved.to_string_lossy().ends_with(".asset.corrupt"));
        assert!(store.spooled_hashes().unwrap().is_empty());
    }

    #[test]
    fn test_delete_removes_both_tiers() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp, ShardLayout::FourLevel);

        let data = b"to delete";
        let hash = compute_hash(data);
        store.spool(&hash, data).unwrap();
        store.write(&hash, data).unwrap();

        assert!(store.delete(&hash).unwrap());
        assert!(!store.exists(&hash));
        assert!(!store.delete(&hash).unwrap());
    }

    #[test]
    fn test_spooled_hashes_skips_strays() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp, ShardLayout::FourLevel);

        let hash = compute_hash(b"spooled");
        store.spool(&hash, b"spooled").unwrap();
        fs::write(store.spool_dir().join("README"), b"x").unwrap();
        fs::write(store.spool_dir().join(format!("{hash}.asset.1.tmp")), b"x").unwrap();
        fs::write(store.spool_dir().join("zz.asset"), b"x").unwrap();

        assert_eq!(store.spooled_hashes().unwrap(), vec![hash]);
    }

    #[test]
    fn test_iter_and_stats_skip_spool_inside_base() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("base");
        let store = BlobStore::new(&base, base.join("spool"), ShardLayout::FourLevel).unwrap();

        let h1 = compute_hash(b"one");
        let h2 = compute_hash(b"two");
        store.write(&h1, b"one").unwrap();
        store.write(&h2, b"two").unwrap();
        store.spool(&compute_hash(b"three"), b"three").unwrap();

        let mut found: Vec<_> = store.iter_committed().map(|r| r.unwrap()).collect();
        found.sort();
        let mut expected = vec![h1, h2];
        expected.sort();
        assert_eq!(found, expected);

        let stats = store.stats().unwrap();
        assert_eq!(stats.committed_blobs, 2);
        assert_eq!(stats.spooled_blobs, 1);
        assert_eq!(stats.spooled_bytes, 5);
    }

    #[test]
    fn test_empty_blob() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp, ShardLayout::FourLevel);

        let hash = compute_hash(b"");
        store.write(&hash, b"").unwrap();
        assert!(store.read(&hash).unwrap().is_empty());
    }
}
