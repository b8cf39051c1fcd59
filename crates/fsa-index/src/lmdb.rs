//! LMDB-backed index for persistent, crash-safe ID → hash mapping.
//!
//! Two named databases live in one environment:
//! - `assets`: asset ID (16 raw bytes) → [`IndexEntry`]
//! - `refs`: content hash → number of records referencing it
//!
//! Every mutation runs in a single write transaction, so the reference
//! counts never drift from the records.

use std::path::Path;

use heed::types::{Bytes, SerdeBincode, Str};
use heed::{Database, Env, EnvOpenOptions, RwTxn};
use tracing::debug;
use uuid::Uuid;

use crate::types::{AssetMetadata, IndexEntry};
use crate::{IndexResult, MetadataIndex};

/// LMDB-backed [`MetadataIndex`]
pub struct LmdbIndex {
    /// LMDB environment
    env: Env,

    /// Asset ID → IndexEntry database
    assets_db: Database<Bytes, SerdeBincode<IndexEntry>>,

    /// Content hash → reference count database
    refs_db: Database<Str, SerdeBincode<u64>>,
}

impl LmdbIndex {
    /// Default LMDB map size: 1GB (expandable)
    const DEFAULT_MAP_SIZE: usize = 1024 * 1024 * 1024;

    /// Maximum readers
    const MAX_READERS: u32 = 128;

    /// Open or create an LMDB index at the given path
    ///
    /// Path should point to a directory that will contain the LMDB files.
    pub fn open<P: AsRef<Path>>(path: P) -> IndexResult<Self> {
        let path = path.as_ref();

        std::fs::create_dir_all(path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(Self::DEFAULT_MAP_SIZE)
                .max_readers(Self::MAX_READERS)
                .max_dbs(2)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let assets_db = env.create_database(&mut wtxn, Some("assets"))?;
        let refs_db = env.create_database(&mut wtxn, Some("refs"))?;
        wtxn.commit()?;

        debug!("Opened LMDB index at {:?}", path);

        Ok(Self {
            env,
            assets_db,
            refs_db,
        })
    }

    fn adjust_refs(&self, wtxn: &mut RwTxn, hash: &str, delta: i64) -> IndexResult<()> {
        let current = self.refs_db.get(wtxn, hash)?.unwrap_or(0);
        let next = current.saturating_add_signed(delta);
        if next == 0 {
            self.refs_db.delete(wtxn, hash)?;
        } else {
            self.refs_db.put(wtxn, hash, &next)?;
        }
        Ok(())
    }

    /// Sync/flush LMDB to disk
    pub fn sync(&self) -> IndexResult<()> {
        self.env.force_sync()?;
        Ok(())
    }

    /// All records (expensive for large indexes; admin use only)
    pub fn entries(&self) -> IndexResult<Vec<IndexEntry>> {
        let rtxn = self.env.read_txn()?;
        let mut result = Vec::new();
        for item in self.assets_db.iter(&rtxn)? {
            let (_, entry) = item?;
            result.push(entry);
        }
        Ok(result)
    }
}

impl MetadataIndex for LmdbIndex {
    fn get(&self, id: &Uuid) -> IndexResult<Option<IndexEntry>> {
        let rtxn = self.env.read_txn()?;
        Ok(self.assets_db.get(&rtxn, id.as_bytes())?)
    }

    fn put(&self, metadata: &AssetMetadata, hash: &str) -> IndexResult<bool> {
        let mut wtxn = self.env.write_txn()?;
        let key = metadata.id.as_bytes();
        let previous = self.assets_db.get(&wtxn, key)?;

        let entry = IndexEntry {
            metadata: metadata.clone(),
            hash: hash.to_string(),
        };
        self.assets_db.put(&mut wtxn, key, &entry)?;

        let created = match previous {
            Some(previous) => {
                if previous.hash != hash {
                    self.adjust_refs(&mut wtxn, &previous.hash, -1)?;
                    self.adjust_refs(&mut wtxn, hash, 1)?;
                }
                false
            }
            None => {
                self.adjust_refs(&mut wtxn, hash, 1)?;
                true
            }
        };

        wtxn.commit()?;
        Ok(created)
    }

    fn delete(&self, id: &Uuid) -> IndexResult<bool> {
        let mut wtxn = self.env.write_txn()?;
        let Some(previous) = self.assets_db.get(&wtxn, id.as_bytes())? else {
            return Ok(false);
        };
        self.assets_db.delete(&mut wtxn, id.as_bytes())?;
        self.adjust_refs(&mut wtxn, &previous.hash, -1)?;
        wtxn.commit()?;
        Ok(true)
    }

    fn exists(&self, ids: &[Uuid]) -> IndexResult<Vec<bool>> {
        let rtxn = self.env.read_txn()?;
        ids.iter()
            .map(|id| Ok(self.assets_db.get(&rtxn, id.as_bytes())?.is_some()))
            .collect()
    }

    fn count(&self) -> IndexResult<u64> {
        let rtxn = self.env.read_txn()?;
        Ok(self.assets_db.len(&rtxn)?)
    }

    fn references(&self, hash: &str) -> IndexResult<u64> {
        let rtxn = self.env.read_txn()?;
        Ok(self.refs_db.get(&rtxn, hash)?.unwrap_or(0))
    }

    fn touch(&self, id: &Uuid, access_time: i64) -> IndexResult<bool> {
        let mut wtxn = self.env.write_txn()?;
        let Some(mut entry) = self.assets_db.get(&wtxn, id.as_bytes())? else {
            return Ok(false);
        };
        entry.metadata.access_time = access_time;
        self.assets_db.put(&mut wtxn, id.as_bytes(), &entry)?;
        wtxn.commit()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn meta(name: &str) -> AssetMetadata {
        let mut meta = AssetMetadata::new(0, name);
        meta.id = Uuid::new_v4();
        meta
    }

    #[test]
    fn test_lmdb_index_put_get() {
        let temp = TempDir::new().unwrap();
        let index = LmdbIndex::open(temp.path().join("index")).unwrap();

        let m = meta("texture");
        assert!(index.put(&m, "abcd").unwrap());

        let entry = index.get(&m.id).unwrap().unwrap();
        assert_eq!(entry.hash, "abcd");
        assert_eq!(entry.metadata, m);
    }

    #[test]
    fn test_lmdb_index_persists() {
        let temp = TempDir::new().unwrap();
        let m = meta("persisted");
        {
            let index = LmdbIndex::open(temp.path().join("index")).unwrap();
            index.put(&m, "1234").unwrap();
        }

        let index = LmdbIndex::open(temp.path().join("index")).unwrap();
        assert_eq!(index.get(&m.id).unwrap().unwrap().hash, "1234");
        assert_eq!(index.count().unwrap(), 1);
        assert_eq!(index.references("1234").unwrap(), 1);
    }

    #[test]
    fn test_lmdb_index_refs_and_delete() {
        let temp = TempDir::new().unwrap();
        let index = LmdbIndex::open(temp.path().join("index")).unwrap();

        let a = meta("a");
        let b = meta("b");
        index.put(&a, "shared").unwrap();
        index.put(&b, "shared").unwrap();
        assert_eq!(index.references("shared").unwrap(), 2);

        assert!(index.delete(&a.id).unwrap());
        assert_eq!(index.references("shared").unwrap(), 1);
        assert!(!index.delete(&a.id).unwrap());

        index.put(&b, "moved").unwrap();
        assert_eq!(index.references("shared").unwrap(), 0);
        assert_eq!(index.references("moved").unwrap(), 1);
        assert_eq!(index.count().unwrap(), 1);
    }

    #[test]
    fn test_lmdb_index_exists_and_touch() {
        let temp = TempDir::new().unwrap();
        let index = LmdbIndex::open(temp.path().join("index")).unwrap();

        let a = meta("a");
        index.put(&a, "h").unwrap();
        assert_eq!(
            index.exists(&[Uuid::new_v4(), a.id]).unwrap(),
            vec![false, true]
        );

        assert!(index.touch(&a.id, 1_700_000_000).unwrap());
        assert_eq!(
            index.get(&a.id).unwrap().unwrap().metadata.access_time,
            1_700_000_000
        );
        assert_eq!(index.entries().unwrap().len(), 1);
    }
}
