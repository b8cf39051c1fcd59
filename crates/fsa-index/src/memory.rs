//! In-memory index backed by sharded concurrent maps.

use dashmap::DashMap;
use uuid::Uuid;

use crate::types::{AssetMetadata, IndexEntry};
use crate::{IndexResult, MetadataIndex};

/// Non-persistent [`MetadataIndex`]; contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    entries: DashMap<Uuid, IndexEntry>,
    refs: DashMap<String, u64>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_ref(&self, hash: &str) {
        *self.refs.entry(hash.to_string()).or_insert(0) += 1;
    }

    fn drop_ref(&self, hash: &str) {
        self.refs.remove_if_mut(hash, |_, count| {
            *count = count.saturating_sub(1);
            *count == 0
        });
    }
}

impl MetadataIndex for MemoryIndex {
    fn get(&self, id: &Uuid) -> IndexResult<Option<IndexEntry>> {
        Ok(self.entries.get(id).map(|entry| entry.value().clone()))
    }

    fn put(&self, metadata: &AssetMetadata, hash: &str) -> IndexResult<bool> {
        let entry = IndexEntry {
            metadata: metadata.clone(),
            hash: hash.to_string(),
        };
        match self.entries.insert(metadata.id, entry) {
            Some(previous) => {
                if previous.hash != hash {
                    self.drop_ref(&previous.hash);
                    self.add_ref(hash);
                }
                Ok(false)
            }
            None => {
                self.add_ref(hash);
                Ok(true)
            }
        }
    }

    fn delete(&self, id: &Uuid) -> IndexResult<bool> {
        match self.entries.remove(id) {
            Some((_, previous)) => {
                self.drop_ref(&previous.hash);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn count(&self) -> IndexResult<u64> {
        Ok(self.entries.len() as u64)
    }

    fn references(&self, hash: &str) -> IndexResult<u64> {
        Ok(self.refs.get(hash).map(|count| *count).unwrap_or(0))
    }

    fn touch(&self, id: &Uuid, access_time: i64) -> IndexResult<bool> {
        match self.entries.get_mut(id) {
            Some(mut entry) => {
                entry.metadata.access_time = access_time;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str) -> AssetMetadata {
        let mut meta = AssetMetadata::new(0, name);
        meta.id = Uuid::new_v4();
        meta
    }

    #[test]
    fn test_put_get_delete() {
        let index = MemoryIndex::new();
        let m = meta("tex");

        assert!(index.put(&m, "aa").unwrap());
        assert_eq!(index.get(&m.id).unwrap().unwrap().hash, "aa");
        assert_eq!(index.count().unwrap(), 1);

        assert!(index.delete(&m.id).unwrap());
        assert!(index.get(&m.id).unwrap().is_none());
        assert!(!index.delete(&m.id).unwrap());
    }

    #[test]
    fn test_reference_counts_follow_records() {
        let index = MemoryIndex::new();
        let a = meta("a");
        let b = meta("b");

        index.put(&a, "shared").unwrap();
        index.put(&b, "shared").unwrap();
        assert_eq!(index.references("shared").unwrap(), 2);

        // Metadata-only update keeps the count.
        assert!(!index.put(&a, "shared").unwrap());
        assert_eq!(index.references("shared").unwrap(), 2);

        index.put(&b, "other").unwrap();
        assert_eq!(index.references("shared").unwrap(), 1);
        assert_eq!(index.references("other").unwrap(), 1);

        index.delete(&a.id).unwrap();
        assert_eq!(index.references("shared").unwrap(), 0);
    }

    #[test]
    fn test_exists_batch() {
        let index = MemoryIndex::new();
        let a = meta("a");
        index.put(&a, "h").unwrap();

        let missing = Uuid::new_v4();
        assert_eq!(index.exists(&[a.id, missing]).unwrap(), vec![true, false]);
    }

    #[test]
    fn test_touch() {
        let index = MemoryIndex::new();
        let a = meta("a");
        index.put(&a, "h").unwrap();

        assert!(index.touch(&a.id, 42).unwrap());
        assert_eq!(index.get(&a.id).unwrap().unwrap().metadata.access_time, 42);
        assert!(!index.touch(&Uuid::new_v4(), 42).unwrap());
    }
}
