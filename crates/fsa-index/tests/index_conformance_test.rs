//! Both index backends must behave identically behind the trait object.

use std::sync::Arc;
use std::thread;

use fsa_index::{AssetMetadata, LmdbIndex, MemoryIndex, MetadataIndex};
use tempfile::TempDir;
use uuid::Uuid;

fn meta(name: &str) -> AssetMetadata {
    let mut meta = AssetMetadata::new(6, name);
    meta.id = Uuid::new_v4();
    meta.description = format!("{name} description");
    meta
}

fn exercise(index: Arc<dyn MetadataIndex>) {
    let a = meta("a");
    let b = meta("b");

    assert!(index.put(&a, "h1").unwrap());
    assert!(index.put(&b, "h1").unwrap());
    assert_eq!(index.count().unwrap(), 2);
    assert_eq!(index.references("h1").unwrap(), 2);

    let mut edited = a.clone();
    edited.name = "renamed".to_string();
    assert!(!index.put(&edited, "h1").unwrap());
    assert_eq!(index.get(&a.id).unwrap().unwrap().metadata.name, "renamed");
    assert_eq!(index.count().unwrap(), 2);

    assert_eq!(
        index.exists(&[a.id, Uuid::nil(), b.id]).unwrap(),
        vec![true, false, true]
    );

    assert!(index.delete(&b.id).unwrap());
    assert_eq!(index.references("h1").unwrap(), 1);
    assert_eq!(index.count().unwrap(), 1);
}

fn concurrent_puts(index: Arc<dyn MetadataIndex>) {
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                for i in 0..25 {
                    let m = meta(&format!("t{t}-{i}"));
                    index.put(&m, "same-content").unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(index.count().unwrap(), 100);
    assert_eq!(index.references("same-content").unwrap(), 100);
}

#[test]
fn test_memory_index_conformance() {
    exercise(Arc::new(MemoryIndex::new()));
    concurrent_puts(Arc::new(MemoryIndex::new()));
}

#[test]
fn test_lmdb_index_conformance() {
    let temp = TempDir::new().unwrap();
    exercise(Arc::new(LmdbIndex::open(temp.path().join("a")).unwrap()));
    concurrent_puts(Arc::new(LmdbIndex::open(temp.path().join("b")).unwrap()));
}
