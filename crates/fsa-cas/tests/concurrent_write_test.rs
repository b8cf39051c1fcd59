use std::fs;
use std::sync::Arc;
use std::thread;

use fsa_cas::{compute_hash, BlobStore, ShardLayout};
use tempfile::TempDir;

#[test]
fn test_concurrent_writers_produce_one_blob() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(
        BlobStore::new(temp.path().join("base"), temp.path().join("spool"), ShardLayout::FourLevel)
            .unwrap(),
    );

    let data = vec![7u8; 64 * 1024];
    let hash = compute_hash(&data);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            let data = data.clone();
            let hash = hash.clone();
            thread::spawn(move || {
                store.spool(&hash, &data).unwrap();
                store.write(&hash, &data).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let dir = store.committed_path(&hash).parent().unwrap().to_path_buf();
    let entries: Vec<_> = fs::read_dir(&dir).unwrap().collect();
    assert_eq!(entries.len(), 1, "no temp files may be left behind");
    assert_eq!(store.read(&hash).unwrap(), data);

    let stats = store.stats().unwrap();
    assert_eq!(stats.committed_blobs, 1);
    assert_eq!(stats.spooled_blobs, 1);
}
