//! Fan-out bounds of both shard layouts over a synthetic corpus.

use std::collections::HashMap;
use std::path::PathBuf;

use fsa_cas::{compute_hash, ShardLayout};

const CORPUS: u32 = 20_000;

fn leaf_counts(layout: ShardLayout) -> HashMap<PathBuf, u32> {
    let mut counts = HashMap::new();
    for i in 0..CORPUS {
        let hash = compute_hash(&i.to_le_bytes());
        *counts.entry(layout.shard_path(&hash)).or_insert(0) += 1;
    }
    counts
}

fn top_level_counts(layout: ShardLayout) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for i in 0..CORPUS {
        let hash = compute_hash(&i.to_le_bytes());
        *counts.entry(hash[..layout.width()].to_string()).or_insert(0) += 1;
    }
    counts
}

#[test]
fn test_four_level_fan_out_is_bounded() {
    let leaves = leaf_counts(ShardLayout::FourLevel);
    let worst = leaves.values().copied().max().unwrap();
    // 2^32 leaves for 20k hashes: practically every leaf holds one blob.
    assert!(worst <= 3, "leaf directory holds {worst} blobs");

    let top = top_level_counts(ShardLayout::FourLevel);
    assert!(top.len() <= 256);
    let worst_top = top.values().copied().max().unwrap();
    assert!(
        worst_top < CORPUS / 100,
        "top-level directory holds {worst_top} of {CORPUS}"
    );
}

#[test]
fn test_two_level_fan_out_is_bounded() {
    let leaves = leaf_counts(ShardLayout::TwoLevel);
    let worst = leaves.values().copied().max().unwrap();
    assert!(worst <= 5, "leaf directory holds {worst} blobs");

    let top = top_level_counts(ShardLayout::TwoLevel);
    assert!(top.len() <= 4096);
    let worst_top = top.values().copied().max().unwrap();
    assert!(
        worst_top < CORPUS / 200,
        "top-level directory holds {worst_top} of {CORPUS}"
    );
}

#[test]
fn test_every_segment_is_hex_of_layout_width() {
    for layout in [ShardLayout::FourLevel, ShardLayout::TwoLevel] {
        let hash = compute_hash(b"segments");
        let path = layout.shard_path(&hash);
        let segments: Vec<_> = path.iter().map(|s| s.to_str().unwrap()).collect();
        assert_eq!(segments.len(), layout.levels());
        assert_eq!(segments.concat(), &hash[..layout.levels() * layout.width()]);
    }
}
