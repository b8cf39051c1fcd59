//! Integration tests for fsa-config
//!
//! These tests verify the config loading pipeline with real files.

use std::path::PathBuf;

use fsa_config::{merge_tables, Config, ShardLayout};
use tempfile::tempdir;

#[test]
fn test_load_from_explicit_file() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[storage]
base_dir = "/srv/assets"
spool_dir = "/fast/spool"
layout = "two-level"

[limits]
max_name_len = 128

[compactor]
interval_ms = 250

[fallback]
base_dir = "/srv/legacy-assets"
timeout_ms = 1500
"#,
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.storage.base_dir, PathBuf::from("/srv/assets"));
    assert_eq!(config.storage.spool_dir(), PathBuf::from("/fast/spool"));
    assert_eq!(
        config.storage.index_path(),
        PathBuf::from("/srv/assets/index.lmdb")
    );
    assert_eq!(config.storage.layout, ShardLayout::TwoLevel);
    assert_eq!(config.limits.max_name_len, 128);
    assert_eq!(config.limits.max_description_len, 64);
    assert_eq!(config.compactor.interval_ms, 250);

    let fallback = config.fallback.storage().unwrap();
    assert_eq!(fallback.base_dir, PathBuf::from("/srv/legacy-assets"));
    assert_eq!(
        config.fallback.timeout(),
        Some(std::time::Duration::from_millis(1500))
    );
    config.validate().unwrap();
}

#[test]
fn test_project_overrides_global_per_key() {
    let global: toml::Table = r#"
[storage]
base_dir = "/global/assets"
layout = "two-level"

[stats]
interval_secs = 300
"#
    .parse()
    .unwrap();
    let project: toml::Table = r#"
[storage]
base_dir = "/project/assets"
"#
    .parse()
    .unwrap();

    let mut merged = global;
    merge_tables(&mut merged, project);
    let config: Config = merged.try_into().unwrap();

    assert_eq!(config.storage.base_dir, PathBuf::from("/project/assets"));
    assert_eq!(config.storage.layout, ShardLayout::TwoLevel);
    assert_eq!(config.stats.interval_secs, 300);
}

#[test]
fn test_unknown_layout_is_rejected() {
    let result: Result<Config, _> = toml::from_str(
        r#"
[storage]
base_dir = "/srv/assets"
layout = "three-level"
"#,
    );
    assert!(result.is_err());
}

#[test]
fn test_default_toml_roundtrip() {
    let toml_str = Config::default_toml().unwrap();
    let parsed: Config = toml::from_str(&toml_str).unwrap();
    assert_eq!(parsed.limits.max_name_len, 64);
    assert_eq!(parsed.storage.layout, ShardLayout::FourLevel);
}
