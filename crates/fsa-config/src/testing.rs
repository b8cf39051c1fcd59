//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - Isolated base, spool and index directories
//! - A ready-made [`Config`] pointing at them
//!
//! # Usage
//!
//! ```ignore
//! use fsa_config::testing::TestEnvironment;
//!
//! #[test]
//! fn test_something() {
//!     let env = TestEnvironment::new().unwrap();
//!     let config = env.config();
//!     // config.storage.* all point inside env's temp dir
//! }
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

use crate::Config;

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with unique paths
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Root of everything this environment owns
    pub root: PathBuf,
    /// Committed tree
    pub base_dir: PathBuf,
    /// Spool directory
    pub spool_dir: PathBuf,
    /// LMDB index directory
    pub index_path: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().to_path_buf();

        let base_dir = root.join("assets");
        let spool_dir = root.join("spool");
        let index_path = root.join("index.lmdb");

        std::fs::create_dir_all(&base_dir)?;
        std::fs::create_dir_all(&spool_dir)?;

        Ok(Self {
            _temp_dir: temp_dir,
            root,
            base_dir,
            spool_dir,
            index_path,
            test_id,
        })
    }

    /// Config for a store living entirely inside this environment.
    ///
    /// Intervals are shortened so background workers tick quickly in tests.
    pub fn config(&self) -> Config {
        let mut cfg = Config::default();
        cfg.storage.base_dir = self.base_dir.clone();
        cfg.storage.spool_dir = Some(self.spool_dir.clone());
        cfg.storage.index_path = Some(self.index_path.clone());
        cfg.compactor.interval_ms = 50;
        cfg.stats.interval_secs = 1;
        cfg
    }

    /// Write an input file (e.g. an import table) under the environment root
    pub fn create_file(&self, relative_path: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.root.join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}
