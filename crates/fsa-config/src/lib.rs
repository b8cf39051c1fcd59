//! # fsa-config
//!
//! Configuration management for FSAssets.
//!
//! Loads configuration from:
//! 1. `~/.fsassets/config.toml` (global)
//! 2. `.fsassets/config.toml` (project-local, overrides global key by key)
//! 3. Environment variables (highest priority)
//!
//! Nothing here is global state: callers load a [`Config`], validate it and
//! hand it to the service wiring.

pub mod logging;
pub mod path;
pub mod testing;

pub use fsa_cas::ShardLayout;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::path::expand_home;

/// Directory name used for both the global and project config.
pub const CONFIG_DIR_NAME: &str = ".fsassets";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub limits: LimitsConfig,
    pub compactor: CompactorConfig,
    pub stats: StatsConfig,
    pub fallback: FallbackConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let mut table = toml::Table::new();

        // 1. Global config (~/.fsassets/config.toml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                table = read_table(&global_path)?;
            }
        }

        // 2. Project config (.fsassets/config.toml) - overrides global
        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from {:?}", project_path);
            merge_tables(&mut table, read_table(&project_path)?);
        }

        let mut config: Config = table.try_into()?;

        // 3. Environment variable overrides
        config.apply_env_overrides()?;
        config.expand_paths();
        Ok(config)
    }

    /// Load a single explicit config file, then apply environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Loading config from {:?}", path);
        let mut config: Config = read_table(path)?.try_into()?;
        config.apply_env_overrides()?;
        config.expand_paths();
        Ok(config)
    }

    /// Global config path: ~/.fsassets/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join("config.toml"))
    }

    /// Project config path: .fsassets/config.toml
    pub fn project_config_path() -> PathBuf {
        Path::new(CONFIG_DIR_NAME).join("config.toml")
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(path) = std::env::var("FSA_BASE_DIR") {
            self.storage.base_dir = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("FSA_SPOOL_DIR") {
            self.storage.spool_dir = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("FSA_INDEX_PATH") {
            self.storage.index_path = Some(PathBuf::from(path));
        }
        if let Ok(layout) = std::env::var("FSA_LAYOUT") {
            self.storage.layout = layout.parse().map_err(|reason| ConfigError::Invalid {
                field: "storage.layout",
                reason,
            })?;
        }
        if let Ok(path) = std::env::var("FSA_FALLBACK_DIR") {
            self.fallback.base_dir = Some(PathBuf::from(path));
        }
        Ok(())
    }

    fn expand_paths(&mut self) {
        self.storage.base_dir = expand_home(&self.storage.base_dir);
        self.storage.spool_dir = self.storage.spool_dir.as_deref().map(expand_home);
        self.storage.index_path = self.storage.index_path.as_deref().map(expand_home);
        self.fallback.base_dir = self.fallback.base_dir.as_deref().map(expand_home);
        self.fallback.spool_dir = self.fallback.spool_dir.as_deref().map(expand_home);
        self.fallback.index_path = self.fallback.index_path.as_deref().map(expand_home);
    }

    /// Check settings the service cannot start without.
    ///
    /// This is the only place configuration errors surface; a service built
    /// from a validated config never reports them per request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.base_dir.as_os_str().is_empty() {
            return Err(ConfigError::Missing("storage.base_dir"));
        }
        if self.limits.max_name_len == 0 {
            return Err(ConfigError::Invalid {
                field: "limits.max_name_len",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.limits.max_description_len == 0 {
            return Err(ConfigError::Invalid {
                field: "limits.max_description_len",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.compactor.interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "compactor.interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.stats.interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "stats.interval_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if let Some(base) = &self.fallback.base_dir {
            if base == &self.storage.base_dir {
                return Err(ConfigError::Invalid {
                    field: "fallback.base_dir",
                    reason: "must differ from storage.base_dir".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Generate default config TOML string
    pub fn default_toml() -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&Config::default())?)
    }

    /// Serialize this config as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents.parse::<toml::Table>()?)
}

/// Deep-merge `overlay` into `base`: nested tables merge key by key, every
/// other value in `overlay` replaces the one in `base`.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the compressed, sharded tree. Required.
    pub base_dir: PathBuf,
    /// Spool directory (default: `<base_dir>/spool`)
    pub spool_dir: Option<PathBuf>,
    /// Metadata index location (default: `<base_dir>/index.lmdb`)
    pub index_path: Option<PathBuf>,
    /// Shard layout of the committed tree
    pub layout: ShardLayout,
}

impl StorageConfig {
    pub fn spool_dir(&self) -> PathBuf {
        self.spool_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join("spool"))
    }

    pub fn index_path(&self) -> PathBuf {
        self.index_path
            .clone()
            .unwrap_or_else(|| self.base_dir.join("index.lmdb"))
    }
}

/// Metadata limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum asset name length in characters
    pub max_name_len: usize,
    /// Maximum asset description length in characters
    pub max_description_len: usize,
    /// Access times older than this are refreshed on read
    pub access_time_window_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_name_len: 64,
            max_description_len: 64,
            access_time_window_secs: 24 * 60 * 60,
        }
    }
}

/// Write-behind compactor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactorConfig {
    /// Sleep between spool scans
    pub interval_ms: u64,
}

impl Default for CompactorConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

impl CompactorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Read statistics reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Reporting window length
    pub interval_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

impl StatsConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Secondary local store consulted on a local miss
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Base directory of the secondary store; no fallback when unset
    pub base_dir: Option<PathBuf>,
    /// Spool directory of the secondary store (default: `<base_dir>/spool`)
    pub spool_dir: Option<PathBuf>,
    /// Index of the secondary store (default: `<base_dir>/index.lmdb`)
    pub index_path: Option<PathBuf>,
    /// Shard layout of the secondary store
    pub layout: ShardLayout,
    /// Give up on a fallback lookup after this long
    pub timeout_ms: Option<u64>,
}

impl FallbackConfig {
    /// Storage settings of the secondary store, if one is configured.
    pub fn storage(&self) -> Option<StorageConfig> {
        self.base_dir.as_ref().map(|base| StorageConfig {
            base_dir: base.clone(),
            spool_dir: self.spool_dir.clone(),
            index_path: self.index_path.clone(),
            layout: self.layout,
        })
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}
