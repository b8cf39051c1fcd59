use std::path::PathBuf;

use fsa_cas::CasError;
use fsa_config::ConfigError;
use fsa_index::IndexError;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the asset store service.
///
/// Read paths never return these; a failed read is logged and reported as
/// "not found".
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Blob store error: {0}")]
    Cas(#[from] CasError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Asset {id} already exists with different content")]
    ContentChanged { id: Uuid },

    #[error("Spool directory {0} is already owned by another store instance")]
    SpoolInUse(PathBuf),

    #[error("Background workers are already running")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, ServiceError>;
