//! # fsa-service
//!
//! The FSAssets store service.
//!
//! ```text
//! store ──► hash ──► spool/<hash>.asset ──► index(id → hash)
//!                          │
//!                  compactor (every interval_ms)
//!                          ▼
//!                 <base>/<shard>/<hash>.gz
//!
//! get ──► index ──► spool? ──► committed? ──► fallback ──► async cache-fill
//! ```
//!
//! ## Threads
//!
//! - `fsa-compactor`: drains the spool, one cycle per interval
//! - `fsa-stats`: logs and resets read counters, one window per interval
//! - rayon pool: `get_async` callbacks and fallback cache-fills
//!
//! Only one service per process may own a spool directory, and only one
//! process may run a compactor over it.

pub mod compactor;
pub mod error;
pub mod fallback;
mod ownership;
pub mod service;
pub mod stats;
pub mod worker;

pub use compactor::{Compactor, CycleReport};
pub use error::{Result, ServiceError};
pub use fallback::{FallbackResolver, FallbackService};
pub use ownership::COMPACTOR_LOCK_FILE;
pub use service::{AssetDigest, AssetStoreService, ServiceBuilder};
pub use stats::{ReadStats, StatsSnapshot};
