//! Read-path counters and the periodic summary reporter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use fsa_config::log_stats_info;

/// Lock-free counters updated on every read.
#[derive(Debug, Default)]
pub struct ReadStats {
    reads: AtomicU64,
    read_nanos: AtomicU64,
    hits: AtomicU64,
    local_misses: AtomicU64,
    fallback_hits: AtomicU64,
    fallback_misses: AtomicU64,
}

/// Counter values at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub reads: u64,
    pub read_time: Duration,
    /// Served from the local store
    pub hits: u64,
    pub local_misses: u64,
    /// Local misses served by the fallback
    pub fallback_hits: u64,
    /// Local misses the fallback could not serve either
    pub fallback_misses: u64,
}

impl StatsSnapshot {
    pub fn average_read_time(&self) -> Duration {
        if self.reads == 0 {
            Duration::ZERO
        } else {
            let nanos = self.read_time.as_nanos() / u128::from(self.reads);
            Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
        }
    }
}

impl ReadStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_read(&self, elapsed: Duration) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.read_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_local_miss(&self) {
        self.local_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback_hit(&self) {
        self.fallback_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback_miss(&self) {
        self.fallback_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Current values, without resetting.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            read_time: Duration::from_nanos(self.read_nanos.load(Ordering::Relaxed)),
            hits: self.hits.load(Ordering::Relaxed),
            local_misses: self.local_misses.load(Ordering::Relaxed),
            fallback_hits: self.fallback_hits.load(Ordering::Relaxed),
            fallback_misses: self.fallback_misses.load(Ordering::Relaxed),
        }
    }

    /// Current values, resetting every counter to zero.
    ///
    /// Each counter is swapped on its own, so a read racing the swap may land
    /// in either window. Nothing is lost or counted twice.
    pub fn take(&self) -> StatsSnapshot {
        StatsSnapshot {
            reads: self.reads.swap(0, Ordering::Relaxed),
            read_time: Duration::from_nanos(self.read_nanos.swap(0, Ordering::Relaxed)),
            hits: self.hits.swap(0, Ordering::Relaxed),
            local_misses: self.local_misses.swap(0, Ordering::Relaxed),
            fallback_hits: self.fallback_hits.swap(0, Ordering::Relaxed),
            fallback_misses: self.fallback_misses.swap(0, Ordering::Relaxed),
        }
    }
}

/// Log one window's summary and start the next window.
pub fn report_window(stats: &ReadStats) -> StatsSnapshot {
    let window = stats.take();
    if window.reads > 0 {
        log_stats_info!(
            "Read summary",
            reads = window.reads,
            avg_read_us = window.average_read_time().as_micros() as u64,
            hits = window.hits,
            local_misses = window.local_misses,
            fallback_hits = window.fallback_hits,
            fallback_misses = window.fallback_misses,
        );
    }
    window
}
