//! Hit/miss accounting.

use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use serde::Serialize;
use time::OffsetDateTime;

const METRIC_HIT: &str = "scatto_cache_hit_total";
const METRIC_MISS: &str = "scatto_cache_miss_total";

/// Monotonic hit/miss counters, reset only by a bulk clear.
///
/// Each recording also bumps the corresponding `metrics` counter so an
/// exporter sees the same numbers the snapshot reports.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Point-in-time counter readout for the reporting surface.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    /// hits / (hits + misses); 0.0 before any traffic.
    pub ratio: f64,
    pub generated_at: OffsetDateTime,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_HIT).increment(1);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_MISS).increment(1);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let ratio = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };

        StatsSnapshot {
            hits,
            misses,
            ratio,
            generated_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}
