//! Administrative surfaces: bulk clear, stats reporting, clear throttling.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tracing::{info, warn};

use super::middleware::CacheState;
use super::stats::StatsSnapshot;
use super::store::StoreUsage;

/// Minimum spacing between manual clear-cache actions per actor.
pub const DEFAULT_CLEAR_WINDOW: Duration = Duration::from_secs(60);

/// Remove every cached entry and reset the hit/miss counters.
///
/// Returns the number of entries removed so the caller can report it. A
/// store failure is logged and reported as zero removals; administrative
/// requests never fail on cache errors either.
pub async fn purge_all(state: &CacheState) -> usize {
    let removed = match state.store.clear_all().await {
        Ok(removed) => removed,
        Err(err) => {
            warn!(error = %err, "bulk cache clear failed");
            0
        }
    };
    state.stats.reset();
    info!(removed, "cache cleared");
    removed
}

/// Combined counters + usage readout for an external reporting UI.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub stats: StatsSnapshot,
    pub usage: StoreUsage,
}

pub async fn report(state: &CacheState) -> StatsReport {
    let usage = match state.store.usage().await {
        Ok(usage) => usage,
        Err(err) => {
            warn!(error = %err, "cache usage scan failed");
            StoreUsage {
                entries: 0,
                total_bytes: 0,
            }
        }
    };

    StatsReport {
        stats: state.stats.snapshot(),
        usage,
    }
}

/// Throttles the manual clear-cache action per acting principal.
///
/// Best-effort and instance-local: each process enforces its own window.
#[derive(Debug)]
pub struct ClearRateLimiter {
    window: Duration,
    last_action: DashMap<String, Instant>,
}

impl ClearRateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_action: DashMap::new(),
        }
    }

    /// Whether `actor` may clear now; records the attempt when allowed.
    pub fn allow(&self, actor: &str) -> bool {
        let now = Instant::now();
        match self.last_action.entry(actor.to_string()) {
            Entry::Occupied(mut occupied) => {
                if now.duration_since(*occupied.get()) < self.window {
                    return false;
                }
                occupied.insert(now);
                true
            }
            Entry::Vacant(vacant) => {
                vacant.insert(now);
                true
            }
        }
    }
}

impl Default for ClearRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_CLEAR_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_action_within_window_is_denied() {
        let limiter = ClearRateLimiter::new(Duration::from_secs(60));
        assert!(limiter.allow("admin"));
        assert!(!limiter.allow("admin"));
    }

    #[test]
    fn actors_are_throttled_independently() {
        let limiter = ClearRateLimiter::new(Duration::from_secs(60));
        assert!(limiter.allow("admin"));
        assert!(limiter.allow("editor"));
        assert!(!limiter.allow("admin"));
    }

    #[test]
    fn zero_window_never_throttles() {
        let limiter = ClearRateLimiter::new(Duration::ZERO);
        assert!(limiter.allow("admin"));
        assert!(limiter.allow("admin"));
    }
}
