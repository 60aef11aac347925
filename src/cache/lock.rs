//! Per-key regeneration locks with stale-marker recovery.
//!
//! A miss that intends to write first claims a marker file next to the
//! entry. The marker gates the write path only: contenders never wait on
//! it, they simply serve their own rendered response without caching it.
//! Markers older than [`STALE_AFTER`] count as abandoned and are claimed by
//! overwriting, so a regeneration that died without releasing cannot block
//! caching for its key beyond that window.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use metrics::counter;
use tokio::fs;
use tracing::{debug, warn};

use super::keys::PageKey;
use super::store::BODY_SUFFIX;

/// Markers older than this are treated as abandoned.
pub const STALE_AFTER: Duration = Duration::from_secs(30);
const LOCK_SUFFIX: &str = ".lock";
const METRIC_LOCK_CONTENDED: &str = "scatto_cache_lock_contended_total";

/// Hands out per-key write locks backed by marker files next to the entries.
#[derive(Debug)]
pub struct RegenLockManager {
    root: PathBuf,
}

impl RegenLockManager {
    /// The manager shares the store's root; markers sit beside the bodies.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn marker_path(&self, key: &PageKey) -> PathBuf {
        self.root.join(format!("{key}{BODY_SUFFIX}{LOCK_SUFFIX}"))
    }

    /// Attempt to take the write lock for `key`.
    ///
    /// Returns `None` when a marker younger than [`STALE_AFTER`] exists.
    /// Two workers racing across the staleness boundary may both succeed;
    /// that is tolerated, because store writes are atomic and last-writer-
    /// wins.
    pub async fn try_acquire(&self, key: &PageKey) -> io::Result<Option<RegenGuard>> {
        let path = self.marker_path(key);

        match fs::metadata(&path).await {
            Ok(metadata) => {
                let age = metadata.modified()?.elapsed().unwrap_or_default();
                if age < STALE_AFTER {
                    counter!(METRIC_LOCK_CONTENDED).increment(1);
                    return Ok(None);
                }
                debug!(key = %key, age_secs = age.as_secs(), "reclaiming stale regeneration marker");
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }

        fs::write(&path, b"").await?;
        Ok(Some(RegenGuard {
            path,
            released: false,
        }))
    }
}

/// Live write lock for one key.
///
/// Releases exactly once: explicitly via [`release`](Self::release) after
/// the store write, or through `Drop` on any other exit path, so unwinding
/// cannot leak the marker past the staleness window.
#[derive(Debug)]
pub struct RegenGuard {
    path: PathBuf,
    released: bool,
}

impl RegenGuard {
    pub async fn release(mut self) {
        self.released = true;
        if let Err(err) = fs::remove_file(&self.path).await {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %err, "failed to remove regeneration marker");
            }
        }
    }
}

impl Drop for RegenGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %err, "failed to remove regeneration marker");
            }
        }
    }
}
