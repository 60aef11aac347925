//! Filesystem page store.
//!
//! One file per key under a dedicated root, named by the key's hex digest
//! plus the `.html` body suffix. Writes go to a staging file in the same
//! directory and are renamed into place, so a concurrent reader sees either
//! the previous complete body or the new one, never a torn write. Expiry is
//! judged against the entry's mtime at read time; nothing scans the store
//! in the background.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use metrics::counter;
use tokio::fs;
use uuid::Uuid;

use super::keys::PageKey;

/// Cached bodies are the only file type the storage root may serve.
pub(crate) const BODY_SUFFIX: &str = ".html";
const ACCESS_GUARD_FILE: &str = ".htaccess";
// Keeps the root from being listed or served wholesale on deployments whose
// web server honors per-directory rules; only rendered bodies stay reachable.
const ACCESS_GUARD_CONTENT: &str =
    "Order deny,allow\nDeny from all\n<Files ~ \"\\.html$\">\nAllow from all\n</Files>\n";
const METRIC_PURGED: &str = "scatto_cache_purged_total";

/// Entry count and aggregate size, for the reporting surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StoreUsage {
    pub entries: usize,
    pub total_bytes: u64,
}

/// Filesystem-backed storage for rendered page bodies.
#[derive(Debug)]
pub struct PageStore {
    root: PathBuf,
}

impl PageStore {
    /// Open storage rooted at `root`, creating the directory and the access
    /// guard marker on first use.
    pub async fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;

        let guard = root.join(ACCESS_GUARD_FILE);
        if !fs::try_exists(&guard).await? {
            fs::write(&guard, ACCESS_GUARD_CONTENT).await?;
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn body_path(&self, key: &PageKey) -> PathBuf {
        self.root.join(format!("{key}{BODY_SUFFIX}"))
    }

    /// Fetch the stored body for `key`, treating entries older than `ttl` as
    /// absent. `ttl = None` disables expiry.
    pub async fn get(&self, key: &PageKey, ttl: Option<Duration>) -> io::Result<Option<Bytes>> {
        let path = self.body_path(key);

        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };

        if let Some(ttl) = ttl {
            // An mtime in the future reads as age zero: serve rather than
            // guess about clock skew.
            if let Ok(age) = metadata.modified()?.elapsed() {
                if age >= ttl {
                    return Ok(None);
                }
            }
        }

        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            // Raced a concurrent delete between stat and read.
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Store `body` under `key` with atomic visibility.
    pub async fn put(&self, key: &PageKey, body: &[u8]) -> io::Result<()> {
        // Dotted staging names cannot match a body read or a `clear_all` sweep.
        let staging = self
            .root
            .join(format!(".{key}.{}", Uuid::new_v4().simple()));

        if let Err(err) = fs::write(&staging, body).await {
            let _ = fs::remove_file(&staging).await;
            return Err(err);
        }

        match fs::rename(&staging, self.body_path(key)).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let _ = fs::remove_file(&staging).await;
                Err(err)
            }
        }
    }

    /// Remove the entry for `key`. Returns whether an entry existed; missing
    /// entries are success.
    pub async fn delete(&self, key: &PageKey) -> io::Result<bool> {
        match fs::remove_file(self.body_path(key)).await {
            Ok(()) => {
                counter!(METRIC_PURGED).increment(1);
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Remove every stored body, returning the count removed. Regeneration
    /// markers and the access guard stay in place.
    pub async fn clear_all(&self) -> io::Result<usize> {
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.ends_with(BODY_SUFFIX) {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err),
            }
        }

        counter!(METRIC_PURGED).increment(removed as u64);
        Ok(removed)
    }

    /// Entry count and aggregate size of the stored bodies.
    pub async fn usage(&self) -> io::Result<StoreUsage> {
        let mut usage = StoreUsage {
            entries: 0,
            total_bytes: 0,
        };
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.ends_with(BODY_SUFFIX) {
                continue;
            }
            if let Ok(metadata) = entry.metadata().await {
                usage.entries += 1;
                usage.total_bytes += metadata.len();
            }
        }

        Ok(usage)
    }

    /// Delete the entire storage tree, markers and root included.
    pub async fn uninstall(self) -> io::Result<()> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}
