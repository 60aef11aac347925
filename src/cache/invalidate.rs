//! Invalidation coordinator: content-change events into targeted deletions.
//!
//! The host reports edits, deletions, and comment changes by content id.
//! The coordinator resolves the item's permalink, expands every key variant
//! guest traffic could have cached for it, deletes those entries, and
//! always purges the same variants of the home view, since listing pages
//! surface the changed content too. Authenticated responses are never
//! cached, so only guest-class keys need purging.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use super::config::ConfigProvider;
use super::context::{AuthClass, DeviceClass};
use super::keys::{PageKey, derive_page_key};
use super::store::PageStore;

/// Canonical location of a piece of content, as cached keys see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permalink {
    pub path: String,
    pub query: String,
}

impl Permalink {
    /// Parse an absolute permalink URL into the path/query pair key
    /// derivation uses.
    pub fn parse(url: &str) -> Option<Self> {
        let parsed = Url::parse(url).ok()?;
        Some(Self {
            path: parsed.path().to_string(),
            query: parsed.query().unwrap_or_default().to_string(),
        })
    }

    fn home() -> Self {
        Self {
            path: "/".to_string(),
            query: String::new(),
        }
    }
}

/// Resolves a content identifier to its public permalink.
#[async_trait]
pub trait ContentResolver: Send + Sync {
    /// Absolute URL of the content item, or `None` when it has no public
    /// page of its own.
    async fn permalink(&self, content_id: Uuid) -> Option<String>;
}

/// Translates content-change events into store deletions.
pub struct Invalidator {
    store: Arc<PageStore>,
    resolver: Arc<dyn ContentResolver>,
    provider: Arc<dyn ConfigProvider>,
}

impl Invalidator {
    pub fn new(
        store: Arc<PageStore>,
        resolver: Arc<dyn ContentResolver>,
        provider: Arc<dyn ConfigProvider>,
    ) -> Self {
        Self {
            store,
            resolver,
            provider,
        }
    }

    /// A content item was created or edited.
    pub async fn content_updated(&self, content_id: Uuid) {
        self.purge_content(content_id).await;
    }

    /// A content item was trashed or deleted.
    pub async fn content_deleted(&self, content_id: Uuid) {
        self.purge_content(content_id).await;
    }

    /// A comment on the item was posted or changed moderation state.
    pub async fn comment_changed(&self, content_id: Uuid) {
        self.purge_content(content_id).await;
    }

    async fn purge_content(&self, content_id: Uuid) {
        let variants = self.device_variants().await;

        let Some(url) = self.resolver.permalink(content_id).await else {
            debug!(%content_id, "no permalink for changed content; nothing to purge");
            return;
        };
        let Some(permalink) = Permalink::parse(&url) else {
            warn!(%content_id, url, "unparseable permalink; skipping purge");
            return;
        };

        self.purge_permalink(&permalink, variants).await;
        self.purge_permalink(&Permalink::home(), variants).await;
    }

    /// `None` means the configured state could not be read; every variant is
    /// purged in that case, since over-deletion is idempotent and safe while
    /// a skipped purge serves stale content.
    async fn device_variants(&self) -> Option<bool> {
        match self.provider.cache_config().await {
            Ok(config) => Some(config.device_variants),
            Err(err) => {
                warn!(error = %err, "config read failed during invalidation; purging all variants");
                None
            }
        }
    }

    async fn purge_permalink(&self, permalink: &Permalink, device_variants: Option<bool>) {
        for key in key_variants(permalink, device_variants) {
            match self.store.delete(&key).await {
                Ok(true) => debug!(path = %permalink.path, key = %key, "cache entry purged"),
                Ok(false) => {}
                Err(err) => {
                    warn!(error = %err, path = %permalink.path, "failed to delete cache entry");
                }
            }
        }
    }
}

/// Every key under which guest traffic could have cached this permalink.
fn key_variants(permalink: &Permalink, device_variants: Option<bool>) -> Vec<PageKey> {
    let devices: &[Option<DeviceClass>] = match device_variants {
        Some(true) => &[Some(DeviceClass::Mobile), Some(DeviceClass::Desktop)],
        Some(false) => &[None],
        None => &[Some(DeviceClass::Mobile), Some(DeviceClass::Desktop), None],
    };

    devices
        .iter()
        .map(|device| derive_page_key(&permalink.path, &permalink.query, *device, AuthClass::Guest))
        .collect()
}
