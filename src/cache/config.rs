//! Runtime cache configuration and the provider seam.
//!
//! The core never owns configuration; it reads a [`CacheConfig`] from a
//! [`ConfigProvider`] on every request so that option changes take effect
//! without a restart. [`StaticConfigProvider`] covers hosts whose settings
//! are resolved once at startup.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::config::CacheSettings;

const SECONDS_PER_HOUR: u64 = 3600;
const DEFAULT_TTL_HOURS: u32 = 1;
const DEFAULT_MAX_BODY_BYTES: u64 = 4 * 1024 * 1024;

/// Per-request view of the cache options.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// All caching off.
    pub disabled: bool,
    /// Entry lifetime in hours; 0 means entries never expire.
    pub ttl_hours: u32,
    /// Key responses separately for mobile and desktop clients.
    pub device_variants: bool,
    /// Content ids that must never be cached.
    pub excluded: HashSet<Uuid>,
    /// Largest response body the capture path will buffer.
    pub max_body_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            ttl_hours: DEFAULT_TTL_HOURS,
            device_variants: true,
            excluded: HashSet::new(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            disabled: settings.disabled,
            ttl_hours: settings.ttl_hours,
            device_variants: settings.device_variants,
            excluded: settings.exclude.clone(),
            max_body_bytes: settings.max_body_bytes.get(),
        }
    }
}

impl CacheConfig {
    /// Entry lifetime; `None` disables expiry.
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_hours > 0)
            .then(|| Duration::from_secs(u64::from(self.ttl_hours) * SECONDS_PER_HOUR))
    }

    pub fn is_excluded(&self, content_id: Uuid) -> bool {
        self.excluded.contains(&content_id)
    }
}

#[derive(Debug, Error)]
#[error("configuration read failed: {0}")]
pub struct ConfigReadError(pub String);

/// Read-only source of the current cache configuration.
///
/// Implementations must be cheap: the middleware calls this once per
/// request. A failed read disables caching for that request only.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    async fn cache_config(&self) -> Result<CacheConfig, ConfigReadError>;
}

/// Provider backed by settings resolved once at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigProvider {
    config: CacheConfig,
}

impl StaticConfigProvider {
    pub fn new(config: CacheConfig) -> Self {
        Self { config }
    }
}

impl From<&CacheSettings> for StaticConfigProvider {
    fn from(settings: &CacheSettings) -> Self {
        Self::new(CacheConfig::from(settings))
    }
}

#[async_trait]
impl ConfigProvider for StaticConfigProvider {
    async fn cache_config(&self) -> Result<CacheConfig, ConfigReadError> {
        Ok(self.config.clone())
    }
}
