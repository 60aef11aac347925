//! Configuration layer: typed settings with layered precedence (file → environment).

use std::{collections::HashSet, num::NonZeroU64, path::PathBuf, str::FromStr};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use uuid::Uuid;

#[cfg(test)]
mod tests;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "scatto";
const DEFAULT_CACHE_DIR: &str = "cache";
const DEFAULT_TTL_HOURS: u32 = 1;
const MAX_TTL_HOURS: u32 = 999;
const DEFAULT_MAX_BODY_BYTES: u64 = 4 * 1024 * 1024;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub cache: CacheSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

/// Cache behavior knobs, mirroring what a site operator actually tunes.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Entry lifetime in hours; 0 disables expiry entirely.
    pub ttl_hours: u32,
    /// Content ids that must never be cached.
    pub exclude: HashSet<Uuid>,
    /// Key responses separately for mobile and desktop clients.
    pub device_variants: bool,
    /// Turn off all caching (useful for troubleshooting).
    pub disabled: bool,
    /// Largest response body the capture path will buffer for storage.
    pub max_body_bytes: NonZeroU64,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub directory: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (files → environment).
///
/// An explicit `config_file` outranks the conventional `config/default` and
/// `scatto` files; `SCATTO__*` environment variables outrank every file.
pub fn load(config_file: Option<&std::path::Path>) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("SCATTO").separator("__"));

    let raw: RawSettings = builder.build()?.try_deserialize()?;
    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    cache: RawCacheSettings,
    storage: RawStorageSettings,
    logging: RawLoggingSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    ttl_hours: Option<u32>,
    exclude: Option<Vec<Uuid>>,
    device_variants: Option<bool>,
    disabled: Option<bool>,
    max_body_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        Ok(Self {
            cache: build_cache_settings(raw.cache)?,
            storage: build_storage_settings(raw.storage),
            logging: build_logging_settings(raw.logging)?,
        })
    }
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    // Out-of-range lifetimes are clamped rather than rejected, matching how
    // an operator-facing duration field behaves.
    let ttl_hours = cache.ttl_hours.unwrap_or(DEFAULT_TTL_HOURS).min(MAX_TTL_HOURS);

    let max_body_bytes = cache.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES);
    let max_body_bytes = NonZeroU64::new(max_body_bytes)
        .ok_or_else(|| LoadError::invalid("cache.max_body_bytes", "must be greater than zero"))?;

    Ok(CacheSettings {
        ttl_hours,
        exclude: cache.exclude.unwrap_or_default().into_iter().collect(),
        device_variants: cache.device_variants.unwrap_or(true),
        disabled: cache.disabled.unwrap_or(false),
        max_body_bytes,
    })
}

fn build_storage_settings(storage: RawStorageSettings) -> StorageSettings {
    StorageSettings {
        directory: storage
            .directory
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR)),
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(value) => LevelFilter::from_str(value.trim())
            .map_err(|_| LoadError::invalid("logging.level", format!("unknown level `{value}`")))?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}
