//! Scatto cache system
//!
//! A full-page response cache with a filesystem store:
//!
//! - **Policy** decides per request whether the response may be cached.
//! - **Keys** digest the request's cache dimensions deterministically.
//! - **Store** holds one rendered body per key with TTL-at-read expiry.
//! - **Lock** bounds cache stampedes: one writer per key, everyone else
//!   serves live.
//! - **Invalidation** turns content-change events into targeted deletions.
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `scatto.toml`:
//!
//! ```toml
//! [cache]
//! ttl_hours = 1          # 0 = never expire
//! device_variants = true
//! disabled = false
//! exclude = []           # content ids never cached
//!
//! [storage]
//! directory = "cache"
//! ```

mod config;
mod context;
mod invalidate;
mod keys;
mod lock;
mod maintenance;
mod middleware;
mod policy;
mod stats;
mod store;

pub use config::{CacheConfig, ConfigProvider, ConfigReadError, StaticConfigProvider};
pub use context::{AuthClass, DeviceClass, PageContext, RequestContext};
pub use invalidate::{ContentResolver, Invalidator, Permalink};
pub use keys::{PageKey, derive_page_key};
pub use lock::{RegenGuard, RegenLockManager, STALE_AFTER};
pub use maintenance::{
    ClearRateLimiter, DEFAULT_CLEAR_WINDOW, StatsReport, purge_all, report,
};
pub use middleware::{CacheState, page_cache_layer};
pub use policy::{BypassReason, Decision, decide};
pub use stats::{CacheStats, StatsSnapshot};
pub use store::{PageStore, StoreUsage};
