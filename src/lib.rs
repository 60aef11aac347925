//! Scatto: a full-page response cache for content sites.
//!
//! Scatto sits in front of an axum-based site as a tower layer and caches
//! whole rendered responses on the filesystem. It decides per request
//! whether the response may be cached, derives a deterministic key from the
//! request's cache dimensions, serves stored bodies on hits, and on misses
//! captures the freshly rendered body while a per-key regeneration lock
//! keeps concurrent misses from all writing at once.
//!
//! The host site stays in charge of everything Scatto cannot know:
//! authentication state, special views, content identity, and where
//! configuration lives. Those arrive through the [`cache::PageContext`]
//! request extension and the [`cache::ConfigProvider`] /
//! [`cache::ContentResolver`] seams.

pub mod cache;
pub mod config;
pub mod infra;
