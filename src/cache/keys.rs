//! Cache key derivation.
//!
//! A page key is the digest of the request's cache dimensions in fixed
//! order: path, query string, optional device-class tag, auth-class tag.
//! Identical dimensions always digest to the identical key; that
//! determinism is what lets invalidation compute the same key a hit would
//! have used.

use std::fmt;

use sha2::{Digest, Sha256};

use super::context::{AuthClass, DeviceClass};

const DIMENSION_SEPARATOR: &[u8] = b"|";

/// Deterministic digest identifying one cacheable response variant.
///
/// Renders as 64 lowercase hex characters, which doubles as the file stem
/// of the stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageKey([u8; 32]);

impl PageKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Derive the cache key for one request variant.
///
/// `device` is `None` when device-variant caching is disabled. The
/// dimension is then omitted entirely rather than defaulted, so a site
/// toggling the setting cannot collide with its previous keys.
pub fn derive_page_key(
    path: &str,
    query: &str,
    device: Option<DeviceClass>,
    auth: AuthClass,
) -> PageKey {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update(DIMENSION_SEPARATOR);
    hasher.update(query.as_bytes());
    if let Some(device) = device {
        hasher.update(DIMENSION_SEPARATOR);
        hasher.update(device.tag().as_bytes());
    }
    hasher.update(DIMENSION_SEPARATOR);
    hasher.update(auth.tag().as_bytes());
    PageKey(hasher.finalize().into())
}
