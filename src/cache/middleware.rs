//! Page-cache middleware: the decide → probe → capture pipeline.
//!
//! Serves stored bodies for cacheable GET requests and captures freshly
//! rendered responses on misses, writing them through the store while a
//! per-key regeneration lock keeps a burst of concurrent misses from all
//! regenerating. Every internal failure degrades to serving the live
//! response uncached; the cache never fails a request that the handler
//! itself would have answered.

use std::sync::Arc;

use axum::{
    body::{Body, HttpBody},
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use metrics::counter;
use tracing::{debug, instrument, warn};

use super::config::ConfigProvider;
use super::context::RequestContext;
use super::keys::derive_page_key;
use super::lock::RegenLockManager;
use super::policy::{self, Decision};
use super::stats::CacheStats;
use super::store::PageStore;

const METRIC_STORE_ERROR: &str = "scatto_cache_store_error_total";

/// Shared cache state for the middleware and the maintenance surfaces.
#[derive(Clone)]
pub struct CacheState {
    pub provider: Arc<dyn ConfigProvider>,
    pub store: Arc<PageStore>,
    pub locks: Arc<RegenLockManager>,
    pub stats: Arc<CacheStats>,
}

impl CacheState {
    /// Wire the cache components up around an opened store.
    pub fn new(provider: Arc<dyn ConfigProvider>, store: PageStore) -> Self {
        let locks = Arc::new(RegenLockManager::new(store.root()));
        Self {
            provider,
            store: Arc::new(store),
            locks,
            stats: Arc::new(CacheStats::new()),
        }
    }
}

/// Full-page cache layer.
///
/// Mount with `axum::middleware::from_fn_with_state`, after any host layer
/// that inserts the [`PageContext`](super::context::PageContext) extension.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn page_cache_layer(
    State(cache): State<CacheState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let config = match cache.provider.cache_config().await {
        Ok(config) => config,
        Err(err) => {
            // Fail closed: an unreadable configuration disables caching for
            // this request only.
            debug!(error = %err, "config read failed; serving live");
            return next.run(request).await;
        }
    };

    let ctx = RequestContext::from_request(&request);
    let decision = policy::decide(&ctx, &config);
    // Downstream observers get the same memoized decision.
    request.extensions_mut().insert(decision);

    if let Decision::Bypass(reason) = decision {
        debug!(reason = reason.as_str(), outcome = "bypass", "request not cacheable");
        return next.run(request).await;
    }

    let device = config.device_variants.then_some(ctx.device);
    let key = derive_page_key(&ctx.path, &ctx.query, device, ctx.auth_class());

    match cache.store.get(&key, config.ttl()).await {
        Ok(Some(body)) => {
            cache.stats.record_hit();
            debug!(key = %key, outcome = "hit", "serving cached response");
            return serve_cached(body);
        }
        Ok(None) => {}
        Err(err) => {
            counter!(METRIC_STORE_ERROR).increment(1);
            warn!(key = %key, error = %err, "cache read failed; serving live");
        }
    }

    cache.stats.record_miss();

    let guard = match cache.locks.try_acquire(&key).await {
        Ok(Some(guard)) => guard,
        Ok(None) => {
            debug!(key = %key, outcome = "contended", "regeneration in flight; serving live");
            return next.run(request).await;
        }
        Err(err) => {
            counter!(METRIC_STORE_ERROR).increment(1);
            warn!(key = %key, error = %err, "lock probe failed; serving live");
            return next.run(request).await;
        }
    };

    // From here the guard releases on every exit: explicitly after the
    // write, via Drop if anything below unwinds.
    let response = next.run(request).await;
    let (response, captured) = capture_body(response, config.max_body_bytes).await;

    if let Some(body) = captured {
        match cache.store.put(&key, &body).await {
            Ok(()) => {
                debug!(key = %key, bytes = body.len(), outcome = "stored", "cached regenerated response");
            }
            Err(err) => {
                counter!(METRIC_STORE_ERROR).increment(1);
                warn!(key = %key, error = %err, "cache write failed; response already served live");
            }
        }
    }

    guard.release().await;
    response
}

/// Buffer a storable response body, passing everything else through.
///
/// Only 200 responses with a known size within the configured limit are
/// captured; streaming and oversized bodies pass through uncached so the
/// capture limit can never break a healthy response.
async fn capture_body(response: Response, max_body_bytes: u64) -> (Response, Option<Bytes>) {
    if response.status() != StatusCode::OK {
        return (response, None);
    }

    match response.body().size_hint().exact() {
        Some(len) if len <= max_body_bytes => {}
        declared => {
            debug!(?declared, "response body not capturable; passing through");
            return (response, None);
        }
    }

    let (parts, body) = response.into_parts();
    let limit = usize::try_from(max_body_bytes).unwrap_or(usize::MAX);
    let bytes = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(err) => {
            // The handler's own body stream failed mid-read; there is no
            // response left to salvage.
            warn!(error = %err, "response body collection failed");
            return (StatusCode::INTERNAL_SERVER_ERROR.into_response(), None);
        }
    };

    let captured = (!bytes.is_empty()).then(|| bytes.clone());
    (Response::from_parts(parts, Body::from(bytes)), captured)
}

/// Rebuild a response from a stored body.
fn serve_cached(body: Bytes) -> Response {
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn capture_skips_non_ok_responses() {
        let response = (StatusCode::NOT_FOUND, "missing").into_response();
        let (response, captured) = capture_body(response, 1024).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(captured.is_none());
    }

    #[tokio::test]
    async fn capture_skips_oversized_bodies() {
        let response = "0123456789".into_response();
        let (response, captured) = capture_body(response, 4).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(captured.is_none());

        // The body still reaches the client untouched.
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert_eq!(&bytes[..], b"0123456789");
    }

    #[tokio::test]
    async fn capture_returns_ok_bodies_intact() {
        let response = "<html>hi</html>".into_response();
        let (response, captured) = capture_body(response, 1024).await;

        let captured = captured.expect("captured body");
        assert_eq!(&captured[..], b"<html>hi</html>");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert_eq!(bytes, captured);
    }

    #[tokio::test]
    async fn capture_ignores_empty_bodies() {
        let response = StatusCode::OK.into_response();
        let (_, captured) = capture_body(response, 1024).await;
        assert!(captured.is_none());
    }

    #[test]
    fn cached_responses_are_served_as_html() {
        let response = serve_cached(Bytes::from_static(b"<html></html>"));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok()),
            Some("text/html; charset=utf-8")
        );
    }
}
