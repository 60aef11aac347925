use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
    middleware,
    routing::get,
};
use scatto::cache::{
    CacheConfig, CacheState, ContentResolver, Invalidator, PageContext, PageStore,
    StaticConfigProvider, page_cache_layer, purge_all, report,
};
use tower::ServiceExt;
use uuid::Uuid;

const DESKTOP_UA: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0";
const MOBILE_UA: &str = "Mozilla/5.0 (Linux; Android 14) AppleWebKit/537.36 Mobile";

struct FixedResolver(String);

#[async_trait]
impl ContentResolver for FixedResolver {
    async fn permalink(&self, _content_id: Uuid) -> Option<String> {
        Some(self.0.clone())
    }
}

async fn state_with(root: &Path, config: CacheConfig) -> CacheState {
    let store = PageStore::open(root).await.expect("store should open");
    CacheState::new(Arc::new(StaticConfigProvider::new(config)), store)
}

fn app(state: CacheState, calls: Arc<AtomicUsize>) -> Router {
    let about_calls = Arc::clone(&calls);
    let home_calls = calls;

    Router::new()
        .route(
            "/about",
            get(move || {
                let calls = Arc::clone(&about_calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    "<html>about</html>"
                }
            }),
        )
        .route(
            "/",
            get(move || {
                let calls = Arc::clone(&home_calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    "<html>home</html>"
                }
            }),
        )
        .layer(middleware::from_fn_with_state(state, page_cache_layer))
}

fn desktop_get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(header::USER_AGENT, DESKTOP_UA)
        .body(Body::empty())
        .expect("request should build")
}

async fn body_of(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should collect")
        .to_vec()
}

#[tokio::test]
async fn miss_then_hit_then_invalidation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = state_with(dir.path(), CacheConfig::default()).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let router = app(state.clone(), Arc::clone(&calls));

    // First anonymous desktop GET: a miss that renders and stores.
    let response = router
        .clone()
        .oneshot(desktop_get("/about"))
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_of(response).await, b"<html>about</html>");

    let snapshot = state.stats.snapshot();
    assert_eq!((snapshot.hits, snapshot.misses), (0, 1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.store.usage().await.expect("usage").entries, 1);

    // Second request within the TTL: served from the store.
    let response = router
        .clone()
        .oneshot(desktop_get("/about"))
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok()),
        Some("text/html; charset=utf-8")
    );
    assert_eq!(body_of(response).await, b"<html>about</html>");

    let snapshot = state.stats.snapshot();
    assert_eq!((snapshot.hits, snapshot.misses), (1, 1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Editing the content purges its keys; the same GET misses again.
    let invalidator = Invalidator::new(
        Arc::clone(&state.store),
        Arc::new(FixedResolver("https://site.test/about".to_string())),
        Arc::clone(&state.provider),
    );
    invalidator.content_updated(Uuid::new_v4()).await;

    let response = router
        .clone()
        .oneshot(desktop_get("/about"))
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::OK);

    let snapshot = state.stats.snapshot();
    assert_eq!((snapshot.hits, snapshot.misses), (1, 2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn device_variants_cache_separately() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = state_with(dir.path(), CacheConfig::default()).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let router = app(state.clone(), Arc::clone(&calls));

    let mobile_get = || {
        Request::builder()
            .method(Method::GET)
            .uri("/about")
            .header(header::USER_AGENT, MOBILE_UA)
            .body(Body::empty())
            .expect("request should build")
    };

    router
        .clone()
        .oneshot(desktop_get("/about"))
        .await
        .expect("router should respond");
    router
        .clone()
        .oneshot(mobile_get())
        .await
        .expect("router should respond");

    // Distinct variants regenerated separately and stored separately.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(state.store.usage().await.expect("usage").entries, 2);

    // Each variant now hits its own entry.
    router
        .clone()
        .oneshot(mobile_get())
        .await
        .expect("router should respond");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(state.stats.snapshot().hits, 1);
}

#[tokio::test]
async fn bypassed_requests_never_touch_store_or_stats() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = state_with(dir.path(), CacheConfig::default()).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let router = app(state.clone(), Arc::clone(&calls));

    // POST to a cacheable path.
    let post = Request::builder()
        .method(Method::POST)
        .uri("/about")
        .body(Body::empty())
        .expect("request should build");
    let response = router.clone().oneshot(post).await.expect("router should respond");
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    // Authenticated GET to a cacheable path.
    let authed = Request::builder()
        .method(Method::GET)
        .uri("/about")
        .header(header::USER_AGENT, DESKTOP_UA)
        .extension(PageContext {
            authenticated: true,
            ..Default::default()
        })
        .body(Body::empty())
        .expect("request should build");
    router
        .clone()
        .oneshot(authed)
        .await
        .expect("router should respond");

    // Explicit opt-out.
    router
        .clone()
        .oneshot(desktop_get("/about?nocache"))
        .await
        .expect("router should respond");

    let snapshot = state.stats.snapshot();
    assert_eq!((snapshot.hits, snapshot.misses), (0, 0));
    assert_eq!(state.store.usage().await.expect("usage").entries, 0);
}

#[tokio::test]
async fn disabled_configuration_bypasses_anonymous_gets() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = CacheConfig {
        disabled: true,
        ..Default::default()
    };
    let state = state_with(dir.path(), config).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let router = app(state.clone(), Arc::clone(&calls));

    for _ in 0..2 {
        let response = router
            .clone()
            .oneshot(desktop_get("/about"))
            .await
            .expect("router should respond");
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(state.store.usage().await.expect("usage").entries, 0);
}

#[tokio::test]
async fn excluded_content_is_never_cached() {
    let dir = tempfile::tempdir().expect("tempdir");
    let excluded_id = Uuid::new_v4();
    let config = CacheConfig {
        excluded: [excluded_id].into_iter().collect(),
        ..Default::default()
    };
    let state = state_with(dir.path(), config).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let router = app(state.clone(), Arc::clone(&calls));

    let request = Request::builder()
        .method(Method::GET)
        .uri("/about")
        .header(header::USER_AGENT, DESKTOP_UA)
        .extension(PageContext {
            content_id: Some(excluded_id),
            ..Default::default()
        })
        .body(Body::empty())
        .expect("request should build");
    router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");

    assert_eq!(state.store.usage().await.expect("usage").entries, 0);
}

#[tokio::test]
async fn concurrent_misses_regenerate_once_each_but_store_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = state_with(dir.path(), CacheConfig::default()).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let entered = Arc::new(tokio::sync::Notify::new());
    let proceed = Arc::new(tokio::sync::Notify::new());

    let handler_calls = Arc::clone(&calls);
    let handler_entered = Arc::clone(&entered);
    let handler_proceed = Arc::clone(&proceed);
    let router = Router::new()
        .route(
            "/about",
            get(move || {
                let calls = Arc::clone(&handler_calls);
                let entered = Arc::clone(&handler_entered);
                let proceed = Arc::clone(&handler_proceed);
                async move {
                    // The first render parks mid-flight so a second request
                    // observably arrives while regeneration is in progress.
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        entered.notify_one();
                        proceed.notified().await;
                    }
                    "<html>about</html>"
                }
            }),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            page_cache_layer,
        ));

    let first = tokio::spawn({
        let router = router.clone();
        async move { router.oneshot(desktop_get("/about")).await }
    });

    // Wait until the first miss holds the regeneration lock.
    entered.notified().await;

    // Second miss: finds the lock held, serves live without writing.
    let second = router
        .clone()
        .oneshot(desktop_get("/about"))
        .await
        .expect("router should respond");
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(state.store.usage().await.expect("usage").entries, 0);

    proceed.notify_one();
    let first = first
        .await
        .expect("task should join")
        .expect("router should respond");
    assert_eq!(first.status(), StatusCode::OK);

    // Both regenerated, exactly one wrote.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(state.store.usage().await.expect("usage").entries, 1);
    let snapshot = state.stats.snapshot();
    assert_eq!((snapshot.hits, snapshot.misses), (0, 2));

    // And the written entry serves the next request.
    let third = router
        .clone()
        .oneshot(desktop_get("/about"))
        .await
        .expect("router should respond");
    assert_eq!(body_of(third).await, b"<html>about</html>");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn purge_all_empties_store_and_resets_stats() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = state_with(dir.path(), CacheConfig::default()).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let router = app(state.clone(), Arc::clone(&calls));

    for uri in ["/about", "/", "/about"] {
        router
            .clone()
            .oneshot(desktop_get(uri))
            .await
            .expect("router should respond");
    }

    let before = report(&state).await;
    assert_eq!(before.usage.entries, 2);
    assert_eq!((before.stats.hits, before.stats.misses), (1, 2));
    assert!(before.usage.total_bytes > 0);

    let removed = purge_all(&state).await;
    assert_eq!(removed, 2);

    let after = report(&state).await;
    assert_eq!(after.usage.entries, 0);
    assert_eq!((after.stats.hits, after.stats.misses), (0, 0));
    assert_eq!(after.stats.ratio, 0.0);
}
