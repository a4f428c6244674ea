mod support;

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header::CONTENT_TYPE},
};
use http_body_util::BodyExt;
use rendercache::application::renderer::{PageRenderer, RenderError};
use rendercache::cache::{CacheConfig, PageCache, normalize};
use rendercache::infra::http::{AdminState, HttpState, build_admin_router, build_router};
use serde_json::{Value, json};
use tower::ServiceExt;

use support::{CountingRenderer, InstrumentedStore, markup_for};

struct Harness {
    store: Arc<InstrumentedStore>,
    cache: Arc<PageCache>,
    renderer: Arc<CountingRenderer>,
    public: Router,
    admin: Router,
}

fn harness_with(renderer: CountingRenderer) -> Harness {
    harness_with_config(renderer, CacheConfig::inline())
}

fn harness_with_config(renderer: CountingRenderer, config: CacheConfig) -> Harness {
    let store = Arc::new(InstrumentedStore::new());
    let cache = Arc::new(PageCache::new(config, store.clone()));
    let renderer = Arc::new(renderer);
    let dyn_renderer: Arc<dyn PageRenderer> = renderer.clone();

    let public = build_router(HttpState {
        cache: cache.clone(),
        renderer: dyn_renderer,
    });
    let admin = build_admin_router(AdminState {
        cache: cache.clone(),
    });

    Harness {
        store,
        cache,
        renderer,
        public,
        admin,
    }
}

fn harness() -> Harness {
    harness_with(CountingRenderer::new())
}

async fn get(router: &Router, uri: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    (status, String::from_utf8_lossy(&body).into_owned())
}

async fn invalidate(router: &Router, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/cache/invalidate")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build");
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let json = serde_json::from_slice(&bytes).expect("json body");
    (status, json)
}

#[tokio::test]
async fn public_route_serves_rendered_page_once() {
    let h = harness();

    let (status, body) = get(&h.public, "/foo/bar").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, markup_for("/foo/bar"));

    let (status, _) = get(&h.public, "/foo/bar").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.renderer.calls(), 1);
}

#[tokio::test]
async fn public_route_keys_include_query_string() {
    let h = harness();

    let (status, body) = get(&h.public, "/search?q=rust").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, markup_for("/search?q=rust"));
    assert!(h.cache.volatile().get(&normalize("/search?q=rust")).is_some());
}

#[tokio::test]
async fn public_root_is_resolved() {
    let h = harness();

    let (status, body) = get(&h.public, "/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, markup_for("/"));
}

#[tokio::test]
async fn upstream_failure_maps_to_bad_gateway() {
    let h = harness_with(CountingRenderer::failing(RenderError::Upstream {
        status: 500,
    }));

    let (status, body) = get(&h.public, "/down").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(!body.contains("500"));
    assert!(h.cache.volatile().is_empty());
}

#[tokio::test]
async fn render_timeout_maps_to_gateway_timeout() {
    let h = harness_with(CountingRenderer::failing(RenderError::Timeout));

    let (status, _) = get(&h.public, "/slow").await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn health_routes_report_no_content() {
    let h = harness();

    assert_eq!(get(&h.public, "/_health").await.0, StatusCode::NO_CONTENT);
    assert_eq!(get(&h.admin, "/_health").await.0, StatusCode::NO_CONTENT);
    assert_eq!(
        get(&h.admin, "/_health/store").await.0,
        StatusCode::NO_CONTENT
    );
    assert_eq!(h.renderer.calls(), 0);
}

#[tokio::test]
async fn invalidate_by_url_returns_targeted_keys() {
    let h = harness();
    get(&h.public, "/foo/bar").await;

    let (status, body) = invalidate(&h.admin, r#"{"url":"/foo/bar"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "success": true, "invalidated": ["_foo_bar"], "durableFailures": 0 })
    );
    assert!(h.cache.volatile().is_empty());
}

#[tokio::test]
async fn invalidate_by_pattern_and_url_combines_reports() {
    let h = harness();
    for path in ["/a/b", "/a/c", "/x/y"] {
        get(&h.public, path).await;
    }

    let (status, body) = invalidate(&h.admin, r#"{"url":"/x/y","pattern":"_a_"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["invalidated"], json!(["_x_y", "_a_b", "_a_c"]));
    assert!(h.cache.volatile().is_empty());
}

#[tokio::test]
async fn invalidate_without_target_is_rejected() {
    let h = harness();
    get(&h.public, "/keep").await;

    for payload in [r#"{}"#, r#"{"pattern":""}"#, r#"{"url":null}"#] {
        let (status, body) = invalidate(&h.admin, payload).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "payload {payload}");
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
    }

    assert_eq!(h.cache.volatile().len(), 1);
}

#[tokio::test]
async fn invalidate_with_malformed_json_is_rejected() {
    let h = harness();

    let (status, body) = invalidate(&h.admin, "{not json").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn invalidate_with_default_config_clears_durable_tier() {
    let h = harness_with_config(CountingRenderer::new(), CacheConfig::default());
    get(&h.public, "/foo/bar").await;

    let (status, body) = invalidate(&h.admin, r#"{"url":"/foo/bar"}"#).await;
    h.cache.flush().await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["invalidated"], json!(["_foo_bar"]));
    assert!(!h.store.inner.contains(&normalize("/foo/bar")));

    get(&h.public, "/foo/bar").await;
    assert_eq!(h.renderer.calls(), 2);
}
