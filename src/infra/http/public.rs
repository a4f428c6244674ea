use std::sync::Arc;

use axum::{
    Router,
    extract::{OriginalUri, State},
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse, Response},
    routing::get,
};

use crate::{application::renderer::PageRenderer, cache::PageCache};

use super::{
    middleware::{log_responses, set_request_context},
    render_error_to_http,
};

#[derive(Clone)]
pub struct HttpState {
    pub cache: Arc<PageCache>,
    pub renderer: Arc<dyn PageRenderer>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/_health", get(public_health))
        .route("/", get(resolve_page))
        .route("/{*path}", get(resolve_page))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

/// Serve the page for the request path (query string included) through the cache.
async fn resolve_page(State(state): State<HttpState>, OriginalUri(uri): OriginalUri) -> Response {
    let request_path = uri
        .path_and_query()
        .map(|value| value.as_str())
        .unwrap_or_else(|| uri.path());

    match state
        .cache
        .resolve(request_path, state.renderer.as_ref())
        .await
    {
        Ok(content) => Html(content.to_string()).into_response(),
        Err(err) => render_error_to_http("infra::http::public::resolve_page", &err).into_response(),
    }
}

async fn public_health() -> Response {
    StatusCode::NO_CONTENT.into_response()
}
