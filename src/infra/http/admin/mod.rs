mod cache;
mod health;

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::cache::PageCache;

use super::middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct AdminState {
    pub cache: Arc<PageCache>,
}

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/cache/invalidate", post(cache::invalidate_cache))
        .route("/_health", get(health::admin_health))
        .route("/_health/store", get(health::store_health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}
