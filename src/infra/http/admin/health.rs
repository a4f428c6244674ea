use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::super::store_health_response;
use super::AdminState;

pub(super) async fn admin_health() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

pub(super) async fn store_health(State(state): State<AdminState>) -> Response {
    store_health_response(state.cache.durable().health_check().await)
}
