use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{application::error::ErrorReport, cache::InvalidationReport};

use super::AdminState;

const SOURCE: &str = "infra::http::admin::cache";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct InvalidateRequest {
    url: Option<String>,
    pattern: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InvalidateResponse {
    success: bool,
    invalidated: Vec<String>,
    durable_failures: usize,
}

impl From<InvalidationReport> for InvalidateResponse {
    fn from(report: InvalidationReport) -> Self {
        Self {
            success: true,
            invalidated: report.keys.into_iter().map(|key| key.into_string()).collect(),
            durable_failures: report.durable_failures,
        }
    }
}

#[derive(Debug, Serialize)]
struct InvalidateFailure {
    success: bool,
    error: String,
}

pub(super) async fn invalidate_cache(
    State(state): State<AdminState>,
    payload: Result<Json<InvalidateRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    let url = request.url.filter(|value| !value.is_empty());
    let pattern = request.pattern.filter(|value| !value.is_empty());
    if url.is_none() && pattern.is_none() {
        return bad_request("request must include a non-empty `url` or `pattern`".to_string());
    }

    let mut report = InvalidationReport::default();
    if let Some(url) = url.as_deref() {
        report = report.merge(state.cache.invalidate_key(url).await);
    }
    if let Some(pattern) = pattern.as_deref() {
        report = report.merge(state.cache.invalidate_pattern(pattern).await);
    }

    (StatusCode::OK, Json(InvalidateResponse::from(report))).into_response()
}

fn bad_request(detail: String) -> Response {
    let report = ErrorReport::from_message(SOURCE, StatusCode::BAD_REQUEST, detail.clone());
    let mut response = (
        StatusCode::BAD_REQUEST,
        Json(InvalidateFailure {
            success: false,
            error: detail,
        }),
    )
        .into_response();
    report.attach(&mut response);
    response
}
