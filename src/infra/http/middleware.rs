//! Request correlation and failure logging shared by both listeners.

use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
const MAX_REQUEST_ID_LEN: usize = 128;

/// Correlation id for one request; echoed back in `x-request-id`.
#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

/// Adopt the caller's `x-request-id` when it is usable, otherwise mint one.
pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let ctx = RequestContext { request_id };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response.extensions_mut().insert(ctx);
    response
}

/// Log 4xx/5xx responses with the attached [`ErrorReport`], if any.
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let line = RequestLine {
        method,
        path,
        request_id,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    let failure = Failure::from_report(response.extensions_mut().remove::<ErrorReport>());
    log_failure(status, &line, &failure);
    response
}

struct RequestLine {
    method: String,
    path: String,
    request_id: String,
    elapsed_ms: u64,
}

struct Failure {
    source: &'static str,
    messages: Vec<String>,
}

impl Failure {
    fn from_report(report: Option<ErrorReport>) -> Self {
        match report {
            Some(report) => Self {
                source: report.source,
                messages: report.messages,
            },
            None => Self {
                source: "unknown",
                messages: Vec::new(),
            },
        }
    }

    fn detail(&self) -> &str {
        self.messages
            .first()
            .map(String::as_str)
            .unwrap_or("no diagnostic available")
    }
}

fn log_failure(status: StatusCode, line: &RequestLine, failure: &Failure) {
    if status.is_server_error() {
        error!(
            target: "rendercache::http::response",
            status = status.as_u16(),
            method = %line.method,
            path = %line.path,
            elapsed_ms = line.elapsed_ms,
            source = failure.source,
            detail = %failure.detail(),
            chain = ?failure.messages,
            request_id = %line.request_id,
            "request failed"
        );
    } else {
        warn!(
            target: "rendercache::http::response",
            status = status.as_u16(),
            method = %line.method,
            path = %line.path,
            elapsed_ms = line.elapsed_ms,
            source = failure.source,
            detail = %failure.detail(),
            request_id = %line.request_id,
            "client request error"
        );
    }
}
