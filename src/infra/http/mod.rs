mod admin;
mod middleware;
mod public;

pub use admin::{AdminState, build_admin_router};
pub use public::{HttpState, build_router};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::application::error::{ErrorReport, HttpError};
use crate::application::renderer::RenderError;
use crate::cache::StoreError;

fn store_health_response(result: Result<(), StoreError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::store_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

/// Map a renderer failure to the response served in place of the page.
pub fn render_error_to_http(source: &'static str, err: &RenderError) -> HttpError {
    match err {
        RenderError::Upstream { .. } | RenderError::Transport(_) => HttpError::from_error(
            source,
            StatusCode::BAD_GATEWAY,
            "Page could not be rendered",
            err,
        ),
        RenderError::Timeout => HttpError::from_error(
            source,
            StatusCode::GATEWAY_TIMEOUT,
            "Page rendering timed out",
            err,
        ),
        RenderError::Failed(_) => HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            err,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_errors_map_to_gateway_statuses() {
        let cases = [
            (RenderError::Upstream { status: 500 }, StatusCode::BAD_GATEWAY),
            (
                RenderError::Transport("refused".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (RenderError::Timeout, StatusCode::GATEWAY_TIMEOUT),
            (
                RenderError::failed("boom"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = render_error_to_http("test", &err).into_response();
            assert_eq!(response.status(), expected, "{err}");
            assert!(response.extensions().get::<ErrorReport>().is_some());
        }
    }

    #[test]
    fn store_health_maps_failures_to_unavailable() {
        assert_eq!(
            store_health_response(Ok(())).status(),
            StatusCode::NO_CONTENT
        );
        assert_eq!(
            store_health_response(Err(StoreError::Timeout)).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
