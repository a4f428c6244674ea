//! Upstream HTTP render service client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::debug;

use crate::application::renderer::{PageRenderer, RenderError, RenderRequest};

use super::error::InfraError;

pub const BASE_HREF_HEADER: &str = "X-Base-Href";

/// Renders a page by issuing `GET {upstream}{path}` against the render service.
#[derive(Clone, Debug)]
pub struct UpstreamRenderer {
    client: Client,
    base: Url,
}

impl UpstreamRenderer {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(concat!("rendercache/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;
        Ok(Self { client, base })
    }

    /// Target URL for `path`. The upstream base path is kept as a prefix.
    pub fn target(&self, path: &str) -> Result<Url, RenderError> {
        let base = self.base.as_str().trim_end_matches('/');
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        Url::parse(&format!("{base}{path}"))
            .map_err(|err| RenderError::failed(format!("invalid render target: {err}")))
    }
}

#[async_trait]
impl PageRenderer for UpstreamRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<String, RenderError> {
        let url = self.target(&request.path)?;
        debug!(url = %url, "requesting upstream render");

        let mut builder = self.client.get(url);
        if let Some(href) = request.base_href.as_deref() {
            builder = builder.header(BASE_HREF_HEADER, href);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            return Err(RenderError::Upstream {
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(classify)
    }
}

fn classify(err: reqwest::Error) -> RenderError {
    if err.is_timeout() {
        RenderError::Timeout
    } else {
        RenderError::Transport(err.to_string())
    }
}
