//! Page renderer collaborator.
//!
//! Rendering is opaque to the cache: it receives a path plus render-time
//! options and returns markup, or fails.

use async_trait::async_trait;
use thiserror::Error;

/// Input handed to a [`PageRenderer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    /// Original request path, before key normalization.
    pub path: String,
    /// Base href the renderer should emit instead of its own default.
    pub base_href: Option<String>,
}

impl RenderRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            base_href: None,
        }
    }

    pub fn with_base_href(mut self, base_href: Option<String>) -> Self {
        self.base_href = base_href.filter(|value| !value.trim().is_empty());
        self
    }
}

/// Rendering failure.
///
/// `Clone` so a single render outcome can be handed to every request waiting
/// on the same key.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("renderer responded with status {status}")]
    Upstream { status: u16 },
    #[error("renderer unreachable: {0}")]
    Transport(String),
    #[error("renderer timed out")]
    Timeout,
    #[error("render failed: {0}")]
    Failed(String),
}

impl RenderError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<String, RenderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_base_href_is_dropped() {
        let request = RenderRequest::new("/foo").with_base_href(Some("   ".to_string()));
        assert!(request.base_href.is_none());

        let request = RenderRequest::new("/foo").with_base_href(Some("/app/".to_string()));
        assert_eq!(request.base_href.as_deref(), Some("/app/"));
    }
}
