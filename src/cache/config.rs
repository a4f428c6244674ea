//! Cache configuration.
//!
//! Controls miss coordination, durable population and pattern invalidation
//! via the `[cache]` table of `rendercache.toml`.

use std::time::Duration;

use serde::Deserialize;

use super::writer::RetryPolicy;

pub const DEFAULT_DURABLE_WRITE_ATTEMPTS: u32 = 3;
pub const DEFAULT_DURABLE_WRITE_BACKOFF_MS: u64 = 200;
pub const DEFAULT_DURABLE_WRITE_MAX_BACKOFF_MS: u64 = 5_000;
pub const DEFAULT_DURABLE_WRITE_QUEUE: usize = 1_024;

/// How freshly rendered content reaches the durable tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurableWriteMode {
    /// Await a single write attempt before responding.
    Inline,
    /// Hand the write to the background writer and respond immediately.
    Background,
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Let concurrent misses on one key share a single render.
    pub single_flight: bool,
    pub durable_write_mode: DurableWriteMode,
    /// Attempts per background write, including the first.
    pub durable_write_attempts: u32,
    pub durable_write_backoff_ms: u64,
    pub durable_write_max_backoff_ms: u64,
    /// Bounded background queue; writes beyond it are skipped.
    pub durable_write_queue: usize,
    /// Also match durable-only keys during pattern invalidation when the
    /// backend can enumerate keys.
    pub pattern_scans_durable: bool,
    /// Base href handed to the renderer on every render. Populated from the
    /// `[render]` table rather than `[cache]`.
    #[serde(skip)]
    pub base_href: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            single_flight: true,
            durable_write_mode: DurableWriteMode::Background,
            durable_write_attempts: DEFAULT_DURABLE_WRITE_ATTEMPTS,
            durable_write_backoff_ms: DEFAULT_DURABLE_WRITE_BACKOFF_MS,
            durable_write_max_backoff_ms: DEFAULT_DURABLE_WRITE_MAX_BACKOFF_MS,
            durable_write_queue: DEFAULT_DURABLE_WRITE_QUEUE,
            pattern_scans_durable: false,
            base_href: None,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            single_flight: settings.single_flight,
            durable_write_mode: settings.durable_write_mode,
            durable_write_attempts: settings.durable_write_attempts.get(),
            durable_write_backoff_ms: settings.durable_write_backoff.as_millis() as u64,
            durable_write_max_backoff_ms: settings.durable_write_max_backoff.as_millis() as u64,
            durable_write_queue: settings.durable_write_queue.get(),
            pattern_scans_durable: settings.pattern_scans_durable,
            base_href: None,
        }
    }
}

impl CacheConfig {
    /// Inline mode: one attempt, no queue.
    pub fn inline() -> Self {
        Self {
            durable_write_mode: DurableWriteMode::Inline,
            ..Self::default()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let initial_backoff = Duration::from_millis(self.durable_write_backoff_ms);
        RetryPolicy {
            attempts: self.durable_write_attempts.max(1),
            initial_backoff,
            max_backoff: Duration::from_millis(self.durable_write_max_backoff_ms)
                .max(initial_backoff),
        }
    }
}
