//! Metric names emitted by the cache.
//!
//! Descriptions are registered by `infra::telemetry`.

pub const METRIC_VOLATILE_HIT_TOTAL: &str = "rendercache_volatile_hit_total";
pub const METRIC_DURABLE_HIT_TOTAL: &str = "rendercache_durable_hit_total";
pub const METRIC_MISS_TOTAL: &str = "rendercache_miss_total";
pub const METRIC_RENDER_TOTAL: &str = "rendercache_render_total";
pub const METRIC_RENDER_SHARED_TOTAL: &str = "rendercache_render_shared_total";
pub const METRIC_RENDER_MS: &str = "rendercache_render_ms";
pub const METRIC_STORE_ERROR_TOTAL: &str = "rendercache_store_error_total";
pub const METRIC_INVALIDATED_TOTAL: &str = "rendercache_invalidated_total";
