use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::metric_keys::{
    METRIC_DURABLE_HIT_TOTAL, METRIC_INVALIDATED_TOTAL, METRIC_MISS_TOTAL,
    METRIC_RENDER_MS, METRIC_RENDER_SHARED_TOTAL, METRIC_RENDER_TOTAL,
    METRIC_STORE_ERROR_TOTAL, METRIC_VOLATILE_HIT_TOTAL,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_VOLATILE_HIT_TOTAL,
            Unit::Count,
            "Lookups answered by the in-process tier."
        );
        describe_counter!(
            METRIC_DURABLE_HIT_TOTAL,
            Unit::Count,
            "Lookups answered by the durable tier after a volatile miss."
        );
        describe_counter!(
            METRIC_MISS_TOTAL,
            Unit::Count,
            "Lookups that missed both tiers."
        );
        describe_counter!(
            METRIC_RENDER_TOTAL,
            Unit::Count,
            "Renderer invocations."
        );
        describe_counter!(
            METRIC_RENDER_SHARED_TOTAL,
            Unit::Count,
            "Requests served from another request's in-flight render."
        );
        describe_histogram!(
            METRIC_RENDER_MS,
            Unit::Milliseconds,
            "Renderer latency in milliseconds."
        );
        describe_counter!(
            METRIC_STORE_ERROR_TOTAL,
            Unit::Count,
            "Durable store failures, labelled by operation."
        );
        describe_counter!(
            METRIC_INVALIDATED_TOTAL,
            Unit::Count,
            "Keys targeted by explicit invalidation, present or not."
        );
    });
}
