use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "mosaico_cache_hit_total",
            Unit::Count,
            "Total number of cache store hits."
        );
        describe_counter!(
            "mosaico_cache_miss_total",
            Unit::Count,
            "Total number of cache store misses."
        );
        describe_counter!(
            "mosaico_cache_expired_total",
            Unit::Count,
            "Total number of cache entries evicted lazily at read."
        );
        describe_counter!(
            "mosaico_block_cache_hit_total",
            Unit::Count,
            "Total number of block cache hits."
        );
        describe_counter!(
            "mosaico_block_cache_miss_total",
            Unit::Count,
            "Total number of block cache misses, including fail-open reads."
        );
        describe_counter!(
            "mosaico_dispatch_total",
            Unit::Count,
            "Total number of dispatched requests."
        );
        describe_counter!(
            "mosaico_module_failed_total",
            Unit::Count,
            "Total number of module route steps that returned an error."
        );
        describe_counter!(
            "mosaico_module_abandoned_total",
            Unit::Count,
            "Total number of modules abandoned because their dependency gate never released."
        );
        describe_histogram!(
            "mosaico_dispatch_duration_seconds",
            Unit::Seconds,
            "End-to-end dispatch latency in seconds."
        );
    });
}
