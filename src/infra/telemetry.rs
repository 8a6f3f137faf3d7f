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

/// Register descriptions for every metric the cache emits.
///
/// Runs once per process; later calls are no-ops.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "blogcache_cache_hit_total",
            Unit::Count,
            "Total number of cache lookups answered with a stored value."
        );
        describe_counter!(
            "blogcache_cache_negative_hit_total",
            Unit::Count,
            "Total number of cache lookups answered with a remembered absence."
        );
        describe_counter!(
            "blogcache_cache_miss_total",
            Unit::Count,
            "Total number of cache lookups that found nothing."
        );
        describe_counter!(
            "blogcache_cache_degraded_total",
            Unit::Count,
            "Total number of cache operations skipped because the medium failed."
        );
        describe_counter!(
            "blogcache_cache_purged_keys_total",
            Unit::Count,
            "Total number of cache entries dropped by tag purges."
        );
        describe_counter!(
            "blogcache_store_fetch_total",
            Unit::Count,
            "Total number of batched store fetches issued by the loader."
        );
        describe_counter!(
            "blogcache_memory_evict_total",
            Unit::Count,
            "Total number of in-memory cache evictions due to capacity."
        );
        describe_histogram!(
            "blogcache_invalidate_ms",
            Unit::Milliseconds,
            "Invalidation plan latency in milliseconds."
        );
    });
}
