use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::{
    METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_CACHE_READ_ERROR, METRIC_CACHE_WRITE_ERROR,
    METRIC_DEFERRED_IN_FLIGHT, METRIC_DEFERRED_REFRESH_FAILED, METRIC_DEFERRED_REFRESH_MS,
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
            METRIC_CACHE_HIT,
            Unit::Count,
            "Total number of reads served from the KV cache."
        );
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "Total number of reads that found no cache entry."
        );
        describe_counter!(
            METRIC_CACHE_READ_ERROR,
            Unit::Count,
            "Total number of cache reads that failed and were treated as misses."
        );
        describe_counter!(
            METRIC_CACHE_WRITE_ERROR,
            Unit::Count,
            "Total number of cache writes or removals that failed."
        );
        describe_histogram!(
            METRIC_DEFERRED_REFRESH_MS,
            Unit::Milliseconds,
            "Duration of change-event refreshes in milliseconds."
        );
        describe_counter!(
            METRIC_DEFERRED_REFRESH_FAILED,
            Unit::Count,
            "Total number of change-event refreshes that did not complete."
        );
        describe_gauge!(
            METRIC_DEFERRED_IN_FLIGHT,
            Unit::Count,
            "Current number of deferred cache tasks still running."
        );
    });
}
