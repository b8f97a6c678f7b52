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

/// Register descriptions for every metric the service emits. Safe to call
/// repeatedly.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "cumulus_cache_merge_items_total",
            Unit::Count,
            "Total number of entities merged into the cache."
        );
        describe_histogram!(
            "cumulus_cache_merge_ms",
            Unit::Milliseconds,
            "Latency of a single entity merge in milliseconds."
        );
        describe_counter!(
            "cumulus_cache_evict_items_total",
            Unit::Count,
            "Total number of entities evicted from the cache."
        );
        describe_counter!(
            "cumulus_cache_read_total",
            Unit::Count,
            "Total number of single-entity cache reads."
        );
        describe_counter!(
            "cumulus_cache_read_absent_total",
            Unit::Count,
            "Total number of cache reads that resolved to an absent entity."
        );
        describe_counter!(
            "cumulus_cache_fan_out_degraded_total",
            Unit::Count,
            "Total number of sources dropped from a composite read by error or deadline."
        );
        describe_counter!(
            "cumulus_agent_poll_total",
            Unit::Count,
            "Total number of scheduled agent polls by outcome."
        );
        describe_histogram!(
            "cumulus_agent_poll_ms",
            Unit::Milliseconds,
            "Agent poll and write latency in milliseconds."
        );
        describe_counter!(
            "cumulus_sync_accounts_total",
            Unit::Count,
            "Accounts seen by synchronization passes by classification."
        );
        describe_counter!(
            "cumulus_sync_agent_build_failures_total",
            Unit::Count,
            "Total number of accounts whose agents failed to build."
        );
        describe_histogram!(
            "cumulus_sync_pass_ms",
            Unit::Milliseconds,
            "Synchronization pass latency in milliseconds."
        );
    });
}
