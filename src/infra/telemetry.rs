use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::{
    METRIC_CACHE_ENTRIES, METRIC_CACHE_EVENT_DROPPED, METRIC_CACHE_FILL_DISCARDED,
    METRIC_CACHE_HIT, METRIC_CACHE_MISS,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;
use super::storage::METRIC_BLOB_DELETE_UNCONFIRMED;

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

/// Register units and help text for the catalog read cache and the blob adapter.
fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT,
            Unit::Count,
            "Catalog reads answered from the TTL cache, by key family (monster_list, monster_detail, categories, types)."
        );
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "Catalog reads that went to Postgres because the key was absent, expired or undecodable."
        );
        describe_counter!(
            METRIC_CACHE_EVENT_DROPPED,
            Unit::Count,
            "Cache store/invalidate commands dropped because the trigger queue was full."
        );
        describe_counter!(
            METRIC_CACHE_FILL_DISCARDED,
            Unit::Count,
            "Read-through fills discarded because a write invalidated the key while the read was loading."
        );
        describe_gauge!(
            METRIC_CACHE_ENTRIES,
            Unit::Count,
            "Monster, list and reference payloads held after the last expiry sweep."
        );
        describe_counter!(
            METRIC_BLOB_DELETE_UNCONFIRMED,
            Unit::Count,
            "Image deletes whose object was still visible after the last HEAD check."
        );
    });
}
