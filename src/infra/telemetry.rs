use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::metric_names::{
    METRIC_PAGE_CACHE_BACKEND_ERROR_TOTAL, METRIC_PAGE_CACHE_EVICT_TOTAL,
    METRIC_PAGE_CACHE_HIT_TOTAL, METRIC_PAGE_CACHE_MISS_TOTAL, METRIC_PAGE_RENDER_FAILURE_TOTAL,
    METRIC_PAGE_RENDER_MS,
};
use crate::config::{LogFormat, LoggingSettings};

use super::cache_warmer::METRIC_PAGE_WARM_MS;
use super::error::InfraError;

static DESCRIBE_ONCE: Once = Once::new();

const COUNTERS: &[(&str, &str)] = &[
    (METRIC_PAGE_CACHE_HIT_TOTAL, "Page requests answered from the page cache."),
    (METRIC_PAGE_CACHE_MISS_TOTAL, "Page requests that rendered the page."),
    (METRIC_PAGE_RENDER_FAILURE_TOTAL, "Page renders that failed; nothing was cached."),
    (METRIC_PAGE_CACHE_BACKEND_ERROR_TOTAL, "Page cache backend operations that failed."),
    (METRIC_PAGE_CACHE_EVICT_TOTAL, "Cached pages evicted to stay within capacity."),
];

const HISTOGRAMS: &[(&str, &str)] = &[
    (METRIC_PAGE_RENDER_MS, "Render latency of a page cache miss."),
    (METRIC_PAGE_WARM_MS, "Duration of the startup page cache warm pass."),
];

/// Install the global tracing subscriber and describe the crate's metrics.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(ErrorLayer::default())
        .with(output_layer(logging.format))
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("tracing subscriber already set: {err}")))
}

fn output_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    match format {
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_target(true)
            .boxed(),
    }
}

fn describe_metrics() {
    DESCRIBE_ONCE.call_once(|| {
        for (name, help) in COUNTERS {
            describe_counter!(*name, Unit::Count, *help);
        }
        for (name, help) in HISTOGRAMS {
            describe_histogram!(*name, Unit::Milliseconds, *help);
        }
    });
}
