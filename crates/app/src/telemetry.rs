//! Tracing and metrics installation.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{Config, LogFormat};
use crate::error::{AppError, Result};

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when both are present.
pub fn init_tracing(config: &Config) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.log_format {
        LogFormat::Plain => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };
    installed.map_err(|e| AppError::Telemetry(e.to_string()))
}

/// Installs the Prometheus recorder with its own scrape listener on `addr`.
///
/// Must be called inside a tokio runtime.
pub fn install_metrics(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| AppError::Telemetry(e.to_string()))?;

    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    metrics::describe_counter!("orders_created_total", "Orders committed by create");
    metrics::describe_counter!("orders_updated_total", "Orders committed by update");
    metrics::describe_counter!("orders_deleted_total", "Orders removed by delete");
    metrics::describe_counter!("order_cache_hits_total", "Reads served from the cache");
    metrics::describe_counter!("order_cache_misses_total", "Reads that fell through to the store");
    metrics::describe_counter!("order_cache_errors_total", "Cache operations that failed");
    metrics::describe_counter!("events_published_total", "Order events dispatched by the bus");
    metrics::describe_counter!(
        "projection_handler_failures_total",
        "Projection handler invocations that failed"
    );
    metrics::describe_histogram!(
        "projection_handler_duration_seconds",
        metrics::Unit::Seconds,
        "Projection handler run time"
    );
    metrics::describe_gauge!(domain::ORDER_LOCKS_GAUGE, "Keys held or awaited in the mutation lock table");
    metrics::describe_gauge!(projections::BUS_LOCKS_GAUGE, "Orders with a dispatch in flight");
}
