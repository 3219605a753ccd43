//! `orderd`: hosts the order lifecycle core against PostgreSQL and Redis.

use app::{Config, build_order_core, connect, telemetry};
use tokio::signal;

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    telemetry::init_tracing(&config).expect("Failed to initialize tracing");
    telemetry::install_metrics(config.metrics_addr).expect("Failed to install Prometheus recorder");

    tracing::info!(
        metrics_addr = %config.metrics_addr,
        cache_ttl_secs = config.cache_ttl.as_secs(),
        "starting orderd"
    );

    let adapters = connect(&config)
        .await
        .expect("Failed to connect to external services");
    let pool = adapters.store.pool().clone();

    let core = build_order_core(
        adapters.store.clone(),
        adapters.cache,
        adapters.store,
        config.cache_ttl,
    );
    tracing::info!(
        routes = core.publisher().subscriptions().route_count(),
        "order core ready"
    );

    shutdown_signal().await;

    drop(core);
    pool.close().await;
    tracing::info!("shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
