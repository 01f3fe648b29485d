use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio::signal;

use bv_monitor::api::create_router;
use bv_monitor::cli::Cli;
use bv_monitor::config::Config;
use bv_monitor::error::AppError;
use bv_monitor::logging::init_logging;
use bv_monitor::metrics::AppMetrics;
use bv_monitor::monitor::MonitorService;
use bv_monitor::scheduler::{Scheduler, SharedFetcher};
use bv_monitor::services::bilibili::BilibiliClient;
use bv_monitor::store::DataStore;

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let config = Config::from_env()
        .map_err(AppError::Config)
        .unwrap_or_else(|err| {
            tracing::error!("{}", err);
            std::process::exit(1);
        })
        .apply_cli(&cli);

    tracing::info!("Service starting with config: {:?}", config);

    if let Err(err) = run(config).await {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), AppError> {
    let store = Arc::new(DataStore::open(config.data_dir.clone()).await?);
    let fetcher: SharedFetcher = Arc::new(BilibiliClient::new(
        config.api_url.clone(),
        config.fetch_timeout,
    )?);
    let metrics = Arc::new(
        AppMetrics::new().map_err(|err| AppError::Config(format!("metrics: {}", err)))?,
    );

    let scheduler = Arc::new(Scheduler::new(store.clone(), fetcher).with_metrics(metrics.clone()));
    scheduler.start_all().await?;

    let service = Arc::new(MonitorService::new(store, scheduler.clone()));
    let app = create_router(service, metrics);

    let listener = TcpListener::bind(config.listen_addr()).await?;
    tracing::info!("Listening on http://{}", config.listen_addr());

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    scheduler.shutdown().await;
    tracing::info!("Shutdown complete");
    served.map_err(AppError::from)
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", err);
        return;
    }
    tracing::info!("Shutdown signal received");
}
