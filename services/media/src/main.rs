use anyhow::{Context, Result};
use media_service::config::Config;
use media_service::notifications::{build_sender, NotificationDispatcher};
use media_service::{start_api_server, AppState, ImageProcessor, SupabaseStorage};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tradebidz_pipeline::{RedisStreamSource, StreamConsumer};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting TradeBidz Media Service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize components
    let storage = Arc::new(
        SupabaseStorage::new(&config.storage).context("Failed to initialize storage client")?,
    );
    let sender = build_sender(&config.email).context("Failed to initialize email sender")?;
    let dispatcher = Arc::new(NotificationDispatcher::new(
        sender,
        config.email.send_timeout(),
    ));

    // Connects on first use inside the consumer task, so the upload API
    // starts even while Redis is unreachable
    let source = RedisStreamSource::new(&config.queue)
        .context("Invalid notification stream configuration")?;
    let consumer = Arc::new(StreamConsumer::new(source, config.queue.clone()));

    // Create API state
    let api_state = AppState {
        storage,
        processor: Arc::new(ImageProcessor::new(&config.image)),
    };

    // Spawn notification consumer task
    let worker = consumer.clone();
    let consumer_handle = tokio::spawn(async move {
        if let Err(e) = worker.run(dispatcher).await {
            error!(error = %e, "Notification consumer error");
        }
    });

    // Spawn API server task; it drains once the consumer is told to stop
    let mut api_shutdown = consumer.shutdown_receiver();
    let api_config = config.api.clone();
    let image_config = config.image.clone();
    let api_handle = tokio::spawn(async move {
        let shutdown = async move {
            let _ = api_shutdown.wait_for(|stop| *stop).await;
        };
        if let Err(e) = start_api_server(api_state, &api_config, &image_config, shutdown).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Media service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down media service");

    consumer.shutdown();
    let _ = tokio::join!(consumer_handle, api_handle);

    info!(stats = ?consumer.stats(), "Media service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
