use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sensor_hub::api::{create_router, ApiState};
use sensor_hub::bridge::{spawn_delivery_worker, IngestBridge};
use sensor_hub::config::Config;
use sensor_hub::ingest::MqttIngest;
use sensor_hub::registry::ObserverRegistry;
use sensor_hub::store::{PostgresStore, ReadingStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn ReadingStore> = Arc::new(
        PostgresStore::connect(&config.store)
            .await
            .context("failed to connect to postgres")?,
    );
    let registry = Arc::new(ObserverRegistry::new());

    let shutdown = CancellationToken::new();

    let (delivery_tx, delivery_worker) = spawn_delivery_worker(registry.clone(), shutdown.clone());
    let bridge = IngestBridge::new(store.clone(), delivery_tx);

    let ingest = MqttIngest::start(config.mqtt.clone(), bridge, shutdown.clone())
        .await
        .context("failed to start mqtt ingest")?;

    let router = create_router(
        ApiState {
            store,
            registry,
        },
        &config.api.allowed_origins,
    );

    let bind_addr = config.api.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!("api listening on {bind_addr}");

    let api_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { api_shutdown.cancelled().await })
            .await
    });

    tokio::signal::ctrl_c().await.context("ctrl-c handler failed")?;
    info!("shutdown requested");

    shutdown.cancel();
    ingest.stop().await;
    delivery_worker.await.ok();
    server.await.context("api server join failed")??;

    info!("stopped");
    Ok(())
}
