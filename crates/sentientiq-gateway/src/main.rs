//! SentientIQ gateway binary

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sentientiq_gateway::{
    router, tasks, AppState, GatewayConfig, InMemoryGateway, PersistenceGateway, PersistenceWriter,
    RestGateway,
};
use sentientiq_intervention::RuleCatalog;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sentientiq=info,tower_http=info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = GatewayConfig::load()?;
    init_tracing(config.log_json);

    info!("Starting SentientIQ gateway v{}", sentientiq_common::VERSION);

    let catalog = match &config.rules_path {
        Some(path) => RuleCatalog::from_file(path).with_context(|| format!("loading rules from {path}"))?,
        None => RuleCatalog::with_defaults(),
    };
    info!(rules = catalog.len(), "Rule catalog ready");

    let gateway: Arc<dyn PersistenceGateway> = match &config.persistence.url {
        Some(url) => {
            info!(url = %url, "Using REST persistence gateway");
            Arc::new(RestGateway::new(url.clone(), config.persistence.api_key.clone()))
        }
        None => {
            warn!("No persistence URL configured, records are kept in memory");
            Arc::new(InMemoryGateway::new())
        }
    };
    let (writer, writer_handle) = PersistenceWriter::spawn(gateway.clone(), config.persistence.queue_capacity);

    let state = AppState::new(config.clone(), catalog, writer);
    state.pipeline.hydrate_memory(gateway.as_ref()).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let background = tasks::spawn_background(
        state.pipeline.clone(),
        config.tasks.sweep_interval(),
        config.tasks.evi_interval(),
        shutdown_rx,
    );

    let app = router(state);
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("SentientIQ gateway listening on {}", addr);

    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    for handle in background {
        let _ = handle.await;
    }
    // the router (and every writer handle) is gone; flush what is queued
    if tokio::time::timeout(Duration::from_secs(5), writer_handle).await.is_err() {
        warn!("Persistence queue not drained before shutdown");
    }

    info!("SentientIQ gateway stopped");
    Ok(())
}
