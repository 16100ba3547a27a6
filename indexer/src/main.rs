//! PRISM Indexer binary.
//!
//! Entry point for the settlement indexer service.

use std::sync::Arc;

use anyhow::Context;
use prism_indexer::{
    HistoryStore, InMemoryHistoryStore, IndexerConfig, IndexerService, PgHistoryStore,
    SettlementSource, StoreSettings, SupabaseHistoryStore,
};
use prism_sdk::L2Client;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PG_MAX_CONNECTIONS: u32 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,prism_indexer=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = IndexerConfig::from_env().context("invalid configuration")?;

    tracing::info!("Starting PRISM Indexer");
    tracing::info!("L2 API URL: {}", config.l2_api_url);
    tracing::info!("Poll interval: {} ms", config.poll_interval_ms);

    let store = build_store(&config).await?;
    let source: Arc<dyn SettlementSource> =
        Arc::new(L2Client::new(config.client_config()).context("invalid L2 client config")?);

    let service = Arc::new(IndexerService::new(&config, store, source));

    let mut runner = tokio::spawn(Arc::clone(&service).run());

    tokio::select! {
        result = &mut runner => {
            result.context("indexer loop terminated")?;
        }
        signal = shutdown_signal() => {
            signal?;
            tracing::info!("Shutting down indexer");
        }
    }

    // Waits for in-flight cycles to be aborted before writing `paused`.
    if let Err(e) = service.stop().await {
        tracing::warn!("Failed to mark indexer paused: {}", e);
    }
    if !runner.is_finished() {
        runner.await.context("indexer loop terminated")?;
    }

    let snapshot = service.metrics().snapshot();
    tracing::info!(
        cycles = snapshot.sync_cycles,
        events = snapshot.events_processed,
        markets = snapshot.markets_settled,
        contests = snapshot.contests_settled,
        bets = snapshot.bets_settled,
        failures = snapshot.sync_failures,
        dead_letters = snapshot.dead_letters,
        "Indexer metrics"
    );

    Ok(())
}

async fn build_store(config: &IndexerConfig) -> anyhow::Result<Arc<dyn HistoryStore>> {
    let store: Arc<dyn HistoryStore> = match config.store_settings()? {
        StoreSettings::Postgres(url) => {
            let store = PgHistoryStore::connect(&url, PG_MAX_CONNECTIONS)
                .await
                .context("failed to connect to Postgres")?;
            store.migrate().await.context("failed to run migrations")?;
            Arc::new(store)
        }
        StoreSettings::Supabase(settings) => Arc::new(
            SupabaseHistoryStore::new(settings).context("failed to build Supabase client")?,
        ),
        StoreSettings::Memory => {
            tracing::warn!("Using in-memory store; history is not persisted");
            Arc::new(InMemoryHistoryStore::new())
        }
    };

    tracing::info!("History store: {}", store.backend_name());
    Ok(store)
}

/// Resolves on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    let terminate = {
        use tokio::signal::unix::{signal, SignalKind};

        let mut stream = signal(SignalKind::terminate())?;
        async move {
            stream.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate => Ok(()),
    }
}
