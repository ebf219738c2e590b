use std::{env, sync::Arc};

use anyhow::{Context, Result};
use ticket_sync::{
    chains::{ethereum::EthereumReader, traits::ChainReader},
    config::Settings,
    store::{SyncStore, postgres::PgStore},
    watcher::SyncService,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_CONFIG: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG);

    let settings = Settings::load(config_path)
        .with_context(|| format!("Failed to load settings from {config_path}"))?;
    info!(
        rpc = %settings.rpc.url,
        chain_id = settings.rpc.chain_id,
        interval_secs = settings.sync.interval_secs,
        "Loaded configuration"
    );

    let store = Arc::new(
        PgStore::from_db_url(&settings.core.database_url, settings.core.max_connections)
            .await
            .context("Failed to connect to database")?,
    );
    store.ping().await.context("Database health check failed")?;
    store
        .create_tables()
        .await
        .context("Failed to create database tables")?;
    info!("Database tables created successfully");

    let reader = Arc::new(EthereumReader::new(
        &settings.rpc.url,
        settings.rpc_timeout(),
        settings.rpc.max_block_span,
    )?);
    match reader.chain_id().await {
        Ok(chain_id) if chain_id != settings.rpc.chain_id => {
            anyhow::bail!(
                "Node reports chain id {chain_id}, configured {}",
                settings.rpc.chain_id
            );
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Node unreachable at startup, sync will retry"),
    }

    let handle = SyncService::builder()
        .with_reader(reader)
        .with_store(store.clone())
        .with_contracts(settings.watched_contracts()?)
        .with_interval(settings.sync_interval())
        .with_chain_id(settings.rpc.chain_id)
        .build()?
        .start();

    shutdown_signal().await;
    info!("Shutdown requested, waiting for the current pass");
    handle.stop().await;
    store.close().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
