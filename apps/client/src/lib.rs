//! On-device side of lass: the local entry store, sync with the server, and
//! review sessions.

pub mod config;
pub mod db;
pub mod review;
pub mod state;
pub mod sync;

use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::{MetaRepository, SqliteRepository, WordBookRepository};
use crate::state::{new_store, with_store};
use crate::sync::{HttpSyncApi, SyncOrchestrator};

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening local store...");
    let store = new_store(SqliteRepository::open(&config.db_path)?);

    let api = HttpSyncApi::new(&config.server_url, config.session_token.clone());
    if !api.check_connectivity().await.unwrap_or(false) {
        tracing::warn!(url = %config.server_url, "Sync server not reachable");
    }
    if config.session_token.is_none() {
        tracing::info!("No session token configured, word book sync disabled");
    }

    let orchestrator = SyncOrchestrator::new(api, store.clone());

    if let Some(dir) = &config.snapshot_dir {
        match orchestrator.bootstrap(dir).await {
            Ok(loaded) => tracing::info!(tables = loaded.len(), "Snapshot loaded"),
            Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "Snapshot load failed"),
        }
    }

    if config.auto_sync {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = orchestrator.clone();
        let handle = tokio::spawn(async move { runner.run_auto_sync(shutdown_rx).await });

        tracing::info!("Auto sync running, press Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;
        orchestrator.cancel();
        shutdown_tx.send(true).ok();
        handle.await?;
    } else {
        let mut failed = 0;
        for (table, result) in orchestrator.sync_all().await {
            if let Err(e) = result {
                tracing::error!(%table, error = %e, "Sync failed");
                failed += 1;
            }
        }
        if failed > 0 {
            anyhow::bail!("{failed} table(s) failed to sync");
        }
    }

    for watermark in with_store(&store, |repo| repo.watermarks())? {
        tracing::info!(table = %watermark.table_name, version = watermark.version, "Watermark");
    }
    let entries = with_store(&store, |repo| repo.all_entries())?;
    tracing::info!(entries = entries.len(), "Word book ready");
    Ok(())
}
