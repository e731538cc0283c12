use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use reclaim_engine::config::Config;
use reclaim_engine::http::{router, AppState};
use reclaim_engine::marketplace::mock::MockMarketplaceClient;
use reclaim_engine::marketplace::MarketplaceClient;
use reclaim_engine::repository::sqlite::SqliteRepository;
use reclaim_engine::repository::Repository;
use reclaim_engine::scheduler::Scheduler;
use reclaim_engine::sync::events::SyncEventBus;
use reclaim_engine::sync::registry::SyncRegistry;
use reclaim_engine::sync::SyncJobManager;

/// Sellers this instance manages. The marketplace client in this crate is
/// a mock (live marketplace transport is out of scope); seller discovery
/// would normally come from the marketplace account directory, so for now
/// it's a configured list.
fn configured_sellers() -> Vec<String> {
    std::env::var("SELLER_IDS")
        .unwrap_or_else(|_| "demo-seller".to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let cfg = Config::from_env();
    tracing::info!(sqlite_path = %cfg.sqlite_path, http_bind = %cfg.http_bind, "starting reclaim-engine");

    let repo: Arc<dyn Repository> = Arc::new(SqliteRepository::open(&cfg.sqlite_path)?);
    let client: Arc<dyn MarketplaceClient> = Arc::new(MockMarketplaceClient::new());
    let bus = Arc::new(SyncEventBus::new());
    let registry = Arc::new(SyncRegistry::new());

    let manager = Arc::new(SyncJobManager::new(repo.clone(), client, bus, registry, cfg.clone()));

    let scheduler = Scheduler::new(
        manager.clone(),
        repo,
        configured_sellers(),
        cfg.sync_interval_hours,
        cfg.min_hours_between_syncs,
        cfg.scheduler_stagger_secs,
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let scheduler_handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    let app_state = Arc::new(AppState { manager });
    let listener = tokio::net::TcpListener::bind(&cfg.http_bind).await?;
    tracing::info!(addr = %cfg.http_bind, "http surface listening");

    tokio::select! {
        result = axum::serve(listener, router(app_state)) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "http server exited with error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = scheduler_handle.await;

    Ok(())
}
