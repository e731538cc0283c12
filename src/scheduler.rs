//! 4.9 — Scheduler: periodic tick that starts a `SyncRun` for every seller
//! whose last completed run is stale and who has no active run, staggering
//! starts so a burst of due sellers doesn't all fire at once.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::domain::SyncStatus;
use crate::repository::Repository;
use crate::sync::SyncJobManager;

pub struct Scheduler {
    manager: Arc<SyncJobManager>,
    repo: Arc<dyn Repository>,
    sellers: Vec<String>,
    tick_interval: StdDuration,
    min_hours_between_syncs: i64,
    stagger: StdDuration,
}

impl Scheduler {
    pub fn new(
        manager: Arc<SyncJobManager>,
        repo: Arc<dyn Repository>,
        sellers: Vec<String>,
        sync_interval_hours: u64,
        min_hours_between_syncs: u64,
        stagger_secs: u64,
    ) -> Self {
        Self {
            manager,
            repo,
            sellers,
            tick_interval: StdDuration::from_secs(sync_interval_hours * 3600),
            min_hours_between_syncs: min_hours_between_syncs as i64,
            stagger: StdDuration::from_secs(stagger_secs),
        }
    }

    /// Runs the tick loop until `shutdown` resolves. Each tick evaluates
    /// every seller in isolation: one seller's failure to start never
    /// blocks the rest.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.tick_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler shutting down");
                        return;
                    }
                }
            }
        }
    }

    pub async fn tick(&self) {
        for seller_id in &self.sellers {
            if let Err(e) = self.maybe_start(seller_id).await {
                warn!(seller_id, error = %e, "scheduler failed to evaluate seller, continuing with others");
            }
            tokio::time::sleep(self.stagger).await;
        }
    }

    async fn maybe_start(&self, seller_id: &str) -> Result<(), anyhow::Error> {
        if self.repo.read_active_sync_run(seller_id).await?.is_some() {
            return Ok(());
        }

        let recent = self.repo.list_sync_runs(seller_id, 1, 0).await?;
        let due = match recent.first() {
            Some(run) if run.status == SyncStatus::Completed => match run.completed_at {
                Some(completed_at) => Utc::now() - completed_at >= Duration::hours(self.min_hours_between_syncs),
                None => true,
            },
            Some(_) => true,
            None => true,
        };

        if !due {
            return Ok(());
        }

        match self.manager.start(seller_id).await {
            Ok(sync_id) => {
                info!(seller_id, sync_id, "scheduler started sync run");
                Ok(())
            }
            Err(e) => {
                warn!(seller_id, error = %e, "scheduler could not start sync run");
                Ok(())
            }
        }
    }
}
