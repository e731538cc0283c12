//! 4.8 — Sync Job Manager: the top-level state machine wiring Ingestion,
//! the Detection Engine, the Certainty Scorer, and the Brief Generator
//! into one seller-scoped run. `idle -> pending -> running -> {completed,
//! failed, cancelled}`, with cooperative cancellation checked at stage
//! boundaries.

pub mod events;
pub mod registry;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::brief;
use crate::config::Config;
use crate::detection::{correlation, fee_drift, fee_overcharge, inbound_gap, micro_leak, refund_gap};
use crate::domain::{Counts, DetectionResult, FinancialEvent, InventoryLedgerEntry, Order, Record, RecordKind, Return, Settlement, Shipment, SyncRun, SyncStatus};
use crate::error::SyncError;
use crate::ingestion;
use crate::marketplace::MarketplaceClient;
use crate::repository::{Repository, TimeWindow};
use crate::scoring;
use crate::sync::events::{SyncEvent, SyncEventBus};
use crate::sync::registry::SyncRegistry;

/// How far back ingestion and detection look, in days. Generous enough to
/// cover the widest detector window (correlation's 90-day lookback) with
/// margin for fee-drift's 45-day minimum history plus its 30/30-day
/// baseline/current split.
const DATA_WINDOW_DAYS: i64 = 120;

pub struct SyncJobManager {
    repo: Arc<dyn Repository>,
    client: Arc<dyn MarketplaceClient>,
    bus: Arc<SyncEventBus>,
    registry: Arc<SyncRegistry>,
    cancellations: AsyncMutex<HashMap<String, CancellationToken>>,
    /// Bounds how many `execute` tasks run concurrently across all sellers
    /// (§5's configurable global parallelism cap), sized by
    /// `config.global_sync_concurrency`. Per-seller exclusivity is still
    /// handled separately by `registry`.
    concurrency: Arc<Semaphore>,
    config: Config,
}

impl SyncJobManager {
    pub fn new(repo: Arc<dyn Repository>, client: Arc<dyn MarketplaceClient>, bus: Arc<SyncEventBus>, registry: Arc<SyncRegistry>, config: Config) -> Self {
        let concurrency = Arc::new(Semaphore::new(config.global_sync_concurrency.max(1)));
        Self { repo, client, bus, registry, cancellations: AsyncMutex::new(HashMap::new()), concurrency, config }
    }

    pub fn bus(&self) -> Arc<SyncEventBus> {
        self.bus.clone()
    }

    /// `start(sellerId)`: requires no existing pending/running run for the
    /// seller; inserts a pending `SyncRun`, spawns the executor, and
    /// returns the new `syncId` immediately.
    pub async fn start(self: &Arc<Self>, seller_id: &str) -> Result<String, SyncError> {
        if self.repo.read_active_sync_run(seller_id).await.map_err(|e| SyncError::Internal(e.to_string()))?.is_some() {
            return Err(SyncError::AlreadyRunning);
        }

        let sync_id = Uuid::new_v4().to_string();
        if !self.registry.try_start(seller_id, &sync_id).await {
            return Err(SyncError::AlreadyRunning);
        }

        let run = SyncRun {
            sync_id: sync_id.clone(),
            seller_id: seller_id.to_string(),
            status: SyncStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            counts: Counts::default(),
            error: None,
            cancel_requested: false,
        };
        if let Err(e) = self.repo.create_sync_run(&run).await {
            self.registry.finish(seller_id).await;
            return Err(SyncError::Internal(e.to_string()));
        }

        let token = CancellationToken::new();
        self.cancellations.lock().await.insert(sync_id.clone(), token.clone());

        let manager = self.clone();
        let seller_id = seller_id.to_string();
        let sync_id_for_task = sync_id.clone();
        let concurrency = self.concurrency.clone();
        tokio::spawn(async move {
            // Queues here rather than in `start` itself, so `start` still
            // returns the syncId immediately even when every permit is taken.
            let _permit = concurrency.acquire_owned().await.expect("semaphore is never closed");
            manager.execute(&seller_id, &sync_id_for_task, token).await;
        });

        Ok(sync_id)
    }

    /// `cancel(syncId)`: cooperative; the executor observes the token
    /// between stages and transitions to `cancelled` rather than being
    /// forcibly torn down mid-upsert.
    pub async fn cancel(&self, sync_id: &str) -> bool {
        if let Some(token) = self.cancellations.lock().await.get(sync_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    async fn execute(self: Arc<Self>, seller_id: &str, sync_id: &str, token: CancellationToken) {
        let hard_cap = std::time::Duration::from_secs(self.config.sync_hard_cap_hours * 3600);
        let outcome = tokio::time::timeout(hard_cap, self.run_stages(seller_id, sync_id, token.clone())).await;

        match outcome {
            Ok(Ok(counts)) => self.finish_completed(seller_id, sync_id, counts).await,
            Ok(Err(SyncError::Cancelled)) => self.finish_cancelled(seller_id, sync_id).await,
            Ok(Err(e)) => self.finish_failed(seller_id, sync_id, &e.to_string()).await,
            Err(_) => self.finish_failed(seller_id, sync_id, &SyncError::DeadlineExceeded.to_string()).await,
        }

        self.cancellations.lock().await.remove(sync_id);
        self.registry.finish(seller_id).await;
    }

    async fn run_stages(&self, seller_id: &str, sync_id: &str, token: CancellationToken) -> Result<Counts, SyncError> {
        self.transition(seller_id, sync_id, SyncStatus::Running, None, None).await?;
        self.bus.publish(SyncEvent::started(sync_id, seller_id, events::EventKind::Sync));

        let window_end = Utc::now();
        let window_start = window_end - Duration::days(DATA_WINDOW_DAYS);

        let ingestion_outcome = ingestion::ingest(
            self.repo.as_ref(),
            self.client.as_ref(),
            &self.bus,
            seller_id,
            sync_id,
            window_start,
            window_end,
            self.config.upsert_batch_size,
            self.config.market_page_retries,
            &token,
        )
        .await
        .map_err(|e| SyncError::Internal(e.to_string()))?;

        if !ingestion_outcome.kind_failures.is_empty() {
            warn!(seller_id, sync_id, failures = ?ingestion_outcome.kind_failures, "ingestion completed with partial kind failures");
        }

        if self.check_cancelled(seller_id, sync_id, &token).await {
            return Err(SyncError::Cancelled);
        }

        let window = TimeWindow { start: window_start, end: window_end };
        let detections = self.run_detection(seller_id, sync_id, window).await?;

        if self.check_cancelled(seller_id, sync_id, &token).await {
            return Err(SyncError::Cancelled);
        }

        self.bus.publish(SyncEvent::progress(
            sync_id,
            seller_id,
            "detection",
            serde_json::json!({"count": detections.len()}),
        ));

        if !detections.is_empty() {
            self.repo.insert_detection_results(detections.clone()).await.map_err(|e| SyncError::Internal(e.to_string()))?;
        }

        for detection in &detections {
            if self.check_cancelled(seller_id, sync_id, &token).await {
                return Err(SyncError::Cancelled);
            }
            self.score_and_brief(seller_id, sync_id, detection);
        }

        Ok(ingestion_outcome.counts)
    }

    async fn run_detection(&self, seller_id: &str, sync_id: &str, window: TimeWindow) -> Result<Vec<DetectionResult>, SyncError> {
        let orders = self.read_kind::<Order>(seller_id, RecordKind::Orders, window, |r| match r {
            Record::Order(o) => Some(o),
            _ => None,
        }).await?;
        let shipments = self.read_kind::<Shipment>(seller_id, RecordKind::Shipments, window, |r| match r {
            Record::Shipment(s) => Some(s),
            _ => None,
        }).await?;
        let returns = self.read_kind::<Return>(seller_id, RecordKind::Returns, window, |r| match r {
            Record::Return(r) => Some(r),
            _ => None,
        }).await?;
        let settlements = self.read_kind::<Settlement>(seller_id, RecordKind::Settlements, window, |r| match r {
            Record::Settlement(s) => Some(s),
            _ => None,
        }).await?;
        let ledger = self.read_kind::<InventoryLedgerEntry>(seller_id, RecordKind::InventoryLedger, window, |r| match r {
            Record::InventoryLedgerEntry(l) => Some(l),
            _ => None,
        }).await?;
        let financial_events = self.read_kind::<FinancialEvent>(seller_id, RecordKind::FinancialEvents, window, |r| match r {
            Record::FinancialEvent(f) => Some(f),
            _ => None,
        }).await?;

        let expected_receipts: Vec<(String, String, i64, DateTime<Utc>, f64)> = shipments
            .iter()
            .map(|s| {
                let sku = s.items.first().map(|i| i.sku.clone()).unwrap_or_default();
                (s.shipment_id.clone(), sku, s.expected_qty, s.event_date, s.unit_cost_estimate())
            })
            .collect();

        let mut out = Vec::new();
        out.extend(inbound_gap::detect(seller_id, sync_id, &shipments, self.config.deadline_days));
        out.extend(refund_gap::detect(seller_id, sync_id, &orders, &returns, self.config.deadline_days));
        out.extend(fee_overcharge::detect(seller_id, sync_id, &settlements, self.config.deadline_days));
        out.extend(fee_drift::detect(seller_id, sync_id, &settlements, self.config.deadline_days));
        out.extend(correlation::detect_all(
            seller_id,
            sync_id,
            &orders,
            &returns,
            &ledger,
            &financial_events,
            &expected_receipts,
            self.config.correlation_lookback_days,
            self.config.deadline_days,
        ));
        out.extend(micro_leak::detect(seller_id, sync_id, &financial_events, self.config.deadline_days));

        Ok(out)
    }

    async fn read_kind<T>(
        &self,
        seller_id: &str,
        kind: RecordKind,
        window: TimeWindow,
        extract: impl Fn(Record) -> Option<T>,
    ) -> Result<Vec<T>, SyncError> {
        let records = self.repo.read_range(seller_id, kind, window).await.map_err(|e| SyncError::Internal(e.to_string()))?;
        Ok(records.into_iter().filter_map(extract).collect())
    }

    fn score_and_brief(&self, seller_id: &str, sync_id: &str, detection: &DetectionResult) {
        let score = match scoring::score(detection) {
            Ok(s) => s,
            Err(e) => {
                error!(seller_id, sync_id, detection_id = %detection.detection_id, error = %e, "certainty scoring failed");
                return;
            }
        };
        let brief = match brief::generate(detection, &[], Utc::now()) {
            Ok(b) => b,
            Err(e) => {
                error!(seller_id, sync_id, detection_id = %detection.detection_id, error = %e, "brief generation failed");
                return;
            }
        };
        info!(
            seller_id,
            sync_id,
            detection_id = %detection.detection_id,
            probability = score.probability,
            tier = ?score.tier,
            report_id = %brief.report_id,
            "scored detection and generated brief"
        );
        self.bus.publish(SyncEvent::progress(
            sync_id,
            seller_id,
            "scoring",
            serde_json::json!({
                "detectionId": detection.detection_id,
                "probability": score.probability,
                "tier": format!("{:?}", score.tier),
                "reportId": brief.report_id,
            }),
        ));
    }

    async fn check_cancelled(&self, seller_id: &str, sync_id: &str, token: &CancellationToken) -> bool {
        if !token.is_cancelled() {
            return false;
        }
        let _ = self.transition(seller_id, sync_id, SyncStatus::Cancelled, Some(Utc::now()), None).await;
        self.bus.publish(SyncEvent::cancelled(sync_id, seller_id));
        true
    }

    async fn transition(
        &self,
        seller_id: &str,
        sync_id: &str,
        status: SyncStatus,
        completed_at: Option<DateTime<Utc>>,
        counts: Option<Counts>,
    ) -> Result<(), SyncError> {
        let mut run = self.repo.read_active_sync_run(seller_id).await.map_err(|e| SyncError::Internal(e.to_string()))?.unwrap_or(SyncRun {
            sync_id: sync_id.to_string(),
            seller_id: seller_id.to_string(),
            status,
            started_at: Utc::now(),
            completed_at,
            counts: counts.clone().unwrap_or_default(),
            error: None,
            cancel_requested: false,
        });
        run.status = status;
        run.completed_at = completed_at;
        if let Some(c) = counts {
            run.counts = c;
        }
        self.repo.update_sync_run(&run).await.map_err(|e| SyncError::Internal(e.to_string()))
    }

    async fn finish_completed(&self, seller_id: &str, sync_id: &str, counts: Counts) {
        let now = Utc::now();
        if let Err(e) = self.transition(seller_id, sync_id, SyncStatus::Completed, Some(now), Some(counts.clone())).await {
            error!(seller_id, sync_id, error = %e, "failed to persist completed sync run");
        }
        self.bus.publish(SyncEvent::completed(sync_id, seller_id, serde_json::json!({"counts": counts})));
        info!(seller_id, sync_id, "sync run completed");
    }

    async fn finish_failed(&self, seller_id: &str, sync_id: &str, error: &str) {
        if let Err(e) = self.transition(seller_id, sync_id, SyncStatus::Failed, Some(Utc::now()), None).await {
            error!(seller_id, sync_id, error = %e, "failed to persist failed sync run");
        }
        self.bus.publish(SyncEvent::failed(sync_id, seller_id, error));
        error!(seller_id, sync_id, error, "sync run failed");
    }

    async fn finish_cancelled(&self, seller_id: &str, sync_id: &str) {
        info!(seller_id, sync_id, "sync run cancelled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marketplace::mock::MockMarketplaceClient;
    use crate::repository::sqlite::SqliteRepository;

    fn test_config() -> Config {
        Config {
            sync_interval_hours: 1,
            min_hours_between_syncs: 1,
            market_page_timeout_s: 30,
            market_page_retries: 1,
            upsert_batch_size: 1000,
            fee_drift_baseline_days: 30,
            fee_drift_min_history_days: 45,
            fee_drift_min_samples: 10,
            micro_leak_min_occurrences: 50,
            micro_leak_min_value: 25.0,
            correlation_lookback_days: 90,
            deadline_days: 60,
            sync_hard_cap_hours: 2,
            global_sync_concurrency: 8,
            sqlite_path: ":memory:".to_string(),
            http_bind: "127.0.0.1:0".to_string(),
            scheduler_stagger_secs: 2,
        }
    }

    #[tokio::test]
    async fn a_second_start_for_the_same_seller_is_rejected() {
        let repo: Arc<dyn Repository> = Arc::new(SqliteRepository::open_in_memory().unwrap());
        let client: Arc<dyn MarketplaceClient> = Arc::new(MockMarketplaceClient::new());
        let bus = Arc::new(SyncEventBus::new());
        let registry = Arc::new(SyncRegistry::new());
        let manager = Arc::new(SyncJobManager::new(repo, client, bus, registry, test_config()));

        let first = manager.start("S1").await;
        assert!(first.is_ok());
        let second = manager.start("S1").await;
        assert!(matches!(second, Err(SyncError::AlreadyRunning)));
    }
}
