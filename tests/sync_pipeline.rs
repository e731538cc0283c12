//! Exercises the full `SyncJobManager` pipeline (ingest -> detect -> score
//! -> brief) against a seeded mock marketplace and an in-memory repository,
//! and the cross-cutting invariants of the spec: sync exclusivity and
//! detection determinism across independent runs over identical input.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;

use reclaim_engine::config::Config;
use reclaim_engine::domain::{FinancialEvent, FinancialEventType, Order, Record, RecordKind};
use reclaim_engine::marketplace::mock::MockMarketplaceClient;
use reclaim_engine::marketplace::MarketplaceClient;
use reclaim_engine::repository::sqlite::SqliteRepository;
use reclaim_engine::repository::Repository;
use reclaim_engine::sync::events::SyncEventBus;
use reclaim_engine::sync::registry::SyncRegistry;
use reclaim_engine::sync::SyncJobManager;

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

fn seed_cancelled_order_with_unreversed_fee(client: &MockMarketplaceClient, seller_id: &str) {
    let order = Order {
        seller_id: seller_id.to_string(),
        order_id: "O-CANCEL".to_string(),
        order_date: Utc::now() - chrono::Duration::days(10),
        total_amount: 60.0,
        currency: "USD".to_string(),
        status: "cancelled".to_string(),
        channel: "amazon".to_string(),
        raw_payload: serde_json::json!({}),
    };
    let fee = FinancialEvent {
        seller_id: seller_id.to_string(),
        event_id: "FE-1".to_string(),
        event_type: FinancialEventType::Fee,
        amount: 18.0,
        currency: "USD".to_string(),
        order_id: Some("O-CANCEL".to_string()),
        sku: None,
        asin: None,
        posted_date: Utc::now() - chrono::Duration::days(9),
        expected_amount: None,
        dim_weight: None,
        actual_weight: None,
        raw_payload: serde_json::json!({}),
    };
    client.seed(seller_id, RecordKind::Orders, vec![Record::Order(order)]);
    client.seed(seller_id, RecordKind::FinancialEvents, vec![Record::FinancialEvent(fee)]);
}

async fn await_completion(repo: &dyn Repository, seller_id: &str) {
    for _ in 0..200 {
        if let Ok(None) = repo.read_active_sync_run(seller_id).await {
            return;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    panic!("sync run did not finish in time");
}

#[tokio::test]
async fn a_seeded_cancellation_gap_survives_the_full_pipeline_into_a_stored_detection() {
    let repo: Arc<dyn Repository> = Arc::new(SqliteRepository::open_in_memory().unwrap());
    let client = Arc::new(MockMarketplaceClient::new());
    seed_cancelled_order_with_unreversed_fee(&client, "S-E2E");
    let client: Arc<dyn MarketplaceClient> = client;
    let bus = Arc::new(SyncEventBus::new());
    let registry = Arc::new(SyncRegistry::new());
    let manager = Arc::new(SyncJobManager::new(repo.clone(), client, bus, registry, test_config()));

    let sync_id = manager.start("S-E2E").await.unwrap();
    await_completion(repo.as_ref(), "S-E2E").await;

    let results = repo.read_detection_results("S-E2E", &sync_id).await.unwrap();
    assert!(results.iter().any(|r| r.anomaly_type == "fee_cancellation_gap"));

    let runs = repo.list_sync_runs("S-E2E", 1, 0).await.unwrap();
    assert_eq!(runs[0].status, reclaim_engine::domain::SyncStatus::Completed);
}

#[tokio::test]
async fn a_second_sync_cannot_start_while_one_is_already_running_for_the_same_seller() {
    let repo: Arc<dyn Repository> = Arc::new(SqliteRepository::open_in_memory().unwrap());
    let client = Arc::new(MockMarketplaceClient::new());
    seed_cancelled_order_with_unreversed_fee(&client, "S-EXCL");
    let client: Arc<dyn MarketplaceClient> = client;
    let bus = Arc::new(SyncEventBus::new());
    let registry = Arc::new(SyncRegistry::new());
    let manager = Arc::new(SyncJobManager::new(repo.clone(), client, bus, registry, test_config()));

    let first = manager.start("S-EXCL").await;
    assert!(first.is_ok());
    let second = manager.start("S-EXCL").await;
    assert!(second.is_err());

    await_completion(repo.as_ref(), "S-EXCL").await;

    // Exclusivity only held while active; a later sync is free to start.
    let third = manager.start("S-EXCL").await;
    assert!(third.is_ok());
}

#[tokio::test]
async fn detection_is_deterministic_across_independent_runs_over_identical_input() {
    let repo_a: Arc<dyn Repository> = Arc::new(SqliteRepository::open_in_memory().unwrap());
    let client_a = Arc::new(MockMarketplaceClient::new());
    seed_cancelled_order_with_unreversed_fee(&client_a, "S-DET");
    let client_a: Arc<dyn MarketplaceClient> = client_a;
    let manager_a = Arc::new(SyncJobManager::new(
        repo_a.clone(),
        client_a,
        Arc::new(SyncEventBus::new()),
        Arc::new(SyncRegistry::new()),
        test_config(),
    ));
    let sync_a = manager_a.start("S-DET").await.unwrap();
    await_completion(repo_a.as_ref(), "S-DET").await;
    let mut results_a = repo_a.read_detection_results("S-DET", &sync_a).await.unwrap();

    let repo_b: Arc<dyn Repository> = Arc::new(SqliteRepository::open_in_memory().unwrap());
    let client_b = Arc::new(MockMarketplaceClient::new());
    seed_cancelled_order_with_unreversed_fee(&client_b, "S-DET");
    let client_b: Arc<dyn MarketplaceClient> = client_b;
    let manager_b = Arc::new(SyncJobManager::new(
        repo_b.clone(),
        client_b,
        Arc::new(SyncEventBus::new()),
        Arc::new(SyncRegistry::new()),
        test_config(),
    ));
    let sync_b = manager_b.start("S-DET").await.unwrap();
    await_completion(repo_b.as_ref(), "S-DET").await;
    let mut results_b = repo_b.read_detection_results("S-DET", &sync_b).await.unwrap();

    // Multiset equality on (anomaly_type, estimated_value, confidence),
    // ignoring emission order and the run-specific detection/sync ids.
    let mut key_a: Vec<(String, String, String)> = results_a
        .drain(..)
        .map(|r| (r.anomaly_type, format!("{:.6}", r.estimated_value), format!("{:.6}", r.confidence)))
        .collect();
    let mut key_b: Vec<(String, String, String)> = results_b
        .drain(..)
        .map(|r| (r.anomaly_type, format!("{:.6}", r.estimated_value), format!("{:.6}", r.confidence)))
        .collect();
    key_a.sort();
    key_b.sort();
    assert_eq!(key_a, key_b);
    assert!(!key_a.is_empty());
}
