//! End-to-end scenarios from the spec's concrete-input/expected-output
//! list, run through the full ingest -> read -> detect pipeline against a
//! real (in-memory) repository rather than calling detector functions
//! directly.

use chrono::{Duration, Utc};

use reclaim_engine::detection::correlation;
use reclaim_engine::domain::{FinancialEvent, FinancialEventType, InventoryLedgerEntry, LedgerEventType, Order, Record, RecordKind, Return, ReturnItem};
use reclaim_engine::repository::sqlite::SqliteRepository;
use reclaim_engine::repository::{Repository, TimeWindow};

fn window(days: i64) -> TimeWindow {
    let end = Utc::now();
    TimeWindow { start: end - Duration::days(days), end }
}

#[tokio::test]
async fn return_without_inventory_confirmation_is_detected_after_a_round_trip_through_storage() {
    let repo = SqliteRepository::open_in_memory().unwrap();
    let returned_date = Utc::now() - Duration::days(3);
    let ret = Return {
        seller_id: "S1".to_string(),
        return_id: "R1".to_string(),
        order_id: "O1".to_string(),
        refund_amount: 20.0,
        returned_date,
        items: vec![ReturnItem { sku: "ABC".to_string(), asin: None, qty: 1 }],
        raw_payload: serde_json::json!({}),
    };
    repo.upsert(RecordKind::Returns, vec![Record::Return(ret)]).await.unwrap();

    let returns = repo.read_range("S1", RecordKind::Returns, window(30)).await.unwrap();
    let returns: Vec<Return> = returns
        .into_iter()
        .filter_map(|r| match r {
            Record::Return(r) => Some(r),
            _ => None,
        })
        .collect();

    let results = correlation::return_inventory_gap("S1", "sync-1", &returns, &[], 60);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].anomaly_type, "order_return_inventory_gap");
    assert!((results[0].confidence - 0.80).abs() < 1e-9);
}

#[tokio::test]
async fn return_with_a_matching_ledger_receipt_is_not_flagged() {
    let repo = SqliteRepository::open_in_memory().unwrap();
    let returned_date = Utc::now() - Duration::days(3);
    let ret = Return {
        seller_id: "S1".to_string(),
        return_id: "R1".to_string(),
        order_id: "O1".to_string(),
        refund_amount: 20.0,
        returned_date,
        items: vec![ReturnItem { sku: "ABC".to_string(), asin: None, qty: 1 }],
        raw_payload: serde_json::json!({}),
    };
    let ledger_entry = InventoryLedgerEntry {
        seller_id: "S1".to_string(),
        event_id: "L1".to_string(),
        sku: "ABC".to_string(),
        fnsku: None,
        asin: None,
        event_date: returned_date + Duration::days(2),
        event_type: LedgerEventType::Receipt,
        quantity: 1,
        raw_payload: serde_json::json!({}),
    };
    repo.upsert(RecordKind::Returns, vec![Record::Return(ret)]).await.unwrap();
    repo.upsert(RecordKind::InventoryLedger, vec![Record::InventoryLedgerEntry(ledger_entry)]).await.unwrap();

    let returns: Vec<Return> = repo
        .read_range("S1", RecordKind::Returns, window(30))
        .await
        .unwrap()
        .into_iter()
        .filter_map(|r| match r {
            Record::Return(r) => Some(r),
            _ => None,
        })
        .collect();
    let ledger: Vec<InventoryLedgerEntry> = repo
        .read_range("S1", RecordKind::InventoryLedger, window(30))
        .await
        .unwrap()
        .into_iter()
        .filter_map(|r| match r {
            Record::InventoryLedgerEntry(l) => Some(l),
            _ => None,
        })
        .collect();

    assert!(correlation::return_inventory_gap("S1", "sync-1", &returns, &ledger, 60).is_empty());
}

#[tokio::test]
async fn fee_charged_on_a_cancelled_order_with_no_reversal_is_detected() {
    let repo = SqliteRepository::open_in_memory().unwrap();
    let order = Order {
        seller_id: "S1".to_string(),
        order_id: "O9".to_string(),
        order_date: Utc::now() - Duration::days(10),
        total_amount: 80.0,
        currency: "USD".to_string(),
        status: "cancelled".to_string(),
        channel: "amazon".to_string(),
        raw_payload: serde_json::json!({}),
    };
    let fee = FinancialEvent {
        seller_id: "S1".to_string(),
        event_id: "F1".to_string(),
        event_type: FinancialEventType::Fee,
        amount: 14.0,
        currency: "USD".to_string(),
        order_id: Some("O9".to_string()),
        sku: None,
        asin: None,
        posted_date: Utc::now() - Duration::days(9),
        expected_amount: None,
        dim_weight: None,
        actual_weight: None,
        raw_payload: serde_json::json!({}),
    };
    repo.upsert(RecordKind::Orders, vec![Record::Order(order)]).await.unwrap();
    repo.upsert(RecordKind::FinancialEvents, vec![Record::FinancialEvent(fee)]).await.unwrap();

    let orders: Vec<Order> = repo
        .read_range("S1", RecordKind::Orders, window(30))
        .await
        .unwrap()
        .into_iter()
        .filter_map(|r| match r {
            Record::Order(o) => Some(o),
            _ => None,
        })
        .collect();
    let financial_events: Vec<FinancialEvent> = repo
        .read_range("S1", RecordKind::FinancialEvents, window(30))
        .await
        .unwrap()
        .into_iter()
        .filter_map(|r| match r {
            Record::FinancialEvent(f) => Some(f),
            _ => None,
        })
        .collect();

    let results = correlation::fee_cancellation_gap("S1", "sync-1", &orders, &financial_events, 60);
    assert_eq!(results.len(), 1);
    assert!((results[0].estimated_value - 14.0).abs() < 1e-9);
}
