//! 4.5.e — cross-entity correlation: four gap kinds over a configurable
//! lookback window, all requiring `estimated_value >= 10`.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

use crate::domain::{DetectionResult, FinancialEvent, FinancialEventType, InventoryLedgerEntry, Order, Return};

pub const ALGORITHM_VERSION: u32 = 1;
const MIN_VALUE: f64 = 10.0;
const DEFAULT_VALUE: f64 = 15.0;

fn sku_or_asin(sku: Option<&str>, asin: Option<&str>) -> Option<String> {
    sku.map(str::to_string).or_else(|| asin.map(str::to_string))
}

/// Return -> Inventory gap: a return with no positive ledger entry for the
/// same sku/asin within 7 days after the return.
pub fn return_inventory_gap(
    seller_id: &str,
    sync_id: &str,
    returns: &[Return],
    ledger: &[InventoryLedgerEntry],
    deadline_days: i64,
) -> Vec<DetectionResult> {
    let now = Utc::now();
    let mut out = Vec::new();
    for ret in returns {
        let Some(item) = ret.items.first() else { continue };
        let window_end = ret.returned_date + Duration::days(7);
        let has_match = ledger.iter().any(|l| {
            l.quantity > 0
                && sku_or_asin(Some(&l.sku), l.asin.as_deref()) == sku_or_asin(Some(&item.sku), item.asin.as_deref())
                && l.event_date >= ret.returned_date
                && l.event_date <= window_end
        });
        if has_match {
            continue;
        }
        let value = if ret.refund_amount > 0.0 { ret.refund_amount.abs() } else { DEFAULT_VALUE };
        if value < MIN_VALUE {
            continue;
        }
        out.push(super::build_result(
            seller_id,
            sync_id,
            "order_return_inventory_gap",
            value,
            "USD",
            0.80,
            serde_json::json!({"returnId": ret.return_id, "orderId": ret.order_id, "sku": item.sku}),
            vec![ret.return_id.clone()],
            now,
            deadline_days,
            ALGORITHM_VERSION,
            None,
        ));
    }
    out
}

/// Inbound -> Inventory gap: inbound receipts whose ledger confirmation
/// falls short within 5 days.
pub fn inbound_inventory_gap(
    seller_id: &str,
    sync_id: &str,
    expected_receipts: &[(String, String, i64, DateTime<Utc>, f64)], // (event_id, sku, expected_qty, event_date, unit_cost)
    ledger: &[InventoryLedgerEntry],
    deadline_days: i64,
) -> Vec<DetectionResult> {
    let now = Utc::now();
    let mut out = Vec::new();
    for (event_id, sku, expected_qty, event_date, unit_cost) in expected_receipts {
        let window_end = *event_date + Duration::days(5);
        let received: i64 = ledger
            .iter()
            .filter(|l| l.quantity > 0 && &l.sku == sku && l.event_date >= *event_date && l.event_date <= window_end)
            .map(|l| l.quantity)
            .sum();
        let gap = expected_qty - received;
        if gap < 5 {
            continue;
        }
        let value = gap as f64 * unit_cost;
        if value < MIN_VALUE {
            continue;
        }
        out.push(super::build_result(
            seller_id,
            sync_id,
            "inbound_inventory_gap",
            value,
            "USD",
            0.85,
            serde_json::json!({"eventId": event_id, "sku": sku, "expectedQty": expected_qty, "receivedQty": received}),
            vec![event_id.clone()],
            now,
            deadline_days,
            ALGORITHM_VERSION,
            None,
        ));
    }
    out
}

/// Fee -> Cancellation gap: fees charged on a cancelled order with no
/// matching fee-reversal.
pub fn fee_cancellation_gap(
    seller_id: &str,
    sync_id: &str,
    orders: &[Order],
    fee_events: &[FinancialEvent],
    deadline_days: i64,
) -> Vec<DetectionResult> {
    let now = Utc::now();
    let cancelled_order_ids: HashSet<&str> = orders.iter().filter(|o| o.status == "cancelled").map(|o| o.order_id.as_str()).collect();

    let reversed_order_ids: HashSet<&str> = fee_events
        .iter()
        .filter(|e| e.event_type == FinancialEventType::FeeReversal)
        .filter_map(|e| e.order_id.as_deref())
        .collect();

    fee_events
        .iter()
        .filter(|e| e.event_type == FinancialEventType::Fee)
        .filter_map(|e| {
            let order_id = e.order_id.as_deref()?;
            if !cancelled_order_ids.contains(order_id) || reversed_order_ids.contains(order_id) {
                return None;
            }
            let value = e.amount.abs();
            if value < MIN_VALUE {
                return None;
            }
            Some(super::build_result(
                seller_id,
                sync_id,
                "fee_cancellation_gap",
                value,
                &e.currency,
                0.90,
                serde_json::json!({"eventId": e.event_id, "orderId": order_id, "amount": e.amount}),
                vec![e.event_id.clone()],
                now,
                deadline_days,
                ALGORITHM_VERSION,
                None,
            ))
        })
        .collect()
}

/// Loss -> Reimbursement gap: a loss-class ledger event with no
/// reimbursement case created at or after the loss.
pub fn reimbursement_chain_gap(
    seller_id: &str,
    sync_id: &str,
    ledger: &[InventoryLedgerEntry],
    reimbursements: &[FinancialEvent],
    deadline_days: i64,
) -> Vec<DetectionResult> {
    let now = Utc::now();
    ledger
        .iter()
        .filter(|l| l.event_type.is_loss_class())
        .filter_map(|loss| {
            let matched = reimbursements.iter().any(|r| {
                r.event_type == FinancialEventType::Reimbursement
                    && r.posted_date >= loss.event_date
                    && (r.sku.as_deref() == Some(loss.sku.as_str()) || (r.asin.is_some() && r.asin == loss.asin))
            });
            if matched {
                return None;
            }
            let value = DEFAULT_VALUE;
            if value < MIN_VALUE {
                return None;
            }
            Some(super::build_result(
                seller_id,
                sync_id,
                "reimbursement_chain_gap",
                value,
                "USD",
                0.75,
                serde_json::json!({"eventId": loss.event_id, "sku": loss.sku}),
                vec![loss.event_id.clone()],
                now,
                deadline_days,
                ALGORITHM_VERSION,
                None,
            ))
        })
        .collect()
}

/// All four correlation gap kinds, restricted to the lookback window
/// before running each check.
#[allow(clippy::too_many_arguments)]
pub fn detect_all(
    seller_id: &str,
    sync_id: &str,
    orders: &[Order],
    returns: &[Return],
    ledger: &[InventoryLedgerEntry],
    financial_events: &[FinancialEvent],
    expected_receipts: &[(String, String, i64, DateTime<Utc>, f64)],
    lookback_days: i64,
    deadline_days: i64,
) -> Vec<DetectionResult> {
    let cutoff = Utc::now() - Duration::days(lookback_days);
    let returns: Vec<Return> = returns.iter().filter(|r| r.returned_date >= cutoff).cloned().collect();
    let ledger: Vec<InventoryLedgerEntry> = ledger.iter().filter(|l| l.event_date >= cutoff).cloned().collect();
    let financial_events: Vec<FinancialEvent> = financial_events.iter().filter(|e| e.posted_date >= cutoff).cloned().collect();

    let fee_reimbursement: Vec<FinancialEvent> = financial_events.clone();

    let mut out = Vec::new();
    out.extend(return_inventory_gap(seller_id, sync_id, &returns, &ledger, deadline_days));
    out.extend(inbound_inventory_gap(seller_id, sync_id, expected_receipts, &ledger, deadline_days));
    out.extend(fee_cancellation_gap(seller_id, sync_id, orders, &financial_events, deadline_days));
    out.extend(reimbursement_chain_gap(seller_id, sync_id, &ledger, &fee_reimbursement, deadline_days));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ReturnItem;

    #[test]
    fn return_without_inventory_confirmation_is_flagged() {
        let ret = Return {
            seller_id: "S1".to_string(),
            return_id: "R1".to_string(),
            order_id: "O1".to_string(),
            refund_amount: 20.0,
            returned_date: "2024-06-01T00:00:00Z".parse().unwrap(),
            items: vec![ReturnItem { sku: "ABC".to_string(), asin: None, qty: 1 }],
            raw_payload: serde_json::json!({}),
        };
        let results = return_inventory_gap("seller-1", "sync-1", &[ret], &[], 60);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].anomaly_type, "order_return_inventory_gap");
        assert!((results[0].confidence - 0.80).abs() < 1e-9);
    }

    #[test]
    fn fee_on_cancelled_order_without_reversal_is_flagged() {
        let order = Order {
            seller_id: "S1".to_string(),
            order_id: "O9".to_string(),
            order_date: Utc::now(),
            total_amount: 50.0,
            currency: "USD".to_string(),
            status: "cancelled".to_string(),
            channel: "amazon".to_string(),
            raw_payload: serde_json::json!({}),
        };
        let fee = FinancialEvent {
            seller_id: "S1".to_string(),
            event_id: "F1".to_string(),
            event_type: FinancialEventType::Fee,
            amount: 12.0,
            currency: "USD".to_string(),
            order_id: Some("O9".to_string()),
            sku: None,
            asin: None,
            posted_date: Utc::now(),
            expected_amount: None,
            dim_weight: None,
            actual_weight: None,
            raw_payload: serde_json::json!({}),
        };
        let results = fee_cancellation_gap("seller-1", "sync-1", &[order], &[fee], 60);
        assert_eq!(results.len(), 1);
        assert!((results[0].estimated_value - 12.0).abs() < 1e-9);
        assert!((results[0].confidence - 0.90).abs() < 1e-9);
    }

    #[test]
    fn fee_with_reversal_is_not_flagged() {
        let order = Order {
            seller_id: "S1".to_string(),
            order_id: "O9".to_string(),
            order_date: Utc::now(),
            total_amount: 50.0,
            currency: "USD".to_string(),
            status: "cancelled".to_string(),
            channel: "amazon".to_string(),
            raw_payload: serde_json::json!({}),
        };
        let fee = FinancialEvent {
            seller_id: "S1".to_string(),
            event_id: "F1".to_string(),
            event_type: FinancialEventType::Fee,
            amount: 12.0,
            currency: "USD".to_string(),
            order_id: Some("O9".to_string()),
            sku: None,
            asin: None,
            posted_date: Utc::now(),
            expected_amount: None,
            dim_weight: None,
            actual_weight: None,
            raw_payload: serde_json::json!({}),
        };
        let reversal = FinancialEvent { event_type: FinancialEventType::FeeReversal, event_id: "F2".to_string(), ..fee.clone() };
        assert!(fee_cancellation_gap("seller-1", "sync-1", &[order], &[fee, reversal], 60).is_empty());
    }
}
