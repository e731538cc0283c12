//! 4.5.b — partial-refund gap: returns refunded for less than the order
//! was worth.

use chrono::Utc;
use std::collections::HashMap;

use crate::domain::{DetectionResult, Order, Return};

pub const ALGORITHM_VERSION: u32 = 1;
const CONFIDENCE: f64 = 0.85;
const REFUND_RATIO_THRESHOLD: f64 = 0.9;

pub fn detect(seller_id: &str, sync_id: &str, orders: &[Order], returns: &[Return], deadline_days: i64) -> Vec<DetectionResult> {
    let now = Utc::now();
    let orders_by_id: HashMap<&str, &Order> = orders.iter().map(|o| (o.order_id.as_str(), o)).collect();

    returns
        .iter()
        .filter_map(|ret| {
            let order = orders_by_id.get(ret.order_id.as_str())?;
            if ret.refund_amount <= 0.0 || ret.refund_amount >= REFUND_RATIO_THRESHOLD * order.total_amount {
                return None;
            }
            let value = order.total_amount - ret.refund_amount;
            Some(super::build_result(
                seller_id,
                sync_id,
                "refund_mismatch",
                value,
                &order.currency,
                CONFIDENCE,
                serde_json::json!({
                    "orderId": order.order_id,
                    "returnId": ret.return_id,
                    "orderTotal": order.total_amount,
                    "refundAmount": ret.refund_amount,
                }),
                vec![order.order_id.clone(), ret.return_id.clone()],
                now,
                deadline_days,
                ALGORITHM_VERSION,
                None,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: &str, total: f64) -> Order {
        Order {
            seller_id: "S1".to_string(),
            order_id: id.to_string(),
            order_date: Utc::now(),
            total_amount: total,
            currency: "USD".to_string(),
            status: "shipped".to_string(),
            channel: "amazon".to_string(),
            raw_payload: serde_json::json!({}),
        }
    }

    fn ret(id: &str, order_id: &str, refund: f64) -> Return {
        Return {
            seller_id: "S1".to_string(),
            return_id: id.to_string(),
            order_id: order_id.to_string(),
            refund_amount: refund,
            returned_date: Utc::now(),
            items: vec![],
            raw_payload: serde_json::json!({}),
        }
    }

    #[test]
    fn partial_refund_scenario() {
        let orders = vec![order("O1", 100.0)];
        let returns = vec![ret("R1", "O1", 50.0)];
        let results = detect("seller-1", "sync-1", &orders, &returns, 60);
        assert_eq!(results.len(), 1);
        assert!((results[0].estimated_value - 50.0).abs() < 1e-9);
        assert_eq!(results[0].severity, crate::domain::Severity::Medium);
        assert!((results[0].confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn refund_at_or_above_ninety_percent_is_not_flagged() {
        let orders = vec![order("O1", 100.0)];
        let returns = vec![ret("R1", "O1", 95.0)];
        assert!(detect("seller-1", "sync-1", &orders, &returns, 60).is_empty());
    }

    #[test]
    fn return_with_unknown_order_is_ignored() {
        let orders = vec![order("O1", 100.0)];
        let returns = vec![ret("R1", "O-unknown", 10.0)];
        assert!(detect("seller-1", "sync-1", &orders, &returns, 60).is_empty());
    }
}
