//! 4.5.a — inbound-shipment gap: shipments received short of what was
//! expected.

use chrono::Utc;

use crate::domain::{DetectionResult, Shipment};

pub const ALGORITHM_VERSION: u32 = 1;
const CONFIDENCE: f64 = 0.95;

pub fn detect(seller_id: &str, sync_id: &str, shipments: &[Shipment], deadline_days: i64) -> Vec<DetectionResult> {
    let now = Utc::now();
    shipments
        .iter()
        .filter(|s| s.missing_qty() > 0)
        .map(|s| {
            let value = s.missing_qty() as f64 * s.unit_cost_estimate();
            super::build_result(
                seller_id,
                sync_id,
                "missing_inbound_shipment",
                value,
                "USD",
                CONFIDENCE,
                serde_json::json!({
                    "shipmentId": s.shipment_id,
                    "expectedQty": s.expected_qty,
                    "receivedQty": s.received_qty,
                    "missingQty": s.missing_qty(),
                    "unitCostEstimate": s.unit_cost_estimate(),
                }),
                vec![s.shipment_id.clone()],
                now,
                deadline_days,
                ALGORITHM_VERSION,
                None,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ShipmentItem;

    fn shipment(expected: i64, received: i64, unit_cost: f64) -> Shipment {
        Shipment {
            seller_id: "S1".to_string(),
            shipment_id: "S1".to_string(),
            order_id: None,
            expected_qty: expected,
            received_qty: received,
            items: vec![ShipmentItem { sku: "SKU1".to_string(), asin: None, qty: expected, unit_cost: Some(unit_cost) }],
            event_date: Utc::now(),
            raw_payload: serde_json::json!({}),
        }
    }

    #[test]
    fn missing_inbound_unit_scenario() {
        let shipments = vec![shipment(10, 7, 15.0)];
        let results = detect("seller-1", "sync-1", &shipments, 60);
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert!((r.estimated_value - 45.0).abs() < 1e-9);
        assert_eq!(r.severity, crate::domain::Severity::Medium);
        assert!((r.confidence - 0.95).abs() < 1e-9);
        assert_eq!((r.deadline_date - r.discovery_date).num_days(), 60);
    }

    #[test]
    fn fully_received_shipment_emits_nothing() {
        let shipments = vec![shipment(10, 10, 15.0)];
        assert!(detect("seller-1", "sync-1", &shipments, 60).is_empty());
    }
}
