//! 4.5.f — micro-leak detection: small per-unit overcharges that are easy
//! to miss individually but compound across high-volume SKUs.

use chrono::Utc;
use std::collections::HashMap;

use crate::domain::{DetectionResult, FinancialEvent};

pub const ALGORITHM_VERSION: u32 = 1;

const MIN_OCCURRENCES: usize = 50;
const OVERCHARGE_BAND_LOW: f64 = 0.05;
const OVERCHARGE_BAND_HIGH: f64 = 2.00;
const MIN_TOTAL_LEAKED: f64 = 25.0;

const DIM_WEIGHT_MIN_OCCURRENCES: usize = 20;
const DIM_WEIGHT_CONFIDENCE: f64 = 0.85;

fn sku_key(e: &FinancialEvent) -> Option<String> {
    e.sku.clone().or_else(|| e.asin.clone())
}

fn confidence_for(occurrences: usize) -> f64 {
    (0.60 + occurrences as f64 / 1000.0 * 0.35).min(0.95)
}

/// Per-unit fee overcharges: fees that exceed `expectedAmount` by a small,
/// consistent per-unit amount, repeated often enough across a SKU that the
/// aggregate leak clears `MIN_TOTAL_LEAKED`.
pub fn per_unit_overcharge(seller_id: &str, sync_id: &str, fee_events: &[FinancialEvent], deadline_days: i64) -> Vec<DetectionResult> {
    let now = Utc::now();
    let mut by_sku: HashMap<String, Vec<&FinancialEvent>> = HashMap::new();
    for e in fee_events {
        let Some(expected) = e.expected_amount else { continue };
        let overcharge = e.amount - expected;
        if overcharge < OVERCHARGE_BAND_LOW || overcharge > OVERCHARGE_BAND_HIGH {
            continue;
        }
        let Some(key) = sku_key(e) else { continue };
        by_sku.entry(key).or_default().push(e);
    }

    let mut out = Vec::new();
    for (sku, events) in by_sku {
        if events.len() < MIN_OCCURRENCES {
            continue;
        }
        let total_leaked: f64 = events.iter().map(|e| e.amount - e.expected_amount.unwrap_or(e.amount)).sum();
        if total_leaked < MIN_TOTAL_LEAKED {
            continue;
        }
        let currency = events.first().map(|e| e.currency.clone()).unwrap_or_else(|| "USD".to_string());
        let event_ids: Vec<String> = events.iter().map(|e| e.event_id.clone()).collect();
        let avg_overcharge = total_leaked / events.len() as f64;
        out.push(super::build_result(
            seller_id,
            sync_id,
            "micro_leak_pattern",
            total_leaked,
            &currency,
            confidence_for(events.len()),
            serde_json::json!({
                "sku": sku,
                "occurrences": events.len(),
                "avgOverchargePerUnit": avg_overcharge,
                "totalLeaked": total_leaked,
            }),
            event_ids,
            now,
            deadline_days,
            ALGORITHM_VERSION,
            None,
        ));
    }
    out
}

/// Dimensional-weight billing variance: fee events billed against a
/// declared `dimWeight` heavier than the measured `actualWeight`, repeated
/// across a SKU. Marketplaces that never report these fields are skipped
/// entirely rather than treated as zero-variance.
pub fn dimensional_weight_variance(seller_id: &str, sync_id: &str, fee_events: &[FinancialEvent], deadline_days: i64) -> Vec<DetectionResult> {
    let now = Utc::now();
    let mut by_sku: HashMap<String, Vec<&FinancialEvent>> = HashMap::new();
    for e in fee_events {
        let (Some(dim), Some(actual)) = (e.dim_weight, e.actual_weight) else { continue };
        if dim <= actual {
            continue;
        }
        let Some(key) = sku_key(e) else { continue };
        by_sku.entry(key).or_default().push(e);
    }

    let mut out = Vec::new();
    for (sku, events) in by_sku {
        if events.len() < DIM_WEIGHT_MIN_OCCURRENCES {
            continue;
        }
        let total_leaked: f64 = events
            .iter()
            .map(|e| {
                let dim = e.dim_weight.unwrap_or(0.0);
                let actual = e.actual_weight.unwrap_or(0.0);
                let weight_ratio = if actual > 1e-9 { (dim - actual) / actual } else { 0.0 };
                e.amount * weight_ratio.min(1.0)
            })
            .sum();
        if total_leaked < MIN_TOTAL_LEAKED {
            continue;
        }
        let currency = events.first().map(|e| e.currency.clone()).unwrap_or_else(|| "USD".to_string());
        let event_ids: Vec<String> = events.iter().map(|e| e.event_id.clone()).collect();
        out.push(super::build_result(
            seller_id,
            sync_id,
            "micro_leak_dimensional_weight_variance",
            total_leaked,
            &currency,
            DIM_WEIGHT_CONFIDENCE,
            serde_json::json!({
                "sku": sku,
                "occurrences": events.len(),
                "totalLeaked": total_leaked,
            }),
            event_ids,
            now,
            deadline_days,
            ALGORITHM_VERSION,
            None,
        ));
    }
    out
}

pub fn detect(seller_id: &str, sync_id: &str, fee_events: &[FinancialEvent], deadline_days: i64) -> Vec<DetectionResult> {
    let mut out = per_unit_overcharge(seller_id, sync_id, fee_events, deadline_days);
    out.extend(dimensional_weight_variance(seller_id, sync_id, fee_events, deadline_days));
    out
}
