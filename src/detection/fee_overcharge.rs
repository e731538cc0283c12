//! 4.5.c — settlement fee overcharge: fees exceeding the 18% ceiling.

use chrono::Utc;

use crate::domain::{DetectionResult, Settlement};

pub const ALGORITHM_VERSION: u32 = 1;
const CONFIDENCE: f64 = 0.90;
const FEE_CEILING_RATIO: f64 = 0.18;

pub fn detect(seller_id: &str, sync_id: &str, settlements: &[Settlement], deadline_days: i64) -> Vec<DetectionResult> {
    let now = Utc::now();
    settlements
        .iter()
        .filter(|s| s.fees > FEE_CEILING_RATIO * s.amount)
        .map(|s| {
            let value = s.fees - FEE_CEILING_RATIO * s.amount;
            super::build_result(
                seller_id,
                sync_id,
                "fee_overcharge",
                value,
                &s.currency,
                CONFIDENCE,
                serde_json::json!({
                    "settlementId": s.settlement_id,
                    "amount": s.amount,
                    "fees": s.fees,
                    "ceilingRatio": FEE_CEILING_RATIO,
                }),
                vec![s.settlement_id.clone()],
                now,
                deadline_days,
                ALGORITHM_VERSION,
                None,
            )
        })
        .collect()
}
