//! Six algorithm families over an ingested snapshot, each a pure function
//! of input rows plus algorithm-version constants. Every detector shares
//! the [`DetectionResult`] shape and deadline policy defined here.

pub mod correlation;
pub mod fee_drift;
pub mod fee_overcharge;
pub mod inbound_gap;
pub mod micro_leak;
pub mod refund_gap;

use chrono::{DateTime, Utc};

use crate::canonical;
use crate::domain::{DetectionResult, Severity};

/// Derives a stable `detection_id` from everything that identifies *what*
/// was found, not *when*: the same anomaly re-detected in a later sync (the
/// same seller, algorithm, and evidence) collapses onto the same id instead
/// of minting a fresh one, so `insert_detection_results`'s
/// `INSERT OR REPLACE` keyed on `detection_id` naturally de-duplicates it.
fn derive_detection_id(seller_id: &str, anomaly_type: &str, algorithm_version: u32, evidence: &serde_json::Value) -> String {
    let fingerprint = serde_json::json!({
        "sellerId": seller_id,
        "anomalyType": anomaly_type,
        "algorithmVersion": algorithm_version,
        "evidence": evidence,
    });
    canonical::digest(&fingerprint).unwrap_or_else(|_| format!("{seller_id}:{anomaly_type}:{algorithm_version}"))
}

/// Builds a `DetectionResult` with the shared deadline policy
/// (`deadlineDate = discoveryDate + 60 days`) and value-band severity,
/// unless the caller supplies an explicit severity override (fee-drift's
/// annual-impact-scaled severity, for instance).
#[allow(clippy::too_many_arguments)]
pub fn build_result(
    seller_id: &str,
    sync_id: &str,
    anomaly_type: &str,
    estimated_value: f64,
    currency: &str,
    confidence: f64,
    evidence: serde_json::Value,
    related_event_ids: Vec<String>,
    discovery_date: DateTime<Utc>,
    deadline_days: i64,
    algorithm_version: u32,
    severity_override: Option<Severity>,
) -> DetectionResult {
    DetectionResult {
        detection_id: derive_detection_id(seller_id, anomaly_type, algorithm_version, &evidence),
        seller_id: seller_id.to_string(),
        sync_id: sync_id.to_string(),
        anomaly_type: anomaly_type.to_string(),
        severity: severity_override.unwrap_or_else(|| Severity::from_value(estimated_value)),
        estimated_value,
        currency: currency.to_string(),
        confidence: confidence.clamp(0.0, 1.0),
        evidence,
        related_event_ids,
        discovery_date,
        deadline_date: discovery_date + chrono::Duration::days(deadline_days),
        algorithm_version,
    }
}
