//! 4.6 — Certainty Scorer: maps a detection result to a deterministic
//! (probability, tier, confidence, factors) quadruple. Same input payload
//! must produce byte-identical output across processes and versions, so
//! every source of variation — including the "jitter" term — is a pure
//! function of the canonical fingerprint.

use crate::canonical;
use crate::domain::{CertaintyScore, DetectionResult, Tier};

pub const SCORER_VERSION: u32 = 1;

const BASE_PROBABILITY: f64 = 0.5;

const TEXTUAL_INDICATOR_INCREMENT: f64 = 0.06;
const PROOF_BUNDLE_INCREMENT: f64 = 0.08;
const LONG_SUMMARY_INCREMENT: f64 = 0.03;
const STRUCTURED_DATA_INCREMENT: f64 = 0.05;

const HIGH_VALUE_PENALTY: f64 = -0.05;
const TWO_GROUPS_BONUS: f64 = 0.04;
const THREE_GROUPS_BONUS: f64 = 0.08;
const HIGH_ANOMALY_WITH_PROOF_BONUS: f64 = 0.06;

const LOW_AMOUNT_CEILING: f64 = 100.0;
const MEDIUM_AMOUNT_CEILING: f64 = 1000.0;
const MIN_SUMMARY_LENGTH: usize = 100;
const HIGH_ANOMALY_THRESHOLD: f64 = 0.8;

const TIER_LOW_CEILING: f64 = 0.3;
const TIER_MEDIUM_CEILING: f64 = 0.7;

const TEXTUAL_KEYWORDS: &[&str] = &["overcharge", "damage", "lost", "shipping", "storage", "quality"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AmountTier {
    Low,
    Medium,
    High,
}

fn amount_tier(value: f64) -> AmountTier {
    if value <= LOW_AMOUNT_CEILING {
        AmountTier::Low
    } else if value <= MEDIUM_AMOUNT_CEILING {
        AmountTier::Medium
    } else {
        AmountTier::High
    }
}

/// Deterministic jitter derived from the fingerprint, isolated behind a
/// trait so tests can substitute a zero-jitter double instead of asserting
/// on the hash's exact byte derivation.
pub trait HashAdjust {
    fn adjust(&self, fingerprint_hex8: &str) -> f64;
}

/// The production jitter source: the first 8 hex chars of the fingerprint,
/// parsed as a u32 and mapped linearly onto `[-0.02, 0.02]`.
pub struct FingerprintHashAdjust;

impl HashAdjust for FingerprintHashAdjust {
    fn adjust(&self, fingerprint_hex8: &str) -> f64 {
        let n = u32::from_str_radix(fingerprint_hex8, 16).unwrap_or(0);
        let unit = n as f64 / u32::MAX as f64; // [0, 1]
        (unit * 0.04) - 0.02
    }
}

/// Always returns zero; lets tests assert on the non-jittered base score.
pub struct ZeroHashAdjust;

impl HashAdjust for ZeroHashAdjust {
    fn adjust(&self, _fingerprint_hex8: &str) -> f64 {
        0.0
    }
}

struct Features {
    textual_indicators: bool,
    amount_tier: AmountTier,
    has_proof_bundle: bool,
    long_summary: bool,
    structured_data: bool,
}

fn extract_features(result: &DetectionResult) -> Features {
    let summary = result.evidence.get("summary").and_then(|v| v.as_str()).unwrap_or("");
    let lower = summary.to_lowercase();
    let textual_indicators = TEXTUAL_KEYWORDS.iter().any(|kw| lower.contains(kw));
    let has_proof_bundle = result
        .evidence
        .get("proofBundle")
        .map(|v| matches!(v, serde_json::Value::Bool(true)) || v.as_array().is_some_and(|a| !a.is_empty()))
        .unwrap_or(false);
    let structured_data = result.evidence.is_object() && !result.evidence.as_object().map(|m| m.is_empty()).unwrap_or(true);

    Features {
        textual_indicators,
        amount_tier: amount_tier(result.estimated_value),
        has_proof_bundle,
        long_summary: summary.len() >= MIN_SUMMARY_LENGTH,
        structured_data,
    }
}

fn factor_labels(f: &Features) -> Vec<String> {
    let mut factors = Vec::new();
    if f.textual_indicators {
        factors.push("textual_indicator_match".to_string());
    }
    match f.amount_tier {
        AmountTier::Low => factors.push("amount_tier_low".to_string()),
        AmountTier::Medium => factors.push("amount_tier_medium".to_string()),
        AmountTier::High => factors.push("amount_tier_high".to_string()),
    }
    if f.has_proof_bundle {
        factors.push("proof_bundle_present".to_string());
    }
    if f.long_summary {
        factors.push("summary_length_sufficient".to_string());
    }
    if f.structured_data {
        factors.push("structured_data_present".to_string());
    }
    factors
}

fn confidence_from_features(f: &Features) -> f64 {
    let mut confidence = 0.5;
    if f.has_proof_bundle {
        confidence += 0.25;
    }
    if f.structured_data {
        confidence += 0.15;
    }
    if f.long_summary {
        confidence += 0.10;
    }
    confidence.clamp(0.0, 1.0)
}

/// Deterministic scoring of one detection result, given an injectable
/// jitter source.
pub fn score_with(result: &DetectionResult, hash_adjust: &dyn HashAdjust) -> Result<CertaintyScore, crate::error::CanonicalizeError> {
    let fingerprint = canonical::digest(&result.evidence)?;
    let features = extract_features(result);

    let mut probability = BASE_PROBABILITY;
    if features.textual_indicators {
        probability += TEXTUAL_INDICATOR_INCREMENT;
    }
    if features.has_proof_bundle {
        probability += PROOF_BUNDLE_INCREMENT;
    }
    if features.long_summary {
        probability += LONG_SUMMARY_INCREMENT;
    }
    if features.structured_data {
        probability += STRUCTURED_DATA_INCREMENT;
    }

    probability += hash_adjust.adjust(&fingerprint[..8]);

    if features.amount_tier == AmountTier::High {
        probability += HIGH_VALUE_PENALTY;
    }

    let positive_groups = [features.textual_indicators, features.has_proof_bundle, features.structured_data]
        .iter()
        .filter(|v| **v)
        .count();
    probability += match positive_groups {
        2 => TWO_GROUPS_BONUS,
        3 => THREE_GROUPS_BONUS,
        _ => 0.0,
    };

    if result.confidence > HIGH_ANOMALY_THRESHOLD && features.has_proof_bundle {
        probability += HIGH_ANOMALY_WITH_PROOF_BONUS;
    }

    let probability = probability.clamp(0.0, 1.0);

    let tier = if probability < TIER_LOW_CEILING {
        Tier::Low
    } else if probability <= TIER_MEDIUM_CEILING {
        Tier::Medium
    } else {
        Tier::High
    };

    Ok(CertaintyScore {
        detection_id: result.detection_id.clone(),
        version: SCORER_VERSION,
        probability,
        tier,
        confidence: confidence_from_features(&features),
        factors: factor_labels(&features),
    })
}

/// Scores with the production jitter source.
pub fn score(result: &DetectionResult) -> Result<CertaintyScore, crate::error::CanonicalizeError> {
    score_with(result, &FingerprintHashAdjust)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Severity;
    use chrono::Utc;

    fn result(estimated_value: f64, confidence: f64, evidence: serde_json::Value) -> DetectionResult {
        let now = Utc::now();
        DetectionResult {
            detection_id: "D1".to_string(),
            seller_id: "S1".to_string(),
            sync_id: "sync-1".to_string(),
            anomaly_type: "missing_inbound_shipment".to_string(),
            severity: Severity::from_value(estimated_value),
            estimated_value,
            currency: "USD".to_string(),
            confidence,
            evidence,
            related_event_ids: vec![],
            discovery_date: now,
            deadline_date: now + chrono::Duration::days(60),
            algorithm_version: 1,
        }
    }

    #[test]
    fn same_payload_scores_identically_across_calls() {
        let r = result(45.0, 0.9, serde_json::json!({"summary": "shipping overcharge detected", "proofBundle": true}));
        let a = score(&r).unwrap();
        let b = score(&r).unwrap();
        assert_eq!(a.probability, b.probability);
        assert_eq!(a.factors, b.factors);
    }

    #[test]
    fn zero_jitter_double_gives_a_stable_base_score() {
        let r = result(45.0, 0.5, serde_json::json!({}));
        let scored = score_with(&r, &ZeroHashAdjust).unwrap();
        assert!((scored.probability - BASE_PROBABILITY).abs() < 1e-9);
        assert_eq!(scored.tier, Tier::Medium);
    }

    #[test]
    fn high_value_claim_is_penalized() {
        let r = result(2000.0, 0.5, serde_json::json!({}));
        let scored = score_with(&r, &ZeroHashAdjust).unwrap();
        assert!((scored.probability - (BASE_PROBABILITY + HIGH_VALUE_PENALTY)).abs() < 1e-9);
    }

    #[test]
    fn probability_is_always_clamped() {
        let r = result(
            50.0,
            0.95,
            serde_json::json!({"summary": "overcharge damage lost shipping storage quality ".repeat(5), "proofBundle": true}),
        );
        let scored = score_with(&r, &ZeroHashAdjust).unwrap();
        assert!(scored.probability <= 1.0);
    }

    #[test]
    fn tier_boundaries_match_spec_thresholds() {
        assert_eq!(
            if 0.29 < TIER_LOW_CEILING { Tier::Low } else { Tier::Medium },
            Tier::Low
        );
        assert_eq!(
            if 0.7 <= TIER_MEDIUM_CEILING { Tier::Medium } else { Tier::High },
            Tier::Medium
        );
    }
}
