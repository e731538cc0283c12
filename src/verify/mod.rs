//! Runtime invariant assertions, in the teacher's `InvariantViolation` +
//! `assert_*` idiom (see the former `verify::invariants` module this one
//! supersedes), generalized from order/portfolio consistency checks to the
//! detection/scoring/brief invariants of §8.

use crate::domain::{CertaintyScore, DetectionResult};

#[derive(Debug, Clone)]
pub struct InvariantViolation {
    pub msg: String,
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.msg)
    }
}

/// Deadline invariant: `discoveryDate <= deadlineDate == discoveryDate + 60 days`.
pub fn assert_deadline_invariant(result: &DetectionResult, deadline_days: i64) -> Result<(), InvariantViolation> {
    if result.deadline_date < result.discovery_date {
        return Err(InvariantViolation { msg: "deadline_date precedes discovery_date".to_string() });
    }
    let expected = result.discovery_date + chrono::Duration::days(deadline_days);
    if result.deadline_date != expected {
        return Err(InvariantViolation { msg: format!("deadline_date {} does not equal discovery_date + {deadline_days}d", result.deadline_date) });
    }
    Ok(())
}

/// Confidence and probability fields must always land in `[0, 1]`.
pub fn assert_bounded_unit_interval(label: &str, value: f64) -> Result<(), InvariantViolation> {
    if !(0.0..=1.0).contains(&value) {
        return Err(InvariantViolation { msg: format!("{label} = {value} is outside [0, 1]") });
    }
    Ok(())
}

/// Scoring stability: two scores computed for the same detection id must
/// agree on probability and tier (modulo floating-point exactness, which
/// the scorer's determinism already guarantees bit-for-bit).
pub fn assert_scoring_stable(a: &CertaintyScore, b: &CertaintyScore) -> Result<(), InvariantViolation> {
    if a.detection_id != b.detection_id {
        return Err(InvariantViolation { msg: "comparing scores for different detection ids".to_string() });
    }
    if (a.probability - b.probability).abs() > 1e-12 {
        return Err(InvariantViolation { msg: "scoring probability is not stable across calls".to_string() });
    }
    if a.tier != b.tier {
        return Err(InvariantViolation { msg: "scoring tier is not stable across calls".to_string() });
    }
    Ok(())
}

/// Sync exclusivity is enforced by the repository's `create_sync_run`
/// (unique pending/running row per seller); this just names the invariant
/// for callers asserting on the returned error.
pub fn is_exclusivity_violation(err: &crate::error::RepositoryError) -> bool {
    matches!(err, crate::error::RepositoryError::Conflict)
}
