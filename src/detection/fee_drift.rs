//! 4.5.d — fee-drift trend: per-SKU time series of per-unit settlement
//! fees, baseline vs. current window comparison. Statistics (mean/std-dev,
//! weekly bucketing) are adapted from the teacher's `drift_tracker`
//! (`RollingWindow`'s Welford accumulator and `FeatureTracker`'s
//! baseline/recent comparison), generalized from a live feature monitor to
//! an offline per-SKU fee series.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::domain::{DetectionResult, Severity, Settlement};

pub const ALGORITHM_VERSION: u32 = 1;

const MIN_HISTORY_DAYS: i64 = 45;
const MIN_BASELINE_SAMPLES: usize = 10;
const BASELINE_WINDOW_DAYS: i64 = 30;
const CURRENT_WINDOW_DAYS: i64 = 30;
const MIN_DRIFT_PCT: f64 = 5.0;
const MIN_MONTHLY_OVERCHARGE: f64 = 10.0;
const MIN_CONFIDENCE: f64 = 0.55;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftType {
    StepIncrease,
    AcceleratingDrift,
    GradualIncrease,
}

impl DriftType {
    fn as_str(&self) -> &'static str {
        match self {
            DriftType::StepIncrease => "step_increase",
            DriftType::AcceleratingDrift => "accelerating_drift",
            DriftType::GradualIncrease => "gradual_increase",
        }
    }
}

struct Sample {
    date: DateTime<Utc>,
    per_unit_fee: f64,
    units: i64,
}

fn per_sku_samples(settlements: &[Settlement]) -> HashMap<String, Vec<Sample>> {
    let mut grouped: HashMap<String, Vec<Sample>> = HashMap::new();
    for s in settlements {
        let (Some(sku), Some(units)) = (&s.sku, s.units) else { continue };
        if units <= 0 {
            continue;
        }
        grouped.entry(sku.clone()).or_default().push(Sample {
            date: s.settlement_date,
            per_unit_fee: s.fees / units as f64,
            units,
        });
    }
    for samples in grouped.values_mut() {
        samples.sort_by_key(|s| s.date);
    }
    grouped
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn std_dev(values: &[f64], m: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0);
    var.sqrt()
}

struct WindowStats {
    mean: f64,
    median: f64,
    std_dev: f64,
}

fn window_stats(values: &[f64]) -> WindowStats {
    let m = mean(values);
    WindowStats { mean: m, median: median(values), std_dev: std_dev(values, m) }
}

/// Weekly mean buckets, oldest first, each paired with its bucket start date.
fn weekly_buckets(samples: &[Sample]) -> Vec<(DateTime<Utc>, f64)> {
    if samples.is_empty() {
        return Vec::new();
    }
    let start = samples[0].date;
    let mut buckets: HashMap<i64, Vec<f64>> = HashMap::new();
    for s in samples {
        let week = (s.date - start).num_days() / 7;
        buckets.entry(week).or_default().push(s.per_unit_fee);
    }
    let mut weeks: Vec<i64> = buckets.keys().copied().collect();
    weeks.sort();
    weeks
        .into_iter()
        .map(|w| (start + Duration::days(w * 7), mean(&buckets[&w])))
        .collect()
}

fn classify_type(weeks: &[(DateTime<Utc>, f64)], baseline_mean: f64, baseline_std: f64) -> DriftType {
    // A near-zero baseline std-dev (a perfectly flat baseline) would make
    // any jump technically infinite z-scores; floor it to a small fraction
    // of the baseline mean so the step-increase check stays meaningful.
    let effective_std = if baseline_std > 1e-9 { baseline_std } else { (baseline_mean.abs() * 0.01).max(1e-6) };
    let means: Vec<f64> = weeks.iter().map(|(_, m)| *m).collect();
    if means.len() >= 2 {
        for pair in means.windows(2) {
            if (pair[1] - pair[0]).abs() > 3.0 * effective_std {
                return DriftType::StepIncrease;
            }
        }
    }
    if means.len() >= 4 {
        let changes: Vec<f64> = means
            .windows(2)
            .map(|pair| if pair[0].abs() > 1e-9 { (pair[1] - pair[0]) / pair[0] * 100.0 } else { 0.0 })
            .collect();
        let mid = changes.len() / 2;
        let first_half = mean(&changes[..mid]);
        let second_half = mean(&changes[mid..]);
        if first_half.abs() > 1e-9 && second_half > 1.5 * first_half && second_half > 0.0 {
            return DriftType::AcceleratingDrift;
        }
    }
    DriftType::GradualIncrease
}

fn drift_start(weeks: &[(DateTime<Utc>, f64)], baseline_mean: f64, baseline_std: f64) -> Option<DateTime<Utc>> {
    let threshold = baseline_mean + 2.0 * baseline_std;
    weeks.iter().find(|(_, m)| *m > threshold).map(|(date, _)| *date)
}

#[allow(clippy::too_many_arguments)]
fn confidence_for(
    sufficient_history: bool,
    upward_trend_ratio: f64,
    monthly_overcharge: f64,
    current_std: f64,
    baseline_std: f64,
) -> f64 {
    let mut c = 0.0;
    if sufficient_history {
        c += 0.30;
    }
    if upward_trend_ratio >= 0.70 {
        c += 0.25;
    }
    // No product-change signal is available in the ingested snapshot; a
    // future revision may wire this to catalog-change events.
    let no_product_change = true;
    if no_product_change {
        c += 0.20;
    }
    if monthly_overcharge >= 25.0 {
        c += 0.15;
    }
    if baseline_std <= 1e-9 || current_std <= 2.0 * baseline_std {
        c += 0.10;
    }
    c.min(1.0)
}

pub fn detect(seller_id: &str, sync_id: &str, settlements: &[Settlement], deadline_days: i64) -> Vec<DetectionResult> {
    let now = Utc::now();
    let mut out = Vec::new();

    for (sku, samples) in per_sku_samples(settlements) {
        if samples.len() < MIN_BASELINE_SAMPLES {
            continue;
        }
        let history_days = (samples.last().unwrap().date - samples.first().unwrap().date).num_days();
        if history_days < MIN_HISTORY_DAYS {
            tracing::debug!(sku, history_days, "fee drift: insufficient history, skipping");
            continue;
        }

        let start = samples.first().unwrap().date;
        let end = samples.last().unwrap().date;

        let baseline_samples: Vec<&Sample> = samples.iter().filter(|s| s.date < start + Duration::days(BASELINE_WINDOW_DAYS)).collect();
        let current_samples: Vec<&Sample> = samples.iter().filter(|s| s.date >= end - Duration::days(CURRENT_WINDOW_DAYS)).collect();

        if baseline_samples.len() < MIN_BASELINE_SAMPLES {
            continue;
        }

        let baseline_values: Vec<f64> = baseline_samples.iter().map(|s| s.per_unit_fee).collect();
        let current_values: Vec<f64> = current_samples.iter().map(|s| s.per_unit_fee).collect();
        let baseline = window_stats(&baseline_values);
        let current = window_stats(&current_values);

        let drift_amount = current.mean - baseline.mean;
        let drift_pct = if baseline.mean.abs() > 1e-9 { drift_amount / baseline.mean * 100.0 } else { 0.0 };
        let monthly_units: i64 = current_samples.iter().map(|s| s.units).sum();
        let monthly_overcharge = drift_amount * monthly_units as f64;

        if drift_pct < MIN_DRIFT_PCT || monthly_overcharge < MIN_MONTHLY_OVERCHARGE {
            continue;
        }

        let weeks = weekly_buckets(&samples);
        let drift_type = classify_type(&weeks, baseline.mean, baseline.std_dev);
        let start_date = drift_start(&weeks, baseline.mean, baseline.std_dev).unwrap_or(start);

        let upward_weeks = weeks.windows(2).filter(|pair| pair[1].1 > pair[0].1).count();
        let upward_ratio = if weeks.len() > 1 { upward_weeks as f64 / (weeks.len() - 1) as f64 } else { 0.0 };

        let confidence = confidence_for(true, upward_ratio, monthly_overcharge, current.std_dev, baseline.std_dev);
        if confidence < MIN_CONFIDENCE {
            continue;
        }

        let units_since_drift_start: i64 = samples.iter().filter(|s| s.date >= start_date).map(|s| s.units).sum();
        let cumulative_overcharge = drift_amount * units_since_drift_start as f64;
        let projected_annual = monthly_overcharge * 12.0;

        let severity = if projected_annual >= 500.0 || (drift_pct >= 20.0 && drift_type == DriftType::AcceleratingDrift) {
            Severity::Critical
        } else {
            Severity::from_value(projected_annual)
        };

        out.push(super::build_result(
            seller_id,
            sync_id,
            "fee_drift_trend",
            cumulative_overcharge,
            "USD",
            confidence,
            serde_json::json!({
                "sku": sku,
                "driftAmount": drift_amount,
                "driftPct": drift_pct,
                "monthlyOvercharge": monthly_overcharge,
                "projectedAnnual": projected_annual,
                "type": drift_type.as_str(),
                "driftStart": start_date.to_rfc3339(),
                "baselineMean": baseline.mean,
                "baselineMedian": baseline.median,
                "baselineStdDev": baseline.std_dev,
                "currentMean": current.mean,
                "currentMedian": current.median,
            }),
            vec![sku],
            now,
            deadline_days,
            ALGORITHM_VERSION,
            Some(severity),
        ));
    }

    out
}
