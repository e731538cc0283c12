use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SyncStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, SyncStatus::Pending | SyncStatus::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Completed | SyncStatus::Failed | SyncStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Counts {
    pub orders: u64,
    pub shipments: u64,
    pub returns: u64,
    pub settlements: u64,
    pub inventory: u64,
    pub financial_events: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    pub sync_id: String,
    pub seller_id: String,
    pub status: SyncStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub counts: Counts,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub cancel_requested: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Severity-by-value-band: critical >= 500, high >= 100, medium >= 25, else low.
    pub fn from_value(estimated_value: f64) -> Self {
        if estimated_value >= 500.0 {
            Severity::Critical
        } else if estimated_value >= 100.0 {
            Severity::High
        } else if estimated_value >= 25.0 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    pub detection_id: String,
    pub seller_id: String,
    pub sync_id: String,
    pub anomaly_type: String,
    pub severity: Severity,
    pub estimated_value: f64,
    pub currency: String,
    pub confidence: f64,
    pub evidence: serde_json::Value,
    pub related_event_ids: Vec<String>,
    pub discovery_date: DateTime<Utc>,
    pub deadline_date: DateTime<Utc>,
    pub algorithm_version: u32,
}

impl DetectionResult {
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.deadline_date - now).num_days().max(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertaintyScore {
    pub detection_id: String,
    pub version: u32,
    pub probability: f64,
    pub tier: Tier,
    pub confidence: f64,
    pub factors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brief {
    pub detection_id: String,
    pub template_version: u32,
    pub subject: String,
    pub body: String,
    pub policy_cited: String,
    pub evidence_filenames: Vec<String>,
    pub evidence_fingerprint: String,
    pub signature: String,
    pub report_id: String,
}
