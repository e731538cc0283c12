//! 4.7 — Brief Generator: selects a template by anomaly type, substitutes
//! claim fields, and stamps the result with a digest-backed signature so a
//! regenerated brief for the same detection is byte-identical.

use chrono::{DateTime, Utc};

use crate::canonical;
use crate::domain::{Brief, DetectionResult};
use crate::error::CanonicalizeError;

pub const TEMPLATE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Template {
    MissingInboundShipment,
    RefundWithoutReturn,
    DamagedWarehouse,
    Default,
}

impl Template {
    fn policy_cited(&self) -> &'static str {
        match self {
            Template::MissingInboundShipment => "Lost Inventory Reimbursement Policy",
            Template::RefundWithoutReturn => "Refund Reconciliation Policy",
            Template::DamagedWarehouse => "Warehouse Damage Reimbursement Policy",
            Template::Default => "General Reimbursement Policy",
        }
    }

    fn subject_prefix(&self) -> &'static str {
        match self {
            Template::MissingInboundShipment => "Missing inbound inventory",
            Template::RefundWithoutReturn => "Refund issued without matching return",
            Template::DamagedWarehouse => "Warehouse-damaged inventory",
            Template::Default => "Reimbursement claim",
        }
    }
}

/// Exact match on the four named anomaly types, falling back to a
/// substring heuristic so new/renamed detectors still land somewhere
/// sensible rather than always hitting `default`.
fn select_template(anomaly_type: &str) -> Template {
    match anomaly_type {
        "missing_inbound_shipment" => return Template::MissingInboundShipment,
        "refund_without_return" | "refund_mismatch" => return Template::RefundWithoutReturn,
        "damaged_warehouse" => return Template::DamagedWarehouse,
        _ => {}
    }
    let lower = anomaly_type.to_lowercase();
    if lower.contains("missing") || lower.contains("lost") {
        Template::MissingInboundShipment
    } else if lower.contains("return") || lower.contains("refund") {
        Template::RefundWithoutReturn
    } else if lower.contains("damage") {
        Template::DamagedWarehouse
    } else {
        Template::Default
    }
}

fn field(value: &serde_json::Value, key: &str) -> String {
    value.get(key).and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_i64().map(|n| n.to_string()))).unwrap_or_else(|| "unknown".to_string())
}

fn render_body(template: Template, result: &DetectionResult, evidence_filenames: &[String]) -> String {
    let evidence = &result.evidence;
    let order_id = field(evidence, "orderId");
    let shipment_id = field(evidence, "shipmentId");
    let sku = evidence.get("sku").and_then(|v| v.as_str()).or_else(|| evidence.get("asin").and_then(|v| v.as_str())).unwrap_or("unknown");

    let narrative = match template {
        Template::MissingInboundShipment => format!("Shipment {shipment_id} (order {order_id}, sku {sku}) arrived short of the expected quantity."),
        Template::RefundWithoutReturn => format!("Order {order_id} (sku {sku}) was refunded for less than its recorded total."),
        Template::DamagedWarehouse => format!("Sku {sku} was marked damaged/disposed in the inventory ledger without a corresponding reimbursement."),
        Template::Default => format!("Anomaly {} was detected for order {order_id}, sku {sku}.", result.anomaly_type),
    };

    let files = if evidence_filenames.is_empty() {
        "none".to_string()
    } else {
        evidence_filenames.join(", ")
    };

    format!(
        "{narrative}\n\nEstimated value: {:.2} {}\nDiscovery date: {}\nDeadline: {}\nEvidence files: {files}\n",
        result.estimated_value,
        result.currency,
        result.discovery_date.to_rfc3339(),
        result.deadline_date.to_rfc3339(),
    )
}

/// Stable `reportId = "<sellerId>-<anomalyId>-v<templateVersion>-<shortId(digest(sellerId+anomalyId+templateVersion))>"`.
fn report_id(seller_id: &str, anomaly_id: &str, template_version: u32) -> Result<String, CanonicalizeError> {
    let payload = serde_json::json!({"sellerId": seller_id, "anomalyId": anomaly_id, "templateVersion": template_version});
    let digest = canonical::digest(&payload)?;
    Ok(format!("{seller_id}-{anomaly_id}-v{template_version}-{}", canonical::short_id(&digest)))
}

/// Renders a brief for one detection result. `prepared_on` is supplied by
/// the caller (not read from the clock here) so regenerating a brief for
/// an unchanged detection at a different wall-clock moment still produces
/// a signature tied to the original preparation time when the caller
/// passes it through consistently.
pub fn generate(result: &DetectionResult, evidence_filenames: &[String], prepared_on: DateTime<Utc>) -> Result<Brief, CanonicalizeError> {
    let template = select_template(&result.anomaly_type);
    let severity_label = match result.severity {
        crate::domain::Severity::Low => "low",
        crate::domain::Severity::Medium => "medium",
        crate::domain::Severity::High => "high",
        crate::domain::Severity::Critical => "critical",
    };
    let subject = format!("{}: {} ({})", template.subject_prefix(), result.anomaly_type, severity_label);
    let body = render_body(template, result, evidence_filenames);

    let evidence_fingerprint = canonical::digest(&result.evidence)?;
    let prepared_on_iso = prepared_on.to_rfc3339();
    let signature = canonical::signature(&evidence_fingerprint, TEMPLATE_VERSION, &prepared_on_iso);
    let report_id = report_id(&result.seller_id, &result.detection_id, TEMPLATE_VERSION)?;

    Ok(Brief {
        detection_id: result.detection_id.clone(),
        template_version: TEMPLATE_VERSION,
        subject,
        body,
        policy_cited: template.policy_cited().to_string(),
        evidence_filenames: evidence_filenames.to_vec(),
        evidence_fingerprint,
        signature,
        report_id,
    })
}
