use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub seller_id: String,
    pub order_id: String,
    pub order_date: DateTime<Utc>,
    pub total_amount: f64,
    pub currency: String,
    pub status: String,
    pub channel: String,
    #[serde(default)]
    pub raw_payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentItem {
    pub sku: String,
    #[serde(default)]
    pub asin: Option<String>,
    pub qty: i64,
    #[serde(default)]
    pub unit_cost: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    pub seller_id: String,
    pub shipment_id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    pub expected_qty: i64,
    pub received_qty: i64,
    pub items: Vec<ShipmentItem>,
    pub event_date: DateTime<Utc>,
    #[serde(default)]
    pub raw_payload: serde_json::Value,
}

impl Shipment {
    /// `missingQty = expectedQty - receivedQty`, derived by ingestion.
    pub fn missing_qty(&self) -> i64 {
        (self.expected_qty - self.received_qty).max(0)
    }

    /// Best-effort per-unit cost estimate from the line items, falling
    /// back to a conservative default when items carry no cost.
    pub fn unit_cost_estimate(&self) -> f64 {
        let costs: Vec<f64> = self.items.iter().filter_map(|i| i.unit_cost).collect();
        if costs.is_empty() {
            15.0
        } else {
            costs.iter().sum::<f64>() / costs.len() as f64
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnItem {
    pub sku: String,
    #[serde(default)]
    pub asin: Option<String>,
    pub qty: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Return {
    pub seller_id: String,
    pub return_id: String,
    pub order_id: String,
    pub refund_amount: f64,
    pub returned_date: DateTime<Utc>,
    pub items: Vec<ReturnItem>,
    #[serde(default)]
    pub raw_payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settlement {
    pub seller_id: String,
    pub settlement_id: String,
    pub settlement_date: DateTime<Utc>,
    pub amount: f64,
    pub fees: f64,
    pub currency: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub units: Option<i64>,
    #[serde(default)]
    pub raw_payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEventType {
    Receipt,
    Adjustment,
    Loss,
    Damaged,
    Disposed,
    Destroyed,
}

impl LedgerEventType {
    pub fn is_loss_class(&self) -> bool {
        matches!(
            self,
            LedgerEventType::Loss | LedgerEventType::Damaged | LedgerEventType::Disposed | LedgerEventType::Destroyed
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryLedgerEntry {
    pub seller_id: String,
    pub event_id: String,
    pub sku: String,
    #[serde(default)]
    pub fnsku: Option<String>,
    #[serde(default)]
    pub asin: Option<String>,
    pub event_date: DateTime<Utc>,
    pub event_type: LedgerEventType,
    /// Signed: receipts positive, adjustments/losses negative.
    pub quantity: i64,
    #[serde(default)]
    pub raw_payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinancialEventType {
    Fee,
    FeeReversal,
    Cancellation,
    Reimbursement,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialEvent {
    pub seller_id: String,
    pub event_id: String,
    pub event_type: FinancialEventType,
    pub amount: f64,
    pub currency: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub asin: Option<String>,
    pub posted_date: DateTime<Utc>,
    /// Expected per-unit fee, when the marketplace reports it separately
    /// from the charged fee (used by the micro-leak detector).
    #[serde(default)]
    pub expected_amount: Option<f64>,
    /// Dimensional-weight billing fields; absent on marketplaces that
    /// don't report them.
    #[serde(default)]
    pub dim_weight: Option<f64>,
    #[serde(default)]
    pub actual_weight: Option<f64>,
    #[serde(default)]
    pub raw_payload: serde_json::Value,
}
