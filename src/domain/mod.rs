//! The closed set of record kinds this crate understands. Marketplace
//! records are free-form on the wire; everything not part of a variant's
//! typed fields lands in `raw_payload`, preserved verbatim for
//! canonicalization but never read by business logic.

mod entities;
mod run;

pub use entities::*;
pub use run::*;

use serde::{Deserialize, Serialize};

/// One seller's transactional record, as ingested from the marketplace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Record {
    Order(Order),
    Shipment(Shipment),
    Return(Return),
    Settlement(Settlement),
    InventoryLedgerEntry(InventoryLedgerEntry),
    FinancialEvent(FinancialEvent),
}

impl Record {
    pub fn seller_id(&self) -> &str {
        match self {
            Record::Order(r) => &r.seller_id,
            Record::Shipment(r) => &r.seller_id,
            Record::Return(r) => &r.seller_id,
            Record::Settlement(r) => &r.seller_id,
            Record::InventoryLedgerEntry(r) => &r.seller_id,
            Record::FinancialEvent(r) => &r.seller_id,
        }
    }

    pub fn entity_id(&self) -> &str {
        match self {
            Record::Order(r) => &r.order_id,
            Record::Shipment(r) => &r.shipment_id,
            Record::Return(r) => &r.return_id,
            Record::Settlement(r) => &r.settlement_id,
            Record::InventoryLedgerEntry(r) => &r.event_id,
            Record::FinancialEvent(r) => &r.event_id,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Order(_) => RecordKind::Orders,
            Record::Shipment(_) => RecordKind::Shipments,
            Record::Return(_) => RecordKind::Returns,
            Record::Settlement(_) => RecordKind::Settlements,
            Record::InventoryLedgerEntry(_) => RecordKind::InventoryLedger,
            Record::FinancialEvent(_) => RecordKind::FinancialEvents,
        }
    }
}

/// The six record kinds the marketplace client fetches pages of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Orders,
    Shipments,
    Returns,
    Settlements,
    InventoryLedger,
    FinancialEvents,
}

impl RecordKind {
    pub const ALL: [RecordKind; 6] = [
        RecordKind::Orders,
        RecordKind::Shipments,
        RecordKind::Returns,
        RecordKind::Settlements,
        RecordKind::InventoryLedger,
        RecordKind::FinancialEvents,
    ];
}
