//! Progress events published per syncId, delivered to subscribers of a
//! per-seller bus. Generalized from the teacher's `events::Event` /
//! `EventType` shape (a trading-signal event with `ts`/`event`/`score`)
//! into the sync-progress shape of the spec.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Sync,
    Detection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Started,
    Progress,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub status: EventStatus,
    pub sync_id: String,
    pub seller_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub emitted_at: chrono::DateTime<Utc>,
}

impl SyncEvent {
    pub fn started(sync_id: &str, seller_id: &str, kind: EventKind) -> Self {
        Self { kind, status: EventStatus::Started, sync_id: sync_id.to_string(), seller_id: seller_id.to_string(), data: None, emitted_at: Utc::now() }
    }

    pub fn progress(sync_id: &str, seller_id: &str, stage: &str, data: serde_json::Value) -> Self {
        let kind = if stage == "detection" { EventKind::Detection } else { EventKind::Sync };
        Self { kind, status: EventStatus::Progress, sync_id: sync_id.to_string(), seller_id: seller_id.to_string(), data: Some(data), emitted_at: Utc::now() }
    }

    pub fn completed(sync_id: &str, seller_id: &str, data: serde_json::Value) -> Self {
        Self { kind: EventKind::Sync, status: EventStatus::Completed, sync_id: sync_id.to_string(), seller_id: seller_id.to_string(), data: Some(data), emitted_at: Utc::now() }
    }

    pub fn failed(sync_id: &str, seller_id: &str, error: &str) -> Self {
        Self { kind: EventKind::Sync, status: EventStatus::Failed, sync_id: sync_id.to_string(), seller_id: seller_id.to_string(), data: Some(serde_json::json!({"error": error})), emitted_at: Utc::now() }
    }

    pub fn cancelled(sync_id: &str, seller_id: &str) -> Self {
        Self { kind: EventKind::Sync, status: EventStatus::Cancelled, sync_id: sync_id.to_string(), seller_id: seller_id.to_string(), data: None, emitted_at: Utc::now() }
    }
}

const CHANNEL_CAPACITY: usize = 256;

/// Single-writer/multi-reader event bus, one broadcast channel per seller
/// created lazily on first publish or subscribe. Late subscribers only see
/// events emitted after they subscribe, per the broadcast channel's normal
/// semantics.
pub struct SyncEventBus {
    channels: Mutex<HashMap<String, broadcast::Sender<SyncEvent>>>,
}

impl SyncEventBus {
    pub fn new() -> Self {
        Self { channels: Mutex::new(HashMap::new()) }
    }

    fn sender_for(&self, seller_id: &str) -> broadcast::Sender<SyncEvent> {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(seller_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    pub fn publish(&self, event: SyncEvent) {
        let sender = self.sender_for(&event.seller_id);
        // No active subscribers is not an error; the event is simply dropped.
        let _ = sender.send(event);
    }

    pub fn subscribe(&self, seller_id: &str) -> broadcast::Receiver<SyncEvent> {
        self.sender_for(seller_id).subscribe()
    }
}

impl Default for SyncEventBus {
    fn default() -> Self {
        Self::new()
    }
}
