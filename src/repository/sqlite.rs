//! `rusqlite`-backed [`Repository`], adapted from the teacher's
//! transactional batch-insert style (`StateStore::persist_snapshot`)
//! generalized from one metrics table to one table per entity kind plus
//! `sync_runs` / `detection_results`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Mutex;

use crate::domain::{DetectionResult, Record, RecordKind, SyncRun};
use crate::error::RepositoryError;

use super::{Repository, TimeWindow};

pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

fn entity_table(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Orders => "orders",
        RecordKind::Shipments => "shipments",
        RecordKind::Returns => "returns",
        RecordKind::Settlements => "settlements",
        RecordKind::InventoryLedger => "inventory_ledger",
        RecordKind::FinancialEvents => "financial_events",
    }
}

fn record_event_date(record: &Record) -> DateTime<Utc> {
    match record {
        Record::Order(r) => r.order_date,
        Record::Shipment(r) => r.event_date,
        Record::Return(r) => r.returned_date,
        Record::Settlement(r) => r.settlement_date,
        Record::InventoryLedgerEntry(r) => r.event_date,
        Record::FinancialEvent(r) => r.posted_date,
    }
}

impl SqliteRepository {
    pub fn open(path: &str) -> Result<Self, RepositoryError> {
        let conn = Connection::open(path).map_err(|e| RepositoryError::Transient(e.to_string()))?;
        let repo = Self { conn: Mutex::new(conn) };
        repo.init()?;
        Ok(repo)
    }

    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        let conn = Connection::open_in_memory().map_err(|e| RepositoryError::Transient(e.to_string()))?;
        let repo = Self { conn: Mutex::new(conn) };
        repo.init()?;
        Ok(repo)
    }

    fn init(&self) -> Result<(), RepositoryError> {
        let conn = self.conn.lock().unwrap();
        for kind in RecordKind::ALL {
            let table = entity_table(kind);
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    seller_id TEXT NOT NULL,
                    entity_id TEXT NOT NULL,
                    event_date TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    PRIMARY KEY (seller_id, entity_id)
                );"
            ))
            .map_err(|e| RepositoryError::Transient(e.to_string()))?;
        }
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sync_runs (
                sync_id TEXT PRIMARY KEY,
                seller_id TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                payload TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sync_runs_seller ON sync_runs (seller_id);
            CREATE INDEX IF NOT EXISTS idx_sync_runs_seller_started ON sync_runs (seller_id, started_at);
            CREATE TABLE IF NOT EXISTS detection_results (
                detection_id TEXT PRIMARY KEY,
                seller_id TEXT NOT NULL,
                sync_id TEXT NOT NULL,
                anomaly_type TEXT NOT NULL,
                payload TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_detection_seller_sync ON detection_results (seller_id, sync_id);
            CREATE INDEX IF NOT EXISTS idx_detection_seller_type ON detection_results (seller_id, anomaly_type);",
        )
        .map_err(|e| RepositoryError::Transient(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn upsert(&self, kind: RecordKind, records: Vec<Record>) -> Result<u64, RepositoryError> {
        let table = entity_table(kind);
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(|e| RepositoryError::Transient(e.to_string()))?;
        let mut count = 0u64;
        for record in &records {
            let payload = serde_json::to_string(record).map_err(|e| RepositoryError::Transient(e.to_string()))?;
            tx.execute(
                &format!(
                    "INSERT INTO {table} (seller_id, entity_id, event_date, payload)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(seller_id, entity_id) DO UPDATE SET event_date = excluded.event_date, payload = excluded.payload"
                ),
                params![
                    record.seller_id(),
                    record.entity_id(),
                    record_event_date(record).to_rfc3339(),
                    payload
                ],
            )
            .map_err(|e| RepositoryError::Transient(e.to_string()))?;
            count += 1;
        }
        tx.commit().map_err(|e| RepositoryError::Transient(e.to_string()))?;
        Ok(count)
    }

    async fn read_range(
        &self,
        seller_id: &str,
        kind: RecordKind,
        window: TimeWindow,
    ) -> Result<Vec<Record>, RepositoryError> {
        let table = entity_table(kind);
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT payload FROM {table} WHERE seller_id = ?1 AND event_date >= ?2 AND event_date <= ?3"
            ))
            .map_err(|e| RepositoryError::Transient(e.to_string()))?;
        let rows = stmt
            .query_map(
                params![seller_id, window.start.to_rfc3339(), window.end.to_rfc3339()],
                |row| row.get::<_, String>(0),
            )
            .map_err(|e| RepositoryError::Transient(e.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            let payload = row.map_err(|e| RepositoryError::Transient(e.to_string()))?;
            let record: Record = serde_json::from_str(&payload).map_err(|e| RepositoryError::Transient(e.to_string()))?;
            out.push(record);
        }
        Ok(out)
    }

    async fn create_sync_run(&self, run: &SyncRun) -> Result<(), RepositoryError> {
        let conn = self.conn.lock().unwrap();
        let existing: Option<String> = conn
            .query_row(
                "SELECT status FROM sync_runs WHERE seller_id = ?1 AND status IN ('pending','running')",
                params![run.seller_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::Transient(e.to_string()))?;
        if existing.is_some() {
            return Err(RepositoryError::Conflict);
        }
        let payload = serde_json::to_string(run).map_err(|e| RepositoryError::Transient(e.to_string()))?;
        conn.execute(
            "INSERT INTO sync_runs (sync_id, seller_id, status, started_at, payload) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![run.sync_id, run.seller_id, status_str(run.status), run.started_at.to_rfc3339(), payload],
        )
        .map_err(|e| RepositoryError::Transient(e.to_string()))?;
        Ok(())
    }

    async fn update_sync_run(&self, run: &SyncRun) -> Result<(), RepositoryError> {
        let conn = self.conn.lock().unwrap();
        let payload = serde_json::to_string(run).map_err(|e| RepositoryError::Transient(e.to_string()))?;
        let changed = conn
            .execute(
                "UPDATE sync_runs SET status = ?1, payload = ?2 WHERE sync_id = ?3",
                params![status_str(run.status), payload, run.sync_id],
            )
            .map_err(|e| RepositoryError::Transient(e.to_string()))?;
        if changed == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn read_active_sync_run(&self, seller_id: &str) -> Result<Option<SyncRun>, RepositoryError> {
        let conn = self.conn.lock().unwrap();
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM sync_runs WHERE seller_id = ?1 AND status IN ('pending','running') LIMIT 1",
                params![seller_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::Transient(e.to_string()))?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(|e| RepositoryError::Transient(e.to_string())))
            .transpose()
    }

    async fn list_sync_runs(&self, seller_id: &str, limit: u32, offset: u32) -> Result<Vec<SyncRun>, RepositoryError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT payload FROM sync_runs WHERE seller_id = ?1 ORDER BY started_at DESC LIMIT ?2 OFFSET ?3")
            .map_err(|e| RepositoryError::Transient(e.to_string()))?;
        let rows = stmt
            .query_map(params![seller_id, limit, offset], |row| row.get::<_, String>(0))
            .map_err(|e| RepositoryError::Transient(e.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            let payload = row.map_err(|e| RepositoryError::Transient(e.to_string()))?;
            out.push(serde_json::from_str(&payload).map_err(|e| RepositoryError::Transient(e.to_string()))?);
        }
        Ok(out)
    }

    async fn insert_detection_results(&self, results: Vec<DetectionResult>) -> Result<(), RepositoryError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(|e| RepositoryError::Transient(e.to_string()))?;
        for result in &results {
            let payload = serde_json::to_string(result).map_err(|e| RepositoryError::Transient(e.to_string()))?;
            tx.execute(
                "INSERT OR REPLACE INTO detection_results (detection_id, seller_id, sync_id, anomaly_type, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![result.detection_id, result.seller_id, result.sync_id, result.anomaly_type, payload],
            )
            .map_err(|e| RepositoryError::Transient(e.to_string()))?;
        }
        tx.commit().map_err(|e| RepositoryError::Transient(e.to_string()))?;
        Ok(())
    }

    async fn read_detection_results(&self, seller_id: &str, sync_id: &str) -> Result<Vec<DetectionResult>, RepositoryError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT payload FROM detection_results WHERE seller_id = ?1 AND sync_id = ?2")
            .map_err(|e| RepositoryError::Transient(e.to_string()))?;
        let rows = stmt
            .query_map(params![seller_id, sync_id], |row| row.get::<_, String>(0))
            .map_err(|e| RepositoryError::Transient(e.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            let payload = row.map_err(|e| RepositoryError::Transient(e.to_string()))?;
            out.push(serde_json::from_str(&payload).map_err(|e| RepositoryError::Transient(e.to_string()))?);
        }
        Ok(out)
    }
}

fn status_str(status: crate::domain::SyncStatus) -> &'static str {
    use crate::domain::SyncStatus::*;
    match status {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

/// Helper used by detectors for default window construction.
pub fn window_ending_now(days: i64) -> TimeWindow {
    let end = Utc::now();
    let start = end - chrono::Duration::days(days);
    TimeWindow { start, end }
}
