//! The narrow store interface the core pipeline depends on. Everything
//! above this trait is storage-agnostic; [`sqlite::SqliteRepository`] is
//! the one provided implementation.

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{DetectionResult, Record, RecordKind, SyncRun};
use crate::error::RepositoryError;

#[derive(Debug, Clone, Copy)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[async_trait]
pub trait Repository: Send + Sync {
    /// Upsert a batch of records keyed on `(seller_id, entity_id)`. Atomic
    /// per batch, safe under retry (re-submitting the same batch must not
    /// duplicate rows).
    async fn upsert(&self, kind: RecordKind, records: Vec<Record>) -> Result<u64, RepositoryError>;

    /// Read all records of a kind for a seller within a time window.
    async fn read_range(
        &self,
        seller_id: &str,
        kind: RecordKind,
        window: TimeWindow,
    ) -> Result<Vec<Record>, RepositoryError>;

    async fn create_sync_run(&self, run: &SyncRun) -> Result<(), RepositoryError>;

    async fn update_sync_run(&self, run: &SyncRun) -> Result<(), RepositoryError>;

    async fn read_active_sync_run(&self, seller_id: &str) -> Result<Option<SyncRun>, RepositoryError>;

    async fn list_sync_runs(&self, seller_id: &str, limit: u32, offset: u32) -> Result<Vec<SyncRun>, RepositoryError>;

    /// Bulk, transactional per SyncRun.
    async fn insert_detection_results(&self, results: Vec<DetectionResult>) -> Result<(), RepositoryError>;

    async fn read_detection_results(&self, seller_id: &str, sync_id: &str) -> Result<Vec<DetectionResult>, RepositoryError>;
}
