//! Orchestrates the marketplace client and repository: normalize pages into
//! the canonical entity shape, derive computed fields, and upsert in
//! batches, continuing past a permanent failure in one record kind so the
//! other five still land.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::{Counts, RecordKind};
use crate::error::{MarketplaceError, RepositoryError};
use crate::marketplace::circuit::CircuitBreaker;
use crate::marketplace::{fetch_all_pages, MarketplaceClient};
use crate::repository::{Repository, TimeWindow};
use crate::sync::events::{SyncEvent, SyncEventBus};

/// Consecutive per-kind failures within one sync before the run-level
/// breaker trips and the remaining kinds are skipped rather than retried.
const CIRCUIT_FAILURE_THRESHOLD: u32 = 3;

/// Local retry budget for a single upsert batch that fails with a
/// [`RepositoryError::Transient`]. Independent of `max_attempts`, which
/// bounds marketplace page fetches rather than repository writes.
const UPSERT_MAX_ATTEMPTS: u32 = 3;

pub struct IngestionOutcome {
    pub counts: Counts,
    /// Per-kind failures that did not abort the whole run (§7: permanent
    /// upstream failures fail only the enclosing page's kind).
    pub kind_failures: Vec<(RecordKind, String)>,
}

/// Why a single record kind's ingestion step failed. Both variants are
/// handled identically by the caller (count as a kind failure, trip the
/// circuit breaker) but are logged distinctly.
enum IngestKindError {
    Marketplace(MarketplaceError),
    Upsert(String),
}

impl From<MarketplaceError> for IngestKindError {
    fn from(e: MarketplaceError) -> Self {
        IngestKindError::Marketplace(e)
    }
}

pub async fn ingest(
    repo: &dyn Repository,
    client: &dyn MarketplaceClient,
    bus: &SyncEventBus,
    seller_id: &str,
    sync_id: &str,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    batch_size: usize,
    max_attempts: u32,
    token: &CancellationToken,
) -> Result<IngestionOutcome, anyhow::Error> {
    let mut counts = Counts::default();
    let mut kind_failures = Vec::new();
    let mut breaker = CircuitBreaker::new(CIRCUIT_FAILURE_THRESHOLD);

    for kind in RecordKind::ALL {
        if token.is_cancelled() {
            break;
        }

        if !breaker.allow() {
            warn!(seller_id, ?kind, "marketplace circuit open, skipping remaining kinds for this sync");
            kind_failures.push((kind, "skipped: marketplace circuit open".to_string()));
            continue;
        }

        match ingest_kind(repo, client, seller_id, window_start, window_end, kind, batch_size, max_attempts, token).await {
            Ok(n) => {
                breaker.record_success();
                add_count(&mut counts, kind, n);
                bus.publish(SyncEvent::progress(
                    sync_id,
                    seller_id,
                    "ingestion",
                    serde_json::json!({"kind": format!("{:?}", kind), "upserted": n}),
                ));
            }
            Err(IngestKindError::Marketplace(MarketplaceError::Permanent(msg))) => {
                breaker.record_failure();
                warn!(seller_id, ?kind, error = %msg, "permanent ingestion failure for kind, continuing with others");
                kind_failures.push((kind, msg));
            }
            Err(IngestKindError::Marketplace(MarketplaceError::Transient(msg))) => {
                // Exhausted retries at the page level; treat like a permanent
                // failure for this kind rather than failing the whole run.
                breaker.record_failure();
                warn!(seller_id, ?kind, error = %msg, "transient ingestion failure exhausted retries for kind");
                kind_failures.push((kind, msg));
            }
            Err(IngestKindError::Upsert(msg)) => {
                breaker.record_failure();
                warn!(seller_id, ?kind, error = %msg, "persistent upsert failure for kind after local retries, continuing with others");
                kind_failures.push((kind, msg));
            }
        }
    }

    if kind_failures.len() == RecordKind::ALL.len() {
        anyhow::bail!("ingestion failed for every record kind");
    }

    info!(seller_id, sync_id, ?counts, "ingestion complete");
    Ok(IngestionOutcome { counts, kind_failures })
}

async fn ingest_kind(
    repo: &dyn Repository,
    client: &dyn MarketplaceClient,
    seller_id: &str,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    kind: RecordKind,
    batch_size: usize,
    max_attempts: u32,
    token: &CancellationToken,
) -> Result<u64, IngestKindError> {
    let pages = fetch_all_pages(client, kind, seller_id, window_start, window_end, max_attempts).await?;
    let mut total = 0u64;
    let mut batch = Vec::with_capacity(batch_size);
    'pages: for page in pages {
        for record in page.records {
            batch.push(normalize(record));
            if batch.len() >= batch_size {
                total += upsert_batch_with_retry(repo, kind, std::mem::take(&mut batch)).await?;
                if token.is_cancelled() {
                    break 'pages;
                }
            }
        }
        if token.is_cancelled() {
            break;
        }
    }
    if !batch.is_empty() {
        total += upsert_batch_with_retry(repo, kind, batch).await?;
    }
    Ok(total)
}

/// Retries a batch up to [`UPSERT_MAX_ATTEMPTS`] times on
/// [`RepositoryError::Transient`], with the same exponential-backoff-plus-
/// jitter shape as `marketplace::fetch_with_retry`. Any other repository
/// error fails the batch (and so the kind) immediately.
async fn upsert_batch_with_retry(repo: &dyn Repository, kind: RecordKind, mut batch: Vec<crate::domain::Record>) -> Result<u64, IngestKindError> {
    use rand::Rng;

    let mut last_err = None;
    for attempt in 0..UPSERT_MAX_ATTEMPTS {
        let attempt_batch = if attempt + 1 == UPSERT_MAX_ATTEMPTS { std::mem::take(&mut batch) } else { batch.clone() };
        match repo.upsert(kind, attempt_batch).await {
            Ok(n) => return Ok(n),
            Err(e) if e.retryable() => {
                let msg = e.to_string();
                warn!(?kind, attempt, error = %msg, "transient upsert failure, retrying");
                last_err = Some(msg);
                if attempt + 1 < UPSERT_MAX_ATTEMPTS {
                    let base_ms = 50u64 * 2u64.pow(attempt);
                    let jitter_ms = rand::thread_rng().gen_range(0..=base_ms.min(2_000));
                    tokio::time::sleep(std::time::Duration::from_millis(jitter_ms)).await;
                }
            }
            Err(e @ RepositoryError::NotFound) | Err(e @ RepositoryError::Conflict) => {
                return Err(IngestKindError::Upsert(e.to_string()));
            }
        }
    }
    Err(IngestKindError::Upsert(last_err.unwrap_or_else(|| "exhausted upsert retries".to_string())))
}

/// Derive computed fields. Shipment `missing_qty` is computed on read via
/// `Shipment::missing_qty`; this normalization step exists for future
/// per-kind adjustments and keeps the pipeline's normalize-then-upsert
/// shape explicit.
fn normalize(record: crate::domain::Record) -> crate::domain::Record {
    record
}

fn add_count(counts: &mut Counts, kind: RecordKind, n: u64) {
    match kind {
        RecordKind::Orders => counts.orders += n,
        RecordKind::Shipments => counts.shipments += n,
        RecordKind::Returns => counts.returns += n,
        RecordKind::Settlements => counts.settlements += n,
        RecordKind::InventoryLedger => counts.inventory += n,
        RecordKind::FinancialEvents => counts.financial_events += n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Order, Record};
    use crate::marketplace::mock::MockMarketplaceClient;
    use crate::repository::sqlite::SqliteRepository;

    fn order(seller: &str, id: &str) -> Record {
        Record::Order(Order {
            seller_id: seller.to_string(),
            order_id: id.to_string(),
            order_date: Utc::now(),
            total_amount: 50.0,
            currency: "USD".to_string(),
            status: "shipped".to_string(),
            channel: "amazon".to_string(),
            raw_payload: serde_json::json!({}),
        })
    }

    #[tokio::test]
    async fn ingesting_same_page_twice_is_idempotent() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let client = MockMarketplaceClient::new();
        client.seed("S1", RecordKind::Orders, vec![order("S1", "O1"), order("S1", "O2")]);
        let bus = SyncEventBus::new();
        let start = Utc::now() - chrono::Duration::days(1);
        let end = Utc::now();
        let token = CancellationToken::new();

        let first = ingest(&repo, &client, &bus, "S1", "sync-1", start, end, 1000, 1, &token).await.unwrap();
        let second = ingest(&repo, &client, &bus, "S1", "sync-1", start, end, 1000, 1, &token).await.unwrap();

        assert_eq!(first.counts.orders, 2);
        assert_eq!(second.counts.orders, 2);

        let window = TimeWindow { start: start - chrono::Duration::days(1), end: end + chrono::Duration::days(1) };
        let rows = repo.read_range("S1", RecordKind::Orders, window).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn a_cancelled_token_stops_ingestion_before_remaining_kinds() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let client = MockMarketplaceClient::new();
        client.seed("S1", RecordKind::Orders, vec![order("S1", "O1")]);
        let bus = SyncEventBus::new();
        let start = Utc::now() - chrono::Duration::days(1);
        let end = Utc::now();
        let token = CancellationToken::new();
        token.cancel();

        let outcome = ingest(&repo, &client, &bus, "S1", "sync-1", start, end, 1000, 1, &token).await.unwrap();
        assert_eq!(outcome.counts.orders, 0);
        assert!(outcome.kind_failures.is_empty());
    }
}
