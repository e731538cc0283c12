//! Fetches pages of the six record kinds for a `(seller, window)`. Purely
//! I/O; the live marketplace transport (auth, rate limits, wire format) is
//! out of scope — this trait is the seam the core pipeline depends on.

pub mod circuit;
pub mod mock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Record, RecordKind};
use crate::error::MarketplaceError;

#[derive(Debug, Clone)]
pub struct Page {
    pub records: Vec<Record>,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait MarketplaceClient: Send + Sync {
    async fn fetch_page(
        &self,
        kind: RecordKind,
        seller_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        cursor: Option<String>,
    ) -> Result<Page, MarketplaceError>;
}

/// Loop a client until its cursor exhausts, yielding every page. Retries
/// transient errors per page with exponential backoff + full jitter,
/// capped at `max_attempts`, adapted from the teacher's
/// `exchange::retry::retry_async`.
pub async fn fetch_all_pages(
    client: &dyn MarketplaceClient,
    kind: RecordKind,
    seller_id: &str,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    max_attempts: u32,
) -> Result<Vec<Page>, MarketplaceError> {
    let mut pages = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = fetch_with_retry(client, kind, seller_id, window_start, window_end, cursor.clone(), max_attempts).await?;
        cursor = page.next_cursor.clone();
        let exhausted = cursor.is_none();
        pages.push(page);
        if exhausted {
            break;
        }
    }
    Ok(pages)
}

async fn fetch_with_retry(
    client: &dyn MarketplaceClient,
    kind: RecordKind,
    seller_id: &str,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    cursor: Option<String>,
    max_attempts: u32,
) -> Result<Page, MarketplaceError> {
    use rand::Rng;

    let mut last_err = None;
    for attempt in 0..max_attempts {
        match client.fetch_page(kind, seller_id, window_start, window_end, cursor.clone()).await {
            Ok(page) => return Ok(page),
            Err(MarketplaceError::Permanent(msg)) => return Err(MarketplaceError::Permanent(msg)),
            Err(e @ MarketplaceError::Transient(_)) => {
                last_err = Some(e);
                if attempt + 1 < max_attempts {
                    let base_ms = 100u64 * 2u64.pow(attempt);
                    let capped = base_ms.min(30_000);
                    let jitter_ms = rand::thread_rng().gen_range(0..=capped);
                    tokio::time::sleep(std::time::Duration::from_millis(jitter_ms)).await;
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| MarketplaceError::Transient("exhausted retries".to_string())))
}
