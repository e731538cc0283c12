//! In-memory marketplace client used by tests and as the default adapter
//! when no live credentials are configured, mirroring the teacher's
//! stub-vs-live `NullAdapter` pattern in `adapter::unified`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::{Record, RecordKind};
use crate::error::MarketplaceError;

use super::{MarketplaceClient, Page};

/// Pages are pre-loaded per `(seller_id, kind)` and served back one at a
/// time following their cursor chain, so tests can exercise paging and
/// partial-page ingestion without a real network.
#[derive(Default)]
pub struct MockMarketplaceClient {
    pages: Mutex<HashMap<(String, RecordKind), Vec<Page>>>,
}

impl MockMarketplaceClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, seller_id: &str, kind: RecordKind, records: Vec<Record>) {
        let mut pages = self.pages.lock().unwrap();
        pages.insert((seller_id.to_string(), kind), vec![Page { records, next_cursor: None }]);
    }

    pub fn seed_pages(&self, seller_id: &str, kind: RecordKind, pages: Vec<Page>) {
        let mut store = self.pages.lock().unwrap();
        store.insert((seller_id.to_string(), kind), pages);
    }
}

#[async_trait]
impl MarketplaceClient for MockMarketplaceClient {
    async fn fetch_page(
        &self,
        kind: RecordKind,
        seller_id: &str,
        _window_start: DateTime<Utc>,
        _window_end: DateTime<Utc>,
        cursor: Option<String>,
    ) -> Result<Page, MarketplaceError> {
        let pages = self.pages.lock().unwrap();
        let chain = pages.get(&(seller_id.to_string(), kind)).cloned().unwrap_or_default();
        let index: usize = cursor.as_deref().and_then(|c| c.parse().ok()).unwrap_or(0);
        match chain.get(index) {
            Some(page) => {
                let mut page = page.clone();
                if index + 1 < chain.len() {
                    page.next_cursor = Some((index + 1).to_string());
                } else {
                    page.next_cursor = None;
                }
                Ok(page)
            }
            None => Ok(Page { records: Vec::new(), next_cursor: None }),
        }
    }
}
