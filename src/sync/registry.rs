//! The single in-process mapping of `sellerId -> active syncId`. This is
//! the only cross-task shared mutable state in the crate (besides the
//! event bus's subscriber sets); all mutation goes through this one
//! serialization point, mirroring the teacher's convention of owning
//! shared fields (`CircuitBreaker`, `OrderBook`) from a single call site
//! rather than scattering locks through handlers.

use std::collections::HashMap;
use tokio::sync::Mutex;

pub struct SyncRegistry {
    active: Mutex<HashMap<String, String>>,
}

impl SyncRegistry {
    pub fn new() -> Self {
        Self { active: Mutex::new(HashMap::new()) }
    }

    /// Register `sync_id` as the active run for `seller_id`. Returns
    /// `false` if a run is already registered.
    pub async fn try_start(&self, seller_id: &str, sync_id: &str) -> bool {
        let mut active = self.active.lock().await;
        if active.contains_key(seller_id) {
            return false;
        }
        active.insert(seller_id.to_string(), sync_id.to_string());
        true
    }

    pub async fn finish(&self, seller_id: &str) {
        let mut active = self.active.lock().await;
        active.remove(seller_id);
    }
}

impl Default for SyncRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn at_most_one_active_run_per_seller() {
        let registry = SyncRegistry::new();
        assert!(registry.try_start("S1", "sync-1").await);
        assert!(!registry.try_start("S1", "sync-2").await);
        registry.finish("S1").await;
        assert!(registry.try_start("S1", "sync-3").await);
    }
}
