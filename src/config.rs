//! Runtime configuration, loaded entirely from the environment.
//!
//! Every tunable in this struct corresponds to one of the enumerated
//! configuration keys; defaults match exactly.

#[derive(Clone, Debug)]
pub struct Config {
    pub sync_interval_hours: u64,
    pub min_hours_between_syncs: u64,
    pub market_page_timeout_s: u64,
    pub market_page_retries: u32,
    pub upsert_batch_size: usize,
    pub fee_drift_baseline_days: u32,
    pub fee_drift_min_history_days: u32,
    pub fee_drift_min_samples: usize,
    pub micro_leak_min_occurrences: usize,
    pub micro_leak_min_value: f64,
    pub correlation_lookback_days: i64,
    pub deadline_days: i64,
    pub sync_hard_cap_hours: u64,
    pub global_sync_concurrency: usize,
    pub sqlite_path: String,
    pub http_bind: String,
    pub scheduler_stagger_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            sync_interval_hours: env_parse("SYNC_INTERVAL_HOURS", 1),
            min_hours_between_syncs: env_parse("MIN_HOURS_BETWEEN_SYNCS", 1),
            market_page_timeout_s: env_parse("MARKET_PAGE_TIMEOUT_S", 30),
            market_page_retries: env_parse("MARKET_PAGE_RETRIES", 5),
            upsert_batch_size: env_parse("UPSERT_BATCH_SIZE", 1000),
            fee_drift_baseline_days: env_parse("FEE_DRIFT_BASELINE_DAYS", 30),
            fee_drift_min_history_days: env_parse("FEE_DRIFT_MIN_HISTORY_DAYS", 45),
            fee_drift_min_samples: env_parse("FEE_DRIFT_MIN_SAMPLES", 10),
            micro_leak_min_occurrences: env_parse("MICRO_LEAK_MIN_OCCURRENCES", 50),
            micro_leak_min_value: env_parse("MICRO_LEAK_MIN_VALUE", 25.0),
            correlation_lookback_days: env_parse("CORRELATION_LOOKBACK_DAYS", 90),
            deadline_days: env_parse("DEADLINE_DAYS", 60),
            sync_hard_cap_hours: env_parse("SYNC_HARD_CAP_HOURS", 2),
            global_sync_concurrency: env_parse("GLOBAL_SYNC_CONCURRENCY", 8),
            sqlite_path: std::env::var("SQLITE_PATH").unwrap_or_else(|_| "./reclaim.sqlite".to_string()),
            http_bind: std::env::var("HTTP_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            scheduler_stagger_secs: env_parse("SCHEDULER_STAGGER_SECS", 2),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        // Clear to avoid bleed from the host environment in CI.
        for key in ["SYNC_INTERVAL_HOURS", "UPSERT_BATCH_SIZE", "DEADLINE_DAYS"] {
            std::env::remove_var(key);
        }
        let cfg = Config::from_env();
        assert_eq!(cfg.sync_interval_hours, 1);
        assert_eq!(cfg.upsert_batch_size, 1000);
        assert_eq!(cfg.deadline_days, 60);
    }
}
