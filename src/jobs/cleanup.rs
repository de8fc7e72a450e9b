//! Background job: periodic ScrapingLog/EnrichmentLog retention.
//!
//! The logs are append-only audit records (spec.md §3) — this job only
//! ever deletes rows past a retention window, never mutates a surviving
//! row.

use sqlx::PgPool;
use std::time::Duration;
use tokio::time;

use crate::store::postgres::PgStore;

const DEFAULT_RETENTION_DAYS: i64 = 90;
const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Spawns the hourly retention sweep. Call once at startup.
pub fn spawn(pool: PgPool) {
    tokio::spawn(async move {
        let store = PgStore::from_pool(pool);
        let mut interval = time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            match store.delete_logs_older_than(DEFAULT_RETENTION_DAYS).await {
                Ok(deleted) if deleted > 0 => {
                    tracing::info!(deleted, "expired old scraping/enrichment logs");
                }
                Ok(_) => {}
                Err(e) => tracing::error!("log retention sweep failed: {e}"),
            }
        }
    });
}
