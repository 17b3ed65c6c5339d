//! Periodic maintenance pass: eviction and priority refresh.
//!
//! Runs after every ingestion batch and may be scheduled by the host during
//! idle periods. The pass is idempotent: a second run with no intervening
//! reads or writes evicts nothing and reprioritizes nothing.

use super::connection::CacheDb;
use super::priority::retention_priority;
use super::records::CachedRecord;
use crate::Error;
use crate::config::CacheConfig;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// What a single optimizer pass did.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OptimizeReport {
    pub evicted: u64,
    pub reprioritized: u64,
}

/// Conjunctive eviction predicate.
///
/// A record is removed only if it is simultaneously old (last ingested
/// beyond the sync threshold), unused (never a hit), and idle (not touched
/// within the idle threshold). Any one of fresh ingestion, a past hit, or a
/// recent touch protects it.
pub(crate) fn should_evict(
    record: &CachedRecord,
    now: DateTime<Utc>,
    stale_after: Duration,
    idle_after: Duration,
) -> bool {
    now.signed_duration_since(record.last_sync) > stale_after
        && record.usage.hits < 1
        && now.signed_duration_since(record.usage.last_access) > idle_after
}

/// Run one maintenance pass over the whole store.
pub(crate) async fn run_optimize(
    db: &CacheDb,
    config: &CacheConfig,
    now: DateTime<Utc>,
) -> Result<OptimizeReport, Error> {
    let stale_after = Duration::days(config.evict_after_days);
    let idle_after = Duration::hours(config.evict_idle_hours);

    let records = db.all_records().await?;
    let (doomed, survivors): (Vec<CachedRecord>, Vec<CachedRecord>) = records
        .into_iter()
        .partition(|r| should_evict(r, now, stale_after, idle_after));

    let doomed_ids: Vec<String> = doomed.into_iter().map(|r| r.id).collect();
    let evicted = db.remove_records(&doomed_ids).await?;
    if evicted > 0 {
        db.index_prune(&doomed_ids).await?;
    }

    let changes: Vec<(String, u8)> = survivors
        .iter()
        .filter_map(|r| {
            let fresh = retention_priority(r.usage.hits, r.usage.last_access, now);
            (fresh != r.usage.priority).then(|| (r.id.clone(), fresh))
        })
        .collect();
    let reprioritized = db.update_priorities(&changes).await?;

    tracing::debug!(evicted, reprioritized, "optimizer pass complete");

    Ok(OptimizeReport { evicted, reprioritized })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::records::ProductSnapshot;
    use tokio_rusqlite::params;

    fn snapshot(id: &str) -> ProductSnapshot {
        ProductSnapshot {
            id: id.to_string(),
            name: format!("Product {id}"),
            code: format!("code-{id}"),
            category: None,
            price: 500.0,
            stock: 3.0,
            is_weight_based: None,
            image_ref: None,
        }
    }

    /// Backdate a record's bookkeeping to simulate an old, idle entry.
    async fn backdate(
        db: &CacheDb,
        id: &str,
        last_sync: DateTime<Utc>,
        last_access: DateTime<Utc>,
    ) {
        let id = id.to_string();
        let sync = last_sync.to_rfc3339();
        let access = last_access.to_rfc3339();
        db.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "UPDATE records SET last_sync = ?2, last_access = ?3 WHERE id = ?1",
                    params![id, sync, access],
                )?;
                Ok(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_evicts_old_unused_idle_records() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let now = Utc::now();
        db.put_batch(&[snapshot("old"), snapshot("fresh")], 1, now).await.unwrap();
        backdate(&db, "old", now - Duration::days(40), now - Duration::days(40)).await;

        let report = run_optimize(&db, &CacheConfig::default(), now).await.unwrap();
        assert_eq!(report.evicted, 1);
        assert!(db.get_record("old", now).await.unwrap().is_none());
        assert!(db.get_record("fresh", now).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_hit_record_never_evicted() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let now = Utc::now();
        db.put_batch(&[snapshot("p1")], 1, now).await.unwrap();
        // One hit, then aged far past every threshold.
        db.get_record("p1", now).await.unwrap();
        backdate(&db, "p1", now - Duration::days(400), now - Duration::days(400)).await;

        let report = run_optimize(&db, &CacheConfig::default(), now).await.unwrap();
        assert_eq!(report.evicted, 0);
    }

    #[tokio::test]
    async fn test_recent_ingest_protects_record() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let now = Utc::now();
        db.put_batch(&[snapshot("p1")], 1, now).await.unwrap();
        // Idle long past the threshold but synced recently.
        backdate(&db, "p1", now - Duration::days(2), now - Duration::days(40)).await;

        let report = run_optimize(&db, &CacheConfig::default(), now).await.unwrap();
        assert_eq!(report.evicted, 0);
    }

    #[tokio::test]
    async fn test_recent_access_protects_record() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let now = Utc::now();
        db.put_batch(&[snapshot("p1")], 1, now).await.unwrap();
        backdate(&db, "p1", now - Duration::days(40), now - Duration::hours(2)).await;

        let report = run_optimize(&db, &CacheConfig::default(), now).await.unwrap();
        assert_eq!(report.evicted, 0);
    }

    #[tokio::test]
    async fn test_refreshes_priorities_of_survivors() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let now = Utc::now();
        db.put_batch(&[snapshot("p1")], 1, now).await.unwrap();
        // 10 hits with a recent access: expect tier 3 + recency boost 2 = 5.
        for _ in 0..10 {
            db.get_record("p1", now).await.unwrap();
        }

        let report = run_optimize(&db, &CacheConfig::default(), now).await.unwrap();
        assert_eq!(report.reprioritized, 1);
        let record = db.records_by_ids(&["p1".to_string()]).await.unwrap().remove(0);
        assert_eq!(record.usage.priority, 5);
    }

    #[tokio::test]
    async fn test_unchanged_priority_not_rewritten() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let now = Utc::now();
        // Ingested at priority 3; zero hits with a fresh access also computes 3.
        db.put_batch(&[snapshot("p1")], 3, now).await.unwrap();

        let report = run_optimize(&db, &CacheConfig::default(), now).await.unwrap();
        assert_eq!(report.reprioritized, 0);
    }

    #[tokio::test]
    async fn test_idempotent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let now = Utc::now();
        db.put_batch(&[snapshot("a"), snapshot("b"), snapshot("c")], 1, now).await.unwrap();
        backdate(&db, "a", now - Duration::days(40), now - Duration::days(40)).await;
        for _ in 0..7 {
            db.get_record("b", now).await.unwrap();
        }

        let first = run_optimize(&db, &CacheConfig::default(), now).await.unwrap();
        assert!(first.evicted > 0 || first.reprioritized > 0);

        let second = run_optimize(&db, &CacheConfig::default(), now).await.unwrap();
        assert_eq!(second.evicted, 0);
        assert_eq!(second.reprioritized, 0);
    }

    #[tokio::test]
    async fn test_eviction_prunes_index_terms() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let now = Utc::now();
        db.put_batch(&[snapshot("old")], 1, now).await.unwrap();
        db.index_put("product", &["old".to_string()], now, 512).await.unwrap();
        backdate(&db, "old", now - Duration::days(40), now - Duration::days(40)).await;

        run_optimize(&db, &CacheConfig::default(), now).await.unwrap();
        assert!(db.index_lookup("product").await.unwrap().is_none());
    }
}
