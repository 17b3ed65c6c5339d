//! The cache handle exposed to the host application.
//!
//! Constructed once at application startup and passed by reference to
//! callers. `initialize` must be called before use and is idempotent; if
//! the backing store cannot be opened the failure is surfaced once and the
//! cache thereafter behaves as an always-empty, always-miss cache instead
//! of repeatedly failing, so a degraded cache never blocks the host's
//! primary path.

use chrono::Utc;
use tokio::sync::OnceCell;

use super::connection::CacheDb;
use super::metrics::{CacheMetrics, MetricsCollector, hit_ratio};
use super::optimizer::{OptimizeReport, run_optimize};
use super::records::{CachedRecord, ProductSnapshot};
use super::search::run_search;
use crate::Error;
use crate::config::CacheConfig;

/// Adaptive offline product cache.
pub struct ProductCache {
    config: CacheConfig,
    /// Set exactly once by `initialize`; None inside means degraded mode.
    db: OnceCell<Option<CacheDb>>,
    metrics: MetricsCollector,
}

impl ProductCache {
    /// Create an uninitialized cache handle.
    pub fn new(config: CacheConfig) -> Self {
        Self { config, db: OnceCell::new(), metrics: MetricsCollector::default() }
    }

    /// Open the backing store and run migrations. Idempotent.
    ///
    /// On the first call a storage failure is returned to the caller as a
    /// non-fatal warning; subsequent calls return Ok regardless, and every
    /// operation on a degraded cache reports a miss or no-ops.
    pub async fn initialize(&self) -> Result<(), Error> {
        if self.db.initialized() {
            return Ok(());
        }
        match CacheDb::open(&self.config.db_path).await {
            Ok(db) => {
                self.metrics.reset();
                let _ = self.db.set(Some(db));
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    db_path = %self.config.db_path.display(),
                    "cache storage unavailable; continuing degraded (every lookup misses)"
                );
                let _ = self.db.set(None);
                Err(e)
            }
        }
    }

    /// Create an initialized cache over an in-memory database, for testing.
    pub async fn open_in_memory(config: CacheConfig) -> Result<Self, Error> {
        let cache = Self::new(config);
        let db = CacheDb::open_in_memory().await?;
        let _ = cache.db.set(Some(db));
        Ok(cache)
    }

    fn store(&self) -> Option<&CacheDb> {
        self.db.get().and_then(Option::as_ref)
    }

    /// Ingest a batch of product snapshots at the given priority (1-5),
    /// then run an optimizer pass.
    ///
    /// The batch is applied as a single transaction; on failure the store
    /// is untouched and the error carries every attempted id for retry.
    /// Returns the number of records applied.
    pub async fn ingest(&self, snapshots: &[ProductSnapshot], priority: u8) -> Result<u64, Error> {
        if !(1..=5).contains(&priority) {
            return Err(Error::InvalidInput(format!(
                "ingestion priority must be 1-5, got {priority}"
            )));
        }
        let Some(db) = self.store() else {
            // Dropping ingested data silently would cause silent staleness.
            return Err(Error::StorageUnavailable("cache is degraded or uninitialized".into()));
        };
        let applied = db.put_batch(snapshots, priority, Utc::now()).await?;
        run_optimize(db, &self.config, Utc::now()).await?;
        Ok(applied)
    }

    /// Look up a record by product id, bumping its usage counters on hit.
    pub async fn lookup(&self, id: &str) -> Result<Option<CachedRecord>, Error> {
        let Some(db) = self.store() else {
            self.metrics.record_miss();
            return Ok(None);
        };
        let record = db.get_record(id, Utc::now()).await?;
        match record {
            Some(_) => self.metrics.record_hit(),
            None => self.metrics.record_miss(),
        }
        Ok(record)
    }

    /// Search by name, code, or category substring, relevance-ranked,
    /// truncated to `limit`.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<CachedRecord>, Error> {
        let Some(db) = self.store() else {
            if !super::score::normalize_query(query).is_empty() && limit > 0 {
                self.metrics.record_miss();
            }
            return Ok(Vec::new());
        };
        run_search(db, &self.metrics, query, limit, self.config.index_max_terms, Utc::now()).await
    }

    /// The most eviction-resistant records, priority descending, ties in
    /// natural store order.
    pub async fn high_priority_records(&self, limit: usize) -> Result<Vec<CachedRecord>, Error> {
        let Some(db) = self.store() else {
            return Ok(Vec::new());
        };
        db.high_priority_records(limit).await
    }

    /// Run a maintenance pass: evict old/unused/idle records and refresh
    /// retention priorities.
    pub async fn optimize(&self) -> Result<OptimizeReport, Error> {
        let Some(db) = self.store() else {
            return Ok(OptimizeReport::default());
        };
        run_optimize(db, &self.config, Utc::now()).await
    }

    /// A freshly computed metrics snapshot; totals and size are recomputed
    /// from the store on every call.
    pub async fn metrics(&self) -> Result<CacheMetrics, Error> {
        let cache_hits = self.metrics.hits();
        let cache_misses = self.metrics.misses();
        let ratio = hit_ratio(cache_hits, cache_misses);

        let Some(db) = self.store() else {
            return Ok(CacheMetrics {
                total_records: 0,
                cache_hits,
                cache_misses,
                last_sync_time: None,
                approx_size_bytes: 0,
                hit_ratio: ratio,
            });
        };

        Ok(CacheMetrics {
            total_records: db.record_count().await?,
            cache_hits,
            cache_misses,
            last_sync_time: db.last_sync_time().await?,
            approx_size_bytes: db.approx_size_bytes().await?,
            hit_ratio: ratio,
        })
    }

    /// Explicit bulk clear of every record and index entry.
    ///
    /// Returns the number of records removed. Hit/miss counters are kept;
    /// they reset only on re-initialization.
    pub async fn clear(&self) -> Result<u64, Error> {
        let Some(db) = self.store() else {
            return Ok(0);
        };
        db.clear_records().await
    }
}
