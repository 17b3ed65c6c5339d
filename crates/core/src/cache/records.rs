//! Record store operations.
//!
//! The records table is the authoritative store of cached product
//! snapshots, keyed uniquely by external product id. Every mutation here
//! runs inside a single transaction on the connection's background thread,
//! so a batch either fully lands or the store is left untouched.

use super::connection::CacheDb;
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A product record as handed to the cache by the host application.
///
/// The cache has no opinion on how or when these are fetched from the
/// remote source; it only ingests them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub id: String,
    pub name: String,
    pub code: String,
    pub category: Option<String>,
    pub price: f64,
    pub stock: f64,
    pub is_weight_based: Option<bool>,
    pub image_ref: Option<String>,
}

/// Per-record usage statistics driving retention priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordUsage {
    /// Monotonic hit counter; never decreases while the record lives.
    pub hits: i64,
    /// Timestamp of the most recent lookup or search selection.
    pub last_access: DateTime<Utc>,
    /// Retention priority, always in 1..=5.
    pub priority: u8,
}

/// A cached product snapshot plus cache bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedRecord {
    pub id: String,
    pub name: String,
    pub code: String,
    pub category: Option<String>,
    pub price: f64,
    pub stock: f64,
    pub is_weight_based: Option<bool>,
    pub image_ref: Option<String>,
    /// Timestamp of the last ingestion of this id.
    pub last_sync: DateTime<Utc>,
    pub usage: RecordUsage,
}

const COLUMNS: &str = "id, name, code, category, price, stock, is_weight_based, image_ref, \
                       last_sync, hits, last_access, priority";

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CachedRecord> {
    let last_sync: String = row.get(8)?;
    let last_access: String = row.get(10)?;
    Ok(CachedRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        code: row.get(2)?,
        category: row.get(3)?,
        price: row.get(4)?,
        stock: row.get(5)?,
        is_weight_based: row.get::<_, Option<i64>>(6)?.map(|v| v != 0),
        image_ref: row.get(7)?,
        last_sync: parse_ts(8, &last_sync)?,
        usage: RecordUsage {
            hits: row.get(9)?,
            last_access: parse_ts(10, &last_access)?,
            priority: row.get::<_, i64>(11)?.clamp(1, 5) as u8,
        },
    })
}

impl CacheDb {
    /// Get a record by id, bumping its usage counters.
    ///
    /// On hit the hit counter and last-access timestamp are updated in the
    /// same transaction as the read, and the returned record reflects the
    /// bumped usage. Returns None on miss without creating a placeholder.
    pub async fn get_record(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CachedRecord>, Error> {
        let id = id.to_string();
        let now_text = now.to_rfc3339();
        self.conn
            .call(move |conn| -> Result<Option<CachedRecord>, Error> {
                let tx = conn.transaction()?;
                let found = {
                    let mut stmt =
                        tx.prepare(&format!("SELECT {COLUMNS} FROM records WHERE id = ?1"))?;
                    match stmt.query_row(params![id], record_from_row) {
                        Ok(record) => Some(record),
                        Err(rusqlite::Error::QueryReturnedNoRows) => None,
                        Err(e) => return Err(e.into()),
                    }
                };
                let Some(mut record) = found else {
                    return Ok(None);
                };
                tx.execute(
                    "UPDATE records SET hits = hits + 1, last_access = ?2 WHERE id = ?1",
                    params![record.id, now_text],
                )?;
                tx.commit()?;
                record.usage.hits += 1;
                record.usage.last_access = now;
                Ok(Some(record))
            })
            .await
            .map_err(Error::from)
    }

    /// Write a batch of product snapshots in a single transaction.
    ///
    /// Absent ids are created with zeroed usage at the given ingestion
    /// priority; present ids have their product fields and last-sync
    /// overwritten while hits and last-access are preserved, and priority
    /// is merged as the greater of the stored and ingested values.
    ///
    /// Returns the number of records applied. On commit failure the store
    /// is left in its pre-transaction state and the error carries every
    /// attempted id so the caller can retry.
    pub async fn put_batch(
        &self,
        snapshots: &[ProductSnapshot],
        ingestion_priority: u8,
        now: DateTime<Utc>,
    ) -> Result<u64, Error> {
        if snapshots.is_empty() {
            return Ok(0);
        }
        let ids: Vec<String> = snapshots.iter().map(|s| s.id.clone()).collect();
        let snapshots = snapshots.to_vec();
        let now_text = now.to_rfc3339();
        let priority = i64::from(ingestion_priority.clamp(1, 5));

        let result = self
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                let mut applied = 0u64;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO records (
                            id, name, code, category, price, stock, is_weight_based, image_ref,
                            last_sync, hits, last_access, priority
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10, ?11)
                        ON CONFLICT(id) DO UPDATE SET
                            name = excluded.name,
                            code = excluded.code,
                            category = excluded.category,
                            price = excluded.price,
                            stock = excluded.stock,
                            is_weight_based = excluded.is_weight_based,
                            image_ref = excluded.image_ref,
                            last_sync = excluded.last_sync,
                            priority = MAX(records.priority, excluded.priority)",
                    )?;
                    for snapshot in &snapshots {
                        applied += stmt.execute(params![
                            snapshot.id,
                            snapshot.name,
                            snapshot.code,
                            snapshot.category,
                            snapshot.price,
                            snapshot.stock,
                            snapshot.is_weight_based.map(i64::from),
                            snapshot.image_ref,
                            now_text,
                            now_text,
                            priority,
                        ])? as u64;
                    }
                }
                tx.commit()?;
                Ok(applied)
            })
            .await;

        result.map_err(|e| Error::Transaction { ids, reason: Error::from(e).to_string() })
    }

    /// Read every record in natural store order.
    ///
    /// Finite and restartable: each call produces a fresh snapshot scan.
    pub async fn all_records(&self) -> Result<Vec<CachedRecord>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<CachedRecord>, Error> {
                let mut stmt =
                    conn.prepare(&format!("SELECT {COLUMNS} FROM records ORDER BY rowid ASC"))?;
                let rows = stmt.query_map([], record_from_row)?;
                let mut records = Vec::new();
                for row in rows {
                    records.push(row?);
                }
                Ok(records)
            })
            .await
            .map_err(Error::from)
    }

    /// Resolve a list of ids, preserving the given order.
    ///
    /// Ids with no live record are silently dropped, so callers holding
    /// stale id sets (the search index) never observe an error.
    pub async fn records_by_ids(&self, ids: &[String]) -> Result<Vec<CachedRecord>, Error> {
        let ids = ids.to_vec();
        self.conn
            .call(move |conn| -> Result<Vec<CachedRecord>, Error> {
                let mut stmt =
                    conn.prepare(&format!("SELECT {COLUMNS} FROM records WHERE id = ?1"))?;
                let mut records = Vec::with_capacity(ids.len());
                for id in &ids {
                    match stmt.query_row(params![id], record_from_row) {
                        Ok(record) => records.push(record),
                        Err(rusqlite::Error::QueryReturnedNoRows) => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                Ok(records)
            })
            .await
            .map_err(Error::from)
    }

    /// Bump hit counters and last-access for the given ids in one
    /// transaction.
    ///
    /// Ids already removed by a concurrent eviction are a benign no-op.
    pub async fn touch_records(&self, ids: &[String], now: DateTime<Utc>) -> Result<u64, Error> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids = ids.to_vec();
        let now_text = now.to_rfc3339();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                let mut touched = 0u64;
                {
                    let mut stmt = tx.prepare(
                        "UPDATE records SET hits = hits + 1, last_access = ?2 WHERE id = ?1",
                    )?;
                    for id in &ids {
                        touched += stmt.execute(params![id, now_text])? as u64;
                    }
                }
                tx.commit()?;
                Ok(touched)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove the given ids in one transaction, returning how many rows
    /// were deleted. Used only by the optimizer.
    pub async fn remove_records(&self, ids: &[String]) -> Result<u64, Error> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids = ids.to_vec();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                let mut removed = 0u64;
                {
                    let mut stmt = tx.prepare("DELETE FROM records WHERE id = ?1")?;
                    for id in &ids {
                        removed += stmt.execute(params![id])? as u64;
                    }
                }
                tx.commit()?;
                Ok(removed)
            })
            .await
            .map_err(Error::from)
    }

    /// Persist recomputed priorities for the given ids in one transaction.
    ///
    /// Callers are expected to pass only the ids whose priority actually
    /// changed, keeping the pass free of redundant writes.
    pub async fn update_priorities(&self, changes: &[(String, u8)]) -> Result<u64, Error> {
        if changes.is_empty() {
            return Ok(0);
        }
        let changes = changes.to_vec();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                let mut updated = 0u64;
                {
                    let mut stmt = tx.prepare("UPDATE records SET priority = ?2 WHERE id = ?1")?;
                    for (id, priority) in &changes {
                        let clamped = i64::from((*priority).clamp(1, 5));
                        updated += stmt.execute(params![id, clamped])? as u64;
                    }
                }
                tx.commit()?;
                Ok(updated)
            })
            .await
            .map_err(Error::from)
    }

    /// Records ordered by retention priority descending, ties in natural
    /// store order.
    pub async fn high_priority_records(&self, limit: usize) -> Result<Vec<CachedRecord>, Error> {
        let limit = limit as i64;
        self.conn
            .call(move |conn| -> Result<Vec<CachedRecord>, Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLUMNS} FROM records ORDER BY priority DESC, rowid ASC LIMIT ?1"
                ))?;
                let rows = stmt.query_map(params![limit], record_from_row)?;
                let mut records = Vec::new();
                for row in rows {
                    records.push(row?);
                }
                Ok(records)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of live records.
    pub async fn record_count(&self) -> Result<i64, Error> {
        self.conn
            .call(|conn| {
                conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))
                    .map_err(Error::from)
            })
            .await
            .map_err(Error::from)
    }

    /// Rough byte size of the cached records.
    ///
    /// Sums the variable-length text columns plus a fixed per-row overhead
    /// for the numeric and timestamp columns.
    pub async fn approx_size_bytes(&self) -> Result<i64, Error> {
        self.conn
            .call(|conn| {
                conn.query_row(
                    "SELECT COALESCE(SUM(
                        LENGTH(id) + LENGTH(name) + LENGTH(code)
                        + COALESCE(LENGTH(category), 0)
                        + COALESCE(LENGTH(image_ref), 0)
                        + 64
                    ), 0) FROM records",
                    [],
                    |row| row.get(0),
                )
                .map_err(Error::from)
            })
            .await
            .map_err(Error::from)
    }

    /// Timestamp of the most recent ingestion across all records.
    pub async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>, Error> {
        let raw: Option<String> = self
            .conn
            .call(|conn| {
                conn.query_row("SELECT MAX(last_sync) FROM records", [], |row| row.get(0))
                    .map_err(Error::from)
            })
            .await
            .map_err(Error::from)?;
        match raw {
            Some(text) => Ok(Some(parse_ts(0, &text).map_err(Error::from)?)),
            None => Ok(None),
        }
    }

    /// Drop every record and index entry in one transaction.
    ///
    /// Returns the number of records removed.
    pub async fn clear_records(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                let removed = tx.execute("DELETE FROM records", [])? as u64;
                tx.execute("DELETE FROM search_index", [])?;
                tx.commit()?;
                Ok(removed)
            })
            .await
            .map_err(Error::from)
    }
}
