//! Search index operations.
//!
//! The search_index table maps a lowercase query term to the JSON-encoded
//! id set of the records that matched it, with a built-at timestamp. It is
//! purely an advisory acceleration structure populated lazily by search;
//! the records table remains the source of truth, and stale entries are
//! healed or dropped by readers rather than treated as errors.

use super::connection::CacheDb;
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A single inverted-index entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub term: String,
    pub record_ids: Vec<String>,
    pub built_at: DateTime<Utc>,
}

impl CacheDb {
    /// Candidate entry for a normalized term, id set in stored order.
    ///
    /// Returns None when the term has never been indexed. An entry whose
    /// JSON payload or timestamp fails to decode is treated as absent; the
    /// next scan overwrites it.
    pub async fn index_lookup(&self, term: &str) -> Result<Option<IndexEntry>, Error> {
        let term = term.to_string();
        let raw: Option<(String, String, String)> = self
            .conn
            .call(move |conn| -> Result<Option<(String, String, String)>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT term, record_ids, built_at FROM search_index WHERE term = ?1",
                )?;
                match stmt.query_row(params![term], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                }) {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        let Some((term, json, built_at)) = raw else {
            return Ok(None);
        };
        let record_ids: Vec<String> = match serde_json::from_str(&json) {
            Ok(ids) => ids,
            Err(_) => return Ok(None),
        };
        let Ok(built_at) = DateTime::parse_from_rfc3339(&built_at) else {
            return Ok(None);
        };
        Ok(Some(IndexEntry { term, record_ids, built_at: built_at.with_timezone(&Utc) }))
    }

    /// Insert or replace the id set for a term, then enforce the term cap
    /// by dropping the oldest entries.
    pub async fn index_put(
        &self,
        term: &str,
        record_ids: &[String],
        built_at: DateTime<Utc>,
        max_terms: usize,
    ) -> Result<(), Error> {
        let term = term.to_string();
        let json = serde_json::to_string(record_ids)
            .map_err(|e| Error::InvalidInput(format!("unencodable id set: {e}")))?;
        let built_at = built_at.to_rfc3339();
        let max_terms = max_terms as i64;

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO search_index (term, record_ids, built_at)
                    VALUES (?1, ?2, ?3)
                    ON CONFLICT(term) DO UPDATE SET
                        record_ids = excluded.record_ids,
                        built_at = excluded.built_at",
                    params![term, json, built_at],
                )?;
                tx.execute(
                    "DELETE FROM search_index WHERE term NOT IN (
                        SELECT term FROM search_index ORDER BY built_at DESC, term ASC LIMIT ?1
                    )",
                    params![max_terms],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Remove a single term.
    pub async fn index_delete(&self, term: &str) -> Result<(), Error> {
        let term = term.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute("DELETE FROM search_index WHERE term = ?1", params![term])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Drop every index entry whose id set references any of the given ids.
    ///
    /// Called by the optimizer after an eviction so removed records stop
    /// being served from the fast path; affected terms rebuild lazily on
    /// their next scan.
    pub async fn index_prune(&self, removed_ids: &[String]) -> Result<u64, Error> {
        if removed_ids.is_empty() {
            return Ok(0);
        }
        let removed: Vec<String> = removed_ids.to_vec();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                let stale_terms: Vec<String> = {
                    let mut stmt = tx.prepare("SELECT term, record_ids FROM search_index")?;
                    let rows = stmt.query_map([], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?;
                    let mut terms = Vec::new();
                    for row in rows {
                        let (term, json) = row?;
                        let ids: Vec<String> = serde_json::from_str(&json).unwrap_or_default();
                        if ids.is_empty() || ids.iter().any(|id| removed.contains(id)) {
                            terms.push(term);
                        }
                    }
                    terms
                };
                let mut pruned = 0u64;
                {
                    let mut stmt = tx.prepare("DELETE FROM search_index WHERE term = ?1")?;
                    for term in &stale_terms {
                        pruned += stmt.execute(params![term])? as u64;
                    }
                }
                tx.commit()?;
                Ok(pruned)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of indexed terms.
    pub async fn index_term_count(&self) -> Result<i64, Error> {
        self.conn
            .call(|conn| {
                conn.query_row("SELECT COUNT(*) FROM search_index", [], |row| row.get(0))
                    .map_err(Error::from)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_lookup() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let ids = vec!["p1".to_string(), "p2".to_string()];
        db.index_put("coca", &ids, Utc::now(), 512).await.unwrap();

        let entry = db.index_lookup("coca").await.unwrap().unwrap();
        assert_eq!(entry.term, "coca");
        assert_eq!(entry.record_ids, ids);
    }

    #[tokio::test]
    async fn test_lookup_missing_term() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.index_lookup("nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.index_put("milk", &["p1".to_string()], Utc::now(), 512).await.unwrap();
        db.index_put("milk", &["p2".to_string()], Utc::now(), 512).await.unwrap();

        let entry = db.index_lookup("milk").await.unwrap().unwrap();
        assert_eq!(entry.record_ids, vec!["p2".to_string()]);
        assert_eq!(db.index_term_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_term_cap_drops_oldest() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let base = Utc::now();
        db.index_put("old", &["p1".to_string()], base - chrono::Duration::hours(2), 2)
            .await
            .unwrap();
        db.index_put("mid", &["p2".to_string()], base - chrono::Duration::hours(1), 2)
            .await
            .unwrap();
        db.index_put("new", &["p3".to_string()], base, 2).await.unwrap();

        assert_eq!(db.index_term_count().await.unwrap(), 2);
        assert!(db.index_lookup("old").await.unwrap().is_none());
        assert!(db.index_lookup("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_prune_removes_terms_referencing_evicted_ids() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let now = Utc::now();
        db.index_put("coca", &["p1".to_string(), "p2".to_string()], now, 512)
            .await
            .unwrap();
        db.index_put("bread", &["p3".to_string()], now, 512).await.unwrap();

        let pruned = db.index_prune(&["p2".to_string()]).await.unwrap();
        assert_eq!(pruned, 1);
        assert!(db.index_lookup("coca").await.unwrap().is_none());
        assert!(db.index_lookup("bread").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_term() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.index_put("coca", &["p1".to_string()], Utc::now(), 512).await.unwrap();
        db.index_delete("coca").await.unwrap();
        assert!(db.index_lookup("coca").await.unwrap().is_none());
    }
}
