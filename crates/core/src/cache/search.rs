//! Search over the record store.
//!
//! Fast path through the advisory index, scan fallback with relevance
//! ranking. The returned sequence is a snapshot of the moment of the call;
//! concurrent ingestion or optimization may be observed as either the pre-
//! or post-batch state.

use super::connection::CacheDb;
use super::metrics::MetricsCollector;
use super::records::CachedRecord;
use super::score::{matches_query, normalize_query, relevance};
use crate::Error;
use chrono::{DateTime, Utc};

/// Run a search for `query`, returning at most `limit` records.
///
/// Index hits are served in stored order without re-ranking; the scan
/// fallback filters on name/code/category substring, ranks by relevance
/// descending (ties keep scan order), truncates, and populates the index
/// for the term. Hit counters are bumped only for the records actually
/// returned. Zero matches record a metrics miss and leave the index
/// untouched, so negative results are never cached.
pub(crate) async fn run_search(
    db: &CacheDb,
    metrics: &MetricsCollector,
    query: &str,
    limit: usize,
    index_max_terms: usize,
    now: DateTime<Utc>,
) -> Result<Vec<CachedRecord>, Error> {
    let term = normalize_query(query);
    if term.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    if let Some(entry) = db.index_lookup(&term).await?
        && !entry.record_ids.is_empty()
    {
        let resolved = db.records_by_ids(&entry.record_ids).await?;
        if resolved.is_empty() {
            // Every indexed id was evicted; drop the entry and rescan.
            db.index_delete(&term).await?;
        } else {
            if resolved.len() < entry.record_ids.len() {
                // Heal the entry down to the surviving ids.
                let survivors: Vec<String> = resolved.iter().map(|r| r.id.clone()).collect();
                db.index_put(&term, &survivors, now, index_max_terms).await?;
            }
            let selected = finalize(db, resolved, limit, now).await?;
            metrics.record_hit();
            return Ok(selected);
        }
    }

    let all = db.all_records().await?;
    let mut candidates: Vec<CachedRecord> =
        all.into_iter().filter(|r| matches_query(r, &term)).collect();
    if candidates.is_empty() {
        metrics.record_miss();
        return Ok(Vec::new());
    }

    // Stable sort: ties keep the store's scan order.
    candidates.sort_by_key(|r| std::cmp::Reverse(relevance(r, &term, now)));

    let selected = finalize(db, candidates, limit, now).await?;
    let selected_ids: Vec<String> = selected.iter().map(|r| r.id.clone()).collect();
    db.index_put(&term, &selected_ids, now, index_max_terms).await?;
    metrics.record_hit();
    Ok(selected)
}

/// Truncate to `limit` and bump usage for the returned records only.
async fn finalize(
    db: &CacheDb,
    candidates: Vec<CachedRecord>,
    limit: usize,
    now: DateTime<Utc>,
) -> Result<Vec<CachedRecord>, Error> {
    let mut selected: Vec<CachedRecord> = candidates.into_iter().take(limit).collect();
    let ids: Vec<String> = selected.iter().map(|r| r.id.clone()).collect();
    db.touch_records(&ids, now).await?;
    for record in &mut selected {
        record.usage.hits += 1;
        record.usage.last_access = now;
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::records::ProductSnapshot;

    fn snapshot(id: &str, name: &str, code: &str, category: Option<&str>) -> ProductSnapshot {
        ProductSnapshot {
            id: id.to_string(),
            name: name.to_string(),
            code: code.to_string(),
            category: category.map(str::to_string),
            price: 1000.0,
            stock: 5.0,
            is_weight_based: None,
            image_ref: None,
        }
    }

    async fn seeded_db() -> CacheDb {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_batch(
            &[
                snapshot("p1", "Coca Cola 600ml", "7501001", Some("Beverages")),
                snapshot("p2", "Cola Chupeta", "8800123", Some("Candy")),
                snapshot("p3", "White Bread", "4400987", Some("Bakery")),
            ],
            1,
            Utc::now(),
        )
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn test_empty_query_returns_empty() {
        let db = seeded_db().await;
        let metrics = MetricsCollector::default();
        let results = run_search(&db, &metrics, "   ", 10, 512, Utc::now()).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(metrics.hits() + metrics.misses(), 0);
    }

    #[tokio::test]
    async fn test_zero_limit_returns_empty() {
        let db = seeded_db().await;
        let metrics = MetricsCollector::default();
        let results = run_search(&db, &metrics, "cola", 0, 512, Utc::now()).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(metrics.hits() + metrics.misses(), 0);
    }

    #[tokio::test]
    async fn test_scan_ranks_by_relevance() {
        let db = seeded_db().await;
        let metrics = MetricsCollector::default();
        let results = run_search(&db, &metrics, "coca", 10, 512, Utc::now()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "p1");
        assert_eq!(metrics.hits(), 1);
    }

    #[tokio::test]
    async fn test_exact_code_outranks_name_substring() {
        let db = seeded_db().await;
        let metrics = MetricsCollector::default();
        let results = run_search(&db, &metrics, "7501001", 10, 512, Utc::now()).await.unwrap();
        assert_eq!(results[0].id, "p1");
    }

    #[tokio::test]
    async fn test_search_bumps_hits_only_for_returned() {
        let db = seeded_db().await;
        let metrics = MetricsCollector::default();
        let results = run_search(&db, &metrics, "cola", 1, 512, Utc::now()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].usage.hits, 1);

        let all = db.all_records().await.unwrap();
        let returned_hits: i64 =
            all.iter().filter(|r| r.id == results[0].id).map(|r| r.usage.hits).sum();
        let other_hits: i64 =
            all.iter().filter(|r| r.id != results[0].id).map(|r| r.usage.hits).sum();
        assert_eq!(returned_hits, 1);
        assert_eq!(other_hits, 0, "non-selected candidates keep their counters");
    }

    #[tokio::test]
    async fn test_scan_populates_index() {
        let db = seeded_db().await;
        let metrics = MetricsCollector::default();
        run_search(&db, &metrics, "cola", 10, 512, Utc::now()).await.unwrap();

        let entry = db.index_lookup("cola").await.unwrap().unwrap();
        assert!(!entry.record_ids.is_empty());
    }

    #[tokio::test]
    async fn test_index_fast_path_not_reranked() {
        let db = seeded_db().await;
        let metrics = MetricsCollector::default();
        // Seed the index in deliberately non-relevance order.
        db.index_put("cola", &["p2".to_string(), "p1".to_string()], Utc::now(), 512)
            .await
            .unwrap();

        let results = run_search(&db, &metrics, "cola", 10, 512, Utc::now()).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["p2", "p1"], "index hits keep stored order");
        assert_eq!(metrics.hits(), 1);
    }

    #[tokio::test]
    async fn test_stale_index_ids_silently_dropped() {
        let db = seeded_db().await;
        let metrics = MetricsCollector::default();
        db.index_put("cola", &["ghost".to_string(), "p1".to_string()], Utc::now(), 512)
            .await
            .unwrap();

        let results = run_search(&db, &metrics, "cola", 10, 512, Utc::now()).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["p1"]);
        assert_eq!(metrics.hits(), 1, "partially stale entry still counts as a hit");

        let healed = db.index_lookup("cola").await.unwrap().unwrap();
        assert_eq!(healed.record_ids, vec!["p1".to_string()]);
    }

    #[tokio::test]
    async fn test_fully_stale_entry_falls_back_to_scan() {
        let db = seeded_db().await;
        let metrics = MetricsCollector::default();
        db.index_put("cola", &["ghost".to_string()], Utc::now(), 512).await.unwrap();

        let results = run_search(&db, &metrics, "cola", 10, 512, Utc::now()).await.unwrap();
        assert!(!results.is_empty(), "scan fallback still finds live matches");
        assert_eq!(metrics.hits(), 1);
    }

    #[tokio::test]
    async fn test_no_match_records_miss_and_skips_index() {
        let db = seeded_db().await;
        let metrics = MetricsCollector::default();
        let results = run_search(&db, &metrics, "sushi", 10, 512, Utc::now()).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(metrics.misses(), 1);
        let indexed = db.index_lookup("sushi").await.unwrap();
        assert!(indexed.is_none(), "negative results are not cached");
    }

    #[tokio::test]
    async fn test_limit_truncates() {
        let db = seeded_db().await;
        let metrics = MetricsCollector::default();
        let results = run_search(&db, &metrics, "cola", 1, 512, Utc::now()).await.unwrap();
        assert_eq!(results.len(), 1);
    }
}
