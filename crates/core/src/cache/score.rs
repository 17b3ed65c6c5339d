//! Relevance scoring for search candidates.
//!
//! Pure functions: given identical record state and query, the score is
//! deterministic and has no side effects. Hit counters are bumped only for
//! records ultimately returned to the caller, never here.

use super::records::CachedRecord;
use chrono::{DateTime, Duration, Utc};

/// Trim and lowercase a raw query.
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Whether a record is a candidate for the query at all.
///
/// Substring match, case-insensitive, against name, code, or category.
pub fn matches_query(record: &CachedRecord, query: &str) -> bool {
    record.name.to_lowercase().contains(query)
        || record.code.to_lowercase().contains(query)
        || record
            .category
            .as_deref()
            .is_some_and(|c| c.to_lowercase().contains(query))
}

/// Compute the relevance score of a record for a normalized query.
///
/// Name rules (exact/prefix/contains) are mutually exclusive among
/// themselves, as are the code rules, but name and code contributions are
/// additive: an exact code match stacks on top of a name match. Category,
/// popularity, and recency bonuses are always additive.
pub fn relevance(record: &CachedRecord, query: &str, now: DateTime<Utc>) -> i64 {
    let name = record.name.to_lowercase();
    let code = record.code.to_lowercase();
    let mut score = 0i64;

    if name == query {
        score += 100;
    } else if name.starts_with(query) {
        score += 80;
    } else if name.contains(query) {
        score += 60;
    }

    if code == query {
        score += 90;
    } else if code.contains(query) {
        score += 50;
    }

    if let Some(category) = &record.category
        && category.to_lowercase().contains(query)
    {
        score += 30;
    }

    score += (record.usage.hits.saturating_mul(2)).clamp(0, 20);

    let idle = now.signed_duration_since(record.usage.last_access);
    if idle <= Duration::days(1) {
        score += 10;
    } else if idle <= Duration::days(7) {
        score += 5;
    }

    score
}
