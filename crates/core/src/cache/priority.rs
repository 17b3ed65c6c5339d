//! Retention priority engine.
//!
//! Pure function of `(hits, now - last_access)`, recomputed only by the
//! optimizer so the read path stays free of recomputation cost.

use chrono::{DateTime, Duration, Utc};

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 5;

/// Compute the 1-5 retention priority from usage statistics.
///
/// Adjustments apply in a fixed order: base tier from hits, then the
/// recency boost (capped at 5), then the staleness penalty (floored at 1).
pub fn retention_priority(hits: i64, last_access: DateTime<Utc>, now: DateTime<Utc>) -> u8 {
    let base: u8 = match hits {
        h if h >= 50 => 5,
        h if h >= 20 => 4,
        h if h >= 10 => 3,
        h if h >= 5 => 2,
        _ => 1,
    };

    let idle = now.signed_duration_since(last_access);
    let mut priority = base;
    if idle <= Duration::days(1) {
        priority = (priority + 2).min(MAX_PRIORITY);
    } else if idle <= Duration::days(7) {
        priority = (priority + 1).min(MAX_PRIORITY);
    }
    if idle > Duration::days(30) {
        priority = priority.saturating_sub(1).max(MIN_PRIORITY);
    }

    priority
}
