//! SQLite-backed adaptive offline product cache.
//!
//! This module provides a persistent, priority-ranked product cache using
//! SQLite with async access via tokio-rusqlite. It supports:
//!
//! - Batch ingestion with all-or-nothing transactions
//! - Relevance-ranked substring search with a lazily built index
//! - Usage-driven retention priorities (1-5) and conjunctive eviction
//! - Automatic schema migrations
//! - WAL mode for concurrent access

pub mod connection;
pub mod index;
pub mod metrics;
pub mod migrations;
pub mod optimizer;
pub mod priority;
pub mod product_cache;
pub mod records;
pub mod score;
pub mod search;

pub use crate::Error;

pub use connection::CacheDb;
pub use index::IndexEntry;
pub use metrics::{CacheMetrics, MetricsCollector};
pub use optimizer::OptimizeReport;
pub use product_cache::ProductCache;
pub use records::{CachedRecord, ProductSnapshot, RecordUsage};
