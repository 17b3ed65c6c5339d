//! Core library for tillcache, an adaptive offline product cache for
//! point-of-sale clients.
//!
//! This crate provides:
//! - Persistent record store with SQLite backend
//! - Relevance scoring and retention priority engine
//! - Lazily populated search index and eviction optimizer
//! - Unified error types and layered configuration

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{
    CacheDb, CacheMetrics, CachedRecord, OptimizeReport, ProductCache, ProductSnapshot,
    RecordUsage,
};
pub use config::CacheConfig;
pub use error::Error;
