//! Shared caching primitives used by every projection cache

pub mod cache;

pub use cache::{CacheStats, OnceCache};
