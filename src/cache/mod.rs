//! Path-keyed response cache.
//!
//! Serialized catalog responses are stored under the request path and served
//! verbatim on later lookups. The store is bounded by an LRU capacity and an
//! optional time-to-live, and exposes invalidation hooks for writers that live
//! outside this service.
//!
//! ```toml
//! [cache]
//! enabled = true
//! capacity = 1024
//! # ttl_seconds = 300
//! ```

mod config;
mod lock;
mod middleware;
mod store;

pub use config::CacheConfig;
pub use middleware::serve_cached;
pub use store::{
    CacheStats, METRIC_CACHE_EVICT, METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_CACHE_STORE,
    PathCache,
};
