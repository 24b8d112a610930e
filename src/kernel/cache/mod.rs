//! Multi-tier caching (C1/C2/C4/C15): a local in-process LRU, a shared
//! Redis-backed tier, and typed caches layered `Local -> Shared -> Store`.

pub mod ioc_cache;
pub mod local_lru;
pub mod metrics;
pub mod processed_files_cache;
pub mod seen_domains_cache;
pub mod shared;
pub mod version_stamp;

pub use local_lru::LocalLruCache;
pub use metrics::{CacheEvent, CacheMetrics, CacheOp, NoopCacheMetrics};
pub use shared::{RedisSharedCache, SharedCache};
pub use version_stamp::VersionStamp;
