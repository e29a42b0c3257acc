//! Generation-tagged render cache.
//!
//! Rendered output is memoized per `(entity, generation, context hash)` in two tiers:
//!
//! - **Fast tier**: process-local LRU with a short TTL
//! - **Durable tier**: database-backed entries with a longer TTL
//!
//! Invalidation bumps the entity's generation counter. Entries written under an
//! older generation are never read again and age out through their TTL.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enable_fast_tier = true
//! enable_durable_tier = true
//! fast_tier_capacity = 1024
//! fast_tier_ttl_seconds = 300
//! durable_tier_ttl_seconds = 86400
//! ```

mod config;
mod keys;
mod lock;
mod render;
mod store;

pub use config::{CacheConfig, MAX_TTL_SECS};
pub use keys::RenderKey;
pub use render::{CacheLookup, RenderCache, RenderCacheError};
pub use store::FastTier;
