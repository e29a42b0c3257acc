//! Fast tier storage: process-local LRU of rendered payloads with per-entry expiry.

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use lru::LruCache;

use super::config::CacheConfig;
use super::keys::RenderKey;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::store";

#[derive(Clone)]
struct FastEntry {
    payload: String,
    /// `None` when the deadline is past what `Instant` can represent.
    expires_at: Option<Instant>,
}

/// Process-local render tier.
///
/// Bounded by capacity (LRU eviction) and by a TTL checked on read.
pub struct FastTier {
    entries: Mutex<LruCache<RenderKey, FastEntry>>,
    ttl: Duration,
}

impl FastTier {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.fast_tier_capacity_non_zero())),
            ttl: config.fast_tier_ttl(),
        }
    }

    pub fn get(&self, key: &RenderKey) -> Option<String> {
        self.get_at(key, Instant::now())
    }

    pub fn insert(&self, key: RenderKey, payload: String) {
        self.insert_at(key, payload, Instant::now());
    }

    pub(crate) fn get_at(&self, key: &RenderKey, now: Instant) -> Option<String> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "fast_get");
        let fresh = entries.get(key).map(|entry| {
            let live = entry.expires_at.is_none_or(|deadline| deadline > now);
            live.then(|| entry.payload.clone())
        });
        match fresh {
            Some(Some(payload)) => Some(payload),
            Some(None) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    pub(crate) fn insert_at(&self, key: RenderKey, payload: String, now: Instant) {
        let entry = FastEntry {
            payload,
            expires_at: now.checked_add(self.ttl),
        };
        mutex_lock(&self.entries, SOURCE, "fast_insert").put(key, entry);
    }

    /// Get the number of cached payloads, expired ones included.
    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "fast_len").len()
    }

    /// Check if the tier is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use serde_json::json;

    use super::*;
    use crate::domain::render::{EntityId, Generation, RenderContext};

    fn key(entity: i64, title: &str) -> RenderKey {
        RenderKey::new(
            EntityId::new(entity).expect("valid entity"),
            Generation::INITIAL,
            &RenderContext::new(json!({ "title": title })),
        )
    }

    #[test]
    fn fast_tier_roundtrip() {
        let tier = FastTier::new(&CacheConfig::default());
        let key = key(5, "A");

        assert!(tier.get(&key).is_none());
        tier.insert(key.clone(), "<html>".to_string());
        assert_eq!(tier.get(&key).as_deref(), Some("<html>"));
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn expired_entries_are_dropped_on_read() {
        let config = CacheConfig {
            fast_tier_ttl_seconds: 10,
            ..Default::default()
        };
        let tier = FastTier::new(&config);
        let key = key(5, "A");
        let start = Instant::now();

        tier.insert_at(key.clone(), "<html>".to_string(), start);
        assert!(tier.get_at(&key, start + Duration::from_secs(9)).is_some());
        assert!(tier.get_at(&key, start + Duration::from_secs(10)).is_none());
        assert!(tier.is_empty());
    }

    #[test]
    fn oversized_ttl_does_not_overflow() {
        let config = CacheConfig {
            fast_tier_ttl_seconds: u64::MAX,
            ..Default::default()
        };
        let tier = FastTier::new(&config);
        let key = key(5, "A");

        tier.insert(key.clone(), "<html>".to_string());
        assert_eq!(tier.get(&key).as_deref(), Some("<html>"));
    }

    #[test]
    fn lru_eviction() {
        let config = CacheConfig {
            fast_tier_capacity: 2,
            ..Default::default()
        };
        let tier = FastTier::new(&config);

        tier.insert(key(1, "A"), "one".into());
        tier.insert(key(2, "A"), "two".into());
        assert!(tier.get(&key(1, "A")).is_some());

        tier.insert(key(3, "A"), "three".into());

        assert!(tier.get(&key(2, "A")).is_none()); // Evicted
        assert!(tier.get(&key(1, "A")).is_some());
        assert!(tier.get(&key(3, "A")).is_some());
    }

    #[test]
    fn fast_tier_recovers_from_poisoned_lock() {
        let tier = FastTier::new(&CacheConfig::default());

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = tier
                .entries
                .lock()
                .expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        tier.insert(key(1, "A"), "one".into());
        assert!(tier.get(&key(1, "A")).is_some());
    }
}
