//! Two-tier render cache with generation-based invalidation.

use std::{future::Future, sync::Arc};

use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, trace};

use crate::application::repos::{GenerationRepo, NewRenderEntry, RenderEntryRepo, RepoError};
use crate::domain::render::{EntityId, Generation, RenderContext};

use super::config::CacheConfig;
use super::keys::RenderKey;
use super::store::FastTier;

const TARGET: &str = "vellum::render_cache";

#[derive(Debug, Error)]
pub enum RenderCacheError {
    #[error("failed to read generation of entity {entity}")]
    Generation {
        entity: EntityId,
        #[source]
        source: RepoError,
    },
    #[error("failed to advance generation of entity {entity}")]
    Invalidate {
        entity: EntityId,
        #[source]
        source: RepoError,
    },
    #[error("durable render tier failed")]
    Durable(#[source] RepoError),
}

/// Result of a cache read. A miss is an ordinary outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Hit(String),
    Miss,
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    pub fn into_option(self) -> Option<String> {
        match self {
            Self::Hit(payload) => Some(payload),
            Self::Miss => None,
        }
    }
}

pub struct RenderCache {
    config: CacheConfig,
    fast: Option<FastTier>,
    generations: Arc<dyn GenerationRepo>,
    durable: Arc<dyn RenderEntryRepo>,
}

impl RenderCache {
    pub fn new(
        config: CacheConfig,
        generations: Arc<dyn GenerationRepo>,
        durable: Arc<dyn RenderEntryRepo>,
    ) -> Self {
        let fast = config.enable_fast_tier.then(|| FastTier::new(&config));
        Self {
            config,
            fast,
            generations,
            durable,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up the rendered variant of `entity` for `context`.
    ///
    /// Checks the fast tier, then the durable tier; a durable hit is copied into the
    /// fast tier before returning.
    pub async fn get(
        &self,
        entity: EntityId,
        context: &RenderContext,
    ) -> Result<CacheLookup, RenderCacheError> {
        if !self.config.is_enabled() {
            return Ok(CacheLookup::Miss);
        }

        let key = self.current_key(entity, context).await?;
        self.lookup(&key).await
    }

    async fn lookup(&self, key: &RenderKey) -> Result<CacheLookup, RenderCacheError> {
        if let Some(payload) = self.fast.as_ref().and_then(|fast| fast.get(key)) {
            trace!(target = TARGET, key = %key, tier = "fast", "Render cache hit");
            return Ok(CacheLookup::Hit(payload));
        }

        if !self.config.enable_durable_tier {
            trace!(target = TARGET, key = %key, "Render cache miss");
            return Ok(CacheLookup::Miss);
        }

        let found = match self.durable.find_entry(key, OffsetDateTime::now_utc()).await {
            Ok(found) => found,
            Err(RepoError::MissingTable { table }) => {
                debug!(
                    target = TARGET,
                    table = %table,
                    "Durable render table missing; treating as miss"
                );
                None
            }
            Err(err) => return Err(RenderCacheError::Durable(err)),
        };

        match found {
            Some(payload) => {
                trace!(target = TARGET, key = %key, tier = "durable", "Render cache hit");
                if let Some(fast) = &self.fast {
                    fast.insert(key.clone(), payload.clone());
                }
                Ok(CacheLookup::Hit(payload))
            }
            None => {
                trace!(target = TARGET, key = %key, "Render cache miss");
                Ok(CacheLookup::Miss)
            }
        }
    }

    /// Store a freshly rendered payload under the entity's current generation.
    pub async fn set(
        &self,
        entity: EntityId,
        context: &RenderContext,
        payload: impl Into<String>,
    ) -> Result<(), RenderCacheError> {
        if !self.config.is_enabled() {
            return Ok(());
        }

        let key = self.current_key(entity, context).await?;
        self.store(key, payload.into()).await
    }

    async fn store(&self, key: RenderKey, payload: String) -> Result<(), RenderCacheError> {
        if self.config.enable_durable_tier {
            let ttl = time::Duration::try_from(self.config.durable_tier_ttl())
                .unwrap_or(time::Duration::MAX);
            let expires_at = OffsetDateTime::now_utc().saturating_add(ttl);
            self.durable
                .store_entry(NewRenderEntry {
                    key: &key,
                    payload: &payload,
                    expires_at,
                })
                .await
                .map_err(RenderCacheError::Durable)?;
        }

        if let Some(fast) = &self.fast {
            fast.insert(key, payload);
        }
        Ok(())
    }

    /// Cached payload, or render it with `render` and store the result.
    ///
    /// The result is stored under the generation observed before rendering, so an
    /// invalidation that lands mid-render leaves it unreachable.
    pub async fn get_or_render<F, Fut>(
        &self,
        entity: EntityId,
        context: &RenderContext,
        render: F,
    ) -> Result<String, RenderCacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = String>,
    {
        if !self.config.is_enabled() {
            return Ok(render().await);
        }

        let key = self.current_key(entity, context).await?;
        if let CacheLookup::Hit(payload) = self.lookup(&key).await? {
            return Ok(payload);
        }
        let payload = render().await;
        self.store(key, payload.clone()).await?;
        Ok(payload)
    }

    /// Make every cached variant of `entity` unreachable by advancing its generation.
    ///
    /// One atomic counter increment; stored entries are left to expire.
    pub async fn invalidate(&self, entity: EntityId) -> Result<Generation, RenderCacheError> {
        let generation = self
            .generations
            .increment_generation(entity)
            .await
            .map_err(|source| RenderCacheError::Invalidate { entity, source })?;
        info!(
            target = TARGET,
            entity = %entity,
            generation = %generation,
            "Invalidated rendered output"
        );
        Ok(generation)
    }

    pub async fn current_generation(
        &self,
        entity: EntityId,
    ) -> Result<Generation, RenderCacheError> {
        match self.generations.current_generation(entity).await {
            Ok(generation) => Ok(generation),
            Err(RepoError::MissingTable { .. }) => Ok(Generation::INITIAL),
            Err(source) => Err(RenderCacheError::Generation { entity, source }),
        }
    }

    async fn current_key(
        &self,
        entity: EntityId,
        context: &RenderContext,
    ) -> Result<RenderKey, RenderCacheError> {
        let generation = self.current_generation(entity).await?;
        Ok(RenderKey::new(entity, generation, context))
    }

    /// Reclaim durable entries whose TTL has elapsed. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<u64, RenderCacheError> {
        let removed = self
            .durable
            .purge_expired(OffsetDateTime::now_utc())
            .await
            .map_err(RenderCacheError::Durable)?;
        info!(target = TARGET, removed, "Purged expired render entries");
        Ok(removed)
    }

    /// Number of entries currently held in the fast tier.
    pub fn fast_tier_len(&self) -> usize {
        self.fast.as_ref().map_or(0, FastTier::len)
    }
}
