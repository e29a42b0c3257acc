//! Render cache key construction.

use std::fmt;

use crate::domain::render::{ContextHash, EntityId, Generation, RenderContext};

/// Address of one rendered variant: `(entity, generation, context hash)`.
///
/// Bumping the entity's generation changes every key derived for it, so entries
/// written under an older generation become unreachable without being deleted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderKey {
    entity: EntityId,
    generation: Generation,
    context_hash: ContextHash,
}

impl RenderKey {
    pub fn new(entity: EntityId, generation: Generation, context: &RenderContext) -> Self {
        Self {
            entity,
            generation,
            context_hash: context.hash(),
        }
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn context_hash(&self) -> &ContextHash {
        &self.context_hash
    }

    /// Text form used as the durable tier's primary key.
    pub fn storage_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RenderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "r:{}:g{}:{}",
            self.entity, self.generation, self.context_hash
        )
    }
}
