//! Identity of cacheable rendered output: entity ids, generations and render contexts.

use std::fmt;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::error::DomainError;

/// Identifier of a cacheable entity (a post, block, or gallery in the host CMS).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(i64);

impl EntityId {
    pub fn new(raw: i64) -> Result<Self, DomainError> {
        if raw <= 0 {
            return Err(DomainError::validation(format!(
                "entity id must be positive, got {raw}"
            )));
        }
        Ok(Self(raw))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for EntityId {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-entity generation counter value. Absent counters read as [`Generation::INITIAL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(i64);

impl Generation {
    pub const INITIAL: Generation = Generation(1);

    pub fn from_stored(raw: i64) -> Result<Self, DomainError> {
        if raw < Self::INITIAL.0 {
            return Err(DomainError::invariant(format!(
                "stored generation {raw} is below the initial generation"
            )));
        }
        Ok(Self(raw))
    }

    pub fn get(self) -> i64 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl Default for Generation {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Attribute bag describing how an entity was rendered.
///
/// Two contexts that are equal as JSON values (regardless of object key order)
/// produce the same [`ContextHash`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderContext(Value);

impl RenderContext {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn hash(&self) -> ContextHash {
        let canonical = canonicalize(&self.0).to_string();
        ContextHash(hex::encode(Sha256::digest(canonical.as_bytes())))
    }
}

impl From<Value> for RenderContext {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Stable hex digest of a canonicalized [`RenderContext`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextHash(String);

impl ContextHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|(left, _), (right, _)| left.cmp(right));
            let mut sorted = Map::with_capacity(entries.len());
            for (key, inner) in entries {
                sorted.insert(key.clone(), canonicalize(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
