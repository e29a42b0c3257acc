//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

use crate::cache::RenderKey;
use crate::domain::render::{EntityId, Generation};
use crate::domain::settings::{SettingKey, SettingRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("table `{table}` does not exist")]
    MissingTable { table: String },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn missing_table(table: impl Into<String>) -> Self {
        Self::MissingTable {
            table: table.into(),
        }
    }
}

/// Owner of the backing tables and the schema-version marker.
#[async_trait]
pub trait SchemaRepo: Send + Sync {
    /// Schema version declared by this build.
    fn declared_version(&self) -> i32;

    /// Stored marker; zero when no migration has ever completed.
    async fn schema_version(&self) -> Result<i32, RepoError>;

    async fn tables_exist(&self) -> Result<bool, RepoError>;

    /// Apply every declared DDL statement and advance the marker to `target`.
    /// Either all of it commits or none of it does.
    async fn apply_schema(&self, target: i32) -> Result<(), RepoError>;

    async fn drop_all(&self) -> Result<(), RepoError>;
}

#[async_trait]
pub trait SettingsRepo: Send + Sync {
    async fn find_setting(&self, key: &SettingKey) -> Result<Option<SettingRecord>, RepoError>;

    async fn setting_exists(&self, key: &SettingKey) -> Result<bool, RepoError>;

    async fn upsert_setting(&self, key: &SettingKey, value: &Value) -> Result<(), RepoError>;

    /// Returns whether a row was removed.
    async fn delete_setting(&self, key: &SettingKey) -> Result<bool, RepoError>;

    async fn list_settings(&self) -> Result<Vec<SettingRecord>, RepoError>;

    /// Write all entries in one transaction, clearing existing rows first when `replace` is set.
    async fn import_settings(
        &self,
        entries: &[(SettingKey, Value)],
        replace: bool,
    ) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait GenerationRepo: Send + Sync {
    async fn current_generation(&self, entity: EntityId) -> Result<Generation, RepoError>;

    /// Atomically advance the counter and return the new value.
    async fn increment_generation(&self, entity: EntityId) -> Result<Generation, RepoError>;
}

#[derive(Debug, Clone)]
pub struct NewRenderEntry<'a> {
    pub key: &'a RenderKey,
    pub payload: &'a str,
    pub expires_at: OffsetDateTime,
}

#[async_trait]
pub trait RenderEntryRepo: Send + Sync {
    /// Payload stored under `key` that has not expired at `now`.
    async fn find_entry(
        &self,
        key: &RenderKey,
        now: OffsetDateTime,
    ) -> Result<Option<String>, RepoError>;

    async fn store_entry(&self, entry: NewRenderEntry<'_>) -> Result<(), RepoError>;

    /// Delete entries whose expiry is at or before `now`; returns the number removed.
    async fn purge_expired(&self, now: OffsetDateTime) -> Result<u64, RepoError>;
}
