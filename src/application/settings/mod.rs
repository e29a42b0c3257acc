//! JSON-valued key/value settings store.
//!
//! Reads never run migrations: a missing backing table reads as "unset". Writes
//! self-heal by running [`MigrationManager::ensure_schema`] once when the table
//! is absent and then retrying.

mod transfer;

pub use transfer::{EXPORT_FORMAT, EXPORT_FORMAT_VERSION, ExportMeta, SettingsExport};

use std::{collections::BTreeMap, sync::Arc};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::application::migration::{MigrationError, MigrationManager};
use crate::application::repos::{RepoError, SettingsRepo};
use crate::domain::{error::DomainError, json::to_json_value, settings::SettingKey};

const TARGET: &str = "vellum::settings";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    InvalidKey(#[from] DomainError),
    #[error("setting `{key}` cannot be represented as JSON: {message}")]
    Serialization { key: String, message: String },
    #[error("setting `{key}` does not match the requested type: {message}")]
    Deserialization { key: String, message: String },
    #[error("failed to write setting `{key}`")]
    Write {
        key: String,
        #[source]
        source: RepoError,
    },
    #[error("failed to read settings")]
    Read(#[source] RepoError),
    #[error("settings table could not be created")]
    Migration(#[from] MigrationError),
    #[error("malformed settings import: {0}")]
    MalformedImport(String),
    #[error("failed to encode settings export: {0}")]
    Export(String),
}

/// Outcome of [`SettingsStore::bulk_set`]. Writes that succeeded are kept even
/// when other keys failed.
#[derive(Debug, Default)]
pub struct BulkWriteReport {
    pub written: Vec<String>,
    pub failed: Vec<(String, SettingsError)>,
}

impl BulkWriteReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    pub written: u64,
    pub replaced: bool,
}

#[derive(Clone)]
pub struct SettingsStore {
    repo: Arc<dyn SettingsRepo>,
    migrations: MigrationManager,
}

impl SettingsStore {
    pub fn new(repo: Arc<dyn SettingsRepo>, migrations: MigrationManager) -> Self {
        Self { repo, migrations }
    }

    /// Stored value for `key`, or `default` when the key (or the table) is absent.
    pub async fn get<T>(&self, key: &str, default: T) -> Result<T, SettingsError>
    where
        T: DeserializeOwned,
    {
        match self.get_value(key).await? {
            Some(value) => {
                serde_json::from_value(value).map_err(|err| SettingsError::Deserialization {
                    key: key.to_string(),
                    message: err.to_string(),
                })
            }
            None => Ok(default),
        }
    }

    pub async fn get_value(&self, key: &str) -> Result<Option<Value>, SettingsError> {
        let key = SettingKey::parse(key)?;
        match self.repo.find_setting(&key).await {
            Ok(record) => Ok(record.map(|record| record.value)),
            Err(RepoError::MissingTable { table }) => {
                debug!(
                    target = TARGET,
                    key = %key,
                    table = %table,
                    "Settings table missing; treating as unset"
                );
                Ok(None)
            }
            Err(err) => Err(SettingsError::Read(err)),
        }
    }

    /// Upsert `key`. Values without a JSON form (non-finite floats included) are rejected.
    pub async fn set<T>(&self, key: &str, value: &T) -> Result<(), SettingsError>
    where
        T: Serialize + ?Sized,
    {
        let key = SettingKey::parse(key)?;
        let value = to_json_value(value).map_err(|err| SettingsError::Serialization {
            key: key.to_string(),
            message: err.to_string(),
        })?;

        let result = match self.repo.upsert_setting(&key, &value).await {
            Err(RepoError::MissingTable { table }) => {
                self.heal_schema(&table).await?;
                self.repo.upsert_setting(&key, &value).await
            }
            other => other,
        };

        result.map_err(|source| {
            warn!(target = TARGET, key = %key, error = %source, "Setting write failed");
            SettingsError::Write {
                key: key.to_string(),
                source,
            }
        })
    }

    pub async fn exists(&self, key: &str) -> Result<bool, SettingsError> {
        let key = SettingKey::parse(key)?;
        match self.repo.setting_exists(&key).await {
            Ok(found) => Ok(found),
            Err(RepoError::MissingTable { .. }) => Ok(false),
            Err(err) => Err(SettingsError::Read(err)),
        }
    }

    /// Remove `key`; `Ok(false)` when nothing was stored.
    pub async fn delete(&self, key: &str) -> Result<bool, SettingsError> {
        let key = SettingKey::parse(key)?;
        match self.repo.delete_setting(&key).await {
            Ok(removed) => Ok(removed),
            Err(RepoError::MissingTable { .. }) => Ok(false),
            Err(source) => Err(SettingsError::Write {
                key: key.to_string(),
                source,
            }),
        }
    }

    pub async fn get_all(&self) -> Result<BTreeMap<String, Value>, SettingsError> {
        match self.repo.list_settings().await {
            Ok(records) => Ok(records
                .into_iter()
                .map(|record| (record.key, record.value))
                .collect()),
            Err(RepoError::MissingTable { .. }) => Ok(BTreeMap::new()),
            Err(err) => Err(SettingsError::Read(err)),
        }
    }

    /// Write each entry independently. A failing key does not roll back the others.
    pub async fn bulk_set<I, K, T>(&self, entries: I) -> BulkWriteReport
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Serialize,
    {
        let mut report = BulkWriteReport::default();
        for (key, value) in entries {
            let key = key.into();
            match self.set(&key, &value).await {
                Ok(()) => report.written.push(key),
                Err(err) => report.failed.push((key, err)),
            }
        }

        if !report.is_success() {
            warn!(
                target = TARGET,
                written = report.written.len(),
                failed = report.failed.len(),
                "Bulk settings write partially failed"
            );
        }
        report
    }

    pub async fn export(&self) -> Result<String, SettingsError> {
        let settings = self.get_all().await?;
        let schema_version = self.migrations.schema_version().await?;
        let document = SettingsExport {
            meta: ExportMeta::new(schema_version, OffsetDateTime::now_utc()),
            settings,
        };
        serde_json::to_string_pretty(&document)
            .map_err(|err| SettingsError::Export(err.to_string()))
    }

    /// Import an export blob. Nothing is written unless the whole payload is valid,
    /// and the write itself is a single transaction.
    pub async fn import(&self, blob: &str, replace: bool) -> Result<ImportReport, SettingsError> {
        let entries = transfer::parse_import(blob).map_err(|reason| {
            warn!(target = TARGET, reason = %reason, "Rejected settings import");
            SettingsError::MalformedImport(reason)
        })?;

        let result = match self.repo.import_settings(&entries, replace).await {
            Err(RepoError::MissingTable { table }) => {
                self.heal_schema(&table).await?;
                self.repo.import_settings(&entries, replace).await
            }
            other => other,
        };

        let written = result.map_err(|source| SettingsError::Write {
            key: "*".to_string(),
            source,
        })?;

        info!(target = TARGET, written, replace, "Imported settings");
        Ok(ImportReport {
            written,
            replaced: replace,
        })
    }

    async fn heal_schema(&self, table: &str) -> Result<(), SettingsError> {
        info!(
            target = TARGET,
            table = %table,
            "Settings table missing on write; creating schema"
        );
        self.migrations.ensure_schema(false).await?;
        Ok(())
    }
}
