//! Schema lifecycle: idempotent creation/upgrade, inspection and teardown.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::repos::{RepoError, SchemaRepo};

const TARGET: &str = "vellum::schema";

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("schema migration to version {target} failed")]
    Failed {
        target: i32,
        #[source]
        source: RepoError,
    },
    #[error("failed to inspect schema state")]
    Inspect(#[source] RepoError),
    #[error("failed to drop schema tables")]
    Teardown(#[source] RepoError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaStatus {
    /// Nothing to do; the marker and tables already match.
    UpToDate { version: i32 },
    /// DDL was (re-)applied and the marker now reads `to`.
    Applied { from: i32, to: i32 },
}

impl SchemaStatus {
    pub fn version(&self) -> i32 {
        match self {
            Self::UpToDate { version } => *version,
            Self::Applied { to, .. } => *to,
        }
    }
}

#[derive(Clone)]
pub struct MigrationManager {
    repo: Arc<dyn SchemaRepo>,
}

impl MigrationManager {
    pub fn new(repo: Arc<dyn SchemaRepo>) -> Self {
        Self { repo }
    }

    pub fn declared_version(&self) -> i32 {
        self.repo.declared_version()
    }

    /// Run once during startup, before any request-serving code uses the stores.
    pub async fn initialize(&self) -> Result<SchemaStatus, MigrationError> {
        let status = self.ensure_schema(false).await?;
        info!(
            target = TARGET,
            version = status.version(),
            applied = matches!(status, SchemaStatus::Applied { .. }),
            "Schema ready"
        );
        Ok(status)
    }

    /// Bring the backing tables to the declared shape.
    ///
    /// Safe to call from any starting state. The marker only advances when every
    /// statement committed, so a failed run is retried in full on the next call.
    pub async fn ensure_schema(&self, force: bool) -> Result<SchemaStatus, MigrationError> {
        let target = self.repo.declared_version();
        let current = self
            .repo
            .schema_version()
            .await
            .map_err(MigrationError::Inspect)?;

        if current > target {
            warn!(
                target = TARGET,
                stored = current,
                declared = target,
                "Stored schema version is newer than this build; leaving marker untouched"
            );
        }

        if !force && current >= target {
            let tables_present = self
                .repo
                .tables_exist()
                .await
                .map_err(MigrationError::Inspect)?;
            if tables_present {
                debug!(target = TARGET, version = current, "Schema up to date");
                return Ok(SchemaStatus::UpToDate { version: current });
            }
            warn!(
                target = TARGET,
                version = current,
                "Schema marker is current but tables are missing; re-applying"
            );
        }

        info!(
            target = TARGET,
            from = current,
            to = target,
            force,
            "Applying schema"
        );

        if let Err(source) = self.repo.apply_schema(target).await {
            warn!(
                target = TARGET,
                from = current,
                to = target,
                error = %source,
                "Schema migration failed; marker not advanced"
            );
            return Err(MigrationError::Failed { target, source });
        }

        Ok(SchemaStatus::Applied {
            from: current,
            to: current.max(target),
        })
    }

    pub async fn tables_exist(&self) -> Result<bool, MigrationError> {
        self.repo
            .tables_exist()
            .await
            .map_err(MigrationError::Inspect)
    }

    pub async fn schema_version(&self) -> Result<i32, MigrationError> {
        self.repo
            .schema_version()
            .await
            .map_err(MigrationError::Inspect)
    }

    /// Irreversibly remove every table owned by this core, marker included.
    pub async fn drop_all(&self) -> Result<(), MigrationError> {
        self.repo.drop_all().await.map_err(MigrationError::Teardown)?;
        warn!(target = TARGET, "Dropped all schema tables");
        Ok(())
    }
}
