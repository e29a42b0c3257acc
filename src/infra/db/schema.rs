//! Declared schema and the Postgres side of the migration lifecycle.

use async_trait::async_trait;
use sqlx::query;
use tracing::debug;

use crate::application::repos::{RepoError, SchemaRepo};
use crate::infra::error::InfraError;

use super::{PostgresRepositories, map_sqlx_error};

/// Schema version declared by this build.
pub const CURRENT_SCHEMA_VERSION: i32 = 4;

pub const DEFAULT_TABLE_PREFIX: &str = "vellum_";
const MAX_TABLE_PREFIX_LEN: usize = 32;
const MARKER_COMPONENT: &str = "core";

/// Physical table names, derived from a validated prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub schema_meta: String,
    pub settings: String,
    pub render_generations: String,
    pub render_entries: String,
    prefix: String,
}

impl TableNames {
    pub fn new(prefix: &str) -> Result<Self, InfraError> {
        validate_prefix(prefix)?;
        Ok(Self {
            schema_meta: format!("{prefix}schema_meta"),
            settings: format!("{prefix}settings"),
            render_generations: format!("{prefix}render_generations"),
            render_entries: format!("{prefix}render_entries"),
            prefix: prefix.to_string(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Tables that must all exist for the stores to operate.
    pub fn required(&self) -> [&str; 3] {
        [
            self.settings.as_str(),
            self.render_generations.as_str(),
            self.render_entries.as_str(),
        ]
    }
}

impl Default for TableNames {
    fn default() -> Self {
        let prefix = DEFAULT_TABLE_PREFIX;
        Self {
            schema_meta: format!("{prefix}schema_meta"),
            settings: format!("{prefix}settings"),
            render_generations: format!("{prefix}render_generations"),
            render_entries: format!("{prefix}render_entries"),
            prefix: prefix.to_string(),
        }
    }
}

pub fn validate_prefix(prefix: &str) -> Result<(), InfraError> {
    let mut chars = prefix.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    let rest_valid = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !starts_with_letter || !rest_valid || prefix.len() > MAX_TABLE_PREFIX_LEN {
        return Err(InfraError::configuration(format!(
            "table prefix `{prefix}` must match [a-z][a-z0-9_]* and be at most {MAX_TABLE_PREFIX_LEN} characters"
        )));
    }
    Ok(())
}

/// One versioned group of idempotent DDL statements.
#[derive(Debug, Clone)]
pub struct SchemaStep {
    pub version: i32,
    pub description: &'static str,
    pub statements: Vec<String>,
}

/// Statements creating the marker table; applied before every step.
fn marker_statement(tables: &TableNames) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {meta} (
            component TEXT PRIMARY KEY,
            version INTEGER NOT NULL CHECK (version >= 0),
            applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        meta = tables.schema_meta
    )
}

/// Full declared shape, oldest step first. Every statement must be safe to re-run.
pub fn schema_steps(tables: &TableNames) -> Vec<SchemaStep> {
    let TableNames {
        settings,
        render_generations: generations,
        render_entries: entries,
        ..
    } = tables;

    vec![
        SchemaStep {
            version: 1,
            description: "settings store",
            statements: vec![format!(
                "CREATE TABLE IF NOT EXISTS {settings} (
                    key VARCHAR(191) PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
                )"
            )],
        },
        SchemaStep {
            version: 2,
            description: "render generation counters",
            statements: vec![
                format!(
                    "CREATE TABLE IF NOT EXISTS {generations} (
                        entity_id BIGINT PRIMARY KEY,
                        generation BIGINT NOT NULL DEFAULT 1 CHECK (generation >= 1)
                    )"
                ),
                format!(
                    "ALTER TABLE {generations}
                        ADD COLUMN IF NOT EXISTS updated_at TIMESTAMPTZ NOT NULL DEFAULT now()"
                ),
            ],
        },
        SchemaStep {
            version: 3,
            description: "durable render tier",
            statements: vec![
                format!(
                    "CREATE TABLE IF NOT EXISTS {entries} (
                        cache_key TEXT PRIMARY KEY,
                        entity_id BIGINT NOT NULL,
                        generation BIGINT NOT NULL,
                        payload TEXT NOT NULL,
                        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                        expires_at TIMESTAMPTZ NOT NULL
                    )"
                ),
                format!(
                    "CREATE INDEX IF NOT EXISTS {entries}_expires_at_idx ON {entries} (expires_at)"
                ),
            ],
        },
        SchemaStep {
            version: 4,
            description: "settings values stored as JSON text",
            // JSONB cannot hold `\u0000`; earlier installs are converted in place.
            statements: vec![format!(
                "DO $$
                BEGIN
                    IF EXISTS (
                        SELECT 1 FROM information_schema.columns
                        WHERE table_schema = current_schema()
                          AND table_name = '{settings}'
                          AND column_name = 'value'
                          AND data_type = 'jsonb'
                    ) THEN
                        ALTER TABLE {settings} ALTER COLUMN value TYPE TEXT USING value::text;
                    END IF;
                END
                $$"
            )],
        },
    ]
}

#[async_trait]
impl SchemaRepo for PostgresRepositories {
    fn declared_version(&self) -> i32 {
        CURRENT_SCHEMA_VERSION
    }

    async fn schema_version(&self) -> Result<i32, RepoError> {
        let sql = format!(
            "SELECT version FROM {} WHERE component = $1",
            self.tables().schema_meta
        );
        match sqlx::query_scalar::<_, i32>(&sql)
            .bind(MARKER_COMPONENT)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)
        {
            Ok(version) => Ok(version.unwrap_or(0)),
            Err(RepoError::MissingTable { .. }) => Ok(0),
            Err(err) => Err(err),
        }
    }

    async fn tables_exist(&self) -> Result<bool, RepoError> {
        let required: Vec<String> = self
            .tables()
            .required()
            .iter()
            .map(|name| name.to_string())
            .collect();

        let present: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.tables
             WHERE table_schema = current_schema() AND table_name::text = ANY($1)",
        )
        .bind(&required)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(usize::try_from(present).is_ok_and(|present| present == required.len()))
    }

    async fn apply_schema(&self, target: i32) -> Result<(), RepoError> {
        let tables = self.tables();
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        // Serialize concurrent installers on the same prefix.
        query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("vellum.schema.{}", tables.prefix()))
            .execute(tx.as_mut())
            .await
            .map_err(map_sqlx_error)?;

        query(&marker_statement(tables))
            .execute(tx.as_mut())
            .await
            .map_err(map_sqlx_error)?;

        for step in schema_steps(tables) {
            for statement in &step.statements {
                query(statement)
                    .execute(tx.as_mut())
                    .await
                    .map_err(map_sqlx_error)?;
            }
            debug!(
                target = "vellum::schema",
                version = step.version,
                description = step.description,
                "Schema step applied"
            );
        }

        let marker = format!(
            "INSERT INTO {meta} (component, version, applied_at)
             VALUES ($1, $2, now())
             ON CONFLICT (component) DO UPDATE SET
                 version = GREATEST({meta}.version, EXCLUDED.version),
                 applied_at = EXCLUDED.applied_at",
            meta = tables.schema_meta
        );
        query(&marker)
            .bind(MARKER_COMPONENT)
            .bind(target)
            .execute(tx.as_mut())
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn drop_all(&self) -> Result<(), RepoError> {
        let tables = self.tables();
        let sql = format!(
            "DROP TABLE IF EXISTS {entries}, {generations}, {settings}, {meta}",
            entries = tables.render_entries,
            generations = tables.render_generations,
            settings = tables.settings,
            meta = tables.schema_meta,
        );
        query(&sql)
            .execute(self.pool())
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_names_use_vellum_prefix() {
        let tables = TableNames::default();
        assert_eq!(tables.settings, "vellum_settings");
        assert_eq!(tables.schema_meta, "vellum_schema_meta");
        assert_eq!(TableNames::new(DEFAULT_TABLE_PREFIX).expect("valid"), tables);
    }

    #[test]
    fn prefix_validation() {
        assert!(TableNames::new("site2_").is_ok());
        assert!(TableNames::new("").is_err());
        assert!(TableNames::new("2site_").is_err());
        assert!(TableNames::new("Site_").is_err());
        assert!(TableNames::new("site; DROP TABLE x; --").is_err());
        assert!(TableNames::new(&"a".repeat(MAX_TABLE_PREFIX_LEN + 1)).is_err());
    }

    #[test]
    fn steps_are_ordered_and_end_at_current_version() {
        let steps = schema_steps(&TableNames::default());
        let versions: Vec<i32> = steps.iter().map(|step| step.version).collect();
        assert_eq!(versions, vec![1, 2, 3, 4]);
        assert_eq!(versions.last().copied(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn every_statement_is_rerunnable() {
        let tables = TableNames::default();
        let mut statements = vec![marker_statement(&tables)];
        statements.extend(schema_steps(&tables).into_iter().flat_map(|step| step.statements));

        for statement in statements {
            assert!(
                statement.contains("IF NOT EXISTS") || statement.contains("IF EXISTS"),
                "statement is not idempotent: {statement}"
            );
        }
    }

    #[test]
    fn statements_use_prefixed_names() {
        let tables = TableNames::new("blog7_").expect("valid");
        let ddl: String = schema_steps(&tables)
            .into_iter()
            .flat_map(|step| step.statements)
            .collect::<Vec<_>>()
            .join("\n");
        assert!(ddl.contains("blog7_settings"));
        assert!(ddl.contains("blog7_render_generations"));
        assert!(ddl.contains("blog7_render_entries"));
        assert!(!ddl.contains("vellum_"));
    }

    #[test]
    fn settings_values_are_text() {
        let steps = schema_steps(&TableNames::default());
        assert!(steps[0].statements[0].contains("value TEXT NOT NULL"));

        let conversion = &steps[3].statements[0];
        assert!(conversion.contains("data_type = 'jsonb'"));
        assert!(conversion.contains("ALTER TABLE vellum_settings ALTER COLUMN value TYPE TEXT"));
    }
}
