use async_trait::async_trait;
use serde_json::Value;
use sqlx::{FromRow, query};
use time::OffsetDateTime;

use crate::application::repos::{RepoError, SettingsRepo};
use crate::domain::settings::{SettingKey, SettingRecord};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(FromRow)]
struct SettingRow {
    key: String,
    value: String,
    updated_at: OffsetDateTime,
}

impl TryFrom<SettingRow> for SettingRecord {
    type Error = RepoError;

    fn try_from(row: SettingRow) -> Result<Self, Self::Error> {
        let value = serde_json::from_str(&row.value).map_err(|err| RepoError::Integrity {
            message: format!("setting `{}` holds invalid JSON: {err}", row.key),
        })?;
        Ok(SettingRecord {
            key: row.key,
            value,
            updated_at: row.updated_at,
        })
    }
}

/// Values are kept as serde_json text so every JSON string survives, `\u0000` included.
fn encode_value(value: &Value) -> String {
    value.to_string()
}

impl PostgresRepositories {
    fn upsert_setting_sql(&self) -> String {
        format!(
            "INSERT INTO {table} (key, value, updated_at)
             VALUES ($1, $2, now())
             ON CONFLICT (key) DO UPDATE SET
                 value = EXCLUDED.value,
                 updated_at = EXCLUDED.updated_at",
            table = self.tables().settings
        )
    }
}

#[async_trait]
impl SettingsRepo for PostgresRepositories {
    async fn find_setting(&self, key: &SettingKey) -> Result<Option<SettingRecord>, RepoError> {
        let sql = format!(
            "SELECT key, value, updated_at FROM {} WHERE key = $1",
            self.tables().settings
        );
        let row = sqlx::query_as::<_, SettingRow>(&sql)
            .bind(key.as_str())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(SettingRecord::try_from).transpose()
    }

    async fn setting_exists(&self, key: &SettingKey) -> Result<bool, RepoError> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE key = $1)",
            self.tables().settings
        );
        sqlx::query_scalar::<_, bool>(&sql)
            .bind(key.as_str())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn upsert_setting(&self, key: &SettingKey, value: &Value) -> Result<(), RepoError> {
        query(&self.upsert_setting_sql())
            .bind(key.as_str())
            .bind(encode_value(value))
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete_setting(&self, key: &SettingKey) -> Result<bool, RepoError> {
        let sql = format!("DELETE FROM {} WHERE key = $1", self.tables().settings);
        let result = query(&sql)
            .bind(key.as_str())
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_settings(&self) -> Result<Vec<SettingRecord>, RepoError> {
        let sql = format!(
            "SELECT key, value, updated_at FROM {} ORDER BY key",
            self.tables().settings
        );
        let rows = sqlx::query_as::<_, SettingRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(SettingRecord::try_from).collect()
    }

    async fn import_settings(
        &self,
        entries: &[(SettingKey, Value)],
        replace: bool,
    ) -> Result<u64, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        if replace {
            let sql = format!("DELETE FROM {}", self.tables().settings);
            query(&sql)
                .execute(tx.as_mut())
                .await
                .map_err(map_sqlx_error)?;
        }

        let upsert = self.upsert_setting_sql();
        let mut written = 0;
        for (key, value) in entries {
            query(&upsert)
                .bind(key.as_str())
                .bind(encode_value(value))
                .execute(tx.as_mut())
                .await
                .map_err(map_sqlx_error)?;
            written += 1;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(value: &str) -> SettingRow {
        SettingRow {
            key: "k".to_string(),
            value: value.to_string(),
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn nul_characters_survive_encoding() {
        let value = json!({"label": "a\u{0000}b", "a\u{0000}key": [1, 2.5, null]});
        let encoded = encode_value(&value);
        assert!(!encoded.contains('\0'));

        let record = SettingRecord::try_from(row(&encoded)).expect("decodes");
        assert_eq!(record.value, value);
    }

    #[test]
    fn corrupt_rows_are_integrity_errors() {
        let err = SettingRecord::try_from(row("{not json")).expect_err("invalid");
        assert!(matches!(err, RepoError::Integrity { .. }));
    }
}
