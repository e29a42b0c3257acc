use async_trait::async_trait;
use sqlx::query;
use time::OffsetDateTime;

use crate::application::repos::{NewRenderEntry, RenderEntryRepo, RepoError};
use crate::cache::RenderKey;

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl RenderEntryRepo for PostgresRepositories {
    async fn find_entry(
        &self,
        key: &RenderKey,
        now: OffsetDateTime,
    ) -> Result<Option<String>, RepoError> {
        let sql = format!(
            "SELECT payload FROM {} WHERE cache_key = $1 AND expires_at > $2",
            self.tables().render_entries
        );
        sqlx::query_scalar::<_, String>(&sql)
            .bind(key.storage_key())
            .bind(now)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn store_entry(&self, entry: NewRenderEntry<'_>) -> Result<(), RepoError> {
        let sql = format!(
            "INSERT INTO {} (cache_key, entity_id, generation, payload, created_at, expires_at)
             VALUES ($1, $2, $3, $4, now(), $5)
             ON CONFLICT (cache_key) DO UPDATE SET
                 payload = EXCLUDED.payload,
                 created_at = EXCLUDED.created_at,
                 expires_at = EXCLUDED.expires_at",
            self.tables().render_entries
        );
        query(&sql)
            .bind(entry.key.storage_key())
            .bind(entry.key.entity().get())
            .bind(entry.key.generation().get())
            .bind(entry.payload)
            .bind(entry.expires_at)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let sql = format!(
            "DELETE FROM {} WHERE expires_at <= $1",
            self.tables().render_entries
        );
        let result = query(&sql)
            .bind(now)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
