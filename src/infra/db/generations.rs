use async_trait::async_trait;

use crate::application::repos::{GenerationRepo, RepoError};
use crate::domain::render::{EntityId, Generation};

use super::{PostgresRepositories, map_sqlx_error};

fn stored_generation(raw: i64) -> Result<Generation, RepoError> {
    Generation::from_stored(raw).map_err(|err| RepoError::Integrity {
        message: err.to_string(),
    })
}

#[async_trait]
impl GenerationRepo for PostgresRepositories {
    async fn current_generation(&self, entity: EntityId) -> Result<Generation, RepoError> {
        let sql = format!(
            "SELECT generation FROM {} WHERE entity_id = $1",
            self.tables().render_generations
        );
        let stored = sqlx::query_scalar::<_, i64>(&sql)
            .bind(entity.get())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        stored.map_or(Ok(Generation::INITIAL), stored_generation)
    }

    async fn increment_generation(&self, entity: EntityId) -> Result<Generation, RepoError> {
        // An entity without a row is implicitly at the initial generation, so
        // its first bump inserts the successor directly.
        let sql = format!(
            "INSERT INTO {table} AS g (entity_id, generation, updated_at)
             VALUES ($1, $2, now())
             ON CONFLICT (entity_id) DO UPDATE SET
                 generation = g.generation + 1,
                 updated_at = EXCLUDED.updated_at
             RETURNING generation",
            table = self.tables().render_generations
        );
        let next = sqlx::query_scalar::<_, i64>(&sql)
            .bind(entity.get())
            .bind(Generation::INITIAL.next().get())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        stored_generation(next)
    }
}
