//! Postgres-backed repository implementations.

mod generations;
mod render_entries;
pub mod schema;
mod settings;
mod util;

pub use schema::{CURRENT_SCHEMA_VERSION, DEFAULT_TABLE_PREFIX, TableNames};
pub use util::map_sqlx_error;

use std::sync::Arc;

use sqlx::{
    Postgres, Transaction,
    postgres::{PgPool, PgPoolOptions},
};

/// One pool plus the prefixed table layout it operates on.
///
/// Implements every repository trait; callers hand out `Arc` clones of it as
/// the individual `dyn` repos.
#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
    tables: Arc<TableNames>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool, tables: TableNames) -> Self {
        Self {
            pool: Arc::new(pool),
            tables: Arc::new(tables),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    pub async fn begin(&self) -> Result<Transaction<'_, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }
}
