use async_trait::async_trait;
use bytes::Bytes;
use sqlx::PgPool;
use tracing::info;

use super::kv::{KvStore, StoreError};

/// Postgres-backed key-value table. Rows are only ever inserted.
#[derive(Clone)]
pub struct PgKvStore {
    pool: PgPool,
}

impl PgKvStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the backing table if it does not exist.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS baseline_kv (
                key        TEXT PRIMARY KEY,
                value      BYTEA NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        info!("baseline_kv table ready");
        Ok(())
    }
}

#[async_trait]
impl KvStore for PgKvStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let value: Option<Vec<u8>> = sqlx::query_scalar("SELECT value FROM baseline_kv WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value.map(Bytes::from))
    }

    async fn put_if_absent(&self, key: &str, value: Bytes) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO baseline_kv (key, value) VALUES ($1, $2) ON CONFLICT (key) DO NOTHING",
        )
        .bind(key)
        .bind(value.as_ref())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let pattern = format!("{}%", escape_like(prefix));
        Ok(sqlx::query_scalar(
            "SELECT key FROM baseline_kv WHERE key LIKE $1 ESCAPE '\\' ORDER BY key ASC",
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?)
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}
