use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::baseline::{FsKvStore, KvStore, MemoryKvStore, PgKvStore};
use crate::config::StoreBackend;

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Opens the configured key-value backend for the baseline store.
pub async fn open_kv_store(backend: &StoreBackend) -> Result<Arc<dyn KvStore>> {
    let store: Arc<dyn KvStore> = match backend {
        StoreBackend::Memory => {
            info!("Baseline store: in-memory (bundles are lost on restart)");
            Arc::new(MemoryKvStore::new())
        }
        StoreBackend::Fs { dir } => {
            tokio::fs::create_dir_all(dir).await?;
            info!("Baseline store: filesystem at {}", dir.display());
            Arc::new(FsKvStore::new(dir.clone()))
        }
        StoreBackend::Postgres { database_url } => {
            let kv = PgKvStore::new(create_pool(database_url).await?);
            kv.migrate().await?;
            info!("Baseline store: PostgreSQL");
            Arc::new(kv)
        }
    };
    Ok(store)
}
