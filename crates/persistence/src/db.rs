//! PostgreSQL pool setup for the document store backend.

use sqlx::migrate::MigrateError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

use crate::store::{PgDocumentStore, StoreError};

/// Pool settings for the PostgreSQL backend.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

pub async fn create_pool(config: &PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect(&config.url)
        .await
}

/// Creates the documents table and its change trigger when missing.
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    sqlx::migrate!("./src/migrations").run(pool).await?;
    info!("Document store migrations applied");
    Ok(())
}

/// Connects, migrates and wraps the pool in a document store.
pub async fn connect_store(config: &PoolConfig) -> Result<PgDocumentStore, StoreError> {
    let pool = create_pool(config).await?;
    run_migrations(&pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    Ok(PgDocumentStore::new(pool))
}
