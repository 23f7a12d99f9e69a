//! Database service for identity-store.

use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::services::queries::{Queries, RowAccess};
use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions, Postgres};
use std::time::Duration;
use tracing::{info, instrument};

/// A source of transactions and of pool-level row access handles.
#[async_trait]
pub trait Database: Send + Sync {
    type Tx: Transaction;

    type Queries<'a>: RowAccess
    where
        Self: 'a;

    /// Open a new transaction. Never retried.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    /// Row access outside any transaction, for read-only workflows.
    fn queries(&self) -> Self::Queries<'_>;
}

/// An open transaction.
///
/// `commit` and `rollback` consume the transaction, so at most one terminal
/// action can be taken on it. Implementations must roll back when dropped
/// without either, as `sqlx::Transaction` does: a cancelled `exec_tx` future
/// relies on that to discard its writes.
#[async_trait]
pub trait Transaction: Send {
    type Queries<'t>: RowAccess
    where
        Self: 't;

    /// A row access handle whose statements all run inside this transaction.
    fn queries(&mut self) -> Self::Queries<'_>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

/// Postgres connection pool wrapper.
#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Create a new database connection pool.
    #[instrument(skip(config), fields(service = "identity-store"))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(&config.url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl Database for PgDatabase {
    type Tx = PgTransaction;

    type Queries<'a> = Queries<'a>
    where
        Self: 'a;

    async fn begin(&self) -> Result<PgTransaction, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::from(e).context("failed to begin transaction"))?;
        Ok(PgTransaction { tx })
    }

    fn queries(&self) -> Queries<'_> {
        Queries::from_pool(&self.pool)
    }
}

/// An open Postgres transaction. Dropping it without commit or rollback
/// (for example when the caller's future is cancelled) rolls it back.
pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Transaction for PgTransaction {
    type Queries<'t> = Queries<'t>
    where
        Self: 't;

    fn queries(&mut self) -> Queries<'_> {
        Queries::from_tx(&mut *self.tx)
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| StoreError::from(e).context("failed to commit transaction"))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| StoreError::from(e).context("failed to roll back transaction"))
    }
}
