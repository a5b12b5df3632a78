//! Import-table transactions.
//!
//! One bulk append runs in one transaction: either every chunk lands or none
//! does. Commit and rollback are bounded by the configured timeout.

use infrarisk_core::error::{InfraRiskError, Result};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::time::Duration;
use tokio::time::timeout;

/// An open append to one import table
pub struct ImportTransaction {
    tx: Transaction<'static, Postgres>,
    table: String,
    appended: u64,
    limit: Duration,
}

impl ImportTransaction {
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Rows appended so far (not yet durable)
    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// Run one INSERT statement inside the transaction
    pub async fn execute(&mut self, mut statement: QueryBuilder<'static, Postgres>) -> Result<u64> {
        let result = statement
            .build()
            .execute(&mut *self.tx)
            .await
            .map_err(|e| InfraRiskError::remote(&self.table, format!("Bulk append failed: {}", e)))?;
        self.appended += result.rows_affected();
        Ok(result.rows_affected())
    }

    /// Make the appended rows durable; returns how many were committed
    pub async fn commit(self) -> Result<u64> {
        let (table, appended, limit) = (self.table, self.appended, self.limit);
        match timeout(limit, self.tx.commit()).await {
            Ok(Ok(())) => Ok(appended),
            Ok(Err(e)) => Err(InfraRiskError::remote(table, format!("Failed to commit {} rows: {}", appended, e))),
            Err(_) => Err(InfraRiskError::remote(
                table,
                format!("Commit of {} rows timed out after {}s", appended, limit.as_secs()),
            )),
        }
    }

    /// Discard everything appended so far
    pub async fn rollback(self) -> Result<()> {
        let (table, limit) = (self.table, self.limit);
        match timeout(limit, self.tx.rollback()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(InfraRiskError::remote(table, format!("Failed to roll back: {}", e))),
            Err(_) => Err(InfraRiskError::remote(
                table,
                format!("Rollback timed out after {}s", limit.as_secs()),
            )),
        }
    }
}

/// Opens import transactions on a pool
pub struct TransactionManager {
    pool: PgPool,
    limit: Duration,
}

impl TransactionManager {
    pub fn new(pool: PgPool, limit: Duration) -> Self {
        Self { pool, limit }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Start appending to `table`
    pub async fn begin(&self, table: &str) -> Result<ImportTransaction> {
        let tx = self.pool.begin().await.map_err(|e| {
            InfraRiskError::remote(table, format!("Failed to begin transaction: {}", e))
        })?;
        Ok(ImportTransaction { tx, table: table.to_string(), appended: 0, limit: self.limit })
    }
}
