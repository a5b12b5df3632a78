//! PostgreSQL storage adapter implementation

pub mod config;
pub mod import;
pub mod procedures;
pub mod transaction;

pub use config::{ConfigError, PoolConfig, PostgresConfig, ProcedureNames};

use async_trait::async_trait;
use infrarisk_core::error::{InfraRiskError, Result};
use infrarisk_core::models::StudyId;
use infrarisk_core::projection::ImportRow;
use infrarisk_core::protocol::CallResult;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::ports::{DatasetRequest, StudyAreaRequest, StudyStore};
use procedures::{call_procedure, missing_procedures, ProcedureArg};
use transaction::TransactionManager;

/// PostgreSQL risk database adapter
pub struct PostgresStudyStore {
    pool: PgPool,
    config: PostgresConfig,
    transactions: TransactionManager,
}

impl PostgresStudyStore {
    /// Create a new PostgreSQL store with the given configuration
    pub async fn new(config: PostgresConfig) -> Result<Self> {
        config.validate()?;

        let pool = PgPoolOptions::new()
            .min_connections(config.pool.min_connections)
            .max_connections(config.pool.max_connections)
            .acquire_timeout(config.pool.acquire_timeout)
            .connect(&config.database_url)
            .await
            .map_err(|e| InfraRiskError::remote("connect", format!("Failed to connect to database: {}", e)))?;

        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| InfraRiskError::remote("connect", format!("Connection test failed: {}", e)))?;

        let transactions = TransactionManager::new(pool.clone(), config.transaction_timeout);
        Ok(Self { pool, config, transactions })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }
}

#[async_trait]
impl StudyStore for PostgresStudyStore {
    async fn set_study_area(&self, request: &StudyAreaRequest) -> Result<CallResult> {
        call_procedure(
            &self.pool,
            &self.config.procedures.set_study_area,
            &[
                ProcedureArg::Integer(request.study_id.map(|id| id.0)),
                ProcedureArg::Text(Some(request.name.clone())),
                ProcedureArg::Text(request.description.clone()),
                ProcedureArg::Text(request.hazard_path.clone()),
                ProcedureArg::Text(request.element_path.clone()),
            ],
        )
        .await
    }

    async fn define_input_data(&self, request: &DatasetRequest) -> Result<CallResult> {
        call_procedure(
            &self.pool,
            &self.config.procedures.define_input_data,
            &[
                ProcedureArg::Integer(Some(request.study_id.0)),
                ProcedureArg::Integer(Some(request.kind.code().into())),
                ProcedureArg::Text(Some(request.name.clone())),
                ProcedureArg::Text(Some(request.path.clone())),
                ProcedureArg::Text(Some(request.description.clone())),
            ],
        )
        .await
    }

    async fn append_rows(&self, table: &str, columns: &[&str], rows: &[ImportRow]) -> Result<u64> {
        import::append_rows(&self.transactions, table, columns, rows).await
    }

    async fn import_results(&self, study_id: StudyId) -> Result<CallResult> {
        call_procedure(
            &self.pool,
            &self.config.procedures.import_results,
            &[ProcedureArg::Integer(Some(study_id.0))],
        )
        .await
    }

    async fn verify(&self) -> Result<()> {
        let missing = missing_procedures(&self.pool, &self.config.procedures.all()).await?;
        if missing.is_empty() {
            Ok(())
        } else {
            Err(InfraRiskError::remote(
                "verify",
                format!("Required stored procedures are missing: {}", missing.join(", ")),
            ))
        }
    }
}
