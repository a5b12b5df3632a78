//! PostgreSQL configuration

use infrarisk_core::config::validate_identifier;
use infrarisk_core::error::InfraRiskError;
use std::time::Duration;
use thiserror::Error;

use crate::ports::{DEFINE_INPUT_DATA, IMPORT_RESULTS, SET_STUDY_AREA};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(String),

    #[error("Invalid configuration value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

impl From<ConfigError> for InfraRiskError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Missing(key) => InfraRiskError::ConfigMissing { key },
            ConfigError::Invalid { key, reason } => InfraRiskError::ConfigInvalid { key, reason },
        }
    }
}

/// Connection settings for the risk database
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub database_url: String,
    pub pool: PoolConfig,
    /// Upper bound for committing or rolling back one bulk append
    pub transaction_timeout: Duration,
    pub procedures: ProcedureNames,
}

const TIMEOUT_VAR: &str = "INFRARISK_PG_TRANSACTION_TIMEOUT_SECS";
const MAX_CONNECTIONS_VAR: &str = "INFRARISK_PG_MAX_CONNECTIONS";

impl PostgresConfig {
    /// Read `DATABASE_URL` plus the optional `INFRARISK_PG_*` tuning variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::Missing("DATABASE_URL".to_string()))?;

        let mut config = Self::new(database_url)?;
        if let Some(secs) = env_number::<u64>(TIMEOUT_VAR)? {
            config.transaction_timeout = Duration::from_secs(secs);
        }
        if let Some(max) = env_number::<u32>(MAX_CONNECTIONS_VAR)? {
            config.pool.max_connections = max;
            config.pool.min_connections = config.pool.min_connections.min(max);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn new(database_url: String) -> Result<Self, ConfigError> {
        let config = Self {
            database_url,
            pool: PoolConfig::default(),
            transaction_timeout: Duration::from_secs(300),
            procedures: ProcedureNames::default(),
        };
        config.check_url()?;
        Ok(config)
    }

    fn check_url(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(invalid("database_url", "cannot be empty"));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.check_url()?;
        if self.transaction_timeout.is_zero() {
            return Err(invalid("transaction_timeout", "must be at least one second"));
        }
        self.pool.validate()?;
        self.procedures.validate()
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { key: key.to_string(), reason: reason.into() }
}

fn env_number<T: std::str::FromStr>(var: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(var, format!("'{}' is not a non-negative integer", raw))),
        Err(_) => Ok(None),
    }
}

/// Pool sizing; sessions call the database one step at a time
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { min_connections: 1, max_connections: 4, acquire_timeout: Duration::from_secs(30) }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(invalid("pool.max_connections", "a session needs at least one connection"));
        }
        if self.min_connections > self.max_connections {
            return Err(invalid(
                "pool.min_connections",
                format!("{} exceeds max_connections {}", self.min_connections, self.max_connections),
            ));
        }
        Ok(())
    }
}

/// Names of the stored procedures the pipeline calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureNames {
    pub set_study_area: String,
    pub define_input_data: String,
    pub import_results: String,
}

impl Default for ProcedureNames {
    fn default() -> Self {
        Self {
            set_study_area: SET_STUDY_AREA.to_string(),
            define_input_data: DEFINE_INPUT_DATA.to_string(),
            import_results: IMPORT_RESULTS.to_string(),
        }
    }
}

impl ProcedureNames {
    pub fn all(&self) -> [&str; 3] {
        [self.set_study_area.as_str(), self.define_input_data.as_str(), self.import_results.as_str()]
    }

    /// Procedure names are spliced into SQL and must be plain identifiers
    pub fn validate(&self) -> Result<(), ConfigError> {
        for name in self.all() {
            validate_identifier("procedures", name).map_err(|e| invalid("procedures", e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_config_new_valid() {
        let config = PostgresConfig::new("postgresql://localhost/cmr".to_string()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.procedures.import_results, "cmrSP_importResults");
    }

    #[test]
    fn test_config_new_empty_url() {
        match PostgresConfig::new("".to_string()) {
            Err(ConfigError::Invalid { key, .. }) => assert_eq!(key, "database_url"),
            _ => panic!("Expected Invalid error"),
        }
    }

    #[test]
    fn test_pool_config_invalid_min_max() {
        let pool = PoolConfig { min_connections: 20, max_connections: 10, ..Default::default() };
        assert!(pool.validate().is_err());

        let pool = PoolConfig { min_connections: 0, max_connections: 0, ..Default::default() };
        assert!(pool.validate().is_err());
    }

    #[test]
    fn test_procedure_names_must_be_identifiers() {
        let mut config = PostgresConfig::new("postgresql://localhost/cmr".to_string()).unwrap();
        config.procedures.import_results = "x; DROP TABLE y".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::remove_var("DATABASE_URL");
        assert!(matches!(PostgresConfig::from_env(), Err(ConfigError::Missing(_))));

        std::env::set_var("DATABASE_URL", "postgresql://localhost/cmr");
        std::env::set_var(TIMEOUT_VAR, "60");
        std::env::set_var(MAX_CONNECTIONS_VAR, "1");
        let config = PostgresConfig::from_env().unwrap();

        std::env::set_var(TIMEOUT_VAR, "soon");
        let bad = PostgresConfig::from_env();

        std::env::remove_var("DATABASE_URL");
        std::env::remove_var(TIMEOUT_VAR);
        std::env::remove_var(MAX_CONNECTIONS_VAR);

        assert_eq!(config.transaction_timeout, Duration::from_secs(60));
        assert_eq!((config.pool.min_connections, config.pool.max_connections), (1, 1));
        assert!(matches!(bad, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_config_error_maps_to_kind() {
        let err: InfraRiskError = ConfigError::Missing("DATABASE_URL".to_string()).into();
        assert_eq!(err.kind(), infrarisk_core::ErrorKind::Config);
    }
}
