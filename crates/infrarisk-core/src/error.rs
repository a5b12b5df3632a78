//! Error types for InfraRisk

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a failure, independent of its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotInitiated,
    InvalidInput,
    AmbiguousJoinKey,
    MissingJoinKey,
    RemoteCallFailed,
    GeometryOperationFailed,
    OutputConflict,
    Config,
    Io,
    Serialization,
}

#[derive(Debug, Error)]
pub enum InfraRiskError {
    // Session ordering
    #[error("Cannot run {operation} before the study is initiated")]
    NotInitiated { operation: String },

    // Input errors
    #[error("Invalid input for {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    // Field mapping discovery
    #[error("Could not determine which field contains the {key}: candidates {candidates:?} all match '{pattern}'")]
    AmbiguousJoinKey {
        key: String,
        pattern: String,
        candidates: Vec<String>,
    },

    #[error("Could not determine which field contains the {key}: no column matches '{pattern}'")]
    MissingJoinKey { key: String, pattern: String },

    // Remote store
    #[error("Remote call {procedure} failed: {reason}")]
    RemoteCallFailed {
        procedure: String,
        reason: String,
        messages: Vec<String>,
    },

    // Geometry / table operations
    #[error("Geometry operation '{step}' failed: {reason}")]
    GeometryOperationFailed { step: String, reason: String },

    #[error("Output {path} already exists and could not be removed: {reason}")]
    OutputConflict { path: PathBuf, reason: String },

    // Configuration errors
    #[error("Missing required configuration: {key}")]
    ConfigMissing { key: String },

    #[error("Invalid configuration value for {key}: {reason}")]
    ConfigInvalid { key: String, reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl InfraRiskError {
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput { field: field.into(), reason: reason.into() }
    }

    pub fn geometry(step: impl Into<String>, reason: impl ToString) -> Self {
        Self::GeometryOperationFailed { step: step.into(), reason: reason.to_string() }
    }

    pub fn remote(procedure: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RemoteCallFailed {
            procedure: procedure.into(),
            reason: reason.into(),
            messages: Vec::new(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotInitiated { .. } => ErrorKind::NotInitiated,
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::AmbiguousJoinKey { .. } => ErrorKind::AmbiguousJoinKey,
            Self::MissingJoinKey { .. } => ErrorKind::MissingJoinKey,
            Self::RemoteCallFailed { .. } => ErrorKind::RemoteCallFailed,
            Self::GeometryOperationFailed { .. } => ErrorKind::GeometryOperationFailed,
            Self::OutputConflict { .. } => ErrorKind::OutputConflict,
            Self::ConfigMissing { .. } | Self::ConfigInvalid { .. } => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Prefix the failure with the pipeline step that produced it, keeping its kind.
    pub fn in_step(self, step: &str) -> Self {
        match self {
            Self::GeometryOperationFailed { step: inner, reason } => {
                Self::GeometryOperationFailed { step: format!("{step}/{inner}"), reason }
            }
            Self::Io(e) => Self::GeometryOperationFailed {
                step: step.to_string(),
                reason: e.to_string(),
            },
            Self::Serialization(reason) => {
                Self::Serialization(format!("{step}: {reason}"))
            }
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, InfraRiskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = InfraRiskError::invalid_input("study_name", "must not be empty");
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = InfraRiskError::ConfigMissing { key: "DATABASE_URL".into() };
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_in_step_keeps_geometry_kind() {
        let err = InfraRiskError::geometry("identity", "empty line").in_step("overlay");
        assert_eq!(err.kind(), ErrorKind::GeometryOperationFailed);
        assert!(err.to_string().contains("overlay/identity"));
    }

    #[test]
    fn test_in_step_leaves_join_key_errors_alone() {
        let err = InfraRiskError::MissingJoinKey {
            key: "element_feature_id".into(),
            pattern: "fid_splitfeats".into(),
        }
        .in_step("projection");
        assert_eq!(err.kind(), ErrorKind::MissingJoinKey);
    }
}
