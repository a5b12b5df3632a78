use async_trait::async_trait;
use infrarisk_core::error::Result;
use infrarisk_core::models::{DatasetKind, StudyId};
use infrarisk_core::projection::ImportRow;
use infrarisk_core::protocol::CallResult;
use serde::{Deserialize, Serialize};

/// Procedure names as known to the risk database
pub const SET_STUDY_AREA: &str = "cmrSP_setStudyArea";
pub const DEFINE_INPUT_DATA: &str = "cmrSP_defineInputData";
pub const IMPORT_RESULTS: &str = "cmrSP_importResults";

/// Arguments of the set-study-area procedure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyAreaRequest {
    /// Existing study to update; `None` asks the store for a new id
    pub study_id: Option<StudyId>,
    pub name: String,
    pub description: Option<String>,
    pub hazard_path: Option<String>,
    pub element_path: Option<String>,
}

/// Arguments of the define-input-data procedure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRequest {
    pub study_id: StudyId,
    pub kind: DatasetKind,
    pub name: String,
    pub path: String,
    pub description: String,
}

/// Port for the remote risk database.
///
/// Procedure calls return the raw result rows; a call that produced no result
/// set is reported as [`CallResult::Failed`], not as an error. Errors are
/// reserved for failures outside the result-row protocol.
#[async_trait]
pub trait StudyStore: Send + Sync {
    /// Create or update a study area
    async fn set_study_area(&self, request: &StudyAreaRequest) -> Result<CallResult>;

    /// Register an input dataset, replacing any dataset of the same kind
    async fn define_input_data(&self, request: &DatasetRequest) -> Result<CallResult>;

    /// Append rows to a durable table in one transaction, without per-row
    /// validation. Returns the number of rows committed.
    async fn append_rows(&self, table: &str, columns: &[&str], rows: &[ImportRow]) -> Result<u64>;

    /// Process imported rows server-side; answers `(status_code, message)` rows
    async fn import_results(&self, study_id: StudyId) -> Result<CallResult>;

    /// Check that the store offers everything the pipeline calls
    async fn verify(&self) -> Result<()> {
        Ok(())
    }
}
