//! Import Protocol Client.
//!
//! Typed calls over [`StudyStore`]: every procedure answer is decoded with the
//! result-row protocol, and every diagnostic row is logged as it is read.

use infrarisk_core::error::{InfraRiskError, Result};
use infrarisk_core::models::{DatasetId, DatasetKind, InputDataset, Study, StudyId};
use infrarisk_core::projection::ImportRow;
use infrarisk_core::protocol::{decode_assigned_id, decode_import_outcome, ImportOutcome, StatusMessage};
use infrarisk_store::ports::{
    DatasetRequest, StudyAreaRequest, StudyStore, DEFINE_INPUT_DATA, IMPORT_RESULTS, SET_STUDY_AREA,
};
use serde::Serialize;
use std::sync::Arc;

/// Rows durably appended by a bulk import
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Committed {
    pub table: String,
    pub rows: u64,
}

/// Client for the study procedures and the import table
#[derive(Clone)]
pub struct ImportClient {
    store: Arc<dyn StudyStore>,
    import_table: String,
}

impl ImportClient {
    pub fn new(store: Arc<dyn StudyStore>, import_table: impl Into<String>) -> Self {
        Self { store, import_table: import_table.into() }
    }

    pub fn import_table(&self) -> &str {
        &self.import_table
    }

    /// Check that the store offers the procedures the pipeline calls
    pub async fn verify(&self) -> Result<()> {
        self.store.verify().await
    }

    /// Create or update the study; both dataset paths may be passed along in
    /// the same call
    pub async fn initiate_study(
        &self,
        study: &Study,
        hazard_path: Option<&str>,
        element_path: Option<&str>,
    ) -> Result<StudyId> {
        if study.name.trim().is_empty() {
            return Err(InfraRiskError::invalid_input("study_name", "must not be empty"));
        }

        let request = StudyAreaRequest {
            study_id: study.id,
            name: study.name.clone(),
            description: study.description.clone(),
            hazard_path: hazard_path.map(str::to_string),
            element_path: element_path.map(str::to_string),
        };
        let result = self.store.set_study_area(&request).await?;
        let id = StudyId(decode_assigned_id(SET_STUDY_AREA, result)?);

        tracing::info!(study_id = %id, name = %study.name, "Study initiated");
        Ok(id)
    }

    /// Register an input dataset; a dataset of the same kind replaces the
    /// previous one
    pub async fn register_dataset(
        &self,
        study_id: StudyId,
        kind: DatasetKind,
        path: &str,
        description: Option<&str>,
    ) -> Result<DatasetId> {
        let dataset = InputDataset::new(kind, path, description.map(str::to_string))?;
        let request = DatasetRequest {
            study_id,
            kind,
            name: dataset.name.clone(),
            path: dataset.path.clone(),
            description: dataset.effective_description().to_string(),
        };
        let result = self.store.define_input_data(&request).await?;
        let id = DatasetId(decode_assigned_id(DEFINE_INPUT_DATA, result)?);

        tracing::info!(study_id = %study_id, %kind, dataset = %dataset.name, dataset_id = id.0, "Dataset registered");
        Ok(id)
    }

    /// Append rows to the import table without per-row validation
    pub async fn bulk_import(&self, columns: &[&str], rows: &[ImportRow]) -> Result<Committed> {
        let appended = self.store.append_rows(&self.import_table, columns, rows).await?;
        tracing::info!(table = %self.import_table, rows = appended, "Appended rows to import table");
        Ok(Committed { table: self.import_table.clone(), rows: appended })
    }

    /// Run the import procedure. Succeeds only when the highest status code is zero;
    /// every message is logged as it arrives either way.
    pub async fn finalize_import(&self, study_id: StudyId) -> Result<ImportOutcome> {
        let result = self.store.import_results(study_id).await?;
        let outcome = decode_import_outcome(IMPORT_RESULTS, result, log_message)?;

        if outcome.succeeded() {
            Ok(outcome)
        } else {
            Err(InfraRiskError::RemoteCallFailed {
                procedure: IMPORT_RESULTS.to_string(),
                reason: format!(
                    "Failed to execute the import procedure for study {} (status {})",
                    study_id,
                    outcome.max_status().unwrap_or_default()
                ),
                messages: outcome.message_texts(),
            })
        }
    }
}

fn log_message(message: &StatusMessage) {
    if message.status <= 0 {
        tracing::info!(status = message.status, "{}", message.message);
    } else {
        tracing::warn!(status = message.status, "{}", message.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infrarisk_core::error::ErrorKind;
    use infrarisk_core::models::AttributeValue;
    use infrarisk_core::protocol::{CallResult, ResultRow};
    use infrarisk_store::MemoryStudyStore;

    fn client() -> (MemoryStudyStore, ImportClient) {
        let store = MemoryStudyStore::new("imports");
        let client = ImportClient::new(Arc::new(store.clone()), "imports");
        (store, client)
    }

    #[tokio::test]
    async fn test_initiate_and_register() {
        let (store, client) = client();
        let study = Study::new("Valley", None).unwrap();
        let id = client.initiate_study(&study, None, None).await.unwrap();
        assert_eq!(id, StudyId(1));

        let dataset = client.register_dataset(id, DatasetKind::Hazard, "/data/flood.geojson", None).await.unwrap();
        let active = store.active_dataset(id, DatasetKind::Hazard).unwrap().unwrap();
        assert_eq!(active.id, dataset);
        assert_eq!(active.description, "Hazardzone dataset");
    }

    #[tokio::test]
    async fn test_blank_name_rejected_without_remote_call() {
        let (store, client) = client();
        let study = Study { id: None, name: "  ".into(), description: None };
        let err = client.initiate_study(&study, None, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(store.calls().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_positive_id_fails() {
        let (store, client) = client();
        store
            .script(SET_STUDY_AREA, CallResult::Rows(vec![ResultRow::status(0, "name already used")]))
            .unwrap();
        let study = Study::new("Valley", None).unwrap();
        let err = client.initiate_study(&study, None, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteCallFailed);
    }

    #[tokio::test]
    async fn test_finalize_fails_on_any_nonzero_status() {
        let (store, client) = client();
        store
            .script(
                IMPORT_RESULTS,
                CallResult::Rows(vec![
                    ResultRow::status(0, "found 3 rows"),
                    ResultRow::status(3, "unknown processtype_id"),
                    ResultRow::status(0, "rolled back"),
                ]),
            )
            .unwrap();

        match client.finalize_import(StudyId(1)).await.unwrap_err() {
            InfraRiskError::RemoteCallFailed { messages, .. } => assert_eq!(messages.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bulk_import_reports_committed_rows() {
        let (store, client) = client();
        let rows = vec![vec![AttributeValue::Integer(1)], vec![AttributeValue::Integer(2)]];
        let committed = client.bulk_import(&["study_id"], &rows).await.unwrap();
        assert_eq!(committed, Committed { table: "imports".into(), rows: 2 });
        assert_eq!(store.table("imports").unwrap().rows.len(), 2);
    }
}
