//! In-memory risk database for development and testing.
//!
//! Mimics the stored procedures closely enough to drive a whole session:
//! studies and datasets get sequential ids, datasets are replaced per study
//! and kind, appended rows land in named tables, and the import procedure
//! moves a study's rows out of the import table and reports on them.

use async_trait::async_trait;
use infrarisk_core::error::{InfraRiskError, Result};
use infrarisk_core::mapping::{ELEMENT_SIZE, EVENT_FREQUENCY, STUDY_ID};
use infrarisk_core::models::{AttributeValue, DatasetId, DatasetKind, StudyId};
use infrarisk_core::projection::ImportRow;
use infrarisk_core::protocol::{CallResult, ResultRow};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::ports::{
    DatasetRequest, StudyAreaRequest, StudyStore, DEFINE_INPUT_DATA, IMPORT_RESULTS, SET_STUDY_AREA,
};

/// Stored study area
#[derive(Debug, Clone, PartialEq)]
pub struct StudyRecord {
    pub name: String,
    pub description: Option<String>,
}

/// Active dataset of one kind for one study
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRecord {
    pub id: DatasetId,
    pub name: String,
    pub path: String,
    pub description: String,
}

/// Rows of a durable table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRows {
    pub columns: Vec<String>,
    pub rows: Vec<ImportRow>,
}

impl TableRows {
    fn value<'a>(&self, row: &'a ImportRow, column: &str) -> Option<&'a AttributeValue> {
        self.columns.iter().position(|c| c == column).and_then(|i| row.get(i))
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    studies: BTreeMap<i64, StudyRecord>,
    datasets: HashMap<(i64, DatasetKind), DatasetRecord>,
    tables: HashMap<String, TableRows>,
    /// Rows moved out of the import table by the import procedure, per study
    processed: HashMap<i64, Vec<ImportRow>>,
    next_study_id: i64,
    next_dataset_id: i64,
    /// Procedures that answer with a scripted result instead
    scripted: HashMap<String, CallResult>,
    /// Tables whose appends fail
    failing_tables: HashSet<String>,
    calls: Vec<String>,
}

/// In-memory implementation of StudyStore
#[derive(Debug, Clone)]
pub struct MemoryStudyStore {
    import_table: String,
    state: Arc<RwLock<MemoryState>>,
}

impl Default for MemoryStudyStore {
    fn default() -> Self {
        Self::new(infrarisk_core::config::DEFAULT_IMPORT_TABLE)
    }
}

impl MemoryStudyStore {
    /// Create a store whose import procedure reads `import_table`
    pub fn new(import_table: impl Into<String>) -> Self {
        let state = MemoryState { next_study_id: 1, next_dataset_id: 1, ..Default::default() };
        Self { import_table: import_table.into(), state: Arc::new(RwLock::new(state)) }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        self.state.read().map_err(|_| InfraRiskError::remote("memory", "store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        self.state.write().map_err(|_| InfraRiskError::remote("memory", "store lock poisoned"))
    }

    /// Answer every call of `procedure` with `result`
    pub fn script(&self, procedure: &str, result: CallResult) -> Result<()> {
        self.write()?.scripted.insert(procedure.to_string(), result);
        Ok(())
    }

    /// Make appends to `table` fail
    pub fn fail_appends_to(&self, table: &str) -> Result<()> {
        self.write()?.failing_tables.insert(table.to_string());
        Ok(())
    }

    pub fn study(&self, id: StudyId) -> Result<Option<StudyRecord>> {
        Ok(self.read()?.studies.get(&id.0).cloned())
    }

    /// The dataset currently registered for a study and kind
    pub fn active_dataset(&self, id: StudyId, kind: DatasetKind) -> Result<Option<DatasetRecord>> {
        Ok(self.read()?.datasets.get(&(id.0, kind)).cloned())
    }

    pub fn dataset_count(&self, id: StudyId) -> Result<usize> {
        Ok(self.read()?.datasets.keys().filter(|(study, _)| *study == id.0).count())
    }

    pub fn table(&self, name: &str) -> Result<TableRows> {
        Ok(self.read()?.tables.get(name).cloned().unwrap_or_default())
    }

    /// Rows the import procedure accepted for a study
    pub fn processed_rows(&self, id: StudyId) -> Result<Vec<ImportRow>> {
        Ok(self.read()?.processed.get(&id.0).cloned().unwrap_or_default())
    }

    /// Procedure names in call order
    pub fn calls(&self) -> Result<Vec<String>> {
        Ok(self.read()?.calls.clone())
    }

    fn begin_call(state: &mut MemoryState, procedure: &str) -> Option<CallResult> {
        state.calls.push(procedure.to_string());
        state.scripted.get(procedure).cloned()
    }

    fn upsert_dataset(
        state: &mut MemoryState,
        study_id: i64,
        kind: DatasetKind,
        name: &str,
        path: &str,
        description: &str,
    ) -> DatasetId {
        let id = DatasetId(state.next_dataset_id);
        state.next_dataset_id += 1;
        let previous = state.datasets.insert(
            (study_id, kind),
            DatasetRecord {
                id,
                name: name.to_string(),
                path: path.to_string(),
                description: description.to_string(),
            },
        );
        if let Some(previous) = previous {
            tracing::debug!(study_id, %kind, replaced = %previous.path, "Replaced input dataset");
        }
        id
    }
}

#[async_trait]
impl StudyStore for MemoryStudyStore {
    async fn set_study_area(&self, request: &StudyAreaRequest) -> Result<CallResult> {
        let mut state = self.write()?;
        if let Some(scripted) = Self::begin_call(&mut state, SET_STUDY_AREA) {
            return Ok(scripted);
        }
        if request.name.trim().is_empty() {
            return Ok(CallResult::Rows(vec![ResultRow::status(-1, "study name must not be empty")]));
        }

        let id = match request.study_id {
            Some(StudyId(id)) => {
                state.next_study_id = state.next_study_id.max(id + 1);
                id
            }
            None => {
                let id = state.next_study_id;
                state.next_study_id += 1;
                id
            }
        };
        state.studies.insert(
            id,
            StudyRecord { name: request.name.clone(), description: request.description.clone() },
        );

        for (kind, path) in [
            (DatasetKind::Hazard, &request.hazard_path),
            (DatasetKind::Element, &request.element_path),
        ] {
            if let Some(path) = path {
                let name = infrarisk_core::models::dataset::dataset_name(path);
                Self::upsert_dataset(&mut state, id, kind, &name, path, kind.default_description());
            }
        }

        Ok(CallResult::Rows(vec![ResultRow::new(vec![AttributeValue::Integer(id)])]))
    }

    async fn define_input_data(&self, request: &DatasetRequest) -> Result<CallResult> {
        let mut state = self.write()?;
        if let Some(scripted) = Self::begin_call(&mut state, DEFINE_INPUT_DATA) {
            return Ok(scripted);
        }
        let study_id = request.study_id.0;
        if !state.studies.contains_key(&study_id) {
            return Ok(CallResult::Rows(vec![ResultRow::status(
                -1,
                format!("study {} does not exist", study_id),
            )]));
        }

        let id = Self::upsert_dataset(
            &mut state,
            study_id,
            request.kind,
            &request.name,
            &request.path,
            &request.description,
        );
        Ok(CallResult::Rows(vec![ResultRow::new(vec![AttributeValue::Integer(id.0)])]))
    }

    async fn append_rows(&self, table: &str, columns: &[&str], rows: &[ImportRow]) -> Result<u64> {
        let mut state = self.write()?;
        if state.failing_tables.contains(table) {
            return Err(InfraRiskError::remote(table, "append rejected by store"));
        }
        if let Some(bad) = rows.iter().find(|row| row.len() != columns.len()) {
            return Err(InfraRiskError::remote(
                table,
                format!("row has {} values for {} columns", bad.len(), columns.len()),
            ));
        }

        let target = state.tables.entry(table.to_string()).or_default();
        if target.columns.is_empty() {
            target.columns = columns.iter().map(|c| c.to_string()).collect();
        } else if target.columns.iter().map(String::as_str).ne(columns.iter().copied()) {
            return Err(InfraRiskError::remote(table, "column list differs from existing rows"));
        }
        target.rows.extend(rows.iter().cloned());
        Ok(rows.len() as u64)
    }

    async fn import_results(&self, study_id: StudyId) -> Result<CallResult> {
        let mut state = self.write()?;
        if let Some(scripted) = Self::begin_call(&mut state, IMPORT_RESULTS) {
            return Ok(scripted);
        }
        if !state.studies.contains_key(&study_id.0) {
            return Ok(CallResult::Rows(vec![ResultRow::status(
                1,
                format!("study {} does not exist", study_id),
            )]));
        }

        let table = state.tables.get(&self.import_table).cloned().unwrap_or_default();
        let (mine, others): (Vec<ImportRow>, Vec<ImportRow>) = table.rows.iter().cloned().partition(|row| {
            table.value(row, STUDY_ID).and_then(AttributeValue::as_i64) == Some(study_id.0)
        });

        let mut messages = vec![ResultRow::status(
            0,
            format!("Found {} import rows for study {}", mine.len(), study_id),
        )];
        let invalid = mine
            .iter()
            .filter(|row| {
                [ELEMENT_SIZE, EVENT_FREQUENCY].iter().any(|column| {
                    !table.value(row, column).and_then(AttributeValue::as_f64).is_some_and(|v| v > 0.0)
                })
            })
            .count();
        if invalid > 0 {
            messages.push(ResultRow::status(
                2,
                format!("{} rows have a non-positive element_size or event_frequency", invalid),
            ));
            return Ok(CallResult::Rows(messages));
        }

        if let Some(import) = state.tables.get_mut(&self.import_table) {
            import.rows = others;
        }
        state.processed.entry(study_id.0).or_default().extend(mine);
        messages.push(ResultRow::status(0, "Import finished"));
        Ok(CallResult::Rows(messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hazard(study: i64, path: &str) -> DatasetRequest {
        DatasetRequest {
            study_id: StudyId(study),
            kind: DatasetKind::Hazard,
            name: infrarisk_core::models::dataset::dataset_name(path),
            path: path.to_string(),
            description: "Hazardzone dataset".to_string(),
        }
    }

    fn study_request(id: Option<i64>) -> StudyAreaRequest {
        StudyAreaRequest {
            study_id: id.map(StudyId),
            name: "Valley".to_string(),
            description: None,
            hazard_path: None,
            element_path: None,
        }
    }

    #[tokio::test]
    async fn test_set_study_area_assigns_ids() {
        let store = MemoryStudyStore::default();
        let first = store.set_study_area(&study_request(None)).await.unwrap();
        let explicit = store.set_study_area(&study_request(Some(7))).await.unwrap();
        let next = store.set_study_area(&study_request(None)).await.unwrap();

        let id = |r: &CallResult| match r {
            CallResult::Rows(rows) => rows[0].column(0).and_then(AttributeValue::as_i64),
            CallResult::Failed(_) => None,
        };
        assert_eq!(id(&first), Some(1));
        assert_eq!(id(&explicit), Some(7));
        assert_eq!(id(&next), Some(8));
    }

    #[tokio::test]
    async fn test_replace_dataset_by_kind() {
        let store = MemoryStudyStore::default();
        store.set_study_area(&study_request(Some(7))).await.unwrap();

        store.define_input_data(&hazard(7, "/data/flood_2019.geojson")).await.unwrap();
        store.define_input_data(&hazard(7, "/data/flood_2023.geojson")).await.unwrap();

        let active = store.active_dataset(StudyId(7), DatasetKind::Hazard).unwrap().unwrap();
        assert_eq!(active.path, "/data/flood_2023.geojson");
        assert_eq!(active.name, "flood_2023");
        assert_eq!(store.dataset_count(StudyId(7)).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_define_input_for_unknown_study_fails() {
        let store = MemoryStudyStore::default();
        let result = store.define_input_data(&hazard(3, "/data/flood.geojson")).await.unwrap();
        match result {
            CallResult::Rows(rows) => assert_eq!(rows[0].column(0), Some(&AttributeValue::Integer(-1))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_import_moves_study_rows() {
        let store = MemoryStudyStore::new("imports");
        store.set_study_area(&study_request(Some(7))).await.unwrap();
        let columns = [STUDY_ID, EVENT_FREQUENCY, ELEMENT_SIZE];
        let rows = vec![
            vec![AttributeValue::Integer(7), AttributeValue::Double(2.0), AttributeValue::Double(20.0)],
            vec![AttributeValue::Integer(8), AttributeValue::Double(1.0), AttributeValue::Double(5.0)],
        ];
        assert_eq!(store.append_rows("imports", &columns, &rows).await.unwrap(), 2);

        let outcome = store.import_results(StudyId(7)).await.unwrap();
        match outcome {
            CallResult::Rows(rows) => assert!(rows.iter().all(|r| r.column(0) == Some(&AttributeValue::Integer(0)))),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(store.processed_rows(StudyId(7)).unwrap().len(), 1);
        assert_eq!(store.table("imports").unwrap().rows.len(), 1);
    }

    #[tokio::test]
    async fn test_scripted_and_failing_calls() {
        let store = MemoryStudyStore::default();
        store.script(IMPORT_RESULTS, CallResult::Failed("no result set".into())).unwrap();
        store.fail_appends_to("imports").unwrap();

        assert_eq!(store.import_results(StudyId(1)).await.unwrap(), CallResult::Failed("no result set".into()));
        assert!(store.append_rows("imports", &["a"], &[]).await.is_err());
        assert_eq!(store.calls().unwrap(), vec![IMPORT_RESULTS.to_string()]);
    }
}
