//! Study Session.
//!
//! Owns the study identity and drives the pipeline:
//!
//! ```text
//! Uninitiated -> Initiated -> DatasetsRegistered -> Overlaid -> Imported -> Finalized
//!                     any non-terminal state -> Failed
//! ```
//!
//! The scratch area is disposed and the workspace restored whether the run
//! succeeds or fails.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use infrarisk_core::config::LayeredConfig;
use infrarisk_core::error::{InfraRiskError, Result};
use infrarisk_core::mapping::{resolve_join_keys, FieldMapping, CANONICAL_COLUMNS};
use infrarisk_core::models::{DatasetId, DatasetKind, FeatureTable, InputDataset, Study, StudyId};
use infrarisk_core::projection::{project, ImportRow, VisibilityPolicy};
use infrarisk_core::protocol::StatusMessage;
use infrarisk_geo::io::{self, GeometryKind};
use infrarisk_geo::overlay::{split_and_overlay, OverlayOutput, SEGMENTS_NAME};
use infrarisk_geo::{CleanupReport, Environment, ScratchArea};
use infrarisk_store::ports::StudyStore;

use crate::client::ImportClient;

/// Name of the persisted import-table intermediate
pub const IMPORT_INTERMEDIATE: &str = "earImportTbl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Uninitiated,
    Initiated,
    DatasetsRegistered,
    Overlaid,
    Imported,
    Finalized,
    Failed,
}

/// Per-session settings; the field mapping is the session's own copy
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub tolerance: f64,
    pub output_dir: PathBuf,
    pub import_table: String,
    pub scratch_prefix: String,
    pub field_mapping: FieldMapping,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let config = LayeredConfig::with_defaults();
        Self {
            tolerance: config.tolerance.value,
            output_dir: config.output_dir.value,
            import_table: config.import_table.value,
            scratch_prefix: config.scratch_prefix.value,
            field_mapping: FieldMapping::default(),
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &LayeredConfig) -> Result<Self> {
        Ok(Self {
            tolerance: config.tolerance.value,
            output_dir: config.output_dir.value.clone(),
            import_table: config.import_table.value.clone(),
            scratch_prefix: config.scratch_prefix.value.clone(),
            field_mapping: config.field_mapping()?,
        })
    }
}

/// Overlay output together with the rows ready for import
#[derive(Debug, Clone)]
pub struct PreparedImport {
    pub overlay: OverlayOutput,
    /// Base mapping with the discovered join keys filled in
    pub mapping: FieldMapping,
    /// Filtered rows in [`CANONICAL_COLUMNS`] order
    pub rows: Vec<ImportRow>,
}

/// Read the element (line) and hazard zone (area) datasets
pub fn read_inputs(element: &InputDataset, hazard: &InputDataset) -> Result<(FeatureTable, FeatureTable)> {
    let elements = io::read_dataset(Path::new(&element.path), GeometryKind::Line)?;
    let zones = io::read_dataset(Path::new(&hazard.path), GeometryKind::Area)?;
    Ok((elements, zones))
}

/// Overlay, join-key discovery and projection/filter. No remote calls.
pub fn prepare_import(
    env: &Environment,
    base_mapping: &FieldMapping,
    elements: &FeatureTable,
    zones: &FeatureTable,
    study_id: StudyId,
) -> Result<PreparedImport> {
    let overlay = split_and_overlay(env, elements, zones, study_id)?;

    let columns: Vec<String> =
        overlay.intersections.attribute_fields().map(|f| f.name.clone()).collect();
    let mapping = resolve_join_keys(base_mapping, &columns, &zones.name, SEGMENTS_NAME)?;

    let rows = {
        let projected = project(&overlay.intersections, &mapping, VisibilityPolicy::AllowList)
            .filter_importable()?;
        tracing::info!(
            intersections = overlay.intersections.len(),
            importable = projected.len(),
            "Projected intersection table"
        );
        projected.import_rows(&CANONICAL_COLUMNS)
    };

    Ok(PreparedImport { overlay, mapping, rows })
}

/// Summary of a finished session
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub study_id: StudyId,
    pub segments: usize,
    pub at_risk_segments: usize,
    pub intersections: usize,
    pub imported_rows: u64,
    pub finalize_messages: Vec<StatusMessage>,
    pub output_path: PathBuf,
    pub cleanup: CleanupReport,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// One study run against the risk database
pub struct StudySession {
    client: ImportClient,
    settings: SessionSettings,
    environment: Environment,
    state: SessionState,
    study: Option<Study>,
    datasets: BTreeMap<DatasetKind, InputDataset>,
    output: Option<PathBuf>,
}

impl StudySession {
    pub fn new(store: Arc<dyn StudyStore>, settings: SessionSettings) -> Self {
        let client = ImportClient::new(store, settings.import_table.clone());
        let environment = Environment::new(settings.tolerance);
        Self {
            client,
            settings,
            environment,
            state: SessionState::Uninitiated,
            study: None,
            datasets: BTreeMap::new(),
            output: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn study(&self) -> Option<&Study> {
        self.study.as_ref()
    }

    pub fn study_id(&self) -> Option<StudyId> {
        self.study.as_ref().and_then(|s| s.id)
    }

    /// Dataset currently known for a kind
    pub fn dataset(&self, kind: DatasetKind) -> Option<&InputDataset> {
        self.datasets.get(&kind)
    }

    /// The output feature set written by a successful run
    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Check the store before any study is touched
    pub async fn verify_store(&self) -> Result<()> {
        self.client.verify().await
    }

    fn fail(&mut self, err: InfraRiskError) -> InfraRiskError {
        tracing::error!(state = ?self.state, "Study session failed: {}", err);
        self.state = SessionState::Failed;
        err
    }

    fn datasets_known(&self) -> bool {
        self.datasets.contains_key(&DatasetKind::Hazard) && self.datasets.contains_key(&DatasetKind::Element)
    }

    fn require_study(&self, operation: &str) -> Result<StudyId> {
        match (self.state, self.study_id()) {
            (SessionState::Uninitiated, _) | (_, None) => {
                Err(InfraRiskError::NotInitiated { operation: operation.to_string() })
            }
            (SessionState::Initiated | SessionState::DatasetsRegistered, Some(id)) => Ok(id),
            (state, Some(_)) => Err(InfraRiskError::invalid_input(
                "session",
                format!("cannot run {} in state {:?}", operation, state),
            )),
        }
    }

    /// Initiate the study. Dataset paths passed here are registered by the
    /// same remote call.
    pub async fn initiate(
        &mut self,
        study: Study,
        hazard_path: Option<&str>,
        element_path: Option<&str>,
    ) -> Result<StudyId> {
        if self.state != SessionState::Uninitiated {
            return Err(InfraRiskError::invalid_input(
                "session",
                format!("study already initiated (state {:?})", self.state),
            ));
        }

        let mut given = Vec::new();
        for (kind, path) in [(DatasetKind::Hazard, hazard_path), (DatasetKind::Element, element_path)] {
            if let Some(path) = path {
                match InputDataset::new(kind, path, None) {
                    Ok(dataset) => given.push(dataset),
                    Err(e) => return Err(self.fail(e)),
                }
            }
        }

        match self.client.initiate_study(&study, hazard_path, element_path).await {
            Ok(id) => {
                self.study = Some(study.with_id(id));
                for dataset in given {
                    self.datasets.insert(dataset.kind, dataset);
                }
                self.state = if self.datasets_known() {
                    SessionState::DatasetsRegistered
                } else {
                    SessionState::Initiated
                };
                Ok(id)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Register a dataset for the study, replacing any dataset of that kind
    pub async fn register_dataset(
        &mut self,
        kind: DatasetKind,
        path: &str,
        description: Option<&str>,
    ) -> Result<DatasetId> {
        let study_id = self.require_study("register_dataset")?;

        let mut dataset = match InputDataset::new(kind, path, description.map(str::to_string)) {
            Ok(dataset) => dataset,
            Err(e) => return Err(self.fail(e)),
        };

        match self.client.register_dataset(study_id, kind, path, description).await {
            Ok(id) => {
                dataset.id = Some(id);
                if let Some(previous) = self.datasets.insert(kind, dataset) {
                    tracing::info!(%kind, previous = %previous.path, current = path, "Replaced dataset");
                }
                if self.datasets_known() {
                    self.state = SessionState::DatasetsRegistered;
                }
                Ok(id)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Run overlay, import and finalize, then write the output feature set.
    pub async fn hazard_element_intersection(&mut self) -> Result<SessionReport> {
        let study_id = self.require_study("hazard_element_intersection")?;
        let started_at = Utc::now();

        let mut scratch = match ScratchArea::create(&self.settings.scratch_prefix) {
            Ok(scratch) => scratch,
            Err(e) => return Err(self.fail(e)),
        };

        let result = self.run(study_id, &mut scratch).await;

        let cleanup = scratch.dispose();
        if !cleanup.is_clean() {
            tracing::warn!(failed = cleanup.failed.len(), "Scratch area was not fully removed");
        }

        match result {
            Ok(mut report) => {
                report.cleanup = cleanup;
                report.started_at = started_at;
                report.finished_at = Utc::now();
                self.output = Some(report.output_path.clone());
                self.state = SessionState::Finalized;
                tracing::info!(
                    study_id = %study_id,
                    output = %report.output_path.display(),
                    "Hazard/element intersection finished"
                );
                Ok(report)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn run(&mut self, study_id: StudyId, scratch: &mut ScratchArea) -> Result<SessionReport> {
        let hazard = self
            .datasets
            .get(&DatasetKind::Hazard)
            .cloned()
            .ok_or_else(|| InfraRiskError::invalid_input("hazard_path", "no hazard dataset known for the study"))?;
        let element = self
            .datasets
            .get(&DatasetKind::Element)
            .cloned()
            .ok_or_else(|| InfraRiskError::invalid_input("element_path", "no element dataset known for the study"))?;

        let output_dir = self.settings.output_dir.clone();
        fs::create_dir_all(&output_dir).map_err(|e| {
            InfraRiskError::invalid_input("output_dir", format!("cannot create {}: {}", output_dir.display(), e))
        })?;

        let prepared = {
            let guard = self.environment.enter(scratch.workspace().to_path_buf());
            let (elements, zones) = read_inputs(&element, &hazard)?;
            let prepared = prepare_import(&guard, &self.settings.field_mapping, &elements, &zones, study_id)?;

            scratch.save_table(&guard, &prepared.overlay.segments)?;
            scratch.save_table(&guard, &prepared.overlay.intersections)?;
            scratch.save_rows(&guard, IMPORT_INTERMEDIATE, &CANONICAL_COLUMNS, &prepared.rows)?;
            prepared
        };
        self.state = SessionState::Overlaid;

        let committed = self.client.bulk_import(&CANONICAL_COLUMNS, &prepared.rows).await?;
        self.state = SessionState::Imported;

        let outcome = match self.client.finalize_import(study_id).await {
            Ok(outcome) => outcome,
            Err(InfraRiskError::RemoteCallFailed { procedure, reason, messages }) if committed.rows > 0 => {
                return Err(InfraRiskError::RemoteCallFailed {
                    procedure,
                    reason: format!(
                        "{}; {} rows for study {} were committed to {} without a successful import",
                        reason, committed.rows, study_id, committed.table
                    ),
                    messages,
                });
            }
            Err(e) => return Err(e),
        };

        let output_path = output_dir.join(format!("{}.geojson", Study::output_name(study_id)));
        let output_mapping = prepared.mapping.for_output();
        let projected = project(&prepared.overlay.segments, &output_mapping, VisibilityPolicy::KeepUnmapped);
        io::write_projected(&output_path, &projected, true)?;

        let now = Utc::now();
        Ok(SessionReport {
            study_id,
            segments: prepared.overlay.segments.len(),
            at_risk_segments: prepared.overlay.at_risk_count(),
            intersections: prepared.overlay.intersections.len(),
            imported_rows: committed.rows,
            finalize_messages: outcome.messages,
            output_path,
            cleanup: CleanupReport::default(),
            started_at: now,
            finished_at: now,
        })
    }
}
