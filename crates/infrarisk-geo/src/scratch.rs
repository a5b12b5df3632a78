//! Scratch Area Manager.
//!
//! One scratch area per session: a temporary directory holding a dataset
//! container. Every intermediate dataset is registered the moment it is
//! written; disposal attempts to delete each registered artifact exactly once
//! and never fails.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::env::Environment;
use crate::io;
use infrarisk_core::error::{InfraRiskError, Result};
use infrarisk_core::models::FeatureTable;
use infrarisk_core::projection::ImportRow;

/// Name of the dataset container inside the scratch directory
pub const CONTAINER_NAME: &str = "cmr.gdb";

/// What disposal managed to remove
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    /// Artifacts that could not be removed, with the reason
    pub failed: Vec<(PathBuf, String)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Disposable per-session storage for intermediate datasets
#[derive(Debug)]
pub struct ScratchArea {
    dir: Option<TempDir>,
    container: PathBuf,
    artifacts: Vec<PathBuf>,
}

impl ScratchArea {
    /// Create a fresh scratch directory and its dataset container
    pub fn create(prefix: &str) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .map_err(|e| InfraRiskError::geometry("create_scratch", e))?;
        let container = dir.path().join(CONTAINER_NAME);
        fs::create_dir(&container).map_err(|e| InfraRiskError::geometry("create_scratch", e))?;

        tracing::debug!(scratch = %container.display(), "Created scratch area");
        Ok(Self { dir: Some(dir), container, artifacts: Vec::new() })
    }

    /// The container datasets are written into
    pub fn workspace(&self) -> &Path {
        &self.container
    }

    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    /// Track an artifact for disposal
    pub fn register(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.artifacts.contains(&path) {
            self.artifacts.push(path);
        }
    }

    fn target(&self, env: &Environment, file_name: &str) -> Result<PathBuf> {
        let path = env.resolve(file_name)?;
        if !path.starts_with(&self.container) {
            return Err(InfraRiskError::geometry(
                "persist",
                format!("{} is outside the scratch area {}", path.display(), self.container.display()),
            ));
        }
        Ok(path)
    }

    /// Persist a feature table into the active workspace
    pub fn save_table(&mut self, env: &Environment, table: &FeatureTable) -> Result<PathBuf> {
        let path = self.target(env, &format!("{}.geojson", table.name))?;
        // Register before writing so a partial file is still cleaned up
        self.register(&path);
        io::write_table(&path, table, env.overwrite_output).map_err(|e| e.in_step("persist"))?;
        Ok(path)
    }

    /// Persist import rows into the active workspace
    pub fn save_rows(
        &mut self,
        env: &Environment,
        name: &str,
        columns: &[&str],
        rows: &[ImportRow],
    ) -> Result<PathBuf> {
        let path = self.target(env, &format!("{}.json", name))?;
        self.register(&path);
        io::write_rows(&path, columns, rows, env.overwrite_output).map_err(|e| e.in_step("persist"))?;
        Ok(path)
    }

    /// Delete every registered artifact, then the area itself
    pub fn dispose(mut self) -> CleanupReport {
        self.cleanup()
    }

    fn cleanup(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();

        for artifact in self.artifacts.drain(..) {
            match fs::remove_file(&artifact) {
                Ok(()) => report.removed.push(artifact),
                Err(e) => {
                    tracing::warn!("Failed to delete scratch artifact {}: {}", artifact.display(), e);
                    report.failed.push((artifact, e.to_string()));
                }
            }
        }

        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => report.removed.push(path),
                Err(e) => {
                    tracing::warn!("Failed to delete scratch area {}: {}", path.display(), e);
                    report.failed.push((path, e.to_string()));
                }
            }
        }

        tracing::debug!(
            removed = report.removed.len(),
            failed = report.failed.len(),
            "Disposed scratch area"
        );
        report
    }
}

impl Drop for ScratchArea {
    fn drop(&mut self) {
        if self.dir.is_some() || !self.artifacts.is_empty() {
            self.cleanup();
        }
    }
}
