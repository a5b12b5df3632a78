//! Geoprocessing environment.
//!
//! Every overlay and persistence step receives an explicit [`Environment`]
//! instead of reading process-wide settings. The active workspace is switched
//! through [`Environment::enter`], whose guard puts the previous workspace
//! back when it goes out of scope, on error paths included.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use infrarisk_core::config::DEFAULT_TOLERANCE;
use infrarisk_core::error::{InfraRiskError, Result};

/// Settings shared by the geoprocessing steps of one session
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    workspace: Option<PathBuf>,

    /// Replace existing datasets when writing into the workspace
    pub overwrite_output: bool,

    /// Length epsilon for crossing detection and duplicate comparison
    pub tolerance: f64,
}

impl Default for Environment {
    fn default() -> Self {
        Self { workspace: None, overwrite_output: true, tolerance: DEFAULT_TOLERANCE }
    }
}

impl Environment {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance, ..Self::default() }
    }

    pub fn workspace(&self) -> Option<&Path> {
        self.workspace.as_deref()
    }

    /// Make `workspace` current until the returned guard is dropped
    pub fn enter(&mut self, workspace: impl Into<PathBuf>) -> WorkspaceGuard<'_> {
        let previous = self.workspace.replace(workspace.into());
        tracing::debug!(workspace = ?self.workspace, previous = ?previous, "Entered workspace");
        WorkspaceGuard { env: self, previous }
    }

    /// Location of a dataset inside the current workspace
    pub fn resolve(&self, dataset: &str) -> Result<PathBuf> {
        match &self.workspace {
            Some(workspace) => Ok(workspace.join(dataset)),
            None => Err(InfraRiskError::geometry(
                "resolve",
                format!("no workspace is active for dataset {}", dataset),
            )),
        }
    }
}

/// Scoped workspace switch; restores the previous workspace on drop
#[derive(Debug)]
pub struct WorkspaceGuard<'a> {
    env: &'a mut Environment,
    previous: Option<PathBuf>,
}

impl Deref for WorkspaceGuard<'_> {
    type Target = Environment;

    fn deref(&self) -> &Self::Target {
        self.env
    }
}

impl DerefMut for WorkspaceGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.env
    }
}

impl Drop for WorkspaceGuard<'_> {
    fn drop(&mut self) {
        self.env.workspace = self.previous.take();
        tracing::debug!(workspace = ?self.env.workspace, "Restored workspace");
    }
}
