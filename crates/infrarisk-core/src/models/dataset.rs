use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{InfraRiskError, Result};

/// Dataset identifier assigned by the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetId(pub i64);

/// The two kinds of input a study consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DatasetKind {
    /// Hazard zones (area geometry)
    Hazard,
    /// Exposed elements (line geometry)
    Element,
}

impl DatasetKind {
    /// Numeric type code understood by the remote store
    pub fn code(&self) -> i32 {
        match self {
            DatasetKind::Hazard => 1,
            DatasetKind::Element => 2,
        }
    }

    /// Description used when the caller supplies none
    pub fn default_description(&self) -> &'static str {
        match self {
            DatasetKind::Hazard => "Hazardzone dataset",
            DatasetKind::Element => "Element dataset",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetKind::Hazard => write!(f, "hazard"),
            DatasetKind::Element => write!(f, "element"),
        }
    }
}

impl FromStr for DatasetKind {
    type Err = InfraRiskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "hazard" => Ok(DatasetKind::Hazard),
            "element" => Ok(DatasetKind::Element),
            _ => Err(InfraRiskError::invalid_input(
                "dataset_kind",
                format!("Unknown dataset type \"{}\" (must be \"hazard\" or \"element\")", s),
            )),
        }
    }
}

/// An input dataset attached to a study
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputDataset {
    pub kind: DatasetKind,

    /// Display name, derived from the source path
    pub name: String,

    /// Opaque source locator
    pub path: String,

    pub description: Option<String>,

    /// Remote id once registered
    pub id: Option<DatasetId>,
}

impl InputDataset {
    pub fn new(kind: DatasetKind, path: impl Into<String>, description: Option<String>) -> Result<Self> {
        let path = path.into();
        if path.trim().is_empty() {
            return Err(InfraRiskError::invalid_input(
                format!("{}_path", kind),
                "a dataset path is required",
            ));
        }
        let name = dataset_name(&path);
        Ok(Self { kind, name, path, description, id: None })
    }

    /// Description sent to the store
    pub fn effective_description(&self) -> &str {
        self.description.as_deref().unwrap_or(self.kind.default_description())
    }
}

/// Base name of a dataset path without extension
pub fn dataset_name(path: &str) -> String {
    // Windows-style locators are common in GIS catalogs
    let normalized = path.replace('\\', "/");
    Path::new(&normalized)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(&normalized)
        .to_string()
}
