use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{InfraRiskError, Result};

/// Study identifier assigned by the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StudyId(pub i64);

impl fmt::Display for StudyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A study area registered in the risk database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Study {
    /// Identity; `None` until the remote store assigns one
    pub id: Option<StudyId>,

    /// Study name (never blank)
    pub name: String,

    /// Optional free-text description
    pub description: Option<String>,
}

impl Study {
    /// Create a study request, rejecting blank names
    pub fn new(name: impl Into<String>, description: Option<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(InfraRiskError::invalid_input("study_name", "must be a non-empty string"));
        }
        Ok(Self { id: None, name, description })
    }

    /// Ask the store to reuse (and reset) an existing study id
    pub fn with_id(mut self, id: StudyId) -> Self {
        self.id = Some(id);
        self
    }

    /// Deterministic name of the output feature dataset for a study
    pub fn output_name(id: StudyId) -> String {
        format!("ear{}_feat", id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_name_rejected() {
        assert!(Study::new("   ", None).is_err());
        assert!(Study::new("", Some("desc".into())).is_err());
    }

    #[test]
    fn test_output_name() {
        assert_eq!(Study::output_name(StudyId(7)), "ear7_feat");
    }
}
