//! Field Mapping Table.
//!
//! Maps canonical import-table column names onto the concrete column names of
//! a derived dataset. The table is an owned value: every session clones its
//! own copy, and the join-key entries are filled in once the overlay output's
//! column names are known.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{InfraRiskError, Result};
use crate::models::{OBJECTID, SHAPE_LENGTH};

pub const ELEMENT_FEATURE_ID: &str = "element_feature_id";
pub const HAZARDZONE_FEATURE_ID: &str = "hazardzone_feature_id";
pub const STUDY_ID: &str = "study_id";
pub const ELEMENTTYPE_CODE: &str = "elementtype_code";
pub const ROUTE_CODE: &str = "route_code";
pub const AADT_PASSENGER: &str = "aadt_passenger";
pub const AADT_GOODS: &str = "aadt_goods";
pub const DIVERSION_TIME: &str = "diversion_time";
pub const PROCESSTYPE_ID: &str = "processtype_id";
pub const EVENT_FREQUENCY: &str = "event_frequency";
pub const FREQ_INTERVAL_PLUS: &str = "freq_interval_plus";
pub const FREQ_INTERVAL_MINUS: &str = "freq_interval_minus";
pub const ELEMENT_SIZE: &str = "element_size";

/// Canonical import columns in import-table order
pub const CANONICAL_COLUMNS: [&str; 13] = [
    ELEMENT_FEATURE_ID,
    HAZARDZONE_FEATURE_ID,
    STUDY_ID,
    ELEMENTTYPE_CODE,
    ROUTE_CODE,
    AADT_PASSENGER,
    AADT_GOODS,
    DIVERSION_TIME,
    PROCESSTYPE_ID,
    EVENT_FREQUENCY,
    FREQ_INTERVAL_PLUS,
    FREQ_INTERVAL_MINUS,
    ELEMENT_SIZE,
];

/// Columns discovered from the overlay output rather than configured
pub const JOIN_KEYS: [&str; 2] = [ELEMENT_FEATURE_ID, HAZARDZONE_FEATURE_ID];

/// Canonical column -> source column mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    entries: BTreeMap<String, String>,
}

impl Default for FieldMapping {
    fn default() -> Self {
        let mut entries: BTreeMap<String, String> =
            CANONICAL_COLUMNS.iter().map(|c| (c.to_string(), c.to_string())).collect();
        entries.insert(ELEMENT_FEATURE_ID.to_string(), "FID_element".to_string());
        entries.insert(HAZARDZONE_FEATURE_ID.to_string(), "FID_zone".to_string());
        entries.insert(ELEMENT_SIZE.to_string(), SHAPE_LENGTH.to_string());
        Self { entries }
    }
}

impl FieldMapping {
    /// Source column for a canonical name
    pub fn get(&self, canonical: &str) -> Option<&str> {
        self.entries.get(canonical).map(String::as_str)
    }

    /// Override the source column of a configurable canonical entry
    pub fn set(&mut self, canonical: &str, source: impl Into<String>) -> Result<()> {
        let source = source.into();
        if !CANONICAL_COLUMNS.contains(&canonical) {
            return Err(InfraRiskError::invalid_input(
                "field_mapping",
                format!("unknown canonical column '{}'", canonical),
            ));
        }
        if JOIN_KEYS.contains(&canonical) {
            return Err(InfraRiskError::invalid_input(
                "field_mapping",
                format!("'{}' is discovered from the overlay output and cannot be overridden", canonical),
            ));
        }
        if source.trim().is_empty() {
            return Err(InfraRiskError::invalid_input(
                "field_mapping",
                format!("source column for '{}' must not be empty", canonical),
            ));
        }
        self.entries.insert(canonical.to_string(), source);
        Ok(())
    }

    /// Apply several overrides, stopping at the first invalid one
    pub fn with_overrides<'a>(
        mut self,
        overrides: impl IntoIterator<Item = (&'a String, &'a String)>,
    ) -> Result<Self> {
        for (canonical, source) in overrides {
            self.set(canonical, source.clone())?;
        }
        Ok(self)
    }

    /// Canonical name whose source column equals `column` (case-insensitive)
    pub fn canonical_for(&self, column: &str) -> Option<&str> {
        CANONICAL_COLUMNS
            .iter()
            .find(|c| self.get(c).is_some_and(|src| src.eq_ignore_ascii_case(column)))
            .copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Mapping for the output feature set, where each segment's own object
    /// id is exposed as the element feature id
    pub fn for_output(&self) -> FieldMapping {
        let mut mapping = self.clone();
        mapping.set_join_key(ELEMENT_FEATURE_ID, OBJECTID.to_string());
        mapping
    }

    fn set_join_key(&mut self, key: &str, column: String) {
        self.entries.insert(key.to_string(), column);
    }
}

/// Join-key column expected for a source dataset name
pub fn join_key_column(source_name: &str) -> String {
    format!("FID_{}", source_name)
}

/// Find the single column named `fid_<source_name>` (case-insensitive).
///
/// `columns` must already exclude required/system columns.
pub fn find_join_key(columns: &[String], key: &str, source_name: &str) -> Result<String> {
    let pattern = join_key_column(source_name).to_lowercase();
    let matches: Vec<&String> = columns.iter().filter(|c| c.to_lowercase() == pattern).collect();

    match matches.as_slice() {
        [single] => Ok((*single).clone()),
        [] => Err(InfraRiskError::MissingJoinKey { key: key.to_string(), pattern }),
        many => Err(InfraRiskError::AmbiguousJoinKey {
            key: key.to_string(),
            pattern,
            candidates: many.iter().map(|c| c.to_string()).collect(),
        }),
    }
}

/// Discover both join keys in the intersection output's columns.
///
/// `element_feature_id` resolves against the split-segments dataset,
/// `hazardzone_feature_id` against the hazard zones dataset.
pub fn resolve_join_keys(
    base: &FieldMapping,
    intersection_columns: &[String],
    zones_source_name: &str,
    segments_source_name: &str,
) -> Result<FieldMapping> {
    let element_column = find_join_key(intersection_columns, ELEMENT_FEATURE_ID, segments_source_name)?;
    let zone_column = find_join_key(intersection_columns, HAZARDZONE_FEATURE_ID, zones_source_name)?;

    let mut mapping = base.clone();
    mapping.set_join_key(ELEMENT_FEATURE_ID, element_column);
    mapping.set_join_key(HAZARDZONE_FEATURE_ID, zone_column);

    tracing::debug!(
        element = mapping.get(ELEMENT_FEATURE_ID).unwrap_or_default(),
        zone = mapping.get(HAZARDZONE_FEATURE_ID).unwrap_or_default(),
        "Resolved join keys"
    );

    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defaults() {
        let mapping = FieldMapping::default();
        assert_eq!(mapping.get(ELEMENT_SIZE), Some("Shape_Length"));
        assert_eq!(mapping.get(EVENT_FREQUENCY), Some("event_frequency"));
        assert_eq!(mapping.iter().count(), CANONICAL_COLUMNS.len());
    }

    #[test]
    fn test_resolve_single_match_case_insensitive() {
        let columns = cols(&["fid_splitfeats", "FID_Hazard_Zones", "event_frequency"]);
        let mapping =
            resolve_join_keys(&FieldMapping::default(), &columns, "hazard_zones", "splitFeats").unwrap();

        assert_eq!(mapping.get(ELEMENT_FEATURE_ID), Some("fid_splitfeats"));
        assert_eq!(mapping.get(HAZARDZONE_FEATURE_ID), Some("FID_Hazard_Zones"));
    }

    #[test]
    fn test_resolve_missing_key() {
        let columns = cols(&["FID_splitFeats", "event_frequency"]);
        let err = resolve_join_keys(&FieldMapping::default(), &columns, "zones", "splitFeats").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingJoinKey);
    }

    #[test]
    fn test_resolve_ambiguous_key() {
        let columns = cols(&["FID_splitFeats", "FID_zones", "fid_ZONES"]);
        let err = resolve_join_keys(&FieldMapping::default(), &columns, "zones", "splitFeats").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousJoinKey);
        match err {
            InfraRiskError::AmbiguousJoinKey { candidates, .. } => assert_eq!(candidates.len(), 2),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_base_mapping_not_mutated() {
        let base = FieldMapping::default();
        let columns = cols(&["FID_splitFeats", "FID_zones"]);
        let resolved = resolve_join_keys(&base, &columns, "zones", "splitFeats").unwrap();
        assert_eq!(base.get(ELEMENT_FEATURE_ID), Some("FID_element"));
        assert_eq!(resolved.get(ELEMENT_FEATURE_ID), Some("FID_splitFeats"));
    }

    #[test]
    fn test_output_mapping_uses_object_id() {
        let mapping = FieldMapping::default().for_output();
        assert_eq!(mapping.canonical_for("objectid"), Some(ELEMENT_FEATURE_ID));
        assert_eq!(mapping.canonical_for("Shape_Length"), Some(ELEMENT_SIZE));
    }

    #[test]
    fn test_overrides() {
        let mut mapping = FieldMapping::default();
        mapping.set(EVENT_FREQUENCY, "freq").unwrap();
        assert_eq!(mapping.canonical_for("FREQ"), Some(EVENT_FREQUENCY));

        assert_eq!(mapping.set("unknown", "x").unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(mapping.set(ELEMENT_FEATURE_ID, "x").unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(mapping.set(ROUTE_CODE, " ").unwrap_err().kind(), ErrorKind::InvalidInput);
    }
}
