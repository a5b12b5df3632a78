//! Projection/Filter stage.
//!
//! Renames, hides and keeps columns of a derived table according to a
//! [`FieldMapping`], then applies the importability predicate. Nothing here
//! touches geometry; the projected table still references the source features
//! so the output artifact can be written from the same view.

use serde::Serialize;

use crate::error::{InfraRiskError, Result};
use crate::mapping::{FieldMapping, ELEMENT_SIZE, EVENT_FREQUENCY};
use crate::models::{AttributeValue, Feature, FeatureTable, FieldType};

/// What happens to columns no mapping entry targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityPolicy {
    /// Unmatched columns are hidden (import table)
    AllowList,
    /// Unmatched columns stay visible under their own name (output features)
    KeepUnmapped,
}

/// A column of the projected view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedField {
    /// Column name in the source table
    pub source: String,
    /// Column name in the projected view
    pub name: String,
    pub field_type: FieldType,
    pub visible: bool,
    pub required: bool,
}

/// Renamed/hidden view over a feature table
#[derive(Debug, Clone)]
pub struct ProjectedTable<'a> {
    pub source: &'a FeatureTable,
    pub fields: Vec<ProjectedField>,
    /// Indices into `source.features` that survive the row filter
    pub rows: Vec<usize>,
}

/// One row of canonical values, in `columns` order
pub type ImportRow = Vec<AttributeValue>;

impl<'a> ProjectedTable<'a> {
    /// Visible columns, by projected name
    pub fn visible_fields(&self) -> impl Iterator<Item = &ProjectedField> {
        self.fields.iter().filter(|f| f.visible)
    }

    pub fn visible_names(&self) -> Vec<String> {
        self.visible_fields().map(|f| f.name.clone()).collect()
    }

    fn field_by_name(&self, name: &str) -> Option<&ProjectedField> {
        self.fields.iter().find(|f| f.visible && f.name.eq_ignore_ascii_case(name))
    }

    /// Value of a projected column for a source feature
    pub fn value(&self, feature: &Feature, name: &str) -> AttributeValue {
        match self.field_by_name(name) {
            Some(field) => feature.get(&field.source),
            None => AttributeValue::Null,
        }
    }

    /// Surviving source features
    pub fn features(&self) -> impl Iterator<Item = &'a Feature> + '_ {
        let source = self.source;
        self.rows.iter().map(move |&i| &source.features[i])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keep rows where `element_size > 0 AND event_frequency > 0`.
    ///
    /// Null or non-numeric values fail the predicate. Both columns must be
    /// part of the projected schema.
    pub fn filter_importable(mut self) -> Result<Self> {
        for column in [ELEMENT_SIZE, EVENT_FREQUENCY] {
            if self.field_by_name(column).is_none() {
                return Err(InfraRiskError::invalid_input(
                    column,
                    format!(
                        "column required by the import filter is missing from {}",
                        self.source.name
                    ),
                ));
            }
        }

        let before = self.rows.len();
        let source = self.source;
        let keep: Vec<usize> = self
            .rows
            .iter()
            .copied()
            .filter(|&i| {
                let feature = &source.features[i];
                let positive = |column: &str| self.value(feature, column).as_f64().is_some_and(|v| v > 0.0);
                positive(ELEMENT_SIZE) && positive(EVENT_FREQUENCY)
            })
            .collect();
        self.rows = keep;

        tracing::debug!(
            table = %self.source.name,
            kept = self.rows.len(),
            dropped = before - self.rows.len(),
            "Applied import filter"
        );
        Ok(self)
    }

    /// Canonical import rows for the given column order.
    ///
    /// Columns absent from the view are imported as null.
    pub fn import_rows(&self, columns: &[&str]) -> Vec<ImportRow> {
        self.features()
            .map(|feature| columns.iter().map(|c| self.value(feature, c)).collect())
            .collect()
    }
}

/// Build a projected view of `table` under `mapping`.
///
/// Required/system columns are always kept and visible; one targeted by a
/// mapping entry is exposed under the canonical name. Other columns are
/// renamed when mapped, otherwise handled by `policy`.
pub fn project<'a>(
    table: &'a FeatureTable,
    mapping: &FieldMapping,
    policy: VisibilityPolicy,
) -> ProjectedTable<'a> {
    let fields = table
        .fields
        .iter()
        .map(|field| {
            let canonical = mapping.canonical_for(&field.name);
            let (name, visible) = match (canonical, field.required, policy) {
                (Some(canonical), _, _) => (canonical.to_string(), true),
                (None, true, _) => (field.name.clone(), true),
                (None, false, VisibilityPolicy::KeepUnmapped) => (field.name.clone(), true),
                (None, false, VisibilityPolicy::AllowList) => (field.name.clone(), false),
            };
            ProjectedField {
                source: field.name.clone(),
                name,
                field_type: field.field_type,
                visible,
                required: field.required,
            }
        })
        .collect();

    ProjectedTable { source: table, fields, rows: (0..table.features.len()).collect() }
}
