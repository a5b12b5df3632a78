//! GeoJSON dataset reader and writers.
//!
//! Input datasets are GeoJSON feature collections. Intermediate and output
//! datasets are written back as GeoJSON; the import table intermediate is
//! plain JSON.

use geo::Geometry;
use geojson::{feature::Id, FeatureCollection, GeoJson};
use infrarisk_core::error::{InfraRiskError, Result};
use infrarisk_core::models::dataset::dataset_name;
use infrarisk_core::models::{
    AttributeValue, Feature, FeatureTable, Field, FieldType, OBJECTID, SHAPE_LENGTH,
};
use infrarisk_core::projection::{ImportRow, ProjectedTable};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Geometry family a dataset must consist of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryKind {
    /// LineString / MultiLineString (elements)
    Line,
    /// Polygon / MultiPolygon (hazard zones)
    Area,
}

impl GeometryKind {
    fn accepts(&self, geometry: &Geometry<f64>) -> bool {
        match self {
            GeometryKind::Line => {
                matches!(geometry, Geometry::LineString(_) | Geometry::MultiLineString(_))
            }
            GeometryKind::Area => {
                matches!(geometry, Geometry::Polygon(_) | Geometry::MultiPolygon(_))
            }
        }
    }

    fn expected(&self) -> &'static str {
        match self {
            GeometryKind::Line => "LineString or MultiLineString",
            GeometryKind::Area => "Polygon or MultiPolygon",
        }
    }
}

/// Read a GeoJSON dataset into a feature table named after the file stem.
///
/// Feature identity is the numeric GeoJSON `id` when present, otherwise the
/// 1-based position. A repeated explicit `id` is rejected. When a position
/// would collide with another feature's explicit `id`, every feature is
/// identified by its position instead. Property columns are typed from their
/// values.
pub fn read_dataset(path: &Path, kind: GeometryKind) -> Result<FeatureTable> {
    let locator = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|e| {
        InfraRiskError::invalid_input(&locator, format!("Failed to read dataset: {}", e))
    })?;

    let geojson: GeoJson = content.parse().map_err(|e: geojson::Error| {
        InfraRiskError::invalid_input(&locator, format!("Failed to parse GeoJSON: {}", e))
    })?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        GeoJson::Feature(feature) => {
            FeatureCollection { bbox: None, features: vec![feature], foreign_members: None }
        }
        GeoJson::Geometry(_) => {
            return Err(InfraRiskError::invalid_input(
                &locator,
                "expected a Feature or FeatureCollection, found a bare geometry",
            ))
        }
    };

    let explicit_ids: Vec<Option<i64>> = collection
        .features
        .iter()
        .map(|feature| match &feature.id {
            Some(Id::Number(n)) => n.as_i64(),
            _ => None,
        })
        .collect();
    let object_ids = assign_object_ids(&locator, &explicit_ids)?;

    let mut table = FeatureTable::new(dataset_name(&locator));
    let mut columns: Vec<(String, Option<FieldType>)> = Vec::new();

    for (feature, object_id) in collection.features.into_iter().zip(object_ids) {
        let Some(geometry) = feature.geometry else {
            return Err(InfraRiskError::invalid_input(
                &locator,
                format!("feature {} has no geometry", object_id),
            ));
        };
        let geometry = Geometry::<f64>::try_from(geometry).map_err(|e| {
            InfraRiskError::invalid_input(&locator, format!("feature {}: {}", object_id, e))
        })?;
        if !kind.accepts(&geometry) {
            return Err(InfraRiskError::invalid_input(
                &locator,
                format!(
                    "feature {} is a {}, expected {}",
                    object_id,
                    geometry_type(&geometry),
                    kind.expected()
                ),
            ));
        }

        let mut row = Feature::new(object_id, geometry);
        for (key, value) in feature.properties.unwrap_or_default() {
            // System fields are derived from the feature itself
            if key.eq_ignore_ascii_case(OBJECTID) || key.eq_ignore_ascii_case(SHAPE_LENGTH) {
                continue;
            }
            let value = AttributeValue::from_json(&value);
            merge_column_type(&mut columns, &key, &value);
            row.attributes.insert(key, value);
        }
        table.features.push(row);
    }

    for (name, field_type) in columns {
        table
            .add_field(Field::new(name, field_type.unwrap_or(FieldType::Text)))
            .map_err(|e| InfraRiskError::invalid_input(&locator, e.to_string()))?;
    }

    tracing::debug!(
        dataset = %table.name,
        features = table.len(),
        fields = table.fields.len(),
        "Read dataset"
    );
    Ok(table)
}

/// Resolve one unique identity per feature from the optional explicit ids
fn assign_object_ids(locator: &str, explicit_ids: &[Option<i64>]) -> Result<Vec<i64>> {
    let mut seen: HashMap<i64, usize> = HashMap::new();
    for (position, id) in explicit_ids.iter().enumerate() {
        let Some(id) = id else { continue };
        if let Some(first) = seen.insert(*id, position + 1) {
            return Err(InfraRiskError::invalid_input(
                locator,
                format!("features {} and {} share the id {}", first, position + 1, id),
            ));
        }
    }

    let resolved: Vec<i64> = explicit_ids
        .iter()
        .enumerate()
        .map(|(position, id)| id.unwrap_or(position as i64 + 1))
        .collect();
    let fallback_collides = explicit_ids
        .iter()
        .zip(&resolved)
        .any(|(explicit, id)| explicit.is_none() && seen.contains_key(id));
    if !fallback_collides {
        return Ok(resolved);
    }

    tracing::warn!(
        dataset = locator,
        "Feature positions collide with explicit ids; identifying every feature by position"
    );
    Ok((1..=explicit_ids.len() as i64).collect())
}

fn merge_column_type(columns: &mut Vec<(String, Option<FieldType>)>, key: &str, value: &AttributeValue) {
    let observed = FieldType::infer(value);
    match columns.iter_mut().find(|(name, _)| name == key) {
        None => columns.push((key.to_string(), observed)),
        Some((_, current)) => {
            *current = match (*current, observed) {
                (None, t) | (t, None) => t,
                (Some(a), Some(b)) if a == b => Some(a),
                (Some(FieldType::Integer), Some(FieldType::Double))
                | (Some(FieldType::Double), Some(FieldType::Integer)) => Some(FieldType::Double),
                _ => Some(FieldType::Text),
            };
        }
    }
}

fn geometry_type(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// Remove an existing dataset before it is rewritten
fn prepare_target(path: &Path, overwrite: bool) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    if !overwrite {
        return Err(InfraRiskError::OutputConflict {
            path: path.to_path_buf(),
            reason: "dataset exists and overwriting is disabled".to_string(),
        });
    }
    fs::remove_file(path).map_err(|e| InfraRiskError::OutputConflict {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn to_geojson_feature(feature: &Feature, properties: Map<String, Value>) -> geojson::Feature {
    geojson::Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(&feature.geometry))),
        id: Some(Id::Number(serde_json::Number::from(feature.object_id))),
        properties: Some(properties),
        foreign_members: None,
    }
}

fn write_collection(path: &Path, features: Vec<geojson::Feature>) -> Result<()> {
    let collection = FeatureCollection { bbox: None, features, foreign_members: None };
    let json = serde_json::to_string_pretty(&collection)
        .map_err(|e| InfraRiskError::Serialization(e.to_string()))?;
    fs::write(path, json)?;
    Ok(())
}

/// Write every attribute field of a feature table
pub fn write_table(path: &Path, table: &FeatureTable, overwrite: bool) -> Result<()> {
    prepare_target(path, overwrite)?;
    let features = table
        .features
        .iter()
        .map(|feature| {
            let properties = table
                .attribute_fields()
                .map(|field| (field.name.clone(), feature.get(&field.name).to_json()))
                .collect();
            to_geojson_feature(feature, properties)
        })
        .collect();
    write_collection(path, features)
}

/// Write the visible columns and surviving rows of a projected view
pub fn write_projected(path: &Path, projected: &ProjectedTable<'_>, overwrite: bool) -> Result<()> {
    prepare_target(path, overwrite)?;
    let names = projected.visible_names();
    let features = projected
        .features()
        .map(|feature| {
            let properties = names
                .iter()
                .map(|name| (name.clone(), projected.value(feature, name).to_json()))
                .collect();
            to_geojson_feature(feature, properties)
        })
        .collect();
    write_collection(path, features)
}

/// Write import rows as `{"columns": [...], "rows": [[...], ...]}`
pub fn write_rows(path: &Path, columns: &[&str], rows: &[ImportRow], overwrite: bool) -> Result<()> {
    prepare_target(path, overwrite)?;
    let body = serde_json::json!({
        "columns": columns,
        "rows": rows
            .iter()
            .map(|row| row.iter().map(AttributeValue::to_json).collect::<Vec<_>>())
            .collect::<Vec<_>>(),
    });
    let json = serde_json::to_string_pretty(&body)
        .map_err(|e| InfraRiskError::Serialization(e.to_string()))?;
    fs::write(path, json)?;
    Ok(())
}
