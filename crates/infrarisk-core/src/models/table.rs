//! Tabular feature datasets.
//!
//! A [`FeatureTable`] is the unit every geoprocessing step consumes and
//! produces: an ordered field list plus features carrying a `geo` geometry and
//! a name -> value attribute map. The system fields `OBJECTID` and
//! `Shape_Length` are always present and derived from the feature itself.

use geo::{Coord, Geometry, LineString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{InfraRiskError, Result};

/// Object identity system field
pub const OBJECTID: &str = "OBJECTID";

/// Geometry length system field
pub const SHAPE_LENGTH: &str = "Shape_Length";

/// Scalar attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum AttributeValue {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Text(String),
}

impl AttributeValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Numeric view of the value; text is parsed, booleans map to 0/1
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Null => None,
            AttributeValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            AttributeValue::Integer(i) => Some(*i as f64),
            AttributeValue::Double(d) => Some(*d),
            AttributeValue::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            AttributeValue::Double(d) if d.fract() == 0.0 => Some(*d as i64),
            AttributeValue::Boolean(b) => Some(*b as i64),
            AttributeValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Convert a GeoJSON property value
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => AttributeValue::Null,
            serde_json::Value::Bool(b) => AttributeValue::Boolean(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => AttributeValue::Integer(i),
                None => n.as_f64().map(AttributeValue::Double).unwrap_or(AttributeValue::Null),
            },
            serde_json::Value::String(s) => AttributeValue::Text(s.clone()),
            other => AttributeValue::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AttributeValue::Null => serde_json::Value::Null,
            AttributeValue::Boolean(b) => serde_json::Value::Bool(*b),
            AttributeValue::Integer(i) => serde_json::Value::from(*i),
            AttributeValue::Double(d) => serde_json::Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            AttributeValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

/// Field storage type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    ObjectId,
    Integer,
    Double,
    Text,
    Boolean,
}

impl FieldType {
    /// Type a column would get from a sample value
    pub fn infer(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Null => None,
            AttributeValue::Boolean(_) => Some(FieldType::Boolean),
            AttributeValue::Integer(_) => Some(FieldType::Integer),
            AttributeValue::Double(_) => Some(FieldType::Double),
            AttributeValue::Text(_) => Some(FieldType::Text),
        }
    }
}

/// Column definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    /// System-maintained field (never hidden, never renamed away)
    pub required: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self { name: name.into(), field_type, required: false }
    }

    fn system(name: &str, field_type: FieldType) -> Self {
        Self { name: name.to_string(), field_type, required: true }
    }
}

/// A feature row
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub object_id: i64,
    pub geometry: Geometry<f64>,
    pub attributes: HashMap<String, AttributeValue>,
}

impl Feature {
    pub fn new(object_id: i64, geometry: Geometry<f64>) -> Self {
        Self { object_id, geometry, attributes: HashMap::new() }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Value of a field, resolving system fields from the feature itself
    pub fn get(&self, field: &str) -> AttributeValue {
        if field.eq_ignore_ascii_case(OBJECTID) {
            AttributeValue::Integer(self.object_id)
        } else if field.eq_ignore_ascii_case(SHAPE_LENGTH) {
            AttributeValue::Double(geometry_length(&self.geometry))
        } else {
            self.attributes.get(field).cloned().unwrap_or_default()
        }
    }

    pub fn length(&self) -> f64 {
        geometry_length(&self.geometry)
    }
}

/// Named feature dataset
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    pub name: String,
    pub fields: Vec<Field>,
    pub features: Vec<Feature>,
}

impl FeatureTable {
    /// Create an empty table holding only the system fields
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: vec![
                Field::system(OBJECTID, FieldType::ObjectId),
                Field::system(SHAPE_LENGTH, FieldType::Double),
            ],
            features: Vec::new(),
        }
    }

    /// Case-insensitive field lookup
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Add a field; adding an existing name is an error
    pub fn add_field(&mut self, field: Field) -> Result<()> {
        if self.has_field(&field.name) {
            return Err(InfraRiskError::geometry(
                "add_field",
                format!("field {} already exists in {}", field.name, self.name),
            ));
        }
        self.fields.push(field);
        Ok(())
    }

    /// Drop a non-required field and its values
    pub fn delete_field(&mut self, name: &str) -> Result<()> {
        let Some(pos) = self.fields.iter().position(|f| f.name.eq_ignore_ascii_case(name)) else {
            return Err(InfraRiskError::geometry(
                "delete_field",
                format!("field {} does not exist in {}", name, self.name),
            ));
        };
        if self.fields[pos].required {
            return Err(InfraRiskError::geometry(
                "delete_field",
                format!("field {} is required and cannot be deleted", name),
            ));
        }
        let removed = self.fields.remove(pos);
        for feature in &mut self.features {
            feature.attributes.remove(&removed.name);
        }
        Ok(())
    }

    /// Compute a field value for every feature
    pub fn calculate_field(&mut self, name: &str, f: impl Fn(&Feature) -> AttributeValue) -> Result<()> {
        let Some(field) = self.field(name).cloned() else {
            return Err(InfraRiskError::geometry(
                "calculate_field",
                format!("field {} does not exist in {}", name, self.name),
            ));
        };
        if field.required {
            return Err(InfraRiskError::geometry(
                "calculate_field",
                format!("field {} is system maintained", name),
            ));
        }
        for feature in &mut self.features {
            let value = f(feature);
            feature.attributes.insert(field.name.clone(), value);
        }
        Ok(())
    }

    /// Names of the user (non-system) fields in order
    pub fn attribute_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| !f.required)
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Next free name for `base`, suffixing `_1`, `_2`, ... on collision
    pub fn unique_field_name(&self, base: &str) -> String {
        if !self.has_field(base) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| !self.has_field(candidate))
            .unwrap_or_else(|| base.to_string())
    }
}

/// Planar length of a geometry; polygons contribute their ring perimeters
pub fn geometry_length(geometry: &Geometry<f64>) -> f64 {
    match geometry {
        Geometry::Line(line) => coord_distance(line.start, line.end),
        Geometry::LineString(ls) => line_string_length(ls),
        Geometry::MultiLineString(mls) => mls.iter().map(line_string_length).sum(),
        Geometry::Polygon(p) => {
            line_string_length(p.exterior()) + p.interiors().iter().map(line_string_length).sum::<f64>()
        }
        Geometry::MultiPolygon(mp) => mp
            .iter()
            .map(|p| {
                line_string_length(p.exterior())
                    + p.interiors().iter().map(line_string_length).sum::<f64>()
            })
            .sum(),
        Geometry::GeometryCollection(gc) => gc.iter().map(geometry_length).sum(),
        _ => 0.0,
    }
}

pub fn line_string_length(ls: &LineString<f64>) -> f64 {
    ls.0.windows(2).map(|w| coord_distance(w[0], w[1])).sum()
}

pub fn coord_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (b.x - a.x).hypot(b.y - a.y)
}
