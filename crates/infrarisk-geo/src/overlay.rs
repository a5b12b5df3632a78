//! Overlay Engine.
//!
//! `split_and_overlay` runs four steps over an element layer and a hazard
//! zone layer:
//!
//! 1. identity split: every element is cut at each zone boundary crossing;
//!    each piece is emitted once per containing zone, or once with a null
//!    zone id when it lies outside every zone
//! 2. duplicate removal on (parent element, length, coincident geometry)
//! 3. derived `study_id` and `at_risk` columns; the zone id column is dropped
//! 4. intersection of the segments with the zones, keeping all attributes of
//!    both sides for every overlapping pair
//!
//! No reprojection is done; both layers must share one planar reference.

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{Coord, Geometry, Intersects, LineString, Point};
use std::collections::HashMap;
use std::time::Instant;

use crate::env::Environment;
use crate::index::ZoneIndex;
use infrarisk_core::error::{InfraRiskError, Result};
use infrarisk_core::mapping::{join_key_column, STUDY_ID};
use infrarisk_core::models::table::{coord_distance, line_string_length};
use infrarisk_core::models::{AttributeValue, Feature, FeatureTable, Field, FieldType, StudyId};

/// Name of the split segments dataset
pub const SEGMENTS_NAME: &str = "splitFeats";

/// Name of the segment/zone intersection dataset
pub const INTERSECTIONS_NAME: &str = "intersectFeats";

pub const AT_RISK: &str = "at_risk";

/// Result of the overlay
#[derive(Debug, Clone)]
pub struct OverlayOutput {
    pub segments: FeatureTable,
    pub intersections: FeatureTable,
}

impl OverlayOutput {
    pub fn at_risk_count(&self) -> usize {
        self.segments
            .features
            .iter()
            .filter(|f| matches!(f.get(AT_RISK), AttributeValue::Boolean(true)))
            .count()
    }
}

/// Split `elements` at `zones` boundaries and intersect the pieces with the zones
pub fn split_and_overlay(
    env: &Environment,
    elements: &FeatureTable,
    zones: &FeatureTable,
    study_id: StudyId,
) -> Result<OverlayOutput> {
    check_dataset_names(elements, zones)?;
    let index = ZoneIndex::build(zones);

    tracing::info!(
        elements = %elements.name,
        zones = %zones.name,
        "Splitting elements at hazard zone boundaries"
    );
    let started = Instant::now();
    let pieces = identity_split(env, elements, zones, &index).map_err(|e| e.in_step("identity"))?;
    tracing::debug!(pieces = pieces.len(), elapsed = ?started.elapsed(), "Identity split done");

    let started = Instant::now();
    let mut segments = remove_duplicates(env, pieces, &join_key_column(&elements.name));
    tracing::debug!(segments = segments.len(), elapsed = ?started.elapsed(), "Removed duplicate segments");

    derive_columns(&mut segments, zones, study_id).map_err(|e| e.in_step("derive_columns"))?;

    tracing::info!("Intersecting split segments with hazard zones");
    let started = Instant::now();
    let intersections =
        intersect_all(env, &segments, zones, &index).map_err(|e| e.in_step("intersect"))?;
    tracing::debug!(
        intersections = intersections.len(),
        elapsed = ?started.elapsed(),
        "Intersection done"
    );

    Ok(OverlayOutput { segments, intersections })
}

fn check_dataset_names(elements: &FeatureTable, zones: &FeatureTable) -> Result<()> {
    // Identity keys the overlay adds must not already be element columns
    for key in [join_key_column(&elements.name), join_key_column(&zones.name), join_key_column(SEGMENTS_NAME)] {
        if elements.has_field(&key) {
            return Err(InfraRiskError::invalid_input(
                &elements.name,
                format!("column '{}' is reserved for the overlay identity key", key),
            ));
        }
    }

    if elements.name.eq_ignore_ascii_case(&zones.name) {
        return Err(InfraRiskError::invalid_input(
            "dataset_name",
            format!("element and hazard datasets are both named '{}'", zones.name),
        ));
    }
    for table in [elements, zones] {
        if table.name.eq_ignore_ascii_case(SEGMENTS_NAME) || table.name.eq_ignore_ascii_case(INTERSECTIONS_NAME) {
            return Err(InfraRiskError::invalid_input(
                "dataset_name",
                format!("'{}' is reserved for an intermediate dataset", table.name),
            ));
        }
    }
    Ok(())
}

/// A line string with cumulative vertex distances
struct Polyline<'a> {
    line: &'a LineString<f64>,
    cumulative: Vec<f64>,
}

impl<'a> Polyline<'a> {
    fn new(line: &'a LineString<f64>) -> Self {
        let mut cumulative = Vec::with_capacity(line.0.len());
        let mut total = 0.0;
        for (i, coord) in line.0.iter().enumerate() {
            if i > 0 {
                total += coord_distance(line.0[i - 1], *coord);
            }
            cumulative.push(total);
        }
        Self { line, cumulative }
    }

    fn length(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    fn point_at(&self, distance: f64) -> Coord<f64> {
        let coords = &self.line.0;
        for i in 0..coords.len().saturating_sub(1) {
            let (a, b) = (self.cumulative[i], self.cumulative[i + 1]);
            if distance <= b || i + 2 == coords.len() {
                let span = b - a;
                let t = if span > 0.0 { ((distance - a) / span).clamp(0.0, 1.0) } else { 0.0 };
                let (p, q) = (coords[i], coords[i + 1]);
                return Coord { x: p.x + (q.x - p.x) * t, y: p.y + (q.y - p.y) * t };
            }
        }
        coords.first().copied().unwrap_or(Coord { x: 0.0, y: 0.0 })
    }

    fn substring(&self, from: f64, to: f64) -> LineString<f64> {
        let mut coords = vec![self.point_at(from)];
        coords.extend(
            self.line
                .0
                .iter()
                .zip(&self.cumulative)
                .filter(|&(_, &d)| d > from && d < to)
                .map(|(c, _)| *c),
        );
        coords.push(self.point_at(to));
        LineString::new(coords)
    }

    /// Distances along the line where it meets any of the rings, excluding
    /// the endpoints, sorted and merged within `tolerance`.
    ///
    /// Each cut is compared with the first cut of its run, so a chain of
    /// closely spaced cuts keeps one cut per `tolerance` of span.
    fn crossings(&self, rings: &[&LineString<f64>], tolerance: f64) -> Vec<f64> {
        let total = self.length();
        let mut cuts = Vec::new();
        for (i, segment) in self.line.lines().enumerate() {
            if segment.start == segment.end {
                continue;
            }
            let offset = self.cumulative[i];
            for ring in rings {
                for edge in ring.lines() {
                    match line_intersection(segment, edge) {
                        Some(LineIntersection::SinglePoint { intersection, .. }) => {
                            cuts.push(offset + coord_distance(segment.start, intersection));
                        }
                        Some(LineIntersection::Collinear { intersection }) => {
                            cuts.push(offset + coord_distance(segment.start, intersection.start));
                            cuts.push(offset + coord_distance(segment.start, intersection.end));
                        }
                        None => {}
                    }
                }
            }
        }
        cuts.retain(|&d| d > tolerance && d < total - tolerance);
        cuts.sort_by(f64::total_cmp);
        let mut merged: Vec<f64> = Vec::with_capacity(cuts.len());
        for cut in cuts {
            match merged.last() {
                Some(&run_start) if cut - run_start <= tolerance => {}
                _ => merged.push(cut),
            }
        }
        merged
    }
}

fn rings(geometry: &Geometry<f64>) -> Vec<&LineString<f64>> {
    match geometry {
        Geometry::Polygon(p) => std::iter::once(p.exterior()).chain(p.interiors()).collect(),
        Geometry::MultiPolygon(mp) => mp
            .iter()
            .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
            .collect(),
        _ => Vec::new(),
    }
}

fn zone_contains(zone: &Geometry<f64>, coord: Coord<f64>) -> bool {
    let point = Point::from(coord);
    match zone {
        Geometry::Polygon(p) => p.intersects(&point),
        Geometry::MultiPolygon(mp) => mp.iter().any(|p| p.intersects(&point)),
        _ => false,
    }
}

fn line_parts(feature: &Feature) -> Result<Vec<&LineString<f64>>> {
    match &feature.geometry {
        Geometry::LineString(ls) => Ok(vec![ls]),
        Geometry::MultiLineString(mls) => Ok(mls.iter().collect()),
        _ => Err(InfraRiskError::geometry(
            "split",
            format!("element {} is not a line geometry", feature.object_id),
        )),
    }
}

/// Zone-side columns keep their name unless it collides with an existing one
fn attribute_columns(target: &mut FeatureTable, source: &FeatureTable) -> Result<Vec<(String, String)>> {
    let mut renamed = Vec::new();
    for field in source.attribute_fields() {
        let name = target.unique_field_name(&field.name);
        target.add_field(Field::new(&name, field.field_type))?;
        renamed.push((field.name.clone(), name));
    }
    Ok(renamed)
}

/// Step 1: cut every element at each zone boundary crossing.
///
/// Pieces no longer than the tolerance are not emitted.
pub fn identity_split(
    env: &Environment,
    elements: &FeatureTable,
    zones: &FeatureTable,
    index: &ZoneIndex,
) -> Result<FeatureTable> {
    let element_key = join_key_column(&elements.name);
    let zone_key = join_key_column(&zones.name);

    let mut output = FeatureTable::new(SEGMENTS_NAME);
    for field in elements.attribute_fields() {
        output.add_field(Field::new(&field.name, field.field_type))?;
    }
    output.add_field(Field::new(&element_key, FieldType::Integer))?;
    output.add_field(Field::new(&zone_key, FieldType::Integer))?;

    let mut next_id = 1;
    for element in &elements.features {
        let candidates: Vec<&Feature> = index
            .candidates(&element.geometry)
            .into_iter()
            .map(|position| &zones.features[position])
            .collect();
        let candidate_rings: Vec<&LineString<f64>> =
            candidates.iter().flat_map(|zone| rings(&zone.geometry)).collect();

        for part in line_parts(element)? {
            let polyline = Polyline::new(part);
            let mut stops = vec![0.0];
            stops.extend(polyline.crossings(&candidate_rings, env.tolerance));
            stops.push(polyline.length());

            for window in stops.windows(2) {
                let (from, to) = (window[0], window[1]);
                if to - from <= env.tolerance {
                    continue;
                }
                let piece = polyline.substring(from, to);
                let middle = polyline.point_at((from + to) / 2.0);

                let mut containing: Vec<AttributeValue> = candidates
                    .iter()
                    .filter(|zone| zone_contains(&zone.geometry, middle))
                    .map(|zone| AttributeValue::Integer(zone.object_id))
                    .collect();
                if containing.is_empty() {
                    containing.push(AttributeValue::Null);
                }

                for zone_id in containing {
                    let mut feature = Feature::new(next_id, Geometry::LineString(piece.clone()));
                    next_id += 1;
                    feature.attributes = element.attributes.clone();
                    feature.attributes.insert(element_key.clone(), AttributeValue::Integer(element.object_id));
                    feature.attributes.insert(zone_key.clone(), zone_id);
                    output.features.push(feature);
                }
            }
        }
    }

    Ok(output)
}

fn endpoints(geometry: &Geometry<f64>) -> Option<(Coord<f64>, Coord<f64>)> {
    match geometry {
        Geometry::LineString(ls) => Some((*ls.0.first()?, *ls.0.last()?)),
        _ => None,
    }
}

fn coincident(a: &Feature, b: &Feature, tolerance: f64) -> bool {
    if (a.length() - b.length()).abs() > tolerance {
        return false;
    }
    match (endpoints(&a.geometry), endpoints(&b.geometry)) {
        (Some((a0, a1)), Some((b0, b1))) => {
            coord_distance(a0, b0) <= tolerance && coord_distance(a1, b1) <= tolerance
        }
        _ => false,
    }
}

/// Step 2: keep the first of every group of segments sharing parent element,
/// length and geometry
pub fn remove_duplicates(env: &Environment, mut table: FeatureTable, parent_key: &str) -> FeatureTable {
    let features = std::mem::take(&mut table.features);
    let mut by_parent: HashMap<Option<i64>, Vec<usize>> = HashMap::new();

    for feature in features {
        let parent = feature.get(parent_key).as_i64();
        let kept = by_parent.entry(parent).or_default();
        let duplicate = kept
            .iter()
            .any(|&i| coincident(&table.features[i], &feature, env.tolerance));
        if !duplicate {
            kept.push(table.features.len());
            table.features.push(feature);
        }
    }
    table
}

/// Step 3: constant `study_id`, `at_risk` from the presence of a zone id, then
/// drop the zone id
pub fn derive_columns(segments: &mut FeatureTable, zones: &FeatureTable, study_id: StudyId) -> Result<()> {
    let zone_key = join_key_column(&zones.name);

    if !segments.has_field(STUDY_ID) {
        segments.add_field(Field::new(STUDY_ID, FieldType::Integer))?;
    }
    segments.calculate_field(STUDY_ID, |_| AttributeValue::Integer(study_id.0))?;

    if !segments.has_field(AT_RISK) {
        segments.add_field(Field::new(AT_RISK, FieldType::Boolean))?;
    }
    segments.calculate_field(AT_RISK, |feature| {
        AttributeValue::Boolean(feature.get(&zone_key).as_i64().is_some())
    })?;

    segments.delete_field(&zone_key)
}

/// Step 4: one row per overlapping (segment, zone) pair with every attribute
/// of both sides
pub fn intersect_all(
    env: &Environment,
    segments: &FeatureTable,
    zones: &FeatureTable,
    index: &ZoneIndex,
) -> Result<FeatureTable> {
    let segment_key = join_key_column(&segments.name);
    let zone_key = join_key_column(&zones.name);

    let mut output = FeatureTable::new(INTERSECTIONS_NAME);
    output.add_field(Field::new(&segment_key, FieldType::Integer))?;
    for field in segments.attribute_fields() {
        output.add_field(Field::new(&field.name, field.field_type))?;
    }
    let zone_key_column = output.unique_field_name(&zone_key);
    output.add_field(Field::new(&zone_key_column, FieldType::Integer))?;
    let zone_columns = attribute_columns(&mut output, zones)?;

    let mut next_id = 1;
    for segment in &segments.features {
        let Geometry::LineString(line) = &segment.geometry else {
            return Err(InfraRiskError::geometry(
                "intersect",
                format!("segment {} is not a line string", segment.object_id),
            ));
        };
        if line_string_length(line) <= env.tolerance {
            continue;
        }
        let polyline = Polyline::new(line);
        let middle = polyline.point_at(polyline.length() / 2.0);

        for position in index.candidates(&segment.geometry) {
            let zone = &zones.features[position];
            if !zone_contains(&zone.geometry, middle) {
                continue;
            }

            let mut row = Feature::new(next_id, segment.geometry.clone());
            next_id += 1;
            row.attributes = segment.attributes.clone();
            row.attributes.insert(segment_key.clone(), AttributeValue::Integer(segment.object_id));
            row.attributes.insert(zone_key_column.clone(), AttributeValue::Integer(zone.object_id));
            for (source, target) in &zone_columns {
                row.attributes.insert(target.clone(), zone.get(source));
            }
            output.features.push(row);
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, polygon, MultiLineString, Polygon};
    use infrarisk_core::error::ErrorKind;
    use proptest::prelude::*;

    fn band(id: i64, x0: f64, x1: f64) -> Feature {
        Feature::new(
            id,
            Geometry::Polygon(polygon![
                (x: x0, y: -1.0),
                (x: x1, y: -1.0),
                (x: x1, y: 1.0),
                (x: x0, y: 1.0),
            ]),
        )
    }

    fn zones(bands: &[(f64, f64)]) -> FeatureTable {
        let mut table = FeatureTable::new("zones");
        table.add_field(Field::new("event_frequency", FieldType::Double)).unwrap();
        for (i, (x0, x1)) in bands.iter().enumerate() {
            table.features.push(
                band(i as i64 + 1, *x0, *x1).with_attribute("event_frequency", AttributeValue::Double(2.0)),
            );
        }
        table
    }

    fn roads(lines: Vec<Geometry<f64>>) -> FeatureTable {
        let mut table = FeatureTable::new("roads");
        table.add_field(Field::new("route_code", FieldType::Text)).unwrap();
        for (i, geometry) in lines.into_iter().enumerate() {
            table.features.push(
                Feature::new(i as i64 + 1, geometry).with_attribute("route_code", AttributeValue::Text("E6".into())),
            );
        }
        table
    }

    fn straight(length: f64) -> Geometry<f64> {
        Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: length, y: 0.0)])
    }

    fn lengths(table: &FeatureTable) -> Vec<f64> {
        table.features.iter().map(|f| (f.length() * 1000.0).round() / 1000.0).collect()
    }

    #[test]
    fn test_end_to_end_scenario() {
        let env = Environment::default();
        let output = split_and_overlay(&env, &roads(vec![straight(100.0)]), &zones(&[(40.0, 60.0)]), StudyId(7)).unwrap();

        assert_eq!(lengths(&output.segments), vec![40.0, 20.0, 40.0]);
        let at_risk: Vec<AttributeValue> = output.segments.features.iter().map(|f| f.get(AT_RISK)).collect();
        assert_eq!(
            at_risk,
            vec![AttributeValue::Boolean(false), AttributeValue::Boolean(true), AttributeValue::Boolean(false)]
        );
        assert!(!output.segments.has_field("FID_zones"));
        assert!(output.segments.features.iter().all(|f| f.get(STUDY_ID) == AttributeValue::Integer(7)));
        assert_eq!(output.at_risk_count(), 1);

        assert_eq!(output.intersections.len(), 1);
        let row = &output.intersections.features[0];
        assert!((row.length() - 20.0).abs() < 1e-9);
        assert_eq!(row.get("FID_splitFeats"), AttributeValue::Integer(output.segments.features[1].object_id));
        assert_eq!(row.get("FID_zones"), AttributeValue::Integer(1));
        assert_eq!(row.get("FID_roads"), AttributeValue::Integer(1));
        assert_eq!(row.get("event_frequency"), AttributeValue::Double(2.0));
        assert_eq!(row.get("route_code"), AttributeValue::Text("E6".into()));
    }

    #[test]
    fn test_element_without_crossing_kept_whole() {
        let env = Environment::default();
        let output = split_and_overlay(&env, &roads(vec![straight(30.0)]), &zones(&[(40.0, 60.0)]), StudyId(1)).unwrap();

        assert_eq!(lengths(&output.segments), vec![30.0]);
        assert_eq!(output.segments.features[0].get(AT_RISK), AttributeValue::Boolean(false));
        assert!(output.intersections.is_empty());
    }

    #[test]
    fn test_overlapping_zones_deduplicated() {
        let env = Environment::default();
        let output = split_and_overlay(
            &env,
            &roads(vec![straight(100.0)]),
            &zones(&[(20.0, 60.0), (40.0, 80.0)]),
            StudyId(1),
        )
        .unwrap();

        // 0-20, 20-40, 40-60 (in both zones), 60-80, 80-100
        assert_eq!(lengths(&output.segments), vec![20.0, 20.0, 20.0, 20.0, 20.0]);
        // the shared piece pairs with each zone
        assert_eq!(output.intersections.len(), 4);
    }

    #[test]
    fn test_multiline_and_polyline_elements() {
        let env = Environment::default();
        let bent = Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 50.0, y: 0.0), (x: 50.0, y: 50.0)]);
        let multi = Geometry::MultiLineString(MultiLineString::new(vec![
            line_string![(x: 0.0, y: 0.5), (x: 45.0, y: 0.5)],
            line_string![(x: 100.0, y: 0.5), (x: 120.0, y: 0.5)],
        ]));
        let output = split_and_overlay(&env, &roads(vec![bent, multi]), &zones(&[(40.0, 60.0)]), StudyId(1)).unwrap();

        let first: Vec<f64> = output
            .segments
            .features
            .iter()
            .filter(|f| f.get("FID_roads") == AttributeValue::Integer(1))
            .map(|f| (f.length() * 1000.0).round() / 1000.0)
            .collect();
        // 0-40 outside, 40-50 plus 1 up the bend inside, remaining 49 outside
        assert_eq!(first, vec![40.0, 11.0, 49.0]);

        let second = output
            .segments
            .features
            .iter()
            .filter(|f| f.get("FID_roads") == AttributeValue::Integer(2))
            .count();
        assert_eq!(second, 3);
    }

    #[test]
    fn test_zone_with_hole() {
        let env = Environment::default();
        let mut table = FeatureTable::new("zones");
        let outer = LineString::from(vec![(0.0, -5.0), (100.0, -5.0), (100.0, 5.0), (0.0, 5.0), (0.0, -5.0)]);
        let hole = LineString::from(vec![(40.0, -1.0), (60.0, -1.0), (60.0, 1.0), (40.0, 1.0), (40.0, -1.0)]);
        table.features.push(Feature::new(1, Geometry::Polygon(Polygon::new(outer, vec![hole]))));

        let output = split_and_overlay(&env, &roads(vec![straight(100.0)]), &table, StudyId(1)).unwrap();
        let at_risk: Vec<AttributeValue> = output.segments.features.iter().map(|f| f.get(AT_RISK)).collect();
        assert_eq!(
            at_risk,
            vec![AttributeValue::Boolean(true), AttributeValue::Boolean(false), AttributeValue::Boolean(true)]
        );
    }

    #[test]
    fn test_zone_attribute_collision_suffixed() {
        let env = Environment::default();
        let mut zone_table = zones(&[(40.0, 60.0)]);
        zone_table.add_field(Field::new("route_code", FieldType::Text)).unwrap();
        zone_table.features[0].attributes.insert("route_code".into(), AttributeValue::Text("Z".into()));

        let output = split_and_overlay(&env, &roads(vec![straight(100.0)]), &zone_table, StudyId(1)).unwrap();
        let row = &output.intersections.features[0];
        assert_eq!(row.get("route_code"), AttributeValue::Text("E6".into()));
        assert_eq!(row.get("route_code_1"), AttributeValue::Text("Z".into()));
    }

    #[test]
    fn test_same_dataset_names_rejected() {
        let env = Environment::default();
        let mut zone_table = zones(&[(40.0, 60.0)]);
        zone_table.name = "roads".into();
        assert!(split_and_overlay(&env, &roads(vec![straight(10.0)]), &zone_table, StudyId(1)).is_err());
    }

    #[test]
    fn test_touching_boundary_does_not_create_micro_segment() {
        let env = Environment::default();
        // zone starts 0.0005 after the element end
        let output =
            split_and_overlay(&env, &roads(vec![straight(100.0)]), &zones(&[(99.9995, 120.0)]), StudyId(1)).unwrap();
        assert_eq!(output.segments.len(), 1);
    }

    #[test]
    fn test_dedup_keeps_distinct_equal_length_segments() {
        let env = Environment::default();
        let pieces = identity_split(
            &env,
            &roads(vec![straight(100.0)]),
            &zones(&[(40.0, 60.0)]),
            &ZoneIndex::build(&zones(&[(40.0, 60.0)])),
        )
        .unwrap();
        let deduped = remove_duplicates(&env, pieces, "FID_roads");
        assert_eq!(deduped.len(), 3);
    }

    #[test]
    fn test_non_positive_zone_id_is_at_risk() {
        let env = Environment::default();
        let mut zone_table = zones(&[(40.0, 60.0)]);
        zone_table.features[0].object_id = -1;

        let output = split_and_overlay(&env, &roads(vec![straight(100.0)]), &zone_table, StudyId(1)).unwrap();
        let at_risk: Vec<AttributeValue> = output.segments.features.iter().map(|f| f.get(AT_RISK)).collect();
        assert_eq!(
            at_risk,
            vec![AttributeValue::Boolean(false), AttributeValue::Boolean(true), AttributeValue::Boolean(false)]
        );
        assert_eq!(output.intersections.len(), 1);
        assert_eq!(output.intersections.features[0].get("FID_zones"), AttributeValue::Integer(-1));
    }

    #[test]
    fn test_outside_pieces_carry_null_zone_id() {
        let env = Environment::default();
        let zone_table = zones(&[(40.0, 60.0)]);
        let pieces = identity_split(&env, &roads(vec![straight(100.0)]), &zone_table, &ZoneIndex::build(&zone_table)).unwrap();
        let ids: Vec<AttributeValue> = pieces.features.iter().map(|f| f.get("FID_zones")).collect();
        assert_eq!(ids, vec![AttributeValue::Null, AttributeValue::Integer(1), AttributeValue::Null]);
    }

    #[test]
    fn test_element_column_named_like_identity_key_rejected() {
        let env = Environment::default();
        for column in ["FID_roads", "fid_zones", "FID_splitFeats"] {
            let mut element_table = roads(vec![straight(100.0)]);
            element_table.add_field(Field::new(column, FieldType::Integer)).unwrap();
            let err = split_and_overlay(&env, &element_table, &zones(&[(40.0, 60.0)]), StudyId(1)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput, "{column}");
        }
    }

    #[test]
    fn test_closely_spaced_crossings_keep_one_cut_per_tolerance() {
        let line = line_string![(x: 0.0, y: 0.0), (x: 20.0, y: 0.0)];
        let walls: Vec<LineString<f64>> = [10.0, 10.0009, 10.0018, 10.0027]
            .iter()
            .map(|&x| line_string![(x: x, y: -1.0), (x: x, y: 1.0)])
            .collect();
        let rings: Vec<&LineString<f64>> = walls.iter().collect();

        let cuts = Polyline::new(&line).crossings(&rings, 0.001);
        assert_eq!(cuts.len(), 2);
        assert!((cuts[0] - 10.0).abs() < 1e-9);
        assert!((cuts[1] - 10.0018).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_split_covers_element_without_duplicates(
            length in 10.0f64..500.0,
            bands in prop::collection::vec((0.0f64..1.0, 0.01f64..0.5), 0..5),
        ) {
            let env = Environment::default();
            let bands: Vec<(f64, f64)> = bands
                .iter()
                .map(|(start, width)| (start * length, (start + width) * length))
                .collect();
            let zone_table = zones(&bands);
            let output = split_and_overlay(&env, &roads(vec![straight(length)]), &zone_table, StudyId(1)).unwrap();

            // Pieces are contiguous and cover [0, length]
            let mut intervals: Vec<(f64, f64)> = output
                .segments
                .features
                .iter()
                .map(|f| match &f.geometry {
                    Geometry::LineString(ls) => (ls.0[0].x, ls.0[ls.0.len() - 1].x),
                    _ => unreachable!(),
                })
                .collect();
            intervals.sort_by(|a, b| a.0.total_cmp(&b.0));
            prop_assert!(intervals[0].0.abs() <= env.tolerance);
            prop_assert!((intervals[intervals.len() - 1].1 - length).abs() <= env.tolerance);
            for pair in intervals.windows(2) {
                prop_assert!((pair[1].0 - pair[0].1).abs() <= 2.0 * env.tolerance);
            }

            // No two segments coincide
            for (i, a) in output.segments.features.iter().enumerate() {
                for b in &output.segments.features[i + 1..] {
                    prop_assert!(!coincident(a, b, env.tolerance));
                }
            }

            // at_risk iff the segment lies inside some band
            for segment in &output.segments.features {
                let Geometry::LineString(ls) = &segment.geometry else { unreachable!() };
                let middle = (ls.0[0].x + ls.0[ls.0.len() - 1].x) / 2.0;
                let inside = bands.iter().any(|(x0, x1)| middle >= *x0 && middle <= *x1);
                prop_assert_eq!(segment.get(AT_RISK), AttributeValue::Boolean(inside));
            }
        }
    }
}
