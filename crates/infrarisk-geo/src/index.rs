use geo::{BoundingRect, Geometry};
use infrarisk_core::models::FeatureTable;
use rstar::{RTree, RTreeObject, AABB};

/// Bounding box of one zone feature
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedZone {
    /// Position of the zone in its feature table
    pub position: usize,

    envelope: AABB<[f64; 2]>,
}

impl IndexedZone {
    fn new(position: usize, geometry: &Geometry<f64>) -> Option<Self> {
        envelope_of(geometry).map(|envelope| Self { position, envelope })
    }
}

impl RTreeObject for IndexedZone {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Bounding-box index over hazard zones, used to find crossing candidates
pub struct ZoneIndex {
    tree: RTree<IndexedZone>,
}

impl ZoneIndex {
    /// Index every zone of a table. Zones without extent are skipped.
    pub fn build(zones: &FeatureTable) -> Self {
        let indexed: Vec<IndexedZone> = zones
            .features
            .iter()
            .enumerate()
            .filter_map(|(position, feature)| IndexedZone::new(position, &feature.geometry))
            .collect();

        Self { tree: RTree::bulk_load(indexed) }
    }

    /// Positions of zones whose envelope intersects the geometry's envelope,
    /// in ascending order
    pub fn candidates(&self, geometry: &Geometry<f64>) -> Vec<usize> {
        let Some(envelope) = envelope_of(geometry) else {
            return Vec::new();
        };
        let mut positions: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|zone| zone.position)
            .collect();
        positions.sort_unstable();
        positions
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

fn envelope_of(geometry: &Geometry<f64>) -> Option<AABB<[f64; 2]>> {
    geometry.bounding_rect().map(|rect| {
        let min = rect.min();
        let max = rect.max();
        AABB::from_corners([min.x, min.y], [max.x, max.y])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, polygon};
    use infrarisk_core::models::Feature;

    fn square(x0: f64, x1: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: x0, y: -1.0),
            (x: x1, y: -1.0),
            (x: x1, y: 1.0),
            (x: x0, y: 1.0),
        ])
    }

    #[test]
    fn test_candidates_by_envelope() {
        let mut zones = FeatureTable::new("zones");
        zones.features.push(Feature::new(1, square(0.0, 10.0)));
        zones.features.push(Feature::new(2, square(50.0, 60.0)));
        zones.features.push(Feature::new(3, square(5.0, 55.0)));

        let index = ZoneIndex::build(&zones);
        assert_eq!(index.len(), 3);

        let line = Geometry::LineString(line_string![(x: 20.0, y: 0.0), (x: 52.0, y: 0.0)]);
        assert_eq!(index.candidates(&line), vec![1, 2]);

        let far = Geometry::LineString(line_string![(x: 100.0, y: 0.0), (x: 120.0, y: 0.0)]);
        assert!(index.candidates(&far).is_empty());
    }

    #[test]
    fn test_empty_index() {
        let index = ZoneIndex::build(&FeatureTable::new("zones"));
        assert!(index.is_empty());
    }
}
