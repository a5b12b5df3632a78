pub mod dataset;
pub mod study;
pub mod table;

pub use dataset::{DatasetId, DatasetKind, InputDataset};
pub use study::{Study, StudyId};
pub use table::{AttributeValue, Feature, FeatureTable, Field, FieldType, OBJECTID, SHAPE_LENGTH};
