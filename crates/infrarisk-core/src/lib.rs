//! InfraRisk Core - Domain models, field mapping, and configuration
//!
//! This crate holds the pure parts of the hazard/element overlay pipeline:
//! study and dataset models, the feature table model shared by every
//! geoprocessing step, the canonical field mapping, the projection/filter
//! stage, and the result-row protocol spoken by the remote procedures.

pub mod config;
pub mod error;
pub mod mapping;
pub mod models;
pub mod projection;
pub mod protocol;

pub use error::{ErrorKind, InfraRiskError, Result};
