//! InfraRisk Geo - Overlay engine and geoprocessing resources
//!
//! Splits element lines at hazard-zone boundaries, intersects the segments
//! with the zones, and manages the scratch area and workspace context the
//! intermediate datasets live in.

pub mod env;
pub mod index;
pub mod io;
pub mod overlay;
pub mod scratch;

pub use env::{Environment, WorkspaceGuard};
pub use index::ZoneIndex;
pub use overlay::{split_and_overlay, OverlayOutput};
pub use scratch::{CleanupReport, ScratchArea};
