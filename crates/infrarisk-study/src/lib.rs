//! InfraRisk Study - Import protocol client and study session
//!
//! A [`StudySession`] initiates a study in the risk database, registers the
//! hazard and element datasets, runs the overlay, imports the filtered
//! intersection rows and writes the per-segment output feature set.

pub mod client;
pub mod session;

pub use client::{Committed, ImportClient};
pub use session::{prepare_import, PreparedImport, SessionReport, SessionSettings, SessionState, StudySession};
