//! InfraRisk Store - Remote data store adapters
//!
//! The risk database is reached through three stored procedures and one
//! durable import table. [`ports::StudyStore`] is the seam; the in-memory
//! adapter backs tests and dry runs, the PostgreSQL adapter talks to the
//! real database.

pub mod memory;
pub mod ports;
pub mod postgres;

pub use memory::MemoryStudyStore;
pub use ports::{DatasetRequest, StudyAreaRequest, StudyStore};
