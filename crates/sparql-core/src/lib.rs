//! Core types shared by the SPARQL cache engine crates
//!
//! - [`SparqlError`] / [`FailureKind`]: the failure taxonomy every layer reports in
//! - [`ExecutionOutcome`] / [`ExecutionState`]: what a single execution produced
//! - [`SparqlResults`]: typed view of the JSON results document
//! - [`Clock`]: injectable time source used for TTL expiry

pub mod clock;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{FailureKind, Result, SparqlError};
pub use types::*;
