//! Refinement of collected rows into final output records.
//!
//! The [`ResultRefiner`] never touches the row store; it reads a snapshot of
//! rows and returns a separate list of [`Record`]s.

pub mod record;
pub mod refiner;

pub use record::{dedupe_records, parse_refined_records, Record};
pub use refiner::{fallback_from_rows, ResultRefiner, CHUNK_SIZE};
