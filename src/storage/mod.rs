//! Run-scoped storage.
//!
//! - **InMemoryDatabase**: append-only row store deduplicating by [`DedupKey`]
//! - **Exporter**: writes the debug and report tables (CSV by default)
//!
//! Nothing persists across runs except the exported files.

pub mod database;
pub mod exporter;

pub use database::{DedupKey, InMemoryDatabase};
pub use exporter::{CsvExporter, Exporter};
