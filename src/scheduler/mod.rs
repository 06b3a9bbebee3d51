//! Concurrency helpers shared by the pipeline stages.
//!
//! # Example
//!
//! ```rust,ignore
//! use search_forge::scheduler::{run_batch, FailurePolicy};
//!
//! let outcomes = run_batch("generate", batches, 6, FailurePolicy::IsolateAndRetryOnce, |i, batch| {
//!     generator.generate_batch(&request, i, total, feedback.as_deref())
//! })
//! .await;
//! ```

pub mod batch;

pub use batch::{pool_width, run_batch, FailurePolicy, UnitOutcome};
