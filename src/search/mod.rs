//! Search planning and execution.
//!
//! - [`models`]: tasks, plans, rows and the per-run id allocator
//! - [`generator`]: candidate generation and schema design
//! - [`selector`]: two-pass filter narrowing candidates to a plan
//! - [`executor`]: runs tasks through the web-search oracle
//! - [`performance`]: report fed back into retry generation

pub mod executor;
pub mod generator;
pub mod models;
pub mod parser;
pub mod performance;
pub mod selector;

pub use executor::{clean_text, extract_domain, ResponseShape, SearchExecutor};
pub use generator::{retry_batch_size, CandidateGenerator, DEFAULT_STRATEGY};
pub use models::{
    is_reserved_column, DedupeField, NormalizedRow, SearchPlan, SearchSummary, SearchTask,
    StrategyMap, StrategyParams, TaskIdAllocator, UserRequest, RESERVED_COLUMNS,
};
pub use parser::{parse_filter_ids, parse_schema, parse_search_tasks};
pub use performance::{build_performance_report, zero_result_ids};
pub use selector::{target_count, PlanSelector};
