//! Prompt templates for the search pipeline.
//!
//! Templates live on disk (`prompts/<name>.txt` by default) so they can be
//! tuned without rebuilding. Each pipeline stage renders its template with a
//! Tera context containing the named fields that stage provides:
//!
//! | template | fields |
//! |---|---|
//! | `generate_searches` | `description`, `batch_number`, `total_batches`, `per_batch`, `feedback` |
//! | `filter_primary` | `filtered_count`, `filter_feedback`, `tasks` |
//! | `filter_trim` | `filtered_count`, `filter_feedback`, `tasks`, `current_count`, `remove_count` |
//! | `build_schema` | `description`, `example_queries` |
//! | `retry_searches` | `description`, `performance_report`, `schema`, `additional_feedback`, `per_batch` |
//! | `refine_results` | `user_description`, `requested_columns`, `schema_fields`, `candidate_json` |

pub mod repository;

pub use repository::{render_template, PromptName, PromptRepository};
