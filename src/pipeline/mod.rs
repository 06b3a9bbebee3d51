//! Pipeline orchestration for search runs.
//!
//! # Architecture
//!
//! - **Config**: limits, models, paths and strategy profiles
//! - **Feedback**: append-only reviewer feedback histories
//! - **Review**: the approval checkpoint (terminal or scripted)
//! - **Orchestrator**: the state machine tying every stage together
//!
//! # Pipeline Flow
//!
//! 1. **Generate**: `initial_batches` candidate batches, concatenated in batch
//!    order and given run-unique ids (`g0001`, ...)
//! 2. **Schema**: user columns, the schema designer, or the configured defaults
//! 3. **Select**: two-pass filter down to a quarter of the quota
//! 4. **Review**: approve, edit, re-filter or regenerate
//! 5. **Execute**: every planned task concurrently; rows go to the dedup store
//! 6. **Evaluate**: stop once both raw and refined counts meet the quota,
//!    otherwise retry up to `max_retry_rounds` times
//! 7. **Finalize**: export debug rows and the refined report
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use search_forge::llm::OpenAiClient;
//! use search_forge::pipeline::{ScriptedReview, SearchConfig, SearchOrchestrator};
//! use search_forge::prompts::PromptRepository;
//! use search_forge::search::UserRequest;
//!
//! let config = SearchConfig::from_env()?;
//! let llm = Arc::new(OpenAiClient::from_env()?);
//! let prompts = Arc::new(PromptRepository::new(&config.paths.prompts_dir));
//! let mut orchestrator =
//!     SearchOrchestrator::new(config, llm, prompts, Box::new(ScriptedReview::auto_approve()));
//!
//! let request = UserRequest::new("Boston-area robotics companies", 20)?;
//! let report = orchestrator.run(&request).await?;
//! println!("{}", report.status_line());
//! ```

pub mod config;
pub mod feedback;
pub mod orchestrator;
pub mod review;

pub use config::{
    default_strategy_map, ConfigError, FlagsConfig, LimitsConfig, PathsConfig, SearchConfig,
};
pub use feedback::FeedbackHistory;
pub use orchestrator::{
    debug_columns, report_columns, PipelineError, RunReport, SearchOrchestrator,
};
pub use review::{
    is_help, split_list, ReviewDecision, ReviewSurface, ScriptedReview, StatusLog,
    TerminalReview,
};
