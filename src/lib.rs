//! search-forge: assemble deduplicated record lists from LLM-planned web
//! searches.
//!
//! A run generates candidate searches, narrows them to a plan, lets a
//! reviewer approve it, executes the plan concurrently, deduplicates the rows
//! and retries with a performance report until the requested number of
//! records is reached or the retry budget runs out.

// Core modules
pub mod cli;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod refine;
pub mod scheduler;
pub mod search;
pub mod storage;
pub mod utils;

// Re-export commonly used error types
pub use error::{ExportError, LlmError, PromptError, RequestError, SearchError};
