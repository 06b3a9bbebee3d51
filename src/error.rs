//! Error types for search-forge operations.
//!
//! Defines error types for the subsystems that can fail hard:
//! - Completion oracle (LLM) interactions
//! - Prompt template loading and rendering
//! - Units of concurrent search work
//! - Artifact export
//! - User request validation
//!
//! Malformed oracle payloads are not represented here: every parser has a
//! local fallback and never surfaces a parse failure to the orchestrator.

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: OPENAI_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LlmError {
    /// Returns true when the server rejected the request shape itself
    /// (as opposed to transport, auth or quota problems).
    pub fn is_bad_request(&self) -> bool {
        matches!(self, LlmError::ApiError { code: 400, .. })
    }
}

/// Errors that can occur while loading or rendering prompt templates.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Prompt file not found: {0}")]
    NotFound(String),

    #[error("Failed to render prompt '{name}': {message}")]
    Render { name: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of one unit of concurrent search work (a generation batch,
/// a search task, a refinement chunk).
#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error("Unexpected payload shape: {0}")]
    UnexpectedShape(String),
}

/// Errors that can occur during export operations.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised when a user request is malformed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("Description cannot be empty")]
    EmptyDescription,

    #[error("Minimum item count must be a positive integer")]
    InvalidMinItems,

    #[error("Unknown dedupe field '{0}': expected name, website, link, url, email or description")]
    UnknownDedupeField(String),

    #[error("Column '{0}' is not in the schema; please choose another dedupe field")]
    DedupeFieldNotInSchema(String),
}
