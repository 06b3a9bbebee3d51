//! Candidate search generation and schema design.

use std::sync::Arc;

use tera::Context;
use tracing::{debug, info};

use super::models::{SearchTask, UserRequest};
use super::parser::{parse_schema, parse_search_tasks};
use crate::error::SearchError;
use crate::llm::{GenerationRequest, LlmProvider, Message, ModelRegistry};
use crate::prompts::{PromptName, PromptRepository};

/// Strategy assigned to generated tasks that do not name one.
pub const DEFAULT_STRATEGY: &str = "web";

/// Number of candidate queries shown to the schema designer.
const SCHEMA_EXAMPLE_QUERIES: usize = 5;

/// Asks the oracle for candidate searches and, when needed, a schema.
///
/// Returned tasks carry provisional ids; the caller assigns final ones.
pub struct CandidateGenerator {
    llm: Arc<dyn LlmProvider>,
    prompts: Arc<PromptRepository>,
    models: ModelRegistry,
    per_batch: usize,
}

impl CandidateGenerator {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        prompts: Arc<PromptRepository>,
        models: ModelRegistry,
        per_batch: usize,
    ) -> Self {
        Self {
            llm,
            prompts,
            models,
            per_batch,
        }
    }

    /// Generates one batch of candidates.
    ///
    /// `feedback` is the joined free-text feedback collected so far.
    pub async fn generate_batch(
        &self,
        request: &UserRequest,
        batch_index: usize,
        total_batches: usize,
        feedback: Option<&str>,
    ) -> Result<Vec<SearchTask>, SearchError> {
        let mut context = Context::new();
        context.insert("description", &request.description);
        context.insert("batch_number", &(batch_index + 1));
        context.insert("total_batches", &total_batches);
        context.insert("per_batch", &self.per_batch);
        context.insert("feedback", &feedback);
        let prompt = self.prompts.render(PromptName::GenerateSearches, &context)?;

        let generation = GenerationRequest::new(
            self.models.for_generate_searches(),
            vec![
                Message::system("You generate diverse web searches."),
                Message::user(prompt),
            ],
        )
        .with_json_response()
        .with_step(format!("generate_{}", batch_index))
        .with_metadata("batch_index", batch_index);

        let response = self.llm.generate(generation).await?;
        let tasks = parse_search_tasks(&response.text, batch_index, DEFAULT_STRATEGY)?;
        debug!(batch = batch_index + 1, tasks = tasks.len(), "Parsed candidate batch");
        Ok(tasks)
    }

    /// Generates replacement candidates after a quota shortfall.
    pub async fn generate_retry(
        &self,
        request: &UserRequest,
        schema: &[String],
        performance_report: &str,
        additional_feedback: Option<&str>,
    ) -> Result<Vec<SearchTask>, SearchError> {
        let mut context = Context::new();
        context.insert("description", &request.description);
        context.insert("performance_report", performance_report);
        context.insert("schema", &schema.join(","));
        context.insert("additional_feedback", &additional_feedback);
        context.insert("per_batch", &retry_batch_size(self.per_batch));
        let prompt = self.prompts.render(PromptName::RetrySearches, &context)?;

        let generation = GenerationRequest::new(
            self.models.for_generate_searches(),
            vec![
                Message::system("You refine web searches based on performance data."),
                Message::user(prompt),
            ],
        )
        .with_json_response()
        .with_step("retry");

        let response = self.llm.generate(generation).await?;
        let tasks = parse_search_tasks(&response.text, 0, DEFAULT_STRATEGY)?;
        info!(tasks = tasks.len(), "Generated retry candidates");
        Ok(tasks)
    }

    /// Asks the schema designer for output columns, seeded with a few queries.
    pub async fn design_schema(
        &self,
        request: &UserRequest,
        candidates: &[SearchTask],
    ) -> Result<Vec<String>, SearchError> {
        let examples: Vec<&str> = candidates
            .iter()
            .take(SCHEMA_EXAMPLE_QUERIES)
            .map(|task| task.query.as_str())
            .collect();

        let mut context = Context::new();
        context.insert("description", &request.description);
        context.insert("example_queries", &examples.join("\n"));
        let prompt = self.prompts.render(PromptName::BuildSchema, &context)?;

        let generation = GenerationRequest::new(
            self.models.for_schema(),
            vec![
                Message::system("You design CSV schemas."),
                Message::user(prompt),
            ],
        )
        .with_json_response()
        .with_step("schema");

        let response = self.llm.generate(generation).await?;
        Ok(parse_schema(&response.text))
    }
}

/// Retry rounds ask for half a batch, never fewer than five searches.
pub fn retry_batch_size(per_batch: usize) -> usize {
    (per_batch / 2).max(5)
}
