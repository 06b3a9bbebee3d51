//! Two-pass narrowing of candidate searches down to a runnable plan.
//!
//! The primary pass asks the ranking oracle which candidates to keep. When it
//! keeps more than the target, a trim pass over the survivors states the
//! current count and how many to remove. The result is always cut to the
//! target locally, so the plan never exceeds it whatever the oracle says.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tera::Context;
use tracing::{info, warn};

use super::models::{SearchPlan, SearchTask};
use super::parser::parse_filter_ids;
use crate::error::PromptError;
use crate::llm::{GenerationRequest, LlmProvider, Message, ModelRegistry};
use crate::prompts::{PromptName, PromptRepository};

/// Target plan size: a quarter of the quota, at least one, at most the
/// number of candidates (but never zero).
pub fn target_count(min_items: usize, candidate_count: usize) -> usize {
    (min_items / 4).max(1).min(candidate_count).max(1)
}

#[derive(Debug, Serialize)]
struct CandidateView<'a> {
    id: &'a str,
    query: &'a str,
    strategy: &'a str,
    rationale: &'a str,
}

/// Trim-pass bookkeeping passed to the prompt.
#[derive(Debug, Clone, Copy)]
struct TrimCounts {
    current: usize,
    remove: usize,
}

/// Ranks candidates through the filter oracle.
pub struct PlanSelector {
    llm: Arc<dyn LlmProvider>,
    prompts: Arc<PromptRepository>,
    models: ModelRegistry,
}

impl PlanSelector {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        prompts: Arc<PromptRepository>,
        models: ModelRegistry,
    ) -> Self {
        Self {
            llm,
            prompts,
            models,
        }
    }

    /// Selects at most [`target_count`] tasks from `candidates`.
    ///
    /// `filter_feedback` is all filter feedback joined by newlines.
    ///
    /// # Errors
    ///
    /// Only template errors are returned. Oracle failures and unparseable
    /// answers fall back to keeping every offered candidate.
    pub async fn select(
        &self,
        candidates: &[SearchTask],
        min_items: usize,
        filter_feedback: Option<&str>,
    ) -> Result<SearchPlan, PromptError> {
        if candidates.is_empty() {
            info!("No candidates to filter");
            return Ok(SearchPlan::new());
        }

        let target = target_count(min_items, candidates.len());
        let mut kept = self
            .filter_pass(PromptName::FilterPrimary, candidates, target, filter_feedback, None)
            .await?;

        if kept.len() > target {
            let remove = kept.len() - target;
            info!(
                kept = kept.len(),
                target, remove, "Filter over-selected; running trim pass"
            );
            let counts = TrimCounts {
                current: kept.len(),
                remove,
            };
            kept = self
                .filter_pass(PromptName::FilterTrim, &kept, target, filter_feedback, Some(counts))
                .await?;
        }

        if kept.len() > target {
            warn!(
                kept = kept.len(),
                target, "Filter returned too many tasks; trimming locally"
            );
            kept.truncate(target);
        }

        info!(
            kept = kept.len(),
            candidates = candidates.len(),
            "Filter selected plan"
        );
        Ok(SearchPlan::from_tasks(kept))
    }

    /// One oracle pass. Returns the kept tasks in the oracle's ranking order,
    /// or every offered task when the answer names none of them.
    async fn filter_pass(
        &self,
        name: PromptName,
        offered: &[SearchTask],
        target: usize,
        filter_feedback: Option<&str>,
        trim: Option<TrimCounts>,
    ) -> Result<Vec<SearchTask>, PromptError> {
        let views: Vec<CandidateView<'_>> = offered
            .iter()
            .map(|task| CandidateView {
                id: &task.id,
                query: &task.query,
                strategy: &task.strategy,
                rationale: task.rationale.as_deref().unwrap_or(""),
            })
            .collect();
        let tasks_json = serde_json::to_string_pretty(&views).map_err(|e| PromptError::Render {
            name: name.to_string(),
            message: e.to_string(),
        })?;

        let mut context = Context::new();
        context.insert("filtered_count", &target);
        context.insert("filter_feedback", &filter_feedback);
        context.insert("tasks", &tasks_json);
        if let Some(counts) = trim {
            context.insert("current_count", &counts.current);
            context.insert("remove_count", &counts.remove);
        }
        let prompt = self.prompts.render(name, &context)?;

        let request = GenerationRequest::new(
            self.models.for_filter_searches(),
            vec![
                Message::system("You select the most promising searches."),
                Message::user(prompt),
            ],
        )
        .with_json_response()
        .with_step(name.as_str());

        let ranked_ids = match self.llm.generate(request).await {
            Ok(response) => parse_filter_ids(&response.text),
            Err(err) => {
                warn!(pass = %name, error = %err, "Filter call failed; keeping all candidates");
                Vec::new()
            }
        };

        Ok(rank_tasks(offered, &ranked_ids))
    }
}

/// Orders `offered` by `ranked_ids`, dropping unknown and repeated ids.
/// Falls back to all of `offered` when no id matches.
fn rank_tasks(offered: &[SearchTask], ranked_ids: &[String]) -> Vec<SearchTask> {
    let by_id: HashMap<&str, &SearchTask> =
        offered.iter().map(|task| (task.id.as_str(), task)).collect();
    let mut seen: HashSet<String> = HashSet::new();
    let ranked: Vec<SearchTask> = ranked_ids
        .iter()
        .filter(|id| seen.insert(id.to_string()))
        .filter_map(|id| by_id.get(id.as_str()).map(|task| (*task).clone()))
        .collect();

    if ranked.is_empty() {
        offered.to_vec()
    } else {
        ranked
    }
}
