//! Top-level control loop: generate, select, review, execute, evaluate,
//! retry, finalize.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::config::{ConfigError, SearchConfig};
use super::feedback::FeedbackHistory;
use super::review::{ReviewDecision, ReviewSurface};
use crate::error::{ExportError, PromptError};
use crate::llm::LlmProvider;
use crate::prompts::PromptRepository;
use crate::refine::{fallback_from_rows, Record, ResultRefiner};
use crate::scheduler::{run_batch, FailurePolicy};
use crate::search::{
    build_performance_report, is_reserved_column, zero_result_ids, CandidateGenerator,
    NormalizedRow, PlanSelector, SearchExecutor, SearchPlan, SearchSummary, SearchTask,
    TaskIdAllocator, UserRequest, RESERVED_COLUMNS,
};
use crate::storage::{CsvExporter, Exporter, InMemoryDatabase};

/// Errors that abort a run.
///
/// Oracle failures never show up here; they degrade the affected unit.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A prompt template is missing or does not render.
    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    /// Writing an export failed.
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// The review surface could not be read.
    #[error("Review failed: {0}")]
    Review(#[from] std::io::Error),
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub requested: usize,
    pub collected: usize,
    pub refined: usize,
    pub retries_used: usize,
    pub zero_result_ids: Vec<String>,
    pub debug_path: PathBuf,
    pub report_path: PathBuf,
}

impl RunReport {
    pub fn status_line(&self) -> String {
        format!(
            "requested {}, collected {}, retries used {}, zero-result searches {:?}",
            self.requested, self.collected, self.retries_used, self.zero_result_ids
        )
    }

    pub fn met_quota(&self) -> bool {
        self.refined >= self.requested
    }
}

/// Rows and per-task summaries of one execution round.
#[derive(Debug, Default)]
struct ExecutionRound {
    rows: Vec<NormalizedRow>,
    summaries: Vec<SearchSummary>,
}

/// Drives one request from candidate generation to the final export.
///
/// Owns every piece of run-scoped state: the row store, the task id
/// allocator and both feedback histories.
pub struct SearchOrchestrator {
    run_id: Uuid,
    config: SearchConfig,
    prompts: Arc<PromptRepository>,
    generator: CandidateGenerator,
    selector: PlanSelector,
    executor: SearchExecutor,
    refiner: ResultRefiner,
    db: InMemoryDatabase,
    ids: TaskIdAllocator,
    feedback: FeedbackHistory,
    filter_feedback: FeedbackHistory,
    debug_exporter: Box<dyn Exporter>,
    report_exporter: Box<dyn Exporter>,
    review: Box<dyn ReviewSurface>,
}

impl SearchOrchestrator {
    /// Builds the orchestrator with CSV exporters under the configured paths.
    pub fn new(
        config: SearchConfig,
        llm: Arc<dyn LlmProvider>,
        prompts: Arc<PromptRepository>,
        review: Box<dyn ReviewSurface>,
    ) -> Self {
        let models = config.models.clone();
        let generator = CandidateGenerator::new(
            Arc::clone(&llm),
            Arc::clone(&prompts),
            models.clone(),
            config.limits.per_batch,
        );
        let selector = PlanSelector::new(Arc::clone(&llm), Arc::clone(&prompts), models.clone());
        let executor = SearchExecutor::new(
            Arc::clone(&llm),
            models.clone(),
            config.strategy_map.clone(),
        )
        .with_mock(config.flags.use_mock_search);
        let refiner = ResultRefiner::new(
            llm,
            Arc::clone(&prompts),
            models,
            config.limits.worker_pool_size,
        );

        Self {
            debug_exporter: Box::new(CsvExporter::new(config.paths.debug_export_dir.clone())),
            report_exporter: Box::new(CsvExporter::new(config.paths.reports_dir.clone())),
            run_id: Uuid::new_v4(),
            config,
            prompts,
            generator,
            selector,
            executor,
            refiner,
            db: InMemoryDatabase::new(),
            ids: TaskIdAllocator::new(),
            feedback: FeedbackHistory::new(),
            filter_feedback: FeedbackHistory::new(),
            review,
        }
    }

    /// Replaces the debug and report exporters.
    pub fn with_exporters(mut self, debug: Box<dyn Exporter>, report: Box<dyn Exporter>) -> Self {
        self.debug_exporter = debug;
        self.report_exporter = report;
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn database(&self) -> &InMemoryDatabase {
        &self.db
    }

    /// Runs `request` to completion.
    ///
    /// A shortfall after the retry budget is spent still finalizes with
    /// whatever was collected.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError` for missing templates, an unreadable review
    /// surface or a failed export.
    pub async fn run(&mut self, request: &UserRequest) -> Result<RunReport, PipelineError> {
        self.config.validate()?;
        self.prompts.check_all()?;
        info!(
            run_id = %self.run_id,
            description = %request.description,
            min_items = request.min_items,
            dedupe_field = %request.dedupe_field,
            "Starting search run"
        );

        self.status("Generating initial search candidates...");
        let mut candidates = self.generate_initial(request).await;
        let schema = self.resolve_schema(request, &candidates).await;

        let mut retry_round = 0;
        loop {
            let plan = self.settle_plan(request, &mut candidates).await?;
            let round = self.execute_plan(&plan, &schema).await;

            let added = self.db.extend(round.rows);
            let total = self.db.count();
            self.status(&format!(
                "Collected {} items (target: {}).",
                total, request.min_items
            ));
            info!(added, total, round = retry_round, "Round complete");

            let mut preview = None;
            if total >= request.min_items {
                let refined = self.refiner.refine(self.db.rows(), request, &schema).await;
                info!(refined = refined.len(), "Refined preview");
                if refined.len() >= request.min_items {
                    return self
                        .finalize(request, &schema, &round.summaries, retry_round, Some(refined))
                        .await;
                }
                self.status(&format!(
                    "Refined output has only {} items; continuing search.",
                    refined.len()
                ));
                preview = Some(refined);
            }

            if retry_round >= self.config.limits.max_retry_rounds {
                self.status("Max retry rounds reached. Exporting partial data.");
                return self
                    .finalize(request, &schema, &round.summaries, retry_round, preview)
                    .await;
            }

            retry_round += 1;
            self.status(&format!("Retry round {}...", retry_round));
            candidates = self
                .generate_retry(request, &schema, &round.summaries, total)
                .await;
        }
    }

    /// Exports the debug rows and the refined report, then reports the run.
    ///
    /// `refined` is reused when given; otherwise the rows are refined again.
    /// Calling this twice on an unchanged store exports the same records.
    pub async fn finalize(
        &mut self,
        request: &UserRequest,
        schema: &[String],
        summaries: &[SearchSummary],
        retries_used: usize,
        refined: Option<Vec<Record>>,
    ) -> Result<RunReport, PipelineError> {
        let debug_path =
            self.debug_exporter
                .export_rows("debug", self.db.rows(), &debug_columns(schema))?;

        let mut records = match refined {
            Some(records) => records,
            None => self.refiner.refine(self.db.rows(), request, schema).await,
        };
        if records.is_empty() {
            warn!("Refiner returned no records; using raw rows");
            records = fallback_from_rows(self.db.rows(), schema);
        }

        let columns = report_columns(schema, &records);
        let report_path = self
            .report_exporter
            .export_records("report", &records, &columns)?;

        let report = RunReport {
            run_id: self.run_id,
            requested: request.min_items,
            collected: self.db.count(),
            refined: records.len(),
            retries_used,
            zero_result_ids: zero_result_ids(summaries),
            debug_path,
            report_path,
        };

        self.status(&format!(
            "Debug CSV written to {}",
            report.debug_path.display()
        ));
        self.status(&format!(
            "Refined report written to {}",
            report.report_path.display()
        ));
        self.status(&format!("Final status: {}", report.status_line()));
        info!(
            run_id = %self.run_id,
            raw = report.collected,
            refined = report.refined,
            "Exported results"
        );
        Ok(report)
    }

    fn status(&mut self, message: &str) {
        self.review.display_status(message);
    }

    /// Runs every first-round generation batch and assigns final ids.
    ///
    /// Batches are concatenated in batch order before ids are handed out, so
    /// ids do not depend on completion order. A batch that fails twice
    /// contributes nothing.
    async fn generate_initial(&mut self, request: &UserRequest) -> Vec<SearchTask> {
        let total_batches = self.config.limits.initial_batches;
        let feedback = self.feedback.joined();
        let feedback = feedback.as_deref();
        let generator = &self.generator;

        let mut outcomes = run_batch(
            "generate",
            (0..total_batches).collect(),
            self.config.limits.worker_pool_size,
            FailurePolicy::IsolateAndRetryOnce,
            move |batch_index, _: usize| {
                generator.generate_batch(request, batch_index, total_batches, feedback)
            },
        )
        .await;
        outcomes.sort_by_key(|outcome| outcome.index);

        let mut tasks = Vec::new();
        for outcome in outcomes {
            match outcome.result {
                Ok(batch) => {
                    info!(
                        batch = outcome.index + 1,
                        tasks = batch.len(),
                        retried = outcome.retried,
                        "Generated candidate batch"
                    );
                    tasks.extend(batch);
                }
                Err(err) => warn!(
                    batch = outcome.index + 1,
                    error = %err,
                    "Candidate batch failed after retry"
                ),
            }
        }

        self.ids.assign(&mut tasks);
        info!(tasks = tasks.len(), "Total candidate tasks");
        tasks
    }

    /// User columns verbatim, else the schema designer, else the configured
    /// defaults. Provenance columns are always appended.
    async fn resolve_schema(&self, request: &UserRequest, candidates: &[SearchTask]) -> Vec<String> {
        let mut schema = match &request.columns {
            Some(columns) => columns.clone(),
            None => match self.generator.design_schema(request, candidates).await {
                Ok(columns) if !columns.is_empty() => columns,
                Ok(_) => {
                    warn!("Schema designer returned no columns; using defaults");
                    self.config.default_columns.clone()
                }
                Err(err) => {
                    warn!(error = %err, "Schema design failed; using defaults");
                    self.config.default_columns.clone()
                }
            },
        };

        for column in RESERVED_COLUMNS {
            if !schema.iter().any(|c| c == column) {
                schema.push(column.to_string());
            }
        }
        info!(columns = ?schema, "Resolved schema");
        schema
    }

    async fn select_plan(
        &self,
        candidates: &[SearchTask],
        request: &UserRequest,
    ) -> Result<SearchPlan, PipelineError> {
        let filter_feedback = self.filter_feedback.joined();
        let plan = self
            .selector
            .select(candidates, request.min_items, filter_feedback.as_deref())
            .await?;
        Ok(plan)
    }

    /// Selects a plan and loops through review until it is approved.
    ///
    /// Regeneration replaces `candidates`; drop/add edits are folded into
    /// `candidates` as well as the plan.
    async fn settle_plan(
        &mut self,
        request: &UserRequest,
        candidates: &mut Vec<SearchTask>,
    ) -> Result<SearchPlan, PipelineError> {
        let mut plan = self.select_plan(candidates, request).await?;

        loop {
            let decision = self.review.review_plan(&plan)?;
            if let Some(feedback) = &decision.feedback {
                self.feedback.push(feedback.as_str());
            }

            if decision.regenerate {
                if decision.has_edits() {
                    info!(
                        dropped = decision.drop_ids.len(),
                        added = decision.new_queries.len(),
                        "Discarding plan edits before regeneration"
                    );
                }
                self.status("Regenerating search plan with new feedback...");
                *candidates = self.generate_initial(request).await;
                plan = self.select_plan(candidates, request).await?;
                continue;
            }

            let new_tasks = self.apply_candidate_edits(candidates, &decision);

            if decision.refilter {
                if let Some(filter_feedback) = &decision.filter_feedback {
                    self.filter_feedback.push(filter_feedback.as_str());
                }
                plan = self.select_plan(candidates, request).await?;
                continue;
            }

            plan.remove_ids(&decision.drop_ids);
            let added = new_tasks.len();
            for task in new_tasks {
                plan.add_task(task);
            }
            info!(
                tasks = plan.len(),
                dropped = decision.drop_ids.len(),
                added,
                "Plan approved"
            );
            return Ok(plan);
        }
    }

    /// Drops and adds tasks in the candidate list; returns the added tasks.
    fn apply_candidate_edits(
        &mut self,
        candidates: &mut Vec<SearchTask>,
        decision: &ReviewDecision,
    ) -> Vec<SearchTask> {
        candidates.retain(|task| !decision.drop_ids.contains(&task.id));
        let new_tasks: Vec<SearchTask> = decision
            .new_queries
            .iter()
            .map(|query| self.ids.user_task(query.as_str()))
            .collect();
        candidates.extend(new_tasks.iter().cloned());
        new_tasks
    }

    /// Executes every planned task; failed tasks yield a summary with a note.
    async fn execute_plan(&mut self, plan: &SearchPlan, schema: &[String]) -> ExecutionRound {
        let executor = &self.executor;
        for task in plan.tasks() {
            info!(task_id = %task.id, strategy = %task.strategy, "Submitting task");
        }

        let mut outcomes = run_batch(
            "execute",
            plan.tasks().to_vec(),
            self.config.limits.worker_pool_size,
            FailurePolicy::Isolate,
            move |_, task: SearchTask| async move { executor.run_task(&task, schema).await },
        )
        .await;
        outcomes.sort_by_key(|outcome| outcome.index);

        let mut round = ExecutionRound::default();
        for outcome in outcomes {
            let Some(task) = plan.tasks().get(outcome.index).cloned() else {
                continue;
            };
            match outcome.result {
                Ok(rows) => {
                    info!(task_id = %task.id, rows = rows.len(), "Task returned rows");
                    round.summaries.push(SearchSummary::succeeded(task, rows.len()));
                    round.rows.extend(rows);
                }
                Err(err) => {
                    self.status(&format!(
                        "Search task {} failed with error: {}",
                        task.id, err
                    ));
                    round.summaries.push(SearchSummary::failed(task, err.to_string()));
                }
            }
        }
        round
    }

    /// Asks for replacement candidates seeded with the last round's results.
    /// A failed call yields no candidates, which still uses up the round.
    async fn generate_retry(
        &mut self,
        request: &UserRequest,
        schema: &[String],
        summaries: &[SearchSummary],
        total_items: usize,
    ) -> Vec<SearchTask> {
        let report = build_performance_report(total_items, summaries, self.feedback.latest());
        let additional = self.feedback.joined();
        match self
            .generator
            .generate_retry(request, schema, &report, additional.as_deref())
            .await
        {
            Ok(mut tasks) => {
                self.ids.assign(&mut tasks);
                tasks
            }
            Err(err) => {
                warn!(error = %err, "Retry generation failed");
                Vec::new()
            }
        }
    }
}

/// Debug export columns: the schema plus `url` and `source_domain`.
pub fn debug_columns(schema: &[String]) -> Vec<String> {
    let mut columns = schema.to_vec();
    for extra in ["url", "source_domain"] {
        if !columns.iter().any(|c| c == extra) {
            columns.push(extra.to_string());
        }
    }
    columns
}

/// Report columns: `name`, the schema, then any other record keys in the
/// order they first appear. Provenance columns are never reported.
pub fn report_columns(schema: &[String], records: &[Record]) -> Vec<String> {
    let mut columns = vec!["name".to_string()];
    let keys = schema
        .iter()
        .map(String::as_str)
        .chain(records.iter().flat_map(|record| record.keys()));
    for key in keys {
        if !is_reserved_column(key) && !columns.iter().any(|c| c == key) {
            columns.push(key.to_string());
        }
    }
    columns
}
