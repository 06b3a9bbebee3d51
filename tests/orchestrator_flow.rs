//! End-to-end runs of the search orchestrator against a scripted oracle.
//!
//! Every run uses the repository's prompt templates, a scripted review
//! surface and in-memory exporters, so nothing touches the network or disk.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use search_forge::llm::{GenerationRequest, GenerationResponse, LlmProvider};
use search_forge::pipeline::{PipelineError, ScriptedReview, SearchConfig, SearchOrchestrator};
use search_forge::prompts::PromptRepository;
use search_forge::search::UserRequest;
use search_forge::storage::Exporter;
use search_forge::{ExportError, LlmError};

type Handler = dyn Fn(&GenerationRequest) -> Result<GenerationResponse, LlmError> + Send + Sync;

/// Oracle double answering through a closure and logging every request.
struct ScriptedOracle {
    handler: Box<Handler>,
    calls: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedOracle {
    fn new(
        handler: impl Fn(&GenerationRequest) -> Result<GenerationResponse, LlmError>
            + Send
            + Sync
            + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().expect("lock").clone()
    }

    fn steps(&self, prefix: &str) -> Vec<GenerationRequest> {
        self.calls()
            .into_iter()
            .filter(|call| call.step.starts_with(prefix))
            .collect()
    }
}

#[async_trait]
impl LlmProvider for ScriptedOracle {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let result = (self.handler)(&request);
        self.calls.lock().expect("lock").push(request);
        result
    }
}

type Tables = Arc<Mutex<Vec<(String, Vec<String>, Vec<Vec<String>>)>>>;

#[derive(Clone, Default)]
struct MemoryExporter {
    tables: Tables,
}

impl Exporter for MemoryExporter {
    fn export_table(
        &self,
        prefix: &str,
        columns: &[String],
        rows: Vec<Vec<String>>,
    ) -> Result<PathBuf, ExportError> {
        let mut tables = self.tables.lock().expect("lock");
        tables.push((prefix.to_string(), columns.to_vec(), rows));
        Ok(PathBuf::from(format!("memory/{}_{}.csv", prefix, tables.len())))
    }
}

fn prompts() -> Arc<PromptRepository> {
    Arc::new(PromptRepository::new(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/prompts"
    )))
}

/// A generation payload with `count` searches whose queries start with `prefix`.
fn searches(prefix: &str, count: usize) -> GenerationResponse {
    let items: Vec<String> = (0..count)
        .map(|i| {
            format!(
                r#"{{"id": "s{}", "query": "{} query {}", "strategy": "web"}}"#,
                i, prefix, i
            )
        })
        .collect();
    GenerationResponse::from_text(format!(r#"{{"searches": [{}]}}"#, items.join(",")))
}

fn build(
    oracle: Arc<ScriptedOracle>,
    review: ScriptedReview,
    config: SearchConfig,
) -> (SearchOrchestrator, Tables) {
    let exporter = MemoryExporter::default();
    let tables = Arc::clone(&exporter.tables);
    let orchestrator = SearchOrchestrator::new(config, oracle, prompts(), Box::new(review))
        .with_exporters(Box::new(exporter.clone()), Box::new(exporter));
    (orchestrator, tables)
}

#[tokio::test]
async fn test_two_batches_are_trimmed_to_one_task() {
    let oracle = ScriptedOracle::new(|request| match request.step.as_str() {
        step if step.starts_with("generate_") => Ok(searches(step, 3)),
        "filter_primary" => Ok(GenerationResponse::from_text("Keep every candidate.")),
        "filter_trim" => Ok(GenerationResponse::from_text(r#"{"ids": ["g0004"]}"#)),
        _ => Ok(GenerationResponse::from_text("not json")),
    });
    let review = ScriptedReview::auto_approve();
    let reviewed = review.reviewed_plans();
    let config = SearchConfig::default()
        .with_initial_batches(2)
        .with_mock_search(true)
        .with_max_retry_rounds(0);
    let (mut orchestrator, _) = build(Arc::clone(&oracle), review, config);

    let request = UserRequest::new("robotics companies", 5)
        .expect("request")
        .with_columns(["name", "website"]);
    let report = orchestrator.run(&request).await.expect("run");

    // Six candidates with ids g0001..g0006 reach the primary filter.
    let primary = oracle.steps("filter_primary");
    assert_eq!(primary.len(), 1);
    let prompt = &primary[0].messages[1].content;
    for id in ["g0001", "g0002", "g0003", "g0004", "g0005", "g0006"] {
        assert!(prompt.contains(id), "missing {} in filter prompt", id);
    }
    assert!(!prompt.contains("g0007"));

    // 6 kept > target 1, so the trim pass runs with the removal count.
    let trim = oracle.steps("filter_trim");
    assert_eq!(trim.len(), 1);
    let trim_prompt = &trim[0].messages[1].content;
    assert!(trim_prompt.contains("You previously selected 6 searches, but only 1 may run."));
    assert!(trim_prompt.contains("Remove exactly 5"));

    let reviewed = reviewed.lock().expect("lock").clone();
    assert_eq!(reviewed, vec![vec!["g0004".to_string()]]);

    // Batch order decides ids: g0004 is the first search of the second batch.
    let rows = orchestrator.database().rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].source_query_id, "g0004");
    assert_eq!(rows[0].get("name"), "generate_1 query 0 - name");

    assert_eq!(report.collected, 1);
    assert_eq!(report.retries_used, 0);
    assert!(!report.met_quota());
}

#[tokio::test]
async fn test_retry_budget_is_respected() {
    let oracle = ScriptedOracle::new(|request| match request.step.as_str() {
        step if step.starts_with("generate_") => Ok(searches("initial", 2)),
        "retry" => Ok(searches("retry", 2)),
        _ => Ok(GenerationResponse::from_text("[]")),
    });
    let review = ScriptedReview::auto_approve();
    let statuses = review.status_log();
    let config = SearchConfig::default()
        .with_initial_batches(1)
        .with_mock_search(true)
        .with_max_retry_rounds(2);
    let (mut orchestrator, tables) = build(Arc::clone(&oracle), review, config);

    let request = UserRequest::new("robotics companies", 50)
        .expect("request")
        .with_columns(["name", "url"]);
    let report = orchestrator.run(&request).await.expect("run");

    let retries = oracle.steps("retry");
    assert_eq!(retries.len(), 2);
    assert_eq!(report.retries_used, 2);

    // The retry prompt carries the per-search performance of the last round.
    let prompt = &retries[0].messages[1].content;
    assert!(prompt.contains("\"items_found\": 1"));
    assert!(prompt.contains("name,url,source_query_id,source_strategy"));

    let statuses = statuses.lock().expect("lock").clone();
    assert!(statuses.contains(&"Retry round 1...".to_string()));
    assert!(statuses.contains(&"Retry round 2...".to_string()));
    assert!(statuses.contains(&"Max retry rounds reached. Exporting partial data.".to_string()));
    assert!(statuses
        .last()
        .expect("final status")
        .starts_with("Final status: requested 50, collected"));

    // One debug and one report export, each written once.
    let tables = tables.lock().expect("lock");
    let prefixes: Vec<&str> = tables.iter().map(|(prefix, _, _)| prefix.as_str()).collect();
    assert_eq!(prefixes, vec!["debug", "report"]);
    assert_eq!(tables[0].1, vec!["name", "url", "source_query_id", "source_strategy", "source_domain"]);
    assert_eq!(tables[0].2.len(), report.collected);
}

#[tokio::test]
async fn test_finalize_is_idempotent() {
    let oracle = ScriptedOracle::new(|request| match request.step.as_str() {
        step if step.starts_with("generate_") => Ok(searches(step, 4)),
        "filter_primary" => Ok(GenerationResponse::from_text(r#"["g0001", "g0002", "g0003"]"#)),
        _ => Ok(GenerationResponse::from_text("cannot help with that")),
    });
    let config = SearchConfig::default()
        .with_initial_batches(1)
        .with_mock_search(true)
        .with_max_retry_rounds(0);
    let (mut orchestrator, tables) = build(Arc::clone(&oracle), ScriptedReview::auto_approve(), config);

    let request = UserRequest::new("robotics companies", 12)
        .expect("request")
        .with_columns(["name", "website"]);
    let report = orchestrator.run(&request).await.expect("run");
    assert_eq!(report.collected, 3);

    let schema: Vec<String> = ["name", "website", "source_query_id", "source_strategy"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    let first = orchestrator
        .finalize(&request, &schema, &[], 0, None)
        .await
        .expect("first finalize");
    let second = orchestrator
        .finalize(&request, &schema, &[], 0, None)
        .await
        .expect("second finalize");

    assert_eq!(first.refined, second.refined);
    assert_eq!(first.refined, report.refined);
    assert_eq!(first.collected, second.collected);

    let tables = tables.lock().expect("lock");
    let reports: Vec<_> = tables.iter().filter(|(prefix, _, _)| prefix == "report").collect();
    assert_eq!(reports.len(), 3);
    assert_eq!(reports[1].2, reports[2].2);
    assert_eq!(reports[1].1[0], "name");
}

#[tokio::test]
async fn test_unreachable_oracle_still_exports() {
    let oracle = ScriptedOracle::new(|_| Err(LlmError::RequestFailed("connection refused".to_string())));
    let config = SearchConfig::default()
        .with_initial_batches(2)
        .with_max_retry_rounds(1);
    let (mut orchestrator, tables) = build(Arc::clone(&oracle), ScriptedReview::auto_approve(), config);

    let request = UserRequest::new("robotics companies", 5).expect("request");
    let report = orchestrator.run(&request).await.expect("run");

    // Each batch is tried twice, the schema designer once, one retry call.
    assert_eq!(oracle.steps("generate_").len(), 4);
    assert_eq!(oracle.steps("schema").len(), 1);
    assert_eq!(oracle.steps("retry").len(), 1);
    assert!(oracle.steps("filter").is_empty());
    assert!(oracle.steps("web_").is_empty());

    assert_eq!(report.collected, 0);
    assert_eq!(report.refined, 0);
    assert_eq!(report.retries_used, 1);

    let tables = tables.lock().expect("lock");
    assert_eq!(tables.len(), 2);
    // Default columns plus provenance and the debug extras.
    assert_eq!(
        tables[0].1,
        vec!["title", "url", "snippet", "source", "source_query_id", "source_strategy", "source_domain"]
    );
    assert_eq!(tables[1].1, vec!["name", "title", "url", "snippet", "source"]);
}

#[tokio::test]
async fn test_broken_template_aborts_before_any_call() {
    let dir = tempfile::tempdir().expect("tempdir");
    let shipped = concat!(env!("CARGO_MANIFEST_DIR"), "/prompts");
    for entry in std::fs::read_dir(shipped).expect("read prompts") {
        let path = entry.expect("entry").path();
        let target = dir.path().join(path.file_name().expect("file name"));
        std::fs::copy(&path, target).expect("copy");
    }
    std::fs::write(
        dir.path().join("generate_searches.txt"),
        "Find {{ descriptoin }} now {% if %}",
    )
    .expect("write");

    let oracle = ScriptedOracle::new(|request| Ok(searches(&request.step, 3)));
    let exporter = MemoryExporter::default();
    let tables = Arc::clone(&exporter.tables);
    let config = SearchConfig::default().with_mock_search(true);
    let mut orchestrator = SearchOrchestrator::new(
        config,
        Arc::clone(&oracle) as Arc<dyn LlmProvider>,
        Arc::new(PromptRepository::new(dir.path())),
        Box::new(ScriptedReview::auto_approve()),
    )
    .with_exporters(Box::new(exporter.clone()), Box::new(exporter));

    let request = UserRequest::new("robotics companies", 5).expect("request");
    let err = orchestrator.run(&request).await.unwrap_err();

    assert!(matches!(err, PipelineError::Prompt(_)));
    assert!(err.to_string().contains("generate_searches"));
    assert!(oracle.calls().is_empty());
    assert!(tables.lock().expect("lock").is_empty());
}
