//! CLI command definitions for search-forge.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use super::interactive::{collect_request, RequestInput};
use crate::llm::{OpenAiClient, ResponseRecorder};
use crate::pipeline::{
    ReviewSurface, ScriptedReview, SearchConfig, SearchOrchestrator, TerminalReview,
};
use crate::prompts::PromptRepository;

/// Assemble deduplicated record lists from LLM-planned web searches.
#[derive(Parser)]
#[command(name = "search-forge")]
#[command(about = "Assemble deduplicated record lists from LLM-planned web searches")]
#[command(version)]
#[command(
    long_about = "search-forge plans web searches with an LLM, runs them, deduplicates the results and \
exports a CSV report, retrying until the requested number of records is reached.\n\n\
Example usage:\n  search-forge run --description \"Boston robotics startups\" --min-items 20"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run a search: generate, review, execute and export.
    Run(RunArgs),

    /// Check that every prompt template exists and renders.
    Prompts(PromptsArgs),
}

/// Arguments for `search-forge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// What to look for. Asked interactively when omitted.
    #[arg(short, long)]
    pub description: Option<String>,

    /// Minimum number of records (capped at 100). Asked interactively when omitted.
    #[arg(short = 'n', long)]
    pub min_items: Option<usize>,

    /// Comma-separated output columns.
    #[arg(short, long, value_delimiter = ',')]
    pub columns: Vec<String>,

    /// Field for the final deduplication (name, website, link, url, email, description).
    #[arg(long)]
    pub dedupe_field: Option<String>,

    /// Produce deterministic rows instead of calling the web-search model.
    #[arg(long)]
    pub mock_search: bool,

    /// Approve every plan without prompting.
    #[arg(long)]
    pub auto_approve: bool,

    /// Override MAX_RETRY_ROUNDS.
    #[arg(long)]
    pub max_retry_rounds: Option<usize>,

    /// Override INITIAL_BATCHES.
    #[arg(long)]
    pub initial_batches: Option<usize>,

    /// Override SEARCHES_PER_BATCH.
    #[arg(long)]
    pub per_batch: Option<usize>,

    /// Override WORKER_POOL_SIZE.
    #[arg(short, long)]
    pub workers: Option<usize>,
}

impl RunArgs {
    fn request_input(&self) -> RequestInput {
        RequestInput {
            description: self.description.clone(),
            min_items: self.min_items,
            columns: self
                .columns
                .iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            dedupe_field: self.dedupe_field.clone(),
        }
    }

    /// Applies command-line overrides on top of the environment config.
    fn apply(&self, mut config: SearchConfig) -> SearchConfig {
        if let Some(rounds) = self.max_retry_rounds {
            config = config.with_max_retry_rounds(rounds);
        }
        if let Some(batches) = self.initial_batches {
            config = config.with_initial_batches(batches);
        }
        if let Some(per_batch) = self.per_batch {
            config = config.with_per_batch(per_batch);
        }
        if let Some(workers) = self.workers {
            config = config.with_worker_pool_size(workers);
        }
        if self.mock_search {
            config = config.with_mock_search(true);
        }
        config
    }
}

/// Arguments for `search-forge prompts`.
#[derive(Parser, Debug)]
pub struct PromptsArgs {
    /// Template directory (defaults to PROMPTS_DIR or ./prompts).
    #[arg(short, long)]
    pub prompts_dir: Option<PathBuf>,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parses arguments and runs the selected command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_search_command(args).await,
        Commands::Prompts(args) => run_prompts_command(args),
    }
}

async fn run_search_command(args: RunArgs) -> anyhow::Result<()> {
    let config = args.apply(SearchConfig::from_env().context("Failed to load configuration")?);
    config.validate()?;
    config
        .paths
        .ensure_dirs()
        .context("Failed to create export directories")?;

    let prompts = Arc::new(PromptRepository::new(config.paths.prompts_dir.clone()));
    prompts
        .check_all()
        .context("Prompt templates are missing")?;

    let client = OpenAiClient::from_env()
        .context("Failed to create LLM client")?
        .with_recorder(ResponseRecorder::new(config.paths.raw_responses_dir.clone()));

    let mut terminal = TerminalReview::stdio();
    let request = collect_request(&mut terminal, &args.request_input())?;
    info!(
        description = %request.description,
        min_items = request.min_items,
        mock_search = config.flags.use_mock_search,
        "Starting search-forge run"
    );

    let review: Box<dyn ReviewSurface> = if args.auto_approve {
        Box::new(ScriptedReview::auto_approve())
    } else {
        Box::new(terminal)
    };

    let mut orchestrator = SearchOrchestrator::new(config, Arc::new(client), prompts, review);
    let report = orchestrator.run(&request).await?;

    if args.auto_approve {
        println!("Debug CSV: {}", report.debug_path.display());
        println!("Report CSV: {}", report.report_path.display());
        println!("{}", report.status_line());
    }
    info!(
        refined = report.refined,
        met_quota = report.met_quota(),
        "Workflow completed"
    );
    Ok(())
}

fn run_prompts_command(args: PromptsArgs) -> anyhow::Result<()> {
    let dir = match args.prompts_dir {
        Some(dir) => dir,
        None => SearchConfig::from_env()?.paths.prompts_dir,
    };
    let prompts = PromptRepository::new(&dir);
    let paths = prompts
        .check_all()
        .with_context(|| format!("Prompt check failed in {}", dir.display()))?;
    for path in paths {
        println!("ok  {}", path.display());
    }
    Ok(())
}
