//! Prompt repository backed by template files on disk.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tera::{Context, Tera};

use crate::error::PromptError;

/// Logical names of the prompt templates the pipeline needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptName {
    /// Candidate search generation, one call per batch.
    GenerateSearches,
    /// Primary filter pass over all candidates.
    FilterPrimary,
    /// Trim pass with an explicit removal count.
    FilterTrim,
    /// Schema design when the user gave no columns.
    BuildSchema,
    /// Candidate regeneration seeded with a performance report.
    RetrySearches,
    /// Chunked cleanup and dedup of collected rows.
    RefineResults,
}

impl PromptName {
    /// Every template the pipeline loads.
    pub const ALL: [PromptName; 6] = [
        PromptName::GenerateSearches,
        PromptName::FilterPrimary,
        PromptName::FilterTrim,
        PromptName::BuildSchema,
        PromptName::RetrySearches,
        PromptName::RefineResults,
    ];

    /// File stem of the template.
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptName::GenerateSearches => "generate_searches",
            PromptName::FilterPrimary => "filter_primary",
            PromptName::FilterTrim => "filter_trim",
            PromptName::BuildSchema => "build_schema",
            PromptName::RetrySearches => "retry_searches",
            PromptName::RefineResults => "refine_results",
        }
    }

    /// Variables the pipeline passes when rendering this template.
    pub fn variables(&self) -> &'static [&'static str] {
        match self {
            PromptName::GenerateSearches => &[
                "description",
                "batch_number",
                "total_batches",
                "per_batch",
                "feedback",
            ],
            PromptName::FilterPrimary => &["filtered_count", "filter_feedback", "tasks"],
            PromptName::FilterTrim => &[
                "current_count",
                "filtered_count",
                "remove_count",
                "filter_feedback",
                "tasks",
            ],
            PromptName::BuildSchema => &["description", "example_queries"],
            PromptName::RetrySearches => &[
                "description",
                "schema",
                "performance_report",
                "additional_feedback",
                "per_batch",
            ],
            PromptName::RefineResults => &[
                "user_description",
                "requested_columns",
                "schema_fields",
                "candidate_json",
            ],
        }
    }

    /// A context filling every variable with a placeholder.
    fn sample_context(&self) -> Context {
        let mut context = Context::new();
        for variable in self.variables() {
            context.insert(*variable, &format!("<{}>", variable));
        }
        context
    }
}

impl fmt::Display for PromptName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loads prompt templates stored as `<name>.txt` in a directory, caching them.
///
/// Templates use Tera syntax (`{{ description }}`).
#[derive(Debug)]
pub struct PromptRepository {
    base_dir: PathBuf,
    cache: RwLock<HashMap<PromptName, String>>,
}

impl PromptRepository {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of the file backing `name`.
    pub fn path_for(&self, name: PromptName) -> PathBuf {
        self.base_dir.join(format!("{}.txt", name.as_str()))
    }

    /// Returns the raw template text, reading it from disk on first use.
    ///
    /// # Errors
    ///
    /// Returns `PromptError::NotFound` when the template file does not exist.
    pub fn load(&self, name: PromptName) -> Result<String, PromptError> {
        if let Some(cached) = self
            .cache
            .read()
            .ok()
            .and_then(|cache| cache.get(&name).cloned())
        {
            return Ok(cached);
        }

        let path = self.path_for(name);
        if !path.exists() {
            return Err(PromptError::NotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(&path)?;

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(name, text.clone());
        }
        Ok(text)
    }

    /// Loads and renders a template with the given context.
    pub fn render(&self, name: PromptName, context: &Context) -> Result<String, PromptError> {
        let template = self.load(name)?;
        render_template(name, &template, context)
    }

    /// Loads every template the pipeline needs and renders it against
    /// placeholder values, failing on the first missing or broken one.
    pub fn check_all(&self) -> Result<Vec<PathBuf>, PromptError> {
        PromptName::ALL
            .iter()
            .map(|&name| {
                self.render(name, &name.sample_context())?;
                Ok::<_, PromptError>(self.path_for(name))
            })
            .collect()
    }
}

/// Renders a template string with Tera.
pub fn render_template(
    name: PromptName,
    template: &str,
    context: &Context,
) -> Result<String, PromptError> {
    Tera::one_off(template, context, false).map_err(|e| PromptError::Render {
        name: name.to_string(),
        message: format_tera_error(&e),
    })
}

/// Flattens the Tera error chain into one line.
fn format_tera_error(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
