//! Run configuration for the search orchestrator.
//!
//! Settings are grouped by concern: loop limits, per-step model ids, on-disk
//! locations, feature flags, the fallback schema and the strategy table sent
//! to the web-search oracle.

use std::path::PathBuf;

use thiserror::Error;

use crate::llm::ModelRegistry;
use crate::search::{StrategyMap, StrategyParams};

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// IO error while preparing directories.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bounds on the generate/execute loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitsConfig {
    /// Independent candidate-generation calls in the first round.
    pub initial_batches: usize,
    /// Candidates requested per generation call.
    pub per_batch: usize,
    /// Additional generate/execute cycles allowed after the first.
    pub max_retry_rounds: usize,
    /// Worker pool size for every concurrent stage.
    pub worker_pool_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            initial_batches: 2,
            per_batch: 25,
            max_retry_rounds: 3,
            worker_pool_size: 6,
        }
    }
}

/// On-disk locations used by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathsConfig {
    pub prompts_dir: PathBuf,
    pub export_dir: PathBuf,
    pub debug_export_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub raw_responses_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self::under(PathBuf::from("exports"))
    }
}

impl PathsConfig {
    /// Output directories laid out under one export root.
    fn under(export_dir: PathBuf) -> Self {
        Self {
            prompts_dir: PathBuf::from("prompts"),
            debug_export_dir: export_dir.join("debug"),
            reports_dir: export_dir.join("reports"),
            raw_responses_dir: export_dir.join("raw_responses"),
            export_dir,
        }
    }

    /// Creates every output directory. The prompts directory is only read.
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        for dir in [
            &self.export_dir,
            &self.debug_export_dir,
            &self.reports_dir,
            &self.raw_responses_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagsConfig {
    /// Execute tasks offline with deterministic mock rows.
    pub use_mock_search: bool,
}

/// Complete configuration for one orchestrator run.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub limits: LimitsConfig,
    pub models: ModelRegistry,
    pub paths: PathsConfig,
    pub flags: FlagsConfig,
    /// Schema used when the schema designer returns nothing usable.
    pub default_columns: Vec<String>,
    pub strategy_map: StrategyMap,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limits: LimitsConfig::default(),
            models: ModelRegistry::default(),
            paths: PathsConfig::default(),
            flags: FlagsConfig::default(),
            default_columns: split_columns("title,url,snippet,source"),
            strategy_map: default_strategy_map(),
        }
    }
}

impl SearchConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `INITIAL_BATCHES`: First-round generation calls (default: 2)
    /// - `SEARCHES_PER_BATCH`: Candidates per generation call (default: 25)
    /// - `MAX_RETRY_ROUNDS`: Retry cycles after the first round (default: 3)
    /// - `WORKER_POOL_SIZE`: Pool size per stage (default: 6); falls back to
    ///   `SEARCH_EXECUTE_WORKERS`, then `SEARCH_GENERATE_WORKERS`
    /// - `MODEL_SEARCH_GEN`, `MODEL_SEARCH_FILTER`, `MODEL_SCHEMA_GEN`,
    ///   `MODEL_WEB`, `MODEL_POSTPROCESS`: Per-step model ids
    /// - `PROMPTS_DIR`: Prompt templates (default: ./prompts)
    /// - `EXPORT_DIR`: Export root (default: ./exports)
    /// - `DEBUG_EXPORT_DIR`: Raw row exports (default: <EXPORT_DIR>/debug)
    /// - `REPORTS_DIR`: Refined reports (default: <EXPORT_DIR>/reports)
    /// - `RAW_RESPONSE_DIR`: Recorded oracle payloads (default: <EXPORT_DIR>/raw_responses)
    /// - `USE_MOCK_SEARCH`: Offline execution (default: false)
    /// - `DEFAULT_COLUMNS`: Comma-separated fallback schema
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value or the result
    /// fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Limits
        if let Ok(val) = std::env::var("INITIAL_BATCHES") {
            config.limits.initial_batches = parse_env_value(&val, "INITIAL_BATCHES")?;
        }

        if let Ok(val) = std::env::var("SEARCHES_PER_BATCH") {
            config.limits.per_batch = parse_env_value(&val, "SEARCHES_PER_BATCH")?;
        }

        if let Ok(val) = std::env::var("MAX_RETRY_ROUNDS") {
            config.limits.max_retry_rounds = parse_env_value(&val, "MAX_RETRY_ROUNDS")?;
        }

        for key in [
            "WORKER_POOL_SIZE",
            "SEARCH_EXECUTE_WORKERS",
            "SEARCH_GENERATE_WORKERS",
        ] {
            if let Ok(val) = std::env::var(key) {
                config.limits.worker_pool_size = parse_env_value(&val, key)?;
                break;
            }
        }

        // Models
        for (key, slot) in [
            ("MODEL_SEARCH_GEN", &mut config.models.search_gen),
            ("MODEL_SEARCH_FILTER", &mut config.models.search_filter),
            ("MODEL_SCHEMA_GEN", &mut config.models.schema_gen),
            ("MODEL_WEB", &mut config.models.web),
            ("MODEL_POSTPROCESS", &mut config.models.postprocess),
        ] {
            if let Ok(val) = std::env::var(key) {
                *slot = val.trim().to_string();
            }
        }

        // Paths
        if let Ok(val) = std::env::var("PROMPTS_DIR") {
            config.paths.prompts_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("EXPORT_DIR") {
            config.paths = PathsConfig {
                prompts_dir: config.paths.prompts_dir.clone(),
                ..PathsConfig::under(PathBuf::from(val))
            };
        }

        if let Ok(val) = std::env::var("DEBUG_EXPORT_DIR") {
            config.paths.debug_export_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("REPORTS_DIR") {
            config.paths.reports_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("RAW_RESPONSE_DIR") {
            config.paths.raw_responses_dir = PathBuf::from(val);
        }

        // Flags
        if let Ok(val) = std::env::var("USE_MOCK_SEARCH") {
            config.flags.use_mock_search = parse_env_bool(&val, "USE_MOCK_SEARCH")?;
        }

        if let Ok(val) = std::env::var("DEFAULT_COLUMNS") {
            config.default_columns = split_columns(&val);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` naming the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.initial_batches == 0 {
            return Err(ConfigError::ValidationFailed(
                "initial_batches must be greater than 0".to_string(),
            ));
        }

        if self.limits.per_batch == 0 {
            return Err(ConfigError::ValidationFailed(
                "per_batch must be greater than 0".to_string(),
            ));
        }

        if self.limits.worker_pool_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "worker_pool_size must be greater than 0".to_string(),
            ));
        }

        if let Some(step) = self.models.first_blank() {
            return Err(ConfigError::ValidationFailed(format!(
                "model for {} cannot be empty",
                step
            )));
        }

        if self.default_columns.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "default_columns cannot be empty".to_string(),
            ));
        }

        if self.strategy_map.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "strategy_map cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the number of first-round generation calls.
    pub fn with_initial_batches(mut self, batches: usize) -> Self {
        self.limits.initial_batches = batches;
        self
    }

    /// Builder method to set candidates per generation call.
    pub fn with_per_batch(mut self, per_batch: usize) -> Self {
        self.limits.per_batch = per_batch;
        self
    }

    /// Builder method to set the retry budget.
    pub fn with_max_retry_rounds(mut self, rounds: usize) -> Self {
        self.limits.max_retry_rounds = rounds;
        self
    }

    /// Builder method to set the worker pool size.
    pub fn with_worker_pool_size(mut self, size: usize) -> Self {
        self.limits.worker_pool_size = size;
        self
    }

    /// Builder method to set the model registry.
    pub fn with_models(mut self, models: ModelRegistry) -> Self {
        self.models = models;
        self
    }

    /// Builder method to set the prompts directory.
    pub fn with_prompts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.paths.prompts_dir = dir.into();
        self
    }

    /// Builder method to root every output directory under `dir`.
    pub fn with_export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let prompts_dir = self.paths.prompts_dir.clone();
        self.paths = PathsConfig {
            prompts_dir,
            ..PathsConfig::under(dir.into())
        };
        self
    }

    /// Builder method to enable or disable mock search.
    pub fn with_mock_search(mut self, enabled: bool) -> Self {
        self.flags.use_mock_search = enabled;
        self
    }

    /// Builder method to set the fallback schema.
    pub fn with_default_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_columns = columns.into_iter().map(Into::into).collect();
        self
    }
}

/// Parameter profiles for the `web`, `news` and `agg` strategies.
pub fn default_strategy_map() -> StrategyMap {
    fn profile(pairs: &[(&str, &str)]) -> StrategyParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    let mut map = StrategyMap::new();
    map.insert("web".to_string(), profile(&[("max_results", "15")]));
    map.insert(
        "news".to_string(),
        profile(&[("max_results", "15"), ("recency", "12mo")]),
    );
    map.insert(
        "agg".to_string(),
        profile(&[("max_results", "15"), ("site_bias", "directory")]),
    );
    map
}

fn split_columns(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|column| column.trim().to_string())
        .filter(|column| !column.is_empty())
        .collect()
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SearchConfig::default();
        assert_eq!(config.limits.initial_batches, 2);
        assert_eq!(config.limits.per_batch, 25);
        assert_eq!(config.limits.max_retry_rounds, 3);
        assert_eq!(config.limits.worker_pool_size, 6);
        assert!(!config.flags.use_mock_search);
        assert_eq!(config.default_columns, vec!["title", "url", "snippet", "source"]);
        assert_eq!(config.paths.debug_export_dir, PathBuf::from("exports/debug"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_strategy_map() {
        let map = default_strategy_map();
        assert_eq!(map.len(), 3);
        assert_eq!(map["web"]["max_results"], "15");
        assert_eq!(map["news"]["recency"], "12mo");
        assert_eq!(map["agg"]["site_bias"], "directory");
    }

    #[test]
    fn test_config_builder() {
        let config = SearchConfig::new()
            .with_initial_batches(4)
            .with_per_batch(10)
            .with_max_retry_rounds(1)
            .with_worker_pool_size(2)
            .with_prompts_dir("/tmp/prompts")
            .with_export_dir("/tmp/out")
            .with_mock_search(true)
            .with_default_columns(["name", "website"]);

        assert_eq!(config.limits.initial_batches, 4);
        assert_eq!(config.limits.per_batch, 10);
        assert_eq!(config.limits.max_retry_rounds, 1);
        assert_eq!(config.limits.worker_pool_size, 2);
        assert_eq!(config.paths.prompts_dir, PathBuf::from("/tmp/prompts"));
        assert_eq!(config.paths.reports_dir, PathBuf::from("/tmp/out/reports"));
        assert!(config.flags.use_mock_search);
        assert_eq!(config.default_columns, vec!["name", "website"]);
    }

    #[test]
    fn test_validation_invalid_initial_batches() {
        let result = SearchConfig::default().with_initial_batches(0).validate();
        assert!(result.unwrap_err().to_string().contains("initial_batches"));
    }

    #[test]
    fn test_validation_invalid_per_batch() {
        let result = SearchConfig::default().with_per_batch(0).validate();
        assert!(result.unwrap_err().to_string().contains("per_batch"));
    }

    #[test]
    fn test_validation_invalid_pool_size() {
        let result = SearchConfig::default().with_worker_pool_size(0).validate();
        assert!(result.unwrap_err().to_string().contains("worker_pool_size"));
    }

    #[test]
    fn test_validation_zero_retry_rounds_is_valid() {
        assert!(SearchConfig::default().with_max_retry_rounds(0).validate().is_ok());
    }

    #[test]
    fn test_validation_empty_model() {
        let mut models = ModelRegistry::default();
        models.web = String::new();
        let result = SearchConfig::default().with_models(models).validate();
        assert!(result.unwrap_err().to_string().contains("web"));
    }

    #[test]
    fn test_validation_empty_default_columns() {
        let result = SearchConfig::default()
            .with_default_columns(Vec::<String>::new())
            .validate();
        assert!(result.unwrap_err().to_string().contains("default_columns"));
    }

    #[test]
    fn test_ensure_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = SearchConfig::default().with_export_dir(dir.path().join("out"));
        config.paths.ensure_dirs().expect("dirs");
        assert!(config.paths.debug_export_dir.is_dir());
        assert!(config.paths.reports_dir.is_dir());
        assert!(config.paths.raw_responses_dir.is_dir());
    }

    #[test]
    fn test_split_columns() {
        assert_eq!(split_columns(" name, ,website ,"), vec!["name", "website"]);
        assert!(split_columns("").is_empty());
    }

    #[test]
    fn test_parse_env_bool() {
        assert!(parse_env_bool("true", "test").unwrap());
        assert!(parse_env_bool("1", "test").unwrap());
        assert!(parse_env_bool("yes", "test").unwrap());
        assert!(parse_env_bool("ON", "test").unwrap());

        assert!(!parse_env_bool("false", "test").unwrap());
        assert!(!parse_env_bool("0", "test").unwrap());
        assert!(!parse_env_bool("no", "test").unwrap());
        assert!(!parse_env_bool("off", "test").unwrap());

        assert!(parse_env_bool("maybe", "test").is_err());
    }

    #[test]
    fn test_parse_env_value() {
        let parsed: usize = parse_env_value(" 12 ", "KEY").unwrap();
        assert_eq!(parsed, 12);
        let err = parse_env_value::<usize>("twelve", "KEY").unwrap_err();
        assert!(err.to_string().contains("KEY"));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string());
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        let err = ConfigError::InvalidValue {
            key: "KEY".to_string(),
            message: "bad value".to_string(),
        };
        assert!(err.to_string().contains("KEY"));
        assert!(err.to_string().contains("bad value"));
    }
}
