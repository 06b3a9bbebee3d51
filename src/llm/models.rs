//! Mapping of pipeline steps to model identifiers.

use serde::{Deserialize, Serialize};

/// Model used for every step unless overridden.
pub const DEFAULT_MODEL: &str = "gpt-5-mini-2025-08-07";

/// Registry mapping each pipeline step to a model id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRegistry {
    /// Generates bulk search ideas.
    pub search_gen: String,
    /// Chooses the strongest searches.
    pub search_filter: String,
    /// Designs the CSV schema when needed.
    pub schema_gen: String,
    /// Runs web-enabled searches.
    pub web: String,
    /// Cleans and dedupes final rows.
    pub postprocess: String,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::uniform(DEFAULT_MODEL)
    }
}

impl ModelRegistry {
    /// Uses the same model for every step.
    pub fn uniform(model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            search_gen: model.clone(),
            search_filter: model.clone(),
            schema_gen: model.clone(),
            web: model.clone(),
            postprocess: model,
        }
    }

    pub fn for_generate_searches(&self) -> &str {
        &self.search_gen
    }

    pub fn for_filter_searches(&self) -> &str {
        &self.search_filter
    }

    pub fn for_schema(&self) -> &str {
        &self.schema_gen
    }

    pub fn for_web(&self) -> &str {
        &self.web
    }

    pub fn for_postprocess(&self) -> &str {
        &self.postprocess
    }

    /// Returns the first step whose model id is blank, if any.
    pub fn first_blank(&self) -> Option<&'static str> {
        [
            ("search_gen", &self.search_gen),
            ("search_filter", &self.search_filter),
            ("schema_gen", &self.schema_gen),
            ("web", &self.web),
            ("postprocess", &self.postprocess),
        ]
        .into_iter()
        .find(|(_, model)| model.trim().is_empty())
        .map(|(step, _)| step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_uses_one_model() {
        let registry = ModelRegistry::default();
        assert_eq!(registry.for_generate_searches(), DEFAULT_MODEL);
        assert_eq!(registry.for_postprocess(), DEFAULT_MODEL);
        assert_eq!(registry.first_blank(), None);
    }

    #[test]
    fn test_first_blank() {
        let mut registry = ModelRegistry::uniform("m");
        registry.web = String::new();
        assert_eq!(registry.first_blank(), Some("web"));
    }
}
