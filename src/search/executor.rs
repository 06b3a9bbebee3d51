//! Runs search tasks through the web-search oracle and normalizes the results.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use super::models::{NormalizedRow, SearchTask, StrategyMap};
use super::parser::value_to_text;
use crate::error::SearchError;
use crate::llm::{GenerationRequest, LlmProvider, Message, ModelRegistry, Tool};
use crate::utils::parse_json_payload;

const SYSTEM_PROMPT: &str = "You are a researcher using the OpenAI web search tool. \
Return JSON with an `items` array. Each item should include the schema fields \
plus `title`, `url`, `snippet`, and `source`.";

fn markdown_link() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(.*?)\]\((.*?)\)").expect("valid regex"))
}

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

/// Strips markdown links down to their label and collapses whitespace.
pub fn clean_text(text: &str) -> String {
    let unlinked = markdown_link().replace_all(text, "$1");
    whitespace_run()
        .replace_all(&unlinked, " ")
        .trim()
        .to_string()
}

/// Host part of a URL: the text after `://` up to the next `/`.
pub fn extract_domain(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.split('/').next().unwrap_or("").to_string()
}

/// The oracle response shapes the executor knows how to normalize.
#[derive(Debug)]
pub enum ResponseShape<'a> {
    /// Structured JSON with an `items` array of objects.
    JsonItems(Vec<&'a serde_json::Map<String, Value>>),
    /// Citation annotations attached to the raw output blocks.
    Annotations(&'a Value),
    /// Offline mode, no oracle call.
    Mock,
}

impl<'a> ResponseShape<'a> {
    /// Picks the shape: JSON items when `payload` parsed into a non-empty
    /// `items` list of objects, citation annotations otherwise.
    pub fn detect(payload: Option<&'a Value>, raw: &'a Value) -> Self {
        let items: Vec<_> = payload
            .and_then(|p| p.get("items"))
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_object).collect())
            .unwrap_or_default();
        if items.is_empty() {
            ResponseShape::Annotations(raw)
        } else {
            ResponseShape::JsonItems(items)
        }
    }

    /// Normalizes the response into rows aligned to `schema`.
    pub fn into_rows(self, task: &SearchTask, schema: &[String]) -> Vec<NormalizedRow> {
        match self {
            ResponseShape::JsonItems(items) => items
                .into_iter()
                .map(|item| NormalizedRow::new(values_from_item(item, schema), task))
                .collect(),
            ResponseShape::Annotations(raw) => citations(raw)
                .into_iter()
                .map(|citation| NormalizedRow::new(values_from_citation(&citation, schema), task))
                .collect(),
            ResponseShape::Mock => {
                let values = schema
                    .iter()
                    .map(|column| (column.clone(), format!("{} - {}", task.query, column)))
                    .collect();
                vec![NormalizedRow::new(values, task)]
            }
        }
    }
}

fn values_from_item(
    item: &serde_json::Map<String, Value>,
    schema: &[String],
) -> HashMap<String, String> {
    let mut values: HashMap<String, String> = schema
        .iter()
        .map(|column| {
            let raw = item.get(column).map(value_to_text).unwrap_or_default();
            let value = if matches!(column.as_str(), "url" | "link") {
                raw
            } else {
                clean_text(&raw)
            };
            (column.clone(), value)
        })
        .collect();

    let title = ["title", "name"]
        .iter()
        .filter_map(|key| item.get(*key).map(value_to_text))
        .find(|text| !text.is_empty())
        .or_else(|| values.get("name").cloned())
        .map(|text| clean_text(&text))
        .unwrap_or_default();
    if !title.is_empty() {
        fill_blank(&mut values, "name", &title);
        fill_blank(&mut values, "title", &title);
    }

    let snippet = item
        .get("snippet")
        .map(|v| clean_text(&value_to_text(v)))
        .unwrap_or_default();
    if values.get("description").is_some_and(String::is_empty) {
        let description = if snippet.is_empty() { &title } else { &snippet };
        values.insert("description".to_string(), description.clone());
    }

    let url = ["url", "link"]
        .iter()
        .filter_map(|key| item.get(*key).map(value_to_text))
        .find(|text| !text.is_empty())
        .unwrap_or_default();
    if !url.is_empty() {
        let domain = extract_domain(&url);
        values.insert("url".to_string(), url);
        if values.get("source").is_some_and(String::is_empty) {
            values.insert("source".to_string(), domain.clone());
        }
        values.insert("source_domain".to_string(), domain);
    }
    values
}

/// Sets `key` when it is absent or blank.
fn fill_blank(values: &mut HashMap<String, String>, key: &str, value: &str) {
    let slot = values.entry(key.to_string()).or_default();
    if slot.is_empty() {
        *slot = value.to_string();
    }
}

/// One `url_citation` annotation with the text span it points into.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Citation {
    title: String,
    url: String,
    snippet: String,
}

fn citations(raw: &Value) -> Vec<Citation> {
    let Some(blocks) = raw.get("output").and_then(Value::as_array) else {
        return Vec::new();
    };

    blocks
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("message"))
        .filter_map(|block| block.get("content").and_then(Value::as_array))
        .flatten()
        .flat_map(|content| {
            let text = content.get("text").and_then(Value::as_str).unwrap_or("");
            content
                .get("annotations")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter(|a| a.get("type").and_then(Value::as_str) == Some("url_citation"))
                .map(move |annotation| Citation {
                    title: clean_text(annotation.get("title").and_then(Value::as_str).unwrap_or("")),
                    url: annotation
                        .get("url")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .trim()
                        .to_string(),
                    snippet: slice_text(
                        text,
                        annotation.get("start_index").and_then(Value::as_i64),
                        annotation.get("end_index").and_then(Value::as_i64),
                    ),
                })
        })
        .collect()
}

/// Returns the `[start, end)` character span of `text`, or all of it when
/// the span is missing or out of range.
fn slice_text(text: &str, start: Option<i64>, end: Option<i64>) -> String {
    let char_count = text.chars().count() as i64;
    match (start, end) {
        (Some(start), Some(end)) if start >= 0 && end > start && end <= char_count => text
            .chars()
            .skip(start as usize)
            .take((end - start) as usize)
            .collect::<String>()
            .trim()
            .to_string(),
        _ => text.trim().to_string(),
    }
}

fn values_from_citation(citation: &Citation, schema: &[String]) -> HashMap<String, String> {
    let mut values: HashMap<String, String> = schema
        .iter()
        .map(|column| (column.clone(), String::new()))
        .collect();
    let domain = if citation.url.is_empty() {
        String::new()
    } else {
        extract_domain(&citation.url)
    };
    let description = clean_text(if citation.snippet.is_empty() {
        &citation.title
    } else {
        &citation.snippet
    });

    values.insert("name".to_string(), citation.title.clone());
    fill_blank(&mut values, "title", &citation.title);
    values.insert("url".to_string(), citation.url.clone());
    fill_blank(&mut values, "link", &citation.url);
    values.insert("description".to_string(), description);
    if values.contains_key("source") && !domain.is_empty() {
        values.insert("source".to_string(), domain.clone());
    }
    values.insert("source_domain".to_string(), domain);
    values
}

/// Executes search tasks against the web-search oracle.
pub struct SearchExecutor {
    llm: Arc<dyn LlmProvider>,
    models: ModelRegistry,
    strategies: StrategyMap,
    use_mock: bool,
}

impl SearchExecutor {
    pub fn new(llm: Arc<dyn LlmProvider>, models: ModelRegistry, strategies: StrategyMap) -> Self {
        Self {
            llm,
            models,
            strategies,
            use_mock: false,
        }
    }

    /// Produce one deterministic row per task without calling the oracle.
    pub fn with_mock(mut self, use_mock: bool) -> Self {
        self.use_mock = use_mock;
        self
    }

    /// Runs one task and returns its rows.
    ///
    /// # Errors
    ///
    /// Only oracle failures are returned; malformed payloads yield fewer rows.
    pub async fn run_task(
        &self,
        task: &SearchTask,
        schema: &[String],
    ) -> Result<Vec<NormalizedRow>, SearchError> {
        if self.use_mock {
            return Ok(ResponseShape::Mock.into_rows(task, schema));
        }

        let parameters = self.strategies.get(&task.strategy).cloned().unwrap_or_default();
        let payload = json!({
            "query": task.query,
            "strategy": task.strategy,
            "schema": schema,
            "parameters": parameters,
        });
        let request = GenerationRequest::new(
            self.models.for_web(),
            vec![
                Message::system(SYSTEM_PROMPT),
                Message::user(format!(
                    "Execute the query and return results as JSON. Payload:\n{}",
                    payload
                )),
            ],
        )
        .with_json_response()
        .with_tool(Tool::web_search())
        .with_step(format!("web_{}", task.id))
        .with_metadata("query", task.query.as_str())
        .with_metadata("strategy", task.strategy.as_str());

        let response = self.llm.generate(request).await?;
        let parsed = parse_json_payload(&response.text);
        let shape = ResponseShape::detect(parsed.as_ref(), &response.raw);
        let via = match shape {
            ResponseShape::JsonItems(_) => "json",
            ResponseShape::Annotations(_) => "annotations",
            ResponseShape::Mock => "mock",
        };
        let rows = shape.into_rows(task, schema);
        debug!(task_id = %task.id, rows = rows.len(), via, "Parsed search results");
        Ok(rows)
    }
}
