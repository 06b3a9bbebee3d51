//! Parsers for oracle payloads used while planning searches.
//!
//! Each parser degrades to a local fallback instead of failing, except
//! [`parse_search_tasks`] which reports a JSON payload of the wrong shape so
//! the batch runner can retry the unit.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::models::SearchTask;
use crate::error::SearchError;
use crate::utils::parse_json_payload;

fn id_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9_\-]+").expect("valid regex"))
}

/// Parses candidate searches from a generation response.
///
/// Accepts a JSON list or an object carrying `searches`/`tasks`. Tasks get
/// provisional ids (`<batch>_<idx>`, or the payload id with `_<n>` suffixes
/// when repeated); blank queries are skipped. Text that is not JSON at all
/// becomes one task per non-empty line.
///
/// # Errors
///
/// Returns `SearchError::UnexpectedShape` for valid JSON that is neither a
/// list nor an object with a task list.
pub fn parse_search_tasks(
    raw_text: &str,
    batch_index: usize,
    default_strategy: &str,
) -> Result<Vec<SearchTask>, SearchError> {
    let Some(payload) = parse_json_payload(raw_text) else {
        return Ok(parse_task_lines(raw_text, batch_index, default_strategy));
    };

    let items = match &payload {
        Value::Array(items) => items,
        Value::Object(map) => match ["searches", "tasks"]
            .iter()
            .find_map(|key| map.get(*key).filter(|v| !is_falsy(v)))
        {
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(SearchError::UnexpectedShape(
                    "expected a list of searches".to_string(),
                ))
            }
            None => return Ok(Vec::new()),
        },
        _ => {
            return Err(SearchError::UnexpectedShape(
                "expected a list of searches".to_string(),
            ))
        }
    };

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut tasks = Vec::new();
    for (idx, item) in items.iter().enumerate() {
        let Some(item) = item.as_object() else {
            continue;
        };

        let base_id = item
            .get("id")
            .map(value_to_text)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("{}_{}", batch_index, idx));
        let suffix = seen.entry(base_id.clone()).or_insert(0);
        let id = if *suffix == 0 {
            base_id.clone()
        } else {
            format!("{}_{}", base_id, suffix)
        };
        *suffix += 1;

        let query = item.get("query").map(value_to_text).unwrap_or_default();
        if query.is_empty() {
            continue;
        }
        let strategy = item
            .get("strategy")
            .map(value_to_text)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default_strategy.to_string());
        let rationale = item
            .get("rationale")
            .map(value_to_text)
            .filter(|r| !r.is_empty());

        tasks.push(SearchTask {
            id,
            query,
            strategy,
            rationale,
        });
    }
    Ok(tasks)
}

fn parse_task_lines(text: &str, batch_index: usize, default_strategy: &str) -> Vec<SearchTask> {
    text.lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let query = line.trim();
            (!query.is_empty()).then(|| {
                SearchTask::new(format!("{}_{}", batch_index, idx), query, default_strategy)
            })
        })
        .collect()
}

/// Parses the ordered list of ids a filter response keeps.
///
/// Accepts a JSON list or an object with `ids`/`keep`. Anything else is
/// scanned for id-like tokens; callers intersect the result with the ids
/// they actually offered.
pub fn parse_filter_ids(raw_text: &str) -> Vec<String> {
    if let Some(payload) = parse_json_payload(raw_text) {
        let list = match &payload {
            Value::Object(map) => ["ids", "keep"]
                .iter()
                .find_map(|key| map.get(*key).filter(|v| !is_falsy(v))),
            other => Some(other),
        };
        match list {
            Some(Value::Array(items)) => {
                return items
                    .iter()
                    .map(value_to_text)
                    .filter(|id| !id.is_empty())
                    .collect()
            }
            None => return Vec::new(),
            Some(_) => {}
        }
    }

    id_token()
        .find_iter(raw_text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Parses schema column names from a schema-design response.
///
/// Accepts a JSON list or an object with `columns`/`fields`; plain text is
/// split on commas.
pub fn parse_schema(raw_text: &str) -> Vec<String> {
    if let Some(payload) = parse_json_payload(raw_text) {
        let list = match &payload {
            Value::Object(map) => ["columns", "fields"]
                .iter()
                .find_map(|key| map.get(*key).filter(|v| !is_falsy(v))),
            other => Some(other),
        };
        match list {
            Some(Value::Array(items)) => {
                return items
                    .iter()
                    .map(value_to_text)
                    .filter(|c| !c.is_empty())
                    .collect()
            }
            None => return Vec::new(),
            Some(_) => {}
        }
    }

    raw_text
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Stringifies a scalar JSON value, trimmed. `null` becomes empty.
pub(crate) fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Number(_) => false,
    }
}
