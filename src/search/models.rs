//! Task, plan and row types shared by every pipeline stage.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RequestError;

/// Provenance columns appended to every schema. Never user-selectable.
pub const RESERVED_COLUMNS: [&str; 2] = ["source_query_id", "source_strategy"];

/// Returns true for the provenance columns carried by every row.
pub fn is_reserved_column(column: &str) -> bool {
    RESERVED_COLUMNS.contains(&column)
}

/// Parameters passed to the search oracle for one strategy.
pub type StrategyParams = BTreeMap<String, String>;

/// Named strategy profiles (`web`, `news`, `agg`, ...).
pub type StrategyMap = BTreeMap<String, StrategyParams>;

/// Field used for the final cross-chunk deduplication of refined records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupeField {
    #[default]
    Name,
    Website,
    Link,
    Url,
    Email,
    Description,
}

impl DedupeField {
    pub const ALL: [DedupeField; 6] = [
        DedupeField::Name,
        DedupeField::Website,
        DedupeField::Link,
        DedupeField::Url,
        DedupeField::Email,
        DedupeField::Description,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DedupeField::Name => "name",
            DedupeField::Website => "website",
            DedupeField::Link => "link",
            DedupeField::Url => "url",
            DedupeField::Email => "email",
            DedupeField::Description => "description",
        }
    }

    /// Whether the field keys on a URL-like value.
    pub fn is_url_like(&self) -> bool {
        matches!(
            self,
            DedupeField::Website | DedupeField::Link | DedupeField::Url
        )
    }

    /// Name and description are always derivable, whatever the user columns.
    fn always_available(&self) -> bool {
        matches!(self, DedupeField::Name | DedupeField::Description)
    }
}

impl fmt::Display for DedupeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DedupeField {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        if normalized.is_empty() {
            return Ok(DedupeField::Name);
        }
        DedupeField::ALL
            .into_iter()
            .find(|field| field.as_str() == normalized)
            .ok_or_else(|| RequestError::UnknownDedupeField(s.trim().to_string()))
    }
}

/// The user's request, immutable for the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRequest {
    pub description: String,
    pub min_items: usize,
    /// Explicit, ordered output columns.
    pub columns: Option<Vec<String>>,
    pub dedupe_field: DedupeField,
}

impl UserRequest {
    /// Creates a request with no explicit columns and the default dedupe field.
    ///
    /// # Errors
    ///
    /// Returns `RequestError::EmptyDescription` for a blank description and
    /// `RequestError::InvalidMinItems` when `min_items` is zero.
    pub fn new(description: impl Into<String>, min_items: usize) -> Result<Self, RequestError> {
        let description = description.into().trim().to_string();
        if description.is_empty() {
            return Err(RequestError::EmptyDescription);
        }
        if min_items == 0 {
            return Err(RequestError::InvalidMinItems);
        }
        Ok(Self {
            description,
            min_items,
            columns: None,
            dedupe_field: DedupeField::Name,
        })
    }

    /// Sets explicit columns. Blank entries are dropped; an empty list means none.
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let columns: Vec<String> = columns
            .into_iter()
            .map(|c| c.as_ref().trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        self.columns = if columns.is_empty() {
            None
        } else {
            Some(columns)
        };
        self
    }

    /// Sets the dedupe field, checking it against the explicit columns.
    pub fn with_dedupe_field(mut self, field: DedupeField) -> Result<Self, RequestError> {
        if let Some(columns) = &self.columns {
            if !field.always_available() && !columns.iter().any(|c| c == field.as_str()) {
                return Err(RequestError::DedupeFieldNotInSchema(field.to_string()));
            }
        }
        self.dedupe_field = field;
        Ok(self)
    }
}

/// One atomic search: a query plus the strategy profile to run it with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTask {
    pub id: String,
    pub query: String,
    pub strategy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl SearchTask {
    pub fn new(id: impl Into<String>, query: impl Into<String>, strategy: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
            strategy: strategy.into(),
            rationale: None,
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }
}

/// Ordered, id-unique set of tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPlan {
    tasks: Vec<SearchTask>,
}

impl SearchPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a plan by upserting each task in order.
    pub fn from_tasks(tasks: impl IntoIterator<Item = SearchTask>) -> Self {
        let mut plan = Self::new();
        for task in tasks {
            plan.add_task(task);
        }
        plan
    }

    /// Upserts by id: a task with a known id replaces the old one in place.
    pub fn add_task(&mut self, task: SearchTask) {
        match self.tasks.iter_mut().find(|current| current.id == task.id) {
            Some(existing) => *existing = task,
            None => self.tasks.push(task),
        }
    }

    /// Removes every task whose id is listed, keeping the order of the rest.
    pub fn remove_ids<S: AsRef<str>>(&mut self, ids: &[S]) {
        let drop: HashSet<&str> = ids.iter().map(AsRef::as_ref).collect();
        self.tasks.retain(|task| !drop.contains(task.id.as_str()));
    }

    /// New plan restricted to the given ids, in this plan's order.
    pub fn filter_by_ids<S: AsRef<str>>(&self, ids: &[S]) -> SearchPlan {
        let keep: HashSet<&str> = ids.iter().map(AsRef::as_ref).collect();
        SearchPlan {
            tasks: self
                .tasks
                .iter()
                .filter(|task| keep.contains(task.id.as_str()))
                .cloned()
                .collect(),
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.tasks.iter().map(|task| task.id.clone()).collect()
    }

    pub fn tasks(&self) -> &[SearchTask] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Hands out task ids for one run.
///
/// Generated tasks get `g0001`, `g0002`, ... across every batch and round;
/// user-added tasks get `user_1`, `user_2`, ...
#[derive(Debug, Default)]
pub struct TaskIdAllocator {
    generated: u64,
    user: u64,
}

impl TaskIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_generated(&mut self) -> String {
        self.generated += 1;
        format!("g{:04}", self.generated)
    }

    pub fn next_user(&mut self) -> String {
        self.user += 1;
        format!("user_{}", self.user)
    }

    /// Overwrites the provisional id of every task.
    pub fn assign(&mut self, tasks: &mut [SearchTask]) {
        for task in tasks {
            task.id = self.next_generated();
        }
    }

    /// Builds a task for a query the user typed during review.
    pub fn user_task(&mut self, query: impl Into<String>) -> SearchTask {
        SearchTask::new(self.next_user(), query, "web").with_rationale("User added search")
    }
}

/// A search result projected onto the schema, with provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRow {
    pub values: HashMap<String, String>,
    pub source_query_id: String,
    pub source_strategy: String,
}

impl NormalizedRow {
    pub fn new(values: HashMap<String, String>, task: &SearchTask) -> Self {
        Self {
            values,
            source_query_id: task.id.clone(),
            source_strategy: task.strategy.clone(),
        }
    }

    /// Value of `column`, or `""`.
    pub fn get(&self, column: &str) -> &str {
        self.values.get(column).map(String::as_str).unwrap_or("")
    }

    /// First non-blank value among `columns`, trimmed.
    pub fn first_of(&self, columns: &[&str]) -> &str {
        columns
            .iter()
            .map(|column| self.get(column).trim())
            .find(|value| !value.is_empty())
            .unwrap_or("")
    }

    /// Values aligned to `columns`; provenance columns come from the row itself.
    pub fn project(&self, columns: &[String]) -> Vec<String> {
        columns
            .iter()
            .map(|column| match column.as_str() {
                "source_query_id" => self.source_query_id.clone(),
                "source_strategy" => self.source_strategy.clone(),
                other => self.get(other).to_string(),
            })
            .collect()
    }
}

/// Outcome of one executed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSummary {
    pub task: SearchTask,
    pub items_found: usize,
    pub note: Option<String>,
}

impl SearchSummary {
    pub fn succeeded(task: SearchTask, items_found: usize) -> Self {
        Self {
            task,
            items_found,
            note: None,
        }
    }

    pub fn failed(task: SearchTask, note: impl Into<String>) -> Self {
        Self {
            task,
            items_found: 0,
            note: Some(note.into()),
        }
    }
}
