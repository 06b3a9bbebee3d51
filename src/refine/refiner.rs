//! Oracle-assisted cleanup of collected rows into final records.

use std::collections::HashMap;
use std::sync::Arc;

use tera::Context;
use tracing::{info, warn};

use super::record::{dedupe_records, parse_refined_records, Record};
use crate::error::SearchError;
use crate::llm::{GenerationRequest, LlmProvider, Message, ModelRegistry};
use crate::prompts::{PromptName, PromptRepository};
use crate::scheduler::{run_batch, FailurePolicy};
use crate::search::{is_reserved_column, DedupeField, NormalizedRow, UserRequest};

/// Maximum number of records sent to the oracle per call.
pub const CHUNK_SIZE: usize = 20;

const SYSTEM_PROMPT: &str = "You are a meticulous data curator. You produce clean, \
deduplicated company lists in JSON and never repeat entries.";

/// Turns accumulated rows into deduplicated output records.
///
/// Records are refined in chunks of [`CHUNK_SIZE`] concurrently. A chunk the
/// oracle cannot clean is deduplicated locally instead.
pub struct ResultRefiner {
    llm: Arc<dyn LlmProvider>,
    prompts: Arc<PromptRepository>,
    models: ModelRegistry,
    pool_size: usize,
}

impl ResultRefiner {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        prompts: Arc<PromptRepository>,
        models: ModelRegistry,
        pool_size: usize,
    ) -> Self {
        Self {
            llm,
            prompts,
            models,
            pool_size,
        }
    }

    /// Refines `rows` into records; empty input yields no records.
    pub async fn refine(
        &self,
        rows: &[NormalizedRow],
        request: &UserRequest,
        schema: &[String],
    ) -> Vec<Record> {
        if rows.is_empty() {
            return Vec::new();
        }

        let fields = schema_fields(schema);
        let records: Vec<Record> = rows.iter().map(|row| Record::from_row(row, schema)).collect();
        let index = SourceIndex::build(rows, &fields);
        let chunks: Vec<Vec<Record>> = records.chunks(CHUNK_SIZE).map(<[Record]>::to_vec).collect();
        info!(
            records = records.len(),
            chunks = chunks.len(),
            "Refining collected rows"
        );

        let mut outcomes = run_batch(
            "refine",
            chunks.clone(),
            self.pool_size,
            FailurePolicy::Isolate,
            |chunk_index, chunk| self.refine_chunk(chunk_index, chunk, request, &fields),
        )
        .await;
        outcomes.sort_by_key(|outcome| outcome.index);

        let mut combined = Vec::new();
        for outcome in outcomes {
            let refined = outcome.result.unwrap_or_default();
            if refined.is_empty() {
                warn!(
                    chunk = outcome.index,
                    "Chunk returned no records; deduplicating locally"
                );
                combined.extend(dedupe_records(
                    chunks[outcome.index].iter().cloned(),
                    DedupeField::Name,
                ));
            } else {
                combined.extend(refined);
            }
        }

        let mut deduped = dedupe_records(combined, request.dedupe_field);
        if deduped.is_empty() {
            warn!("Cross-chunk dedup produced nothing; deduplicating raw records");
            deduped = dedupe_records(records, request.dedupe_field);
        }

        let normalized = normalize_records(deduped, &fields, &index);
        info!(records = normalized.len(), "Refined records");
        normalized
    }

    /// Local dedup and normalization of raw rows, with no oracle involved.
    pub fn fallback_from_rows(&self, rows: &[NormalizedRow], schema: &[String]) -> Vec<Record> {
        fallback_from_rows(rows, schema)
    }

    async fn refine_chunk(
        &self,
        chunk_index: usize,
        chunk: Vec<Record>,
        request: &UserRequest,
        fields: &[String],
    ) -> Result<Vec<Record>, SearchError> {
        let candidate_json = serde_json::to_string_pretty(&chunk)
            .map_err(|e| SearchError::UnexpectedShape(e.to_string()))?;
        let requested = request.columns.as_deref().unwrap_or(fields);

        let mut context = Context::new();
        context.insert("user_description", &request.description);
        context.insert("requested_columns", &requested.join(", "));
        context.insert("schema_fields", &fields.join(", "));
        context.insert("candidate_json", &candidate_json);
        let prompt = self.prompts.render(PromptName::RefineResults, &context)?;

        let generation = GenerationRequest::new(
            self.models.for_postprocess(),
            vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)],
        )
        .with_json_response()
        .with_step(format!("refine_{}", chunk_index))
        .with_metadata("record_count", chunk.len());

        let response = self.llm.generate(generation).await?;
        Ok(dedupe_records(
            parse_refined_records(&response.text),
            request.dedupe_field,
        ))
    }
}

/// Local dedup by name plus normalization, used when the oracle produced
/// nothing usable.
pub fn fallback_from_rows(rows: &[NormalizedRow], schema: &[String]) -> Vec<Record> {
    let fields = schema_fields(schema);
    let records = rows.iter().map(|row| Record::from_row(row, schema));
    let index = SourceIndex::build(rows, &fields);
    normalize_records(dedupe_records(records, DedupeField::Name), &fields, &index)
}

/// Schema columns minus the provenance columns.
fn schema_fields(schema: &[String]) -> Vec<String> {
    schema
        .iter()
        .filter(|column| !is_reserved_column(column))
        .cloned()
        .collect()
}

/// Original row data keyed by lowercased name, first row wins.
struct SourceIndex {
    by_name: HashMap<String, Record>,
}

impl SourceIndex {
    fn build(rows: &[NormalizedRow], fields: &[String]) -> Self {
        let mut by_name = HashMap::new();
        for row in rows {
            let key = row.first_of(&["name", "title", "company"]).to_lowercase();
            if key.is_empty() || by_name.contains_key(&key) {
                continue;
            }
            let mut record = Record::new();
            for field in fields {
                record.set(field.as_str(), row.get(field));
            }
            let url = row.first_of(&["website", "url", "link"]);
            record.fill("website", url);
            record.fill("link", url);
            record.fill("source_domain", row.get("source_domain").trim());
            record.fill("email", row.get("email").trim());
            by_name.insert(key, record);
        }
        Self { by_name }
    }

    fn get(&self, name: &str) -> Option<&Record> {
        self.by_name.get(&name.to_lowercase())
    }
}

/// Aligns records to the schema: drops nameless ones, backfills blank
/// fields from the original rows and fills website/link/email.
fn normalize_records(records: Vec<Record>, fields: &[String], index: &SourceIndex) -> Vec<Record> {
    let empty = Record::new();
    records
        .into_iter()
        .filter_map(|record| {
            let name = record.first_of(&["name", "title"]).to_string();
            if name.is_empty() {
                return None;
            }
            let source = index.get(&name).unwrap_or(&empty);

            let mut merged = Record::new();
            merged.set("name", name.as_str());
            for field in fields.iter().filter(|f| f.as_str() != "name") {
                let value = record.get(field).trim();
                let value = if value.is_empty() {
                    source.get(field).trim()
                } else {
                    value
                };
                merged.set(field.as_str(), value);
            }

            let website = [record.first_of(&["website", "url"]), source.first_of(&["website", "url"])]
                .into_iter()
                .find(|v| !v.is_empty())
                .unwrap_or("");
            merged.fill("website", website);

            let link = [record.get("link").trim(), source.get("link").trim(), website]
                .into_iter()
                .find(|v| !v.is_empty())
                .unwrap_or("");
            merged.fill("link", link);

            let email = [record.get("email").trim(), source.get("email").trim()]
                .into_iter()
                .find(|v| !v.is_empty())
                .unwrap_or("");
            merged.fill("email", email);

            Some(merged)
        })
        .collect()
}
