//! Loose output records and the field-based dedup rules applied to them.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::search::parser::value_to_text;
use crate::search::{extract_domain, is_reserved_column, DedupeField, NormalizedRow};
use crate::utils::parse_json_payload;

/// An output record: ordered string fields keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `key`, or `""`.
    pub fn get(&self, key: &str) -> &str {
        self.0.get(key).and_then(Value::as_str).unwrap_or("")
    }

    /// First non-blank value among `keys`, trimmed.
    pub fn first_of(&self, keys: &[&str]) -> &str {
        keys.iter()
            .map(|key| self.get(key).trim())
            .find(|value| !value.is_empty())
            .unwrap_or("")
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), Value::String(value.into()));
    }

    /// Sets `key` only when it is absent or blank.
    pub fn fill(&mut self, key: &str, value: &str) {
        if self.get(key).is_empty() && !value.is_empty() {
            self.set(key, value);
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Builds the loose record for a collected row.
    ///
    /// Schema fields are projected, `name` is backfilled from `title`,
    /// `company` or the query id, and contact/link fields are copied over
    /// when the row has them.
    pub fn from_row(row: &NormalizedRow, schema: &[String]) -> Self {
        let mut record = Record::new();
        record.set("source_query_id", row.source_query_id.as_str());
        record.set("source_strategy", row.source_strategy.as_str());
        for field in schema.iter().filter(|f| !is_reserved_column(f)) {
            record.set(field.as_str(), row.get(field));
        }

        if record.get("name").is_empty() {
            let name = row.first_of(&["title", "company"]);
            let name = if name.is_empty() {
                row.source_query_id.as_str()
            } else {
                name
            };
            record.set("name", name);
        }

        let url = row.first_of(&["website", "url", "link"]);
        record.fill("website", url);
        record.fill("link", url);
        record.fill("source_domain", row.first_of(&["source_domain", "source"]));
        record.fill("email", row.get("email").trim());
        record
    }

    /// Builds a record from one oracle-returned object.
    ///
    /// `null` values are dropped, everything else is stringified and trimmed.
    /// Returns `None` when neither `name` nor `company` is present.
    pub fn from_object(object: &Map<String, Value>) -> Option<Self> {
        let mut record = Record::new();
        for (key, value) in object {
            if value.is_null() {
                continue;
            }
            record.set(key.as_str(), value_to_text(value));
        }
        let name = record.first_of(&["name", "company"]).to_string();
        if name.is_empty() {
            return None;
        }
        record.set("name", name);
        Some(record)
    }

    /// Identity of the record under `field`.
    pub fn dedupe_key(&self, field: DedupeField) -> String {
        match field {
            DedupeField::Website | DedupeField::Link | DedupeField::Url => {
                let email = self.get("email").trim().to_lowercase();
                if !email.is_empty() {
                    return email;
                }
                let url = self.first_of(&[field.as_str(), "website", "url", "link"]);
                extract_domain(url).to_lowercase()
            }
            DedupeField::Email => self.get("email").trim().to_lowercase(),
            DedupeField::Description => alphanumeric_lower(self.get("description")),
            DedupeField::Name => alphanumeric_lower(self.first_of(&["name", "title"])),
        }
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Record(map)
    }
}

fn alphanumeric_lower(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// Keeps the first record per dedupe key, in order. Records whose key is
/// empty are kept as they are.
pub fn dedupe_records(records: impl IntoIterator<Item = Record>, field: DedupeField) -> Vec<Record> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| {
            let key = record.dedupe_key(field);
            key.is_empty() || seen.insert(key)
        })
        .collect()
}

/// Parses the cleaned records returned by the refinement oracle.
///
/// Accepts an object with `companies`/`results`/`items` or a bare list.
/// Anything unparseable yields no records.
pub fn parse_refined_records(raw_text: &str) -> Vec<Record> {
    let Some(payload) = parse_json_payload(raw_text) else {
        return Vec::new();
    };
    let candidates = match &payload {
        Value::Object(map) => ["companies", "results", "items"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array)),
        Value::Array(items) => Some(items),
        _ => None,
    };

    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
        .filter_map(Record::from_object)
        .collect()
}
