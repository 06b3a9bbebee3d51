//! In-memory row store with identity-based deduplication.
//!
//! The store lives for one run and only grows. Each inserted row is reduced
//! to a [`DedupKey`]; a row whose key was already seen is skipped.

use std::collections::HashSet;

use tracing::debug;

use crate::search::NormalizedRow;

/// Number of description characters that take part in a key.
const DESCRIPTION_KEY_CHARS: usize = 100;

/// Identity of a row, strongest evidence first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    /// Normalized `url`/`link`.
    Url(String),
    /// Title (or name) plus source (or source domain).
    TitleSource { title: String, source: String },
    /// Title (or name) plus the start of the description.
    TitleDescription { title: String, description: String },
    /// Whatever is left: title or query id, strategy and description start.
    Fallback {
        title_or_query: String,
        strategy: String,
        description: String,
    },
}

impl DedupKey {
    /// Derives the key of a row; the first tier with data wins.
    pub fn for_row(row: &NormalizedRow) -> Self {
        let url = normalized(row.first_of(&["url", "link"]));
        if !url.is_empty() {
            return DedupKey::Url(url);
        }

        let title = normalized(row.first_of(&["title", "name"]));
        let source = normalized(row.first_of(&["source", "source_domain"]));
        let description: String = normalized(row.get("description"))
            .chars()
            .take(DESCRIPTION_KEY_CHARS)
            .collect();

        if !title.is_empty() && !source.is_empty() {
            return DedupKey::TitleSource { title, source };
        }
        if !title.is_empty() && !description.is_empty() {
            return DedupKey::TitleDescription { title, description };
        }

        DedupKey::Fallback {
            title_or_query: if title.is_empty() {
                row.source_query_id.clone()
            } else {
                title
            },
            strategy: row.source_strategy.clone(),
            description,
        }
    }
}

fn normalized(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Append-only store holding at most one row per [`DedupKey`].
#[derive(Debug, Default)]
pub struct InMemoryDatabase {
    rows: Vec<NormalizedRow>,
    seen: HashSet<DedupKey>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the row unless its key was seen. Returns whether it was added.
    pub fn insert(&mut self, row: NormalizedRow) -> bool {
        let key = DedupKey::for_row(&row);
        if self.seen.contains(&key) {
            debug!(?key, "Skipping duplicate row");
            return false;
        }
        debug!(?key, "Inserted row");
        self.seen.insert(key);
        self.rows.push(row);
        true
    }

    /// Inserts every row; returns how many were new.
    pub fn extend(&mut self, rows: impl IntoIterator<Item = NormalizedRow>) -> usize {
        let mut added = 0;
        for row in rows {
            if self.insert(row) {
                added += 1;
            }
        }
        added
    }

    pub fn rows(&self) -> &[NormalizedRow] {
        &self.rows
    }

    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
