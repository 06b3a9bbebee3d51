//! Append-only free-text feedback collected during review.

/// Feedback entries for one run, in the order they were given.
///
/// Retry prompts use only [`latest`](Self::latest); filter prompts use
/// [`joined`](Self::joined).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackHistory {
    entries: Vec<String>,
}

impl FeedbackHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry; blank text is ignored.
    pub fn push(&mut self, entry: impl Into<String>) {
        let entry = entry.into().trim().to_string();
        if !entry.is_empty() {
            self.entries.push(entry);
        }
    }

    pub fn latest(&self) -> Option<&str> {
        self.entries.last().map(String::as_str)
    }

    /// Every entry joined by newlines, or `None` when there are none.
    pub fn joined(&self) -> Option<String> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.join("\n"))
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
